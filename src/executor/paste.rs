//! Synthetic paste injection.
//!
//! The in-page script resolves the selector, fetches the data URL into a
//! blob, wraps it in a `File` and dispatches a `paste` `ClipboardEvent`
//! at the element. Delivery is at-most-once: a paste is never retried.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use tracing::{debug, warn};

use crate::identifiers::RequestId;
use crate::protocol::CommandResult;

use super::script::{ScriptEvaluator, describe_exception, json_string};

// ============================================================================
// Types
// ============================================================================

/// Value returned by the paste script.
#[derive(Debug, Deserialize)]
struct PasteOutcome {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ============================================================================
// Script
// ============================================================================

/// Builds the paste script. Arguments are embedded as JSON literals.
pub(crate) fn paste_script(selector: &str, data_url: &str) -> String {
    format!(
        r#"(async (selectorArg, dataUrlArg) => {{
    const element = document.querySelector(selectorArg);
    if (!element) {{
        return {{ success: false, error: `Element "${{selectorArg}}" not found.` }};
    }}
    element.focus();
    try {{
        const response = await fetch(dataUrlArg);
        if (!response.ok) {{
            throw new Error(`Failed to fetch data URL (status: ${{response.status}}) starting with: ${{dataUrlArg.substring(0, 100)}}...`);
        }}
        const blob = await response.blob();
        const extension = blob.type.split('/')[1] || 'png';
        const transfer = new DataTransfer();
        transfer.items.add(new File([blob], 'pasted_image.' + extension, {{ type: blob.type }}));
        element.dispatchEvent(new ClipboardEvent('paste', {{
            clipboardData: transfer,
            bubbles: true,
            cancelable: true
        }}));
        return {{ success: true, message: `Paste event dispatched to "${{selectorArg}}".` }};
    }} catch (e) {{
        return {{ success: false, error: (e && e.message) || String(e) }};
    }}
}})({}, {})"#,
        json_string(selector),
        json_string(data_url)
    )
}

// ============================================================================
// PASTE_DATA
// ============================================================================

/// Runs a `PASTE_DATA` command. Never fails: errors become `success: false`.
pub(crate) async fn paste_command(
    evaluator: &dyn ScriptEvaluator,
    request_id: RequestId,
    selector: &str,
    data_url: &str,
) -> CommandResult {
    debug!(%request_id, selector, data_url_len = data_url.len(), "Pasting data");

    let evaluation = match evaluator.evaluate(&paste_script(selector, data_url)).await {
        Ok(evaluation) => evaluation,
        Err(e) => {
            warn!(%request_id, error = %e, "Host failed to evaluate paste script");
            return CommandResult::paste_error(
                request_id,
                format!("Script evaluation exception: {}", e.reason()),
            );
        }
    };

    if let Some(exception) = &evaluation.exception {
        let description = describe_exception(exception);
        warn!(%request_id, exception = %description, "Paste script threw");
        return CommandResult::paste_error(
            request_id,
            format!("Script evaluation exception: {description}"),
        );
    }

    match serde_json::from_value::<PasteOutcome>(evaluation.value.clone()) {
        Ok(PasteOutcome {
            success: true,
            message,
            ..
        }) => CommandResult::paste_ok(request_id, message),
        Ok(PasteOutcome { error, .. }) => CommandResult::paste_error(
            request_id,
            error.unwrap_or_else(|| "Paste failed.".to_string()),
        ),
        Err(_) => CommandResult::paste_error(
            request_id,
            format!("Unexpected paste script result: {}", evaluation.value),
        ),
    }
}

// ============================================================================
// Tests
// ============================================================================
