//! In-page script evaluation.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::identifiers::RequestId;
use crate::protocol::CommandResult;

// ============================================================================
// Evaluation
// ============================================================================

/// Outcome of evaluating a script in the page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluation {
    /// Completion value of the script (promises already awaited).
    pub value: Value,
    /// Exception descriptor, if the script threw.
    pub exception: Option<Value>,
}

impl Evaluation {
    /// Script completed with `value`.
    #[inline]
    #[must_use]
    pub fn value(value: Value) -> Self {
        Self {
            value,
            exception: None,
        }
    }

    /// Script threw; `descriptor` is whatever the host reported.
    #[inline]
    #[must_use]
    pub fn exception(descriptor: Value) -> Self {
        Self {
            value: Value::Null,
            exception: Some(descriptor),
        }
    }

    /// Returns a readable description of the exception, if any.
    #[must_use]
    pub fn exception_description(&self) -> Option<String> {
        self.exception.as_ref().map(describe_exception)
    }
}

// ============================================================================
// ScriptEvaluator
// ============================================================================

/// Host capability to run script inside the inspected page.
#[async_trait]
pub trait ScriptEvaluator: Send + Sync + 'static {
    /// Evaluates `source` and returns its value or exception.
    ///
    /// An `Err` means the host could not evaluate at all.
    async fn evaluate(&self, source: &str) -> Result<Evaluation>;
}

// ============================================================================
// EVALUATE_SCRIPT
// ============================================================================

/// Runs an `EVALUATE_SCRIPT` command. Never fails: exceptions are data.
pub(crate) async fn evaluate_command(
    evaluator: &dyn ScriptEvaluator,
    request_id: RequestId,
    script: &str,
) -> CommandResult {
    debug!(%request_id, script_len = script.len(), "Evaluating script");

    match evaluator.evaluate(script).await {
        Ok(evaluation) => match evaluation.exception_description() {
            Some(info) => {
                warn!(%request_id, exception = %info, "Script threw");
                CommandResult::evaluation_exception(request_id, info)
            }
            None => CommandResult::evaluation(request_id, evaluation.value),
        },
        Err(e) => {
            warn!(%request_id, error = %e, "Host failed to evaluate script");
            CommandResult::evaluation_exception(request_id, e.reason())
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Best-effort text for an exception descriptor.
///
/// Prefers `description`, then `value`, then the descriptor as JSON.
/// Primitive descriptors become their text.
pub(crate) fn describe_exception(descriptor: &Value) -> String {
    match descriptor {
        Value::Object(fields) => ["description", "value"]
            .iter()
            .filter_map(|key| fields.get(*key))
            .find(|value| is_truthy(value))
            .map(value_text)
            .unwrap_or_else(|| descriptor.to_string()),
        other => value_text(other),
    }
}

/// Escapes a string for use as a JavaScript literal.
pub(crate) fn json_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => true,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
