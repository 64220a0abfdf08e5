//! Outbound result frames.
//!
//! Every inbound command carrying a `requestId` is answered by exactly one
//! of these frames.
//!
//! # Format
//!
//! ```json
//! { "type": "EVALUATION_RESULT", "requestId": "r1", "result": 2,
//!   "isException": false, "exceptionInfo": null }
//! { "type": "ELEMENTS_SCREENSHOT_RESULT", "requestId": "r3",
//!   "imageData": { "#a": "data:image/png;base64,...", "#b": null }, "error": null }
//! { "type": "PASTE_RESULT", "requestId": "p1", "success": true,
//!   "message": "...", "error": null }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::RequestId;

use super::command::CommandKind;

// ============================================================================
// Types
// ============================================================================

/// Per-selector screenshot output. `None` means "no image for this selector".
pub type ImageData = BTreeMap<String, Option<String>>;

// ============================================================================
// CommandResult
// ============================================================================

/// A correlated result sent back to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CommandResult {
    /// Outcome of `EVALUATE_SCRIPT`.
    #[serde(rename = "EVALUATION_RESULT")]
    Evaluation {
        /// Correlation id.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// Script value (`null` on exception).
        #[serde(default)]
        result: Value,
        /// Whether the script threw.
        #[serde(rename = "isException")]
        is_exception: bool,
        /// Best-effort exception description.
        #[serde(rename = "exceptionInfo")]
        exception_info: Option<String>,
    },

    /// Outcome of `CAPTURE_ELEMENTS_SCREENSHOT`.
    #[serde(rename = "ELEMENTS_SCREENSHOT_RESULT")]
    ElementsScreenshot {
        /// Correlation id.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// Selector → PNG data URL (or `null`).
        #[serde(rename = "imageData")]
        image_data: ImageData,
        /// Batch failure reason.
        error: Option<String>,
    },

    /// Outcome of `PASTE_DATA`.
    #[serde(rename = "PASTE_RESULT")]
    Paste {
        /// Correlation id.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// Whether the paste event was dispatched.
        success: bool,
        /// Success message.
        message: Option<String>,
        /// Failure reason.
        error: Option<String>,
    },
}

// ============================================================================
// Constructors
// ============================================================================

impl CommandResult {
    /// Successful evaluation.
    #[must_use]
    pub fn evaluation(request_id: RequestId, result: Value) -> Self {
        Self::Evaluation {
            request_id,
            result,
            is_exception: false,
            exception_info: None,
        }
    }

    /// Evaluation that threw, or could not be attempted.
    #[must_use]
    pub fn evaluation_exception(request_id: RequestId, info: impl Into<String>) -> Self {
        Self::Evaluation {
            request_id,
            result: Value::Null,
            is_exception: true,
            exception_info: Some(info.into()),
        }
    }

    /// Completed screenshot batch.
    #[must_use]
    pub fn screenshot(request_id: RequestId, image_data: ImageData) -> Self {
        Self::ElementsScreenshot {
            request_id,
            image_data,
            error: None,
        }
    }

    /// Failed screenshot batch. `imageData` is always empty.
    #[must_use]
    pub fn screenshot_error(request_id: RequestId, error: impl Into<String>) -> Self {
        Self::ElementsScreenshot {
            request_id,
            image_data: ImageData::new(),
            error: Some(error.into()),
        }
    }

    /// Dispatched paste.
    #[must_use]
    pub fn paste_ok(request_id: RequestId, message: Option<String>) -> Self {
        Self::Paste {
            request_id,
            success: true,
            message,
            error: None,
        }
    }

    /// Failed paste.
    #[must_use]
    pub fn paste_error(request_id: RequestId, error: impl Into<String>) -> Self {
        Self::Paste {
            request_id,
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }

    /// Failure result of the shape that answers a `kind` command.
    #[must_use]
    pub fn failure(kind: CommandKind, request_id: RequestId, reason: impl Into<String>) -> Self {
        match kind {
            CommandKind::EvaluateScript => Self::evaluation_exception(request_id, reason),
            CommandKind::CaptureElementsScreenshot => Self::screenshot_error(request_id, reason),
            CommandKind::PasteData => Self::paste_error(request_id, reason),
        }
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl CommandResult {
    /// Returns the correlation id.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::Evaluation { request_id, .. }
            | Self::ElementsScreenshot { request_id, .. }
            | Self::Paste { request_id, .. } => request_id,
        }
    }

    /// Returns `true` if this result reports a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Evaluation { is_exception, .. } => *is_exception,
            Self::ElementsScreenshot { error, .. } => error.is_some(),
            Self::Paste { success, .. } => !success,
        }
    }

    /// Serializes to a JSON value for forwarding.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evaluation_wire_format() {
        let result = CommandResult::evaluation(RequestId::new("r1"), json!(2));
        assert_eq!(
            result.to_value(),
            json!({
                "type": "EVALUATION_RESULT",
                "requestId": "r1",
                "result": 2,
                "isException": false,
                "exceptionInfo": null
            })
        );
        assert!(!result.is_failure());
    }

    #[test]
    fn test_screenshot_error_has_empty_image_data() {
        let result = CommandResult::screenshot_error(RequestId::new("r3"), "capture failed");
        let wire = result.to_value();
        assert_eq!(wire["imageData"], json!({}));
        assert_eq!(wire["error"], json!("capture failed"));
        assert!(result.is_failure());
    }

    #[test]
    fn test_screenshot_null_entries_serialize_as_null() {
        let mut data = ImageData::new();
        data.insert("#absent".to_string(), None);
        data.insert("#present".to_string(), Some("data:image/png;base64,AA".to_string()));
        let wire = CommandResult::screenshot(RequestId::new("r3"), data).to_value();
        assert_eq!(wire["imageData"]["#absent"], Value::Null);
        assert_eq!(wire["error"], Value::Null);
    }

    #[test]
    fn test_paste_wire_format() {
        let wire = CommandResult::paste_error(RequestId::new("p1"), "Element \"#x\" not found.")
            .to_value();
        assert_eq!(wire["type"], json!("PASTE_RESULT"));
        assert_eq!(wire["success"], json!(false));
        assert_eq!(wire["message"], Value::Null);
    }

    #[test]
    fn test_result_deserializes() {
        let wire = json!({
            "type": "PASTE_RESULT",
            "requestId": "p9",
            "success": true,
            "message": "ok",
            "error": null
        });
        let result: CommandResult = serde_json::from_value(wire).expect("parse");
        assert_eq!(
            result,
            CommandResult::paste_ok(RequestId::new("p9"), Some("ok".to_string()))
        );
    }
}
