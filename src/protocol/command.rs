//! Inbound command frames.
//!
//! Commands arrive from the controller as JSON objects:
//!
//! | type | payload |
//! |------|---------|
//! | `EVALUATE_SCRIPT` | `{requestId, script}` |
//! | `CAPTURE_ELEMENTS_SCREENSHOT` | `{requestId, selectors}` |
//! | `PASTE_DATA` | `{requestId, selector, dataUrl}` |
//!
//! Frames are classified with [`Inbound::parse`] rather than plain serde so
//! that a malformed frame still yields whatever `requestId` it carried.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::RequestId;

use super::result::CommandResult;

// ============================================================================
// Command
// ============================================================================

/// A validated command from the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Evaluate a script in the inspected page.
    EvaluateScript {
        /// Correlation id.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// Script source text.
        script: String,
    },

    /// Capture cropped screenshots of the given elements.
    CaptureElementsScreenshot {
        /// Correlation id.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// CSS selectors, one image per selector.
        selectors: Vec<String>,
    },

    /// Paste binary data into an element via a synthetic clipboard event.
    PasteData {
        /// Correlation id.
        #[serde(rename = "requestId")]
        request_id: RequestId,
        /// CSS selector of the paste target.
        selector: String,
        /// Data URL holding the pasted content.
        #[serde(rename = "dataUrl")]
        data_url: String,
    },
}

impl Command {
    /// Returns the correlation id.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::EvaluateScript { request_id, .. }
            | Self::CaptureElementsScreenshot { request_id, .. }
            | Self::PasteData { request_id, .. } => request_id,
        }
    }

    /// Returns the command kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::EvaluateScript { .. } => CommandKind::EvaluateScript,
            Self::CaptureElementsScreenshot { .. } => CommandKind::CaptureElementsScreenshot,
            Self::PasteData { .. } => CommandKind::PasteData,
        }
    }
}

// ============================================================================
// CommandKind
// ============================================================================

/// Command discriminator, known even when the payload is malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `EVALUATE_SCRIPT`
    EvaluateScript,
    /// `CAPTURE_ELEMENTS_SCREENSHOT`
    CaptureElementsScreenshot,
    /// `PASTE_DATA`
    PasteData,
}

impl CommandKind {
    /// Looks up a kind by its wire name.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "EVALUATE_SCRIPT" => Some(Self::EvaluateScript),
            "CAPTURE_ELEMENTS_SCREENSHOT" => Some(Self::CaptureElementsScreenshot),
            "PASTE_DATA" => Some(Self::PasteData),
            _ => None,
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EvaluateScript => "EVALUATE_SCRIPT",
            Self::CaptureElementsScreenshot => "CAPTURE_ELEMENTS_SCREENSHOT",
            Self::PasteData => "PASTE_DATA",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// MalformedCommand
// ============================================================================

/// A recognized command whose payload failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedCommand {
    /// Command kind from the `type` field.
    pub kind: CommandKind,
    /// Request id, if the frame carried one.
    pub request_id: Option<RequestId>,
    /// Structural error description.
    pub message: String,
}

impl MalformedCommand {
    /// Builds the immediate structural-error answer for this frame.
    ///
    /// Keyed by the frame's `requestId`, or `"unknown"` if it had none.
    #[must_use]
    pub fn into_result(self) -> CommandResult {
        let request_id = self.request_id.unwrap_or_else(RequestId::unknown);
        CommandResult::failure(self.kind, request_id, self.message)
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Classification of a raw inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Well-formed command.
    Command(Command),
    /// Recognized type with an invalid payload.
    Malformed(MalformedCommand),
    /// Unrecognized or missing `type`; ignored by the executor.
    Unknown {
        /// The `type` value, if any.
        kind: Option<String>,
    },
}

impl Inbound {
    /// Classifies a frame received over the control link.
    #[must_use]
    pub fn parse(frame: &Value) -> Self {
        let type_name = frame.get("type").and_then(Value::as_str);
        let Some(kind) = type_name.and_then(CommandKind::from_wire) else {
            return Self::Unknown {
                kind: type_name.map(str::to_string),
            };
        };

        let request_id = request_id_of(frame);
        let malformed = |message: &str| {
            Self::Malformed(MalformedCommand {
                kind,
                request_id: request_id.clone(),
                message: message.to_string(),
            })
        };

        let Some(id) = request_id.clone() else {
            return malformed(match kind {
                CommandKind::EvaluateScript => {
                    "Invalid EVALUATE_SCRIPT request structure: missing requestId"
                }
                CommandKind::CaptureElementsScreenshot => {
                    "Invalid CAPTURE_ELEMENTS_SCREENSHOT request structure: missing requestId"
                }
                CommandKind::PasteData => {
                    "Invalid PASTE_DATA request structure: missing requestId"
                }
            });
        };

        match kind {
            CommandKind::EvaluateScript => match frame.get("script").and_then(Value::as_str) {
                Some(script) => Self::Command(Command::EvaluateScript {
                    request_id: id,
                    script: script.to_string(),
                }),
                None => malformed("Invalid EVALUATE_SCRIPT request structure: script must be a string"),
            },
            CommandKind::CaptureElementsScreenshot => match string_array(frame.get("selectors")) {
                Some(selectors) if !selectors.is_empty() => {
                    Self::Command(Command::CaptureElementsScreenshot {
                        request_id: id,
                        selectors,
                    })
                }
                _ => malformed(
                    "Invalid CAPTURE_ELEMENTS_SCREENSHOT request structure or empty selectors.",
                ),
            },
            CommandKind::PasteData => {
                let selector = non_empty_str(frame.get("selector"));
                let data_url = non_empty_str(frame.get("dataUrl"));
                match (selector, data_url) {
                    (Some(selector), Some(data_url)) => Self::Command(Command::PasteData {
                        request_id: id,
                        selector: selector.to_string(),
                        data_url: data_url.to_string(),
                    }),
                    _ => malformed(
                        "Invalid PASTE_DATA request structure (missing requestId, selector, or dataUrl).",
                    ),
                }
            }
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Extracts a usable request id. Numbers are accepted and stringified.
fn request_id_of(frame: &Value) -> Option<RequestId> {
    match frame.get("requestId")? {
        Value::String(s) if !s.is_empty() => Some(RequestId::new(s.as_str())),
        Value::Number(n) => Some(RequestId::new(n.to_string())),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Returns the array as strings, or `None` if any element is not a string.
fn string_array(value: Option<&Value>) -> Option<Vec<String>> {
    value?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
