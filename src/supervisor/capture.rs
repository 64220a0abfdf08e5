//! Visible-surface capture capability.
//!
//! The supervisor owns the ability to rasterize a tab. The host provides
//! it through [`SurfaceCapture`]; capture is a two-step lookup (tab →
//! window, then window → image).

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::identifiers::{TabId, WindowId};

// ============================================================================
// SurfaceCapture
// ============================================================================

/// Host capability to capture the visible surface of a browser window.
#[async_trait]
pub trait SurfaceCapture: Send + Sync + 'static {
    /// Resolves the window currently showing `tab_id`.
    async fn window_of(&self, tab_id: TabId) -> Result<WindowId>;

    /// Captures the visible surface of `window_id` as a PNG data URL.
    ///
    /// `Ok(None)` means the host returned an empty image.
    async fn capture_visible(&self, window_id: WindowId) -> Result<Option<String>>;
}

// ============================================================================
// Capture Flow
// ============================================================================

/// Captures the visible surface showing `tab_id`.
///
/// # Errors
///
/// Returns [`Error::CaptureFailed`] if the window lookup fails, the capture
/// fails, or the host returns an empty image.
pub(crate) async fn capture_tab(capture: &dyn SurfaceCapture, tab_id: TabId) -> Result<String> {
    let window_id = capture.window_of(tab_id).await.map_err(|e| {
        error!(%tab_id, error = %e, "Failed to resolve window for tab");
        Error::capture_failed(
            tab_id,
            format!("Failed to get details for inspected tab: {}", e.reason()),
        )
    })?;

    debug!(%tab_id, %window_id, "Capturing visible surface");

    match capture.capture_visible(window_id).await {
        Ok(Some(data_url)) if !data_url.is_empty() => Ok(data_url),
        Ok(_) => {
            error!(%tab_id, %window_id, "Capture returned an empty image");
            Err(Error::capture_failed(
                tab_id,
                "captureVisibleTab returned empty dataUrl.",
            ))
        }
        Err(e) => {
            error!(%tab_id, %window_id, error = %e, "Capture failed");
            Err(Error::capture_failed(tab_id, e.reason()))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
