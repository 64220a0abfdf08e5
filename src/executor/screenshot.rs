//! Element screenshot pipeline.
//!
//! # Steps
//!
//! | Step | Where | Failure |
//! |------|-------|---------|
//! | Measure selectors | in-page script | whole batch fails |
//! | Capture visible surface | supervisor, over the bridge | whole batch fails |
//! | Crop each rectangle | blocking pool | whole batch fails on decode |
//!
//! Missing elements and zero-area rectangles map to `null`; they are not
//! errors.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Cursor;

use image::{ImageFormat, RgbaImage, imageops};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{CommandResult, DataUrl, ExecutorMessage, ImageData};

use super::dispatch::CommandContext;
use super::pending::PendingReply;
use super::script::describe_exception;

// ============================================================================
// Constants
// ============================================================================

/// Failure reason when the captured image cannot be decoded.
pub const LOAD_FAILED: &str = "Failed to load main screenshot image for cropping.";

// ============================================================================
// ElementRect
// ============================================================================

/// Bounding rectangle of an element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub top: f64,
    pub left: f64,
    /// Device pixels per CSS pixel.
    #[serde(rename = "devicePixelRatio", default = "default_pixel_ratio")]
    pub pixel_ratio: f64,
}

fn default_pixel_ratio() -> f64 {
    1.0
}

impl ElementRect {
    /// Creates a rectangle at (`left`, `top`).
    #[must_use]
    pub fn new(left: f64, top: f64, width: f64, height: f64, pixel_ratio: f64) -> Self {
        Self {
            x: left,
            y: top,
            width,
            height,
            top,
            left,
            pixel_ratio,
        }
    }

    /// Returns `true` if the rectangle has positive width and height.
    #[inline]
    #[must_use]
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Returns `(left, top, width, height)` in device pixels.
    #[must_use]
    pub fn device_region(&self) -> (i64, i64, u32, u32) {
        let ratio = if self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0 {
            self.pixel_ratio
        } else {
            1.0
        };

        (
            (self.left * ratio).round() as i64,
            (self.top * ratio).round() as i64,
            (self.width * ratio).round() as u32,
            (self.height * ratio).round() as u32,
        )
    }
}

/// Measurement per selector. `None` means the element was not found.
pub type Measurements = BTreeMap<String, Option<ElementRect>>;

// ============================================================================
// Measurement
// ============================================================================

/// Builds the in-page measurement script for `selectors`.
pub(crate) fn measure_script(selectors: &[String]) -> String {
    let selectors = serde_json::to_string(selectors).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
    const selectors = {selectors};
    const results = {{}};
    const dpr = window.devicePixelRatio || 1;
    selectors.forEach(selector => {{
        const element = document.querySelector(selector);
        if (element) {{
            const rect = element.getBoundingClientRect();
            results[selector] = {{
                x: rect.x, y: rect.y, width: rect.width, height: rect.height,
                top: rect.top, left: rect.left, devicePixelRatio: dpr
            }};
        }} else {{
            results[selector] = null;
        }}
    }});
    return results;
}})()"#
    )
}

/// Parses the measurement script's value.
///
/// Every requested selector gets an entry; anything the page did not
/// report, or reported in an unexpected shape, is `None`.
///
/// # Errors
///
/// Returns [`Error::ScriptError`] if the value is not an object.
pub(crate) fn parse_measurements(selectors: &[String], value: &Value) -> Result<Measurements> {
    let Value::Object(reported) = value else {
        return Err(Error::script_error("Failed to retrieve element data from page."));
    };

    Ok(selectors
        .iter()
        .map(|selector| {
            let rect = reported
                .get(selector)
                .filter(|v| !v.is_null())
                .and_then(|v| serde_json::from_value::<ElementRect>(v.clone()).ok());
            (selector.clone(), rect)
        })
        .collect())
}

// ============================================================================
// Cropping
// ============================================================================

/// Decodes a captured data URL into an RGBA image.
///
/// # Errors
///
/// Returns [`Error::DataUrl`] with [`LOAD_FAILED`] if the data URL or
/// image cannot be decoded.
pub fn decode_capture(data_url: &str) -> Result<RgbaImage> {
    let decoded = DataUrl::parse(data_url)
        .and_then(|url| image::load_from_memory(&url.bytes).map_err(Error::from));

    match decoded {
        Ok(image) => Ok(image.to_rgba8()),
        Err(e) => {
            error!(error = %e, "Failed to decode captured image");
            Err(Error::data_url(LOAD_FAILED))
        }
    }
}

/// Crops one region into a fresh transparent canvas and encodes it as a
/// PNG data URL.
///
/// Returns `Ok(None)` if the region has no device pixels. Parts of the
/// region outside `source` stay transparent.
///
/// # Errors
///
/// Returns [`Error::Image`] if PNG encoding fails.
pub fn crop_region(source: &RgbaImage, rect: &ElementRect) -> Result<Option<String>> {
    let (left, top, width, height) = rect.device_region();
    if width == 0 || height == 0 {
        return Ok(None);
    }

    let mut canvas = RgbaImage::new(width, height);
    imageops::replace(&mut canvas, source, -left, -top);

    let mut bytes = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(Some(DataUrl::png(&bytes)))
}

/// Crops every measured region out of `source`.
///
/// # Errors
///
/// Returns [`Error::Image`] if encoding any crop fails.
pub fn crop_all(source: &RgbaImage, measurements: &Measurements) -> Result<ImageData> {
    measurements
        .iter()
        .map(|(selector, rect)| {
            let image = match rect {
                Some(rect) if rect.has_area() => crop_region(source, rect)?,
                _ => None,
            };
            Ok((selector.clone(), image))
        })
        .collect()
}

/// Decodes a capture and crops every measured region.
///
/// # Errors
///
/// See [`decode_capture`] and [`crop_all`].
pub fn crop_capture(data_url: &str, measurements: &Measurements) -> Result<ImageData> {
    let source = decode_capture(data_url)?;
    crop_all(&source, measurements)
}

// ============================================================================
// Pipeline
// ============================================================================

/// Runs a `CAPTURE_ELEMENTS_SCREENSHOT` command.
///
/// Returns `None` if the request was rejected (bridge detached); nothing
/// must be emitted then.
pub(crate) async fn screenshot_command(
    ctx: &CommandContext,
    request_id: RequestId,
    selectors: &[String],
    mut reply: oneshot::Receiver<PendingReply>,
) -> Option<CommandResult> {
    debug!(%request_id, count = selectors.len(), "Starting screenshot capture");

    // Measure
    let measured = tokio::select! {
        measured = timeout(ctx.pending_timeout, measure(ctx, selectors)) => measured,
        _ = &mut reply => {
            debug!(%request_id, "Screenshot rejected during measurement");
            return None;
        }
    };
    let measurements = match measured {
        Ok(Ok(measurements)) => measurements,
        Ok(Err(e)) => return fail(ctx, request_id, e.reason()),
        Err(_) => return fail(ctx, request_id.clone(), timeout_reason(ctx, request_id)),
    };

    // Capture
    let request = ExecutorMessage::RequestTabCapture {
        tab_id: ctx.tab_id,
        request_id: request_id.clone(),
    };
    if let Err(e) = ctx.bridge.post(request) {
        warn!(%request_id, error = %e, "Cannot request tab capture");
        return fail(ctx, request_id, e.reason());
    }

    let data_url = match timeout(ctx.pending_timeout, &mut reply).await {
        Ok(Ok(Ok(data_url))) => data_url,
        Ok(Ok(Err(e))) if e.is_detached() => {
            debug!(%request_id, reason = %e, "Screenshot rejected while awaiting capture");
            return None;
        }
        Ok(Ok(Err(e))) => {
            warn!(%request_id, error = %e, "Tab capture failed");
            return Some(CommandResult::screenshot_error(request_id, e.reason()));
        }
        Ok(Err(_)) => return None,
        Err(_) => return fail(ctx, request_id.clone(), timeout_reason(ctx, request_id)),
    };

    // Crop
    let cropped =
        tokio::task::spawn_blocking(move || crop_capture(&data_url, &measurements)).await;

    match cropped {
        Ok(Ok(image_data)) => {
            debug!(%request_id, count = image_data.len(), "Finished cropping");
            Some(CommandResult::screenshot(request_id, image_data))
        }
        Ok(Err(e)) => Some(CommandResult::screenshot_error(request_id, e.reason())),
        Err(e) => Some(CommandResult::screenshot_error(
            request_id,
            format!("Cropping task failed: {e}"),
        )),
    }
}

async fn measure(ctx: &CommandContext, selectors: &[String]) -> Result<Measurements> {
    let evaluation = ctx.evaluator.evaluate(&measure_script(selectors)).await?;

    if let Some(exception) = &evaluation.exception {
        return Err(Error::script_error(describe_exception(exception)));
    }

    parse_measurements(selectors, &evaluation.value)
}

/// Emits a batch failure, unless the request was already claimed.
fn fail(
    ctx: &CommandContext,
    request_id: RequestId,
    reason: impl Into<String>,
) -> Option<CommandResult> {
    if !ctx.pending.remove(&request_id) {
        return None;
    }

    let reason = reason.into();
    warn!(%request_id, %reason, "Screenshot failed");
    Some(CommandResult::screenshot_error(request_id, reason))
}

fn timeout_reason(ctx: &CommandContext, request_id: RequestId) -> String {
    Error::request_timeout(request_id, ctx.pending_timeout.as_millis() as u64).to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use image::Rgba;
    use serde_json::json;

    fn selectors(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// 20x10 image: left half red, right half blue.
    fn two_tone() -> RgbaImage {
        RgbaImage::from_fn(20, 10, |x, _| {
            if x < 10 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    fn png_data_url(image: &RgbaImage) -> String {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode");
        DataUrl::png(&bytes)
    }

    fn decode(data_url: &str) -> RgbaImage {
        decode_capture(data_url).expect("decodable crop")
    }

    #[test]
    fn test_measure_script_embeds_selectors() {
        let script = measure_script(&selectors(&["#a", "div[data-x=\"1\"]"]));
        assert!(script.contains(r##"const selectors = ["#a","div[data-x=\"1\"]"];"##));
        assert!(script.contains("devicePixelRatio: dpr"));
    }

    #[test]
    fn test_parse_measurements() {
        let value = json!({
            "#present": {"x": 1, "y": 2, "width": 3, "height": 4, "top": 2, "left": 1, "devicePixelRatio": 2},
            "#absent": null
        });
        let parsed = parse_measurements(&selectors(&["#present", "#absent", "#unreported"]), &value)
            .expect("parse");

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["#present"], Some(ElementRect::new(1.0, 2.0, 3.0, 4.0, 2.0)));
        assert_eq!(parsed["#absent"], None);
        assert_eq!(parsed["#unreported"], None);
    }

    #[test]
    fn test_parse_measurements_rejects_null() {
        let err = parse_measurements(&selectors(&["#a"]), &Value::Null).unwrap_err();
        assert_eq!(err.reason(), "Failed to retrieve element data from page.");
    }

    #[test]
    fn test_device_region_rounds() {
        let rect = ElementRect::new(1.25, 0.75, 2.5, 3.4, 2.0);
        assert_eq!(rect.device_region(), (3, 2, 5, 7));

        let bad_ratio = ElementRect::new(1.0, 1.0, 2.0, 2.0, f64::NAN);
        assert_eq!(bad_ratio.device_region(), (1, 1, 2, 2));
    }

    #[test]
    fn test_crop_region_pixels() {
        let source = two_tone();
        let rect = ElementRect::new(8.0, 0.0, 4.0, 2.0, 1.0);

        let crop = decode(&crop_region(&source, &rect).expect("crop").expect("some"));
        assert_eq!(crop.dimensions(), (4, 2));
        assert_eq!(crop.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(crop.get_pixel(3, 1), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_crop_region_applies_pixel_ratio() {
        let source = two_tone();
        // CSS (5, 0, 5x5) at ratio 2 covers device x 10..20.
        let rect = ElementRect::new(5.0, 0.0, 5.0, 5.0, 2.0);

        let crop = decode(&crop_region(&source, &rect).expect("crop").expect("some"));
        assert_eq!(crop.dimensions(), (10, 10));
        assert_eq!(crop.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_crop_outside_source_is_transparent() {
        let source = two_tone();
        let rect = ElementRect::new(18.0, 8.0, 4.0, 4.0, 1.0);

        let crop = decode(&crop_region(&source, &rect).expect("crop").expect("some"));
        assert_eq!(crop.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(crop.get_pixel(3, 3), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_crop_all_maps_missing_and_empty_to_none() {
        let mut measurements = Measurements::new();
        measurements.insert("#present".to_string(), Some(ElementRect::new(0.0, 0.0, 2.0, 2.0, 1.0)));
        measurements.insert("#absent".to_string(), None);
        measurements.insert("#hidden".to_string(), Some(ElementRect::new(0.0, 0.0, 0.0, 5.0, 1.0)));

        let images = crop_capture(&png_data_url(&two_tone()), &measurements).expect("crop");
        assert_eq!(images.len(), 3);
        assert!(images["#present"].as_deref().is_some_and(|url| url.starts_with("data:image/png;base64,")));
        assert_eq!(images["#absent"], None);
        assert_eq!(images["#hidden"], None);
    }

    #[test]
    fn test_undecodable_capture() {
        let err = crop_capture("data:image/png;base64,AAAA", &Measurements::new()).unwrap_err();
        assert_eq!(err.reason(), LOAD_FAILED);

        let err = crop_capture("not a data url", &Measurements::new()).unwrap_err();
        assert_eq!(err.reason(), LOAD_FAILED);
    }
}
