use anyhow::Result;

use crate::detect::result::Detection;
use crate::settings::Thresholds;

/// Detector backend trait.
///
/// A backend receives one scaled RGB frame per call and returns the
/// detections that survive the supplied thresholds: confidence filtering
/// first, then non-max suppression at the IoU threshold.
///
/// Implementations must treat the pixel slice as read-only and ephemeral.
/// A failed inference is a per-frame condition, not a process-level one:
/// callers log it and skip the frame.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Input dimensions (width, height) this backend expects, derived
    /// from the loaded model's declared input shape.
    fn input_size(&self) -> (u32, u32);

    /// Run detection on a frame already scaled to `input_size()`.
    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        thresholds: Thresholds,
    ) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
