//! Camera session.
//!
//! `CameraSession` is the one capture+detection session in the process,
//! constructed explicitly by the daemon and shared by reference with the
//! control API. It owns two threads:
//!
//! - capture: source -> frame ring (never blocked; ring drops oldest)
//! - processing: ring -> scale -> detect -> overlay -> preview state
//!
//! The processing thread is the only writer of `PreviewState`. Startup
//! failures (no device, access denied, model missing) set the status
//! string and leave the preview frameless instead of crashing; per-frame
//! scaling or inference failures skip that frame's overlay while the raw
//! frame still reaches the preview.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use serde::Serialize;

use crate::detect::BackendRegistry;
use crate::frame::{FrameRing, RawFrame};
use crate::ingest::{CameraConfig, CameraSource};
use crate::overlay::{OverlaySet, Viewport};
use crate::scale::FrameScaler;
use crate::settings::ThresholdStore;

const POP_TIMEOUT: Duration = Duration::from_millis(250);

/// Latest displayable frame, RGB24.
#[derive(Clone)]
pub struct PreviewFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PreviewFrame {
    /// Expand to RGBA for overlay drawing and PNG encoding.
    pub fn to_rgba(&self) -> RgbaImage {
        let mut img = RgbaImage::new(self.width, self.height);
        for (i, pixel) in img.pixels_mut().enumerate() {
            let base = i * 3;
            *pixel = Rgba([
                self.data[base],
                self.data[base + 1],
                self.data[base + 2],
                255,
            ]);
        }
        img
    }
}

/// Pipeline counters surfaced through /status.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SessionCounters {
    pub frames_captured: u64,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub scale_failures: u64,
    pub inference_failures: u64,
    pub detections_last_pass: usize,
    pub last_inference_ms: Option<f64>,
}

/// Shared preview state. Written by the processing thread, read by the
/// control API.
pub struct PreviewState {
    pub frame: Option<PreviewFrame>,
    pub overlay: Option<OverlaySet>,
    pub status: String,
    pub source_healthy: bool,
    pub counters: SessionCounters,
}

impl PreviewState {
    fn new() -> Self {
        Self {
            frame: None,
            overlay: None,
            status: "camera init".to_string(),
            source_healthy: false,
            counters: SessionCounters::default(),
        }
    }

    /// Latest frame with the current overlay rendered onto it.
    pub fn annotated_rgba(&self) -> Option<RgbaImage> {
        let frame = self.frame.as_ref()?;
        let mut img = frame.to_rgba();
        if let Some(overlay) = &self.overlay {
            overlay.render_onto(&mut img);
        }
        Some(img)
    }
}

/// The single camera+detection session.
pub struct CameraSession {
    camera: CameraConfig,
    store: Arc<ThresholdStore>,
    registry: Arc<BackendRegistry>,
    ring: Arc<FrameRing>,
    preview: Arc<Mutex<PreviewState>>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl CameraSession {
    pub fn new(
        camera: CameraConfig,
        store: Arc<ThresholdStore>,
        registry: Arc<BackendRegistry>,
    ) -> Self {
        Self {
            camera,
            store,
            registry,
            ring: Arc::new(FrameRing::new()),
            preview: Arc::new(Mutex::new(PreviewState::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    /// Shared preview state handle for the control API.
    pub fn preview_handle(&self) -> Arc<Mutex<PreviewState>> {
        self.preview.clone()
    }

    pub fn thresholds(&self) -> Arc<ThresholdStore> {
        self.store.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty() && !self.shutdown.load(Ordering::SeqCst)
    }

    /// Probe the device, prepare the detector, and start both pipeline
    /// threads.
    ///
    /// Device failures abort startup (no capture is attempted) and leave
    /// the failure in the status string. A missing detector is not fatal:
    /// the preview runs without overlays and the status says why.
    pub fn start(&mut self) -> Result<()> {
        let mut source = match self.open_source() {
            Ok(source) => source,
            Err(err) => {
                let message = format!("camera unavailable: {err:#}");
                log::error!("{}", message);
                self.set_status(&message);
                return Err(err);
            }
        };

        let scaler = match self.prepare_detector() {
            Ok(scaler) => {
                self.set_status("live");
                Some(scaler)
            }
            Err(err) => {
                let message = format!("detector unavailable: {err:#}");
                log::warn!("{}; preview runs without detection", message);
                self.set_status(&message);
                None
            }
        };

        let fps = self.camera.target_fps.max(1);
        let frame_pause = Duration::from_millis(u64::from(1000 / fps));

        let ring = self.ring.clone();
        let preview = self.preview.clone();
        let shutdown = self.shutdown.clone();
        let capture = std::thread::Builder::new()
            .name("lookout-capture".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    match source.next_frame() {
                        Ok(frame) => {
                            ring.push(frame);
                            let stats = source.stats();
                            let mut state =
                                preview.lock().expect("preview state lock poisoned");
                            state.counters.frames_captured = stats.frames_captured;
                            state.source_healthy = source.is_healthy();
                        }
                        Err(err) => {
                            log::warn!("frame capture failed: {:#}", err);
                            let mut state =
                                preview.lock().expect("preview state lock poisoned");
                            state.source_healthy = false;
                            drop(state);
                            std::thread::sleep(POP_TIMEOUT);
                        }
                    }
                    std::thread::sleep(frame_pause);
                }
                ring.close();
            })
            .context("spawn capture thread")?;
        self.handles.push(capture);

        let ring = self.ring.clone();
        let preview = self.preview.clone();
        let shutdown = self.shutdown.clone();
        let store = self.store.clone();
        let registry = self.registry.clone();
        let processing = std::thread::Builder::new()
            .name("lookout-process".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    let Some(frame) = ring.pop(POP_TIMEOUT) else {
                        if ring.is_closed() {
                            break;
                        }
                        continue;
                    };
                    process_frame(frame, scaler.as_ref(), &registry, &store, &preview, &ring);
                }
            })
            .context("spawn processing thread")?;
        self.handles.push(processing);

        Ok(())
    }

    /// Signal shutdown and join both threads.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.ring.close();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("pipeline thread panicked during shutdown");
            }
        }
    }

    fn open_source(&self) -> Result<CameraSource> {
        let source = CameraSource::new(self.camera.clone())?;
        source.probe()?;
        let mut source = source;
        source.connect()?;
        Ok(source)
    }

    fn prepare_detector(&self) -> Result<FrameScaler> {
        self.registry.warm_up()?;
        let input_size = self.registry.input_size()?;
        FrameScaler::new(input_size)
    }

    fn set_status(&self, status: &str) {
        let mut state = self.preview.lock().expect("preview state lock poisoned");
        state.status = status.to_string();
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.stop();
        }
    }
}

/// Run one frame through scale -> detect -> overlay and publish it.
fn process_frame(
    frame: RawFrame,
    scaler: Option<&FrameScaler>,
    registry: &BackendRegistry,
    store: &ThresholdStore,
    preview: &Mutex<PreviewState>,
    ring: &FrameRing,
) {
    let viewport = Viewport::new(frame.width, frame.height);
    let mut overlay = OverlaySet::empty(viewport);
    let mut scale_failed = false;
    let mut inference_failed = false;
    let mut latency_ms = None;

    if let Some(scaler) = scaler {
        match scaler.scale(&frame) {
            Ok(scaled) => {
                let thresholds = store.snapshot();
                let started = Instant::now();
                match registry.detect(scaled.pixels(), scaled.width, scaled.height, thresholds) {
                    Ok(detections) => {
                        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                        latency_ms = Some(elapsed);
                        log::debug!(
                            "inference completed in {:.1} ms ({} detections, conf>={:.2} iou={:.2})",
                            elapsed,
                            detections.len(),
                            thresholds.confidence,
                            thresholds.iou
                        );
                        overlay = OverlaySet::build(&detections, viewport);
                    }
                    Err(err) => {
                        inference_failed = true;
                        log::warn!(
                            "inference failed, skipping frame {}: {:#}",
                            frame.seq,
                            err
                        );
                    }
                }
            }
            Err(err) => {
                scale_failed = true;
                log::warn!(
                    "frame scaling failed, skipping inference for frame {}: {:#}",
                    frame.seq,
                    err
                );
            }
        }
    }

    let detections_last_pass = overlay.len();
    let (width, height) = (frame.width, frame.height);
    let data = frame.into_pixels();

    let mut state = preview.lock().expect("preview state lock poisoned");
    state.frame = Some(PreviewFrame {
        data,
        width,
        height,
    });
    state.overlay = Some(overlay);
    state.counters.frames_processed += 1;
    state.counters.frames_dropped = ring.dropped();
    state.counters.detections_last_pass = detections_last_pass;
    if scale_failed {
        state.counters.scale_failures += 1;
    }
    if inference_failed {
        state.counters.inference_failures += 1;
    }
    if latency_ms.is_some() {
        state.counters.last_inference_ms = latency_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, DetectorBackend, StubBackend};
    use crate::ingest::CameraConfig;
    use crate::settings::Thresholds;
    use anyhow::anyhow;

    fn stub_session(device: &str) -> CameraSession {
        let store = Arc::new(ThresholdStore::new(0.0, 60.0).unwrap());
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());
        CameraSession::new(
            CameraConfig {
                device: device.to_string(),
                target_fps: 30,
                width: 64,
                height: 48,
            },
            store,
            Arc::new(registry),
        )
    }

    fn wait_for_frames(preview: &Arc<Mutex<PreviewState>>, count: u64) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            {
                let state = preview.lock().unwrap();
                if state.counters.frames_processed >= count {
                    return true;
                }
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn session_publishes_frames_and_overlays() {
        let mut session = stub_session("stub://test");
        let preview = session.preview_handle();
        session.start().unwrap();

        assert!(wait_for_frames(&preview, 3), "pipeline made no progress");
        session.stop();

        let state = preview.lock().unwrap();
        assert_eq!(state.status, "live");
        let frame = state.frame.as_ref().expect("preview frame published");
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert!(state.overlay.is_some());
        assert!(state.counters.frames_captured >= 3);
        // Stub detections fire on changing synthetic frames after the first.
        assert!(state.counters.last_inference_ms.is_some());
    }

    #[test]
    fn session_without_detector_still_previews() {
        let store = Arc::new(ThresholdStore::default());
        let registry = Arc::new(BackendRegistry::new());
        let mut session = CameraSession::new(
            CameraConfig {
                device: "stub://bare".to_string(),
                target_fps: 30,
                width: 32,
                height: 32,
            },
            store,
            registry,
        );
        let preview = session.preview_handle();
        session.start().unwrap();

        assert!(wait_for_frames(&preview, 2));
        session.stop();

        let state = preview.lock().unwrap();
        assert!(state.status.starts_with("detector unavailable"));
        assert!(state.frame.is_some());
        let overlay = state.overlay.as_ref().unwrap();
        assert!(overlay.is_empty());
        assert_eq!(state.counters.inference_failures, 0);
    }

    struct FailingBackend;

    impl DetectorBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn input_size(&self) -> (u32, u32) {
            (64, 64)
        }

        fn detect(
            &mut self,
            _pixels: &[u8],
            _width: u32,
            _height: u32,
            _thresholds: Thresholds,
        ) -> Result<Vec<Detection>> {
            Err(anyhow!("inference backend exploded"))
        }
    }

    #[test]
    fn inference_failure_skips_frame_but_keeps_pipeline_alive() {
        let store = Arc::new(ThresholdStore::default());
        let mut registry = BackendRegistry::new();
        registry.register(FailingBackend);
        let mut session = CameraSession::new(
            CameraConfig {
                device: "stub://failing".to_string(),
                target_fps: 30,
                width: 64,
                height: 48,
            },
            store,
            Arc::new(registry),
        );
        let preview = session.preview_handle();
        session.start().unwrap();

        assert!(wait_for_frames(&preview, 3));
        session.stop();

        let state = preview.lock().unwrap();
        // Raw frames keep reaching the preview; every pass just has no overlay.
        assert!(state.frame.is_some());
        assert!(state.overlay.as_ref().unwrap().is_empty());
        assert!(state.counters.inference_failures >= 3);
        assert!(state.counters.last_inference_ms.is_none());
    }

    #[test]
    fn startup_fails_without_capture_when_device_is_missing() {
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            let mut session = stub_session("/dev/video99");
            let preview = session.preview_handle();
            assert!(session.start().is_err());
            let state = preview.lock().unwrap();
            assert!(state.status.starts_with("camera unavailable"));
            assert!(state.frame.is_none());
            assert_eq!(state.counters.frames_processed, 0);
        }
    }

    #[test]
    fn annotated_rgba_requires_a_frame() {
        let state = PreviewState::new();
        assert!(state.annotated_rgba().is_none());
    }
}
