//! lookout - live camera object detection
//!
//! This crate wires a local camera into an object-detection model and
//! publishes an annotated preview through a small control API.
//!
//! # Architecture
//!
//! Frames flow through a fixed pipeline:
//!
//! 1. A capture thread reads frames from the configured source (`ingest`)
//!    and pushes them into a bounded ring with drop-oldest overflow
//!    (`frame::FrameRing`). The producer never blocks.
//! 2. A processing thread pops frames, scales them to the detector's input
//!    dimensions (`scale`), runs inference (`detect`), and converts the
//!    surviving detections into an overlay set (`overlay`).
//! 3. The latest frame, overlay, and counters are published as shared
//!    preview state, which the control API (`api`) serves read-only.
//!
//! Thresholds (confidence, IoU) live in a `settings::ThresholdStore`
//! written by the API and snapshotted by every detector invocation.
//!
//! # Module Structure
//!
//! - `frame`: RawFrame, ScaledFrame, FrameRing
//! - `ingest`: frame sources (V4L2 device, synthetic stub)
//! - `scale`: frame scaling to model input dimensions
//! - `detect`: detector backends, registry, NMS, labels
//! - `overlay`: normalized-box to screen-space projection and drawing
//! - `settings`: threshold store (percent in, normalized out)
//! - `session`: the single camera session owning both pipeline threads
//! - `api`: local control API (health, status, thresholds, preview)
//! - `config`: file + environment configuration

pub mod api;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod scale;
pub mod session;
pub mod settings;

pub use detect::{BackendRegistry, Detection, DetectorBackend, StubBackend};
pub use frame::{FrameRing, RawFrame, ScaledFrame, RING_CAPACITY};
pub use ingest::{CameraConfig, CameraSource, CameraStats};
pub use overlay::{OverlayLayer, OverlaySet, ScreenRect, Viewport};
pub use scale::FrameScaler;
pub use session::{CameraSession, PreviewFrame, PreviewState, SessionCounters};
pub use settings::{ThresholdStore, Thresholds};

#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
