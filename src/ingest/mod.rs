//! Frame ingestion sources.
//!
//! This module provides sources for raw frames:
//! - V4L2 devices (feature: ingest-v4l2)
//! - Synthetic source (`stub://` paths, for tests and demos)
//!
//! All sources produce `RawFrame` instances that flow into the frame
//! ring. The ingestion layer is responsible for:
//! - Probing device accessibility before capture starts
//! - Negotiating RGB24 at the configured resolution and rate
//! - Assigning capture sequence numbers
//!
//! Sources own each frame only until hand-off to the ring; frames are
//! freshly allocated per capture and never retained.

pub mod camera;
#[cfg(feature = "ingest-v4l2")]
pub(crate) mod v4l2;

pub use camera::{CameraConfig, CameraSource, CameraStats};
