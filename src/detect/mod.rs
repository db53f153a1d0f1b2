mod backend;
mod backends;
mod labels;
mod nms;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
pub use labels::{coco_labels, load_labels};
pub use nms::{iou, nms_filter};
pub use registry::BackendRegistry;
pub use result::Detection;

#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
