mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{BackendInfo, DetectorBackend};
pub use backends::{HiVisBackend, StubBackend};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection, DetectionSummary, PpeClass};
