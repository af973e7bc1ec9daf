//! Spatial algebra, per-tick storage, diagnostics and timing helpers.

pub mod allocator;
pub mod logging;
pub mod profiling;
pub mod registry;
pub mod spatial;

pub use allocator::{TickArena, TickHandle};
pub use registry::Registry;
pub use spatial::{SpatialMat, SpatialTransform, SpatialVec};
