//! Utility helpers: handles and arenas, math extensions, polynomials, buffers, logging.

pub mod allocator;
pub mod buffered;
pub mod logging;
pub mod math;
pub mod polynomial;
pub mod profiling;

pub use allocator::{Arena, EntityId, GenerationalId, IdAllocator};
pub use buffered::BufferedValue;
pub use polynomial::{LinearMotion, Polynomial};
