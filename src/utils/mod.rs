//! Utility helpers: math extensions, the asset arena, logging and frame profiling.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod profiling;

pub use allocator::{Arena, AssetId};
pub use math::*;
