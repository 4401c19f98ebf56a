//! Math utilities
//!
//! Re-exports glam for the vector/matrix types the frame graph and
//! components use.

pub use glam::*;
