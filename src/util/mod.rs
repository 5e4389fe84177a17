//! Utility types shared by the streaming engine.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`Chrono`] and [`Bounds`] plus math re-exports from glam

mod error;
mod math;

pub use error::*;
pub use math::*;
