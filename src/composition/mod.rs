//! # Composition Engine
//!
//! The composition engine coordinates track normalization, slot scheduling and
//! segmented rendering to turn one recording session into a single video.

pub mod engine;

// Re-exports for convenience
pub use engine::{CompositionEngine, CompositionOutput};
