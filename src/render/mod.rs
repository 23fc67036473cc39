//! # Segmented Rendering
//!
//! The output timeline is cut into fixed windows. Each window extracts raw
//! frames for the inputs active in it, reconciles their lengths, and runs
//! the compositor and the sequence encoder once. The window clips are then
//! joined and the audio mixed in.

pub mod driver;
pub mod output;
pub mod window;

pub use driver::{RenderSettings, SegmentedRenderer};
pub use output::OutputAssembler;
pub use window::{
    collect_active_inputs, plan_windows, InputTimings, PlaybackEvent, Reconciled, Window,
};
