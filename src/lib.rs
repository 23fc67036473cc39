//! # Raw-Tracks Compositor
//!
//! Rebuild gap-free tracks from raw conferencing captures and composite them
//! into one frame-accurate video.
//!
//! Raw per-participant tracks start at different times and carry holes wherever
//! a camera or microphone was paused. This library measures those holes,
//! rebuilds each track as a continuous asset on the session timeline, schedules
//! the video tracks into compositor slots and renders the session in
//! fixed-length windows.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use rawtracks_compositor::{
//!     composition::CompositionEngine,
//!     config::Config,
//!     manifest::SessionManifest,
//!     tools::ProcessRunner,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let manifest = SessionManifest::load(Path::new("raw-tracks-manifest.json"))?;
//! let engine = CompositionEngine::new(Config::default(), Arc::new(ProcessRunner::new()));
//!
//! let result = engine
//!     .compose(&manifest, Some(Path::new("session.mp4")))
//!     .await?;
//! println!("{} frames in {} windows", result.duration_in_frames, result.windows_rendered);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`probe`] - Streaming parser for the probe tool's record output
//! - [`track`] - Track analysis, gap reconstruction and normalization
//! - [`schedule`] - Video input ids and the per-frame slot schedule
//! - [`render`] - Windowed rendering and final output assembly
//! - [`composition`] - Main composition engine
//! - [`manifest`] - Session manifests of raw tracks
//! - [`tools`] - External tool invocations behind the [`ToolRunner`](tools::ToolRunner) seam
//! - [`config`] - Configuration management
//!
//! ## Analyzing a Single Track
//!
//! ```rust,no_run
//! use rawtracks_compositor::probe::parse;
//! use rawtracks_compositor::track::{reconstruct_segments, TrackAnalyzer};
//!
//! # fn main() -> anyhow::Result<()> {
//! let dump = std::fs::read_to_string("track.ffprobe.txt")?;
//! let analysis = TrackAnalyzer::default().analyze(&parse(&dump)?)?;
//!
//! for segment in reconstruct_segments(analysis.end_time, &analysis.gaps) {
//!     println!("{:?} {:.3} - {:.3}", segment.kind, segment.start, segment.end);
//! }
//! # Ok(())
//! # }
//! ```

pub mod composition;
pub mod config;
pub mod error;
pub mod manifest;
pub mod preflight;
pub mod probe;
pub mod render;
pub mod schedule;
pub mod tools;
pub mod track;

// Re-export commonly used types for convenience
pub use crate::{
    composition::CompositionEngine,
    config::Config,
    error::{CompositorError, Result},
    manifest::SessionManifest,
};
