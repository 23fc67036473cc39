//! # Track Processing
//!
//! Per-track work, from probe output to a continuous file aligned to time 0.
//!
//! - [`analyzer`] - validation, metadata and gap detection
//! - [`segments`] - tiling the track timeline into source and gap pieces
//! - [`normalizer`] - rebuilding a track from its pieces with the external encoder

pub mod analyzer;
pub mod normalizer;
pub mod segments;

pub use analyzer::{
    detect_gaps, parse_frame_rate, Gap, TrackAnalysis, TrackAnalyzer, VideoSize,
    DEFAULT_FRAME_RATE, DEFAULT_MIN_GAP_DURATION,
};
pub use normalizer::{
    asset_path, track_label, AssetKind, NormalizedOutputs, NormalizedTrack, TrackNormalizer,
};
pub use segments::{reconstruct_segments, Segment, SegmentKind};
