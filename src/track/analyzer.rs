use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TrackError};
use crate::probe::{FrameSample, MediaKind, MediaProbe, ProbeOutput, StreamDescriptor};

/// Frame rate used when the stream's rational rate is missing or unusable
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Default minimum sample spacing that counts as a gap (seconds)
pub const DEFAULT_MIN_GAP_DURATION: f64 = 0.5;

/// Pixel dimensions of a video track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSize {
    pub w: u32,
    pub h: u32,
}

impl VideoSize {
    pub fn is_valid(&self) -> bool {
        self.w > 0 && self.h > 0
    }
}

/// Half-open interval `[start, end)` with no captured samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub start: f64,
    pub end: f64,
}

impl Gap {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Everything the normalizer needs to know about one raw track
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackAnalysis {
    pub is_video: bool,
    pub media_kind: MediaKind,
    pub frame_count: usize,
    /// Stream start time as reported by the probe
    pub start_time: Option<f64>,
    /// Last frame's presentation time plus its duration
    pub end_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_size: Option<VideoSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    pub gaps: Vec<Gap>,
}

/// Validates probe output for a single-stream file and derives its [`TrackAnalysis`]
#[derive(Debug, Clone)]
pub struct TrackAnalyzer {
    min_gap_duration: f64,
    default_frame_rate: f64,
}

impl Default for TrackAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_GAP_DURATION)
    }
}

impl TrackAnalyzer {
    pub fn new(min_gap_duration: f64) -> Self {
        Self {
            min_gap_duration,
            default_frame_rate: DEFAULT_FRAME_RATE,
        }
    }

    pub fn with_default_frame_rate(mut self, rate: f64) -> Self {
        self.default_frame_rate = rate;
        self
    }

    /// Probe `input` and analyze it
    pub async fn analyze_file(
        &self,
        probe: &MediaProbe,
        context: &str,
        input: &Path,
    ) -> Result<TrackAnalysis> {
        let output = probe.frames_and_streams(context, input).await?;
        let analysis = self.analyze(&output)?;

        info!(
            input = %input.display(),
            kind = %analysis.media_kind,
            frames = analysis.frame_count,
            gaps = analysis.gaps.len(),
            "Analyzed track: {:.3}s - {:.3}s",
            analysis.start_time.unwrap_or(0.0),
            analysis.end_time
        );
        Ok(analysis)
    }

    pub fn analyze(&self, output: &ProbeOutput) -> std::result::Result<TrackAnalysis, TrackError> {
        let streams = output.stream_descriptors();
        if streams.len() != 1 {
            return Err(TrackError::InvalidInputFile {
                reason: format!("expected one stream in file, got {}", streams.len()),
            });
        }
        let stream = &streams[0];

        let frames = output.frame_samples()?;
        let (first, last) = match (frames.first(), frames.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(TrackError::InvalidInputFile {
                    reason: "no frames found in file".to_string(),
                })
            }
        };

        let media_kind = stream.media_kind.clone().ok_or_else(|| TrackError::InvalidInputFile {
            reason: "stream has no media kind".to_string(),
        })?;
        if first.media_kind.as_ref() != Some(&media_kind) {
            return Err(TrackError::InvalidInputFile {
                reason: format!(
                    "first frame media kind {:?} does not match stream kind {}",
                    first.media_kind.as_ref().map(MediaKind::as_str),
                    media_kind
                ),
            });
        }

        let is_video = media_kind == MediaKind::Video;
        let (video_size, frame_rate) = if is_video {
            (max_frame_size(&frames), Some(self.frame_rate(stream)))
        } else {
            (None, None)
        };

        Ok(TrackAnalysis {
            is_video,
            media_kind,
            frame_count: frames.len(),
            start_time: stream.start_time,
            end_time: last.presentation_time + last.duration_or_zero(),
            video_size,
            frame_rate,
            gaps: detect_gaps(&frames, self.min_gap_duration),
        })
    }

    fn frame_rate(&self, stream: &StreamDescriptor) -> f64 {
        match stream.frame_rate.as_deref().and_then(parse_frame_rate) {
            Some(rate) => rate,
            None => {
                debug!(
                    reported = ?stream.frame_rate,
                    "Unusable frame rate, defaulting to {}", self.default_frame_rate
                );
                self.default_frame_rate
            }
        }
    }
}

/// Parse a rational `N/D` frame rate
///
/// Returns `None` unless both parts parse, the denominator is positive and
/// the resulting rate is positive (`0/1` parses but is not a usable rate).
pub fn parse_frame_rate(rational: &str) -> Option<f64> {
    let (num, den) = rational.trim().split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if !num.is_finite() || !den.is_finite() || den <= 0.0 {
        return None;
    }
    let rate = num / den;
    (rate > 0.0).then_some(rate)
}

/// Largest width and height over all frames
///
/// Decoders sometimes report a smaller size on leading or trailing frames.
fn max_frame_size(frames: &[FrameSample]) -> Option<VideoSize> {
    let w = frames.iter().filter_map(|f| f.width).max()?;
    let h = frames.iter().filter_map(|f| f.height).max()?;
    Some(VideoSize { w, h })
}

/// Gaps from the spacing between consecutive sample timestamps
///
/// A frame arriving at least `min_gap_duration` after the previous one opens
/// a gap from the previous frame's end to this frame's timestamp. The
/// "previous frame" of the first sample sits at time 0, so a late first
/// sample yields a leading gap.
pub fn detect_gaps(frames: &[FrameSample], min_gap_duration: f64) -> Vec<Gap> {
    let mut gaps = Vec::new();
    let mut prev: Option<&FrameSample> = None;

    for frame in frames {
        let prev_time = prev.map_or(0.0, |p| p.presentation_time);
        let interval = frame.presentation_time - prev_time;

        if interval >= min_gap_duration {
            let prev_end = prev_time + prev.map_or(0.0, FrameSample::duration_or_zero);
            gaps.push(Gap {
                start: prev_end,
                end: frame.presentation_time,
            });
        }
        prev = Some(frame);
    }

    gaps
}
