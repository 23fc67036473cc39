//! # Media Probing
//!
//! Runs the probe tool and turns its output into typed records.
//!
//! - [`parser`] - chunk-tolerant parser for the `[FRAME]` / `[STREAM]` record format
//! - [`types`] - typed records, frame samples and stream descriptors
//! - [`MediaProbe`] - the probe collaborator: frame/stream dumps, container duration, video size

pub mod parser;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{CompositorError, Result, ToolError};
use crate::tools::{Ffprobe, ToolRunner};
use crate::track::VideoSize;

pub use parser::{parse, ProbeParser};
pub use types::{FrameSample, MediaKind, ProbeOutput, ProbeRecord, ProbeValue, StreamDescriptor};

/// Largest width/height accepted from a size query
const MAX_DIMENSION: u32 = 99_999;

/// Probe collaborator backed by ffprobe
#[derive(Clone)]
pub struct MediaProbe {
    runner: Arc<dyn ToolRunner>,
    ffprobe: Ffprobe,
}

impl MediaProbe {
    pub fn new(runner: Arc<dyn ToolRunner>, ffprobe: Ffprobe) -> Self {
        Self { runner, ffprobe }
    }

    /// Per-frame and per-stream records of one file, parsed as the tool streams them out
    pub async fn frames_and_streams(&self, context: &str, input: &Path) -> Result<ProbeOutput> {
        let invocation = self.ffprobe.frames_and_streams(context, input);
        let mut parser = ProbeParser::new();

        self.runner
            .run_streaming(&invocation, &mut |chunk: &[u8]| {
                parser.feed(chunk).map_err(CompositorError::from)
            })
            .await?;

        let output = parser.finish()?;
        debug!(
            input = %input.display(),
            streams = output.streams.len(),
            frames = output.frames.len(),
            "Probed file"
        );
        Ok(output)
    }

    /// Container duration in seconds
    pub async fn format_duration(&self, context: &str, input: &Path) -> Result<f64> {
        let invocation = self.ffprobe.format_duration(context, input);
        let output = self.runner.run(&invocation).await?;
        let text = output.stdout.trim();

        text.parse::<f64>()
            .ok()
            .filter(|d| d.is_finite())
            .ok_or_else(|| {
                ToolError::UnexpectedOutput {
                    tool: invocation.tool_name(),
                    context: context.to_string(),
                    output: text.to_string(),
                }
                .into()
            })
    }

    /// Size of the first video stream
    pub async fn video_size(&self, context: &str, input: &Path) -> Result<VideoSize> {
        let invocation = self.ffprobe.video_size(context, input);
        let output = self.runner.run(&invocation).await?;
        let text = output.stdout.trim();

        parse_size(text).ok_or_else(|| {
            ToolError::UnexpectedOutput {
                tool: invocation.tool_name(),
                context: context.to_string(),
                output: text.to_string(),
            }
            .into()
        })
    }
}

/// Parse `w,h` and reject sizes outside `1..=99999`
fn parse_size(text: &str) -> Option<VideoSize> {
    let line = text.lines().next()?;
    let (w, h) = line.split_once(',')?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().trim_end_matches(',').parse().ok()?;
    let valid = 1..=MAX_DIMENSION;
    if valid.contains(&w) && valid.contains(&h) {
        Some(VideoSize { w, h })
    } else {
        None
    }
}
