use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{Config, NormalizeConfig};
use crate::error::{Result, TrackError};
use crate::probe::MediaProbe;
use crate::tools::ffmpeg::{concat_list, VideoEncoding};
use crate::tools::{Ffmpeg, Ffprobe, ToolRunner};
use crate::track::analyzer::{TrackAnalysis, TrackAnalyzer};
use crate::track::segments::{reconstruct_segments, SegmentKind};

/// Names of the assets produced for one raw track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Video,
    Audio,
    /// Normalized video and audio of one participant in a single container
    Combined,
}

impl AssetKind {
    fn suffix(self) -> &'static str {
        match self {
            Self::Video => "_normalized.m4v",
            Self::Audio => "_normalized.aac",
            Self::Combined => "_combined.mp4",
        }
    }
}

/// File-name stem used to label a track in asset names and tool contexts
pub fn track_label(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "track".to_string())
}

/// Where the `kind` asset for `input` lives inside `dir`
pub fn asset_path(dir: &Path, input: &Path, kind: AssetKind) -> PathBuf {
    dir.join(format!("{}{}", track_label(input), kind.suffix()))
}

/// One normalized track
#[derive(Debug, Clone)]
pub struct NormalizedTrack {
    pub input: PathBuf,
    pub output: PathBuf,
    pub analysis: TrackAnalysis,
}

/// Result of normalizing a group of tracks
#[derive(Debug, Clone, Default)]
pub struct NormalizedOutputs {
    pub tracks: Vec<NormalizedTrack>,
    /// Set when the group held both a video and an audio track
    pub combined: Option<PathBuf>,
}

/// Turns raw, gappy single-stream tracks into continuous files aligned to time 0
pub struct TrackNormalizer {
    runner: Arc<dyn ToolRunner>,
    ffmpeg: Ffmpeg,
    probe: MediaProbe,
    analyzer: TrackAnalyzer,
    config: NormalizeConfig,
    scratch_parent: Option<PathBuf>,
}

impl TrackNormalizer {
    pub fn new(runner: Arc<dyn ToolRunner>, config: &Config) -> Self {
        let probe = MediaProbe::new(runner.clone(), Ffprobe::new(&config.tools.ffprobe));
        let analyzer = TrackAnalyzer::new(config.analysis.min_gap_duration_secs)
            .with_default_frame_rate(config.normalize.default_frame_rate);

        Self {
            runner,
            ffmpeg: Ffmpeg::new(&config.tools.ffmpeg),
            probe,
            analyzer,
            config: config.normalize.clone(),
            scratch_parent: None,
        }
    }

    /// Create per-track scratch directories under `dir` instead of the system temp dir
    pub fn with_scratch_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.scratch_parent = Some(dir.into());
        self
    }

    pub fn probe(&self) -> &MediaProbe {
        &self.probe
    }

    pub async fn analyze(&self, input: &Path) -> Result<TrackAnalysis> {
        let context = format!("analyze_{}", track_label(input));
        self.analyzer.analyze_file(&self.probe, &context, input).await
    }

    /// Delay an audio track by its start time so it begins at time 0
    pub async fn normalize_audio(
        &self,
        label: &str,
        analysis: &TrackAnalysis,
        input: &Path,
        output: &Path,
    ) -> Result<()> {
        let path = input.display().to_string();
        if analysis.is_video {
            return Err(TrackError::NotAudio { path }.into());
        }
        let start_time = analysis
            .start_time
            .ok_or(TrackError::MissingStartTime { path })?;

        let delay_ms = (start_time * 1000.0).floor().max(0.0) as u64;
        debug!(label, delay_ms, "Delaying audio track");

        let invocation = self.ffmpeg.delay_audio(
            &format!("audio_{}", label),
            input,
            delay_ms,
            &self.config.audio_codec,
            &self.config.audio_bitrate,
            output,
        );
        self.runner.run(&invocation).await?;
        Ok(())
    }

    /// Rebuild a video track as source pieces and filler clips, joined in order
    ///
    /// Intermediates live in a scratch directory that is removed whether or
    /// not the final join succeeds.
    pub async fn normalize_video(
        &self,
        label: &str,
        analysis: &TrackAnalysis,
        input: &Path,
        output: &Path,
    ) -> Result<()> {
        let path = input.display().to_string();
        if !analysis.is_video {
            return Err(TrackError::NotVideo { path }.into());
        }
        let start_time = analysis
            .start_time
            .ok_or_else(|| TrackError::MissingStartTime { path: path.clone() })?;
        if !(analysis.end_time > 0.0) {
            return Err(TrackError::MissingEndTime { path }.into());
        }
        let size = analysis
            .video_size
            .filter(|s| s.is_valid())
            .ok_or(TrackError::MissingVideoSize { path })?;

        let encoding = VideoEncoding {
            frame_rate: analysis.frame_rate.unwrap_or(self.config.default_frame_rate),
            codec: self.config.video_codec.clone(),
            bitrate: self.config.video_bitrate.clone(),
        };
        let segments = reconstruct_segments(analysis.end_time, &analysis.gaps);

        let scratch = self.scratch_dir(label)?;
        let full = scratch.path().join(format!("{}_full.m4v", label));

        info!(
            label,
            segments = segments.len(),
            "Normalizing video track to {}x{} @ {}fps",
            size.w,
            size.h,
            encoding.frame_rate
        );

        let invocation =
            self.ffmpeg
                .transcode_video(&format!("convert_{}", label), input, size, &encoding, &full);
        self.runner.run(&invocation).await?;

        let mut pieces = Vec::with_capacity(segments.len());
        for (i, segment) in segments.iter().enumerate() {
            let piece = scratch.path().join(format!("{}_seg{}.m4v", label, i));
            let duration = segment.rounded_duration();

            let invocation = match segment.kind {
                SegmentKind::Gap => self.ffmpeg.filler_clip(
                    &format!("rendergap_{}_{}", i, label),
                    &self.config.filler_color,
                    size,
                    duration,
                    &encoding,
                    &piece,
                ),
                // the transcoded file's own timeline starts at the stream start time
                SegmentKind::Source => self.ffmpeg.extract_range(
                    &format!("extractseg_{}_{}", i, label),
                    &full,
                    segment.start - start_time,
                    duration,
                    &piece,
                ),
            };
            self.runner.run(&invocation).await?;
            pieces.push(piece);
        }

        let list_file = scratch.path().join(format!("{}_concat.txt", label));
        tokio::fs::write(&list_file, concat_list(&pieces)).await?;

        let invocation = self
            .ffmpeg
            .concat(&format!("concat_{}", label), &list_file, output);
        self.runner.run(&invocation).await?;

        if let Err(e) = scratch.close() {
            warn!(label, "Failed to remove normalization scratch directory: {}", e);
        }
        Ok(())
    }

    /// Put a participant's normalized video and audio into one file
    pub async fn combine(&self, label: &str, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        let invocation = self
            .ffmpeg
            .mux(&format!("combine_{}", label), video, audio, output);
        self.runner.run(&invocation).await?;
        Ok(())
    }

    /// Analyze and normalize one track into `output_dir`
    pub async fn normalize_file(&self, input: &Path, output_dir: &Path) -> Result<NormalizedTrack> {
        let label = track_label(input);
        let analysis = self.analyze(input).await?;

        let output = if analysis.is_video {
            let output = asset_path(output_dir, input, AssetKind::Video);
            self.normalize_video(&label, &analysis, input, &output).await?;
            output
        } else {
            let output = asset_path(output_dir, input, AssetKind::Audio);
            self.normalize_audio(&label, &analysis, input, &output).await?;
            output
        };

        info!(input = %input.display(), output = %output.display(), "Normalized track");
        Ok(NormalizedTrack {
            input: input.to_path_buf(),
            output,
            analysis,
        })
    }

    /// Normalize every input; a video plus an audio track also get combined
    pub async fn normalize_files(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<NormalizedOutputs> {
        tokio::fs::create_dir_all(output_dir).await?;

        let mut outputs = NormalizedOutputs::default();
        for input in inputs {
            outputs.tracks.push(self.normalize_file(input, output_dir).await?);
        }

        let video = outputs.tracks.iter().find(|t| t.analysis.is_video);
        let audio = outputs.tracks.iter().find(|t| !t.analysis.is_video);
        if let (Some(video), Some(audio)) = (video, audio) {
            let combined = asset_path(output_dir, &video.input, AssetKind::Combined);
            self.combine(&track_label(&video.input), &video.output, &audio.output, &combined)
                .await?;
            outputs.combined = Some(combined);
        }

        Ok(outputs)
    }

    fn scratch_dir(&self, label: &str) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("normalize_{}_", label);
        builder.prefix(&prefix);
        // concat list entries resolve relative to the list file, so keep them absolute
        let dir = match &self.scratch_parent {
            Some(parent) if parent.is_absolute() => builder.tempdir_in(parent)?,
            Some(parent) => builder.tempdir_in(std::env::current_dir()?.join(parent))?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}
