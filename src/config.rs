use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};

/// Main configuration for the raw-tracks compositor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Locations of the external tools
    pub tools: ToolsConfig,

    /// Track analysis settings
    pub analysis: AnalysisConfig,

    /// Per-track normalization settings
    pub normalize: NormalizeConfig,

    /// Schedule and segmented render settings
    pub composite: CompositeConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        self.normalize.validate()?;
        self.composite.validate()?;
        Ok(())
    }
}

/// External tool locations
///
/// Bare names are looked up on `PATH`, anything containing a path separator
/// is used as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,

    /// Frame compositor that turns a batch state sequence plus raw inputs into raw output frames
    pub compositor: PathBuf,

    /// Program that authors the per-frame state sequence from the schedule artifact
    pub batch_runner: PathBuf,

    /// Leading arguments for the batch runner (usually its script path)
    pub batch_runner_args: Vec<String>,

    /// Program that encodes a raw output sequence into a compressed clip
    pub sequence_encoder: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            compositor: PathBuf::from("vcsrender"),
            batch_runner: PathBuf::from("node"),
            batch_runner_args: vec!["vcs-batch-runner.js".to_string()],
            sequence_encoder: PathBuf::from("convert_yuvseq_to_movie.sh"),
        }
    }
}

/// Track analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum spacing between samples that counts as a gap (seconds)
    pub min_gap_duration_secs: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_gap_duration_secs: 0.5,
        }
    }
}

impl AnalysisConfig {
    fn validate(&self) -> Result<()> {
        if !(self.min_gap_duration_secs > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "analysis.min_gap_duration_secs".to_string(),
                value: self.min_gap_duration_secs.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Track normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub video_codec: String,
    pub video_bitrate: String,
    pub audio_codec: String,
    pub audio_bitrate: String,

    /// Color of the synthesized gap filler clips
    pub filler_color: String,

    /// Frame rate used when a track does not report a usable one
    pub default_frame_rate: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            video_bitrate: "5000k".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "256k".to_string(),
            filler_color: "black".to_string(),
            default_frame_rate: 30.0,
        }
    }
}

impl NormalizeConfig {
    fn validate(&self) -> Result<()> {
        if !(self.default_frame_rate > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "normalize.default_frame_rate".to_string(),
                value: self.default_frame_rate.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Schedule and segmented render configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// Output frame rate
    pub fps: u32,

    pub output_width: u32,
    pub output_height: u32,

    /// Length of one render window (seconds)
    pub window_secs: f64,

    /// Hard cap on simultaneous video inputs
    pub max_video_slots: usize,

    /// First numeric id handed to video inputs
    pub video_input_base_id: u32,

    pub composition_id: String,

    /// Free space required on the work volume before a run starts (MB)
    pub min_free_space_mb: u64,

    /// Directory holding normalized per-track assets, reused between runs
    pub cache_dir: PathBuf,

    /// Parent of the per-run temporary directory (system temp dir if unset)
    pub work_dir: Option<PathBuf>,

    /// Keep the per-run temporary directory after the run
    pub keep_work_dir: bool,

    /// Parameters stored on frame 0 of the schedule
    pub initial_params: Map<String, Value>,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        let mut initial_params = Map::new();
        initial_params.insert("mode".to_string(), Value::from("grid"));
        initial_params.insert(
            "videoSettings.showParticipantLabels".to_string(),
            Value::from(true),
        );

        Self {
            fps: 30,
            output_width: 1280,
            output_height: 720,
            window_secs: 20.0,
            max_video_slots: 20,
            video_input_base_id: 1001,
            composition_id: "daily:baseline".to_string(),
            min_free_space_mb: 4000,
            cache_dir: PathBuf::from("video-cache"),
            work_dir: None,
            keep_work_dir: false,
            initial_params,
        }
    }
}

impl CompositeConfig {
    fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "composite.fps".to_string(),
                value: self.fps.to_string(),
            }
            .into());
        }

        if self.output_width == 0 || self.output_height == 0 {
            return Err(ConfigError::InvalidValue {
                key: "composite.output_size".to_string(),
                value: format!("{}x{}", self.output_width, self.output_height),
            }
            .into());
        }

        if (self.window_secs * self.fps as f64).round() < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "composite.window_secs".to_string(),
                value: self.window_secs.to_string(),
            }
            .into());
        }

        if self.max_video_slots == 0 {
            return Err(ConfigError::InvalidValue {
                key: "composite.max_video_slots".to_string(),
                value: self.max_video_slots.to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Number of output frames covered by one render window
    pub fn frames_per_window(&self) -> u64 {
        (self.window_secs * self.fps as f64).round() as u64
    }
}
