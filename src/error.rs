use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the raw-tracks compositor
///
/// Every variant maps to a stable process exit code through
/// [`CompositorError::exit_code`]:
///
/// | Code | Meaning |
/// |------|---------|
/// | 0 | success |
/// | 1 | missing required input |
/// | 2 | invalid manifest |
/// | 3 | external tool failure |
/// | 4 | missing required external tool |
/// | 5 | insufficient disk space |
/// | 6 | invalid input media |
/// | 7 | internal inconsistency |
/// | 8 | no usable video content |
/// | 9 | configuration error |
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Probe data error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Track error: {0}")]
    Track(#[from] TrackError),

    #[error("External tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while reading the bracketed record stream of the probe tool
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("record {marker} is missing its closing marker")]
    MalformedRecord { marker: String },

    #[error("unsupported data in probe output: {excerpt}")]
    UnsupportedData { excerpt: String },
}

/// Track validation and normalizer precondition errors
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Invalid input file: {reason}")]
    InvalidInputFile { reason: String },

    #[error("Expected a video track: {path}")]
    NotVideo { path: String },

    #[error("Expected an audio track: {path}")]
    NotAudio { path: String },

    #[error("Track has no start time: {path}")]
    MissingStartTime { path: String },

    #[error("Track has no positive end time: {path}")]
    MissingEndTime { path: String },

    #[error("Track has no valid video size: {path}")]
    MissingVideoSize { path: String },
}

/// External tool invocation errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{tool} ({context}) exited with {status}")]
    Failed {
        tool: String,
        context: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to spawn {tool} ({context}): {reason}")]
    Spawn {
        tool: String,
        context: String,
        reason: String,
    },

    #[error("Required tool not found: {tool}")]
    NotFound { tool: String },

    #[error("Unexpected output from {tool} ({context}): '{output}'")]
    UnexpectedOutput {
        tool: String,
        context: String,
        output: String,
    },
}

/// Slot scheduling errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Video slot limit of {max} reached, cannot add input for {participant}")]
    SlotCapExceeded { max: usize, participant: String },

    #[error("Internal inconsistency: no video input for id {id}")]
    UnresolvedInput { id: u32 },
}

/// Segmented render errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Window {window} decoded {observed} of {requested} frames")]
    PartialDecode {
        window: usize,
        requested: u64,
        observed: u64,
    },

    #[error("No render window produced any output")]
    NothingRendered,
}

/// Session manifest errors
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest not found: {path}")]
    NotFound { path: String },

    #[error("Invalid manifest {path}: {reason}")]
    Invalid { path: String, reason: String },

    #[error("Track file not found: {path}")]
    MissingTrackFile { path: PathBuf },

    #[error("Multiple {media_type} tracks for participant {participant}")]
    DuplicateTrack {
        participant: String,
        media_type: String,
    },

    #[error("No video content: {reason}")]
    NoVideoContent { reason: String },
}

/// Resource exhaustion errors
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Need at least {required_mb} MB free on {path}, have {available_mb} MB")]
    InsufficientDiskSpace {
        path: String,
        required_mb: u64,
        available_mb: u64,
    },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using CompositorError
pub type Result<T> = std::result::Result<T, CompositorError>;

impl CompositorError {
    /// Process exit code for this error, see the table on [`CompositorError`]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Manifest(ManifestError::NotFound { .. })
            | Self::Manifest(ManifestError::MissingTrackFile { .. }) => 1,
            Self::Manifest(ManifestError::NoVideoContent { .. }) => 8,
            Self::Manifest(_) => 2,
            Self::Tool(ToolError::NotFound { .. }) => 4,
            Self::Tool(_) => 3,
            Self::Resource(_) | Self::Schedule(ScheduleError::SlotCapExceeded { .. }) => 5,
            Self::Probe(_) | Self::Track(_) => 6,
            Self::Schedule(ScheduleError::UnresolvedInput { .. }) => 7,
            Self::Render(RenderError::NothingRendered) => 8,
            Self::Render(RenderError::PartialDecode { .. }) => 3,
            Self::Config(_) => 9,
            Self::Io(_) | Self::Json(_) => 1,
        }
    }

    /// Whether the run can continue past this error
    ///
    /// Only the slot cap and a window's partial decode are local failures,
    /// everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Schedule(ScheduleError::SlotCapExceeded { .. })
                | Self::Render(RenderError::PartialDecode { .. })
        )
    }

    /// Captured (stdout, stderr) of a failed external tool, if any
    pub fn tool_output(&self) -> Option<(&str, &str)> {
        match self {
            Self::Tool(ToolError::Failed { stdout, stderr, .. }) => {
                Some((stdout.as_str(), stderr.as_str()))
            }
            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Tool(ToolError::NotFound { tool }) => {
                format!("Required tool '{}' is not available. Install it or set its path in the [tools] config section.", tool)
            }
            Self::Manifest(ManifestError::NotFound { path }) => {
                format!("Raw tracks manifest '{}' not found.", path)
            }
            Self::Resource(ResourceError::InsufficientDiskSpace { required_mb, .. }) => {
                format!("You need at least {} megabytes of disk space on this volume.", required_mb)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_category() {
        let missing_input: CompositorError = ManifestError::NotFound { path: "m.json".into() }.into();
        let invalid_manifest: CompositorError = ManifestError::Invalid {
            path: "m.json".into(),
            reason: "no participants".into(),
        }
        .into();
        let tool_failure: CompositorError = ToolError::Failed {
            tool: "ffmpeg".into(),
            context: "concat".into(),
            status: "exit status: 1".into(),
            stdout: String::new(),
            stderr: "boom".into(),
        }
        .into();
        let missing_tool: CompositorError = ToolError::NotFound { tool: "ffprobe".into() }.into();
        let disk: CompositorError = ResourceError::InsufficientDiskSpace {
            path: "/tmp".into(),
            required_mb: 4000,
            available_mb: 10,
        }
        .into();

        let codes = [
            missing_input.exit_code(),
            invalid_manifest.exit_code(),
            tool_failure.exit_code(),
            missing_tool.exit_code(),
            disk.exit_code(),
        ];
        assert_eq!(codes, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_inconsistency_and_invalid_media_codes() {
        let unresolved: CompositorError = ScheduleError::UnresolvedInput { id: 1999 }.into();
        assert_eq!(unresolved.exit_code(), 7);
        assert!(!unresolved.is_recoverable());

        let malformed: CompositorError = ProbeError::MalformedRecord { marker: "[FRAME]".into() }.into();
        assert_eq!(malformed.exit_code(), 6);
    }

    #[test]
    fn test_local_failures_are_recoverable() {
        let cap: CompositorError = ScheduleError::SlotCapExceeded {
            max: 20,
            participant: "p".into(),
        }
        .into();
        assert!(cap.is_recoverable());

        let partial: CompositorError = RenderError::PartialDecode {
            window: 3,
            requested: 600,
            observed: 1,
        }
        .into();
        assert!(partial.is_recoverable());
    }

    #[test]
    fn test_tool_output_is_exposed() {
        let err: CompositorError = ToolError::Failed {
            tool: "ffmpeg".into(),
            context: "mix".into(),
            status: "exit status: 1".into(),
            stdout: "out".into(),
            stderr: "err".into(),
        }
        .into();
        assert_eq!(err.tool_output(), Some(("out", "err")));
    }
}
