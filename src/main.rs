use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rawtracks_compositor::{
    composition::CompositionEngine,
    config::Config,
    error::CompositorError,
    manifest::SessionManifest,
    preflight,
    probe::MediaProbe,
    tools::{Ffprobe, ProcessRunner, ToolRunner},
    track::{reconstruct_segments, Gap, Segment, TrackAnalysis, TrackAnalyzer, TrackNormalizer},
};

#[derive(Parser)]
#[command(
    name = "rawtracks-compositor",
    version,
    about = "Composite raw conferencing tracks into one video",
    long_about = "Rawtracks-Compositor rebuilds gap-free tracks from raw per-participant captures, schedules the video tracks into compositor slots and renders the whole session in fixed-length windows."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Composite every track of a session manifest into one video
    Composite {
        /// Raw tracks manifest (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output video file path (left in the work directory if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Measure a single raw track and print its timeline as JSON
    Analyze {
        /// Raw track file
        #[arg(short, long)]
        input: PathBuf,

        /// Wall-clock start of the track in epoch milliseconds, adds gap timestamps to the report
        #[arg(long)]
        start_ts: Option<i64>,

        /// Minimum spacing between samples that counts as a gap (seconds)
        #[arg(long)]
        min_gap: Option<f64>,
    },

    /// Rebuild raw tracks as continuous files, muxing a video/audio pair
    Normalize {
        /// Raw track files
        #[arg(short, long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,

        /// Output directory (defaults to the first input's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a session manifest for a directory of raw track files
    Manifest {
        /// Directory holding the raw `.webm` tracks of one recording
        #[arg(short, long)]
        input: PathBuf,

        /// Manifest path (defaults to a file named after the recording inside the input directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Gap expressed on the wall clock
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GapTime {
    start: String,
    end: String,
    duration_secs: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeReport {
    #[serde(flatten)]
    analysis: TrackAnalysis,
    segments: Vec<Segment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gap_times: Option<Vec<GapTime>>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Starting Rawtracks-Compositor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner::new());

    match cli.command {
        Command::Composite { input, output } => {
            composite(config, runner, &input, output.as_deref()).await
        }
        Command::Analyze {
            input,
            start_ts,
            min_gap,
        } => analyze(config, runner, &input, start_ts, min_gap).await,
        Command::Normalize { input, output } => {
            normalize(config, runner, &input, output.as_deref()).await
        }
        Command::Manifest { input, output } => write_manifest(&input, output),
    }
}

async fn composite(
    config: Config,
    runner: Arc<dyn ToolRunner>,
    manifest_path: &Path,
    output: Option<&Path>,
) -> Result<()> {
    preflight::check_tools(&config.tools)?;

    let volume = match &config.composite.work_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating work directory {:?}", dir))?;
            dir.clone()
        }
        None => std::env::temp_dir(),
    };
    preflight::check_disk_space(&volume, config.composite.min_free_space_mb)?;

    let manifest = SessionManifest::load(manifest_path)?;
    info!("Manifest: {:?}", manifest_path);

    // Create and run the composition engine
    let engine = CompositionEngine::new(config, runner);
    let result = engine.compose(&manifest, output).await?;

    info!(
        "Composition complete! {} video inputs, {} audio tracks, {:.1}s",
        result.video_inputs, result.audio_tracks, result.duration_secs
    );
    if let Some(work_dir) = &result.work_dir {
        info!("Work directory kept at {:?}", work_dir);
    }
    println!("{}", result.output.display());
    Ok(())
}

async fn analyze(
    config: Config,
    runner: Arc<dyn ToolRunner>,
    input: &Path,
    start_ts: Option<i64>,
    min_gap: Option<f64>,
) -> Result<()> {
    preflight::check_media_tools(&config.tools)?;

    let min_gap = min_gap.unwrap_or(config.analysis.min_gap_duration_secs);
    anyhow::ensure!(min_gap > 0.0, "--min-gap must be positive, got {}", min_gap);

    let probe = MediaProbe::new(runner, Ffprobe::new(&config.tools.ffprobe));
    let analysis = TrackAnalyzer::new(min_gap)
        .analyze_file(&probe, "analyze", input)
        .await?;

    let segments = reconstruct_segments(analysis.end_time, &analysis.gaps);
    let gap_times = match start_ts {
        Some(ts) => Some(
            analysis
                .gaps
                .iter()
                .map(|gap| gap_time(ts, gap))
                .collect::<Result<Vec<_>>>()?,
        ),
        None => None,
    };

    let report = AnalyzeReport {
        analysis,
        segments,
        gap_times,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn gap_time(start_ts: i64, gap: &Gap) -> Result<GapTime> {
    let at = |secs: f64| {
        let ms = start_ts + (secs * 1000.0).round() as i64;
        chrono::DateTime::from_timestamp_millis(ms)
            .map(|t| t.to_rfc3339())
            .with_context(|| format!("timestamp {} out of range", ms))
    };
    Ok(GapTime {
        start: at(gap.start)?,
        end: at(gap.end)?,
        duration_secs: gap.duration(),
    })
}

async fn normalize(
    config: Config,
    runner: Arc<dyn ToolRunner>,
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
) -> Result<()> {
    preflight::check_media_tools(&config.tools)?;

    let output_dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => inputs
            .first()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    let normalizer = TrackNormalizer::new(runner, &config);
    let outputs = normalizer.normalize_files(inputs, &output_dir).await?;

    for track in &outputs.tracks {
        println!("{}", track.output.display());
    }
    if let Some(combined) = &outputs.combined {
        println!("{}", combined.display());
    }
    Ok(())
}

fn write_manifest(dir: &Path, output: Option<PathBuf>) -> Result<()> {
    let manifest = SessionManifest::from_directory(dir)?;
    let path = output.unwrap_or_else(|| dir.join(manifest.default_file_name()));
    manifest.write_to(&path)?;

    info!(
        "Wrote manifest for {} participants to {:?}",
        manifest.participants.len(),
        path
    );
    println!("{}", path.display());
    Ok(())
}

/// Log the failure and map it to the process exit code
fn report(e: &anyhow::Error) -> ExitCode {
    match e.downcast_ref::<CompositorError>() {
        Some(err) => {
            error!("{}", err.user_message());
            if let Some((stdout, stderr)) = err.tool_output() {
                if !stdout.trim().is_empty() {
                    eprintln!("--- stdout ---\n{}", stdout.trim_end());
                }
                if !stderr.trim().is_empty() {
                    eprintln!("--- stderr ---\n{}", stderr.trim_end());
                }
            }
            ExitCode::from(err.exit_code())
        }
        None => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
