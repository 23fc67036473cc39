use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{ManifestError, Result, ToolError},
    manifest::{Participant, ParticipantTracks, SessionManifest, TrackEntry},
    render::{OutputAssembler, SegmentedRenderer},
    schedule::{CompositeSchedule, ScheduleSettings, VideoTrack, VideoTrackSet},
    tools::{CompositorTools, Ffmpeg, ToolRunner},
    track::{asset_path, track_label, AssetKind, TrackNormalizer},
};

const SCHEDULE_FILE: &str = "raw-tracks.vcsevents.json";
const BATCH_OUTPUT_DIR: &str = "vcs-output";

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct CompositionOutput {
    /// Final video file
    pub output: PathBuf,
    /// The run's working directory, when it was kept
    pub work_dir: Option<PathBuf>,
    pub duration_secs: f64,
    pub duration_in_frames: u64,
    pub video_inputs: usize,
    pub audio_tracks: usize,
    pub windows_rendered: usize,
}

/// Normalized assets collected from the manifest
struct NormalizedSession {
    video: VideoTrackSet,
    audio_sources: Vec<PathBuf>,
}

/// Main composition engine that turns a session's raw tracks into one composited video
///
/// The engine follows a clear pipeline:
/// 1. Normalization - Every participant's tracks become continuous assets in the cache
/// 2. Session Length - The longest normalized video sets the output duration
/// 3. Scheduling - Video inputs get ids and a forward-filled slot schedule
/// 4. State Authoring - The batch runner turns the schedule into per-frame state
/// 5. Rendering - The compositor renders the output window by window
/// 6. Output Generation - Window clips are joined, audio mixed and muxed
pub struct CompositionEngine {
    config: Config,
    runner: Arc<dyn ToolRunner>,
    normalizer: TrackNormalizer,
    renderer: SegmentedRenderer,
    assembler: OutputAssembler,
    compositor: CompositorTools,
}

impl CompositionEngine {
    /// Create a new composition engine running its tools through `runner`
    pub fn new(config: Config, runner: Arc<dyn ToolRunner>) -> Self {
        let normalizer = TrackNormalizer::new(runner.clone(), &config);
        let renderer = SegmentedRenderer::new(runner.clone(), &config);
        let assembler = OutputAssembler::new(runner.clone(), Ffmpeg::new(&config.tools.ffmpeg));
        let compositor = CompositorTools::new(&config.tools);

        Self {
            config,
            runner,
            normalizer,
            renderer,
            assembler,
            compositor,
        }
    }

    /// Main composition method - orchestrates the entire pipeline
    ///
    /// The result is moved to `output` when one is given; otherwise it stays
    /// in the working directory, which is then kept.
    pub async fn compose(
        &self,
        manifest: &SessionManifest,
        output: Option<&Path>,
    ) -> Result<CompositionOutput> {
        info!("🎬 Starting raw-tracks composition");
        info!("   Recording: {}", manifest.recording_start_ts);
        info!("   Participants: {}", manifest.participants.len());

        let composite = &self.config.composite;
        tokio::fs::create_dir_all(&composite.cache_dir).await?;

        let work_dir = self.create_work_dir(manifest.recording_start_ts).await?;
        let work_path = work_dir.path().to_path_buf();

        // Pipeline Step 1: Normalization
        let session = self.normalize_participants(manifest).await?;

        // Pipeline Step 2: Session Length
        let duration_secs = session.video.max_duration().ok_or_else(|| {
            ManifestError::NoVideoContent {
                reason: "couldn't get the session duration from video tracks".to_string(),
            }
        })?;
        let duration_in_frames = (duration_secs * composite.fps as f64).floor() as u64;
        if duration_in_frames == 0 {
            return Err(ManifestError::NoVideoContent {
                reason: format!("session of {:.3}s has no full frame", duration_secs),
            }
            .into());
        }
        info!(
            "⏱️  Total duration: {:.3}s = {} frames",
            duration_secs, duration_in_frames
        );

        // Pipeline Step 3: Scheduling
        let inputs = session.video.into_inputs(composite.video_input_base_id);
        for input in inputs.iter() {
            debug!(
                id = input.id,
                participant = %input.track.participant_id,
                offset = input.track.start_offset_secs,
                "Video input"
            );
        }
        let settings = ScheduleSettings::from_config(composite, duration_in_frames);
        let schedule = CompositeSchedule::build(&inputs, &settings);
        let schedule_path = work_path.join(SCHEDULE_FILE);
        schedule.write_to(&schedule_path).await?;
        info!(
            "📋 Schedule: {} inputs, {} events",
            inputs.len(),
            schedule.events_by_frame.len()
        );

        // Pipeline Step 4: State Authoring
        let batch_dir = work_path.join(BATCH_OUTPUT_DIR);
        tokio::fs::create_dir_all(&batch_dir).await?;
        info!("Running batch runner...");
        let invocation = self.compositor.batch_runner(&schedule_path, &batch_dir);
        self.runner.run(&invocation).await?;

        // Pipeline Step 5: Rendering
        let clips = self
            .renderer
            .render(&schedule, &inputs, &batch_dir, &work_path)
            .await?;

        // Pipeline Step 6: Output Generation
        let joined = self.assembler.join_clips(&clips, &work_path).await?;
        let mixed = self
            .assembler
            .mix_audio(&session.audio_sources, &work_path)
            .await?;
        let final_output = match &mixed {
            Some(audio) => self.assembler.mux(&joined, audio, &work_path).await?,
            None => joined,
        };

        let (output, kept) = match output {
            Some(dest) => {
                move_file(&final_output, dest).await?;
                let kept = self.config.composite.keep_work_dir.then(|| work_dir.into_path());
                (dest.to_path_buf(), kept)
            }
            None => {
                let kept = work_dir.into_path();
                (kept.join(strip_work_dir(&final_output, &work_path)), Some(kept))
            }
        };

        info!("🎉 Composition complete! Output saved to: {:?}", output);
        Ok(CompositionOutput {
            output,
            work_dir: kept,
            duration_secs,
            duration_in_frames,
            video_inputs: inputs.len(),
            audio_tracks: session.audio_sources.len(),
            windows_rendered: clips.len(),
        })
    }

    // ==========================================
    // PIPELINE STEP 1: NORMALIZATION
    // ==========================================

    async fn normalize_participants(&self, manifest: &SessionManifest) -> Result<NormalizedSession> {
        info!("🎞️  Step 1: Normalizing input tracks...");

        let mut session = NormalizedSession {
            video: VideoTrackSet::new(self.config.composite.max_video_slots),
            audio_sources: Vec::new(),
        };

        for participant in &manifest.participants {
            self.normalize_participant(manifest, participant, &mut session)
                .await?;
        }

        info!(
            "   ✅ Normalized: {} video inputs, {} audio sources",
            session.video.len(),
            session.audio_sources.len()
        );
        Ok(session)
    }

    async fn normalize_participant(
        &self,
        manifest: &SessionManifest,
        participant: &Participant,
        session: &mut NormalizedSession,
    ) -> Result<()> {
        let id = participant.id.as_str();
        let cache_dir = &self.config.composite.cache_dir;

        match participant.classify()? {
            ParticipantTracks::Empty => {
                warn!(participant = id, "Participant has no tracks");
            }

            ParticipantTracks::Combined { video, audio } => {
                let video_path = manifest.track_path(video)?;
                let audio_path = manifest.track_path(audio)?;

                if !session.video.has_room() {
                    warn!(
                        participant = id,
                        "Unable to process video+audio, max video inputs reached"
                    );
                    return Ok(());
                }

                let combined = asset_path(cache_dir, &video_path, AssetKind::Combined);
                if tokio::fs::try_exists(&combined).await? {
                    info!(participant = id, "Found cached combined video+audio");
                } else {
                    info!(participant = id, "Normalizing video+audio...");
                    self.normalizer
                        .normalize_files(&[video_path, audio_path], cache_dir)
                        .await?;
                }
                ensure_written(&combined, id).await?;

                session.audio_sources.push(combined.clone());
                self.add_video(participant, video, combined, &mut session.video)
                    .await?;
            }

            ParticipantTracks::Single(track) => {
                if participant.tracks.len() > 1 {
                    warn!(
                        participant = id,
                        ignored = participant.tracks.len() - 1,
                        "Using only the first track ({})",
                        track.media_type
                    );
                }

                let path = manifest.track_path(track)?;
                let is_video = !track.is_audio();
                if is_video && !session.video.has_room() {
                    warn!(
                        participant = id,
                        "Unable to process video track ({}), max video inputs reached",
                        track.media_type
                    );
                    return Ok(());
                }

                let kind = if is_video {
                    AssetKind::Video
                } else {
                    AssetKind::Audio
                };
                let normalized = asset_path(cache_dir, &path, kind);

                if tokio::fs::try_exists(&normalized).await? {
                    info!(participant = id, "Found cached track for type {}", track.media_type);
                } else {
                    info!(participant = id, "Normalizing track of type {}...", track.media_type);
                    let label = track_label(&path);
                    let analysis = self.normalizer.analyze(&path).await?;
                    if is_video {
                        self.normalizer
                            .normalize_video(&label, &analysis, &path, &normalized)
                            .await?;
                    } else {
                        self.normalizer
                            .normalize_audio(&label, &analysis, &path, &normalized)
                            .await?;
                    }
                }
                ensure_written(&normalized, id).await?;

                if is_video {
                    self.add_video(participant, track, normalized, &mut session.video)
                        .await?;
                } else {
                    session.audio_sources.push(normalized);
                }
            }
        }

        Ok(())
    }

    /// Probe a normalized video asset and register it as a video input
    async fn add_video(
        &self,
        participant: &Participant,
        entry: &TrackEntry,
        file: PathBuf,
        tracks: &mut VideoTrackSet,
    ) -> Result<()> {
        let label = track_label(&file);
        let probe = self.normalizer.probe();
        let duration_secs = probe
            .format_duration(&format!("duration_{}", label), &file)
            .await?;
        let size = probe.video_size(&format!("size_{}", label), &file).await?;

        debug!(
            participant = %participant.id,
            duration_secs,
            "Normalized video is {}x{}",
            size.w,
            size.h
        );

        let track = VideoTrack {
            participant_id: participant.id.clone(),
            file,
            start_offset_secs: entry.start_offset_secs,
            duration_secs,
            size,
        };
        if let Err(e) = tracks.try_add(track) {
            warn!(participant = %participant.id, "Skipping video: {}", e);
        }
        Ok(())
    }

    async fn create_work_dir(&self, recording_start_ts: i64) -> Result<tempfile::TempDir> {
        let prefix = format!("raw-tracks-composite_{}_", recording_start_ts);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match &self.config.composite.work_dir {
            Some(parent) => {
                tokio::fs::create_dir_all(parent).await?;
                let parent = if parent.is_absolute() {
                    parent.clone()
                } else {
                    std::env::current_dir()?.join(parent)
                };
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        debug!(dir = %dir.path().display(), "Created work directory");
        Ok(dir)
    }
}

/// A normalizer run that exited cleanly but left no output is still a tool failure
async fn ensure_written(path: &Path, participant: &str) -> Result<()> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    Err(ToolError::UnexpectedOutput {
        tool: "ffmpeg".to_string(),
        context: format!("normalize_{}", participant),
        output: format!("expected output {} was not written", path.display()),
    }
    .into())
}

fn strip_work_dir(path: &Path, work_dir: &Path) -> PathBuf {
    path.strip_prefix(work_dir)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Rename, falling back to copy + remove across filesystems
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    if tokio::fs::rename(from, to).await.is_err() {
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositorError;
    use crate::tools::testing::{stdout, touch_output, ScriptedRunner};
    use crate::tools::{Invocation, ToolOutput};
    use tempfile::{tempdir, TempDir};

    const VIDEO_DUMP: &str = "[STREAM]\ncodec_type=video\nstart_time=0.0\nr_frame_rate=30/1\n[/STREAM]\n\
        [FRAME]\nmedia_type=video\npts_time=0.0\nduration_time=0.033\nwidth=640\nheight=360\n[/FRAME]\n\
        [FRAME]\nmedia_type=video\npts_time=0.033\nduration_time=0.033\nwidth=640\nheight=360\n[/FRAME]\n";
    const AUDIO_DUMP: &str = "[STREAM]\ncodec_type=audio\nstart_time=0.1\n[/STREAM]\n\
        [FRAME]\nmedia_type=audio\npts_time=0.1\nduration_time=0.02\n[/FRAME]\n";

    /// Simulates ffprobe, ffmpeg and the compositor toolchain
    fn fake_tools(duration: &'static str) -> Arc<ScriptedRunner> {
        Arc::new(ScriptedRunner::new(move |inv: &Invocation| {
            let args = inv.args_lossy();
            if inv.tool_name() == "ffprobe" {
                if args.iter().any(|a| a == "format=duration") {
                    return Ok(stdout(duration));
                }
                if args.iter().any(|a| a == "stream=width,height") {
                    return Ok(stdout("640,360\n"));
                }
                let input = inv.last_arg().unwrap().to_string_lossy().into_owned();
                return Ok(stdout(if input.contains("audio") { AUDIO_DUMP } else { VIDEO_DUMP }));
            }

            if inv.context.starts_with("extract_") && !inv.context.starts_with("extract_audio") {
                let secs: f64 = inv.flag_value("-t").unwrap().parse().unwrap();
                let dir = inv.last_arg().unwrap().parent().unwrap();
                for n in 0..(secs * 30.0).round() as u64 {
                    std::fs::write(dir.join(format!("{:06}.yuv", n)), b"").unwrap();
                }
                return Ok(ToolOutput::default());
            }

            if inv.tool_name() == "ffmpeg" || inv.context.starts_with("encode_") {
                touch_output(inv);
            }
            Ok(ToolOutput::default())
        }))
    }

    fn track(file: &str, media_type: &str, offset: f64) -> TrackEntry {
        TrackEntry {
            file: PathBuf::from(file),
            media_type: media_type.to_string(),
            start_ts: 1000 + (offset * 1000.0) as i64,
            start_offset_secs: offset,
        }
    }

    /// Manifest whose track files exist in a fresh directory
    fn session(participants: Vec<Participant>) -> (TempDir, SessionManifest, Config) {
        let dir = tempdir().unwrap();
        for p in &participants {
            for t in &p.tracks {
                std::fs::write(dir.path().join(&t.file), b"").unwrap();
            }
        }
        let manifest = SessionManifest {
            recording_start_ts: 1000,
            participants,
            root_dir: dir.path().to_path_buf(),
        };

        let mut config = Config::default();
        config.composite.cache_dir = dir.path().join("cache");
        config.composite.work_dir = Some(dir.path().join("work"));
        (dir, manifest, config)
    }

    fn participant(id: &str, tracks: Vec<TrackEntry>) -> Participant {
        Participant {
            id: id.to_string(),
            tracks,
        }
    }

    #[tokio::test]
    async fn test_full_pipeline() {
        let (dir, manifest, config) = session(vec![
            participant(
                "p1",
                vec![
                    track("p1-cam-video.webm", "cam-video", 0.0),
                    track("p1-cam-audio.webm", "cam-audio", 0.0),
                ],
            ),
            participant("p2", vec![track("p2-cam-video.webm", "cam-video", 12.0)]),
            participant("p3", vec![track("p3-cam-audio.webm", "cam-audio", 3.0)]),
            participant("p4", Vec::new()),
        ]);
        let runner = fake_tools("30.000000\n");
        let engine = CompositionEngine::new(config, runner.clone());
        let dest = dir.path().join("out").join("final.mp4");

        let result = engine.compose(&manifest, Some(&dest)).await.unwrap();

        assert_eq!(result.output, dest);
        assert!(dest.exists());
        assert_eq!(result.duration_in_frames, 900);
        assert_eq!(result.video_inputs, 2);
        assert_eq!(result.audio_tracks, 2);
        assert_eq!(result.windows_rendered, 2);
        assert!(result.work_dir.is_none());

        let cache = dir.path().join("cache");
        assert!(cache.join("p1-cam-video_combined.mp4").exists());
        assert!(cache.join("p2-cam-video_normalized.m4v").exists());
        assert!(cache.join("p3-cam-audio_normalized.aac").exists());

        let contexts = runner.contexts();
        for expected in [
            "combine_p1-cam-video",
            "batch_runner",
            "vcsrender_seg0",
            "vcsrender_seg1",
            "concat_windows",
            "mix_audio",
            "mux_final",
        ] {
            assert!(contexts.iter().any(|c| c == expected), "missing {}", expected);
        }
        let work_leftovers: Vec<_> = std::fs::read_dir(dir.path().join("work")).unwrap().collect();
        assert!(work_leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_cached_assets_are_reused() {
        let (dir, manifest, config) = session(vec![participant(
            "p1",
            vec![track("p1-cam-video.webm", "cam-video", 0.0)],
        )]);
        std::fs::create_dir_all(dir.path().join("cache")).unwrap();
        std::fs::write(dir.path().join("cache/p1-cam-video_normalized.m4v"), b"").unwrap();

        let runner = fake_tools("5.0\n");
        let engine = CompositionEngine::new(config, runner.clone());
        let result = engine.compose(&manifest, None).await.unwrap();

        let contexts = runner.contexts();
        assert!(!contexts.iter().any(|c| c.starts_with("analyze_") || c.starts_with("convert_")));
        // no audio anywhere: the joined video is the result
        assert!(!contexts.iter().any(|c| c == "mux_final"));

        let kept = result.work_dir.unwrap();
        assert_eq!(result.output, kept.join("video-concat.m4v"));
        assert!(kept.join(SCHEDULE_FILE).exists());
    }

    #[tokio::test]
    async fn test_slot_cap_skips_participant() {
        let (dir, manifest, mut config) = session(vec![
            participant("p1", vec![track("p1-cam-video.webm", "cam-video", 0.0)]),
            participant("p2", vec![track("p2-cam-video.webm", "cam-video", 1.0)]),
        ]);
        config.composite.max_video_slots = 1;
        let runner = fake_tools("10.0\n");
        let engine = CompositionEngine::new(config, runner.clone());

        let result = engine
            .compose(&manifest, Some(&dir.path().join("o.mp4")))
            .await
            .unwrap();
        assert_eq!(result.video_inputs, 1);
        assert!(!runner.contexts().iter().any(|c| c.ends_with("p2-cam-video")));
    }

    #[tokio::test]
    async fn test_audio_only_session_has_no_video_content() {
        let (_dir, manifest, config) = session(vec![participant(
            "p1",
            vec![track("p1-cam-audio.webm", "cam-audio", 0.0)],
        )]);
        let engine = CompositionEngine::new(config, fake_tools("10.0\n"));

        let err = engine.compose(&manifest, None).await.unwrap_err();
        assert!(matches!(
            err,
            CompositorError::Manifest(ManifestError::NoVideoContent { .. })
        ));
        assert_eq!(err.exit_code(), 8);
    }

    #[tokio::test]
    async fn test_missing_track_file_aborts() {
        let (dir, manifest, config) = session(vec![participant(
            "p1",
            vec![track("p1-cam-video.webm", "cam-video", 0.0)],
        )]);
        std::fs::remove_file(dir.path().join("p1-cam-video.webm")).unwrap();
        let engine = CompositionEngine::new(config, fake_tools("10.0\n"));

        let err = engine.compose(&manifest, None).await.unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_tool_failure_propagates_captured_output() {
        let (_dir, manifest, config) = session(vec![participant(
            "p1",
            vec![track("p1-cam-video.webm", "cam-video", 0.0)],
        )]);
        let runner = Arc::new(ScriptedRunner::new(|inv: &Invocation| {
            Err(ToolError::Failed {
                tool: inv.tool_name(),
                context: inv.context.clone(),
                status: "exit status: 1".into(),
                stdout: "partial".into(),
                stderr: "Invalid data found when processing input".into(),
            }
            .into())
        }));
        let engine = CompositionEngine::new(config, runner);

        let err = engine.compose(&manifest, None).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            err.tool_output(),
            Some(("partial", "Invalid data found when processing input"))
        );
    }
}
