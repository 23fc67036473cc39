use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{RenderError, Result};
use crate::render::window::{
    collect_active_inputs, plan_windows, InputTimings, PlaybackEvent, Reconciled, Window,
};
use crate::schedule::{CompositeSchedule, SlotVector, VideoInputs};
use crate::tools::{CompositorTools, Ffmpeg, ToolRunner};
use crate::track::VideoSize;

const TIMINGS_FILE: &str = "seg.vcsinputtimings.json";
const RENDER_OUTPUT_DIR: &str = "vcs-render-yuv";

/// Render settings shared by every window of a run
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub fps: u32,
    pub output_size: VideoSize,
    pub frames_per_window: u64,
}

/// Directories removed when a window's render step ends, however it ends
struct WindowScratch {
    dirs: Vec<PathBuf>,
}

impl WindowScratch {
    fn new() -> Self {
        Self { dirs: Vec::new() }
    }

    async fn create(&mut self, dir: PathBuf) -> Result<PathBuf> {
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;
        self.dirs.push(dir.clone());
        Ok(dir)
    }
}

impl Drop for WindowScratch {
    fn drop(&mut self) {
        for dir in &self.dirs {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %dir.display(), "Failed to remove window scratch directory: {}", e);
                }
            }
        }
    }
}

/// Renders the schedule one window at a time
///
/// Windows run strictly in order because each one starts from the slot
/// state the previous one ended with.
pub struct SegmentedRenderer {
    runner: Arc<dyn ToolRunner>,
    ffmpeg: Ffmpeg,
    compositor: CompositorTools,
    settings: RenderSettings,
}

impl SegmentedRenderer {
    pub fn new(runner: Arc<dyn ToolRunner>, config: &Config) -> Self {
        Self {
            runner,
            ffmpeg: Ffmpeg::new(&config.tools.ffmpeg),
            compositor: CompositorTools::new(&config.tools),
            settings: RenderSettings {
                fps: config.composite.fps,
                output_size: VideoSize {
                    w: config.composite.output_width,
                    h: config.composite.output_height,
                },
                frames_per_window: config.composite.frames_per_window(),
            },
        }
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    /// Render every window of `schedule` into `work_dir`, returning the clips in window order
    ///
    /// `batch_dir` holds the per-frame state sequence authored from the
    /// schedule. Abandoned windows are skipped; if nothing at all could be
    /// rendered the run fails.
    pub async fn render(
        &self,
        schedule: &CompositeSchedule,
        inputs: &VideoInputs,
        batch_dir: &Path,
        work_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let windows = plan_windows(schedule.duration_in_frames, self.settings.frames_per_window);
        info!(
            windows = windows.len(),
            frames = schedule.duration_in_frames,
            "Rendering {} frames in windows of {}",
            schedule.duration_in_frames,
            self.settings.frames_per_window
        );

        let mut clips = Vec::with_capacity(windows.len());
        let mut carried = SlotVector::new();

        for window in &windows {
            let (active, next) = collect_active_inputs(schedule, window, carried);
            carried = next;

            info!(
                window = window.index + 1,
                of = windows.len(),
                inputs = active.len(),
                "Window frames {} - {}",
                window.start_frame,
                window.start_frame + window.frame_count
            );

            match self
                .render_window(window, &active, inputs, batch_dir, work_dir)
                .await
            {
                Ok(clip) => clips.push(clip),
                Err(e) if e.is_recoverable() => {
                    warn!(window = window.index, "Window not rendered: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        if clips.is_empty() {
            return Err(RenderError::NothingRendered.into());
        }
        Ok(clips)
    }

    async fn render_window(
        &self,
        window: &Window,
        active: &BTreeSet<u32>,
        inputs: &VideoInputs,
        batch_dir: &Path,
        work_dir: &Path,
    ) -> Result<PathBuf> {
        let fps = self.settings.fps;
        let size = self.settings.output_size;
        let window_dir = work_dir.join(format!("seg{}", window.index));
        tokio::fs::create_dir_all(&window_dir).await?;

        let mut scratch = WindowScratch::new();
        let mut timings = InputTimings::new(window);
        let mut observed = Vec::with_capacity(active.len());

        for &id in active {
            let input = inputs.resolve(id)?;
            let seq_dir = scratch.create(window_dir.join(format!("seq_{}", id))).await?;
            let pattern = seq_dir.join(format!("{}_%06d.yuv", id));

            let invocation = self.ffmpeg.extract_raw_sequence(
                &format!("extract_{}_seg{}", id, window.index),
                &input.track.file,
                window.start_secs(fps),
                window.duration_secs(fps),
                &pattern,
            );
            self.runner.run(&invocation).await?;

            let frames = count_files(&seq_dir).await?;
            debug!(id, frames, "Extracted raw frames");
            observed.push(frames);

            timings.playback_events.push(PlaybackEvent {
                video_input_id: id,
                frame: 0,
                duration_in_frames: window.frame_count,
                seq_dir,
                w: input.track.size.w,
                h: input.track.size.h,
            });
        }

        if let Reconciled::Clamped { requested, frames } = timings.reconcile(window.index, &observed)? {
            warn!(
                window = window.index,
                "Extracted inputs differ in length, using {} of {} frames", frames, requested
            );
        }

        let timings_path = window_dir.join(TIMINGS_FILE);
        tokio::fs::write(&timings_path, serde_json::to_vec_pretty(&timings)?).await?;

        let render_dir = scratch.create(window_dir.join(RENDER_OUTPUT_DIR)).await?;
        let clip = window_dir.join(format!("seg{}_video.m4v", window.index));

        let invocation = self.compositor.render(
            &format!("vcsrender_seg{}", window.index),
            &render_dir,
            &timings_path,
            batch_dir,
            size,
        );
        self.runner.run(&invocation).await?;

        let invocation = self.compositor.encode_sequence(
            &format!("encode_seg{}", window.index),
            &render_dir,
            size,
            fps,
            &clip,
        );
        self.runner.run(&invocation).await?;

        Ok(clip)
    }
}

async fn count_files(dir: &Path) -> Result<u64> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            count += 1;
        }
    }
    Ok(count)
}
