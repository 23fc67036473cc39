use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::tools::ffmpeg::concat_list;
use crate::tools::{Ffmpeg, ToolRunner};

/// Joins window clips, mixes audio and muxes the final file
pub struct OutputAssembler {
    runner: Arc<dyn ToolRunner>,
    ffmpeg: Ffmpeg,
}

impl OutputAssembler {
    pub fn new(runner: Arc<dyn ToolRunner>, ffmpeg: Ffmpeg) -> Self {
        Self { runner, ffmpeg }
    }

    /// Stream-copy the clips, in order, into `work_dir/video-concat.m4v`
    pub async fn join_clips(&self, clips: &[PathBuf], work_dir: &Path) -> Result<PathBuf> {
        let list_file = work_dir.join("video-concat.txt");
        let output = work_dir.join("video-concat.m4v");
        tokio::fs::write(&list_file, concat_list(clips)).await?;

        info!(clips = clips.len(), "Joining window clips");
        let invocation = self.ffmpeg.concat("concat_windows", &list_file, &output);
        self.runner.run(&invocation).await?;
        Ok(output)
    }

    /// Mix every audio source into `work_dir/audio-mix.aac`
    ///
    /// `.aac` files are mixed directly. Audio is copied out of `.mp4` files
    /// into temporaries first, which are removed once the mix is done. Other
    /// files are skipped. Returns `None` when there was nothing to mix.
    pub async fn mix_audio(&self, sources: &[PathBuf], work_dir: &Path) -> Result<Option<PathBuf>> {
        let extracted = tempfile::Builder::new()
            .prefix("audio-extract_")
            .tempdir_in(work_dir)?;
        let mut audio_files = Vec::with_capacity(sources.len());

        for source in sources {
            match source.extension().and_then(|e| e.to_str()) {
                Some("aac") => audio_files.push(source.clone()),
                Some("mp4") => {
                    let stem = source
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let target = extracted.path().join(format!("{}_audio.aac", stem));
                    let invocation = self.ffmpeg.extract_audio(
                        &format!("extract_audio_{}", stem),
                        source,
                        &target,
                    );
                    self.runner.run(&invocation).await?;
                    audio_files.push(target);
                }
                _ => warn!(file = %source.display(), "Unknown file in audio mix list, skipping"),
            }
        }

        if audio_files.is_empty() {
            return Ok(None);
        }

        let output = work_dir.join("audio-mix.aac");
        info!(inputs = audio_files.len(), "Mixing audio");
        let invocation = self.ffmpeg.mix_audio("mix_audio", &audio_files, &output);
        self.runner.run(&invocation).await?;

        if let Err(e) = extracted.close() {
            warn!("Failed to remove extracted audio: {}", e);
        }
        Ok(Some(output))
    }

    /// Put the joined video and the audio mix into `work_dir/final.mp4`
    pub async fn mux(&self, video: &Path, audio: &Path, work_dir: &Path) -> Result<PathBuf> {
        let output = work_dir.join("final.mp4");
        let invocation = self.ffmpeg.mux("mux_final", video, audio, &output);
        self.runner.run(&invocation).await?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::ScriptedRunner;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_join_writes_ordered_list() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::touching_outputs());
        let assembler = OutputAssembler::new(runner.clone(), Ffmpeg::new("ffmpeg"));
        let clips = vec![dir.path().join("seg0/seg0_video.m4v"), dir.path().join("seg2/seg2_video.m4v")];

        let joined = assembler.join_clips(&clips, dir.path()).await.unwrap();
        assert_eq!(joined, dir.path().join("video-concat.m4v"));

        let list = std::fs::read_to_string(dir.path().join("video-concat.txt")).unwrap();
        let lines: Vec<_> = list.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("seg0_video.m4v"));
        assert!(lines[1].contains("seg2_video.m4v"));
        assert_eq!(runner.contexts(), vec!["concat_windows"]);
    }

    #[tokio::test]
    async fn test_mix_extracts_from_combined_files() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::touching_outputs());
        let assembler = OutputAssembler::new(runner.clone(), Ffmpeg::new("ffmpeg"));
        let sources = vec![
            PathBuf::from("cache/p1-cam-video_combined.mp4"),
            PathBuf::from("cache/p2-cam-audio_normalized.aac"),
            PathBuf::from("cache/notes.txt"),
        ];

        let mix = assembler.mix_audio(&sources, dir.path()).await.unwrap();
        assert_eq!(mix, Some(dir.path().join("audio-mix.aac")));

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].context, "extract_audio_p1-cam-video_combined");
        let extracted = calls[0].last_arg().unwrap().to_path_buf();
        assert_eq!(calls[1].flag_value("-filter_complex").as_deref(), Some("amix=inputs=2"));
        assert!(!extracted.exists(), "extracted audio not removed");
    }

    #[tokio::test]
    async fn test_mix_without_audio() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::touching_outputs());
        let assembler = OutputAssembler::new(runner.clone(), Ffmpeg::new("ffmpeg"));

        assert_eq!(assembler.mix_audio(&[], dir.path()).await.unwrap(), None);
        assert!(runner.calls().is_empty());
    }
}
