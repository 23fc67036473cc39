//! Argument builders for the frame compositor toolchain

use std::path::{Path, PathBuf};

use crate::config::ToolsConfig;
use crate::tools::Invocation;
use crate::track::VideoSize;

/// Builds invocations of the batch runner, the frame compositor and the sequence encoder
#[derive(Debug, Clone)]
pub struct CompositorTools {
    compositor: PathBuf,
    batch_runner: PathBuf,
    batch_runner_args: Vec<String>,
    sequence_encoder: PathBuf,
}

impl CompositorTools {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            compositor: tools.compositor.clone(),
            batch_runner: tools.batch_runner.clone(),
            batch_runner_args: tools.batch_runner_args.clone(),
            sequence_encoder: tools.sequence_encoder.clone(),
        }
    }

    /// Author the per-frame state sequence for a schedule artifact
    ///
    /// The runner writes `<output_dir>/seq*` files, clearing the directory first.
    pub fn batch_runner(&self, events_json: &Path, output_dir: &Path) -> Invocation {
        Invocation::new(&self.batch_runner, "batch_runner")
            .args(&self.batch_runner_args)
            .arg("--events_json")
            .arg(events_json)
            .arg("--output_prefix")
            .arg(output_dir.join("seq"))
            .arg("--clean_output_dir")
    }

    /// Render one window's raw output frames
    pub fn render(
        &self,
        context: &str,
        output_seq_dir: &Path,
        input_timings: &Path,
        batch_dir: &Path,
        size: VideoSize,
    ) -> Invocation {
        Invocation::new(&self.compositor, context)
            .arg("--oseq")
            .arg(output_seq_dir)
            .arg("--input_timings")
            .arg(input_timings)
            .arg("--jsonseq")
            .arg(batch_dir)
            .args(["-w".to_string(), size.w.to_string(), "-h".to_string(), size.h.to_string()])
    }

    /// Encode a raw output sequence into a compressed clip
    pub fn encode_sequence(
        &self,
        context: &str,
        seq_dir: &Path,
        size: VideoSize,
        fps: u32,
        output: &Path,
    ) -> Invocation {
        Invocation::new(&self.sequence_encoder, context)
            .arg(seq_dir)
            .arg(format!("{}x{}", size.w, size.h))
            .arg(fps.to_string())
            .arg(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_runner_args() {
        let tools = CompositorTools::new(&ToolsConfig::default());
        let inv = tools.batch_runner(Path::new("/w/raw-tracks.vcsevents.json"), Path::new("/w/vcs-output"));

        assert_eq!(
            inv.args_lossy(),
            vec![
                "vcs-batch-runner.js",
                "--events_json",
                "/w/raw-tracks.vcsevents.json",
                "--output_prefix",
                "/w/vcs-output/seq",
                "--clean_output_dir"
            ]
        );
    }

    #[test]
    fn test_render_and_encode_args() {
        let tools = CompositorTools::new(&ToolsConfig::default());
        let size = VideoSize { w: 1280, h: 720 };

        let render = tools.render(
            "vcsrender_seg0",
            Path::new("out"),
            Path::new("seg.vcsinputtimings.json"),
            Path::new("batch"),
            size,
        );
        assert_eq!(render.tool_name(), "vcsrender");
        assert_eq!(render.flag_value("--jsonseq").as_deref(), Some("batch"));
        assert_eq!(render.flag_value("-h").as_deref(), Some("720"));

        let encode = tools.encode_sequence("encode_seg0", Path::new("out"), size, 30, Path::new("seg0_video.m4v"));
        assert_eq!(encode.args_lossy(), vec!["out", "1280x720", "30", "seg0_video.m4v"]);
    }
}
