//! ffmpeg / ffprobe argument builders

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::tools::Invocation;
use crate::track::VideoSize;

/// Encoder settings shared by every video-producing call of one track
#[derive(Debug, Clone)]
pub struct VideoEncoding {
    pub frame_rate: f64,
    pub codec: String,
    pub bitrate: String,
}

impl VideoEncoding {
    fn args(&self) -> Vec<String> {
        vec![
            "-r".to_string(),
            format_rate(self.frame_rate),
            "-b:v".to_string(),
            self.bitrate.clone(),
            "-c:v".to_string(),
            self.codec.clone(),
        ]
    }
}

/// Builds ffmpeg invocations
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn base(&self, context: impl Into<String>) -> Invocation {
        Invocation::new(&self.program, context).args(["-hide_banner", "-y"])
    }

    /// Prefix an audio track with `delay_ms` of silence and encode it
    pub fn delay_audio(
        &self,
        context: &str,
        input: &Path,
        delay_ms: u64,
        codec: &str,
        bitrate: &str,
        output: &Path,
    ) -> Invocation {
        // aresample has to run before adelay in the chain
        let filter = format!("aresample=async=1,adelay={}:all=true", delay_ms);
        self.base(context)
            .arg("-i")
            .arg(input)
            .args(["-af", filter.as_str(), "-b:a", bitrate, "-acodec", codec])
            .arg(output)
    }

    /// Transcode a whole raw track to a fixed size and frame rate
    pub fn transcode_video(
        &self,
        context: &str,
        input: &Path,
        size: VideoSize,
        encoding: &VideoEncoding,
        output: &Path,
    ) -> Invocation {
        let filter = format!(
            "scale={}x{}:out_color_matrix=bt709:out_range=tv",
            size.w, size.h
        );
        self.base(context)
            .arg("-i")
            .arg(input)
            .args(["-vf", filter.as_str()])
            .args(encoding.args())
            .arg(output)
    }

    /// Solid color clip of exactly `duration_secs`
    pub fn filler_clip(
        &self,
        context: &str,
        color: &str,
        size: VideoSize,
        duration_secs: f64,
        encoding: &VideoEncoding,
        output: &Path,
    ) -> Invocation {
        let source = format!(
            "color=c={}:s={}x{},format=yuv420p,scale=out_color_matrix=bt709:out_range=tv",
            color, size.w, size.h
        );
        self.base(context)
            .args(["-f", "lavfi", "-i", source.as_str()])
            .args(["-t".to_string(), format_secs(duration_secs)])
            .args(encoding.args())
            .arg(output)
    }

    /// Stream-copy `duration_secs` starting at `start_secs`
    pub fn extract_range(
        &self,
        context: &str,
        input: &Path,
        start_secs: f64,
        duration_secs: f64,
        output: &Path,
    ) -> Invocation {
        self.base(context)
            .args([
                "-ss".to_string(),
                format_secs(start_secs),
                "-t".to_string(),
                format_secs(duration_secs),
            ])
            .arg("-i")
            .arg(input)
            .args(["-c", "copy"])
            .arg(output)
    }

    /// Losslessly join the files listed in a concat list file
    pub fn concat(&self, context: &str, list_file: &Path, output: &Path) -> Invocation {
        self.base(context)
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(list_file)
            .args(["-c", "copy"])
            .arg(output)
    }

    /// Put the first stream of `video` and of `audio` into one container
    pub fn mux(&self, context: &str, video: &Path, audio: &Path, output: &Path) -> Invocation {
        self.base(context)
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-c", "copy", "-map", "0:0", "-map", "1:0"])
            .arg(output)
    }

    /// Decode a time range into one raw yuv420p file per frame
    ///
    /// `pattern` is an ffmpeg sequence pattern such as `dir/1001_%06d.yuv`.
    pub fn extract_raw_sequence(
        &self,
        context: &str,
        input: &Path,
        start_secs: f64,
        duration_secs: f64,
        pattern: &Path,
    ) -> Invocation {
        self.base(context)
            .args(["-v", "error"])
            .args([
                "-ss".to_string(),
                format_secs(start_secs),
                "-t".to_string(),
                format_secs(duration_secs),
            ])
            .arg("-i")
            .arg(input)
            .args(["-pix_fmt", "yuv420p", "-f", "segment", "-segment_time", "0.01"])
            .arg(pattern)
    }

    /// Copy out the audio stream of a muxed file
    pub fn extract_audio(&self, context: &str, input: &Path, output: &Path) -> Invocation {
        self.base(context)
            .args(["-v", "error", "-i"])
            .arg(input)
            .args(["-vn", "-acodec", "copy"])
            .arg(output)
    }

    /// Plain N-way amplitude mix
    pub fn mix_audio(&self, context: &str, inputs: &[PathBuf], output: &Path) -> Invocation {
        let mut inv = self.base(context).args(["-v", "error"]);
        for input in inputs {
            inv = inv.arg("-i").arg(input);
        }
        let filter = format!("amix=inputs={}", inputs.len());
        inv.args(["-vn", "-filter_complex", filter.as_str()])
            .arg(output)
    }
}

/// Builds ffprobe invocations
#[derive(Debug, Clone)]
pub struct Ffprobe {
    program: PathBuf,
}

impl Ffprobe {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Per-frame and per-stream records in the bracketed text format
    pub fn frames_and_streams(&self, context: &str, input: &Path) -> Invocation {
        Invocation::new(&self.program, context)
            .args(["-hide_banner", "-show_frames", "-show_streams"])
            .arg(input)
    }

    /// Container duration as a bare number
    pub fn format_duration(&self, context: &str, input: &Path) -> Invocation {
        Invocation::new(&self.program, context)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
    }

    /// First video stream's size as `w,h`
    pub fn video_size(&self, context: &str, input: &Path) -> Invocation {
        Invocation::new(&self.program, context)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "csv=p=0",
            ])
            .arg(input)
    }
}

/// Contents of a concat demuxer list file for `files`, in order
pub fn concat_list<P: AsRef<Path>>(files: &[P]) -> String {
    let mut list = String::new();
    for file in files {
        let escaped = file.as_ref().display().to_string().replace('\'', "'\\''");
        let _ = writeln!(list, "file '{}'", escaped);
    }
    list
}

/// Seconds with millisecond precision, as ffmpeg time arguments
pub fn format_secs(secs: f64) -> String {
    format!("{:.3}", secs)
}

fn format_rate(rate: f64) -> String {
    if rate.fract() == 0.0 {
        format!("{}", rate as u64)
    } else {
        format!("{:.3}", rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding() -> VideoEncoding {
        VideoEncoding {
            frame_rate: 30.0,
            codec: "libx264".to_string(),
            bitrate: "5000k".to_string(),
        }
    }

    #[test]
    fn test_delay_audio_filter_order() {
        let ffmpeg = Ffmpeg::new("ffmpeg");
        let inv = ffmpeg.delay_audio(
            "audio_cam",
            Path::new("in.webm"),
            2500,
            "aac",
            "256k",
            Path::new("out.aac"),
        );
        assert_eq!(
            inv.flag_value("-af").as_deref(),
            Some("aresample=async=1,adelay=2500:all=true")
        );
        assert_eq!(inv.last_arg(), Some(Path::new("out.aac")));
    }

    #[test]
    fn test_filler_clip_duration_and_size() {
        let ffmpeg = Ffmpeg::new("ffmpeg");
        let inv = ffmpeg.filler_clip(
            "rendergap_1_cam",
            "black",
            VideoSize { w: 640, h: 360 },
            2.567,
            &encoding(),
            Path::new("seg1.m4v"),
        );
        assert_eq!(inv.flag_value("-t").as_deref(), Some("2.567"));
        assert_eq!(inv.flag_value("-r").as_deref(), Some("30"));
        assert!(inv
            .flag_value("-i")
            .unwrap()
            .starts_with("color=c=black:s=640x360"));
    }

    #[test]
    fn test_mix_lists_every_input() {
        let ffmpeg = Ffmpeg::new("ffmpeg");
        let inputs = vec![PathBuf::from("a.aac"), PathBuf::from("b.aac"), PathBuf::from("c.aac")];
        let inv = ffmpeg.mix_audio("mix", &inputs, Path::new("mix.aac"));
        let args = inv.args_lossy();
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 3);
        assert_eq!(inv.flag_value("-filter_complex").as_deref(), Some("amix=inputs=3"));
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[PathBuf::from("/tmp/a.m4v"), PathBuf::from("/tmp/it's.m4v")]);
        assert_eq!(list, "file '/tmp/a.m4v'\nfile '/tmp/it'\\''s.m4v'\n");
    }

    #[test]
    fn test_rate_formatting() {
        assert_eq!(format_rate(30.0), "30");
        assert_eq!(format_rate(29.97002997), "29.970");
    }
}
