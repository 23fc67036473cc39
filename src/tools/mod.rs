//! # External Tools
//!
//! Every probe, transcode, compositor and encoder call goes through the
//! [`ToolRunner`] trait. Failures come back as [`ToolError`] values carrying
//! the captured output; nothing in here terminates the process.
//!
//! Argument spelling for ffmpeg/ffprobe lives in [`ffmpeg`] so the pipeline
//! code only deals with intent (extract, concat, mix, ...).

pub mod compositor;
pub mod ffmpeg;
pub mod process;

#[cfg(test)]
pub(crate) mod testing;

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;

pub use compositor::CompositorTools;
pub use ffmpeg::{Ffmpeg, Ffprobe};
pub use process::ProcessRunner;

/// One external program call
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Program to execute
    pub program: PathBuf,

    /// Arguments in order
    pub args: Vec<OsString>,

    /// Short label used in logs and error reports (e.g. `extractseg_3_cam`)
    pub context: String,

    /// Working directory for the child, inherited if unset
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(program: P, context: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            context: context.into(),
            current_dir: None,
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Display name of the program (file name without directories)
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Arguments as lossy strings, for logging and test assertions
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Value following `flag` in the argument list
    pub fn flag_value(&self, flag: &str) -> Option<String> {
        let args = self.args_lossy();
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1).cloned())
    }

    /// Last argument, which is the output path for most ffmpeg calls
    pub fn last_arg(&self) -> Option<&Path> {
        self.args.last().map(|a| Path::new(a.as_os_str()))
    }

    /// Shell-like rendering for log lines
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in self.args_lossy() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

/// Captured output of a successful tool run
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs
///
/// A nonzero exit is reported as [`ToolError::Failed`](crate::error::ToolError::Failed);
/// implementations never swallow it.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run to completion and capture stdout/stderr
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput>;

    /// Run to completion, handing stdout to `sink` in whatever chunks the
    /// pipe delivers. The returned output has an empty `stdout`.
    async fn run_streaming(
        &self,
        invocation: &Invocation,
        sink: &mut (dyn for<'b> FnMut(&'b [u8]) -> Result<()> + Send),
    ) -> Result<ToolOutput> {
        let output = self.run(invocation).await?;
        sink(output.stdout.as_bytes())?;
        Ok(ToolOutput {
            stdout: String::new(),
            stderr: output.stderr,
        })
    }
}
