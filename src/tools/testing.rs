//! Scripted [`ToolRunner`] for exercising the pipeline without real binaries

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::tools::{Invocation, ToolOutput, ToolRunner};

type Handler = Box<dyn Fn(&Invocation) -> Result<ToolOutput> + Send + Sync>;

/// Records every invocation and answers it with a handler closure
///
/// The handler is where tests simulate side effects: writing the output file
/// ffmpeg would have produced, emitting probe text, dropping N raw frames
/// into a sequence directory.
pub(crate) struct ScriptedRunner {
    handler: Handler,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&Invocation) -> Result<ToolOutput> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Runner that creates each invocation's output file and succeeds
    pub(crate) fn touching_outputs() -> Self {
        Self::new(|inv| {
            touch_output(inv);
            Ok(ToolOutput::default())
        })
    }

    pub(crate) fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn contexts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.context).collect()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        (self.handler)(invocation)
    }
}

/// Create an empty file at the invocation's last argument
pub(crate) fn touch_output(inv: &Invocation) {
    if let Some(path) = inv.last_arg() {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let _ = std::fs::write(path, b"");
    }
}

/// Stdout of a successful run
pub(crate) fn stdout(text: &str) -> ToolOutput {
    ToolOutput {
        stdout: text.to_string(),
        stderr: String::new(),
    }
}
