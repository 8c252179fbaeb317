use std::{
    ffi::{OsStr, OsString},
    io::Read,
    process::{Child, Command, Stdio},
    sync::mpsc::{self, Receiver},
    thread,
    time::{Duration, Instant},
};

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// An external program plus any leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Run the tool with `extra` appended to its arguments and return its
    /// stdout.
    ///
    /// Spawn failures map to [`Error::ToolUnavailable`], a non-zero exit to
    /// [`Error::ToolFailed`]. The child is killed once `timeout` elapses.
    pub fn run(&self, extra: &[&OsStr], timeout: Duration) -> Result<Vec<u8>> {
        let tool = self.name();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::ToolUnavailable {
                tool: tool.clone(),
                source,
            })?;

        // Drain both pipes while waiting so a chatty child cannot block on a
        // full pipe buffer.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // No deadline when `timeout` does not fit in an `Instant`.
        let deadline = Instant::now().checked_add(timeout);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(error) => {
                    stop(&mut child);
                    return Err(error.into());
                }
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                stop(&mut child);
                return Err(Error::Timeout { tool, timeout });
            }
            thread::sleep(POLL_INTERVAL);
        };

        // A background process may still hold the pipes after the child
        // exits.
        let (Some(stdout), Some(stderr)) =
            (collect(&stdout, deadline), collect(&stderr, deadline))
        else {
            return Err(Error::Timeout { tool, timeout });
        };

        if !status.success() {
            return Err(Error::ToolFailed {
                tool,
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        tracing::trace!(tool = %tool, bytes = stdout.len(), "tool finished");
        Ok(stdout)
    }
}

fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    match pipe {
        Some(mut pipe) => {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                let _ = tx.send(buf);
            });
        }
        None => {
            let _ = tx.send(Vec::new());
        }
    }
    rx
}

/// Wait for a drained pipe, giving up at `deadline`.
fn collect(rx: &Receiver<Vec<u8>>, deadline: Option<Instant>) -> Option<Vec<u8>> {
    match deadline {
        Some(deadline) => rx
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .ok(),
        None => rx.recv().ok(),
    }
}
