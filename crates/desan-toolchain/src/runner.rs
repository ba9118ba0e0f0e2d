use crate::{Result, ToolchainError};
use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Runs one external tool at a time, killing it once `timeout` elapses.
#[derive(Debug, Clone, Copy)]
pub struct ToolRunner {
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `tool` and fail with `ToolFailed` on a non-zero exit.
    pub fn run<I, S>(&self, tool: &str, args: I) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.output(tool, args)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(ToolchainError::ToolFailed {
                tool: tool.to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Run `tool` and return whatever it produced, whatever its exit status.
    pub fn output<I, S>(&self, tool: &str, args: I) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(tool);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(command = ?command, "running tool");

        let mut child = command.spawn().map_err(|source| ToolchainError::Spawn {
            tool: tool.to_string(),
            source,
        })?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.wait(&mut child)? {
            Some(status) => status,
            None => {
                child.kill()?;
                child.wait()?;
                return Err(ToolchainError::ToolTimeout {
                    tool: tool.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        Ok(ToolOutput {
            status,
            stdout: join(stdout),
            stderr: join(stderr),
        })
    }

    fn wait(&self, child: &mut Child) -> Result<Option<ExitStatus>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS))
    }
}

// Pipes are read on their own threads so a chatty tool cannot block on a full buffer.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            String::from_utf8_lossy(&buffer).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
