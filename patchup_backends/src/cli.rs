use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use patchup_backend_api::{BackendError, BackendResult};
use tracing::debug;
use wait_timeout::ChildExt;

/// Runs the `git` binary inside one working tree.
#[derive(Debug, Clone)]
pub(crate) struct GitCli {
    binary: OsString,
    work_tree: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub(crate) fn new(binary: OsString, work_tree: &Path, timeout: Duration) -> Self {
        Self {
            binary,
            work_tree: work_tree.to_path_buf(),
            timeout,
        }
    }

    /// Run a query bounded by the configured timeout and require a zero
    /// exit status.
    pub(crate) fn run(
        &self,
        args: &[&str],
        stdin_payload: Option<&str>,
    ) -> BackendResult<ProcessOutput> {
        let output = self.execute(args, stdin_payload, Some(self.timeout))?;
        self.require_success(args, output)
    }

    /// Like [`GitCli::run`] but waits as long as git needs. Used for
    /// network operations.
    pub(crate) fn run_unbounded(
        &self,
        args: &[&str],
        stdin_payload: Option<&str>,
    ) -> BackendResult<ProcessOutput> {
        let output = self.execute(args, stdin_payload, None)?;
        self.require_success(args, output)
    }

    /// Run without a timeout and report the exit status without
    /// interpreting it.
    pub(crate) fn status(
        &self,
        args: &[&str],
        stdin_payload: Option<&str>,
    ) -> BackendResult<ProcessOutput> {
        self.execute(args, stdin_payload, None)
    }

    fn require_success(
        &self,
        args: &[&str],
        output: ProcessOutput,
    ) -> BackendResult<ProcessOutput> {
        if output.code != Some(0) {
            return Err(BackendError::Command {
                command: self.render(args),
                status: output.describe_status(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn execute(
        &self,
        args: &[&str],
        stdin_payload: Option<&str>,
        timeout: Option<Duration>,
    ) -> BackendResult<ProcessOutput> {
        debug!(command = %self.render(args), "running git");

        let mut command = Command::new(&self.binary);
        command.args(args);
        command.current_dir(&self.work_tree);
        command.stdin(if stdin_payload.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.env("GIT_TERMINAL_PROMPT", "0");

        let mut child = command.spawn().map_err(|source| BackendError::Spawn {
            program: self.binary.to_string_lossy().into_owned(),
            source,
        })?;

        let stdout_handle = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || -> io::Result<Vec<u8>> {
                let mut buffer = Vec::new();
                stdout.read_to_end(&mut buffer)?;
                Ok(buffer)
            })
        });

        let stderr_handle = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || -> io::Result<Vec<u8>> {
                let mut buffer = Vec::new();
                stderr.read_to_end(&mut buffer)?;
                Ok(buffer)
            })
        });

        if let (Some(body), Some(mut stdin)) = (stdin_payload, child.stdin.take()) {
            match stdin.write_all(body.as_bytes()) {
                Ok(()) => {}
                // git stopped reading; its exit status says why.
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                    debug!(command = %self.render(args), "git closed stdin early");
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = join_reader(stdout_handle, "stdout");
                    let _ = join_reader(stderr_handle, "stderr");
                    return Err(BackendError::message(format!(
                        "failed to write to git stdin: {err}"
                    )));
                }
            }
        }

        let waited = match timeout {
            Some(limit) => child.wait_timeout(limit),
            None => child.wait().map(Some),
        };
        let status = match waited {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BackendError::Timeout {
                    command: self.render(args),
                    seconds: timeout.map_or(0, |limit| limit.as_secs()),
                });
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BackendError::message(format!(
                    "failed waiting on git: {err}"
                )));
            }
        };

        let stdout = join_reader(stdout_handle, "stdout")?;
        let stderr = join_reader(stderr_handle, "stderr")?;

        Ok(ProcessOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }

    fn render(&self, args: &[&str]) -> String {
        let mut rendered = self.binary.to_string_lossy().into_owned();
        for arg in args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

fn join_reader(
    handle: Option<std::thread::JoinHandle<io::Result<Vec<u8>>>>,
    stream: &str,
) -> BackendResult<String> {
    match handle {
        Some(handle) => {
            let bytes = handle
                .join()
                .map_err(|_| BackendError::message(format!("failed to join git {stream} reader")))?
                .map_err(|err| {
                    BackendError::message(format!("failed to read git {stream}: {err}"))
                })?;
            Ok(String::from_utf8_lossy(&bytes).to_string())
        }
        None => Ok(String::new()),
    }
}

#[derive(Debug)]
pub(crate) struct ProcessOutput {
    pub(crate) code: Option<i32>,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl ProcessOutput {
    fn describe_status(&self) -> String {
        self.code
            .map_or_else(|| "terminated".to_string(), |c| c.to_string())
    }
}
