use std::ffi::{OsStr, OsString};
use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::UtilError;
use crate::Result;

/// Poll interval while waiting for a child with a deadline.
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Result of running a subprocess.
#[derive(Debug)]
pub struct ChildOutput {
    /// The exit status.
    pub status: ExitStatus,
    /// Captured stdout.
    pub stdout: Vec<u8>,
    /// Captured stderr.
    pub stderr: Vec<u8>,
}

impl ChildOutput {
    /// Returns true if the process exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

enum StdoutEvent {
    Complete(Vec<u8>),
    Overrun,
}

/// Builder for capturing subprocess execution.
///
/// Wraps `std::process::Command` with a fluent API and adds the three
/// behaviors the helper needs everywhere: feeding stdin without blocking the
/// read side, an absolute deadline that kills the child on expiry, and a cap
/// on how much stdout the child may produce before the run is aborted.
/// stdout and stderr are always captured; stdin is closed unless `input` is
/// set.
pub struct ChildProcess {
    program: OsString,
    args: Vec<OsString>,
    env_vars: Vec<(OsString, OsString)>,
    input: Option<Vec<u8>>,
    max_output: Option<usize>,
    timeout: Option<Duration>,
}

impl ChildProcess {
    /// Create a new builder for the given program.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            env_vars: Vec::new(),
            input: None,
            max_output: None,
            timeout: None,
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Self {
        for arg in args {
            self.args.push(arg.as_ref().to_os_string());
        }
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<OsStr>, val: impl AsRef<OsStr>) -> Self {
        self.env_vars
            .push((key.as_ref().to_os_string(), val.as_ref().to_os_string()));
        self
    }

    /// Bytes to feed to the child's stdin.
    pub fn input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Abort the run if the child writes more than `limit` bytes to stdout.
    pub fn max_output(mut self, limit: usize) -> Self {
        self.max_output = Some(limit);
        self
    }

    /// Kill the child and fail if it has not exited within `duration`.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Get the command string for error messages.
    fn command_string(&self) -> String {
        let mut s = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            s.push(' ');
            s.push_str(&arg.to_string_lossy());
        }
        s
    }

    /// Run the command to completion.
    pub fn run(&self) -> Result<ChildOutput> {
        let cmd_str = self.command_string();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, val) in &self.env_vars {
            cmd.env(key, val);
        }
        cmd.stdin(if self.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| UtilError::Spawn {
            command: cmd_str.clone(),
            source: e,
        })?;

        // Feed stdin from its own thread. A broken pipe is not an error
        // here: the child deciding to exit early is reported via its status.
        let stdin_thread = match (child.stdin.take(), self.input.clone()) {
            (Some(mut stdin), Some(input)) => Some(thread::spawn(move || {
                let _ = stdin.write_all(&input);
            })),
            _ => None,
        };

        // Bounded stdout capture. The reader stops at limit + 1 so an
        // overrun is detected without buffering the whole response.
        let (stdout_tx, stdout_rx) = mpsc::channel();
        let cap = self.max_output;
        let mut stdout_pipe = child.stdout.take().expect("stdout is piped");
        let stdout_thread = thread::spawn(move || {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 8192];
            loop {
                match stdout_pipe.read(&mut chunk) {
                    Ok(0) => {
                        let _ = stdout_tx.send(StdoutEvent::Complete(buf));
                        return;
                    }
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        if cap.is_some_and(|cap| buf.len() > cap) {
                            let _ = stdout_tx.send(StdoutEvent::Overrun);
                            return;
                        }
                    }
                    Err(_) => {
                        let _ = stdout_tx.send(StdoutEvent::Complete(buf));
                        return;
                    }
                }
            }
        });

        let mut stderr_pipe = child.stderr.take().expect("stderr is piped");
        let stderr_thread = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf);
            buf
        });

        let reap = |child: &mut std::process::Child| {
            let _ = child.kill();
            let _ = child.wait();
        };

        // Wait for exit, watching the deadline and the output cap.
        let start = Instant::now();
        let mut stdout_event: Option<StdoutEvent> = None;
        let status = loop {
            if stdout_event.is_none() {
                if let Ok(event) = stdout_rx.try_recv() {
                    if matches!(event, StdoutEvent::Overrun) {
                        reap(&mut child);
                        let _ = stdout_thread.join();
                        let _ = stderr_thread.join();
                        if let Some(t) = stdin_thread {
                            let _ = t.join();
                        }
                        return Err(UtilError::SubprocessOutputLimit {
                            command: cmd_str,
                            limit: cap.unwrap_or(0),
                        });
                    }
                    stdout_event = Some(event);
                }
            }

            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if self.timeout.is_some_and(|t| start.elapsed() > t) {
                        reap(&mut child);
                        let _ = stdout_thread.join();
                        let _ = stderr_thread.join();
                        if let Some(t) = stdin_thread {
                            let _ = t.join();
                        }
                        return Err(UtilError::SubprocessTimeout { command: cmd_str });
                    }
                    thread::sleep(WAIT_POLL);
                }
                Err(e) => {
                    reap(&mut child);
                    return Err(UtilError::Subprocess {
                        command: cmd_str,
                        source: e,
                    });
                }
            }
        };

        // The child has exited, so the capture threads are draining toward
        // EOF; a blocking recv is bounded here.
        let stdout = match stdout_event {
            Some(event) => event,
            None => stdout_rx
                .recv()
                .unwrap_or(StdoutEvent::Complete(Vec::new())),
        };
        let stdout = match stdout {
            StdoutEvent::Complete(buf) => buf,
            StdoutEvent::Overrun => {
                let _ = stdout_thread.join();
                let _ = stderr_thread.join();
                if let Some(t) = stdin_thread {
                    let _ = t.join();
                }
                return Err(UtilError::SubprocessOutputLimit {
                    command: cmd_str,
                    limit: cap.unwrap_or(0),
                });
            }
        };

        let _ = stdout_thread.join();
        let stderr = stderr_thread.join().unwrap_or_default();
        if let Some(t) = stdin_thread {
            let _ = t.join();
        }

        Ok(ChildOutput {
            status,
            stdout,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_echo() {
        let result = ChildProcess::new("echo").arg("hello").run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim_ascii(), b"hello");
    }

    #[test]
    fn capture_stderr() {
        let result = ChildProcess::new("sh")
            .arg("-c")
            .arg("echo error >&2")
            .run()
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stderr.trim_ascii(), b"error");
    }

    #[test]
    fn exit_code() {
        let result = ChildProcess::new("sh").arg("-c").arg("exit 42").run().unwrap();
        assert!(!result.success());
        assert_eq!(result.status.code(), Some(42));
    }

    #[test]
    fn environment_variable() {
        let result = ChildProcess::new("sh")
            .arg("-c")
            .arg("echo $MY_TEST_VAR")
            .env("MY_TEST_VAR", "hello_from_test")
            .run()
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim_ascii(), b"hello_from_test");
    }

    #[test]
    fn feeds_input() {
        let result = ChildProcess::new("cat")
            .input(&b"piped input"[..])
            .run()
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, b"piped input");
    }

    #[test]
    fn input_to_uninterested_child_is_not_an_error() {
        let result = ChildProcess::new("true")
            .input(vec![0u8; 1 << 20])
            .run()
            .unwrap();
        assert!(result.success());
    }

    #[test]
    fn timeout_kills_child() {
        let err = ChildProcess::new("sleep")
            .arg("30")
            .timeout(Duration::from_millis(100))
            .run()
            .unwrap_err();
        assert!(matches!(err, UtilError::SubprocessTimeout { .. }));
    }

    #[test]
    fn timeout_not_hit() {
        let result = ChildProcess::new("echo")
            .arg("fast")
            .timeout(Duration::from_secs(5))
            .run()
            .unwrap();
        assert!(result.success());
    }

    #[test]
    fn output_limit_enforced() {
        let err = ChildProcess::new("sh")
            .arg("-c")
            .arg("dd if=/dev/zero bs=1024 count=64 2>/dev/null")
            .max_output(1024)
            .timeout(Duration::from_secs(10))
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            UtilError::SubprocessOutputLimit { limit: 1024, .. }
        ));
    }

    #[test]
    fn output_at_limit_is_fine() {
        let result = ChildProcess::new("sh")
            .arg("-c")
            .arg("printf abcd")
            .max_output(4)
            .run()
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, b"abcd");
    }
}
