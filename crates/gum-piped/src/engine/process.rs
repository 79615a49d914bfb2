//! Evaluation delegated to an external command.
//!
//! [`ProcessEvaluator`] spawns the configured program once per request, writes
//! the request to stdin as a single JSONL line, closes stdin, and reads a
//! single JSONL reply from stdout. Stderr is captured for diagnostics and is
//! quoted in the failure message when the process misbehaves.
//!
//! Request:
//!
//! ```json
//! {"code":"return Rect()","size":750,"theme":"light"}
//! ```
//!
//! Reply on success and on failure:
//!
//! ```json
//! {"ok":true,"markup":"<svg ...>","width":100,"height":100}
//! {"ok":false,"error":"no_return","message":"no return statement"}
//! ```

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    ENGINE_TARGET, Element, EvaluateError, EvaluateOptions, Evaluator, MarkupElement, Size,
};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Evaluator that runs an external program per request.
#[derive(Debug, Clone)]
pub struct ProcessEvaluator {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct EvaluatorRequest<'a> {
    code: &'a str,
    size: u32,
    theme: &'a str,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum EvaluatorFailure {
    Parse,
    NoReturn,
    NoElement,
}

#[derive(Debug, Deserialize)]
struct EvaluatorReply {
    ok: bool,
    #[serde(default)]
    markup: Option<String>,
    #[serde(default)]
    width: Option<f32>,
    #[serde(default)]
    height: Option<f32>,
    #[serde(default)]
    error: Option<EvaluatorFailure>,
    #[serde(default)]
    message: Option<String>,
}

impl ProcessEvaluator {
    /// Creates an evaluator running `program` with `args`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    fn name(&self) -> String {
        self.program.display().to_string()
    }

    fn failure(&self, message: impl std::fmt::Display) -> EvaluateError {
        EvaluateError::syntax(format!("evaluator '{}' {message}", self.name()))
    }

    fn spawn(&self) -> Result<Child, EvaluateError> {
        debug!(
            target: ENGINE_TARGET,
            program = %self.program.display(),
            "spawning evaluator process"
        );
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| self.failure(format_args!("failed to start: {error}")))
    }

    /// Writes the request on a helper thread so the deadline also covers a
    /// process that never drains its stdin.
    fn write_request(
        &self,
        child: &mut Child,
        request: &EvaluatorRequest<'_>,
    ) -> Result<thread::JoinHandle<io::Result<()>>, EvaluateError> {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.failure("has no stdin pipe"))?;
        let mut line = serde_json::to_vec(request).map_err(|error| {
            self.failure(format_args!("request could not be encoded: {error}"))
        })?;
        line.push(b'\n');
        // Dropping stdin at the end of the thread closes the pipe.
        Ok(thread::spawn(move || {
            stdin.write_all(&line).and_then(|()| stdin.flush())
        }))
    }

    /// Reads the reply line on a helper thread so the timeout also covers a
    /// process that never writes.
    fn read_reply(&self, child: &mut Child, deadline: Instant) -> Result<String, EvaluateError> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.failure("has no stdout pipe"))?;
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let mut line = String::new();
            let result = BufReader::new(stdout).read_line(&mut line).map(|_| line);
            drop(sender.send(result));
        });

        let remaining = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining) {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(error)) => Err(self.failure(format_args!("could not be read: {error}"))),
            Err(_) => {
                self.kill(child);
                Err(self.timed_out())
            }
        }
    }

    fn wait_for_exit(
        &self,
        child: &mut Child,
        deadline: Instant,
    ) -> Result<ExitStatus, EvaluateError> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    self.kill(child);
                    return Err(self.timed_out());
                }
                Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
                Err(error) => {
                    return Err(self.failure(format_args!("could not be awaited: {error}")));
                }
            }
        }
    }

    fn timed_out(&self) -> EvaluateError {
        self.failure(format_args!("timed out after {:?}", self.timeout))
    }

    fn kill(&self, child: &mut Child) {
        warn!(
            target: ENGINE_TARGET,
            program = %self.program.display(),
            timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            "evaluator timed out, killing process"
        );
        drop(child.kill());
        drop(child.wait());
    }

    fn interpret(&self, line: &str) -> Result<Box<dyn Element>, EvaluateError> {
        if line.trim().is_empty() {
            return Err(self.failure("produced no output"));
        }
        let reply: EvaluatorReply = serde_json::from_str(line.trim())
            .map_err(|error| self.failure(format_args!("produced an invalid reply: {error}")))?;

        if !reply.ok {
            let message = reply
                .message
                .unwrap_or_else(|| String::from("evaluation failed"));
            return Err(match reply.error.unwrap_or(EvaluatorFailure::Parse) {
                EvaluatorFailure::Parse => EvaluateError::syntax(message),
                EvaluatorFailure::NoReturn => EvaluateError::no_return(message),
                EvaluatorFailure::NoElement => EvaluateError::no_element(message),
            });
        }

        match (reply.markup, reply.width, reply.height) {
            (Some(markup), Some(width), Some(height)) => {
                Ok(Box::new(MarkupElement::new(markup, Size::new(width, height))))
            }
            _ => Err(self.failure("reply is missing markup, width or height")),
        }
    }
}

/// Collects stderr on a helper thread so a chatty child never blocks.
fn capture_stderr(child: &mut Child) -> Option<thread::JoinHandle<String>> {
    let stderr = child.stderr.take()?;
    Some(thread::spawn(move || {
        let mut buffer = String::new();
        drop(BufReader::new(stderr).read_to_string(&mut buffer));
        buffer.trim().to_owned()
    }))
}

impl Evaluator for ProcessEvaluator {
    fn evaluate(
        &self,
        code: &str,
        options: &EvaluateOptions,
    ) -> Result<Box<dyn Element>, EvaluateError> {
        let deadline = Instant::now() + self.timeout;
        let mut child = self.spawn()?;
        let stderr = capture_stderr(&mut child);

        let request = EvaluatorRequest {
            code,
            size: options.size,
            theme: options.theme.as_str(),
        };
        let exchange = self.write_request(&mut child, &request).and_then(|writer| {
            self.read_reply(&mut child, deadline)
                .map(|line| (writer, line))
        });
        let (writer, line) = match exchange {
            Ok(exchanged) => exchanged,
            Err(error) => {
                drop(child.kill());
                drop(child.wait());
                return Err(error);
            }
        };

        let status = self.wait_for_exit(&mut child, deadline)?;
        // A descendant may still hold stdin open; never wait on the writer.
        let write_error = if writer.is_finished() {
            match writer.join() {
                Ok(Ok(())) => None,
                Ok(Err(error)) => Some(error.to_string()),
                Err(_) => Some(String::from("request writer panicked")),
            }
        } else {
            None
        };
        let stderr_text = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !stderr_text.is_empty() {
            debug!(
                target: ENGINE_TARGET,
                program = %self.program.display(),
                stderr = %stderr_text,
                "evaluator stderr output"
            );
        }

        // A reply that classifies the failure is more useful than the exit status.
        match self.interpret(&line) {
            Ok(element) if status.success() => Ok(element),
            Err(error) if !line.trim().is_empty() => Err(error),
            _ if write_error.is_some() && status.success() => Err(self.failure(format_args!(
                "rejected its input: {}",
                write_error.unwrap_or_default()
            ))),
            Err(error) if status.success() => Err(error),
            _ if stderr_text.is_empty() => Err(self.failure(format_args!("exited with {status}"))),
            _ => Err(self.failure(format_args!("exited with {status}: {stderr_text}"))),
        }
    }
}
