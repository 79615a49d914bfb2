//! Concurrent request loop with in-order responses.
//!
//! A reader thread frames the input into lines, assigns each a sequence
//! number and decodes it. Decoded requests go to a pool of worker threads;
//! requests that fail to decode are answered straight away. Completed
//! responses flow back to the calling thread, which releases them through a
//! [`Sequencer`] so output order always matches input order.

use std::any::Any;
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use gum_pipe_config::{Config, RenderDefaults};
use tracing::{debug, info, warn};

use super::DISPATCH_TARGET;
use super::errors::{PipelineError, TaskError};
use super::registry::TaskRegistry;
use super::request::Request;
use super::response::{Response, ResponseWriter};
use super::sequencer::Sequencer;

/// Decoded requests queued per worker before the reader blocks.
const JOBS_PER_WORKER: usize = 4;

/// Counts reported once the input is exhausted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Responses written.
    pub requests: u64,
    /// Responses that carried a failure.
    pub failures: u64,
}

impl PipelineSummary {
    fn record(&mut self, response: &Response) {
        self.requests += 1;
        if !response.ok {
            self.failures += 1;
        }
    }
}

/// A decoded request awaiting a worker.
struct Job {
    sequence: u64,
    request: Request,
}

/// A response awaiting its turn to be written.
struct Completed {
    sequence: u64,
    response: Response,
}

/// One framed input line.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(Vec<u8>),
    Oversized(usize),
}

/// Limits applied by the reader thread.
#[derive(Debug, Clone)]
struct ReaderSettings {
    defaults: RenderDefaults,
    max_request_bytes: usize,
}

/// Request loop bound to a task registry.
pub struct Pipeline {
    registry: Arc<TaskRegistry>,
    settings: ReaderSettings,
    workers: usize,
}

impl Pipeline {
    /// Creates a pipeline using the limits and defaults from `config`.
    pub fn new(registry: TaskRegistry, config: &Config) -> Self {
        Self {
            registry: Arc::new(registry),
            settings: ReaderSettings {
                defaults: config.render_defaults(),
                max_request_bytes: config.max_request_bytes,
            },
            workers: config.workers.max(1),
        }
    }

    /// Number of worker threads the pipeline runs.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Serves requests from `input` until it reaches end of stream.
    ///
    /// Every input line produces exactly one response line on `output`, in
    /// input order. Requests run concurrently; a request whose handler
    /// panics is answered with an unknown-kind failure.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Output`] as soon as a response cannot be
    /// written. Responses already in flight are abandoned. A read failure on
    /// `input` is returned after every request read before it has been
    /// answered.
    pub fn run<R, W>(&self, input: R, output: W) -> Result<PipelineSummary, PipelineError>
    where
        R: BufRead + Send + 'static,
        W: Write,
    {
        let (job_tx, job_rx) = mpsc::sync_channel::<Job>(self.workers * JOBS_PER_WORKER);
        let (done_tx, done_rx) = mpsc::channel::<Completed>();

        let reader = spawn_reader(input, self.settings.clone(), job_tx, done_tx.clone())?;
        let job_rx = Arc::new(Mutex::new(job_rx));
        let workers = (0..self.workers)
            .map(|index| {
                spawn_worker(
                    index,
                    Arc::clone(&self.registry),
                    Arc::clone(&job_rx),
                    done_tx.clone(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        drop(done_tx);

        let summary = write_in_order(&done_rx, output)?;

        join(reader, "reader")??;
        for worker in workers {
            join(worker, "worker")?;
        }
        Ok(summary)
    }
}

fn spawn_reader<R>(
    input: R,
    settings: ReaderSettings,
    jobs: SyncSender<Job>,
    done: Sender<Completed>,
) -> Result<JoinHandle<Result<(), PipelineError>>, PipelineError>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("gum-reader".to_owned())
        .spawn(move || read_requests(input, &settings, &jobs, &done))
        .map_err(|source| PipelineError::Spawn {
            thread: "reader",
            source,
        })
}

/// Frames and decodes input until end of stream or until nobody listens.
fn read_requests<R: BufRead>(
    mut input: R,
    settings: &ReaderSettings,
    jobs: &SyncSender<Job>,
    done: &Sender<Completed>,
) -> Result<(), PipelineError> {
    let mut sequence = 0_u64;
    while let Some(frame) =
        read_frame(&mut input, settings.max_request_bytes).map_err(PipelineError::Input)?
    {
        let decoded = match frame {
            Frame::Line(line) => Request::decode(&line, &settings.defaults),
            Frame::Oversized(length) => Err(TaskError::request_too_large(
                length,
                settings.max_request_bytes,
            )),
        };
        let delivered = match decoded {
            Ok(request) => jobs.send(Job { sequence, request }).is_ok(),
            Err(error) => {
                debug!(
                    target: DISPATCH_TARGET,
                    sequence,
                    kind = error.kind().as_str(),
                    "rejected request"
                );
                done.send(Completed {
                    sequence,
                    response: Response::failure(error),
                })
                .is_ok()
            }
        };
        if !delivered {
            break;
        }
        sequence += 1;
    }
    debug!(target: DISPATCH_TARGET, requests = sequence, "input exhausted");
    Ok(())
}

/// Reads one newline-delimited frame without buffering more than
/// `max_bytes` of it.
///
/// Returns `None` at end of stream. A final line without a trailing newline
/// is still a frame. Lines longer than `max_bytes` are drained and reported
/// as [`Frame::Oversized`] with their full length.
fn read_frame<R: BufRead>(reader: &mut R, max_bytes: usize) -> io::Result<Option<Frame>> {
    let mut line = Vec::new();
    let mut length = 0_usize;
    let mut started = false;
    loop {
        let available = match reader.fill_buf() {
            Ok(available) => available,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        if available.is_empty() {
            break;
        }
        started = true;
        let newline = available.iter().position(|&byte| byte == b'\n');
        let (chunk, consumed) = match newline {
            Some(position) => (available.split_at(position).0, position + 1),
            None => (available, available.len()),
        };
        length += chunk.len();
        if length <= max_bytes {
            line.extend_from_slice(chunk);
        }
        reader.consume(consumed);
        if newline.is_some() {
            break;
        }
    }

    if !started {
        return Ok(None);
    }
    if length > max_bytes {
        return Ok(Some(Frame::Oversized(length)));
    }
    Ok(Some(Frame::Line(line)))
}

fn spawn_worker(
    index: usize,
    registry: Arc<TaskRegistry>,
    jobs: Arc<Mutex<Receiver<Job>>>,
    done: Sender<Completed>,
) -> Result<JoinHandle<()>, PipelineError> {
    thread::Builder::new()
        .name(format!("gum-worker-{index}"))
        .spawn(move || run_worker(&registry, &jobs, &done))
        .map_err(|source| PipelineError::Spawn {
            thread: "worker",
            source,
        })
}

fn run_worker(registry: &TaskRegistry, jobs: &Mutex<Receiver<Job>>, done: &Sender<Completed>) {
    loop {
        let next = jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        let Ok(Job { sequence, request }) = next else {
            break;
        };
        let response = Response::from_outcome(execute(registry, &request));
        match response.error() {
            Some(error) => info!(
                target: DISPATCH_TARGET,
                sequence,
                task = request.task(),
                kind = error.kind().as_str(),
                message = error.message(),
                "request failed"
            ),
            None => debug!(
                target: DISPATCH_TARGET,
                sequence,
                task = request.task(),
                "request succeeded"
            ),
        }
        if done.send(Completed { sequence, response }).is_err() {
            break;
        }
    }
}

/// Runs one request, converting a handler panic into a failure.
fn execute(registry: &TaskRegistry, request: &Request) -> Result<String, TaskError> {
    panic::catch_unwind(AssertUnwindSafe(|| {
        registry.dispatch(request.task(), request.code(), request.options())
    }))
    .unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        warn!(
            target: DISPATCH_TARGET,
            task = request.task(),
            panic = message,
            "task handler panicked"
        );
        Err(TaskError::internal(format!("task failed unexpectedly: {message}")))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn write_in_order<W: Write>(
    completed: &Receiver<Completed>,
    output: W,
) -> Result<PipelineSummary, PipelineError> {
    let mut writer = ResponseWriter::new(output);
    let mut sequencer = Sequencer::new();
    let mut summary = PipelineSummary::default();
    for Completed { sequence, response } in completed {
        for ready in sequencer.push(sequence, response) {
            writer.write_response(&ready)?;
            summary.record(&ready);
        }
    }
    if sequencer.held() > 0 {
        warn!(
            target: DISPATCH_TARGET,
            held = sequencer.held(),
            waiting_for = sequencer.next_sequence(),
            "responses left unwritten after a missing completion"
        );
    }
    Ok(summary)
}

fn join<T>(handle: JoinHandle<T>, thread: &'static str) -> Result<T, PipelineError> {
    handle
        .join()
        .map_err(|_| PipelineError::ThreadPanic { thread })
}
