//! Task routing for decoded requests.
//!
//! The registry maps a task name to a [`TaskHandler`]. Two tasks are built
//! in: `evaluate` returns the element's markup and `render` additionally
//! rasterises it and returns the image bytes in base64. Names are matched
//! exactly; anything else is rejected with an unknown-task error.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use super::DISPATCH_TARGET;
use super::errors::TaskError;
use super::request::RenderOptions;
use crate::engine::{ENGINE_TARGET, EvaluateOptions, Evaluator, RasterEncoder, RasterOptions, Size};

/// Built-in task names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskName {
    /// Evaluate the source and return its markup.
    Evaluate,
    /// Evaluate the source and return base64-encoded raster bytes.
    Render,
}

impl TaskName {
    /// Parses a task name. Matching is exact and case-sensitive.
    ///
    /// # Errors
    ///
    /// Returns an unknown-task error if the value names no built-in task.
    pub fn parse(value: &str) -> Result<Self, TaskError> {
        match value {
            "evaluate" => Ok(Self::Evaluate),
            "render" => Ok(Self::Render),
            _ => Err(TaskError::unknown_task(value)),
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Evaluate => "evaluate",
            Self::Render => "render",
        }
    }
}

/// Executes one kind of task.
pub trait TaskHandler: Send + Sync {
    /// Runs the task against `code`.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] tagged with the stage that failed.
    fn handle(&self, code: &str, options: &RenderOptions) -> Result<String, TaskError>;
}

/// Evaluates and serialises, returning the markup with the element's size.
fn evaluate_markup(
    evaluator: &dyn Evaluator,
    code: &str,
    options: &RenderOptions,
) -> Result<(String, Size), TaskError> {
    let evaluate_options = EvaluateOptions {
        size: options.size,
        theme: options.theme.clone(),
    };
    let element = evaluator
        .evaluate(code, &evaluate_options)
        .map_err(TaskError::from_evaluate)?;
    let markup = element
        .to_markup()
        .map_err(|error| TaskError::from_serialize(&error))?;
    debug!(
        target: ENGINE_TARGET,
        bytes = markup.len(),
        "serialised element"
    );
    Ok((markup, element.size()))
}

/// Handler for the `evaluate` task.
pub struct EvaluateTask {
    evaluator: Arc<dyn Evaluator>,
}

impl EvaluateTask {
    /// Creates the handler.
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self { evaluator }
    }
}

impl TaskHandler for EvaluateTask {
    fn handle(&self, code: &str, options: &RenderOptions) -> Result<String, TaskError> {
        evaluate_markup(self.evaluator.as_ref(), code, options).map(|(markup, _)| markup)
    }
}

/// Handler for the `render` task.
pub struct RenderTask {
    evaluator: Arc<dyn Evaluator>,
    encoder: Arc<dyn RasterEncoder>,
}

impl RenderTask {
    /// Creates the handler.
    pub fn new(evaluator: Arc<dyn Evaluator>, encoder: Arc<dyn RasterEncoder>) -> Self {
        Self { evaluator, encoder }
    }
}

impl TaskHandler for RenderTask {
    fn handle(&self, code: &str, options: &RenderOptions) -> Result<String, TaskError> {
        let (markup, intrinsic) = evaluate_markup(self.evaluator.as_ref(), code, options)?;
        let raster_options = RasterOptions {
            size: options.size,
            background: options.background.clone(),
            intrinsic,
        };
        let bytes = self
            .encoder
            .encode(&markup, &raster_options)
            .map_err(|error| TaskError::from_encode(&error))?;
        Ok(STANDARD.encode(bytes))
    }
}

/// Maps task names to handlers.
pub struct TaskRegistry {
    handlers: HashMap<TaskName, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    /// Creates a registry with the built-in `evaluate` and `render` tasks.
    pub fn new(evaluator: Arc<dyn Evaluator>, encoder: Arc<dyn RasterEncoder>) -> Self {
        let mut handlers: HashMap<TaskName, Arc<dyn TaskHandler>> = HashMap::new();
        handlers.insert(
            TaskName::Evaluate,
            Arc::new(EvaluateTask::new(Arc::clone(&evaluator))),
        );
        handlers.insert(
            TaskName::Render,
            Arc::new(RenderTask::new(evaluator, encoder)),
        );
        Self { handlers }
    }

    /// Replaces the handler for `task`.
    #[must_use]
    pub fn with_handler(mut self, task: TaskName, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(task, handler);
        self
    }

    /// Routes `code` to the handler named by `task`.
    ///
    /// # Errors
    ///
    /// Returns an unknown-task error for unrecognised names, otherwise
    /// whatever the handler reports.
    pub fn dispatch(
        &self,
        task: &str,
        code: &str,
        options: &RenderOptions,
    ) -> Result<String, TaskError> {
        let name = TaskName::parse(task)?;
        let handler = self
            .handlers
            .get(&name)
            .ok_or_else(|| TaskError::unknown_task(task))?;
        debug!(
            target: DISPATCH_TARGET,
            task = name.as_str(),
            size = options.size,
            "running task"
        );
        handler.handle(code, options)
    }
}
