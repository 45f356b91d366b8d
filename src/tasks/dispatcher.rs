use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{
    errors::TaskError,
    task::{Task, TaskKind},
};

/// A component that executes one kind of task
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task kind this handler is registered under
    fn kind(&self) -> TaskKind;

    /// Runs the task. Handlers must be safe to run again after a failure or
    /// a redelivery of the same task.
    async fn run(&self, task: &Task) -> Result<(), TaskError>;
}

/// Dispatch table from task kind to handler
///
/// Built once at startup and shared by reference with the worker.
pub struct TaskDispatcher {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
    handler_timeout: Duration,
}

impl TaskDispatcher {
    pub fn builder() -> TaskDispatcherBuilder {
        TaskDispatcherBuilder::new()
    }

    /// Runs `task` on its registered handler under the handler timeout
    pub async fn dispatch(&self, task: &Task) -> Result<(), TaskError> {
        let kind = task.kind();
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(TaskError::Unhandled(kind))?;

        debug!(task_kind = %kind, "Dispatching task");

        match timeout(self.handler_timeout, handler.run(task)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(
                    task_kind = %kind,
                    timeout_secs = self.handler_timeout.as_secs(),
                    "Task handler timed out"
                );
                Err(TaskError::Timeout)
            }
        }
    }
}

pub struct TaskDispatcherBuilder {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
    handler_timeout: Duration,
}

impl TaskDispatcherBuilder {
    fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            handler_timeout: Duration::from_secs(60),
        }
    }

    /// Registers `handler` under its own kind, replacing any earlier one
    pub fn with_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        let kind = handler.kind();
        info!(task_kind = %kind, "Registering task handler");
        if self.handlers.insert(kind, handler).is_some() {
            warn!(task_kind = %kind, "Replaced previously registered task handler");
        }
        self
    }

    pub fn with_handler_timeout(mut self, handler_timeout: Duration) -> Self {
        self.handler_timeout = handler_timeout;
        self
    }

    pub fn build(self) -> TaskDispatcher {
        TaskDispatcher {
            handlers: self.handlers,
            handler_timeout: self.handler_timeout,
        }
    }
}
