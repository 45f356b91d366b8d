// Deferred task integration
//
// Tasks are plain serializable values. Producers stage them in an
// EnqueueTransaction and commit through a TaskScheduler; a TaskWorker claims
// due tasks from a TaskSource and routes them through the TaskDispatcher.

// Public API - what other modules can use
pub use dispatcher::{TaskDispatcher, TaskDispatcherBuilder, TaskHandler};
pub use errors::TaskError;
pub use postgres::PostgresTaskQueue;
pub use queue::InMemoryTaskQueue;
pub use scheduler::{EnqueueTransaction, TaskScheduler, TaskSource};
pub use task::{ScheduledTask, Task, TaskKind};
pub use worker::{TaskWorker, WorkerConfig};

// Internal modules
mod dispatcher;
mod errors;
mod postgres;
mod queue;
mod scheduler;
mod task;
mod worker;
