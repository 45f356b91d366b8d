// Library crate for the user stats service
// This file exposes the public API for integration tests

pub mod config;
pub mod shared;
pub mod stats;
pub mod tasks;

// Re-export commonly used types for easier access in tests
pub use config::{AppConfig, ExecutionEnvironment};
pub use shared::{AppError, AppState};
pub use stats::{
    StatsBatchScheduler, StatsError, StatsRecalculator, StatsRepository, UserStats,
    UserStatsUpdater,
};
pub use tasks::{TaskDispatcher, TaskError, TaskScheduler, TaskSource, TaskWorker};
