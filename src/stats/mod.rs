pub mod batch;
pub mod counters;
pub mod derived;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod rating;
pub mod recalculator;
pub mod repository;
pub mod updater;

mod errors;

pub use batch::StatsBatchScheduler;
pub use errors::StatsError;
pub use models::*;
pub use recalculator::StatsRecalculator;
pub use repository::{InMemoryStatsRepository, StatsRepository};
pub use updater::UserStatsUpdater;
