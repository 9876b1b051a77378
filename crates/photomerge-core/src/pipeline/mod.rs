pub mod config;
pub mod orchestrator;
pub mod types;
pub mod worker;

pub use orchestrator::MergeSession;
pub use types::{LoadReport, MergeStage, NoOpReporter, ProgressReporter};
pub use worker::{MergeCommand, MergeEvent, MergeWorker, Notifier};
