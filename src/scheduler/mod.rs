pub mod engine;
pub mod job;
pub mod store;

pub use engine::{AgentFactory, SchedulerEngine, DEFAULT_POLL_INTERVAL};
pub use job::{Job, Trigger};
pub use store::SchedulerStore;
