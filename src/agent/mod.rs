pub mod loop_;
pub mod registry;
pub mod runner;
pub mod worker_log;

pub use loop_::{AgentLoop, AgentLoopConfig, ChunkSink};
pub use registry::AgentRegistry;
pub use runner::run_agent_on_virtual_platform;
pub use worker_log::WorkerActivityLog;
