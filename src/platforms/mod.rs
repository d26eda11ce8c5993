pub mod cli;
pub mod virtual_;

use async_trait::async_trait;

use crate::agent::loop_::{AgentLoop, ChunkSink};
use crate::core::ArcError;

/// Something that can process one user message, streaming text chunks
/// into the sink. Platforms drive implementations of this; the agent
/// loop is the canonical one.
#[async_trait]
pub trait MessageHandler: Send {
    async fn handle(&mut self, input: &str, sink: &ChunkSink) -> Result<String, ArcError>;
}

#[async_trait]
impl MessageHandler for AgentLoop {
    async fn handle(&mut self, input: &str, sink: &ChunkSink) -> Result<String, ArcError> {
        self.run(input, sink).await
    }
}

pub use cli::CliPlatform;
pub use virtual_::VirtualPlatform;
