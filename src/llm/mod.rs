pub mod mock;
pub mod ollama;
pub mod provider;

pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use provider::{ChunkStream, GenerateRequest, LlmProvider};
