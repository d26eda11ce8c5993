pub mod approval;
pub mod engine;

pub use approval::ApprovalFlow;
pub use engine::SecurityEngine;
