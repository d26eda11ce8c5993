pub mod cost;
pub mod logging;

pub use cost::{CostSummary, CostTracker};
pub use logging::EventLogMiddleware;
