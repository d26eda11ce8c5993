pub mod bus;
pub mod errors;
pub mod escalation;
pub mod events;
pub mod kernel;
pub mod registry;
pub mod types;

pub use bus::{EventBus, EventHandler, Middleware, Next, SubscriptionId};
pub use errors::ArcError;
pub use escalation::EscalationBus;
pub use events::{event_type, Event};
pub use kernel::Kernel;
pub use registry::Registry;
