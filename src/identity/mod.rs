pub mod personality;
pub mod soul;

pub use personality::{get_personality, list_personalities, Personality};
pub use soul::{Identity, SoulManager};
