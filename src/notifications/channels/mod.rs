pub mod cli;
pub mod file;
pub mod telegram;

pub use cli::{CliChannel, PendingQueue};
pub use file::FileChannel;
pub use telegram::TelegramChannel;
