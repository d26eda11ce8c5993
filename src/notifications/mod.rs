pub mod base;
pub mod channels;
pub mod router;

pub use base::{Notification, NotificationChannel};
pub use channels::{CliChannel, FileChannel, PendingQueue, TelegramChannel};
pub use router::NotificationRouter;
