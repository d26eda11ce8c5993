pub mod loader;
pub mod schema;

pub use loader::{default_project_config_path, default_user_config_path, load, load_default};
pub use schema::{expand_home, ArcConfig};
