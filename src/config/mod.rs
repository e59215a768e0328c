pub mod app;

pub use app::{AppConfig, DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH};
