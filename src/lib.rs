pub mod app;
pub mod config;
pub mod email;
pub mod error;
pub mod gmail;
pub mod telemetry;

pub use error::{report, ConfigError};
