pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{AppConfig, LoaderConfig, ModelConfig, ScraperConfig};
pub use error::{ErrorKind, GleanerError, Result};
pub use types::*;
