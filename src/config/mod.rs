//! Public API for configuration

pub mod error;
pub mod loader;
pub mod types;


pub use error::ConfigError;
pub use loader::load;
pub use types::PipelineConfig;
