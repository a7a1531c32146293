//! gitfacts-core: Shared types, traits, errors and configuration for gitfacts.

pub mod cancel;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use cancel::CancelToken;
pub use config::{GitfactsConfig, LoggingConfig, RepositoryConfig, ScannersConfig};
pub use error::*;
pub use traits::*;
pub use types::*;
