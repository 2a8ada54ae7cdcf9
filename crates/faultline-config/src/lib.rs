//! Layered configuration loading for the Faultline error-reporting layer

mod error;
mod options;

pub use error::ConfigError;
pub use options::{ProxyConfig, RawOptions, SentryOptions, ENV_PREFIX};
