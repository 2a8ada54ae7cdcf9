//! Binds an application's logging pipeline to the Sentry SDK: context
//! translation, severity mapping, key normalization, and a `log::Log` writer.

pub mod adaptor;
pub mod context;
pub mod keys;
pub mod severity;
pub mod writer;

mod error;

pub use adaptor::{client_options, SentryAdaptor};
pub use context::{Context, ContextUpdate};
pub use error::AdaptorError;
pub use writer::SentryLogWriter;

// Re-export the crates on the public API surface
pub use faultline_config;
pub use sentry;
