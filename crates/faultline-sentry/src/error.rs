use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdaptorError {
    /// A context update named a field outside the recognized set. This is a
    /// programmer error at the calling site, not a condition to retry.
    #[error("Unknown field \"{field}\" passed to {caller}()")]
    UnsupportedContextField { field: String, caller: &'static str },

    #[error("Configuration error: {0}")]
    Config(#[from] faultline_config::ConfigError),
}
