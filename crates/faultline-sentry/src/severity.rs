//! Severity mapping from source-agnostic tokens to the SDK's scale.

use sentry::Level;

/// Map a severity token onto the SDK's severity scale.
///
/// Total over all input: tokens are matched ASCII case-insensitively with
/// surrounding whitespace ignored, and anything unrecognized maps to
/// [`Level::Warning`].
pub fn from_token(token: &str) -> Level {
    match token.trim().to_ascii_lowercase().as_str() {
        "debug" => Level::Debug,
        "info" | "notice" => Level::Info,
        "warning" | "warn" => Level::Warning,
        "error" | "err" => Level::Error,
        "critical" | "alert" | "emergency" | "fatal" => Level::Fatal,
        other => {
            tracing::debug!("Unrecognized severity token {:?}, using warning", other);
            Level::Warning
        }
    }
}

/// Map a `log` facade level onto the SDK's severity scale.
pub fn from_log_level(level: log::Level) -> Level {
    match level {
        log::Level::Error => Level::Error,
        log::Level::Warn => Level::Warning,
        log::Level::Info => Level::Info,
        log::Level::Debug | log::Level::Trace => Level::Debug,
    }
}
