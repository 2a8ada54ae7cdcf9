//! A `log::Log` writer that forwards reportable records to Sentry.

use std::sync::Arc;

use log::{Log, Metadata, Record};
use sentry::protocol::Event;

use crate::adaptor::SentryAdaptor;
use crate::severity;

/// Forwards records from the `log` facade to the Sentry SDK through a shared
/// [`SentryAdaptor`].
///
/// A log record carries no exception object, so every reportable record goes
/// through the message path: its level is mapped onto the SDK scale and the
/// locally stored context is re-materialized into the event scope. Errors
/// with a real [`std::error::Error`] behind them are the host application's
/// to report via [`SentryAdaptor::capture_error`].
pub struct SentryLogWriter {
    adaptor: Arc<SentryAdaptor>,
    threshold: log::LevelFilter,
}

impl SentryLogWriter {
    /// Writer reporting records at `Error` and above.
    pub fn new(adaptor: Arc<SentryAdaptor>) -> Self {
        Self::with_threshold(adaptor, log::LevelFilter::Error)
    }

    /// Writer reporting records at `threshold` and above.
    pub fn with_threshold(adaptor: Arc<SentryAdaptor>, threshold: log::LevelFilter) -> Self {
        Self { adaptor, threshold }
    }

    /// Install this writer as the process logger.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let threshold = self.threshold;
        log::set_boxed_logger(Box::new(self))?;
        if threshold > log::max_level() {
            log::set_max_level(threshold);
        }
        Ok(())
    }
}

impl Log for SentryLogWriter {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.threshold
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        self.adaptor.capture_event(Event {
            message: Some(record.args().to_string()),
            level: severity::from_log_level(record.level()),
            logger: Some(record.target().to_string()),
            ..Default::default()
        });
    }

    fn flush(&self) {
        self.adaptor.client().flush(None);
    }
}
