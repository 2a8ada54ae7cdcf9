//! The functional bridge between the host application's logging pipeline and
//! the Sentry SDK.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sentry::protocol::Event;
use sentry::types::Uuid;
use sentry::{Client, ClientOptions, Hub, Level, Scope};
use serde_json::Value;

use faultline_config::SentryOptions;

use crate::context::{Context, ContextUpdate};
use crate::error::AdaptorError;
use crate::keys;
use crate::severity;

/// Bridges framework logging calls to the Sentry SDK.
///
/// The adaptor owns its client and hub outright; nothing is installed into
/// the SDK's process-global state. Components that emit events receive a
/// shared handle to the adaptor instead.
///
/// Contextual data is written to two places at once: the SDK scope (consumed
/// when events are captured) and the locally readable [`Context`], which is
/// re-materialized into a fresh scope for plain message sends because the SDK
/// does not attach the persisted scope on that path.
pub struct SentryAdaptor {
    hub: Hub,
    options: SentryOptions,
    context: Mutex<Context>,
}

impl SentryAdaptor {
    /// Build an adaptor from resolved options.
    pub fn new(options: SentryOptions) -> Self {
        Self::from_client_options(client_options(&options), options)
    }

    /// Build an adaptor from the environment only (`SENTRY_*` variables).
    pub fn from_env() -> Result<Self, AdaptorError> {
        Ok(Self::new(SentryOptions::from_env()?))
    }

    /// Build an adaptor from explicit SDK client options.
    ///
    /// [`SentryAdaptor::new`] derives the client options from the resolved
    /// [`SentryOptions`]; this entry exists for callers that need to override
    /// SDK internals such as the transport or the `before_send` hook.
    pub fn from_client_options(client_opts: ClientOptions, options: SentryOptions) -> Self {
        let client = Arc::new(Client::from_config(client_opts));
        if !client.is_enabled() {
            tracing::warn!("Sentry client is disabled (no DSN configured); events are dropped");
        }

        Self {
            hub: Hub::new(Some(client), Arc::new(Scope::default())),
            options,
            context: Mutex::new(Context::default()),
        }
    }

    /// The constructed client handle.
    pub fn client(&self) -> Arc<Client> {
        // A client is bound at construction and every rebind passes Some.
        self.hub.client().expect("adaptor hub always has a client")
    }

    /// The resolved options the client was built from.
    pub fn options(&self) -> &SentryOptions {
        &self.options
    }

    /// Snapshot of the locally stored context.
    pub fn context(&self) -> Context {
        self.context_mut().clone()
    }

    /// Re-materialize a fresh scope from the locally stored context, for
    /// attaching to a non-exception message send. Environment and level are
    /// not re-applied here.
    pub fn context_scope(&self) -> Scope {
        self.context().to_scope()
    }

    /// Apply a string-keyed context update as received from the framework
    /// boundary.
    ///
    /// Unknown field names fail with
    /// [`AdaptorError::UnsupportedContextField`] and mutate neither the SDK
    /// scope nor the local context.
    pub fn set_context(&self, field: &str, data: Value) -> Result<(), AdaptorError> {
        let update = ContextUpdate::from_field(field, data, "set_context")?;
        self.apply(update);
        Ok(())
    }

    /// Apply a typed context update to the SDK and the local context.
    pub fn apply(&self, update: ContextUpdate) {
        match update {
            ContextUpdate::Environment(environment) => {
                self.rebind_environment(&environment);
                self.context_mut().set_environment(environment);
            }
            ContextUpdate::Tags(tags) => {
                let mut context = self.context_mut();
                self.hub.configure_scope(|scope| {
                    for (key, value) in &tags {
                        let key = keys::normalize_key(key);
                        scope.set_tag(&key, value);
                        context.insert_tag(&key, value.clone());
                    }
                });
            }
            ContextUpdate::User(user) => {
                let mut context = self.context_mut();
                self.hub.configure_scope(|scope| {
                    scope.set_user(Some(user.clone()));
                });
                context.set_user(user);
            }
            ContextUpdate::Extras(extras) => {
                let mut context = self.context_mut();
                self.hub.configure_scope(|scope| {
                    for (key, value) in &extras {
                        let key = keys::normalize_key(key);
                        scope.set_extra(&key, value.clone());
                        context.insert_extra(&key, value.clone());
                    }
                });
            }
            ContextUpdate::Level(token) => {
                let level = severity::from_token(&token);
                self.hub.configure_scope(|scope| {
                    scope.set_level(Some(level));
                });
            }
        }
    }

    /// Capture an error through the exception path. The scope persisted on
    /// the hub is attached by the SDK.
    pub fn capture_error<E: std::error::Error + ?Sized>(&self, error: &E) -> Uuid {
        self.hub.capture_error(error)
    }

    /// Capture a plain message.
    ///
    /// The SDK does not attach the persisted scope on this path, so the
    /// locally stored context is re-materialized and sent along explicitly.
    pub fn capture_message(&self, message: &str, level: Level) -> Uuid {
        self.capture_event(Event {
            message: Some(message.to_string()),
            level,
            ..Default::default()
        })
    }

    /// Capture a pre-built event through the message path, attaching the
    /// re-materialized context scope.
    pub fn capture_event(&self, event: Event<'static>) -> Uuid {
        match self.hub.client() {
            Some(client) => client.capture_event(event, Some(&self.context_scope())),
            None => Uuid::nil(),
        }
    }

    /// Flush buffered events to the transport.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        self.client().flush(timeout)
    }

    /// The SDK fixes its options at client construction; an environment
    /// update therefore rebuilds the client with the new environment and
    /// rebinds it on the owned hub.
    fn rebind_environment(&self, environment: &str) {
        let mut opts = self.client().options().clone();
        opts.environment = Some(environment.to_string().into());
        self.hub
            .bind_client(Some(Arc::new(Client::from_config(opts))));
    }

    fn context_mut(&self) -> MutexGuard<'_, Context> {
        self.context.lock().expect("context lock poisoned")
    }
}

/// Project resolved options into the SDK's client options.
///
/// `custom_stacktrace: true` means the host application supplies its own
/// stacktraces, so the SDK's automatic attachment is turned off.
pub fn client_options(options: &SentryOptions) -> ClientOptions {
    ClientOptions {
        dsn: options.dsn.as_deref().and_then(|dsn| match dsn.parse() {
            Ok(dsn) => Some(dsn),
            Err(err) => {
                tracing::warn!(error = %err, "Invalid Sentry DSN, error tracking disabled");
                None
            }
        }),
        environment: options.environment.clone().map(Into::into),
        release: options.release.clone().map(Into::into),
        server_name: options.server_name.clone().map(Into::into),
        http_proxy: options.http_proxy.clone().map(Into::into),
        sample_rate: options.sample_rate,
        debug: options.debug,
        send_default_pii: options.send_default_pii,
        attach_stacktrace: !options.custom_stacktrace,
        shutdown_timeout: Duration::from_secs(options.shutdown_timeout_secs),
        ..Default::default()
    }
}
