//! Locally owned contextual data and its projection onto an SDK scope.
//!
//! The SDK's scope is a write-mostly sink: it cannot be read back, and it is
//! not attached to plain message sends at all. [`Context`] is the locally
//! readable store those sends are re-materialized from.

use std::collections::BTreeMap;

use sentry::protocol::User;
use sentry::Scope;
use serde_json::Value;

use crate::error::AdaptorError;
use crate::keys;

/// A single typed context update.
///
/// The closed set of update operations the adaptor accepts; the string-keyed
/// framework boundary parses into this via [`ContextUpdate::from_field`].
#[derive(Debug, Clone)]
pub enum ContextUpdate {
    /// Reporting environment, e.g. `"live"` or `"dev"`.
    Environment(String),
    /// Indexed, filterable key/value metadata. Keys are normalized.
    Tags(BTreeMap<String, String>),
    /// The current actor. Overwrites any previously set user.
    User(User),
    /// Opaque supplementary key/value data. Keys are normalized.
    Extras(BTreeMap<String, Value>),
    /// Severity token for subsequent events, e.g. `"warning"`.
    Level(String),
}

impl ContextUpdate {
    /// Parse a string-keyed field update as it arrives from the framework
    /// boundary.
    ///
    /// Field names outside `env`, `tags`, `user`, `extra` and `level` fail
    /// with [`AdaptorError::UnsupportedContextField`] naming the offending
    /// field and the calling site.
    pub fn from_field(
        field: &str,
        data: Value,
        caller: &'static str,
    ) -> Result<Self, AdaptorError> {
        match field {
            "env" => Ok(ContextUpdate::Environment(value_to_string(&data))),
            "tags" => Ok(ContextUpdate::Tags(string_entries(field, data))),
            "user" => Ok(ContextUpdate::User(user_from_value(data))),
            "extra" => Ok(ContextUpdate::Extras(value_entries(field, data))),
            "level" => Ok(ContextUpdate::Level(value_to_string(&data))),
            _ => Err(AdaptorError::UnsupportedContextField {
                field: field.to_string(),
                caller,
            }),
        }
    }
}

/// Locally stored contextual data.
///
/// Four recognized top-level keys; tag and extra keys are normalized before
/// storage, so no two stored keys differ only by formatting. Created empty,
/// mutated additively, never cleared.
#[derive(Debug, Clone, Default)]
pub struct Context {
    environment: Option<String>,
    tags: BTreeMap<String, String>,
    user: Option<User>,
    extras: BTreeMap<String, Value>,
}

impl Context {
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn extras(&self) -> &BTreeMap<String, Value> {
        &self.extras
    }

    pub(crate) fn set_environment(&mut self, environment: String) {
        self.environment = Some(environment);
    }

    pub(crate) fn insert_tag(&mut self, key: &str, value: String) {
        self.tags.insert(keys::normalize_key(key), value);
    }

    pub(crate) fn set_user(&mut self, user: User) {
        self.user = Some(user);
    }

    pub(crate) fn insert_extra(&mut self, key: &str, value: Value) {
        self.extras.insert(keys::normalize_key(key), value);
    }

    /// Project onto a fresh SDK scope for the message path.
    ///
    /// Carries user, tags and extras, normalizing keys again at read time.
    /// Environment and level are deliberately not re-applied here: the
    /// environment lives on the client options, and the severity of a message
    /// send is the caller's to pick.
    pub fn to_scope(&self) -> Scope {
        let mut scope = Scope::default();

        scope.set_user(self.user.clone());

        for (key, value) in &self.tags {
            scope.set_tag(&keys::normalize_key(key), value);
        }

        for (key, value) in &self.extras {
            scope.set_extra(&keys::normalize_key(key), value.clone());
        }

        scope
    }
}

fn value_to_string(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

fn string_entries(field: &str, data: Value) -> BTreeMap<String, String> {
    match data {
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| (key, value_to_string(&value)))
            .collect(),
        other => {
            tracing::warn!(
                "Ignoring non-mapping payload for context field {:?}: {}",
                field,
                other
            );
            BTreeMap::new()
        }
    }
}

fn value_entries(field: &str, data: Value) -> BTreeMap<String, Value> {
    match data {
        Value::Object(map) => map.into_iter().collect(),
        other => {
            tracing::warn!(
                "Ignoring non-mapping payload for context field {:?}: {}",
                field,
                other
            );
            BTreeMap::new()
        }
    }
}

fn user_from_value(data: Value) -> User {
    let mut user = User::default();
    match data {
        Value::Object(map) => {
            for (key, value) in map {
                match key.as_str() {
                    "id" => user.id = Some(value_to_string(&value)),
                    "email" => user.email = Some(value_to_string(&value)),
                    "username" => user.username = Some(value_to_string(&value)),
                    "ip_address" => match value_to_string(&value).parse() {
                        Ok(ip) => user.ip_address = Some(ip),
                        Err(_) => {
                            tracing::warn!("Ignoring unparsable ip_address in user context")
                        }
                    },
                    _ => {
                        user.other.insert(key, value);
                    }
                }
            }
        }
        other => {
            tracing::warn!("Ignoring non-mapping payload for user context: {}", other);
        }
    }
    user
}
