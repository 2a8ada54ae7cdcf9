//! Layered option loading for the Sentry client.
//!
//! Options are assembled from three layers, later layers winning on key
//! collision: struct defaults, an optional configuration file, and `SENTRY_*`
//! environment variables. The result is a single immutable [`SentryOptions`]
//! built before any other component reads configuration.

use std::collections::BTreeMap;
use std::path::Path;

use config::{Config, Environment, File};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Prefix for environment variables overriding file configuration.
/// `SENTRY_DSN` maps to the `dsn` key, `SENTRY_ENVIRONMENT` to `environment`,
/// and so on.
pub const ENV_PREFIX: &str = "SENTRY";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder pattern"));

/// Proxy descriptor as it appears in configuration files.
///
/// Accepts either a plain `host:port` string or a structured `host`/`port`
/// pair; the pair form exists because some configuration surfaces only permit
/// one substituted value per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProxyConfig {
    Url(String),
    HostPort { host: String, port: String },
}

impl ProxyConfig {
    /// Collapse into the single `host:port` form the SDK accepts.
    fn collapse(self) -> String {
        match self {
            ProxyConfig::Url(url) => url,
            ProxyConfig::HostPort { host, port } => format!("{}:{}", host, port),
        }
    }
}

/// Options as declared across the configuration layers, before resolution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOptions {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub release: Option<String>,
    /// When set, the host application supplies its own stacktraces and the
    /// SDK's automatic stacktrace attachment is turned off.
    #[serde(default)]
    pub custom_stacktrace: bool,
    pub http_proxy: Option<ProxyConfig>,
    pub sample_rate: Option<f32>,
    #[serde(default)]
    pub debug: bool,
    pub server_name: Option<String>,
    #[serde(default)]
    pub send_default_pii: bool,
    pub shutdown_timeout_secs: Option<u64>,
    /// Keys this layer does not interpret; kept so the resolved mapping is
    /// complete.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

/// Immutable resolved options. Built once, read everywhere.
#[derive(Debug, Clone, Serialize)]
pub struct SentryOptions {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub release: Option<String>,
    pub custom_stacktrace: bool,
    pub http_proxy: Option<String>,
    pub sample_rate: f32,
    pub debug: bool,
    pub server_name: Option<String>,
    pub send_default_pii: bool,
    pub shutdown_timeout_secs: u64,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl SentryOptions {
    /// Load options from the environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None::<&Path>)
    }

    /// Load options from an optional configuration file plus the environment.
    ///
    /// The environment source is added last so `SENTRY_*` variables win on
    /// key collision with the file.
    pub fn load<P: AsRef<Path>>(file: Option<P>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path.as_ref()));
        }
        let raw: RawOptions = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        Self::resolve(raw)
    }

    /// Resolve raw options into the immutable form: placeholder expansion,
    /// proxy collapsing, DSN validation.
    pub fn resolve(raw: RawOptions) -> Result<Self, ConfigError> {
        let dsn = match resolve_opt(raw.dsn)? {
            Some(dsn) if dsn.is_empty() => None,
            other => other,
        };
        if let Some(ref dsn) = dsn {
            validate_dsn(dsn)?;
        }

        let http_proxy = match raw.http_proxy {
            Some(proxy) => Some(resolve_placeholders(&proxy.collapse())?),
            None => None,
        };

        let mut other = BTreeMap::new();
        for (key, value) in raw.other {
            other.insert(key, resolve_value(value)?);
        }

        tracing::debug!("Resolved Sentry options (dsn configured: {})", dsn.is_some());

        Ok(SentryOptions {
            dsn,
            environment: resolve_opt(raw.environment)?,
            release: resolve_opt(raw.release)?,
            custom_stacktrace: raw.custom_stacktrace,
            http_proxy,
            sample_rate: raw.sample_rate.unwrap_or(1.0),
            debug: raw.debug,
            server_name: resolve_opt(raw.server_name)?,
            send_default_pii: raw.send_default_pii,
            shutdown_timeout_secs: raw.shutdown_timeout_secs.unwrap_or(2),
            other,
        })
    }

    /// Look up a single resolved option by name.
    ///
    /// Returns `None` for unknown names and for options that resolved to
    /// nothing; use [`SentryOptions::as_map`] for the whole mapping.
    pub fn get(&self, opt: &str) -> Option<serde_json::Value> {
        self.as_map().remove(opt)
    }

    /// The whole resolved mapping, keyed the way the configuration file keys
    /// it.
    pub fn as_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .collect(),
            _ => serde_json::Map::new(),
        }
    }
}

fn resolve_opt(value: Option<String>) -> Result<Option<String>, ConfigError> {
    match value {
        Some(v) => Ok(Some(resolve_placeholders(&v)?)),
        None => Ok(None),
    }
}

/// Expand `${VAR}` placeholders in a configuration value from the process
/// environment. An unknown variable is a hard error; a half-resolved DSN is
/// worse than no DSN.
fn resolve_placeholders(value: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_string());
    }

    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(value) {
        if let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) {
            out.push_str(&value[last..whole.start()]);
            match std::env::var(name.as_str()) {
                Ok(resolved) => out.push_str(&resolved),
                Err(_) => {
                    return Err(ConfigError::Placeholder {
                        name: name.as_str().to_string(),
                    })
                }
            }
            last = whole.end();
        }
    }
    out.push_str(&value[last..]);
    Ok(out)
}

fn resolve_value(value: serde_json::Value) -> Result<serde_json::Value, ConfigError> {
    match value {
        serde_json::Value::String(s) => Ok(serde_json::Value::String(resolve_placeholders(&s)?)),
        serde_json::Value::Array(items) => Ok(serde_json::Value::Array(
            items.into_iter().map(resolve_value).collect::<Result<_, _>>()?,
        )),
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key, resolve_value(value)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        other => Ok(other),
    }
}

/// Validate DSN syntax: `protocol://PUBLIC_KEY@host/PROJECT_ID`.
fn validate_dsn(dsn: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidDsn {
        dsn: dsn.to_string(),
    };

    let url = url::Url::parse(dsn).map_err(|_| invalid())?;
    if url.host_str().is_none() || url.username().is_empty() {
        return Err(invalid());
    }
    url.path()
        .trim_start_matches('/')
        .parse::<i64>()
        .map_err(|_| invalid())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("Failed to create config file");
        file.write_all(contents.as_bytes())
            .expect("Failed to write config file");
        file
    }

    #[test]
    #[serial_test::serial]
    fn test_env_dsn_beats_file_dsn() {
        let file = yaml_file("dsn: https://zzz@other.com/2\nrelease: 1.2.3\n");
        std::env::set_var("SENTRY_DSN", "https://abc@example.com/1");

        let options =
            SentryOptions::load(Some(file.path())).expect("Failed to load options");
        std::env::remove_var("SENTRY_DSN");

        assert_eq!(options.dsn.as_deref(), Some("https://abc@example.com/1"));
        assert_eq!(options.release.as_deref(), Some("1.2.3"));
    }

    #[test]
    #[serial_test::serial]
    fn test_file_dsn_used_when_env_absent() {
        std::env::remove_var("SENTRY_DSN");
        let file = yaml_file("dsn: https://zzz@other.com/2\n");

        let options =
            SentryOptions::load(Some(file.path())).expect("Failed to load options");

        assert_eq!(options.dsn.as_deref(), Some("https://zzz@other.com/2"));
    }

    #[test]
    fn test_proxy_pair_collapses_to_host_port() {
        let raw = RawOptions {
            http_proxy: Some(ProxyConfig::HostPort {
                host: "10.0.0.1".to_string(),
                port: "8080".to_string(),
            }),
            ..Default::default()
        };

        let options = SentryOptions::resolve(raw).expect("Failed to resolve options");

        assert_eq!(options.http_proxy.as_deref(), Some("10.0.0.1:8080"));
        assert_eq!(
            options.get("http_proxy"),
            Some(serde_json::Value::String("10.0.0.1:8080".to_string()))
        );
    }

    #[test]
    #[serial_test::serial]
    fn test_proxy_pair_from_file() {
        std::env::remove_var("SENTRY_DSN");
        let file = yaml_file("http_proxy:\n  host: 10.0.0.1\n  port: \"8080\"\n");

        let options =
            SentryOptions::load(Some(file.path())).expect("Failed to load options");

        assert_eq!(options.http_proxy.as_deref(), Some("10.0.0.1:8080"));
    }

    #[test]
    fn test_proxy_string_passes_through() {
        let raw = RawOptions {
            http_proxy: Some(ProxyConfig::Url("proxy.internal:3128".to_string())),
            ..Default::default()
        };

        let options = SentryOptions::resolve(raw).expect("Failed to resolve options");

        assert_eq!(options.http_proxy.as_deref(), Some("proxy.internal:3128"));
    }

    #[test]
    #[serial_test::serial]
    fn test_placeholder_resolution() {
        std::env::set_var("FAULTLINE_TEST_KEY", "abc");

        let raw = RawOptions {
            dsn: Some("https://${FAULTLINE_TEST_KEY}@example.com/1".to_string()),
            ..Default::default()
        };
        let options = SentryOptions::resolve(raw).expect("Failed to resolve options");
        std::env::remove_var("FAULTLINE_TEST_KEY");

        assert_eq!(options.dsn.as_deref(), Some("https://abc@example.com/1"));
    }

    #[test]
    #[serial_test::serial]
    fn test_unknown_placeholder_is_an_error() {
        std::env::remove_var("FAULTLINE_MISSING_VAR");

        let raw = RawOptions {
            release: Some("${FAULTLINE_MISSING_VAR}".to_string()),
            ..Default::default()
        };

        match SentryOptions::resolve(raw) {
            Err(ConfigError::Placeholder { name }) => {
                assert_eq!(name, "FAULTLINE_MISSING_VAR")
            }
            other => panic!("Expected placeholder error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_dsn_rejected() {
        for dsn in [
            "not a url",
            "https://example.com/1",        // no public key
            "https://abc@example.com/apps", // no numeric project id
        ] {
            let raw = RawOptions {
                dsn: Some(dsn.to_string()),
                ..Default::default()
            };
            assert!(
                matches!(
                    SentryOptions::resolve(raw),
                    Err(ConfigError::InvalidDsn { .. })
                ),
                "DSN {:?} should be rejected",
                dsn
            );
        }
    }

    #[test]
    fn test_empty_dsn_disables_reporting() {
        let raw = RawOptions {
            dsn: Some(String::new()),
            ..Default::default()
        };

        let options = SentryOptions::resolve(raw).expect("Failed to resolve options");

        assert_eq!(options.dsn, None);
    }

    #[test]
    fn test_defaults() {
        let options =
            SentryOptions::resolve(RawOptions::default()).expect("Failed to resolve options");

        assert_eq!(options.dsn, None);
        assert_eq!(options.sample_rate, 1.0);
        assert_eq!(options.shutdown_timeout_secs, 2);
        assert!(!options.custom_stacktrace);
        assert!(!options.debug);
        assert!(!options.send_default_pii);
    }

    #[test]
    fn test_unrecognized_keys_survive_into_the_mapping() {
        let mut other = BTreeMap::new();
        other.insert(
            "max_breadcrumbs".to_string(),
            serde_json::Value::from(50u64),
        );
        let raw = RawOptions {
            other,
            ..Default::default()
        };

        let options = SentryOptions::resolve(raw).expect("Failed to resolve options");

        assert_eq!(
            options.get("max_breadcrumbs"),
            Some(serde_json::Value::from(50u64))
        );
        assert_eq!(options.get("no_such_option"), None);
    }

    #[test]
    fn test_as_map_omits_unset_options() {
        let options =
            SentryOptions::resolve(RawOptions::default()).expect("Failed to resolve options");
        let map = options.as_map();

        assert!(!map.contains_key("dsn"));
        assert!(map.contains_key("sample_rate"));
    }
}
