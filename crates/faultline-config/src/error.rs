use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid DSN: {dsn}")]
    InvalidDsn { dsn: String },

    #[error("Unresolvable placeholder ${{{name}}} in configuration value")]
    Placeholder { name: String },
}
