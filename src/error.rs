use thiserror::Error;

#[derive(Error, Debug)]
pub enum PropbagError {
    #[error("Type mismatch for property '{property}': expected {expected}, got {actual}")]
    TypeMismatch {
        property: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Parse error for property '{property}': {message}")]
    Parse { property: String, message: String },
    #[error("No value available for property '{property}'")]
    MissingValue { property: String },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PropbagError>;

// Helper conversions
impl From<config::ConfigError> for PropbagError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
