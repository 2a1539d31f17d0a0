use thiserror::Error;

/// Main error type for the index advisor
#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Subquery nesting exceeds {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("Catalog error: {message}")]
    Catalog { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Apply error: {message}")]
    Apply { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;

impl AdvisorError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn apply(message: impl Into<String>) -> Self {
        Self::Apply { message: message.into() }
    }
}
