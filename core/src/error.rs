use thiserror::Error;

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid config '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PricingError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field:  field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type PricingResult<T> = Result<T, PricingError>;
