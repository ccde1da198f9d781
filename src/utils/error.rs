use thiserror::Error;

#[derive(Error, Debug)]
pub enum HunterError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

impl HunterError {
    pub fn validation(message: impl Into<String>) -> Self {
        HunterError::ValidationError {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HunterError>;
