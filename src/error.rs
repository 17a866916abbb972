use thiserror::Error;

/// Centralized error type for the console core.
#[derive(Error, Debug)]
pub enum EmadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON (de)serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{kind} não encontrado: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{0}")]
    Duplicate(String),

    #[error("Senha inválida.")]
    Unauthorized,

    #[error("{0}")]
    Conflict(String),

    #[error("Banco de dados corrompido: {0}")]
    Corrupt(String),
}

impl EmadError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        EmadError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EmadError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Alias for fallible operations in the console core.
pub type EmadResult<T> = Result<T, EmadError>;
