// Error types for the API client.
// Covers transport failures, HTTP status errors, decode errors, and cache errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Connection failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Authentication failed: invalid username or password")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    #[error("API error: {message}")]
    Remote {
        message: String,
        request: Option<String>,
    },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode JSON response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid identifier {0:?}: expected [A-Za-z0-9_]+")]
    InvalidIdentifier(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;
