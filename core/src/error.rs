use std::time::Duration;
use thiserror::Error;

/// Fatal and recoverable failures raised while assessing a request.
#[derive(Error, Debug)]
pub enum XssMapError {
    /// Missing required field or unsupported config version.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed target URL or non-form-encoded POST body.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported request method: {0}")]
    UnsupportedMethod(String),

    #[error("Unrecognized parameter delivery: {0}")]
    UnsupportedDelivery(String),

    /// A trigger could not be matched back to exactly one parameter.
    #[error("Unable to correlate trigger '{trigger}': {reason}")]
    Correlation { trigger: String, reason: String },

    #[error("Render service error: {0}")]
    RenderService(#[from] RenderServiceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures talking to the headless render backend.
#[derive(Error, Debug)]
pub enum RenderServiceError {
    #[error("{name} does not seem to be running at {address}")]
    Unavailable { name: String, address: String },

    #[error("request to {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("render service answered with HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("malformed response field '{field}': {reason}")]
    MalformedResponse { field: String, reason: String },
}

impl RenderServiceError {
    pub fn malformed(field: &str, reason: impl ToString) -> Self {
        RenderServiceError::MalformedResponse {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, XssMapError>;
