use thiserror::Error;

/// Errors surfaced by the ledger gateway.
///
/// Every synchronization operation catches these at its own boundary and
/// converts them to a single user-facing message; none are fatal. The
/// variants keep transport failures, HTTP errors, and payload problems
/// distinguishable so the engine can produce a specific message.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Failed to encode request: {0}")]
    Encode(String),

    #[error("{0}")]
    Precondition(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid carrying excessive data in messages
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        ApiError::Http {
            status: status.as_u16(),
            body: Self::truncate_body(body),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::Http {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}
