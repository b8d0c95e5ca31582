use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors raised while serving the search-context and enrichment endpoints
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Request body is not valid JSON or has the wrong shape
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Search query missing, not a string, or blank
    #[error("Query is required and must be a non-empty string")]
    InvalidQuery,

    /// Requested product does not exist in the store
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Completion API key was not provided at startup
    #[error("OPENAI_API_KEY not configured")]
    MissingApiKey,

    /// Completion API answered with a non-success status
    #[error("Completion API error (HTTP {status}): {body}")]
    CompletionStatus {
        status: u16,
        body: String,
    },

    /// Completion API answered without any choices
    #[error("Completion API returned no content")]
    EmptyCompletion,

    /// Document store answered with a non-success status
    #[error("Document store error (HTTP {status}): {body}")]
    StoreStatus {
        status: u16,
        body: String,
    },

    /// Model output contained no JSON object or array
    #[error("No JSON found in model response")]
    NoJson,

    /// Model output contained JSON that is not the expected shape
    #[error("Unexpected model response: {0}")]
    UnexpectedShape(String),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Returns true if this error should be reported as a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidBody(_)
                | ServiceError::InvalidQuery
                | ServiceError::ProductNotFound(_)
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::ProductNotFound(_) => 404,
            _ if self.is_client_error() => 400,
            _ => 500,
        }
    }

    /// Get a user-friendly error message (sanitized for production)
    pub fn user_message(&self) -> String {
        match self {
            // Client errors and operator-actionable config errors - show detailed message
            ServiceError::InvalidBody(_)
            | ServiceError::InvalidQuery
            | ServiceError::ProductNotFound(_)
            | ServiceError::MissingApiKey => self.to_string(),

            // Upstream bodies never reach the caller, only the status
            ServiceError::CompletionStatus { status, .. } => {
                format!("Completion API error (HTTP {})", status)
            }
            ServiceError::StoreStatus { status, .. } => {
                format!("Document store error (HTTP {})", status)
            }

            // Server errors - generic message in production
            _ => {
                if cfg!(debug_assertions) {
                    self.to_string()
                } else {
                    "An internal error occurred while processing your request".to_string()
                }
            }
        }
    }
}
