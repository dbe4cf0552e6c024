use thiserror::Error;
use uuid::Uuid;

/// Centralized error types for the application
///
/// All fallible library operations return this enum. Uses `thiserror` for automatic
/// conversion from the underlying crates and for display formatting.
///
/// # Example
///
/// ```no_run
/// use guidebot::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Telegram API errors
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// Redis errors (shared pending-reply / dedup stores)
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request does not exist (deleted or never created)
    #[error("Request {0} not found")]
    RequestNotFound(Uuid),

    /// The request exists but is no longer accepting responses
    #[error("Request {0} is no longer active")]
    RequestInactive(Uuid),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Text shown to a guide in the chat. Internal details never leave the process.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::RequestNotFound(_) => "This request no longer exists.",
            AppError::RequestInactive(_) => "This request is already closed and no longer accepts replies.",
            AppError::Validation(_) => "That doesn't look right, please try again.",
            _ => "Something went wrong on our side. Please try again in a moment.",
        }
    }

    /// Domain failures are expected outcomes; everything else is worth an error-level log.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            AppError::RequestNotFound(_) | AppError::RequestInactive(_) | AppError::Validation(_)
        )
    }
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_internal_details() {
        let err = AppError::Config("DATABASE_URL is not set".to_string());
        assert!(!err.user_message().contains("DATABASE_URL"));
        assert!(!err.is_domain());
    }

    #[test]
    fn test_domain_errors_have_specific_messages() {
        let id = Uuid::new_v4();
        assert_eq!(
            AppError::RequestNotFound(id).user_message(),
            "This request no longer exists."
        );
        assert!(AppError::RequestInactive(id).is_domain());
        assert!(AppError::RequestInactive(id).user_message().contains("closed"));
    }
}
