//! Custom error types for aviary.
//!
//! Provides structured error handling with detailed context so callers can
//! map each condition to a distinct externally-visible status.

use thiserror::Error;

/// Primary error type for feed-core operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling better error messages and programmatic error handling.
#[derive(Error, Debug)]
pub enum AviaryError {
    // =========================================================================
    // Not Found
    // =========================================================================
    /// Tweet absent from the store.
    #[error("tweet '{id}' not found")]
    TweetNotFound { id: String },

    /// User absent from the store, or banned and treated as absent.
    #[error("user not found")]
    UserNotFound { id: String },

    /// Some other entity absent.
    #[error("{item_type} with id '{id}' not found")]
    NotFound { item_type: &'static str, id: String },

    // =========================================================================
    // Authorization
    // =========================================================================
    /// A restricted resource was requested without a viewer credential.
    #[error("access token is required")]
    Unauthorized,

    /// The viewer is authenticated but outside the tweet's audience.
    #[error("tweet is not public")]
    Forbidden,

    // =========================================================================
    // Validation
    // =========================================================================
    /// Malformed pagination or query parameters.
    #[error("invalid request: {reason}")]
    Validation { reason: String },

    // =========================================================================
    // Dependencies
    // =========================================================================
    /// Entity store call failed.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    // =========================================================================
    // Generic
    // =========================================================================
    /// Catch-all for other errors with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for feed-core operations.
pub type Result<T> = std::result::Result<T, AviaryError>;

impl AviaryError {
    /// Create a tweet-not-found error.
    pub fn tweet_not_found(id: impl Into<String>) -> Self {
        Self::TweetNotFound { id: id.into() }
    }

    /// Create a user-not-found error.
    pub fn user_not_found(id: impl Into<String>) -> Self {
        Self::UserNotFound { id: id.into() }
    }

    /// Create a generic not-found error.
    pub fn not_found(item_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            item_type,
            id: id.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Wrap an error with additional context.
    pub fn with_context(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error maps to a missing-resource status.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TweetNotFound { .. } | Self::UserNotFound { .. } | Self::NotFound { .. }
        )
    }

    /// Whether this error maps to a validation status.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_match_user_facing_conditions() {
        assert_eq!(AviaryError::Unauthorized.to_string(), "access token is required");
        assert_eq!(AviaryError::Forbidden.to_string(), "tweet is not public");
        assert_eq!(
            AviaryError::user_not_found("u1").to_string(),
            "user not found"
        );
        assert_eq!(
            AviaryError::tweet_not_found("t1").to_string(),
            "tweet 't1' not found"
        );
    }

    #[test]
    fn classification_helpers() {
        assert!(AviaryError::tweet_not_found("t1").is_not_found());
        assert!(AviaryError::validation("limit").is_validation());
        assert!(!AviaryError::Forbidden.is_not_found());
    }

    #[test]
    fn store_errors_convert() {
        let err: AviaryError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, AviaryError::Store(_)));
    }
}
