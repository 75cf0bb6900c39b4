//! Generation error types

use std::time::Duration;
use thiserror::Error;

/// Errors from the generation provider
///
/// All variants are recoverable at the dispatch layer: Timeout and
/// Unavailable through bounded retry, RateLimited by waiting for the next
/// admission window. None of them ever fails a run.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
}

impl GenerationError {
    /// Check if this error should consume a retry attempt
    ///
    /// RateLimited is excluded: the unit waits out the admission window
    /// instead of burning a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::Timeout(_) | GenerationError::Unavailable(_))
    }

    /// Check if this is a rate limit error
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, GenerationError::RateLimited { .. })
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GenerationError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(GenerationError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(GenerationError::Unavailable("503".to_string()).is_retryable());

        // Rate limits wait for refill rather than consuming a retry
        assert!(
            !GenerationError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_retry_after() {
        let err = GenerationError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        assert!(err.is_rate_limit());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));

        assert_eq!(GenerationError::Unavailable("down".to_string()).retry_after(), None);
    }
}
