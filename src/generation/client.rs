//! GenerationClient trait definition

use std::time::Duration;

use async_trait::async_trait;

use super::GenerationError;

/// Stateless text-generation client - each call is independent
///
/// This is the seam between the orchestrator and whichever provider backs
/// it. Implementations hold no conversation state and are safely shared
/// across concurrent callers via `Arc<dyn GenerationClient>`. Retry policy
/// deliberately does not live here; the dispatcher owns it.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Send one fully-rendered prompt and return the raw response text
    ///
    /// The timeout bounds this single call. On timeout or transport
    /// failure a typed [`GenerationError`] is returned; the raw text is
    /// otherwise opaque to the client.
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError>;
}
