//! External bibliographic provider adapters
//!
//! Leaf components: each adapter normalizes one third-party search API
//! into the shared `EditionRecord` shape and knows nothing about jobs,
//! channels, or progress.

mod google_books;
mod open_library;

pub use google_books::GoogleBooksClient;
pub use open_library::OpenLibraryClient;

use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use shelfscan_common::types::EditionRecord;

pub(crate) const USER_AGENT: &str = "shelfscan/0.1.0 (https://github.com/shelfscan/shelfscan)";

/// Provider adapter errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One bibliographic search provider
///
/// `Ok(None)` is a definitive not-found; `Err` means the provider could
/// not answer and a fallback provider may still be tried.
#[async_trait]
pub trait EditionLookup: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn lookup(
        &self,
        title: &str,
        author: Option<&str>,
    ) -> Result<Option<EditionRecord>, ProviderError>;
}

/// Minimum-interval rate limiter shared by the provider clients
pub(crate) struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub(crate) fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with the provider's rate limit
    pub(crate) async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}
