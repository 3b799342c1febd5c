//! Google Books volumes adapter

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::{EditionLookup, ProviderError, RateLimiter, USER_AGENT};
use shelfscan_common::types::EditionRecord;

const RATE_LIMIT_MS: u64 = 200;
const MAX_SUBJECTS: usize = 5;

/// Google Books volumes response (subset of fields we consume)
#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    #[serde(rename = "volumeInfo")]
    volume_info: VolumeInfo,
}

#[derive(Debug, Deserialize)]
struct VolumeInfo {
    publisher: Option<String>,
    #[serde(rename = "pageCount")]
    page_count: Option<u32>,
    categories: Option<Vec<String>>,
    #[serde(rename = "imageLinks")]
    image_links: Option<ImageLinks>,
    #[serde(rename = "industryIdentifiers")]
    industry_identifiers: Option<Vec<IndustryIdentifier>>,
}

#[derive(Debug, Deserialize)]
struct ImageLinks {
    thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    id_type: String,
    identifier: String,
}

/// Google Books volumes client
pub struct GoogleBooksClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
}

impl GoogleBooksClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
            base_url: base_url.into(),
        })
    }

    fn normalize(info: VolumeInfo) -> EditionRecord {
        // Prefer ISBN-13, fall back to ISBN-10
        let isbn = info.industry_identifiers.as_ref().and_then(|ids| {
            ids.iter()
                .find(|id| id.id_type == "ISBN_13")
                .or_else(|| ids.iter().find(|id| id.id_type == "ISBN_10"))
                .map(|id| id.identifier.clone())
        });

        EditionRecord {
            isbn,
            cover_url: info.image_links.and_then(|links| links.thumbnail),
            publisher: info.publisher,
            page_count: info.page_count,
            subjects: info
                .categories
                .unwrap_or_default()
                .into_iter()
                .take(MAX_SUBJECTS)
                .collect(),
            provider: "google_books".to_string(),
        }
    }
}

#[async_trait]
impl EditionLookup for GoogleBooksClient {
    fn provider_name(&self) -> &'static str {
        "google_books"
    }

    async fn lookup(
        &self,
        title: &str,
        author: Option<&str>,
    ) -> Result<Option<EditionRecord>, ProviderError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/volumes", self.base_url);
        let q = match author {
            Some(author) => format!("intitle:{} inauthor:{}", title, author),
            None => format!("intitle:{}", title),
        };

        tracing::debug!(title = %title, "Querying Google Books");

        let response = self
            .http_client
            .get(&url)
            .query(&[("q", q.as_str()), ("maxResults", "5")])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status.as_u16(), error_text));
        }

        let volumes: VolumesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let Some(volume) = volumes.items.into_iter().next() else {
            return Ok(None);
        };

        Ok(Some(Self::normalize(volume.volume_info)))
    }
}
