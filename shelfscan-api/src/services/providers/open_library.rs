//! Open Library search adapter

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::{EditionLookup, ProviderError, RateLimiter, USER_AGENT};
use shelfscan_common::types::EditionRecord;

// Open Library asks unauthenticated clients to stay near 1 req/sec
const RATE_LIMIT_MS: u64 = 1000;
const MAX_SUBJECTS: usize = 5;

/// Open Library search response (subset of fields we consume)
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    isbn: Option<Vec<String>>,
    cover_i: Option<i64>,
    publisher: Option<Vec<String>>,
    number_of_pages_median: Option<u32>,
    subject: Option<Vec<String>>,
}

/// Open Library search client
pub struct OpenLibraryClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
}

impl OpenLibraryClient {
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

    fn normalize(doc: SearchDoc) -> EditionRecord {
        EditionRecord {
            isbn: doc.isbn.and_then(|mut list| {
                if list.is_empty() {
                    None
                } else {
                    Some(list.remove(0))
                }
            }),
            cover_url: doc
                .cover_i
                .map(|id| format!("https://covers.openlibrary.org/b/id/{}-M.jpg", id)),
            publisher: doc.publisher.and_then(|mut list| {
                if list.is_empty() {
                    None
                } else {
                    Some(list.remove(0))
                }
            }),
            page_count: doc.number_of_pages_median,
            subjects: doc
                .subject
                .unwrap_or_default()
                .into_iter()
                .take(MAX_SUBJECTS)
                .collect(),
            provider: "open_library".to_string(),
        }
    }
}

#[async_trait]
impl EditionLookup for OpenLibraryClient {
    fn provider_name(&self) -> &'static str {
        "open_library"
    }

    async fn lookup(
        &self,
        title: &str,
        author: Option<&str>,
    ) -> Result<Option<EditionRecord>, ProviderError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/search.json", self.base_url);
        let mut query = vec![("title", title.to_string()), ("limit", "5".to_string())];
        if let Some(author) = author {
            query.push(("author", author.to_string()));
        }

        tracing::debug!(title = %title, "Querying Open Library");

        let response = self
            .http_client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 || status.as_u16() == 503 {
            return Err(ProviderError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status.as_u16(), error_text));
        }

        let search: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let Some(doc) = search.docs.into_iter().next() else {
            return Ok(None);
        };

        Ok(Some(Self::normalize(doc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        assert!(OpenLibraryClient::new("https://openlibrary.org").is_ok());
    }

    #[test]
    fn normalize_maps_first_isbn_and_cover() {
        let doc = SearchDoc {
            isbn: Some(vec!["9780132350884".to_string(), "0132350882".to_string()]),
            cover_i: Some(123),
            publisher: Some(vec!["Prentice Hall".to_string()]),
            number_of_pages_median: Some(464),
            subject: Some(vec!["Software".to_string(); 10]),
        };

        let record = OpenLibraryClient::normalize(doc);
        assert_eq!(record.isbn.as_deref(), Some("9780132350884"));
        assert_eq!(
            record.cover_url.as_deref(),
            Some("https://covers.openlibrary.org/b/id/123-M.jpg")
        );
        assert_eq!(record.page_count, Some(464));
        assert_eq!(record.subjects.len(), MAX_SUBJECTS);
        assert_eq!(record.provider, "open_library");
    }

    #[test]
    fn normalize_tolerates_sparse_docs() {
        let doc = SearchDoc {
            isbn: Some(vec![]),
            cover_i: None,
            publisher: None,
            number_of_pages_median: None,
            subject: None,
        };

        let record = OpenLibraryClient::normalize(doc);
        assert!(record.isbn.is_none());
        assert!(record.cover_url.is_none());
        assert!(record.subjects.is_empty());
    }

    #[test]
    fn search_response_parses_empty_docs() {
        let search: SearchResponse = serde_json::from_str(r#"{"numFound": 0}"#).unwrap();
        assert!(search.docs.is_empty());
    }
}
