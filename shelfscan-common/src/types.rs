//! Shared wire types for the scan pipeline
//!
//! All types serialize with camelCase field names to match the mobile
//! client contract.

use serde::{Deserialize, Serialize};

/// Normalized bounding box for one detected spine
///
/// Corner coordinates are normalized to [0.0, 1.0] relative to the
/// source image, so the client can overlay boxes at any display size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// One candidate book spine located in an image
///
/// A spine whose text could not be read is still reported, with
/// `title`/`author` unset and `confidence` 0.0; losing a located spine
/// is worse than reporting it as unresolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub title: Option<String>,
    pub author: Option<String>,
    /// Read confidence in [0.0, 1.0]
    pub confidence: f64,
    pub bounding_box: BoundingBox,
    /// Attached after the enrichment stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
}

impl Detection {
    /// Whether the spine text was readable enough to identify the book
    pub fn is_readable(&self) -> bool {
        self.title.is_some()
    }
}

/// Outcome of the bibliographic lookup for one detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// Confidence below threshold, no lookup attempted
    Skipped,
    /// Provider returned a matching edition
    Success,
    /// Providers queried, no match
    NotFound,
    /// Lookup failed for this item (batch continued)
    Error,
}

/// Enrichment result attached to a detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    pub status: EnrichmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edition: Option<EditionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Enrichment {
    pub fn skipped() -> Self {
        Self {
            status: EnrichmentStatus::Skipped,
            edition: None,
            error: None,
        }
    }

    pub fn success(edition: EditionRecord) -> Self {
        Self {
            status: EnrichmentStatus::Success,
            edition: Some(edition),
            error: None,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: EnrichmentStatus::NotFound,
            edition: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: EnrichmentStatus::Error,
            edition: None,
            error: Some(message.into()),
        }
    }
}

/// One edition record normalized from a bibliographic provider
///
/// Every provider adapter maps its own response shape into this one
/// struct; nothing provider-specific leaks past the adapter boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
    /// Which provider supplied this record ("open_library", "google_books")
    pub provider: String,
}

/// Image quality problem classes the detection service can flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    Blur,
    Glare,
    Distance,
    MultipleShelves,
    Lighting,
    Angle,
    EdgeCutoff,
    LowReadability,
}

/// Actionable retake suggestion for one detected quality problem
///
/// Present only when an actual problem was detected; a clean scan
/// carries no suggestions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySuggestion {
    pub issue: QualityIssue,
    pub message: String,
}

/// Final payload of a completed scan job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub books: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<QualitySuggestion>,
    /// Number of photos processed (batch scans)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photos_processed: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_detection_is_reported_not_dropped() {
        let det = Detection {
            title: None,
            author: None,
            confidence: 0.0,
            bounding_box: BoundingBox {
                x1: 0.1,
                y1: 0.2,
                x2: 0.15,
                y2: 0.8,
            },
            enrichment: None,
        };
        assert!(!det.is_readable());

        let json = serde_json::to_string(&det).unwrap();
        assert!(json.contains("\"title\":null"));
        assert!(json.contains("\"boundingBox\""));
        // Unset enrichment is omitted from the wire entirely
        assert!(!json.contains("enrichment"));
    }

    #[test]
    fn enrichment_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&EnrichmentStatus::Skipped).unwrap(),
            "\"skipped\""
        );
        assert_eq!(
            serde_json::to_string(&EnrichmentStatus::NotFound).unwrap(),
            "\"not_found\""
        );
    }

    #[test]
    fn edition_record_round_trip() {
        let record = EditionRecord {
            isbn: Some("9780132350884".to_string()),
            cover_url: Some("https://covers.openlibrary.org/b/id/123-M.jpg".to_string()),
            publisher: Some("Prentice Hall".to_string()),
            page_count: Some(464),
            subjects: vec!["Software engineering".to_string()],
            provider: "open_library".to_string(),
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"coverUrl\""));
        assert!(json.contains("\"pageCount\":464"));

        let back: EditionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.isbn.as_deref(), Some("9780132350884"));
        assert_eq!(back.provider, "open_library");
    }
}
