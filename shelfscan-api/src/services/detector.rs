//! Spine detection service
//!
//! Wraps the vision inference call and normalizes its output: every
//! located spine becomes a `Detection` (unreadable ones with unset
//! title/author and zero confidence rather than being dropped), and
//! quality problems become actionable retake suggestions. A clean scan
//! carries no suggestions.

use async_trait::async_trait;
use thiserror::Error;

use super::vision_client::{VisionClient, VisionError};
use shelfscan_common::types::{Detection, QualityIssue, QualitySuggestion};

/// Share of unreadable/low-confidence detections above which a retake
/// suggestion is emitted
const LOW_READABILITY_RATIO: f64 = 0.5;
const LOW_CONFIDENCE: f64 = 0.2;

/// Detection service errors
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Vision call failed: {0}")]
    Vision(#[from] VisionError),
}

/// Result of one detection pass over one image
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    pub detections: Vec<Detection>,
    pub suggestions: Vec<QualitySuggestion>,
}

/// One spine detection pass over raw image bytes
#[async_trait]
pub trait SpineDetector: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<DetectionOutcome, DetectError>;
}

/// Production detector backed by the external vision endpoint
pub struct VisionDetector {
    client: VisionClient,
}

impl VisionDetector {
    pub fn new(client: VisionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SpineDetector for VisionDetector {
    async fn detect(&self, image: &[u8]) -> Result<DetectionOutcome, DetectError> {
        let response = self.client.analyze(image).await?;

        let detections: Vec<Detection> = response
            .detections
            .into_iter()
            .map(|raw| {
                let readable = raw.title.is_some();
                Detection {
                    title: raw.title,
                    author: raw.author,
                    // Unreadable spines are reported, not dropped, at zero confidence
                    confidence: if readable {
                        raw.confidence.clamp(0.0, 1.0)
                    } else {
                        0.0
                    },
                    bounding_box: raw.bounding_box,
                    enrichment: None,
                }
            })
            .collect();

        let mut suggestions: Vec<QualitySuggestion> = response
            .quality_issues
            .iter()
            .filter_map(|code| parse_issue(code))
            .map(|issue| QualitySuggestion {
                issue,
                message: suggestion_message(issue).to_string(),
            })
            .collect();

        if let Some(readability) = readability_suggestion(&detections) {
            if !suggestions.iter().any(|s| s.issue == QualityIssue::LowReadability) {
                suggestions.push(readability);
            }
        }

        tracing::info!(
            detections = detections.len(),
            suggestions = suggestions.len(),
            "Spine detection completed"
        );

        Ok(DetectionOutcome {
            detections,
            suggestions,
        })
    }
}

fn parse_issue(code: &str) -> Option<QualityIssue> {
    match code {
        "blur" => Some(QualityIssue::Blur),
        "glare" => Some(QualityIssue::Glare),
        "distance" => Some(QualityIssue::Distance),
        "multiple_shelves" => Some(QualityIssue::MultipleShelves),
        "lighting" => Some(QualityIssue::Lighting),
        "angle" => Some(QualityIssue::Angle),
        "edge_cutoff" => Some(QualityIssue::EdgeCutoff),
        "low_readability" => Some(QualityIssue::LowReadability),
        other => {
            tracing::warn!(code = %other, "Unrecognized quality issue code from vision endpoint");
            None
        }
    }
}

fn suggestion_message(issue: QualityIssue) -> &'static str {
    match issue {
        QualityIssue::Blur => "The photo is blurry. Hold the camera steady and retake.",
        QualityIssue::Glare => "Glare is obscuring some spines. Adjust the angle to avoid reflections.",
        QualityIssue::Distance => "The shelf is too far away. Move closer so spine text is legible.",
        QualityIssue::MultipleShelves => {
            "Multiple shelves are in frame. Photograph one shelf at a time for best results."
        }
        QualityIssue::Lighting => "The photo is too dark. Add light or move to a brighter spot.",
        QualityIssue::Angle => "The camera angle is steep. Face the shelf straight on.",
        QualityIssue::EdgeCutoff => "Books at the edge are cut off. Reframe to include the full shelf.",
        QualityIssue::LowReadability => {
            "Many spine titles could not be read. Retake the photo closer and with more light."
        }
    }
}

/// Emit a retake suggestion when most located spines were unreadable
fn readability_suggestion(detections: &[Detection]) -> Option<QualitySuggestion> {
    if detections.is_empty() {
        return None;
    }

    let unreadable = detections
        .iter()
        .filter(|d| d.title.is_none() || d.confidence < LOW_CONFIDENCE)
        .count();

    if (unreadable as f64) / (detections.len() as f64) > LOW_READABILITY_RATIO {
        Some(QualitySuggestion {
            issue: QualityIssue::LowReadability,
            message: suggestion_message(QualityIssue::LowReadability).to_string(),
        })
    } else {
        None
    }
}
