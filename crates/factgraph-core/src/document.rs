use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub start_seconds: f64,
    #[serde(default)]
    pub end_seconds: f64,
    pub text: String,
}

impl TranscriptSegment {
    #[must_use]
    pub fn new(start_seconds: f64, end_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            start_seconds,
            end_seconds,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_timestamp: Option<DateTime<Utc>>,
    /// ISO 639-1 code; falls back to the configured expected language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl DocumentMetadata {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_content_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.content_timestamp = Some(at);
        self
    }

    /// Content timestamp when known, otherwise the publish timestamp.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.content_timestamp.or(self.published_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecomputedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub mention_count: Option<u32>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecomputedRelationship {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub evidence: Option<String>,
}

/// Entities and relationships already produced by an LLM upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrecomputedExtraction {
    #[serde(default)]
    pub entities: Vec<PrecomputedEntity>,
    #[serde(default)]
    pub relationships: Vec<PrecomputedRelationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precomputed: Option<PrecomputedExtraction>,
}

impl DocumentInput {
    #[must_use]
    pub fn new(metadata: DocumentMetadata, segments: Vec<TranscriptSegment>) -> Self {
        Self {
            metadata,
            segments,
            precomputed: None,
        }
    }

    /// Single-segment document, convenient for plain text.
    #[must_use]
    pub fn from_text(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            DocumentMetadata::new(id, title),
            vec![TranscriptSegment::new(0.0, 0.0, text)],
        )
    }

    #[must_use]
    pub fn with_precomputed(mut self, precomputed: PrecomputedExtraction) -> Self {
        self.precomputed = Some(precomputed);
        self
    }

    /// Full text with segments joined by a single space, plus the byte offset
    /// at which each segment starts.
    #[must_use]
    pub fn assemble(&self) -> (String, SegmentIndex) {
        let mut text = String::new();
        let mut starts = Vec::with_capacity(self.segments.len());

        for segment in &self.segments {
            let trimmed = segment.text.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push(' ');
            }
            starts.push((text.len(), segment.start_seconds));
            text.push_str(trimmed);
        }

        (text, SegmentIndex { starts })
    }

    #[must_use]
    pub fn has_text(&self) -> bool {
        self.segments
            .iter()
            .any(|s| s.text.chars().any(char::is_alphanumeric))
    }
}

/// Maps byte offsets in the assembled text back to segment start times.
#[derive(Debug, Clone, Default)]
pub struct SegmentIndex {
    starts: Vec<(usize, f64)>,
}

impl SegmentIndex {
    #[must_use]
    pub fn seconds_at(&self, offset: usize) -> Option<f64> {
        let idx = self.starts.partition_point(|(start, _)| *start <= offset);
        idx.checked_sub(1).map(|i| self.starts[i].1)
    }

    /// True when segments carry real timestamps rather than the zero
    /// placeholder used for plain text.
    #[must_use]
    pub fn is_timed(&self) -> bool {
        self.starts.iter().any(|(_, seconds)| *seconds > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_joins_segments_and_indexes_offsets() {
        let doc = DocumentInput::new(
            DocumentMetadata::new("d1", "Episode 1"),
            vec![
                TranscriptSegment::new(0.0, 4.0, "Hello there."),
                TranscriptSegment::new(4.0, 5.0, "   "),
                TranscriptSegment::new(5.0, 9.0, "Second part."),
            ],
        );
        let (text, index) = doc.assemble();
        assert_eq!(text, "Hello there. Second part.");
        assert_eq!(index.seconds_at(0), Some(0.0));
        assert_eq!(index.seconds_at(14), Some(5.0));
    }

    #[test]
    fn test_has_text() {
        assert!(!DocumentInput::from_text("d", "t", "  ...  ").has_text());
        assert!(DocumentInput::from_text("d", "t", "Words").has_text());
    }

    #[test]
    fn test_timestamp_prefers_content_time() {
        let published = DateTime::parse_from_rfc3339("2024-01-02T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let content = DateTime::parse_from_rfc3339("2023-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let meta = DocumentMetadata::new("d", "t").with_published_at(published);
        assert_eq!(meta.timestamp(), Some(published));
        let meta = meta.with_content_timestamp(content);
        assert_eq!(meta.timestamp(), Some(content));
    }
}
