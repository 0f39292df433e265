use serde::{Deserialize, Serialize};

use crate::entity::{clamp_confidence, ExtractionSource};

/// Placeholder predicates that carry almost no information. Relationships
/// using them are escalated for a more specific predicate.
pub const GENERIC_PREDICATES: &[&str] = &[
    "mentioned",
    "mentions",
    "mention",
    "related to",
    "is related to",
    "related",
    "associated with",
    "is associated with",
    "linked to",
    "connected to",
    "involved with",
    "involves",
    "about",
    "with",
    "and",
    "is",
    "has",
    "have",
    "relates to",
    "other",
];

#[must_use]
pub fn is_generic_predicate(predicate: &str) -> bool {
    let normalized = normalize_predicate(predicate);
    normalized.is_empty() || GENERIC_PREDICATES.contains(&normalized.as_str())
}

/// Lowercased, whitespace-collapsed predicate used for equality checks.
#[must_use]
pub fn normalize_predicate(predicate: &str) -> String {
    predicate
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub subject_id: String,
    pub predicate: String,
    pub object_id: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    pub source: ExtractionSource,
}

impl Relationship {
    pub fn new(
        subject_id: impl Into<String>,
        predicate: impl Into<String>,
        object_id: impl Into<String>,
        source: ExtractionSource,
    ) -> crate::Result<Self> {
        let subject_id = subject_id.into();
        let object_id = object_id.into();
        if subject_id == object_id {
            return Err(crate::Error::SelfReference(subject_id));
        }

        Ok(Self {
            subject_id,
            predicate: predicate.into().trim().to_string(),
            object_id,
            confidence: 0.0,
            evidence: None,
            source,
        })
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    #[must_use]
    pub fn with_evidence(mut self, evidence: Option<String>) -> Self {
        self.evidence = evidence.filter(|e| !e.trim().is_empty());
        self
    }

    /// Key used to collapse duplicate triples.
    #[must_use]
    pub fn triple_key(&self) -> (String, String, String) {
        (
            self.subject_id.clone(),
            normalize_predicate(&self.predicate),
            self.object_id.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_reference_rejected() {
        let err = Relationship::new("a", "founded", "a", ExtractionSource::RelationModel);
        assert!(matches!(err, Err(crate::Error::SelfReference(_))));
    }

    #[test]
    fn test_generic_predicates() {
        assert!(is_generic_predicate("Mentioned"));
        assert!(is_generic_predicate("  related   to "));
        assert!(is_generic_predicate(""));
        assert!(!is_generic_predicate("founded"));
        assert!(!is_generic_predicate("works for"));
    }

    #[test]
    fn test_triple_key_normalizes_predicate() {
        let a = Relationship::new("s", "Founded", "o", ExtractionSource::RelationModel).unwrap();
        let b = Relationship::new("s", "founded.", "o", ExtractionSource::Validator).unwrap();
        assert_eq!(a.triple_key(), b.triple_key());
    }

    #[test]
    fn test_empty_evidence_dropped() {
        let r = Relationship::new("s", "met", "o", ExtractionSource::RelationModel)
            .unwrap()
            .with_evidence(Some("   ".into()))
            .with_confidence(2.0);
        assert!(r.evidence.is_none());
        assert!((r.confidence - 1.0).abs() < f64::EPSILON);
    }
}
