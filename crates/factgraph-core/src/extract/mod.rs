//! Local extractors.
//!
//! Each extractor is an independent, synchronous pass over the assembled text
//! of one document. Extractors share no mutable state; model instances come
//! from a caller-owned [`ModelPool`] and are only read.

mod chunk;
mod custom;
mod pool;
mod relation;
mod rule_ner;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{EntityType, ExtractionSource, TextSpan};

pub use chunk::{chunk_text, sentence_spans, Chunk};
pub use custom::{CustomEntityExtractor, EntityModel, LexiconModel, ModelSpan};
pub use pool::ModelPool;
pub use relation::{
    parse_relation_output, PatternRelationModel, RawTriple, RelationExtractor, RelationModel,
};
pub use rule_ner::{RuleBasedExtractor, RuleBasedNer};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Extraction failed: {0}")]
    Failed(String),
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Input too long: {len} chars (max: {max})")]
    InputTooLong { len: usize, max: usize },
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// An entity proposed by one extractor, before filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCandidate {
    pub name: String,
    pub entity_type: EntityType,
    pub confidence: f64,
    /// Left unset by extractors that do not know their own identity; the
    /// quality filter repairs it from the producing call.
    pub source: Option<ExtractionSource>,
    pub span: Option<TextSpan>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl EntityCandidate {
    #[must_use]
    pub fn new(name: impl Into<String>, entity_type: EntityType, confidence: f64) -> Self {
        Self {
            name: name.into(),
            entity_type,
            confidence,
            source: None,
            span: None,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: ExtractionSource) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: TextSpan) -> Self {
        self.span = Some(span);
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A (subject, predicate, object) triple proposed by the relation extractor.
/// Endpoints are surface names; the graph builder resolves them to ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationCandidate {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f64,
    pub evidence: Option<String>,
    pub source: Option<ExtractionSource>,
    pub span: Option<TextSpan>,
}

impl RelationCandidate {
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            confidence,
            evidence: None,
            source: None,
            span: None,
        }
    }

    #[must_use]
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: ExtractionSource) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: TextSpan) -> Self {
        self.span = Some(span);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub entities: Vec<EntityCandidate>,
    pub relationships: Vec<RelationCandidate>,
}

impl ExtractionOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entity(mut self, entity: EntityCandidate) -> Self {
        self.entities.push(entity);
        self
    }

    #[must_use]
    pub fn with_relationship(mut self, rel: RelationCandidate) -> Self {
        self.relationships.push(rel);
        self
    }

    pub fn merge(&mut self, other: Self) {
        self.entities.extend(other.entities);
        self.relationships.extend(other.relationships);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Output of one extractor call, tagged with the extractor that made it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedOutput {
    pub source: ExtractionSource,
    pub output: ExtractionOutput,
}

impl SourcedOutput {
    #[must_use]
    pub fn new(source: ExtractionSource, output: ExtractionOutput) -> Self {
        Self { source, output }
    }
}

pub trait Extractor: Send + Sync {
    fn source(&self) -> ExtractionSource;

    fn name(&self) -> &str;

    fn extract(&self, text: &str) -> ExtractionResult<ExtractionOutput>;

    /// Runs [`Extractor::extract`] and tags the result with this extractor's source.
    fn extract_sourced(&self, text: &str) -> ExtractionResult<SourcedOutput> {
        Ok(SourcedOutput::new(self.source(), self.extract(text)?))
    }
}
