pub mod config;
pub mod dedup;
pub mod document;
pub mod entity;
pub mod error;
pub mod extract;
pub mod filter;
pub mod fusion;
pub mod graph;
pub mod normalize;
pub mod pipeline;
pub mod relationship;
pub mod resolve;
pub mod validator;

pub use config::{
    ConfigError, DedupConfig, ExtractionConfig, FilterConfig, PipelineConfig, ResolverConfig,
    RunConfig, ValidatorConfig,
};
pub use dedup::{DedupOutcome, Deduplicator};
pub use document::{
    DocumentInput, DocumentMetadata, PrecomputedEntity, PrecomputedExtraction,
    PrecomputedRelationship, TranscriptSegment,
};
pub use entity::{canonical_id, Entity, EntityType, ExtractionSource, TextSpan};
pub use error::{Error, Result};
pub use extract::{
    CustomEntityExtractor, EntityCandidate, EntityModel, ExtractionError, ExtractionOutput,
    ExtractionResult, Extractor, LexiconModel, ModelPool, ModelSpan, PatternRelationModel, RelationCandidate,
    RelationExtractor, RelationModel, RuleBasedExtractor, RuleBasedNer, SourcedOutput,
};
pub use filter::{FilterReport, FilteredCandidates, QualityFilter};
pub use fusion::{fuse, Fused, Observation};
pub use graph::{BuildOutcome, DocumentGraph, GraphBuilder, GraphStats};
pub use pipeline::{CollectionMode, CollectionOutput, DocumentOutput, DocumentStats, Pipeline};
pub use relationship::{is_generic_predicate, Relationship};
pub use resolve::{
    CrossDocumentEntity, CrossDocumentResolver, MemberRef, ResolutionStats, TemporalContext,
    UnifiedKnowledgeGraph, UnifiedRelationship,
};
pub use validator::{
    BatchExecutor, BatchResult, Correction, EscalationReason, HttpValidator, ItemOutcome,
    ItemPayload, ItemState, Referent, RetryPolicy, RoutedSet, RoutingDecision, RoutingReport,
    ValidationItem, ValidationResponse, Validator, ValidatorError, ValidatorResult,
    ValidatorRouter, Verdict,
};
