//! End-to-end orchestration: extract, filter, deduplicate, route, build and,
//! for collections, resolve across documents.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::PipelineConfig;
use crate::dedup::Deduplicator;
use crate::document::{DocumentInput, PrecomputedExtraction};
use crate::entity::ExtractionSource;
use crate::extract::{
    CustomEntityExtractor, EntityCandidate, EntityModel, ExtractionOutput, Extractor,
    LexiconModel, ModelPool, PatternRelationModel, RelationCandidate, RelationExtractor,
    RelationModel, RuleBasedExtractor, SourcedOutput,
};
use crate::filter::{FilterReport, QualityFilter};
use crate::graph::{DocumentGraph, GraphBuilder};
use crate::resolve::{CrossDocumentResolver, UnifiedKnowledgeGraph};
use crate::validator::{BatchExecutor, RoutingReport, Validator, ValidatorRouter};

/// Confidence given to untrusted upstream items that carry none.
const PRECOMPUTED_CANDIDATE_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// Each document stands alone.
    #[default]
    Independent,
    /// Also unify entities across documents once every document is done.
    Resolve,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub document_id: String,
    pub used_precomputed: bool,
    pub extractor_failures: usize,
    pub filter: FilterReport,
    pub dedup_merges: usize,
    pub ambiguous_forms: Vec<String>,
    pub routing: RoutingReport,
    pub dropped_dangling: usize,
    pub dropped_self_loops: usize,
    pub collapsed_duplicates: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutput {
    pub graph: DocumentGraph,
    pub stats: DocumentStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionOutput {
    pub documents: Vec<DocumentOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unified: Option<UnifiedKnowledgeGraph>,
}

impl CollectionOutput {
    pub fn graphs(&self) -> impl Iterator<Item = &DocumentGraph> {
        self.documents.iter().map(|d| &d.graph)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    extractors: Vec<Arc<dyn Extractor>>,
    filter: QualityFilter,
    dedup: Deduplicator,
    builder: GraphBuilder,
    router: ValidatorRouter,
    resolver: CrossDocumentResolver,
}

impl Pipeline {
    /// Builds the default extractor set from `pool`. Every pipeline sharing a
    /// pool reuses the same model instances.
    pub fn new(
        config: PipelineConfig,
        pool: &ModelPool,
        validator: Option<Arc<dyn Validator>>,
    ) -> crate::Result<Self> {
        config.validate()?;

        let extraction = &config.extraction;
        let mut extractors: Vec<Arc<dyn Extractor>> = vec![Arc::new(RuleBasedExtractor::new(
            pool.rule_ner(&extraction.rule_model_id)?,
        ))];

        if !extraction.custom_labels.is_empty() {
            let id = extraction.entity_model_id.as_str();
            let model = pool.entity_model(id, || {
                let model: Arc<dyn EntityModel> = Arc::new(
                    LexiconModel::new(id, &extraction.custom_labels)?
                        .with_max_input_chars(extraction.chunk_max_chars),
                );
                Ok(model)
            })?;
            let labels = extraction.custom_labels.keys().cloned().collect();
            extractors.push(Arc::new(
                CustomEntityExtractor::new(model, labels)
                    .with_chunk_max_chars(extraction.chunk_max_chars),
            ));
        }

        let relation_model = pool.relation_model(&extraction.relation_model_id, || {
            let model: Arc<dyn RelationModel> = Arc::new(PatternRelationModel::new()?);
            Ok(model)
        })?;
        extractors.push(Arc::new(RelationExtractor::new(relation_model)));

        // Router and resolver share one executor, hence one in-flight bound.
        let executor = validator.map(|v| BatchExecutor::new(v, &config.validator));

        Ok(Self {
            extractors,
            filter: QualityFilter::new(config.filter.clone()),
            dedup: Deduplicator::new(config.dedup.clone()),
            builder: GraphBuilder::new(&config.dedup),
            router: ValidatorRouter::new(&config.validator, executor.clone()),
            resolver: CrossDocumentResolver::new(config.resolver.clone(), executor),
            config,
        })
    }

    /// Replaces the extractor set, e.g. with fakes in tests.
    #[must_use]
    pub fn with_extractors(mut self, extractors: Vec<Arc<dyn Extractor>>) -> Self {
        self.extractors = extractors;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes one document. Never fails: bad input yields an empty graph
    /// and every drop is logged.
    pub async fn process_document(&self, input: &DocumentInput) -> DocumentOutput {
        let start = Instant::now();
        let metadata = &input.metadata;
        let mut stats = DocumentStats {
            document_id: metadata.id.clone(),
            ..DocumentStats::default()
        };

        if self.config.run.trust_precomputed {
            if let Some(precomputed) = &input.precomputed {
                let outcome = self.builder.build_precomputed(metadata, precomputed);
                stats.used_precomputed = true;
                stats.dropped_dangling = outcome.dropped_dangling;
                stats.dropped_self_loops = outcome.dropped_self_loops;
                stats.collapsed_duplicates = outcome.collapsed_duplicates;
                stats.duration_ms = elapsed_ms(start);
                tracing::info!(
                    document_id = %metadata.id,
                    entities = outcome.graph.entities.len(),
                    "Used trusted precomputed extraction"
                );
                return DocumentOutput {
                    graph: outcome.graph,
                    stats,
                };
            }
        }

        if !input.has_text() {
            tracing::warn!(rule = "empty_input", document_id = %metadata.id, "Document has no text");
            stats.duration_ms = elapsed_ms(start);
            return DocumentOutput {
                graph: DocumentGraph::empty(metadata),
                stats,
            };
        }

        let (text, index) = input.assemble();
        let text: Arc<str> = Arc::from(text);

        let (mut outputs, failures) = self.run_extractors(&text, &metadata.id).await;
        stats.extractor_failures = failures;
        if let Some(precomputed) = &input.precomputed {
            outputs.push(precomputed_output(precomputed));
        }

        let filtered = self
            .filter
            .apply(&text, &index, metadata.language.as_deref(), outputs);
        stats.filter = filtered.report;

        let deduped = self.dedup.deduplicate(&filtered.entities);
        stats.dedup_merges = deduped.merges;
        stats.ambiguous_forms = deduped.ambiguous;

        let routed = self
            .router
            .route(deduped.entities, filtered.relationships, &metadata.title)
            .await;
        stats.routing = routed.report;

        let outcome = self
            .builder
            .build(metadata, routed.entities, routed.relationships);
        stats.dropped_dangling = outcome.dropped_dangling;
        stats.dropped_self_loops = outcome.dropped_self_loops;
        stats.collapsed_duplicates = outcome.collapsed_duplicates;
        stats.duration_ms = elapsed_ms(start);

        tracing::info!(
            document_id = %metadata.id,
            entities = outcome.graph.stats.node_count,
            relationships = outcome.graph.relationships.len(),
            escalated = stats.routing.escalated,
            duration_ms = stats.duration_ms,
            "Processed document"
        );

        DocumentOutput {
            graph: outcome.graph,
            stats,
        }
    }

    /// Runs every extractor on the blocking pool and waits for all of them.
    async fn run_extractors(&self, text: &Arc<str>, document_id: &str) -> (Vec<SourcedOutput>, usize) {
        let handles: Vec<(String, tokio::task::JoinHandle<_>)> = self
            .extractors
            .iter()
            .map(|extractor| {
                let extractor = Arc::clone(extractor);
                let text = Arc::clone(text);
                let name = extractor.name().to_string();
                (
                    name,
                    tokio::task::spawn_blocking(move || extractor.extract_sourced(&text)),
                )
            })
            .collect();

        let mut outputs = Vec::with_capacity(handles.len());
        let mut failures = 0;
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(output)) => outputs.push(output),
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!(
                        rule = "extractor_failed",
                        extractor = %name,
                        document_id,
                        error = %e,
                        "Continuing without extractor"
                    );
                }
                Err(e) => {
                    failures += 1;
                    tracing::error!(
                        rule = "extractor_panicked",
                        extractor = %name,
                        document_id,
                        error = %e,
                        "Continuing without extractor"
                    );
                }
            }
        }
        (outputs, failures)
    }

    /// Processes documents concurrently, bounded by
    /// `run.document_concurrency`. In [`CollectionMode::Resolve`] the
    /// resolver starts once every document has finished.
    pub async fn process_collection(
        self: &Arc<Self>,
        inputs: Vec<DocumentInput>,
        mode: CollectionMode,
    ) -> CollectionOutput {
        let limit = Arc::new(Semaphore::new(self.config.run.document_concurrency.max(1)));
        let mut handles = Vec::with_capacity(inputs.len());

        for input in inputs {
            let metadata = input.metadata.clone();
            let pipeline = Arc::clone(self);
            let limit = Arc::clone(&limit);
            let handle = tokio::spawn(async move {
                let _permit = limit.acquire_owned().await.ok();
                pipeline.process_document(&input).await
            });
            handles.push((metadata, handle));
        }

        let mut documents = Vec::with_capacity(handles.len());
        for (metadata, handle) in handles {
            match handle.await {
                Ok(output) => documents.push(output),
                Err(e) => {
                    tracing::error!(
                        rule = "document_failed",
                        document_id = %metadata.id,
                        error = %e,
                        "Substituting an empty graph"
                    );
                    documents.push(DocumentOutput {
                        graph: DocumentGraph::empty(&metadata),
                        stats: DocumentStats {
                            document_id: metadata.id.clone(),
                            ..DocumentStats::default()
                        },
                    });
                }
            }
        }

        let unified = match mode {
            CollectionMode::Independent => None,
            CollectionMode::Resolve => {
                let graphs: Vec<DocumentGraph> = documents.iter().map(|d| d.graph.clone()).collect();
                let unified = self.resolver.resolve(&graphs).await;
                tracing::info!(
                    documents = graphs.len(),
                    entities = unified.stats.unified_entities,
                    merges = unified.stats.merges,
                    escalations = unified.stats.escalations,
                    "Resolved collection"
                );
                Some(unified)
            }
        };

        CollectionOutput { documents, unified }
    }
}

/// Untrusted upstream extractions enter the filter like any other extractor.
fn precomputed_output(precomputed: &PrecomputedExtraction) -> SourcedOutput {
    let mut output = ExtractionOutput::new();
    for entity in &precomputed.entities {
        let confidence = entity.confidence.unwrap_or(PRECOMPUTED_CANDIDATE_CONFIDENCE);
        for name in std::iter::once(&entity.name).chain(&entity.aliases) {
            let mut candidate = EntityCandidate::new(name, entity.entity_type.clone(), confidence)
                .with_source(ExtractionSource::Validator);
            candidate.properties.extend(entity.properties.clone());
            output.entities.push(candidate);
        }
    }
    for relation in &precomputed.relationships {
        let mut candidate = RelationCandidate::new(
            &relation.subject,
            &relation.predicate,
            &relation.object,
            relation.confidence.unwrap_or(PRECOMPUTED_CANDIDATE_CONFIDENCE),
        )
        .with_source(ExtractionSource::Validator);
        candidate.evidence.clone_from(&relation.evidence);
        output.relationships.push(candidate);
    }
    SourcedOutput::new(ExtractionSource::Validator, output)
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentMetadata, PrecomputedEntity, TranscriptSegment};
    use crate::entity::EntityType;
    use crate::extract::{ExtractionError, ExtractionResult};
    use std::collections::BTreeMap;

    struct Failing;

    impl Extractor for Failing {
        fn source(&self) -> ExtractionSource {
            ExtractionSource::CustomEntityModel
        }

        fn name(&self) -> &str {
            "failing"
        }

        fn extract(&self, _: &str) -> ExtractionResult<ExtractionOutput> {
            Err(ExtractionError::ModelUnavailable("offline".into()))
        }
    }

    struct Panicking;

    impl Extractor for Panicking {
        fn source(&self) -> ExtractionSource {
            ExtractionSource::CustomEntityModel
        }

        fn name(&self) -> &str {
            "panicking"
        }

        fn extract(&self, _: &str) -> ExtractionResult<ExtractionOutput> {
            panic!("model crashed")
        }
    }

    fn pipeline(config: PipelineConfig) -> Pipeline {
        Pipeline::new(config, &ModelPool::new(), None).unwrap()
    }

    #[tokio::test]
    async fn test_empty_document_gives_empty_graph() {
        let input = DocumentInput::new(
            DocumentMetadata::new("empty", "Silence"),
            vec![TranscriptSegment::new(0.0, 3.0, "  ... ")],
        );
        let output = pipeline(PipelineConfig::default()).process_document(&input).await;
        assert!(output.graph.is_empty());
        assert_eq!(output.graph.document_id, "empty");
    }

    #[tokio::test]
    async fn test_failing_extractors_do_not_abort() {
        let pool = ModelPool::new();
        let base = Pipeline::new(PipelineConfig::default(), &pool, None).unwrap();
        let ner: Arc<dyn Extractor> = Arc::new(RuleBasedExtractor::new(pool.rule_ner("rule-ner/v1").unwrap()));
        let pipeline = base.with_extractors(vec![ner, Arc::new(Failing), Arc::new(Panicking)]);

        let input = DocumentInput::from_text("d1", "Episode", "Elon Musk founded SpaceX.");
        let output = pipeline.process_document(&input).await;
        assert_eq!(output.stats.extractor_failures, 2);
        assert!(output.graph.find("Elon Musk").is_some());
    }

    #[tokio::test]
    async fn test_trusted_precomputed_skips_extraction() {
        let mut config = PipelineConfig::default();
        config.run.trust_precomputed = true;
        let precomputed = PrecomputedExtraction {
            entities: vec![PrecomputedEntity {
                name: "Pegasus".into(),
                entity_type: EntityType::Product,
                confidence: Some(0.9),
                aliases: Vec::new(),
                mention_count: None,
                properties: BTreeMap::new(),
            }],
            relationships: Vec::new(),
        };
        let input = DocumentInput::from_text("d1", "Episode", "Elon Musk founded SpaceX.")
            .with_precomputed(precomputed);
        let output = pipeline(config).process_document(&input).await;
        assert!(output.stats.used_precomputed);
        assert_eq!(output.graph.entities.len(), 1);
        assert!(output.graph.find("Elon Musk").is_none());
    }

    #[tokio::test]
    async fn test_untrusted_precomputed_joins_extraction() {
        let precomputed = PrecomputedExtraction {
            entities: vec![PrecomputedEntity {
                name: "Pegasus".into(),
                entity_type: EntityType::Product,
                confidence: Some(0.9),
                aliases: Vec::new(),
                mention_count: None,
                properties: BTreeMap::new(),
            }],
            relationships: Vec::new(),
        };
        let input = DocumentInput::from_text("d1", "Episode", "Elon Musk founded SpaceX and built Pegasus.")
            .with_precomputed(precomputed);
        let output = pipeline(PipelineConfig::default()).process_document(&input).await;
        assert!(!output.stats.used_precomputed);
        assert!(output.graph.find("Elon Musk").is_some());
        let pegasus = output.graph.find("Pegasus").unwrap();
        assert!(pegasus.sources.contains(&ExtractionSource::Validator));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.run.document_concurrency = 0;
        assert!(Pipeline::new(config, &ModelPool::new(), None).is_err());
    }

    #[tokio::test]
    async fn test_models_loaded_once_per_pool() {
        let pool = ModelPool::new();
        let mut config = PipelineConfig::default();
        config
            .extraction
            .custom_labels
            .insert("SPYWARE".into(), vec!["Pegasus".into()]);
        for _ in 0..3 {
            Pipeline::new(config.clone(), &pool, None).unwrap();
        }
        assert_eq!(pool.load_count(), 3);
    }

    #[tokio::test]
    async fn test_collection_independent_by_default() {
        let pipeline = Arc::new(pipeline(PipelineConfig::default()));
        let inputs = vec![
            DocumentInput::from_text("a", "One", "Elon Musk founded SpaceX."),
            DocumentInput::from_text("b", "Two", ""),
            DocumentInput::from_text("c", "Three", "Elon Musk runs SpaceX."),
        ];
        let output = pipeline
            .process_collection(inputs, CollectionMode::default())
            .await;
        assert!(output.unified.is_none());
        let ids: Vec<&str> = output.graphs().map(|g| g.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(output.documents[1].graph.is_empty());
    }
}
