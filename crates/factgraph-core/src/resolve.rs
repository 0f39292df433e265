//! Cross-document entity resolution.
//!
//! Entities of the same type from different documents merge when their names
//! score at or above the resolver threshold. Borderline pairs go to the
//! validator with each side's context; a pair only merges on confirmation.
//! Entities from one document never merge with each other here.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ResolverConfig;
use crate::dedup::{merge_entities, UnionFind};
use crate::entity::{Entity, EntityType};
use crate::graph::{DocumentGraph, GraphStats};
use crate::normalize::{contains_as_words, meets_threshold, normalize_for, similarity};
use crate::relationship::Relationship;
use crate::validator::{
    BatchExecutor, EscalationReason, ItemPayload, Referent, ValidationItem, Verdict,
};

const MAX_REFERENT_CONTEXT: usize = 3;

/// One contributing (document, entity) pair of a unified entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberRef {
    pub document_id: String,
    pub canonical_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    pub document_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossDocumentEntity {
    pub unified_id: String,
    #[serde(flatten)]
    pub entity: Entity,
    pub member_ids: Vec<MemberRef>,
    pub temporal_context: TemporalContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRelationship {
    #[serde(flatten)]
    pub relationship: Relationship,
    pub document_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub documents: usize,
    pub input_entities: usize,
    pub unified_entities: usize,
    /// Input entities absorbed into another across documents.
    pub merges: usize,
    pub borderline_pairs: usize,
    pub escalations: usize,
    pub escalations_confirmed: usize,
    pub escalations_rejected: usize,
    /// Borderline pairs with no verdict, left unmerged.
    pub escalations_failed: usize,
    pub cannot_link_skips: usize,
    pub dropped_self_loops: usize,
    pub validator_calls: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedKnowledgeGraph {
    pub document_ids: Vec<String>,
    /// Keyed by unified id.
    pub entities: BTreeMap<String, CrossDocumentEntity>,
    pub relationships: Vec<UnifiedRelationship>,
    pub stats: ResolutionStats,
    pub graph_stats: GraphStats,
}

impl UnifiedKnowledgeGraph {
    /// Unified entity that absorbed `canonical_id` of `document_id`.
    #[must_use]
    pub fn entity_for(&self, document_id: &str, canonical_id: &str) -> Option<&CrossDocumentEntity> {
        self.entities.values().find(|e| {
            e.member_ids
                .iter()
                .any(|m| m.document_id == document_id && m.canonical_id == canonical_id)
        })
    }

    #[must_use]
    pub fn find(&self, name: &str, entity_type: &EntityType) -> Vec<&CrossDocumentEntity> {
        let key = normalize_for(name, entity_type);
        self.entities
            .values()
            .filter(|e| &e.entity.entity_type == entity_type)
            .filter(|e| e.entity.surface_forms().any(|f| normalize_for(f, entity_type) == key))
            .collect()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.relationships.iter().all(|r| {
            self.entities.contains_key(&r.relationship.subject_id)
                && self.entities.contains_key(&r.relationship.object_id)
        })
    }
}

struct Node<'a> {
    doc: usize,
    entity: &'a Entity,
    forms: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Pair {
    a: usize,
    b: usize,
    score: f64,
}

/// Resolves a completed collection of document graphs into one graph.
pub struct CrossDocumentResolver {
    config: ResolverConfig,
    executor: Option<BatchExecutor>,
}

impl CrossDocumentResolver {
    #[must_use]
    pub fn new(config: ResolverConfig, executor: Option<BatchExecutor>) -> Self {
        Self { config, executor }
    }

    pub async fn resolve(&self, graphs: &[DocumentGraph]) -> UnifiedKnowledgeGraph {
        let mut stats = ResolutionStats {
            documents: graphs.len(),
            ..ResolutionStats::default()
        };

        let nodes: Vec<Node<'_>> = graphs
            .iter()
            .enumerate()
            .flat_map(|(doc, graph)| {
                graph.entities.values().map(move |entity| Node {
                    doc,
                    entity,
                    forms: entity
                        .surface_forms()
                        .map(|f| normalize_for(f, &entity.entity_type))
                        .filter(|f| !f.is_empty())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect(),
                })
            })
            .collect();
        stats.input_entities = nodes.len();

        let (strong, borderline) = self.candidate_pairs(&nodes);

        let mut clusters = Clusters::new(&nodes);
        for pair in &strong {
            if !clusters.join(pair.a, pair.b) {
                stats.cannot_link_skips += 1;
            }
        }

        let pending: Vec<Pair> = borderline
            .into_iter()
            .filter(|p| !clusters.same(p.a, p.b))
            .collect();
        stats.borderline_pairs = pending.len();
        self.settle_borderline(graphs, &nodes, &pending, &mut clusters, &mut stats)
            .await;

        let mut unified = self.assemble(graphs, &nodes, &mut clusters, &mut stats);
        unified.document_ids = graphs.iter().map(|g| g.document_id.clone()).collect();
        unified.stats = stats;
        unified
    }

    fn candidate_pairs(&self, nodes: &[Node<'_>]) -> (Vec<Pair>, Vec<Pair>) {
        let mut by_type: BTreeMap<&EntityType, Vec<usize>> = BTreeMap::new();
        for (idx, node) in nodes.iter().enumerate() {
            by_type.entry(&node.entity.entity_type).or_default().push(idx);
        }

        let mut strong = Vec::new();
        let mut borderline = Vec::new();
        for members in by_type.values() {
            for (i, &a) in members.iter().enumerate() {
                for &b in &members[i + 1..] {
                    if nodes[a].doc == nodes[b].doc {
                        continue;
                    }
                    let (score, substring) = best_match(&nodes[a].forms, &nodes[b].forms);
                    let pair = Pair { a, b, score };
                    if meets_threshold(score, self.config.similarity_threshold) {
                        strong.push(pair);
                    } else if substring || meets_threshold(score, self.config.borderline_threshold) {
                        borderline.push(pair);
                    }
                }
            }
        }

        strong.sort_by(|x, y| y.score.total_cmp(&x.score).then((x.a, x.b).cmp(&(y.a, y.b))));
        (strong, borderline)
    }

    async fn settle_borderline(
        &self,
        graphs: &[DocumentGraph],
        nodes: &[Node<'_>],
        pending: &[Pair],
        clusters: &mut Clusters,
        stats: &mut ResolutionStats,
    ) {
        if pending.is_empty() {
            return;
        }
        let Some(executor) = &self.executor else {
            stats.escalations_failed += pending.len();
            for pair in pending {
                tracing::debug!(
                    rule = "borderline_unverified",
                    left = %nodes[pair.a].entity.name,
                    right = %nodes[pair.b].entity.name,
                    score = pair.score,
                    "No validator; keeping entities apart"
                );
            }
            return;
        };

        let items: Vec<ValidationItem> = pending
            .iter()
            .enumerate()
            .map(|(k, pair)| {
                ValidationItem::new(
                    format!("p{k}"),
                    EscalationReason::BorderlineMatch,
                    ItemPayload::SameReferent {
                        left: referent(&graphs[nodes[pair.a].doc], nodes[pair.a].entity),
                        right: referent(&graphs[nodes[pair.b].doc], nodes[pair.b].entity),
                        similarity: pair.score,
                    },
                )
            })
            .collect();
        stats.escalations = items.len();

        let mut result = executor.run(items).await;
        stats.validator_calls = result.calls;

        for (k, pair) in pending.iter().enumerate() {
            let (left, right) = (&nodes[pair.a].entity.name, &nodes[pair.b].entity.name);
            match result.responses.remove(&format!("p{k}")).map(|r| r.verdict) {
                Some(Verdict::Confirmed { .. }) => {
                    stats.escalations_confirmed += 1;
                    if !clusters.join(pair.a, pair.b) {
                        stats.cannot_link_skips += 1;
                        tracing::debug!(rule = "cannot_link", %left, %right, "Confirmed pair left apart");
                    }
                }
                Some(Verdict::Rejected { .. } | Verdict::Corrected { .. }) => {
                    stats.escalations_rejected += 1;
                    tracing::debug!(rule = "borderline_rejected", %left, %right, "Distinct entities");
                }
                None => {
                    stats.escalations_failed += 1;
                    tracing::debug!(rule = "borderline_unverified", %left, %right, "No verdict; keeping apart");
                }
            }
        }
    }

    fn assemble(
        &self,
        graphs: &[DocumentGraph],
        nodes: &[Node<'_>],
        clusters: &mut Clusters,
        stats: &mut ResolutionStats,
    ) -> UnifiedKnowledgeGraph {
        let mut unified = UnifiedKnowledgeGraph::default();
        let mut member_of: HashMap<(usize, &str), String> = HashMap::new();
        let mut taken: BTreeSet<String> = BTreeSet::new();

        for members in clusters.uf.groups() {
            // Byte offsets are document-local, so spans are dropped and
            // mention counts add up across documents.
            let mut local: Vec<Entity> = members
                .iter()
                .map(|&i| {
                    let mut entity = nodes[i].entity.clone();
                    entity.spans.clear();
                    entity
                })
                .collect();
            let entity = match local.len() {
                1 => local.remove(0),
                n => {
                    stats.merges += n - 1;
                    let refs: Vec<&Entity> = local.iter().collect();
                    merge_entities(
                        &refs,
                        self.config.canonical_tolerance,
                        self.config.max_context_windows,
                    )
                }
            };

            let member_ids: Vec<MemberRef> = members
                .iter()
                .map(|&i| MemberRef {
                    document_id: graphs[nodes[i].doc].document_id.clone(),
                    canonical_id: nodes[i].entity.canonical_id.clone(),
                })
                .collect();

            let unified_id = if taken.contains(&entity.canonical_id) {
                let namespace = Uuid::parse_str(&entity.canonical_id).unwrap_or_default();
                let first = &member_ids[0];
                let key = format!("{}:{}", first.document_id, first.canonical_id);
                Uuid::new_v5(&namespace, key.as_bytes()).to_string()
            } else {
                entity.canonical_id.clone()
            };
            taken.insert(unified_id.clone());

            for &i in &members {
                member_of.insert((nodes[i].doc, nodes[i].entity.canonical_id.as_str()), unified_id.clone());
            }

            if members.len() > 1 {
                tracing::debug!(
                    rule = "cross_document_merge",
                    item = %entity.name,
                    members = members.len(),
                    "Unified entity"
                );
            }

            let temporal_context = temporal_context(graphs, members.iter().map(|&i| nodes[i].doc));
            unified.entities.insert(
                unified_id.clone(),
                CrossDocumentEntity {
                    unified_id,
                    entity,
                    member_ids,
                    temporal_context,
                },
            );
        }
        stats.unified_entities = unified.entities.len();

        let mut triples: HashMap<(String, String, String), usize> = HashMap::new();
        for (doc, graph) in graphs.iter().enumerate() {
            for relationship in &graph.relationships {
                let subject = member_of.get(&(doc, relationship.subject_id.as_str()));
                let object = member_of.get(&(doc, relationship.object_id.as_str()));
                let (Some(subject), Some(object)) = (subject, object) else {
                    tracing::debug!(
                        rule = "dangling_endpoint",
                        document_id = %graph.document_id,
                        item = %relationship.predicate,
                        "Dropping relationship"
                    );
                    continue;
                };
                if subject == object {
                    stats.dropped_self_loops += 1;
                    tracing::debug!(
                        rule = "merged_self_loop",
                        document_id = %graph.document_id,
                        item = %relationship.predicate,
                        "Dropping relationship"
                    );
                    continue;
                }

                let mut remapped = relationship.clone();
                remapped.subject_id.clone_from(subject);
                remapped.object_id.clone_from(object);
                let key = remapped.triple_key();
                match triples.get(&key) {
                    Some(&idx) => {
                        let existing = &mut unified.relationships[idx];
                        if remapped.confidence > existing.relationship.confidence {
                            existing.relationship.confidence = remapped.confidence;
                        }
                        if existing.relationship.evidence.is_none() {
                            existing.relationship.evidence = remapped.evidence;
                        }
                        if !existing.document_ids.contains(&graph.document_id) {
                            existing.document_ids.push(graph.document_id.clone());
                        }
                    }
                    None => {
                        triples.insert(key, unified.relationships.len());
                        unified.relationships.push(UnifiedRelationship {
                            relationship: remapped,
                            document_ids: vec![graph.document_id.clone()],
                        });
                    }
                }
            }
        }

        unified.graph_stats = GraphStats::compute(
            unified.entities.keys().map(String::as_str),
            unified.relationships.iter().map(|r| {
                (
                    r.relationship.subject_id.as_str(),
                    r.relationship.object_id.as_str(),
                )
            }),
        );
        unified
    }
}

/// Union-find that refuses to join clusters sharing a document.
struct Clusters {
    uf: UnionFind,
    docs: HashMap<usize, BTreeSet<usize>>,
}

impl Clusters {
    fn new(nodes: &[Node<'_>]) -> Self {
        Self {
            uf: UnionFind::new(nodes.len()),
            docs: nodes
                .iter()
                .enumerate()
                .map(|(i, n)| (i, BTreeSet::from([n.doc])))
                .collect(),
        }
    }

    fn same(&mut self, a: usize, b: usize) -> bool {
        self.uf.find(a) == self.uf.find(b)
    }

    /// False when the clusters overlap in a document and stay apart.
    fn join(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.uf.find(a), self.uf.find(b));
        if ra == rb {
            return true;
        }
        let left = self.docs.remove(&ra).unwrap_or_default();
        let right = self.docs.remove(&rb).unwrap_or_default();
        if !left.is_disjoint(&right) {
            self.docs.insert(ra, left);
            self.docs.insert(rb, right);
            return false;
        }
        self.uf.union(ra, rb);
        let root = self.uf.find(ra);
        self.docs.insert(root, left.into_iter().chain(right).collect());
        true
    }
}

/// Best LCS score over all form pairs, and whether one form contains another
/// on word boundaries.
fn best_match(left: &[String], right: &[String]) -> (f64, bool) {
    let mut best = 0.0_f64;
    let mut substring = false;
    for a in left {
        for b in right {
            substring |= contains_as_words(a, b) || contains_as_words(b, a);
            let (la, lb) = (a.chars().count(), b.chars().count());
            let ceiling = 2.0 * la.min(lb) as f64 / (la + lb).max(1) as f64;
            if ceiling <= best {
                continue;
            }
            best = best.max(similarity(a, b));
        }
    }
    (best, substring)
}

fn referent(graph: &DocumentGraph, entity: &Entity) -> Referent {
    Referent {
        document_id: graph.document_id.clone(),
        document_title: graph.title.clone(),
        name: entity.name.clone(),
        entity_type: entity.entity_type.clone(),
        aliases: entity.aliases.iter().cloned().collect(),
        context: entity
            .context_windows
            .iter()
            .take(MAX_REFERENT_CONTEXT)
            .cloned()
            .collect(),
    }
}

fn temporal_context(graphs: &[DocumentGraph], docs: impl Iterator<Item = usize>) -> TemporalContext {
    let docs: BTreeSet<usize> = docs.collect();
    let stamps: Vec<DateTime<Utc>> = docs.iter().filter_map(|&d| graphs[d].timestamp()).collect();
    TemporalContext {
        first_seen: stamps.iter().min().copied(),
        last_seen: stamps.iter().max().copied(),
        document_count: docs.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidatorConfig;
    use crate::document::DocumentMetadata;
    use crate::entity::ExtractionSource;
    use crate::validator::{ValidationResponse, Validator, ValidatorResult};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn entity(name: &str, entity_type: EntityType) -> Entity {
        Entity::new(name, entity_type)
            .with_confidence(0.8)
            .with_source(ExtractionSource::RuleBasedNer)
            .with_mention_count(2)
            .with_context(format!("... {name} ..."))
    }

    fn graph(id: &str, day: u32, entities: Vec<Entity>, relations: &[(&str, &str, &str)]) -> DocumentGraph {
        let metadata = DocumentMetadata::new(id, format!("Episode {id}"))
            .with_published_at(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap());
        let mut graph = DocumentGraph::empty(&metadata);
        for e in entities {
            graph.entities.insert(e.canonical_id.clone(), e);
        }
        for (s, p, o) in relations {
            let find = |name: &str| graph.find(name).unwrap().canonical_id.clone();
            let r = Relationship::new(find(s), *p, find(o), ExtractionSource::RelationModel)
                .unwrap()
                .with_confidence(0.7);
            graph.relationships.push(r);
        }
        graph
    }

    fn resolver(executor: Option<BatchExecutor>) -> CrossDocumentResolver {
        CrossDocumentResolver::new(ResolverConfig::default(), executor)
    }

    struct Verdicts {
        confirm: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Validator for Verdicts {
        async fn validate(&self, items: &[ValidationItem]) -> ValidatorResult<Vec<ValidationResponse>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(items
                .iter()
                .map(|i| {
                    assert!(matches!(i.payload, ItemPayload::SameReferent { .. }));
                    if self.confirm {
                        ValidationResponse::confirmed(&i.id)
                    } else {
                        ValidationResponse::rejected(&i.id, "different people")
                    }
                })
                .collect())
        }
    }

    fn executor(confirm: bool) -> (Arc<Verdicts>, BatchExecutor) {
        let validator = Arc::new(Verdicts {
            confirm,
            calls: AtomicUsize::new(0),
        });
        let executor = BatchExecutor::new(validator.clone(), &ValidatorConfig::default());
        (validator, executor)
    }

    #[tokio::test]
    async fn test_provenance_across_three_documents() {
        let graphs: Vec<DocumentGraph> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, id)| graph(id, i as u32 + 1, vec![entity("NSO Group", EntityType::Org)], &[]))
            .collect();
        let unified = resolver(None).resolve(&graphs).await;

        assert_eq!(unified.entities.len(), 1);
        let nso = unified.entities.values().next().unwrap();
        assert_eq!(nso.member_ids.len(), 3);
        for g in &graphs {
            let id = &g.find("NSO Group").unwrap().canonical_id;
            assert!(nso.member_ids.contains(&MemberRef {
                document_id: g.document_id.clone(),
                canonical_id: id.clone(),
            }));
        }
        assert_eq!(nso.entity.mention_count, 6);
        assert_eq!(nso.temporal_context.document_count, 3);
        assert_eq!(
            nso.temporal_context.first_seen,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            nso.temporal_context.last_seen,
            Some(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap())
        );
        assert_eq!(unified.stats.merges, 2);
    }

    #[tokio::test]
    async fn test_types_and_documents_never_cross() {
        let graphs = vec![
            graph("a", 1, vec![entity("Jordan", EntityType::Person), entity("Jordan", EntityType::Gpe)], &[]),
            graph("b", 2, vec![entity("Jordan", EntityType::Gpe)], &[]),
        ];
        let unified = resolver(None).resolve(&graphs).await;
        assert_eq!(unified.entities.len(), 2);
        let gpe = unified.find("Jordan", &EntityType::Gpe);
        assert_eq!(gpe.len(), 1);
        assert_eq!(gpe[0].member_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_cannot_link_within_document() {
        // "Sacks" and "Sachs" in doc a stayed apart; doc b's "Sachs" may join
        // only one of them.
        let graphs = vec![
            graph("a", 1, vec![entity("Dan Sacks", EntityType::Person), entity("Dan Sachs", EntityType::Person)], &[]),
            graph("b", 2, vec![entity("Dan Sachs", EntityType::Person)], &[]),
        ];
        let unified = resolver(None).resolve(&graphs).await;
        assert_eq!(unified.entities.len(), 2);
        assert!(unified.stats.cannot_link_skips >= 1);
        assert!(unified
            .entities
            .values()
            .all(|e| e.member_ids.iter().map(|m| &m.document_id).collect::<BTreeSet<_>>().len()
                == e.member_ids.len()));
    }

    #[tokio::test]
    async fn test_borderline_confirmed_merges() {
        let graphs = vec![
            graph("a", 1, vec![entity("John Smith", EntityType::Person)], &[]),
            graph("b", 2, vec![entity("Smith", EntityType::Person)], &[]),
        ];
        let (validator, executor) = executor(true);
        let unified = resolver(Some(executor)).resolve(&graphs).await;
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(unified.entities.len(), 1);
        assert_eq!(unified.stats.escalations, 1);
        assert_eq!(unified.stats.escalations_confirmed, 1);
        let smith = unified.entities.values().next().unwrap();
        assert_eq!(smith.entity.name, "John Smith");
        assert!(smith.entity.aliases.contains("Smith"));
    }

    #[tokio::test]
    async fn test_borderline_rejected_or_unverified_stays_apart() {
        let graphs = vec![
            graph("a", 1, vec![entity("John Smith", EntityType::Person)], &[]),
            graph("b", 2, vec![entity("Smith", EntityType::Person)], &[]),
        ];
        let (_, executor) = executor(false);
        let rejected = resolver(Some(executor)).resolve(&graphs).await;
        assert_eq!(rejected.entities.len(), 2);
        assert_eq!(rejected.stats.escalations_rejected, 1);

        let unverified = resolver(None).resolve(&graphs).await;
        assert_eq!(unverified.entities.len(), 2);
        assert_eq!(unverified.stats.escalations_failed, 1);
    }

    #[tokio::test]
    async fn test_relationships_remapped_and_collapsed() {
        let graphs = vec![
            graph(
                "a",
                1,
                vec![entity("Elon Musk", EntityType::Person), entity("SpaceX", EntityType::Org)],
                &[("Elon Musk", "founded", "SpaceX")],
            ),
            graph(
                "b",
                2,
                vec![
                    entity("Elon Musk", EntityType::Person),
                    entity("SpaceX", EntityType::Org),
                    entity("Tesla", EntityType::Org),
                ],
                &[("Elon Musk", "founded", "SpaceX"), ("Elon Musk", "runs", "Tesla")],
            ),
        ];
        let unified = resolver(None).resolve(&graphs).await;
        assert!(unified.is_closed());
        assert_eq!(unified.entities.len(), 3);
        assert_eq!(unified.relationships.len(), 2);
        let founded = unified
            .relationships
            .iter()
            .find(|r| r.relationship.predicate == "founded")
            .unwrap();
        assert_eq!(founded.document_ids, vec!["a".to_string(), "b".to_string()]);
        let musk = unified.find("Elon Musk", &EntityType::Person)[0];
        assert_eq!(founded.relationship.subject_id, musk.unified_id);
        assert_eq!(unified.graph_stats.node_count, 3);
        assert_eq!(unified.graph_stats.edge_count, 2);
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let unified = resolver(None).resolve(&[]).await;
        assert!(unified.entities.is_empty());
        assert_eq!(unified.stats.documents, 0);
    }
}
