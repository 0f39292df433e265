//! Per-document knowledge graph assembly and statistics.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use petgraph::algo::connected_components;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::config::DedupConfig;
use crate::dedup::merge_entities;
use crate::document::{DocumentMetadata, PrecomputedExtraction};
use crate::entity::{Entity, ExtractionSource};
use crate::extract::RelationCandidate;
use crate::normalize::{normalize_name, normalize_plain};
use crate::relationship::Relationship;

/// Confidence given to trusted upstream items that carry none.
const PRECOMPUTED_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    /// Distinct ordered (subject, object) pairs, self-loops excluded. Parallel
    /// relationships with different predicates count once.
    pub edge_count: usize,
    /// `edge_count` over `n * (n - 1)`.
    pub density: f64,
    /// Components of the undirected projection; isolated nodes count.
    pub connected_components: usize,
}

impl GraphStats {
    pub fn compute<'a>(
        node_ids: impl IntoIterator<Item = &'a str>,
        edges: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();
        for id in node_ids {
            index.entry(id).or_insert_with(|| graph.add_node(id));
        }

        for (from, to) in edges {
            let (Some(&a), Some(&b)) = (index.get(from), index.get(to)) else {
                continue;
            };
            if a != b && graph.find_edge(a, b).is_none() {
                graph.add_edge(a, b, ());
            }
        }

        let n = graph.node_count();
        let edge_count = graph.edge_count();
        let density = if n < 2 {
            0.0
        } else {
            edge_count as f64 / (n * (n - 1)) as f64
        };

        Self {
            node_count: n,
            edge_count,
            density,
            connected_components: connected_components(&graph),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentGraph {
    pub document_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_timestamp: Option<DateTime<Utc>>,
    /// Keyed by canonical id.
    pub entities: BTreeMap<String, Entity>,
    pub relationships: Vec<Relationship>,
    pub stats: GraphStats,
}

impl DocumentGraph {
    #[must_use]
    pub fn empty(metadata: &DocumentMetadata) -> Self {
        Self {
            document_id: metadata.id.clone(),
            title: metadata.title.clone(),
            published_at: metadata.published_at,
            content_timestamp: metadata.content_timestamp,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.content_timestamp.or(self.published_at)
    }

    /// First entity whose name or alias normalizes like `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Entity> {
        let key = normalize_plain(name);
        self.entities
            .values()
            .find(|e| e.surface_forms().any(|f| normalize_plain(f) == key))
    }

    /// Every relationship endpoint is an entity of this graph.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.relationships.iter().all(|r| {
            self.entities.contains_key(&r.subject_id) && self.entities.contains_key(&r.object_id)
        })
    }

    fn refresh_stats(&mut self) {
        self.stats = GraphStats::compute(
            self.entities.keys().map(String::as_str),
            self.relationships
                .iter()
                .map(|r| (r.subject_id.as_str(), r.object_id.as_str())),
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub graph: DocumentGraph,
    pub dropped_dangling: usize,
    pub dropped_self_loops: usize,
    pub collapsed_duplicates: usize,
    pub merged_collisions: usize,
}

/// Resolves relationship endpoints by name and assembles a [`DocumentGraph`].
pub struct GraphBuilder {
    canonical_tolerance: f64,
    max_context_windows: usize,
}

impl GraphBuilder {
    #[must_use]
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            canonical_tolerance: config.canonical_tolerance,
            max_context_windows: config.max_context_windows,
        }
    }

    #[must_use]
    pub fn build(
        &self,
        metadata: &DocumentMetadata,
        entities: Vec<Entity>,
        relationships: Vec<RelationCandidate>,
    ) -> BuildOutcome {
        let mut outcome = BuildOutcome {
            graph: DocumentGraph::empty(metadata),
            ..BuildOutcome::default()
        };

        // Entities that ended up with the same id (usually after a validator
        // rename) collapse into one.
        let mut by_id: BTreeMap<String, Vec<Entity>> = BTreeMap::new();
        for entity in entities {
            by_id.entry(entity.canonical_id.clone()).or_default().push(entity);
        }
        for (id, mut group) in by_id {
            let entity = if group.len() == 1 {
                group.remove(0)
            } else {
                outcome.merged_collisions += group.len() - 1;
                let members: Vec<&Entity> = group.iter().collect();
                let merged =
                    merge_entities(&members, self.canonical_tolerance, self.max_context_windows);
                tracing::debug!(
                    rule = "id_collision",
                    item = %merged.name,
                    document_id = %metadata.id,
                    members = members.len(),
                    "Merged entities sharing an id"
                );
                merged
            };
            let key = if entity.canonical_id == id { id } else { entity.canonical_id.clone() };
            outcome.graph.entities.insert(key, entity);
        }

        let lookup = NameLookup::new(&outcome.graph.entities);
        let mut triples: HashMap<(String, String, String), usize> = HashMap::new();

        for candidate in relationships {
            let subject = lookup.resolve(&candidate.subject);
            let object = lookup.resolve(&candidate.object);
            let (Some(subject_id), Some(object_id)) = (subject, object) else {
                outcome.dropped_dangling += 1;
                let item = format!("{} {} {}", candidate.subject, candidate.predicate, candidate.object);
                tracing::debug!(
                    rule = "dangling_endpoint",
                    item = %item,
                    document_id = %metadata.id,
                    "Dropping relationship"
                );
                continue;
            };

            let source = candidate.source.unwrap_or(ExtractionSource::RelationModel);
            let relationship = match Relationship::new(subject_id, &candidate.predicate, object_id, source) {
                Ok(r) => r
                    .with_confidence(candidate.confidence)
                    .with_evidence(candidate.evidence.clone()),
                Err(_) => {
                    outcome.dropped_self_loops += 1;
                    tracing::debug!(
                        rule = "self_reference",
                        item = %candidate.subject,
                        document_id = %metadata.id,
                        "Dropping relationship"
                    );
                    continue;
                }
            };
            if relationship.predicate.is_empty() {
                tracing::debug!(rule = "empty_predicate", item = %candidate.subject, "Dropping relationship");
                continue;
            }

            if source == ExtractionSource::RelationModel {
                for id in [&relationship.subject_id, &relationship.object_id] {
                    if let Some(entity) = outcome.graph.entities.get_mut(id) {
                        entity.sources.insert(ExtractionSource::RelationModel);
                    }
                }
            }

            let key = relationship.triple_key();
            if let Some(&idx) = triples.get(&key) {
                outcome.collapsed_duplicates += 1;
                let existing = &mut outcome.graph.relationships[idx];
                if relationship.confidence > existing.confidence {
                    existing.confidence = relationship.confidence;
                }
                if existing.evidence.is_none() {
                    existing.evidence = relationship.evidence;
                }
            } else {
                triples.insert(key, outcome.graph.relationships.len());
                outcome.graph.relationships.push(relationship);
            }
        }

        outcome.graph.refresh_stats();
        outcome
    }

    /// Graph straight from trusted upstream extractions.
    #[must_use]
    pub fn build_precomputed(
        &self,
        metadata: &DocumentMetadata,
        precomputed: &PrecomputedExtraction,
    ) -> BuildOutcome {
        let entities = precomputed
            .entities
            .iter()
            .filter(|e| !e.name.trim().is_empty())
            .map(|e| {
                let mut entity = Entity::new(&e.name, e.entity_type.clone())
                    .with_confidence(e.confidence.unwrap_or(PRECOMPUTED_CONFIDENCE))
                    .with_source(ExtractionSource::Validator)
                    .with_mention_count(e.mention_count.unwrap_or(1));
                for alias in &e.aliases {
                    entity = entity.with_alias(alias);
                }
                entity.properties.extend(e.properties.clone());
                entity
            })
            .collect();

        let relationships = precomputed
            .relationships
            .iter()
            .map(|r| {
                let candidate = RelationCandidate::new(
                    &r.subject,
                    &r.predicate,
                    &r.object,
                    r.confidence.unwrap_or(PRECOMPUTED_CONFIDENCE),
                )
                .with_source(ExtractionSource::Validator);
                match &r.evidence {
                    Some(evidence) => candidate.with_evidence(evidence),
                    None => candidate,
                }
            })
            .collect();

        self.build(metadata, entities, relationships)
    }
}

/// Surface-form index over a graph's entities. Exact forms win; the
/// title-stripped form is the fallback. Ties go to the more confident entity.
struct NameLookup {
    plain: HashMap<String, Vec<(f64, String)>>,
    stripped: HashMap<String, Vec<(f64, String)>>,
}

impl NameLookup {
    fn new(entities: &BTreeMap<String, Entity>) -> Self {
        let mut plain: HashMap<String, Vec<(f64, String)>> = HashMap::new();
        let mut stripped: HashMap<String, Vec<(f64, String)>> = HashMap::new();
        for (id, entity) in entities {
            for form in entity.surface_forms() {
                let candidate = (entity.confidence, id.clone());
                plain.entry(normalize_plain(form)).or_default().push(candidate.clone());
                stripped.entry(normalize_name(form)).or_default().push(candidate);
            }
        }
        Self { plain, stripped }
    }

    fn resolve(&self, name: &str) -> Option<String> {
        let pick = |candidates: &Vec<(f64, String)>| {
            candidates
                .iter()
                .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
                .map(|(_, id)| id.clone())
        };
        self.plain
            .get(&normalize_plain(name))
            .and_then(pick)
            .or_else(|| self.stripped.get(&normalize_name(name)).and_then(pick))
    }
}
