//! Quality filter between the local extractors and deduplication.
//!
//! Drops noise, repairs missing source attribution, reconciles conflicting
//! types and recomputes every confidence from extractor signal, label
//! reliability and mention frequency. Duplicate mentions survive; merging is
//! the deduplicator's job.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::dedup::UnionFind;
use crate::document::SegmentIndex;
use crate::entity::{
    clamp_confidence, context_window, count_mentions, Entity, EntityType, ExtractionSource,
    CONTESTED_TYPES_PROPERTY, FIRST_SEEN_PROPERTY,
};
use crate::extract::{EntityCandidate, RelationCandidate, SourcedOutput};
use crate::fusion::{fuse, Observation};
use crate::normalize::{normalize_for, normalize_plain};
use crate::relationship::is_generic_predicate;

/// Saturation point of the frequency signal, in mentions.
const FREQUENCY_SATURATION: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    Latin,
    Cyrillic,
    Greek,
    Arabic,
    Hebrew,
    Cjk,
    Devanagari,
}

impl Script {
    /// Script normally used to write `language` (ISO 639-1).
    #[must_use]
    pub fn for_language(language: &str) -> Option<Self> {
        let code = language.split(['-', '_']).next().unwrap_or(language);
        match code.to_lowercase().as_str() {
            "en" | "de" | "fr" | "es" | "it" | "pt" | "nl" | "sv" | "no" | "nb" | "da" | "fi"
            | "pl" | "cs" | "sk" | "hu" | "ro" | "hr" | "sl" | "tr" | "id" | "ms" | "vi"
            | "ca" | "et" | "lv" | "lt" | "sq" | "sw" | "tl" => Some(Self::Latin),
            "ru" | "uk" | "be" | "bg" | "mk" | "sr" | "kk" => Some(Self::Cyrillic),
            "el" => Some(Self::Greek),
            "ar" | "fa" | "ur" | "ps" => Some(Self::Arabic),
            "he" | "yi" => Some(Self::Hebrew),
            "zh" | "ja" | "ko" => Some(Self::Cjk),
            "hi" | "mr" | "ne" | "sa" => Some(Self::Devanagari),
            _ => None,
        }
    }

    fn of_char(c: char) -> Option<Self> {
        match c as u32 {
            0x0041..=0x024F | 0x1E00..=0x1EFF => Some(Self::Latin),
            0x0370..=0x03FF | 0x1F00..=0x1FFF => Some(Self::Greek),
            0x0400..=0x052F => Some(Self::Cyrillic),
            0x0590..=0x05FF => Some(Self::Hebrew),
            0x0600..=0x06FF | 0x0750..=0x077F => Some(Self::Arabic),
            0x0900..=0x097F => Some(Self::Devanagari),
            0x3040..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF => {
                Some(Self::Cjk)
            }
            _ => None,
        }
    }

    /// Dominant script among the letters of `text`.
    #[must_use]
    pub fn detect(text: &str) -> Option<Self> {
        let mut counts: HashMap<Self, usize> = HashMap::new();
        for script in text
            .chars()
            .filter(|c| c.is_alphabetic())
            .filter_map(Self::of_char)
        {
            *counts.entry(script).or_default() += 1;
        }
        counts
            .into_iter()
            .max_by_key(|(script, count)| (*count, std::cmp::Reverse(*script as u8)))
            .map(|(script, _)| script)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    pub entities_in: usize,
    pub entities_out: usize,
    pub relationships_in: usize,
    pub relationships_out: usize,
    pub contested: usize,
    pub repaired_sources: usize,
    /// Drop counts keyed by the rule that fired.
    pub dropped: BTreeMap<String, usize>,
}

impl FilterReport {
    fn record_drop(&mut self, rule: &str) {
        *self.dropped.entry(rule.to_string()).or_default() += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilteredCandidates {
    /// One entity per surviving mention.
    pub entities: Vec<Entity>,
    pub relationships: Vec<RelationCandidate>,
    pub report: FilterReport,
}

pub struct QualityFilter {
    config: FilterConfig,
}

impl QualityFilter {
    #[must_use]
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// Filters the raw outputs of every extractor for one document. `language`
    /// overrides the configured expected language.
    #[must_use]
    pub fn apply(
        &self,
        text: &str,
        index: &SegmentIndex,
        language: Option<&str>,
        outputs: Vec<SourcedOutput>,
    ) -> FilteredCandidates {
        let mut report = FilterReport::default();
        let mut entities: Vec<(ExtractionSource, EntityCandidate)> = Vec::new();
        let mut relationships = Vec::new();

        for SourcedOutput { source, output } in outputs {
            report.entities_in += output.entities.len();
            report.relationships_in += output.relationships.len();

            for mut candidate in output.entities {
                let source = *candidate.source.get_or_insert_with(|| {
                    report.repaired_sources += 1;
                    source
                });
                if let Some(rule) = self.noise_rule(&candidate.name) {
                    tracing::debug!(rule, item = %candidate.name, "Dropping entity candidate");
                    report.record_drop(rule);
                    continue;
                }
                entities.push((source, candidate));
            }

            for mut relation in output.relationships {
                if relation.source.is_none() {
                    relation.source = Some(source);
                    report.repaired_sources += 1;
                }
                match self.filter_relation(relation) {
                    Ok(relation) => relationships.push(relation),
                    Err(rule) => report.record_drop(rule),
                }
            }
        }

        let contested = reconcile_types(&mut entities);
        report.contested = contested;

        let frequencies = mention_frequencies(&entities);
        let expected = Script::for_language(
            language.unwrap_or(self.config.expected_language.as_str()),
        );

        let mut out = Vec::with_capacity(entities.len());
        for (source, candidate) in entities {
            let key = (
                normalize_for(&candidate.name, &candidate.entity_type),
                candidate.entity_type.clone(),
            );
            let frequency = frequencies.get(&key).copied().unwrap_or(1);
            let mut confidence = self.entity_confidence(&candidate, frequency);

            if let (Some(expected), Some(found)) = (expected, Script::detect(&candidate.name)) {
                if expected != found {
                    confidence *= self.config.language_penalty;
                    if confidence < self.config.min_language_confidence {
                        tracing::debug!(
                            rule = "language",
                            item = %candidate.name,
                            confidence,
                            "Dropping entity candidate"
                        );
                        report.record_drop("language");
                        continue;
                    }
                }
            }

            out.push(build_entity(text, index, source, candidate, confidence));
        }

        report.entities_out = out.len();
        report.relationships_out = relationships.len();

        FilteredCandidates {
            entities: out,
            relationships,
            report,
        }
    }

    /// Rule that marks `name` as noise, if any.
    fn noise_rule(&self, name: &str) -> Option<&'static str> {
        let name = name.trim();
        if name.is_empty() {
            return Some("empty");
        }
        if name.contains('[') || name.contains(']') {
            return Some("transcription_tag");
        }
        if !name.chars().any(char::is_alphabetic) {
            return Some("no_letters");
        }
        if has_repeated_run(name, 4) {
            return Some("repeated_chars");
        }

        let lowered = name.to_lowercase();
        let boilerplate = self.config.boilerplate.iter().any(|phrase| {
            strsim::normalized_levenshtein(&lowered, &phrase.to_lowercase())
                >= self.config.boilerplate_similarity
        });
        if boilerplate {
            return Some("boilerplate");
        }
        None
    }

    fn filter_relation(
        &self,
        mut relation: RelationCandidate,
    ) -> Result<RelationCandidate, &'static str> {
        relation.subject = relation.subject.trim().to_string();
        relation.object = relation.object.trim().to_string();
        relation.predicate = relation.predicate.trim().to_string();

        let rule = if relation.subject.is_empty() || relation.object.is_empty() {
            Some("empty_endpoint")
        } else if relation.predicate.is_empty() {
            Some("empty_predicate")
        } else if normalize_plain(&relation.subject) == normalize_plain(&relation.object) {
            Some("self_reference")
        } else {
            self.noise_rule(&relation.subject)
                .or_else(|| self.noise_rule(&relation.object))
        };

        if let Some(rule) = rule {
            tracing::debug!(
                rule,
                subject = %relation.subject,
                predicate = %relation.predicate,
                object = %relation.object,
                "Dropping relation candidate"
            );
            return Err(rule);
        }

        let evidence = if relation.evidence.as_deref().is_some_and(|e| !e.trim().is_empty()) {
            1.0
        } else {
            0.0
        };
        let specificity = if is_generic_predicate(&relation.predicate) {
            0.3
        } else {
            1.0
        };
        relation.confidence = clamp_confidence(
            0.7 * clamp_confidence(relation.confidence) + 0.15 * evidence + 0.15 * specificity,
        );
        Ok(relation)
    }

    fn entity_confidence(&self, candidate: &EntityCandidate, frequency: usize) -> f64 {
        let frequency_signal =
            ((1.0 + frequency as f64).ln() / (1.0 + FREQUENCY_SATURATION).ln()).min(1.0);
        clamp_confidence(
            self.config.extractor_weight * clamp_confidence(candidate.confidence)
                + self.config.label_weight * candidate.entity_type.label_reliability()
                + self.config.frequency_weight * frequency_signal,
        )
    }
}

fn has_repeated_run(name: &str, min_run: usize) -> bool {
    let mut run = 0;
    let mut previous = None;
    for c in name.chars().flat_map(char::to_lowercase) {
        if Some(c) == previous && c.is_alphanumeric() {
            run += 1;
            if run >= min_run {
                return true;
            }
        } else {
            run = 1;
            previous = Some(c);
        }
    }
    false
}

/// Settles one type per mention. Candidates sharing a surface name are fused
/// when their spans overlap; a span-less candidate fuses with every mention of
/// its name. Groups with disagreeing types take the fused type and are marked
/// contested. Every candidate's raw confidence becomes its group's fused
/// confidence. Returns the number of contested groups.
fn reconcile_types(entities: &mut [(ExtractionSource, EntityCandidate)]) -> usize {
    let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, (_, candidate)) in entities.iter().enumerate() {
        by_name
            .entry(normalize_plain(&candidate.name))
            .or_default()
            .push(idx);
    }

    let mut contested = 0;
    for (key, same_name) in by_name {
        for members in mention_groups(entities, &same_name) {
            let observations: Vec<Observation<EntityType>> = members
                .iter()
                .map(|&i| {
                    let (source, candidate) = &entities[i];
                    Observation::new(candidate.entity_type.clone(), candidate.confidence, *source)
                })
                .collect();
            let Some(fused) = fuse(&observations) else {
                continue;
            };

            let labels = fused.is_contested().then(|| {
                let mut labels: Vec<&str> =
                    fused.alternatives.iter().map(EntityType::as_str).collect();
                labels.sort_unstable();
                labels.join(",")
            });
            if let Some(labels) = &labels {
                contested += 1;
                tracing::debug!(
                    rule = "contested_type",
                    item = %key,
                    types = %labels,
                    chosen = %fused.value,
                    "Reconciled entity type"
                );
            }

            for &i in &members {
                let candidate = &mut entities[i].1;
                candidate.entity_type = fused.value.clone();
                candidate.confidence = fused.confidence;
                if let Some(labels) = &labels {
                    candidate
                        .properties
                        .insert(CONTESTED_TYPES_PROPERTY.to_string(), labels.clone());
                }
            }
        }
    }
    contested
}

/// Splits candidates of one surface name into groups of linked mentions.
fn mention_groups(
    entities: &[(ExtractionSource, EntityCandidate)],
    same_name: &[usize],
) -> Vec<Vec<usize>> {
    let mut uf = UnionFind::new(same_name.len());
    for (a, &first) in same_name.iter().enumerate() {
        for (b, &second) in same_name.iter().enumerate().skip(a + 1) {
            let linked = match (&entities[first].1.span, &entities[second].1.span) {
                (Some(x), Some(y)) => x.overlaps(y),
                _ => true,
            };
            if linked {
                uf.union(a, b);
            }
        }
    }
    uf.groups()
        .into_iter()
        .map(|group| group.into_iter().map(|local| same_name[local]).collect::<Vec<_>>())
        .collect()
}

/// Distinct mentions per (normalized name, type). Overlapping spans from
/// different extractors count once; span-less candidates count one each.
fn mention_frequencies(
    entities: &[(ExtractionSource, EntityCandidate)],
) -> HashMap<(String, EntityType), usize> {
    let mut spans: HashMap<(String, EntityType), (Vec<_>, usize)> = HashMap::new();
    for (_, candidate) in entities {
        let key = (
            normalize_for(&candidate.name, &candidate.entity_type),
            candidate.entity_type.clone(),
        );
        let entry = spans.entry(key).or_default();
        match candidate.span {
            Some(span) => entry.0.push(span),
            None => entry.1 += 1,
        }
    }
    spans
        .into_iter()
        .map(|(key, (spans, unspanned))| (key, count_mentions(&spans) + unspanned))
        .collect()
}

fn build_entity(
    text: &str,
    index: &SegmentIndex,
    source: ExtractionSource,
    candidate: EntityCandidate,
    confidence: f64,
) -> Entity {
    let mut entity = Entity::new(candidate.name, candidate.entity_type)
        .with_confidence(confidence)
        .with_source(source);
    entity.properties = candidate.properties;

    if let Some(span) = candidate.span {
        entity = entity
            .with_span(span)
            .with_context(context_window(text, span));
        if index.is_timed() {
            if let Some(seconds) = index.seconds_at(span.start) {
                entity = entity.with_property(FIRST_SEEN_PROPERTY, format!("{seconds:.1}"));
            }
        }
    }
    entity
}
