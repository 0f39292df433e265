use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::normalize::normalize_for;

/// Property key set by the quality filter when extractors disagreed on a type.
pub const CONTESTED_TYPES_PROPERTY: &str = "contested_types";

/// Property key holding the transcript time (seconds) of the first mention.
pub const FIRST_SEEN_PROPERTY: &str = "first_seen_seconds";

/// Longest context snippet kept per mention, in characters.
pub const CONTEXT_WINDOW_CHARS: usize = 100;

const CANONICAL_NAMESPACE: Uuid = Uuid::from_u128(0x6b1d_3c52_8e0f_4f6a_9d2e_51a7_c0de_f00d);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EntityType {
    Person,
    Org,
    Gpe,
    Product,
    Event,
    WorkOfArt,
    Law,
    /// Open-ended type from the custom-entity vocabulary, stored upper snake case.
    Custom(String),
}

impl EntityType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "PERSON",
            Self::Org => "ORG",
            Self::Gpe => "GPE",
            Self::Product => "PRODUCT",
            Self::Event => "EVENT",
            Self::WorkOfArt => "WORK_OF_ART",
            Self::Law => "LAW",
            Self::Custom(label) => label,
        }
    }

    /// Builds a custom type from a free-form label ("medical condition" →
    /// `MEDICAL_CONDITION`). Known labels map to their built-in variant.
    pub fn custom(label: &str) -> crate::Result<Self> {
        let normalized = label
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
            .filter(|part| !part.is_empty())
            .map(str::to_uppercase)
            .collect::<Vec<_>>()
            .join("_");

        if normalized.is_empty() {
            return Err(crate::Error::InvalidEntityType(label.to_string()));
        }

        Ok(match normalized.as_str() {
            "PERSON" | "PER" => Self::Person,
            "ORG" | "ORGANIZATION" | "ORGANISATION" => Self::Org,
            "GPE" | "LOCATION" | "LOC" => Self::Gpe,
            "PRODUCT" => Self::Product,
            "EVENT" => Self::Event,
            "WORK_OF_ART" => Self::WorkOfArt,
            "LAW" => Self::Law,
            _ => Self::Custom(normalized),
        })
    }

    #[must_use]
    pub fn strips_titles(&self) -> bool {
        matches!(self, Self::Person)
    }

    /// Prior reliability of the label, used when recomputing confidence.
    #[must_use]
    pub fn label_reliability(&self) -> f64 {
        match self {
            Self::Person | Self::Gpe => 0.9,
            Self::Org => 0.85,
            Self::Law => 0.75,
            Self::Product | Self::Event | Self::Custom(_) => 0.7,
            Self::WorkOfArt => 0.6,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::custom(s)
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for EntityType {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    RuleBasedNer,
    CustomEntityModel,
    RelationModel,
    Validator,
}

impl ExtractionSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleBasedNer => "rule_based_ner",
            Self::CustomEntityModel => "custom_entity_model",
            Self::RelationModel => "relation_model",
            Self::Validator => "validator",
        }
    }
}

impl std::fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExtractionSource {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule_based_ner" => Ok(Self::RuleBasedNer),
            "custom_entity_model" => Ok(Self::CustomEntityModel),
            "relation_model" => Ok(Self::RelationModel),
            "validator" => Ok(Self::Validator),
            _ => Err(crate::Error::InvalidSource(s.to_string())),
        }
    }
}

/// Byte range of a mention in the document's full text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn shifted(self, offset: usize) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
        }
    }

    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Deterministic id for a (name, type) pair: a v5 UUID over the type label and
/// the normalized name.
#[must_use]
pub fn canonical_id(name: &str, entity_type: &EntityType) -> String {
    let key = format!("{}:{}", entity_type.as_str(), normalize_for(name, entity_type));
    Uuid::new_v5(&CANONICAL_NAMESPACE, key.as_bytes()).to_string()
}

/// Number of distinct mentions among possibly overlapping spans. Spans that
/// overlap (the same mention seen by two extractors) count once.
#[must_use]
pub fn count_mentions(spans: &[TextSpan]) -> usize {
    let mut sorted = spans.to_vec();
    sorted.sort_unstable();

    let mut count = 0;
    let mut current_end: Option<usize> = None;
    for span in sorted {
        match current_end {
            Some(end) if span.start < end => current_end = Some(end.max(span.end)),
            _ => {
                count += 1;
                current_end = Some(span.end);
            }
        }
    }
    count
}

/// Snippet of at most [`CONTEXT_WINDOW_CHARS`] characters centred on `span`.
#[must_use]
pub fn context_window(text: &str, span: TextSpan) -> String {
    let start = span.start.min(text.len());
    let end = span.end.clamp(start, text.len());
    if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
        return String::new();
    }

    let mention_chars = text[start..end].chars().count();
    if mention_chars >= CONTEXT_WINDOW_CHARS {
        return text[start..end].chars().take(CONTEXT_WINDOW_CHARS).collect();
    }

    let budget = CONTEXT_WINDOW_CHARS - mention_chars;
    let before: Vec<char> = text[..start].chars().rev().take(budget / 2).collect();
    let after_budget = budget - before.len();
    let after: String = text[end..].chars().take(after_budget).collect();

    let mut window: String = before.into_iter().rev().collect();
    window.push_str(&text[start..end]);
    window.push_str(&after);
    window.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub canonical_id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub confidence: f64,
    pub sources: BTreeSet<ExtractionSource>,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    pub mention_count: u32,
    #[serde(default)]
    pub context_windows: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<TextSpan>,
}

impl Entity {
    #[must_use]
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        let name = name.into().trim().to_string();
        Self {
            canonical_id: canonical_id(&name, &entity_type),
            name,
            entity_type,
            confidence: 0.0,
            sources: BTreeSet::new(),
            aliases: BTreeSet::new(),
            mention_count: 1,
            context_windows: Vec::new(),
            properties: BTreeMap::new(),
            spans: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: ExtractionSource) -> Self {
        self.sources.insert(source);
        self
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        if alias != self.name {
            self.aliases.insert(alias);
        }
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: TextSpan) -> Self {
        self.spans.push(span);
        self.mention_count = count_mentions(&self.spans).max(1) as u32;
        self
    }

    #[must_use]
    pub fn with_mention_count(mut self, count: u32) -> Self {
        self.mention_count = count.max(1);
        self
    }

    #[must_use]
    pub fn with_context(mut self, window: impl Into<String>) -> Self {
        let window = window.into();
        if !window.is_empty() {
            self.context_windows.push(window);
        }
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Copy of this entity under a new display name and/or type. The previous
    /// name is kept as an alias and the canonical id is recomputed.
    #[must_use]
    pub fn corrected(&self, name: Option<&str>, entity_type: Option<&EntityType>) -> Self {
        let mut next = self.clone();
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            if name != self.name {
                next.aliases.insert(self.name.clone());
                next.aliases.remove(name);
                next.name = name.to_string();
            }
        }
        if let Some(entity_type) = entity_type {
            next.entity_type = entity_type.clone();
        }
        next.canonical_id = canonical_id(&next.name, &next.entity_type);
        next
    }

    #[must_use]
    pub fn normalized_name(&self) -> String {
        normalize_for(&self.name, &self.entity_type)
    }

    /// Display name followed by every alias.
    pub fn surface_forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    #[must_use]
    pub fn is_contested(&self) -> bool {
        self.properties.contains_key(CONTESTED_TYPES_PROPERTY)
    }

    #[must_use]
    pub fn first_span_start(&self) -> Option<usize> {
        self.spans.iter().map(|s| s.start).min()
    }
}

pub(crate) fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trip_strings() {
        assert_eq!("PERSON".parse::<EntityType>().unwrap(), EntityType::Person);
        assert_eq!("organization".parse::<EntityType>().unwrap(), EntityType::Org);
        assert_eq!(
            "medical condition".parse::<EntityType>().unwrap(),
            EntityType::Custom("MEDICAL_CONDITION".into())
        );
        assert!("  ".parse::<EntityType>().is_err());
        assert_eq!(EntityType::WorkOfArt.to_string(), "WORK_OF_ART");
    }

    #[test]
    fn test_entity_type_serializes_as_label() {
        let json = serde_json::to_string(&EntityType::Custom("SPYWARE".into())).unwrap();
        assert_eq!(json, "\"SPYWARE\"");
        let parsed: EntityType = serde_json::from_str("\"GPE\"").unwrap();
        assert_eq!(parsed, EntityType::Gpe);
    }

    #[test]
    fn test_canonical_id_is_deterministic() {
        let a = canonical_id("Joe Biden", &EntityType::Person);
        let b = canonical_id("  joe   BIDEN ", &EntityType::Person);
        let c = canonical_id("President Joe Biden", &EntityType::Person);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, canonical_id("Joe Biden", &EntityType::Org));
        assert_eq!(a, Entity::new("Joe Biden", EntityType::Person).canonical_id);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let e = Entity::new("X Corp", EntityType::Org).with_confidence(1.7);
        assert!((e.confidence - 1.0).abs() < f64::EPSILON);
        let e = e.with_confidence(-0.2);
        assert!(e.confidence.abs() < f64::EPSILON);
        let e = e.with_confidence(f64::NAN);
        assert!(e.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_count_mentions_collapses_overlaps() {
        let spans = [
            TextSpan::new(0, 9),
            TextSpan::new(5, 9),
            TextSpan::new(20, 24),
            TextSpan::new(40, 44),
        ];
        assert_eq!(count_mentions(&spans), 3);
        assert_eq!(count_mentions(&[]), 0);
    }

    #[test]
    fn test_context_window_is_bounded() {
        let text = "word ".repeat(100) + "Target" + &" tail".repeat(100);
        let start = 500;
        let window = context_window(&text, TextSpan::new(start, start + 6));
        assert!(window.contains("Target"));
        assert!(window.chars().count() <= CONTEXT_WINDOW_CHARS);
    }

    #[test]
    fn test_corrected_keeps_old_name_as_alias() {
        let e = Entity::new("Elon Musk", EntityType::Org);
        let fixed = e.corrected(None, Some(&EntityType::Person));
        assert_eq!(fixed.entity_type, EntityType::Person);
        assert_ne!(fixed.canonical_id, e.canonical_id);

        let renamed = e.corrected(Some("Tesla"), None);
        assert_eq!(renamed.name, "Tesla");
        assert!(renamed.aliases.contains("Elon Musk"));
    }

    #[test]
    fn test_with_span_updates_mention_count() {
        let e = Entity::new("Musk", EntityType::Person)
            .with_span(TextSpan::new(0, 4))
            .with_span(TextSpan::new(10, 14));
        assert_eq!(e.mention_count, 2);
    }
}
