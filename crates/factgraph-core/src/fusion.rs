//! Confidence fusion across heterogeneous extractors.
//!
//! [`fuse`] is pure: it takes every (value, confidence, source) observation
//! made about one item and returns the winning value with a combined
//! confidence. Within a source only the strongest observation counts; across
//! sources confidences combine as a noisy-or, so agreement between independent
//! extractors raises confidence while repeated hits from one extractor do not.

use std::collections::{BTreeMap, BTreeSet};

use crate::entity::{clamp_confidence, ExtractionSource};

#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T> {
    pub value: T,
    pub confidence: f64,
    pub source: ExtractionSource,
}

impl<T> Observation<T> {
    pub fn new(value: T, confidence: f64, source: ExtractionSource) -> Self {
        Self {
            value,
            confidence,
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fused<T> {
    pub value: T,
    pub confidence: f64,
    pub supporting_sources: BTreeSet<ExtractionSource>,
    /// Every distinct value observed, in first-seen order.
    pub alternatives: Vec<T>,
}

impl<T> Fused<T> {
    /// More than one distinct value was proposed.
    pub fn is_contested(&self) -> bool {
        self.alternatives.len() > 1
    }
}

/// Resolves a set of observations to one value. Ties on combined confidence
/// go to the value with more supporting sources, then to the first seen.
pub fn fuse<T: Clone + PartialEq>(observations: &[Observation<T>]) -> Option<Fused<T>> {
    let mut groups: Vec<(T, BTreeMap<ExtractionSource, f64>)> = Vec::new();

    for obs in observations {
        let confidence = clamp_confidence(obs.confidence);
        let idx = match groups.iter().position(|(value, _)| *value == obs.value) {
            Some(idx) => idx,
            None => {
                groups.push((obs.value.clone(), BTreeMap::new()));
                groups.len() - 1
            }
        };
        let best = groups[idx].1.entry(obs.source).or_insert(0.0);
        *best = best.max(confidence);
    }

    let alternatives: Vec<T> = groups.iter().map(|(value, _)| value.clone()).collect();

    let mut winner: Option<(usize, f64, usize)> = None;
    for (idx, (_, per_source)) in groups.iter().enumerate() {
        let combined = noisy_or(per_source.values().copied());
        let support = per_source.len();
        let better = match winner {
            None => true,
            Some((_, best, best_support)) => {
                combined > best + f64::EPSILON
                    || ((combined - best).abs() <= f64::EPSILON && support > best_support)
            }
        };
        if better {
            winner = Some((idx, combined, support));
        }
    }

    let (idx, confidence, _) = winner?;
    let (value, per_source) = &groups[idx];
    Some(Fused {
        value: value.clone(),
        confidence,
        supporting_sources: per_source.keys().copied().collect(),
        alternatives,
    })
}

fn noisy_or(confidences: impl Iterator<Item = f64>) -> f64 {
    let miss: f64 = confidences.map(|c| 1.0 - c).product();
    clamp_confidence(1.0 - miss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    #[test]
    fn test_fuse_empty() {
        let none: Option<Fused<EntityType>> = fuse(&[]);
        assert!(none.is_none());
    }

    #[test]
    fn test_single_observation_passes_through() {
        let fused = fuse(&[Observation::new(
            EntityType::Person,
            0.7,
            ExtractionSource::RuleBasedNer,
        )])
        .unwrap();
        assert_eq!(fused.value, EntityType::Person);
        assert!((fused.confidence - 0.7).abs() < 1e-9);
        assert!(!fused.is_contested());
    }

    #[test]
    fn test_agreement_across_sources_raises_confidence() {
        let fused = fuse(&[
            Observation::new(EntityType::Org, 0.6, ExtractionSource::RuleBasedNer),
            Observation::new(EntityType::Org, 0.5, ExtractionSource::CustomEntityModel),
        ])
        .unwrap();
        assert!((fused.confidence - 0.8).abs() < 1e-9);
        assert_eq!(fused.supporting_sources.len(), 2);
    }

    #[test]
    fn test_repeats_within_one_source_do_not_stack() {
        let fused = fuse(&[
            Observation::new(EntityType::Org, 0.6, ExtractionSource::RuleBasedNer),
            Observation::new(EntityType::Org, 0.6, ExtractionSource::RuleBasedNer),
            Observation::new(EntityType::Org, 0.4, ExtractionSource::RuleBasedNer),
        ])
        .unwrap();
        assert!((fused.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_disagreement_picks_stronger_and_is_contested() {
        let fused = fuse(&[
            Observation::new(EntityType::Person, 0.55, ExtractionSource::RuleBasedNer),
            Observation::new(EntityType::Org, 0.9, ExtractionSource::CustomEntityModel),
        ])
        .unwrap();
        assert_eq!(fused.value, EntityType::Org);
        assert!(fused.is_contested());
        assert_eq!(fused.alternatives, vec![EntityType::Person, EntityType::Org]);
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let fused = fuse(&[
            Observation::new("a", 0.5, ExtractionSource::RuleBasedNer),
            Observation::new("b", 0.5, ExtractionSource::CustomEntityModel),
        ])
        .unwrap();
        assert_eq!(fused.value, "a");
    }
}
