use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{
    BatchExecutor, EscalationReason, ItemPayload, ValidationItem, ValidationResponse, Verdict,
};
use crate::config::ValidatorConfig;
use crate::entity::{clamp_confidence, Entity, ExtractionSource, CONTESTED_TYPES_PROPERTY};
use crate::extract::RelationCandidate;
use crate::relationship::is_generic_predicate;

const MAX_ITEM_CONTEXT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum RoutingDecision {
    Skip,
    Escalate(EscalationReason),
}

impl RoutingDecision {
    #[must_use]
    pub fn is_escalated(&self) -> bool {
        matches!(self, Self::Escalate(_))
    }
}

/// Lifecycle of an entity or relationship through routing.
///
/// `extracted → filtered → escalated → {confirmed | corrected | rejected}`, or
/// `filtered → accepted_without_validation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Extracted,
    Filtered,
    Escalated,
    Confirmed,
    Corrected,
    Rejected,
    AcceptedWithoutValidation,
}

impl ItemState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracted => "extracted",
            Self::Filtered => "filtered",
            Self::Escalated => "escalated",
            Self::Confirmed => "confirmed",
            Self::Corrected => "corrected",
            Self::Rejected => "rejected",
            Self::AcceptedWithoutValidation => "accepted_without_validation",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Corrected | Self::Rejected | Self::AcceptedWithoutValidation
        )
    }

    /// Terminal states that end up in the graph.
    #[must_use]
    pub fn is_kept(&self) -> bool {
        self.is_terminal() && *self != Self::Rejected
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub id: String,
    /// Entity name, or `subject predicate object` for relationships.
    pub item: String,
    pub decision: RoutingDecision,
    pub state: ItemState,
    /// Escalated, but no verdict arrived.
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingReport {
    pub outcomes: Vec<ItemOutcome>,
    pub escalated: usize,
    pub confirmed: usize,
    pub corrected: usize,
    pub rejected: usize,
    pub fallback: usize,
    pub skipped: usize,
    pub validator_calls: usize,
}

impl RoutingReport {
    fn record(&mut self, outcome: ItemOutcome) {
        if outcome.decision.is_escalated() {
            self.escalated += 1;
        } else {
            self.skipped += 1;
        }
        match outcome.state {
            ItemState::Confirmed => self.confirmed += 1,
            ItemState::Corrected => self.corrected += 1,
            ItemState::Rejected => self.rejected += 1,
            _ if outcome.fallback => self.fallback += 1,
            _ => {}
        }
        self.outcomes.push(outcome);
    }

    #[must_use]
    pub fn state_of(&self, id: &str) -> Option<ItemState> {
        self.outcomes.iter().find(|o| o.id == id).map(|o| o.state)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutedSet {
    pub entities: Vec<Entity>,
    pub relationships: Vec<RelationCandidate>,
    pub report: RoutingReport,
}

/// Decides which filtered items need the validator and applies its verdicts.
pub struct ValidatorRouter {
    threshold: f64,
    executor: Option<BatchExecutor>,
}

impl ValidatorRouter {
    #[must_use]
    pub fn new(config: &ValidatorConfig, executor: Option<BatchExecutor>) -> Self {
        Self {
            threshold: config.confidence_threshold,
            executor,
        }
    }

    #[must_use]
    pub fn has_validator(&self) -> bool {
        self.executor.is_some()
    }

    #[must_use]
    pub fn decide_entity(&self, entity: &Entity) -> RoutingDecision {
        if entity.confidence < self.threshold {
            RoutingDecision::Escalate(EscalationReason::LowConfidence)
        } else if entity.is_contested() {
            RoutingDecision::Escalate(EscalationReason::ContestedType)
        } else {
            RoutingDecision::Skip
        }
    }

    #[must_use]
    pub fn decide_relationship(&self, relation: &RelationCandidate) -> RoutingDecision {
        if relation.confidence < self.threshold {
            RoutingDecision::Escalate(EscalationReason::LowConfidence)
        } else if is_generic_predicate(&relation.predicate) {
            RoutingDecision::Escalate(EscalationReason::GenericPredicate)
        } else {
            RoutingDecision::Skip
        }
    }

    pub async fn route(
        &self,
        entities: Vec<Entity>,
        relationships: Vec<RelationCandidate>,
        document_title: &str,
    ) -> RoutedSet {
        let entity_decisions: Vec<RoutingDecision> =
            entities.iter().map(|e| self.decide_entity(e)).collect();
        let relation_decisions: Vec<RoutingDecision> = relationships
            .iter()
            .map(|r| self.decide_relationship(r))
            .collect();

        let mut items = Vec::new();
        for (idx, (entity, decision)) in entities.iter().zip(&entity_decisions).enumerate() {
            if let RoutingDecision::Escalate(reason) = decision {
                items.push(entity_item(idx, entity, *reason, document_title));
            }
        }
        for (idx, (relation, decision)) in relationships.iter().zip(&relation_decisions).enumerate() {
            if let RoutingDecision::Escalate(reason) = decision {
                items.push(relation_item(idx, relation, *reason, document_title));
            }
        }

        let (mut responses, calls) = match (&self.executor, items.is_empty()) {
            (Some(executor), false) => {
                let result = executor.run(items).await;
                (result.responses, result.calls)
            }
            (None, false) => {
                tracing::debug!(
                    rule = "no_validator",
                    items = items.len(),
                    "Escalated items accepted without validation"
                );
                (HashMap::new(), 0)
            }
            _ => (HashMap::new(), 0),
        };

        let mut routed = RoutedSet {
            report: RoutingReport {
                validator_calls: calls,
                ..RoutingReport::default()
            },
            ..RoutedSet::default()
        };

        for (idx, (entity, decision)) in entities.into_iter().zip(entity_decisions).enumerate() {
            let id = format!("e{idx}");
            let label = entity.name.clone();
            let (kept, state, fallback) = apply_entity(entity, decision, responses.remove(&id));
            if let Some(entity) = kept {
                routed.entities.push(entity);
            } else {
                tracing::info!(rule = "validator_rejected", item = %label, "Dropping entity");
            }
            routed.report.record(ItemOutcome {
                id,
                item: label,
                decision,
                state,
                fallback,
            });
        }

        for (idx, (relation, decision)) in relationships.into_iter().zip(relation_decisions).enumerate() {
            let id = format!("r{idx}");
            let label = format!("{} {} {}", relation.subject, relation.predicate, relation.object);
            let (kept, state, fallback) = apply_relation(relation, decision, responses.remove(&id));
            if let Some(relation) = kept {
                routed.relationships.push(relation);
            } else {
                tracing::info!(rule = "validator_rejected", item = %label, "Dropping relationship");
            }
            routed.report.record(ItemOutcome {
                id,
                item: label,
                decision,
                state,
                fallback,
            });
        }

        routed
    }
}

fn entity_item(idx: usize, entity: &Entity, reason: EscalationReason, title: &str) -> ValidationItem {
    let contested_types = entity
        .properties
        .get(CONTESTED_TYPES_PROPERTY)
        .map(|v| v.split(',').map(str::to_string).collect())
        .unwrap_or_default();
    ValidationItem::new(
        format!("e{idx}"),
        reason,
        ItemPayload::Entity {
            name: entity.name.clone(),
            entity_type: entity.entity_type.clone(),
            confidence: entity.confidence,
            contested_types,
        },
    )
    .with_context(entity.context_windows.iter().take(MAX_ITEM_CONTEXT).cloned().collect())
    .with_document_title(title)
}

fn relation_item(
    idx: usize,
    relation: &RelationCandidate,
    reason: EscalationReason,
    title: &str,
) -> ValidationItem {
    ValidationItem::new(
        format!("r{idx}"),
        reason,
        ItemPayload::Relationship {
            subject: relation.subject.clone(),
            predicate: relation.predicate.clone(),
            object: relation.object.clone(),
            confidence: relation.confidence,
            evidence: relation.evidence.clone(),
        },
    )
    .with_context(relation.evidence.iter().cloned().collect())
    .with_document_title(title)
}

fn unanswered(decision: RoutingDecision) -> (ItemState, bool) {
    (ItemState::AcceptedWithoutValidation, decision.is_escalated())
}

fn apply_entity(
    entity: Entity,
    decision: RoutingDecision,
    response: Option<ValidationResponse>,
) -> (Option<Entity>, ItemState, bool) {
    let Some(response) = response else {
        let (state, fallback) = unanswered(decision);
        return (Some(entity), state, fallback);
    };

    match response.verdict {
        Verdict::Confirmed { confidence } => {
            let mut entity = entity.with_source(ExtractionSource::Validator);
            if let Some(confidence) = confidence {
                entity.confidence = clamp_confidence(confidence);
            }
            (Some(entity), ItemState::Confirmed, false)
        }
        Verdict::Corrected {
            correction,
            confidence,
        } => {
            let mut fixed = entity
                .corrected(correction.name.as_deref(), correction.entity_type.as_ref())
                .with_source(ExtractionSource::Validator);
            if correction.entity_type.is_some() {
                fixed.properties.remove(CONTESTED_TYPES_PROPERTY);
            }
            if let Some(confidence) = confidence {
                fixed.confidence = clamp_confidence(confidence);
            }
            tracing::debug!(
                rule = "validator_corrected",
                item = %entity.name,
                corrected = %fixed.name,
                entity_type = %fixed.entity_type,
                "Entity corrected"
            );
            (Some(fixed), ItemState::Corrected, false)
        }
        Verdict::Rejected { .. } => (None, ItemState::Rejected, false),
    }
}

fn apply_relation(
    relation: RelationCandidate,
    decision: RoutingDecision,
    response: Option<ValidationResponse>,
) -> (Option<RelationCandidate>, ItemState, bool) {
    let Some(response) = response else {
        let (state, fallback) = unanswered(decision);
        return (Some(relation), state, fallback);
    };

    match response.verdict {
        Verdict::Confirmed { confidence } => {
            let mut relation = relation;
            if let Some(confidence) = confidence {
                relation.confidence = clamp_confidence(confidence);
            }
            (Some(relation), ItemState::Confirmed, false)
        }
        Verdict::Corrected {
            correction,
            confidence,
        } => {
            let mut relation = relation;
            if let Some(predicate) = correction.predicate.filter(|p| !p.trim().is_empty()) {
                relation.predicate = predicate.trim().to_string();
            }
            if let Some(confidence) = confidence {
                relation.confidence = clamp_confidence(confidence);
            }
            (Some(relation), ItemState::Corrected, false)
        }
        Verdict::Rejected { .. } => (None, ItemState::Rejected, false),
    }
}
