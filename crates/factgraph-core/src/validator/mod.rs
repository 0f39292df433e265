//! Selective escalation of ambiguous items to an external validator.
//!
//! Only items that fail a local ambiguity check are sent. The validator is
//! an injected capability, so routing runs the same against the HTTP client
//! and against test fakes.

mod executor;
mod http;
mod retry;
mod router;

pub use executor::{BatchExecutor, BatchResult};
pub use http::HttpValidator;
pub use retry::RetryPolicy;
pub use router::{
    ItemOutcome, ItemState, RoutedSet, RoutingDecision, RoutingReport, ValidatorRouter,
};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;

#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("Validator call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transient validator failure: {0}")]
    Transient(String),

    #[error("Validator refused the request: {0}")]
    Permanent(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No validator configured")]
    Unavailable,
}

impl ValidatorError {
    /// Worth retrying: timeouts, 429/5xx and connection failures.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transient(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Permanent(_) | Self::Unavailable => false,
        }
    }
}

pub type ValidatorResult<T> = Result<T, ValidatorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    LowConfidence,
    ContestedType,
    GenericPredicate,
    BorderlineMatch,
}

impl EscalationReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::ContestedType => "contested_type",
            Self::GenericPredicate => "generic_predicate",
            Self::BorderlineMatch => "borderline_match",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a possible cross-document match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referent {
    pub document_id: String,
    pub document_title: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub context: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemPayload {
    Entity {
        name: String,
        #[serde(rename = "type")]
        entity_type: EntityType,
        confidence: f64,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        contested_types: Vec<String>,
    },
    Relationship {
        subject: String,
        predicate: String,
        object: String,
        confidence: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        evidence: Option<String>,
    },
    SameReferent {
        left: Referent,
        right: Referent,
        similarity: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationItem {
    pub id: String,
    pub reason: EscalationReason,
    pub payload: ItemPayload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_title: Option<String>,
}

impl ValidationItem {
    #[must_use]
    pub fn new(id: impl Into<String>, reason: EscalationReason, payload: ItemPayload) -> Self {
        Self {
            id: id.into(),
            reason,
            payload,
            context: Vec::new(),
            document_title: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_document_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.document_title = (!title.is_empty()).then_some(title);
        self
    }
}

/// Replacement values proposed by the validator. Absent fields are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Confirmed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },
    Corrected {
        correction: Correction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },
    Rejected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub id: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

impl ValidationResponse {
    #[must_use]
    pub fn confirmed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            verdict: Verdict::Confirmed { confidence: None },
        }
    }

    #[must_use]
    pub fn corrected(id: impl Into<String>, correction: Correction) -> Self {
        Self {
            id: id.into(),
            verdict: Verdict::Corrected {
                correction,
                confidence: None,
            },
        }
    }

    #[must_use]
    pub fn rejected(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            verdict: Verdict::Rejected {
                reason: Some(reason.into()),
            },
        }
    }
}

/// External capability that judges a batch of ambiguous items.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str {
        "validator"
    }

    /// Returns one response per item it could judge; items left out keep
    /// their pre-escalation state.
    async fn validate(&self, items: &[ValidationItem]) -> ValidatorResult<Vec<ValidationResponse>>;
}
