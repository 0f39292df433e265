use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f64 },
    #[error("{name} must be at least 1")]
    Zero { name: &'static str },
    #[error("Borderline threshold {borderline} must be below the merge threshold {merge}")]
    BorderlineAboveMerge { borderline: f64, merge: f64 },
    #[error("Invalid validator endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("Validator endpoint must use http or https, got {0}")]
    UnsupportedScheme(String),
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Local extractor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Custom entity vocabulary: label → surface terms.
    pub custom_labels: BTreeMap<String, Vec<String>>,
    /// Input-length limit of the custom-entity model; longer text is chunked.
    pub chunk_max_chars: usize,
    pub rule_model_id: String,
    pub entity_model_id: String,
    pub relation_model_id: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            custom_labels: BTreeMap::new(),
            chunk_max_chars: 800,
            rule_model_id: "rule-ner/v1".to_string(),
            entity_model_id: "lexicon/v1".to_string(),
            relation_model_id: "pattern-relations/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// ISO 639-1 code of the expected document language.
    pub expected_language: String,
    /// Multiplier applied to entities written in an unexpected script.
    pub language_penalty: f64,
    /// Down-weighted entities below this confidence are dropped. Kept loose:
    /// a strict value here discards most valid entities.
    pub min_language_confidence: f64,
    /// Transcription boilerplate dropped as false positives.
    pub boilerplate: Vec<String>,
    /// `strsim` normalized Levenshtein similarity at which a name counts as
    /// boilerplate.
    pub boilerplate_similarity: f64,
    pub extractor_weight: f64,
    pub label_weight: f64,
    pub frequency_weight: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            expected_language: "en".to_string(),
            language_penalty: 0.5,
            min_language_confidence: 0.3,
            boilerplate: [
                "subscribe",
                "like and subscribe",
                "thanks for watching",
                "thank you for watching",
                "click the link",
                "link in the description",
                "hit the bell",
                "notification bell",
                "music",
                "applause",
                "laughter",
                "inaudible",
                "crosstalk",
                "foreign",
                "silence",
                "patreon",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            boilerplate_similarity: 0.85,
            extractor_weight: 0.6,
            label_weight: 0.25,
            frequency_weight: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// LCS-ratio at or above which two same-type names merge. Tuned on
    /// transcript content; re-validate before relying on it for new domains.
    pub similarity_threshold: f64,
    /// Members within this distance of the cluster's best confidence compete
    /// for the canonical name on length.
    pub canonical_tolerance: f64,
    pub max_context_windows: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.80,
            canonical_tolerance: 0.1,
            max_context_windows: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// HTTP endpoint of the validator; no endpoint means escalations fall back.
    pub endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    /// Items below this confidence are escalated.
    pub confidence_threshold: f64,
    pub batch_size: usize,
    /// Simultaneous in-flight validator calls across the whole run.
    pub max_concurrency: usize,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_token: None,
            confidence_threshold: 0.6,
            batch_size: 16,
            max_concurrency: 8,
            timeout_seconds: 30,
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub similarity_threshold: f64,
    /// Scores in `[borderline_threshold, similarity_threshold)` are escalated.
    pub borderline_threshold: f64,
    pub canonical_tolerance: f64,
    pub max_context_windows: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            borderline_threshold: 0.70,
            canonical_tolerance: 0.1,
            max_context_windows: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Documents processed at once in a collection run.
    pub document_concurrency: usize,
    /// Use upstream LLM extractions as-is and skip local extraction.
    pub trust_precomputed: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            document_concurrency: 4,
            trust_precomputed: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub extraction: ExtractionConfig,
    pub filter: FilterConfig,
    pub dedup: DedupConfig,
    pub validator: ValidatorConfig,
    pub resolver: ResolverConfig,
    pub run: RunConfig,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `FACTGRAPH_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup("FACTGRAPH_VALIDATOR_URL").filter(|v| !v.is_empty()) {
            self.validator.endpoint = Some(url);
        }
        if let Some(token) = lookup("FACTGRAPH_VALIDATOR_TOKEN").filter(|v| !v.is_empty()) {
            self.validator.api_token = Some(token);
        }
        if let Some(value) = lookup("FACTGRAPH_VALIDATOR_CONCURRENCY") {
            self.validator.max_concurrency =
                value.parse().map_err(|_| ConfigError::InvalidEnv {
                    var: "FACTGRAPH_VALIDATOR_CONCURRENCY",
                    value,
                })?;
        }
        if let Some(lang) = lookup("FACTGRAPH_LANGUAGE").filter(|v| !v.is_empty()) {
            self.filter.expected_language = lang;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("filter.language_penalty", self.filter.language_penalty),
            ("filter.min_language_confidence", self.filter.min_language_confidence),
            ("filter.boilerplate_similarity", self.filter.boilerplate_similarity),
            ("dedup.similarity_threshold", self.dedup.similarity_threshold),
            ("dedup.canonical_tolerance", self.dedup.canonical_tolerance),
            ("validator.confidence_threshold", self.validator.confidence_threshold),
            ("resolver.similarity_threshold", self.resolver.similarity_threshold),
            ("resolver.borderline_threshold", self.resolver.borderline_threshold),
            ("resolver.canonical_tolerance", self.resolver.canonical_tolerance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }

        for (name, value) in [
            ("extraction.chunk_max_chars", self.extraction.chunk_max_chars),
            ("validator.batch_size", self.validator.batch_size),
            ("validator.max_concurrency", self.validator.max_concurrency),
            ("run.document_concurrency", self.run.document_concurrency),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { name });
            }
        }

        if self.resolver.borderline_threshold >= self.resolver.similarity_threshold {
            return Err(ConfigError::BorderlineAboveMerge {
                borderline: self.resolver.borderline_threshold,
                merge: self.resolver.similarity_threshold,
            });
        }

        if let Some(endpoint) = &self.validator.endpoint {
            let url = url::Url::parse(endpoint)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
            }
        }

        Ok(())
    }
}
