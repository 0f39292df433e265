use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;

use super::chunk::chunk_text;
use super::{EntityCandidate, ExtractionError, ExtractionOutput, ExtractionResult, Extractor};
use crate::entity::{EntityType, ExtractionSource, TextSpan};

/// A span predicted by an [`EntityModel`], relative to the text it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpan {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: f64,
}

/// Backend for open-vocabulary entity detection.
pub trait EntityModel: Send + Sync {
    fn id(&self) -> &str;

    /// Longest input, in characters, the model accepts in one call.
    fn max_input_chars(&self) -> usize;

    fn predict(&self, text: &str, labels: &[String]) -> ExtractionResult<Vec<ModelSpan>>;
}

/// Case-insensitive, word-boundary matcher over a label → terms vocabulary.
pub struct LexiconModel {
    id: String,
    max_input_chars: usize,
    patterns: Vec<(String, Regex, Vec<String>)>,
}

impl LexiconModel {
    pub const DEFAULT_MAX_INPUT_CHARS: usize = 800;

    pub fn new(
        id: impl Into<String>,
        vocabulary: &BTreeMap<String, Vec<String>>,
    ) -> ExtractionResult<Self> {
        let mut patterns = Vec::new();
        for (label, terms) in vocabulary {
            let mut terms: Vec<String> = terms
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if terms.is_empty() {
                continue;
            }
            // Longest first so "NSO Group" wins over "NSO".
            terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
            terms.dedup();
            let alternation = terms
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            let regex = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))?;
            patterns.push((label.clone(), regex, terms));
        }

        Ok(Self {
            id: id.into(),
            max_input_chars: Self::DEFAULT_MAX_INPUT_CHARS,
            patterns,
        })
    }

    #[must_use]
    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max.max(1);
        self
    }
}

impl EntityModel for LexiconModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn predict(&self, text: &str, labels: &[String]) -> ExtractionResult<Vec<ModelSpan>> {
        let len = text.chars().count();
        if len > self.max_input_chars {
            return Err(ExtractionError::InputTooLong {
                len,
                max: self.max_input_chars,
            });
        }

        let mut spans = Vec::new();
        for (label, regex, terms) in &self.patterns {
            if !labels.iter().any(|l| l.eq_ignore_ascii_case(label)) {
                continue;
            }
            for m in regex.find_iter(text) {
                let exact = terms.iter().any(|t| t == m.as_str());
                spans.push(ModelSpan {
                    start: m.start(),
                    end: m.end(),
                    label: label.clone(),
                    score: if exact { 0.8 } else { 0.65 },
                });
            }
        }
        Ok(spans)
    }
}

/// Runs an [`EntityModel`] over sentence-aligned chunks and maps every
/// prediction back to document-global offsets.
pub struct CustomEntityExtractor {
    model: Arc<dyn EntityModel>,
    labels: Vec<String>,
    chunk_max_chars: usize,
}

impl CustomEntityExtractor {
    #[must_use]
    pub fn new(model: Arc<dyn EntityModel>, labels: Vec<String>) -> Self {
        let chunk_max_chars = model.max_input_chars();
        Self {
            model,
            labels,
            chunk_max_chars,
        }
    }

    /// Caps chunk size below the model's own limit.
    #[must_use]
    pub fn with_chunk_max_chars(mut self, max: usize) -> Self {
        self.chunk_max_chars = max.clamp(1, self.model.max_input_chars().max(1));
        self
    }
}

impl Extractor for CustomEntityExtractor {
    fn source(&self) -> ExtractionSource {
        ExtractionSource::CustomEntityModel
    }

    fn name(&self) -> &str {
        self.model.id()
    }

    fn extract(&self, text: &str) -> ExtractionResult<ExtractionOutput> {
        let mut output = ExtractionOutput::new();
        if self.labels.is_empty() {
            return Ok(output);
        }

        for chunk in chunk_text(text, self.chunk_max_chars) {
            let predictions = match self.model.predict(chunk.text, &self.labels) {
                Ok(predictions) => predictions,
                Err(e) => {
                    tracing::warn!(
                        rule = "chunk_failed",
                        model = %self.model.id(),
                        offset = chunk.offset,
                        error = %e,
                        "Skipping chunk"
                    );
                    continue;
                }
            };

            for prediction in predictions {
                let Some(local) = chunk.text.get(prediction.start..prediction.end) else {
                    tracing::debug!(rule = "span_out_of_chunk", label = %prediction.label, "Dropping prediction");
                    continue;
                };
                let name = local.trim();
                if name.is_empty() {
                    tracing::debug!(rule = "blank_span", label = %prediction.label, "Dropping prediction");
                    continue;
                }
                let start = prediction.start + (local.len() - local.trim_start().len());
                let span = TextSpan::new(start, start + name.len()).shifted(chunk.offset);
                if text.get(span.start..span.end) != Some(name) {
                    tracing::warn!(rule = "offset_mismatch", item = %name, "Dropping prediction");
                    continue;
                }

                let entity_type = match EntityType::custom(&prediction.label) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::debug!(rule = "invalid_label", error = %e, "Dropping prediction");
                        continue;
                    }
                };

                output.entities.push(
                    EntityCandidate::new(name, entity_type, prediction.score)
                        .with_source(ExtractionSource::CustomEntityModel)
                        .with_span(span),
                );
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary() -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([
            (
                "SPYWARE".to_string(),
                vec!["Pegasus".to_string(), "Predator".to_string()],
            ),
            (
                "ORG".to_string(),
                vec!["NSO Group".to_string(), "NSO".to_string()],
            ),
        ])
    }

    fn labels() -> Vec<String> {
        vec!["SPYWARE".to_string(), "ORG".to_string()]
    }

    #[test]
    fn test_lexicon_matches_words_case_insensitively() {
        let model = LexiconModel::new("lexicon", &vocabulary()).unwrap();
        let spans = model
            .predict("The pegasus tool from NSO Group. Not Pegasusware.", &labels())
            .unwrap();
        assert_eq!(spans.len(), 2);
        let spyware = spans.iter().find(|s| s.label == "SPYWARE").unwrap();
        assert!((spyware.score - 0.65).abs() < f64::EPSILON);
        let org = spans.iter().find(|s| s.label == "ORG").unwrap();
        assert_eq!(org.end - org.start, "NSO Group".len());
    }

    #[test]
    fn test_lexicon_respects_requested_labels() {
        let model = LexiconModel::new("lexicon", &vocabulary()).unwrap();
        let spans = model.predict("NSO Group built Pegasus.", &["ORG".to_string()]).unwrap();
        assert!(spans.iter().all(|s| s.label == "ORG"));
    }

    #[test]
    fn test_lexicon_rejects_long_input() {
        let model = LexiconModel::new("lexicon", &vocabulary())
            .unwrap()
            .with_max_input_chars(10);
        assert!(matches!(
            model.predict("far more than ten characters", &labels()),
            Err(ExtractionError::InputTooLong { .. })
        ));
    }

    #[test]
    fn test_extractor_maps_chunk_offsets_to_document() {
        let model = LexiconModel::new("lexicon", &vocabulary())
            .unwrap()
            .with_max_input_chars(40);
        let extractor = CustomEntityExtractor::new(Arc::new(model), labels());
        let text = "Researchers looked at the phones. They found Pegasus there. NSO Group denied it.";
        let output = extractor.extract(text).unwrap();

        assert_eq!(output.entities.len(), 2);
        for entity in &output.entities {
            let span = entity.span.unwrap();
            assert_eq!(&text[span.start..span.end], entity.name);
            assert_eq!(entity.source, Some(ExtractionSource::CustomEntityModel));
        }
        let pegasus = output.entities.iter().find(|e| e.name == "Pegasus").unwrap();
        assert_eq!(pegasus.entity_type, EntityType::Custom("SPYWARE".into()));
        let nso = output.entities.iter().find(|e| e.name == "NSO Group").unwrap();
        assert_eq!(nso.entity_type, EntityType::Org);
    }

    /// Returns fixed spans regardless of input.
    struct FixedModel(Vec<ModelSpan>);

    impl EntityModel for FixedModel {
        fn id(&self) -> &str {
            "fixed"
        }

        fn max_input_chars(&self) -> usize {
            1_000
        }

        fn predict(&self, _text: &str, _labels: &[String]) -> ExtractionResult<Vec<ModelSpan>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_padded_prediction_span_shrinks_to_name() {
        let text = "They found  Pegasus  there.";
        let padded = |start, end| ModelSpan {
            start,
            end,
            label: "SPYWARE".to_string(),
            score: 0.9,
        };
        let model = FixedModel(vec![padded(10, 21), padded(10, 12)]);
        let extractor = CustomEntityExtractor::new(Arc::new(model), labels());
        let output = extractor.extract(text).unwrap();

        assert_eq!(output.entities.len(), 1);
        let pegasus = &output.entities[0];
        assert_eq!(pegasus.name, "Pegasus");
        let span = pegasus.span.unwrap();
        assert_eq!(span, TextSpan::new(12, 19));
        assert_eq!(&text[span.start..span.end], pegasus.name);
    }

    #[test]
    fn test_no_labels_means_no_output() {
        let model = LexiconModel::new("lexicon", &vocabulary()).unwrap();
        let extractor = CustomEntityExtractor::new(Arc::new(model), Vec::new());
        assert!(extractor.extract("NSO Group").unwrap().is_empty());
    }
}
