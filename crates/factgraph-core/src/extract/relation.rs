use std::sync::Arc;

use regex::Regex;

use super::chunk::{chunk_text, sentence_spans};
use super::{ExtractionOutput, ExtractionResult, Extractor, RelationCandidate};
use crate::entity::{ExtractionSource, TextSpan};
use crate::relationship::{is_generic_predicate, normalize_predicate};

const TRIPLET: &str = "<triplet>";
const SUBJ: &str = "<subj>";
const OBJ: &str = "<obj>";
const CONTROL_TOKENS: &[&str] = &["<s>", "</s>", "<pad>", "<unk>"];

/// Longest text handed to the relation model in one call.
const MAX_INPUT_CHARS: usize = 400;

const PREDICATES: &[&str] = &[
    "co-founded", "founded", "acquired", "bought", "sold", "owns", "owned", "leads", "led",
    "runs", "ran", "heads", "headed", "chairs", "works for", "worked for", "works at",
    "worked at", "works with", "worked with", "joined", "left", "sued", "met with", "met",
    "married", "hired", "fired", "funded", "invested in", "partnered with", "criticized",
    "criticised", "endorsed", "supports", "supported", "opposed", "defeated", "visited",
    "attacked", "sanctioned", "banned", "investigated", "arrested", "charged", "indicted",
    "accused", "developed", "created", "built", "launched", "released", "employs",
    "employed", "represents", "represented", "advises", "advised", "succeeded", "replaced",
    "interviewed", "praised", "spoke with", "is the ceo of", "was the ceo of",
    "is the founder of", "was born in", "lives in", "is based in", "is headquartered in",
    "moved to", "invaded", "signed", "negotiated with", "mentioned", "is related to",
];

/// Words stripped from the front of a captured endpoint.
const LEADING_NOISE: &[&str] = &[
    "the", "then", "later", "yesterday", "today", "meanwhile", "and", "but", "so", "when",
    "after", "before", "in", "on",
];

/// Backend that turns text into raw relation strings in its native format.
pub trait RelationModel: Send + Sync {
    fn id(&self) -> &str;

    fn generate(&self, text: &str) -> ExtractionResult<Vec<String>>;
}

/// A triple as parsed from raw model output, before candidate scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// Parsed from the delimiter format rather than the positional fallback.
    pub delimited: bool,
}

/// Detects "`<Name> <verb phrase> <Name>`" within a sentence and emits
/// `<triplet> subject <subj> object <obj> predicate` strings.
pub struct PatternRelationModel {
    pattern: Regex,
}

impl PatternRelationModel {
    pub const ID: &'static str = "pattern-relations/v1";

    pub fn new() -> ExtractionResult<Self> {
        let mut predicates: Vec<&str> = PREDICATES.to_vec();
        predicates.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let predicates = predicates
            .iter()
            .map(|p| regex::escape(p).replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");

        let word = r"[\p{Lu}\p{N}][\p{L}\p{N}'\u{2019}&.\-]*";
        let name = format!(r"\p{{Lu}}[\p{{L}}\p{{N}}'\u{{2019}}&.\-]*(?:\s+(?:(?:of|the|de|van|von)\s+)*{word})*");
        let pattern = format!(
            r"(?P<subj>{name})\s+(?:(?:also|reportedly|later|recently|allegedly)\s+)?(?P<pred>(?i:{predicates}))\s+(?:the\s+)?(?P<obj>{name})"
        );

        Ok(Self {
            pattern: Regex::new(&pattern)?,
        })
    }
}

impl RelationModel for PatternRelationModel {
    fn id(&self) -> &str {
        Self::ID
    }

    fn generate(&self, text: &str) -> ExtractionResult<Vec<String>> {
        let triplets: Vec<String> = self
            .pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let subject = clean_endpoint(caps.name("subj")?.as_str());
                let object = clean_endpoint(caps.name("obj")?.as_str());
                let predicate = caps
                    .name("pred")?
                    .as_str()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase();
                Some(format!("{TRIPLET} {subject} {SUBJ} {object} {OBJ} {predicate}"))
            })
            .collect();

        if triplets.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![triplets.join(" ")])
    }
}

fn clean_endpoint(raw: &str) -> String {
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    while words.len() > 1 && LEADING_NOISE.contains(&words[0].to_lowercase().as_str()) {
        words.remove(0);
    }
    words
        .join(" ")
        .trim_end_matches(['.', ',', ';', ':', '\'', '\u{2019}', '-'])
        .to_string()
}

/// Parses raw relation-model output. The `<triplet>`/`<subj>`/`<obj>`
/// delimiter format is tried first; output without delimiters falls back to
/// one triple per line, split on `|`, tabs, or whitespace (first word,
/// middle, last word). Triples with an empty end, or whose predicate repeats
/// an end, are dropped.
#[must_use]
pub fn parse_relation_output(raw: &str) -> Vec<RawTriple> {
    let mut cleaned = raw.to_string();
    for token in CONTROL_TOKENS {
        cleaned = cleaned.replace(token, " ");
    }

    let parsed = if cleaned.contains(TRIPLET) || cleaned.contains(SUBJ) || cleaned.contains(OBJ)
    {
        parse_delimited(&cleaned)
    } else {
        parse_positional(&cleaned)
    };

    parsed.into_iter().filter(is_valid_triple).collect()
}

fn parse_delimited(raw: &str) -> Vec<RawTriple> {
    let mut triples = Vec::new();
    for segment in raw.split(TRIPLET) {
        if segment.trim().is_empty() {
            continue;
        }
        let mut parts = segment.split(SUBJ);
        let subject = parts.next().map(collapse).unwrap_or_default();
        let mut any = false;
        for rest in parts {
            any = true;
            let Some((object, predicate)) = rest.split_once(OBJ) else {
                tracing::debug!(rule = "malformed_relation", item = %segment.trim(), "Missing object delimiter");
                continue;
            };
            triples.push(RawTriple {
                subject: subject.clone(),
                predicate: collapse(predicate),
                object: collapse(object),
                delimited: true,
            });
        }
        if !any {
            tracing::debug!(rule = "malformed_relation", item = %segment.trim(), "Missing subject delimiter");
        }
    }
    triples
}

fn parse_positional(raw: &str) -> Vec<RawTriple> {
    let mut triples = Vec::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<String> = if line.contains('|') {
            line.split('|').map(collapse).collect()
        } else if line.contains('\t') {
            line.split('\t').map(collapse).collect()
        } else {
            let words: Vec<&str> = line.split_whitespace().collect();
            if words.len() < 3 {
                tracing::debug!(rule = "malformed_relation", item = %line, "Too few fields");
                continue;
            }
            vec![
                words[0].to_string(),
                words[1..words.len() - 1].join(" "),
                words[words.len() - 1].to_string(),
            ]
        };

        if fields.len() != 3 {
            tracing::debug!(rule = "malformed_relation", item = %line, "Expected three fields");
            continue;
        }
        triples.push(RawTriple {
            subject: fields[0].clone(),
            predicate: fields[1].clone(),
            object: fields[2].clone(),
            delimited: false,
        });
    }
    triples
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_valid_triple(triple: &RawTriple) -> bool {
    if triple.subject.is_empty() || triple.object.is_empty() || triple.predicate.is_empty() {
        tracing::debug!(
            rule = "empty_endpoint",
            subject = %triple.subject,
            object = %triple.object,
            "Dropping relation"
        );
        return false;
    }
    let predicate = normalize_predicate(&triple.predicate);
    if predicate == normalize_predicate(&triple.subject)
        || predicate == normalize_predicate(&triple.object)
    {
        tracing::debug!(
            rule = "predicate_repeats_endpoint",
            predicate = %triple.predicate,
            "Dropping relation"
        );
        return false;
    }
    true
}

pub struct RelationExtractor {
    model: Arc<dyn RelationModel>,
}

impl RelationExtractor {
    #[must_use]
    pub fn new(model: Arc<dyn RelationModel>) -> Self {
        Self { model }
    }

    fn score(triple: &RawTriple) -> f64 {
        let base = if triple.delimited { 0.75 } else { 0.55 };
        if is_generic_predicate(&triple.predicate) {
            base * 0.7
        } else {
            base
        }
    }
}

impl Extractor for RelationExtractor {
    fn source(&self) -> ExtractionSource {
        ExtractionSource::RelationModel
    }

    fn name(&self) -> &str {
        self.model.id()
    }

    fn extract(&self, text: &str) -> ExtractionResult<ExtractionOutput> {
        let mut output = ExtractionOutput::new();

        for sentence in sentence_spans(text) {
            for piece in chunk_text(&text[sentence.clone()], MAX_INPUT_CHARS) {
                let offset = sentence.start + piece.offset;
                let span = TextSpan::new(offset, offset + piece.text.len());

                let generated = match self.model.generate(piece.text) {
                    Ok(generated) => generated,
                    Err(e) => {
                        tracing::warn!(
                            rule = "relation_model_failed",
                            model = %self.model.id(),
                            offset,
                            error = %e,
                            "Skipping sentence"
                        );
                        continue;
                    }
                };

                for raw in generated {
                    for triple in parse_relation_output(&raw) {
                        let confidence = Self::score(&triple);
                        output.relationships.push(
                            RelationCandidate::new(
                                triple.subject,
                                triple.predicate,
                                triple.object,
                                confidence,
                            )
                            .with_evidence(piece.text)
                            .with_source(ExtractionSource::RelationModel)
                            .with_span(span),
                        );
                    }
                }
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(subject: &str, predicate: &str, object: &str, delimited: bool) -> RawTriple {
        RawTriple {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            delimited,
        }
    }

    #[test]
    fn test_parse_delimited() {
        let parsed = parse_relation_output("<s><triplet> Elon Musk <subj> SpaceX <obj> founded</s>");
        assert_eq!(parsed, vec![triple("Elon Musk", "founded", "SpaceX", true)]);
    }

    #[test]
    fn test_parse_delimited_shared_subject() {
        let parsed = parse_relation_output(
            "<triplet> A Corp <subj> B Corp <obj> acquired <subj> C Corp <obj> sued <triplet> D <subj> E <obj> met",
        );
        assert_eq!(
            parsed,
            vec![
                triple("A Corp", "acquired", "B Corp", true),
                triple("A Corp", "sued", "C Corp", true),
                triple("D", "met", "E", true),
            ]
        );
    }

    #[test]
    fn test_parse_falls_back_to_positional() {
        assert_eq!(
            parse_relation_output("Elon Musk | founded | SpaceX"),
            vec![triple("Elon Musk", "founded", "SpaceX", false)]
        );
        assert_eq!(
            parse_relation_output("Musk\tleads\tTesla\nBezos founded Amazon"),
            vec![
                triple("Musk", "leads", "Tesla", false),
                triple("Bezos", "founded", "Amazon", false),
            ]
        );
    }

    #[test]
    fn test_parse_drops_invalid_triples() {
        assert!(parse_relation_output("<triplet> Musk <subj> SpaceX <obj> Musk").is_empty());
        assert!(parse_relation_output("<triplet>  <subj> SpaceX <obj> founded").is_empty());
        assert!(parse_relation_output("<triplet> Musk <subj> SpaceX founded").is_empty());
        assert!(parse_relation_output("Musk | founded").is_empty());
        assert!(parse_relation_output("too short").is_empty());
    }

    #[test]
    fn test_pattern_model_emits_delimited_output() {
        let model = PatternRelationModel::new().unwrap();
        assert_eq!(
            model.generate("Elon Musk founded SpaceX.").unwrap(),
            vec!["<triplet> Elon Musk <subj> SpaceX <obj> founded".to_string()]
        );
        assert_eq!(
            model.generate("Later Tim Cook met with the Federal Trade Commission.").unwrap(),
            vec!["<triplet> Tim Cook <subj> Federal Trade Commission <obj> met with".to_string()]
        );
        assert!(model.generate("Everyone knows Musk.").unwrap().is_empty());
    }

    #[test]
    fn test_extractor_scores_and_attaches_evidence() {
        let extractor = RelationExtractor::new(Arc::new(PatternRelationModel::new().unwrap()));
        let text = "Elon Musk founded SpaceX. Everyone knows Musk. Musk mentioned Tesla.";
        let output = extractor.extract(text).unwrap();
        assert_eq!(output.relationships.len(), 2);

        let founded = &output.relationships[0];
        assert_eq!(founded.subject, "Elon Musk");
        assert_eq!(founded.object, "SpaceX");
        assert_eq!(founded.evidence.as_deref(), Some("Elon Musk founded SpaceX."));
        assert!((founded.confidence - 0.75).abs() < 1e-9);
        let span = founded.span.unwrap();
        assert_eq!(&text[span.start..span.end], "Elon Musk founded SpaceX.");

        let generic = &output.relationships[1];
        assert_eq!(generic.predicate, "mentioned");
        assert!(generic.confidence < founded.confidence);
    }
}
