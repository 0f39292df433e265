//! Gazetteer and capitalization driven named-entity tagger.
//!
//! Spans are runs of capitalized tokens inside one sentence, optionally joined
//! by lowercase connectors ("Bank of America") or an ampersand. Each span is
//! typed by a fixed rule order and scored from its length, how reliable the
//! rule that typed it is, and how clean the surrounding sentence is.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use regex::Regex;

use super::chunk::sentence_spans;
use super::{EntityCandidate, ExtractionOutput, ExtractionResult, Extractor};
use crate::entity::{EntityType, ExtractionSource, TextSpan};
use crate::normalize::{has_leading_title, normalize_for, strip_display_titles};

const CONNECTORS: &[&str] = &[
    "of", "the", "de", "da", "del", "der", "van", "von", "la", "le", "du", "bin", "al",
];

/// Capitalized words that never start or end an entity span.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "this", "that", "these", "those", "it", "he", "she", "they", "we", "i",
    "i'm", "i've", "i'll", "i'd", "you", "his", "her", "their", "our", "my", "your", "its",
    "and", "but", "or", "so", "yet", "if", "when", "while", "then", "now", "later", "today",
    "yesterday", "tomorrow", "meanwhile", "everyone", "everybody", "someone", "nobody",
    "people", "many", "some", "most", "all", "also", "however", "still", "well", "yes", "no",
    "okay", "ok", "oh", "hi", "hello", "hey", "thanks", "thank", "let", "here", "there",
    "what", "why", "how", "who", "where", "which", "after", "before", "because", "although",
    "since", "just", "maybe", "perhaps", "actually", "basically", "right", "look", "listen",
    "even", "every", "each", "both", "another", "other", "such", "not", "in", "on", "at",
    "for", "with", "from", "by", "to", "of", "as", "do", "did", "does", "is", "was", "are",
    "were", "be", "been", "has", "have", "had", "can", "could", "will", "would", "should",
    "may", "might", "must", "monday", "tuesday", "wednesday", "thursday", "friday",
    "saturday", "sunday", "january", "february", "march", "april", "june", "july", "august",
    "september", "october", "november", "december", "ai", "tv", "um", "uh", "like", "sure",
    "first", "next", "last", "one", "two", "three", "our", "again", "great", "good",
];

const GPE: &[&str] = &[
    "united states", "united kingdom", "european union", "canada", "mexico", "brazil",
    "argentina", "chile", "colombia", "peru", "venezuela", "cuba", "france", "germany",
    "italy", "spain", "portugal", "netherlands", "belgium", "switzerland", "austria",
    "sweden", "norway", "denmark", "finland", "poland", "ukraine", "russia", "belarus",
    "hungary", "greece", "turkey", "ireland", "scotland", "england", "wales", "israel",
    "palestine", "gaza", "lebanon", "syria", "iraq", "iran", "saudi arabia", "yemen",
    "qatar", "united arab emirates", "egypt", "libya", "morocco", "nigeria", "kenya",
    "ethiopia", "south africa", "india", "pakistan", "afghanistan", "bangladesh", "china",
    "taiwan", "hong kong", "japan", "south korea", "north korea", "vietnam", "thailand",
    "indonesia", "philippines", "malaysia", "singapore", "australia", "new zealand",
    "soviet union", "washington", "washington dc", "new york", "new york city",
    "los angeles", "san francisco", "chicago", "boston", "seattle", "texas", "california",
    "florida", "georgia", "ohio", "michigan", "pennsylvania", "arizona", "nevada",
    "virginia", "london", "paris", "berlin", "moscow", "kyiv", "kiev", "beijing",
    "shanghai", "tokyo", "delhi", "new delhi", "mumbai", "jerusalem", "tel aviv",
    "tehran", "baghdad", "cairo", "dubai", "istanbul", "rome", "madrid", "brussels",
    "geneva", "vienna", "toronto", "sydney", "silicon valley", "europe", "asia", "africa",
    "latin america", "middle east",
];

const GIVEN_NAMES: &[&str] = &[
    "aaron", "adam", "ahmed", "alan", "alex", "alexander", "alexei", "ali", "alice",
    "amanda", "amy", "ana", "andrew", "angela", "ann", "anna", "anthony", "barack",
    "barbara", "ben", "benjamin", "bernie", "bill", "bob", "boris", "brian", "carlos",
    "carol", "catherine", "charles", "chris", "christopher", "chuck", "daniel", "david",
    "donald", "edward", "elizabeth", "elon", "emily", "emma", "emmanuel", "eric", "frank",
    "gary", "george", "greta", "hannah", "harry", "helen", "hillary", "ivan", "jack",
    "jacob", "james", "jane", "jason", "jeff", "jeffrey", "jennifer", "jessica", "jim",
    "joe", "john", "jonathan", "jose", "joseph", "juan", "julia", "julian", "justin",
    "kamala", "karen", "kate", "kevin", "kim", "larry", "laura", "linda", "lisa", "luis",
    "marco", "margaret", "maria", "mark", "mary", "matthew", "michael", "michelle",
    "miguel", "mike", "mitch", "mohammed", "muhammad", "nancy", "narendra", "nicholas",
    "nicole", "olga", "omar", "patricia", "patrick", "paul", "pete", "peter", "rachel",
    "raj", "rebecca", "richard", "rishi", "robert", "ron", "ryan", "sam", "samuel",
    "sarah", "satya", "scott", "sergey", "sophia", "stephen", "steve", "steven",
    "sundar", "susan", "ted", "thomas", "tim", "tom", "victoria", "vladimir",
    "volodymyr", "walter", "warren", "william", "xi",
];

const ORG_SUFFIXES: &[&str] = &[
    "inc", "incorporated", "corp", "corporation", "company", "co", "group", "ltd", "llc",
    "plc", "gmbh", "ag", "bank", "university", "college", "institute", "school", "agency",
    "foundation", "fund", "trust", "association", "society", "union", "federation",
    "league", "committee", "council", "commission", "department", "ministry", "bureau",
    "party", "court", "police", "army", "navy", "motors", "airlines", "airways",
    "technologies", "technology", "systems", "labs", "laboratories", "partners",
    "holdings", "industries", "enterprises", "media", "news", "times", "post", "journal",
    "network", "studios", "records", "pharmaceuticals", "energy", "capital", "ventures",
    "hospital", "church", "club", "board", "administration", "service", "services",
];

const ORG_NAMES: &[&str] = &[
    "google", "apple", "microsoft", "amazon", "facebook", "meta", "twitter", "tesla",
    "netflix", "youtube", "spacex", "openai", "nvidia", "intel", "samsung", "huawei",
    "tiktok", "reuters", "congress", "senate", "pentagon", "kremlin", "parliament",
    "hamas", "hezbollah", "taliban", "interpol", "europol", "wikileaks",
];

const LAW_KEYWORDS: &[&str] = &[
    "act", "amendment", "law", "bill", "treaty", "code", "constitution", "convention",
    "accord", "accords", "agreement", "regulation", "directive", "statute", "ordinance",
    "charter",
];

const EVENT_KEYWORDS: &[&str] = &[
    "war", "summit", "olympics", "games", "conference", "election", "elections",
    "festival", "cup", "championship", "crisis", "revolution", "protests", "riots",
    "massacre", "hurricane", "pandemic", "scandal", "trial", "hearing", "ceremony",
    "awards", "expo", "marathon",
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    fn multiplier(self) -> f64 {
        match self {
            Self::High => 1.15,
            Self::Medium => 1.0,
            Self::Low => 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    start: usize,
    end: usize,
    text: &'a str,
    sentence: usize,
}

impl Token<'_> {
    fn capitalized(&self) -> bool {
        self.text.chars().next().is_some_and(char::is_uppercase)
    }

    fn numeric(&self) -> bool {
        self.text.chars().next().is_some_and(|c| c.is_ascii_digit())
    }

    fn connector(&self) -> bool {
        CONNECTORS.contains(&self.text)
    }

    fn stopword(&self) -> bool {
        STOPWORDS.contains(&self.text.to_lowercase().as_str())
    }
}

/// Tokens already typed in multi-token spans of the same document.
#[derive(Default)]
struct Known {
    person: HashSet<String>,
    org: HashSet<String>,
    mid_sentence: HashSet<String>,
}

pub struct RuleBasedNer {
    token: Regex,
}

impl RuleBasedNer {
    pub const ID: &'static str = "rule-ner/v1";

    pub fn new() -> ExtractionResult<Self> {
        Ok(Self {
            token: Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}'\u{2019}.&\-]*")?,
        })
    }

    /// Tags every entity mention in `text`.
    #[must_use]
    pub fn tag(&self, text: &str) -> Vec<EntityCandidate> {
        let sentences = sentence_spans(text);
        let tokens = self.tokenize(text, &sentences);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut sentence_starts = HashSet::new();
        let mut previous = None;
        for (idx, token) in tokens.iter().enumerate() {
            if previous != Some(token.sentence) {
                sentence_starts.insert(idx);
                previous = Some(token.sentence);
            }
        }
        let quality: Vec<f64> = sentences
            .iter()
            .map(|range| context_quality(&text[range.clone()]))
            .collect();

        let runs: Vec<Range<usize>> = capitalized_runs(text, &tokens)
            .into_iter()
            .filter_map(|run| trim_stopwords(&tokens, run))
            .collect();

        let mut known = Known::default();
        for (idx, token) in tokens.iter().enumerate() {
            if token.capitalized() && !sentence_starts.contains(&idx) && !token.stopword() {
                known.mid_sentence.insert(token.text.to_lowercase());
            }
        }

        let mut candidates: Vec<(usize, EntityCandidate)> = Vec::new();
        let (multi, single): (Vec<_>, Vec<_>) = runs.into_iter().partition(|r| r.len() > 1);

        for run in multi {
            let words: Vec<&str> = tokens[run.clone()].iter().map(|t| t.text).collect();
            let name = &text[tokens[run.start].start..tokens[run.end - 1].end];
            if is_only_titles(name) {
                continue;
            }
            let (entity_type, tier) = classify(name, &words, &known);
            match entity_type {
                EntityType::Person => {
                    let stripped = strip_display_titles(name);
                    if let Some(last) = stripped.split_whitespace().last() {
                        known.person.insert(last.to_lowercase());
                    }
                }
                EntityType::Org => {
                    known.org.insert(words[0].to_lowercase());
                }
                _ => {}
            }
            candidates.push((
                tokens[run.start].start,
                candidate(text, &tokens, run, entity_type, tier, &quality),
            ));
        }

        for run in single {
            let token = tokens[run.start];
            if is_only_titles(token.text) {
                continue;
            }
            if sentence_starts.contains(&run.start) && !is_recognizable(token.text, &known) {
                tracing::trace!(
                    rule = "sentence_start",
                    item = %token.text,
                    "Skipping capitalized word"
                );
                continue;
            }
            let (entity_type, tier) = classify(token.text, &[token.text], &known);
            candidates.push((
                token.start,
                candidate(text, &tokens, run, entity_type, tier, &quality),
            ));
        }

        candidates.sort_by_key(|(start, _)| *start);
        candidates.into_iter().map(|(_, c)| c).collect()
    }

    fn tokenize<'a>(&self, text: &'a str, sentences: &[Range<usize>]) -> Vec<Token<'a>> {
        let mut tokens = Vec::new();
        for (sentence, range) in sentences.iter().enumerate() {
            for m in self.token.find_iter(&text[range.clone()]) {
                let start = range.start + m.start();
                let cleaned = clean_token(m.as_str());
                if cleaned.is_empty() {
                    continue;
                }
                tokens.push(Token {
                    start,
                    end: start + cleaned.len(),
                    text: cleaned,
                    sentence,
                });
            }
        }
        tokens
    }
}

impl std::fmt::Debug for RuleBasedNer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleBasedNer").finish_non_exhaustive()
    }
}

/// Strips trailing punctuation (kept on dotted acronyms such as "U.S.") and
/// possessive suffixes.
fn clean_token(raw: &str) -> &str {
    let trim = |s: &str| -> usize {
        if is_dotted_acronym(s) {
            s.len()
        } else {
            s.trim_end_matches(['.', '\'', '\u{2019}', '-', '&']).len()
        }
    };
    let mut s = &raw[..trim(raw)];
    if let Some(stripped) = s.strip_suffix("'s").or_else(|| s.strip_suffix("\u{2019}s")) {
        s = &stripped[..trim(stripped)];
    }
    s
}

fn candidate(
    text: &str,
    tokens: &[Token<'_>],
    run: Range<usize>,
    entity_type: EntityType,
    tier: Tier,
    quality: &[f64],
) -> EntityCandidate {
    let first = tokens[run.start];
    let last = tokens[run.end - 1];
    let span = TextSpan::new(first.start, last.end);
    let base = match run.len() {
        1 | 2 => 0.70,
        3 | 4 => 0.78,
        _ => 0.62,
    };
    let context = quality.get(first.sentence).copied().unwrap_or(1.0);
    let confidence = (base * tier.multiplier() * (0.85 + 0.15 * context)).min(0.99);

    EntityCandidate::new(&text[span.start..span.end], entity_type, confidence)
        .with_source(ExtractionSource::RuleBasedNer)
        .with_span(span)
}

fn is_dotted_acronym(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    chars.len() >= 4
        && chars.len() % 2 == 0
        && chars
            .chunks(2)
            .all(|pair| pair[0].is_uppercase() && pair[1] == '.')
}

fn joinable(text: &str, prev: &Token<'_>, next: &Token<'_>) -> bool {
    if prev.sentence != next.sentence || prev.end >= next.start {
        return false;
    }
    let gap = &text[prev.end..next.start];
    let trimmed = gap.trim();
    gap.starts_with(char::is_whitespace) && (trimmed.is_empty() || trimmed == "&")
}

fn capitalized_runs(text: &str, tokens: &[Token<'_>]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if !tokens[i].capitalized() {
            i += 1;
            continue;
        }
        let mut last = i;
        let mut j = i + 1;
        while j < tokens.len() && joinable(text, &tokens[last], &tokens[j]) {
            let token = &tokens[j];
            if token.capitalized() {
                last = j;
                j += 1;
                continue;
            }
            // "Boeing 737": a number closes a one-word run.
            if token.numeric() && last == i {
                last = j;
                break;
            }
            // A chain of connectors must be followed by a capitalized token.
            let mut k = j;
            while k < tokens.len() && tokens[k].connector() {
                if k > j && !joinable(text, &tokens[k - 1], &tokens[k]) {
                    break;
                }
                k += 1;
            }
            if k > j
                && k < tokens.len()
                && tokens[k].capitalized()
                && joinable(text, &tokens[k - 1], &tokens[k])
            {
                last = k;
                j = k + 1;
            } else {
                break;
            }
        }
        runs.push(i..last + 1);
        i = last + 1;
    }
    runs
}

fn trim_stopwords(tokens: &[Token<'_>], mut run: Range<usize>) -> Option<Range<usize>> {
    while !run.is_empty() && (tokens[run.start].stopword() || tokens[run.start].connector()) {
        run.start += 1;
    }
    while !run.is_empty() && tokens[run.end - 1].stopword() {
        run.end -= 1;
    }
    (!run.is_empty() && tokens[run.start].capitalized()).then_some(run)
}

fn is_only_titles(name: &str) -> bool {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    has_leading_title(name) && strip_display_titles(name) == collapsed
}

fn is_acronym(word: &str) -> bool {
    let letters = word.chars().filter(|c| c.is_alphabetic()).count();
    (2..=6).contains(&letters) && word.chars().all(|c| c.is_uppercase() || c == '.' || c == '&')
}

fn is_camel_case(word: &str) -> bool {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let rest: Vec<char> = chars.collect();
    first.is_uppercase() && rest.windows(2).any(|w| w[0].is_lowercase() && w[1].is_uppercase())
}

fn is_recognizable(word: &str, known: &Known) -> bool {
    let lower = word.to_lowercase();
    known.person.contains(&lower)
        || known.org.contains(&lower)
        || known.mid_sentence.contains(&lower)
        || GIVEN_NAMES.contains(&lower.as_str())
        || ORG_NAMES.contains(&lower.as_str())
        || GPE.contains(&normalize_for(word, &EntityType::Gpe).as_str())
        || is_acronym(word)
        || is_camel_case(word)
}

fn classify(name: &str, words: &[&str], known: &Known) -> (EntityType, Tier) {
    let lower: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
    let last = lower.last().map_or("", String::as_str);
    let n = words.len();

    if GPE.contains(&normalize_for(name, &EntityType::Gpe).as_str()) {
        return (EntityType::Gpe, Tier::High);
    }
    if n >= 2 && LAW_KEYWORDS.contains(&last) {
        return (EntityType::Law, Tier::High);
    }
    let org_head = n >= 3 && ORG_SUFFIXES.contains(&lower[0].as_str()) && lower[1] == "of";
    if (n >= 2 && ORG_SUFFIXES.contains(&last))
        || org_head
        || (n == 1 && ORG_NAMES.contains(&last))
    {
        return (EntityType::Org, Tier::High);
    }
    if n >= 2 && EVENT_KEYWORDS.contains(&last) {
        return (EntityType::Event, Tier::Medium);
    }
    if has_leading_title(name) {
        return (EntityType::Person, Tier::High);
    }
    if words.iter().any(|w| w.chars().any(|c| c.is_ascii_digit())) {
        return if n >= 2 {
            (EntityType::Product, Tier::Medium)
        } else {
            (EntityType::Product, Tier::Low)
        };
    }
    if n == 1 {
        let word = words[0];
        if known.org.contains(last) {
            return (EntityType::Org, Tier::High);
        }
        if known.person.contains(last) {
            return (EntityType::Person, Tier::High);
        }
        if is_acronym(word) || is_camel_case(word) {
            return (EntityType::Org, Tier::Medium);
        }
        if GIVEN_NAMES.contains(&last) {
            return (EntityType::Person, Tier::Medium);
        }
        return (EntityType::Person, Tier::Low);
    }
    if n <= 3 && GIVEN_NAMES.contains(&lower[0].as_str()) {
        return (EntityType::Person, Tier::High);
    }
    if n <= 3 && words.iter().all(|w| is_title_case(w)) {
        return (EntityType::Person, Tier::Medium);
    }
    if n >= 4 {
        return (EntityType::Org, Tier::Low);
    }
    (EntityType::Person, Tier::Low)
}

fn is_title_case(word: &str) -> bool {
    let mut chars = word.chars();
    chars.next().is_some_and(char::is_uppercase)
        && chars.all(|c| c.is_lowercase() || c == '\'' || c == '-')
}

/// Share of alphabetic characters among the non-whitespace characters of a
/// sentence; transcription noise lowers it.
fn context_quality(sentence: &str) -> f64 {
    let mut visible = 0usize;
    let mut alphabetic = 0usize;
    for c in sentence.chars().filter(|c| !c.is_whitespace()) {
        visible += 1;
        if c.is_alphabetic() {
            alphabetic += 1;
        }
    }
    if visible == 0 {
        return 0.0;
    }
    alphabetic as f64 / visible as f64
}

pub struct RuleBasedExtractor {
    ner: Arc<RuleBasedNer>,
}

impl RuleBasedExtractor {
    #[must_use]
    pub fn new(ner: Arc<RuleBasedNer>) -> Self {
        Self { ner }
    }
}

impl Extractor for RuleBasedExtractor {
    fn source(&self) -> ExtractionSource {
        ExtractionSource::RuleBasedNer
    }

    fn name(&self) -> &str {
        RuleBasedNer::ID
    }

    fn extract(&self, text: &str) -> ExtractionResult<ExtractionOutput> {
        Ok(ExtractionOutput {
            entities: self.ner.tag(text),
            relationships: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(text: &str) -> Vec<EntityCandidate> {
        RuleBasedNer::new().unwrap().tag(text)
    }

    fn names(candidates: &[EntityCandidate]) -> Vec<(&str, &EntityType)> {
        candidates
            .iter()
            .map(|c| (c.name.as_str(), &c.entity_type))
            .collect()
    }

    #[test]
    fn test_scenario_mentions() {
        let found = tag("Elon Musk founded SpaceX. Everyone knows Musk. People say Musk works hard.");
        assert_eq!(
            names(&found),
            vec![
                ("Elon Musk", &EntityType::Person),
                ("SpaceX", &EntityType::Org),
                ("Musk", &EntityType::Person),
                ("Musk", &EntityType::Person),
            ]
        );
        for candidate in &found {
            assert!(candidate.confidence > 0.6 && candidate.confidence <= 0.99);
            assert_eq!(candidate.source, Some(ExtractionSource::RuleBasedNer));
        }
    }

    #[test]
    fn test_spans_point_into_text() {
        let text = "Later, Jane Goodall visited the Gombe Stream Research Centre.";
        for candidate in tag(text) {
            let span = candidate.span.unwrap();
            assert_eq!(&text[span.start..span.end], candidate.name);
        }
    }

    #[test]
    fn test_leading_title_tags_person() {
        let found = tag("President Joe Biden met reporters. Biden said little.");
        assert_eq!(
            names(&found),
            vec![
                ("President Joe Biden", &EntityType::Person),
                ("Biden", &EntityType::Person),
            ]
        );
    }

    #[test]
    fn test_gazetteer_types() {
        let found = tag("He flew from Paris to the United States for the Paris Climate Agreement.");
        assert!(names(&found).contains(&("Paris", &EntityType::Gpe)));
        assert!(names(&found).contains(&("United States", &EntityType::Gpe)));
        assert!(names(&found).contains(&("Paris Climate Agreement", &EntityType::Law)));
    }

    #[test]
    fn test_org_rules() {
        let found = tag("The FBI questioned staff at Acme Corp. on Friday. Bank of America declined.");
        let found = names(&found);
        assert!(found.contains(&("FBI", &EntityType::Org)));
        assert!(found.contains(&("Acme Corp", &EntityType::Org)));
        assert!(found.contains(&("Bank of America", &EntityType::Org)));
    }

    #[test]
    fn test_unknown_sentence_start_word_skipped() {
        let found = tag("Brilliant work overall. Yesterday was calm.");
        assert!(found.is_empty(), "{found:?}");
    }

    #[test]
    fn test_possessive_and_acronym_cleanup() {
        let found = tag("We read Musk's post about the U.S. economy.");
        let found = names(&found);
        assert!(found.contains(&("Musk", &EntityType::Person)));
        assert!(found.contains(&("U.S.", &EntityType::Gpe)));
    }

    #[test]
    fn test_confidence_depends_on_context() {
        let clean = tag("We met Jane Goodall today.");
        let noisy = tag("We met Jane Goodall 12 34 56 78 ## %%.");
        assert!(clean[0].confidence > noisy[0].confidence);
    }

    #[test]
    fn test_bare_title_is_not_an_entity() {
        assert!(tag("We asked the President about it.").is_empty());
    }
}
