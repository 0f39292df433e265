//! Name normalization and string similarity shared by the deduplicator, the
//! cross-document resolver and canonical id generation.
//!
//! Every table here is read-only; normalization of a given surface form is a
//! pure function, so canonical ids are reproducible across runs.

use crate::entity::EntityType;

/// Honorifics and titles stripped from the front of a name. Multi-word entries
/// are matched before single-word ones.
pub const TITLES: &[&str] = &[
    "former",
    "acting",
    "vice president",
    "president",
    "prime minister",
    "attorney general",
    "secretary of state",
    "secretary",
    "minister",
    "chancellor",
    "senator",
    "sen",
    "representative",
    "rep",
    "congressman",
    "congresswoman",
    "governor",
    "gov",
    "mayor",
    "ambassador",
    "commissioner",
    "speaker",
    "judge",
    "justice",
    "chief justice",
    "ceo",
    "cfo",
    "cto",
    "coo",
    "founder",
    "chairman",
    "chairwoman",
    "chair",
    "director",
    "general",
    "gen",
    "colonel",
    "col",
    "captain",
    "capt",
    "lieutenant",
    "lt",
    "sergeant",
    "sgt",
    "admiral",
    "doctor",
    "dr",
    "professor",
    "prof",
    "mr",
    "mrs",
    "ms",
    "miss",
    "sir",
    "dame",
    "lord",
    "lady",
    "king",
    "queen",
    "prince",
    "princess",
    "pope",
    "reverend",
    "rev",
    "sheikh",
];

/// Whole-name abbreviations expanded to their canonical long form.
pub const ABBREVIATIONS: &[(&str, &str)] = &[
    ("us", "united states"),
    ("usa", "united states"),
    ("united states of america", "united states"),
    ("america", "united states"),
    ("uk", "united kingdom"),
    ("great britain", "united kingdom"),
    ("eu", "european union"),
    ("un", "united nations"),
    ("nyc", "new york city"),
    ("dc", "washington dc"),
    ("ussr", "soviet union"),
    ("prc", "china"),
    ("uae", "united arab emirates"),
    ("fbi", "federal bureau of investigation"),
    ("cia", "central intelligence agency"),
    ("nsa", "national security agency"),
    ("doj", "department of justice"),
    ("dod", "department of defense"),
    ("nasa", "national aeronautics and space administration"),
    ("nato", "north atlantic treaty organization"),
    ("sec", "securities and exchange commission"),
    ("ftc", "federal trade commission"),
    ("fcc", "federal communications commission"),
    ("imf", "international monetary fund"),
];

/// Token-level expansions applied after whole-name expansion.
const TOKEN_EXPANSIONS: &[(&str, &str)] = &[
    ("&", "and"),
    ("corp", "corporation"),
    ("inc", "incorporated"),
    ("co", "company"),
    ("intl", "international"),
    ("dept", "department"),
    ("univ", "university"),
    ("assn", "association"),
    ("natl", "national"),
    ("govt", "government"),
];

const SCORE_EPSILON: f64 = 1e-9;

/// Lowercased, punctuation-free, title-stripped, abbreviation-expanded form of a
/// name. Used for comparison and id derivation only; display names keep casing.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    normalize(name, true)
}

/// Type-aware normalization: titles are only stripped from people, so that
/// "General Motors" or "Queen" the band keep their identity.
#[must_use]
pub fn normalize_for(name: &str, entity_type: &EntityType) -> String {
    normalize(name, entity_type.strips_titles())
}

/// Normalization without title stripping, for grouping names whose type is
/// not settled yet.
#[must_use]
pub fn normalize_plain(name: &str) -> String {
    normalize(name, false)
}

fn normalize(name: &str, strip_titles: bool) -> String {
    let cleaned = clean(name);
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    let stripped = if strip_titles {
        strip_title_tokens(&tokens, ToString::to_string)
    } else {
        tokens.clone()
    };
    let mut joined = if stripped.is_empty() {
        tokens.join(" ")
    } else {
        stripped.join(" ")
    };

    if let Some((_, long)) = ABBREVIATIONS.iter().find(|(short, _)| *short == joined) {
        joined = (*long).to_string();
    }

    joined
        .split_whitespace()
        .map(|t| {
            TOKEN_EXPANSIONS
                .iter()
                .find(|(short, _)| *short == t)
                .map_or(t, |(_, long)| long)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Removes leading titles from a display name while keeping the original casing.
/// Returns the input unchanged when nothing but titles would remain.
#[must_use]
pub fn strip_display_titles(name: &str) -> String {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    let stripped = strip_title_tokens(&tokens, |t| clean(t));
    if stripped.is_empty() {
        return tokens.join(" ");
    }
    stripped.join(" ")
}

/// True when the first token(s) of `name` form a known title.
#[must_use]
pub fn has_leading_title(name: &str) -> bool {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    strip_title_tokens(&tokens, |t| clean(t)).len() < tokens.len()
}

fn strip_title_tokens<'a>(tokens: &[&'a str], key: impl Fn(&str) -> String) -> Vec<&'a str> {
    let keys: Vec<String> = tokens.iter().map(|t| key(t)).collect();
    let mut start = 0;

    'outer: while start < tokens.len() {
        for title in TITLES {
            let title_tokens: Vec<&str> = title.split(' ').collect();
            let end = start + title_tokens.len();
            if end > tokens.len() {
                continue;
            }
            if keys[start..end].iter().zip(&title_tokens).all(|(k, t)| k == t) {
                start = end;
                continue 'outer;
            }
        }
        break;
    }

    tokens[start..].to_vec()
}

fn clean(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let lower = lower
        .strip_suffix("'s")
        .or_else(|| lower.strip_suffix("\u{2019}s"))
        .unwrap_or(&lower);

    let mut out = String::with_capacity(lower.len());
    for c in lower.chars() {
        match c {
            '-' | '_' | '/' => out.push(' '),
            '&' => out.push_str(" & "),
            c if c.is_alphanumeric() || c.is_whitespace() => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Length of the longest common subsequence of two strings, by characters.
#[must_use]
pub fn lcs_len(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `2 * LCS / (|a| + |b|)`, in `[0, 1]`.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(a, b)) as f64 / total as f64
}

/// Threshold comparison with an inclusive boundary.
#[must_use]
pub fn meets_threshold(score: f64, threshold: f64) -> bool {
    score + SCORE_EPSILON >= threshold
}

/// True when `short` appears inside `long` on word boundaries and the two differ.
#[must_use]
pub fn contains_as_words(long: &str, short: &str) -> bool {
    if short.is_empty() || long.len() <= short.len() {
        return false;
    }
    format!(" {long} ").contains(&format!(" {short} "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_titles() {
        assert_eq!(normalize_name("President Joe Biden"), "joe biden");
        assert_eq!(normalize_name("Former President Obama"), "obama");
        assert_eq!(normalize_name("Dr. Jane Goodall"), "jane goodall");
        assert_eq!(normalize_name("CEO Tim Cook"), "tim cook");
    }

    #[test]
    fn test_normalize_for_only_strips_people() {
        assert_eq!(normalize_for("General Motors", &EntityType::Org), "general motors");
        assert_eq!(normalize_for("General Mark Milley", &EntityType::Person), "mark milley");
    }

    #[test]
    fn test_normalize_keeps_bare_title() {
        assert_eq!(normalize_name("President"), "president");
    }

    #[test]
    fn test_normalize_expands_abbreviations() {
        assert_eq!(normalize_name("US"), "united states");
        assert_eq!(normalize_name("U.S."), "united states");
        assert_eq!(normalize_name("Acme Corp."), "acme corporation");
        assert_eq!(normalize_name("AT&T"), "at and t");
    }

    #[test]
    fn test_normalize_possessive_and_spacing() {
        assert_eq!(normalize_name("  Musk's "), "musk");
        assert_eq!(normalize_name("Space-X"), "space x");
    }

    #[test]
    fn test_strip_display_titles_keeps_case() {
        assert_eq!(strip_display_titles("President Joe Biden"), "Joe Biden");
        assert_eq!(strip_display_titles("Senator"), "Senator");
        assert_eq!(strip_display_titles("Elon Musk"), "Elon Musk");
        assert!(has_leading_title("Dr. Who"));
        assert!(!has_leading_title("Who"));
    }

    #[test]
    fn test_lcs_len() {
        assert_eq!(lcs_len("", ""), 0);
        assert_eq!(lcs_len("abc", ""), 0);
        assert_eq!(lcs_len("abc", "abc"), 3);
        assert_eq!(lcs_len("sacks", "sachs"), 4);
        assert_eq!(lcs_len("abcbdab", "bdcaba"), 4);
    }

    #[test]
    fn test_similarity_ratio() {
        assert!((similarity("sacks", "sachs") - 0.8).abs() < f64::EPSILON);
        assert!((similarity("same", "same") - 1.0).abs() < f64::EPSILON);
        assert!(similarity("jones", "james") < 0.8);
        assert!((similarity("", "") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_threshold_boundary() {
        assert!(meets_threshold(0.80, 0.80));
        assert!(meets_threshold(similarity("sacks", "sachs"), 0.80));
        assert!(!meets_threshold(0.79, 0.80));
    }

    #[test]
    fn test_contains_as_words() {
        assert!(contains_as_words("donald trump", "trump"));
        assert!(!contains_as_words("donald trump", "don"));
        assert!(!contains_as_words("trump", "trump"));
        assert!(!contains_as_words("trump", ""));
    }
}
