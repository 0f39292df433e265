use std::ops::Range;

/// Words that end in a period without ending a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "mt", "gen", "col", "capt", "lt", "sgt",
    "sen", "rep", "gov", "rev", "vs", "etc", "inc", "corp", "ltd", "co", "no", "u.s", "u.k",
    "e.g", "i.e", "jan", "feb", "mar", "apr", "aug", "sept", "oct", "nov", "dec",
];

/// A slice of the document text and the byte offset at which it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub offset: usize,
    pub text: &'a str,
}

/// Byte ranges of the sentences of `text`, trimmed of surrounding whitespace.
#[must_use]
pub fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let mut end = idx + c.len_utf8();
        // Closing quotes and repeated terminators belong to the sentence.
        while let Some(&(next_idx, next)) = chars.peek() {
            if matches!(next, '.' | '!' | '?' | '"' | '\'' | ')' | '\u{201d}' | '\u{2019}') {
                end = next_idx + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if chars.peek().is_some_and(|&(_, next)| !next.is_whitespace()) {
            continue;
        }
        if c == '.' && ends_with_abbreviation(&text[start..idx]) {
            continue;
        }
        push_trimmed(text, start..end, &mut spans);
        start = end;
    }
    push_trimmed(text, start..text.len(), &mut spans);
    spans
}

fn push_trimmed(text: &str, range: Range<usize>, spans: &mut Vec<Range<usize>>) {
    let slice = &text[range.clone()];
    let lead = slice.len() - slice.trim_start().len();
    let trail = slice.len() - slice.trim_end().len();
    let (start, end) = (range.start + lead, range.end - trail);
    if start < end {
        spans.push(start..end);
    }
}

fn ends_with_abbreviation(before: &str) -> bool {
    let Some(word) = before.split_whitespace().last() else {
        return false;
    };
    let word = word.trim_start_matches(|c: char| !c.is_alphanumeric());
    let lower = word.to_lowercase();
    if ABBREVIATIONS.contains(&lower.as_str()) {
        return true;
    }
    // Initials such as "J." in "J. Smith".
    let mut chars = word.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_uppercase())
}

/// Groups whole sentences into chunks of at most `max_chars` characters.
/// A sentence longer than the limit is split at whitespace; a single word
/// longer than the limit is split at a character boundary.
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<Chunk<'_>> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![Chunk { offset: 0, text }]
        };
    }

    let mut pieces = Vec::new();
    for sentence in sentence_spans(text) {
        let len = text[sentence.clone()].chars().count();
        if len <= max_chars {
            pieces.push(sentence);
        } else {
            tracing::debug!(
                rule = "oversize_sentence",
                chars = len,
                max = max_chars,
                "Splitting sentence at whitespace"
            );
            pieces.extend(split_long(text, sentence, max_chars));
        }
    }

    pack(text, pieces, max_chars)
        .into_iter()
        .map(|range| Chunk {
            offset: range.start,
            text: &text[range],
        })
        .collect()
}

/// Greedily joins adjacent ranges while the covered text stays within
/// `max_chars` characters.
fn pack(
    text: &str,
    pieces: impl IntoIterator<Item = Range<usize>>,
    max_chars: usize,
) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut current: Option<Range<usize>> = None;
    for piece in pieces {
        current = match current {
            Some(range) if text[range.start..piece.end].chars().count() <= max_chars => {
                Some(range.start..piece.end)
            }
            Some(range) => {
                out.push(range);
                Some(piece)
            }
            None => Some(piece),
        };
    }
    out.extend(current);
    out
}

fn split_long(text: &str, range: Range<usize>, max_chars: usize) -> Vec<Range<usize>> {
    let mut words = Vec::new();
    let mut word_start = None;
    for (rel, c) in text[range.clone()].char_indices() {
        let idx = range.start + rel;
        if c.is_whitespace() {
            if let Some(start) = word_start.take() {
                words.push(start..idx);
            }
        } else if word_start.is_none() {
            word_start = Some(idx);
        }
    }
    if let Some(start) = word_start {
        words.push(start..range.end);
    }

    let pieces = words
        .into_iter()
        .flat_map(|word| hard_split(text, word, max_chars));
    pack(text, pieces, max_chars)
}

fn hard_split(text: &str, word: Range<usize>, max_chars: usize) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = word.start;
    for (n, (rel, _)) in text[word.clone()].char_indices().enumerate() {
        if n > 0 && n % max_chars == 0 {
            out.push(start..word.start + rel);
            start = word.start + rel;
        }
    }
    out.push(start..word.end);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(text: &str) -> Vec<&str> {
        sentence_spans(text).into_iter().map(|r| &text[r]).collect()
    }

    #[test]
    fn test_sentence_spans_basic() {
        assert_eq!(
            sentences("Elon Musk founded SpaceX. Everyone knows Musk!  Really?"),
            vec!["Elon Musk founded SpaceX.", "Everyone knows Musk!", "Really?"]
        );
    }

    #[test]
    fn test_sentence_spans_abbreviations() {
        assert_eq!(
            sentences("Dr. Jane Goodall met Mr. Smith in the U.S. today. Then she left."),
            vec![
                "Dr. Jane Goodall met Mr. Smith in the U.S. today.",
                "Then she left."
            ]
        );
        assert_eq!(sentences("J. Smith spoke. He left."), vec!["J. Smith spoke.", "He left."]);
        assert_eq!(sentences("Pi is 3.14 roughly"), vec!["Pi is 3.14 roughly"]);
    }

    #[test]
    fn test_sentence_spans_quotes() {
        assert_eq!(
            sentences("He said \"stop.\" Then left."),
            vec!["He said \"stop.\"", "Then left."]
        );
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("Short text.", 800);
        assert_eq!(chunks, vec![Chunk { offset: 0, text: "Short text." }]);
        assert!(chunk_text("   ", 800).is_empty());
    }

    #[test]
    fn test_chunks_respect_sentence_boundaries() {
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota.";
        let chunks = chunk_text(text, 40);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Alpha beta gamma. Delta epsilon zeta.");
        assert_eq!(chunks[1].text, "Eta theta iota.");
        for chunk in &chunks {
            assert_eq!(&text[chunk.offset..chunk.offset + chunk.text.len()], chunk.text);
            assert!(chunk.text.chars().count() <= 40);
        }
    }

    #[test]
    fn test_oversize_sentence_split_at_whitespace() {
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunk_text(text, 12);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 12, "{:?}", chunk.text);
            assert!(!chunk.text.starts_with(' '));
            assert_eq!(&text[chunk.offset..chunk.offset + chunk.text.len()], chunk.text);
        }
        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.text.split(' ')).collect();
        assert_eq!(rejoined.join(" "), text);
    }
}
