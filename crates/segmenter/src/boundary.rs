//! Sentence-boundary scanning: finds the next point in a buffered rune
//! slice that ends a complete sentence, or a forced break once the
//! buffer has grown past `max_length` without one.

use crate::Language;

const PREFIX_ABBREVIATIONS: &[&str] = &[
    "Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Sr.", "Jr.", "Rev.", "St.",
];

const OTHER_ABBREVIATIONS: &[&str] = &[
    "etc.", "e.g.", "i.e.", "Inc.", "Ltd.", "a.m.", "p.m.", "U.S.", "U.K.",
];

const SOFT_PUNCTUATION: &[char] = &[',', '，', ':', '：', '、'];

const URL_TLDS: &[&str] = &[".com", ".org", ".net", ".io", ".ai", ".cn", ".jp"];

fn sentence_enders(language: Language) -> &'static [char] {
    const EN: &[char] = &['.', '!', '?', ';', ':'];
    const ZH: &[char] = &['.', '!', '?', ';', ':', '。', '！', '？', '；', '…'];
    const JA: &[char] = &['.', '!', '?', ';', ':', '。', '！', '？', '．'];
    const AUTO: &[char] = &['.', '!', '?', ';', ':', '。', '！', '？', '；', '…', '．'];
    match language {
        Language::En => EN,
        Language::Zh => ZH,
        Language::Ja => JA,
        Language::Auto => AUTO,
    }
}

fn is_sentence_ender(c: char, language: Language) -> bool {
    sentence_enders(language).contains(&c)
}

/// A point at which `chars[..index]` is a complete, emittable sentence.
/// `forced` is true when the break was produced by the max-length
/// fallback rather than a real sentence ender.
pub struct Boundary {
    pub index: usize,
    pub forced: bool,
}

fn word_start(chars: &[char], before: usize) -> usize {
    let mut start = before;
    while start > 0 && !chars[start - 1].is_whitespace() {
        start -= 1;
    }
    start
}

fn ends_with_word(chars: &[char], end: usize, word: &str) -> bool {
    let word_chars: Vec<char> = word.chars().collect();
    if end < word_chars.len() {
        return false;
    }
    let start = end - word_chars.len();
    let candidate: String = chars[start..end].iter().collect();
    if !candidate.eq_ignore_ascii_case(word) {
        return false;
    }
    start == 0 || chars[start - 1].is_whitespace()
}

fn first_non_ws_after(chars: &[char], from: usize) -> Option<char> {
    chars[from..].iter().copied().find(|c| !c.is_whitespace())
}

fn suffix_looks_like_new_sentence(chars: &[char], after: usize) -> bool {
    matches!(first_non_ws_after(chars, after), Some(c) if c.is_uppercase())
}

fn looks_like_url_or_email(chars: &[char], period_at: usize) -> bool {
    let start = word_start(chars, period_at);
    let before: String = chars[start..period_at].iter().collect();
    let lower = before.to_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("www.")
        || before.contains('@')
        || URL_TLDS.iter().any(|tld| lower.ends_with(tld))
}

fn is_special_period(chars: &[char], i: usize) -> bool {
    for abbr in PREFIX_ABBREVIATIONS {
        if ends_with_word(chars, i + 1, abbr) {
            return true;
        }
    }
    for abbr in OTHER_ABBREVIATIONS {
        if ends_with_word(chars, i + 1, abbr) {
            return !suffix_looks_like_new_sentence(chars, i + 1);
        }
    }
    if i > 0 && chars[i - 1].is_ascii_digit() {
        return !suffix_looks_like_new_sentence(chars, i + 1);
    }
    if looks_like_url_or_email(chars, i) {
        return !suffix_looks_like_new_sentence(chars, i + 1);
    }
    if i + 1 < chars.len() && chars[i + 1] == '.' {
        return true;
    }
    if let Some(c) = first_non_ws_after(chars, i + 1) {
        if c.is_lowercase() {
            return true;
        }
    }
    false
}

fn find_forced_break(chars: &[char], max_length: usize, min_length: usize) -> usize {
    let window_end = max_length.min(chars.len());
    let window = &chars[..window_end];

    if let Some(pos) = window
        .iter()
        .enumerate()
        .rev()
        .find(|&(idx, c)| idx >= min_length && SOFT_PUNCTUATION.contains(c))
        .map(|(idx, _)| idx)
    {
        return pos + 1;
    }
    if let Some(pos) = window
        .iter()
        .enumerate()
        .rev()
        .find(|&(idx, c)| idx >= min_length && c.is_whitespace())
        .map(|(idx, _)| idx)
    {
        return pos;
    }
    window_end
}

/// Scans `chars` for the next complete-sentence boundary. Returns `None`
/// if the buffer doesn't yet contain one and hasn't grown past
/// `max_length` either — the caller should keep buffering.
pub fn find_boundary(
    chars: &[char],
    min_length: usize,
    max_length: usize,
    language: Language,
    smart_punctuation: bool,
) -> Option<Boundary> {
    if chars.is_empty() {
        return None;
    }
    let scan_limit = max_length.min(chars.len());
    let mut search_start = 0usize;

    while search_start < scan_limit {
        let ender_pos = (search_start..scan_limit).find(|&i| is_sentence_ender(chars[i], language));
        let Some(i) = ender_pos else { break };

        if smart_punctuation && chars[i] == '.' && is_special_period(chars, i) {
            search_start = i + 1;
            continue;
        }

        let boundary_index = i + 1;
        let trimmed_len = chars[..boundary_index]
            .iter()
            .collect::<String>()
            .trim()
            .chars()
            .count();
        if trimmed_len < min_length {
            search_start = i + 1;
            continue;
        }

        return Some(Boundary {
            index: boundary_index,
            forced: false,
        });
    }

    if chars.len() >= max_length {
        let index = find_forced_break(chars, max_length, min_length);
        return Some(Boundary { index, forced: true });
    }

    None
}
