//! Text normalization shared by domain vocabularies and the intent classifier.
//!
//! Input text and vocabulary phrases go through the same [`normalize`] pass
//! (NFKD, combining marks stripped, lowercase, punctuation folded to spaces)
//! so that "Climatização", "climatizacao" and "CLIMATIZAÇÃO" all compare equal.

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Spelled-out numbers recognized in front of a quantity unit.
const NUMBER_WORDS: &[(&str, f64)] = &[
    ("one", 1.0),
    ("two", 2.0),
    ("three", 3.0),
    ("four", 4.0),
    ("five", 5.0),
    ("six", 6.0),
    ("seven", 7.0),
    ("eight", 8.0),
    ("nine", 9.0),
    ("ten", 10.0),
    ("eleven", 11.0),
    ("twelve", 12.0),
];

/// Normalize free text into space-separated lowercase ASCII-ish tokens.
///
/// Number separators survive only between two digits (`10.5`, `10,5`, `1,000`).
pub fn normalize(input: &str) -> String {
    let folded: Vec<char> = input
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();

    let mut out = String::with_capacity(folded.len());
    for (i, &c) in folded.iter().enumerate() {
        let keep = if c.is_alphanumeric() {
            true
        } else if c == '.' || c == ',' {
            let before = i > 0 && folded[i - 1].is_ascii_digit();
            let after = folded.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            before && after
        } else {
            false
        };

        if keep {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with(' ') {
            out.push(' ');
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Split normalized text into tokens.
pub fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

/// Convert a concept name such as `CoolingUnit` into an instance key
/// (`cooling-unit`).
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !out.ends_with('-') {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else if c == '_' || c == ' ' {
            out.push('-');
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a numeric literal or a spelled-out number.
///
/// Either `.` or `,` may be the decimal separator. A separator followed by
/// exactly three digits after a leading group of one to three digits
/// (`1,000`, `12.500`, `1.000.000`) groups thousands instead. When both
/// separators appear, the last one is the decimal point (`1.234,5`).
pub fn parse_number(raw: &str) -> Option<f64> {
    if let Some((_, v)) = NUMBER_WORDS.iter().find(|(w, _)| *w == raw) {
        return Some(*v);
    }
    let Some(last) = raw.rfind(['.', ',']) else {
        return raw.parse::<f64>().ok();
    };
    let (decimal, grouping) = if raw[last..].starts_with('.') {
        ('.', ',')
    } else {
        (',', '.')
    };

    if raw.contains(grouping) {
        let int = ungroup(&raw[..last], grouping)?;
        return format!("{int}.{}", &raw[last + 1..]).parse::<f64>().ok();
    }
    if let Some(int) = ungroup(raw, decimal) {
        return int.parse::<f64>().ok();
    }
    if raw.matches(decimal).count() > 1 {
        return None;
    }
    raw.replace(decimal, ".").parse::<f64>().ok()
}

/// Strip thousands separators, or `None` unless the groups look like
/// `1,234,567`.
fn ungroup(raw: &str, separator: char) -> Option<String> {
    let mut groups = raw.split(separator);
    let lead = groups.next()?;
    if lead.is_empty() || lead.len() > 3 || lead == "0" {
        return None;
    }
    let mut out = lead.to_string();
    for group in groups {
        if group.len() != 3 {
            return None;
        }
        out.push_str(group);
    }
    Some(out)
}

/// A vocabulary phrase, stored both as written and as normalized tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    text: String,
    tokens: Vec<String>,
}

impl Phrase {
    /// Build a phrase. Returns `None` when nothing survives normalization.
    pub fn new(raw: &str) -> Option<Self> {
        let normalized = normalize(raw);
        let tokens: Vec<String> = tokens(&normalized).into_iter().map(String::from).collect();
        if tokens.is_empty() {
            return None;
        }
        Some(Self {
            text: raw.trim().to_string(),
            tokens,
        })
    }

    /// The phrase as declared.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the phrase occurs as a contiguous token run in `haystack`.
    pub fn matches(&self, haystack: &[&str]) -> bool {
        haystack
            .windows(self.tokens.len())
            .any(|w| w.iter().zip(&self.tokens).all(|(a, b)| *a == b))
    }
}

/// Compile the extraction pattern for a quantity: a number (digits or a
/// spelled-out word) followed by any of `units`.
pub fn quantity_pattern(units: &[String]) -> Result<Regex, regex::Error> {
    let words: Vec<&str> = NUMBER_WORDS.iter().map(|(w, _)| *w).collect();
    let mut alternatives: Vec<String> = units
        .iter()
        .map(|u| normalize(u))
        .filter(|u| !u.is_empty())
        .map(|u| {
            u.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect();
    // Longest first so "cooling units" is not shadowed by "cooling unit".
    alternatives.sort_by_key(|a| std::cmp::Reverse(a.len()));

    Regex::new(&format!(
        r"\b(\d+(?:[.,]\d+)*|{})\s*(?:{})\b",
        words.join("|"),
        alternatives.join("|")
    ))
}

/// Find the first quantity matched by `pattern` in normalized text.
pub fn extract_quantity(pattern: &Regex, normalized: &str) -> Option<(f64, String)> {
    let caps = pattern.captures(normalized)?;
    let whole = caps.get(0)?.as_str().to_string();
    let value = parse_number(caps.get(1)?.as_str())?;
    Some((value, whole))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_accents_and_case() {
        assert_eq!(normalize("Climatização CENTRAL!"), "climatizacao central");
        assert_eq!(normalize("  a--b  "), "a b");
    }

    #[test]
    fn normalize_keeps_decimal_separators_between_digits() {
        assert_eq!(normalize("10.5m² room."), "10.5m2 room");
        assert_eq!(normalize("area 10,5"), "area 10,5");
        assert_eq!(normalize("rooms, halls"), "rooms halls");
    }

    #[test]
    fn phrase_matches_contiguous_tokens_only() {
        let phrase = Phrase::new("Server Room").unwrap();
        let text = normalize("a small server room upstairs");
        assert!(phrase.matches(&tokens(&text)));

        let text = normalize("the room hosts a server");
        assert!(!phrase.matches(&tokens(&text)));
    }

    #[test]
    fn phrase_does_not_match_substrings() {
        let phrase = Phrase::new("ac").unwrap();
        let text = normalize("vacuum cleaner");
        assert!(!phrase.matches(&tokens(&text)));
    }

    #[test]
    fn empty_phrase_rejected() {
        assert!(Phrase::new("  ?! ").is_none());
    }

    #[test]
    fn kebab_case_concepts() {
        assert_eq!(kebab_case("CoolingUnit"), "cooling-unit");
        assert_eq!(kebab_case("Room"), "room");
        assert_eq!(kebab_case("hvac_system"), "hvac-system");
    }

    #[test]
    fn quantity_pattern_reads_digits_and_words() {
        let units = vec!["cooling unit".to_string(), "cooling units".to_string()];
        let pattern = quantity_pattern(&units).unwrap();

        let text = normalize("small closet with one cooling unit");
        assert_eq!(extract_quantity(&pattern, &text).map(|q| q.0), Some(1.0));

        let text = normalize("3 cooling units installed");
        assert_eq!(extract_quantity(&pattern, &text).map(|q| q.0), Some(3.0));
    }

    #[test]
    fn quantity_pattern_accepts_glued_units() {
        let pattern = quantity_pattern(&["m2".to_string()]).unwrap();
        let text = normalize("a 10m² closet");
        assert_eq!(extract_quantity(&pattern, &text).map(|q| q.0), Some(10.0));

        let text = normalize("a 12,5 m2 closet");
        assert_eq!(extract_quantity(&pattern, &text).map(|q| q.0), Some(12.5));
    }

    #[test]
    fn thousands_separators_group_digits() {
        let pattern = quantity_pattern(&["m2".to_string()]).unwrap();
        for raw in ["a 1,000 m2 warehouse", "a 1.000 m2 warehouse", "a 1000 m2 warehouse"] {
            let q = extract_quantity(&pattern, &normalize(raw)).unwrap();
            assert_eq!(q.0, 1000.0, "{raw}");
        }
        let q = extract_quantity(&pattern, &normalize("site of 1.250.000 m2")).unwrap();
        assert_eq!(q.0, 1_250_000.0);
    }

    #[test]
    fn parse_number_separators() {
        assert_eq!(parse_number("10,5"), Some(10.5));
        assert_eq!(parse_number("0,500"), Some(0.5));
        assert_eq!(parse_number("1234.5"), Some(1234.5));
        assert_eq!(parse_number("12,500"), Some(12500.0));
        assert_eq!(parse_number("1.234,5"), Some(1234.5));
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("1.2.3"), None);
        assert_eq!(parse_number("twelve"), Some(12.0));
    }
}
