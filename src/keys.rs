//! Composite keys used by the engine's maps.
//! Group key: "{start}-{end}". Cache key: "{normalized_text}_{target_lang}".
//! Every producer and matcher goes through this module.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

/// Inclusive range of global token indices identifying one translated group.
/// Ordered by (start, end), so a `BTreeMap<SpanKey, _>` scans by start index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpanKey {
    pub start: usize,
    pub end: usize,
}

impl SpanKey {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start must not exceed end");
        Self { start, end }
    }

    /// Key of an ascending, non-empty index group.
    pub fn from_group(group: &[usize]) -> Option<Self> {
        Some(Self::new(*group.first()?, *group.last()?))
    }

    /// `other` lies entirely inside `self` (equal spans included).
    pub fn contains(&self, other: &SpanKey) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// `other` lies inside `self` and the two keys differ.
    pub fn strictly_contains(&self, other: &SpanKey) -> bool {
        self != other && self.contains(other)
    }

    pub fn overlaps(&self, other: &SpanKey) -> bool {
        self.start.max(other.start) <= self.end.min(other.end)
    }
}

impl fmt::Display for SpanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSpanKeyError(String);

impl fmt::Display for ParseSpanKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid span key: {:?}", self.0)
    }
}

impl std::error::Error for ParseSpanKeyError {}

impl FromStr for SpanKey {
    type Err = ParseSpanKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSpanKeyError(s.to_string());
        let (start, end) = s.split_once('-').ok_or_else(err)?;
        let start: usize = start.parse().map_err(|_| err())?;
        let end: usize = end.parse().map_err(|_| err())?;
        if start > end {
            return Err(err());
        }
        Ok(Self { start, end })
    }
}

fn whitespace_run() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Trim and collapse every whitespace run to a single space.
pub fn normalize_text(text: &str) -> String {
    whitespace_run().replace_all(text.trim(), " ").into_owned()
}

/// Content-addressed cache key for a (text, target language) pair.
pub fn cache_key(text: &str, target_lang: &str) -> String {
    format!("{}_{}", normalize_text(text), target_lang)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_key_display_and_parse_agree() {
        let key = SpanKey::new(3, 17);
        assert_eq!(key.to_string(), "3-17");
        assert_eq!("3-17".parse::<SpanKey>().unwrap(), key);
    }

    #[test]
    fn span_key_rejects_malformed() {
        assert!("".parse::<SpanKey>().is_err());
        assert!("4".parse::<SpanKey>().is_err());
        assert!("a-b".parse::<SpanKey>().is_err());
        assert!("5-2".parse::<SpanKey>().is_err());
        assert!("-1-2".parse::<SpanKey>().is_err());
    }

    #[test]
    fn containment_and_overlap() {
        let outer = SpanKey::new(1, 4);
        let inner = SpanKey::new(2, 3);
        assert!(outer.contains(&inner));
        assert!(outer.strictly_contains(&inner));
        assert!(!outer.strictly_contains(&outer));
        assert!(outer.overlaps(&SpanKey::new(4, 9)));
        assert!(!outer.overlaps(&SpanKey::new(5, 9)));
    }

    #[test]
    fn cache_key_normalizes_whitespace() {
        assert_eq!(cache_key("  The \n cat ", "es"), "The cat_es");
        assert_eq!(cache_key("hola", "en"), "hola_en");
    }
}
