//! Selection grouping: sparse selected indices → ordered contiguous groups.
//! Two selected indices belong to the same group when every token strictly
//! between them is non-content (no letter/number) and none holds a newline.

use std::collections::BTreeSet;

use crate::keys::SpanKey;

/// Sentence terminators used by `sentence_context`.
const SENTENCE_END: &[char] = &['.', '!', '?', '。', '！', '？'];

/// Whether a token carries content (any Unicode letter or number).
pub fn is_content(token: &str) -> bool {
    token.chars().any(char::is_alphanumeric)
}

/// Whether a token may sit inside a group without being selected.
pub fn is_bridge(token: &str) -> bool {
    !is_content(token) && !token.contains('\n')
}

/// Group selected indices into maximal bridgeable runs.
/// Indices past the end of `tokens` are ignored.
pub fn group<'a, I>(indices: I, tokens: &[String]) -> Vec<Vec<usize>>
where
    I: IntoIterator<Item = &'a usize>,
{
    let sorted: BTreeSet<usize> = indices
        .into_iter()
        .copied()
        .filter(|&i| i < tokens.len())
        .collect();

    let mut groups: Vec<Vec<usize>> = Vec::new();
    for idx in sorted {
        match groups.last_mut() {
            Some(current) => {
                // Non-empty by construction.
                let prev = current[current.len() - 1];
                if tokens[prev + 1..idx].iter().all(|t| is_bridge(t)) {
                    current.push(idx);
                } else {
                    groups.push(vec![idx]);
                }
            }
            None => groups.push(vec![idx]),
        }
    }
    groups
}

/// Literal text covered by a span.
pub fn span_text(tokens: &[String], key: SpanKey) -> String {
    let end = key.end.min(tokens.len().saturating_sub(1));
    if key.start > end || tokens.is_empty() {
        return String::new();
    }
    tokens[key.start..=end].concat()
}

fn ends_sentence(token: &str) -> bool {
    token.contains('\n') || token.trim_end().ends_with(SENTENCE_END)
}

/// Text of the sentence enclosing `key`, used as translation context.
pub fn sentence_context(tokens: &[String], key: SpanKey) -> String {
    if tokens.is_empty() || key.start >= tokens.len() {
        return String::new();
    }
    let end_bound = key.end.min(tokens.len() - 1);

    let mut start = key.start;
    while start > 0 && !ends_sentence(&tokens[start - 1]) {
        start -= 1;
    }

    let mut end = end_bound;
    while end + 1 < tokens.len() && !ends_sentence(&tokens[end]) {
        end += 1;
    }

    tokens[start..=end].concat().trim().to_string()
}
