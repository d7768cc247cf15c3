//! Placeholder extraction and substitution
//!
//! Scripts carry named holes written as `{{ name }}`. Whitespace just inside
//! the markers is ignored, names are case-sensitive, and a name must contain
//! at least one non-whitespace character and no brace characters. Anything
//! that does not fit that grammar (`{{ }}`, `{{}}`, an open marker with no
//! close, an open marker followed by another open marker) stays literal text.
//!
//! Substitution is a single textual pass: replacement values are inserted
//! verbatim and never scanned for further placeholders.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

/// Placeholder name to replacement text
pub type Substitutions = HashMap<String, String>;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}\s](?:[^{}]*[^{}\s])?)\s*\}\}").expect("placeholder pattern is valid")
});

/// Placeholder names in order of first appearance, without duplicates
pub fn extract(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let names: Vec<String> = PLACEHOLDER_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect();
    debug!(count = names.len(), "extract: found placeholders");
    names
}

/// Replace every placeholder that has an entry in `values`
///
/// Tokens without an entry are left exactly as written.
pub fn substitute(text: &str, values: &Substitutions) -> String {
    debug!(value_count = values.len(), "substitute: called");
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Placeholders in `text` that `values` does not resolve, in prompting order
pub fn unresolved(text: &str, values: &Substitutions) -> Vec<String> {
    extract(text)
        .into_iter()
        .filter(|name| !values.contains_key(name))
        .collect()
}
