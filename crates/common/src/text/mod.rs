//! Text normalization shared by indexing and the local embedding provider

/// Collapse every whitespace run to a single space and trim both ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased word tokens of at least two characters.
///
/// A token is a maximal run of alphanumeric characters, so accented letters
/// stay inside their word ("ouvrés") while apostrophes and hyphens split
/// ("doit-on" gives "doit" and "on").
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}
