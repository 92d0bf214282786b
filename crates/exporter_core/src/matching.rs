/// Words that carry no signal when matching a layout name against a filename.
const STOPWORDS: &[&str] = &[
    "the", "of", "for", "and", "a", "an", "to", "by", "in", "on",
];

/// Normalizes a layout display name into its matchable tokens: lower-cased
/// alphanumeric runs with common stopwords removed.
pub fn layout_tokens(layout: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in layout.chars() {
        if c.is_ascii_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens.retain(|t| !STOPWORDS.contains(&t.as_str()));
    tokens
}

/// True when every layout token appears as a substring of the normalized
/// filename (non-alphanumerics collapsed to spaces, lower-cased). The check
/// is conjunctive and order-independent.
pub fn filename_matches_layout(filename: &str, tokens: &[String]) -> bool {
    let normalized: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    tokens.iter().all(|t| normalized.contains(t.as_str()))
}
