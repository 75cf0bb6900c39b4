//! Artifact ID generation
//!
//! All IDs use the format: `{6-char-hex}-{kind}-{slug}`
//! Example: `f3a9c1-story-checkout-flow`

/// Generate an artifact ID from kind and title
///
/// The hex prefix comes from the random tail of a UUIDv7, not its
/// timestamp bits, so same-kind same-title records minted in the same
/// run still get distinct ids.
pub fn generate_id(kind: &str, title: &str) -> String {
    let hex = uuid::Uuid::now_v7().simple().to_string();
    let prefix = &hex[hex.len() - 6..];
    let slug = slugify(title);
    format!("{}-{}-{}", prefix, kind, slug)
}

/// Slugify a title for use in IDs
fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        // Strip apostrophes entirely, replace other non-alphanumeric with hyphens
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(50)
        .collect()
}
