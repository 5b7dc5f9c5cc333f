/// Normalizes a subscription tag for label comparison.
///
/// Tags are written URL-style in subscriptions (`good+first+issue`), while
/// trackers report the decoded label (`Good First Issue`).
pub fn normalize_tag(tag: &str) -> String {
    tag.to_lowercase().replace('+', " ")
}

pub fn is_origin_tag(label: &str, normalized_tag: &str) -> bool {
    label.to_lowercase() == normalized_tag
}

/// Drops every label matching the tag the tickets were selected with.
pub fn without_tag<I, S>(labels: I, tag: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let normalized = normalize_tag(tag);
    labels
        .into_iter()
        .map(Into::into)
        .filter(|label| !is_origin_tag(label, &normalized))
        .collect()
}

pub fn truncate_str(value: &str, limit: usize) -> String {
    if value.is_empty() {
        return String::new();
    }
    let mut truncated: String = value.chars().take(limit).collect();
    if truncated.len() < value.len() {
        truncated.push('…');
    }
    truncated
}
