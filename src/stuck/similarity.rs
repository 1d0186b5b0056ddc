//! Cheap textual similarity used to group near-duplicate notes.

use std::collections::HashSet;

/// Pluggable text similarity in `[0, 1]`.
pub trait TextSimilarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Jaccard similarity of normalized token sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaccardSimilarity;

impl TextSimilarity for JaccardSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a = normalize_tokens(a);
        let b = normalize_tokens(b);
        let union = a.union(&b).count();
        if union == 0 {
            return 0.0;
        }
        a.intersection(&b).count() as f64 / union as f64
    }
}

/// Lowercase, drop everything except alphanumerics and whitespace, split on whitespace.
pub fn normalize_tokens(text: &str) -> HashSet<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Greedy single-pass grouping.
///
/// Each item joins the first group whose first member is at least `threshold`
/// similar to it, or starts a new group. Groups keep input order.
pub fn group_similar<'a, T>(
    items: &'a [T],
    text: impl Fn(&T) -> &str,
    similarity: &dyn TextSimilarity,
    threshold: f64,
) -> Vec<Vec<&'a T>> {
    let mut groups: Vec<Vec<&'a T>> = Vec::new();
    for item in items {
        let content = text(item);
        match groups
            .iter_mut()
            .find(|g| similarity.similarity(text(g[0]), content) >= threshold)
        {
            Some(group) => group.push(item),
            None => groups.push(vec![item]),
        }
    }
    groups
}
