//! Token-overlap helpers shared by the embedder and inheritance.
//!
//! These are deliberately simple monotonic overlap measures; richer
//! similarity plugs in through [`super::inheritance::TextSimilarity`].

use std::collections::BTreeSet;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "are", "was", "all", "any",
    "not", "but", "its", "our", "use", "per",
];

/// Lowercased alphanumeric tokens of length >= 3, minus stopwords.
pub fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Lowercased, trimmed tag set.
pub fn tag_set<S: AsRef<str>>(tags: &[S]) -> BTreeSet<String> {
    tags.iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// |a ∩ b| / |a ∪ b|; 0 when both are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

pub fn overlaps(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    a.intersection(b).next().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_filter_short_and_stopwords() {
        let t = tokens("The parser, for JSON input: a b cd");
        assert!(t.contains("parser"));
        assert!(t.contains("json"));
        assert!(t.contains("input"));
        assert!(!t.contains("the"));
        assert!(!t.contains("for"));
        assert!(!t.contains("cd"));
    }

    #[test]
    fn test_jaccard() {
        let a = tag_set(&["api", "auth"]);
        let b = tag_set(&["AUTH", "db"]);
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
        assert_eq!(jaccard(&a, &a), 1.0);
    }

    #[test]
    fn test_overlaps() {
        assert!(overlaps(&tag_set(&["x", "y"]), &tag_set(&["y"])));
        assert!(!overlaps(&tag_set(&["x"]), &tag_set(&["z"])));
    }
}
