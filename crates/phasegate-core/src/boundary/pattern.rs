//! Resource pattern matching: exact, wildcard suffix and catch-all.

use serde::{Deserialize, Serialize};

/// A pattern over resource identifiers.
///
/// Parsed from strings: `"*"` is [`ResourcePattern::Any`], a trailing `*`
/// (`"tests/*"`) is a [`ResourcePattern::Prefix`], anything else is exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourcePattern {
    Any,
    Exact(String),
    Prefix(String),
}

impl ResourcePattern {
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim();
        if pattern == "*" {
            ResourcePattern::Any
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            ResourcePattern::Prefix(prefix.to_string())
        } else {
            ResourcePattern::Exact(pattern.to_string())
        }
    }

    /// `Prefix("tests/")` matches `tests/unit` and the bare directory `tests`.
    pub fn matches(&self, resource: &str) -> bool {
        match self {
            ResourcePattern::Any => true,
            ResourcePattern::Exact(exact) => exact == resource,
            ResourcePattern::Prefix(prefix) => {
                resource.starts_with(prefix.as_str())
                    || (prefix.ends_with('/') && resource == prefix.trim_end_matches('/'))
            }
        }
    }
}

impl From<String> for ResourcePattern {
    fn from(value: String) -> Self {
        ResourcePattern::parse(&value)
    }
}

impl From<&str> for ResourcePattern {
    fn from(value: &str) -> Self {
        ResourcePattern::parse(value)
    }
}

impl From<ResourcePattern> for String {
    fn from(value: ResourcePattern) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourcePattern::Any => write!(f, "*"),
            ResourcePattern::Exact(exact) => write!(f, "{exact}"),
            ResourcePattern::Prefix(prefix) => write!(f, "{prefix}*"),
        }
    }
}

/// Parse a list of pattern strings.
pub fn patterns(items: &[&str]) -> Vec<ResourcePattern> {
    items.iter().map(|p| ResourcePattern::parse(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(ResourcePattern::parse("*"), ResourcePattern::Any);
        assert_eq!(
            ResourcePattern::parse("tests/*"),
            ResourcePattern::Prefix("tests/".into())
        );
        assert_eq!(
            ResourcePattern::parse("specifications"),
            ResourcePattern::Exact("specifications".into())
        );
    }

    #[test]
    fn test_exact_match() {
        let p = ResourcePattern::parse("specifications");
        assert!(p.matches("specifications"));
        assert!(!p.matches("specifications/acceptance"));
        assert!(!p.matches("spec"));
    }

    #[test]
    fn test_prefix_match() {
        let p = ResourcePattern::parse("tests/*");
        assert!(p.matches("tests/unit/parser"));
        assert!(p.matches("tests"));
        assert!(!p.matches("testsuite"));
        assert!(!p.matches("src/tests"));

        let bare = ResourcePattern::parse("spec*");
        assert!(bare.matches("specifications"));
        assert!(!bare.matches("src"));
    }

    #[test]
    fn test_any_match() {
        assert!(ResourcePattern::Any.matches(""));
        assert!(ResourcePattern::Any.matches("anything/at/all"));
    }

    #[test]
    fn test_serde_as_string() {
        let list = patterns(&["*", "src/*", "constitution"]);
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, r#"["*","src/*","constitution"]"#);
        let back: Vec<ResourcePattern> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }
}
