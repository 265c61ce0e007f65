//! Predicates deciding which fetched responses are kept in the dynamic generation.

use serde::{Deserialize, Serialize};

/// One dynamic-cache predicate over the full request URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicCacheRule {
  /// URL ends with `.<ext>` (query strings are part of the URL, so
  /// `app.js?v=2` does not match)
  Extension(String),
  /// URL starts with this prefix, e.g. `https://fonts.`
  Prefix(String),
}

impl DynamicCacheRule {
  pub fn matches(&self, url: &str) -> bool {
    match self {
      DynamicCacheRule::Extension(ext) => url
        .strip_suffix(ext.as_str())
        .is_some_and(|rest| rest.ends_with('.')),
      DynamicCacheRule::Prefix(prefix) => url.starts_with(prefix.as_str()),
    }
  }

  /// Scripts, styles, documents and JSON, plus font and CDN hosts.
  pub fn defaults() -> Vec<Self> {
    vec![
      DynamicCacheRule::Extension("js".to_string()),
      DynamicCacheRule::Extension("css".to_string()),
      DynamicCacheRule::Extension("html".to_string()),
      DynamicCacheRule::Extension("json".to_string()),
      DynamicCacheRule::Prefix("https://fonts.".to_string()),
      DynamicCacheRule::Prefix("https://cdn.".to_string()),
    ]
  }
}

/// True if any rule matches `url`.
pub fn is_cacheable(url: &str, rules: &[DynamicCacheRule]) -> bool {
  rules.iter().any(|rule| rule.matches(url))
}
