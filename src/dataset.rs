//! Schema of the bundled line/station dataset.
//!
//! The worker never interprets the dataset; these types exist so the offline
//! default payload is built from the same shape the page expects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
  pub regions: BTreeMap<String, Region>,
  #[serde(default)]
  pub message_templates: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
  pub name: String,
  pub lines: BTreeMap<String, Line>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
  pub name: String,
  pub operator: String,
  pub phone: String,
  pub color: String,
  pub icon: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl Dataset {
  /// Single-region, single-line dataset served when the real one is unreachable.
  pub fn offline_default() -> Self {
    let mut lines = BTreeMap::new();
    lines.insert(
      "1".to_string(),
      Line {
        name: "1호선".to_string(),
        operator: "한국철도공사".to_string(),
        phone: "1544-7788".to_string(),
        color: "#0052a4".to_string(),
        icon: "🚇".to_string(),
        description: None,
      },
    );

    let mut regions = BTreeMap::new();
    regions.insert(
      "seoul".to_string(),
      Region {
        name: "서울특별시".to_string(),
        lines,
      },
    );

    let mut message_templates = BTreeMap::new();
    message_templates.insert("default".to_string(), "[{line}] 고장 신고합니다.".to_string());

    Self {
      regions,
      message_templates,
    }
  }
}
