/// Generation names derived from one version tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationNames {
  version: String,
  static_name: String,
  dynamic_name: String,
}

impl GenerationNames {
  pub fn new(version: &str) -> Self {
    Self {
      version: version.to_string(),
      static_name: format!("{}-static", version),
      dynamic_name: format!("{}-dynamic", version),
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn static_name(&self) -> &str {
    &self.static_name
  }

  pub fn dynamic_name(&self) -> &str {
    &self.dynamic_name
  }

  /// True for the two generations owned by this version; everything else is stale.
  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_name || name == self.dynamic_name
  }
}
