use serde::Deserialize;

use crate::error::CoreError;

fn default_style_helpers() -> Vec<String> {
  vec!["css".to_string()]
}

fn default_true() -> bool {
  true
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CssInJsCoreConfig {
  /// Prepended to every class group hash. Keeps class names apart when several
  /// builds share a page.
  #[serde(default)]
  pub class_hash_prefix: Option<String>,
  /// Callees whose calls and tagged templates evaluate to their style argument.
  #[serde(default = "default_style_helpers")]
  pub style_helpers: Vec<String>,
  /// Split `a, b { ... }` into one atomic rule per selector.
  #[serde(default = "default_true")]
  pub flatten_multiple_selectors: bool,
  /// Sort `@media` rules by `min-width` when rendering the sheet.
  #[serde(default = "default_true")]
  pub sort_at_rules: bool,
  /// Append `px` to numeric values of properties that take a length.
  #[serde(default = "default_true")]
  pub add_units: bool,
}

impl Default for CssInJsCoreConfig {
  fn default() -> Self {
    CssInJsCoreConfig {
      class_hash_prefix: None,
      style_helpers: default_style_helpers(),
      flatten_multiple_selectors: true,
      sort_at_rules: true,
      add_units: true,
    }
  }
}

impl CssInJsCoreConfig {
  pub fn from_json(json: &str) -> Result<Self, CoreError> {
    let config: CssInJsCoreConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), CoreError> {
    match &self.class_hash_prefix {
      Some(prefix) if !is_css_identifier(prefix) => Err(CoreError::InvalidClassHashPrefix {
        prefix: prefix.clone(),
      }),
      _ => Ok(()),
    }
  }

  pub fn is_style_helper(&self, name: &str) -> bool {
    self.style_helpers.iter().any(|helper| helper == name)
  }
}

fn is_css_identifier(value: &str) -> bool {
  let mut chars = value.chars();
  match chars.next() {
    Some(first) if first.is_ascii_alphabetic() || first == '-' || first == '_' => {
      chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    }
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn empty_json_uses_defaults() {
    assert_eq!(
      CssInJsCoreConfig::from_json("{}").unwrap(),
      CssInJsCoreConfig::default()
    );
  }

  #[test]
  fn reads_camel_case_fields() {
    let config = CssInJsCoreConfig::from_json(
      r#"{ "classHashPrefix": "app", "styleHelpers": ["css", "xcss"], "sortAtRules": false }"#,
    )
    .unwrap();

    assert_eq!(config.class_hash_prefix.as_deref(), Some("app"));
    assert!(config.is_style_helper("xcss"));
    assert!(!config.sort_at_rules);
    assert!(config.add_units);
  }

  #[test]
  fn rejects_invalid_class_hash_prefix() {
    assert!(matches!(
      CssInJsCoreConfig::from_json(r#"{ "classHashPrefix": "1abc" }"#),
      Err(CoreError::InvalidClassHashPrefix { .. })
    ));
  }

  #[test]
  fn rejects_malformed_json() {
    assert!(matches!(
      CssInJsCoreConfig::from_json("{ classHashPrefix: }"),
      Err(CoreError::Config(_))
    ));
  }
}
