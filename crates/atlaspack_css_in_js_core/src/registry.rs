use std::cmp::Ordering;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;

use crate::config::CssInJsCoreConfig;
use crate::error::CoreError;

/// Pseudo classes in the order their rules must appear so later states win.
pub const STYLE_ORDER: [&str; 7] = [
  ":link",
  ":visited",
  ":focus-within",
  ":focus",
  ":focus-visible",
  ":hover",
  ":active",
];

static MEDIA_FEATURE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"\((min|max)-width:\s*(-?[\d.]+)(px|em|rem)?\s*\)").expect("valid media feature regex")
});

/// One class, one declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicRule {
  pub class_name: String,
  /// Selector with the class substituted for `&`.
  pub selector: String,
  /// At-rule wrappers, outermost first, e.g. `@media screen`.
  pub at_rules: Vec<String>,
  /// `property:value`, with `!important` when set.
  pub declaration: String,
}

impl AtomicRule {
  /// `_` plus the four character group hash. Rules sharing a group target the
  /// same property under the same selector and at-rules.
  pub fn group(&self) -> &str {
    class_group(&self.class_name)
  }

  pub fn css(&self) -> String {
    let mut css = format!("{}{{{}}}", self.selector, self.declaration);
    for at_rule in self.at_rules.iter().rev() {
      css = format!("{}{{{}}}", at_rule, css);
    }
    css
  }
}

pub fn class_group(class_name: &str) -> &str {
  class_name.get(..5).unwrap_or(class_name)
}

/// Deduplicated atomic rules shared by every module of a build.
#[derive(Default)]
pub struct StyleRegistry {
  rules: RwLock<IndexMap<String, AtomicRule>>,
}

impl StyleRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns `true` when the rule was not registered before. A different
  /// rule already holding the class name is an error and the registered rule
  /// is kept.
  pub fn insert(&self, rule: AtomicRule) -> Result<bool, CoreError> {
    if let Some(existing) = self.rules.read().get(&rule.class_name) {
      return check_collision(existing, &rule).map(|_| false);
    }

    let mut rules = self.rules.write();
    match rules.get(&rule.class_name) {
      Some(existing) => check_collision(existing, &rule).map(|_| false),
      None => {
        tracing::debug!(class_name = %rule.class_name, "Registered atomic rule");
        rules.insert(rule.class_name.clone(), rule);
        Ok(true)
      }
    }
  }

  /// Inserts every rule, returning how many were new. Collisions are logged
  /// and skipped.
  pub fn extend(&self, rules: impl IntoIterator<Item = AtomicRule>) -> usize {
    rules
      .into_iter()
      .filter(|rule| matches!(self.insert(rule.clone()), Ok(true)))
      .count()
  }

  pub fn merge(&self, other: &StyleRegistry) -> usize {
    let incoming = other.rules();
    self.extend(incoming)
  }

  pub fn get(&self, class_name: &str) -> Option<AtomicRule> {
    self.rules.read().get(class_name).cloned()
  }

  pub fn len(&self) -> usize {
    self.rules.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.read().is_empty()
  }

  /// Rules in insertion order.
  pub fn rules(&self) -> Vec<AtomicRule> {
    self.rules.read().values().cloned().collect()
  }

  /// Sheet entries in cascade order.
  pub fn sheet_entries(&self, config: &CssInJsCoreConfig) -> Vec<String> {
    sort_rules(self.rules(), config.sort_at_rules)
      .iter()
      .map(AtomicRule::css)
      .collect()
  }

  pub fn style_sheet(&self, config: &CssInJsCoreConfig) -> String {
    self.sheet_entries(config).join("\n")
  }
}

fn check_collision(existing: &AtomicRule, incoming: &AtomicRule) -> Result<(), CoreError> {
  if existing == incoming {
    return Ok(());
  }
  tracing::warn!(
    class_name = %incoming.class_name,
    existing = %existing.css(),
    incoming = %incoming.css(),
    "Atomic class name collision"
  );
  Err(CoreError::ClassNameCollision {
    class_name: incoming.class_name.clone(),
    existing: existing.css(),
    incoming: incoming.css(),
  })
}

/// Plain rules first, ordered by pseudo class, then rules wrapped in at-rules.
pub fn sort_rules(rules: Vec<AtomicRule>, sort_at_rules: bool) -> Vec<AtomicRule> {
  let (mut plain, mut wrapped): (Vec<_>, Vec<_>) =
    rules.into_iter().partition(|rule| rule.at_rules.is_empty());

  plain.sort_by_key(|rule| pseudo_selector_score(&rule.selector));
  wrapped.sort_by_key(|rule| pseudo_selector_score(&rule.selector));
  if sort_at_rules {
    wrapped.sort_by(|a, b| compare_at_rules(&a.at_rules, &b.at_rules));
  }

  plain.extend(wrapped);
  plain
}

fn pseudo_selector_score(selector: &str) -> usize {
  STYLE_ORDER
    .iter()
    .position(|pseudo| selector.trim().ends_with(pseudo))
    .map(|index| index + 1)
    .unwrap_or(0)
}

fn compare_at_rules(first: &[String], second: &[String]) -> Ordering {
  for (a, b) in first.iter().zip(second) {
    let ordering = compare_at_rule(a, b);
    if ordering != Ordering::Equal {
      return ordering;
    }
  }
  first.len().cmp(&second.len())
}

fn compare_at_rule(first: &str, second: &str) -> Ordering {
  let (first_name, first_query) = split_at_rule(first);
  let (second_name, second_query) = split_at_rule(second);
  first_name
    .cmp(second_name)
    .then_with(|| {
      if first_name == "@media" {
        compare_media_queries(first_query, second_query)
      } else {
        Ordering::Equal
      }
    })
    .then_with(|| first_query.cmp(second_query))
}

fn split_at_rule(at_rule: &str) -> (&str, &str) {
  at_rule.split_once(' ').unwrap_or((at_rule, ""))
}

/// Mobile first: queries without widths, then `min-width` ascending, then
/// `max-width` descending.
fn compare_media_queries(first: &str, second: &str) -> Ordering {
  let (first_tier, first_length) = media_sort_key(first);
  let (second_tier, second_length) = media_sort_key(second);
  first_tier.cmp(&second_tier).then_with(|| {
    first_length
      .partial_cmp(&second_length)
      .unwrap_or(Ordering::Equal)
  })
}

fn media_sort_key(query: &str) -> (u8, f64) {
  let Some(captures) = MEDIA_FEATURE.captures(query) else {
    return (0, 0.0);
  };
  let length = captures[2].parse::<f64>().unwrap_or(0.0);
  let length = match captures.get(3).map(|unit| unit.as_str()) {
    Some("em" | "rem") => length * 16.0,
    _ => length,
  };
  match &captures[1] {
    "min" => (1, length),
    _ => (2, -length),
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use pretty_assertions::assert_eq;

  use super::*;

  fn rule(class_name: &str, selector: &str, at_rules: &[&str], declaration: &str) -> AtomicRule {
    AtomicRule {
      class_name: class_name.to_string(),
      selector: selector.replace('&', &format!(".{}", class_name)),
      at_rules: at_rules.iter().map(|at_rule| at_rule.to_string()).collect(),
      declaration: declaration.to_string(),
    }
  }

  #[test]
  fn renders_wrapped_rules() {
    let rule = rule("_434713q2", "&", &["@media screen"], "color:blue");
    assert_eq!(rule.css(), "@media screen{._434713q2{color:blue}}");
    assert_eq!(rule.group(), "_4347");
  }

  #[test]
  fn deduplicates_by_class_name() {
    let registry = StyleRegistry::new();
    assert!(registry.insert(rule("_syaz13q2", "&", &[], "color:blue")).unwrap());
    assert!(!registry.insert(rule("_syaz13q2", "&", &[], "color:blue")).unwrap());
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn reports_different_rules_under_one_class() {
    let registry = StyleRegistry::new();
    registry.insert(rule("_syaz13q2", "&", &[], "color:blue")).unwrap();

    let collision = registry.insert(rule("_syaz13q2", "&", &[], "color:teal"));
    assert!(matches!(
      collision,
      Err(CoreError::ClassNameCollision { ref class_name, .. }) if class_name == "_syaz13q2"
    ));
    assert!(registry
      .insert(rule("_syaz13q2", "&:hover", &[], "color:blue"))
      .is_err());

    assert_eq!(registry.len(), 1);
    assert_eq!(
      registry.get("_syaz13q2").map(|rule| rule.declaration),
      Some("color:blue".into())
    );
    assert_eq!(registry.extend([rule("_syaz13q2", "&", &[], "color:red")]), 0);
  }

  #[test]
  fn orders_pseudo_classes_and_media_queries() {
    let registry = StyleRegistry::new();
    registry.insert(rule("_a", "&:active", &[], "color:red")).unwrap();
    registry.insert(rule("_b", "&:hover", &[], "color:blue")).unwrap();
    registry.insert(rule("_c", "&", &["@media (min-width:64rem)"], "color:green")).unwrap();
    registry.insert(rule("_d", "&", &["@media (min-width:30rem)"], "color:green")).unwrap();
    registry.insert(rule("_e", "&:link", &[], "color:pink")).unwrap();
    registry.insert(rule("_f", "&", &[], "color:black")).unwrap();

    assert_eq!(
      registry.sheet_entries(&CssInJsCoreConfig::default()),
      vec![
        "._f{color:black}",
        "._e:link{color:pink}",
        "._b:hover{color:blue}",
        "._a:active{color:red}",
        "@media (min-width:30rem){._d{color:green}}",
        "@media (min-width:64rem){._c{color:green}}",
      ]
    );
  }

  #[test]
  fn keeps_insertion_order_of_at_rules_when_unsorted() {
    let registry = StyleRegistry::new();
    registry.insert(rule("_c", "&", &["@media (min-width:64rem)"], "color:green")).unwrap();
    registry.insert(rule("_d", "&", &["@media (min-width:30rem)"], "color:green")).unwrap();
    assert_eq!(
      registry.sheet_entries(&CssInJsCoreConfig {
        sort_at_rules: false,
        ..CssInJsCoreConfig::default()
      }),
      vec![
        "@media (min-width:64rem){._c{color:green}}",
        "@media (min-width:30rem){._d{color:green}}",
      ]
    );
  }

  #[test]
  fn merges_registries() {
    let first = StyleRegistry::new();
    first.insert(rule("_a", "&", &[], "color:red")).unwrap();
    let second = StyleRegistry::new();
    second.insert(rule("_a", "&", &[], "color:red")).unwrap();
    second.insert(rule("_b", "&", &[], "color:blue")).unwrap();

    assert_eq!(first.merge(&second), 1);
    assert_eq!(first.len(), 2);
    assert_eq!(first.get("_b").map(|rule| rule.declaration), Some("color:blue".into()));
  }

  #[test]
  fn concurrent_inserts_keep_one_copy() {
    let registry = Arc::new(StyleRegistry::new());
    let handles: Vec<_> = (0..8)
      .map(|thread| {
        let registry = registry.clone();
        std::thread::spawn(move || {
          for index in 0..50 {
            registry.insert(rule(
              &format!("_r{}", index),
              "&",
              &[],
              &format!("z-index:{}", index),
            )).unwrap();
          }
          thread
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }
    assert_eq!(registry.len(), 50);
  }
}
