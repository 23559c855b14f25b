//! Splits a rule tree into atomic, single declaration rules.

use serde::Serialize;

use crate::config::CssInJsCoreConfig;
use crate::css_value::{add_unit_if_needed, format_css_number, minify_params};
use crate::declaration::{
  CssLiteral, Declaration, DeclarationValue, FlatItem, Rule, split_selector_list,
};
use crate::hash::short_hash;
use crate::registry::AtomicRule;

/// A custom property whose value is only known at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVariable {
  pub var_name: String,
  pub source: String,
}

/// A statement-position expression that has to be evaluated at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeFragment {
  pub selector: String,
  pub at_rules: Vec<String>,
  pub source: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Atomized {
  pub rules: Vec<AtomicRule>,
  pub runtime_vars: Vec<RuntimeVariable>,
  pub fragments: Vec<RuntimeFragment>,
}

pub fn atomize(rule: &Rule, config: &CssInJsCoreConfig) -> Atomized {
  let mut atomized = Atomized::default();

  for item in rule.flatten() {
    match item {
      FlatItem::Declaration {
        selector,
        at_rules,
        declaration,
      } => {
        if let DeclarationValue::Runtime(runtime) = &declaration.value {
          let variable = RuntimeVariable {
            var_name: runtime.var_name.clone(),
            source: runtime.source.clone(),
          };
          if !atomized.runtime_vars.contains(&variable) {
            atomized.runtime_vars.push(variable);
          }
        }

        let selectors = if config.flatten_multiple_selectors {
          split_selector_list(&selector)
        } else {
          vec![selector]
        };
        for selector in selectors {
          atomized
            .rules
            .push(atomic_rule(declaration, &selector, &at_rules, config));
        }
      }
      FlatItem::Expression {
        selector,
        at_rules,
        source,
      } => atomized.fragments.push(RuntimeFragment {
        selector,
        at_rules,
        source: source.to_string(),
      }),
    }
  }

  atomized
}

pub fn atomic_rule(
  declaration: &Declaration,
  selector: &str,
  at_rules: &[String],
  config: &CssInJsCoreConfig,
) -> AtomicRule {
  let selector = normalize_selector(selector);
  let at_rules: Vec<String> = at_rules.iter().map(|at_rule| normalize_at_rule(at_rule)).collect();
  let property = declaration.property.trim();
  let value = declaration_value(declaration, config);

  let class_name = atomic_class_name(
    config.class_hash_prefix.as_deref().unwrap_or(""),
    &at_rule_label(&at_rules),
    &selector,
    property,
    &value,
    declaration.important,
  );

  let important = if declaration.important { "!important" } else { "" };
  AtomicRule {
    selector: selector.replace('&', &format!(".{}", class_name)),
    at_rules,
    declaration: format!("{}:{}{}", property, value, important),
    class_name,
  }
}

/// `_` + four characters hashing where the declaration applies + four
/// characters hashing its value.
pub fn atomic_class_name(
  prefix: &str,
  at_rule_label: &str,
  selector: &str,
  property: &str,
  value: &str,
  important: bool,
) -> String {
  let group = short_hash(&format!("{}{}{}{}", prefix, at_rule_label, selector, property), 4);
  let mut value_seed = value.to_string();
  if important {
    value_seed.push_str("true");
  }
  format!("_{}{}", group, short_hash(&value_seed, 4))
}

fn declaration_value(declaration: &Declaration, config: &CssInJsCoreConfig) -> String {
  match &declaration.value {
    DeclarationValue::Literal(CssLiteral::String { value }) => value.trim().to_string(),
    DeclarationValue::Literal(CssLiteral::Number { value, add_unit }) => {
      if *add_unit && config.add_units {
        add_unit_if_needed(declaration.property.trim(), *value)
      } else {
        format_css_number(*value)
      }
    }
    DeclarationValue::Runtime(runtime) => format!("var({})", runtime.var_name),
  }
}

/// `&` for the element itself, otherwise a selector anchored on `&`.
pub fn normalize_selector(selector: &str) -> String {
  let collapsed = collapse_adjacent_nesting(selector.trim());
  let collapsed = collapsed.trim();
  if collapsed.is_empty() {
    "&".to_string()
  } else if collapsed.contains('&') {
    collapsed.to_string()
  } else {
    format!("& {}", collapsed)
  }
}

/// `& &:hover` and `&&` both mean the element itself.
fn collapse_adjacent_nesting(selector: &str) -> String {
  let mut out = String::with_capacity(selector.len());
  let mut chars = selector.chars().peekable();
  while let Some(ch) = chars.next() {
    if ch != '&' {
      out.push(ch);
      continue;
    }
    out.push('&');
    let mut saw_whitespace = false;
    while chars.peek().is_some_and(|next| next.is_whitespace()) {
      saw_whitespace = true;
      chars.next();
    }
    if chars.peek() == Some(&'&') {
      out.pop();
      continue;
    }
    if saw_whitespace {
      out.push(' ');
    }
  }
  out
}

fn normalize_at_rule(at_rule: &str) -> String {
  let at_rule = at_rule.trim();
  match at_rule.split_once(char::is_whitespace) {
    Some((name, params)) => format!("{} {}", name, minify_params(params)),
    None => at_rule.to_string(),
  }
}

/// Name and params of every wrapper concatenated, or `undefined` at the top
/// level.
fn at_rule_label(at_rules: &[String]) -> String {
  if at_rules.is_empty() {
    return "undefined".to_string();
  }
  at_rules
    .iter()
    .map(|at_rule| {
      let at_rule = at_rule.trim_start_matches('@');
      match at_rule.split_once(' ') {
        Some((name, params)) => format!("{}{}", name, params),
        None => at_rule.to_string(),
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::declaration::{RuleItem, parse_text};
  use crate::hash::hash;

  fn atomize_text(text: &str) -> Atomized {
    let rule = Rule::root(parse_text(&[text], &[]));
    atomize(&rule, &CssInJsCoreConfig::default())
  }

  fn classes(atomized: &Atomized) -> Vec<&str> {
    atomized
      .rules
      .iter()
      .map(|rule| rule.class_name.as_str())
      .collect()
  }

  #[test]
  fn hashes_group_and_value() {
    let atomized = atomize_text("font-size: 12px; color: blue; display: block;");
    assert_eq!(classes(&atomized), vec!["_1wyb1fwx", "_syaz13q2", "_1e0c1ule"]);
    assert_eq!(atomized.rules[1].css(), "._syaz13q2{color:blue}");
  }

  #[test]
  fn at_rules_take_part_in_the_group() {
    let atomized = atomize_text("@media screen { color: blue; }");
    assert_eq!(
      atomized.rules[0].css(),
      "@media screen{._434713q2{color:blue}}"
    );
  }

  #[test]
  fn numbers_from_values_get_units() {
    let rule = Rule::root(vec![
      RuleItem::Declaration(Declaration {
        property: "font-size".into(),
        value: DeclarationValue::Literal(CssLiteral::Number {
          value: 12.0,
          add_unit: true,
        }),
        important: false,
      }),
      RuleItem::Declaration(Declaration {
        property: "line-height".into(),
        value: DeclarationValue::Literal(CssLiteral::Number {
          value: 1.5,
          add_unit: true,
        }),
        important: false,
      }),
    ]);
    let atomized = atomize(&rule, &CssInJsCoreConfig::default());
    assert_eq!(atomized.rules[0].declaration, "font-size:12px");
    assert_eq!(atomized.rules[0].class_name, "_1wyb1fwx");
    assert_eq!(atomized.rules[1].declaration, "line-height:1.5");
  }

  #[test]
  fn important_changes_the_value_hash() {
    let plain = atomize_text("color: blue;");
    let important = atomize_text("color: blue !important;");
    assert_eq!(important.rules[0].declaration, "color:blue!important");
    assert_eq!(plain.rules[0].group(), important.rules[0].group());
    assert_ne!(plain.rules[0].class_name, important.rules[0].class_name);
  }

  #[test]
  fn flattens_selector_lists() {
    let atomized = atomize_text("&:hover, &:focus { color: blue; }");
    assert_eq!(atomized.rules.len(), 2);
    assert!(atomized.rules[0].selector.ends_with(":hover"));
    assert!(atomized.rules[1].selector.ends_with(":focus"));

    let config = CssInJsCoreConfig {
      flatten_multiple_selectors: false,
      ..CssInJsCoreConfig::default()
    };
    let rule = Rule::root(parse_text(&["&:hover, &:focus { color: blue; }"], &[]));
    let single = atomize(&rule, &config);
    assert_eq!(single.rules.len(), 1);
    let class = &single.rules[0].class_name;
    assert_eq!(
      single.rules[0].selector,
      format!(".{}:hover, .{}:focus", class, class)
    );
  }

  #[test]
  fn prefix_changes_only_the_group() {
    let config = CssInJsCoreConfig {
      class_hash_prefix: Some("app".into()),
      ..CssInJsCoreConfig::default()
    };
    let rule = Rule::root(parse_text(&["color: blue;"], &[]));
    let prefixed = atomize(&rule, &config);
    assert_ne!(prefixed.rules[0].group(), "_syaz");
    assert!(prefixed.rules[0].class_name.ends_with("13q2"));
  }

  #[test]
  fn runtime_values_route_through_variables() {
    let rule = Rule::root(vec![RuleItem::Declaration(Declaration {
      property: "color".into(),
      value: DeclarationValue::Runtime(crate::declaration::RuntimeExpression::new(
        "color",
        "props.color".into(),
      )),
      important: false,
    })]);
    let atomized = atomize(&rule, &CssInJsCoreConfig::default());
    let var_name = format!("--_color-{}", hash("props.color"));
    assert_eq!(
      atomized.runtime_vars,
      vec![RuntimeVariable {
        var_name: var_name.clone(),
        source: "props.color".into(),
      }]
    );
    assert_eq!(atomized.rules[0].declaration, format!("color:var({})", var_name));
  }

  #[test]
  fn expressions_become_fragments() {
    let rule = Rule::root(vec![RuleItem::Rule(Rule {
      selector: ":hover".into(),
      items: vec![RuleItem::Expression {
        source: "mixin".into(),
      }],
    })]);
    let atomized = atomize(&rule, &CssInJsCoreConfig::default());
    assert_eq!(
      atomized.fragments,
      vec![RuntimeFragment {
        selector: "&:hover".into(),
        at_rules: vec![],
        source: "mixin".into(),
      }]
    );
  }

  #[test]
  fn normalizes_selectors() {
    assert_eq!(normalize_selector(""), "&");
    assert_eq!(normalize_selector("div"), "& div");
    assert_eq!(normalize_selector("& &:hover"), "&:hover");
    assert_eq!(normalize_selector("& > span"), "& > span");
  }
}
