//! Rewrites template style text as equivalent call arguments, for lint fixes
//! that turn `` styled.div`...` `` into `styled.div({ ... })`.
//!
//! No scope is available here, so every interpolation stays opaque source.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::declaration::{
  CssLiteral, Declaration, DeclarationValue, RuleItem, Slot, parse_text,
};
use crate::value::number_to_string;

static PLAIN_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid key regex"));

enum Argument {
  Block(Vec<Entry>),
  Expression(String),
}

enum Entry {
  Declaration { property: String, value: String },
  Rule { selector: String, args: Vec<Argument> },
}

/// `(...)` call arguments equivalent to the template. `offset` is the
/// indentation of the line the call starts on.
pub fn to_call_arguments(quasis: &[&str], expression_sources: &[&str], offset: usize) -> String {
  let slots: Vec<Slot> = expression_sources
    .iter()
    .map(|source| Slot::unresolved(source.trim()))
    .collect();
  let args = to_arguments(&parse_text(quasis, &slots));

  let mut chars = String::from("(");
  chars.push_str(&arguments(&args, offset, 1));
  if args.len() > 1 {
    chars.push('\n');
    chars.push_str(&indent(offset, 0));
  }
  chars.push(')');
  chars
}

fn to_arguments(items: &[RuleItem]) -> Vec<Argument> {
  let mut args: Vec<Argument> = Vec::new();
  for item in items {
    let entry = match item {
      RuleItem::Expression { source } => {
        if !source.is_empty() {
          args.push(Argument::Expression(source.clone()));
        }
        continue;
      }
      RuleItem::Declaration(declaration) => Entry::Declaration {
        property: declaration.property.clone(),
        value: declaration_value(declaration),
      },
      RuleItem::Rule(rule) => Entry::Rule {
        selector: rule.selector.clone(),
        args: to_arguments(&rule.items),
      },
    };
    match args.last_mut() {
      Some(Argument::Block(entries)) => entries.push(entry),
      _ => args.push(Argument::Block(vec![entry])),
    }
  }
  args
}

fn declaration_value(declaration: &Declaration) -> String {
  let important = if declaration.important {
    " !important"
  } else {
    ""
  };
  match &declaration.value {
    DeclarationValue::Literal(CssLiteral::String { value }) => {
      quote(&format!("{}{}", value, important))
    }
    DeclarationValue::Literal(CssLiteral::Number { value, .. }) if important.is_empty() => {
      number_to_string(*value)
    }
    DeclarationValue::Literal(CssLiteral::Number { value, .. }) => {
      quote(&format!("{}{}", number_to_string(*value), important))
    }
    DeclarationValue::Runtime(runtime) if important.is_empty() => runtime.source.clone(),
    DeclarationValue::Runtime(runtime) => match runtime.source.strip_suffix('`') {
      Some(template) => format!("{}{}`", template, important),
      None => format!("`${{{}}}{}`", runtime.source, important),
    },
  }
}

fn quote(value: &str) -> String {
  format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn key(key: &str) -> String {
  if PLAIN_KEY.is_match(key) {
    key.to_string()
  } else {
    quote(key)
  }
}

fn indent(offset: usize, level: usize) -> String {
  " ".repeat(offset + level * 2)
}

fn arguments(args: &[Argument], offset: usize, level: usize) -> String {
  let mut chars = String::new();
  for (index, arg) in args.iter().enumerate() {
    match arg {
      Argument::Block(entries) if args.len() == 1 => {
        chars.push_str(block(entries, offset, level).trim());
      }
      Argument::Block(entries) => {
        chars.push('\n');
        chars.push_str(&indent(offset, level));
        chars.push_str(block(entries, offset, level + 1).trim());
      }
      Argument::Expression(expression) => {
        chars.push('\n');
        chars.push_str(&indent(offset, level));
        chars.push_str(expression);
      }
    }
    if index + 1 < args.len() {
      chars.push(',');
    }
  }
  chars
}

fn block(entries: &[Entry], offset: usize, level: usize) -> String {
  let lines: Vec<String> = entries
    .iter()
    .map(|entry| {
      let value = match entry {
        Entry::Declaration { property, value } => format!("{}: {}", key(property), value),
        Entry::Rule { selector, args } => {
          format!("{}: {}", key(selector), rule_value(args, offset, level))
        }
      };
      format!("{}{}", indent(offset, level), value)
    })
    .collect();

  format!(
    "{}{{\n{}\n{}}}",
    indent(offset, level - 1),
    lines.join(",\n"),
    indent(offset, level - 1)
  )
}

fn rule_value(args: &[Argument], offset: usize, level: usize) -> String {
  match args {
    [] => "{}".to_string(),
    [_] => arguments(args, offset, level + 1).trim().to_string(),
    _ => format!(
      "[{}\n{}]",
      arguments(args, offset, level + 1),
      indent(offset, level)
    ),
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn single_declaration() {
    assert_eq!(
      to_call_arguments(&["color: blue"], &[], 0),
      indoc! {r#"
        ({
          color: "blue"
        })"#}
    );
  }

  #[test]
  fn nested_rules_without_semicolons() {
    let text = "
      color: blue;
      opacity: 0.8;
      :hover { color: purple; opacity: 1 }
      :focus {
        color: coral;
        opacity: 1
      }
      display: block
    ";
    assert_eq!(
      to_call_arguments(&[text], &[], 0),
      indoc! {r#"
        ({
          color: "blue",
          opacity: 0.8,
          ":hover": {
            color: "purple",
            opacity: 1
          },
          ":focus": {
            color: "coral",
            opacity: 1
          },
          display: "block"
        })"#}
    );
  }

  #[test]
  fn interpolations_stay_as_source() {
    let quasis = [
      "\n  color: ",
      ";\n  margin: ",
      "px ",
      "px;\n  padding: calc(",
      " * 2);\n",
    ];
    let sources = ["color", "spacing", "spacing * 3", "spacing"];
    assert_eq!(
      to_call_arguments(&quasis, &sources, 8),
      [
        "({",
        "          color: color,",
        "          margin: `${spacing}px ${spacing * 3}px`,",
        "          padding: `calc(${spacing} * 2)`",
        "        })",
      ]
      .join("\n")
    );
  }

  #[test]
  fn expressions_become_separate_arguments() {
    let quasis = ["\n  ", ";\n  color: blue;\n"];
    assert_eq!(
      to_call_arguments(&quasis, &["mixin"], 0),
      indoc! {r#"
        (
          mixin,
          {
            color: "blue"
          }
        )"#}
    );
  }

  #[test]
  fn rules_with_several_arguments_become_arrays() {
    let quasis = [":hover {\n  ", ";\n  color: blue;\n}"];
    assert_eq!(
      to_call_arguments(&quasis, &["mixin"], 0),
      indoc! {r#"
        ({
          ":hover": [
            mixin,
            {
              color: "blue"
            }
          ]
        })"#}
    );
  }

  #[test]
  fn important_and_quoted_keys() {
    assert_eq!(
      to_call_arguments(&["font-size: 12px !important;"], &[], 0),
      indoc! {r#"
        ({
          "font-size": "12px !important"
        })"#}
    );
  }
}
