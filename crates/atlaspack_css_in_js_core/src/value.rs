use indexmap::IndexMap;

use crate::ast::FunctionId;

/// Outcome of constant evaluation.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedValue {
  String(String),
  Number(f64),
  Boolean(bool),
  Null,
  Undefined,
  Object(IndexMap<String, ResolvedValue>),
  Array(Vec<ResolvedValue>),
  /// A local function the evaluator may call.
  Function(FunctionId),
  /// Must be computed at runtime.
  Unresolved,
}

impl ResolvedValue {
  pub fn is_unresolved(&self) -> bool {
    matches!(self, ResolvedValue::Unresolved)
  }

  /// True when neither the value nor anything nested in it is unresolved.
  pub fn is_fully_resolved(&self) -> bool {
    match self {
      ResolvedValue::Unresolved => false,
      ResolvedValue::Object(map) => map.values().all(ResolvedValue::is_fully_resolved),
      ResolvedValue::Array(items) => items.iter().all(ResolvedValue::is_fully_resolved),
      _ => true,
    }
  }

  pub fn is_nullish(&self) -> bool {
    matches!(self, ResolvedValue::Null | ResolvedValue::Undefined)
  }

  /// Host truthiness. `None` when the value is unresolved.
  pub fn truthiness(&self) -> Option<bool> {
    Some(match self {
      ResolvedValue::String(value) => !value.is_empty(),
      ResolvedValue::Number(value) => *value != 0.0 && !value.is_nan(),
      ResolvedValue::Boolean(value) => *value,
      ResolvedValue::Null | ResolvedValue::Undefined => false,
      ResolvedValue::Object(_) | ResolvedValue::Array(_) | ResolvedValue::Function(_) => true,
      ResolvedValue::Unresolved => return None,
    })
  }

  pub fn type_of(&self) -> Option<&'static str> {
    Some(match self {
      ResolvedValue::String(_) => "string",
      ResolvedValue::Number(_) => "number",
      ResolvedValue::Boolean(_) => "boolean",
      ResolvedValue::Undefined => "undefined",
      ResolvedValue::Null | ResolvedValue::Object(_) | ResolvedValue::Array(_) => "object",
      ResolvedValue::Function(_) => "function",
      ResolvedValue::Unresolved => return None,
    })
  }

  /// String conversion as done by template literals and `+`.
  pub fn to_js_string(&self) -> Option<String> {
    Some(match self {
      ResolvedValue::String(value) => value.clone(),
      ResolvedValue::Number(value) => number_to_string(*value),
      ResolvedValue::Boolean(value) => value.to_string(),
      ResolvedValue::Null => "null".to_string(),
      ResolvedValue::Undefined => "undefined".to_string(),
      ResolvedValue::Object(_) => "[object Object]".to_string(),
      ResolvedValue::Array(items) => {
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
          if item.is_nullish() {
            parts.push(String::new());
          } else {
            parts.push(item.to_js_string()?);
          }
        }
        parts.join(",")
      }
      ResolvedValue::Function(_) | ResolvedValue::Unresolved => return None,
    })
  }

  pub fn to_number(&self) -> Option<f64> {
    Some(match self {
      ResolvedValue::Number(value) => *value,
      ResolvedValue::String(value) => string_to_number(value),
      ResolvedValue::Boolean(value) => f64::from(u8::from(*value)),
      ResolvedValue::Null => 0.0,
      ResolvedValue::Undefined | ResolvedValue::Object(_) | ResolvedValue::Function(_) => f64::NAN,
      ResolvedValue::Array(_) => string_to_number(&self.to_js_string()?),
      ResolvedValue::Unresolved => return None,
    })
  }

  /// `===`. Containers compare by identity, which is unknowable statically.
  pub fn strict_equals(&self, other: &ResolvedValue) -> Option<bool> {
    Some(match (self, other) {
      (ResolvedValue::Unresolved, _) | (_, ResolvedValue::Unresolved) => return None,
      (ResolvedValue::String(a), ResolvedValue::String(b)) => a == b,
      (ResolvedValue::Number(a), ResolvedValue::Number(b)) => a == b,
      (ResolvedValue::Boolean(a), ResolvedValue::Boolean(b)) => a == b,
      (ResolvedValue::Null, ResolvedValue::Null) => true,
      (ResolvedValue::Undefined, ResolvedValue::Undefined) => true,
      (ResolvedValue::Function(a), ResolvedValue::Function(b)) if a == b => true,
      (ResolvedValue::Object(_) | ResolvedValue::Array(_), _)
      | (_, ResolvedValue::Object(_) | ResolvedValue::Array(_)) => return None,
      _ => false,
    })
  }

  /// `==`.
  pub fn loose_equals(&self, other: &ResolvedValue) -> Option<bool> {
    match (self, other) {
      (ResolvedValue::Unresolved, _) | (_, ResolvedValue::Unresolved) => None,
      (a, b) if a.is_nullish() || b.is_nullish() => Some(a.is_nullish() && b.is_nullish()),
      (ResolvedValue::Object(_) | ResolvedValue::Array(_) | ResolvedValue::Function(_), _)
      | (_, ResolvedValue::Object(_) | ResolvedValue::Array(_) | ResolvedValue::Function(_)) => {
        None
      }
      (ResolvedValue::String(a), ResolvedValue::String(b)) => Some(a == b),
      (a, b) => Some(a.to_number()? == b.to_number()?),
    }
  }
}

/// `Number.prototype.toString()` for base 10.
pub fn number_to_string(value: f64) -> String {
  if value.is_nan() {
    return "NaN".to_string();
  }
  if value.is_infinite() {
    return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
  }
  if value == 0.0 {
    return "0".to_string();
  }

  let magnitude = value.abs();
  if magnitude >= 1e21 || magnitude < 1e-6 {
    let formatted = format!("{:e}", value);
    return match formatted.split_once('e') {
      Some((mantissa, exponent)) if !exponent.starts_with('-') => {
        format!("{}e+{}", mantissa, exponent)
      }
      _ => formatted,
    };
  }

  format!("{}", value)
}

/// `Number(string)`.
pub fn string_to_number(value: &str) -> f64 {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return 0.0;
  }

  match trimmed {
    "Infinity" | "+Infinity" => return f64::INFINITY,
    "-Infinity" => return f64::NEG_INFINITY,
    _ => {}
  }

  let radix = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)]
    .into_iter()
    .find_map(|(prefix, radix)| trimmed.strip_prefix(prefix).map(|digits| (digits, radix)));
  if let Some((digits, radix)) = radix {
    return u64::from_str_radix(digits, radix)
      .map(|parsed| parsed as f64)
      .unwrap_or(f64::NAN);
  }

  if trimmed
    .chars()
    .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '+' | '-'))
  {
    trimmed.parse().unwrap_or(f64::NAN)
  } else {
    f64::NAN
  }
}

/// `ToInt32`, used by the bitwise operators.
pub fn to_int32(value: f64) -> i32 {
  if !value.is_finite() {
    return 0;
  }
  let truncated = value.trunc() % 4_294_967_296.0;
  let wrapped = if truncated < 0.0 {
    truncated + 4_294_967_296.0
  } else {
    truncated
  };
  wrapped as u32 as i32
}

#[cfg(test)]
mod tests {
  use indexmap::IndexMap;
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn formats_numbers_like_the_host() {
    assert_eq!(number_to_string(16.0), "16");
    assert_eq!(number_to_string(0.5), "0.5");
    assert_eq!(number_to_string(-0.0), "0");
    assert_eq!(number_to_string(1e21), "1e+21");
    assert_eq!(number_to_string(1.5e-7), "1.5e-7");
    assert_eq!(number_to_string(f64::NAN), "NaN");
    assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
  }

  #[test]
  fn parses_numeric_strings() {
    assert_eq!(string_to_number(" 12 "), 12.0);
    assert_eq!(string_to_number(""), 0.0);
    assert_eq!(string_to_number("0x10"), 16.0);
    assert!(string_to_number("12px").is_nan());
    assert!(string_to_number("inf").is_nan());
  }

  #[test]
  fn stringifies_containers() {
    let array = ResolvedValue::Array(vec![
      ResolvedValue::Number(1.0),
      ResolvedValue::Null,
      ResolvedValue::String("a".into()),
    ]);
    assert_eq!(array.to_js_string().as_deref(), Some("1,,a"));
    assert_eq!(
      ResolvedValue::Object(IndexMap::new()).to_js_string().as_deref(),
      Some("[object Object]")
    );
  }

  #[test]
  fn equality_follows_host_rules() {
    let one = ResolvedValue::Number(1.0);
    let one_string = ResolvedValue::String("1".into());
    assert_eq!(one.strict_equals(&one_string), Some(false));
    assert_eq!(one.loose_equals(&one_string), Some(true));
    assert_eq!(
      ResolvedValue::Null.loose_equals(&ResolvedValue::Undefined),
      Some(true)
    );
    assert_eq!(
      ResolvedValue::Null.loose_equals(&ResolvedValue::Number(0.0)),
      Some(false)
    );
    assert_eq!(one.strict_equals(&ResolvedValue::Unresolved), None);
  }

  #[test]
  fn partially_resolved_containers() {
    let mut map = IndexMap::new();
    map.insert("a".to_string(), ResolvedValue::Number(1.0));
    map.insert("b".to_string(), ResolvedValue::Unresolved);
    let object = ResolvedValue::Object(map);
    assert!(!object.is_fully_resolved());
    assert_eq!(object.truthiness(), Some(true));
  }

  #[test]
  fn int32_wraps() {
    assert_eq!(to_int32(4_294_967_297.0), 1);
    assert_eq!(to_int32(-1.0), -1);
    assert_eq!(to_int32(f64::NAN), 0);
  }
}
