//! Property name and value helpers shared by the declaration parser and the atomizer.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

const UPPER_A_GRAVE: char = '\u{00C0}';
const UPPER_O_DIAERESIS: char = '\u{00D6}';
const UPPER_O_SLASH: char = '\u{00D8}';
const UPPER_THORN: char = '\u{00DE}';

/// Values that read as a plain number. Exponents and a leading `+` are left as text.
static NUMERIC_LITERAL: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^-?(\d+\.?\d*|\.\d+)$").expect("valid numeric literal regex"));

static IMPORTANT_SUFFIX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)\s*!\s*important\s*$").expect("valid important regex"));

static UNITLESS_PROPERTIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
  HashSet::from([
    "animationIterationCount",
    "basePalette",
    "borderImageOutset",
    "borderImageSlice",
    "borderImageWidth",
    "boxFlex",
    "boxFlexGroup",
    "boxOrdinalGroup",
    "columnCount",
    "columns",
    "flex",
    "flexGrow",
    "flexPositive",
    "flexShrink",
    "flexNegative",
    "flexOrder",
    "fontSizeAdjust",
    "fontWeight",
    "gridArea",
    "gridRow",
    "gridRowEnd",
    "gridRowSpan",
    "gridRowStart",
    "gridColumn",
    "gridColumnEnd",
    "gridColumnSpan",
    "gridColumnStart",
    "lineClamp",
    "lineHeight",
    "opacity",
    "order",
    "orphans",
    "tabSize",
    "WebkitLineClamp",
    "widows",
    "zIndex",
    "zoom",
    "fillOpacity",
    "floodOpacity",
    "stopOpacity",
    "strokeDasharray",
    "strokeDashoffset",
    "strokeMiterlimit",
    "strokeOpacity",
    "strokeWidth",
  ])
});

/// Converts camelCase into kebab-case.
pub fn kebab_case(input: &str) -> String {
  let mut result = String::with_capacity(input.len() + 4);

  for ch in input.chars() {
    let is_upper = matches!(
        ch,
        'A'..='Z'
            | UPPER_A_GRAVE..=UPPER_O_DIAERESIS
            | UPPER_O_SLASH..=UPPER_THORN
    );

    if is_upper {
      result.push('-');
      result.extend(ch.to_lowercase());
    } else {
      result.push(ch);
    }
  }

  result
}

/// Converts kebab-case back into the camelCase spelling used by the unitless table.
fn camel_case(property: &str) -> String {
  let mut result = String::with_capacity(property.len());
  let mut upper_next = false;
  for ch in property.chars() {
    if ch == '-' {
      upper_next = true;
    } else if upper_next {
      result.extend(ch.to_uppercase());
      upper_next = false;
    } else {
      result.push(ch);
    }
  }
  result
}

/// CSS property for an object-form key. Custom properties are kept verbatim.
pub fn property_name(key: &str) -> String {
  let key = key.trim();
  if key.starts_with("--") || key.contains('-') {
    return key.to_string();
  }
  let kebab = kebab_case(key);
  if kebab.starts_with("ms-") {
    format!("-{}", kebab)
  } else {
    kebab
  }
}

pub fn is_unitless(property: &str) -> bool {
  property.starts_with("--") || UNITLESS_PROPERTIES.contains(camel_case(property).as_str())
}

pub fn is_numeric_literal(value: &str) -> bool {
  NUMERIC_LITERAL.is_match(value.trim())
}

/// Shortest CSS spelling of a number: no trailing `.0`, no leading zero.
pub fn format_css_number(mut number: f64) -> String {
  if number == 0.0 {
    number = 0.0;
  }
  let mut string = crate::value::number_to_string(number);
  if string.starts_with("0.") {
    string.remove(0);
  } else if string.starts_with("-0.") {
    string.remove(1);
  }
  string
}

/// Appends `px` unless the number is zero or the property is unitless.
pub fn add_unit_if_needed(property: &str, number: f64) -> String {
  if number == 0.0 || is_unitless(property) {
    format_css_number(number)
  } else {
    format!("{}px", format_css_number(number))
  }
}

/// Splits a trailing `!important` off a value.
pub fn split_important(value: &str) -> (&str, bool) {
  match IMPORTANT_SUFFIX.find(value) {
    Some(found) => (value[..found.start()].trim_end(), true),
    None => (value, false),
  }
}

/// Collapses whitespace in at-rule params the way a minifier would.
pub fn minify_params(params: &str) -> String {
  let mut result = String::with_capacity(params.len());
  let mut pending_space = false;
  for ch in params.trim().chars() {
    if ch.is_whitespace() {
      pending_space = true;
      continue;
    }
    if pending_space {
      let glued = matches!(ch, ':' | ')' | ',')
        || result.ends_with(|last: char| matches!(last, ':' | '(' | ','));
      if !glued {
        result.push(' ');
      }
      pending_space = false;
    }
    result.push(ch);
  }
  result
}
