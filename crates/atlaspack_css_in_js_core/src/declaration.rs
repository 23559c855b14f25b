//! Turns style arguments into a tree of rules and declarations.
//!
//! Two input shapes are accepted. Template text is scanned by a small state
//! machine ([`parse_text`]) with evaluated slots spliced in. Object literals
//! are walked key by key ([`StyleParser`]). Anything that cannot be decided at
//! build time is kept as a [`RuntimeExpression`] carrying its source text.

use indexmap::IndexMap;
use serde::Serialize;

use crate::ast::*;
use crate::css_value::{is_numeric_literal, property_name, split_important};
use crate::evaluate::Evaluator;
use crate::hash::hash;
use crate::value::{ResolvedValue, number_to_string};

/// A value known at build time.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CssLiteral {
  String { value: String },
  /// `add_unit` is set for numbers that came from the host language, which get
  /// `px` appended unless the property is unitless.
  Number { value: f64, add_unit: bool },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeExpression {
  /// Host source that produces the value. Mixed values are a template literal.
  pub source: String,
  /// Custom property the value is routed through, e.g. `--_color-1x2y3z`.
  pub var_name: String,
}

impl RuntimeExpression {
  pub fn new(property: &str, source: String) -> Self {
    let var_name = format!("--_{}-{}", property.trim_start_matches('-'), hash(&source));
    RuntimeExpression { source, var_name }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DeclarationValue {
  Literal(CssLiteral),
  Runtime(RuntimeExpression),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
  pub property: String,
  pub value: DeclarationValue,
  pub important: bool,
}

impl Declaration {
  fn literal(property: String, value: CssLiteral, important: bool) -> Self {
    Declaration {
      property,
      value: DeclarationValue::Literal(value),
      important,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleItem {
  Declaration(Declaration),
  Rule(Rule),
  /// A runtime expression in statement position, such as a mixin that could
  /// not be evaluated.
  Expression { source: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
  /// The fragment as written: `&`, `:hover`, `& > div`, `@media screen`.
  pub selector: String,
  pub items: Vec<RuleItem>,
}

impl Rule {
  pub fn root(items: Vec<RuleItem>) -> Self {
    Rule {
      selector: "&".to_string(),
      items,
    }
  }

  /// Every declaration and expression with its full selector and at-rule
  /// wrappers, depth first in authored order.
  pub fn flatten(&self) -> Vec<FlatItem<'_>> {
    let mut out = Vec::new();
    flatten_into(&self.items, "&", &[], &mut out);
    out
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FlatItem<'r> {
  Declaration {
    selector: String,
    at_rules: Vec<String>,
    declaration: &'r Declaration,
  },
  Expression {
    selector: String,
    at_rules: Vec<String>,
    source: &'r str,
  },
}

fn flatten_into<'r>(
  items: &'r [RuleItem],
  selector: &str,
  at_rules: &[String],
  out: &mut Vec<FlatItem<'r>>,
) {
  for item in items {
    match item {
      RuleItem::Declaration(declaration) => out.push(FlatItem::Declaration {
        selector: selector.to_string(),
        at_rules: at_rules.to_vec(),
        declaration,
      }),
      RuleItem::Expression { source } => out.push(FlatItem::Expression {
        selector: selector.to_string(),
        at_rules: at_rules.to_vec(),
        source,
      }),
      RuleItem::Rule(rule) => {
        let fragment = rule.selector.trim();
        if fragment.starts_with('@') {
          let mut nested = at_rules.to_vec();
          nested.push(fragment.to_string());
          flatten_into(&rule.items, selector, &nested, out);
        } else {
          flatten_into(&rule.items, &join_selector(selector, fragment), at_rules, out);
        }
      }
    }
  }
}

/// Nests `fragment` under `parent`. `&` stands for the parent, a leading `:`
/// attaches a pseudo class, anything else is a descendant.
pub fn join_selector(parent: &str, fragment: &str) -> String {
  let parents = split_selector_list(parent);
  let mut joined = Vec::new();
  for child in split_selector_list(fragment) {
    for parent in &parents {
      joined.push(if child.contains('&') {
        child.replace('&', parent)
      } else if child.starts_with(':') {
        format!("{}{}", parent, child)
      } else if child.is_empty() {
        parent.to_string()
      } else {
        format!("{} {}", parent, child)
      });
    }
  }
  joined.join(", ")
}

/// Splits on commas outside parentheses, brackets and quotes.
pub fn split_selector_list(selector: &str) -> Vec<String> {
  let mut parts = Vec::new();
  let mut current = String::new();
  let mut depth = 0u32;
  let mut quote = None;
  for ch in selector.chars() {
    match (quote, ch) {
      (Some(open), _) => {
        if ch == open {
          quote = None;
        }
      }
      (None, '"' | '\'') => quote = Some(ch),
      (None, '(' | '[') => depth += 1,
      (None, ')' | ']') => depth = depth.saturating_sub(1),
      (None, ',') if depth == 0 => {
        parts.push(current.trim().to_string());
        current.clear();
        continue;
      }
      _ => {}
    }
    current.push(ch);
  }
  parts.push(current.trim().to_string());
  parts
}

/// An interpolation inside template text.
#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
  pub source: String,
  pub value: SlotValue,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SlotValue {
  /// A primitive known at build time. Its text is scanned like authored text.
  Literal(ResolvedValue),
  /// A style object, spliced in when it sits in statement position.
  Items(Vec<RuleItem>),
  Unresolved,
}

impl Slot {
  pub fn unresolved(source: impl Into<String>) -> Self {
    Slot {
      source: source.into(),
      value: SlotValue::Unresolved,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Token {
  Char { ch: char, slot: Option<usize> },
  Slot(usize),
}

impl Token {
  fn is_whitespace(&self) -> bool {
    matches!(self, Token::Char { ch, .. } if ch.is_whitespace())
  }

  fn char(&self) -> Option<char> {
    match self {
      Token::Char { ch, .. } => Some(*ch),
      Token::Slot(_) => None,
    }
  }
}

fn tokenize(quasis: &[&str], slots: &[Slot]) -> Vec<Token> {
  let mut tokens = Vec::new();
  for (index, quasi) in quasis.iter().enumerate() {
    tokens.extend(quasi.chars().map(|ch| Token::Char { ch, slot: None }));
    let Some(slot) = slots.get(index) else {
      continue;
    };
    match &slot.value {
      SlotValue::Literal(
        ResolvedValue::Boolean(false) | ResolvedValue::Null | ResolvedValue::Undefined,
      ) => {}
      SlotValue::Literal(value) => match value.to_js_string() {
        Some(text) => tokens.extend(text.chars().map(|ch| Token::Char {
          ch,
          slot: Some(index),
        })),
        None => tokens.push(Token::Slot(index)),
      },
      SlotValue::Items(_) | SlotValue::Unresolved => tokens.push(Token::Slot(index)),
    }
  }
  tokens
}

/// Scans template text into rule items. `quasis` must be one longer than
/// `slots`.
pub fn parse_text(quasis: &[&str], slots: &[Slot]) -> Vec<RuleItem> {
  let tokens = tokenize(quasis, slots);
  let mut scanner = TextScanner {
    slots,
    stack: vec![Rule::root(Vec::new())],
    buffer: Vec::new(),
    quote: None,
    parens: 0,
  };

  let mut index = 0;
  while index < tokens.len() {
    index = scanner.step(&tokens, index);
  }
  scanner.finish()
}

struct TextScanner<'s> {
  slots: &'s [Slot],
  stack: Vec<Rule>,
  buffer: Vec<Token>,
  quote: Option<char>,
  parens: u32,
}

impl TextScanner<'_> {
  /// Consumes the token at `index`, returning the index of the next one.
  fn step(&mut self, tokens: &[Token], index: usize) -> usize {
    let token = tokens[index];
    let ch = match token {
      Token::Slot(slot) => {
        if self.buffer.iter().all(Token::is_whitespace) && is_statement_slot(tokens, index) {
          self.buffer.clear();
          self.statement_slot(slot);
        } else {
          self.buffer.push(token);
        }
        return index + 1;
      }
      Token::Char { ch, .. } => ch,
    };

    if let Some(open) = self.quote {
      self.buffer.push(token);
      if ch == '\\' {
        if let Some(next) = tokens.get(index + 1) {
          self.buffer.push(*next);
          return index + 2;
        }
      } else if ch == open {
        self.quote = None;
      }
      return index + 1;
    }

    match ch {
      '"' | '\'' => {
        self.quote = Some(ch);
        self.buffer.push(token);
      }
      '/' if tokens.get(index + 1).and_then(Token::char) == Some('*') => {
        let mut end = index + 2;
        while end < tokens.len() {
          let closes = tokens[end].char() == Some('*')
            && tokens.get(end + 1).and_then(Token::char) == Some('/');
          if closes {
            return end + 2;
          }
          end += 1;
        }
        return end;
      }
      '(' => {
        self.parens += 1;
        self.buffer.push(token);
      }
      ')' => {
        self.parens = self.parens.saturating_sub(1);
        self.buffer.push(token);
      }
      ';' if self.parens == 0 => self.flush_declaration(),
      '{' => self.open_rule(),
      '}' => self.close_rule(),
      _ => self.buffer.push(token),
    }
    index + 1
  }

  fn current(&mut self) -> &mut Rule {
    let last = self.stack.len() - 1;
    &mut self.stack[last]
  }

  fn statement_slot(&mut self, slot: usize) {
    let slot = &self.slots[slot];
    let items = match &slot.value {
      SlotValue::Items(items) => items.clone(),
      _ => vec![RuleItem::Expression {
        source: slot.source.clone(),
      }],
    };
    self.current().items.extend(items);
  }

  fn open_rule(&mut self) {
    let mut selector = String::new();
    for token in self.buffer.drain(..) {
      match token {
        Token::Char { ch, .. } => selector.push(ch),
        Token::Slot(slot) => {
          tracing::debug!(source = %self.slots[slot].source, "Dropping interpolation in selector");
        }
      }
    }
    self.parens = 0;
    self.stack.push(Rule {
      selector: collapse_whitespace(selector.trim()),
      items: Vec::new(),
    });
  }

  fn close_rule(&mut self) {
    self.flush_declaration();
    if self.stack.len() > 1 {
      self.pop_rule();
    } else {
      tracing::debug!("Ignoring unbalanced closing brace");
    }
  }

  fn pop_rule(&mut self) {
    if let Some(rule) = self.stack.pop() {
      self.current().items.push(RuleItem::Rule(rule));
    }
  }

  fn flush_declaration(&mut self) {
    let buffer = std::mem::take(&mut self.buffer);
    self.parens = 0;
    let tokens = trim_tokens(&buffer);
    if tokens.is_empty() {
      return;
    }

    let Some(colon) = find_colon(tokens) else {
      if tokens.iter().any(|token| matches!(token, Token::Slot(_))) {
        let source = self.value_source(tokens);
        self.current().items.push(RuleItem::Expression { source });
      } else {
        tracing::debug!(text = %render_text(tokens), "Dropping declaration without a colon");
      }
      return;
    };

    let (property_tokens, value_tokens) = (&tokens[..colon], &tokens[colon + 1..]);
    if property_tokens
      .iter()
      .any(|token| matches!(token, Token::Slot(_)))
    {
      let source = self.template_source(tokens);
      self.current().items.push(RuleItem::Expression { source });
      return;
    }

    let property = render_text(property_tokens).trim().to_string();
    if property.is_empty() {
      tracing::debug!("Dropping declaration without a property");
      return;
    }
    let declaration = self.declaration(property, value_tokens);
    self.current().items.push(RuleItem::Declaration(declaration));
  }

  fn declaration(&self, property: String, tokens: &[Token]) -> Declaration {
    let tokens = trim_tokens(tokens);
    let placeholder: String = tokens
      .iter()
      .map(|token| token.char().unwrap_or('\u{0}'))
      .collect();
    let (kept, important) = split_important(&placeholder);
    let tokens = trim_tokens(&tokens[..kept.chars().count()]);

    let slot_count = tokens
      .iter()
      .filter(|token| matches!(token, Token::Slot(_)))
      .count();

    if slot_count == 0 {
      let text = collapse_whitespace(&render_text(tokens));
      return Declaration::literal(property, self.literal(tokens, text), important);
    }

    let source = self.value_source(tokens);
    Declaration {
      value: DeclarationValue::Runtime(RuntimeExpression::new(&property, source)),
      property,
      important,
    }
  }

  fn literal(&self, tokens: &[Token], text: String) -> CssLiteral {
    let single_slot = match tokens.first() {
      Some(Token::Char {
        slot: Some(first), ..
      }) if tokens
        .iter()
        .all(|token| matches!(token, Token::Char { slot: Some(slot), .. } if slot == first)) =>
      {
        Some(*first)
      }
      _ => None,
    };

    if let Some(slot) = single_slot {
      if let SlotValue::Literal(ResolvedValue::Number(value)) = &self.slots[slot].value {
        if number_to_string(*value) == text {
          return CssLiteral::Number {
            value: *value,
            add_unit: true,
          };
        }
      }
    }

    if is_numeric_literal(&text) {
      if let Ok(value) = text.parse::<f64>() {
        return CssLiteral::Number {
          value,
          add_unit: false,
        };
      }
    }
    CssLiteral::String { value: text }
  }

  /// The source of a lone slot, or a template literal reproducing the text.
  fn value_source(&self, tokens: &[Token]) -> String {
    let mut slots = tokens.iter().filter_map(|token| match token {
      Token::Slot(slot) => Some(*slot),
      _ => None,
    });
    let lone = match (slots.next(), slots.next()) {
      (Some(slot), None) => tokens
        .iter()
        .all(|token| token.is_whitespace() || *token == Token::Slot(slot))
        .then_some(slot),
      _ => None,
    };
    match lone {
      Some(slot) => self.slots[slot].source.clone(),
      None => self.template_source(tokens),
    }
  }

  fn template_source(&self, tokens: &[Token]) -> String {
    let mut text = String::new();
    for token in tokens {
      match token {
        Token::Char { ch, .. } => text.push(*ch),
        Token::Slot(slot) => {
          text.push('\u{0}');
          text.push_str(&slot.to_string());
          text.push('\u{0}');
        }
      }
    }

    let mut source = String::from("`");
    for (index, part) in collapse_whitespace(&text).split('\u{0}').enumerate() {
      if index % 2 == 1 {
        let slot = part.parse::<usize>().unwrap_or_default();
        source.push_str("${");
        source.push_str(&self.slots[slot].source);
        source.push('}');
      } else {
        source.push_str(&escape_template_text(part));
      }
    }
    source.push('`');
    source
  }

  fn finish(mut self) -> Vec<RuleItem> {
    self.flush_declaration();
    while self.stack.len() > 1 {
      tracing::debug!("Closing unterminated rule");
      self.pop_rule();
    }
    self
      .stack
      .pop()
      .map(|root| root.items)
      .unwrap_or_default()
  }
}

/// A slot opens a statement unless it is followed by a `:` on the same line,
/// which makes it a property name.
fn is_statement_slot(tokens: &[Token], index: usize) -> bool {
  let mut saw_newline = false;
  for token in &tokens[index + 1..] {
    match token {
      Token::Char { ch, .. } if *ch == '\n' => saw_newline = true,
      Token::Char { ch, .. } if ch.is_whitespace() => {}
      Token::Char { ch: ';' | '}', .. } | Token::Slot(_) => return true,
      Token::Char { ch: ':', .. } => return false,
      Token::Char { .. } => return saw_newline,
    }
  }
  true
}

fn find_colon(tokens: &[Token]) -> Option<usize> {
  let mut quote = None;
  let mut depth = 0u32;
  for (index, token) in tokens.iter().enumerate() {
    let Some(ch) = token.char() else { continue };
    match (quote, ch) {
      (Some(open), _) if ch == open => quote = None,
      (Some(_), _) => {}
      (None, '"' | '\'') => quote = Some(ch),
      (None, '(') => depth += 1,
      (None, ')') => depth = depth.saturating_sub(1),
      (None, ':') if depth == 0 => return Some(index),
      _ => {}
    }
  }
  None
}

fn trim_tokens(tokens: &[Token]) -> &[Token] {
  let start = tokens
    .iter()
    .position(|token| !token.is_whitespace())
    .unwrap_or(tokens.len());
  let end = tokens
    .iter()
    .rposition(|token| !token.is_whitespace())
    .map_or(start, |last| last + 1);
  &tokens[start..end]
}

fn render_text(tokens: &[Token]) -> String {
  tokens.iter().filter_map(Token::char).collect()
}

/// Collapses whitespace runs outside quotes into a single space.
fn collapse_whitespace(text: &str) -> String {
  let mut result = String::with_capacity(text.len());
  let mut quote = None;
  let mut pending_space = false;
  for ch in text.chars() {
    if quote.is_none() && ch.is_whitespace() {
      pending_space = true;
      continue;
    }
    if pending_space {
      if !result.is_empty() {
        result.push(' ');
      }
      pending_space = false;
    }
    match quote {
      Some(open) if open == ch => quote = None,
      None if ch == '"' || ch == '\'' => quote = Some(ch),
      _ => {}
    }
    result.push(ch);
  }
  result
}

fn escape_template_text(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len());
  let mut chars = text.chars().peekable();
  while let Some(ch) = chars.next() {
    match ch {
      '`' | '\\' => {
        escaped.push('\\');
        escaped.push(ch);
      }
      '$' if chars.peek() == Some(&'{') => escaped.push_str("\\$"),
      _ => escaped.push(ch),
    }
  }
  escaped
}

/// Builds rule items for the arguments of a style site.
pub struct StyleParser<'e, 'a, 'p> {
  evaluator: &'e mut Evaluator<'a, 'p>,
  program: &'p Program,
}

impl<'e, 'a, 'p> StyleParser<'e, 'a, 'p> {
  pub fn new(evaluator: &'e mut Evaluator<'a, 'p>) -> Self {
    let program = evaluator.scopes().program();
    StyleParser { evaluator, program }
  }

  /// Items of every argument, in order, as one root rule.
  pub fn parse_args(&mut self, args: &'p [Expr]) -> Rule {
    let mut items = Vec::new();
    for arg in args {
      items.extend(self.arg_items(arg));
    }
    Rule::root(items)
  }

  pub fn arg_items(&mut self, expr: &'p Expr) -> Vec<RuleItem> {
    let node = self.evaluator.resolve_node(expr);
    match &node.kind {
      ExprKind::Object(props) => self.object_items(props),
      ExprKind::Array(elems) => {
        let mut items = Vec::new();
        for elem in elems {
          match elem {
            ArrayElem::Expr(expr) | ArrayElem::Spread(expr) => items.extend(self.arg_items(expr)),
            ArrayElem::Hole => {}
          }
        }
        items
      }
      ExprKind::Template(template) => self.template_items(template),
      ExprKind::TaggedTemplate { tag, template }
        if tag
          .as_ident()
          .is_some_and(|tag| self.evaluator.is_style_helper(tag)) =>
      {
        self.template_items(template)
      }
      ExprKind::Conditional { test, cons, alt } => match self.evaluator.evaluate(test).truthiness()
      {
        Some(true) => self.arg_items(cons),
        Some(false) => self.arg_items(alt),
        None => self.expression(node),
      },
      ExprKind::Logical {
        op: LogicalOp::And,
        left,
        right,
      } => match self.evaluator.evaluate(left).truthiness() {
        Some(true) => self.arg_items(right),
        Some(false) => Vec::new(),
        None => self.expression(node),
      },
      _ => {
        let value = self.evaluator.evaluate(node);
        match value {
          ResolvedValue::String(text) => parse_text(&[text.as_str()], &[]),
          ResolvedValue::Boolean(false) | ResolvedValue::Null | ResolvedValue::Undefined => {
            Vec::new()
          }
          value @ (ResolvedValue::Object(_) | ResolvedValue::Array(_))
            if value.is_fully_resolved() =>
          {
            value_items(&value)
          }
          _ => self.expression(node),
        }
      }
    }
  }

  fn expression(&self, node: &Expr) -> Vec<RuleItem> {
    vec![RuleItem::Expression {
      source: self.program.source_of(node.span).to_string(),
    }]
  }

  fn template_items(&mut self, template: &'p Template) -> Vec<RuleItem> {
    let mut slots = Vec::with_capacity(template.exprs.len());
    for expr in &template.exprs {
      let slot = self.slot(expr);
      slots.push(slot);
    }
    let quasis: Vec<&str> = template
      .quasis
      .iter()
      .map(|quasi| quasi.raw.as_str())
      .collect();
    parse_text(&quasis, &slots)
  }

  fn slot(&mut self, expr: &'p Expr) -> Slot {
    let source = self.program.source_of(expr.span).to_string();
    let value = self.evaluator.evaluate(expr);
    let node = self.evaluator.resolve_node(expr);
    let value = match value {
      ResolvedValue::Object(_) | ResolvedValue::Array(_)
        if value.is_fully_resolved()
          || matches!(node.kind, ExprKind::Object(_) | ExprKind::Array(_)) =>
      {
        SlotValue::Items(self.arg_items(expr))
      }
      ResolvedValue::Object(_)
      | ResolvedValue::Array(_)
      | ResolvedValue::Unresolved
      | ResolvedValue::Function(_) => SlotValue::Unresolved,
      primitive => SlotValue::Literal(primitive),
    };
    Slot { source, value }
  }

  fn object_items(&mut self, props: &'p [ObjectProp]) -> Vec<RuleItem> {
    let mut items = Vec::new();
    for prop in props {
      match prop {
        ObjectProp::KeyValue { key, value } => {
          let key = match key {
            PropKey::Static(key) => key.clone(),
            PropKey::Computed(computed) => match self.evaluator.evaluate(computed).to_js_string() {
              Some(key) => key,
              None => {
                items.push(RuleItem::Expression {
                  source: format!(
                    "{{ [{}]: {} }}",
                    self.program.source_of(computed.span),
                    self.program.source_of(value.span)
                  ),
                });
                continue;
              }
            },
          };
          items.extend(self.entry(&key, value));
        }
        ObjectProp::Shorthand(ident) => {
          let value = Expr::new(ExprKind::Ident(ident.clone()), ident.span);
          items.extend(self.shorthand_entry(&ident.name, &value));
        }
        ObjectProp::Spread(expr) => items.extend(self.arg_items(expr)),
        ObjectProp::Other(_) => tracing::debug!("Skipping method in style object"),
      }
    }
    items
  }

  /// `{ color }` reads a binding; its value lives outside the props slice.
  fn shorthand_entry(&mut self, key: &str, value: &Expr) -> Vec<RuleItem> {
    match self.evaluator.evaluate(value) {
      ResolvedValue::Unresolved | ResolvedValue::Function(_) => {
        let property = property_name(key);
        vec![RuleItem::Declaration(Declaration {
          value: DeclarationValue::Runtime(RuntimeExpression::new(&property, key.to_string())),
          property,
          important: false,
        })]
      }
      resolved => value_entry(key, resolved),
    }
  }

  fn entry(&mut self, key: &str, value: &'p Expr) -> Vec<RuleItem> {
    let node = self.evaluator.resolve_node(value);
    match &node.kind {
      ExprKind::Object(props) => {
        return vec![RuleItem::Rule(Rule {
          selector: key.trim().to_string(),
          items: self.object_items(props),
        })];
      }
      ExprKind::Array(_) => {
        return vec![RuleItem::Rule(Rule {
          selector: key.trim().to_string(),
          items: self.arg_items(node),
        })];
      }
      ExprKind::Template(template) if !template.exprs.is_empty() => {
        let property = property_name(key);
        let slots: Vec<Slot> = template.exprs.iter().map(|expr| self.slot(expr)).collect();
        if slots
          .iter()
          .any(|slot| !matches!(slot.value, SlotValue::Literal(_)))
        {
          let quasis: Vec<&str> = template
            .quasis
            .iter()
            .map(|quasi| quasi.cooked_or_raw())
            .collect();
          return value_template(&property, &quasis, &slots);
        }
      }
      ExprKind::Conditional { test, cons, alt } => {
        match self.evaluator.evaluate(test).truthiness() {
          Some(true) => return self.entry(key, cons),
          Some(false) => return self.entry(key, alt),
          None if self.is_rule_value(cons) || self.is_rule_value(alt) => {
            return self.runtime_rule(key, node);
          }
          None => {}
        }
      }
      ExprKind::Logical {
        op: LogicalOp::And,
        left,
        right,
      } if self.is_rule_value(right) => {
        return match self.evaluator.evaluate(left).truthiness() {
          Some(true) => self.entry(key, right),
          Some(false) => Vec::new(),
          None => self.runtime_rule(key, node),
        };
      }
      _ => {}
    }

    match self.evaluator.evaluate(node) {
      value @ (ResolvedValue::Object(_) | ResolvedValue::Array(_))
        if !value.is_fully_resolved() =>
      {
        self.runtime_rule(key, node)
      }
      ResolvedValue::Unresolved | ResolvedValue::Function(_) if is_selector_key(key) => {
        self.runtime_rule(key, node)
      }
      ResolvedValue::Unresolved | ResolvedValue::Function(_) => {
        let property = property_name(key);
        let source = self.program.source_of(node.span).to_string();
        vec![RuleItem::Declaration(Declaration {
          value: DeclarationValue::Runtime(RuntimeExpression::new(&property, source)),
          property,
          important: false,
        })]
      }
      resolved => value_entry(key, resolved),
    }
  }

  fn is_rule_value(&self, expr: &'p Expr) -> bool {
    matches!(
      self.evaluator.resolve_node(expr).kind,
      ExprKind::Object(_) | ExprKind::Array(_)
    )
  }

  /// A nested rule whose body is only known at runtime.
  fn runtime_rule(&self, key: &str, node: &Expr) -> Vec<RuleItem> {
    tracing::debug!(key, "Nested style object is only known at runtime");
    vec![RuleItem::Rule(Rule {
      selector: key.trim().to_string(),
      items: self.expression(node),
    })]
  }
}

/// Keys that can only name a nested rule, never a property.
fn is_selector_key(key: &str) -> bool {
  let key = key.trim();
  key.starts_with([':', '&', '@', '[', '>', '+', '~', '*', '.', '#'])
    || key.contains([' ', ','])
}

/// A property whose template value mixes known text with runtime slots.
fn value_template(property: &str, quasis: &[&str], slots: &[Slot]) -> Vec<RuleItem> {
  let head = format!("{}: {}", property, quasis.first().copied().unwrap_or_default());
  let mut texts = vec![head.as_str()];
  texts.extend(quasis.iter().skip(1).copied());
  parse_text(&texts, slots)
}

fn value_entry(key: &str, value: ResolvedValue) -> Vec<RuleItem> {
  match value {
    ResolvedValue::String(text) => {
      let (text, important) = split_important(&text);
      vec![RuleItem::Declaration(Declaration::literal(
        property_name(key),
        CssLiteral::String {
          value: text.trim().to_string(),
        },
        important,
      ))]
    }
    ResolvedValue::Number(value) => vec![RuleItem::Declaration(Declaration::literal(
      property_name(key),
      CssLiteral::Number {
        value,
        add_unit: true,
      },
      false,
    ))],
    ResolvedValue::Object(_) | ResolvedValue::Array(_) => vec![RuleItem::Rule(Rule {
      selector: key.trim().to_string(),
      items: value_items(&value),
    })],
    ResolvedValue::Boolean(_) | ResolvedValue::Null | ResolvedValue::Undefined => Vec::new(),
    ResolvedValue::Function(_) | ResolvedValue::Unresolved => {
      tracing::debug!(key, "Skipping unresolved member of a style object");
      Vec::new()
    }
  }
}

/// Items of a style object known entirely at build time.
pub fn value_items(value: &ResolvedValue) -> Vec<RuleItem> {
  match value {
    ResolvedValue::Object(map) => object_value_items(map),
    ResolvedValue::Array(values) => values.iter().flat_map(value_items).collect(),
    ResolvedValue::String(text) => parse_text(&[text.as_str()], &[]),
    _ => Vec::new(),
  }
}

fn object_value_items(map: &IndexMap<String, ResolvedValue>) -> Vec<RuleItem> {
  map
    .iter()
    .flat_map(|(key, value)| value_entry(key, value.clone()))
    .collect()
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use tracing_test::traced_test;

  use super::*;
  use crate::config::CssInJsCoreConfig;
  use crate::lower::parse_module;
  use crate::scope::ScopeTree;

  fn string(property: &str, value: &str) -> RuleItem {
    RuleItem::Declaration(Declaration::literal(
      property.to_string(),
      CssLiteral::String {
        value: value.to_string(),
      },
      false,
    ))
  }

  fn number(property: &str, value: f64, add_unit: bool) -> RuleItem {
    RuleItem::Declaration(Declaration::literal(
      property.to_string(),
      CssLiteral::Number { value, add_unit },
      false,
    ))
  }

  fn runtime(property: &str, source: &str) -> RuleItem {
    RuleItem::Declaration(Declaration {
      property: property.to_string(),
      value: DeclarationValue::Runtime(RuntimeExpression::new(property, source.to_string())),
      important: false,
    })
  }

  fn rule(selector: &str, items: Vec<RuleItem>) -> RuleItem {
    RuleItem::Rule(Rule {
      selector: selector.to_string(),
      items,
    })
  }

  /// Items of the last style site in `code`.
  fn site_items(code: &str) -> Vec<RuleItem> {
    let program = parse_module(code).expect("module parses");
    let scopes = ScopeTree::build(&program);
    let config = CssInJsCoreConfig::default();
    let mut evaluator = Evaluator::new(&scopes, &config);
    let mut parser = StyleParser::new(&mut evaluator);
    let site = program.sites.last().expect("module has a style site");
    parser.parse_args(&site.args).items
  }

  #[test]
  fn scans_declarations_and_nested_rules() {
    let items = parse_text(
      &["color: blue; opacity: 0.8; :hover { color: purple; opacity: 1 }"],
      &[],
    );
    assert_eq!(
      items,
      vec![
        string("color", "blue"),
        number("opacity", 0.8, false),
        rule(
          ":hover",
          vec![string("color", "purple"), number("opacity", 1.0, false)]
        ),
      ]
    );
  }

  #[test]
  fn ignores_comments_and_keeps_quoted_text() {
    let items = parse_text(
      &["/* a; b { */ content: \"a;b{}\"; background: url(data:image/png;base64,AA)"],
      &[],
    );
    assert_eq!(
      items,
      vec![
        string("content", "\"a;b{}\""),
        string("background", "url(data:image/png;base64,AA)"),
      ]
    );
  }

  #[test]
  fn recovers_from_unbalanced_braces() {
    assert_eq!(
      parse_text(&["color: red; } :hover { color: blue"], &[]),
      vec![
        string("color", "red"),
        rule(":hover", vec![string("color", "blue")]),
      ]
    );
  }

  #[test]
  fn splits_important() {
    let items = parse_text(&["color: red !important;"], &[]);
    assert_eq!(
      items,
      vec![RuleItem::Declaration(Declaration::literal(
        "color".into(),
        CssLiteral::String {
          value: "red".into()
        },
        true,
      ))]
    );
  }

  #[test]
  fn slots_fill_values() {
    let slots = vec![
      Slot {
        source: "size".into(),
        value: SlotValue::Literal(ResolvedValue::Number(12.0)),
      },
      Slot::unresolved("props.color"),
      Slot::unresolved("n"),
    ];
    let items = parse_text(
      &["font-size: ", "; color: ", "; margin: ", "px auto;"],
      &slots,
    );
    assert_eq!(
      items,
      vec![
        number("font-size", 12.0, true),
        runtime("color", "props.color"),
        runtime("margin", "`${n}px auto`"),
      ]
    );
  }

  #[test]
  fn resolved_strings_expand_into_declarations() {
    let slots = vec![Slot {
      source: "base".into(),
      value: SlotValue::Literal(ResolvedValue::String("color: red; display: block;".into())),
    }];
    assert_eq!(
      parse_text(&["", " opacity: 1;"], &slots),
      vec![
        string("color", "red"),
        string("display", "block"),
        number("opacity", 1.0, false),
      ]
    );
  }

  #[test]
  fn falsy_slots_disappear() {
    let slots = vec![Slot {
      source: "isActive && 'color: red;'".into(),
      value: SlotValue::Literal(ResolvedValue::Boolean(false)),
    }];
    assert_eq!(
      parse_text(&["display: block; ", " opacity: 1;"], &slots),
      vec![string("display", "block"), number("opacity", 1.0, false)]
    );
  }

  #[test]
  fn statement_slots_become_expressions_or_splice() {
    let slots = vec![
      Slot::unresolved("mixin"),
      Slot {
        source: "base".into(),
        value: SlotValue::Items(vec![string("color", "red")]),
      },
      Slot::unresolved("prop"),
    ];
    let items = parse_text(&["\n  ", ";\n  ", "\n  ", ": red;"], &slots);
    assert_eq!(
      items,
      vec![
        RuleItem::Expression {
          source: "mixin".into()
        },
        string("color", "red"),
        RuleItem::Expression {
          source: "`${prop}: red`".into()
        },
      ]
    );
  }

  #[test]
  #[traced_test]
  fn selector_slots_are_dropped() {
    let slots = vec![Slot::unresolved("child")];
    assert_eq!(
      parse_text(&["& > ", " { color: red }"], &slots),
      vec![rule("& >", vec![string("color", "red")])]
    );
    assert!(logs_contain("Dropping interpolation in selector"));
  }

  #[test]
  fn joins_selectors() {
    assert_eq!(join_selector("&", ":hover"), "&:hover");
    assert_eq!(join_selector("&", "& > div"), "& > div");
    assert_eq!(join_selector("&", "div"), "& div");
    assert_eq!(join_selector("&:hover", "span, :focus"), "&:hover span, &:hover:focus");
    assert_eq!(
      split_selector_list(":is(a, b), c"),
      vec![":is(a, b)".to_string(), "c".to_string()]
    );
  }

  #[test]
  fn flattens_at_rules_and_selectors() {
    let root = Rule::root(vec![rule(
      "@media screen",
      vec![rule(":hover", vec![string("color", "red")])],
    )]);
    let flat = root.flatten();
    assert_eq!(flat.len(), 1);
    match &flat[0] {
      FlatItem::Declaration {
        selector, at_rules, ..
      } => {
        assert_eq!(selector, "&:hover");
        assert_eq!(at_rules, &vec!["@media screen".to_string()]);
      }
      other => panic!("unexpected item {:?}", other),
    }
  }

  #[test]
  fn object_form_nests_and_kebab_cases() {
    let items = site_items(
      "const size = 12;
       css({ fontSize: size, ':hover': { backgroundColor: 'red' }, zIndex: 2, hidden: false });",
    );
    assert_eq!(
      items,
      vec![
        number("font-size", 12.0, true),
        rule(":hover", vec![string("background-color", "red")]),
        number("z-index", 2.0, true),
      ]
    );
  }

  #[test]
  fn object_form_keeps_unresolved_sources() {
    let items = site_items(
      "const base = { color: 'red' };
       css({ ...base, padding: props.space, margin: `${gap}px 0`, [key]: 1 });",
    );
    assert_eq!(
      items,
      vec![
        string("color", "red"),
        runtime("padding", "props.space"),
        runtime("margin", "`${gap}px 0`"),
        RuleItem::Expression {
          source: "{ [key]: 1 }".into()
        },
      ]
    );
  }

  #[test]
  fn templates_splice_objects_and_helpers() {
    let items = site_items(
      "const base = css({ color: 'red' });
       const gap = 4;
       css`${base}; padding: ${gap}px; width: ${gap};`;",
    );
    assert_eq!(
      items,
      vec![
        string("color", "red"),
        string("padding", "4px"),
        number("width", 4.0, true),
      ]
    );
  }

  #[test]
  fn nested_values_keep_unresolved_leaves() {
    let items = site_items(
      "const on = true;
       const mk = (c) => ({ color: c });
       css({
         ':hover': on ? { color: props.c } : {},
         ':focus': mk(props.c),
         ':active': props.on && { color: 'red' },
         '&:visited': theme.visited,
       });",
    );
    let expression = |source: &str| RuleItem::Expression {
      source: source.into(),
    };
    assert_eq!(
      items,
      vec![
        rule(":hover", vec![runtime("color", "props.c")]),
        rule(":focus", vec![expression("mk(props.c)")]),
        rule(":active", vec![expression("props.on && { color: 'red' }")]),
        rule("&:visited", vec![expression("theme.visited")]),
      ]
    );
  }

  #[test]
  fn conditional_arguments() {
    let items = site_items(
      "const on = true;
       css(on ? { color: 'red' } : { color: 'blue' }, props.x && { a: 1 });",
    );
    assert_eq!(
      items,
      vec![
        string("color", "red"),
        RuleItem::Expression {
          source: "props.x && { a: 1 }".into()
        },
      ]
    );
  }
}
