//! Static evaluation of expressions against a [`ScopeTree`].
//!
//! Evaluation never fails: anything outside the supported, side-effect free
//! subset comes back as [`ResolvedValue::Unresolved`] and the caller emits a
//! runtime fallback for it.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use crate::ast::*;
use crate::config::CssInJsCoreConfig;
use crate::scope::{
  Access, BindingId, BindingInit, BindingKind, DeclaratorId, DestructureSource, PathStep,
  ScopeTree,
};
use crate::value::{ResolvedValue, to_int32};

fn bail(reason: &str) -> ResolvedValue {
  tracing::trace!(reason, "Expression is unresolved");
  ResolvedValue::Unresolved
}

/// Arguments of a local function call in progress.
#[derive(Debug)]
struct CallFrame {
  function: FunctionId,
  args: Vec<ResolvedValue>,
  /// Length of `visiting` when the call started.
  depth: usize,
}

pub struct Evaluator<'a, 'p> {
  scopes: &'a ScopeTree<'p>,
  config: &'a CssInJsCoreConfig,
  /// Bindings whose value is being computed right now.
  visiting: IndexSet<BindingId>,
  frames: Vec<CallFrame>,
  memo: HashMap<BindingId, ResolvedValue>,
  declarators: HashMap<DeclaratorId, ResolvedValue>,
  /// Shallowest `visiting` depth a cycle or recursion cut has reached back to
  /// since the innermost binding started. A value computed below that depth
  /// depends on what is being evaluated around it and is not memoised.
  cut_depth: usize,
}

impl<'a, 'p> Evaluator<'a, 'p> {
  pub fn new(scopes: &'a ScopeTree<'p>, config: &'a CssInJsCoreConfig) -> Self {
    Evaluator {
      scopes,
      config,
      visiting: IndexSet::new(),
      frames: Vec::new(),
      memo: HashMap::new(),
      declarators: HashMap::new(),
      cut_depth: usize::MAX,
    }
  }

  pub fn scopes(&self) -> &'a ScopeTree<'p> {
    self.scopes
  }

  pub fn config(&self) -> &'a CssInJsCoreConfig {
    self.config
  }

  pub fn evaluate(&mut self, expr: &Expr) -> ResolvedValue {
    match &expr.kind {
      ExprKind::Lit(lit) => match lit {
        Lit::Str(value) => ResolvedValue::String(value.clone()),
        Lit::Num(value) => ResolvedValue::Number(*value),
        Lit::Bool(value) => ResolvedValue::Boolean(*value),
        Lit::Null => ResolvedValue::Null,
      },
      ExprKind::Ident(ident) => self.identifier(ident),
      ExprKind::Member { obj, prop } => self.member(obj, prop),
      ExprKind::Object(props) => self.object(props),
      ExprKind::Array(elems) => self.array(elems),
      ExprKind::Template(template) => self.template(template, false),
      ExprKind::TaggedTemplate { tag, template } => match tag.as_ident() {
        Some(tag) if self.is_style_helper(tag) => self.template(template, true),
        _ => bail("tagged template"),
      },
      ExprKind::Unary { op, arg } => self.unary(*op, arg),
      ExprKind::Binary { op, left, right } => {
        let left = self.evaluate(left);
        if left.is_unresolved() {
          return bail("binary operand");
        }
        let right = self.evaluate(right);
        binary(*op, &left, &right)
      }
      ExprKind::Logical { op, left, right } => {
        let left = self.evaluate(left);
        if left.is_unresolved() {
          return bail("logical operand");
        }
        let right = self.evaluate(right);
        if right.is_unresolved() {
          return bail("logical operand");
        }
        let take_left = match op {
          LogicalOp::And => left.truthiness() == Some(false),
          LogicalOp::Or => left.truthiness() == Some(true),
          LogicalOp::Nullish => !left.is_nullish(),
        };
        if take_left { left } else { right }
      }
      ExprKind::Conditional { test, cons, alt } => match self.evaluate(test).truthiness() {
        Some(true) => self.evaluate(cons),
        Some(false) => self.evaluate(alt),
        None => bail("conditional test"),
      },
      ExprKind::Call { callee, args } => self.call(callee, args),
      ExprKind::Function(id) => ResolvedValue::Function(*id),
      ExprKind::This => bail("this"),
      ExprKind::Assign { .. } | ExprKind::Update { .. } => bail("assignment"),
      ExprKind::Sequence(_) => bail("sequence"),
      ExprKind::Other(_) => bail("unsupported expression"),
    }
  }

  /// Follows immutable bindings, static member projections and style helper
  /// wrappers back to the node that produces the value.
  pub fn resolve_node<'e>(&self, expr: &'e Expr) -> &'e Expr
  where
    'p: 'e,
  {
    let mut seen = Vec::new();
    self.resolve_node_inner(expr, &mut seen)
  }

  fn resolve_node_inner<'e>(&self, expr: &'e Expr, seen: &mut Vec<BindingId>) -> &'e Expr
  where
    'p: 'e,
  {
    match &expr.kind {
      ExprKind::Ident(ident) => {
        let Some(binding) = self.scopes.lookup(&ident.name, ident.scope) else {
          return expr;
        };
        match &binding.init {
          BindingInit::Expr(init) if !binding.mutable && !seen.contains(&binding.id) => {
            seen.push(binding.id);
            self.resolve_node_inner(*init, seen)
          }
          _ => expr,
        }
      }
      ExprKind::Member {
        obj,
        prop: MemberProp::Name(name),
      } => {
        let base = self.resolve_node_inner(obj, seen);
        let ExprKind::Object(props) = &base.kind else {
          return expr;
        };
        let found = props.iter().rev().find_map(|prop| match prop {
          ObjectProp::KeyValue {
            key: PropKey::Static(key),
            value,
          } if key == name => Some(value),
          _ => None,
        });
        match found {
          Some(value) => self.resolve_node_inner(value, seen),
          None => expr,
        }
      }
      ExprKind::Call { callee, args } if args.len() == 1 => match callee.as_ident() {
        Some(helper) if self.is_style_helper(helper) => self.resolve_node_inner(&args[0], seen),
        _ => expr,
      },
      _ => expr,
    }
  }

  /// Style helpers only count when the name is global or imported.
  pub fn is_style_helper(&self, ident: &Ident) -> bool {
    if !self.config.is_style_helper(&ident.name) {
      return false;
    }
    match self.scopes.lookup(&ident.name, ident.scope) {
      None => true,
      Some(binding) => binding.kind == BindingKind::Import,
    }
  }

  fn identifier(&mut self, ident: &Ident) -> ResolvedValue {
    match self.scopes.lookup(&ident.name, ident.scope) {
      Some(binding) => self.binding_value(binding.id),
      None => match ident.name.as_str() {
        "undefined" => ResolvedValue::Undefined,
        "NaN" => ResolvedValue::Number(f64::NAN),
        "Infinity" => ResolvedValue::Number(f64::INFINITY),
        _ => bail("external binding"),
      },
    }
  }

  fn binding_value(&mut self, id: BindingId) -> ResolvedValue {
    let scopes = self.scopes;
    let binding = scopes.binding(id);
    if binding.mutable {
      tracing::trace!(name = %binding.name, "Binding is reassigned");
      return ResolvedValue::Unresolved;
    }
    if let Some(value) = self.memo.get(&id) {
      return value.clone();
    }
    if let Some(index) = self.visiting.get_index_of(&id) {
      tracing::trace!(name = %binding.name, "Binding refers to itself");
      self.cut_depth = self.cut_depth.min(index + 1);
      return ResolvedValue::Unresolved;
    }

    self.visiting.insert(id);
    let depth = self.visiting.len();
    let outer_cut = std::mem::replace(&mut self.cut_depth, usize::MAX);
    let value = match &binding.init {
      BindingInit::None => ResolvedValue::Undefined,
      BindingInit::Expr(init) => self.evaluate(init),
      BindingInit::Function(function) => ResolvedValue::Function(*function),
      BindingInit::Opaque => bail("opaque binding"),
      BindingInit::Destructured { source, path } => {
        let root = match source {
          DestructureSource::Declarator { id, init } => {
            self.declarator_value(*id, init, binding.in_function)
          }
          DestructureSource::Param { function, index } => self.argument(*function, *index),
        };
        self.apply_path(root, path)
      }
    };
    self.visiting.shift_remove(&id);
    let inner_cut = self.cut_depth;
    self.cut_depth = outer_cut.min(inner_cut);

    // Cuts back to this binding or deeper give the same result on every visit.
    if !binding.in_function && inner_cut >= depth {
      self.memo.insert(id, value.clone());
    }
    value
  }

  fn declarator_value(&mut self, id: DeclaratorId, init: &Expr, in_function: bool) -> ResolvedValue {
    if let Some(value) = self.declarators.get(&id) {
      return value.clone();
    }
    let depth = self.visiting.len() + 1;
    let outer_cut = std::mem::replace(&mut self.cut_depth, usize::MAX);
    let value = self.evaluate(init);
    let inner_cut = self.cut_depth;
    self.cut_depth = outer_cut.min(inner_cut);
    if !in_function && inner_cut >= depth {
      self.declarators.insert(id, value.clone());
    }
    value
  }

  fn argument(&self, function: FunctionId, index: usize) -> ResolvedValue {
    let Some(frame) = self
      .frames
      .iter()
      .rev()
      .find(|frame| frame.function == function)
    else {
      return bail("parameter outside of a call");
    };

    let declaration = self.scopes.program().function(function);
    if declaration.has_rest && index + 1 == declaration.params.len() {
      ResolvedValue::Array(frame.args.get(index..).unwrap_or_default().to_vec())
    } else {
      frame
        .args
        .get(index)
        .cloned()
        .unwrap_or(ResolvedValue::Undefined)
    }
  }

  fn apply_path(&mut self, mut value: ResolvedValue, path: &[PathStep<'_>]) -> ResolvedValue {
    for step in path {
      if value.is_unresolved() {
        return value;
      }
      value = match &step.access {
        Access::Whole => value,
        Access::Key(key) => match self.prop_key(key) {
          Some(key) => project(&value, &key),
          None => return bail("computed destructuring key"),
        },
        Access::Index(index) => project(&value, &index.to_string()),
        Access::ObjectRest(keys) => {
          let ResolvedValue::Object(map) = value else {
            return bail("object rest of a non-object");
          };
          let mut excluded = Vec::with_capacity(keys.len());
          for key in keys {
            match self.prop_key(key) {
              Some(key) => excluded.push(key),
              None => return bail("computed destructuring key"),
            }
          }
          ResolvedValue::Object(
            map
              .into_iter()
              .filter(|(key, _)| !excluded.contains(key))
              .collect(),
          )
        }
        Access::ArrayRest(start) => match value {
          ResolvedValue::Array(items) => {
            ResolvedValue::Array(items.get(*start..).unwrap_or_default().to_vec())
          }
          _ => return bail("array rest of a non-array"),
        },
      };
      if value == ResolvedValue::Undefined {
        if let Some(default) = step.default {
          value = self.evaluate(default);
        }
      }
    }
    value
  }

  fn prop_key(&mut self, key: &PropKey) -> Option<String> {
    match key {
      PropKey::Static(key) => Some(key.clone()),
      PropKey::Computed(expr) => property_key(&self.evaluate(expr)),
    }
  }

  fn member(&mut self, obj: &Expr, prop: &MemberProp) -> ResolvedValue {
    if !is_supported_base(obj) {
      return bail("member access base");
    }
    let base = self.evaluate(obj);
    if base.is_unresolved() {
      return base;
    }
    let key = match prop {
      MemberProp::Name(name) => name.clone(),
      MemberProp::Computed(expr) => match property_key(&self.evaluate(expr)) {
        Some(key) => key,
        None => return bail("computed member key"),
      },
    };
    project(&base, &key)
  }

  fn object(&mut self, props: &[ObjectProp]) -> ResolvedValue {
    let mut map = IndexMap::new();
    for prop in props {
      match prop {
        ObjectProp::KeyValue { key, value } => {
          let Some(key) = self.prop_key(key) else {
            return bail("computed object key");
          };
          let value = self.evaluate(value);
          map.insert(key, value);
        }
        ObjectProp::Shorthand(ident) => {
          let value = self.identifier(ident);
          map.insert(ident.name.clone(), value);
        }
        ObjectProp::Spread(expr) => match self.evaluate(expr) {
          ResolvedValue::Object(spread) => map.extend(spread),
          ResolvedValue::Array(items) => {
            map.extend(
              items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (index.to_string(), item)),
            );
          }
          ResolvedValue::String(text) => {
            map.extend(
              text
                .chars()
                .enumerate()
                .map(|(index, ch)| (index.to_string(), ResolvedValue::String(ch.to_string()))),
            );
          }
          ResolvedValue::Null | ResolvedValue::Undefined | ResolvedValue::Boolean(_)
          | ResolvedValue::Number(_) => {}
          ResolvedValue::Function(_) | ResolvedValue::Unresolved => {
            return bail("object spread");
          }
        },
        ObjectProp::Other(_) => return bail("object method or accessor"),
      }
    }
    ResolvedValue::Object(map)
  }

  fn array(&mut self, elems: &[ArrayElem]) -> ResolvedValue {
    let mut items = Vec::with_capacity(elems.len());
    for elem in elems {
      match elem {
        ArrayElem::Expr(expr) => items.push(self.evaluate(expr)),
        ArrayElem::Hole => items.push(ResolvedValue::Undefined),
        ArrayElem::Spread(expr) => match self.evaluate(expr) {
          ResolvedValue::Array(spread) => items.extend(spread),
          ResolvedValue::String(text) => {
            items.extend(text.chars().map(|ch| ResolvedValue::String(ch.to_string())));
          }
          _ => return bail("array spread"),
        },
      }
    }
    ResolvedValue::Array(items)
  }

  /// Helper templates keep their raw text, since it is style source.
  fn template(&mut self, template: &Template, raw: bool) -> ResolvedValue {
    let mut text = String::new();
    for (index, quasi) in template.quasis.iter().enumerate() {
      if raw {
        text.push_str(&quasi.raw);
      } else {
        text.push_str(quasi.cooked_or_raw());
      }
      if let Some(expr) = template.exprs.get(index) {
        match self.evaluate(expr).to_js_string() {
          Some(part) => text.push_str(&part),
          None => return bail("template substitution"),
        }
      }
    }
    ResolvedValue::String(text)
  }

  fn unary(&mut self, op: UnaryOp, arg: &Expr) -> ResolvedValue {
    if op == UnaryOp::Void {
      return ResolvedValue::Undefined;
    }
    let value = self.evaluate(arg);
    let folded = match op {
      UnaryOp::Minus => value.to_number().map(|number| ResolvedValue::Number(-number)),
      UnaryOp::Plus => value.to_number().map(ResolvedValue::Number),
      UnaryOp::Not => value.truthiness().map(|truthy| ResolvedValue::Boolean(!truthy)),
      UnaryOp::BitNot => value
        .to_number()
        .map(|number| ResolvedValue::Number(f64::from(!to_int32(number)))),
      UnaryOp::TypeOf => value
        .type_of()
        .map(|name| ResolvedValue::String(name.to_string())),
      UnaryOp::Void => Some(ResolvedValue::Undefined),
    };
    folded.unwrap_or_else(|| bail("unary operand"))
  }

  fn call(&mut self, callee: &Expr, args: &[Expr]) -> ResolvedValue {
    if let Some(ident) = callee.as_ident() {
      if self.is_style_helper(ident) {
        return match args {
          [single] => self.evaluate(single),
          _ => bail("style helper arity"),
        };
      }
    }

    let ResolvedValue::Function(id) = self.evaluate(callee) else {
      return bail("callee is not a local function");
    };
    let program = self.scopes.program();
    let function = program.function(id);
    let Some(body) = function.returned_expr() else {
      return bail("function body is not a single expression");
    };
    if let Some(frame) = self.frames.iter().find(|frame| frame.function == id) {
      self.cut_depth = self.cut_depth.min(frame.depth);
      return bail("recursive call");
    }

    let args = args.iter().map(|arg| self.evaluate(arg)).collect();
    self.frames.push(CallFrame {
      function: id,
      args,
      depth: self.visiting.len(),
    });
    let value = self.evaluate(body);
    self.frames.pop();
    value
  }
}

/// Bases a member access may start from: identifiers, object literals, member
/// chains over those, and a single call.
fn is_supported_base(expr: &Expr) -> bool {
  match &expr.kind {
    ExprKind::Ident(_) | ExprKind::Object(_) | ExprKind::Lit(Lit::Str(_)) => true,
    ExprKind::Member { obj, .. } => is_supported_base(obj),
    ExprKind::Call { callee, .. } => match &callee.kind {
      ExprKind::Ident(_) => true,
      ExprKind::Member { obj, .. } => !contains_call(obj) && is_supported_base(obj),
      _ => false,
    },
    _ => false,
  }
}

fn contains_call(expr: &Expr) -> bool {
  match &expr.kind {
    ExprKind::Call { .. } => true,
    ExprKind::Member { obj, .. } => contains_call(obj),
    _ => false,
  }
}

fn property_key(value: &ResolvedValue) -> Option<String> {
  match value {
    ResolvedValue::String(key) => Some(key.clone()),
    ResolvedValue::Number(_)
    | ResolvedValue::Boolean(_)
    | ResolvedValue::Null
    | ResolvedValue::Undefined => value.to_js_string(),
    _ => None,
  }
}

fn project(base: &ResolvedValue, key: &str) -> ResolvedValue {
  match base {
    ResolvedValue::Object(map) => map.get(key).cloned().unwrap_or(ResolvedValue::Undefined),
    ResolvedValue::Array(items) => {
      if key == "length" {
        return ResolvedValue::Number(items.len() as f64);
      }
      match array_index(key) {
        Some(index) => items.get(index).cloned().unwrap_or(ResolvedValue::Undefined),
        None => bail("array method"),
      }
    }
    ResolvedValue::String(text) => {
      if key == "length" {
        return ResolvedValue::Number(text.encode_utf16().count() as f64);
      }
      match array_index(key) {
        Some(index) => text
          .chars()
          .nth(index)
          .map(|ch| ResolvedValue::String(ch.to_string()))
          .unwrap_or(ResolvedValue::Undefined),
        None => bail("string method"),
      }
    }
    _ => bail("member of a primitive"),
  }
}

fn array_index(key: &str) -> Option<usize> {
  let index: usize = key.parse().ok()?;
  (index.to_string() == key).then_some(index)
}

fn binary(op: BinaryOp, left: &ResolvedValue, right: &ResolvedValue) -> ResolvedValue {
  if left.is_unresolved() || right.is_unresolved() {
    return bail("binary operand");
  }
  let number = |value: f64| ResolvedValue::Number(value);
  let numbers = || Some((left.to_number()?, right.to_number()?));
  let folded = match op {
    BinaryOp::Add => add(left, right),
    BinaryOp::Sub => numbers().map(|(a, b)| number(a - b)),
    BinaryOp::Mul => numbers().map(|(a, b)| number(a * b)),
    BinaryOp::Div => numbers().map(|(a, b)| number(a / b)),
    BinaryOp::Mod => numbers().map(|(a, b)| number(a % b)),
    BinaryOp::Exp => numbers().map(|(a, b)| {
      if b.is_nan() {
        number(f64::NAN)
      } else {
        number(a.powf(b))
      }
    }),
    BinaryOp::EqEqEq => left.strict_equals(right).map(ResolvedValue::Boolean),
    BinaryOp::NotEqEq => left
      .strict_equals(right)
      .map(|equal| ResolvedValue::Boolean(!equal)),
    BinaryOp::EqEq => left.loose_equals(right).map(ResolvedValue::Boolean),
    BinaryOp::NotEq => left
      .loose_equals(right)
      .map(|equal| ResolvedValue::Boolean(!equal)),
    BinaryOp::Lt => compare(left, right, |ordering| ordering.is_lt()),
    BinaryOp::LtEq => compare(left, right, |ordering| ordering.is_le()),
    BinaryOp::Gt => compare(left, right, |ordering| ordering.is_gt()),
    BinaryOp::GtEq => compare(left, right, |ordering| ordering.is_ge()),
    BinaryOp::BitAnd => numbers().map(|(a, b)| number(f64::from(to_int32(a) & to_int32(b)))),
    BinaryOp::BitOr => numbers().map(|(a, b)| number(f64::from(to_int32(a) | to_int32(b)))),
    BinaryOp::BitXor => numbers().map(|(a, b)| number(f64::from(to_int32(a) ^ to_int32(b)))),
    BinaryOp::LShift => numbers().map(|(a, b)| {
      number(f64::from(to_int32(a).wrapping_shl(to_int32(b) as u32 & 31)))
    }),
    BinaryOp::RShift => numbers().map(|(a, b)| {
      number(f64::from(to_int32(a).wrapping_shr(to_int32(b) as u32 & 31)))
    }),
    BinaryOp::ZeroFillRShift => numbers().map(|(a, b)| {
      number(f64::from((to_int32(a) as u32).wrapping_shr(to_int32(b) as u32 & 31)))
    }),
    BinaryOp::Relational => None,
  };
  folded.unwrap_or_else(|| bail("binary operator"))
}

fn add(left: &ResolvedValue, right: &ResolvedValue) -> Option<ResolvedValue> {
  let stringish = |value: &ResolvedValue| {
    matches!(
      value,
      ResolvedValue::String(_) | ResolvedValue::Object(_) | ResolvedValue::Array(_)
    )
  };
  if matches!(left, ResolvedValue::Function(_)) || matches!(right, ResolvedValue::Function(_)) {
    return None;
  }
  if stringish(left) || stringish(right) {
    let mut text = left.to_js_string()?;
    text.push_str(&right.to_js_string()?);
    return Some(ResolvedValue::String(text));
  }
  Some(ResolvedValue::Number(left.to_number()? + right.to_number()?))
}

fn compare(
  left: &ResolvedValue,
  right: &ResolvedValue,
  test: impl Fn(std::cmp::Ordering) -> bool,
) -> Option<ResolvedValue> {
  if let (ResolvedValue::String(a), ResolvedValue::String(b)) = (left, right) {
    let ordering = a.encode_utf16().cmp(b.encode_utf16());
    return Some(ResolvedValue::Boolean(test(ordering)));
  }
  let (a, b) = (left.to_number()?, right.to_number()?);
  Some(ResolvedValue::Boolean(
    a.partial_cmp(&b).is_some_and(&test),
  ))
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::lower::parse_module;

  /// Evaluates the initializer of the last top-level declaration.
  fn evaluate_last(code: &str) -> ResolvedValue {
    let program = parse_module(code).unwrap();
    let scopes = ScopeTree::build(&program);
    let config = CssInJsCoreConfig::default();
    let mut evaluator = Evaluator::new(&scopes, &config);
    let init = program
      .body
      .iter()
      .rev()
      .find_map(|stmt| match stmt {
        Stmt::Var { decls, .. } => decls.last().and_then(|decl| decl.init.as_ref()),
        _ => None,
      })
      .unwrap();
    evaluator.evaluate(init)
  }

  fn string(value: &str) -> ResolvedValue {
    ResolvedValue::String(value.to_string())
  }

  #[test]
  fn folds_arithmetic() {
    assert_eq!(evaluate_last("const a = 8 * 2;"), ResolvedValue::Number(16.0));
    assert_eq!(evaluate_last("const a = `${8 * 2}px`;"), string("16px"));
    assert_eq!(evaluate_last("const a = '1' + 2;"), string("12"));
    assert_eq!(evaluate_last("const a = 7 % 4 ** 2 - -1;"), ResolvedValue::Number(8.0));
  }

  #[test]
  fn resolves_immutable_bindings() {
    assert_eq!(
      evaluate_last("let x = 20; const a = x;"),
      ResolvedValue::Number(20.0)
    );
  }

  #[test]
  fn reassigned_bindings_are_unresolved() {
    assert_eq!(
      evaluate_last("let m = 2; const a = m; m = 1;"),
      ResolvedValue::Unresolved
    );
    assert_eq!(
      evaluate_last("let m = 2; m = 1; const a = m;"),
      ResolvedValue::Unresolved
    );
  }

  #[test]
  fn self_reference_terminates() {
    assert_eq!(
      evaluate_last("let heading = heading || 20; const a = heading;"),
      ResolvedValue::Unresolved
    );
    assert_eq!(
      evaluate_last("const a = b; const b = a; const c = a;"),
      ResolvedValue::Unresolved
    );
  }

  #[test]
  fn cut_cycles_are_evaluated_once() {
    let mut code = String::from("let a0 = a0 || 1;\n");
    for index in 1..=40 {
      code.push_str(&format!("const a{} = a{} + a{};\n", index, index - 1, index - 1));
    }
    assert_eq!(evaluate_last(&code), ResolvedValue::Unresolved);

    let mut code = String::from("const b0 = 1;\n");
    for index in 1..=40 {
      code.push_str(&format!("const b{} = b{} + b{};\n", index, index - 1, index - 1));
    }
    assert_eq!(evaluate_last(&code), ResolvedValue::Number(2f64.powi(40)));
  }

  #[test]
  fn parameter_defaults_fill_missing_arguments() {
    assert_eq!(
      evaluate_last("const gap = (size = 4, unit = 'px') => size * 2 + unit; const a = gap();"),
      string("8px")
    );
    assert_eq!(
      evaluate_last("const gap = (size = 4) => size * 2; const a = gap(undefined) + gap(10);"),
      ResolvedValue::Number(28.0)
    );
  }

  #[test]
  fn destructuring_projects_fields() {
    assert_eq!(
      evaluate_last("const a = { x: { y: 5 } }; const { y } = a.x; const b = y;"),
      ResolvedValue::Number(5.0)
    );
    assert_eq!(
      evaluate_last("const [first, , third = 3] = [1, 2]; const b = first + third;"),
      ResolvedValue::Number(4.0)
    );
    assert_eq!(
      evaluate_last("const { a, ...rest } = { a: 1, b: 2, c: 3 }; const d = rest.c;"),
      ResolvedValue::Number(3.0)
    );
  }

  #[test]
  fn uses_the_declaration_scope() {
    assert_eq!(
      evaluate_last("const size = 4; const double = size * 2; function f() { const size = 100; } const a = double;"),
      ResolvedValue::Number(8.0)
    );
  }

  #[test]
  fn calls_local_pure_functions() {
    assert_eq!(
      evaluate_last("const foo = () => ({ bar: 14 }); const a = foo().bar;"),
      ResolvedValue::Number(14.0)
    );
    assert_eq!(
      evaluate_last("function spacing(n = 1) { return n * 8; } const a = `${spacing()}px ${spacing(2)}px`;"),
      string("8px 16px")
    );
    assert_eq!(
      evaluate_last("const pick = ({ color }, ...rest) => color + rest.length; const a = pick({ color: 'red' }, 1, 2);"),
      string("red2")
    );
  }

  #[test]
  fn recursion_is_cut() {
    assert_eq!(
      evaluate_last("const f = (n) => f(n); const a = f(1);"),
      ResolvedValue::Unresolved
    );
  }

  #[test]
  fn unsupported_shapes_degrade() {
    assert_eq!(
      evaluate_last("const a = [{ bar: 10 }][0].bar;"),
      ResolvedValue::Unresolved
    );
    assert_eq!(evaluate_last("const a = window.innerWidth;"), ResolvedValue::Unresolved);
    assert_eq!(evaluate_last("const a = new Date();"), ResolvedValue::Unresolved);
    assert_eq!(evaluate_last("const a = fetch();"), ResolvedValue::Unresolved);
  }

  #[test]
  fn computed_keys_and_conditionals() {
    assert_eq!(
      evaluate_last("const media = '@media screen'; const obj = { [media]: 1 }; const a = obj['@media screen'];"),
      ResolvedValue::Number(1.0)
    );
    assert_eq!(
      evaluate_last("const dark = false; const a = dark ? 'black' : 'white';"),
      string("white")
    );
    assert_eq!(
      evaluate_last("const a = unknown ? 'black' : 'white';"),
      ResolvedValue::Unresolved
    );
  }

  #[test]
  fn style_helpers_evaluate_to_their_argument() {
    assert_eq!(
      evaluate_last("const size = 12; const a = css`font-size: ${size}px;`;"),
      string("font-size: 12px;")
    );
    assert_eq!(
      evaluate_last("const css = (x) => 'local'; const a = css({});"),
      string("local")
    );
  }

  #[test]
  fn parameters_outside_a_call_are_unresolved() {
    let program = parse_module("const f = (a) => a;").unwrap();
    let scopes = ScopeTree::build(&program);
    let config = CssInJsCoreConfig::default();
    let mut evaluator = Evaluator::new(&scopes, &config);
    let body = program.functions[0].returned_expr().unwrap();
    assert_eq!(evaluator.evaluate(body), ResolvedValue::Unresolved);
  }

  #[test]
  fn resolve_node_follows_bindings() {
    let program = parse_module("const theme = { color: primary }; const a = theme.color;").unwrap();
    let scopes = ScopeTree::build(&program);
    let config = CssInJsCoreConfig::default();
    let evaluator = Evaluator::new(&scopes, &config);
    let Stmt::Var { decls, .. } = &program.body[1] else {
      panic!("expected a declaration");
    };
    let resolved = evaluator.resolve_node(decls[0].init.as_ref().unwrap());
    assert_eq!(program.source_of(resolved.span), "primary");
  }
}
