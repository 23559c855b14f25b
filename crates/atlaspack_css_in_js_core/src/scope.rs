//! Arena of lexical scopes and the bindings declared in them.
//!
//! Built in two passes over a lowered [`Program`]: every declaration is
//! registered first, then every write (assignment, update, `delete`, mutating
//! method call) flips the binding it reaches to mutable. Because the second
//! pass runs over the whole program before anything is evaluated, a
//! reassignment after a use site is seen just like one before it.

use indexmap::IndexMap;

use crate::ast::*;
use crate::lower::collect_pat_idents;

/// Index of a binding in [`ScopeTree::bindings`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u32);

impl BindingId {
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// Index of a `VarDeclarator`, so a destructured right-hand side is evaluated once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeclaratorId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
  Var,
  Let,
  Const,
  Param,
  Function,
  Import,
  /// Classes, catch parameters, loop variables.
  Opaque,
}

/// One projection step from a destructuring source to a bound name.
#[derive(Clone, Debug, PartialEq)]
pub enum Access<'p> {
  /// The source itself; only carries a default.
  Whole,
  Key(&'p PropKey),
  Index(usize),
  /// `...rest` in an object pattern, minus the keys listed before it.
  ObjectRest(Vec<&'p PropKey>),
  /// `...rest` in an array pattern, from this index on.
  ArrayRest(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathStep<'p> {
  pub access: Access<'p>,
  /// Used when the projected value is `undefined`.
  pub default: Option<&'p Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DestructureSource<'p> {
  Declarator { id: DeclaratorId, init: &'p Expr },
  Param { function: FunctionId, index: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub enum BindingInit<'p> {
  /// Declared without an initializer.
  None,
  Expr(&'p Expr),
  Destructured {
    source: DestructureSource<'p>,
    path: Vec<PathStep<'p>>,
  },
  Function(FunctionId),
  Opaque,
}

#[derive(Clone, Debug)]
pub struct Binding<'p> {
  pub id: BindingId,
  pub name: String,
  pub scope: ScopeId,
  pub kind: BindingKind,
  pub init: BindingInit<'p>,
  pub mutable: bool,
  /// Declared somewhere inside a function, so its value may depend on a call.
  pub in_function: bool,
  pub span: Span,
}

#[derive(Clone, Debug, Default)]
pub struct Scope {
  pub parent: Option<ScopeId>,
  pub bindings: IndexMap<String, BindingId>,
  /// Parameters and `var` declarations land here.
  pub is_function: bool,
}

pub struct ScopeTree<'p> {
  program: &'p Program,
  scopes: Vec<Scope>,
  bindings: Vec<Binding<'p>>,
  declarators: u32,
}

const MUTATING_METHODS: &[&str] = &[
  "push",
  "pop",
  "shift",
  "unshift",
  "splice",
  "sort",
  "reverse",
  "fill",
  "copyWithin",
  "set",
  "delete",
  "clear",
  "add",
];

impl<'p> ScopeTree<'p> {
  pub fn build(program: &'p Program) -> Self {
    let mut scopes: Vec<Scope> = program
      .scope_parents
      .iter()
      .map(|parent| Scope {
        parent: *parent,
        ..Default::default()
      })
      .collect();
    if scopes.is_empty() {
      scopes.push(Scope::default());
    }
    scopes[ScopeId::MODULE.index()].is_function = true;
    for function in &program.functions {
      if let Some(scope) = scopes.get_mut(function.scope.index()) {
        scope.is_function = true;
      }
    }

    let mut tree = ScopeTree {
      program,
      scopes,
      bindings: Vec::new(),
      declarators: 0,
    };

    tree.declare_stmts(&program.body);
    for function in &program.functions {
      tree.declare_function(function);
    }

    let mut writes = WriteCollector::default();
    writes.stmts(&program.body);
    for function in &program.functions {
      for param in &function.params {
        writes.pat_defaults(param);
      }
      match &function.body {
        FunctionBody::Expr(expr) => writes.expr(expr),
        FunctionBody::Block(stmts) => writes.stmts(stmts),
      }
    }
    for ident in writes.idents {
      if let Some(id) = tree.lookup_id(&ident.name, ident.scope) {
        let binding = &mut tree.bindings[id.index()];
        if !binding.mutable {
          tracing::trace!(name = %binding.name, "Binding is reassigned");
        }
        binding.mutable = true;
      }
    }

    tracing::debug!(
      scopes = tree.scopes.len(),
      bindings = tree.bindings.len(),
      "Built scope tree"
    );
    tree
  }

  pub fn program(&self) -> &'p Program {
    self.program
  }

  pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
    self.scopes.get(id.index())
  }

  pub fn binding(&self, id: BindingId) -> &Binding<'p> {
    &self.bindings[id.index()]
  }

  pub fn bindings(&self) -> &[Binding<'p>] {
    &self.bindings
  }

  /// Walks the parent chain from `scope`. `None` means the name is external.
  pub fn lookup(&self, name: &str, scope: ScopeId) -> Option<&Binding<'p>> {
    self.lookup_id(name, scope).map(|id| self.binding(id))
  }

  fn lookup_id(&self, name: &str, scope: ScopeId) -> Option<BindingId> {
    let mut current = Some(scope);
    while let Some(id) = current {
      let scope = self.scopes.get(id.index())?;
      if let Some(binding) = scope.bindings.get(name) {
        return Some(*binding);
      }
      current = scope.parent;
    }
    None
  }

  fn hoist_target(&self, scope: ScopeId) -> ScopeId {
    let mut current = scope;
    loop {
      match self.scopes.get(current.index()) {
        Some(found) if !found.is_function => match found.parent {
          Some(parent) => current = parent,
          None => return current,
        },
        _ => return current,
      }
    }
  }

  fn is_inside_function(&self, scope: ScopeId) -> bool {
    self.hoist_target(scope) != ScopeId::MODULE
  }

  fn declare(
    &mut self,
    ident: &Ident,
    scope: ScopeId,
    kind: BindingKind,
    init: BindingInit<'p>,
  ) {
    let Some(target) = self.scopes.get(scope.index()) else {
      return;
    };
    if let Some(existing) = target.bindings.get(&ident.name) {
      // `var a; var a = 1;` and friends: more than one value reaches the name.
      self.bindings[existing.index()].mutable = true;
      return;
    }

    let id = BindingId(self.bindings.len() as u32);
    let in_function = self.is_inside_function(scope);
    self.bindings.push(Binding {
      id,
      name: ident.name.clone(),
      scope,
      kind,
      init,
      mutable: false,
      in_function,
      span: ident.span,
    });
    self.scopes[scope.index()]
      .bindings
      .insert(ident.name.clone(), id);
  }

  fn declare_stmts(&mut self, stmts: &'p [Stmt]) {
    for stmt in stmts {
      self.declare_stmt(stmt);
    }
  }

  fn declare_stmt(&mut self, stmt: &'p Stmt) {
    match stmt {
      Stmt::Var { kind, decls } => {
        let binding_kind = match kind {
          VarKind::Var => BindingKind::Var,
          VarKind::Let => BindingKind::Let,
          VarKind::Const => BindingKind::Const,
        };
        for decl in decls {
          let declarator = DeclaratorId(self.declarators);
          self.declarators += 1;
          let mut targets = Vec::new();
          match (&decl.pat, &decl.init) {
            (Pat::Ident(ident), Some(init)) => targets.push((ident, BindingInit::Expr(init))),
            (Pat::Ident(ident), None) => targets.push((ident, BindingInit::None)),
            (pat, Some(init)) => {
              let mut paths = Vec::new();
              destructure(pat, &mut Vec::new(), &mut paths);
              for (ident, path) in paths {
                targets.push((
                  ident,
                  BindingInit::Destructured {
                    source: DestructureSource::Declarator {
                      id: declarator,
                      init,
                    },
                    path,
                  },
                ));
              }
            }
            (pat, None) => {
              let mut names = Vec::new();
              collect_pat_refs(pat, &mut names);
              targets.extend(names.into_iter().map(|ident| (ident, BindingInit::None)));
            }
          }
          for (ident, init) in targets {
            let scope = match kind {
              VarKind::Var => self.hoist_target(ident.scope),
              _ => ident.scope,
            };
            self.declare(ident, scope, binding_kind, init);
          }
        }
      }
      Stmt::Function(id) => {
        let program = self.program;
        if let Some(name) = &program.function(*id).name {
          self.declare(name, name.scope, BindingKind::Function, BindingInit::Function(*id));
        }
      }
      Stmt::Import(idents) => {
        for ident in idents {
          self.declare(ident, ident.scope, BindingKind::Import, BindingInit::Opaque);
        }
      }
      Stmt::Opaque(idents) => {
        for ident in idents {
          self.declare(ident, ident.scope, BindingKind::Opaque, BindingInit::Opaque);
        }
      }
      Stmt::Block(block) => self.declare_stmts(&block.stmts),
      Stmt::If { cons, alt, .. } => {
        self.declare_stmt(cons);
        if let Some(alt) = alt {
          self.declare_stmt(alt);
        }
      }
      Stmt::Other { blocks, .. } => {
        for block in blocks {
          self.declare_stmts(&block.stmts);
        }
      }
      Stmt::Expr(_) | Stmt::Return(_) => {}
    }
  }

  fn declare_function(&mut self, function: &'p Function) {
    if !function.is_declaration {
      if let Some(name) = &function.name {
        self.declare(
          name,
          function.scope,
          BindingKind::Function,
          BindingInit::Function(function.id),
        );
      }
    }

    for (index, param) in function.params.iter().enumerate() {
      let source = DestructureSource::Param {
        function: function.id,
        index,
      };
      let mut paths = Vec::new();
      destructure(param, &mut Vec::new(), &mut paths);
      for (ident, path) in paths {
        self.declare(
          ident,
          function.scope,
          BindingKind::Param,
          BindingInit::Destructured {
            source: source.clone(),
            path,
          },
        );
      }
    }

    if let FunctionBody::Block(stmts) = &function.body {
      self.declare_stmts(stmts);
    }
  }
}

fn split_default(pat: &Pat) -> (&Pat, Option<&Expr>) {
  match pat {
    Pat::Assign { target, default } => (target, Some(default)),
    other => (other, None),
  }
}

/// Every identifier a pattern binds together with its projection path.
fn destructure<'p>(
  pat: &'p Pat,
  path: &mut Vec<PathStep<'p>>,
  out: &mut Vec<(&'p Ident, Vec<PathStep<'p>>)>,
) {
  match pat {
    Pat::Ident(ident) => out.push((ident, path.clone())),
    Pat::Assign { target, default } => {
      path.push(PathStep {
        access: Access::Whole,
        default: Some(default),
      });
      destructure(target, path, out);
      path.pop();
    }
    Pat::Object { props, rest } => {
      for prop in props {
        let (value, default) = split_default(&prop.value);
        path.push(PathStep {
          access: Access::Key(&prop.key),
          default,
        });
        destructure(value, path, out);
        path.pop();
      }
      if let Some(rest) = rest {
        path.push(PathStep {
          access: Access::ObjectRest(props.iter().map(|prop| &prop.key).collect()),
          default: None,
        });
        destructure(rest, path, out);
        path.pop();
      }
    }
    Pat::Array { elems, rest } => {
      for (index, elem) in elems.iter().enumerate() {
        let Some(elem) = elem else {
          continue;
        };
        let (value, default) = split_default(elem);
        path.push(PathStep {
          access: Access::Index(index),
          default,
        });
        destructure(value, path, out);
        path.pop();
      }
      if let Some(rest) = rest {
        path.push(PathStep {
          access: Access::ArrayRest(elems.len()),
          default: None,
        });
        destructure(rest, path, out);
        path.pop();
      }
    }
    Pat::Other(_) => {}
  }
}

fn collect_pat_refs<'p>(pat: &'p Pat, out: &mut Vec<&'p Ident>) {
  let mut paths = Vec::new();
  destructure(pat, &mut Vec::new(), &mut paths);
  out.extend(paths.into_iter().map(|(ident, _)| ident));
}

/// Collects every identifier that is written to.
#[derive(Default)]
struct WriteCollector {
  idents: Vec<Ident>,
}

impl WriteCollector {
  fn stmts(&mut self, stmts: &[Stmt]) {
    for stmt in stmts {
      self.stmt(stmt);
    }
  }

  fn stmt(&mut self, stmt: &Stmt) {
    match stmt {
      Stmt::Var { decls, .. } => {
        for decl in decls {
          self.pat_defaults(&decl.pat);
          if let Some(init) = &decl.init {
            self.expr(init);
          }
        }
      }
      Stmt::Expr(expr) | Stmt::Return(Some(expr)) => self.expr(expr),
      Stmt::Block(block) => self.stmts(&block.stmts),
      Stmt::If { test, cons, alt } => {
        self.expr(test);
        self.stmt(cons);
        if let Some(alt) = alt {
          self.stmt(alt);
        }
      }
      Stmt::Other { exprs, blocks } => {
        for expr in exprs {
          self.expr(expr);
        }
        for block in blocks {
          self.stmts(&block.stmts);
        }
      }
      Stmt::Function(_) | Stmt::Import(_) | Stmt::Opaque(_) | Stmt::Return(None) => {}
    }
  }

  fn pat_defaults(&mut self, pat: &Pat) {
    match pat {
      Pat::Assign { target, default } => {
        self.expr(default);
        self.pat_defaults(target);
      }
      Pat::Object { props, rest } => {
        for prop in props {
          if let PropKey::Computed(key) = &prop.key {
            self.expr(key);
          }
          self.pat_defaults(&prop.value);
        }
        if let Some(rest) = rest {
          self.pat_defaults(rest);
        }
      }
      Pat::Array { elems, rest } => {
        for elem in elems.iter().flatten() {
          self.pat_defaults(elem);
        }
        if let Some(rest) = rest {
          self.pat_defaults(rest);
        }
      }
      Pat::Other(exprs) => {
        for expr in exprs {
          self.expr(expr);
        }
      }
      Pat::Ident(_) => {}
    }
  }

  fn target(&mut self, target: &AssignTarget) {
    match target {
      AssignTarget::Ident(ident) => self.idents.push(ident.clone()),
      AssignTarget::Member(member) => {
        self.root(member);
        self.expr(member);
      }
      AssignTarget::Pattern(pat) => {
        let mut names = Vec::new();
        collect_pat_idents(pat, &mut names);
        self.idents.extend(names);
        self.pattern_members(pat);
        self.pat_defaults(pat);
      }
    }
  }

  /// `[a.b] = ...` writes through `a`.
  fn pattern_members(&mut self, pat: &Pat) {
    match pat {
      Pat::Other(exprs) => {
        for expr in exprs {
          self.root(expr);
        }
      }
      Pat::Assign { target, .. } => self.pattern_members(target),
      Pat::Object { props, rest } => {
        for prop in props {
          self.pattern_members(&prop.value);
        }
        if let Some(rest) = rest {
          self.pattern_members(rest);
        }
      }
      Pat::Array { elems, rest } => {
        for elem in elems.iter().flatten() {
          self.pattern_members(elem);
        }
        if let Some(rest) = rest {
          self.pattern_members(rest);
        }
      }
      Pat::Ident(_) => {}
    }
  }

  fn root(&mut self, expr: &Expr) {
    match &expr.kind {
      ExprKind::Ident(ident) => self.idents.push(ident.clone()),
      ExprKind::Member { obj, .. } => self.root(obj),
      _ => {}
    }
  }

  fn expr(&mut self, expr: &Expr) {
    match &expr.kind {
      ExprKind::Lit(_) | ExprKind::Ident(_) | ExprKind::This | ExprKind::Function(_) => {}
      ExprKind::Member { obj, prop } => {
        self.expr(obj);
        if let MemberProp::Computed(prop) = prop {
          self.expr(prop);
        }
      }
      ExprKind::Object(props) => {
        for prop in props {
          match prop {
            ObjectProp::KeyValue { key, value } => {
              if let PropKey::Computed(key) = key {
                self.expr(key);
              }
              self.expr(value);
            }
            ObjectProp::Spread(value) | ObjectProp::Other(value) => self.expr(value),
            ObjectProp::Shorthand(_) => {}
          }
        }
      }
      ExprKind::Array(elems) => {
        for elem in elems {
          if let ArrayElem::Expr(value) | ArrayElem::Spread(value) = elem {
            self.expr(value);
          }
        }
      }
      ExprKind::Template(template) => self.exprs(&template.exprs),
      ExprKind::TaggedTemplate { tag, template } => {
        self.expr(tag);
        self.exprs(&template.exprs);
      }
      ExprKind::Unary { arg, .. } => self.expr(arg),
      ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
        self.expr(left);
        self.expr(right);
      }
      ExprKind::Conditional { test, cons, alt } => {
        self.expr(test);
        self.expr(cons);
        self.expr(alt);
      }
      ExprKind::Call { callee, args } => {
        if let ExprKind::Member {
          obj,
          prop: MemberProp::Name(method),
        } = &callee.kind
        {
          if MUTATING_METHODS.contains(&method.as_str()) {
            self.root(obj);
          }
          if obj.as_ident().is_some_and(|ident| ident.name == "Object")
            && matches!(method.as_str(), "assign" | "defineProperty" | "defineProperties")
          {
            if let Some(first) = args.first() {
              self.root(first);
            }
          }
        }
        self.expr(callee);
        self.exprs(args);
      }
      ExprKind::Assign { target, value } => {
        self.target(target);
        self.expr(value);
      }
      ExprKind::Update { target } => self.target(target),
      ExprKind::Sequence(exprs) | ExprKind::Other(exprs) => self.exprs(exprs),
    }
  }

  fn exprs(&mut self, exprs: &[Expr]) {
    for expr in exprs {
      self.expr(expr);
    }
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::lower::parse_module;

  fn mutable_names(code: &str) -> Vec<(String, bool)> {
    let program = parse_module(code).unwrap();
    let tree = ScopeTree::build(&program);
    tree
      .bindings()
      .iter()
      .map(|binding| (binding.name.clone(), binding.mutable))
      .collect()
  }

  #[test]
  fn reassignment_after_use_marks_binding_mutable() {
    assert_eq!(
      mutable_names("let m = 2; const s = { width: m }; m = 1;"),
      vec![("m".to_string(), true), ("s".to_string(), false)]
    );
  }

  #[test]
  fn writes_inside_nested_functions_are_seen() {
    assert_eq!(
      mutable_names("let a = 1; let b = 2; function f() { a++; } const g = () => { b.x = 3; };"),
      vec![
        ("a".to_string(), true),
        ("b".to_string(), true),
        ("f".to_string(), false),
        ("g".to_string(), false),
      ]
    );
  }

  #[test]
  fn shadowed_writes_do_not_leak_out() {
    let program = parse_module("const a = 1; function f() { let a = 2; a = 3; }").unwrap();
    let tree = ScopeTree::build(&program);
    let outer = tree.lookup("a", ScopeId::MODULE).unwrap();
    assert!(!outer.mutable);
    let inner = tree.lookup("a", program.functions[0].scope).unwrap();
    assert!(inner.mutable);
    assert!(inner.in_function);
  }

  #[test]
  fn var_declarations_hoist_to_the_function_scope() {
    let program = parse_module("function f() { { var hoisted = 1; } }").unwrap();
    let tree = ScopeTree::build(&program);
    let binding = tree.lookup("hoisted", program.functions[0].scope).unwrap();
    assert_eq!(binding.scope, program.functions[0].scope);
  }

  #[test]
  fn destructuring_records_paths() {
    let program = parse_module("const { a: { b = 1 }, ...rest } = source;").unwrap();
    let tree = ScopeTree::build(&program);
    let BindingInit::Destructured { path, .. } = &tree.lookup("b", ScopeId::MODULE).unwrap().init
    else {
      panic!("expected a destructured binding");
    };
    assert_eq!(path.len(), 2);
    assert!(matches!(&path[0].access, Access::Key(PropKey::Static(key)) if key == "a"));
    assert!(path[1].default.is_some());
    let BindingInit::Destructured { path, .. } =
      &tree.lookup("rest", ScopeId::MODULE).unwrap().init
    else {
      panic!("expected a destructured binding");
    };
    assert!(matches!(&path[0].access, Access::ObjectRest(keys) if keys.len() == 1));
  }

  #[test]
  fn unknown_names_are_external() {
    let program = parse_module("const a = b;").unwrap();
    let tree = ScopeTree::build(&program);
    assert!(tree.lookup("b", ScopeId::MODULE).is_none());
  }

  #[test]
  fn mutating_method_calls_mark_the_receiver() {
    assert_eq!(
      mutable_names("const list = [1]; list.push(2); const obj = {}; Object.assign(obj, {});"),
      vec![("list".to_string(), true), ("obj".to_string(), true)]
    );
  }
}
