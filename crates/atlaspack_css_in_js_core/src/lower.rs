//! Parses module text with swc and lowers it into the closed [`crate::ast`] tree.
//!
//! Lowering allocates scopes as it goes (module, function, block, loop head)
//! and stamps every identifier with the scope it appears in. Style-bearing
//! call sites are recorded on the way through.

use swc_core::common::sync::Lrc;
use swc_core::common::{FileName, SourceMap, Spanned};
use swc_core::ecma::ast as swc;
use swc_core::ecma::ast::EsVersion;
use swc_core::ecma::parser::lexer::Lexer;
use swc_core::ecma::parser::{EsSyntax, Parser, StringInput, Syntax, TsSyntax};
use swc_core::ecma::visit::{Visit, VisitWith};

use crate::ast::*;
use crate::config::CssInJsCoreConfig;
use crate::error::CoreError;

/// Parse an ES module (JSX enabled) and lower it.
pub fn parse_module(code: &str) -> Result<Program, CoreError> {
  parse_module_with_config(code, &CssInJsCoreConfig::default())
}

/// Like [`parse_module`], recording sites for the configured style helpers.
pub fn parse_module_with_config(
  code: &str,
  config: &CssInJsCoreConfig,
) -> Result<Program, CoreError> {
  parse_with_syntax(
    code,
    Syntax::Es(EsSyntax {
      jsx: true,
      ..Default::default()
    }),
    config,
  )
}

/// Parse a TypeScript module (TSX enabled) and lower it.
pub fn parse_typescript_module(code: &str) -> Result<Program, CoreError> {
  parse_with_syntax(
    code,
    Syntax::Typescript(TsSyntax {
      tsx: true,
      ..Default::default()
    }),
    &CssInJsCoreConfig::default(),
  )
}

fn parse_with_syntax(
  code: &str,
  syntax: Syntax,
  config: &CssInJsCoreConfig,
) -> Result<Program, CoreError> {
  let source_map: Lrc<SourceMap> = Default::default();
  let source_file = source_map.new_source_file(Lrc::new(FileName::Anon), code.to_string());
  let lexer = Lexer::new(
    syntax,
    EsVersion::latest(),
    StringInput::from(&*source_file),
    None,
  );
  let mut parser = Parser::new_from(lexer);
  let module = parser.parse_module().map_err(|error| CoreError::Parse {
    message: format!("{:?}", error.kind()),
  })?;

  if let Some(error) = parser.take_errors().into_iter().next() {
    return Err(CoreError::Parse {
      message: format!("{:?}", error.kind()),
    });
  }

  let mut lowerer = Lowerer::new(source_file.start_pos.0, config);
  let body = lowerer.module(&module);
  tracing::debug!(
    functions = lowerer.functions.len(),
    scopes = lowerer.scope_parents.len(),
    sites = lowerer.sites.len(),
    "Lowered module"
  );

  Ok(Program {
    source: code.to_string(),
    body,
    functions: lowerer.functions.into_iter().flatten().collect(),
    scope_parents: lowerer.scope_parents,
    sites: lowerer.sites,
  })
}

struct Lowerer<'c> {
  start_pos: u32,
  config: &'c CssInJsCoreConfig,
  /// Reserved before the body is lowered so nested functions get later ids.
  functions: Vec<Option<Function>>,
  scope_parents: Vec<Option<ScopeId>>,
  scope: ScopeId,
  sites: Vec<StyleSite>,
}

impl<'c> Lowerer<'c> {
  fn new(start_pos: u32, config: &'c CssInJsCoreConfig) -> Self {
    Lowerer {
      start_pos,
      config,
      functions: Vec::new(),
      scope_parents: vec![None],
      scope: ScopeId::MODULE,
      sites: Vec::new(),
    }
  }

  fn span(&self, span: swc_core::common::Span) -> Span {
    Span::new(
      span.lo.0.saturating_sub(self.start_pos),
      span.hi.0.saturating_sub(self.start_pos),
    )
  }

  fn with_scope<T>(&mut self, f: impl FnOnce(&mut Self, ScopeId) -> T) -> T {
    let scope = ScopeId(self.scope_parents.len() as u32);
    self.scope_parents.push(Some(self.scope));
    let parent = std::mem::replace(&mut self.scope, scope);
    let result = f(self, scope);
    self.scope = parent;
    result
  }

  fn ident(&self, ident: &swc::Ident) -> Ident {
    Ident {
      name: ident.sym.to_string(),
      scope: self.scope,
      span: self.span(ident.span),
    }
  }

  fn module(&mut self, module: &swc::Module) -> Vec<Stmt> {
    let mut stmts = Vec::with_capacity(module.body.len());
    for item in &module.body {
      match item {
        swc::ModuleItem::Stmt(stmt) => stmts.extend(self.stmt(stmt)),
        swc::ModuleItem::ModuleDecl(decl) => stmts.extend(self.module_decl(decl)),
      }
    }
    stmts
  }

  fn module_decl(&mut self, decl: &swc::ModuleDecl) -> Option<Stmt> {
    match decl {
      swc::ModuleDecl::Import(import) => {
        let names = import
          .specifiers
          .iter()
          .map(|specifier| match specifier {
            swc::ImportSpecifier::Named(named) => self.ident(&named.local),
            swc::ImportSpecifier::Default(default) => self.ident(&default.local),
            swc::ImportSpecifier::Namespace(namespace) => self.ident(&namespace.local),
          })
          .collect();
        Some(Stmt::Import(names))
      }
      swc::ModuleDecl::ExportDecl(export) => self.decl(&export.decl),
      swc::ModuleDecl::ExportDefaultDecl(export) => match &export.decl {
        swc::DefaultDecl::Fn(function) => {
          let id = self.function(
            function.ident.as_ref(),
            false,
            &function.function,
            function.function.span,
          );
          Some(Stmt::Expr(Expr::new(
            ExprKind::Function(id),
            self.span(function.function.span),
          )))
        }
        swc::DefaultDecl::Class(class) => {
          let exprs = self.class(&class.class);
          Some(Stmt::Other {
            exprs,
            blocks: Vec::new(),
          })
        }
        swc::DefaultDecl::TsInterfaceDecl(_) => None,
      },
      swc::ModuleDecl::ExportDefaultExpr(export) => Some(Stmt::Expr(self.expr(&export.expr))),
      _ => None,
    }
  }

  fn decl(&mut self, decl: &swc::Decl) -> Option<Stmt> {
    match decl {
      swc::Decl::Var(var) => Some(self.var_decl(var)),
      swc::Decl::Fn(function) => {
        let id = self.function(
          Some(&function.ident),
          true,
          &function.function,
          function.function.span,
        );
        Some(Stmt::Function(id))
      }
      swc::Decl::Class(class) => {
        let name = self.ident(&class.ident);
        let exprs = self.class(&class.class);
        Some(Stmt::Other {
          exprs,
          blocks: vec![Block {
            scope: self.scope,
            stmts: vec![Stmt::Opaque(vec![name])],
          }],
        })
      }
      swc::Decl::Using(using) => {
        let decls = using
          .decls
          .iter()
          .map(|decl| VarDeclarator {
            pat: self.pat(&decl.name),
            init: decl.init.as_deref().map(|init| self.expr(init)),
          })
          .collect();
        Some(Stmt::Var {
          kind: VarKind::Const,
          decls,
        })
      }
      swc::Decl::TsEnum(ts_enum) => Some(Stmt::Opaque(vec![self.ident(&ts_enum.id)])),
      _ => None,
    }
  }

  fn var_decl(&mut self, var: &swc::VarDecl) -> Stmt {
    let kind = match var.kind {
      swc::VarDeclKind::Var => VarKind::Var,
      swc::VarDeclKind::Let => VarKind::Let,
      swc::VarDeclKind::Const => VarKind::Const,
    };
    let decls = var
      .decls
      .iter()
      .map(|decl| VarDeclarator {
        pat: self.pat(&decl.name),
        init: decl.init.as_deref().map(|init| self.expr(init)),
      })
      .collect();
    Stmt::Var { kind, decls }
  }

  fn block(&mut self, block: &swc::BlockStmt) -> Block {
    self.with_scope(|this, scope| Block {
      scope,
      stmts: block.stmts.iter().filter_map(|stmt| this.stmt(stmt)).collect(),
    })
  }

  /// Lowers a loop or branch body into its own block scope.
  fn body_block(&mut self, stmt: &swc::Stmt) -> Block {
    match stmt {
      swc::Stmt::Block(block) => self.block(block),
      other => self.with_scope(|this, scope| Block {
        scope,
        stmts: this.stmt(other).into_iter().collect(),
      }),
    }
  }

  fn stmt(&mut self, stmt: &swc::Stmt) -> Option<Stmt> {
    match stmt {
      swc::Stmt::Block(block) => Some(Stmt::Block(self.block(block))),
      swc::Stmt::Expr(expr) => Some(Stmt::Expr(self.expr(&expr.expr))),
      swc::Stmt::Decl(decl) => self.decl(decl),
      swc::Stmt::Return(ret) => Some(Stmt::Return(ret.arg.as_deref().map(|arg| self.expr(arg)))),
      swc::Stmt::If(if_stmt) => {
        let test = self.expr(&if_stmt.test);
        let cons = Stmt::Block(self.body_block(&if_stmt.cons));
        let alt = if_stmt
          .alt
          .as_deref()
          .map(|alt| Box::new(Stmt::Block(self.body_block(alt))));
        Some(Stmt::If {
          test,
          cons: Box::new(cons),
          alt,
        })
      }
      swc::Stmt::Labeled(labeled) => self.stmt(&labeled.body),
      swc::Stmt::Throw(throw) => Some(Stmt::Other {
        exprs: vec![self.expr(&throw.arg)],
        blocks: Vec::new(),
      }),
      swc::Stmt::With(with) => {
        let exprs = vec![self.expr(&with.obj)];
        let blocks = vec![self.body_block(&with.body)];
        Some(Stmt::Other { exprs, blocks })
      }
      swc::Stmt::Switch(switch) => {
        let mut exprs = vec![self.expr(&switch.discriminant)];
        let block = self.with_scope(|this, scope| {
          let mut stmts = Vec::new();
          for case in &switch.cases {
            if let Some(test) = &case.test {
              exprs.push(this.expr(test));
            }
            stmts.extend(case.cons.iter().filter_map(|stmt| this.stmt(stmt)));
          }
          Block { scope, stmts }
        });
        Some(Stmt::Other {
          exprs,
          blocks: vec![block],
        })
      }
      swc::Stmt::Try(try_stmt) => {
        let mut blocks = vec![self.block(&try_stmt.block)];
        if let Some(handler) = &try_stmt.handler {
          blocks.push(self.with_scope(|this, scope| {
            let mut stmts = Vec::new();
            if let Some(param) = &handler.param {
              stmts.push(Stmt::Opaque(this.pat_names(param)));
            }
            stmts.push(Stmt::Block(this.block(&handler.body)));
            Block { scope, stmts }
          }));
        }
        if let Some(finalizer) = &try_stmt.finalizer {
          blocks.push(self.block(finalizer));
        }
        Some(Stmt::Other {
          exprs: Vec::new(),
          blocks,
        })
      }
      swc::Stmt::While(while_stmt) => {
        let exprs = vec![self.expr(&while_stmt.test)];
        let blocks = vec![self.body_block(&while_stmt.body)];
        Some(Stmt::Other { exprs, blocks })
      }
      swc::Stmt::DoWhile(do_while) => {
        let blocks = vec![self.body_block(&do_while.body)];
        let exprs = vec![self.expr(&do_while.test)];
        Some(Stmt::Other { exprs, blocks })
      }
      swc::Stmt::For(for_stmt) => {
        let block = self.with_scope(|this, scope| {
          let mut stmts = Vec::new();
          match &for_stmt.init {
            Some(swc::VarDeclOrExpr::VarDecl(var)) => {
              stmts.push(this.loop_binding(var));
            }
            Some(swc::VarDeclOrExpr::Expr(expr)) => stmts.push(Stmt::Expr(this.expr(expr))),
            None => {}
          }
          let mut exprs = Vec::new();
          if let Some(test) = &for_stmt.test {
            exprs.push(this.expr(test));
          }
          if let Some(update) = &for_stmt.update {
            exprs.push(this.expr(update));
          }
          let body = this.body_block(&for_stmt.body);
          stmts.push(Stmt::Other {
            exprs,
            blocks: vec![body],
          });
          Block { scope, stmts }
        });
        Some(Stmt::Block(block))
      }
      swc::Stmt::ForIn(for_in) => Some(self.for_each(&for_in.left, &for_in.right, &for_in.body)),
      swc::Stmt::ForOf(for_of) => Some(self.for_each(&for_of.left, &for_of.right, &for_of.body)),
      _ => None,
    }
  }

  /// `for (let i = 0; ...)` bindings change on every iteration.
  fn loop_binding(&mut self, var: &swc::VarDecl) -> Stmt {
    match self.var_decl(var) {
      Stmt::Var { kind, decls } if kind != VarKind::Const => {
        let mut names = Vec::new();
        let mut exprs = Vec::new();
        for decl in decls {
          collect_pat_idents(&decl.pat, &mut names);
          exprs.extend(decl.init);
        }
        Stmt::Other {
          exprs,
          blocks: vec![Block {
            scope: self.scope,
            stmts: vec![Stmt::Opaque(names)],
          }],
        }
      }
      stmt => stmt,
    }
  }

  fn for_each(&mut self, head: &swc::ForHead, right: &swc::Expr, body: &swc::Stmt) -> Stmt {
    let right = self.expr(right);
    let block = self.with_scope(|this, scope| {
      let mut stmts = Vec::new();
      match head {
        swc::ForHead::VarDecl(var) => stmts.push(Stmt::Opaque(
          var.decls.iter().flat_map(|decl| this.pat_names(&decl.name)).collect(),
        )),
        swc::ForHead::UsingDecl(using) => stmts.push(Stmt::Opaque(
          using
            .decls
            .iter()
            .flat_map(|decl| this.pat_names(&decl.name))
            .collect(),
        )),
        swc::ForHead::Pat(pat) => {
          let target = AssignTarget::Pattern(this.pat(pat));
          stmts.push(Stmt::Expr(Expr::new(
            ExprKind::Update { target },
            this.span(pat.span()),
          )));
        }
      }
      let body = this.body_block(body);
      stmts.push(Stmt::Other {
        exprs: Vec::new(),
        blocks: vec![body],
      });
      Block { scope, stmts }
    });
    Stmt::Other {
      exprs: vec![right],
      blocks: vec![block],
    }
  }

  fn pat_names(&mut self, pat: &swc::Pat) -> Vec<Ident> {
    let lowered = self.pat(pat);
    let mut names = Vec::new();
    collect_pat_idents(&lowered, &mut names);
    names
  }

  fn pat(&mut self, pat: &swc::Pat) -> Pat {
    match pat {
      swc::Pat::Ident(binding) => Pat::Ident(self.ident(&binding.id)),
      swc::Pat::Object(object) => {
        let mut props = Vec::new();
        let mut rest = None;
        for prop in &object.props {
          match prop {
            swc::ObjectPatProp::KeyValue(key_value) => props.push(ObjectPatProp {
              key: self.prop_name(&key_value.key),
              value: self.pat(&key_value.value),
            }),
            swc::ObjectPatProp::Assign(assign) => {
              let ident = self.ident(&assign.key.id);
              let key = PropKey::Static(ident.name.clone());
              let value = match &assign.value {
                Some(default) => Pat::Assign {
                  target: Box::new(Pat::Ident(ident)),
                  default: Box::new(self.expr(default)),
                },
                None => Pat::Ident(ident),
              };
              props.push(ObjectPatProp { key, value });
            }
            swc::ObjectPatProp::Rest(rest_pat) => rest = Some(Box::new(self.pat(&rest_pat.arg))),
          }
        }
        Pat::Object { props, rest }
      }
      swc::Pat::Array(array) => {
        let mut elems = Vec::new();
        let mut rest = None;
        for elem in &array.elems {
          match elem {
            Some(swc::Pat::Rest(rest_pat)) => rest = Some(Box::new(self.pat(&rest_pat.arg))),
            Some(elem) => elems.push(Some(self.pat(elem))),
            None => elems.push(None),
          }
        }
        Pat::Array { elems, rest }
      }
      swc::Pat::Rest(rest) => self.pat(&rest.arg),
      swc::Pat::Assign(assign) => Pat::Assign {
        target: Box::new(self.pat(&assign.left)),
        default: Box::new(self.expr(&assign.right)),
      },
      swc::Pat::Expr(expr) => Pat::Other(vec![self.expr(expr)]),
      swc::Pat::Invalid(_) => Pat::Other(Vec::new()),
    }
  }

  fn prop_name(&mut self, name: &swc::PropName) -> PropKey {
    match name {
      swc::PropName::Ident(ident) => PropKey::Static(ident.sym.to_string()),
      swc::PropName::Str(string) => PropKey::Static(string.value.to_string()),
      swc::PropName::Num(number) => PropKey::Static(crate::value::number_to_string(number.value)),
      swc::PropName::BigInt(big_int) => PropKey::Static(big_int.value.to_string()),
      swc::PropName::Computed(computed) => PropKey::Computed(Box::new(self.expr(&computed.expr))),
    }
  }

  fn function(
    &mut self,
    name: Option<&swc::Ident>,
    is_declaration: bool,
    function: &swc::Function,
    span: swc_core::common::Span,
  ) -> FunctionId {
    // Declarations bind their name in the enclosing scope.
    let declared_name = if is_declaration {
      name.map(|name| self.ident(name))
    } else {
      None
    };
    let id = self.reserve_function();
    let lowered = self.with_scope(|this, scope| {
      let name = declared_name.or_else(|| name.map(|name| this.ident(name)));
      let has_rest = matches!(function.params.last(), Some(param) if matches!(param.pat, swc::Pat::Rest(_)));
      let params = function.params.iter().map(|param| this.pat(&param.pat)).collect();
      let body = FunctionBody::Block(
        function
          .body
          .iter()
          .flat_map(|body| body.stmts.iter())
          .filter_map(|stmt| this.stmt(stmt))
          .collect(),
      );
      Function {
        id,
        name,
        is_declaration,
        scope,
        params,
        has_rest,
        body,
        span: this.span(span),
      }
    });
    self.functions[id.index()] = Some(lowered);
    id
  }

  fn arrow(&mut self, arrow: &swc::ArrowExpr) -> FunctionId {
    let id = self.reserve_function();
    let lowered = self.with_scope(|this, scope| {
      let has_rest = matches!(arrow.params.last(), Some(swc::Pat::Rest(_)));
      let params = arrow.params.iter().map(|param| this.pat(param)).collect();
      let body = match &*arrow.body {
        swc::BlockStmtOrExpr::Expr(expr) => FunctionBody::Expr(Box::new(this.expr(expr))),
        swc::BlockStmtOrExpr::BlockStmt(block) => FunctionBody::Block(
          block.stmts.iter().filter_map(|stmt| this.stmt(stmt)).collect(),
        ),
      };
      Function {
        id,
        name: None,
        is_declaration: false,
        scope,
        params,
        has_rest,
        body,
        span: this.span(arrow.span),
      }
    });
    self.functions[id.index()] = Some(lowered);
    id
  }

  fn reserve_function(&mut self) -> FunctionId {
    let id = FunctionId(self.functions.len() as u32);
    self.functions.push(None);
    id
  }

  /// Class bodies are never evaluated; only the assignments inside them matter.
  fn class(&mut self, class: &swc::Class) -> Vec<Expr> {
    let mut exprs = Vec::new();
    if let Some(super_class) = &class.super_class {
      exprs.push(self.expr(super_class));
    }
    exprs.extend(self.collect_assignments(class));
    exprs
  }

  fn collect_assignments<N: VisitWith<AssignmentCollector>>(&mut self, node: &N) -> Vec<Expr> {
    let mut collector = AssignmentCollector::default();
    node.visit_with(&mut collector);
    collector
      .targets
      .into_iter()
      .map(|ident| {
        let span = self.span(ident.span);
        Expr::new(
          ExprKind::Update {
            target: AssignTarget::Ident(self.ident(&ident)),
          },
          span,
        )
      })
      .collect()
  }

  fn quasis(&self, tpl: &swc::Tpl) -> Vec<Quasi> {
    tpl
      .quasis
      .iter()
      .map(|quasi| Quasi {
        raw: quasi.raw.to_string(),
        cooked: quasi.cooked.as_ref().map(|cooked| cooked.to_string()),
      })
      .collect()
  }

  fn template(&mut self, tpl: &swc::Tpl) -> Template {
    Template {
      quasis: self.quasis(tpl),
      exprs: tpl.exprs.iter().map(|expr| self.expr(expr)).collect(),
    }
  }

  fn args(&mut self, args: &[swc::ExprOrSpread]) -> Vec<Expr> {
    args
      .iter()
      .map(|arg| {
        let expr = self.expr(&arg.expr);
        match arg.spread {
          Some(_) => Expr::new(ExprKind::Other(vec![expr]), self.span(arg.expr.span())),
          None => expr,
        }
      })
      .collect()
  }

  fn assign_target(&mut self, target: &swc::AssignTarget) -> AssignTarget {
    match target {
      swc::AssignTarget::Simple(simple) => self.simple_assign_target(simple),
      swc::AssignTarget::Pat(swc::AssignTargetPat::Object(object)) => {
        AssignTarget::Pattern(self.pat(&swc::Pat::Object(object.clone())))
      }
      swc::AssignTarget::Pat(swc::AssignTargetPat::Array(array)) => {
        AssignTarget::Pattern(self.pat(&swc::Pat::Array(array.clone())))
      }
      swc::AssignTarget::Pat(swc::AssignTargetPat::Invalid(_)) => {
        AssignTarget::Pattern(Pat::Other(Vec::new()))
      }
    }
  }

  fn simple_assign_target(&mut self, target: &swc::SimpleAssignTarget) -> AssignTarget {
    match target {
      swc::SimpleAssignTarget::Ident(binding) => AssignTarget::Ident(self.ident(&binding.id)),
      swc::SimpleAssignTarget::Member(member) => {
        AssignTarget::Member(Box::new(self.member(member)))
      }
      swc::SimpleAssignTarget::Paren(paren) => self.expr_target(&paren.expr),
      swc::SimpleAssignTarget::TsAs(ts_as) => self.expr_target(&ts_as.expr),
      swc::SimpleAssignTarget::TsSatisfies(satisfies) => self.expr_target(&satisfies.expr),
      swc::SimpleAssignTarget::TsNonNull(non_null) => self.expr_target(&non_null.expr),
      swc::SimpleAssignTarget::TsTypeAssertion(assertion) => self.expr_target(&assertion.expr),
      other => AssignTarget::Pattern(Pat::Other(self.collect_assignments(other))),
    }
  }

  /// Update targets written as arbitrary expressions, e.g. `(a as any)++`.
  fn expr_target(&mut self, expr: &swc::Expr) -> AssignTarget {
    let lowered = self.expr(expr);
    match lowered.kind {
      ExprKind::Ident(ident) => AssignTarget::Ident(ident),
      ExprKind::Member { .. } => AssignTarget::Member(Box::new(lowered)),
      _ => AssignTarget::Pattern(Pat::Other(vec![lowered])),
    }
  }

  fn member(&mut self, member: &swc::MemberExpr) -> Expr {
    let obj = Box::new(self.expr(&member.obj));
    let prop = match &member.prop {
      swc::MemberProp::Ident(ident) => MemberProp::Name(ident.sym.to_string()),
      swc::MemberProp::PrivateName(private) => MemberProp::Name(format!("#{}", private.name)),
      swc::MemberProp::Computed(computed) => {
        MemberProp::Computed(Box::new(self.expr(&computed.expr)))
      }
    };
    Expr::new(ExprKind::Member { obj, prop }, self.span(member.span))
  }

  fn expr(&mut self, expr: &swc::Expr) -> Expr {
    let span = self.span(expr.span());
    let kind = match expr {
      swc::Expr::Lit(lit) => match lit {
        swc::Lit::Str(string) => ExprKind::Lit(Lit::Str(string.value.to_string())),
        swc::Lit::Num(number) => ExprKind::Lit(Lit::Num(number.value)),
        swc::Lit::Bool(boolean) => ExprKind::Lit(Lit::Bool(boolean.value)),
        swc::Lit::Null(_) => ExprKind::Lit(Lit::Null),
        _ => ExprKind::Other(Vec::new()),
      },
      swc::Expr::Ident(ident) => ExprKind::Ident(self.ident(ident)),
      swc::Expr::This(_) => ExprKind::This,
      swc::Expr::Paren(paren) => return self.expr(&paren.expr),
      swc::Expr::TsAs(ts_as) => return self.expr(&ts_as.expr),
      swc::Expr::TsSatisfies(satisfies) => return self.expr(&satisfies.expr),
      swc::Expr::TsNonNull(non_null) => return self.expr(&non_null.expr),
      swc::Expr::TsConstAssertion(assertion) => return self.expr(&assertion.expr),
      swc::Expr::TsTypeAssertion(assertion) => return self.expr(&assertion.expr),
      swc::Expr::TsInstantiation(instantiation) => return self.expr(&instantiation.expr),
      swc::Expr::Member(member) => return self.member(member),
      swc::Expr::Object(object) => ExprKind::Object(self.object(object)),
      swc::Expr::Array(array) => ExprKind::Array(
        array
          .elems
          .iter()
          .map(|elem| match elem {
            Some(swc::ExprOrSpread {
              spread: Some(_),
              expr,
            }) => ArrayElem::Spread(self.expr(expr)),
            Some(swc::ExprOrSpread { spread: None, expr }) => ArrayElem::Expr(self.expr(expr)),
            None => ArrayElem::Hole,
          })
          .collect(),
      ),
      swc::Expr::Tpl(tpl) => ExprKind::Template(self.template(tpl)),
      swc::Expr::TaggedTpl(tagged) => {
        let tag = Box::new(self.expr(&tagged.tag));
        let template = self.template(&tagged.tpl);
        if let Some((kind, callee)) = site_kind(&tag, self.config) {
          let template_span = self.span(tagged.tpl.span);
          self.sites.push(StyleSite {
            kind,
            callee: Some(callee),
            args: vec![Expr::new(ExprKind::Template(template.clone()), template_span)],
            span,
          });
        }
        ExprKind::TaggedTemplate { tag, template }
      }
      swc::Expr::Unary(unary) => {
        let arg = Box::new(self.expr(&unary.arg));
        let op = match unary.op {
          swc::UnaryOp::Minus => UnaryOp::Minus,
          swc::UnaryOp::Plus => UnaryOp::Plus,
          swc::UnaryOp::Bang => UnaryOp::Not,
          swc::UnaryOp::Tilde => UnaryOp::BitNot,
          swc::UnaryOp::TypeOf => UnaryOp::TypeOf,
          swc::UnaryOp::Void => UnaryOp::Void,
          swc::UnaryOp::Delete => {
            // `delete a.b` mutates `a`.
            let target = match arg.kind {
              ExprKind::Member { .. } => AssignTarget::Member(arg),
              _ => AssignTarget::Pattern(Pat::Other(vec![*arg])),
            };
            return Expr::new(ExprKind::Update { target }, span);
          }
        };
        ExprKind::Unary { op, arg }
      }
      swc::Expr::Update(update) => ExprKind::Update {
        target: self.expr_target(&update.arg),
      },
      swc::Expr::Bin(bin) => {
        let left = Box::new(self.expr(&bin.left));
        let right = Box::new(self.expr(&bin.right));
        match lower_binary_op(bin.op) {
          Ok(op) => ExprKind::Binary { op, left, right },
          Err(op) => ExprKind::Logical { op, left, right },
        }
      }
      swc::Expr::Assign(assign) => {
        let target = self.assign_target(&assign.left);
        let value = Box::new(self.expr(&assign.right));
        if assign.op == swc::AssignOp::Assign {
          ExprKind::Assign { target, value }
        } else {
          // Compound assignments read the old value; lowered as an update.
          ExprKind::Sequence(vec![Expr::new(ExprKind::Update { target }, span), *value])
        }
      }
      swc::Expr::Cond(cond) => ExprKind::Conditional {
        test: Box::new(self.expr(&cond.test)),
        cons: Box::new(self.expr(&cond.cons)),
        alt: Box::new(self.expr(&cond.alt)),
      },
      swc::Expr::Call(call) => {
        let args = self.args(&call.args);
        match &call.callee {
          swc::Callee::Expr(callee) => {
            let callee = Box::new(self.expr(callee));
            if let Some((kind, site_callee)) = site_kind(&callee, self.config) {
              self.sites.push(StyleSite {
                kind,
                callee: Some(site_callee),
                args: args.clone(),
                span,
              });
            }
            ExprKind::Call { callee, args }
          }
          _ => ExprKind::Other(args),
        }
      }
      swc::Expr::Seq(seq) => {
        ExprKind::Sequence(seq.exprs.iter().map(|expr| self.expr(expr)).collect())
      }
      swc::Expr::Arrow(arrow) => ExprKind::Function(self.arrow(arrow)),
      swc::Expr::Fn(function) => ExprKind::Function(self.function(
        function.ident.as_ref(),
        false,
        &function.function,
        function.function.span,
      )),
      swc::Expr::Class(class) => ExprKind::Other(self.class(&class.class)),
      swc::Expr::New(new) => {
        let mut children = vec![self.expr(&new.callee)];
        if let Some(args) = &new.args {
          children.extend(self.args(args));
        }
        ExprKind::Other(children)
      }
      swc::Expr::Await(await_expr) => ExprKind::Other(vec![self.expr(&await_expr.arg)]),
      swc::Expr::Yield(yield_expr) => ExprKind::Other(
        yield_expr
          .arg
          .as_deref()
          .map(|arg| self.expr(arg))
          .into_iter()
          .collect(),
      ),
      swc::Expr::OptChain(opt_chain) => match &*opt_chain.base {
        swc::OptChainBase::Member(member) => ExprKind::Other(vec![self.member(member)]),
        swc::OptChainBase::Call(call) => {
          let mut children = vec![self.expr(&call.callee)];
          children.extend(self.args(&call.args));
          ExprKind::Other(children)
        }
      },
      swc::Expr::JSXElement(element) => ExprKind::Other(self.jsx_element(element)),
      swc::Expr::JSXFragment(fragment) => ExprKind::Other(self.jsx_children(&fragment.children)),
      _ => ExprKind::Other(Vec::new()),
    };
    Expr::new(kind, span)
  }

  fn object(&mut self, object: &swc::ObjectLit) -> Vec<ObjectProp> {
    object
      .props
      .iter()
      .map(|prop| match prop {
        swc::PropOrSpread::Spread(spread) => ObjectProp::Spread(self.expr(&spread.expr)),
        swc::PropOrSpread::Prop(prop) => match &**prop {
          swc::Prop::KeyValue(key_value) => ObjectProp::KeyValue {
            key: self.prop_name(&key_value.key),
            value: self.expr(&key_value.value),
          },
          swc::Prop::Shorthand(ident) => ObjectProp::Shorthand(self.ident(ident)),
          swc::Prop::Method(method) => {
            let id = self.function(None, false, &method.function, method.function.span);
            ObjectProp::Other(Expr::new(
              ExprKind::Function(id),
              self.span(method.function.span),
            ))
          }
          other => {
            let span = self.span(other.span());
            ObjectProp::Other(Expr::new(
              ExprKind::Other(self.collect_assignments(other)),
              span,
            ))
          }
        },
      })
      .collect()
  }

  fn jsx_element(&mut self, element: &swc::JSXElement) -> Vec<Expr> {
    let mut children = Vec::new();
    for attr in &element.opening.attrs {
      match attr {
        swc::JSXAttrOrSpread::SpreadElement(spread) => children.push(self.expr(&spread.expr)),
        swc::JSXAttrOrSpread::JSXAttr(attr) => {
          let is_css = matches!(&attr.name, swc::JSXAttrName::Ident(name) if &*name.sym == "css");
          let value = match &attr.value {
            Some(swc::JSXAttrValue::JSXExprContainer(container)) => match &container.expr {
              swc::JSXExpr::Expr(expr) => Some(self.expr(expr)),
              swc::JSXExpr::JSXEmptyExpr(_) => None,
            },
            Some(swc::JSXAttrValue::Lit(swc::Lit::Str(string))) => Some(Expr::new(
              ExprKind::Lit(Lit::Str(string.value.to_string())),
              self.span(string.span),
            )),
            Some(swc::JSXAttrValue::JSXElement(element)) => {
              let span = self.span(element.span);
              Some(Expr::new(ExprKind::Other(self.jsx_element(element)), span))
            }
            Some(swc::JSXAttrValue::JSXFragment(fragment)) => {
              let span = self.span(fragment.span);
              Some(Expr::new(
                ExprKind::Other(self.jsx_children(&fragment.children)),
                span,
              ))
            }
            _ => None,
          };
          if let Some(value) = value {
            if is_css {
              self.sites.push(StyleSite {
                kind: StyleSiteKind::CssProp,
                callee: None,
                args: vec![value.clone()],
                span: self.span(attr.span),
              });
            }
            children.push(value);
          }
        }
      }
    }
    children.extend(self.jsx_children(&element.children));
    children
  }

  fn jsx_children(&mut self, children: &[swc::JSXElementChild]) -> Vec<Expr> {
    let mut lowered = Vec::new();
    for child in children {
      match child {
        swc::JSXElementChild::JSXExprContainer(container) => {
          if let swc::JSXExpr::Expr(expr) = &container.expr {
            lowered.push(self.expr(expr));
          }
        }
        swc::JSXElementChild::JSXSpreadChild(spread) => lowered.push(self.expr(&spread.expr)),
        swc::JSXElementChild::JSXElement(element) => {
          let span = self.span(element.span);
          lowered.push(Expr::new(ExprKind::Other(self.jsx_element(element)), span));
        }
        swc::JSXElementChild::JSXFragment(fragment) => {
          let span = self.span(fragment.span);
          lowered.push(Expr::new(
            ExprKind::Other(self.jsx_children(&fragment.children)),
            span,
          ));
        }
        swc::JSXElementChild::JSXText(_) => {}
      }
    }
    lowered
  }
}

fn lower_binary_op(op: swc::BinaryOp) -> Result<BinaryOp, LogicalOp> {
  Ok(match op {
    swc::BinaryOp::Add => BinaryOp::Add,
    swc::BinaryOp::Sub => BinaryOp::Sub,
    swc::BinaryOp::Mul => BinaryOp::Mul,
    swc::BinaryOp::Div => BinaryOp::Div,
    swc::BinaryOp::Mod => BinaryOp::Mod,
    swc::BinaryOp::Exp => BinaryOp::Exp,
    swc::BinaryOp::EqEq => BinaryOp::EqEq,
    swc::BinaryOp::NotEq => BinaryOp::NotEq,
    swc::BinaryOp::EqEqEq => BinaryOp::EqEqEq,
    swc::BinaryOp::NotEqEq => BinaryOp::NotEqEq,
    swc::BinaryOp::Lt => BinaryOp::Lt,
    swc::BinaryOp::LtEq => BinaryOp::LtEq,
    swc::BinaryOp::Gt => BinaryOp::Gt,
    swc::BinaryOp::GtEq => BinaryOp::GtEq,
    swc::BinaryOp::BitAnd => BinaryOp::BitAnd,
    swc::BinaryOp::BitOr => BinaryOp::BitOr,
    swc::BinaryOp::BitXor => BinaryOp::BitXor,
    swc::BinaryOp::LShift => BinaryOp::LShift,
    swc::BinaryOp::RShift => BinaryOp::RShift,
    swc::BinaryOp::ZeroFillRShift => BinaryOp::ZeroFillRShift,
    swc::BinaryOp::In | swc::BinaryOp::InstanceOf => BinaryOp::Relational,
    swc::BinaryOp::LogicalAnd => return Err(LogicalOp::And),
    swc::BinaryOp::LogicalOr => return Err(LogicalOp::Or),
    swc::BinaryOp::NullishCoalescing => return Err(LogicalOp::Nullish),
  })
}

/// Recognises style helpers, `styled.tag`, `styled(Component)` and
/// `styled['tag']` by name. Whether the name really is the library's is left
/// to compilation, once scopes exist.
fn site_kind(callee: &Expr, config: &CssInJsCoreConfig) -> Option<(StyleSiteKind, Ident)> {
  match &callee.kind {
    ExprKind::Ident(ident) if config.is_style_helper(&ident.name) => {
      Some((StyleSiteKind::Css, ident.clone()))
    }
    ExprKind::Member { obj, prop } => {
      let styled = obj.as_ident().filter(|ident| ident.name == "styled")?;
      let tag = match prop {
        MemberProp::Name(name) => name.clone(),
        MemberProp::Computed(computed) => match &computed.kind {
          ExprKind::Lit(Lit::Str(name)) => name.clone(),
          _ => return None,
        },
      };
      Some((StyleSiteKind::Styled { tag }, styled.clone()))
    }
    ExprKind::Call { callee, args } => {
      let styled = callee.as_ident().filter(|ident| ident.name == "styled")?;
      let component = args.first()?.as_ident()?;
      let kind = StyleSiteKind::Styled {
        tag: component.name.clone(),
      };
      Some((kind, styled.clone()))
    }
    _ => None,
  }
}

/// Every identifier a pattern binds, in source order.
pub fn collect_pat_idents(pat: &Pat, names: &mut Vec<Ident>) {
  match pat {
    Pat::Ident(ident) => names.push(ident.clone()),
    Pat::Object { props, rest } => {
      for prop in props {
        collect_pat_idents(&prop.value, names);
      }
      if let Some(rest) = rest {
        collect_pat_idents(rest, names);
      }
    }
    Pat::Array { elems, rest } => {
      for elem in elems.iter().flatten() {
        collect_pat_idents(elem, names);
      }
      if let Some(rest) = rest {
        collect_pat_idents(rest, names);
      }
    }
    Pat::Assign { target, .. } => collect_pat_idents(target, names),
    Pat::Other(_) => {}
  }
}

/// Identifiers written to anywhere inside syntax that is not lowered in detail.
#[derive(Default)]
struct AssignmentCollector {
  targets: Vec<swc::Ident>,
}

impl AssignmentCollector {
  fn root_ident(&mut self, expr: &swc::Expr) {
    match expr {
      swc::Expr::Ident(ident) => self.targets.push(ident.clone()),
      swc::Expr::Member(member) => self.root_ident(&member.obj),
      swc::Expr::Paren(paren) => self.root_ident(&paren.expr),
      _ => {}
    }
  }
}

impl Visit for AssignmentCollector {
  fn visit_assign_expr(&mut self, n: &swc::AssignExpr) {
    match &n.left {
      swc::AssignTarget::Simple(swc::SimpleAssignTarget::Ident(binding)) => {
        self.targets.push(binding.id.clone())
      }
      swc::AssignTarget::Simple(swc::SimpleAssignTarget::Member(member)) => {
        self.root_ident(&member.obj)
      }
      _ => {}
    }
    n.visit_children_with(self);
  }

  fn visit_update_expr(&mut self, n: &swc::UpdateExpr) {
    self.root_ident(&n.arg);
    n.visit_children_with(self);
  }

  fn visit_unary_expr(&mut self, n: &swc::UnaryExpr) {
    if n.op == swc::UnaryOp::Delete {
      self.root_ident(&n.arg);
    }
    n.visit_children_with(self);
  }

  fn visit_assign_target_pat(&mut self, n: &swc::AssignTargetPat) {
    let mut bindings = BindingCollector::default();
    n.visit_with(&mut bindings);
    self.targets.extend(bindings.idents);
    n.visit_children_with(self);
  }
}

#[derive(Default)]
struct BindingCollector {
  idents: Vec<swc::Ident>,
}

impl Visit for BindingCollector {
  fn visit_binding_ident(&mut self, n: &swc::BindingIdent) {
    self.idents.push(n.id.clone());
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn first_init(program: &Program) -> &Expr {
    match &program.body[0] {
      Stmt::Var { decls, .. } => decls[0].init.as_ref().unwrap(),
      other => panic!("expected a declaration, got {other:?}"),
    }
  }

  #[test]
  fn reports_parse_errors() {
    let error = parse_module("const = ;").unwrap_err();
    assert!(matches!(error, CoreError::Parse { .. }));
  }

  #[test]
  fn keeps_source_spans() {
    let program = parse_module("const size = 8 * 2;").unwrap();
    assert_eq!(program.source_of(first_init(&program).span), "8 * 2");
  }

  #[test]
  fn parentheses_and_type_wrappers_are_transparent() {
    let program = parse_typescript_module("const a = ((1 as number)!);").unwrap();
    assert_eq!(first_init(&program).kind, ExprKind::Lit(Lit::Num(1.0)));
  }

  #[test]
  fn allocates_scopes_for_functions_and_blocks() {
    let program = parse_module("function f(a) { { let b = a; } }").unwrap();
    assert_eq!(
      program.scope_parents,
      vec![None, Some(ScopeId(0)), Some(ScopeId(1))]
    );
    let function = &program.functions[0];
    assert_eq!(function.scope, ScopeId(1));
    assert_eq!(function.name.as_ref().unwrap().scope, ScopeId::MODULE);
  }

  #[test]
  fn records_style_sites() {
    let program = parse_module(
      "const a = css({ color: 'red' });\nconst B = styled.div`color: blue;`;\nconst C = styled(Link)({ margin: 0 });\nconst el = <div css={{ padding: 8 }} />;",
    )
    .unwrap();
    let kinds: Vec<_> = program.sites.iter().map(|site| site.kind.clone()).collect();
    assert_eq!(
      kinds,
      vec![
        StyleSiteKind::Css,
        StyleSiteKind::Styled { tag: "div".into() },
        StyleSiteKind::Styled { tag: "Link".into() },
        StyleSiteKind::CssProp,
      ]
    );
  }

  #[test]
  fn template_quasis_keep_raw_and_cooked_text() {
    let program = parse_module(r"const a = `a\tb${1}c`;").unwrap();
    let ExprKind::Template(template) = &first_init(&program).kind else {
      panic!("expected a template");
    };
    assert_eq!(template.quasis[0].raw, r"a\tb");
    assert_eq!(template.quasis[0].cooked.as_deref(), Some("a\tb"));
    assert_eq!(template.quasis[1].raw, "c");
  }

  #[test]
  fn rest_parameters_are_flagged() {
    let program = parse_module("const f = (a, ...rest) => rest;").unwrap();
    assert!(program.functions[0].has_rest);
    assert_eq!(program.functions[0].params.len(), 2);
  }

  #[test]
  fn assignments_inside_classes_are_kept_as_updates() {
    let program = parse_module("let a = 1; class A { m() { a = 2; } }").unwrap();
    let Stmt::Other { exprs, .. } = &program.body[1] else {
      panic!("expected a class statement");
    };
    assert!(matches!(
      &exprs[0].kind,
      ExprKind::Update { target: AssignTarget::Ident(ident) } if ident.name == "a"
    ));
  }
}
