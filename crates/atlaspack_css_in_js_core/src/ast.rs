//! Closed expression tree the evaluator and parser dispatch over.
//!
//! Every shape the core understands has its own variant. Anything else is
//! lowered into [`ExprKind::Other`], which keeps the nested expressions around
//! so the scope model can still see assignments hidden inside it.

use serde::Serialize;

/// Index of a scope in the scope arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
  pub const MODULE: ScopeId = ScopeId(0);

  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// Index of a function in [`Program::functions`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FunctionId(pub u32);

impl FunctionId {
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// Byte range into the module text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
  pub lo: u32,
  pub hi: u32,
}

impl Span {
  pub fn new(lo: u32, hi: u32) -> Self {
    Span { lo, hi }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ident {
  pub name: String,
  /// Scope the identifier appears in (not the scope that declares it).
  pub scope: ScopeId,
  pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Lit {
  Str(String),
  Num(f64),
  Bool(bool),
  Null,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
  Minus,
  Plus,
  Not,
  BitNot,
  TypeOf,
  Void,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Exp,
  EqEq,
  NotEq,
  EqEqEq,
  NotEqEq,
  Lt,
  LtEq,
  Gt,
  GtEq,
  BitAnd,
  BitOr,
  BitXor,
  LShift,
  RShift,
  ZeroFillRShift,
  /// `in`, `instanceof`: never folded.
  Relational,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
  And,
  Or,
  Nullish,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropKey {
  Static(String),
  Computed(Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ObjectProp {
  KeyValue { key: PropKey, value: Expr },
  Shorthand(Ident),
  Spread(Expr),
  /// Methods, getters and setters. Their bodies are kept for scope analysis.
  Other(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArrayElem {
  Expr(Expr),
  Spread(Expr),
  Hole,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Quasi {
  /// Text as written, escapes untouched. Style text is scanned from this.
  pub raw: String,
  /// Text with escapes applied; `None` when an escape is invalid.
  pub cooked: Option<String>,
}

impl Quasi {
  pub fn cooked_or_raw(&self) -> &str {
    self.cooked.as_deref().unwrap_or(&self.raw)
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Template {
  /// There is always one more quasi than there are expressions.
  pub quasis: Vec<Quasi>,
  pub exprs: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MemberProp {
  Name(String),
  Computed(Box<Expr>),
}

/// Left-hand side of an assignment or update.
#[derive(Clone, Debug, PartialEq)]
pub enum AssignTarget {
  Ident(Ident),
  Member(Box<Expr>),
  Pattern(Pat),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
  pub kind: ExprKind,
  pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
  Lit(Lit),
  Ident(Ident),
  This,
  Member {
    obj: Box<Expr>,
    prop: MemberProp,
  },
  Object(Vec<ObjectProp>),
  Array(Vec<ArrayElem>),
  Template(Template),
  TaggedTemplate {
    tag: Box<Expr>,
    template: Template,
  },
  Unary {
    op: UnaryOp,
    arg: Box<Expr>,
  },
  Binary {
    op: BinaryOp,
    left: Box<Expr>,
    right: Box<Expr>,
  },
  Logical {
    op: LogicalOp,
    left: Box<Expr>,
    right: Box<Expr>,
  },
  Conditional {
    test: Box<Expr>,
    cons: Box<Expr>,
    alt: Box<Expr>,
  },
  Call {
    callee: Box<Expr>,
    args: Vec<Expr>,
  },
  Function(FunctionId),
  Assign {
    target: AssignTarget,
    value: Box<Expr>,
  },
  Update {
    target: AssignTarget,
  },
  Sequence(Vec<Expr>),
  /// A shape the evaluator has no case for.
  Other(Vec<Expr>),
}

impl Expr {
  pub fn new(kind: ExprKind, span: Span) -> Self {
    Expr { kind, span }
  }

  pub fn as_ident(&self) -> Option<&Ident> {
    match &self.kind {
      ExprKind::Ident(ident) => Some(ident),
      _ => None,
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pat {
  Ident(Ident),
  Object {
    props: Vec<ObjectPatProp>,
    rest: Option<Box<Pat>>,
  },
  Array {
    elems: Vec<Option<Pat>>,
    rest: Option<Box<Pat>>,
  },
  Assign {
    target: Box<Pat>,
    default: Box<Expr>,
  },
  /// Member targets and other patterns that bind nothing.
  Other(Vec<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectPatProp {
  pub key: PropKey,
  pub value: Pat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
  Var,
  Let,
  Const,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDeclarator {
  pub pat: Pat,
  pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
  pub scope: ScopeId,
  pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
  Var {
    kind: VarKind,
    decls: Vec<VarDeclarator>,
  },
  /// `function name() {}` declarations.
  Function(FunctionId),
  /// Import specifiers.
  Import(Vec<Ident>),
  /// Class declarations, catch parameters and loop variables: names with no
  /// static value.
  Opaque(Vec<Ident>),
  Expr(Expr),
  Return(Option<Expr>),
  Block(Block),
  If {
    test: Expr,
    cons: Box<Stmt>,
    alt: Option<Box<Stmt>>,
  },
  /// Loops, switches, try/catch and the like.
  Other {
    exprs: Vec<Expr>,
    blocks: Vec<Block>,
  },
}

#[derive(Clone, Debug, PartialEq)]
pub enum FunctionBody {
  Expr(Box<Expr>),
  Block(Vec<Stmt>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
  pub id: FunctionId,
  /// Declared name, bound in the enclosing scope for declarations and in the
  /// function's own scope for named function expressions.
  pub name: Option<Ident>,
  pub is_declaration: bool,
  pub scope: ScopeId,
  pub params: Vec<Pat>,
  /// The last parameter is `...rest` and collects the remaining arguments.
  pub has_rest: bool,
  pub body: FunctionBody,
  pub span: Span,
}

impl Function {
  /// The single returned expression of a function whose body is nothing else.
  pub fn returned_expr(&self) -> Option<&Expr> {
    match &self.body {
      FunctionBody::Expr(expr) => Some(expr),
      FunctionBody::Block(stmts) => match stmts.as_slice() {
        [Stmt::Return(Some(expr))] => Some(expr),
        _ => None,
      },
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StyleSiteKind {
  /// `css(...)` or `` css`...` ``.
  Css,
  /// `styled.div(...)`, `` styled.div`...` `` or `styled(Component)(...)`.
  Styled { tag: String },
  /// JSX `css={...}` attribute.
  CssProp,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StyleSite {
  pub kind: StyleSiteKind,
  /// The `css`-like helper or `styled` identifier the site was recognised by.
  /// `None` for `css={...}` attributes.
  pub callee: Option<Ident>,
  pub args: Vec<Expr>,
  pub span: Span,
}

#[derive(Clone, Debug, Default)]
pub struct Program {
  pub source: String,
  pub body: Vec<Stmt>,
  pub functions: Vec<Function>,
  /// Parent of each scope, indexed by [`ScopeId`]. The module scope has none.
  pub scope_parents: Vec<Option<ScopeId>>,
  pub sites: Vec<StyleSite>,
}

impl Program {
  pub fn function(&self, id: FunctionId) -> &Function {
    &self.functions[id.index()]
  }

  pub fn source_of(&self, span: Span) -> &str {
    self
      .source
      .get(span.lo as usize..span.hi as usize)
      .unwrap_or("")
  }
}
