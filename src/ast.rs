//! Syntax tree produced by the parser and consumed by the transpiler.
//!
//! Statements carry the span of their first token so that translation errors can
//! point at a source line. Expressions are span-free; they report through the
//! statement that contains them.

use crate::token::Span;

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Boolean(bool),
    None,
    Identifier(String),
    List(Vec<Expression>),
    Tuple(Vec<Expression>),
    Dict(Vec<(Expression, Expression)>),
    Attribute {
        object: Box<Expression>,
        name: String,
    },
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
    },
    Slice {
        object: Box<Expression>,
        lower: Option<Box<Expression>>,
        upper: Option<Box<Expression>>,
        step: Option<Box<Expression>>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    /// `a and b and c` keeps all operands in one node.
    BoolOp {
        op: BoolOperator,
        values: Vec<Expression>,
    },
    /// `a < b <= c` is `left = a` with `[(Lt, b), (LtE, c)]`.
    Compare {
        left: Box<Expression>,
        comparisons: Vec<(CompareOperator, Expression)>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
        keywords: Vec<Keyword>,
    },
    Conditional {
        condition: Box<Expression>,
        body: Box<Expression>,
        orelse: Box<Expression>,
    },
    Lambda {
        params: Vec<Parameter>,
        body: Box<Expression>,
    },
    Comprehension {
        kind: ComprehensionKind,
        element: Box<Expression>,
        clauses: Vec<ComprehensionClause>,
    },
    NamedExpr {
        name: String,
        value: Box<Expression>,
    },
    Yield(Option<Box<Expression>>),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitAnd,
    BitXor,
    MatMult,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mult => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::LShift => "<<",
            Self::RShift => ">>",
            Self::BitOr => "|",
            Self::BitAnd => "&",
            Self::BitXor => "^",
            Self::MatMult => "@",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOperator {
    Neg,
    Pos,
    Not,
    Invert,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BoolOperator {
    And,
    Or,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CompareOperator {
    Lt,
    LtE,
    Gt,
    GtE,
    Eq,
    NotEq,
    Is,
    IsNot,
    In,
    NotIn,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ComprehensionKind {
    List,
    Generator,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ComprehensionClause {
    pub target: AssignTarget,
    pub iterable: Expression,
    pub conditions: Vec<Expression>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Keyword {
    pub name: Option<String>,
    pub value: Expression,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParameterKind {
    Positional,
    VarArgs,
    KwArgs,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Expression>,
    pub kind: ParameterKind,
}

impl Parameter {
    pub fn positional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            kind: ParameterKind::Positional,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

impl Statement {
    pub fn new(kind: StatementKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum StatementKind {
    ClassDef {
        name: String,
        bases: Vec<Expression>,
        keywords: Vec<Keyword>,
        decorators: Vec<Expression>,
        body: Vec<Statement>,
    },
    FunctionDef {
        name: String,
        params: Vec<Parameter>,
        decorators: Vec<Expression>,
        body: Vec<Statement>,
    },
    Assign {
        target: AssignTarget,
        value: Expression,
    },
    AugAssign {
        target: AssignTarget,
        op: BinaryOperator,
        value: Expression,
    },
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        elif_clauses: Vec<ElifClause>,
        else_body: Vec<Statement>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    For {
        target: AssignTarget,
        iterable: Expression,
        body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    Try {
        body: Vec<Statement>,
        handlers: Vec<ExceptHandler>,
        else_body: Vec<Statement>,
        finally_body: Vec<Statement>,
    },
    Raise(Option<Expression>),
    Assert {
        condition: Expression,
        message: Option<Expression>,
    },
    Return(Option<Expression>),
    Nonlocal(Vec<String>),
    Global(Vec<String>),
    Break,
    Continue,
    Pass,
    Expr(Expression),
}

#[derive(Debug, PartialEq, Clone)]
pub struct ElifClause {
    pub condition: Expression,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ExceptHandler {
    pub kind: Option<Expression>,
    pub name: Option<String>,
    pub body: Vec<Statement>,
    pub span: Span,
}

/// Assignment target forms accepted by the parser.
#[derive(Debug, PartialEq, Clone)]
pub enum AssignTarget {
    Name(String),
    Tuple(Vec<AssignTarget>),
    Index {
        object: Expression,
        index: Expression,
    },
    Slice {
        object: Expression,
        lower: Option<Expression>,
        upper: Option<Expression>,
        step: Option<Expression>,
    },
    Attribute {
        object: Expression,
        name: String,
    },
}

#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    pub statements: Vec<Statement>,
}
