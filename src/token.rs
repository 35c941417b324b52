use crate::ast::BinaryOperator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    Identifier(&'a str),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    True,
    False,
    None,

    // Keywords
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Def,
    Class,
    Return,
    Pass,
    Break,
    Continue,
    And,
    Or,
    Not,
    Is,
    Lambda,
    Try,
    Except,
    Finally,
    Raise,
    Assert,
    As,
    Yield,
    Global,
    Nonlocal,

    // Operators
    Equal,       // =
    ColonEqual,  // :=
    Plus,        // +
    Minus,       // -
    Star,        // *
    DoubleStar,  // **
    Slash,       // /
    DoubleSlash, // //
    Percent,     // %
    At,          // @
    LeftShift,   // <<
    RightShift,  // >>
    Pipe,        // |
    Amp,         // &
    Caret,       // ^
    Tilde,       // ~
    Less,        // <
    Greater,     // >
    LessEqual,   // <=
    GreaterEqual, // >=
    EqualEqual,  // ==
    NotEqual,    // !=
    Arrow,       // ->
    AugAssign(BinaryOperator),

    // Delimiters
    Colon,     // :
    Semicolon, // ;
    Comma,     // ,
    Dot,       // .
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    LBrace,    // {
    RBrace,    // }

    // Structural
    Newline,
    Indent,
    Dedent,
    EOF,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind<'a>, span: Span) -> Self {
        Self { kind, span }
    }
}
