use std::{iter::Peekable, str::CharIndices};

use crate::ast::BinaryOperator;
use crate::token::{Span, Token, TokenKind};

mod error;

pub use error::{LexError, LexResult};

/// Operator and delimiter spellings, longest first so the first prefix match wins.
const OPERATORS: &[&str] = &[
    "**=", "//=", "<<=", ">>=", "**", "//", "<<", ">>", "<=", ">=", "==", "!=", ":=", "->", "+=",
    "-=", "*=", "/=", "%=", "@=", "|=", "&=", "^=", "+", "-", "*", "/", "%", "@", "|", "&", "^",
    "~", "<", ">", "=", ":", ";", ",", ".", "(", ")", "[", "]", "{", "}",
];

#[derive(Debug, Clone, Copy, Default)]
struct StringPrefix {
    raw: bool,
    bytes: bool,
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    indent_stack: Vec<usize>,
    pending_tokens: Vec<Token<'a>>,
    at_line_start: bool,
    line_has_tokens: bool,
    bracket_depth: usize,
    eof_reached: bool,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            indent_stack: vec![0],
            pending_tokens: Vec::new(),
            at_line_start: true,
            line_has_tokens: false,
            bracket_depth: 0,
            eof_reached: false,
            line: 1,
            column: 0,
        }
    }

    pub fn next_token(&mut self) -> LexResult<Token<'a>> {
        if let Some(token) = self.pending_tokens.pop() {
            return Ok(token);
        }

        if self.eof_reached {
            let span = self.empty_span();
            return Ok(Token::new(TokenKind::EOF, span));
        }

        if self.at_line_start && self.bracket_depth == 0 {
            self.at_line_start = false;
            if let Some(token) = self.read_indentation()? {
                return Ok(token);
            }
        }

        self.skip_insignificant();

        let Some(&(start, ch)) = self.chars.peek() else {
            return Ok(self.finish());
        };

        let line = self.line;
        let column = self.column;
        let kind = match ch {
            '\n' => {
                self.advance_char();
                self.at_line_start = true;
                self.line_has_tokens = false;
                TokenKind::Newline
            }
            '"' | '\'' => self.read_string(StringPrefix::default(), line, column)?,
            '.' if self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number(start, line, column)?
            }
            c if c.is_ascii_digit() => self.read_number(start, line, column)?,
            c if c.is_alphabetic() || c == '_' => self.read_word(start, line, column)?,
            _ => self.read_operator(ch, line, column)?,
        };
        if !matches!(kind, TokenKind::Newline) {
            self.line_has_tokens = true;
        }

        let end = self.current_index();
        Ok(Token::new(
            kind,
            Span {
                start,
                end,
                line,
                column,
            },
        ))
    }

    /// Consumes leading spaces of a logical line, skipping blank and comment-only lines,
    /// and produces the Indent/Dedent token the new level calls for.
    fn read_indentation(&mut self) -> LexResult<Option<Token<'a>>> {
        let indent_level = loop {
            let mut count = 0;
            while let Some(&(_, c)) = self.chars.peek() {
                match c {
                    ' ' => {
                        self.advance_char();
                        count += 1;
                    }
                    '\t' => return Err(LexError::TabIndentation { line: self.line }),
                    _ => break,
                }
            }
            match self.chars.peek().map(|&(_, c)| c) {
                Some('\n' | '\r') => {
                    self.advance_char();
                }
                Some('#') => self.skip_comment(),
                None => return Ok(None),
                Some(_) => break count,
            }
        };

        let current_indent = self.indent_stack.last().copied().unwrap_or(0);
        let span = self.empty_span();
        if indent_level > current_indent {
            self.indent_stack.push(indent_level);
            return Ok(Some(Token::new(TokenKind::Indent, span)));
        }

        while self
            .indent_stack
            .last()
            .is_some_and(|&top| top > indent_level)
        {
            self.indent_stack.pop();
            self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
        }
        if self.indent_stack.last().copied().unwrap_or(0) != indent_level {
            return Err(LexError::InvalidDedent {
                indent_level,
                line: self.line,
            });
        }
        Ok(self.pending_tokens.pop())
    }

    /// Queues the closing Newline (for a last line without one), the remaining Dedents and EOF.
    fn finish(&mut self) -> Token<'a> {
        self.eof_reached = true;
        let span = self.empty_span();
        self.pending_tokens.push(Token::new(TokenKind::EOF, span));
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
        }
        if self.line_has_tokens {
            self.line_has_tokens = false;
            self.pending_tokens
                .push(Token::new(TokenKind::Newline, span));
        }
        self.pending_tokens
            .pop()
            .unwrap_or(Token::new(TokenKind::EOF, span))
    }

    fn skip_insignificant(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' | '\x0c' => {
                    self.advance_char();
                }
                '#' => self.skip_comment(),
                '\\' if self.peek_nth(1) == Some('\n') => {
                    self.advance_char();
                    self.advance_char();
                }
                // Newlines inside brackets only separate items.
                '\n' if self.bracket_depth > 0 => {
                    self.advance_char();
                }
                _ => break,
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.advance_char();
        }
    }

    fn read_word(&mut self, start: usize, line: usize, column: usize) -> LexResult<TokenKind<'a>> {
        self.advance_char(); // Consume first char
        self.consume_while(|c| c.is_alphanumeric() || c == '_');

        let end_idx = self.current_index();
        let input = self.input;
        let word = &input[start..end_idx];

        if matches!(self.peek_nth(0), Some('"' | '\'')) {
            let prefix = match word.to_ascii_lowercase().as_str() {
                "b" => Some(StringPrefix {
                    raw: false,
                    bytes: true,
                }),
                "r" => Some(StringPrefix {
                    raw: true,
                    bytes: false,
                }),
                "rb" | "br" => Some(StringPrefix {
                    raw: true,
                    bytes: true,
                }),
                "u" => Some(StringPrefix::default()),
                "f" | "rf" | "fr" => {
                    return Err(LexError::UnsupportedStringPrefix {
                        prefix: word.to_string(),
                        line,
                        column,
                    });
                }
                _ => None,
            };
            if let Some(prefix) = prefix {
                return self.read_string(prefix, line, column);
            }
        }

        Ok(keyword(word).unwrap_or(TokenKind::Identifier(word)))
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> LexResult<TokenKind<'a>> {
        let radix = match (self.peek_nth(0), self.peek_nth(1)) {
            (Some('0'), Some('x' | 'X')) => Some(16),
            (Some('0'), Some('o' | 'O')) => Some(8),
            (Some('0'), Some('b' | 'B')) => Some(2),
            _ => None,
        };
        let input = self.input;

        if let Some(radix) = radix {
            self.advance_char();
            self.advance_char();
            self.consume_while(|c| c.is_ascii_alphanumeric() || c == '_');
            let literal = &input[start..self.current_index()];
            let digits = literal[2..].replace('_', "");
            return i64::from_str_radix(&digits, radix)
                .map(TokenKind::Integer)
                .map_err(|_| LexError::InvalidIntegerLiteral {
                    literal: literal.to_string(),
                    line,
                    column,
                });
        }

        let mut is_float = false;
        self.consume_while(|c| c.is_ascii_digit() || c == '_');
        if self.peek_nth(0) == Some('.') {
            is_float = true;
            self.advance_char();
            self.consume_while(|c| c.is_ascii_digit() || c == '_');
        }
        if matches!(self.peek_nth(0), Some('e' | 'E')) {
            let has_exponent = match self.peek_nth(1) {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => self.peek_nth(2).is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if has_exponent {
                is_float = true;
                self.advance_char();
                if matches!(self.peek_nth(0), Some('+' | '-')) {
                    self.advance_char();
                }
                self.consume_while(|c| c.is_ascii_digit());
            }
        }

        let literal = &input[start..self.current_index()];
        let cleaned = literal.replace('_', "");
        if is_float {
            cleaned
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| LexError::InvalidFloatLiteral {
                    literal: literal.to_string(),
                    line,
                    column,
                })
        } else {
            cleaned
                .parse::<i64>()
                .map(TokenKind::Integer)
                .map_err(|_| LexError::InvalidIntegerLiteral {
                    literal: literal.to_string(),
                    line,
                    column,
                })
        }
    }

    fn read_string(
        &mut self,
        prefix: StringPrefix,
        line: usize,
        column: usize,
    ) -> LexResult<TokenKind<'a>> {
        let unterminated = LexError::UnterminatedString { line, column };
        let Some((_, quote)) = self.advance_char() else {
            return Err(unterminated);
        };
        let triple = self.peek_nth(0) == Some(quote) && self.peek_nth(1) == Some(quote);
        if triple {
            self.advance_char();
            self.advance_char();
        }

        let mut text = String::new();
        loop {
            let Some((_, c)) = self.advance_char() else {
                return Err(unterminated);
            };
            match c {
                c if c == quote => {
                    if !triple {
                        break;
                    }
                    if self.peek_nth(0) == Some(quote) && self.peek_nth(1) == Some(quote) {
                        self.advance_char();
                        self.advance_char();
                        break;
                    }
                    text.push(c);
                }
                '\n' if !triple => return Err(unterminated),
                '\\' if prefix.raw => {
                    text.push('\\');
                    if let Some((_, next)) = self.advance_char() {
                        text.push(next);
                    }
                }
                '\\' => self.read_escape(&mut text, prefix, line, column)?,
                c if prefix.bytes && !c.is_ascii() => {
                    return Err(LexError::NonAsciiBytes { line, column });
                }
                _ => text.push(c),
            }
        }

        if prefix.bytes {
            // Escapes in bytes literals never exceed \xff.
            let bytes = text.chars().map(|c| c as u32 as u8).collect();
            return Ok(TokenKind::Bytes(bytes));
        }
        Ok(TokenKind::String(text))
    }

    fn read_escape(
        &mut self,
        text: &mut String,
        prefix: StringPrefix,
        line: usize,
        column: usize,
    ) -> LexResult<()> {
        let invalid = LexError::InvalidEscape { line, column };
        let Some((_, escaped)) = self.advance_char() else {
            return Err(LexError::UnterminatedString { line, column });
        };
        match escaped {
            '\n' => {}
            'n' => text.push('\n'),
            't' => text.push('\t'),
            'r' => text.push('\r'),
            'a' => text.push('\x07'),
            'b' => text.push('\x08'),
            'f' => text.push('\x0c'),
            'v' => text.push('\x0b'),
            '\\' | '\'' | '"' => text.push(escaped),
            '0'..='7' => {
                let mut value = escaped.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek_nth(0).and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            self.advance_char();
                            value = value * 8 + digit;
                        }
                        None => break,
                    }
                }
                text.push(char::from_u32(value).ok_or(invalid)?);
            }
            'x' => {
                let value = self.read_hex(2).ok_or(invalid.clone())?;
                text.push(char::from_u32(value).ok_or(invalid)?);
            }
            'u' | 'U' if !prefix.bytes => {
                let digits = if escaped == 'u' { 4 } else { 8 };
                let value = self.read_hex(digits).ok_or(invalid.clone())?;
                text.push(char::from_u32(value).ok_or(invalid)?);
            }
            other => {
                text.push('\\');
                text.push(other);
            }
        }
        Ok(())
    }

    fn read_hex(&mut self, digits: usize) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..digits {
            let digit = self.peek_nth(0)?.to_digit(16)?;
            self.advance_char();
            value = value * 16 + digit;
        }
        Some(value)
    }

    fn read_operator(&mut self, ch: char, line: usize, column: usize) -> LexResult<TokenKind<'a>> {
        let start = self.current_index();
        let input = self.input;
        let rest = &input[start..];
        let unexpected = LexError::UnexpectedCharacter {
            character: ch,
            line,
            column,
        };
        let spelling = OPERATORS
            .iter()
            .find(|spelling| rest.starts_with(**spelling))
            .ok_or(unexpected.clone())?;
        let kind = operator_kind(spelling).ok_or(unexpected)?;
        for _ in 0..spelling.len() {
            self.advance_char();
        }

        match kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                self.bracket_depth += 1;
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
            }
            _ => {}
        }
        Ok(kind)
    }

    fn consume_while(&mut self, predicate: impl Fn(char) -> bool) {
        while let Some(&(_, c)) = self.chars.peek() {
            if predicate(c) {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.chars.clone().nth(n).map(|(_, c)| c)
    }

    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }

    fn empty_span(&mut self) -> Span {
        let index = self.current_index();
        Span {
            start: index,
            end: index,
            line: self.line,
            column: self.column,
        }
    }
}

fn keyword<'a>(word: &str) -> Option<TokenKind<'a>> {
    let kind = match word {
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "def" => TokenKind::Def,
        "class" => TokenKind::Class,
        "return" => TokenKind::Return,
        "pass" => TokenKind::Pass,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "is" => TokenKind::Is,
        "lambda" => TokenKind::Lambda,
        "try" => TokenKind::Try,
        "except" => TokenKind::Except,
        "finally" => TokenKind::Finally,
        "raise" => TokenKind::Raise,
        "assert" => TokenKind::Assert,
        "as" => TokenKind::As,
        "yield" => TokenKind::Yield,
        "global" => TokenKind::Global,
        "nonlocal" => TokenKind::Nonlocal,
        "True" => TokenKind::True,
        "False" => TokenKind::False,
        "None" => TokenKind::None,
        _ => return None,
    };
    Some(kind)
}

fn operator_kind<'a>(spelling: &str) -> Option<TokenKind<'a>> {
    let kind = match spelling {
        "**=" => TokenKind::AugAssign(BinaryOperator::Pow),
        "//=" => TokenKind::AugAssign(BinaryOperator::FloorDiv),
        "<<=" => TokenKind::AugAssign(BinaryOperator::LShift),
        ">>=" => TokenKind::AugAssign(BinaryOperator::RShift),
        "+=" => TokenKind::AugAssign(BinaryOperator::Add),
        "-=" => TokenKind::AugAssign(BinaryOperator::Sub),
        "*=" => TokenKind::AugAssign(BinaryOperator::Mult),
        "/=" => TokenKind::AugAssign(BinaryOperator::Div),
        "%=" => TokenKind::AugAssign(BinaryOperator::Mod),
        "@=" => TokenKind::AugAssign(BinaryOperator::MatMult),
        "|=" => TokenKind::AugAssign(BinaryOperator::BitOr),
        "&=" => TokenKind::AugAssign(BinaryOperator::BitAnd),
        "^=" => TokenKind::AugAssign(BinaryOperator::BitXor),
        "**" => TokenKind::DoubleStar,
        "//" => TokenKind::DoubleSlash,
        "<<" => TokenKind::LeftShift,
        ">>" => TokenKind::RightShift,
        "<=" => TokenKind::LessEqual,
        ">=" => TokenKind::GreaterEqual,
        "==" => TokenKind::EqualEqual,
        "!=" => TokenKind::NotEqual,
        ":=" => TokenKind::ColonEqual,
        "->" => TokenKind::Arrow,
        "+" => TokenKind::Plus,
        "-" => TokenKind::Minus,
        "*" => TokenKind::Star,
        "/" => TokenKind::Slash,
        "%" => TokenKind::Percent,
        "@" => TokenKind::At,
        "|" => TokenKind::Pipe,
        "&" => TokenKind::Amp,
        "^" => TokenKind::Caret,
        "~" => TokenKind::Tilde,
        "<" => TokenKind::Less,
        ">" => TokenKind::Greater,
        "=" => TokenKind::Equal,
        ":" => TokenKind::Colon,
        ";" => TokenKind::Semicolon,
        "," => TokenKind::Comma,
        "." => TokenKind::Dot,
        "(" => TokenKind::LParen,
        ")" => TokenKind::RParen,
        "[" => TokenKind::LBracket,
        "]" => TokenKind::RBracket,
        "{" => TokenKind::LBrace,
        "}" => TokenKind::RBrace,
        _ => return None,
    };
    Some(kind)
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token<'_>>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::EOF);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}
