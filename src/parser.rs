use crate::ast::{
    AssignTarget, BinaryOperator, BoolOperator, CompareOperator, ComprehensionClause,
    ComprehensionKind, ElifClause, ExceptHandler, Expression, Keyword, Parameter, ParameterKind,
    Program, Statement, StatementKind, UnaryOperator,
};
use crate::lexer;
use crate::token::{Span, Token, TokenKind};

mod error;

pub use error::{ParseError, ParseResult};

/// Binary operator tiers from loosest to tightest binding.
const BINARY_LEVELS: usize = 6;

/// Source keywords the grammar deliberately leaves out.
const UNSUPPORTED_KEYWORDS: &[&str] = &["import", "from", "with", "del", "async", "await"];

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
}

impl<'a> Parser<'a> {
    pub fn new(mut tokens: Vec<Token<'a>>) -> Self {
        if !matches!(tokens.last().map(|token| &token.kind), Some(TokenKind::EOF)) {
            let span = tokens.last().map(|token| token.span).unwrap_or_default();
            tokens.push(Token::new(TokenKind::EOF, span));
        }
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        while !matches!(self.kind(), TokenKind::EOF) {
            if self.consume_newlines() {
                continue;
            }
            statements.extend(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> ParseResult<Vec<Statement>> {
        let statement = match self.kind() {
            TokenKind::At => self.parse_decorated()?,
            TokenKind::Def => self.parse_function_def(Vec::new())?,
            TokenKind::Class => self.parse_class_def(Vec::new())?,
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::For => self.parse_for()?,
            TokenKind::Try => self.parse_try()?,
            _ => return self.parse_simple_statements(),
        };
        Ok(vec![statement])
    }

    fn parse_simple_statements(&mut self) -> ParseResult<Vec<Statement>> {
        let mut statements = vec![self.parse_simple_statement()?];
        while self.eat(&TokenKind::Semicolon) {
            if matches!(self.kind(), TokenKind::Newline | TokenKind::EOF) {
                break;
            }
            statements.push(self.parse_simple_statement()?);
        }
        if !matches!(self.kind(), TokenKind::EOF) {
            self.expect(&TokenKind::Newline, "newline")?;
        }
        Ok(statements)
    }

    fn parse_simple_statement(&mut self) -> ParseResult<Statement> {
        let span = self.span();
        let kind = match self.kind() {
            TokenKind::Pass => {
                self.advance();
                StatementKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                StatementKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StatementKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                if self.at_statement_end() {
                    StatementKind::Return(None)
                } else {
                    StatementKind::Return(Some(self.parse_expression_list()?))
                }
            }
            TokenKind::Raise => {
                self.advance();
                if self.at_statement_end() {
                    StatementKind::Raise(None)
                } else {
                    let exception = self.parse_expression()?;
                    if matches!(self.kind(), TokenKind::Identifier("from")) {
                        return Err(self.invalid("'raise ... from' is not supported", self.span()));
                    }
                    StatementKind::Raise(Some(exception))
                }
            }
            TokenKind::Assert => {
                self.advance();
                let condition = self.parse_expression()?;
                let message = if self.eat(&TokenKind::Comma) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                StatementKind::Assert { condition, message }
            }
            TokenKind::Global => {
                self.advance();
                StatementKind::Global(self.parse_name_list()?)
            }
            TokenKind::Nonlocal => {
                self.advance();
                StatementKind::Nonlocal(self.parse_name_list()?)
            }
            TokenKind::Identifier(word) if UNSUPPORTED_KEYWORDS.contains(word) => {
                return Err(self.invalid(format!("'{word}' statements are not supported"), span));
            }
            _ => return self.parse_expression_statement(span),
        };
        Ok(Statement::new(kind, span))
    }

    fn parse_expression_statement(&mut self, span: Span) -> ParseResult<Statement> {
        let first = self.parse_expression_list_or_yield()?;
        let kind = match self.kind().clone() {
            TokenKind::Equal => {
                self.advance();
                let target = to_target(first, span)?;
                let value = self.parse_expression_list_or_yield()?;
                if matches!(self.kind(), TokenKind::Equal) {
                    return Err(self.invalid("Chained assignment is not supported", span));
                }
                StatementKind::Assign { target, value }
            }
            TokenKind::AugAssign(op) => {
                self.advance();
                let target = to_target(first, span)?;
                if matches!(target, AssignTarget::Tuple(_)) {
                    return Err(self.invalid("Augmented assignment to a tuple", span));
                }
                let value = self.parse_expression_list_or_yield()?;
                StatementKind::AugAssign { target, op, value }
            }
            TokenKind::Colon => {
                // Annotations are parsed and dropped.
                self.advance();
                let target = to_target(first, span)?;
                self.parse_expression()?;
                if self.eat(&TokenKind::Equal) {
                    let value = self.parse_expression_list_or_yield()?;
                    StatementKind::Assign { target, value }
                } else {
                    StatementKind::Pass
                }
            }
            _ => StatementKind::Expr(first),
        };
        Ok(Statement::new(kind, span))
    }

    fn parse_decorated(&mut self) -> ParseResult<Statement> {
        let mut decorators = Vec::new();
        while self.eat(&TokenKind::At) {
            decorators.push(self.parse_named_expression()?);
            self.expect(&TokenKind::Newline, "newline")?;
            self.consume_newlines();
        }
        match self.kind() {
            TokenKind::Def => self.parse_function_def(decorators),
            TokenKind::Class => self.parse_class_def(decorators),
            _ => Err(self.unexpected("def or class after decorator")),
        }
    }

    fn parse_function_def(&mut self, decorators: Vec<Expression>) -> ParseResult<Statement> {
        let span = self.expect(&TokenKind::Def, "def")?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LParen, "(")?;
        let params = self.parse_parameters(&TokenKind::RParen, true)?;
        self.expect(&TokenKind::RParen, ")")?;
        if self.eat(&TokenKind::Arrow) {
            self.parse_expression()?;
        }
        let body = self.parse_block()?;
        Ok(Statement::new(
            StatementKind::FunctionDef {
                name,
                params,
                decorators,
                body,
            },
            span,
        ))
    }

    fn parse_class_def(&mut self, decorators: Vec<Expression>) -> ParseResult<Statement> {
        let span = self.expect(&TokenKind::Class, "class")?;
        let name = self.expect_identifier()?;
        let (bases, keywords) = if self.eat(&TokenKind::LParen) {
            self.parse_call_arguments()?
        } else {
            (Vec::new(), Vec::new())
        };
        let body = self.parse_block()?;
        Ok(Statement::new(
            StatementKind::ClassDef {
                name,
                bases,
                keywords,
                decorators,
                body,
            },
            span,
        ))
    }

    fn parse_parameters(
        &mut self,
        closing: &TokenKind<'a>,
        allow_annotations: bool,
    ) -> ParseResult<Vec<Parameter>> {
        let mut params = Vec::new();
        while !self.check(closing) {
            let kind = if self.eat(&TokenKind::Star) {
                ParameterKind::VarArgs
            } else if self.eat(&TokenKind::DoubleStar) {
                ParameterKind::KwArgs
            } else {
                ParameterKind::Positional
            };
            if !matches!(self.kind(), TokenKind::Identifier(_)) {
                return Err(self.invalid("Only named parameters are supported", self.span()));
            }
            let name = self.expect_identifier()?;
            if allow_annotations && self.eat(&TokenKind::Colon) {
                self.parse_expression()?;
            }
            let default = if self.eat(&TokenKind::Equal) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            params.push(Parameter {
                name,
                default,
                kind,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        let span = self.expect(&TokenKind::If, "if")?;
        let condition = self.parse_named_expression()?;
        let then_body = self.parse_block()?;

        let mut elif_clauses = Vec::new();
        while matches!(self.kind(), TokenKind::Elif) {
            let span = self.advance().span;
            let condition = self.parse_named_expression()?;
            let body = self.parse_block()?;
            elif_clauses.push(ElifClause {
                condition,
                body,
                span,
            });
        }
        let else_body = self.parse_else_block()?;

        Ok(Statement::new(
            StatementKind::If {
                condition,
                then_body,
                elif_clauses,
                else_body,
            },
            span,
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        let span = self.expect(&TokenKind::While, "while")?;
        let condition = self.parse_named_expression()?;
        let body = self.parse_block()?;
        let else_body = self.parse_else_block()?;
        Ok(Statement::new(
            StatementKind::While {
                condition,
                body,
                else_body,
            },
            span,
        ))
    }

    fn parse_for(&mut self) -> ParseResult<Statement> {
        let span = self.expect(&TokenKind::For, "for")?;
        let target = self.parse_target_list(span)?;
        self.expect(&TokenKind::In, "in")?;
        let iterable = self.parse_expression_list()?;
        let body = self.parse_block()?;
        let else_body = self.parse_else_block()?;
        Ok(Statement::new(
            StatementKind::For {
                target,
                iterable,
                body,
                else_body,
            },
            span,
        ))
    }

    fn parse_try(&mut self) -> ParseResult<Statement> {
        let span = self.expect(&TokenKind::Try, "try")?;
        let body = self.parse_block()?;

        let mut handlers = Vec::new();
        while matches!(self.kind(), TokenKind::Except) {
            let span = self.advance().span;
            let (kind, name) = if matches!(self.kind(), TokenKind::Colon) {
                (None, None)
            } else {
                let kind = self.parse_expression()?;
                let name = if self.eat(&TokenKind::As) {
                    Some(self.expect_identifier()?)
                } else {
                    None
                };
                (Some(kind), name)
            };
            let body = self.parse_block()?;
            handlers.push(ExceptHandler {
                kind,
                name,
                body,
                span,
            });
        }

        let else_body = self.parse_else_block()?;
        let finally_body = if self.eat(&TokenKind::Finally) {
            self.parse_block()?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && finally_body.is_empty() {
            return Err(self.invalid("try requires an except or finally clause", span));
        }
        if handlers.is_empty() && !else_body.is_empty() {
            return Err(self.invalid("try/else requires an except clause", span));
        }

        Ok(Statement::new(
            StatementKind::Try {
                body,
                handlers,
                else_body,
                finally_body,
            },
            span,
        ))
    }

    fn parse_else_block(&mut self) -> ParseResult<Vec<Statement>> {
        if self.eat(&TokenKind::Else) {
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    /// Parses `: <suite>` where the suite is either an indented block or
    /// simple statements on the same line.
    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(&TokenKind::Colon, ":")?;
        if !matches!(self.kind(), TokenKind::Newline) {
            return self.parse_simple_statements();
        }
        self.advance();
        self.consume_newlines();
        self.expect(&TokenKind::Indent, "indented block")?;

        let mut body = Vec::new();
        while !matches!(self.kind(), TokenKind::Dedent | TokenKind::EOF) {
            if self.consume_newlines() {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        if !matches!(self.kind(), TokenKind::EOF) {
            self.expect(&TokenKind::Dedent, "dedent")?;
        }
        Ok(body)
    }

    fn parse_name_list(&mut self) -> ParseResult<Vec<String>> {
        let mut names = vec![self.expect_identifier()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_identifier()?);
        }
        Ok(names)
    }

    fn parse_target_list(&mut self, span: Span) -> ParseResult<AssignTarget> {
        let first = self.parse_binary(0)?;
        if !matches!(self.kind(), TokenKind::Comma) {
            return to_target(first, span);
        }
        let mut elements = vec![first];
        while self.eat(&TokenKind::Comma) {
            if matches!(self.kind(), TokenKind::In) {
                break;
            }
            elements.push(self.parse_binary(0)?);
        }
        to_target(Expression::Tuple(elements), span)
    }

    fn parse_expression_list_or_yield(&mut self) -> ParseResult<Expression> {
        if matches!(self.kind(), TokenKind::Yield) {
            return self.parse_yield();
        }
        self.parse_expression_list()
    }

    fn parse_yield(&mut self) -> ParseResult<Expression> {
        self.expect(&TokenKind::Yield, "yield")?;
        if matches!(self.kind(), TokenKind::Identifier("from")) {
            return Err(self.invalid("'yield from' is not supported", self.span()));
        }
        if self.at_statement_end() || matches!(self.kind(), TokenKind::RParen) {
            return Ok(Expression::Yield(None));
        }
        Ok(Expression::Yield(Some(Box::new(self.parse_expression_list()?))))
    }

    /// Parses `a, b, c` into a tuple; a single expression without a comma is returned as is.
    fn parse_expression_list(&mut self) -> ParseResult<Expression> {
        let first = self.parse_expression()?;
        if !matches!(self.kind(), TokenKind::Comma) {
            return Ok(first);
        }
        let mut elements = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at_expression_list_end() {
                break;
            }
            elements.push(self.parse_expression()?);
        }
        Ok(Expression::Tuple(elements))
    }

    fn parse_named_expression(&mut self) -> ParseResult<Expression> {
        if let TokenKind::Identifier(name) = self.kind()
            && matches!(self.peek_kind(1), Some(TokenKind::ColonEqual))
        {
            let name = name.to_string();
            self.advance();
            self.advance();
            let value = self.parse_expression()?;
            return Ok(Expression::NamedExpr {
                name,
                value: Box::new(value),
            });
        }
        self.parse_expression()
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        if matches!(self.kind(), TokenKind::Lambda) {
            return self.parse_lambda();
        }
        let expr = self.parse_or()?;
        if !self.eat(&TokenKind::If) {
            return Ok(expr);
        }
        let condition = self.parse_or()?;
        self.expect(&TokenKind::Else, "else")?;
        let orelse = self.parse_expression()?;
        Ok(Expression::Conditional {
            condition: Box::new(condition),
            body: Box::new(expr),
            orelse: Box::new(orelse),
        })
    }

    fn parse_lambda(&mut self) -> ParseResult<Expression> {
        self.expect(&TokenKind::Lambda, "lambda")?;
        let params = self.parse_parameters(&TokenKind::Colon, false)?;
        self.expect(&TokenKind::Colon, ":")?;
        let body = self.parse_expression()?;
        Ok(Expression::Lambda {
            params,
            body: Box::new(body),
        })
    }

    fn parse_or(&mut self) -> ParseResult<Expression> {
        let first = self.parse_and()?;
        if !matches!(self.kind(), TokenKind::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&TokenKind::Or) {
            values.push(self.parse_and()?);
        }
        Ok(Expression::BoolOp {
            op: BoolOperator::Or,
            values,
        })
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        let first = self.parse_not()?;
        if !matches!(self.kind(), TokenKind::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&TokenKind::And) {
            values.push(self.parse_not()?);
        }
        Ok(Expression::BoolOp {
            op: BoolOperator::And,
            values,
        })
    }

    fn parse_not(&mut self) -> ParseResult<Expression> {
        if self.eat(&TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let left = self.parse_binary(0)?;
        let mut comparisons = Vec::new();
        loop {
            let op = match self.kind() {
                TokenKind::Less => CompareOperator::Lt,
                TokenKind::LessEqual => CompareOperator::LtE,
                TokenKind::Greater => CompareOperator::Gt,
                TokenKind::GreaterEqual => CompareOperator::GtE,
                TokenKind::EqualEqual => CompareOperator::Eq,
                TokenKind::NotEqual => CompareOperator::NotEq,
                TokenKind::In => CompareOperator::In,
                TokenKind::Not if matches!(self.peek_kind(1), Some(TokenKind::In)) => {
                    self.advance();
                    CompareOperator::NotIn
                }
                TokenKind::Is if matches!(self.peek_kind(1), Some(TokenKind::Not)) => {
                    self.advance();
                    CompareOperator::IsNot
                }
                TokenKind::Is => CompareOperator::Is,
                _ => break,
            };
            self.advance();
            comparisons.push((op, self.parse_binary(0)?));
        }
        if comparisons.is_empty() {
            return Ok(left);
        }
        Ok(Expression::Compare {
            left: Box::new(left),
            comparisons,
        })
    }

    fn parse_binary(&mut self, level: usize) -> ParseResult<Expression> {
        if level == BINARY_LEVELS {
            return self.parse_factor();
        }
        let mut left = self.parse_binary(level + 1)?;
        while let Some(op) = binary_operator(self.kind(), level) {
            self.advance();
            let right = self.parse_binary(level + 1)?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> ParseResult<Expression> {
        let op = match self.kind() {
            TokenKind::Minus => UnaryOperator::Neg,
            TokenKind::Plus => UnaryOperator::Pos,
            TokenKind::Tilde => UnaryOperator::Invert,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_factor()?;
        Ok(Expression::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> ParseResult<Expression> {
        let base = self.parse_postfix()?;
        if !self.eat(&TokenKind::DoubleStar) {
            return Ok(base);
        }
        let exponent = self.parse_factor()?;
        Ok(Expression::BinaryOp {
            left: Box::new(base),
            op: BinaryOperator::Pow,
            right: Box::new(exponent),
        })
    }

    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.kind() {
                TokenKind::LParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_arguments()?;
                    expr = Expression::Call {
                        callee: Box::new(expr),
                        args,
                        keywords,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    expr = self.parse_subscript(expr)?;
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    expr = Expression::Attribute {
                        object: Box::new(expr),
                        name,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Parses arguments after an opening parenthesis, through the closing one.
    fn parse_call_arguments(&mut self) -> ParseResult<(Vec<Expression>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !matches!(self.kind(), TokenKind::RParen) {
            if matches!(self.kind(), TokenKind::Star) {
                return Err(self.invalid("Argument unpacking is not supported", self.span()));
            }
            if self.eat(&TokenKind::DoubleStar) {
                let value = self.parse_expression()?;
                keywords.push(Keyword { name: None, value });
            } else if let TokenKind::Identifier(name) = self.kind()
                && matches!(self.peek_kind(1), Some(TokenKind::Equal))
            {
                let name = name.to_string();
                self.advance();
                self.advance();
                let value = self.parse_expression()?;
                keywords.push(Keyword {
                    name: Some(name),
                    value,
                });
            } else {
                if !keywords.is_empty() {
                    return Err(self.invalid(
                        "Positional argument follows keyword argument",
                        self.span(),
                    ));
                }
                let arg = self.parse_named_expression()?;
                if matches!(self.kind(), TokenKind::For) {
                    args.push(self.parse_comprehension(ComprehensionKind::Generator, arg)?);
                } else {
                    args.push(arg);
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, ")")?;
        Ok((args, keywords))
    }

    fn parse_subscript(&mut self, object: Expression) -> ParseResult<Expression> {
        let lower = if matches!(self.kind(), TokenKind::Colon) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        if self.eat(&TokenKind::Colon) {
            let upper = if matches!(self.kind(), TokenKind::Colon | TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            };
            let step = if self.eat(&TokenKind::Colon) && !matches!(self.kind(), TokenKind::RBracket)
            {
                Some(Box::new(self.parse_expression()?))
            } else {
                None
            };
            self.expect(&TokenKind::RBracket, "]")?;
            return Ok(Expression::Slice {
                object: Box::new(object),
                lower: lower.map(Box::new),
                upper,
                step,
            });
        }

        let Some(mut index) = lower else {
            return Err(self.unexpected("subscript"));
        };
        if matches!(self.kind(), TokenKind::Comma) {
            let mut elements = vec![index];
            while self.eat(&TokenKind::Comma) {
                if matches!(self.kind(), TokenKind::RBracket) {
                    break;
                }
                elements.push(self.parse_expression()?);
            }
            index = Expression::Tuple(elements);
        }
        self.expect(&TokenKind::RBracket, "]")?;
        Ok(Expression::Index {
            object: Box::new(object),
            index: Box::new(index),
        })
    }

    fn parse_atom(&mut self) -> ParseResult<Expression> {
        let token = self.advance();
        match token.kind {
            TokenKind::Integer(value) => Ok(Expression::Integer(value)),
            TokenKind::Float(value) => Ok(Expression::Float(value)),
            TokenKind::String(mut value) => {
                // Adjacent literals concatenate.
                while let TokenKind::String(next) = self.kind() {
                    value.push_str(next);
                    self.advance();
                }
                Ok(Expression::String(value))
            }
            TokenKind::Bytes(mut value) => {
                while let TokenKind::Bytes(next) = self.kind() {
                    value.extend_from_slice(next);
                    self.advance();
                }
                Ok(Expression::Bytes(value))
            }
            TokenKind::True => Ok(Expression::Boolean(true)),
            TokenKind::False => Ok(Expression::Boolean(false)),
            TokenKind::None => Ok(Expression::None),
            TokenKind::Identifier(name) => Ok(Expression::Identifier(name.to_string())),
            TokenKind::LParen => self.parse_parenthesized(),
            TokenKind::LBracket => self.parse_list_display(),
            TokenKind::LBrace => self.parse_dict_display(),
            _ => {
                self.position = self.position.saturating_sub(1);
                Err(self.unexpected("expression"))
            }
        }
    }

    fn parse_parenthesized(&mut self) -> ParseResult<Expression> {
        if self.eat(&TokenKind::RParen) {
            return Ok(Expression::Tuple(Vec::new()));
        }
        if matches!(self.kind(), TokenKind::Yield) {
            let expr = self.parse_yield()?;
            self.expect(&TokenKind::RParen, ")")?;
            return Ok(expr);
        }

        let first = self.parse_named_expression()?;
        if matches!(self.kind(), TokenKind::For) {
            let comprehension = self.parse_comprehension(ComprehensionKind::Generator, first)?;
            self.expect(&TokenKind::RParen, ")")?;
            return Ok(comprehension);
        }
        if !matches!(self.kind(), TokenKind::Comma) {
            self.expect(&TokenKind::RParen, ")")?;
            return Ok(first);
        }

        let mut elements = vec![first];
        while self.eat(&TokenKind::Comma) {
            if matches!(self.kind(), TokenKind::RParen) {
                break;
            }
            elements.push(self.parse_named_expression()?);
        }
        self.expect(&TokenKind::RParen, ")")?;
        Ok(Expression::Tuple(elements))
    }

    fn parse_list_display(&mut self) -> ParseResult<Expression> {
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expression::List(Vec::new()));
        }
        let first = self.parse_named_expression()?;
        if matches!(self.kind(), TokenKind::For) {
            let comprehension = self.parse_comprehension(ComprehensionKind::List, first)?;
            self.expect(&TokenKind::RBracket, "]")?;
            return Ok(comprehension);
        }

        let mut elements = vec![first];
        while self.eat(&TokenKind::Comma) {
            if matches!(self.kind(), TokenKind::RBracket) {
                break;
            }
            elements.push(self.parse_named_expression()?);
        }
        self.expect(&TokenKind::RBracket, "]")?;
        Ok(Expression::List(elements))
    }

    fn parse_dict_display(&mut self) -> ParseResult<Expression> {
        let mut entries = Vec::new();
        while !matches!(self.kind(), TokenKind::RBrace) {
            let span = self.span();
            let key = self.parse_expression()?;
            if !self.eat(&TokenKind::Colon) {
                return Err(self.invalid("Set literals are not supported", span));
            }
            let value = self.parse_expression()?;
            if matches!(self.kind(), TokenKind::For) {
                return Err(self.invalid("Dict comprehensions are not supported", span));
            }
            entries.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "}")?;
        Ok(Expression::Dict(entries))
    }

    fn parse_comprehension(
        &mut self,
        kind: ComprehensionKind,
        element: Expression,
    ) -> ParseResult<Expression> {
        let mut clauses = Vec::new();
        while matches!(self.kind(), TokenKind::For) {
            let span = self.advance().span;
            let target = self.parse_target_list(span)?;
            self.expect(&TokenKind::In, "in")?;
            let iterable = self.parse_or()?;
            let mut conditions = Vec::new();
            while self.eat(&TokenKind::If) {
                conditions.push(self.parse_or()?);
            }
            clauses.push(ComprehensionClause {
                target,
                iterable,
                conditions,
            });
        }
        Ok(Expression::Comprehension {
            kind,
            element: Box::new(element),
            clauses,
        })
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while matches!(self.kind(), TokenKind::Newline) {
            consumed = true;
            self.advance();
        }
        consumed
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::EOF
        )
    }

    fn at_expression_list_end(&self) -> bool {
        self.at_statement_end()
            || matches!(
                self.kind(),
                TokenKind::Equal
                    | TokenKind::AugAssign(_)
                    | TokenKind::Colon
                    | TokenKind::RParen
                    | TokenKind::RBracket
            )
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        if let TokenKind::Identifier(name) = self.kind() {
            let name = name.to_string();
            self.advance();
            Ok(name)
        } else {
            Err(self.unexpected("identifier"))
        }
    }

    fn expect(&mut self, kind: &TokenKind<'a>, expected: &str) -> ParseResult<Span> {
        if self.check(kind) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn eat(&mut self, kind: &TokenKind<'a>) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind<'a>) -> bool {
        std::mem::discriminant(self.kind()) == std::mem::discriminant(kind)
    }

    fn current(&self) -> &Token<'a> {
        let last = self.tokens.len() - 1;
        &self.tokens[self.position.min(last)]
    }

    fn kind(&self) -> &TokenKind<'a> {
        &self.current().kind
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn peek_kind(&self, offset: usize) -> Option<&TokenKind<'a>> {
        self.tokens
            .get(self.position + offset)
            .map(|token| &token.kind)
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.current().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let span = self.span();
        ParseError::Unexpected {
            expected: expected.to_string(),
            found: format!("{:?}", self.kind()),
            line: span.line,
            column: span.column,
        }
    }

    fn invalid(&self, message: impl Into<String>, span: Span) -> ParseError {
        ParseError::Invalid {
            message: message.into(),
            line: span.line,
            column: span.column,
        }
    }
}

fn binary_operator(kind: &TokenKind<'_>, level: usize) -> Option<BinaryOperator> {
    let op = match (level, kind) {
        (0, TokenKind::Pipe) => BinaryOperator::BitOr,
        (1, TokenKind::Caret) => BinaryOperator::BitXor,
        (2, TokenKind::Amp) => BinaryOperator::BitAnd,
        (3, TokenKind::LeftShift) => BinaryOperator::LShift,
        (3, TokenKind::RightShift) => BinaryOperator::RShift,
        (4, TokenKind::Plus) => BinaryOperator::Add,
        (4, TokenKind::Minus) => BinaryOperator::Sub,
        (5, TokenKind::Star) => BinaryOperator::Mult,
        (5, TokenKind::Slash) => BinaryOperator::Div,
        (5, TokenKind::DoubleSlash) => BinaryOperator::FloorDiv,
        (5, TokenKind::Percent) => BinaryOperator::Mod,
        (5, TokenKind::At) => BinaryOperator::MatMult,
        _ => return None,
    };
    Some(op)
}

fn to_target(expr: Expression, span: Span) -> ParseResult<AssignTarget> {
    match expr {
        Expression::Identifier(name) => Ok(AssignTarget::Name(name)),
        Expression::Tuple(elements) | Expression::List(elements) => elements
            .into_iter()
            .map(|element| to_target(element, span))
            .collect::<ParseResult<Vec<_>>>()
            .map(AssignTarget::Tuple),
        Expression::Attribute { object, name } => Ok(AssignTarget::Attribute {
            object: *object,
            name,
        }),
        Expression::Index { object, index } => Ok(AssignTarget::Index {
            object: *object,
            index: *index,
        }),
        Expression::Slice {
            object,
            lower,
            upper,
            step,
        } => Ok(AssignTarget::Slice {
            object: *object,
            lower: lower.map(|value| *value),
            upper: upper.map(|value| *value),
            step: step.map(|value| *value),
        }),
        other => Err(ParseError::Invalid {
            message: format!("Cannot assign to {}", describe_expression(&other)),
            line: span.line,
            column: span.column,
        }),
    }
}

fn describe_expression(expr: &Expression) -> &'static str {
    match expr {
        Expression::Call { .. } => "function call",
        Expression::BinaryOp { .. } | Expression::UnaryOp { .. } => "expression",
        Expression::Compare { .. } => "comparison",
        Expression::Lambda { .. } => "lambda",
        Expression::Comprehension { .. } => "comprehension",
        Expression::Integer(_)
        | Expression::Float(_)
        | Expression::String(_)
        | Expression::Bytes(_)
        | Expression::Boolean(_)
        | Expression::None => "literal",
        _ => "expression",
    }
}

pub fn parse_tokens(tokens: Vec<Token<'_>>) -> ParseResult<Program> {
    Parser::new(tokens).parse_program()
}

pub fn parse(input: &str) -> ParseResult<Program> {
    let tokens = lexer::tokenize(input)?;
    parse_tokens(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn ident(name: &str) -> Expression {
        Expression::Identifier(name.to_string())
    }

    fn kinds(program: Program) -> Vec<StatementKind> {
        program
            .statements
            .into_iter()
            .map(|statement| statement.kind)
            .collect()
    }

    fn parse_single(input: &str) -> StatementKind {
        let mut statements = kinds(parse(input).expect("parse failed"));
        assert_eq!(statements.len(), 1, "expected one statement");
        statements.remove(0)
    }

    #[test]
    fn parses_simple_program() {
        let input = indoc! {"
            def fn(a):
                n = a + 4
                print(n)
            fn(1)
        "};
        let program = parse(input).expect("parse failed");

        let expected = vec![
            StatementKind::FunctionDef {
                name: "fn".to_string(),
                params: vec![Parameter::positional("a")],
                decorators: vec![],
                body: vec![
                    Statement::new(
                        StatementKind::Assign {
                            target: AssignTarget::Name("n".to_string()),
                            value: Expression::BinaryOp {
                                left: Box::new(ident("a")),
                                op: BinaryOperator::Add,
                                right: Box::new(Expression::Integer(4)),
                            },
                        },
                        Span {
                            start: 15,
                            end: 16,
                            line: 2,
                            column: 4,
                        },
                    ),
                    Statement::new(
                        StatementKind::Expr(Expression::Call {
                            callee: Box::new(ident("print")),
                            args: vec![ident("n")],
                            keywords: vec![],
                        }),
                        Span {
                            start: 29,
                            end: 34,
                            line: 3,
                            column: 4,
                        },
                    ),
                ],
            },
            StatementKind::Expr(Expression::Call {
                callee: Box::new(ident("fn")),
                args: vec![Expression::Integer(1)],
                keywords: vec![],
            }),
        ];

        assert_eq!(kinds(program), expected);
    }

    #[test]
    fn records_statement_lines() {
        let input = indoc! {"
            x = 1

            if x:
                y = 2
        "};
        let program = parse(input).expect("parse failed");
        assert_eq!(program.statements[0].span.line, 1);
        assert_eq!(program.statements[1].span.line, 3);
        let StatementKind::If { then_body, .. } = &program.statements[1].kind else {
            panic!("expected if");
        };
        assert_eq!(then_body[0].span.line, 4);
    }

    #[test]
    fn parses_class_with_base_and_methods() {
        let input = indoc! {"
            class Employee(Person):
                \"\"\"An employee.\"\"\"
                def greet(self):
                    return 'hi ' + self.name
        "};
        let StatementKind::ClassDef {
            name, bases, body, ..
        } = parse_single(input)
        else {
            panic!("expected class");
        };
        assert_eq!(name, "Employee");
        assert_eq!(bases, vec![ident("Person")]);
        assert_eq!(body.len(), 2);
        assert!(matches!(
            &body[1].kind,
            StatementKind::FunctionDef { name, params, .. }
                if name == "greet" && params == &vec![Parameter::positional("self")]
        ));
    }

    #[test]
    fn parses_precedence() {
        let StatementKind::Expr(expr) = parse_single("a + b * c ** -d\n") else {
            panic!("expected expression");
        };
        let expected = Expression::BinaryOp {
            left: Box::new(ident("a")),
            op: BinaryOperator::Add,
            right: Box::new(Expression::BinaryOp {
                left: Box::new(ident("b")),
                op: BinaryOperator::Mult,
                right: Box::new(Expression::BinaryOp {
                    left: Box::new(ident("c")),
                    op: BinaryOperator::Pow,
                    right: Box::new(Expression::UnaryOp {
                        op: UnaryOperator::Neg,
                        operand: Box::new(ident("d")),
                    }),
                }),
            }),
        };
        assert_eq!(expr, expected);
    }

    #[test]
    fn parses_comparison_chains_and_negated_operators() {
        let StatementKind::Expr(expr) = parse_single("a < b <= c not in d is not e\n") else {
            panic!("expected expression");
        };
        let Expression::Compare { left, comparisons } = expr else {
            panic!("expected comparison");
        };
        assert_eq!(*left, ident("a"));
        let ops: Vec<_> = comparisons.iter().map(|(op, _)| *op).collect();
        assert_eq!(
            ops,
            vec![
                CompareOperator::Lt,
                CompareOperator::LtE,
                CompareOperator::NotIn,
                CompareOperator::IsNot,
            ]
        );
    }

    #[test]
    fn keeps_boolean_chains_flat() {
        let StatementKind::Expr(expr) = parse_single("a and b and not c or d\n") else {
            panic!("expected expression");
        };
        let Expression::BoolOp { op, values } = expr else {
            panic!("expected bool op");
        };
        assert_eq!(op, BoolOperator::Or);
        assert!(matches!(
            &values[0],
            Expression::BoolOp { op: BoolOperator::And, values } if values.len() == 3
        ));
    }

    #[test]
    fn parses_slices_with_missing_bounds() {
        let StatementKind::Assign { value, .. } = parse_single("y = xs[::2]\n") else {
            panic!("expected assignment");
        };
        assert_eq!(
            value,
            Expression::Slice {
                object: Box::new(ident("xs")),
                lower: None,
                upper: None,
                step: Some(Box::new(Expression::Integer(2))),
            }
        );
    }

    #[test]
    fn parses_tuple_unpacking_targets() {
        let StatementKind::Assign { target, value } = parse_single("a, (b, c) = t\n") else {
            panic!("expected assignment");
        };
        assert_eq!(
            target,
            AssignTarget::Tuple(vec![
                AssignTarget::Name("a".to_string()),
                AssignTarget::Tuple(vec![
                    AssignTarget::Name("b".to_string()),
                    AssignTarget::Name("c".to_string()),
                ]),
            ])
        );
        assert_eq!(value, ident("t"));
    }

    #[test]
    fn parses_comprehension_with_filter() {
        let StatementKind::Assign { value, .. } = parse_single("ys = [x * 2 for x in xs if x]\n")
        else {
            panic!("expected assignment");
        };
        let Expression::Comprehension {
            kind,
            element,
            clauses,
        } = value
        else {
            panic!("expected comprehension");
        };
        assert_eq!(kind, ComprehensionKind::List);
        assert!(matches!(*element, Expression::BinaryOp { .. }));
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].target, AssignTarget::Name("x".to_string()));
        assert_eq!(clauses[0].conditions, vec![ident("x")]);
    }

    #[test]
    fn parses_generator_argument() {
        let StatementKind::Expr(Expression::Call { args, .. }) = parse_single("sum(x for x in xs)\n")
        else {
            panic!("expected call");
        };
        assert!(matches!(
            &args[0],
            Expression::Comprehension {
                kind: ComprehensionKind::Generator,
                ..
            }
        ));
    }

    #[test]
    fn parses_try_with_all_clauses() {
        let input = indoc! {"
            try:
                risky()
            except ValueError as e:
                handle(e)
            except:
                pass
            else:
                ok()
            finally:
                done()
        "};
        let StatementKind::Try {
            body,
            handlers,
            else_body,
            finally_body,
        } = parse_single(input)
        else {
            panic!("expected try");
        };
        assert_eq!(body.len(), 1);
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0].kind, Some(ident("ValueError")));
        assert_eq!(handlers[0].name.as_deref(), Some("e"));
        assert_eq!(handlers[1].kind, None);
        assert_eq!(else_body.len(), 1);
        assert_eq!(finally_body.len(), 1);
    }

    #[test]
    fn parses_walrus_in_while_condition() {
        let input = indoc! {"
            while (n := next_value()) > 0:
                total += n
        "};
        let StatementKind::While { condition, .. } = parse_single(input) else {
            panic!("expected while");
        };
        let Expression::Compare { left, .. } = condition else {
            panic!("expected comparison");
        };
        assert!(matches!(*left, Expression::NamedExpr { ref name, .. } if name == "n"));
    }

    #[test]
    fn parses_elif_chain_and_inline_suites() {
        let input = indoc! {"
            if a: x = 1
            elif b: x = 2
            else: x = 3
        "};
        let StatementKind::If {
            elif_clauses,
            else_body,
            ..
        } = parse_single(input)
        else {
            panic!("expected if");
        };
        assert_eq!(elif_clauses.len(), 1);
        assert_eq!(elif_clauses[0].condition, ident("b"));
        assert_eq!(else_body.len(), 1);
    }

    #[test]
    fn captures_keywords_and_decorators() {
        let input = indoc! {"
            @staticmethod
            def f(a, b=2, *rest, **opts):
                return g(a, key=b)
        "};
        let StatementKind::FunctionDef {
            params,
            decorators,
            body,
            ..
        } = parse_single(input)
        else {
            panic!("expected def");
        };
        assert_eq!(decorators, vec![ident("staticmethod")]);
        let param_kinds: Vec<_> = params.iter().map(|param| param.kind).collect();
        assert_eq!(
            param_kinds,
            vec![
                ParameterKind::Positional,
                ParameterKind::Positional,
                ParameterKind::VarArgs,
                ParameterKind::KwArgs,
            ]
        );
        assert_eq!(params[1].default, Some(Expression::Integer(2)));
        let StatementKind::Return(Some(Expression::Call { keywords, .. })) = &body[0].kind else {
            panic!("expected return of call");
        };
        assert_eq!(keywords[0].name.as_deref(), Some("key"));
    }

    #[test]
    fn drops_annotations() {
        let input = indoc! {"
            def area(w: int, h: int) -> int:
                result: int = w * h
                return result
        "};
        let StatementKind::FunctionDef { params, body, .. } = parse_single(input) else {
            panic!("expected def");
        };
        assert_eq!(params.len(), 2);
        assert!(matches!(
            &body[0].kind,
            StatementKind::Assign { target: AssignTarget::Name(name), .. } if name == "result"
        ));
    }

    #[test]
    fn parses_lambda_and_conditional_expression() {
        let StatementKind::Assign { value, .. } =
            parse_single("f = lambda x, y: x if x > y else y\n")
        else {
            panic!("expected assignment");
        };
        let Expression::Lambda { params, body } = value else {
            panic!("expected lambda");
        };
        assert_eq!(params.len(), 2);
        assert!(matches!(*body, Expression::Conditional { .. }));
    }

    #[test]
    fn rejects_chained_assignment() {
        let err = parse("a = b = 1\n").expect_err("expected failure");
        assert!(err.to_string().contains("Chained assignment"));
    }

    #[test]
    fn rejects_assignment_to_call() {
        let err = parse("f() = 1\n").expect_err("expected failure");
        assert!(err.to_string().contains("Cannot assign to function call"));
    }

    #[test]
    fn rejects_imports() {
        let err = parse("import os\n").expect_err("expected failure");
        assert_eq!(
            err,
            ParseError::Invalid {
                message: "'import' statements are not supported".to_string(),
                line: 1,
                column: 0,
            }
        );
    }

    #[test]
    fn reports_missing_colon() {
        let err = parse("if x\n    y = 1\n").expect_err("expected failure");
        assert!(matches!(err, ParseError::Unexpected { ref expected, line: 1, .. } if expected == ":"));
    }

    #[test]
    fn surfaces_lexer_errors() {
        let err = parse("x = $\n").expect_err("expected failure");
        assert!(matches!(err, ParseError::Lex(_)));
    }
}
