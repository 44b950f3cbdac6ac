//! Parser: recursive descent for statements, precedence climbing for
//! expressions, spanned errors.

use std::rc::Rc;

use thiserror::Error;

use crate::core::ast::{
    AstNode, FunctionBody, FunctionDef, LogicalOp, Pos, Primitive, SwitchCase, UnaryOp,
};
use crate::core::symbols::{Delimiter, Keyword, Operator};
use crate::core::token::{Token, TokenKind};

/// Lowest binding power handled by the climbing loop (the pipe operator);
/// assignment and the lambda arrow are parsed above it.
const MIN_INFIX_PRECEDENCE: u8 = 2;

/// Deepest statement/expression nesting accepted.
pub const MAX_NESTING: usize = 256;

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at {line}:{col}")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

/// Parses a token stream into a `Program` node.
pub fn parse(tokens: Vec<Token>) -> Result<AstNode, SyntaxError> {
    Parser::new(tokens).parse()
}

impl Parser {
    /// Comments are dropped; a trailing `EndOfInput` is guaranteed.
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut tokens: Vec<Token> = tokens.into_iter().filter(|t| !t.is_comment()).collect();
        let needs_eof = !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::EndOfInput));
        if needs_eof {
            let (line, col) = tokens.last().map(|t| (t.line, t.col)).unwrap_or((1, 1));
            tokens.push(Token::new(TokenKind::EndOfInput, String::new(), 0, line, col));
        }
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub fn parse(&mut self) -> Result<AstNode, SyntaxError> {
        let mut nodes = Vec::new();
        while !self.is_at_end() {
            nodes.push(self.parse_statement()?);
        }
        Ok(AstNode::Program(nodes))
    }

    /// Runs `f` one nesting level deeper, refusing past [`MAX_NESTING`].
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, SyntaxError>) -> Result<T, SyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(self.err_here(&format!("nesting deeper than {MAX_NESTING} levels")));
        }
        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || f(self));
        self.depth -= 1;
        result
    }

    fn parse_statement(&mut self) -> Result<AstNode, SyntaxError> {
        self.nested(Self::parse_statement_inner)
    }

    fn parse_statement_inner(&mut self) -> Result<AstNode, SyntaxError> {
        let stmt = match self.peek().kind.clone() {
            TokenKind::Keyword(Keyword::Let) => self.parse_let(false)?,
            TokenKind::Keyword(Keyword::Const) => self.parse_let(true)?,
            TokenKind::Keyword(Keyword::Fn) if self.peek_is_identifier(1) => self.parse_function_decl(false)?,
            TokenKind::Keyword(Keyword::Async)
                if self.check_kind_at(1, &TokenKind::Keyword(Keyword::Fn)) && self.peek_is_identifier(2) =>
            {
                self.advance();
                self.parse_function_decl(true)?
            }
            TokenKind::Keyword(Keyword::Class) => self.parse_class()?,
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::While) => self.parse_while()?,
            TokenKind::Keyword(Keyword::Loop) => {
                self.advance();
                AstNode::Loop(Box::new(self.parse_block()?))
            }
            TokenKind::Keyword(Keyword::For) => self.parse_for()?,
            TokenKind::Keyword(Keyword::Try) => self.parse_try()?,
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                if self.at_statement_end() {
                    AstNode::Return(None)
                } else {
                    AstNode::Return(Some(Box::new(self.parse_expression()?)))
                }
            }
            TokenKind::Keyword(Keyword::Yield) => {
                self.advance();
                AstNode::Yield(Box::new(self.parse_expression()?))
            }
            TokenKind::Keyword(Keyword::Print) => self.parse_print()?,
            TokenKind::Keyword(Keyword::Import) => {
                let tok = self.advance().clone();
                let module = self.expect_identifier("Expected module name after 'import'")?;
                AstNode::Import {
                    module,
                    pos: Pos::new(tok.line, tok.col),
                }
            }
            TokenKind::Keyword(Keyword::Halt) => {
                self.advance();
                AstNode::Halt
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                AstNode::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                AstNode::Continue
            }
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch()?,
            TokenKind::Delimiter(Delimiter::LBrace) if !self.looks_like_map_literal() => self.parse_block()?,
            _ => self.parse_expression()?,
        };
        self.match_delim(Delimiter::Semicolon); // optional terminator
        Ok(stmt)
    }

    fn parse_block(&mut self) -> Result<AstNode, SyntaxError> {
        Ok(AstNode::Block(self.parse_block_items()?))
    }

    fn parse_block_items(&mut self) -> Result<Vec<AstNode>, SyntaxError> {
        self.expect_delim(Delimiter::LBrace, "Expected '{' to start block")?;
        let mut stmts = Vec::new();
        while !self.check_delim(Delimiter::RBrace) && !self.is_at_end() {
            stmts.push(self.parse_statement()?);
        }
        self.expect_delim(Delimiter::RBrace, "Expected '}' after block")?;
        Ok(stmts)
    }

    fn parse_let(&mut self, constant: bool) -> Result<AstNode, SyntaxError> {
        let tok = self.advance().clone();
        let name = self.expect_identifier("Expected variable name")?;
        let value = if self.match_op(Operator::Assign) {
            Some(Box::new(self.parse_expression()?))
        } else if constant {
            return Err(self.err_here("Expected '=' after constant name"));
        } else {
            None
        };
        Ok(AstNode::Let {
            name,
            value,
            constant,
            pos: Pos::new(tok.line, tok.col),
        })
    }

    fn parse_params(&mut self) -> Result<Vec<String>, SyntaxError> {
        self.expect_delim(Delimiter::LParen, "Expected '(' before parameters")?;
        let mut params = Vec::new();
        if !self.check_delim(Delimiter::RParen) {
            loop {
                params.push(self.expect_identifier("Expected parameter name")?);
                if !self.match_delim(Delimiter::Comma) {
                    break;
                }
            }
        }
        self.expect_delim(Delimiter::RParen, "Expected ')' after parameters")?;
        Ok(params)
    }

    fn parse_function_def(&mut self, named: bool, is_async: bool) -> Result<FunctionDef, SyntaxError> {
        let fn_tok = self.expect_keyword(Keyword::Fn, "Expected 'fn'")?;
        let name = if named {
            Some(self.expect_identifier("Expected function name")?)
        } else {
            None
        };
        let params = self.parse_params()?;
        let body = FunctionBody::Block(self.parse_block_items()?);
        Ok(FunctionDef {
            name,
            params,
            body,
            is_async,
            pos: Pos::new(fn_tok.line, fn_tok.col),
        })
    }

    fn parse_function_decl(&mut self, is_async: bool) -> Result<AstNode, SyntaxError> {
        Ok(AstNode::FunctionDecl(Rc::new(self.parse_function_def(true, is_async)?)))
    }

    fn parse_class(&mut self) -> Result<AstNode, SyntaxError> {
        let tok = self.advance().clone();
        let name = self.expect_identifier("Expected class name")?;
        let parent = if self.match_keyword(Keyword::Extends) {
            Some(self.expect_identifier("Expected parent class name after 'extends'")?)
        } else {
            None
        };
        self.expect_delim(Delimiter::LBrace, "Expected '{' to start class body")?;
        let mut methods = Vec::new();
        while !self.check_delim(Delimiter::RBrace) && !self.is_at_end() {
            let is_async = self.match_keyword(Keyword::Async);
            methods.push(Rc::new(self.parse_function_def(true, is_async)?));
            self.match_delim(Delimiter::Semicolon);
        }
        self.expect_delim(Delimiter::RBrace, "Expected '}' after class body")?;
        Ok(AstNode::ClassDecl {
            name,
            parent,
            methods,
            pos: Pos::new(tok.line, tok.col),
        })
    }

    fn parse_if(&mut self) -> Result<AstNode, SyntaxError> {
        self.advance(); // 'if'
        let cond = self.parse_expression()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.match_keyword(Keyword::Else) {
            if self.check_kind(&TokenKind::Keyword(Keyword::If)) {
                Some(self.parse_if()?)
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(AstNode::new_if(cond, then_branch, else_branch))
    }

    fn parse_while(&mut self) -> Result<AstNode, SyntaxError> {
        self.advance(); // 'while'
        let cond = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(AstNode::new_while(cond, body))
    }

    fn parse_for(&mut self) -> Result<AstNode, SyntaxError> {
        self.advance(); // 'for'
        let parenthesized = self.check_delim(Delimiter::LParen)
            && self.peek_is_identifier(1)
            && self.check_kind_at(2, &TokenKind::Keyword(Keyword::In));
        if parenthesized {
            self.advance();
        }
        let var = self.expect_identifier("Expected loop variable after 'for'")?;
        self.expect_keyword(Keyword::In, "Expected 'in' after loop variable")?;
        let iterable = self.parse_expression()?;
        if parenthesized {
            self.expect_delim(Delimiter::RParen, "Expected ')' after for clause")?;
        }
        let body = self.parse_block()?;
        Ok(AstNode::ForEach {
            var,
            iterable: Box::new(iterable),
            body: Box::new(body),
        })
    }

    fn parse_try(&mut self) -> Result<AstNode, SyntaxError> {
        self.advance(); // 'try'
        let body = self.parse_block()?;
        self.expect_keyword(Keyword::Catch, "Expected 'catch' after try block")?;
        let catch_name = if self.match_delim(Delimiter::LParen) {
            let name = self.expect_identifier("Expected name in catch clause")?;
            self.expect_delim(Delimiter::RParen, "Expected ')' after catch name")?;
            Some(name)
        } else if let TokenKind::Identifier(name) = self.peek().kind.clone() {
            self.advance();
            Some(name)
        } else {
            None
        };
        let handler = self.parse_block()?;
        Ok(AstNode::Try {
            body: Box::new(body),
            catch_name,
            handler: Box::new(handler),
        })
    }

    fn parse_print(&mut self) -> Result<AstNode, SyntaxError> {
        self.advance(); // 'print'
        if self.check_delim(Delimiter::LParen) {
            self.advance();
            let args = self.parse_arguments()?;
            return Ok(AstNode::Print(args));
        }
        Ok(AstNode::Print(vec![self.parse_expression()?]))
    }

    fn parse_switch(&mut self) -> Result<AstNode, SyntaxError> {
        self.advance(); // 'switch'
        let subject = self.parse_expression()?;
        self.expect_delim(Delimiter::LBrace, "Expected '{' after switch subject")?;
        let mut cases = Vec::new();
        let mut default = None;
        while !self.check_delim(Delimiter::RBrace) && !self.is_at_end() {
            if self.match_keyword(Keyword::Case) {
                let value = self.parse_expression()?;
                self.match_delim(Delimiter::Colon);
                let body = self.parse_block_items()?;
                cases.push(SwitchCase { value, body });
            } else if self.match_keyword(Keyword::Default) {
                if default.is_some() {
                    return Err(self.err_here("Duplicate 'default' in switch"));
                }
                self.match_delim(Delimiter::Colon);
                default = Some(self.parse_block_items()?);
            } else {
                return Err(self.err_here("Expected 'case' or 'default' in switch"));
            }
        }
        self.expect_delim(Delimiter::RBrace, "Expected '}' after switch")?;
        Ok(AstNode::Switch {
            subject: Box::new(subject),
            cases,
            default,
        })
    }

    /* ── Precedence ───────────────────────────────────────── */
    pub fn parse_expression(&mut self) -> Result<AstNode, SyntaxError> {
        self.nested(Self::parse_assignment)
    }

    // assignment: lambda | target '=' assignment | climb(MIN)
    fn parse_assignment(&mut self) -> Result<AstNode, SyntaxError> {
        if let Some(lambda) = self.try_parse_arrow_lambda()? {
            return Ok(lambda);
        }
        let expr = self.parse_binary(MIN_INFIX_PRECEDENCE)?;
        if self.match_op(Operator::Assign) {
            let eq = self.previous().clone();
            let pos = Pos::new(eq.line, eq.col);
            return match expr {
                AstNode::Identifier { .. } | AstNode::Member { .. } | AstNode::Index { .. } => {
                    let value = self.parse_assignment()?;
                    Ok(AstNode::Assign {
                        target: Box::new(expr),
                        value: Box::new(value),
                        pos,
                    })
                }
                _ => Err(self.err_at("Invalid assignment target", eq.line, eq.col)),
            };
        }
        Ok(expr)
    }

    fn try_parse_arrow_lambda(&mut self) -> Result<Option<AstNode>, SyntaxError> {
        let start = self.peek().clone();
        let params = if self.peek_is_identifier(0) && self.check_kind_at(1, &TokenKind::Operator(Operator::Arrow)) {
            let name = self.expect_identifier("Expected parameter name")?;
            vec![name]
        } else if self.check_delim(Delimiter::LParen) && self.looks_like_lambda_params() {
            self.parse_params()?
        } else {
            return Ok(None);
        };
        self.expect_op(Operator::Arrow, "Expected '=>' in lambda")?;
        let body = if self.check_delim(Delimiter::LBrace) {
            FunctionBody::Block(self.parse_block_items()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assignment()?))
        };
        Ok(Some(AstNode::Lambda(Rc::new(FunctionDef {
            name: None,
            params,
            body,
            is_async: false,
            pos: Pos::new(start.line, start.col),
        }))))
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<AstNode, SyntaxError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Operator(op) if op.is_infix() && op.precedence() >= min_prec => op,
                _ => break,
            };
            let tok = self.advance().clone();
            let pos = Pos::new(tok.line, tok.col);
            // All infix operators here are left-associative.
            let right = self.parse_binary(op.precedence() + 1)?;
            left = match op {
                Operator::PipeForward => AstNode::new_call(right, vec![left], pos),
                Operator::AndAnd => AstNode::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Operator::OrOr => AstNode::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                _ => AstNode::new_binary(op, left, right, pos),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<AstNode, SyntaxError> {
        let tok = self.peek().clone();
        let pos = Pos::new(tok.line, tok.col);
        match tok.kind {
            TokenKind::Operator(Operator::Bang) => {
                self.advance();
                Ok(AstNode::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(self.nested(Self::parse_unary)?),
                    pos,
                })
            }
            TokenKind::Operator(Operator::Minus) => {
                self.advance();
                Ok(AstNode::Unary {
                    op: UnaryOp::Negate,
                    operand: Box::new(self.nested(Self::parse_unary)?),
                    pos,
                })
            }
            TokenKind::Keyword(Keyword::Await) => {
                self.advance();
                Ok(AstNode::Await(Box::new(self.nested(Self::parse_unary)?)))
            }
            _ => self.parse_postfix(),
        }
    }

    // postfix: primary ( '(' args ')' | '.' name | '[' expr ']' )*
    fn parse_postfix(&mut self) -> Result<AstNode, SyntaxError> {
        let mut expr = self.parse_primary()?;
        loop {
            let tok = self.peek().clone();
            let pos = Pos::new(tok.line, tok.col);
            if self.match_delim(Delimiter::LParen) {
                let args = self.parse_arguments()?;
                expr = AstNode::new_call(expr, args, pos);
            } else if self.match_op(Operator::Dot) {
                let name = self.expect_member_name()?;
                expr = AstNode::Member {
                    object: Box::new(expr),
                    name,
                    pos,
                };
            } else if self.match_delim(Delimiter::LBracket) {
                let index = self.parse_expression()?;
                self.expect_delim(Delimiter::RBracket, "Expected ']' after index")?;
                expr = AstNode::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    pos,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Arguments after an already-consumed '('.
    fn parse_arguments(&mut self) -> Result<Vec<AstNode>, SyntaxError> {
        let mut args = Vec::new();
        if !self.check_delim(Delimiter::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_delim(Delimiter::Comma) {
                    break;
                }
            }
        }
        self.expect_delim(Delimiter::RParen, "Expected ')' after arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<AstNode, SyntaxError> {
        let tok = self.peek().clone();
        let pos = Pos::new(tok.line, tok.col);
        match tok.kind {
            TokenKind::Number(v) => {
                self.advance();
                Ok(AstNode::Number(v))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(AstNode::Str(s))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(AstNode::Identifier { name, pos })
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(AstNode::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(AstNode::Bool(false))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(AstNode::Null)
            }
            TokenKind::Keyword(Keyword::This) => {
                self.advance();
                Ok(AstNode::This(pos))
            }
            TokenKind::Keyword(Keyword::Super) => {
                self.advance();
                self.expect_op(Operator::Dot, "Expected '.' after 'super'")?;
                let method = self.expect_member_name()?;
                Ok(AstNode::Super { method, pos })
            }
            TokenKind::Keyword(Keyword::Fn) => {
                Ok(AstNode::Lambda(Rc::new(self.parse_function_def(false, false)?)))
            }
            TokenKind::Keyword(Keyword::Async) if self.check_kind_at(1, &TokenKind::Keyword(Keyword::Fn)) => {
                self.advance();
                Ok(AstNode::Lambda(Rc::new(self.parse_function_def(false, true)?)))
            }
            TokenKind::Keyword(k) if Primitive::from_keyword(k).is_some() => {
                self.advance();
                self.parse_primitive(k, pos)
            }
            TokenKind::Delimiter(Delimiter::LParen) => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_delim(Delimiter::RParen, "Expected ')'")?;
                Ok(expr)
            }
            TokenKind::Delimiter(Delimiter::LBracket) => {
                self.advance();
                let mut items = Vec::new();
                if !self.check_delim(Delimiter::RBracket) {
                    loop {
                        items.push(self.parse_expression()?);
                        if !self.match_delim(Delimiter::Comma) {
                            break;
                        }
                    }
                }
                self.expect_delim(Delimiter::RBracket, "Expected ']' after array items")?;
                Ok(AstNode::Array(items))
            }
            TokenKind::Delimiter(Delimiter::LBrace) => self.parse_map_literal(),
            _ => Err(self.err_at(
                &format!("Unexpected token {}", tok.kind),
                tok.line,
                tok.col,
            )),
        }
    }

    fn parse_primitive(&mut self, k: Keyword, pos: Pos) -> Result<AstNode, SyntaxError> {
        let primitive = match Primitive::from_keyword(k) {
            Some(p) => p,
            None => return Err(self.err_at(&format!("'{}' is not a primitive", k.name()), pos.line, pos.col)),
        };
        self.expect_delim(Delimiter::LParen, &format!("Expected '(' after '{}'", k.name()))?;
        let args = self.parse_arguments()?;
        Ok(AstNode::Primitive { primitive, args, pos })
    }

    fn parse_map_literal(&mut self) -> Result<AstNode, SyntaxError> {
        self.expect_delim(Delimiter::LBrace, "Expected '{'")?;
        let mut pairs = Vec::new();
        if !self.check_delim(Delimiter::RBrace) {
            loop {
                let tok = self.advance().clone();
                let key = match tok.kind {
                    TokenKind::Identifier(name) => AstNode::Str(name),
                    TokenKind::String(s) => AstNode::Str(s),
                    TokenKind::Number(n) => AstNode::Number(n),
                    TokenKind::Keyword(k) => AstNode::Str(k.name().to_string()),
                    other => {
                        return Err(self.err_at(
                            &format!("Expected map key, found {}", other),
                            tok.line,
                            tok.col,
                        ))
                    }
                };
                self.expect_delim(Delimiter::Colon, "Expected ':' after map key")?;
                let value = self.parse_expression()?;
                pairs.push((key, value));
                if !self.match_delim(Delimiter::Comma) {
                    break;
                }
                if self.check_delim(Delimiter::RBrace) {
                    break; // trailing comma
                }
            }
        }
        self.expect_delim(Delimiter::RBrace, "Expected '}' after map literal")?;
        Ok(AstNode::Map(pairs))
    }

    /* ── Lookahead ───────────────────────────────────────── */
    fn looks_like_map_literal(&self) -> bool {
        let key = matches!(
            self.peek_at(1).kind,
            TokenKind::Identifier(_) | TokenKind::String(_) | TokenKind::Number(_)
        );
        key && self.check_kind_at(2, &TokenKind::Delimiter(Delimiter::Colon))
    }

    /// `( [name (, name)*] ) =>` starting at the current '('.
    fn looks_like_lambda_params(&self) -> bool {
        let mut i = 1;
        if self.check_kind_at(i, &TokenKind::Delimiter(Delimiter::RParen)) {
            return self.check_kind_at(i + 1, &TokenKind::Operator(Operator::Arrow));
        }
        loop {
            if !self.peek_is_identifier(i) {
                return false;
            }
            i += 1;
            match self.peek_at(i).kind {
                TokenKind::Delimiter(Delimiter::Comma) => i += 1,
                TokenKind::Delimiter(Delimiter::RParen) => {
                    return self.check_kind_at(i + 1, &TokenKind::Operator(Operator::Arrow))
                }
                _ => return false,
            }
        }
    }

    fn at_statement_end(&self) -> bool {
        self.is_at_end()
            || self.check_delim(Delimiter::RBrace)
            || self.check_delim(Delimiter::Semicolon)
    }

    /* ── Token utils ─────────────────────────────────────── */
    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn peek(&self) -> &Token {
        // Safe: there is always an EndOfInput at the end
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn peek_is_identifier(&self, n: usize) -> bool {
        matches!(self.peek_at(n).kind, TokenKind::Identifier(_))
    }

    fn check_kind(&self, kind: &TokenKind) -> bool {
        !self.is_at_end() && &self.peek().kind == kind
    }

    fn check_kind_at(&self, n: usize, kind: &TokenKind) -> bool {
        &self.peek_at(n).kind == kind
    }

    fn check_delim(&self, d: Delimiter) -> bool {
        self.check_kind(&TokenKind::Delimiter(d))
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check_kind(&kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_delim(&mut self, d: Delimiter) -> bool {
        self.match_kind(TokenKind::Delimiter(d))
    }

    fn match_op(&mut self, o: Operator) -> bool {
        self.match_kind(TokenKind::Operator(o))
    }

    fn match_keyword(&mut self, k: Keyword) -> bool {
        self.match_kind(TokenKind::Keyword(k))
    }

    fn expect(&mut self, kind: TokenKind, msg: &str) -> Result<Token, SyntaxError> {
        if self.check_kind(&kind) {
            Ok(self.advance().clone())
        } else {
            Err(self.err_here(msg))
        }
    }

    fn expect_delim(&mut self, d: Delimiter, msg: &str) -> Result<Token, SyntaxError> {
        self.expect(TokenKind::Delimiter(d), msg)
    }

    fn expect_op(&mut self, o: Operator, msg: &str) -> Result<Token, SyntaxError> {
        self.expect(TokenKind::Operator(o), msg)
    }

    fn expect_keyword(&mut self, k: Keyword, msg: &str) -> Result<Token, SyntaxError> {
        self.expect(TokenKind::Keyword(k), msg)
    }

    fn expect_identifier(&mut self, msg: &str) -> Result<String, SyntaxError> {
        if let TokenKind::Identifier(name) = self.peek().kind.clone() {
            self.advance();
            Ok(name)
        } else {
            Err(self.err_here(msg))
        }
    }

    /// Member names may reuse keyword spellings (`obj.print`).
    fn expect_member_name(&mut self) -> Result<String, SyntaxError> {
        match self.peek().kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            TokenKind::Keyword(k) => {
                self.advance();
                Ok(k.name().to_string())
            }
            _ => Err(self.err_here("Expected member name after '.'")),
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::EndOfInput)
    }

    fn err_here(&self, msg: &str) -> SyntaxError {
        let tok = self.peek();
        SyntaxError {
            message: format!("{msg}, found {}", tok.kind),
            line: tok.line,
            col: tok.col,
        }
    }

    fn err_at(&self, msg: &str, line: usize, col: usize) -> SyntaxError {
        SyntaxError {
            message: msg.into(),
            line,
            col,
        }
    }
}
