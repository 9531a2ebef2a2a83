//=============================================
// guardscript/parser.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: GuardScript recursive descent parser implementation
// Objective: Transform token streams into AST nodes consumed by the rewriter
//=============================================

use std::rc::Rc;

use crate::ast::{
    AssignOp, BinaryOp, DeclKind, Declarator, Expr, FuncDef, FuncKind, LogicalOp, ObjectProp,
    Program, Stmt, SwitchCase, UnaryOp, UpdateOp,
};
use crate::tokenizer::{Position, Token, TokenKind};

/// Parser error types
#[derive(Debug, Clone)]
pub enum ParseError {
    UnexpectedToken {
        expected: String,
        found: TokenKind,
        position: Position,
    },
    InvalidSyntax {
        message: String,
        position: Position,
    },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::UnexpectedToken { position, .. }
            | ParseError::InvalidSyntax { position, .. } => *position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::UnexpectedToken {
                expected,
                found,
                position,
            } => write!(
                f,
                "Expected {} but found {} at line {}, column {}",
                expected, found, position.line, position.column
            ),
            ParseError::InvalidSyntax { message, position } => write!(
                f,
                "Invalid syntax: {} at line {}, column {}",
                message, position.line, position.column
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// Recursive descent parser for the GuardScript source language.
///
/// The grammar is wider than the dialect: forbidden constructs (`var`,
/// `throw`, loose equality, postfix updates, ...) parse successfully and are
/// rejected later by the rewriter, so students see a dialect diagnostic with
/// a line number rather than a syntax error.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while !self.is_at_end() {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    //=============================================
    // Statements
    //=============================================

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match &self.peek().kind {
            TokenKind::Var => self.parse_var_decl(DeclKind::Var),
            TokenKind::Let => self.parse_var_decl(DeclKind::Let),
            TokenKind::Const => self.parse_var_decl(DeclKind::Const),
            TokenKind::Function => self.parse_function_decl(),
            TokenKind::Class => self.parse_class_decl(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => {
                let line = self.line();
                self.advance();
                self.consume_semicolon();
                Ok(Stmt::Break { line })
            }
            TokenKind::Continue => {
                let line = self.line();
                self.advance();
                self.consume_semicolon();
                Ok(Stmt::Continue { line })
            }
            TokenKind::Throw => {
                let line = self.line();
                self.advance();
                let value = self.parse_expression()?;
                self.consume_semicolon();
                Ok(Stmt::Throw { value, line })
            }
            TokenKind::Try => self.parse_try(),
            TokenKind::With => self.parse_with(),
            TokenKind::LeftBrace => self.parse_block(),
            TokenKind::Semicolon => {
                let line = self.line();
                self.advance();
                Ok(Stmt::Empty { line })
            }
            _ => {
                let line = self.line();
                let expr = self.parse_expression()?;
                self.consume_semicolon();
                Ok(Stmt::Expr { expr, line })
            }
        }
    }

    fn parse_var_decl(&mut self, kind: DeclKind) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        let mut decls = Vec::new();
        loop {
            let decl_line = self.line();
            let (name, pattern) = match &self.peek().kind {
                TokenKind::Identifier(name) => {
                    let name = name.clone();
                    self.advance();
                    (name, false)
                }
                TokenKind::LeftBracket | TokenKind::LeftBrace => {
                    self.skip_pattern()?;
                    (String::from("<pattern>"), true)
                }
                _ => {
                    return Err(self.unexpected("a variable name"));
                }
            };
            let init = if self.matches(&TokenKind::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            decls.push(Declarator {
                name,
                init,
                pattern,
                line: decl_line,
            });
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.consume_semicolon();
        Ok(Stmt::VarDecl { kind, decls, line })
    }

    /// Consume a destructuring pattern without building a node for it; the
    /// rewriter rejects the declaration outright.
    fn skip_pattern(&mut self) -> Result<(), ParseError> {
        let (open, close) = match self.peek().kind {
            TokenKind::LeftBracket => (TokenKind::LeftBracket, TokenKind::RightBracket),
            _ => (TokenKind::LeftBrace, TokenKind::RightBrace),
        };
        let mut depth = 0usize;
        loop {
            if self.is_at_end() {
                return Err(self.unexpected("the end of a destructuring pattern"));
            }
            let kind = self.peek().kind.clone();
            self.advance();
            if kind == open {
                depth += 1;
            } else if kind == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
    }

    fn parse_function_decl(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        let name = self.expect_identifier("a function name")?;
        let (params, has_rest) = self.parse_params()?;
        let body = self.parse_function_body()?;
        Ok(Stmt::FuncDecl {
            def: Rc::new(FuncDef {
                name: Some(name),
                params,
                has_rest,
                body,
                kind: FuncKind::Ordinary,
                arity_checked: false,
                line,
            }),
            line,
        })
    }

    fn parse_class_decl(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        let name = self.expect_identifier("a class name")?;
        self.expect(&TokenKind::LeftBrace, "'{'")?;
        let mut ctor = None;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            if self.matches(&TokenKind::Semicolon) {
                continue;
            }
            let member_line = self.line();
            let member_name = self.expect_identifier("a method name")?;
            let (params, has_rest) = self.parse_params()?;
            let body = self.parse_function_body()?;
            let kind = if member_name == "constructor" {
                FuncKind::Constructor
            } else {
                FuncKind::Method
            };
            let def = Rc::new(FuncDef {
                name: Some(format!("{}.{}", name, member_name)),
                params,
                has_rest,
                body,
                kind,
                arity_checked: false,
                line: member_line,
            });
            if kind == FuncKind::Constructor {
                ctor = Some(def);
            } else {
                methods.push((member_name, def));
            }
        }
        self.expect(&TokenKind::RightBrace, "'}'")?;
        Ok(Stmt::ClassDecl {
            name,
            ctor,
            methods,
            line,
        })
    }

    fn parse_params(&mut self) -> Result<(Vec<String>, bool), ParseError> {
        self.expect(&TokenKind::LeftParen, "'('")?;
        let mut params = Vec::new();
        let mut has_rest = false;
        while !self.check(&TokenKind::RightParen) {
            if self.matches(&TokenKind::Ellipsis) {
                has_rest = true;
            }
            params.push(self.expect_identifier("a parameter name")?);
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen, "')'")?;
        Ok((params, has_rest))
    }

    fn parse_function_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&TokenKind::LeftBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            body.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RightBrace, "'}'")?;
        Ok(body)
    }

    fn parse_block(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        let body = self.parse_function_body()?;
        Ok(Stmt::Block { body, line })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        self.expect(&TokenKind::LeftParen, "'('")?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen, "')'")?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.matches(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
            line,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        self.expect(&TokenKind::LeftParen, "'('")?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen, "')'")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { test, body, line })
    }

    fn parse_do_while(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        let body = Box::new(self.parse_statement()?);
        self.expect(&TokenKind::While, "'while'")?;
        self.expect(&TokenKind::LeftParen, "'('")?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen, "')'")?;
        self.consume_semicolon();
        Ok(Stmt::DoWhile { body, test, line })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        self.expect(&TokenKind::LeftParen, "'('")?;

        if self.looks_like_for_in_of() {
            let of = self.skip_for_in_of_header()?;
            // The body still has to parse so later statements keep their
            // positions, but the rewriter rejects the whole loop.
            let _body = self.parse_statement()?;
            return Ok(Stmt::ForInOf { of, line });
        }

        let init = if self.check(&TokenKind::Semicolon) {
            self.advance();
            None
        } else if matches!(
            self.peek().kind,
            TokenKind::Let | TokenKind::Const | TokenKind::Var
        ) {
            let kind = match self.peek().kind {
                TokenKind::Let => DeclKind::Let,
                TokenKind::Const => DeclKind::Const,
                _ => DeclKind::Var,
            };
            Some(Box::new(self.parse_var_decl(kind)?))
        } else {
            let init_line = self.line();
            let expr = self.parse_expression()?;
            self.consume_semicolon();
            Some(Box::new(Stmt::Expr {
                expr,
                line: init_line,
            }))
        };

        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon, "';'")?;

        let update = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RightParen, "')'")?;

        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
            line,
        })
    }

    /// `for (let x in o)`, `for (x of o)` and friends. Checked right after
    /// the opening parenthesis.
    fn looks_like_for_in_of(&self) -> bool {
        let mut offset = 0;
        if matches!(
            self.peek_kind(offset),
            Some(TokenKind::Let | TokenKind::Const | TokenKind::Var)
        ) {
            offset += 1;
        }
        if !matches!(self.peek_kind(offset), Some(TokenKind::Identifier(_))) {
            return false;
        }
        offset += 1;
        match self.peek_kind(offset) {
            Some(TokenKind::In) => true,
            Some(TokenKind::Identifier(name)) => name == "of",
            _ => false,
        }
    }

    fn skip_for_in_of_header(&mut self) -> Result<bool, ParseError> {
        let mut of = false;
        let mut depth = 1usize;
        while depth > 0 {
            if self.is_at_end() {
                return Err(self.unexpected("')'"));
            }
            match &self.peek().kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => depth -= 1,
                TokenKind::Identifier(name) if name == "of" => of = true,
                _ => {}
            }
            self.advance();
        }
        Ok(of)
    }

    fn parse_switch(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        self.expect(&TokenKind::LeftParen, "'('")?;
        let disc = self.parse_expression()?;
        self.expect(&TokenKind::RightParen, "')'")?;
        self.expect(&TokenKind::LeftBrace, "'{'")?;
        let mut cases = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let case_line = self.line();
            let test = if self.matches(&TokenKind::Case) {
                let test = self.parse_expression()?;
                Some(test)
            } else if self.matches(&TokenKind::Default) {
                None
            } else {
                return Err(self.unexpected("'case' or 'default'"));
            };
            self.expect(&TokenKind::Colon, "':'")?;
            let mut body = Vec::new();
            while !matches!(
                self.peek().kind,
                TokenKind::Case | TokenKind::Default | TokenKind::RightBrace
            ) && !self.is_at_end()
            {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase {
                test,
                body,
                line: case_line,
            });
        }
        self.expect(&TokenKind::RightBrace, "'}'")?;
        Ok(Stmt::Switch { disc, cases, line })
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        let value = if self.check(&TokenKind::Semicolon)
            || self.check(&TokenKind::RightBrace)
            || self.is_at_end()
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_semicolon();
        Ok(Stmt::Return { value, line })
    }

    fn parse_try(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        let block = Box::new(self.parse_block()?);
        let handler = if self.matches(&TokenKind::Catch) {
            if self.matches(&TokenKind::LeftParen) {
                self.expect_identifier("an exception name")?;
                self.expect(&TokenKind::RightParen, "')'")?;
            }
            Some(Box::new(self.parse_block()?))
        } else {
            None
        };
        let finalizer = if self.matches(&TokenKind::Finally) {
            Some(Box::new(self.parse_block()?))
        } else {
            None
        };
        Ok(Stmt::Try {
            block,
            handler,
            finalizer,
            line,
        })
    }

    fn parse_with(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.advance();
        self.expect(&TokenKind::LeftParen, "'('")?;
        let _scope = self.parse_expression()?;
        self.expect(&TokenKind::RightParen, "')'")?;
        let _body = self.parse_statement()?;
        Ok(Stmt::With { line })
    }

    //=============================================
    // Expressions, by precedence
    //=============================================

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.parse_conditional()?;
        let op = match self.peek().kind {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            TokenKind::PercentAssign => AssignOp::Mod,
            TokenKind::AmpAssign => AssignOp::BitAnd,
            TokenKind::PipeAssign => AssignOp::BitOr,
            TokenKind::CaretAssign => AssignOp::BitXor,
            TokenKind::ShlAssign => AssignOp::Shl,
            TokenKind::ShrAssign => AssignOp::Shr,
            TokenKind::UShrAssign => AssignOp::UShr,
            _ => return Ok(target),
        };
        let line = self.line();
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
            line,
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let test = self.parse_logical_or()?;
        if self.check(&TokenKind::Question) {
            let line = self.line();
            self.advance();
            let consequent = self.parse_assignment()?;
            self.expect(&TokenKind::Colon, "':'")?;
            let alternate = self.parse_assignment()?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
                line,
            });
        }
        Ok(test)
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_logical_and()?;
        while self.check(&TokenKind::OrOr) {
            let line = self.line();
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                line,
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_bit_or()?;
        while self.check(&TokenKind::AndAnd) {
            let line = self.line();
            self.advance();
            let right = self.parse_bit_or()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
                line,
            };
        }
        Ok(left)
    }

    fn parse_bit_or(&mut self) -> Result<Expr, ParseError> {
        self.parse_left_assoc(&[(TokenKind::Pipe, BinaryOp::BitOr)], Self::parse_bit_xor)
    }

    fn parse_bit_xor(&mut self) -> Result<Expr, ParseError> {
        self.parse_left_assoc(&[(TokenKind::Caret, BinaryOp::BitXor)], Self::parse_bit_and)
    }

    fn parse_bit_and(&mut self) -> Result<Expr, ParseError> {
        self.parse_left_assoc(&[(TokenKind::Amp, BinaryOp::BitAnd)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        self.parse_left_assoc(
            &[
                (TokenKind::EqEqEq, BinaryOp::StrictEq),
                (TokenKind::NotEqEq, BinaryOp::StrictNeq),
                (TokenKind::EqEq, BinaryOp::LooseEq),
                (TokenKind::NotEq, BinaryOp::LooseNeq),
            ],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        self.parse_left_assoc(
            &[
                (TokenKind::Less, BinaryOp::Less),
                (TokenKind::LessEq, BinaryOp::LessEq),
                (TokenKind::Greater, BinaryOp::Greater),
                (TokenKind::GreaterEq, BinaryOp::GreaterEq),
                (TokenKind::In, BinaryOp::In),
                (TokenKind::InstanceOf, BinaryOp::InstanceOf),
            ],
            Self::parse_shift,
        )
    }

    fn parse_shift(&mut self) -> Result<Expr, ParseError> {
        self.parse_left_assoc(
            &[
                (TokenKind::Shl, BinaryOp::Shl),
                (TokenKind::Shr, BinaryOp::Shr),
                (TokenKind::UShr, BinaryOp::UShr),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        self.parse_left_assoc(
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
            ],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.parse_left_assoc(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    fn parse_left_assoc(
        &mut self,
        table: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in table {
                if self.check(token) {
                    let line = self.line();
                    self.advance();
                    let right = next(self)?;
                    left = Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                        line,
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::TypeOf => Some(UnaryOp::TypeOf),
            TokenKind::Delete => Some(UnaryOp::Delete),
            TokenKind::Void => Some(UnaryOp::Void),
            _ => None,
        };
        if let Some(op) = op {
            let line = self.line();
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                line,
            });
        }
        if matches!(self.peek().kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let op = if self.peek().kind == TokenKind::PlusPlus {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            let line = self.line();
            self.advance();
            let target = self.parse_unary()?;
            return Ok(Expr::Update {
                op,
                prefix: true,
                target: Box::new(target),
                line,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_call_member()?;
        if matches!(self.peek().kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let op = if self.peek().kind == TokenKind::PlusPlus {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            let line = self.line();
            self.advance();
            return Ok(Expr::Update {
                op,
                prefix: false,
                target: Box::new(expr),
                line,
            });
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> Result<Expr, ParseError> {
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    let line = self.line();
                    self.advance();
                    let property = self.expect_identifier("a member name")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        line,
                    };
                }
                TokenKind::LeftBracket => {
                    let line = self.line();
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RightBracket, "']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        line,
                    };
                }
                TokenKind::LeftParen => {
                    let line = self.line();
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        line,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_new(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        self.advance();
        let mut callee = self.parse_primary()?;
        while self.check(&TokenKind::Dot) {
            let member_line = self.line();
            self.advance();
            let property = self.expect_identifier("a member name")?;
            callee = Expr::Member {
                object: Box::new(callee),
                property,
                line: member_line,
            };
        }
        let args = if self.check(&TokenKind::LeftParen) {
            self.parse_args()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
            line,
        })
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(&TokenKind::LeftParen, "'('")?;
        let mut args = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            args.push(self.parse_assignment()?);
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        match self.peek().kind.clone() {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::Number { value, line })
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expr::Str { value, line })
            }
            TokenKind::Boolean(value) => {
                self.advance();
                Ok(Expr::Bool { value, line })
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Null { line })
            }
            TokenKind::This => {
                self.advance();
                Ok(Expr::This { line })
            }
            TokenKind::Identifier(name) => {
                if matches!(self.peek_kind(1), Some(TokenKind::Arrow)) {
                    return self.parse_arrow(vec![name], false, line);
                }
                self.advance();
                Ok(Expr::Ident { name, line })
            }
            TokenKind::Function => {
                self.advance();
                let name = match &self.peek().kind {
                    TokenKind::Identifier(name) => {
                        let name = name.clone();
                        self.advance();
                        Some(name)
                    }
                    _ => None,
                };
                let (params, has_rest) = self.parse_params()?;
                let body = self.parse_function_body()?;
                Ok(Expr::Function {
                    def: Rc::new(FuncDef {
                        name,
                        params,
                        has_rest,
                        body,
                        kind: FuncKind::Ordinary,
                        arity_checked: false,
                        line,
                    }),
                    line,
                })
            }
            TokenKind::LeftParen => {
                if self.looks_like_arrow_params() {
                    let (params, has_rest) = self.parse_params()?;
                    return self.parse_arrow(params, has_rest, line);
                }
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(&TokenKind::RightBracket) {
                    elements.push(self.parse_assignment()?);
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RightBracket, "']'")?;
                Ok(Expr::ArrayLit { elements, line })
            }
            TokenKind::LeftBrace => self.parse_object_literal(line),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_object_literal(&mut self, line: u32) -> Result<Expr, ParseError> {
        self.advance();
        let mut props = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let prop_line = self.line();
            let (key, key_is_ident) = match self.peek().kind.clone() {
                TokenKind::Identifier(name) => {
                    self.advance();
                    (name, true)
                }
                TokenKind::String(text) => {
                    self.advance();
                    (text, false)
                }
                TokenKind::Number(value) => {
                    self.advance();
                    (crate::interpreter::value::format_number(value), false)
                }
                _ => return Err(self.unexpected("an object member name")),
            };
            self.expect(&TokenKind::Colon, "':'")?;
            let value = self.parse_assignment()?;
            props.push(ObjectProp {
                key,
                key_is_ident,
                value,
                line: prop_line,
            });
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace, "'}'")?;
        Ok(Expr::ObjectLit { props, line })
    }

    /// Lookahead for `(a, b) =>`: scan to the matching `)` and peek one
    /// token beyond it.
    fn looks_like_arrow_params(&self) -> bool {
        let mut offset = 1;
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek_kind(offset) {
                Some(TokenKind::LeftParen) => depth += 1,
                Some(TokenKind::RightParen) => depth -= 1,
                Some(TokenKind::Eof) | None => return false,
                _ => {}
            }
            offset += 1;
        }
        matches!(self.peek_kind(offset), Some(TokenKind::Arrow))
    }

    fn parse_arrow(
        &mut self,
        params: Vec<String>,
        has_rest: bool,
        line: u32,
    ) -> Result<Expr, ParseError> {
        if params.len() == 1 && !has_rest && matches!(self.peek().kind, TokenKind::Identifier(_)) {
            // Single-identifier arrow: the parameter token is still pending.
            self.advance();
        }
        self.expect(&TokenKind::Arrow, "'=>'")?;
        let body = if self.check(&TokenKind::LeftBrace) {
            self.parse_function_body()?
        } else {
            let value_line = self.line();
            let value = self.parse_assignment()?;
            vec![Stmt::Return {
                value: Some(value),
                line: value_line,
            }]
        };
        Ok(Expr::Function {
            def: Rc::new(FuncDef {
                name: None,
                params,
                has_rest,
                body,
                kind: FuncKind::Arrow,
                arity_checked: false,
                line,
            }),
            line,
        })
    }

    //=============================================
    // Token plumbing
    //=============================================

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.current + offset).map(|t| &t.kind)
    }

    fn line(&self) -> u32 {
        self.peek().position.line
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<(), ParseError> {
        if self.matches(kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<String, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn consume_semicolon(&mut self) {
        // Semicolons are optional before '}' and at the end of input, which
        // keeps short IDE snippets like `let o = {x: 1}; o.x` parseable.
        self.matches(&TokenKind::Semicolon);
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.peek().kind.clone(),
            position: self.peek().position,
        }
    }
}

/// Tokenize and parse a source text in one step.
pub fn parse_source(source: &str) -> Result<Program, ParseError> {
    let tokens = crate::tokenizer::Tokenizer::new(source)
        .tokenize()
        .map_err(|err| ParseError::InvalidSyntax {
            message: err.message,
            position: err.position,
        })?;
    Parser::new(tokens).parse()
}

//=============================================
// End of file
//=============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Stmt};

    fn parse(source: &str) -> Program {
        parse_source(source).expect("parse")
    }

    #[test]
    fn parses_declarations_and_member_chains() {
        let program = parse("let o = {x: 500}; o.y");
        assert_eq!(program.body.len(), 2);
        match &program.body[1] {
            Stmt::Expr {
                expr: Expr::Member { property, line, .. },
                ..
            } => {
                assert_eq!(property, "y");
                assert_eq!(*line, 1);
            }
            other => panic!("expected member expression, got {other:?}"),
        }
    }

    #[test]
    fn parses_arrow_functions_both_forms() {
        let program = parse("let f = (a, b) => a + b; let g = x => { return x; };");
        assert_eq!(program.body.len(), 2);
        for stmt in &program.body {
            let Stmt::VarDecl { decls, .. } = stmt else {
                panic!("expected declaration");
            };
            let Some(Expr::Function { def, .. }) = &decls[0].init else {
                panic!("expected function initializer");
            };
            assert_eq!(def.kind, crate::ast::FuncKind::Arrow);
        }
    }

    #[test]
    fn parses_for_in_as_rejected_marker() {
        let program = parse("for (let k in o) { k; }");
        assert!(matches!(program.body[0], Stmt::ForInOf { of: false, .. }));
        let program = parse("for (let v of a) { v; }");
        assert!(matches!(program.body[0], Stmt::ForInOf { of: true, .. }));
    }

    #[test]
    fn parses_class_with_constructor_and_methods() {
        let program = parse(
            "class Point { constructor(x, y) { this.x = x; this.y = y; } norm() { return 0; } }",
        );
        let Stmt::ClassDecl {
            name, ctor, methods, ..
        } = &program.body[0]
        else {
            panic!("expected class");
        };
        assert_eq!(name, "Point");
        assert!(ctor.is_some());
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].0, "norm");
    }

    #[test]
    fn keeps_postfix_updates_for_the_rewriter() {
        let program = parse("x++;");
        let Stmt::Expr {
            expr: Expr::Update { prefix, .. },
            ..
        } = &program.body[0]
        else {
            panic!("expected update expression");
        };
        assert!(!prefix);
    }

    #[test]
    fn reports_position_for_syntax_errors() {
        let err = parse_source("let x = ;").expect_err("should fail");
        assert_eq!(err.position().line, 1);
    }
}
