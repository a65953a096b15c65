//! The parser: recursive descent for statements, precedence climbing for
//! expressions, producing untyped [`ast`](super::ast) nodes for
//! [`sem::check`](super::sem::check) to annotate.

use crate::common::{Id, Span};
use crate::error::Result;
use crate::middle::ir::MachineType;

use super::ast::{BOp, Block, Expr, Program, Stmt};
use super::lex::{Lexer, Token, TokenKind};

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("line {line}: expected {expected}, found {found}")]
    Unexpected {
        line: u32,
        expected: String,
        found: String,
        span: Span,
    },
}

struct Parser<'src> {
    lexer: Lexer<'src>,
}

impl<'src> Parser<'src> {
    fn peek(&mut self) -> Result<Token<'src>> {
        Ok(self.lexer.peek()?)
    }

    fn next(&mut self) -> Result<Token<'src>> {
        Ok(self.lexer.next()?)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>> {
        let tok = self.next()?;
        if tok.kind != kind {
            return Err(ParseError::Unexpected {
                line: tok.span.line,
                expected: kind.to_string(),
                found: tok.kind.to_string(),
                span: tok.span,
            }
            .into());
        }
        Ok(tok)
    }

    fn at(&mut self, kind: TokenKind) -> Result<bool> {
        Ok(self.peek()?.kind == kind)
    }

    fn parse_type(&mut self) -> Result<MachineType> {
        let tok = self.next()?;
        let ty = match tok.kind {
            TokenKind::TyI8 => MachineType::I8,
            TokenKind::TyI16 => MachineType::I16,
            TokenKind::TyI32 => MachineType::I32,
            TokenKind::TyI64 => MachineType::I64,
            _ => {
                return Err(ParseError::Unexpected {
                    line: tok.span.line,
                    expected: "a type (i8, i16, i32, or i64)".into(),
                    found: tok.kind.to_string(),
                    span: tok.span,
                }
                .into())
            }
        };
        Ok(ty)
    }

    fn parse_program(&mut self) -> Result<Program> {
        let body = self.parse_block()?;
        self.expect(TokenKind::Eof)?;
        Ok(Program { body })
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = vec![];
        while !self.at(TokenKind::RBrace)? {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Block { stmts })
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let tok = self.peek()?;
        match tok.kind {
            TokenKind::LBrace => {
                let block = self.parse_block()?;
                Ok(Stmt::Block {
                    span: tok.span,
                    block,
                })
            }

            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwReturn => self.parse_return(),

            TokenKind::Id => {
                // Either `name : type = expr ;` (declaration) or
                // `name = expr ;` (assignment) — disambiguate on the token
                // that follows the identifier.
                let name_tok = self.next()?;
                let name: Id = Id::new(name_tok.text.to_string());

                if self.at(TokenKind::Colon)? {
                    self.expect(TokenKind::Colon)?;
                    let ty = self.parse_type()?;
                    self.expect(TokenKind::Assign)?;
                    let init = self.parse_expr()?;
                    let end = self.expect(TokenKind::Semi)?;
                    Ok(Stmt::VarDecl {
                        span: name_tok.span.join(end.span),
                        name,
                        ty,
                        init,
                        sym: None,
                    })
                } else {
                    self.expect(TokenKind::Assign)?;
                    let value = self.parse_expr()?;
                    let end = self.expect(TokenKind::Semi)?;
                    Ok(Stmt::Assign {
                        span: name_tok.span.join(end.span),
                        name,
                        value,
                        sym: None,
                    })
                }
            }

            _ => Err(ParseError::Unexpected {
                line: tok.span.line,
                expected: "a statement".into(),
                found: tok.kind.to_string(),
                span: tok.span,
            }
            .into()),
        }
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let start = self.expect(TokenKind::KwIf)?;
        let cond = self.parse_expr()?;
        let then_blk = self.parse_block()?;

        let else_blk = if self.at(TokenKind::KwElse)? {
            self.expect(TokenKind::KwElse)?;
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Stmt::If {
            span: start.span,
            cond,
            then_blk,
            else_blk,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        let start = self.expect(TokenKind::KwWhile)?;
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::While {
            span: start.span,
            cond,
            body,
        })
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        let start = self.expect(TokenKind::KwReturn)?;
        let value = self.parse_expr()?;
        let end = self.expect(TokenKind::Semi)?;
        Ok(Stmt::Return {
            span: start.span.join(end.span),
            value,
        })
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_bin(0)
    }

    fn bin_prec(kind: TokenKind) -> u8 {
        match kind {
            TokenKind::Star | TokenKind::Slash => 20,
            TokenKind::Plus | TokenKind::Minus => 10,
            TokenKind::Lt | TokenKind::Le | TokenKind::Ne | TokenKind::EqEq => 5,
            _ => 0,
        }
    }

    fn bin_op(kind: TokenKind) -> BOp {
        match kind {
            TokenKind::Star => BOp::Mul,
            TokenKind::Slash => BOp::Div,
            TokenKind::Plus => BOp::Add,
            TokenKind::Minus => BOp::Sub,
            TokenKind::Lt => BOp::Lt,
            TokenKind::Le => BOp::Le,
            TokenKind::Ne => BOp::Ne,
            TokenKind::EqEq => BOp::Eq,
            _ => unreachable!("internal error: not a binary operator token"),
        }
    }

    fn parse_bin(&mut self, caller_prec: u8) -> Result<Expr> {
        let mut lhs = self.parse_primary()?;

        loop {
            let op_tok = self.peek()?;
            let prec = Self::bin_prec(op_tok.kind);
            if prec <= caller_prec {
                break;
            }
            self.next()?;

            let rhs = self.parse_bin(prec)?;
            let span = lhs.span().join(rhs.span());
            lhs = Expr::BinOp {
                op: Self::bin_op(op_tok.kind),
                span,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                ty: None,
            };
        }

        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Num => {
                let value: u64 = tok
                    .text
                    .parse()
                    .expect("internal error: lexer produced a non-decimal Num token");
                Ok(Expr::Int {
                    value,
                    ty: None,
                    span: tok.span,
                })
            }

            TokenKind::Id => Ok(Expr::Var {
                name: Id::new(tok.text.to_string()),
                ty: None,
                sym: None,
                span: tok.span,
            }),

            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }

            _ => Err(ParseError::Unexpected {
                line: tok.span.line,
                expected: "an expression".into(),
                found: tok.kind.to_string(),
                span: tok.span,
            }
            .into()),
        }
    }
}

/// Parse a whole program (a single top-level block) from source text.
#[tracing::instrument(level = "debug", skip(src), fields(bytes = src.len()))]
pub fn parse(src: &str) -> Result<Program> {
    let mut p = Parser {
        lexer: Lexer::new(src),
    };
    p.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_straight_line_program() {
        let program = parse("{ x : i32 = 1 + 2 * 3; return x; }").unwrap();
        assert_eq!(program.body.stmts.len(), 2);
        assert!(matches!(program.body.stmts[0], Stmt::VarDecl { .. }));
        assert!(matches!(program.body.stmts[1], Stmt::Return { .. }));
    }

    #[test]
    fn parses_if_else_without_parens() {
        let program = parse("{ x : i32 = 0; if 1 { x = 10; } else { x = 20; } return x; }").unwrap();
        assert!(matches!(program.body.stmts[1], Stmt::If { .. }));
    }

    #[test]
    fn parses_while_loop() {
        let program = parse(
            "{ i : i32 = 0; s : i32 = 0; while i < 10 { s = s + i; i = i + 1; } return s; }",
        )
        .unwrap();
        assert!(matches!(program.body.stmts[2], Stmt::While { .. }));
    }

    #[test]
    fn parses_nested_shadowing_block() {
        let program = parse("{ x : i32 = 1; { x : i32 = 2; return x; } }").unwrap();
        assert!(matches!(program.body.stmts[1], Stmt::Block { .. }));
    }

    #[test]
    fn respects_mul_over_add_precedence() {
        let program = parse("{ return 1 + 2 * 3; }").unwrap();
        let Stmt::Return { value, .. } = &program.body.stmts[0] else {
            panic!("expected a return statement");
        };
        let Expr::BinOp { op, rhs, .. } = value else {
            panic!("expected a top-level binop");
        };
        assert_eq!(*op, BOp::Add);
        assert!(matches!(**rhs, Expr::BinOp { op: BOp::Mul, .. }));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("{ x : i32 = ; }").is_err());
    }
}
