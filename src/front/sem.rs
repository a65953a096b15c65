//! The semantic analyzer: scope resolution, type checking/promotion, cast
//! insertion, and constant folding.
//!
//! Scopes form a stack of per-block tables, searched innermost-first,
//! falling back to enclosing blocks. Redefinition checks only look at the
//! *current* block's table, so an inner block can shadow an outer
//! declaration of the same name — nested blocks exist precisely to make
//! that legal.

use std::collections::HashMap;

use crate::common::{Id, Span, SymbolId};
use crate::middle::ir::MachineType;

use super::ast::{BOp, Block, Expr, Program, Stmt};

const DEFAULT_TYPE: MachineType = MachineType::I32;

#[derive(thiserror::Error, Debug)]
pub enum SemError {
    #[error("line {}: undefined symbol `{name}`", span.line)]
    UndefinedSymbol { name: Id, span: Span },
    #[error("line {}: `{name}` is already declared in this scope", span.line)]
    Redefinition { name: Id, span: Span },
    #[error("line {}: division by zero in a constant expression", span.line)]
    ConstantDivisionByZero { span: Span },
}

impl SemError {
    pub fn span(&self) -> Span {
        match self {
            SemError::UndefinedSymbol { span, .. }
            | SemError::Redefinition { span, .. }
            | SemError::ConstantDivisionByZero { span } => *span,
        }
    }
}

type Result<T> = std::result::Result<T, SemError>;

struct Scope {
    table: HashMap<Id, SymbolId>,
}

struct Checker {
    scopes: Vec<Scope>,
    /// Declared type of every symbol, indexed by `SymbolId`.
    symbol_types: Vec<MachineType>,
    next_symbol: SymbolId,
}

impl Checker {
    fn new() -> Self {
        Checker {
            scopes: vec![],
            symbol_types: vec![],
            next_symbol: 0,
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(Scope {
            table: HashMap::new(),
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: Id, ty: MachineType, span: Span) -> Result<SymbolId> {
        let scope = self
            .scopes
            .last_mut()
            .expect("internal error: declare outside any scope");

        if scope.table.contains_key(&name) {
            return Err(SemError::Redefinition { name, span });
        }

        let sym = self.next_symbol;
        self.next_symbol += 1;
        self.symbol_types.push(ty);
        scope.table.insert(name, sym);
        Ok(sym)
    }

    fn resolve(&self, name: &Id, span: Span) -> Result<SymbolId> {
        for scope in self.scopes.iter().rev() {
            if let Some(&sym) = scope.table.get(name) {
                return Ok(sym);
            }
        }
        Err(SemError::UndefinedSymbol {
            name: *name,
            span,
        })
    }

    fn check_block(&mut self, block: Block) -> Result<Block> {
        self.push_scope();
        let stmts = block
            .stmts
            .into_iter()
            .map(|s| self.check_stmt(s))
            .collect::<Result<Vec<_>>>();
        self.pop_scope();
        Ok(Block { stmts: stmts? })
    }

    fn check_stmt(&mut self, stmt: Stmt) -> Result<Stmt> {
        match stmt {
            Stmt::Block { block, span } => Ok(Stmt::Block {
                block: self.check_block(block)?,
                span,
            }),

            Stmt::VarDecl {
                name,
                ty,
                init,
                span,
                ..
            } => {
                let init = self.check_expr(init, Some(ty))?;
                let sym = self.declare(name, ty, span)?;
                Ok(Stmt::VarDecl {
                    name,
                    ty,
                    init,
                    sym: Some(sym),
                    span,
                })
            }

            Stmt::Assign {
                name,
                value,
                span,
                ..
            } => {
                let sym = self.resolve(&name, span)?;
                let declared_ty = self.symbol_types[sym as usize];
                let value = self.check_expr(value, Some(declared_ty))?;
                Ok(Stmt::Assign {
                    name,
                    value,
                    sym: Some(sym),
                    span,
                })
            }

            Stmt::If {
                cond,
                then_blk,
                else_blk,
                span,
            } => {
                let cond = self.check_expr(cond, None)?;
                let then_blk = self.check_block(then_blk)?;
                let else_blk = else_blk.map(|b| self.check_block(b)).transpose()?;
                Ok(Stmt::If {
                    cond,
                    then_blk,
                    else_blk,
                    span,
                })
            }

            Stmt::While { cond, body, span } => {
                let cond = self.check_expr(cond, None)?;
                let body = self.check_block(body)?;
                Ok(Stmt::While { cond, body, span })
            }

            Stmt::Return { value, span } => {
                let value = self.check_expr(value, Some(DEFAULT_TYPE))?;
                Ok(Stmt::Return { value, span })
            }
        }
    }

    /// The type an expression would have without any contextual coercion,
    /// without fully lowering it — `None` for a bare untyped literal, which
    /// still needs a context (or the default) to settle on a type.
    fn natural_type(&self, expr: &Expr) -> Result<Option<MachineType>> {
        Ok(match expr {
            Expr::Int { ty: Some(t), .. } => Some(*t),
            Expr::Int { ty: None, .. } => None,
            Expr::Var { name, span, .. } => {
                let sym = self.resolve(name, *span)?;
                Some(self.symbol_types[sym as usize])
            }
            Expr::BinOp { ty: Some(t), .. } => Some(*t),
            Expr::BinOp {
                ty: None, lhs, rhs, ..
            } => {
                let l = self.natural_type(lhs)?;
                let r = self.natural_type(rhs)?;
                l.or(r)
            }
            Expr::Cast { ty, .. } => Some(*ty),
        })
    }

    fn check_expr(&mut self, expr: Expr, expected: Option<MachineType>) -> Result<Expr> {
        match expr {
            Expr::Int { value, span, .. } => {
                let ty = expected.unwrap_or(DEFAULT_TYPE);
                Ok(Expr::Int {
                    value: ty.truncate(value),
                    ty: Some(ty),
                    span,
                })
            }

            Expr::Var {
                name, span, ..
            } => {
                let sym = self.resolve(&name, span)?;
                let declared_ty = self.symbol_types[sym as usize];

                let var = Expr::Var {
                    name,
                    ty: Some(declared_ty),
                    sym: Some(sym),
                    span,
                };

                Ok(match expected {
                    Some(target) if target != declared_ty => Expr::Cast {
                        expr: Box::new(var),
                        ty: target,
                        span,
                    },
                    _ => var,
                })
            }

            Expr::BinOp {
                op,
                lhs,
                rhs,
                span,
                ..
            } => {
                let lhs_nt = self.natural_type(&lhs)?;
                let rhs_nt = self.natural_type(&rhs)?;
                let common = lhs_nt.or(rhs_nt).or(expected).unwrap_or(DEFAULT_TYPE);

                let lhs = self.check_expr(*lhs, Some(common))?;
                let rhs = self.check_expr(*rhs, Some(common))?;

                if let (Expr::Int { value: l, .. }, Expr::Int { value: r, .. }) = (&lhs, &rhs) {
                    let folded = fold_constant(op, *l, *r, common, span)?;
                    let final_ty = expected.unwrap_or(common);
                    return Ok(Expr::Int {
                        value: final_ty.truncate(folded),
                        ty: Some(final_ty),
                        span,
                    });
                }

                Ok(Expr::BinOp {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    ty: Some(common),
                    span,
                })
            }

            Expr::Cast { expr, ty, span } => {
                // The parser never produces this node; only re-checking an
                // already-annotated tree would reach here, which this
                // analyzer never does.
                Ok(Expr::Cast { expr, ty, span })
            }
        }
    }
}

/// Evaluate a binary op over two already-typed integer literals.
fn fold_constant(op: BOp, l: u64, r: u64, ty: MachineType, span: Span) -> Result<u64> {
    Ok(match op {
        BOp::Add => l.wrapping_add(r),
        BOp::Sub => l.wrapping_sub(r),
        BOp::Mul => l.wrapping_mul(r),
        BOp::Div => {
            let rs = ty.sign_extend(r);
            if rs == 0 {
                return Err(SemError::ConstantDivisionByZero { span });
            }
            let ls = ty.sign_extend(l);
            (ls / rs) as u64
        }
        BOp::Lt => (ty.sign_extend(l) < ty.sign_extend(r)) as u64,
        BOp::Le => (ty.sign_extend(l) <= ty.sign_extend(r)) as u64,
        BOp::Ne => (ty.sign_extend(l) != ty.sign_extend(r)) as u64,
        BOp::Eq => (ty.sign_extend(l) == ty.sign_extend(r)) as u64,
    })
}

/// Resolve scopes, assign types, insert casts, and fold constants over a
/// freshly parsed program.
#[tracing::instrument(level = "debug", skip(program))]
pub fn check(program: Program) -> Result<Program> {
    let mut checker = Checker::new();
    let body = checker.check_block(program.body)?;
    tracing::debug!(symbols = checker.next_symbol, "resolved scopes and types");
    Ok(Program { body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse::parse;

    fn checked(src: &str) -> Program {
        check(parse(src).unwrap()).unwrap()
    }

    #[test]
    fn folds_straight_line_arithmetic() {
        let program = checked("{ x : i32 = 1 + 2 * 3; return x; }");
        let Stmt::VarDecl { init, .. } = &program.body.stmts[0] else {
            panic!("expected a var decl");
        };
        assert!(matches!(init, Expr::Int { value: 7, .. }));
    }

    #[test]
    fn folds_constant_comparison() {
        let program = checked("{ return 3 < 5; }");
        let Stmt::Return { value, .. } = &program.body.stmts[0] else {
            panic!("expected a return");
        };
        assert!(matches!(
            value,
            Expr::Int {
                value: 1,
                ty: Some(MachineType::I32),
                ..
            }
        ));
    }

    #[test]
    fn shadowing_in_a_nested_block_gets_a_distinct_symbol() {
        let program = checked("{ x : i32 = 1; { x : i32 = 2; return x; } }");
        let Stmt::VarDecl { sym: outer_sym, .. } = &program.body.stmts[0] else {
            panic!("expected outer decl");
        };
        let Stmt::Block { block, .. } = &program.body.stmts[1] else {
            panic!("expected inner block");
        };
        let Stmt::VarDecl { sym: inner_sym, .. } = &block.stmts[0] else {
            panic!("expected inner decl");
        };
        assert_ne!(outer_sym, inner_sym);
    }

    #[test]
    fn rejects_redefinition_in_the_same_scope() {
        let err = check(parse("{ x : i32 = 1; x : i32 = 2; return x; }").unwrap());
        assert!(matches!(err, Err(SemError::Redefinition { .. })));
    }

    #[test]
    fn rejects_undefined_symbol() {
        let err = check(parse("{ return y; }").unwrap());
        assert!(matches!(err, Err(SemError::UndefinedSymbol { .. })));
    }
}
