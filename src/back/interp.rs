//! The tree-walking interpreter: executes `Ir` by walking instructions,
//! with a register file indexed by virtual-register id and stack-slot
//! storage keyed by slot identity. Runs equally well before or after
//! mem-to-reg — pre-promotion IR still has `Load`/`Store`, post-promotion
//! IR has `Phi` instead, and this walker handles both.
//!
//! Unlike the IR builder and mem2reg (whose preconditions are enforced by
//! the analyzer, so a violation there is a bug in this crate rather than in
//! the input program), a runtime division by zero is a genuine runtime
//! error reachable from a non-constant divisor, so it is the one place this
//! crate returns a recoverable `Result` instead of asserting.

use crate::common::Map;

use crate::middle::ir::{BlockId, Ir, MachineType, Op, RegId, SlotId, Value};

#[derive(thiserror::Error, Debug)]
pub enum InterpError {
    #[error("division by zero")]
    DivisionByZero,
}

type Result<T> = std::result::Result<T, InterpError>;

struct State {
    /// Indexed by `RegId`; `None` until the defining instruction runs.
    regs: Vec<Option<u64>>,
    slots: Map<SlotId, u64>,
}

impl State {
    fn eval(&self, v: Value) -> u64 {
        match v {
            Value::Integer(n) => n,
            Value::Register(r) => self.reg(r),
        }
    }

    fn reg(&self, r: RegId) -> u64 {
        self.regs[r as usize].expect("internal error: read of an undefined register")
    }

    fn set_reg(&mut self, r: RegId, v: u64) {
        self.regs[r as usize] = Some(v);
    }
}

fn signed(ty: MachineType, v: u64) -> i64 {
    ty.sign_extend(v)
}

/// Execute `ir` from its entry block to its first `Ret`, returning the
/// truncated return value as a signed integer.
pub fn run(ir: &Ir) -> Result<i64> {
    let mut st = State {
        // Sized by `next_reg`, not `num_regs`: folding can leave holes
        // below the highest assigned id (a removed `Imm`'s id is never
        // reused), so `num_regs` (a live-definition count) can undercount
        // the register file a still-live high id needs.
        regs: vec![None; ir.next_reg as usize],
        slots: Map::new(),
    };

    let mut cur = BlockId(0);
    let mut prev: Option<BlockId> = None;

    loop {
        let mut next: Option<BlockId> = None;
        let mut ret: Option<i64> = None;

        for id in ir.block_instrs(cur) {
            match &ir.instr(id).op {
                Op::Imm { ty, dest, value } => st.set_reg(*dest, ty.truncate(*value)),

                Op::Copy { ty, dest, src } => {
                    let v = st.eval(*src);
                    st.set_reg(*dest, ty.truncate(v));
                }

                Op::Phi { dest, params, .. } => {
                    let p = params
                        .iter()
                        .find(|p| Some(p.pred) == prev)
                        .expect("internal error: no phi parameter for the predecessor taken");
                    let v = st.reg(p.reg);
                    st.set_reg(*dest, v);
                }

                Op::Load { ty, dest, addr } => {
                    let v = st.slots.get(addr).copied().unwrap_or(0);
                    st.set_reg(*dest, ty.truncate(v));
                }

                Op::Store { ty, addr, src } => {
                    let v = st.eval(*src);
                    st.slots.insert(*addr, ty.truncate(v));
                }

                Op::Cast(op, c) => {
                    use crate::middle::ir::CastOp::*;
                    let v = st.eval(c.src);
                    let widened = match op {
                        Trunc | Zext => v,
                        Sext => signed(c.src_ty, v) as u64,
                    };
                    st.set_reg(c.dest, c.dst_ty.truncate(widened));
                }

                Op::Arith(op, b) => {
                    use crate::middle::ir::ArithOp::*;
                    let l = signed(b.ty, st.eval(b.lhs));
                    let r = signed(b.ty, st.eval(b.rhs));
                    let result = match op {
                        Add => l.wrapping_add(r),
                        Sub => l.wrapping_sub(r),
                        Mul => l.wrapping_mul(r),
                        Div => {
                            if r == 0 {
                                return Err(InterpError::DivisionByZero);
                            }
                            l.wrapping_div(r)
                        }
                    };
                    st.set_reg(b.dest, b.ty.truncate(result as u64));
                }

                Op::Cmp(op, b) => {
                    use crate::middle::ir::CmpOp::*;
                    let l = signed(b.ty, st.eval(b.lhs));
                    let r = signed(b.ty, st.eval(b.rhs));
                    let result = match op {
                        Less => l < r,
                        Lequal => l <= r,
                        Nequal => l != r,
                        Equal => l == r,
                    };
                    st.set_reg(b.dest, result as u64);
                }

                Op::Ret { ty, value } => {
                    ret = Some(signed(*ty, st.eval(*value)));
                }

                Op::Jmp { target } => next = Some(*target),

                Op::Branch {
                    ty,
                    cond,
                    then_block,
                    else_block,
                } => {
                    next = Some(if signed(*ty, st.eval(*cond)) != 0 {
                        *then_block
                    } else {
                        *else_block
                    });
                }
            }
        }

        if let Some(v) = ret {
            return Ok(v);
        }

        prev = Some(cur);
        cur = next.expect("internal error: block fell off its end with no terminator");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse::parse;
    use crate::front::sem;
    use crate::middle::builder::build;
    use crate::middle::fold::fold_immediates;
    use crate::middle::mem2reg::mem2reg;

    fn run_src(src: &str) -> i64 {
        let program = sem::check(parse(src).unwrap()).unwrap();
        let mut ir = build(&program);
        fold_immediates(&mut ir);
        mem2reg(&mut ir);
        run(&ir).unwrap()
    }

    #[test]
    fn straight_line_arithmetic() {
        assert_eq!(run_src("{ x : i32 = 1 + 2 * 3; return x; }"), 7);
    }

    #[test]
    fn if_else_through_a_phi() {
        assert_eq!(
            run_src("{ x : i32 = 0; if 1 { x = 10; } else { x = 20; } return x; }"),
            10
        );
        assert_eq!(
            run_src("{ x : i32 = 0; if 0 { x = 10; } else { x = 20; } return x; }"),
            20
        );
    }

    #[test]
    fn while_loop_sums_zero_through_nine() {
        assert_eq!(
            run_src(
                "{ i : i32 = 0; s : i32 = 0; while i < 10 { s = s + i; i = i + 1; } return s; }"
            ),
            45
        );
    }

    #[test]
    fn early_return_from_a_branch() {
        assert_eq!(run_src("{ if 1 { return 42; } return 0; }"), 42);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let program = sem::check(parse("{ d : i32 = 0; return 1 / d; }").unwrap()).unwrap();
        let mut ir = build(&program);
        fold_immediates(&mut ir);
        mem2reg(&mut ir);
        assert!(matches!(run(&ir), Err(InterpError::DivisionByZero)));
    }
}
