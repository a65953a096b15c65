//! The deterministic textual IR format.
//!
//! One line per instruction, `bb.ID:` labels preceding each non-empty
//! block's first instruction (in list order), with placeholder (empty)
//! blocks rendered after every non-empty one. Used by the CLI's `--emit ir`
//! stage and by the end-to-end tests, which assert against this exact text.

use std::fmt::Write;

use crate::middle::ir::{Ir, Op, Value};

fn render_value(v: Value) -> String {
    match v {
        Value::Register(r) => format!("%{r}"),
        Value::Integer(n) => n.to_string(),
    }
}

fn render_op(op: &Op) -> String {
    match op {
        Op::Imm { ty, dest, value } => format!("%{dest} = imm {ty} {value}"),
        Op::Copy { ty, dest, src } => format!("%{dest} = copy {ty} {}", render_value(*src)),
        Op::Phi { ty, dest, params, .. } => {
            let params = params
                .iter()
                .map(|p| format!("[%{}, bb.{}]", p.reg, p.pred))
                .collect::<Vec<_>>()
                .join(", ");
            format!("%{dest} = phi {ty} {params}")
        }
        Op::Load { ty, dest, addr } => format!("%{dest} = load {ty} [alloca {}]", addr.0),
        Op::Store { ty, addr, src } => {
            format!("store {ty} [alloca {}], {}", addr.0, render_value(*src))
        }
        Op::Cast(op, c) => format!("%{} = {op} {} {}", c.dest, c.dst_ty, render_value(c.src)),
        Op::Arith(op, b) => {
            format!(
                "%{} = {op} {} {}, {}",
                b.dest,
                b.ty,
                render_value(b.lhs),
                render_value(b.rhs)
            )
        }
        Op::Cmp(op, b) => {
            format!(
                "%{} = {op} {} {}, {}",
                b.dest,
                b.ty,
                render_value(b.lhs),
                render_value(b.rhs)
            )
        }
        Op::Ret { ty, value } => format!("ret {ty} {}", render_value(*value)),
        Op::Jmp { target } => format!("jmp {target}"),
        Op::Branch {
            ty,
            cond,
            then_block,
            else_block,
        } => format!(
            "branch {ty} {}, {then_block}, {else_block}",
            render_value(*cond)
        ),
    }
}

/// Render `ir` in this module's textual format. Two trailing newlines end
/// the output.
pub fn print_ir(ir: &Ir) -> String {
    let mut out = String::new();

    for b in ir.blocks() {
        if b.len == 0 {
            continue;
        }
        writeln!(out, "bb.{}:", b.id).unwrap();
        for id in ir.block_instrs(b.id) {
            writeln!(out, "  {}", render_op(&ir.instr(id).op)).unwrap();
        }
    }

    for b in ir.blocks() {
        if b.len == 0 {
            writeln!(out, "bb.{}:", b.id).unwrap();
        }
    }

    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse::parse;
    use crate::front::sem;
    use crate::middle::builder::build;
    use crate::middle::fold::fold_immediates;

    #[test]
    fn scenario_a_straight_line_arithmetic() {
        let program = parse("{ x : i32 = 1 + 2 * 3; return x; }").unwrap();
        let program = sem::check(program).unwrap();
        let mut ir = build(&program);
        fold_immediates(&mut ir);

        let expected = "\
bb.0:
  store i32 [alloca 0], 7
  %1 = load i32 [alloca 0]
  ret i32 %1
bb.1:
";
        assert_eq!(print_ir(&ir), format!("{expected}\n"));
    }

    #[test]
    fn scenario_f_constant_folded_comparison() {
        let program = parse("{ return 3 < 5; }").unwrap();
        let program = sem::check(program).unwrap();
        let mut ir = build(&program);
        fold_immediates(&mut ir);

        assert_eq!(print_ir(&ir), "bb.0:\n  ret i32 1\nbb.1:\n\n");
    }
}
