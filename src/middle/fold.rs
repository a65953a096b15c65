//! Immediate-operand folding: a single forward pass that replaces uses of
//! registers defined by an `Imm` with the literal itself and deletes the
//! now-dead `Imm`.

use crate::common::Map;

use super::ir::{Op, RegId, Value};
use super::list;

/// Run immediate folding in place.
///
/// The live-immediate table maps a register id to the literal it was
/// defined with, so later instructions can substitute it in directly; a
/// plain ordered map needs no up-front capacity and never overflows.
#[tracing::instrument(level = "debug", skip(ir))]
pub fn fold_immediates(ir: &mut super::ir::Ir) {
    let mut table: Map<RegId, u64> = Map::new();

    let mut cur = ir.all_instrs().next();
    while let Some(id) = cur {
        let next = ir.instr(id).next;

        if let Op::Imm { dest, value, .. } = &ir.instr(id).op {
            table.insert(*dest, *value);
            list::remove(ir, id);
            ir.num_regs -= 1;
        } else {
            ir.instr_mut(id).op.for_each_value_mut(|v| {
                if let Value::Register(r) = *v {
                    if let Some(&literal) = table.get(&r) {
                        *v = Value::Integer(literal);
                    }
                }
            });
        }

        cur = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::{ArithOp, BasicBlock, Bin, BlockId, Instruction, InstrId, Ir, MachineType};

    /// Build a 3-instruction block by hand, in program order: `imm r1, 7`;
    /// `imm r2, 9`; `add r3, r1, r2`.
    fn ir_with_two_immediates_and_an_add() -> Ir {
        let mut ir = Ir {
            instrs: vec![],
            blocks: vec![BasicBlock {
                id: BlockId(0),
                start: None,
                end: None,
                len: 0,
            }],
            slots: vec![],
            first_instr: None,
            next_reg: 4,
            num_regs: 3,
        };

        let ops = [
            Op::Imm {
                ty: MachineType::I32,
                dest: 1,
                value: 7,
            },
            Op::Imm {
                ty: MachineType::I32,
                dest: 2,
                value: 9,
            },
            Op::Arith(
                ArithOp::Add,
                Bin {
                    ty: MachineType::I32,
                    dest: 3,
                    lhs: Value::Register(1),
                    rhs: Value::Register(2),
                },
            ),
        ];

        for (i, op) in ops.into_iter().enumerate() {
            let id = InstrId(i as u32);
            ir.instrs.push(Instruction {
                op,
                block: BlockId(0),
                prev: if i == 0 { None } else { Some(InstrId((i - 1) as u32)) },
                next: None,
            });
            if i > 0 {
                ir.instr_mut(InstrId((i - 1) as u32)).next = Some(id);
            }
        }
        ir.first_instr = Some(InstrId(0));
        ir.blocks[0].start = Some(InstrId(0));
        ir.blocks[0].end = Some(InstrId(2));
        ir.blocks[0].len = 3;

        ir
    }

    #[test]
    fn folds_immediate_uses_and_removes_def() {
        let mut ir = ir_with_two_immediates_and_an_add();

        fold_immediates(&mut ir);

        assert_eq!(ir.num_regs, 1);
        let remaining: Vec<_> = ir.all_instrs().collect();
        assert_eq!(remaining.len(), 1);
        match &ir.instr(remaining[0]).op {
            Op::Arith(ArithOp::Add, bin) => {
                assert_eq!(bin.lhs, Value::Integer(7));
                assert_eq!(bin.rhs, Value::Integer(9));
            }
            other => panic!("expected a surviving add, got {other:?}"),
        }
        assert_eq!(ir.block(BlockId(0)).len, 1);
    }

    #[test]
    fn leaves_non_immediate_defs_untouched() {
        let mut ir = ir_with_two_immediates_and_an_add();
        // Drop the second immediate so register 2 is unresolved; its use
        // should be left as a register reference, not rewritten.
        list::remove(&mut ir, InstrId(1));
        ir.num_regs -= 1;

        fold_immediates(&mut ir);

        let remaining: Vec<_> = ir.all_instrs().collect();
        assert_eq!(remaining.len(), 1);
        match &ir.instr(remaining[0]).op {
            Op::Arith(ArithOp::Add, bin) => {
                assert_eq!(bin.lhs, Value::Integer(7));
                assert_eq!(bin.rhs, Value::Register(2));
            }
            other => panic!("expected a surviving add, got {other:?}"),
        }
    }
}
