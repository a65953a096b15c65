//! Instruction-list and block-splice primitives.
//!
//! These three operations are the only ways the rest of the compiler is
//! allowed to mutate the instruction list; every caller (immediate folding,
//! mem-to-reg's φ insertion and renaming) goes through them so that list
//! integrity, block-range integrity, and `len`/`end` consistency stay
//! invariant.

use super::ir::{Instruction, Ir, InstrId, BlockId, Op};

/// Unlink `id` from the list and repair any block whose `start == id`.
pub fn remove(ir: &mut Ir, id: InstrId) {
    let (prev, next, block) = {
        let instr = ir.instr(id);
        (instr.prev, instr.next, instr.block)
    };

    match prev {
        Some(p) => ir.instr_mut(p).next = next,
        None => ir.first_instr = next,
    }
    if let Some(n) = next {
        ir.instr_mut(n).prev = prev;
    }

    if ir.block(block).start == Some(id) {
        for b in &mut ir.blocks {
            if b.start == Some(id) {
                debug_assert!(b.id == block || b.len == 0);
                b.start = next;
            }
        }
    }

    ir.blocks[block.index()].len -= 1;
    ir.update_block_end(block);
}

/// Splice a new instruction immediately before `anchor`, in the same block.
pub fn insert_before(ir: &mut Ir, anchor: InstrId, op: Op) -> InstrId {
    let anchor_block = ir.instr(anchor).block;
    let prev = ir.instr(anchor).prev;

    let new_id = InstrId(ir.instrs.len() as u32);
    ir.instrs.push(Instruction {
        op,
        block: anchor_block,
        prev,
        next: Some(anchor),
    });

    if ir.block(anchor_block).start == Some(anchor) {
        for b in &mut ir.blocks {
            if b.start == Some(anchor) {
                debug_assert!(b.id == anchor_block || b.len == 0);
                b.start = Some(new_id);
            }
        }
    }

    match prev {
        Some(p) => ir.instr_mut(p).next = Some(new_id),
        None => ir.first_instr = Some(new_id),
    }
    ir.instr_mut(anchor).prev = Some(new_id);

    ir.blocks[anchor_block.index()].len += 1;
    ir.update_block_end(anchor_block);

    new_id
}

fn last_instr_id(ir: &Ir) -> Option<InstrId> {
    ir.all_instrs().last()
}

/// Splice a new instruction at the start of `block`, handling the case
/// where `block` is currently empty (adopting the tail of the whole list as
/// `prev`) and where other placeholder blocks share this same `start`.
pub fn insert_at_block_start(ir: &mut Ir, block: BlockId, op: Op) -> InstrId {
    let old_start = ir.block(block).start;

    let prev = match old_start {
        Some(s) => ir.instr(s).prev,
        None => last_instr_id(ir),
    };

    let new_id = InstrId(ir.instrs.len() as u32);
    ir.instrs.push(Instruction {
        op,
        block,
        prev,
        next: old_start,
    });

    if let Some(s) = old_start {
        ir.instr_mut(s).prev = Some(new_id);
    }

    match prev {
        Some(p) => ir.instr_mut(p).next = Some(new_id),
        None => ir.first_instr = Some(new_id),
    }

    // Every block whose `start` coincides with the old one is absorbed —
    // not just `block` itself. When `old_start` is a real instruction this
    // can only be other placeholders that fall through into `block`; when
    // it is `None` it is every block still waiting for its first
    // instruction. Scanning every block here is quadratic in block count;
    // negligible at the block counts this compiler's functions ever reach.
    for b in &mut ir.blocks {
        if b.start == old_start {
            debug_assert!(b.id == block || b.len == 0);
            b.start = Some(new_id);
        }
    }

    ir.blocks[block.index()].len += 1;
    ir.update_block_end(block);

    new_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::MachineType;

    fn fresh_ir() -> Ir {
        Ir {
            instrs: vec![],
            blocks: vec![super::super::ir::BasicBlock {
                id: BlockId(0),
                start: None,
                end: None,
                len: 0,
            }],
            slots: vec![],
            first_instr: None,
            next_reg: 1,
            num_regs: 0,
        }
    }

    fn imm(v: u64) -> Op {
        Op::Imm {
            ty: MachineType::I32,
            dest: 1,
            value: v,
        }
    }

    #[test]
    fn insert_at_start_of_empty_block_adopts_tail() {
        let mut ir = fresh_ir();
        let first = insert_at_block_start(&mut ir, BlockId(0), imm(1));
        assert_eq!(ir.first_instr, Some(first));
        assert_eq!(ir.block(BlockId(0)).len, 1);
        assert_eq!(ir.block(BlockId(0)).start, Some(first));
        assert_eq!(ir.block(BlockId(0)).end, Some(first));

        let second = insert_at_block_start(&mut ir, BlockId(0), imm(2));
        assert_eq!(ir.block(BlockId(0)).start, Some(second));
        assert_eq!(ir.instr(second).next, Some(first));
        assert_eq!(ir.instr(first).prev, Some(second));
        assert_eq!(ir.block(BlockId(0)).len, 2);
    }

    #[test]
    fn remove_repairs_start_and_end() {
        let mut ir = fresh_ir();
        let a = insert_at_block_start(&mut ir, BlockId(0), imm(1));
        let b = insert_at_block_start(&mut ir, BlockId(0), imm(2));
        assert_eq!(ir.block(BlockId(0)).start, Some(b));

        remove(&mut ir, b);
        assert_eq!(ir.block(BlockId(0)).start, Some(a));
        assert_eq!(ir.block(BlockId(0)).len, 1);
        assert_eq!(ir.first_instr, Some(a));
        assert_eq!(ir.instr(a).prev, None);
    }

    #[test]
    fn insert_before_updates_block_start_when_anchor_is_start() {
        let mut ir = fresh_ir();
        let a = insert_at_block_start(&mut ir, BlockId(0), imm(1));
        let before = insert_before(&mut ir, a, imm(0));
        assert_eq!(ir.block(BlockId(0)).start, Some(before));
        assert_eq!(ir.block(BlockId(0)).len, 2);
        assert_eq!(ir.instr(before).next, Some(a));
    }
}
