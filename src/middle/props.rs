//! Structural sanity checks over a built `Ir`.
//!
//! Each function here is a property that should hold of *any* well-formed
//! `Ir`, independent of how it got built — they don't re-run the passes
//! they're checking the output of, so a broken dominator tree or a
//! mis-renamed SSA use gets caught by an independent method rather than by
//! re-deriving the same answer the buggy code already computed.

use crate::common::Map;

use super::ir::{BlockId, InstrId, Ir, Op, RegId, Value};
use super::mem2reg::{dominator_tree, post_order, predecessors};

/// The instruction list reachable from `first_instr` is a well-formed
/// doubly-linked list: every `next` has a matching `prev`, and it terminates.
pub fn check_list_consistency(ir: &Ir) {
    let bound = ir.instrs.len() + 1;
    let mut prev = None;
    let mut cur = ir.first_instr;
    let mut steps = 0usize;

    while let Some(id) = cur {
        assert_eq!(ir.instr(id).prev, prev, "prev link mismatch at {id:?}");
        prev = Some(id);
        cur = ir.instr(id).next;
        steps += 1;
        assert!(steps <= bound, "instruction list appears to cycle");
    }
}

/// Every instruction's `block` back-pointer agrees with the block's own
/// instruction run.
pub fn check_block_coverage(ir: &Ir) {
    for id in ir.all_instrs() {
        let owner = ir.instr(id).block;
        assert!(
            ir.block_instrs(owner).any(|i| i == id),
            "instruction {id:?} claims block {owner:?} but isn't in its instruction run"
        );
    }
}

/// `Ir::successors` (derived from a block's terminator) matches what that
/// terminator actually says.
pub fn check_successor_soundness(ir: &Ir) {
    for b in ir.blocks() {
        if b.len == 0 {
            continue;
        }
        let end = &ir.instr(b.end.unwrap()).op;
        let succ: Vec<BlockId> = ir.successors(b.id).iter().collect();

        match end {
            Op::Ret { .. } => assert!(succ.is_empty(), "a return terminator has successors"),
            Op::Jmp { target } => assert_eq!(succ, vec![*target], "jmp successor mismatch"),
            Op::Branch {
                then_block,
                else_block,
                ..
            } => assert_eq!(
                succ,
                vec![*then_block, *else_block],
                "branch successor mismatch"
            ),
            _ => assert_eq!(
                succ.len(),
                1,
                "a fall-through block should have exactly one successor"
            ),
        }
    }
}

/// Every block holding real code is reachable from the entry block. Empty
/// placeholder blocks (left behind after a `return`) are exempt.
pub fn check_reachable_from_entry(ir: &Ir) {
    let mut visited = vec![false; ir.num_blocks()];
    let mut stack = vec![BlockId(0)];

    while let Some(b) = stack.pop() {
        if visited[b.index()] {
            continue;
        }
        visited[b.index()] = true;
        for s in ir.successors(b).iter() {
            stack.push(s);
        }
    }

    for b in ir.blocks() {
        if b.len > 0 {
            assert!(
                visited[b.id.index()],
                "block {:?} has code but is unreachable from entry",
                b.id
            );
        }
    }
}

/// A block `d` dominates `b` iff every path from entry to `b` passes through
/// `d`; checked here by removing `d` from the graph and testing whether `b`
/// is still reachable, not by trusting the dominator-tree computation being
/// verified.
fn dominates_by_removal(ir: &Ir, d: BlockId, b: BlockId) -> bool {
    if d == b {
        return true;
    }

    let mut visited = vec![false; ir.num_blocks()];
    visited[d.index()] = true;
    let mut stack = vec![BlockId(0)];

    while let Some(cur) = stack.pop() {
        if visited[cur.index()] {
            continue;
        }
        visited[cur.index()] = true;
        for s in ir.successors(cur).iter() {
            stack.push(s);
        }
    }

    !visited[b.index()]
}

/// Every reachable non-entry block's computed immediate dominator actually
/// dominates it.
pub fn check_dominator_correctness(ir: &Ir) {
    let po = post_order(ir);
    let pred = predecessors(ir);
    let idom = dominator_tree(ir, &po, &pred);
    let entry = BlockId(0);

    for &b in &po.order {
        if b == entry {
            continue;
        }
        let d = idom[b.index()].expect("reachable non-entry block must have a dominator");
        assert!(
            dominates_by_removal(ir, d, b),
            "computed idom {d:?} does not actually dominate {b:?}"
        );
    }
}

/// No register is defined twice, and `num_regs` agrees with the number of
/// distinct definitions actually present.
pub fn check_ssa_single_definition(ir: &Ir) {
    let mut defined: Map<RegId, InstrId> = Map::new();

    for id in ir.all_instrs() {
        if let Some(r) = ir.instr(id).op.dest() {
            if let Some(prev) = defined.insert(r, id) {
                panic!("register {r} defined at both {prev:?} and {id:?}");
            }
        }
    }

    assert_eq!(
        ir.num_regs as usize,
        defined.len(),
        "num_regs disagrees with the number of distinct register definitions"
    );
}

fn dominates(idom: &[Option<BlockId>], a: BlockId, b: BlockId) -> bool {
    let mut cur = Some(b);
    while let Some(c) = cur {
        if c == a {
            return true;
        }
        cur = idom[c.index()];
    }
    false
}

/// Every register use is reached by its definition: same-block uses must
/// come after the def in program order, cross-block uses must have their
/// def in a block that dominates the use. A φ parameter's register must be
/// defined in (or dominate) the predecessor edge it's attached to, not the
/// block holding the φ itself.
pub fn check_ssa_reaching_def(ir: &Ir) {
    let po = post_order(ir);
    let pred = predecessors(ir);
    let idom = dominator_tree(ir, &po, &pred);

    let mut def_site: Map<RegId, (BlockId, usize)> = Map::new();
    for b in ir.blocks() {
        for (pos, id) in ir.block_instrs(b.id).enumerate() {
            if let Some(r) = ir.instr(id).op.dest() {
                def_site.insert(r, (b.id, pos));
            }
        }
    }

    for b in ir.blocks() {
        for (pos, id) in ir.block_instrs(b.id).enumerate() {
            let op = &ir.instr(id).op;

            if let Op::Phi { params, .. } = op {
                for p in params {
                    if p.reg == super::ir::REG_EMPTY {
                        continue;
                    }
                    let &(def_block, _) = def_site
                        .get(&p.reg)
                        .unwrap_or_else(|| panic!("phi parameter register {} has no definition", p.reg));
                    assert!(
                        def_block == p.pred || dominates(&idom, def_block, p.pred),
                        "phi parameter register {} does not reach predecessor {:?}",
                        p.reg,
                        p.pred
                    );
                }
                continue;
            }

            op.for_each_value(|v| {
                if let Value::Register(r) = v {
                    let &(def_block, def_pos) = def_site
                        .get(&r)
                        .unwrap_or_else(|| panic!("use of register {r} has no definition"));
                    if def_block == b.id {
                        assert!(
                            def_pos < pos,
                            "register {r} used before its definition in the same block"
                        );
                    } else {
                        assert!(
                            dominates(&idom, def_block, b.id),
                            "register {r}'s definition at {def_block:?} does not dominate its use at {:?}",
                            b.id
                        );
                    }
                }
            });
        }
    }
}

/// Run every structural check in this module over `ir`.
pub fn check_all(ir: &Ir) {
    check_list_consistency(ir);
    check_block_coverage(ir);
    check_successor_soundness(ir);
    check_reachable_from_entry(ir);
    check_dominator_correctness(ir);
    check_ssa_single_definition(ir);
    check_ssa_reaching_def(ir);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse::parse;
    use crate::front::sem;
    use crate::middle::builder::build;
    use crate::middle::fold::fold_immediates;
    use crate::middle::mem2reg::mem2reg;

    fn compile(src: &str) -> Ir {
        let program = parse(src).expect("parse failed");
        let program = sem::check(program).expect("sem failed");
        let mut ir = build(&program);
        fold_immediates(&mut ir);
        ir
    }

    #[test]
    fn straight_line_arithmetic_is_structurally_sound_before_and_after_mem2reg() {
        let mut ir = compile("{ x : i32 = 1 + 2 * 3; return x; }");
        check_all(&ir);
        mem2reg(&mut ir);
        check_all(&ir);
    }

    #[test]
    fn if_else_with_a_merge_phi_is_structurally_sound() {
        let mut ir = compile("{ x : i32 = 0; if (1 < 2) { x = 1; } else { x = 2; } return x; }");
        check_all(&ir);
        mem2reg(&mut ir);
        check_all(&ir);
    }

    #[test]
    fn while_loop_is_structurally_sound() {
        let mut ir = compile("{ i : i32 = 0; while (i < 10) { i = i + 1; } return i; }");
        check_all(&ir);
        mem2reg(&mut ir);
        check_all(&ir);
    }

    #[test]
    fn early_return_leaves_an_unreachable_placeholder_exempt() {
        let mut ir = compile("{ x : i32 = 1; return x; }");
        // The builder emits a fresh empty block after `return`; it should
        // never trip the reachability check even though nothing jumps to it.
        check_reachable_from_entry(&ir);
        mem2reg(&mut ir);
        check_all(&ir);
    }

    #[test]
    fn nested_shadowing_produces_distinct_registers() {
        let mut ir = compile("{ x : i32 = 1; { x : i32 = 2; return x; } }");
        check_all(&ir);
        mem2reg(&mut ir);
        check_all(&ir);
    }
}
