//! Mem-to-reg / SSA construction.
//!
//! Runs in five stages over a freshly built `Ir`: post-order + predecessors,
//! dominator tree (Cooper-Harvey-Kennedy), dominance frontiers, per-slot
//! liveness, pruned φ-insertion, then a dominator-tree-walk renaming pass.
//! Everything here is scratch state local to one call; nothing escapes but
//! the mutated `Ir`.

use crate::common::Set;

use super::ir::{BlockId, Ir, Op, PhiParam, RegId, SlotId, Value, REG_EMPTY};
use super::list;

pub(crate) struct PostOrder {
    /// Post-order position of each block, indexed by `BlockId`.
    pub(crate) index: Vec<usize>,
    /// Block at each post-order position.
    pub(crate) order: Vec<BlockId>,
}

pub(crate) fn post_order(ir: &Ir) -> PostOrder {
    let n = ir.num_blocks();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut index = vec![0usize; n];

    fn visit(ir: &Ir, b: BlockId, visited: &mut [bool], order: &mut Vec<BlockId>, index: &mut [usize]) {
        if visited[b.index()] {
            return;
        }
        visited[b.index()] = true;

        for s in ir.successors(b).iter() {
            visit(ir, s, visited, order, index);
        }

        index[b.index()] = order.len();
        order.push(b);
    }

    visit(ir, BlockId(0), &mut visited, &mut order, &mut index);

    PostOrder { index, order }
}

/// `pred[b]` is the sorted set of blocks whose successor set contains `b`.
pub(crate) fn predecessors(ir: &Ir) -> Vec<Set<BlockId>> {
    let mut pred = vec![Set::new(); ir.num_blocks()];
    for b in ir.blocks() {
        for s in ir.successors(b.id).iter() {
            pred[s.index()].insert(b.id);
        }
    }
    pred
}

fn intersect(po: &PostOrder, idom: &[Option<BlockId>], mut b1: BlockId, mut b2: BlockId) -> BlockId {
    let mut f1 = po.index[b1.index()];
    let mut f2 = po.index[b2.index()];

    while f1 != f2 {
        while f1 < f2 {
            b1 = idom[po.order[f1].index()].expect("internal error: intersect walked off an undefined idom");
            f1 = po.index[b1.index()];
        }
        while f2 < f1 {
            b2 = idom[po.order[f2].index()].expect("internal error: intersect walked off an undefined idom");
            f2 = po.index[b2.index()];
        }
    }

    po.order[f1]
}

pub(crate) fn dominator_tree(ir: &Ir, po: &PostOrder, pred: &[Set<BlockId>]) -> Vec<Option<BlockId>> {
    let entry = BlockId(0);
    let mut idom: Vec<Option<BlockId>> = vec![None; ir.num_blocks()];
    idom[entry.index()] = Some(entry);

    loop {
        let mut changed = false;

        for i in (0..po.order.len()).rev() {
            let b = po.order[i];
            if b == entry {
                continue;
            }

            let mut preds = pred[b.index()].iter();
            let mut new_idom = *preds
                .next()
                .expect("internal error: non-entry block has no predecessors");

            for &p in preds {
                if idom[p.index()].is_some() {
                    new_idom = intersect(po, &idom, p, new_idom);
                }
            }

            if idom[b.index()] != Some(new_idom) {
                idom[b.index()] = Some(new_idom);
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    idom[entry.index()] = None;
    idom
}

fn dominator_children(ir: &Ir, idom: &[Option<BlockId>]) -> Vec<Vec<BlockId>> {
    let mut children = vec![vec![]; ir.num_blocks()];
    for b in ir.blocks() {
        if let Some(d) = idom[b.id.index()] {
            children[d.index()].push(b.id);
        }
    }
    for c in &mut children {
        c.sort();
    }
    children
}

fn dominance_frontiers(
    ir: &Ir,
    idom: &[Option<BlockId>],
    pred: &[Set<BlockId>],
) -> Vec<Set<BlockId>> {
    let mut df = vec![Set::new(); ir.num_blocks()];

    for n in ir.blocks() {
        let Some(idom_n) = idom[n.id.index()] else {
            continue;
        };
        if pred[n.id.index()].len() < 2 {
            continue;
        }

        for &p in pred[n.id.index()].iter() {
            let mut runner = Some(p);
            while let Some(r) = runner {
                if r == idom_n {
                    break;
                }
                df[r.index()].insert(n.id);
                runner = idom[r.index()];
            }
        }
    }

    df
}

struct Liveness {
    var_kill: Vec<Vec<bool>>,
    ue_var: Vec<Vec<bool>>,
    live_out: Vec<Vec<bool>>,
}

fn liveness(ir: &Ir) -> Liveness {
    let nb = ir.num_blocks();
    let ns = ir.num_slots();

    let mut var_kill = vec![vec![false; ns]; nb];
    let mut ue_var = vec![vec![false; ns]; nb];

    for b in ir.blocks() {
        for id in ir.block_instrs(b.id) {
            match &ir.instr(id).op {
                Op::Store { addr, .. } => {
                    var_kill[b.id.index()][addr.index()] = true;
                }
                Op::Load { addr, .. } => {
                    if !var_kill[b.id.index()][addr.index()] {
                        ue_var[b.id.index()][addr.index()] = true;
                    }
                }
                _ => {}
            }
        }
    }

    let mut live_out = vec![vec![false; ns]; nb];

    loop {
        let mut changed = false;

        for n in ir.blocks() {
            for m in ir.successors(n.id).iter() {
                for slot in 0..ns {
                    let add = ue_var[m.index()][slot]
                        || (live_out[m.index()][slot] && !var_kill[m.index()][slot]);
                    if add && !live_out[n.id.index()][slot] {
                        live_out[n.id.index()][slot] = true;
                        changed = true;
                    }
                }
            }
        }

        if !changed {
            break;
        }
    }

    Liveness {
        var_kill,
        ue_var,
        live_out,
    }
}

fn write_blocks(ir: &Ir) -> Vec<Set<BlockId>> {
    let mut writes = vec![Set::new(); ir.num_slots()];
    for b in ir.blocks() {
        for id in ir.block_instrs(b.id) {
            if let Op::Store { addr, .. } = &ir.instr(id).op {
                writes[addr.index()].insert(b.id);
            }
        }
    }
    writes
}

/// φ-node insertion: pruned SSA — a φ for a slot is only placed where that
/// slot is actually live, not at every dominance-frontier block a store
/// reaches.
fn insert_phis(
    ir: &mut Ir,
    df: &[Set<BlockId>],
    live: &Liveness,
    pred: &[Set<BlockId>],
    writes: &[Set<BlockId>],
) {
    let mut has_phi = vec![false; ir.num_blocks()];

    for slot in 0..ir.num_slots() {
        has_phi.iter_mut().for_each(|x| *x = false);

        let mut worklist: Vec<BlockId> = writes[slot].iter().copied().collect();
        let mut worked = vec![false; ir.num_blocks()];
        for &b in &worklist {
            worked[b.index()] = true;
        }

        while let Some(w) = worklist.pop() {
            for &d in df[w.index()].iter() {
                let needed = live.live_out[d.index()][slot] || live.ue_var[d.index()][slot];

                if needed && !has_phi[d.index()] {
                    let params = pred[d.index()]
                        .iter()
                        .map(|&p| PhiParam {
                            pred: p,
                            reg: REG_EMPTY,
                        })
                        .collect();

                    let ty = ir.slot(SlotId(slot as u32)).ty;
                    list::insert_at_block_start(
                        ir,
                        d,
                        Op::Phi {
                            ty,
                            dest: REG_EMPTY,
                            slot: SlotId(slot as u32),
                            params,
                        },
                    );

                    has_phi[d.index()] = true;

                    if !worked[d.index()] {
                        worked[d.index()] = true;
                        worklist.push(d);
                    }
                }
            }
        }
    }
}

/// Dominator-tree-walk renaming: replaces slot loads/stores with register
/// copies, walking the dominator tree so each block sees the right
/// currently-live register for every slot.
fn rename(ir: &mut Ir, dom_children: &[Vec<BlockId>], cur_reg: &mut [RegId], b: BlockId) {
    let saved = cur_reg.to_vec();

    for id in ir.block_instrs(b).collect::<Vec<_>>() {
        match &ir.instr(id).op {
            Op::Phi { slot, .. } => {
                let r = ir.next_reg;
                ir.next_reg += 1;
                cur_reg[slot.index()] = r;
                if let Op::Phi { dest, .. } = &mut ir.instr_mut(id).op {
                    *dest = r;
                }
            }
            Op::Store { addr, src, .. } => {
                let slot = *addr;
                let src = *src;
                let r = ir.next_reg;
                ir.next_reg += 1;
                cur_reg[slot.index()] = r;
                let ty = ir.slot(slot).ty;
                ir.instr_mut(id).op = Op::Copy { ty, dest: r, src };
            }
            Op::Load { ty, dest, addr } => {
                let ty = *ty;
                let dest = *dest;
                let slot = *addr;
                let src = Value::Register(cur_reg[slot.index()]);
                ir.instr_mut(id).op = Op::Copy { ty, dest, src };
            }
            _ => {}
        }
    }

    for s in ir.successors(b).iter() {
        for id in ir.block_instrs(s).collect::<Vec<_>>() {
            let Op::Phi { slot, params, .. } = &mut ir.instr_mut(id).op else {
                break;
            };
            let cur = cur_reg[slot.index()];
            for p in params.iter_mut() {
                if p.pred == b {
                    p.reg = cur;
                }
            }
        }
    }

    for &child in &dom_children[b.index()] {
        rename(ir, dom_children, cur_reg, child);
    }

    cur_reg.copy_from_slice(&saved);
}

/// Promote every stack slot to SSA registers, eliminating all `Load`/`Store`.
#[tracing::instrument(level = "debug", skip(ir))]
pub fn mem2reg(ir: &mut Ir) {
    let po = post_order(ir);
    let pred = predecessors(ir);
    let idom = dominator_tree(ir, &po, &pred);
    let dom_children = dominator_children(ir, &idom);
    let df = dominance_frontiers(ir, &idom, &pred);
    let live = liveness(ir);
    let writes = write_blocks(ir);

    insert_phis(ir, &df, &live, &pred, &writes);

    let mut cur_reg = vec![REG_EMPTY; ir.num_slots()];
    let next_reg_before = ir.next_reg;
    rename(ir, &dom_children, &mut cur_reg, BlockId(0));
    // Renaming allocates exactly one fresh register per phi and per
    // rewritten store, each a genuinely new definition; `num_regs` (a
    // defined-register count, not a dense id bound — folding can leave
    // holes below `next_reg`) grows by exactly that many.
    ir.num_regs += ir.next_reg - next_reg_before;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse::parse;
    use crate::front::sem;
    use crate::middle::builder::build;
    use crate::middle::fold::fold_immediates;

    fn compile(src: &str) -> Ir {
        let program = parse(src).expect("parse failed");
        let program = sem::check(program).expect("sem failed");
        let mut ir = build(&program);
        fold_immediates(&mut ir);
        ir
    }

    #[test]
    fn straight_line_has_no_slot_ops_after_promotion() {
        let mut ir = compile("{ x : i32 = 1; y : i32 = x + 1; return y; }");
        mem2reg(&mut ir);

        for id in ir.all_instrs() {
            match ir.instr(id).op {
                Op::Load { .. } | Op::Store { .. } => {
                    panic!("found a surviving slot op after mem2reg")
                }
                _ => {}
            }
        }
    }

    #[test]
    fn branch_merge_inserts_a_phi() {
        let mut ir = compile(
            "{ x : i32 = 0; if (1 < 2) { x = 1; } else { x = 2; } return x; }",
        );
        mem2reg(&mut ir);

        let has_phi = ir
            .all_instrs()
            .any(|id| matches!(ir.instr(id).op, Op::Phi { .. }));
        assert!(has_phi, "expected a phi at the if-merge point");
    }

    #[test]
    fn loop_carried_variable_gets_a_phi_with_empty_filled_in() {
        let mut ir = compile(
            "{ i : i32 = 0; while (i < 10) { i = i + 1; } return i; }",
        );
        mem2reg(&mut ir);

        let mut found = false;
        for id in ir.all_instrs() {
            if let Op::Phi { params, .. } = &ir.instr(id).op {
                found = true;
                for p in params {
                    assert_ne!(p.reg, REG_EMPTY, "phi parameter left unrenamed");
                }
            }
        }
        assert!(found, "expected a loop-header phi for the induction variable");
    }
}
