//! CFG-to-Graphviz emitter: `digraph G { bbSRC -> bbDST ... }`, one edge
//! per CFG edge, blocks visited in list order and successors in their
//! natural order (then-before-else for `Branch`, single target for `Jmp`).

use std::fmt::Write;

use crate::middle::ir::Ir;

/// Render `ir`'s CFG as a Graphviz `digraph`.
pub fn to_dot(ir: &Ir) -> String {
    let mut out = String::new();
    out.push_str("digraph G {\n");

    for b in ir.blocks() {
        for s in ir.successors(b.id).iter() {
            writeln!(out, "  bb{} -> bb{};", b.id.0, s.0).unwrap();
        }
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse::parse;
    use crate::front::sem;
    use crate::middle::builder::build;

    #[test]
    fn if_else_produces_four_edges() {
        let program = parse("{ x : i32 = 0; if 1 { x = 10; } else { x = 20; } return x; }")
            .unwrap();
        let program = sem::check(program).unwrap();
        let ir = build(&program);

        let dot = to_dot(&ir);
        assert!(dot.starts_with("digraph G {\n"));
        assert!(dot.ends_with("}\n"));
        // entry branches to then and else (2); then jumps to the merge
        // block (1); else falls through into the merge block (1).
        assert_eq!(dot.lines().filter(|l| l.contains("->")).count(), 4);
    }
}
