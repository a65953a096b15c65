//! The back-end of the compiler: a deterministic textual IR printer, a
//! CFG-to-Graphviz emitter, and the tree-walking interpreter that executes
//! the IR. There is no target code generation or register allocation here —
//! this back end's job ends at "render it" and "run it".

pub mod graphviz;
pub mod interp;
pub mod printer;

pub use graphviz::to_dot;
pub use interp::{run, InterpError};
pub use printer::print_ir;
