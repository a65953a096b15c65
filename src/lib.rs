//! `cflat-ir` is a small compiler front-to-middle-end: it lexes and parses a
//! tiny imperative language, type-checks it, lowers it into a control-flow
//! graph of three-address instructions, and promotes that graph into
//! SSA form. See `src/bin` for the executable driving this library.

pub mod common;
pub mod error;
pub mod front;
pub mod middle;
pub mod back;
