//! Common definitions that are shared between different parts of the compiler.

// Use sorted sets and maps everywhere we iterate, so printed IR and
// dominance/pred computations are reproducible between runs.
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Interned identifiers (variable names).
pub type Id = internment::Intern<String>;

/// Dense id of a resolved variable binding, assigned by the analyzer.
///
/// Two `Var` references share a `SymbolId` iff they resolve to the same
/// declaration; shadowing a name in a nested block gives each declaration
/// its own distinct id rather than reusing the outer one.
pub type SymbolId = u32;

/// A half-open byte range into the source text, used for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
}

impl Span {
    pub fn join(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
        }
    }
}
