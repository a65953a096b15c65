//! Upstream (lex/parse/sem) error reporting.
//!
//! The IR builder and the mem-to-reg pass never return errors of their own:
//! their preconditions are enforced by the analyzer, so a violation there is
//! a bug in this crate, not a malformed program, and is reported with
//! `assert!`/`debug_assert!` at the point of violation instead. Only the
//! stages upstream of the IR (lexing, parsing, semantic analysis) surface
//! recoverable, user-facing errors.

use crate::common::Span;

#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] crate::front::lex::LexError),
    #[error(transparent)]
    Parse(#[from] crate::front::parse::ParseError),
    #[error(transparent)]
    Sem(#[from] crate::front::sem::SemError),
}

pub type Result<T> = std::result::Result<T, CompileError>;

impl CompileError {
    fn span(&self) -> Span {
        match self {
            CompileError::Lex(e) => e.span,
            CompileError::Parse(crate::front::parse::ParseError::Unexpected { span, .. }) => {
                *span
            }
            CompileError::Sem(e) => e.span(),
        }
    }

    /// A source-caret diagnostic for this error, suitable for printing to
    /// stderr before the pipeline exits with a non-zero status. Only these
    /// upstream (lex/parse/sem) errors are reported this way — a violation
    /// inside the IR builder or mem2reg is a bug in this crate, not a
    /// malformed program, and is never surfaced as a `CompileError`.
    pub fn diagnostic(&self, src: &str) -> String {
        render_diagnostic(src, self.span(), &self.to_string())
    }
}

/// Render a source-caret diagnostic: the offending line, then a `^` under
/// the start of `span`.
pub fn render_diagnostic(src: &str, span: Span, message: &str) -> String {
    let line_start = src[..span.start.min(src.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let line_end = src[span.start.min(src.len())..]
        .find('\n')
        .map(|i| span.start + i)
        .unwrap_or(src.len());
    let line_text = &src[line_start..line_end];
    let column = span.start - line_start;

    format!(
        "line {}: error: {}\n{}\n{}^",
        span.line,
        message,
        line_text,
        " ".repeat(column)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse::parse;

    #[test]
    fn caret_points_at_the_offending_token() {
        let src = "{ x : i32 = ; }";
        let err = parse(src).unwrap_err();
        let rendered = err.diagnostic(src);
        let mut lines = rendered.lines();
        assert!(lines.next().unwrap().starts_with("line 1: error:"));
        assert_eq!(lines.next().unwrap(), src);
        let caret_line = lines.next().unwrap();
        assert_eq!(caret_line.trim_start().len(), 1);
        assert_eq!(&src[caret_line.len()..caret_line.len() + 1], ";");
    }
}
