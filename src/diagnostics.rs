use serde::Serialize;
use std::fmt;

use crate::ast::Line;

/// One compile-time diagnostic: the source line and a student-facing
/// message. The message strings are part of the crate's interface and are
/// asserted by the test suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: Line,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

/// Ordered, append-only collector for diagnostics during one rewriter walk.
/// Recording a diagnostic never aborts the walk; the pipeline decides at the
/// end whether the accumulated set fails the compile.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, line: Line, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            line,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Newline-joined `Line L: message` rendering, used for `eval` results
    /// and the CLI `check` command.
    pub fn render(&self) -> String {
        self.diagnostics
            .iter()
            .map(Diagnostic::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_line_prefixed_messages_in_order() {
        let mut sink = DiagnosticSink::new();
        sink.error(3, "first");
        sink.error(1, "second");
        assert!(sink.has_errors());
        assert_eq!(sink.render(), "Line 3: first\nLine 1: second");
    }
}
