//! Recoverable problems found while parsing
//!
//! Unknown names, unbalanced styles and similar conditions never abort a
//! parse. Each one is logged and collected so callers can report them.

use serde::{Deserialize, Serialize};
use std::fmt;
use tagdown_types::{ScanRange, Severity};

/// A diagnostic message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub range: ScanRange,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, range: ScanRange, message: impl Into<String>) -> Self {
        Self {
            severity,
            range,
            message: message.into(),
        }
    }

    pub fn error(range: ScanRange, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, range, message)
    }

    pub fn warning(range: ScanRange, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, range, message)
    }

    pub fn info(range: ScanRange, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, range, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.severity, self.range, self.message)
    }
}

/// Collector for diagnostics emitted during one parse
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record a warning
    pub fn warning(&mut self, range: ScanRange, message: impl Into<String>) {
        let diagnostic = Diagnostic::warning(range, message);
        tracing::warn!(line = range.line, column = range.column, "{}", diagnostic.message);
        self.diagnostics.push(diagnostic);
    }

    pub fn info(&mut self, range: ScanRange, message: impl Into<String>) {
        let diagnostic = Diagnostic::info(range, message);
        tracing::debug!(line = range.line, column = range.column, "{}", diagnostic.message);
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning)
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_records_in_order() {
        let mut collector = DiagnosticCollector::new();
        assert!(!collector.has_warnings());

        collector.info(ScanRange::new(1, 0, 0, 3), "defined #warn");
        collector.warning(ScanRange::new(2, 4, 10, 16), "Unknown tag type '#bogus'");

        assert!(collector.has_warnings());
        let diagnostics = collector.into_diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].severity, Severity::Info);
        assert_eq!(
            diagnostics[1].to_string(),
            "warning at 2:4: Unknown tag type '#bogus'"
        );
    }
}
