use std::fmt;

use crate::frontmatter::FrontmatterError;
use crate::grammar::GrammarError;
use crate::resource::ResourceError;

pub use tagdown_types::ScanRange;

/// A lexical error recorded by the scanner: an illegal byte or a malformed
/// UTF-8 sequence. Scanning continues after recording it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at {range}")]
pub struct ScanError {
    pub range: ScanRange,
    pub message: String,
}

/// Errors that abort parsing of a document
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Lexical(#[from] ScanError),

    #[error("Grammar error at {range}: {source}")]
    Grammar {
        range: ScanRange,
        #[source]
        source: GrammarError,
    },

    #[error("Directive error at {range}: {message}")]
    Directive { range: ScanRange, message: String },

    #[error("Malformed directive configuration at {range}: {source}")]
    DirectiveConfig {
        range: ScanRange,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Resource error at {range}: {source}")]
    Resource {
        range: ScanRange,
        #[source]
        source: ResourceError,
    },

    #[error(transparent)]
    Frontmatter(#[from] FrontmatterError),
}

impl ParseError {
    /// Position of the offending token, when the error has one
    pub fn range(&self) -> Option<ScanRange> {
        match self {
            ParseError::Lexical(err) => Some(err.range),
            ParseError::Grammar { range, .. } => Some(*range),
            ParseError::Directive { range, .. } => Some(*range),
            ParseError::DirectiveConfig { range, .. } => Some(*range),
            ParseError::Resource { range, .. } => Some(*range),
            ParseError::Frontmatter(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Display context for better error messages
pub struct ErrorContext<'a> {
    pub source: &'a str,
    pub error: &'a ParseError,
}

impl<'a> ErrorContext<'a> {
    pub fn new(source: &'a str, error: &'a ParseError) -> Self {
        Self { source, error }
    }

    /// Get the source line containing the error
    pub fn source_line(&self) -> Option<&'a str> {
        let range = self.error.range()?;
        self.source.lines().nth(range.line.checked_sub(1)?)
    }

    /// Get line and column numbers (1-indexed)
    pub fn line_col(&self) -> Option<(usize, usize)> {
        self.error.range().map(|r| (r.line, r.column + 1))
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((line, col)) = self.line_col() else {
            return writeln!(f, "Error: {}", self.error);
        };
        writeln!(f, "Error at line {}, column {}:", line, col)?;
        writeln!(f, "  {}", self.error)?;

        if let Some(source_line) = self.source_line() {
            writeln!(f)?;
            writeln!(f, "  {}", source_line)?;
            let col_start = (col - 1).min(source_line.len());
            let width = self
                .error
                .range()
                .map_or(1, |r| r.len())
                .min(source_line.len() - col_start)
                .max(1);
            writeln!(f, "  {}{}", " ".repeat(col_start), "^".repeat(width))?;
        }

        Ok(())
    }
}
