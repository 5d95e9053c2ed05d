//! # tagdown-core
//!
//! Front end of the tagdown markup compiler.
//!
//! A document is a sequence of tags (`#name`, `>`, list markers) carrying
//! inline text, styles and entity references. The crate provides:
//! - A [`Grammar`] of tag, entity and style definitions, extensible from
//!   inside documents with `#define:` directives
//! - A mode-sensitive [`Scanner`] over raw bytes
//! - A structural [`Parser`] that opens missing parents and closes tags
//!   that cannot hold the next one, so documents rarely spell out structure
//! - An arena [`Document`] tree with navigation and query helpers
//!
//! ## Example
//!
//! ```ignore
//! use tagdown_core::{parse_document, Grammar, PassThrough};
//!
//! let mut grammar = Grammar::new();
//! let parsed = parse_document(b"- one\n- two", &mut grammar, &mut PassThrough)?;
//! println!("{}", parsed.document.dump());
//! ```

pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod directive;
pub mod document;
pub mod error;
pub mod frontmatter;
pub mod grammar;
pub mod parser;
pub mod resource;
pub mod scanner;

#[cfg(test)]
mod tests;

pub use compiler::{CompileError, Compiler};
pub use config::{Config, ConfigError};
pub use diagnostics::{Diagnostic, DiagnosticCollector};
pub use directive::{Defined, Directive, DirectiveConfig, DirectiveError, DirectiveKind};
pub use document::{Attributes, Counters, Document, EntityLeaf, Leaf, LeafKind, LeafParent, NodeData, StyleLeaf};
pub use error::{ErrorContext, ParseError, Result, ScanError};
pub use frontmatter::{parse_frontmatter, Frontmatter, FrontmatterError};
pub use grammar::{
    Attachment, EntityDefinition, Grammar, GrammarError, SectionMode, StyleDefinition, TagDefinition,
    PARAGRAPH_TAG, ROOT_TAG,
};
pub use parser::{ParseOptions, Parsed, Parser};
pub use resource::{extract_html_resources, PassThrough, Resource, ResourceError, ResourceKind, ResourceResolver};
pub use scanner::{tokenize, ScanMode, Scanner, SpannedToken, TextLayout, Token};

pub use tagdown_types::{LeafId, NodeId, ScanRange, Severity};

/// Parse `input` against `grammar` with the default options.
///
/// `#define:` directives in the input extend `grammar` in place, so a
/// grammar shared across calls accumulates definitions.
pub fn parse_document<R>(input: &[u8], grammar: &mut Grammar, resolver: &mut R) -> Result<Parsed>
where
    R: ResourceResolver + ?Sized,
{
    Parser::new(input, grammar, resolver).parse()
}
