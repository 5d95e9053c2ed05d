//! Compilation session.
//!
//! A [`Compiler`] owns one grammar for a whole set of documents. Syntax
//! extension documents listed in the configuration are parsed first, so the
//! tags, entities and styles they define are available to every document
//! compiled afterwards.

use crate::config::Config;
use crate::error::{ErrorContext, ParseError};
use crate::grammar::Grammar;
use crate::parser::{Parsed, Parser};
use crate::resource::ResourceResolver;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Input(#[from] ParseError),
}

impl CompileError {
    /// The underlying parse error, if any
    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            CompileError::Parse { source, .. } | CompileError::Input(source) => Some(source),
            CompileError::Read { .. } => None,
        }
    }
}

pub struct Compiler<R: ResourceResolver> {
    config: Config,
    grammar: Grammar,
    resolver: R,
}

impl<R: ResourceResolver> Compiler<R> {
    /// Create a session and load every syntax extension listed in `config`
    pub fn new(config: Config, resolver: R) -> Result<Self, CompileError> {
        let mut compiler = Self {
            config,
            grammar: Grammar::new(),
            resolver,
        };
        for path in compiler.config.syntax_paths() {
            compiler.load_syntax(&path)?;
        }
        Ok(compiler)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Parse a syntax extension document for its definitions only
    pub fn load_syntax(&mut self, path: &Path) -> Result<(), CompileError> {
        let before = self.grammar.tags().len();
        self.compile_file(path)?;
        info!(
            path = %path.display(),
            tags = self.grammar.tags().len() - before,
            "loaded syntax extension"
        );
        Ok(())
    }

    /// Parse a document held in memory
    pub fn compile_bytes(&mut self, input: &[u8]) -> Result<Parsed, CompileError> {
        let options = self.config.parse_options();
        let parsed = Parser::with_options(input, &mut self.grammar, &mut self.resolver, options).parse()?;
        Ok(parsed)
    }

    /// Read and parse a document
    pub fn compile_file(&mut self, path: &Path) -> Result<Parsed, CompileError> {
        let input = std::fs::read(path).map_err(|source| CompileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let options = self.config.parse_options();
        let result = Parser::with_options(&input, &mut self.grammar, &mut self.resolver, options).parse();
        match result {
            Ok(parsed) => {
                debug!(path = %path.display(), warnings = parsed.diagnostics.len(), "compiled");
                Ok(parsed)
            }
            Err(source) => {
                let text = String::from_utf8_lossy(&input);
                debug!("{}", ErrorContext::new(&text, &source));
                Err(CompileError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
}
