mod resolver_tests;

use crate::document::Document;
use crate::grammar::Grammar;
use crate::parser::Parsed;
use crate::resource::PassThrough;
use crate::parse_document;
use tagdown_types::{NodeId, Severity};

fn parse(input: &str) -> Parsed {
    parse_with(&mut Grammar::new(), input)
}

fn parse_with(grammar: &mut Grammar, input: &str) -> Parsed {
    parse_document(input.as_bytes(), grammar, &mut PassThrough).unwrap()
}

/// Tags of the children of `id`
fn child_tags(doc: &Document, id: NodeId) -> Vec<&str> {
    doc.children(id).iter().map(|&c| doc.node(c).tag.as_str()).collect()
}

fn warnings(parsed: &Parsed) -> Vec<&str> {
    parsed
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .map(|d| d.message.as_str())
        .collect()
}
