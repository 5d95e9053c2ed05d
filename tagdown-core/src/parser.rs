//! Structural resolver.
//!
//! The parser pulls tokens from the [`Scanner`] one at a time and builds a
//! [`Document`]. It keeps a stack of open nodes (the root is implicit at
//! the bottom) and a stack of open inline styles. When a tag is opened, open
//! nodes that cannot host it are closed and any missing default parents are
//! opened, so documents rarely have to spell out their structure.

use crate::diagnostics::{Diagnostic, DiagnosticCollector};
use crate::directive::{Directive, DirectiveConfig, DirectiveError, DirectiveKind};
use crate::document::{Attributes, Counters, Document, EntityLeaf, LeafKind, LeafParent, StyleLeaf};
use crate::error::{ParseError, Result};
use crate::frontmatter::{parse_frontmatter, Frontmatter};
use crate::grammar::{Attachment, Grammar, SectionMode, TagDefinition, PARAGRAPH_TAG, ROOT_TAG};
use crate::resource::ResourceResolver;
use crate::scanner::{Scanner, SpannedToken, TextLayout, Token};
use std::collections::BTreeMap;
use std::sync::Arc;
use tagdown_types::{LeafId, NodeId, ScanRange};
use tracing::debug;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Input handling switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Skip a leading UTF-8 byte-order mark
    pub strip_bom: bool,
    /// Read a leading `---` delimited YAML block as front matter
    pub frontmatter: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strip_bom: true,
            frontmatter: true,
        }
    }
}

/// Result of a successful parse
#[derive(Debug)]
pub struct Parsed {
    pub frontmatter: Option<Frontmatter>,
    pub document: Document,
    /// Recovered problems, in the order they were found
    pub diagnostics: Vec<Diagnostic>,
}

/// An entry of the inline style stack
#[derive(Debug, Clone, Copy)]
struct StyleFrame {
    /// `*`, `_` or `{`
    marker: char,
    /// `None` for an unknown `{name}` style, which emits no leaf
    leaf: Option<LeafId>,
}

pub struct Parser<'a, R: ResourceResolver + ?Sized> {
    input: &'a [u8],
    options: ParseOptions,
    grammar: &'a mut Grammar,
    resolver: &'a mut R,
    scanner: Scanner<'a>,
    token: SpannedToken,

    document: Document,
    /// Open nodes above the root, innermost last
    open: Vec<NodeId>,
    styles: Vec<StyleFrame>,
    counters: Counters,
    section_mode: SectionMode,
    /// Whether table rows go to `#tbody` rather than `#thead`
    table_in_body: bool,
    diagnostics: DiagnosticCollector,
}

impl<'a, R: ResourceResolver + ?Sized> Parser<'a, R> {
    pub fn new(input: &'a [u8], grammar: &'a mut Grammar, resolver: &'a mut R) -> Self {
        Self::with_options(input, grammar, resolver, ParseOptions::default())
    }

    pub fn with_options(
        input: &'a [u8],
        grammar: &'a mut Grammar,
        resolver: &'a mut R,
        options: ParseOptions,
    ) -> Self {
        let input = if options.strip_bom {
            input.strip_prefix(BOM).unwrap_or(input)
        } else {
            input
        };
        let root = grammar
            .tag(ROOT_TAG)
            .cloned()
            .unwrap_or_else(|| Arc::new(TagDefinition::new(ROOT_TAG).with_attachment(Attachment::Root)));
        Self {
            input,
            options,
            grammar,
            resolver,
            scanner: Scanner::new(input),
            token: SpannedToken {
                token: Token::Eof,
                range: ScanRange::default(),
            },
            document: Document::new(root),
            open: Vec::new(),
            styles: Vec::new(),
            counters: Counters::new(),
            section_mode: SectionMode::Normal,
            table_in_body: false,
            diagnostics: DiagnosticCollector::new(),
        }
    }

    /// Parse the whole input.
    ///
    /// Lexical errors take precedence over structural ones; on any error no
    /// document is returned.
    pub fn parse(mut self) -> Result<Parsed> {
        let mut frontmatter = None;
        if self.options.frontmatter {
            let (parsed, body) = parse_frontmatter(self.input)?;
            frontmatter = parsed;
            if body > 0 {
                self.scanner.skip_to(body);
            }
        }

        let outcome = self.run();
        if let Some(err) = self.scanner.take_errors().into_iter().next() {
            return Err(err.into());
        }
        outcome?;

        debug!(
            nodes = self.document.node_count(),
            warnings = self.diagnostics.diagnostics().len(),
            "parsed document"
        );
        Ok(Parsed {
            frontmatter,
            document: self.document,
            diagnostics: self.diagnostics.into_diagnostics(),
        })
    }

    fn run(&mut self) -> Result<()> {
        self.next();
        while self.token.token != Token::Eof {
            self.step()?;
        }
        self.close_tags(0);
        Ok(())
    }

    fn next(&mut self) {
        self.token = self.scanner.scan();
    }

    fn warn(&mut self, message: impl Into<String>) {
        let range = self.token.range;
        self.diagnostics.warning(range, message);
    }

    fn step(&mut self) -> Result<()> {
        let SpannedToken { token, range } = self.token.clone();
        match token {
            Token::Section(name) => match DirectiveKind::from_section(&name) {
                Some(kind) => {
                    let kind = kind.map_err(|err| directive_error(range, err))?;
                    self.define(kind, range)?;
                }
                None => self.open_section(&name),
            },
            Token::Enum(marker) => self.open_list_item(marker),
            Token::Text(text) => {
                self.add_text(&text);
                self.next();
            }
            Token::MathText(text) => {
                self.add_inline(LeafKind::Math(text));
                self.next();
            }
            Token::CodeText(text) => {
                self.add_inline(LeafKind::Code(text));
                self.next();
            }
            Token::Style(marker) => self.style(marker),
            Token::Entity(spec) => self.entity(&spec),
            Token::TableCell(colspan) => {
                self.close_table_cell(colspan);
                self.open_table_cell();
                self.next();
            }
            Token::TableRow(colspan) => {
                self.close_table_row(colspan);
                self.next();
            }
            // stray configuration or values outside of a tag
            Token::ConfigText(_) | Token::Value(_) => self.next(),
            Token::Eof => {}
        }
        Ok(())
    }

    /// Innermost open node, or the root
    fn top(&self) -> NodeId {
        self.open.last().copied().unwrap_or_else(|| self.document.root())
    }

    /// Where inline content goes: the innermost style with a leaf, or the top node
    fn inline_parent(&self) -> LeafParent {
        match self.styles.iter().rev().find_map(|frame| frame.leaf) {
            Some(leaf) => LeafParent::Style(leaf),
            None => LeafParent::Node(self.top()),
        }
    }

    /// Look up a tag, falling back to `#p` with a warning
    fn lookup_tag(&mut self, name: &str) -> Arc<TagDefinition> {
        if let Some(tag) = self.grammar.tag(name) {
            return tag.clone();
        }
        self.warn(format!("Unknown tag type '{name}'"));
        self.grammar.tag(PARAGRAPH_TAG).cloned().unwrap_or_else(|| {
            Arc::new(
                TagDefinition::new(PARAGRAPH_TAG)
                    .with_section_mode(SectionMode::Paragraph)
                    .with_attachment(Attachment::TextOnly),
            )
        })
    }

    fn new_node(&mut self, name: &str, indent: usize) -> NodeId {
        let definition = self.lookup_tag(name);
        self.document.create_node(name, definition, indent)
    }

    /// Read the `Value` tokens following the current token
    fn parse_attributes(&mut self, shortcuts: &BTreeMap<String, String>) -> Attributes {
        let mut attributes = Attributes::new();
        self.next();
        while let Token::Value(value) = &self.token.token {
            match value.find(':') {
                // the colon must not be the first or last character
                Some(0) => {}
                Some(pos) if pos == value.len() - 1 => {}
                Some(pos) => attributes.insert(&value[..pos], &value[pos + 1..]),
                None => {
                    let name = shortcuts.get(value).unwrap_or(value);
                    attributes.insert(name.as_str(), "");
                }
            }
            self.next();
        }
        attributes
    }

    fn close_styles(&mut self) {
        while let Some(frame) = self.styles.pop() {
            self.warn(format!("Style '{}' is not properly closed", frame.marker));
        }
    }

    fn close_style(&mut self, closing: char) {
        let Some(top) = self.styles.last() else {
            self.warn(format!("Closing style '{closing}' has no corresponding opening style"));
            return;
        };
        let expected = match top.marker {
            '{' => '}',
            marker => marker,
        };
        if closing != expected {
            let opening = top.marker;
            self.warn(format!(
                "Mismatching closing style '{closing}'. Corresponding opening style is '{opening}'"
            ));
            return;
        }
        self.styles.pop();
    }

    /// Close open nodes until `level` remain
    fn close_tags(&mut self, level: usize) {
        self.close_styles();
        self.open.truncate(level);
        self.section_mode = match self.open.last() {
            Some(&node) => self.document.node(node).definition.section_mode,
            None => SectionMode::Normal,
        };
    }

    /// Append `node` to the top node and make it the new top.
    ///
    /// A first-child tag arriving in a parent that already has content
    /// closes the parent and opens a fresh sibling of it first.
    fn push(&mut self, node: NodeId) {
        let mut parent = self.top();
        let definition = self.document.node(node).definition.clone();
        let host = self.document.node(parent);
        if definition.first_child && host.has_content() && !host.definition.is_root() {
            let name = host.definition.name.clone();
            let indent = host.indent;
            self.close_tags(self.open.len() - 1);
            let sibling = self.new_node(&name, indent);
            self.push(sibling);
            parent = sibling;
        }

        self.document.append_child(parent, node);
        for counter in &definition.reset_counters {
            self.counters.remove(counter);
        }
        if let Some(counter) = &definition.counter {
            *self.counters.entry(counter.clone()).or_insert(0) += 1;
        }
        self.document.node_mut(node).counters = self.counters.clone();
        self.open.push(node);
    }

    /// Open `node`. With `fixup`, first close every open node that can
    /// host neither the tag nor one of its default parents, then open the
    /// default parents that are still missing.
    fn attach(&mut self, node: NodeId, fixup: bool) {
        self.close_styles();
        let definition = self.document.node(node).definition.clone();
        if fixup {
            let chain = self.grammar.default_parent_chain(&definition);
            let indent = self.document.node(node).indent;
            let mut depth = chain.len() - 1;
            for i in (0..self.open.len()).rev() {
                let found = {
                    let host = self.document.node(self.open[i]);
                    chain.iter().position(|def| can_host(host, def, indent))
                };
                if let Some(j) = found {
                    depth = j;
                    break;
                }
                self.close_tags(i);
            }
            for def in chain[1..=depth].iter().rev() {
                let parent = self.document.create_node(def.name.as_str(), def.clone(), indent);
                self.push(parent);
            }
        }
        self.push(node);
        self.section_mode = definition.section_mode;
    }

    fn define(&mut self, kind: DirectiveKind, range: ScanRange) -> Result<()> {
        self.scanner.begin_config_block();
        self.next();
        let mut config_text = String::new();
        if let Token::ConfigText(text) = &self.token.token {
            config_text.push_str(text);
            self.next();
        }
        let config = DirectiveConfig::parse(kind.name(), &config_text).map_err(|err| directive_error(range, err))?;

        let mut template = String::new();
        while let Token::CodeText(text) = &self.token.token {
            template.push_str(text);
            self.next();
        }

        let directive = Directive::new(kind, config, &template);
        directive
            .apply(&mut *self.grammar, &mut *self.resolver)
            .map_err(|err| directive_error(range, err))?;
        self.diagnostics
            .info(range, format!("Defined '{}'", directive.kind.name()));
        Ok(())
    }

    fn open_section(&mut self, name: &str) {
        let (tag_name, value) = match name.split_once(':') {
            Some((tag_name, value)) => (tag_name, Some(value)),
            None => (name, None),
        };
        let definition = self.lookup_tag(tag_name);
        match definition.section_mode {
            SectionMode::Table => self.scanner.set_layout(TextLayout::Table),
            SectionMode::Code => self.scanner.set_layout(TextLayout::Code),
            SectionMode::Math => self.scanner.set_layout(TextLayout::Math),
            SectionMode::Paragraph => self.scanner.set_layout(TextLayout::Paragraph),
            SectionMode::Normal | SectionMode::Media => {}
        }

        let node = self
            .document
            .create_node(tag_name, definition.clone(), self.scanner.indent());
        let attributes = self.parse_attributes(&definition.class_shortcuts);
        self.document.node_mut(node).attributes = attributes;
        self.attach(node, true);

        if let Some(value) = value {
            match &definition.default_attribute {
                Some(attribute) => self.document.node_mut(node).attributes.insert(attribute.as_str(), value),
                None => self.warn(format!("The tag {tag_name} has no default attribute")),
            }
        }
        if definition.section_mode == SectionMode::Table {
            self.table_in_body = false;
        }
    }

    fn open_list_item(&mut self, marker: char) {
        let indent = self.scanner.indent();
        let list_name = if marker == '-' { "#ul" } else { "#ol" };
        let list = self.lookup_tag(list_name);

        let mut item_host = None;
        let mut parent = None;
        let mut sibling = None;
        for i in (0..self.open.len()).rev() {
            let node = self.document.node(self.open[i]);
            // an item indented less than the marker owns the nested list
            if node.definition.name == "#li" && node.indent < indent {
                item_host = Some(i);
                break;
            }
            if self.is_possible_parent(self.open[i], &list, indent) {
                parent = Some(i);
                break;
            }
            let is_list = matches!(node.definition.name.as_str(), "#ul" | "#ol");
            if node.indent >= indent && is_list {
                sibling = Some(i);
            }
        }

        // a list found above the host item continues at this indent
        if let Some(sibling) = sibling {
            let node = self.open[sibling];
            if Arc::ptr_eq(&self.document.node(node).definition, &list) {
                self.close_tags(sibling + 1);
                self.document.node_mut(node).indent = indent;
            } else {
                self.close_tags(sibling);
                let node = self.document.create_node(list_name, list.clone(), indent);
                self.attach(node, item_host.is_none());
            }
        } else if let Some(host) = item_host {
            self.close_tags(host + 1);
            let node = self.document.create_node(list_name, list.clone(), indent);
            self.attach(node, false);
        } else {
            self.close_tags(parent.map_or(0, |p| p + 1));
            let node = self.document.create_node(list_name, list.clone(), indent);
            self.attach(node, true);
        }

        let item = self.new_node("#li", indent);
        let shortcuts = self.document.node(item).definition.class_shortcuts.clone();
        let attributes = self.parse_attributes(&shortcuts);
        self.document.node_mut(item).attributes = attributes;
        self.attach(item, false);
    }

    /// Whether the open node `host` can take `child` (or one of its default
    /// parents) at column `indent`
    fn is_possible_parent(&self, host: NodeId, child: &Arc<TagDefinition>, indent: usize) -> bool {
        let host = self.document.node(host);
        let attachment = host.definition.attachment;
        self.grammar.default_parent_chain(child).iter().any(|def| {
            (def.usable_in_block_scope() && attachment == Attachment::Indent && host.indent < indent)
                || (def.usable_in_block_scope() && attachment.is_root() && host.indent <= indent)
                || def.possible_parents.contains(&host.definition.name)
        })
    }

    fn add_text(&mut self, text: &str) {
        if self.section_mode == SectionMode::Table {
            self.open_table_cell();
        }
        if self.section_mode == SectionMode::Media {
            return;
        }

        let mut parent = self.inline_parent();
        if let LeafParent::Node(node) = parent {
            let host = self.document.node(node);
            if host.definition.attachment != Attachment::TextOnly {
                if text.trim().is_empty() {
                    return;
                }
                let indent = host.indent + 1;
                let paragraph = self.new_node(PARAGRAPH_TAG, indent);
                self.attach(paragraph, true);
                parent = LeafParent::Node(paragraph);
            }
        }
        self.document.append_leaf(parent, LeafKind::Text(text.to_string()));

        if let LeafParent::Node(node) = parent {
            let top_mode = self
                .open
                .last()
                .map(|&n| self.document.node(n).definition.section_mode);
            if self.document.node(node).definition.name == PARAGRAPH_TAG
                && top_mode == Some(SectionMode::Paragraph)
                && text.ends_with(':')
            {
                self.rewrite_term(node);
            }
        }
    }

    /// Turn a paragraph ending in `:` into a definition term followed by
    /// an empty definition description
    fn rewrite_term(&mut self, paragraph: NodeId) {
        self.close_tags(self.open.len() - 1);
        let indent = self.document.node(paragraph).indent;
        let parent = self.document.node(paragraph).parent;
        if let Some(parent) = parent {
            self.document.remove_child(parent, paragraph);
        }

        let term = self.new_node("#dt", indent);
        self.document.move_leaves(paragraph, term);
        self.attach(term, true);
        self.close_tags(self.open.len() - 1);

        let description = self.new_node("#dd", indent);
        self.attach(description, true);
    }

    fn add_inline(&mut self, kind: LeafKind) {
        if self.section_mode == SectionMode::Table {
            self.open_table_cell();
        }
        if self.section_mode == SectionMode::Media {
            return;
        }
        let parent = self.inline_parent();
        self.document.append_leaf(parent, kind);
    }

    fn style(&mut self, marker: char) {
        if self.section_mode == SectionMode::Table {
            self.open_table_cell();
        }
        match marker {
            '}' => {
                self.close_style('}');
                self.next();
            }
            '*' | '_' => {
                self.next();
                if self.styles.last().is_some_and(|top| top.marker == marker) {
                    self.close_style(marker);
                    return;
                }
                let parent = self.inline_parent();
                let leaf = self.document.append_leaf(
                    parent,
                    LeafKind::Style(StyleLeaf {
                        name: marker.to_string(),
                        definition: None,
                        attributes: Attributes::new(),
                        value: String::new(),
                        children: Vec::new(),
                    }),
                );
                self.styles.push(StyleFrame {
                    marker,
                    leaf: Some(leaf),
                });
            }
            _ => self.open_named_style(),
        }
    }

    fn open_named_style(&mut self) {
        self.next();
        let Token::Value(spec) = self.token.token.clone() else {
            self.warn("Expected style specification after {");
            return;
        };
        let (name, value) = spec.split_once(':').unwrap_or((spec.as_str(), ""));
        let definition = self.grammar.style(name).cloned();
        let parent = self.inline_parent();
        let shortcuts = definition
            .as_ref()
            .map(|def| def.class_shortcuts.clone())
            .unwrap_or_default();
        let attributes = self.parse_attributes(&shortcuts);

        let Some(definition) = definition else {
            self.warn(format!("Unknown style '{name}'"));
            self.styles.push(StyleFrame {
                marker: '{',
                leaf: None,
            });
            return;
        };
        let leaf = self.document.append_leaf(
            parent,
            LeafKind::Style(StyleLeaf {
                name: name.to_string(),
                definition: Some(definition),
                attributes,
                value: value.to_string(),
                children: Vec::new(),
            }),
        );
        self.styles.push(StyleFrame {
            marker: '{',
            leaf: Some(leaf),
        });
    }

    fn entity(&mut self, spec: &str) {
        if self.section_mode == SectionMode::Table {
            self.open_table_cell();
        }
        let (name, value) = spec.split_once(':').unwrap_or((spec, ""));
        let definition = self.grammar.entity(name).cloned();
        let shortcuts = definition
            .as_ref()
            .map(|def| def.class_shortcuts.clone())
            .unwrap_or_default();
        let attributes = self.parse_attributes(&shortcuts);

        let Some(definition) = definition else {
            self.warn(format!("Unknown entity '{name}'"));
            return;
        };
        if let Some(counter) = &definition.counter {
            *self.counters.entry(counter.clone()).or_insert(0) += 1;
        }
        let parent = self.inline_parent();
        self.document.append_leaf(
            parent,
            LeafKind::Entity(EntityLeaf {
                name: name.to_string(),
                definition,
                attributes,
                counters: self.counters.clone(),
                value: value.to_string(),
            }),
        );
    }

    /// Stack level of the innermost open node whose definition is one of `names`
    fn level_of(&self, names: [&str; 2]) -> Option<usize> {
        self.open
            .iter()
            .rposition(|&n| names.contains(&self.document.node(n).definition.name.as_str()))
    }

    fn close_table_cell(&mut self, colspan: usize) {
        if let Some(level) = self.level_of(["#tbody-cell", "#thead-cell"]) {
            self.document.node_mut(self.open[level]).colspan = colspan;
            self.close_tags(level);
        }
    }

    fn close_table_row(&mut self, colspan: usize) {
        self.close_table_cell(colspan);
        if let Some(level) = self.level_of(["#tbody-row", "#thead-row"]) {
            self.close_tags(level);
        }
        self.table_in_body = true;
    }

    fn open_table_cell(&mut self) {
        if self.level_of(["#tbody-cell", "#thead-cell"]).is_some() {
            return;
        }
        let name = if self.table_in_body { "#tbody-cell" } else { "#thead-cell" };
        let cell = self.new_node(name, self.scanner.indent());
        self.attach(cell, true);
    }
}

/// Whether an open node may directly host a tag of definition `def`
/// opened at column `indent`
fn can_host(host: &crate::document::NodeData, def: &TagDefinition, indent: usize) -> bool {
    let attachment = host.definition.attachment;
    let block_host = attachment.is_root() || (attachment == Attachment::Indent && host.indent < indent);
    (def.usable_in_block_scope() && block_host) || def.possible_parents.contains(&host.definition.name)
}

fn directive_error(range: ScanRange, err: DirectiveError) -> ParseError {
    match err {
        DirectiveError::Config(source) => ParseError::DirectiveConfig { range, source },
        DirectiveError::Resource(source) => ParseError::Resource { range, source },
        DirectiveError::Grammar(source) => ParseError::Grammar { range, source },
        other => ParseError::Directive {
            range,
            message: other.to_string(),
        },
    }
}
