//! Tag, entity and style definitions.
//!
//! A [`Grammar`] starts out with the builtin tags and grows as documents
//! register their own definitions through `#define:` directives. Lookups
//! always return the most recently registered definition of a name, so a
//! document can shadow a builtin.

use crate::resource::Resource;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Name of the synthetic root tag every document tree starts with
pub const ROOT_TAG: &str = "#root";
/// Name of the paragraph tag, used as fallback for unknown tags
pub const PARAGRAPH_TAG: &str = "#p";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("Unknown tag named {parent} is used as default parent for tag {tag}")]
    UnknownDefaultParent { tag: String, parent: String },

    #[error("Unknown tag named {parent} is used as possible parent for tag {tag}")]
    UnknownParent { tag: String, parent: String },
}

/// How an open tag may host tags that do not name it as an explicit parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Attachment {
    /// Only tags listing this tag as possible parent may be children
    #[default]
    None,
    /// Any block-scope tag may be a child
    Root,
    /// Like `Root`, and the tag becomes the default parent of unparented tags
    DefaultRoot,
    /// Like `Root`, but children must be indented deeper than this tag
    Indent,
    /// Only inline content, never child tags
    TextOnly,
}

impl Attachment {
    pub fn is_root(&self) -> bool {
        matches!(self, Attachment::Root | Attachment::DefaultRoot)
    }
}

impl FromStr for Attachment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Attachment::None),
            "root" => Ok(Attachment::Root),
            "default-root" => Ok(Attachment::DefaultRoot),
            "indent" => Ok(Attachment::Indent),
            "text" => Ok(Attachment::TextOnly),
            other => Err(format!("Unknown parenthood {other:?}")),
        }
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Attachment::None => "none",
            Attachment::Root => "root",
            Attachment::DefaultRoot => "default-root",
            Attachment::Indent => "indent",
            Attachment::TextOnly => "text",
        };
        f.write_str(s)
    }
}

/// Content layout of a tag; selects the scanner's text layout and which
/// content the resolver keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SectionMode {
    #[default]
    Normal,
    Media,
    Table,
    Code,
    Math,
    Paragraph,
}

impl FromStr for SectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(SectionMode::Normal),
            "media" => Ok(SectionMode::Media),
            "table" => Ok(SectionMode::Table),
            "code" => Ok(SectionMode::Code),
            "math" => Ok(SectionMode::Math),
            "paragraph" => Ok(SectionMode::Paragraph),
            other => Err(format!("Unknown mode {other:?}")),
        }
    }
}

/// Definition of a structural tag such as `#p`, `#table` or a document-defined `#warn`.
#[derive(Debug, Clone, PartialEq)]
pub struct TagDefinition {
    pub name: String,
    /// Template body, opaque to the compiler
    pub template: String,
    pub default_parent: Option<String>,
    pub section_mode: SectionMode,
    pub possible_parents: Vec<String>,
    pub counter: Option<String>,
    pub reset_counters: Vec<String>,
    pub default_attribute: Option<String>,
    pub class_shortcuts: BTreeMap<String, String>,
    pub resources: Vec<Resource>,
    pub config: BTreeMap<String, Value>,
    pub attachment: Attachment,
    /// Split the parent when it already has content
    pub first_child: bool,
    usable_in_block_scope: bool,
}

impl TagDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: String::new(),
            default_parent: None,
            section_mode: SectionMode::Normal,
            possible_parents: Vec::new(),
            counter: None,
            reset_counters: Vec::new(),
            default_attribute: None,
            class_shortcuts: BTreeMap::new(),
            resources: Vec::new(),
            config: BTreeMap::new(),
            attachment: Attachment::None,
            first_child: false,
            usable_in_block_scope: false,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_default_parent(mut self, parent: impl Into<String>) -> Self {
        self.default_parent = Some(parent.into());
        self
    }

    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.possible_parents = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_section_mode(mut self, mode: SectionMode) -> Self {
        self.section_mode = mode;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = attachment;
        self
    }

    pub fn with_counter(mut self, counter: impl Into<String>) -> Self {
        self.counter = Some(counter.into());
        self
    }

    pub fn with_default_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.default_attribute = Some(attribute.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_first_child(mut self, first_child: bool) -> Self {
        self.first_child = first_child;
        self
    }

    /// Whether the tag may attach to root/indent hosts without an explicit parent match
    pub fn usable_in_block_scope(&self) -> bool {
        self.usable_in_block_scope
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_TAG
    }

    /// Caption config used by tables, samples and equations
    fn with_caption(self, caption: &str) -> Self {
        self.with_config("caption", caption).with_config("counter", caption)
    }
}

/// Definition of an inline entity reference (`~name~`)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityDefinition {
    pub name: String,
    pub template: String,
    pub counter: Option<String>,
    pub class_shortcuts: BTreeMap<String, String>,
    pub resources: Vec<Resource>,
}

impl EntityDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Definition of a named inline style (`{name ...}`)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyleDefinition {
    pub name: String,
    pub template: String,
    pub class_shortcuts: BTreeMap<String, String>,
    pub resources: Vec<Resource>,
}

impl StyleDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Registry of tag, entity and style definitions
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    tags: Vec<Arc<TagDefinition>>,
    entities: Vec<Arc<EntityDefinition>>,
    styles: Vec<Arc<StyleDefinition>>,
    default_root: Option<String>,
}

impl Grammar {
    /// Create a grammar holding the builtin tags
    pub fn new() -> Self {
        let mut grammar = Self::empty();
        grammar.load_builtin_tags();
        grammar
    }

    /// Create a grammar without any definitions
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn tags(&self) -> &[Arc<TagDefinition>] {
        &self.tags
    }

    pub fn entities(&self) -> &[Arc<EntityDefinition>] {
        &self.entities
    }

    pub fn styles(&self) -> &[Arc<StyleDefinition>] {
        &self.styles
    }

    /// Name of the tag currently acting as default root, if any
    pub fn default_root(&self) -> Option<&str> {
        self.default_root.as_deref()
    }

    pub fn tag(&self, name: &str) -> Option<&Arc<TagDefinition>> {
        self.tags.iter().rev().find(|t| t.name == name)
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<EntityDefinition>> {
        self.entities.iter().rev().find(|e| e.name == name)
    }

    pub fn style(&self, name: &str) -> Option<&Arc<StyleDefinition>> {
        self.styles.iter().rev().find(|s| s.name == name)
    }

    /// Register a builtin tag unless a tag of that name already exists
    pub fn register_builtin(&mut self, mut tag: TagDefinition) {
        if self.tag(&tag.name).is_some() {
            return;
        }
        tag.usable_in_block_scope = tag.default_parent.is_none() && !tag.is_root();
        self.tags.push(Arc::new(tag));
    }

    /// Register a document-defined tag.
    ///
    /// Parent names are checked against the tags registered so far (a tag
    /// may name itself). On error the grammar is left unchanged.
    pub fn add_custom_tag(&mut self, mut tag: TagDefinition) -> Result<Arc<TagDefinition>, GrammarError> {
        let known = |name: &str| name == tag.name || self.tag(name).is_some();
        if let Some(parent) = &tag.default_parent {
            if !known(parent.as_str()) {
                return Err(GrammarError::UnknownDefaultParent {
                    tag: tag.name.clone(),
                    parent: parent.clone(),
                });
            }
        }
        if let Some(parent) = tag.possible_parents.iter().find(|p| !known(p.as_str())) {
            return Err(GrammarError::UnknownParent {
                tag: tag.name.clone(),
                parent: parent.clone(),
            });
        }

        tag.usable_in_block_scope = tag.default_parent.is_none() && !tag.is_root();
        let is_default_root = tag.attachment == Attachment::DefaultRoot;
        let name = tag.name.clone();
        self.tags.push(Arc::new(tag));

        if is_default_root {
            self.rebase_under_default_root(&name);
        }

        let index = self.tags.len() - 1;
        if let Some(root) = self.default_root.clone() {
            let tag = Arc::make_mut(&mut self.tags[index]);
            if tag.default_parent.is_none() && !tag.is_root() && tag.name != root {
                tag.default_parent = Some(root);
            }
        }
        Ok(self.tags[index].clone())
    }

    /// Make `root` the default parent of every registered tag that has no
    /// default parent, or whose default parent is the previous default root.
    ///
    /// Rewritten tags also get `root` prepended to their possible parents.
    /// Tags are copied on write, so nodes created earlier keep their definition.
    pub fn rebase_under_default_root(&mut self, root: &str) {
        let previous = self.default_root.take();
        for tag in self.tags.iter_mut() {
            let rebase = match &tag.default_parent {
                None => true,
                Some(parent) => previous.as_deref() == Some(parent.as_str()),
            };
            if !rebase
                || tag.attachment == Attachment::DefaultRoot
                || tag.name == root
                || tag.is_root()
            {
                continue;
            }
            let tag = Arc::make_mut(tag);
            tag.default_parent = Some(root.to_string());
            tag.possible_parents.insert(0, root.to_string());
        }
        self.default_root = Some(root.to_string());
    }

    pub fn add_custom_entity(&mut self, entity: EntityDefinition) -> Arc<EntityDefinition> {
        let entity = Arc::new(entity);
        self.entities.push(entity.clone());
        entity
    }

    pub fn add_custom_style(&mut self, style: StyleDefinition) -> Arc<StyleDefinition> {
        let style = Arc::new(style);
        self.styles.push(style.clone());
        style
    }

    /// The tag followed by its default parents, up to the root or a tag
    /// without default parent. Unknown default parents resolve to `#p`.
    pub fn default_parent_chain(&self, tag: &Arc<TagDefinition>) -> Vec<Arc<TagDefinition>> {
        let mut chain = vec![tag.clone()];
        let mut current = tag.clone();
        while let Some(parent) = current.default_parent.as_deref() {
            if parent == ROOT_TAG {
                break;
            }
            let next = match self.tag(parent).or_else(|| self.tag(PARAGRAPH_TAG)) {
                Some(next) => next.clone(),
                None => break,
            };
            // a self-parented tag would loop forever
            if chain.iter().any(|t| Arc::ptr_eq(t, &next)) {
                break;
            }
            chain.push(next.clone());
            current = next;
        }
        chain
    }

    fn load_builtin_tags(&mut self) {
        use Attachment::{Indent, Root, TextOnly};

        self.register_builtin(
            TagDefinition::new(ROOT_TAG)
                .with_template("{{.Content}}")
                .with_attachment(Root),
        );
        self.register_builtin(
            TagDefinition::new(PARAGRAPH_TAG)
                .with_template(element("p"))
                .with_section_mode(SectionMode::Paragraph)
                .with_attachment(TextOnly),
        );
        self.register_builtin(TagDefinition::new("#ul").with_template(element("ul")).with_attachment(Indent));
        self.register_builtin(
            TagDefinition::new("#li")
                .with_template(element("li"))
                .with_default_parent("#ul")
                .with_parents(["#ul", "#ol"])
                .with_attachment(TextOnly),
        );
        self.register_builtin(TagDefinition::new("#ol").with_template(element("ol")).with_attachment(Indent));
        for (name, html) in [("#", "h1"), ("##", "h2"), ("###", "h3"), ("####", "h4")] {
            self.register_builtin(TagDefinition::new(name).with_template(element(html)).with_attachment(TextOnly));
        }
        self.register_builtin(
            TagDefinition::new("#table")
                .with_template(element("table"))
                .with_section_mode(SectionMode::Table)
                .with_counter("Table")
                .with_caption("Table"),
        );
        for (name, html) in [("#tbody", "tbody"), ("#thead", "thead")] {
            self.register_builtin(
                TagDefinition::new(name)
                    .with_template(element(html))
                    .with_default_parent("#table")
                    .with_parents(["#table", "#pie", "#chart"])
                    .with_section_mode(SectionMode::Table),
            );
        }
        for section in ["#tbody", "#thead"] {
            let row = format!("{section}-row");
            self.register_builtin(
                TagDefinition::new(row.as_str())
                    .with_template(element("tr"))
                    .with_default_parent(section)
                    .with_parents([section])
                    .with_section_mode(SectionMode::Table),
            );
            let cell_html = if section == "#thead" { "th" } else { "td" };
            self.register_builtin(
                TagDefinition::new(format!("{section}-cell"))
                    .with_template(cell(cell_html))
                    .with_default_parent(row.as_str())
                    .with_parents([row.as_str()])
                    .with_section_mode(SectionMode::Table)
                    .with_attachment(TextOnly),
            );
        }
        self.register_builtin(
            TagDefinition::new("#code")
                .with_template(
                    r#"<pre{{if .ID}} id="{{.ID}}"{{end}}{{if .HasClass "nosyntax"}} class="{{.Class}}"{{else}} class="prettyprint {{.Class}}"{{end}}{{if .Style}} style="{{.Style}}"{{end}}>{{.Content}}</pre>"#,
                )
                .with_section_mode(SectionMode::Code)
                .with_counter("Sample")
                .with_default_attribute("class")
                .with_caption("Sample")
                .with_attachment(TextOnly),
        );
        self.register_builtin(
            TagDefinition::new("#math")
                .with_template(
                    r#"<div{{if .ID}} id="{{.ID}}"{{end}}{{if .Class}} class="{{.Class}}"{{end}}{{if .Style}} style="{{.Style}}"{{end}}><span class="math">\[{{.Content}}\]</span></div>"#,
                )
                .with_section_mode(SectionMode::Math)
                .with_counter("Equation")
                .with_caption("Equation")
                .with_attachment(TextOnly),
        );
        self.register_builtin(
            TagDefinition::new("#bib")
                .with_template(
                    r#"<p{{if .ID}} id="{{.ID}}"{{end}} class="bibentry {{.Class}}"{{if .Style}} style="{{.Style}}"{{end}}>[{{.Counters.bib}}] {{.Content}}</p>"#,
                )
                .with_counter("bib")
                .with_default_attribute("label")
                .with_attachment(TextOnly),
        );
        for name in ["#pie", "#chart"] {
            self.register_builtin(
                TagDefinition::new(name)
                    .with_template(element("div"))
                    .with_section_mode(SectionMode::Table)
                    .with_counter("Chart")
                    .with_caption("Chart"),
            );
        }
        self.register_builtin(
            TagDefinition::new("#caption")
                .with_template(
                    r#"<div{{if .ID}} id="{{.ID}}"{{end}} class="caption {{.Class}}"{{if .Style}} style="{{.Style}}"{{end}}>{{.Content}}</div>"#,
                )
                .with_attachment(TextOnly),
        );
        self.register_builtin(TagDefinition::new(">").with_template(element("blockquote")).with_attachment(Indent));
        self.register_builtin(TagDefinition::new("#dl").with_template(element("dl")).with_attachment(Indent));
        self.register_builtin(
            TagDefinition::new("#dt")
                .with_template(element("dt"))
                .with_default_parent("#dl")
                .with_parents(["#dl"])
                .with_attachment(TextOnly),
        );
        self.register_builtin(
            TagDefinition::new("#dd")
                .with_template(element("dd"))
                .with_default_parent("#dl")
                .with_parents(["#dl"])
                .with_attachment(Indent),
        );
    }
}

fn element(html: &str) -> String {
    format!(
        r#"<{html}{{{{if .ID}}}} id="{{{{.ID}}}}"{{{{end}}}}{{{{if .Class}}}} class="{{{{.Class}}}}"{{{{end}}}}{{{{if .Style}}}} style="{{{{.Style}}}}"{{{{end}}}}>{{{{.Content}}}}</{html}>"#
    )
}

fn cell(html: &str) -> String {
    format!(
        r#"<{html}{{{{if .ID}}}} id="{{{{.ID}}}}"{{{{end}}}}{{{{if .Class}}}} class="{{{{.Class}}}}"{{{{end}}}}{{{{if .Style}}}} style="{{{{.Style}}}}"{{{{end}}}}{{{{if ne .Colspan 1}}}} colspan="{{{{.Colspan}}}}"{{{{end}}}}>{{{{.Content}}}}</{html}>"#
    )
}
