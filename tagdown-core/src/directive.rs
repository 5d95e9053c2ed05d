//! `#define:` directives.
//!
//! A directive section such as `#define:#warn` is followed by a YAML
//! configuration block and an indented template body:
//!
//! ```text
//! #define:#warn
//! Parents: ["#root"]
//! Mode: paragraph
//!
//!   <div class="warn">{{.Content}}</div>
//! ```
//!
//! `#define:#name` defines a tag, `#define:~name` an entity and
//! `#define:{name` a style. YAML values starting with `#` must be quoted.

use crate::grammar::{EntityDefinition, Grammar, GrammarError, StyleDefinition, TagDefinition};
use crate::resource::{extract_html_resources, Resource, ResourceError, ResourceKind, ResourceResolver};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use thiserror::Error;

const DEFINE_PREFIX: &str = "#define:";

#[derive(Error, Debug)]
pub enum DirectiveError {
    #[error("#define can only define tags (starting with #), entities (starting with ~) and styles (starting with {{)")]
    UnknownKind,

    #[error("Malformed configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("Expected a YAML map as configuration of {0}")]
    NotAMap(String),

    #[error("Unknown Parenthood value {value:?} in definition of {name}")]
    Parenthood { name: String, value: String },

    #[error("Invalid Mode {value:?} in definition of {name}")]
    Mode { name: String, value: String },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

/// What a directive defines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveKind {
    /// Tag name, including the leading `#`
    Tag(String),
    /// Entity name without the `~`
    Entity(String),
    /// Style name without the `{`
    Style(String),
}

impl DirectiveKind {
    /// Classify a section name. Returns `None` for ordinary tags.
    pub fn from_section(section: &str) -> Option<Result<Self, DirectiveError>> {
        let rest = section.strip_prefix(DEFINE_PREFIX)?;
        let kind = if rest.starts_with('#') {
            Ok(DirectiveKind::Tag(rest.to_string()))
        } else if let Some(name) = rest.strip_prefix('~') {
            Ok(DirectiveKind::Entity(name.to_string()))
        } else if let Some(name) = rest.strip_prefix('{') {
            Ok(DirectiveKind::Style(name.to_string()))
        } else {
            Err(DirectiveError::UnknownKind)
        };
        Some(kind)
    }

    pub fn name(&self) -> &str {
        match self {
            DirectiveKind::Tag(name) | DirectiveKind::Entity(name) | DirectiveKind::Style(name) => name,
        }
    }
}

/// A single string or a list of strings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s.trim().to_string()],
            OneOrMany::Many(list) => list.iter().map(|s| s.trim().to_string()).collect(),
        }
    }
}

/// `FirstChild: true` or `FirstChild: "true"`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    pub fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Text(s) => s.trim() == "true",
        }
    }
}

/// Configuration block of a directive. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirectiveConfig {
    #[serde(default)]
    pub parents: Option<OneOrMany>,
    #[serde(default)]
    pub counter: Option<String>,
    #[serde(default)]
    pub reset_counters: Option<OneOrMany>,
    #[serde(default)]
    pub scripts: Option<OneOrMany>,
    #[serde(default)]
    pub styles: Option<OneOrMany>,
    #[serde(default)]
    pub resources: Option<OneOrMany>,
    #[serde(default)]
    pub default_attrib: Option<String>,
    #[serde(default)]
    pub first_child: Option<Flag>,
    #[serde(default)]
    pub parenthood: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub short_styles: Option<OneOrMany>,
}

impl DirectiveConfig {
    /// Parse a configuration block; an empty block yields the defaults
    pub fn parse(name: &str, text: &str) -> Result<Self, DirectiveError> {
        let value: Value = serde_yaml::from_str(text)?;
        match value {
            Value::Null => Ok(Self::default()),
            Value::Mapping(_) => Ok(serde_yaml::from_value(value)?),
            _ => Err(DirectiveError::NotAMap(name.to_string())),
        }
    }

    fn short_styles(&self) -> BTreeMap<String, String> {
        let Some(list) = &self.short_styles else {
            return BTreeMap::new();
        };
        list.to_vec()
            .into_iter()
            .filter_map(|kv| {
                let (k, v) = kv.split_once('=')?;
                Some((k.to_string(), v.to_string()))
            })
            .collect()
    }

    /// Declared scripts, styles and generic resources, resolved in that order
    fn resources<R>(&self, resolver: &mut R) -> Result<Vec<Resource>, DirectiveError>
    where
        R: ResourceResolver + ?Sized,
    {
        let mut resources = Vec::new();
        for (kind, urls) in [
            (ResourceKind::Script, &self.scripts),
            (ResourceKind::Style, &self.styles),
            (ResourceKind::Unknown, &self.resources),
        ] {
            for url in urls.iter().flat_map(OneOrMany::to_vec) {
                let mut resource = Resource::new(kind, url)?;
                resolver.resolve(&mut resource)?;
                resources.push(resource);
            }
        }
        Ok(resources)
    }
}

/// A fully read directive: what it defines, its configuration and template
#[derive(Debug, Clone)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub config: DirectiveConfig,
    /// Template body, trimmed
    pub template: String,
}

/// What a directive registered
#[derive(Debug, Clone)]
pub enum Defined {
    Tag(std::sync::Arc<TagDefinition>),
    Entity(std::sync::Arc<EntityDefinition>),
    Style(std::sync::Arc<StyleDefinition>),
}

impl Directive {
    pub fn new(kind: DirectiveKind, config: DirectiveConfig, template: &str) -> Self {
        Self {
            kind,
            config,
            template: template.trim().to_string(),
        }
    }

    /// Resolve the directive's resources and register its definition.
    ///
    /// Everything is validated before the grammar is touched.
    pub fn apply<R>(&self, grammar: &mut Grammar, resolver: &mut R) -> Result<Defined, DirectiveError>
    where
        R: ResourceResolver + ?Sized,
    {
        let mut resources = self.config.resources(resolver)?;
        let (template, html_resources) = extract_html_resources(&self.template, resolver)?;
        resources.extend(html_resources);
        let class_shortcuts = self.config.short_styles();

        match &self.kind {
            DirectiveKind::Tag(name) => {
                let mut tag = self.tag_definition(name)?;
                tag.template = template;
                tag.resources = resources;
                tag.class_shortcuts = class_shortcuts;
                Ok(Defined::Tag(grammar.add_custom_tag(tag)?))
            }
            DirectiveKind::Entity(name) => {
                let entity = EntityDefinition {
                    name: name.clone(),
                    template,
                    counter: trimmed(&self.config.counter),
                    class_shortcuts,
                    resources,
                };
                Ok(Defined::Entity(grammar.add_custom_entity(entity)))
            }
            DirectiveKind::Style(name) => {
                let style = StyleDefinition {
                    name: name.clone(),
                    template,
                    class_shortcuts,
                    resources,
                };
                Ok(Defined::Style(grammar.add_custom_style(style)))
            }
        }
    }

    fn tag_definition(&self, name: &str) -> Result<TagDefinition, DirectiveError> {
        let config = &self.config;
        let parents = config.parents.as_ref().map(OneOrMany::to_vec).unwrap_or_default();

        let mut tag = TagDefinition::new(name).with_parents(parents.clone());
        tag.default_parent = parents.first().cloned();
        tag.counter = trimmed(&config.counter);
        tag.reset_counters = config.reset_counters.as_ref().map(OneOrMany::to_vec).unwrap_or_default();
        tag.default_attribute = trimmed(&config.default_attrib);
        tag.first_child = config.first_child.as_ref().is_some_and(Flag::is_set);

        if let Some(value) = &config.parenthood {
            tag.attachment = value.trim().parse().map_err(|_| DirectiveError::Parenthood {
                name: name.to_string(),
                value: value.clone(),
            })?;
        }
        if let Some(value) = &config.mode {
            tag.section_mode = value.trim().parse().map_err(|_| DirectiveError::Mode {
                name: name.to_string(),
                value: value.clone(),
            })?;
        }
        Ok(tag)
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Attachment, SectionMode};
    use crate::resource::PassThrough;

    fn directive(section: &str, config: &str, template: &str) -> Directive {
        let kind = DirectiveKind::from_section(section).unwrap().unwrap();
        let config = DirectiveConfig::parse(kind.name(), config).unwrap();
        Directive::new(kind, config, template)
    }

    #[test]
    fn test_classify_sections() {
        assert_eq!(
            DirectiveKind::from_section("#define:#warn").unwrap().unwrap(),
            DirectiveKind::Tag("#warn".to_string())
        );
        assert_eq!(
            DirectiveKind::from_section("#define:~pi").unwrap().unwrap(),
            DirectiveKind::Entity("pi".to_string())
        );
        assert_eq!(
            DirectiveKind::from_section("#define:{red").unwrap().unwrap(),
            DirectiveKind::Style("red".to_string())
        );
        assert!(matches!(
            DirectiveKind::from_section("#define:!x"),
            Some(Err(DirectiveError::UnknownKind))
        ));
        assert!(DirectiveKind::from_section("#warn").is_none());
    }

    #[test]
    fn test_config_keys() {
        let config = DirectiveConfig::parse(
            "#item",
            "Parents: ['#ul', '#ol']\nCounter: Item\nResetCounters: Sub\nDefaultAttrib: kind\nFirstChild: \"true\"\nParenthood: indent\nMode: table\nShortStyles: [\"big=font-size:2em\", \"broken\"]\nUnrelated: 3\n",
        )
        .unwrap();
        let tag = Directive::new(DirectiveKind::Tag("#item".to_string()), config, "")
            .tag_definition("#item")
            .unwrap();

        assert_eq!(tag.default_parent.as_deref(), Some("#ul"));
        assert_eq!(tag.possible_parents, ["#ul", "#ol"]);
        assert_eq!(tag.counter.as_deref(), Some("Item"));
        assert_eq!(tag.reset_counters, ["Sub"]);
        assert_eq!(tag.default_attribute.as_deref(), Some("kind"));
        assert!(tag.first_child);
        assert_eq!(tag.attachment, Attachment::Indent);
        assert_eq!(tag.section_mode, SectionMode::Table);
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(DirectiveConfig::parse("#x", "\n\n").unwrap(), DirectiveConfig::default());
        assert!(matches!(
            DirectiveConfig::parse("#x", "- a\n"),
            Err(DirectiveError::NotAMap(_))
        ));
    }

    #[test]
    fn test_invalid_mode_and_parenthood() {
        let mut grammar = Grammar::new();
        let err = directive("#define:#x", "Mode: poster", "")
            .apply(&mut grammar, &mut PassThrough)
            .unwrap_err();
        assert!(matches!(err, DirectiveError::Mode { .. }));

        let err = directive("#define:#x", "Parenthood: sometimes", "")
            .apply(&mut grammar, &mut PassThrough)
            .unwrap_err();
        assert!(matches!(err, DirectiveError::Parenthood { .. }));
        assert!(grammar.tag("#x").is_none());
    }

    #[test]
    fn test_apply_tag_with_resources() {
        let mut grammar = Grammar::new();
        let mut seen = Vec::new();
        let mut resolver = |res: &mut Resource| -> Result<(), ResourceError> {
            seen.push(res.url.clone());
            res.resolved = true;
            Ok(())
        };
        let defined = directive(
            "#define:#figure",
            "Scripts: fig.js\nStyles: [fig.css]\nShortStyles: wide=class:wide\n",
            "  <figure><img src=\"{{.Src}}\"><img src=\"frame.png\">{{.Content}}</figure>\n",
        )
        .apply(&mut grammar, &mut resolver)
        .unwrap();

        let Defined::Tag(tag) = defined else {
            panic!("expected a tag");
        };
        assert_eq!(tag.template, "<figure><img src=\"{{.Src}}\"><img src=\"frame.png\">{{.Content}}</figure>");
        assert_eq!(tag.resources.len(), 3);
        assert_eq!(tag.resources[0].kind, ResourceKind::Script);
        assert_eq!(tag.resources[1].kind, ResourceKind::Style);
        assert_eq!(tag.resources[2].kind, ResourceKind::Unknown);
        assert_eq!(tag.class_shortcuts.get("wide").map(String::as_str), Some("class:wide"));
        assert_eq!(seen, ["fig.js", "fig.css", "frame.png"]);
        assert!(grammar.tag("#figure").is_some());
    }

    #[test]
    fn test_apply_entity_and_style() {
        let mut grammar = Grammar::new();
        directive("#define:~pi", "Counter: Pi", "&pi;")
            .apply(&mut grammar, &mut PassThrough)
            .unwrap();
        directive("#define:{red", "", "<span style=\"color:red\">{{.Content}}</span>")
            .apply(&mut grammar, &mut PassThrough)
            .unwrap();

        let pi = grammar.entity("pi").unwrap();
        assert_eq!(pi.template, "&pi;");
        assert_eq!(pi.counter.as_deref(), Some("Pi"));
        assert!(grammar.style("red").is_some());
    }

    #[test]
    fn test_unknown_parent_leaves_grammar_unchanged() {
        let mut grammar = Grammar::new();
        let count = grammar.tags().len();
        let err = directive("#define:#x", "Parents: '#nope'", "")
            .apply(&mut grammar, &mut PassThrough)
            .unwrap_err();
        assert!(matches!(err, DirectiveError::Grammar(GrammarError::UnknownDefaultParent { .. })));
        assert_eq!(grammar.tags().len(), count);
    }
}
