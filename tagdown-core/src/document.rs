//! Arena-backed document tree.
//!
//! Structural nodes and inline leaves live in two flat vectors owned by the
//! [`Document`] and refer to each other through [`NodeId`] / [`LeafId`]
//! indices. Removing a child only unlinks it; storage is released when the
//! document is dropped.

use crate::grammar::{EntityDefinition, StyleDefinition, TagDefinition};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tagdown_types::{LeafId, NodeId};

/// Counter values snapshotted when a node or entity is created
pub type Counters = BTreeMap<String, u32>;

/// Attributes parsed from `;key:value` and `;name` values.
///
/// A name without value (stored with an empty value) acts as a CSS class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `label` attribute, used as HTML id
    pub fn label(&self) -> Option<&str> {
        self.get("label")
    }

    /// Inline CSS built from all valued attributes except `class` and `label`
    pub fn style(&self) -> String {
        let mut result = String::new();
        for (k, v) in self.iter() {
            if v.is_empty() || k == "class" || k == "label" {
                continue;
            }
            let _ = write!(result, "{k}:{v};");
        }
        result
    }

    /// Value of the `class` attribute
    pub fn class(&self) -> &str {
        self.get("class").unwrap_or("")
    }

    /// True if `class` was given as a bare attribute name
    pub fn has_class(&self, class: &str) -> bool {
        self.get(class) == Some("")
    }
}

impl FromIterator<(String, String)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A structural node
#[derive(Debug, Clone)]
pub struct NodeData {
    /// Tag name as written in the source; may differ from the definition's
    /// name when an unknown tag fell back to `#p`
    pub tag: String,
    /// Definition active when the node was created
    pub definition: Arc<TagDefinition>,
    pub counters: Counters,
    pub parent: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub leaves: Vec<LeafId>,
    pub attributes: Attributes,
    /// Free-form configuration attached to this node
    pub config: BTreeMap<String, Value>,
    pub colspan: usize,
    /// Column at which the node was opened
    pub indent: usize,
    forced_id: Option<String>,
}

impl NodeData {
    fn new(tag: String, definition: Arc<TagDefinition>, indent: usize) -> Self {
        Self {
            tag,
            definition,
            counters: Counters::new(),
            parent: None,
            prev_sibling: None,
            next_sibling: None,
            children: Vec::new(),
            leaves: Vec::new(),
            attributes: Attributes::new(),
            config: BTreeMap::new(),
            colspan: 1,
            indent,
            forced_id: None,
        }
    }

    pub fn has_content(&self) -> bool {
        !self.leaves.is_empty() || !self.children.is_empty()
    }

    /// Label attribute or a previously forced id
    pub fn id(&self) -> Option<&str> {
        self.attributes.label().or(self.forced_id.as_deref())
    }
}

/// Where a leaf is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafParent {
    Node(NodeId),
    Style(LeafId),
}

#[derive(Debug, Clone)]
pub struct StyleLeaf {
    /// `*`, `_` or the name of a style definition
    pub name: String,
    /// `None` for the builtin `*` and `_` styles
    pub definition: Option<Arc<StyleDefinition>>,
    pub attributes: Attributes,
    pub value: String,
    pub children: Vec<LeafId>,
}

#[derive(Debug, Clone)]
pub struct EntityLeaf {
    pub name: String,
    pub definition: Arc<EntityDefinition>,
    pub attributes: Attributes,
    pub counters: Counters,
    /// Text following the `:` in `~name:value~`
    pub value: String,
}

#[derive(Debug, Clone)]
pub enum LeafKind {
    Text(String),
    Math(String),
    Code(String),
    Style(StyleLeaf),
    Entity(EntityLeaf),
}

/// An inline leaf
#[derive(Debug, Clone)]
pub struct Leaf {
    pub kind: LeafKind,
    pub parent: LeafParent,
    forced_id: Option<String>,
}

impl Leaf {
    pub fn attributes(&self) -> Option<&Attributes> {
        match &self.kind {
            LeafKind::Style(style) => Some(&style.attributes),
            LeafKind::Entity(entity) => Some(&entity.attributes),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attributes()
            .and_then(Attributes::label)
            .or(self.forced_id.as_deref())
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            LeafKind::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A parsed document
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    leaves: Vec<Leaf>,
    next_forced_id: u32,
}

impl Document {
    /// Create a document holding only the root node
    pub fn new(root: Arc<TagDefinition>) -> Self {
        Self {
            nodes: vec![NodeData::new("Root".to_string(), root, 0)],
            leaves: Vec::new(),
            next_forced_id: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::new(0)
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    pub fn leaf(&self, id: LeafId) -> &Leaf {
        &self.leaves[id.index()]
    }

    pub fn leaf_mut(&mut self, id: LeafId) -> &mut Leaf {
        &mut self.leaves[id.index()]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn leaves(&self, id: NodeId) -> &[LeafId] {
        &self.node(id).leaves
    }

    /// Number of nodes ever created, including detached ones
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Create a detached node
    pub fn create_node(
        &mut self,
        tag: impl Into<String>,
        definition: Arc<TagDefinition>,
        indent: usize,
    ) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(NodeData::new(tag.into(), definition, indent));
        id
    }

    /// Append `child` as last child of `parent`, linking siblings
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let prev = self.node(parent).children.last().copied();
        if let Some(prev) = prev {
            self.node_mut(prev).next_sibling = Some(child);
        }
        let node = self.node_mut(child);
        node.parent = Some(parent);
        node.prev_sibling = prev;
        node.next_sibling = None;
        self.node_mut(parent).children.push(child);
    }

    /// Unlink `child` from `parent`. Returns false if it was not a child.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(pos) = self.node(parent).children.iter().position(|&c| c == child) else {
            return false;
        };
        self.node_mut(parent).children.remove(pos);

        let (prev, next) = {
            let node = self.node(child);
            (node.prev_sibling, node.next_sibling)
        };
        if let Some(prev) = prev {
            self.node_mut(prev).next_sibling = next;
        }
        if let Some(next) = next {
            self.node_mut(next).prev_sibling = prev;
        }
        let node = self.node_mut(child);
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
        true
    }

    /// Append a leaf to a node or to an open style
    pub fn append_leaf(&mut self, parent: LeafParent, kind: LeafKind) -> LeafId {
        let id = LeafId::new(self.leaves.len() as u32);
        self.leaves.push(Leaf {
            kind,
            parent,
            forced_id: None,
        });
        match parent {
            LeafParent::Node(node) => self.node_mut(node).leaves.push(id),
            LeafParent::Style(style) => {
                if let LeafKind::Style(s) = &mut self.leaf_mut(style).kind {
                    s.children.push(id);
                }
            }
        }
        id
    }

    /// Move all direct leaves of `from` to the end of `to`
    pub fn move_leaves(&mut self, from: NodeId, to: NodeId) {
        let moved = std::mem::take(&mut self.node_mut(from).leaves);
        for &leaf in &moved {
            self.leaf_mut(leaf).parent = LeafParent::Node(to);
        }
        self.node_mut(to).leaves.extend(moved);
    }

    /// Id of a node, forcing a fresh `_id_<n>` when it has none
    pub fn force_id(&mut self, id: NodeId) -> String {
        if let Some(existing) = self.node(id).id() {
            return existing.to_string();
        }
        let forced = self.next_id();
        self.node_mut(id).forced_id = Some(forced.clone());
        forced
    }

    /// Id of a style or entity leaf, forcing a fresh `_id_<n>` when it has none
    pub fn force_leaf_id(&mut self, id: LeafId) -> String {
        if let Some(existing) = self.leaf(id).id() {
            return existing.to_string();
        }
        let forced = self.next_id();
        self.leaf_mut(id).forced_id = Some(forced.clone());
        forced
    }

    fn next_id(&mut self) -> String {
        let id = format!("_id_{}", self.next_forced_id);
        self.next_forced_id += 1;
        id
    }

    /// Concatenated text of the node's direct text leaves
    pub fn plain_text(&self, id: NodeId) -> String {
        self.node(id)
            .leaves
            .iter()
            .filter_map(|&leaf| self.leaf(leaf).text())
            .collect()
    }

    /// All nodes in the subtree of `id` whose tag is one of `names`, in
    /// document order. `id` itself is included when its tag matches. With
    /// no names, every descendant of `id` (never `id` itself).
    pub fn find_all(&self, id: NodeId, names: &[&str]) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.collect_nodes(id, names, &mut result);
        result
    }

    fn collect_nodes(&self, id: NodeId, names: &[&str], out: &mut Vec<NodeId>) {
        let node = self.node(id);
        if names.is_empty() {
            out.extend(node.children.iter().copied());
        } else if names.contains(&node.tag.as_str()) {
            out.push(id);
        }
        for &child in &node.children {
            self.collect_nodes(child, names, out);
        }
    }

    /// Header cells of a table node
    pub fn header_cells(&self, table: NodeId) -> Vec<NodeId> {
        let Some(row) = self
            .children_tagged(table, "#thead")
            .flat_map(|head| self.children_tagged(head, "#thead-row"))
            .next()
        else {
            return Vec::new();
        };
        self.children_tagged(row, "#thead-cell").collect()
    }

    /// Number of columns of a table node, taken from its first header row
    pub fn column_count(&self, table: NodeId) -> usize {
        self.header_cells(table).len()
    }

    /// Body rows of a table node
    pub fn body_rows(&self, table: NodeId) -> Vec<NodeId> {
        self.children_tagged(table, "#tbody")
            .flat_map(|body| self.children_tagged(body, "#tbody-row"))
            .collect()
    }

    fn children_tagged<'a>(&'a self, id: NodeId, tag: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(move |&c| self.node(c).tag == tag)
    }

    /// Entity leaves in the subtree of `id`, including those inside styles
    pub fn entities(&self, id: NodeId) -> Vec<LeafId> {
        let mut result = Vec::new();
        self.walk_leaves(id, &mut |leaf_id, leaf| {
            if matches!(leaf.kind, LeafKind::Entity(_)) {
                result.push(leaf_id);
            }
        });
        result
    }

    /// Style leaves in the subtree of `id`, outer styles before inner ones
    pub fn styles(&self, id: NodeId) -> Vec<LeafId> {
        let mut result = Vec::new();
        self.walk_leaves(id, &mut |leaf_id, leaf| {
            if matches!(leaf.kind, LeafKind::Style(_)) {
                result.push(leaf_id);
            }
        });
        result
    }

    /// True if the subtree of `id` holds a math leaf directly under a node
    pub fn has_math(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.leaves
            .iter()
            .any(|&l| matches!(self.leaf(l).kind, LeafKind::Math(_)))
            || node.children.iter().any(|&c| self.has_math(c))
    }

    /// First node in the subtree of `id` whose id is `wanted`
    pub fn node_by_id(&self, id: NodeId, wanted: &str) -> Option<NodeId> {
        if self.node(id).id() == Some(wanted) {
            return Some(id);
        }
        self.node(id)
            .children
            .iter()
            .find_map(|&c| self.node_by_id(c, wanted))
    }

    fn walk_leaves(&self, id: NodeId, visit: &mut dyn FnMut(LeafId, &Leaf)) {
        for &leaf in &self.node(id).leaves {
            self.walk_leaf(leaf, visit);
        }
        for &child in &self.node(id).children {
            self.walk_leaves(child, visit);
        }
    }

    fn walk_leaf(&self, id: LeafId, visit: &mut dyn FnMut(LeafId, &Leaf)) {
        let leaf = self.leaf(id);
        visit(id, leaf);
        if let LeafKind::Style(style) = &leaf.kind {
            for &child in &style.children {
                self.walk_leaf(child, visit);
            }
        }
    }

    /// Indented rendering of the tree, one line per node or leaf
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(self.root(), 0, &mut out);
        out
    }

    fn dump_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let pad = "  ".repeat(depth);
        if id == self.root() {
            let _ = write!(out, "{pad}{}", node.definition.name);
        } else {
            let _ = write!(out, "{pad}{}", node.tag);
            if node.tag != node.definition.name {
                let _ = write!(out, " (as {})", node.definition.name);
            }
        }
        write_attributes(&node.attributes, out);
        if node.colspan != 1 {
            let _ = write!(out, " colspan={}", node.colspan);
        }
        out.push('\n');
        for &leaf in &node.leaves {
            self.dump_leaf(leaf, depth + 1, out);
        }
        for &child in &node.children {
            self.dump_node(child, depth + 1, out);
        }
    }

    fn dump_leaf(&self, id: LeafId, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        match &self.leaf(id).kind {
            LeafKind::Text(text) => {
                let _ = writeln!(out, "{pad}{text:?}");
            }
            LeafKind::Math(text) => {
                let _ = writeln!(out, "{pad}math {text:?}");
            }
            LeafKind::Code(text) => {
                let _ = writeln!(out, "{pad}code {text:?}");
            }
            LeafKind::Entity(entity) => {
                let _ = write!(out, "{pad}~{}", entity.name);
                if !entity.value.is_empty() {
                    let _ = write!(out, ":{}", entity.value);
                }
                write_attributes(&entity.attributes, out);
                out.push('\n');
            }
            LeafKind::Style(style) => {
                let _ = write!(out, "{pad}{{{}", style.name);
                if !style.value.is_empty() {
                    let _ = write!(out, ":{}", style.value);
                }
                write_attributes(&style.attributes, out);
                out.push('\n');
                for &child in &style.children {
                    self.dump_leaf(child, depth + 1, out);
                }
            }
        }
    }
}

fn write_attributes(attributes: &Attributes, out: &mut String) {
    for (k, v) in attributes.iter() {
        if v.is_empty() {
            let _ = write!(out, " ;{k}");
        } else {
            let _ = write!(out, " ;{k}:{v}");
        }
    }
}
