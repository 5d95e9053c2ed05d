//! Shared types for tagdown
//!
//! This crate provides the small value types used across the tagdown
//! crates: arena identifiers for document nodes and leaves, source
//! positions, and diagnostic severities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a structural node in a document arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        NodeId(id)
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Index of an inline leaf (text, math, code, style, entity) in a document arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeafId(pub u32);

impl LeafId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for LeafId {
    fn from(id: u32) -> Self {
        LeafId(id)
    }
}

impl From<LeafId> for u32 {
    fn from(id: LeafId) -> Self {
        id.0
    }
}

/// Position of a token in the scanned input.
///
/// `line` is 1-based, `column` is the 0-based byte column inside the line,
/// and `start..end` is the byte range in the whole input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ScanRange {
    pub line: usize,
    pub column: usize,
    pub start: usize,
    pub end: usize,
}

impl ScanRange {
    pub fn new(line: usize, column: usize, start: usize, end: usize) -> Self {
        Self {
            line,
            column,
            start,
            end,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ScanRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Info => f.write_str("info"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_round_trip_through_u32() {
        let node = NodeId::from(7);
        assert_eq!(u32::from(node), 7);
        assert_eq!(node.index(), 7);

        let leaf = LeafId::new(3);
        assert_eq!(leaf.index(), 3);
    }

    #[test]
    fn test_range_display() {
        let range = ScanRange::new(4, 2, 30, 35);
        assert_eq!(range.to_string(), "4:2");
        assert_eq!(range.len(), 5);
        assert!(!range.is_empty());
    }
}
