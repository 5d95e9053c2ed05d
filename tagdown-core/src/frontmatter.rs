//! Front matter parsing.
//!
//! A document may start with a YAML block delimited by lines of three or
//! more dashes. The block is returned as an open map; interpreting its keys
//! is left to the caller.

use regex::bytes::Regex;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

/// Parsed front matter, keyed by the YAML map keys
pub type Frontmatter = BTreeMap<String, Value>;

#[derive(Error, Debug)]
pub enum FrontmatterError {
    #[error("Invalid YAML in front matter: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Front matter is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("Expected a YAML map in front matter")]
    NotAMap,
}

/// Byte offsets of a front matter block inside the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontmatterSpan {
    /// Range of the YAML text between the delimiters
    pub yaml_start: usize,
    pub yaml_end: usize,
    /// Where the document body starts
    pub body_start: usize,
}

static OPEN_REGEX: OnceLock<Regex> = OnceLock::new();
static CLOSE_REGEX: OnceLock<Regex> = OnceLock::new();

fn open_regex() -> &'static Regex {
    OPEN_REGEX.get_or_init(|| Regex::new(r"\A---+[ \t]*\r?\n").unwrap())
}

fn close_regex() -> &'static Regex {
    CLOSE_REGEX.get_or_init(|| Regex::new(r"(?m)^---+[ \t]*(?:\r?\n|\z)").unwrap())
}

/// Locate the front matter block at the start of `input`.
///
/// A block without closing delimiter extends to the end of the input.
pub fn split_frontmatter(input: &[u8]) -> Option<FrontmatterSpan> {
    let open = open_regex().find(input)?;
    let yaml_start = open.end();
    match close_regex().find_at(input, yaml_start) {
        Some(close) => Some(FrontmatterSpan {
            yaml_start,
            yaml_end: close.start(),
            body_start: close.end(),
        }),
        None => Some(FrontmatterSpan {
            yaml_start,
            yaml_end: input.len(),
            body_start: input.len(),
        }),
    }
}

/// Parse the front matter of `input`.
///
/// Returns the parsed map (or `None` when there is no block or the block is
/// empty) and the offset at which the body starts.
pub fn parse_frontmatter(input: &[u8]) -> Result<(Option<Frontmatter>, usize), FrontmatterError> {
    let Some(span) = split_frontmatter(input) else {
        return Ok((None, 0));
    };
    let yaml = std::str::from_utf8(&input[span.yaml_start..span.yaml_end])?;
    let value: Value = serde_yaml::from_str(yaml)?;
    let frontmatter = match value {
        Value::Null => None,
        Value::Mapping(map) => Some(
            map.into_iter()
                .map(|(k, v)| (key_to_string(k), v))
                .collect(),
        ),
        _ => return Err(FrontmatterError::NotAMap),
    };
    Ok((frontmatter, span.body_start))
}

fn key_to_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frontmatter_map() {
        let input = b"---\nTitle: Intro\ntags: [a, b]\n---\n#p body";
        let (fm, body) = parse_frontmatter(input).unwrap();
        let fm = fm.unwrap();
        assert_eq!(fm["Title"], Value::String("Intro".to_string()));
        assert_eq!(fm["tags"].as_sequence().map(|s| s.len()), Some(2));
        assert_eq!(&input[body..], b"#p body");
    }

    #[test]
    fn test_no_frontmatter() {
        let (fm, body) = parse_frontmatter(b"#p hello\n---\n").unwrap();
        assert!(fm.is_none());
        assert_eq!(body, 0);
    }

    #[test]
    fn test_longer_delimiters_and_crlf() {
        let input = b"-----\r\nk: 1\r\n------  \r\nrest";
        let (fm, body) = parse_frontmatter(input).unwrap();
        assert_eq!(fm.unwrap()["k"], Value::Number(1.into()));
        assert_eq!(&input[body..], b"rest");
    }

    #[test]
    fn test_empty_block_is_none() {
        let input = b"---\n---\ntext";
        let (fm, body) = parse_frontmatter(input).unwrap();
        assert!(fm.is_none());
        assert_eq!(&input[body..], b"text");
    }

    #[test]
    fn test_unterminated_block_runs_to_end() {
        let span = split_frontmatter(b"---\na: 1\n").unwrap();
        assert_eq!(span.yaml_start, 4);
        assert_eq!(span.body_start, 9);
    }

    #[test]
    fn test_non_map_is_an_error() {
        let result = parse_frontmatter(b"---\n- a\n- b\n---\n");
        assert!(matches!(result, Err(FrontmatterError::NotAMap)));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = parse_frontmatter(b"---\nkey: [unclosed\n---\n");
        assert!(matches!(result, Err(FrontmatterError::YamlError(_))));
    }
}
