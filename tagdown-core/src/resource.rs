//! Resources (scripts, stylesheets, media) required by tag definitions.
//!
//! Definitions declare the resources their templates need. Each resource URL
//! found in a definition is handed to a [`ResourceResolver`] supplied by the
//! caller, which may fill in source/destination paths and rewrite the URL.

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Malformed URL {url:?}: {source}")]
    MalformedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unresolved resource {url:?}: {message}")]
    Unresolved { url: String, message: String },
}

/// What a resource is used for by the generated HTML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Style,
    Script,
    /// Images, video and anything else referenced from a template
    Unknown,
}

/// A script, stylesheet or other file required by generated HTML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceKind,
    /// The URL as written in the definition, or as rewritten by a resolver
    pub url: String,
    pub source_path: Option<PathBuf>,
    pub dest_path: Option<PathBuf>,
    /// Set once a resolver has filled in the paths
    pub resolved: bool,
}

impl Resource {
    /// Create an unresolved resource, rejecting URLs that cannot be parsed
    pub fn new(kind: ResourceKind, url: impl Into<String>) -> Result<Self, ResourceError> {
        let url = url.into();
        check_url(&url)?;
        Ok(Self {
            kind,
            url,
            source_path: None,
            dest_path: None,
            resolved: false,
        })
    }

    pub fn style(url: impl Into<String>) -> Result<Self, ResourceError> {
        Self::new(ResourceKind::Style, url)
    }

    pub fn script(url: impl Into<String>) -> Result<Self, ResourceError> {
        Self::new(ResourceKind::Script, url)
    }

    pub fn unknown(url: impl Into<String>) -> Result<Self, ResourceError> {
        Self::new(ResourceKind::Unknown, url)
    }

    /// True when the URL carries a scheme, e.g. `https://...`
    pub fn is_absolute(&self) -> bool {
        is_absolute_url(&self.url)
    }

    /// The HTML element that links this resource into a page
    pub fn html_link(&self) -> String {
        match self.kind {
            ResourceKind::Style => format!(
                "<link rel=\"stylesheet\" href=\"{}\" type=\"text/css\">\n",
                self.url
            ),
            ResourceKind::Script => format!(
                "<script type=\"text/javascript\" src=\"{}\"></script>\n",
                self.url
            ),
            ResourceKind::Unknown => String::new(),
        }
    }

    /// Key used to deduplicate resources across documents
    pub fn unique_id(&self) -> String {
        match &self.dest_path {
            Some(dest) if !self.is_absolute() => dest.to_string_lossy().into_owned(),
            _ => self.url.clone(),
        }
    }
}

/// Resolves resources in place: fills in paths and may rewrite the URL.
pub trait ResourceResolver {
    fn resolve(&mut self, resource: &mut Resource) -> Result<(), ResourceError>;
}

impl<F> ResourceResolver for F
where
    F: FnMut(&mut Resource) -> Result<(), ResourceError>,
{
    fn resolve(&mut self, resource: &mut Resource) -> Result<(), ResourceError> {
        self(resource)
    }
}

/// Resolver that marks every resource resolved without touching it
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl ResourceResolver for PassThrough {
    fn resolve(&mut self, resource: &mut Resource) -> Result<(), ResourceError> {
        resource.resolved = true;
        Ok(())
    }
}

fn is_absolute_url(url: &str) -> bool {
    Url::parse(url).is_ok()
}

fn check_url(url: &str) -> Result<(), ResourceError> {
    match Url::parse(url) {
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => Ok(()),
        Err(source) => Err(ResourceError::MalformedUrl {
            url: url.to_string(),
            source,
        }),
    }
}

static SRC_REGEX: OnceLock<Regex> = OnceLock::new();

fn src_regex() -> &'static Regex {
    SRC_REGEX.get_or_init(|| Regex::new(r#"\ssrc\s*=\s*"[^"{}]*""#).unwrap())
}

/// Find relative `src="..."` URLs in an HTML template, resolve each one and
/// rewrite the template with the resolved URLs.
///
/// Absolute URLs and URLs containing template braces are left untouched.
pub fn extract_html_resources<R>(
    html: &str,
    resolver: &mut R,
) -> Result<(String, Vec<Resource>), ResourceError>
where
    R: ResourceResolver + ?Sized,
{
    let mut resources = Vec::new();
    let mut rewritten = String::with_capacity(html.len());
    let mut pos = 0;

    for m in src_regex().find_iter(html) {
        // the match always ends with a quote and contains the opening one
        let Some(quote) = m.as_str().find('"') else {
            continue;
        };
        let value_start = m.start() + quote + 1;
        let value_end = m.end() - 1;
        let url = html_unescape(&html[value_start..value_end]);
        if is_absolute_url(&url) {
            continue;
        }

        let mut resource = Resource::unknown(url)?;
        resolver.resolve(&mut resource)?;

        rewritten.push_str(&html[pos..value_start]);
        rewritten.push_str(&html_escape(&resource.url));
        pos = value_end;
        resources.push(resource);
    }

    rewritten.push_str(&html[pos..]);
    Ok((rewritten, resources))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&#34;")
        .replace('\'', "&#39;")
}

fn html_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#34;", "\"")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix_resolver(resource: &mut Resource) -> Result<(), ResourceError> {
        resource.url = format!("/static/{}", resource.url);
        resource.dest_path = Some(PathBuf::from(&resource.url));
        resource.resolved = true;
        Ok(())
    }

    #[test]
    fn test_html_link() {
        let css = Resource::style("theme.css").unwrap();
        assert_eq!(
            css.html_link(),
            "<link rel=\"stylesheet\" href=\"theme.css\" type=\"text/css\">\n"
        );

        let js = Resource::script("https://cdn.example.org/lib.js").unwrap();
        assert!(js.html_link().contains("src=\"https://cdn.example.org/lib.js\""));

        let img = Resource::unknown("logo.png").unwrap();
        assert_eq!(img.html_link(), "");
    }

    #[test]
    fn test_unique_id_prefers_dest_path_for_relative_urls() {
        let mut res = Resource::unknown("img/a.png").unwrap();
        assert_eq!(res.unique_id(), "img/a.png");

        res.dest_path = Some(PathBuf::from("out/img/a.png"));
        assert_eq!(res.unique_id(), "out/img/a.png");

        let mut abs = Resource::unknown("https://example.org/a.png").unwrap();
        abs.dest_path = Some(PathBuf::from("ignored"));
        assert_eq!(abs.unique_id(), "https://example.org/a.png");
    }

    #[test]
    fn test_malformed_url_is_rejected() {
        assert!(matches!(
            Resource::script("http://[::1"),
            Err(ResourceError::MalformedUrl { .. })
        ));
    }

    #[test]
    fn test_extract_rewrites_relative_src() {
        let html = r#"<img src="a.png"><img src = "https://x.org/b.png"><img src="{{.URL}}">"#;
        let (out, resources) = extract_html_resources(html, &mut prefix_resolver).unwrap();

        assert_eq!(
            out,
            r#"<img src="/static/a.png"><img src = "https://x.org/b.png"><img src="{{.URL}}">"#
        );
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].kind, ResourceKind::Unknown);
        assert!(resources[0].resolved);
    }

    #[test]
    fn test_extract_without_matches_returns_input() {
        let (out, resources) = extract_html_resources("<p>{{.Content}}</p>", &mut PassThrough).unwrap();
        assert_eq!(out, "<p>{{.Content}}</p>");
        assert!(resources.is_empty());
    }

    #[test]
    fn test_resolver_failure_propagates() {
        let mut failing = |res: &mut Resource| -> Result<(), ResourceError> {
            Err(ResourceError::Unresolved {
                url: res.url.clone(),
                message: "not found".to_string(),
            })
        };
        let result = extract_html_resources(r#"<img src="gone.png">"#, &mut failing);
        assert!(matches!(result, Err(ResourceError::Unresolved { .. })));
    }
}
