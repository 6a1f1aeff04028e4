//! Link and metadata extraction from a rendered page.
//!
//! Project metadata lives in text nodes at fixed structural offsets below
//! each project anchor. Those offsets are expressed as [`FieldPath`]s so they
//! can be reconfigured when the upstream markup changes.

use std::fmt;
use std::str::FromStr;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Error parsing a [`FieldPath`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldPathError {
    #[error("field path is empty")]
    Empty,

    #[error("invalid step '{0}' (expected tag[index] with index >= 1)")]
    InvalidStep(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    tag: String,
    /// 1-based position among same-tag element children.
    index: usize,
}

/// Structural path from an anchor to a descendant element, in the form
/// `div[1]/div[2]/span[1]`: each step selects the n-th child element with
/// that tag name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    steps: Vec<Step>,
}

impl FromStr for FieldPath {
    type Err = FieldPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches("./");
        if s.is_empty() {
            return Err(FieldPathError::Empty);
        }

        let mut steps = Vec::new();
        for raw in s.split('/') {
            let invalid = || FieldPathError::InvalidStep(raw.to_string());
            let (tag, index) = match raw.split_once('[') {
                Some((tag, rest)) => {
                    let index = rest
                        .strip_suffix(']')
                        .and_then(|n| n.parse::<usize>().ok())
                        .ok_or_else(invalid)?;
                    (tag, index)
                }
                None => (raw, 1),
            };
            if tag.is_empty() || index == 0 || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(invalid());
            }
            steps.push(Step {
                tag: tag.to_ascii_lowercase(),
                index,
            });
        }
        Ok(Self { steps })
    }
}

impl TryFrom<String> for FieldPath {
    type Error = FieldPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}[{}]", step.tag, step.index)?;
        }
        Ok(())
    }
}

impl FieldPath {
    /// Build a path from `(tag, 1-based index)` steps. Index 0 is read as 1.
    pub fn new<'a>(steps: impl IntoIterator<Item = (&'a str, usize)>) -> Self {
        Self {
            steps: steps
                .into_iter()
                .map(|(tag, index)| Step {
                    tag: tag.to_ascii_lowercase(),
                    index: index.max(1),
                })
                .collect(),
        }
    }

    /// Trimmed text of the element this path points to below `root`.
    /// `None` when the element is missing or has no text.
    pub fn text_under(&self, root: ElementRef<'_>) -> Option<String> {
        let mut current = root;
        for step in &self.steps {
            current = current
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|el| el.value().name().eq_ignore_ascii_case(&step.tag))
                .nth(step.index - 1)?;
        }
        let text = current.text().collect::<String>();
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Which anchors to collect from a page, and which fields to read below each.
#[derive(Debug, Clone, Default)]
pub struct LinkQuery {
    /// The resolved href must contain this.
    pub href_contains: String,
    /// The resolved href must not contain this.
    pub href_excludes: Option<String>,
    /// Fields to extract below each matching anchor.
    pub fields: Vec<FieldPath>,
}

impl LinkQuery {
    pub fn new(href_contains: impl Into<String>) -> Self {
        Self {
            href_contains: href_contains.into(),
            ..Default::default()
        }
    }

    pub fn excluding(mut self, needle: impl Into<String>) -> Self {
        self.href_excludes = Some(needle.into());
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldPath>) -> Self {
        self.fields = fields;
        self
    }

    pub fn matches(&self, href: &str) -> bool {
        href.contains(&self.href_contains)
            && !self
                .href_excludes
                .as_deref()
                .is_some_and(|needle| href.contains(needle))
    }
}

/// An anchor that matched a [`LinkQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkElement {
    /// Absolute href.
    pub href: String,
    /// One entry per [`LinkQuery::fields`], `None` where the field was absent.
    pub fields: Vec<Option<String>>,
}

/// Collect anchors in `html` matching `query`, in document order.
/// Relative hrefs are resolved against `base_url`.
pub fn find_links(html: &str, base_url: &str, query: &LinkQuery) -> Vec<LinkElement> {
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let base = Url::parse(base_url).ok();
    let document = Html::parse_document(html);

    document
        .select(&anchors)
        .filter_map(|anchor| {
            let raw = anchor.value().attr("href")?;
            let href = resolve_href(base.as_ref(), raw);
            if !query.matches(&href) {
                return None;
            }
            let fields = query
                .fields
                .iter()
                .map(|path| path.text_under(anchor))
                .collect();
            Some(LinkElement { href, fields })
        })
        .collect()
}

fn resolve_href(base: Option<&Url>, raw: &str) -> String {
    match base.and_then(|b| b.join(raw).ok()) {
        Some(url) => url.to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <a href="/@ada/snake">
            <div><div>icon</div><div><div><span>4 weeks ago</span><span>1.2 MB</span></div></div></div>
          </a>
          <a href="https://replit.com/@ada/broken">
            <div><div>icon</div><div><div><span>yesterday</span></div></div></div>
          </a>
          <a href="/@ada?path=folder/games">games</a>
          <a href="/~">home</a>
        </body></html>
    "#;

    fn paths() -> Vec<FieldPath> {
        vec![
            "div[1]/div[2]/div[1]/span[1]".parse().unwrap(),
            "div[1]/div[2]/div[1]/span[2]".parse().unwrap(),
        ]
    }

    #[test]
    fn test_parse_field_path() {
        let path: FieldPath = "./div[1]/div[2]/span".parse().unwrap();
        assert_eq!(path.to_string(), "div[1]/div[2]/span[1]");

        assert_eq!("".parse::<FieldPath>(), Err(FieldPathError::Empty));
        assert!(matches!(
            "div[0]".parse::<FieldPath>(),
            Err(FieldPathError::InvalidStep(_))
        ));
        assert!(matches!(
            "div[x]/span".parse::<FieldPath>(),
            Err(FieldPathError::InvalidStep(_))
        ));
    }

    #[test]
    fn test_field_path_from_steps() {
        let path = FieldPath::new([("DIV", 1), ("span", 0)]);
        assert_eq!(path.to_string(), "div[1]/span[1]");
    }

    #[test]
    fn test_field_path_serde_as_string() {
        let path: FieldPath = serde_json::from_str("\"div[1]/span[2]\"").unwrap();
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"div[1]/span[2]\"");
        assert!(serde_json::from_str::<FieldPath>("\"span[0]\"").is_err());
    }

    #[test]
    fn test_project_links_with_fields() {
        let query = LinkQuery::new("/@ada/")
            .excluding("?path=")
            .with_fields(paths());
        let links = find_links(PAGE, "https://replit.com/@ada", &query);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].href, "https://replit.com/@ada/snake");
        assert_eq!(
            links[0].fields,
            vec![Some("4 weeks ago".to_string()), Some("1.2 MB".to_string())]
        );
        assert_eq!(links[1].fields, vec![Some("yesterday".to_string()), None]);
    }

    #[test]
    fn test_folder_links() {
        let query = LinkQuery::new("/@ada?path=folder");
        let links = find_links(PAGE, "https://replit.com/@ada", &query);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].href, "https://replit.com/@ada?path=folder/games");
        assert!(links[0].fields.is_empty());
    }
}
