//! Rendered page markup and the anchor scanning shared by discovery and
//! enrichment.

use std::sync::LazyLock;

use regex::Regex;

static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#)
        .expect("valid anchor regex")
});

/// Fully rendered page content plus the URL it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markup {
    url: String,
    body: String,
}

impl Markup {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }

    /// URL the content was rendered from (base for relative links).
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// `href` values of every anchor, in document order.
    pub fn hrefs(&self) -> impl Iterator<Item = &str> {
        ANCHOR_HREF.captures_iter(&self.body).filter_map(|c| {
            c.get(1)
                .or_else(|| c.get(2))
                .or_else(|| c.get(3))
                .map(|m| m.as_str())
        })
    }
}
