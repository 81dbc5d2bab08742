//! Link extraction from listing pages.

use std::collections::HashSet;

use lol_html::{HtmlRewriter, Settings, element};
use tracing::debug;
use url::Url;

/// Marker path under which the court publishes judgment files.
const UPLOADS_MARKER: &str = "/uploads/";

/// Links found on one page, split into downloadable documents and pages to crawl.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct PageLinks {
    pub documents: Vec<String>,
    pub pages: Vec<String>,
}

/// Extracts absolute links from `html` relative to `base`.
///
/// A link is a document when its path ends with one of `extensions` or it
/// sits under `/uploads/`. Other links become crawl candidates only when
/// they stay on the base host. Fragments are dropped.
pub(crate) fn extract_links(html: &str, base: &Url, extensions: &[String]) -> PageLinks {
    let mut seen = HashSet::new();
    let mut links = PageLinks::default();

    for href in collect_hrefs(html) {
        let href = href.trim().replace("&amp;", "&");
        if href.is_empty() || href.starts_with('#') || has_ignored_scheme(&href) {
            continue;
        }

        let Ok(mut resolved) = base.join(&href) else {
            debug!(href, "skipping unresolvable link");
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        resolved.set_fragment(None);

        let absolute = resolved.to_string();
        if !seen.insert(absolute.clone()) {
            continue;
        }

        if is_document_link(&resolved, extensions) {
            links.documents.push(absolute);
        } else if resolved.host_str() == base.host_str() {
            links.pages.push(absolute);
        }
    }

    links
}

/// Raw `href` values of every anchor, in document order.
fn collect_hrefs(html: &str) -> Vec<String> {
    let mut hrefs = Vec::new();
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("a[href]", |el| {
                if let Some(href) = el.get_attribute("href") {
                    hrefs.push(href);
                }
                Ok(())
            })],
            ..Settings::default()
        },
        |_: &[u8]| {},
    );

    let result = rewriter
        .write(html.as_bytes())
        .and_then(|()| rewriter.end());
    if let Err(error) = result {
        debug!(error = %error, "HTML parse stopped early");
    }
    hrefs
}

fn has_ignored_scheme(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    ["mailto:", "javascript:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// True when `url` points at a downloadable document.
pub(crate) fn is_document_link(url: &Url, extensions: &[String]) -> bool {
    let path = url.path().to_ascii_lowercase();
    if path.contains(UPLOADS_MARKER) {
        return true;
    }
    extensions.iter().any(|ext| {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        !ext.is_empty() && path.ends_with(&format!(".{ext}"))
    })
}
