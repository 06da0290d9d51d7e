//! Identity extraction from link targets.

use once_cell::sync::Lazy;
use regex::Regex;

static CARD_AUTHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"weibo\.com/(\d+)").expect("card author pattern is valid"));

static COMMENT_AUTHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/u/(\d+)").expect("comment author pattern is valid"));

/// Drop the query string and fragment.
#[must_use]
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Resource identity of a link: no scheme, query or fragment, so
/// `https://weibo.com/1/Ab?x=1` and `//weibo.com/1/Ab` compare equal.
#[must_use]
pub fn resource_identity(url: &str) -> &str {
    let url = strip_query(url);
    url.find("//").map_or(url, |start| &url[start..])
}

/// Numeric user id from a feed card's avatar link (`https://weibo.com/<id>?...`).
#[must_use]
pub fn card_author_id(href: &str) -> Option<String> {
    CARD_AUTHOR_RE
        .captures(href)
        .map(|caps| caps[1].to_string())
}

/// Numeric user id from a comment row's author link (`/u/<id>`).
#[must_use]
pub fn comment_author_id(href: &str) -> Option<String> {
    COMMENT_AUTHOR_RE
        .captures(href)
        .map(|caps| caps[1].to_string())
}
