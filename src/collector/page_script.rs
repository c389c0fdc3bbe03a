//! Page-side extraction script
//!
//! This is the code that runs inside a tab's page context. It answers an
//! `ExtractionRequest` with the posts it can find in the loaded document.
//! Post containers are located with an ordered list of strategies; the first
//! strategy that matches anything wins.

use crate::bus::{ExtractionRequest, ExtractionResponse};
use crate::model::{group_id_from_url, Comment, ExtractedRecord};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// The loaded page as seen from inside the tab
#[derive(Debug, Clone)]
pub struct PageDocument {
    pub url: String,
    pub html: String,
}

impl PageDocument {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

/// Script injected into each tab
pub trait PageScript: Send + Sync {
    fn run(&self, document: &PageDocument, request: &ExtractionRequest) -> ExtractionResponse;
}

/// Post container strategies, tried in order
pub const DEFAULT_CONTAINER_SELECTORS: &[&str] = &[r#"[data-pagelet^="FeedUnit_"]"#, r#"[role="article"]"#];

const POSTER_SELECTOR: &str = r#"a[role="link"][tabindex="0"]"#;
const TIMESTAMP_SELECTOR: &str = r#"a[href*="/permalink/"] span, a[href*="/posts/"] span"#;
const CONTENT_SELECTOR: &str = r#"[data-ad-preview="message"], [data-ad-comet-preview="message"]"#;
const COMMENT_SELECTOR: &str = r#"[aria-label="Comment"]"#;
const COMMENTER_SELECTOR: &str = r#"a[role="link"]"#;
const COMMENT_TEXT_SELECTOR: &str = r#"[data-ad-comet-preview="message"]"#;

const UNKNOWN_USER: &str = "Unknown User";
const UNKNOWN_ID: &str = "unknown";
const UNKNOWN: &str = "Unknown";

/// Best-effort HTML extraction of posts and comments
#[derive(Debug, Clone)]
pub struct HtmlPageScript {
    container_selectors: Vec<String>,
}

impl HtmlPageScript {
    pub fn new() -> Self {
        Self {
            container_selectors: DEFAULT_CONTAINER_SELECTORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Replaces the ordered container strategies
    pub fn with_container_selectors<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            container_selectors: selectors.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the post containers found by the first matching strategy
    fn find_posts<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        for css in &self.container_selectors {
            let Some(selector) = parse_selector(css) else {
                continue;
            };
            let posts: Vec<_> = document.select(&selector).collect();
            if !posts.is_empty() {
                tracing::debug!("Post strategy '{}' matched {} containers", css, posts.len());
                return posts;
            }
        }
        Vec::new()
    }
}

impl Default for HtmlPageScript {
    fn default() -> Self {
        Self::new()
    }
}

impl PageScript for HtmlPageScript {
    fn run(&self, document: &PageDocument, request: &ExtractionRequest) -> ExtractionResponse {
        let html = Html::parse_document(&document.html);
        let posts = self.find_posts(&html);

        if posts.is_empty() {
            return ExtractionResponse::failure(format!("No posts found on {}", document.url));
        }

        let target_id = Url::parse(&document.url)
            .ok()
            .and_then(|url| group_id_from_url(&url))
            .unwrap_or_default();

        let records = posts
            .into_iter()
            .take(request.items_per_target as usize)
            .map(|post| extract_post(post, &target_id, request.include_secondary))
            .collect();

        ExtractionResponse::success(records)
    }
}

fn extract_post(post: ElementRef<'_>, target_id: &str, include_secondary: bool) -> ExtractedRecord {
    let author = select_first(post, POSTER_SELECTOR);
    let poster_name = author
        .map(element_text)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_USER.to_string());
    let poster_id = author
        .and_then(|a| a.value().attr("href"))
        .and_then(id_from_href)
        .unwrap_or_else(|| UNKNOWN_ID.to_string());

    let stamp = select_first(post, TIMESTAMP_SELECTOR)
        .map(element_text)
        .unwrap_or_default();
    let (date, time) = split_timestamp(&stamp);

    let content = select_first(post, CONTENT_SELECTOR)
        .map(element_text)
        .unwrap_or_default();

    let comments = if include_secondary {
        extract_comments(post)
    } else {
        Vec::new()
    };

    ExtractedRecord {
        target_id: target_id.to_string(),
        poster_id,
        poster_name,
        date,
        time,
        content,
        comments,
    }
}

fn extract_comments(post: ElementRef<'_>) -> Vec<Comment> {
    let Some(selector) = parse_selector(COMMENT_SELECTOR) else {
        return Vec::new();
    };

    post.select(&selector)
        .filter_map(|comment| {
            let commenter = select_first(comment, COMMENTER_SELECTOR)?;
            let text = select_first(comment, COMMENT_TEXT_SELECTOR)?;
            Some(Comment {
                commenter_id: commenter
                    .value()
                    .attr("href")
                    .and_then(id_from_href)
                    .unwrap_or_else(|| UNKNOWN_ID.to_string()),
                commenter_name: element_text(commenter),
                text: element_text(text),
            })
        })
        .collect()
}

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::warn!("Skipping invalid selector '{}': {:?}", css, e);
            None
        }
    }
}

fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = parse_selector(css)?;
    scope.select(&selector).next()
}

/// Trimmed text content, inner whitespace collapsed
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Last non-empty path segment of a profile link, query string ignored
fn id_from_href(href: &str) -> Option<String> {
    href.split('?')
        .next()?
        .split('/')
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

/// Splits a post timestamp into `(date, time)`
///
/// "July 10 at 3:45 PM" splits on " at "; otherwise a clock reading such as
/// "2:30 PM" is cut out and the rest is the date. Anything else is unknown.
pub fn split_timestamp(stamp: &str) -> (String, String) {
    let stamp = stamp.trim();
    if stamp.is_empty() {
        return (UNKNOWN.to_string(), UNKNOWN.to_string());
    }

    if let Some((date, time)) = stamp.split_once(" at ") {
        return (date.trim().to_string(), time.trim().to_string());
    }

    if let Some((start, end)) = find_clock(stamp) {
        let time = stamp[start..end].to_string();
        let date = format!("{}{}", &stamp[..start], &stamp[end..]).trim().to_string();
        return (date, time);
    }

    (UNKNOWN.to_string(), UNKNOWN.to_string())
}

/// Byte span of the first `H:MM` reading, with an optional AM/PM suffix
fn find_clock(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let colon = bytes.iter().enumerate().position(|(i, &b)| {
        b == b':'
            && i > 0
            && bytes[i - 1].is_ascii_digit()
            && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)
    })?;

    let mut start = colon;
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }

    let mut end = colon + 1;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }

    let rest = &text[end..];
    let suffix = rest.strip_prefix(' ').unwrap_or(rest);
    if let Some(meridiem) = suffix.get(..2) {
        if meridiem.eq_ignore_ascii_case("AM") || meridiem.eq_ignore_ascii_case("PM") {
            end += rest.len() - suffix.len() + 2;
        }
    }

    Some((start, end))
}
