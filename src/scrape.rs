//! Web-page ingestion: fetch a URL, extract the visible text, and cap the
//! result. Chrome-lookalike UA because plenty of sites refuse unknown
//! clients outright.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

use crate::error::{AppError, AppResult};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_TEXT_LEN: usize = 4000;
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

// Chrome-less extraction: drop whole non-content blocks first, then any
// remaining tags, then decode the handful of entities that matter for prose.
static DROP_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|nav|footer)\b.*?</(script|style|nav|footer)\s*>").expect("static regex")
});
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

pub fn extract_text(html: &str) -> String {
    let without_blocks = DROP_BLOCKS.replace_all(html, " ");
    let without_tags = TAGS.replace_all(&without_blocks, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let lines: Vec<String> = decoded
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect();
    let mut text = lines.join("\n");
    if text.chars().count() > MAX_TEXT_LEN {
        text = text.chars().take(MAX_TEXT_LEN).collect();
    }
    text
}

/// Download a page and return its visible text. An unreadable URL surfaces
/// as `Upstream`; a page with no visible text at all as `NotFound`.
pub async fn scrape_website(url: &str) -> AppResult<String> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AppError::internal("http_client_init", e.to_string()))?;
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::upstream("scrape_failed", format!("could not read url: {e}")))?
        .error_for_status()
        .map_err(|e| AppError::upstream("scrape_failed", format!("could not read url: {e}")))?;
    let html = resp
        .text()
        .await
        .map_err(|e| AppError::upstream("scrape_failed", format!("could not read url: {e}")))?;
    let text = extract_text(&html);
    if text.is_empty() {
        return Err(AppError::not_found("empty_page", "page has no extractable text"));
    }
    Ok(text)
}
