//! Contact extraction from fetched HTML.
//!
//! The heuristics are deliberately simple. Everything downstream only sees
//! the [`Extractor`] trait, so a smarter implementation can be swapped in.

mod contact;
mod filters;
mod links;
mod metadata;

pub use contact::{extract_contact, PageContact};
pub use filters::{is_junk_source, is_valid_email, normalize_phone};
pub use links::{candidate_links, contact_links, resolve_href};
pub use metadata::{extract_metadata, HerdMetadata};

use std::sync::LazyLock;

use scraper::{Html, Node, Selector};
use thiserror::Error;
use url::Url;

use crate::models::ContactRecord;

pub(crate) static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Elements whose text is never visible content.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("empty document")]
    EmptyDocument,

    #[error("invalid source URL: {0}")]
    InvalidSourceUrl(String),
}

/// What one page yielded.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// One record per email found. `country` is left for the caller.
    pub contacts: Vec<ContactRecord>,
    /// Candidate farm pages linked from this page.
    pub discovered_urls: Vec<String>,
    /// Same-site contact or about pages.
    pub contact_links: Vec<String>,
}

/// Turns a page into contact records. Runs on a blocking thread.
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, source_url: &str) -> Result<Extraction, ExtractionError>;
}

/// Visible text of a document, whitespace-collapsed.
pub fn page_text(document: &Html) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element())
            .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()));
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    parts.join(" ")
}

/// Default extractor built on CSS selectors and regexes.
#[derive(Debug, Clone, Default)]
pub struct PageExtractor;

impl PageExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for PageExtractor {
    fn extract(&self, html: &str, source_url: &str) -> Result<Extraction, ExtractionError> {
        if html.trim().is_empty() {
            return Err(ExtractionError::EmptyDocument);
        }
        let base = Url::parse(source_url)
            .map_err(|e| ExtractionError::InvalidSourceUrl(format!("{}: {}", source_url, e)))?;

        let document = Html::parse_document(html);
        let text = page_text(&document);

        let page = extract_contact(&document, &text, source_url);
        let herd = extract_metadata(&text);

        let contacts = page
            .emails
            .iter()
            .map(|email| ContactRecord {
                email: email.clone(),
                farm_name: page.farm_name.clone(),
                owner_name: page.owner_name.clone(),
                phone: page.phones.first().cloned().unwrap_or_default(),
                address: page.address.clone(),
                city: page.city.clone(),
                state: page.state.clone(),
                zip_code: page.zip_code.clone(),
                country: String::new(),
                website: page.website.clone(),
                facebook: page.facebook.clone(),
                instagram: page.instagram.clone(),
                cattle_type: herd.cattle_type.clone(),
                breed: herd.breed.clone(),
                head_count: herd.head_count.clone(),
                source_url: source_url.to_string(),
            })
            .collect();

        Ok(Extraction {
            contacts,
            discovered_urls: candidate_links(&document, &base),
            contact_links: contact_links(&document, &base),
        })
    }
}
