//! Link discovery: contact pages on the same site and outbound candidates.

use std::collections::HashSet;

use scraper::Html;
use url::Url;

use super::filters::is_junk_source;
use super::LINK_SELECTOR;
use crate::models::registrable_host;

const CONTACT_TEXT: &[&str] = &["contact", "get in touch", "reach us", "email us"];
const CONTACT_PATHS: &[&str] = &["/contact", "/about", "/reach-us"];

/// Path keywords of member and breeder profiles on association sites.
const PROFILE_PATHS: &[&str] = &["breeder", "ranch", "farm", "member", "profile", "detail"];

const MAX_CONTACT_LINKS: usize = 3;
const MAX_DISCOVERED_LINKS: usize = 200;

/// Resolve an anchor href against the page URL. Fragments, `javascript:`,
/// `mailto:` and `tel:` links yield `None`.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
    {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Same-site links that look like a contact or about page.
pub fn contact_links(document: &Html, base: &Url) -> Vec<String> {
    let Some(site) = registrable_host(base.as_str()) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&LINK_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let text = anchor.text().collect::<String>().to_lowercase();
        let href_lower = href.to_ascii_lowercase();
        let looks_like_contact = CONTACT_TEXT.iter().any(|kw| text.contains(kw))
            || CONTACT_PATHS.iter().any(|kw| href_lower.contains(kw));
        if !looks_like_contact {
            continue;
        }

        let Some(url) = resolve_href(base, href) else {
            continue;
        };
        if url == *base || registrable_host(url.as_str()).as_deref() != Some(site.as_str()) {
            continue;
        }
        if seen.insert(url.to_string()) {
            links.push(url.to_string());
            if links.len() >= MAX_CONTACT_LINKS {
                break;
            }
        }
    }
    links
}

/// Candidate farm pages linked from a listing page: outbound links to other
/// sites plus same-site member or breeder profiles.
pub fn candidate_links(document: &Html, base: &Url) -> Vec<String> {
    let site = registrable_host(base.as_str());
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&LINK_SELECTOR) {
        let Some(url) = anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_href(base, href))
        else {
            continue;
        };
        let url_str = url.to_string();
        if is_junk_source(&url_str) {
            continue;
        }

        let same_site = registrable_host(&url_str) == site;
        if same_site {
            let path = url.path().to_ascii_lowercase();
            if url == *base || !PROFILE_PATHS.iter().any(|kw| path.contains(kw)) {
                continue;
            }
        }

        if seen.insert(url_str.clone()) {
            links.push(url_str);
            if links.len() >= MAX_DISCOVERED_LINKS {
                break;
            }
        }
    }
    links
}
