//! Page-level contact details: emails, phones, address, names, socials.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use super::filters::{is_valid_email, normalize_phone};
use super::LINK_SELECTOR;
use crate::models::normalize_email;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}").unwrap());

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap()
});

static ZIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{5}(?:-\d{4})?\b").unwrap());

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d{1,6}\s+(?:[NSEW]\.?\s+)?\w+(?:\s+\w+){0,4}\s+(?:Street|St|Avenue|Ave|Road|Rd|Drive|Dr|Lane|Ln|Boulevard|Blvd|Way|Court|Ct|Highway|Hwy|Route|Rt|County\s+Road|CR|Farm\s+Road|FM)\b\.?",
    )
    .unwrap()
});

const STATE_ABBREVS: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA", "KS",
    "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ", "NM", "NY",
    "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA", "WV",
    "WI", "WY",
];

const STATE_NAMES: &[&str] = &[
    "Alabama", "Alaska", "Arizona", "Arkansas", "California", "Colorado", "Connecticut",
    "Delaware", "Florida", "Georgia", "Hawaii", "Idaho", "Illinois", "Indiana", "Iowa", "Kansas",
    "Kentucky", "Louisiana", "Maine", "Maryland", "Massachusetts", "Michigan", "Minnesota",
    "Mississippi", "Missouri", "Montana", "Nebraska", "Nevada", "New Hampshire", "New Jersey",
    "New Mexico", "New York", "North Carolina", "North Dakota", "Ohio", "Oklahoma", "Oregon",
    "Pennsylvania", "Rhode Island", "South Carolina", "South Dakota", "Tennessee", "Texas", "Utah",
    "Vermont", "Virginia", "Washington", "West Virginia", "Wisconsin", "Wyoming",
];

/// A two-letter state directly before a ZIP code.
static STATE_ZIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b({})\s*\d{{5}}\b", STATE_ABBREVS.join("|"))).unwrap()
});

/// Trailing " - Texas" or " | TX" on a page title.
static TITLE_STATE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<&str> = STATE_ABBREVS.iter().chain(STATE_NAMES).copied().collect();
    Regex::new(&format!(
        r"(?i)\s*[-–|]\s*(?:{})\s*$",
        alternatives.join("|")
    ))
    .unwrap()
});

const TITLE_SUFFIXES: &[&str] = &[
    " - Home", " | Home", " – Home", " - Contact", " | Contact", " – Contact", " - About",
    " | About", " – About",
];

static OWNER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i:owned\s+(?:and\s+)?operated\s+by|owners?:?|contacts?:|manager:?|proprietor:?)\s*([A-Z][a-z]+\s+(?:[A-Z]\.?\s+)?[A-Z][a-z]+)",
        r"(?i:family[\s-]+owned|run\s+by|managed\s+by)\s+(?:by\s+)?([A-Z][a-z]+\s+(?:[A-Z]\.?\s+)?[A-Z][a-z]+)",
    ]
    .into_iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static JSON_LD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static H1_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static SITE_NAME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:site_name"]"#).unwrap());
static OG_URL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:url"]"#).unwrap());
static CANONICAL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"link[rel="canonical"]"#).unwrap());

const BUSINESS_TYPES: &[&str] = &["LocalBusiness", "Farm", "Organization", "AnimalShelter", "Store"];

const MAX_NAME_LEN: usize = 100;

/// Contact details shared by every email found on one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContact {
    pub farm_name: String,
    pub owner_name: String,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub website: String,
    pub facebook: String,
    pub instagram: String,
}

impl PageContact {
    fn add_email(&mut self, raw: &str) {
        let Some(email) = normalize_email(raw.split('?').next().unwrap_or(raw)) else {
            return;
        };
        if is_valid_email(&email) && !self.emails.contains(&email) {
            self.emails.push(email);
        }
    }

    fn add_phone(&mut self, raw: &str) {
        if let Some(phone) = normalize_phone(raw) {
            if !self.phones.contains(&phone) {
                self.phones.push(phone);
            }
        }
    }
}

fn set_if_empty(field: &mut String, value: Option<&str>) {
    if field.is_empty() {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            *field = v.to_string();
        }
    }
}

/// Extract contact details from a parsed page and its visible text.
pub fn extract_contact(document: &Html, text: &str, source_url: &str) -> PageContact {
    let mut contact = PageContact::default();

    for anchor in document.select(&LINK_SELECTOR) {
        let Some(href) = anchor.value().attr("href").map(str::trim_start) else {
            continue;
        };
        if href
            .get(..7)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("mailto:"))
        {
            contact.add_email(&href[7..]);
        }
    }

    structured_data(document, &mut contact);

    for m in EMAIL_RE.find_iter(text) {
        contact.add_email(m.as_str());
    }
    for m in PHONE_RE.find_iter(text) {
        contact.add_phone(m.as_str());
    }

    address(text, &mut contact);
    social_links(document, &mut contact);
    farm_name(document, &mut contact);
    owner_name(text, &mut contact);
    website(document, source_url, &mut contact);

    contact
}

fn structured_data(document: &Html, contact: &mut PageContact) {
    for script in document.select(&JSON_LD_SELECTOR) {
        let raw = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        for item in schema_items(&value) {
            schema_item(item, contact);
        }
    }
}

/// Flatten top-level arrays and `@graph` containers into their items.
fn schema_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().flat_map(schema_items).collect(),
        Value::Object(map) => match map.get("@graph") {
            Some(graph) => schema_items(graph),
            None => vec![value],
        },
        _ => Vec::new(),
    }
}

fn is_business(item: &Value) -> bool {
    match item.get("@type") {
        Some(Value::String(t)) => BUSINESS_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| BUSINESS_TYPES.contains(&t)),
        _ => false,
    }
}

fn schema_item(item: &Value, contact: &mut PageContact) {
    if !is_business(item) {
        return;
    }
    let field = |key: &str| item.get(key).and_then(Value::as_str);

    set_if_empty(&mut contact.farm_name, field("name"));
    if let Some(email) = field("email") {
        contact.add_email(email);
    }
    if let Some(phone) = field("telephone") {
        contact.add_phone(phone);
    }
    if let Some(address) = item.get("address").filter(|a| a.is_object()) {
        let part = |key: &str| address.get(key).and_then(Value::as_str);
        set_if_empty(&mut contact.address, part("streetAddress"));
        set_if_empty(&mut contact.city, part("addressLocality"));
        set_if_empty(&mut contact.state, part("addressRegion"));
        set_if_empty(&mut contact.zip_code, part("postalCode"));
    }
    set_if_empty(&mut contact.website, field("url"));
}

fn address(text: &str, contact: &mut PageContact) {
    if contact.address.is_empty() {
        set_if_empty(&mut contact.address, ADDRESS_RE.find(text).map(|m| m.as_str()));
    }
    if contact.zip_code.is_empty() {
        set_if_empty(&mut contact.zip_code, ZIP_RE.find(text).map(|m| m.as_str()));
    }
    if contact.state.is_empty() {
        let state = STATE_ZIP_RE
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str());
        set_if_empty(&mut contact.state, state);
    }
}

fn social_links(document: &Html, contact: &mut PageContact) {
    for anchor in document.select(&LINK_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let lower = href.to_ascii_lowercase();
        if lower.contains("facebook.com/") {
            set_if_empty(&mut contact.facebook, Some(href));
        } else if lower.contains("instagram.com/") {
            set_if_empty(&mut contact.instagram, Some(href));
        }
    }
}

/// Page title without "- Home" style suffixes or a trailing state.
fn clean_title(title: &str) -> String {
    let mut name = title.trim();
    for suffix in TITLE_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped;
        }
    }
    TITLE_STATE_SUFFIX.replace(name, "").trim().to_string()
}

fn short(value: String) -> Option<String> {
    (!value.is_empty() && value.chars().count() < MAX_NAME_LEN).then_some(value)
}

fn farm_name(document: &Html, contact: &mut PageContact) {
    if !contact.farm_name.is_empty() {
        return;
    }
    let from_title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|t| clean_title(&t.text().collect::<String>()))
        .and_then(short);
    let from_site_name = || {
        document
            .select(&SITE_NAME_SELECTOR)
            .next()
            .and_then(|m| m.value().attr("content"))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
    };
    let from_h1 = || {
        document
            .select(&H1_SELECTOR)
            .next()
            .map(|h| h.text().collect::<String>().trim().to_string())
            .and_then(short)
    };

    if let Some(name) = from_title.or_else(from_site_name).or_else(from_h1) {
        contact.farm_name = name;
    }
}

fn owner_name(text: &str, contact: &mut PageContact) {
    if !contact.owner_name.is_empty() {
        return;
    }
    for re in OWNER_PATTERNS.iter() {
        if let Some(m) = re.captures(text).and_then(|c| c.get(1)) {
            contact.owner_name = m.as_str().trim().to_string();
            return;
        }
    }
}

fn website(document: &Html, source_url: &str, contact: &mut PageContact) {
    if !contact.website.is_empty() {
        return;
    }
    let og = document
        .select(&OG_URL_SELECTOR)
        .next()
        .and_then(|m| m.value().attr("content"));
    let canonical = || {
        document
            .select(&CANONICAL_SELECTOR)
            .next()
            .and_then(|l| l.value().attr("href"))
    };
    set_if_empty(
        &mut contact.website,
        og.or_else(canonical).or(Some(source_url)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::page_text;

    fn extract(html: &str) -> PageContact {
        let document = Html::parse_document(html);
        let text = page_text(&document);
        extract_contact(&document, &text, "https://sandcreekranch.com/contact")
    }

    #[test]
    fn test_mailto_before_text_and_junk_filtered() {
        let contact = extract(
            r#"<html><body>
            <p>Write to sales@sandcreekranch.com or noreply@sandcreekranch.com</p>
            <a href="mailto:Info@SandCreekRanch.com?subject=Bulls">Email us</a>
            </body></html>"#,
        );
        assert_eq!(
            contact.emails,
            vec![
                "info@sandcreekranch.com".to_string(),
                "sales@sandcreekranch.com".to_string(),
            ]
        );
    }

    #[test]
    fn test_json_ld_business() {
        let contact = extract(
            r#"<html><head><script type="application/ld+json">
            {"@context":"https://schema.org","@graph":[{"@type":"WebSite","name":"Ignored"},
             {"@type":["LocalBusiness","Farm"],"name":"Sand Creek Ranch",
              "email":"mailto:office@sandcreekranch.com","telephone":"+1-402-555-0134",
              "address":{"streetAddress":"4410 County Road 12","addressLocality":"Valentine",
                         "addressRegion":"NE","postalCode":"69201"},
              "url":"https://sandcreekranch.com"}]}
            </script><title>Something else</title></head><body></body></html>"#,
        );
        assert_eq!(contact.farm_name, "Sand Creek Ranch");
        assert_eq!(contact.emails, vec!["office@sandcreekranch.com".to_string()]);
        assert_eq!(contact.phones, vec!["(402) 555-0134".to_string()]);
        assert_eq!(contact.address, "4410 County Road 12");
        assert_eq!(contact.city, "Valentine");
        assert_eq!(contact.state, "NE");
        assert_eq!(contact.zip_code, "69201");
        assert_eq!(contact.website, "https://sandcreekranch.com");
    }

    #[test]
    fn test_text_heuristics() {
        let contact = extract(
            r#"<html><head><title>Miller Angus - Nebraska</title></head><body>
            <p>Owned and operated by Dale Miller since 1978.</p>
            <p>Call 402.555.0199 or (308) 555-0142.</p>
            <p>Find us at 1200 Ridge Road, Broken Bow, NE 68822</p>
            <a href="https://www.facebook.com/milleragnus">Facebook</a>
            <a href="https://instagram.com/milleragnus">Instagram</a>
            </body></html>"#,
        );
        assert_eq!(contact.farm_name, "Miller Angus");
        assert_eq!(contact.owner_name, "Dale Miller");
        assert_eq!(
            contact.phones,
            vec!["(402) 555-0199".to_string(), "(308) 555-0142".to_string()]
        );
        assert!(contact.address.starts_with("1200 Ridge Road"));
        assert_eq!(contact.state, "NE");
        assert_eq!(contact.zip_code, "68822");
        assert_eq!(contact.facebook, "https://www.facebook.com/milleragnus");
        assert_eq!(contact.instagram, "https://instagram.com/milleragnus");
        assert_eq!(contact.website, "https://sandcreekranch.com/contact");
    }

    #[test]
    fn test_farm_name_fallbacks() {
        assert_eq!(clean_title("Double J Cattle | Home"), "Double J Cattle");
        assert_eq!(clean_title("Rocking R Ranch – TX"), "Rocking R Ranch");

        let contact = extract(
            r#"<html><head><meta property="og:site_name" content="Hill Top Herefords">
            <meta property="og:url" content="https://hilltopherefords.com/"></head>
            <body><h1>Welcome</h1></body></html>"#,
        );
        assert_eq!(contact.farm_name, "Hill Top Herefords");
        assert_eq!(contact.website, "https://hilltopherefords.com/");

        let contact = extract("<html><body><h1>Bar K Beef</h1></body></html>");
        assert_eq!(contact.farm_name, "Bar K Beef");
    }
}
