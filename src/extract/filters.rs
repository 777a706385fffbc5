//! Junk filters and value normalizers.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::registrable_host;

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$").unwrap());

/// Government, education and state-agency mailboxes.
static INSTITUTIONAL_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(?:.*\.)?(?:gov|gov\.[a-z]+|edu|state\.[a-z]{2}\.us)$").unwrap()
});

/// Email domains that belong to platforms, trackers and media, never to farms.
const JUNK_EMAIL_DOMAINS: &[&str] = &[
    "example.com",
    "sentry.io",
    "wixpress.com",
    "googleapis.com",
    "w3.org",
    "schema.org",
    "facebook.com",
    "twitter.com",
    "instagram.com",
    "google.com",
    "googleusercontent.com",
    "gstatic.com",
    "cloudflare.com",
    "jquery.com",
    "wordpress.com",
    "wp.com",
    "gravatar.com",
    "bootstrapcdn.com",
    "squarespace.com",
    "shopify.com",
    "wix.com",
    "godaddy.com",
    "mailchimp.com",
    "constantcontact.com",
    "hubspot.com",
    "salesforce.com",
    "zendesk.com",
    "intercom.io",
    "typeform.com",
    "calendly.com",
    "nytimes.com",
    "washingtonpost.com",
    "cnn.com",
    "bbc.com",
    "bbc.co.uk",
    "reuters.com",
    "apnews.com",
    "usatoday.com",
    "denverpost.com",
    "westword.com",
    "yahoo.com",
    "msn.com",
];

/// Local parts used by systems and departments rather than people.
const JUNK_LOCAL_PARTS: &[&str] = &[
    "noreply",
    "no-reply",
    "donotreply",
    "webmaster",
    "postmaster",
    "mailer-daemon",
    "editor",
    "press",
    "marketing",
    "advertising",
    "hr",
    "careers",
    "jobs",
    "recruitment",
    "legal",
    "compliance",
    "privacy",
    "newsletter",
    "subscribe",
    "unsubscribe",
    "abuse",
    "spam",
    "security",
    "root",
    "admin",
    "administrator",
    "hostmaster",
    "billing",
    "accounts",
    "payments",
];

/// Image names that look like addresses (`logo@2x.png`).
const JUNK_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp"];

/// Sites that are never a cattle operation's own page.
const JUNK_SOURCE_DOMAINS: &[&str] = &[
    "denverpost.com",
    "westword.com",
    "nytimes.com",
    "washingtonpost.com",
    "cnn.com",
    "bbc.com",
    "bbc.co.uk",
    "reuters.com",
    "theguardian.com",
    "independent.co.uk",
    "telegraph.co.uk",
    "dailymail.co.uk",
    "abc.net.au",
    "smh.com.au",
    "stuff.co.nz",
    "nzherald.co.nz",
    "cbc.ca",
    "globalnews.ca",
    "ctvnews.ca",
    "usatoday.com",
    "apnews.com",
    "foxnews.com",
    "nbcnews.com",
    "reddit.com",
    "quora.com",
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "youtube.com",
    "linkedin.com",
    "tiktok.com",
    "pinterest.com",
    "tumblr.com",
    "medium.com",
    "wordpress.com",
    "blogspot.com",
    "blogger.com",
    "usda.gov",
    "epa.gov",
    "fda.gov",
    "irs.gov",
    "colorado.gov",
    "texas.gov",
    "nebraska.gov",
    "gov.uk",
    "gov.au",
    "govt.nz",
    "canada.ca",
    "craigslist.org",
    "ebay.com",
    "amazon.com",
    "walmart.com",
    "indeed.com",
    "glassdoor.com",
    "zillow.com",
    "realtor.com",
    "realestate.com.au",
    "trademe.co.nz",
    "rightmove.co.uk",
    "wikipedia.org",
    "wikimedia.org",
    "archive.org",
    "google.com",
    "duckduckgo.com",
];

/// Whether a normalized (lowercase) email is worth keeping as a contact.
pub fn is_valid_email(email: &str) -> bool {
    if !EMAIL_SHAPE.is_match(email) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if JUNK_EMAIL_DOMAINS.contains(&domain) {
        return false;
    }
    if JUNK_LOCAL_PARTS.contains(&local) {
        return false;
    }
    if JUNK_EXTENSIONS.iter().any(|ext| email.ends_with(ext)) {
        return false;
    }
    !INSTITUTIONAL_EMAIL.is_match(email)
}

/// Whether a URL points at a site that never hosts farm contacts.
///
/// Subdomains of a listed domain are junk too.
pub fn is_junk_source(url: &str) -> bool {
    let Some(host) = registrable_host(url) else {
        return true;
    };
    JUNK_SOURCE_DOMAINS
        .iter()
        .any(|junk| host == *junk || host.ends_with(&format!(".{}", junk)))
        || host.ends_with(".gov")
        || host.ends_with(".edu")
}

/// Normalize a North American number to `(xxx) xxx-xxxx`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let digits = match digits.strip_prefix('1') {
        Some(rest) if digits.len() == 11 => rest,
        _ => digits.as_str(),
    };
    if digits.len() != 10 {
        return None;
    }
    Some(format!(
        "({}) {}-{}",
        &digits[..3],
        &digits[3..6],
        &digits[6..]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("info@smithranch.com"));
        assert!(is_valid_email("jane.doe+cattle@angusfarm.co.nz"));
    }

    #[test]
    fn test_junk_emails() {
        assert!(!is_valid_email("noreply@smithranch.com"));
        assert!(!is_valid_email("admin@smithranch.com"));
        assert!(!is_valid_email("someone@example.com"));
        assert!(!is_valid_email("abc123@sentry.io"));
        assert!(!is_valid_email("logo@2x.png"));
        assert!(!is_valid_email("extension@ag.state.co.us"));
        assert!(!is_valid_email("agent@usda.gov"));
        assert!(!is_valid_email("prof@tamu.edu"));
        assert!(!is_valid_email("not-an-email"));
    }

    #[test]
    fn test_junk_sources() {
        assert!(is_junk_source("https://www.facebook.com/smithranch"));
        assert!(is_junk_source("https://en.wikipedia.org/wiki/Angus_cattle"));
        assert!(is_junk_source("https://extension.unl.edu/beef"));
        assert!(is_junk_source("https://www.ars.usda.gov/"));
        assert!(is_junk_source("not a url"));
        assert!(!is_junk_source("https://smithranch.com/contact"));
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(
            normalize_phone("402.555.0134").as_deref(),
            Some("(402) 555-0134")
        );
        assert_eq!(
            normalize_phone("+1 (402) 555-0134").as_deref(),
            Some("(402) 555-0134")
        );
        assert_eq!(
            normalize_phone("4025550134").as_deref(),
            Some("(402) 555-0134")
        );
        assert_eq!(normalize_phone("555-0134"), None);
        assert_eq!(normalize_phone("24025550134"), None);
    }
}
