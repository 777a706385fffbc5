//! Contact records keyed by email.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contact as extracted from a page, before it reaches the store.
///
/// Every field except `email` may be empty. Empty means unknown and never
/// overwrites a stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub email: String,
    pub farm_name: String,
    pub owner_name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub website: String,
    pub facebook: String,
    pub instagram: String,
    pub cattle_type: String,
    pub breed: String,
    pub head_count: String,
    pub source_url: String,
}

impl ContactRecord {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }
}

/// A stored contact row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: i32,
    #[serde(flatten)]
    pub record: ContactRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Merged,
}

/// Normalize an email to its identity form: trimmed and lowercased.
///
/// Returns `None` when the result is not plausibly an address.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw
        .trim()
        .trim_start_matches("mailto:")
        .trim()
        .to_lowercase();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return None;
    }
    if email.chars().any(char::is_whitespace) {
        return None;
    }
    Some(email)
}

/// Column order used for CSV export.
pub const CSV_FIELDS: &[&str] = &[
    "farm_name",
    "owner_name",
    "email",
    "phone",
    "address",
    "city",
    "state",
    "zip_code",
    "country",
    "website",
    "facebook",
    "instagram",
    "cattle_type",
    "breed",
    "head_count",
    "source_url",
    "scraped_date",
];

impl Contact {
    /// Values in `CSV_FIELDS` order.
    pub fn csv_values(&self) -> Vec<String> {
        let r = &self.record;
        vec![
            r.farm_name.clone(),
            r.owner_name.clone(),
            r.email.clone(),
            r.phone.clone(),
            r.address.clone(),
            r.city.clone(),
            r.state.clone(),
            r.zip_code.clone(),
            r.country.clone(),
            r.website.clone(),
            r.facebook.clone(),
            r.instagram.clone(),
            r.cattle_type.clone(),
            r.breed.clone(),
            r.head_count.clone(),
            r.source_url.clone(),
            self.created_at.format("%Y-%m-%d").to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  A@Ranch.COM ").as_deref(),
            Some("a@ranch.com")
        );
        assert_eq!(
            normalize_email("mailto:Info@Farm.org").as_deref(),
            Some("info@farm.org")
        );
        assert!(normalize_email("no-at-sign").is_none());
        assert!(normalize_email("@ranch.com").is_none());
        assert!(normalize_email("a@localhost").is_none());
    }
}
