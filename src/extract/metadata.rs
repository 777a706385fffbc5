//! Cattle-specific metadata detected in page text.

use std::sync::LazyLock;

use regex::Regex;

const BEEF_KEYWORDS: &[&str] = &[
    "beef",
    "cow-calf",
    "cow calf",
    "feeder cattle",
    "stocker",
    "feedlot",
    "slaughter",
    "meat",
    "steaks",
];

const DAIRY_KEYWORDS: &[&str] = &["dairy", "milk", "milking", "creamery"];

static BREED_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("Angus", r"\b(?:black\s+)?angus\b"),
        ("Red Angus", r"\bred\s+angus\b"),
        ("Hereford", r"\bhereford\b"),
        ("Charolais", r"\bcharolais\b"),
        ("Simmental", r"\bsimmental\b"),
        ("Limousin", r"\blimousin\b"),
        ("Brahman", r"\bbrahman\b"),
        ("Shorthorn", r"\bshorthorn\b"),
        ("Gelbvieh", r"\bgelbvieh\b"),
        ("Maine-Anjou", r"\bmaine[\s-]anjou\b"),
        ("Holstein", r"\bholstein\b"),
        ("Jersey", r"\bjersey\s+(?:cattle|cows?|dairy|milk)\b"),
        ("Guernsey", r"\bguernsey\b"),
        ("Brown Swiss", r"\bbrown\s+swiss\b"),
        ("Ayrshire", r"\bayrshire\b"),
        ("Longhorn", r"\blonghorn\b"),
        ("Highland", r"\bhighland\s+(?:cattle|cows?)\b"),
        ("Wagyu", r"\bwagyu\b"),
        ("Brangus", r"\bbrangus\b"),
        ("Beefmaster", r"\bbeefmaster\b"),
        ("Santa Gertrudis", r"\bsanta\s+gertrudis\b"),
        ("Corriente", r"\bcorriente\b"),
        ("Dexter", r"\bdexter\s+(?:cattle|cows?)\b"),
    ]
    .into_iter()
    .map(|(breed, pattern)| (breed, Regex::new(pattern).unwrap()))
    .collect()
});

static HEAD_COUNT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d[\d,]*)\s*head\b",
        r"herd\s+(?:of|size)?:?\s*(\d[\d,]*)",
        r"(\d[\d,]*)\s*(?:cattle|cows|calves|pairs|bulls)\b",
        r"(?:running|raise|raising|run)\s+(\d[\d,]*)\s*(?:head|cattle|cows)",
    ]
    .into_iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const MAX_HEAD_COUNT: u32 = 500_000;

/// Herd details found on a page. Empty strings mean not found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HerdMetadata {
    pub cattle_type: String,
    pub breed: String,
    pub head_count: String,
}

pub fn extract_metadata(text: &str) -> HerdMetadata {
    let text = text.to_lowercase();
    HerdMetadata {
        cattle_type: detect_cattle_type(&text).to_string(),
        breed: detect_breeds(&text),
        head_count: detect_head_count(&text),
    }
}

fn detect_cattle_type(text: &str) -> &'static str {
    let beef = BEEF_KEYWORDS.iter().any(|kw| text.contains(kw));
    let dairy = DAIRY_KEYWORDS.iter().any(|kw| text.contains(kw));
    match (beef, dairy) {
        (true, true) => "beef/dairy",
        (true, false) => "beef",
        (false, true) => "dairy",
        // A ranch that doesn't say otherwise is almost always beef
        _ if text.contains("cattle") || text.contains("ranch") => "beef",
        _ => "",
    }
}

fn detect_breeds(text: &str) -> String {
    BREED_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(breed, _)| *breed)
        .collect::<Vec<_>>()
        .join(", ")
}

fn detect_head_count(text: &str) -> String {
    for re in HEAD_COUNT_PATTERNS.iter() {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let digits = caps[1].replace(',', "");
        if let Ok(count) = digits.parse::<u32>() {
            if (1..=MAX_HEAD_COUNT).contains(&count) {
                return count.to_string();
            }
        }
    }
    String::new()
}
