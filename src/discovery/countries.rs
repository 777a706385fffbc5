//! Per-country crawl profiles: regions, search vocabulary and listing sites.

use url::form_urlencoded::byte_serialize;

/// A yellow-pages style directory searched by term and region.
#[derive(Debug)]
pub struct DirectorySite {
    pub name: &'static str,
    pub base_url: &'static str,
    /// Path with `{term}`, `{region}` and `{page}` placeholders.
    pub path_template: &'static str,
    pub terms: &'static [&'static str],
    pub pages: u32,
}

impl DirectorySite {
    /// Listing URL for one term, region and 1-based page.
    pub fn listing_url(&self, term: &str, region: &str, page: u32) -> String {
        let encode = |s: &str| byte_serialize(s.as_bytes()).collect::<String>();
        let path = self
            .path_template
            .replace("{term}", &encode(term))
            .replace("{region}", &encode(region))
            .replace("{page}", &page.to_string());
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Debug)]
pub struct CountryProfile {
    pub code: &'static str,
    pub name: &'static str,
    pub regions: &'static [&'static str],
    /// Regions with the most cattle, used when a job names none.
    pub top_regions: &'static [&'static str],
    /// Postal abbreviations mapped to canonical region names.
    pub abbreviations: &'static [(&'static str, &'static str)],
    pub search_terms: &'static [&'static str],
    /// Query templates with `{term}`, `{region}` and `{breed}` placeholders.
    pub search_templates: &'static [&'static str],
    pub breeds: &'static [&'static str],
    pub directories: &'static [DirectorySite],
    /// Breed association breeder finders, by association name.
    pub breed_associations: &'static [(&'static str, &'static str)],
    /// Regional cattlemen's association sites, by region.
    pub regional_associations: &'static [(&'static str, &'static str)],
}

impl CountryProfile {
    /// Canonical region name for a name or abbreviation, case-insensitive.
    pub fn canonical_region(&self, raw: &str) -> Option<&'static str> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        self.regions
            .iter()
            .find(|r| r.eq_ignore_ascii_case(raw))
            .copied()
            .or_else(|| {
                self.abbreviations
                    .iter()
                    .find(|(abbr, _)| abbr.eq_ignore_ascii_case(raw))
                    .map(|(_, name)| *name)
            })
    }
}

/// Path suffixes where cattlemen's associations keep member directories.
pub const MEMBER_DIRECTORY_PATHS: &[&str] = &[
    "/members",
    "/directory",
    "/member-directory",
    "/find-a-member",
    "/ranchers",
    "/producers",
];

pub static COUNTRIES: &[CountryProfile] = &[US, NZ, UK, CA, AU];

pub fn profile(code: &str) -> Option<&'static CountryProfile> {
    let code = code.trim();
    COUNTRIES.iter().find(|c| c.code.eq_ignore_ascii_case(code))
}

pub fn country_name(code: &str) -> Option<&'static str> {
    profile(code).map(|c| c.name)
}

/// Canonical region for `raw` within `country`.
pub fn normalize_region(country: &str, raw: &str) -> Option<&'static str> {
    profile(country)?.canonical_region(raw)
}

/// Clean up an extracted state for a contact in `country`.
///
/// Known regions come back canonical. Outside the US, anything that looks
/// like a US state (a two-letter code or a US state name) is dropped, since
/// it was almost certainly picked up from an unrelated page element.
/// Unknown values are kept as found.
pub fn validate_state(country: &str, raw: &str) -> String {
    let state = raw.trim();
    if state.is_empty() {
        return String::new();
    }
    let Some(profile) = profile(country) else {
        return state.to_string();
    };
    if let Some(canonical) = profile.canonical_region(state) {
        return canonical.to_string();
    }
    if profile.code != "US" {
        let looks_us = (state.len() == 2 && state.chars().all(|c| c.is_ascii_alphabetic()))
            || US.regions.iter().any(|r| r.eq_ignore_ascii_case(state));
        if looks_us {
            return String::new();
        }
    }
    state.to_string()
}

const US: CountryProfile = CountryProfile {
    code: "US",
    name: "United States",
    regions: &[
        "Alabama", "Alaska", "Arizona", "Arkansas", "California", "Colorado", "Connecticut",
        "Delaware", "Florida", "Georgia", "Hawaii", "Idaho", "Illinois", "Indiana", "Iowa",
        "Kansas", "Kentucky", "Louisiana", "Maine", "Maryland", "Massachusetts", "Michigan",
        "Minnesota", "Mississippi", "Missouri", "Montana", "Nebraska", "Nevada", "New Hampshire",
        "New Jersey", "New Mexico", "New York", "North Carolina", "North Dakota", "Ohio",
        "Oklahoma", "Oregon", "Pennsylvania", "Rhode Island", "South Carolina", "South Dakota",
        "Tennessee", "Texas", "Utah", "Vermont", "Virginia", "Washington", "West Virginia",
        "Wisconsin", "Wyoming",
    ],
    top_regions: &[
        "Texas", "Nebraska", "Kansas", "California", "Oklahoma", "South Dakota", "Missouri",
        "Iowa", "Colorado", "Montana", "North Dakota", "Idaho", "Wisconsin", "Minnesota",
        "Kentucky", "Wyoming", "Florida", "Oregon", "Virginia", "Georgia",
    ],
    abbreviations: &[
        ("AL", "Alabama"), ("AK", "Alaska"), ("AZ", "Arizona"), ("AR", "Arkansas"),
        ("CA", "California"), ("CO", "Colorado"), ("CT", "Connecticut"), ("DE", "Delaware"),
        ("FL", "Florida"), ("GA", "Georgia"), ("HI", "Hawaii"), ("ID", "Idaho"),
        ("IL", "Illinois"), ("IN", "Indiana"), ("IA", "Iowa"), ("KS", "Kansas"),
        ("KY", "Kentucky"), ("LA", "Louisiana"), ("ME", "Maine"), ("MD", "Maryland"),
        ("MA", "Massachusetts"), ("MI", "Michigan"), ("MN", "Minnesota"), ("MS", "Mississippi"),
        ("MO", "Missouri"), ("MT", "Montana"), ("NE", "Nebraska"), ("NV", "Nevada"),
        ("NH", "New Hampshire"), ("NJ", "New Jersey"), ("NM", "New Mexico"), ("NY", "New York"),
        ("NC", "North Carolina"), ("ND", "North Dakota"), ("OH", "Ohio"), ("OK", "Oklahoma"),
        ("OR", "Oregon"), ("PA", "Pennsylvania"), ("RI", "Rhode Island"),
        ("SC", "South Carolina"), ("SD", "South Dakota"), ("TN", "Tennessee"), ("TX", "Texas"),
        ("UT", "Utah"), ("VT", "Vermont"), ("VA", "Virginia"), ("WA", "Washington"),
        ("WV", "West Virginia"), ("WI", "Wisconsin"), ("WY", "Wyoming"),
    ],
    search_terms: &[
        "cattle ranch", "cattle farm", "beef ranch", "beef cattle", "dairy farm",
        "cow calf operation", "livestock ranch", "angus ranch", "hereford ranch",
        "cattle breeder", "cattle rancher", "beef producer", "cattle operation", "ranch email",
        "feedlot", "cattle feedlot", "cow farm", "heifer farm", "stockyard", "cattle company",
        "beef company", "ranch company", "family ranch", "family cattle farm",
        "commercial cattle", "purebred cattle", "seed stock producer", "stocker cattle",
    ],
    search_templates: &[
        "{term} {region} contact email",
        "{term} {region} gmail",
        "{term} {region} email address",
        "{term} {region} contact us",
        "{term} {region} contact information",
        "registered {breed} breeder {region} contact",
        "registered {breed} {region} email",
        "{term} bulls for sale {region} email contact",
        "{term} for sale {region} contact",
        "{term} {region} owner email",
        "{term} {region} website contact",
        "{term} near {region} email",
        "{breed} breeder {region} email address",
        "{breed} cattle for sale {region} contact",
        "{term} {region} phone email",
        "{term} {region} ranch email",
        "buy cattle {region} contact email",
        "cattle for sale {region} farmer email",
    ],
    breeds: &[
        "angus", "hereford", "charolais", "simmental", "limousin", "brahman", "shorthorn",
        "red angus", "gelbvieh", "maine-anjou", "holstein", "jersey", "guernsey", "brown swiss",
        "ayrshire", "longhorn", "highland", "wagyu", "brangus", "beefmaster",
    ],
    directories: &[DirectorySite {
        name: "yellowpages-US",
        base_url: "https://www.yellowpages.com",
        path_template: "/search?search_terms={term}&geo_location_terms={region}&page={page}",
        terms: &["cattle ranch", "cattle farm", "livestock ranch", "beef ranch"],
        pages: 3,
    }],
    breed_associations: &[
        ("American Angus Association", "https://www.angus.org/find-a-breeder"),
        ("American Hereford Association", "https://hereford.org/find-a-breeder/"),
        ("American Simmental Association", "https://simmental.org/find-a-breeder"),
        ("North American Limousin Foundation", "https://nalf.org/find-a-breeder/"),
        ("American Shorthorn Association", "https://shorthorn.org/find-a-breeder/"),
        ("American Brahman Breeders Association", "https://brahman.org/find-a-breeder/"),
        ("Red Angus Association", "https://redangus.org/find-a-breeder/"),
        ("American Gelbvieh Association", "https://gelbvieh.org/find-a-breeder/"),
        ("Beefmaster Breeders United", "https://beefmasters.org/find-a-breeder/"),
        ("Santa Gertrudis Breeders International", "https://santagertrudis.com/find-a-breeder/"),
    ],
    regional_associations: &[
        ("Texas", "https://www.texascattleraisers.org"),
        ("Nebraska", "https://www.necattlemen.org"),
        ("Kansas", "https://www.kla.org"),
        ("Oklahoma", "https://www.okcattlemen.org"),
        ("South Dakota", "https://www.sdcattlemen.org"),
        ("Montana", "https://www.mtbeef.org"),
        ("Colorado", "https://www.coloradocattle.org"),
        ("Iowa", "https://www.iacattlemen.org"),
        ("Missouri", "https://www.mocattle.com"),
        ("North Dakota", "https://www.ndstockmen.org"),
        ("Wyoming", "https://www.wyocattle.org"),
        ("Idaho", "https://www.idahocattle.org"),
        ("Florida", "https://www.floridacattlemen.org"),
        ("California", "https://www.calcattlemen.org"),
        ("Oregon", "https://www.orcattle.com"),
        ("Virginia", "https://www.vacattlemen.org"),
        ("Kentucky", "https://www.kycattle.org"),
        ("Wisconsin", "https://www.wicattlemen.org"),
        ("Minnesota", "https://www.mncattle.org"),
        ("Georgia", "https://www.gabeef.org"),
    ],
};

const NZ: CountryProfile = CountryProfile {
    code: "NZ",
    name: "New Zealand",
    regions: &[
        "Northland", "Auckland", "Waikato", "Bay of Plenty", "Gisborne", "Hawkes Bay",
        "Taranaki", "Manawatu-Whanganui", "Wellington", "Tasman", "Nelson", "Marlborough",
        "West Coast", "Canterbury", "Otago", "Southland",
    ],
    top_regions: &[
        "Waikato", "Canterbury", "Southland", "Otago", "Manawatu-Whanganui", "Taranaki",
        "Hawkes Bay", "Bay of Plenty", "Northland", "Gisborne", "Wellington", "Tasman", "Nelson",
        "Marlborough", "West Coast",
    ],
    abbreviations: &[("Hawke's Bay", "Hawkes Bay"), ("Manawatu", "Manawatu-Whanganui")],
    search_terms: &[
        "cattle farm", "beef farm", "dairy farm", "cattle station", "cattle breeder",
        "beef breeder", "stud cattle", "beef producer", "cattle farmer", "dairy farmer",
        "livestock farm", "bull breeder", "cattle stud", "cattle property", "grazing farm",
        "stock farm", "farm email", "farmer contact", "rural property", "beef cattle farm",
        "dairy cattle farm",
    ],
    search_templates: &[
        "{term} {region} New Zealand contact email",
        "{term} {region} NZ email",
        "{term} {region} New Zealand contact",
        "{term} New Zealand {region} email address",
        "registered {breed} breeder {region} New Zealand",
        "registered {breed} stud {region} NZ contact",
        "{breed} cattle {region} New Zealand email",
        "{term} for sale {region} New Zealand contact",
        "cattle stud {region} NZ email",
        "{term} {region} NZ farmer email",
        "{term} {region} New Zealand owner contact",
        "{breed} stud {region} NZ email address",
        "buy {breed} cattle {region} New Zealand email",
        "{term} near {region} NZ contact email",
    ],
    breeds: &[
        "angus", "hereford", "charolais", "simmental", "limousin", "shorthorn", "murray grey",
        "south devon", "red angus", "highland", "wagyu", "speckle park", "lowline", "jersey",
        "friesian", "ayrshire", "brown swiss",
    ],
    directories: &[DirectorySite {
        name: "yellowpages-NZ",
        base_url: "https://www.yellow.co.nz",
        path_template: "/search/search?clue={term}&location={region}&page={page}",
        terms: &["cattle farm", "beef farm", "dairy farm", "cattle breeder", "livestock"],
        pages: 3,
    }],
    breed_associations: &[],
    regional_associations: &[],
};

const UK: CountryProfile = CountryProfile {
    code: "UK",
    name: "United Kingdom",
    regions: &[
        "Devon", "Somerset", "Cornwall", "Dorset", "Wiltshire", "Hampshire", "Kent", "Sussex",
        "Suffolk", "Norfolk", "Lincolnshire", "Yorkshire", "Lancashire", "Cumbria",
        "Northumberland", "Herefordshire", "Shropshire", "Staffordshire", "Cheshire",
        "Gloucestershire", "Oxfordshire", "Aberdeenshire", "Angus Scotland", "Perth and Kinross",
        "Highland Scotland", "Dumfries and Galloway", "Scottish Borders", "Fife", "Stirling",
        "Powys", "Carmarthenshire", "Pembrokeshire", "Ceredigion", "Gwynedd", "Denbighshire",
        "County Antrim", "County Down", "County Tyrone", "County Armagh", "County Fermanagh",
    ],
    top_regions: &[
        "Devon", "Somerset", "Yorkshire", "Aberdeenshire", "Cumbria", "Herefordshire",
        "Highland Scotland", "Dumfries and Galloway", "Lincolnshire", "Norfolk", "Powys",
        "Shropshire", "Lancashire", "Cornwall", "Dorset",
    ],
    abbreviations: &[("Angus", "Angus Scotland"), ("Highland", "Highland Scotland")],
    search_terms: &[
        "cattle farm", "beef farm", "dairy farm", "cattle breeder", "beef breeder",
        "pedigree cattle", "cattle farmer", "beef producer", "livestock farm", "cattle herd",
        "pedigree herd", "bull breeder", "cattle stud", "farm email", "farmer contact",
        "agricultural farm", "beef herd", "suckler herd", "pedigree breeder",
        "livestock breeder", "cattle dealer",
    ],
    search_templates: &[
        "{term} {region} UK contact email",
        "{term} {region} England email",
        "{term} {region} Scotland email",
        "{term} {region} Wales email",
        "{term} {region} contact email",
        "pedigree {breed} breeder {region} UK contact",
        "registered {breed} {region} UK email",
        "{breed} cattle {region} UK email",
        "{term} for sale {region} UK contact",
        "{term} {region} UK farmer email",
        "{term} {region} UK owner contact",
        "{breed} herd {region} UK email address",
        "buy {breed} cattle {region} UK email",
        "{term} near {region} UK contact email",
        "{term} {region} Britain email address",
    ],
    breeds: &[
        "angus", "aberdeen angus", "hereford", "charolais", "simmental", "limousin",
        "shorthorn", "highland", "belted galloway", "south devon", "red poll", "dexter",
        "welsh black", "longhorn", "galloway", "british white", "lincoln red", "jersey",
        "friesian", "ayrshire", "guernsey",
    ],
    directories: &[DirectorySite {
        name: "yellowpages-UK",
        base_url: "https://www.yell.com",
        path_template: "/ucs/UcsSearchAction.do?keywords={term}&location={region}&pageNum={page}",
        terms: &["cattle farm", "beef farm", "dairy farm", "cattle breeder", "livestock farm"],
        pages: 3,
    }],
    breed_associations: &[],
    regional_associations: &[],
};

const CA: CountryProfile = CountryProfile {
    code: "CA",
    name: "Canada",
    regions: &[
        "Alberta", "Saskatchewan", "Manitoba", "British Columbia", "Ontario", "Quebec",
        "New Brunswick", "Nova Scotia", "Prince Edward Island", "Newfoundland",
    ],
    top_regions: &[
        "Alberta", "Saskatchewan", "Manitoba", "British Columbia", "Ontario", "Quebec",
        "New Brunswick", "Nova Scotia", "Prince Edward Island", "Newfoundland",
    ],
    abbreviations: &[
        ("AB", "Alberta"), ("SK", "Saskatchewan"), ("MB", "Manitoba"),
        ("BC", "British Columbia"), ("ON", "Ontario"), ("QC", "Quebec"),
        ("NB", "New Brunswick"), ("NS", "Nova Scotia"), ("PE", "Prince Edward Island"),
        ("PEI", "Prince Edward Island"), ("NL", "Newfoundland"),
        ("Newfoundland and Labrador", "Newfoundland"),
    ],
    search_terms: &[
        "cattle ranch", "cattle farm", "beef ranch", "beef cattle", "dairy farm",
        "cow calf operation", "livestock ranch", "cattle breeder", "cattle rancher",
        "beef producer", "cattle operation", "purebred cattle", "feedlot", "ranch email",
        "cow farm", "family ranch", "commercial cattle", "seed stock producer", "cattle company",
    ],
    search_templates: &[
        "{term} {region} Canada contact email",
        "{term} {region} Canada email",
        "{term} {region} Canadian email address",
        "{term} {region} Canada contact us",
        "registered {breed} breeder {region} Canada contact",
        "registered {breed} {region} Canada email",
        "{breed} cattle {region} Canada email",
        "{term} bulls for sale {region} Canada email",
        "{term} for sale {region} Canada contact",
        "{term} {region} Canadian farmer email",
        "{term} {region} Canada owner contact",
        "{breed} breeder {region} Canada email address",
        "buy {breed} cattle {region} Canada email",
        "{term} near {region} Canada contact email",
    ],
    breeds: &[
        "angus", "hereford", "charolais", "simmental", "limousin", "shorthorn", "red angus",
        "gelbvieh", "maine-anjou", "highland", "wagyu", "speckle park", "piedmontese",
        "blonde d'aquitaine", "salers", "holstein", "jersey", "brown swiss", "ayrshire",
    ],
    directories: &[DirectorySite {
        name: "yellowpages-CA",
        base_url: "https://www.yellowpages.ca",
        path_template: "/search/si/{page}/{term}/{region}",
        terms: &["cattle ranch", "cattle farm", "beef farm", "livestock ranch", "dairy farm"],
        pages: 3,
    }],
    breed_associations: &[],
    regional_associations: &[],
};

const AU: CountryProfile = CountryProfile {
    code: "AU",
    name: "Australia",
    regions: &[
        "New South Wales", "Queensland", "Victoria", "South Australia", "Western Australia",
        "Tasmania", "Northern Territory",
    ],
    top_regions: &[
        "Queensland", "New South Wales", "Victoria", "South Australia", "Western Australia",
        "Tasmania", "Northern Territory",
    ],
    abbreviations: &[
        ("NSW", "New South Wales"), ("QLD", "Queensland"), ("VIC", "Victoria"),
        ("SA", "South Australia"), ("WA", "Western Australia"), ("TAS", "Tasmania"),
        ("NT", "Northern Territory"),
    ],
    search_terms: &[
        "cattle station", "cattle farm", "beef farm", "cattle property", "cattle breeder",
        "beef producer", "cattle stud", "beef breeder", "cattle farmer", "livestock farm",
        "stud cattle", "bull breeder", "grazing property", "farm email", "farmer contact",
        "rural property", "beef cattle farm", "commercial cattle", "cattle company",
        "pastoral company",
    ],
    search_templates: &[
        "{term} {region} Australia contact email",
        "{term} {region} Australia email",
        "{term} {region} Australian email address",
        "{term} {region} Australia contact",
        "registered {breed} breeder {region} Australia contact",
        "registered {breed} stud {region} Australia email",
        "{breed} cattle {region} Australia email",
        "{term} for sale {region} Australia contact",
        "cattle stud {region} Australia email",
        "{term} {region} Australian farmer email",
        "{term} {region} Australia owner contact",
        "{breed} stud {region} Australia email address",
        "buy {breed} cattle {region} Australia email",
        "{term} near {region} Australia contact email",
    ],
    breeds: &[
        "angus", "hereford", "charolais", "simmental", "limousin", "brahman", "shorthorn",
        "murray grey", "droughtmaster", "santa gertrudis", "red angus", "belmont red",
        "brangus", "wagyu", "speckle park", "south devon", "holstein", "jersey", "illawarra",
        "ayrshire",
    ],
    directories: &[DirectorySite {
        name: "yellowpages-AU",
        base_url: "https://www.yellowpages.com.au",
        path_template: "/find/{term}/{region}?pageNumber={page}",
        terms: &["cattle farm", "beef farm", "cattle station", "livestock farm", "dairy farm"],
        pages: 3,
    }],
    breed_associations: &[],
    regional_associations: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_lookup() {
        assert_eq!(country_name("us"), Some("United States"));
        assert_eq!(profile("NZ").map(|p| p.regions.len()), Some(16));
        assert!(profile("FR").is_none());
    }

    #[test]
    fn test_normalize_region() {
        assert_eq!(normalize_region("US", "ne"), Some("Nebraska"));
        assert_eq!(normalize_region("US", "south dakota"), Some("South Dakota"));
        assert_eq!(normalize_region("CA", "AB"), Some("Alberta"));
        assert_eq!(normalize_region("AU", "qld"), Some("Queensland"));
        assert_eq!(normalize_region("US", "Ontario"), None);
        assert_eq!(normalize_region("US", ""), None);
    }

    #[test]
    fn test_validate_state() {
        assert_eq!(validate_state("US", "TX"), "Texas");
        assert_eq!(validate_state("NZ", "waikato"), "Waikato");
        assert_eq!(validate_state("NZ", "TX"), "");
        assert_eq!(validate_state("UK", "Nebraska"), "");
        assert_eq!(validate_state("US", "Some County"), "Some County");
        assert_eq!(validate_state("AU", "  "), "");
    }

    #[test]
    fn test_directory_listing_url() {
        let site = &profile("US").unwrap().directories[0];
        assert_eq!(
            site.listing_url("cattle ranch", "South Dakota", 2),
            "https://www.yellowpages.com/search?search_terms=cattle+ranch&geo_location_terms=South+Dakota&page=2"
        );
        let site = &profile("CA").unwrap().directories[0];
        assert_eq!(
            site.listing_url("beef farm", "Alberta", 1),
            "https://www.yellowpages.ca/search/si/1/beef+farm/Alberta"
        );
    }
}
