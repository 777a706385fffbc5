//! Seed plan construction for a new job.
//!
//! Plans are deterministic: the same inputs always produce the same list in
//! the same order, so a job's cursor stays meaningful.

use std::collections::HashSet;

use tracing::warn;

use super::countries::{CountryProfile, MEMBER_DIRECTORY_PATHS};
use crate::models::{JobSeed, JobType, UrlSource};

/// Breeds substituted into `{breed}` templates.
const BREEDS_PER_TEMPLATE: usize = 10;

/// Resolve requested regions to canonical names, or the country's top
/// regions when none are given. Unknown names are kept verbatim.
pub fn resolve_regions(profile: &CountryProfile, requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        return profile.top_regions.iter().map(|r| r.to_string()).collect();
    }
    let mut seen = HashSet::new();
    requested
        .iter()
        .filter_map(|raw| {
            let region = match profile.canonical_region(raw) {
                Some(canonical) => canonical.to_string(),
                None => {
                    warn!("'{}' is not a known region of {}", raw.trim(), profile.code);
                    raw.trim().to_string()
                }
            };
            (!region.is_empty() && seen.insert(region.clone())).then_some(region)
        })
        .collect()
}

/// Search queries for the given regions, capped at `max_queries`.
///
/// Regions vary fastest, so a capped plan still covers every region.
pub fn search_seeds(
    profile: &CountryProfile,
    regions: &[String],
    max_queries: usize,
) -> Vec<JobSeed> {
    let breeds = &profile.breeds[..profile.breeds.len().min(BREEDS_PER_TEMPLATE)];
    let mut seen = HashSet::new();
    let mut seeds = Vec::new();

    for template in profile.search_templates {
        let terms: &[&str] = if template.contains("{term}") {
            profile.search_terms
        } else {
            &[""]
        };
        let template_breeds: &[&str] = if template.contains("{breed}") {
            breeds
        } else {
            &[""]
        };

        for term in terms {
            for breed in template_breeds {
                for region in regions {
                    if seeds.len() >= max_queries {
                        return seeds;
                    }
                    let query = template
                        .replace("{term}", term)
                        .replace("{breed}", breed)
                        .replace("{region}", region);
                    if seen.insert(query.clone()) {
                        seeds.push(JobSeed::Search {
                            query,
                            region: Some(region.clone()),
                        });
                    }
                }
            }
        }
    }
    seeds
}

/// Directory listing pages for every term, region and page.
pub fn directory_seeds(profile: &CountryProfile, regions: &[String]) -> Vec<JobSeed> {
    let mut seeds = Vec::new();
    for site in profile.directories {
        for region in regions {
            for term in site.terms {
                for page in 1..=site.pages {
                    seeds.push(JobSeed::Page {
                        url: site.listing_url(term, region, page),
                        source: UrlSource::Directory,
                        label: site.name.to_string(),
                        region: Some(region.clone()),
                    });
                }
            }
        }
    }
    seeds
}

/// Breed association breeder finders plus the member directories of the
/// regional cattlemen's associations for the selected regions.
pub fn association_seeds(profile: &CountryProfile, regions: &[String]) -> Vec<JobSeed> {
    let mut seeds: Vec<JobSeed> = profile
        .breed_associations
        .iter()
        .map(|(name, url)| JobSeed::Page {
            url: url.to_string(),
            source: UrlSource::Association,
            label: name.to_string(),
            region: None,
        })
        .collect();

    for (region, base) in profile.regional_associations {
        if !regions.iter().any(|r| r == region) {
            continue;
        }
        for path in MEMBER_DIRECTORY_PATHS {
            seeds.push(JobSeed::Page {
                url: format!("{}{}", base.trim_end_matches('/'), path),
                source: UrlSource::Association,
                label: format!("cattlemen-{}", region),
                region: Some(region.to_string()),
            });
        }
    }
    seeds
}

/// The full seed plan for a job: searches, then associations, then
/// directories.
pub fn build_plan(
    job_type: JobType,
    profile: &CountryProfile,
    regions: &[String],
    max_queries: usize,
) -> Vec<JobSeed> {
    let mut seeds = Vec::new();
    if job_type.includes_search() {
        seeds.extend(search_seeds(profile, regions, max_queries));
    }
    if job_type.includes_associations() {
        seeds.extend(association_seeds(profile, regions));
    }
    if job_type.includes_directories() {
        seeds.extend(directory_seeds(profile, regions));
    }
    seeds
}
