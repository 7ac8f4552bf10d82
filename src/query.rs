//! Filtering, ordering and summaries over a loaded catalog snapshot.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::country::{normalize_countries, GLOBAL};
use crate::classify::funding::FundingCategory;
use crate::models::{ScholarshipLevel, ScholarshipPreview};
use crate::text::{compare_names, slugify};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    DeadlineAsc,
    DeadlineDesc,
    NameAsc,
    CountryAsc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::DeadlineAsc => "deadline-asc",
            SortOrder::DeadlineDesc => "deadline-desc",
            SortOrder::NameAsc => "name-asc",
            SortOrder::CountryAsc => "country-asc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deadline-asc" | "deadline" => Ok(SortOrder::DeadlineAsc),
            "deadline-desc" => Ok(SortOrder::DeadlineDesc),
            "name-asc" | "name" => Ok(SortOrder::NameAsc),
            "country-asc" | "country" => Ok(SortOrder::CountryAsc),
            other => Err(format!(
                "unknown sort '{}' (expected deadline-asc, deadline-desc, name-asc or country-asc)",
                other
            )),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical destination countries of a record.
pub fn canonical_countries(preview: &ScholarshipPreview) -> Vec<String> {
    normalize_countries(&preview.scholarship.countries)
}

fn any_match(wanted: &[String], values: &[String]) -> bool {
    values
        .iter()
        .any(|v| wanted.iter().any(|w| w.trim().eq_ignore_ascii_case(v.trim())))
}

/// A catalog view. Empty filter lists match everything; a non-empty list
/// needs at least one value in common with the record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogQuery {
    pub levels: Vec<ScholarshipLevel>,
    pub countries: Vec<String>,
    pub coverage: Vec<String>,
    pub funding_types: Vec<String>,
    pub funding_categories: Vec<FundingCategory>,
    pub modalities: Vec<String>,
    pub eligibility: Vec<String>,
    pub search: Option<String>,
    pub show_expired: bool,
    pub sort: SortOrder,
}

impl CatalogQuery {
    pub fn matches(&self, preview: &ScholarshipPreview) -> bool {
        let s = &preview.scholarship;

        if !self.show_expired && s.is_expired {
            return false;
        }
        if !self.levels.is_empty() && !s.level_tags.iter().any(|l| self.levels.contains(l)) {
            return false;
        }
        if !self.countries.is_empty() {
            let canonical = canonical_countries(preview);
            if !any_match(&self.countries, &canonical) && !any_match(&self.countries, &s.countries) {
                return false;
            }
        }
        if !self.coverage.is_empty() && !any_match(&self.coverage, &s.coverage) {
            return false;
        }
        if !self.funding_types.is_empty() {
            let found = s
                .funding_type
                .as_ref()
                .is_some_and(|t| any_match(&self.funding_types, std::slice::from_ref(t)));
            if !found {
                return false;
            }
        }
        if !self.funding_categories.is_empty()
            && !s
                .funding_category
                .is_some_and(|c| self.funding_categories.contains(&c))
        {
            return false;
        }
        if !self.modalities.is_empty() && !any_match(&self.modalities, &s.delivery_modes) {
            return false;
        }
        if !self.eligibility.is_empty() && !any_match(&self.eligibility, &s.eligibility) {
            return false;
        }
        if let Some(needle) = self.search.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            if !search_text(preview).contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }

    /// Matching records in the requested order.
    pub fn apply(&self, items: &[ScholarshipPreview]) -> Vec<ScholarshipPreview> {
        let mut out: Vec<ScholarshipPreview> =
            items.iter().filter(|p| self.matches(p)).cloned().collect();
        sort_previews(&mut out, self.sort);
        out
    }
}

fn search_text(preview: &ScholarshipPreview) -> String {
    let s = &preview.scholarship;
    let levels: Vec<&str> = s.level_tags.iter().map(|l| l.as_str()).collect();
    let description = preview
        .short_description
        .as_deref()
        .or(s.sheet_summary.as_deref())
        .unwrap_or_default();
    format!(
        "{} {} {} {} {} {} {}",
        s.name,
        s.countries.join(" "),
        levels.join(" "),
        description,
        s.coverage.join(" "),
        s.funding_type.as_deref().unwrap_or_default(),
        s.organisation.as_deref().unwrap_or_default(),
    )
    .to_lowercase()
}

/// Dated before undated, then by instant.
fn compare_deadlines(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable sort; undated deadlines stay last in both deadline orders.
pub fn sort_previews(items: &mut [ScholarshipPreview], order: SortOrder) {
    match order {
        SortOrder::DeadlineAsc => items.sort_by(|a, b| {
            compare_deadlines(a.scholarship.deadline_date, b.scholarship.deadline_date)
        }),
        SortOrder::DeadlineDesc => items.sort_by(|a, b| {
            let (a, b) = (a.scholarship.deadline_date, b.scholarship.deadline_date);
            match (a, b) {
                (Some(a), Some(b)) => b.cmp(&a),
                _ => compare_deadlines(a, b),
            }
        }),
        SortOrder::NameAsc => items.sort_by(|a, b| compare_names(a.name(), b.name())),
        SortOrder::CountryAsc => {
            items.sort_by_cached_key(|p| {
                canonical_countries(p)
                    .into_iter()
                    .next()
                    .unwrap_or_default()
                    .to_lowercase()
            });
        }
    }
}

/// Distinct filter options present in the catalog, each sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Facets {
    pub levels: Vec<ScholarshipLevel>,
    pub countries: Vec<String>,
    pub coverage: Vec<String>,
    pub funding_types: Vec<String>,
    pub funding_categories: Vec<FundingCategory>,
    pub delivery_modes: Vec<String>,
    pub eligibility: Vec<String>,
}

impl Facets {
    pub fn collect(items: &[ScholarshipPreview]) -> Self {
        let mut levels = BTreeSet::new();
        let mut countries = BTreeSet::new();
        let mut coverage = BTreeSet::new();
        let mut funding_types = BTreeSet::new();
        let mut funding_categories = BTreeSet::new();
        let mut delivery_modes = BTreeSet::new();
        let mut eligibility = BTreeSet::new();

        for preview in items {
            let s = &preview.scholarship;
            levels.extend(s.level_tags.iter().copied());
            countries.extend(canonical_countries(preview));
            coverage.extend(s.coverage.iter().cloned());
            funding_types.extend(s.funding_type.iter().cloned());
            funding_categories.extend(s.funding_category);
            delivery_modes.extend(s.delivery_modes.iter().cloned());
            eligibility.extend(s.eligibility.iter().cloned());
        }

        Facets {
            levels: levels.into_iter().collect(),
            countries: countries.into_iter().collect(),
            coverage: coverage.into_iter().collect(),
            funding_types: funding_types.into_iter().collect(),
            funding_categories: funding_categories.into_iter().collect(),
            delivery_modes: delivery_modes.into_iter().collect(),
            eligibility: eligibility.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingDeadline {
    pub id: String,
    pub name: String,
    /// e.g. "Sunday, June 1st"
    pub label: String,
    pub date: DateTime<Utc>,
    pub days_left: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlights {
    pub active: usize,
    pub countries: usize,
    pub country_names: Vec<String>,
    pub upcoming: Option<UpcomingDeadline>,
}

impl Highlights {
    pub fn collect(items: &[ScholarshipPreview], now: DateTime<Utc>) -> Self {
        let country_names: BTreeSet<String> = items
            .iter()
            .flat_map(|p| {
                if p.scholarship.countries.is_empty() {
                    vec![GLOBAL.to_string()]
                } else {
                    canonical_countries(p)
                }
            })
            .collect();

        let upcoming = items
            .iter()
            .filter(|p| !p.scholarship.is_expired)
            .filter_map(|p| p.scholarship.deadline_date.map(|date| (date, p)))
            .filter(|(date, _)| *date >= now)
            .min_by_key(|(date, _)| *date)
            .map(|(date, p)| UpcomingDeadline {
                id: p.id().to_string(),
                name: p.name().to_string(),
                label: upcoming_label(date),
                date,
                days_left: (date - now).num_days(),
            });

        Highlights {
            active: items.iter().filter(|p| !p.scholarship.is_expired).count(),
            countries: country_names.len(),
            country_names: country_names.into_iter().collect(),
            upcoming,
        }
    }
}

fn upcoming_label(date: DateTime<Utc>) -> String {
    let label = crate::text::format_deadline_label(date.date_naive());
    // drop the trailing ", 2025"
    match label.rfind(", ") {
        Some(i) => label[..i].to_string(),
        None => label,
    }
}

/// A slug-addressed slice of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub label: String,
    pub description: String,
    pub scholarships: Vec<ScholarshipPreview>,
}

/// Country label whose slug equals `slug`, looking at canonical names first.
pub fn resolve_country_slug(items: &[ScholarshipPreview], slug: &str) -> Option<String> {
    let target = slugify(slug);
    if target.is_empty() {
        return None;
    }
    items
        .iter()
        .flat_map(canonical_countries)
        .chain(items.iter().flat_map(|p| p.scholarship.countries.iter().cloned()))
        .find(|country| slugify(country) == target)
}

pub fn resolve_coverage_slug(items: &[ScholarshipPreview], slug: &str) -> Option<String> {
    let target = slugify(slug);
    if target.is_empty() {
        return None;
    }
    items
        .iter()
        .flat_map(|p| p.scholarship.coverage.iter())
        .find(|item| slugify(item) == target)
        .cloned()
}

pub fn level_listing(items: &[ScholarshipPreview], slug: &str) -> Option<Listing> {
    let level = ScholarshipLevel::from_slug(slug)?;
    let query = CatalogQuery {
        levels: vec![level],
        show_expired: true,
        sort: SortOrder::NameAsc,
        ..CatalogQuery::default()
    };
    let scholarships = query.apply(items);
    let label = level.as_str().to_lowercase();
    let description = if scholarships.is_empty() {
        format!("No active {} scholarships at the moment.", label)
    } else {
        format!("{} hand-picked {} scholarships.", scholarships.len(), label)
    };
    Some(Listing {
        label: level.as_str().to_string(),
        description,
        scholarships,
    })
}

pub fn country_listing(items: &[ScholarshipPreview], slug: &str) -> Option<Listing> {
    let label = resolve_country_slug(items, slug)?;
    let query = CatalogQuery {
        countries: vec![label.clone()],
        show_expired: true,
        sort: SortOrder::NameAsc,
        ..CatalogQuery::default()
    };
    let scholarships = query.apply(items);
    let description = if scholarships.is_empty() {
        format!("No active scholarships currently feature {}.", label)
    } else {
        format!(
            "{} curated opportunities welcoming scholars to {}.",
            scholarships.len(),
            label
        )
    };
    Some(Listing {
        label,
        description,
        scholarships,
    })
}

pub fn coverage_listing(items: &[ScholarshipPreview], slug: &str) -> Option<Listing> {
    let label = resolve_coverage_slug(items, slug)?;
    let scholarships: Vec<ScholarshipPreview> = items
        .iter()
        .filter(|p| p.scholarship.coverage.contains(&label))
        .cloned()
        .collect();
    let description = if scholarships.is_empty() {
        format!("No scholarships currently list {} as a benefit.", label.to_lowercase())
    } else {
        format!("{} scholarships offer {}.", scholarships.len(), label.to_lowercase())
    };
    Some(Listing {
        label,
        description,
        scholarships,
    })
}
