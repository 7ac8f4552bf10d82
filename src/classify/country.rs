use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::text::capitalize;

pub const GLOBAL: &str = "Global";
pub const MULTIPLE: &str = "Multiple";

static SEGMENT_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[,;/|\n&()]+|\s+and\s+|\s+or\s+").unwrap());
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z.]+").unwrap());

const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("uk", "United Kingdom"),
    ("u.k.", "United Kingdom"),
    ("england", "United Kingdom"),
    ("scotland", "United Kingdom"),
    ("wales", "United Kingdom"),
    ("usa", "United States"),
    ("us", "United States"),
    ("u.s.", "United States"),
    ("u.s.a.", "United States"),
    ("america", "United States"),
    ("uae", "United Arab Emirates"),
    ("ksa", "Saudi Arabia"),
    ("holland", "Netherlands"),
    ("the netherlands", "Netherlands"),
    ("korea", "South Korea"),
];

const CITY_TO_COUNTRY: &[(&str, &str)] = &[
    ("london", "United Kingdom"),
    ("edinburgh", "United Kingdom"),
    ("birmingham", "United Kingdom"),
    ("bristol", "United Kingdom"),
    ("cambridge", "United Kingdom"),
    ("oxford", "United Kingdom"),
    ("nottingham", "United Kingdom"),
    ("liverpool", "United Kingdom"),
    ("coventry", "United Kingdom"),
    ("manchester", "United Kingdom"),
    ("glasgow", "United Kingdom"),
    ("toronto", "Canada"),
    ("vancouver", "Canada"),
    ("montreal", "Canada"),
    ("beijing", "China"),
    ("shanghai", "China"),
    ("hong kong", "China"),
    ("hongkong", "China"),
    ("zurich", "Switzerland"),
    ("geneva", "Switzerland"),
    ("lausanne", "Switzerland"),
    ("paris", "France"),
    ("reims", "France"),
    ("delft", "Netherlands"),
    ("groningen", "Netherlands"),
    ("amsterdam", "Netherlands"),
    ("nijmegen", "Netherlands"),
    ("enschede", "Netherlands"),
    ("maastricht", "Netherlands"),
    ("leuven", "Belgium"),
    ("gothenburg", "Sweden"),
    ("uppsala", "Sweden"),
    ("lund", "Sweden"),
    ("stockholm", "Sweden"),
    ("roskilde", "Denmark"),
    ("copenhagen", "Denmark"),
    ("thuwal", "Saudi Arabia"),
    ("melbourne", "Australia"),
    ("sydney", "Australia"),
    ("oregon", "United States"),
    ("new york", "United States"),
    ("boston", "United States"),
    ("berlin", "Germany"),
    ("munich", "Germany"),
    ("vienna", "Austria"),
    ("tokyo", "Japan"),
    ("seoul", "South Korea"),
    ("dublin", "Ireland"),
    ("doha", "Qatar"),
    ("abu dhabi", "United Arab Emirates"),
    ("dubai", "United Arab Emirates"),
];

/// Canonical names a location can resolve to.
const KNOWN_COUNTRIES: &[&str] = &[
    "United Kingdom",
    "United States",
    "United Arab Emirates",
    "Netherlands",
    "Spain",
    "Austria",
    "Switzerland",
    "Thailand",
    "Turkey",
    "Singapore",
    "South Korea",
    "Sweden",
    "New Zealand",
    "Oman",
    "Portugal",
    "Qatar",
    "Russia",
    "Saudi Arabia",
    "Italy",
    "Japan",
    "Iceland",
    "Hungary",
    "Germany",
    "China",
    "Canada",
    "France",
    "Finland",
    "India",
    "Denmark",
    "Belgium",
    "Australia",
    "Uganda",
    "Ireland",
    "Norway",
    "Poland",
    "Taiwan",
    "Malaysia",
    "South Africa",
];

const INSTITUTION_WORDS: &[&str] = &[
    "university",
    "institut",
    "college",
    "school",
    "academy",
    "campus",
];

#[derive(Debug, Default)]
struct Scan {
    explicit: Vec<String>,
    from_cities: Vec<String>,
    unrecognized: Vec<String>,
}

impl Scan {
    /// Explicit country mentions win; cities only count when no country is named.
    fn recognized(&self) -> Vec<String> {
        if self.explicit.is_empty() {
            self.from_cities.clone()
        } else {
            self.explicit.clone()
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Case-insensitive whole-word search; `haystack` must already be lowercase.
fn find_phrase(haystack: &str, phrase: &str) -> Option<usize> {
    haystack.match_indices(phrase).map(|(i, _)| i).find(|&i| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + phrase.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn alias(token: &str) -> Option<&'static str> {
    let lower = token.to_lowercase();
    COUNTRY_ALIASES
        .iter()
        .find(|(k, _)| *k == lower)
        .map(|(_, country)| *country)
}

fn known(name: &str) -> Option<&'static str> {
    KNOWN_COUNTRIES
        .iter()
        .find(|c| c.eq_ignore_ascii_case(name))
        .copied()
}

fn city(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    CITY_TO_COUNTRY
        .iter()
        .find(|(c, _)| *c == lower)
        .map(|(_, country)| *country)
}

fn scan(text: &str) -> Scan {
    let mut out = Scan::default();

    for segment in SEGMENT_SPLIT_RE.split(text) {
        let segment = segment.trim().trim_matches('.').trim();
        if segment.is_empty() {
            continue;
        }

        if let Some(country) = alias(segment).or_else(|| known(segment)) {
            push_unique(&mut out.explicit, country);
            continue;
        }
        if let Some(country) = city(segment) {
            push_unique(&mut out.from_cities, country);
            continue;
        }

        let lower = segment.to_lowercase();
        let mut hits: Vec<(usize, &str)> = KNOWN_COUNTRIES
            .iter()
            .filter_map(|c| find_phrase(&lower, &c.to_lowercase()).map(|pos| (pos, *c)))
            .collect();

        // Short aliases like "US" only count when written in capitals.
        for token in TOKEN_RE.find_iter(segment) {
            if let Some(country) = alias(token.as_str()) {
                let shouting = token.as_str().chars().all(|c| !c.is_lowercase());
                if token.len() >= 3 || shouting {
                    hits.push((token.start(), country));
                }
            }
        }
        hits.sort_by_key(|(pos, _)| *pos);
        for (_, country) in &hits {
            push_unique(&mut out.explicit, country);
        }

        let mut city_hits: Vec<(usize, &str)> = CITY_TO_COUNTRY
            .iter()
            .filter_map(|(c, country)| find_phrase(&lower, c).map(|pos| (pos, *country)))
            .collect();
        city_hits.sort_by_key(|(pos, _)| *pos);
        for (_, country) in &city_hits {
            push_unique(&mut out.from_cities, country);
        }

        if !hits.is_empty() || !city_hits.is_empty() {
            continue;
        }
        if INSTITUTION_WORDS.iter().any(|w| lower.contains(w)) {
            continue;
        }
        let single_word = !segment.contains(char::is_whitespace);
        if single_word && segment.chars().count() >= 3 && segment.chars().all(char::is_alphabetic) {
            push_unique(&mut out.unrecognized, &capitalize(segment));
        }
    }

    out
}

/// Map a free-text location onto canonical country names.
///
/// Best effort: `Global` when nothing can be read, `Multiple` for vague
/// multi-country text without a recognizable country. When nothing is
/// recognized, unknown single words are kept title-cased.
pub fn extract_countries(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return vec![GLOBAL.to_string()];
    }

    let lower = trimmed.to_lowercase();
    let found = scan(trimmed);
    let recognized = found.recognized();

    if lower.contains("multi") || lower.contains("various") {
        return if recognized.is_empty() {
            vec![MULTIPLE.to_string()]
        } else {
            recognized
        };
    }

    if lower.contains("remote") || lower.contains("online") {
        return if recognized.is_empty() {
            vec![GLOBAL.to_string()]
        } else {
            recognized
        };
    }

    if !recognized.is_empty() {
        recognized
    } else if !found.unrecognized.is_empty() {
        found.unrecognized
    } else {
        vec![GLOBAL.to_string()]
    }
}

/// Sorted union of the canonical countries behind each entry.
pub fn normalize_countries(countries: &[String]) -> Vec<String> {
    if countries.is_empty() {
        return vec![GLOBAL.to_string()];
    }
    countries
        .iter()
        .flat_map(|c| extract_countries(c))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
