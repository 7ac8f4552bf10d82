use std::cmp::Ordering;
use std::hash::Hash;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use itertools::Itertools;
use regex::Regex;

use crate::models::ScholarshipLevel;

static LIST_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n,;/\\|•·▪◦‣]+").unwrap());
static LEVEL_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+-\s+|\s+and\s+").unwrap());
static WIDE_LEVEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(any|all|various|multiple)\b").unwrap());
static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static ROLLING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)rolling|open|varies|ongoing|\btba\b|not available|n/a").unwrap()
});
static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(mon|tue|tues|wed|wednes|thu|thur|thurs|fri|sat|satur|sun)(day)?\b\.?,?")
        .unwrap()
});
static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").unwrap());
static FILLER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bof\b|\.").unwrap());
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static GVIZ_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bDate\(\s*(\d{4})\s*,\s*(\d{1,2})\s*,\s*(\d{1,2})").unwrap()
});
static FORMULA_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdate\(\s*(\d{4})\s*,\s*(\d{1,2})\s*,\s*(\d{1,2})\s*\)").unwrap()
});

/// Keyword patterns per level. Matched on word boundaries so that
/// "undergraduate" never counts as "graduate".
static LEVEL_KEYWORDS: LazyLock<Vec<(Regex, ScholarshipLevel)>> = LazyLock::new(|| {
    [
        (r"undergraduate|undergrad|bachelors?|bachelor's", ScholarshipLevel::Undergraduate),
        (r"masters?|master's|graduate|msc|mres|ma", ScholarshipLevel::Masters),
        (r"postgraduate|postgrad", ScholarshipLevel::Postgraduate),
        (r"phd|ph\.d|doctor|doctoral|doctorate", ScholarshipLevel::PhD),
        (r"postdoc|postdoctoral|postdocs", ScholarshipLevel::Postdoctoral),
        (r"research|researcher|researchers", ScholarshipLevel::Research),
        (r"fellowships?|fellows?", ScholarshipLevel::Fellowship),
        (r"professional|professionals|executive", ScholarshipLevel::Professional),
        (r"mba|business administration", ScholarshipLevel::MBA),
    ]
    .into_iter()
    .map(|(pattern, level)| {
        let re = Regex::new(&format!(r"(?i)\b(?:{})\b", pattern)).unwrap();
        (re, level)
    })
    .collect()
});

const DATE_FORMATS: &[&str] = &[
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
];

/// Formats without a day component; parsed as the first of the month.
const MONTH_FORMATS: &[&str] = &["%B %Y", "%b %Y"];

/// Looser formats tried after the input has been cleaned up.
const RELAXED_FORMATS: &[&str] = &["%d %B %Y", "%B %d %Y", "%d %B, %Y", "%Y/%m/%d", "%d-%m-%Y"];

/// A parsed deadline: the human label plus the instant, when one could be read.
#[derive(Debug, Clone, PartialEq)]
pub struct Deadline {
    pub label: String,
    pub date: Option<DateTime<Utc>>,
}

impl Deadline {
    fn rolling() -> Self {
        Deadline {
            label: "Rolling".to_string(),
            date: None,
        }
    }
}

/// Split free text on the list delimiters the sheet editors use.
pub fn normalize_list(value: &str) -> Vec<String> {
    LIST_SPLIT_RE
        .split(value)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Map free text onto level tags. Never returns an empty list.
pub fn normalize_levels(value: &str) -> Vec<ScholarshipLevel> {
    let mut levels: Vec<ScholarshipLevel> = Vec::new();
    let mut push = |level: ScholarshipLevel| {
        if !levels.contains(&level) {
            levels.push(level);
        }
    };

    for chunk in normalize_list(value) {
        for token in LEVEL_SPLIT_RE.split(&chunk) {
            let token = token.to_lowercase().replace("post-", "post");
            if WIDE_LEVEL_RE.is_match(&token) {
                push(ScholarshipLevel::Undergraduate);
                push(ScholarshipLevel::Postgraduate);
            }
            for (re, level) in LEVEL_KEYWORDS.iter() {
                if re.is_match(&token) {
                    push(*level);
                }
            }
        }
    }

    if levels.is_empty() {
        levels.push(ScholarshipLevel::Other);
    }
    levels
}

/// Read a deadline cell. Unknown text is kept as the label rather than rejected.
pub fn parse_deadline(value: &str) -> Deadline {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Deadline::rolling();
    }
    if ROLLING_RE.is_match(trimmed) {
        return Deadline {
            label: capitalize(trimmed),
            date: None,
        };
    }

    let parsed = parse_with_formats(trimmed)
        .or_else(|| parse_relaxed(trimmed))
        .or_else(|| parse_date_literal(trimmed));

    match parsed.and_then(|day| at_midday(day).map(|instant| (day, instant))) {
        Some((day, instant)) => Deadline {
            label: format_deadline_label(day),
            date: Some(instant),
        },
        None => Deadline {
            label: capitalize(trimmed),
            date: None,
        },
    }
}

fn parse_with_formats(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            let with_day = format!("1 {}", text);
            MONTH_FORMATS.iter().find_map(|fmt| {
                NaiveDate::parse_from_str(&with_day, &format!("%d {}", fmt)).ok()
            })
        })
}

fn parse_relaxed(text: &str) -> Option<NaiveDate> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.date_naive());
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(text) {
        return Some(ts.date_naive());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(ts.date());
    }

    let cleaned = WEEKDAY_RE.replace_all(text, " ");
    let cleaned = ORDINAL_RE.replace_all(&cleaned, "$1");
    let cleaned = FILLER_RE.replace_all(&cleaned, " ");
    let cleaned = SPACES_RE.replace_all(&cleaned, " ");
    let cleaned = cleaned.trim().trim_matches(',').trim();
    if cleaned.is_empty() || cleaned == text {
        return RELAXED_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok());
    }

    parse_with_formats(cleaned).or_else(|| {
        RELAXED_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(cleaned, fmt).ok())
    })
}

/// `Date(2025,5,1)` is the sheet export literal (zero-based month);
/// `DATE(2025,6,1)` is a formula left unevaluated (one-based month).
fn parse_date_literal(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = GVIZ_DATE_RE.captures(text) {
        let year = caps[1].parse::<i32>().ok()?;
        let month0 = caps[2].parse::<u32>().ok()?;
        let day = caps[3].parse::<u32>().ok()?;
        return NaiveDate::from_ymd_opt(year, month0 + 1, day);
    }
    let caps = FORMULA_DATE_RE.captures(text)?;
    let year = caps[1].parse::<i32>().ok()?;
    let month = caps[2].parse::<u32>().ok()?;
    let day = caps[3].parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Pin a calendar day to 12:00 local time so timezone shifts never move it
/// across a day boundary.
pub fn at_midday(day: NaiveDate) -> Option<DateTime<Utc>> {
    let noon = day.and_hms_opt(12, 0, 0)?;
    Local
        .from_local_datetime(&noon)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .or_else(|| Some(Utc.from_utc_datetime(&noon)))
}

/// "Sunday, June 1st, 2025"
pub fn format_deadline_label(day: NaiveDate) -> String {
    format!(
        "{}, {} {}{}, {}",
        day.format("%A"),
        day.format("%B"),
        day.day(),
        ordinal_suffix(day.day()),
        day.year()
    )
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Lowercase and hyphenate, keeping only ASCII letters and digits.
pub fn slugify(value: &str) -> String {
    SLUG_RE
        .replace_all(&value.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Stable id: slug of the name plus a short md5 of name and link.
pub fn create_scholarship_id(name: &str, link: &str) -> String {
    let slug = slugify(name);
    let slug = if slug.is_empty() { "scholarship".to_string() } else { slug };
    let digest = format!("{:x}", md5::compute(format!("{}-{}", name, link)));
    format!("{}-{}", slug, &digest[..8])
}

pub fn capitalize(input: &str) -> String {
    input
        .to_lowercase()
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse whitespace inside each line, keep single blank lines between
/// paragraphs. `None` when nothing is left.
pub fn normalize_text_block(value: Option<&str>) -> Option<String> {
    let value = value?;
    let mut lines: Vec<String> = Vec::new();
    for line in value.replace("\r\n", "\n").split('\n') {
        let line = SPACES_RE.replace_all(line.trim(), " ").to_string();
        if line.is_empty() && lines.last().map_or(true, |prev| prev.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    let block = lines.join("\n").trim().to_string();
    if block.is_empty() {
        None
    } else {
        Some(block)
    }
}

pub fn unique<T: Eq + Hash + Clone>(values: Vec<T>) -> Vec<T> {
    values.into_iter().unique().collect()
}

/// Alphabetical order by name, case-insensitive first so that "alpha"
/// and "Alpha" sit together.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn list_splits_on_every_delimiter() {
        let items = normalize_list("Tuition, Stipend; Travel / Housing | Books\n• Meals\\Visa");
        assert_eq!(
            items,
            vec!["Tuition", "Stipend", "Travel", "Housing", "Books", "Meals", "Visa"]
        );
    }

    #[test]
    fn list_never_yields_empty_entries() {
        for input in ["", "   ", ",,;;", " , \n , ", "a,,b", "•  •"] {
            assert!(normalize_list(input).iter().all(|s| !s.is_empty()), "{input:?}");
        }
        assert!(normalize_list(",, ;").is_empty());
    }

    #[test]
    fn levels_match_keywords() {
        assert_eq!(
            normalize_levels("Masters and PhD"),
            vec![ScholarshipLevel::Masters, ScholarshipLevel::PhD]
        );
        assert_eq!(normalize_levels("Doctoral"), vec![ScholarshipLevel::PhD]);
        assert_eq!(
            normalize_levels("Master of Business Administration"),
            vec![ScholarshipLevel::Masters, ScholarshipLevel::MBA]
        );
        assert_eq!(normalize_levels("MBA"), vec![ScholarshipLevel::MBA]);
    }

    #[test]
    fn undergraduate_is_not_graduate() {
        assert_eq!(
            normalize_levels("Undergraduate"),
            vec![ScholarshipLevel::Undergraduate]
        );
        assert_eq!(
            normalize_levels("Post-graduate"),
            vec![ScholarshipLevel::Postgraduate]
        );
    }

    #[test]
    fn wide_levels_expand() {
        assert_eq!(
            normalize_levels("All levels"),
            vec![ScholarshipLevel::Undergraduate, ScholarshipLevel::Postgraduate]
        );
    }

    #[test]
    fn levels_never_empty() {
        for input in ["", "???", "see website", "   "] {
            assert_eq!(normalize_levels(input), vec![ScholarshipLevel::Other]);
        }
    }

    #[test]
    fn rolling_and_empty_deadlines() {
        assert_eq!(parse_deadline("Rolling"), Deadline::rolling());
        assert_eq!(parse_deadline(""), Deadline::rolling());
        let open = parse_deadline("open until filled");
        assert_eq!(open.label, "Open Until Filled");
        assert!(open.date.is_none());
    }

    #[test]
    fn iso_deadline_lands_on_its_day_at_noon() {
        let d = parse_deadline("2025-06-01");
        let date = d.date.expect("parsed");
        let local = date.with_timezone(&Local);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(local.hour(), 12);
        assert_eq!(d.label, "Sunday, June 1st, 2025");
    }

    #[test]
    fn deadline_formats() {
        let expect = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        for input in [
            "15 March 2025",
            "15 Mar 2025",
            "March 15, 2025",
            "Mar 15, 2025",
            "03/15/2025",
            "15/03/2025",
            "Saturday, March 15th, 2025",
            "15th of March 2025",
        ] {
            let d = parse_deadline(input);
            let local = d.date.unwrap_or_else(|| panic!("{input}")).with_timezone(&Local);
            assert_eq!(local.date_naive(), expect, "{input}");
            assert_eq!(d.label, "Saturday, March 15th, 2025");
        }
    }

    #[test]
    fn month_only_deadline_is_first_of_month() {
        let d = parse_deadline("November 2025");
        let local = d.date.unwrap().with_timezone(&Local);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2025, 11, 1).unwrap());
    }

    #[test]
    fn date_literals() {
        let gviz = parse_deadline("Date(2025,5,1)");
        assert_eq!(gviz.label, "Sunday, June 1st, 2025");
        let formula = parse_deadline("#ERROR DATE(2025,6,1)");
        assert_eq!(formula.label, "Sunday, June 1st, 2025");
    }

    #[test]
    fn garbage_deadline_keeps_text() {
        let d = parse_deadline("check the WEBSITE");
        assert_eq!(d.label, "Check The Website");
        assert!(d.date.is_none());
    }

    #[test]
    fn ordinals() {
        assert_eq!(ordinal_suffix(1), "st");
        assert_eq!(ordinal_suffix(2), "nd");
        assert_eq!(ordinal_suffix(3), "rd");
        assert_eq!(ordinal_suffix(11), "th");
        assert_eq!(ordinal_suffix(12), "th");
        assert_eq!(ordinal_suffix(13), "th");
        assert_eq!(ordinal_suffix(21), "st");
        assert_eq!(ordinal_suffix(22), "nd");
        assert_eq!(ordinal_suffix(31), "st");
    }

    #[test]
    fn scholarship_id_is_deterministic() {
        let a = create_scholarship_id("Chevening Scholarship", "https://chevening.org");
        let b = create_scholarship_id("Chevening Scholarship", "https://chevening.org");
        assert_eq!(a, b);
        assert!(a.starts_with("chevening-scholarship-"));
        assert_eq!(a.len(), "chevening-scholarship-".len() + 8);
    }

    #[test]
    fn scholarship_id_changes_with_inputs() {
        let base = create_scholarship_id("Chevening", "https://chevening.org");
        assert_ne!(base, create_scholarship_id("Chevening ", "https://chevening.org"));
        assert_ne!(base, create_scholarship_id("Chevening", "https://chevening.org/apply"));
    }

    #[test]
    fn scholarship_id_without_latin_name() {
        let id = create_scholarship_id("奨学金", "https://example.jp");
        assert!(id.starts_with("scholarship-"));
    }

    #[test]
    fn text_block_normalization() {
        assert_eq!(normalize_text_block(None), None);
        assert_eq!(normalize_text_block(Some("  \n \n ")), None);
        assert_eq!(
            normalize_text_block(Some("  First   line \n\n\n Second\tline ")),
            Some("First line\n\nSecond line".to_string())
        );
    }

    #[test]
    fn capitalize_words() {
        assert_eq!(capitalize("full TUITION  waiver"), "Full Tuition Waiver");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn unique_keeps_first_occurrence() {
        assert_eq!(unique(vec!["b", "a", "b", "c", "a"]), vec!["b", "a", "c"]);
    }

    #[test]
    fn names_compare_case_insensitively() {
        let mut names = vec!["beta", "Alpha", "alpha", "Gamma"];
        names.sort_by(|a, b| compare_names(a, b));
        assert_eq!(names, vec!["Alpha", "alpha", "beta", "Gamma"]);
    }
}
