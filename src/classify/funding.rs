use std::fmt;

use serde::{Deserialize, Serialize};

const FULL_KEYWORDS: &[&str] = &[
    "full tuition",
    "full coverage",
    "fully funded",
    "complete funding",
];

const PARTIAL_KEYWORDS: &[&str] = &["partial tuition", "partial coverage", "partial support"];

const BENEFIT_KEYWORDS: &[&str] = &[
    "living allowance",
    "stipend",
    "travel",
    "accommodation",
    "housing",
    "meals",
    "flight",
    "airfare",
    "relocation",
    "book allowance",
    "research grant",
    "conference",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FundingCategory {
    #[serde(rename = "Full")]
    Full,
    #[serde(rename = "Partial")]
    Partial,
    #[serde(rename = "Full (and more)")]
    FullAndMore,
    #[serde(rename = "Partial (and more)")]
    PartialAndMore,
}

impl FundingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundingCategory::Full => "Full",
            FundingCategory::Partial => "Partial",
            FundingCategory::FullAndMore => "Full (and more)",
            FundingCategory::PartialAndMore => "Partial (and more)",
        }
    }

    /// Every category, in filter-option order.
    pub fn all() -> [FundingCategory; 4] {
        [
            FundingCategory::Full,
            FundingCategory::Partial,
            FundingCategory::FullAndMore,
            FundingCategory::PartialAndMore,
        ]
    }

    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::all()
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for FundingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Basis {
    Full,
    Partial,
}

/// Infer full/partial from the funding label, then the coverage text, then
/// the number of coverage items. `None` only when there is no signal at all.
pub fn determine_funding_category(
    funding_type: Option<&str>,
    coverage: &[String],
) -> Option<FundingCategory> {
    let coverage_text = coverage.join(" ").to_lowercase();

    let from_label = funding_type.and_then(|label| {
        let label = label.to_lowercase();
        if label.contains("full") {
            Some(Basis::Full)
        } else if label.contains("partial") {
            Some(Basis::Partial)
        } else {
            None
        }
    });

    let basis = from_label.or_else(|| {
        if coverage.is_empty() {
            None
        } else if FULL_KEYWORDS.iter().any(|k| coverage_text.contains(k)) {
            Some(Basis::Full)
        } else if PARTIAL_KEYWORDS.iter().any(|k| coverage_text.contains(k)) {
            Some(Basis::Partial)
        } else if coverage.len() >= 3 {
            Some(Basis::Full)
        } else {
            Some(Basis::Partial)
        }
    })?;

    let more = BENEFIT_KEYWORDS.iter().any(|k| coverage_text.contains(k));
    Some(match (basis, more) {
        (Basis::Full, false) => FundingCategory::Full,
        (Basis::Full, true) => FundingCategory::FullAndMore,
        (Basis::Partial, false) => FundingCategory::Partial,
        (Basis::Partial, true) => FundingCategory::PartialAndMore,
    })
}
