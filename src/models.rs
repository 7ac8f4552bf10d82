use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::funding::FundingCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScholarshipLevel {
    Undergraduate,
    Masters,
    PhD,
    Postdoctoral,
    Research,
    Fellowship,
    Postgraduate,
    Professional,
    MBA,
    /// Fallback when the sheet text names no recognizable level.
    Other,
}

impl ScholarshipLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScholarshipLevel::Undergraduate => "Undergraduate",
            ScholarshipLevel::Masters => "Masters",
            ScholarshipLevel::PhD => "PhD",
            ScholarshipLevel::Postdoctoral => "Postdoctoral",
            ScholarshipLevel::Research => "Research",
            ScholarshipLevel::Fellowship => "Fellowship",
            ScholarshipLevel::Postgraduate => "Postgraduate",
            ScholarshipLevel::Professional => "Professional",
            ScholarshipLevel::MBA => "MBA",
            ScholarshipLevel::Other => "Other",
        }
    }

    /// Resolve a URL slug such as `postgrad` or `doctoral`.
    pub fn from_slug(slug: &str) -> Option<Self> {
        let level = match slug.trim().to_lowercase().as_str() {
            "undergraduate" | "undergrad" | "bachelors" | "bachelor" => {
                ScholarshipLevel::Undergraduate
            }
            "masters" | "master" => ScholarshipLevel::Masters,
            "postgraduate" | "postgrad" => ScholarshipLevel::Postgraduate,
            "phd" | "doctoral" | "doctorate" => ScholarshipLevel::PhD,
            "postdoctoral" | "postdoc" => ScholarshipLevel::Postdoctoral,
            "research" => ScholarshipLevel::Research,
            "fellowship" => ScholarshipLevel::Fellowship,
            "professional" => ScholarshipLevel::Professional,
            "mba" => ScholarshipLevel::MBA,
            _ => return None,
        };
        Some(level)
    }
}

impl fmt::Display for ScholarshipLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One usable spreadsheet row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scholarship {
    pub id: String,
    pub name: String,
    pub countries: Vec<String>,
    pub level_tags: Vec<ScholarshipLevel>,
    pub coverage: Vec<String>,
    pub funding_type: Option<String>,
    pub funding_category: Option<FundingCategory>,
    pub organisation: Option<String>,
    pub deadline_label: String,
    pub deadline_date: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub link: String,
    pub sheet_summary: Option<String>,
    pub sheet_breakdown: Option<String>,
    pub eligibility: Vec<String>,
    pub subjects: Vec<String>,
    pub delivery_modes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScholarshipPreview {
    #[serde(flatten)]
    pub scholarship: Scholarship,
    pub preview_image: Option<String>,
    pub short_description: Option<String>,
    pub metadata_refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScholarshipDetail {
    #[serde(flatten)]
    pub preview: ScholarshipPreview,
    pub images: Vec<String>,
    pub summary: Option<String>,
    pub long_description: Option<String>,
}

impl ScholarshipPreview {
    pub fn id(&self) -> &str {
        &self.scholarship.id
    }

    pub fn name(&self) -> &str {
        &self.scholarship.name
    }
}
