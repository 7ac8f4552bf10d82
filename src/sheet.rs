use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::classify::funding::determine_funding_category;
use crate::error::{CatalogError, SheetError};
use crate::http::Fetch;
use crate::models::Scholarship;
use crate::text::{
    capitalize, compare_names, create_scholarship_id, normalize_levels, normalize_list,
    normalize_text_block, parse_deadline, unique,
};

const RESPONSE_MARKER: &str = "google.visualization.Query.setResponse(";

#[derive(Debug, Deserialize)]
struct SheetResponse {
    table: SheetTable,
}

#[derive(Debug, Default, Deserialize)]
pub struct SheetTable {
    #[serde(default)]
    pub cols: Vec<SheetColumn>,
    #[serde(default)]
    pub rows: Vec<SheetRow>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SheetColumn {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SheetRow {
    #[serde(default)]
    pub c: Vec<Option<SheetCell>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SheetCell {
    #[serde(default)]
    pub v: Value,
    #[serde(default)]
    pub f: Option<String>,
}

impl SheetCell {
    /// Raw value as text; `None` for null or blank.
    fn text(&self) -> Option<String> {
        let text = match &self.v {
            Value::Null => return None,
            Value::String(s) => s.trim().to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
                    format!("{}", f as i64)
                }
                _ => n.to_string(),
            },
            other => other.to_string(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Unwrap the `setResponse(...)` JSONP envelope and parse the table inside.
pub fn parse_response(payload: &str) -> Result<SheetTable, SheetError> {
    let marker_at = payload
        .find(RESPONSE_MARKER)
        .ok_or(SheetError::MissingWrapper)?;
    let after_marker = marker_at + RESPONSE_MARKER.len();

    let start = payload[after_marker..]
        .find('{')
        .map(|i| after_marker + i)
        .ok_or(SheetError::MissingPayload)?;
    let end = payload.rfind('}').ok_or(SheetError::MissingPayload)?;
    if end <= start {
        return Err(SheetError::MissingPayload);
    }

    let response: SheetResponse = serde_json::from_str(&payload[start..=end])?;
    Ok(response.table)
}

/// Semantic columns the sheet may carry, in header-matching order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Country,
    Level,
    Coverage,
    Deadline,
    Link,
    FundingType,
    Organisation,
    ShortSummary,
    DetailedBreakdown,
    Eligibility,
    Subjects,
    Modality,
}

const FIELD_COUNT: usize = 13;

const COLUMN_ALIASES: [(Field, &[&str]); FIELD_COUNT] = [
    (Field::Name, &["scholarship name", "name"]),
    (Field::Country, &["country", "countries"]),
    (Field::Level, &["level", "study level"]),
    (Field::Coverage, &["coverage", "benefits"]),
    (Field::Deadline, &["deadline", "application deadline"]),
    (Field::Link, &["link to apply", "link", "application link"]),
    (Field::FundingType, &["type of funding", "funding type"]),
    (
        Field::Organisation,
        &[
            "organisation offering the scholarship",
            "organization offering the scholarship",
            "provider",
        ],
    ),
    (Field::ShortSummary, &["short summary", "overview"]),
    (Field::DetailedBreakdown, &["detailed breakdown", "breakdown"]),
    (Field::Eligibility, &["eligibility criteria", "eligibility"]),
    (Field::Subjects, &["available subjects", "fields of study"]),
    (Field::Modality, &["on-campus or remote", "mode", "delivery"]),
];

fn normalize_header(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Which column position holds each semantic field.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    positions: [Option<usize>; FIELD_COUNT],
}

impl ColumnIndex {
    /// First column (left to right) whose header matches an alias wins.
    pub fn from_headers(cols: &[SheetColumn]) -> Self {
        let mut index = ColumnIndex::default();
        for (position, col) in cols.iter().enumerate() {
            let header = normalize_header(col.label.as_deref().unwrap_or_default());
            if header.is_empty() {
                continue;
            }
            for (slot, (_, aliases)) in COLUMN_ALIASES.iter().enumerate() {
                if index.positions[slot].is_none() && aliases.contains(&header.as_str()) {
                    index.positions[slot] = Some(position);
                }
            }
        }
        index
    }

    pub fn position(&self, field: Field) -> Option<usize> {
        COLUMN_ALIASES
            .iter()
            .position(|(f, _)| *f == field)
            .and_then(|slot| self.positions[slot])
    }

    fn require(&self) -> Result<(), SheetError> {
        let missing: Vec<&str> = [(Field::Name, "name"), (Field::Link, "link")]
            .into_iter()
            .filter(|(field, _)| self.position(*field).is_none())
            .map(|(_, label)| label)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SheetError::MissingColumns(missing.join(", ")))
        }
    }

    fn read(&self, row: &SheetRow, field: Field) -> Option<String> {
        let position = self.position(field)?;
        row.c.get(position)?.as_ref()?.text()
    }
}

fn read_list(row: &SheetRow, index: &ColumnIndex, field: Field) -> Vec<String> {
    unique(normalize_list(&index.read(row, field).unwrap_or_default()))
}

/// Build a scholarship from one row; `None` when name or link is missing.
pub fn map_row(row: &SheetRow, index: &ColumnIndex, now: DateTime<Utc>) -> Option<Scholarship> {
    let name = index.read(row, Field::Name)?;
    let link = index.read(row, Field::Link)?;

    let countries = read_list(row, index, Field::Country);
    let level_tags = normalize_levels(&index.read(row, Field::Level).unwrap_or_default());
    let coverage = unique(
        read_list(row, index, Field::Coverage)
            .iter()
            .map(|c| capitalize(c))
            .collect(),
    );
    let funding_type = normalize_text_block(index.read(row, Field::FundingType).as_deref())
        .map(|f| capitalize(&f));
    let funding_category = determine_funding_category(funding_type.as_deref(), &coverage);
    let deadline = parse_deadline(&index.read(row, Field::Deadline).unwrap_or_default());
    let delivery_modes = unique(
        read_list(row, index, Field::Modality)
            .iter()
            .map(|m| capitalize(m))
            .collect(),
    );

    Some(Scholarship {
        id: create_scholarship_id(&name, &link),
        countries,
        level_tags,
        coverage,
        funding_type,
        funding_category,
        organisation: normalize_text_block(index.read(row, Field::Organisation).as_deref()),
        deadline_label: deadline.label,
        is_expired: deadline.date.is_some_and(|date| date < now),
        deadline_date: deadline.date,
        sheet_summary: normalize_text_block(index.read(row, Field::ShortSummary).as_deref()),
        sheet_breakdown: normalize_text_block(index.read(row, Field::DetailedBreakdown).as_deref()),
        eligibility: read_list(row, index, Field::Eligibility),
        subjects: read_list(row, index, Field::Subjects),
        delivery_modes,
        name,
        link,
    })
}

#[cfg(feature = "rayon")]
fn map_rows(rows: &[SheetRow], index: &ColumnIndex, now: DateTime<Utc>) -> Vec<Scholarship> {
    rows.par_iter()
        .filter_map(|row| map_row(row, index, now))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn map_rows(rows: &[SheetRow], index: &ColumnIndex, now: DateTime<Utc>) -> Vec<Scholarship> {
    rows.iter()
        .filter_map(|row| map_row(row, index, now))
        .collect()
}

/// Parse a full gviz payload into scholarships sorted by name.
pub fn scholarships_from_payload(
    payload: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Scholarship>, SheetError> {
    let table = parse_response(payload)?;
    let index = ColumnIndex::from_headers(&table.cols);
    index.require()?;

    let mut scholarships = map_rows(&table.rows, &index, now);
    scholarships.sort_by(|a, b| compare_names(&a.name, &b.name));

    let dropped = table.rows.len() - scholarships.len();
    info!(
        "Sheet: {} rows, {} usable ({} without name or link)",
        table.rows.len(),
        scholarships.len(),
        dropped
    );
    Ok(scholarships)
}

pub async fn fetch_sheet<F: Fetch>(
    fetcher: &F,
    url: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Scholarship>, CatalogError> {
    info!("Fetching spreadsheet: {}", url);
    let payload = fetcher.get_text(url).await?;
    Ok(scholarships_from_payload(&payload, now)?)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    /// Wrap a table in the JSONP envelope the sheet endpoint returns.
    pub fn gviz_payload(headers: &[&str], rows: &[Vec<Option<&str>>]) -> String {
        let cols: Vec<_> = headers.iter().map(|h| json!({ "label": h })).collect();
        let rows: Vec<_> = rows
            .iter()
            .map(|cells| {
                let c: Vec<_> = cells
                    .iter()
                    .map(|cell| match cell {
                        Some(v) => json!({ "v": v }),
                        None => serde_json::Value::Null,
                    })
                    .collect();
                json!({ "c": c })
            })
            .collect();
        let body = json!({ "version": "0.6", "status": "ok", "table": { "cols": cols, "rows": rows } });
        format!(
            "/*O_o*/\ngoogle.visualization.Query.setResponse({});",
            body
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::fixtures::gviz_payload;
    use super::*;
    use crate::classify::funding::FundingCategory;
    use crate::http::testing::StubFetcher;
    use crate::models::ScholarshipLevel;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn envelope_errors() {
        assert!(matches!(parse_response("{}"), Err(SheetError::MissingWrapper)));
        assert!(matches!(
            parse_response("google.visualization.Query.setResponse(nothing here"),
            Err(SheetError::MissingPayload)
        ));
        assert!(matches!(
            parse_response("google.visualization.Query.setResponse({not json});"),
            Err(SheetError::Json(_))
        ));
    }

    #[test]
    fn header_aliases_first_match_wins() {
        let cols: Vec<SheetColumn> = ["Provider", "  Scholarship   Name ", "Name", "Application Link"]
            .iter()
            .map(|l| SheetColumn {
                label: Some(l.to_string()),
            })
            .collect();
        let index = ColumnIndex::from_headers(&cols);
        assert_eq!(index.position(Field::Organisation), Some(0));
        assert_eq!(index.position(Field::Name), Some(1));
        assert_eq!(index.position(Field::Link), Some(3));
        assert_eq!(index.position(Field::Deadline), None);
    }

    #[test]
    fn missing_required_columns_is_fatal() {
        let payload = gviz_payload(&["Name", "Country"], &[vec![Some("A"), Some("UK")]]);
        match scholarships_from_payload(&payload, now()) {
            Err(SheetError::MissingColumns(missing)) => assert_eq!(missing, "link"),
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn maps_full_row() {
        let payload = gviz_payload(
            &[
                "Scholarship Name",
                "Country",
                "Level",
                "Coverage",
                "Deadline",
                "Link to apply",
                "Type of funding",
                "Short summary",
                "On-campus or remote",
            ],
            &[vec![
                Some("Chevening Scholarship"),
                Some("UK"),
                Some("Masters"),
                Some("tuition fees, monthly stipend; tuition fees"),
                Some("1 June 2025"),
                Some("https://chevening.org/apply"),
                Some("fully   funded"),
                Some("  One year  master's in the UK. "),
                Some("on-campus"),
            ]],
        );
        let rows = scholarships_from_payload(&payload, now()).unwrap();
        assert_eq!(rows.len(), 1);
        let s = &rows[0];
        assert_eq!(s.name, "Chevening Scholarship");
        assert!(s.id.starts_with("chevening-scholarship-"));
        assert_eq!(s.countries, vec!["UK"]);
        assert_eq!(s.level_tags, vec![ScholarshipLevel::Masters]);
        assert_eq!(s.coverage, vec!["Tuition Fees", "Monthly Stipend"]);
        assert_eq!(s.funding_type.as_deref(), Some("Fully Funded"));
        assert_eq!(s.funding_category, Some(FundingCategory::FullAndMore));
        assert_eq!(s.deadline_label, "Sunday, June 1st, 2025");
        assert!(!s.is_expired);
        assert_eq!(s.sheet_summary.as_deref(), Some("One year master's in the UK."));
        assert_eq!(s.delivery_modes, vec!["On-campus"]);
    }

    #[test]
    fn rows_without_name_or_link_are_dropped_and_rest_sorted() {
        let payload = gviz_payload(
            &["Name", "Link", "Deadline"],
            &[
                vec![Some("zeta"), Some("https://z.test"), Some("1 January 2024")],
                vec![Some("No link"), None, None],
                vec![None, Some("https://nameless.test"), None],
                vec![Some("Alpha"), Some("https://a.test"), Some("   ")],
            ],
        );
        let rows = scholarships_from_payload(&payload, now()).unwrap();
        let names: Vec<&str> = rows.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "zeta"]);
        assert_eq!(rows[0].deadline_label, "Rolling");
        assert!(rows[1].is_expired);
    }

    #[test]
    fn numeric_cells_are_stringified() {
        let payload = r#"google.visualization.Query.setResponse({"table":{"cols":[{"label":"Name"},{"label":"Link"},{"label":"Deadline"}],"rows":[{"c":[{"v":2025.0},{"v":"https://n.test"},{"v":"Date(2025,5,1)","f":"6/1/2025"}]}]}});"#;
        let rows = scholarships_from_payload(payload, now()).unwrap();
        assert_eq!(rows[0].name, "2025");
        assert_eq!(rows[0].deadline_label, "Sunday, June 1st, 2025");
    }

    #[tokio::test]
    async fn fetch_reports_http_failure() {
        let stub = StubFetcher::new().status("https://sheet.test", 500);
        let err = fetch_sheet(&stub, "https://sheet.test", now()).await.unwrap_err();
        assert!(matches!(err, CatalogError::Fetch(_)));
    }
}
