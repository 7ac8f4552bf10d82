use crate::models::Scholarship;

/// Join with commas and a final conjunction: `a`, `a and b`, `a, b, and c`.
pub fn format_list<S: AsRef<str>>(values: &[S], conjunction: &str) -> String {
    match values {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [first, second] => format!("{} {} {}", first.as_ref(), conjunction, second.as_ref()),
        [rest @ .., last] => {
            let head: Vec<&str> = rest.iter().map(|v| v.as_ref()).collect();
            format!("{}, {} {}", head.join(", "), conjunction, last.as_ref())
        }
    }
}

fn level_phrase(scholarship: &Scholarship, fallback: &str) -> String {
    if scholarship.level_tags.is_empty() {
        return fallback.to_string();
    }
    let labels: Vec<&str> = scholarship.level_tags.iter().map(|l| l.as_str()).collect();
    format_list(&labels, "and").to_lowercase()
}

fn location_phrase(scholarship: &Scholarship, fallback: &str) -> String {
    if scholarship.countries.is_empty() {
        fallback.to_string()
    } else {
        format_list(&scholarship.countries, "and")
    }
}

/// Template description used whenever neither the sheet nor the page has one.
pub fn build_excerpt(scholarship: &Scholarship) -> String {
    let level = level_phrase(scholarship, "exceptional scholars");
    let location = location_phrase(scholarship, "global talent");

    let coverage: Vec<&String> = scholarship.coverage.iter().take(3).collect();
    let coverage_text = if coverage.is_empty() {
        "Comprehensive benefits support your journey abroad.".to_string()
    } else {
        format!("Highlights include {}.", format_list(&coverage, "and").to_lowercase())
    };

    let deadline = if scholarship.deadline_label.trim().is_empty() {
        "a rolling review timeline"
    } else {
        scholarship.deadline_label.as_str()
    };

    format!(
        "{} rewards {} pursuing opportunities in {}. {} Submit your application by {}.",
        scholarship.name, level, location, coverage_text, deadline
    )
}

pub fn build_image_alt(scholarship: &Scholarship) -> String {
    format!(
        "{} scholarship imagery celebrating {} heading to {}.",
        scholarship.name,
        level_phrase(scholarship, "emerging leaders"),
        location_phrase(scholarship, "global destinations")
    )
}
