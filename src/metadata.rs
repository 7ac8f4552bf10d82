use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use tracing::{debug, warn};
use url::Url;

use crate::cache::{Clock, TtlCache};
use crate::error::FetchError;
use crate::http::Fetch;
use crate::models::{Scholarship, ScholarshipDetail, ScholarshipPreview};
use crate::presenters::build_excerpt;

const MAX_IMAGES: usize = 10;
const MAX_PARAGRAPHS: usize = 6;
const MIN_PARAGRAPH_CHARS: usize = 60;

static META_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").unwrap());
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<link\b[^>]*>").unwrap());
static IMG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());
static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p\s*>").unwrap());
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .unwrap()
});
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").unwrap());
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// (attribute, value) pairs that carry a page description, by priority.
const DESCRIPTION_TAGS: &[(&str, &str)] = &[
    ("name", "description"),
    ("property", "og:description"),
    ("name", "twitter:description"),
];

const IMAGE_TAGS: &[(&str, &str)] = &[("property", "og:image"), ("name", "twitter:image")];

/// What a scholarship page told us, as cached per link.
#[derive(Debug, Clone, PartialEq)]
pub struct PageMetadata {
    pub images: Vec<String>,
    pub summary: Option<String>,
    pub long_description: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

fn attributes(tag: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(tag)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            (caps[1].to_ascii_lowercase(), decode_entities(value))
        })
        .collect()
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn decode_entity(caps: &Captures) -> String {
    let raw = &caps[1];
    let decoded = if let Some(hex) = raw.strip_prefix("#x").or_else(|| raw.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
    } else if let Some(dec) = raw.strip_prefix('#') {
        dec.parse::<u32>().ok().and_then(char::from_u32)
    } else {
        match raw {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            "ndash" => Some('–'),
            "mdash" => Some('—'),
            "rsquo" => Some('’'),
            "lsquo" => Some('‘'),
            "rdquo" => Some('”'),
            "ldquo" => Some('“'),
            "hellip" => Some('…'),
            "copy" => Some('©'),
            _ => None,
        }
    };
    match decoded {
        Some(c) => c.to_string(),
        None => caps[0].to_string(),
    }
}

/// Decode named and numeric character references. Unknown names are kept.
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE.replace_all(text, decode_entity).into_owned()
}

fn clean_text(fragment: &str) -> String {
    let text = TAG_RE.replace_all(fragment, " ");
    let text = decode_entities(&text);
    SPACES_RE.replace_all(&text, " ").trim().to_string()
}

/// Absolute form of `candidate` relative to the page, or `None` for
/// inline `data:` images and unusable values.
pub fn resolve_url(candidate: &str, page_url: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")) {
        return None;
    }
    let resolved = match Url::parse(page_url) {
        Ok(base) => base.join(candidate).ok()?,
        Err(_) => Url::parse(candidate).ok()?,
    };
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// `(summary, long description)`: meta descriptions first, then long paragraphs.
pub fn extract_descriptions(html: &str) -> (Option<String>, Option<String>) {
    let metas: Vec<Vec<(String, String)>> =
        META_RE.find_iter(html).map(|m| attributes(m.as_str())).collect();

    for (key, wanted) in DESCRIPTION_TAGS {
        let content = metas
            .iter()
            .filter(|attrs| attr(attrs, key).is_some_and(|v| v.eq_ignore_ascii_case(wanted)))
            .find_map(|attrs| attr(attrs, "content").map(str::trim).filter(|c| !c.is_empty()));
        if let Some(content) = content {
            return (Some(content.to_string()), None);
        }
    }

    let body = SCRIPT_RE.replace_all(html, " ");
    let paragraphs: Vec<String> = PARAGRAPH_RE
        .captures_iter(&body)
        .map(|caps| clean_text(&caps[1]))
        .filter(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
        .take(MAX_PARAGRAPHS)
        .collect();

    match paragraphs.first() {
        Some(first) => (Some(first.clone()), Some(paragraphs.join("\n\n"))),
        None => (None, None),
    }
}

/// Candidate images in priority order: social tags, `image_src`, then `<img>`s.
pub fn extract_images(html: &str, page_url: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    let metas: Vec<Vec<(String, String)>> =
        META_RE.find_iter(html).map(|m| attributes(m.as_str())).collect();
    for (key, wanted) in IMAGE_TAGS {
        let content = metas
            .iter()
            .find(|attrs| attr(attrs, key).is_some_and(|v| v.eq_ignore_ascii_case(wanted)))
            .and_then(|attrs| attr(attrs, "content"));
        if let Some(content) = content {
            candidates.push(content.to_string());
        }
    }

    let image_src = LINK_RE
        .find_iter(html)
        .map(|m| attributes(m.as_str()))
        .find(|attrs| attr(attrs, "rel").is_some_and(|v| v.eq_ignore_ascii_case("image_src")))
        .and_then(|attrs| attr(&attrs, "href").map(str::to_string));
    candidates.extend(image_src);

    for tag in IMG_RE.find_iter(html) {
        let attrs = attributes(tag.as_str());
        if let Some(source) = attr(&attrs, "data-src").or_else(|| attr(&attrs, "src")) {
            candidates.push(source.to_string());
        }
    }

    let mut images: Vec<String> = Vec::new();
    for url in candidates.iter().filter_map(|c| resolve_url(c, page_url)) {
        if !images.contains(&url) {
            images.push(url);
            if images.len() == MAX_IMAGES {
                break;
            }
        }
    }
    images
}

pub fn extract_metadata(page_url: &str, html: &str, fetched_at: DateTime<Utc>) -> PageMetadata {
    let (summary, long_description) = extract_descriptions(html);
    PageMetadata {
        images: extract_images(html, page_url),
        summary,
        long_description,
        fetched_at,
    }
}

/// Attaches scraped page metadata to sheet records. Failures degrade to
/// sheet text and the template excerpt; nothing here returns an error.
pub struct Enricher<F> {
    fetcher: Arc<F>,
    cache: TtlCache<String, PageMetadata>,
}

impl<F: Fetch> Enricher<F> {
    pub fn new(fetcher: Arc<F>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Enricher {
            fetcher,
            cache: TtlCache::new(ttl, clock),
        }
    }

    /// Page metadata for `link`, from cache while fresh. Failed fetches are not cached.
    pub async fn metadata(&self, link: &str) -> Result<PageMetadata, FetchError> {
        if let Some(hit) = self.cache.get(link) {
            debug!("Metadata cache hit: {}", link);
            return Ok(hit);
        }
        let html = self.fetcher.get_text(link).await?;
        let page = extract_metadata(link, &html, self.cache.now());
        self.cache.insert(link.to_string(), page.clone());
        Ok(page)
    }

    pub async fn enrich_preview(&self, scholarship: Scholarship) -> ScholarshipPreview {
        match self.metadata(&scholarship.link).await {
            Ok(page) => {
                let short_description = scholarship
                    .sheet_summary
                    .clone()
                    .or(page.summary)
                    .or(page.long_description)
                    .unwrap_or_else(|| build_excerpt(&scholarship));
                ScholarshipPreview {
                    preview_image: page.images.into_iter().next(),
                    short_description: Some(short_description),
                    metadata_refreshed_at: Some(page.fetched_at),
                    scholarship,
                }
            }
            Err(e) => {
                warn!("Preview metadata fetch failed for {}: {}", scholarship.name, e);
                let short_description = scholarship
                    .sheet_summary
                    .clone()
                    .unwrap_or_else(|| build_excerpt(&scholarship));
                ScholarshipPreview {
                    preview_image: None,
                    short_description: Some(short_description),
                    metadata_refreshed_at: None,
                    scholarship,
                }
            }
        }
    }

    pub async fn resolve_detail(&self, mut preview: ScholarshipPreview) -> ScholarshipDetail {
        let sheet_summary = preview.scholarship.sheet_summary.clone();
        let sheet_breakdown = preview.scholarship.sheet_breakdown.clone();

        match self.metadata(&preview.scholarship.link).await {
            Ok(page) => {
                let excerpt = || build_excerpt(&preview.scholarship);
                let summary = sheet_summary
                    .or_else(|| page.summary.clone())
                    .or_else(|| page.long_description.clone())
                    .unwrap_or_else(excerpt);
                let long_description = sheet_breakdown
                    .or_else(|| page.long_description.clone())
                    .or_else(|| page.summary.clone())
                    .unwrap_or_else(excerpt);
                preview.metadata_refreshed_at = Some(page.fetched_at);
                ScholarshipDetail {
                    preview,
                    images: page.images,
                    summary: Some(summary),
                    long_description: Some(long_description),
                }
            }
            Err(e) => {
                warn!("Metadata resolution failed for {}: {}", preview.name(), e);
                let fallback = preview
                    .short_description
                    .clone()
                    .unwrap_or_else(|| build_excerpt(&preview.scholarship));
                ScholarshipDetail {
                    images: preview.preview_image.iter().cloned().collect(),
                    summary: Some(sheet_summary.unwrap_or_else(|| fallback.clone())),
                    long_description: Some(sheet_breakdown.unwrap_or(fallback)),
                    preview,
                }
            }
        }
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::cache::testing::ManualClock;
    use crate::http::testing::StubFetcher;
    use crate::models::fixtures;

    const PAGE: &str = "https://uni.test/scholarships/grant";

    const META_PAGE: &str = r#"<html><head>
        <meta property="og:description" content="Social blurb">
        <meta name="description" content="  Funding for &amp; by scholars.  ">
        <meta property="og:image" content="/img/hero.jpg">
        <meta name="twitter:image" content="https://cdn.test/card.png">
        <link rel="image_src" href="/img/hero.jpg">
        </head><body>
        <img data-src="lazy.png" src="placeholder.gif">
        <img src="data:image/png;base64,AAAA">
        <img src='https://cdn.test/card.png'>
        </body></html>"#;

    fn long_paragraph(tag: &str) -> String {
        format!(
            "<p class=\"lead\">{} offers <b>generous</b> support to international students each year.</p>",
            tag
        )
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn meta_description_priority() {
        let (summary, long) = extract_descriptions(META_PAGE);
        assert_eq!(summary.as_deref(), Some("Funding for & by scholars."));
        assert_eq!(long, None);
    }

    #[test]
    fn paragraphs_when_no_meta() {
        let html = format!(
            "<body><p>Too short.</p>{}{}<script>var p = '<p>{}</p>';</script></body>",
            long_paragraph("First"),
            long_paragraph("Second"),
            "x".repeat(80)
        );
        let (summary, long) = extract_descriptions(&html);
        let first = "First offers generous support to international students each year.";
        assert_eq!(summary.as_deref(), Some(first));
        assert_eq!(
            long.as_deref(),
            Some(format!(
                "{}\n\nSecond offers generous support to international students each year.",
                first
            )
            .as_str())
        );
    }

    #[test]
    fn paragraphs_capped_at_six() {
        let html: String = (0..9).map(|i| long_paragraph(&format!("P{}", i))).collect();
        let (_, long) = extract_descriptions(&html);
        assert_eq!(long.unwrap().split("\n\n").count(), 6);
    }

    #[test]
    fn images_resolved_deduped_in_order() {
        let images = extract_images(META_PAGE, PAGE);
        assert_eq!(
            images,
            vec![
                "https://uni.test/img/hero.jpg",
                "https://cdn.test/card.png",
                "https://uni.test/scholarships/lazy.png",
            ]
        );
    }

    #[test]
    fn images_capped_at_ten() {
        let html: String = (0..15).map(|i| format!("<img src=\"/i{}.png\">", i)).collect();
        assert_eq!(extract_images(&html, PAGE).len(), 10);
    }

    #[test]
    fn entities() {
        assert_eq!(decode_entities("a &amp; b &#39;c&#x27; &unknown;"), "a & b 'c' &unknown;");
    }

    #[tokio::test]
    async fn preview_uses_cache_within_ttl() {
        let stub = Arc::new(StubFetcher::new().ok(PAGE, META_PAGE));
        let clock = ManualClock::new(start());
        let enricher = Enricher::new(stub.clone(), Duration::from_secs(3600), clock.clone());

        let first = enricher.enrich_preview(fixtures::scholarship("Grant", PAGE)).await;
        let second = enricher.enrich_preview(fixtures::scholarship("Grant", PAGE)).await;
        assert_eq!(stub.hits(PAGE), 1);
        assert_eq!(first, second);
        assert_eq!(first.preview_image.as_deref(), Some("https://uni.test/img/hero.jpg"));
        assert_eq!(first.short_description.as_deref(), Some("Funding for & by scholars."));
        assert_eq!(first.metadata_refreshed_at, Some(start()));

        clock.advance(Duration::from_secs(3600));
        enricher.enrich_preview(fixtures::scholarship("Grant", PAGE)).await;
        assert_eq!(stub.hits(PAGE), 2);
    }

    #[tokio::test]
    async fn sheet_summary_wins_over_page() {
        let stub = Arc::new(StubFetcher::new().ok(PAGE, META_PAGE));
        let enricher = Enricher::new(stub, Duration::from_secs(60), ManualClock::new(start()));
        let mut s = fixtures::scholarship("Grant", PAGE);
        s.sheet_summary = Some("From the sheet".to_string());
        let preview = enricher.enrich_preview(s).await;
        assert_eq!(preview.short_description.as_deref(), Some("From the sheet"));
    }

    #[tokio::test]
    async fn failure_falls_back_and_is_not_cached() {
        let stub = Arc::new(StubFetcher::new().status(PAGE, 500));
        let enricher = Enricher::new(stub.clone(), Duration::from_secs(60), ManualClock::new(start()));
        let s = fixtures::scholarship("Grant", PAGE);
        let excerpt = build_excerpt(&s);

        let preview = enricher.enrich_preview(s).await;
        assert_eq!(preview.preview_image, None);
        assert_eq!(preview.short_description.as_deref(), Some(excerpt.as_str()));
        assert_eq!(preview.metadata_refreshed_at, None);

        let detail = enricher.resolve_detail(preview).await;
        assert_eq!(stub.hits(PAGE), 2);
        assert!(detail.images.is_empty());
        assert_eq!(detail.summary.as_deref(), Some(excerpt.as_str()));
        assert_eq!(detail.long_description.as_deref(), Some(excerpt.as_str()));
    }

    #[tokio::test]
    async fn failed_detail_keeps_preview_image() {
        let stub = Arc::new(StubFetcher::new().status(PAGE, 503));
        let enricher = Enricher::new(stub, Duration::from_secs(60), ManualClock::new(start()));
        let mut preview = fixtures::preview(fixtures::scholarship("Grant", PAGE));
        preview.preview_image = Some("https://cdn.test/a.png".to_string());
        preview.short_description = Some("Short".to_string());

        let detail = enricher.resolve_detail(preview).await;
        assert_eq!(detail.images, vec!["https://cdn.test/a.png"]);
        assert_eq!(detail.summary.as_deref(), Some("Short"));
        assert_eq!(detail.long_description.as_deref(), Some("Short"));
    }

    #[tokio::test]
    async fn detail_prefers_sheet_breakdown() {
        let html = format!("<body>{}</body>", long_paragraph("Only"));
        let stub = Arc::new(StubFetcher::new().ok(PAGE, &html));
        let enricher = Enricher::new(stub, Duration::from_secs(60), ManualClock::new(start()));
        let mut s = fixtures::scholarship("Grant", PAGE);
        s.sheet_breakdown = Some("Sheet breakdown".to_string());

        let detail = enricher.resolve_detail(fixtures::preview(s)).await;
        assert_eq!(
            detail.summary.as_deref(),
            Some("Only offers generous support to international students each year.")
        );
        assert_eq!(detail.long_description.as_deref(), Some("Sheet breakdown"));
        assert!(detail.images.is_empty());
        assert_eq!(detail.preview.metadata_refreshed_at, Some(start()));
    }
}
