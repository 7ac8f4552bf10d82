//! JSON HTTP API over the catalog.
//!
//! Routes:
//! - `GET /scholarships`: previews, optionally filtered (`level`, `country`,
//!   `coverage`, `fundingType`, `fundingCategory`, `mode`, `eligibility`
//!   take comma-separated values; plus `q`, `showExpired`, `sort`).
//! - `GET /scholarships/{id}`: one record with full page metadata.
//! - `GET /scholarships/level/{slug}`, `/country/{slug}`, `/funding/{slug}`.
//! - `GET /facets`, `GET /highlights`.

use actix_web::http::StatusCode;
use actix_web::web::{self, get, scope};
use actix_web::{HttpResponse, ResponseError, Scope};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::catalog::{Catalog, Snapshot};
use crate::classify::funding::FundingCategory;
use crate::error::CatalogError;
use crate::http::Fetch;
use crate::models::{ScholarshipLevel, ScholarshipPreview};
use crate::query::{
    country_listing, coverage_listing, level_listing, CatalogQuery, Facets, Highlights, Listing,
    SortOrder,
};

const API_PATH: &str = "/scholarships";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unable to load scholarships")]
    Catalog(#[source] CatalogError),
    #[error("Unable to load scholarship")]
    Detail(#[source] CatalogError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Catalog(_) | ApiError::Detail(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "message": self.to_string() }))
    }
}

async fn snapshot<F: Fetch>(catalog: &Catalog<F>) -> Result<Snapshot, ApiError> {
    catalog.load_scholarships().await.map_err(|e| {
        error!("Catalog load failed: {}", e);
        ApiError::Catalog(e)
    })
}

/// Query string of `GET /scholarships`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub level: Option<String>,
    pub country: Option<String>,
    pub coverage: Option<String>,
    pub funding_type: Option<String>,
    pub funding_category: Option<String>,
    pub mode: Option<String>,
    pub eligibility: Option<String>,
    pub q: Option<String>,
    pub show_expired: Option<bool>,
    pub sort: Option<String>,
}

fn split_param(value: &Option<String>) -> Vec<String> {
    value
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

impl ListParams {
    /// Without parameters this is the whole catalog in name order.
    pub fn to_query(&self) -> Result<CatalogQuery, ApiError> {
        let levels = split_param(&self.level)
            .iter()
            .map(|slug| {
                ScholarshipLevel::from_slug(slug)
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown level '{}'", slug)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let funding_categories = split_param(&self.funding_category)
            .iter()
            .map(|label| {
                FundingCategory::parse(label).ok_or_else(|| {
                    ApiError::BadRequest(format!("unknown funding category '{}'", label))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let sort = match self.sort.as_deref() {
            Some(sort) => sort.parse::<SortOrder>().map_err(ApiError::BadRequest)?,
            None => SortOrder::NameAsc,
        };

        Ok(CatalogQuery {
            levels,
            countries: split_param(&self.country),
            coverage: split_param(&self.coverage),
            funding_types: split_param(&self.funding_type),
            funding_categories,
            modalities: split_param(&self.mode),
            eligibility: split_param(&self.eligibility),
            search: self.q.clone(),
            show_expired: self.show_expired.unwrap_or(true),
            sort,
        })
    }
}

async fn list<F: Fetch>(
    catalog: web::Data<Catalog<F>>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, ApiError> {
    let query = params.to_query()?;
    let items = snapshot(catalog.get_ref()).await?;
    let scholarships = query.apply(&items);
    Ok(HttpResponse::Ok().json(json!({ "scholarships": scholarships })))
}

async fn detail<F: Fetch>(
    catalog: web::Data<Catalog<F>>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let detail = catalog.detail(&id).await.map_err(|e| {
        error!("Detail load failed for {}: {}", id, e);
        ApiError::Detail(e)
    })?;
    match detail {
        Some(detail) => Ok(HttpResponse::Ok().json(detail)),
        None => Err(ApiError::NotFound("Scholarship")),
    }
}

async fn listing<F: Fetch>(
    catalog: &Catalog<F>,
    slug: &str,
    build: fn(&[ScholarshipPreview], &str) -> Option<Listing>,
    what: &'static str,
) -> Result<HttpResponse, ApiError> {
    let items = snapshot(catalog).await?;
    match build(&items, slug) {
        Some(listing) => Ok(HttpResponse::Ok().json(listing)),
        None => Err(ApiError::NotFound(what)),
    }
}

async fn by_level<F: Fetch>(
    catalog: web::Data<Catalog<F>>,
    slug: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    listing(catalog.get_ref(), &slug, level_listing, "Level").await
}

async fn by_country<F: Fetch>(
    catalog: web::Data<Catalog<F>>,
    slug: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    listing(catalog.get_ref(), &slug, country_listing, "Country").await
}

async fn by_funding<F: Fetch>(
    catalog: web::Data<Catalog<F>>,
    slug: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    listing(catalog.get_ref(), &slug, coverage_listing, "Coverage").await
}

async fn facets<F: Fetch>(catalog: web::Data<Catalog<F>>) -> Result<HttpResponse, ApiError> {
    let items = snapshot(catalog.get_ref()).await?;
    Ok(HttpResponse::Ok().json(Facets::collect(&items)))
}

async fn highlights<F: Fetch>(catalog: web::Data<Catalog<F>>) -> Result<HttpResponse, ApiError> {
    let items = snapshot(catalog.get_ref()).await?;
    Ok(HttpResponse::Ok().json(Highlights::collect(&items, catalog.now())))
}

pub fn scholarship_routes<F: Fetch>() -> Scope {
    scope(API_PATH)
        .route("", get().to(list::<F>))
        .route("/level/{slug}", get().to(by_level::<F>))
        .route("/country/{slug}", get().to(by_country::<F>))
        .route("/funding/{slug}", get().to(by_funding::<F>))
        .route("/{id}", get().to(detail::<F>))
}

/// Register every route; the app must carry `web::Data<Catalog<F>>`.
pub fn configure<F: Fetch>(cfg: &mut web::ServiceConfig) {
    cfg.service(scholarship_routes::<F>())
        .route("/facets", get().to(facets::<F>))
        .route("/highlights", get().to(highlights::<F>));
}
