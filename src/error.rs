use thiserror::Error;

/// A single GET that did not produce a body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// The published sheet could not be turned into rows.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("unexpected sheet response: missing response wrapper")]
    MissingWrapper,
    #[error("unexpected sheet response: unable to locate JSON payload")]
    MissingPayload,
    #[error("failed to parse sheet payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("required columns missing in sheet header: {0}")]
    MissingColumns(String),
}

/// Errors that abort a whole catalog load. Everything else degrades per record.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to fetch spreadsheet: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Sheet(#[from] SheetError),
}
