use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use tracing::debug;

use crate::error::FetchError;

/// Scholarship pages often block obvious bots, so present as a desktop browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// The one outbound operation the pipeline needs: GET a URL, return its body.
pub trait Fetch: Send + Sync + 'static {
    fn get_text(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(HttpClient { client })
    }
}

impl Fetch for HttpClient {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {}", url);
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(request_error)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Canned responses keyed by URL. Unknown URLs answer 404.
    #[derive(Default)]
    pub struct StubFetcher {
        routes: Mutex<HashMap<String, Result<String, u16>>>,
        hits: Mutex<HashMap<String, usize>>,
    }

    impl StubFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn ok(self, url: &str, body: &str) -> Self {
            self.set(url, Ok(body.to_string()));
            self
        }

        pub fn status(self, url: &str, status: u16) -> Self {
            self.set(url, Err(status));
            self
        }

        /// Replace a route after construction.
        pub fn set(&self, url: &str, response: Result<String, u16>) {
            self.routes.lock().unwrap().insert(url.to_string(), response);
        }

        pub fn hits(&self, url: &str) -> usize {
            self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
        }

        pub fn total_hits(&self) -> usize {
            self.hits.lock().unwrap().values().sum()
        }
    }

    impl Fetch for StubFetcher {
        async fn get_text(&self, url: &str) -> Result<String, FetchError> {
            *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;
            let response = self.routes.lock().unwrap().get(url).cloned();
            match response {
                Some(Ok(body)) => Ok(body),
                Some(Err(status)) => Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                }),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubFetcher;
    use super::*;

    #[tokio::test]
    async fn stub_serves_routes_and_counts() {
        let stub = StubFetcher::new()
            .ok("https://a.test", "hello")
            .status("https://b.test", 503);

        assert_eq!(stub.get_text("https://a.test").await.unwrap(), "hello");
        let err = stub.get_text("https://b.test").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert!(stub.get_text("https://c.test").await.is_err());
        assert_eq!(stub.hits("https://a.test"), 1);
        assert_eq!(stub.total_hits(), 3);
    }

    #[test]
    fn client_builds() {
        assert!(HttpClient::new(Duration::from_secs(5)).is_ok());
    }
}
