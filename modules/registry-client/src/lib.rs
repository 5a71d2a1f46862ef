pub mod error;
pub mod session;
pub mod types;

pub use error::{RegistryError, Result};
pub use session::{extract_csrf_token, join_set_cookies, Session};
pub use types::{RegistryRecord, SearchRequest, SearchResponse};

use std::time::Duration;

use reqwest::header::{COOKIE, ORIGIN, REFERER, SET_COOKIE, USER_AGENT};
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://halal.muis.gov.sg/halal/establishments";
pub const DEFAULT_SEARCH_URL: &str = "https://halal.muis.gov.sg/api/halal/establishments";

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Client for the certification authority's public establishment directory.
///
/// The directory has no documented API; the search endpoint is the one its own
/// page calls, so every request replays the page's session credentials.
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
    search_url: String,
    origin: String,
}

impl RegistryClient {
    pub fn new(base_url: &str, search_url: &str, timeout: Duration) -> Result<Self> {
        let parsed =
            url::Url::parse(base_url).map_err(|e| RegistryError::InvalidUrl(format!("{base_url}: {e}")))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            search_url: search_url.to_string(),
            origin: parsed.origin().ascii_serialization(),
        })
    }

    /// Load the directory page and pull a CSRF token and cookies out of it.
    ///
    /// Never fails: any transport or status error yields [`Session::unavailable`].
    /// Callers must check [`Session::is_ready`] before searching.
    pub async fn acquire_session(&self) -> Session {
        match self.fetch_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(url = %self.base_url, error = %e, "Session bootstrap failed");
                Session::unavailable()
            }
        }
    }

    async fn fetch_session(&self) -> Result<Session> {
        let resp = self
            .client
            .get(&self.base_url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RegistryError::Api {
                status: status.as_u16(),
                message,
            });
        }

        // Cookies are collected regardless of whether a token turns up.
        let cookies = join_set_cookies(
            resp.headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        );

        let html = resp.text().await?;
        let csrf_token = match extract_csrf_token(&html) {
            Some((strategy, token)) => {
                info!(strategy, "CSRF token extracted");
                Some(token)
            }
            None => {
                warn!(html_bytes = html.len(), "No CSRF token found in directory page");
                None
            }
        };

        Ok(Session { csrf_token, cookies })
    }

    /// Search the directory by establishment name.
    pub async fn search(&self, session: &Session, text: &str) -> Result<Vec<RegistryRecord>> {
        let token = session
            .csrf_token
            .as_deref()
            .ok_or(RegistryError::SessionUnavailable)?;

        let resp = self
            .client
            .post(&self.search_url)
            .header("X-CSRF-TOKEN", token)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(COOKIE, &session.cookies)
            .header(ORIGIN, &self.origin)
            .header(REFERER, &self.base_url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .json(&SearchRequest { text })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RegistryError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&body)?;
        debug!(query = text, count = parsed.data.len(), "Registry search complete");
        Ok(parsed.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_derived_from_base_url() {
        let client = RegistryClient::new(
            "https://halal.example.sg/halal/establishments?x=1",
            "https://halal.example.sg/api/search",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.origin, "https://halal.example.sg");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = RegistryClient::new("not a url", DEFAULT_SEARCH_URL, Duration::from_secs(5));
        assert!(matches!(result, Err(RegistryError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn unreachable_directory_yields_unavailable_session() {
        let client = RegistryClient::new(
            "http://127.0.0.1:9/halal",
            "http://127.0.0.1:9/api",
            Duration::from_secs(2),
        )
        .unwrap();
        let session = client.acquire_session().await;
        assert_eq!(session, Session::unavailable());
    }

    #[tokio::test]
    async fn search_without_token_is_refused_locally() {
        let client =
            RegistryClient::new(DEFAULT_BASE_URL, DEFAULT_SEARCH_URL, Duration::from_secs(2)).unwrap();
        let err = client
            .search(&Session::unavailable(), "Al-Falah")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::SessionUnavailable));
    }
}
