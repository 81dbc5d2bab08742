//! reqwest-backed fetchers.
//!
//! [`BasicFetcher`] issues plain requests identifying the tool.
//! [`BrowserFetcher`] keeps a cookie session, sends browser headers and a
//! Referer, and visits the site root once before the first listing page.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderValue, REFERER,
    RETRY_AFTER,
};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, MAX_CRAWL_PAGES};
use super::error::DownloadError;
use super::fetcher::{FetchedDocument, Fetcher};
use super::links::extract_links;
use crate::config::{Config, FetchMode};
use crate::ledger::DownloadMethod;
use crate::user_agent;

/// Network and crawl limits shared by both fetchers.
#[derive(Debug, Clone)]
pub struct FetcherSettings {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Link depth followed from each listing page (0 = the listing page only).
    pub max_depth: u32,
    /// Extensions that mark a link as a document.
    pub file_extensions: Vec<String>,
}

impl FetcherSettings {
    /// Settings derived from the monitor configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout),
            max_depth: config.max_depth,
            file_extensions: config.file_extensions.clone(),
        }
    }
}

/// Builds the fetcher selected by `config.fetch_mode`.
///
/// # Errors
///
/// Returns [`DownloadError::ClientBuild`] if the HTTP client cannot be built.
pub fn build_fetcher(config: &Config) -> Result<Box<dyn Fetcher>, DownloadError> {
    let settings = FetcherSettings::from_config(config);
    let fetcher: Box<dyn Fetcher> = match config.fetch_mode {
        FetchMode::Basic => Box::new(BasicFetcher::new(settings)?),
        FetchMode::Browser => Box::new(BrowserFetcher::new(settings)?),
    };
    info!(mode = ?config.fetch_mode, "fetcher ready");
    Ok(fetcher)
}

/// Plain HTTP fetcher.
#[derive(Debug, Clone)]
pub struct BasicFetcher {
    session: HttpSession,
}

impl BasicFetcher {
    /// Creates a fetcher with the tool's own User-Agent.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(settings: FetcherSettings) -> Result<Self, DownloadError> {
        let client = build_client(
            &user_agent::default_user_agent(),
            settings.timeout,
            HeaderMap::new(),
            None,
        )?;
        Ok(Self {
            session: HttpSession { client, settings },
        })
    }
}

#[async_trait]
impl Fetcher for BasicFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, DownloadError> {
        self.session.get(url, None).await
    }

    async fn list_documents(&self, listing_url: &str) -> Result<Vec<String>, DownloadError> {
        self.session.crawl(listing_url).await
    }

    fn method(&self) -> DownloadMethod {
        DownloadMethod::Basic
    }
}

/// Browser-like session fetcher.
#[derive(Debug)]
pub struct BrowserFetcher {
    session: HttpSession,
    warmed_origins: Mutex<HashSet<String>>,
    last_listing: Mutex<Option<String>>,
}

impl BrowserFetcher {
    /// Creates a fetcher with a cookie jar and one browser User-Agent for its lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(settings: FetcherSettings) -> Result<Self, DownloadError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/pdf,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9,ru;q=0.8,kk;q=0.7"),
        );

        let jar = Arc::new(Jar::default());
        let client = build_client(
            user_agent::browser_user_agent(),
            settings.timeout,
            headers,
            Some(jar),
        )?;

        Ok(Self {
            session: HttpSession { client, settings },
            warmed_origins: Mutex::new(HashSet::new()),
            last_listing: Mutex::new(None),
        })
    }

    /// Visits the site root once per origin so the session carries its cookies.
    async fn warm_up(&self, url: &str) {
        let Some(origin) = origin_of(url) else {
            return;
        };
        let first_visit = self
            .warmed_origins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(origin.clone());
        if !first_visit {
            return;
        }

        match self.session.get(&origin, None).await {
            Ok(_) => debug!(origin = %origin, "session warm-up complete"),
            Err(error) => debug!(origin = %origin, error = %error, "session warm-up failed"),
        }
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, DownloadError> {
        self.warm_up(url).await;
        let referer = self
            .last_listing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.session.get(url, referer.as_deref()).await
    }

    async fn list_documents(&self, listing_url: &str) -> Result<Vec<String>, DownloadError> {
        self.warm_up(listing_url).await;
        let documents = self.session.crawl(listing_url).await?;
        *self
            .last_listing
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listing_url.to_string());
        Ok(documents)
    }

    fn method(&self) -> DownloadMethod {
        DownloadMethod::Browser
    }
}

#[derive(Debug, Clone)]
struct HttpSession {
    client: Client,
    settings: FetcherSettings,
}

impl HttpSession {
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    async fn get(&self, url: &str, referer: Option<&str>) -> Result<FetchedDocument, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let mut request = self.client.get(parsed);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await.map_err(|e| map_send_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = header_string(response.headers(), RETRY_AFTER);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        let content_disposition = header_string(response.headers(), CONTENT_DISPOSITION);
        let content_type = header_string(response.headers(), CONTENT_TYPE);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_send_error(url, e))?
            .to_vec();

        debug!(bytes = bytes.len(), "fetched");
        Ok(FetchedDocument {
            bytes,
            content_disposition,
            content_type,
        })
    }

    /// Breadth-first same-host crawl from `listing_url` down to `max_depth`.
    #[instrument(skip(self), fields(listing_url = %listing_url, max_depth = self.settings.max_depth))]
    async fn crawl(&self, listing_url: &str) -> Result<Vec<String>, DownloadError> {
        let start = Url::parse(listing_url).map_err(|_| DownloadError::invalid_url(listing_url))?;

        let mut visited = HashSet::from([start.to_string()]);
        let mut queue = VecDeque::from([(start, 0_u32, None::<String>)]);
        let mut seen_documents = HashSet::new();
        let mut documents = Vec::new();
        let mut pages_fetched = 0_usize;

        while let Some((page, depth, referer)) = queue.pop_front() {
            if pages_fetched >= MAX_CRAWL_PAGES {
                warn!(limit = MAX_CRAWL_PAGES, "crawl page limit reached");
                break;
            }

            let body = match self.get(page.as_str(), referer.as_deref()).await {
                Ok(body) => body,
                Err(error) if depth == 0 => return Err(error),
                Err(error) => {
                    warn!(page = %page, error = %error, "skipping unreachable page");
                    continue;
                }
            };
            pages_fetched += 1;

            if !is_html(body.content_type.as_deref()) {
                debug!(page = %page, "not an HTML page");
                continue;
            }

            let html = String::from_utf8_lossy(&body.bytes);
            let links = extract_links(&html, &page, &self.settings.file_extensions);

            for document in links.documents {
                if seen_documents.insert(document.clone()) {
                    debug!(document = %document, "discovered");
                    documents.push(document);
                }
            }

            if depth < self.settings.max_depth {
                for next in links.pages {
                    if visited.insert(next.clone())
                        && let Ok(next_url) = Url::parse(&next)
                    {
                        queue.push_back((next_url, depth + 1, Some(page.to_string())));
                    }
                }
            }
        }

        info!(
            documents = documents.len(),
            pages = pages_fetched,
            "crawl complete"
        );
        Ok(documents)
    }
}

fn build_client(
    user_agent: &str,
    timeout: Duration,
    headers: HeaderMap,
    cookie_jar: Option<Arc<Jar>>,
) -> Result<Client, DownloadError> {
    let connect_timeout = Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout);
    let mut builder = Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(timeout)
        .gzip(true)
        .user_agent(user_agent)
        .default_headers(headers);
    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    }
    builder
        .build()
        .map_err(|source| DownloadError::ClientBuild { source })
}

fn map_send_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

fn is_html(content_type: Option<&str>) -> bool {
    content_type.is_none_or(|value| {
        let value = value.to_ascii_lowercase();
        value.contains("html") || value.starts_with("text/")
    })
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let origin = match parsed.port() {
        Some(port) => format!("{}://{host}:{port}/", parsed.scheme()),
        None => format!("{}://{host}/", parsed.scheme()),
    };
    Some(origin)
}
