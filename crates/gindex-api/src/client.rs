use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::endpoint::{Endpoint, EndpointManager};
use crate::error::ApiError;
use crate::pacing::{jitter, RequestPacer};
use crate::types::{FileInfo, FolderPage, LinkResponse, ListResponse, RemoteEntry, RequestBody};

/// Substrings in a 500 body that mean the request can never succeed.
const AUTH_KEYWORDS: &[&str] = &[
    "token",
    "auth",
    "expired",
    "invalid",
    "unauthorized",
    "forbidden",
    "access denied",
];

/// Retry, backoff and pagination limits for [`IndexClient`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after a transport failure.
    pub transport_retries: u32,
    /// Fixed delay between transport retries.
    pub transport_delay: Duration,
    /// First backoff delay for 429/5xx; doubles per attempt.
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Upper bound of the random delay added to each backoff.
    pub backoff_jitter: Duration,
    /// Total attempts allowed for 429/5xx, failovers included.
    pub max_attempts: u32,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Safety stop for `list_folder_all`.
    pub page_limit: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            transport_retries: 3,
            transport_delay: Duration::from_secs(1),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            backoff_jitter: Duration::from_millis(500),
            max_attempts: 5,
            request_timeout: Duration::from_secs(30),
            page_limit: 500,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
            + jitter(self.backoff_jitter)
    }
}

/// Client for a drive-index style remote index.
///
/// Every call takes the endpoint the caller selected; on 5xx the client
/// may transparently move to another mirror chosen by the shared
/// [`EndpointManager`].
pub struct IndexClient {
    http: Client,
    endpoints: Arc<EndpointManager>,
    policy: RetryPolicy,
    password: String,
    page_pacer: Arc<RequestPacer>,
}

impl IndexClient {
    pub fn new(
        endpoints: Arc<EndpointManager>,
        policy: RetryPolicy,
        password: impl Into<String>,
        page_pacer: Arc<RequestPacer>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(policy.request_timeout)
            .user_agent(concat!("gindex/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoints,
            policy,
            password: password.into(),
            page_pacer,
        })
    }

    pub fn endpoints(&self) -> &Arc<EndpointManager> {
        &self.endpoints
    }

    /// Fetch a single page of a folder listing.
    pub async fn list_folder(
        &self,
        endpoint: &Endpoint,
        path: &str,
        page_token: Option<&str>,
        page_index: Option<u32>,
    ) -> Result<FolderPage, ApiError> {
        let (page, _) = self
            .list_folder_on(endpoint, path, page_token, page_index)
            .await?;
        Ok(page)
    }

    /// Like [`list_folder`](Self::list_folder), also returning the endpoint
    /// that served the page.
    async fn list_folder_on(
        &self,
        endpoint: &Endpoint,
        path: &str,
        page_token: Option<&str>,
        page_index: Option<u32>,
    ) -> Result<(FolderPage, Endpoint), ApiError> {
        let body = RequestBody {
            id: "",
            kind: "folder",
            password: &self.password,
            page_token,
            page_index,
        };
        let (resp, served_by) = self
            .execute(endpoint, path, |http, url| http.post(url).json(&body))
            .await?;
        let listing: ListResponse = decode(resp).await?;
        Ok((listing.into_page(path), served_by))
    }

    /// Page cursor over a folder.
    pub fn pages(&self, endpoint: &Endpoint, path: &str) -> FolderPages<'_> {
        FolderPages {
            client: self,
            endpoint: endpoint.clone(),
            path: path.to_string(),
            token: None,
            index: 0,
            seen: HashSet::new(),
            done: false,
        }
    }

    /// Drain every page of a folder, in page order.
    pub async fn list_folder_all(
        &self,
        endpoint: &Endpoint,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, ApiError> {
        let mut pages = self.pages(endpoint, path);
        let mut entries = Vec::new();
        while let Some(page) = pages.next_page().await? {
            entries.extend(page.entries);
        }
        Ok(entries)
    }

    /// Resolve a file's signed download link.
    pub async fn get_download_url(&self, endpoint: &Endpoint, path: &str) -> Result<String, ApiError> {
        let body = RequestBody {
            id: "",
            kind: "file",
            password: &self.password,
            page_token: None,
            page_index: None,
        };
        let (resp, served_by) = self
            .execute(endpoint, path, |http, url| http.post(url).json(&body))
            .await?;
        let link: LinkResponse = decode(resp).await?;

        let base = Url::parse(&format!("{}/", served_by.base_url))?;
        Ok(base.join(&link.into_link())?.to_string())
    }

    /// HEAD a file for its size, type and modification time.
    pub async fn get_file_info(&self, endpoint: &Endpoint, path: &str) -> Result<FileInfo, ApiError> {
        let (resp, _) = self
            .execute(endpoint, path, |http, url| http.head(url))
            .await?;
        let headers = resp.headers();
        let header = |name: reqwest::header::HeaderName| {
            headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
        };

        Ok(FileInfo {
            size: header(reqwest::header::CONTENT_LENGTH).and_then(|v| v.parse().ok()),
            content_type: header(reqwest::header::CONTENT_TYPE),
            last_modified: header(reqwest::header::LAST_MODIFIED)
                .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }

    /// Issue one logical request, applying the retry and failover policy.
    ///
    /// Returns the successful response and the endpoint that served it.
    async fn execute<F>(
        &self,
        endpoint: &Endpoint,
        path: &str,
        build: F,
    ) -> Result<(Response, Endpoint), ApiError>
    where
        F: Fn(&Client, Url) -> RequestBuilder,
    {
        let mut current = endpoint.clone();
        let mut transport_failures = 0u32;
        let mut attempts = 0u32;

        loop {
            let url = request_url(&current.base_url, path)?;

            let resp = match build(&self.http, url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    transport_failures += 1;
                    if transport_failures > self.policy.transport_retries {
                        self.endpoints.report_error(&current.base_url);
                        tracing::warn!(endpoint = %current.base_url, path, error = %e, "Transport retries exhausted");
                        return Err(ApiError::Transport(e));
                    }
                    tracing::debug!(
                        endpoint = %current.base_url,
                        path,
                        attempt = transport_failures,
                        error = %e,
                        "Transport error, retrying"
                    );
                    tokio::time::sleep(self.policy.transport_delay).await;
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                self.endpoints.report_success(&current.base_url);
                return Ok((resp, current));
            }

            match status {
                StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                    attempts += 1;
                    if attempts >= self.policy.max_attempts {
                        // Only a 503 that outlasts the backoff counts against the mirror.
                        if status.is_server_error() {
                            self.endpoints.report_error(&current.base_url);
                        }
                        tracing::warn!(endpoint = %current.base_url, path, attempts, "Rate limit retries exhausted");
                        return Err(ApiError::RateLimited {
                            endpoint: current.base_url,
                            attempts,
                        });
                    }
                    let delay = self.policy.backoff(attempts);
                    tracing::debug!(
                        endpoint = %current.base_url,
                        status = status.as_u16(),
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    let body = resp.text().await.unwrap_or_default();
                    tracing::warn!(endpoint = %current.base_url, status = status.as_u16(), "Rejected credentials");
                    return Err(ApiError::Auth(body));
                }
                s if s.is_server_error() => {
                    let body = resp.text().await.unwrap_or_default();
                    self.endpoints.report_error(&current.base_url);

                    if is_auth_failure(&body) {
                        tracing::warn!(endpoint = %current.base_url, status = s.as_u16(), "Server error looks like an auth failure");
                        return Err(ApiError::Auth(body));
                    }

                    attempts += 1;
                    if attempts >= self.policy.max_attempts {
                        tracing::warn!(endpoint = %current.base_url, path, attempts, "Server error retries exhausted");
                        return Err(ApiError::Server {
                            endpoint: current.base_url,
                            status: s.as_u16(),
                        });
                    }

                    let next = self.endpoints.select();
                    if next.base_url != current.base_url {
                        tracing::warn!(
                            from = %current.base_url,
                            to = %next.base_url,
                            path,
                            "Failing over to another endpoint"
                        );
                        current = next;
                        continue;
                    }

                    let delay = self.policy.backoff(attempts);
                    tracing::debug!(
                        endpoint = %current.base_url,
                        status = s.as_u16(),
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Server error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                s => {
                    let body = resp.text().await.unwrap_or_default();
                    tracing::warn!(endpoint = %current.base_url, status = s.as_u16(), path, "Index API error");
                    return Err(ApiError::Status {
                        status: s.as_u16(),
                        message: body,
                    });
                }
            }
        }
    }
}

/// Cursor over the pages of one folder.
///
/// The continuation token and page index advance together; the index
/// rejects requests where they disagree. Pages after the first are
/// preceded by the client's page pacer.
pub struct FolderPages<'a> {
    client: &'a IndexClient,
    endpoint: Endpoint,
    path: String,
    token: Option<String>,
    index: u32,
    seen: HashSet<String>,
    done: bool,
}

impl FolderPages<'_> {
    pub async fn next_page(&mut self) -> Result<Option<FolderPage>, ApiError> {
        if self.done {
            return Ok(None);
        }
        if self.index > 0 {
            self.client.page_pacer.wait().await;
        }

        let (page, served_by) = self
            .client
            .list_folder_on(
                &self.endpoint,
                &self.path,
                self.token.as_deref(),
                Some(self.index),
            )
            .await?;
        // Continuation tokens belong to the mirror that issued them.
        self.endpoint = served_by;

        match page.next_page_token.clone() {
            None => self.done = true,
            Some(token) if !self.seen.insert(token.clone()) => {
                tracing::warn!(path = %self.path, page = self.index, "Repeated page token, stopping");
                self.done = true;
            }
            Some(_) if self.index + 1 >= self.client.policy.page_limit => {
                tracing::warn!(path = %self.path, limit = self.index + 1, "Page limit reached, stopping");
                self.done = true;
            }
            Some(token) => {
                self.token = Some(token);
                self.index += 1;
            }
        }

        Ok(Some(page))
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| ApiError::ResponseShape(e.to_string()))
}

fn is_auth_failure(body: &str) -> bool {
    let lower = body.to_lowercase();
    AUTH_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Build the request URL for `path` under `base`.
fn request_url(base: &str, path: &str) -> Result<Url, ApiError> {
    let base = base.trim_end_matches('/');
    Ok(Url::parse(&format!("{base}{}", encode_path(path)))?)
}

/// Percent-encode each path segment, except a leading drive marker ("1:").
pub fn encode_path(path: &str) -> String {
    let mut seen_segment = false;
    let encoded: Vec<String> = path
        .split('/')
        .map(|segment| {
            if segment.is_empty() {
                return String::new();
            }
            let first = !seen_segment;
            seen_segment = true;
            if first && is_drive_marker(segment) {
                segment.to_string()
            } else {
                urlencoding::encode(segment).into_owned()
            }
        })
        .collect();

    let joined = encoded.join("/");
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

fn is_drive_marker(segment: &str) -> bool {
    segment
        .strip_suffix(':')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}
