// src/remote/http.rs

//! `reqwest` implementation of [`ContentApi`] against a GitHub-style
//! Contents API.

use std::fmt;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::{Result, SyncError};

use super::api::{ApiFuture, CommitResponse, ContentApi, ContentsEntry, DeleteContents, PutContents};
use super::error::{ApiError, NetworkErrorKind};

const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Where and as whom requests are made.
#[derive(Clone)]
pub struct RemoteEndpoint {
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: String,
    pub api_version: String,
    /// Per-request timeout, independent of retry backoff.
    pub timeout: Duration,
}

impl fmt::Debug for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEndpoint")
            .field("api_base", &self.api_base)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct HttpContentApi {
    client: Client,
    endpoint: RemoteEndpoint,
    base: Url,
}

impl fmt::Debug for HttpContentApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpContentApi")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpContentApi {
    pub fn new(endpoint: RemoteEndpoint) -> Result<Self> {
        let base = Url::parse(&endpoint.api_base)
            .map_err(|e| SyncError::Config(format!("invalid api_base {:?}: {e}", endpoint.api_base)))?;
        if base.cannot_be_a_base() {
            return Err(SyncError::Config(format!(
                "api_base {:?} cannot be used as a base URL",
                endpoint.api_base
            )));
        }

        let client = Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            base,
        })
    }

    /// Same credentials and branch, different repository of the same owner.
    pub fn for_repo(&self, repo: &str) -> Self {
        let mut other = self.clone();
        other.endpoint.repo = repo.to_string();
        other
    }

    fn url<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.base.clone();
        // cannot_be_a_base was rejected in `new`, so this is always Ok.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    fn repo_url<'s>(&'s self, tail: impl IntoIterator<Item = &'s str>) -> Url {
        let head = ["repos", self.endpoint.owner.as_str(), self.endpoint.repo.as_str()];
        self.url(head.into_iter().chain(tail))
    }

    fn contents_url(&self, path: &str) -> Url {
        let segments = path.split('/').filter(|s| !s.is_empty());
        self.repo_url(std::iter::once("contents").chain(segments))
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(AUTHORIZATION, format!("Bearer {}", self.endpoint.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header(API_VERSION_HEADER, &self.endpoint.api_version)
            .header(USER_AGENT, concat!("watchsync/", env!("CARGO_PKG_VERSION")))
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> std::result::Result<T, ApiError> {
        let resp = self.authorized(req).send().await.map_err(network_error)?;
        let status = resp.status();
        debug!(status = status.as_u16(), url = %resp.url(), "remote response");

        if !status.is_success() {
            return Err(status_error(resp).await);
        }

        let body = resp.bytes().await.map_err(network_error)?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl ContentApi for HttpContentApi {
    fn get_contents<'a>(&'a self, path: &'a str) -> ApiFuture<'a, ContentsEntry> {
        Box::pin(async move {
            let mut url = self.contents_url(path);
            url.query_pairs_mut().append_pair("ref", &self.endpoint.branch);
            self.send_json(self.client.get(url)).await
        })
    }

    fn put_contents<'a>(&'a self, path: &'a str, body: &'a PutContents) -> ApiFuture<'a, CommitResponse> {
        Box::pin(async move {
            let req = self.client.put(self.contents_url(path)).json(body);
            self.send_json(req).await
        })
    }

    fn delete_contents<'a>(
        &'a self,
        path: &'a str,
        body: &'a DeleteContents,
    ) -> ApiFuture<'a, CommitResponse> {
        Box::pin(async move {
            let req = self.client.delete(self.contents_url(path)).json(body);
            self.send_json(req).await
        })
    }

    fn branch_head(&self) -> ApiFuture<'_, String> {
        Box::pin(async move {
            let url = self.repo_url(["git", "refs", "heads", self.endpoint.branch.as_str()]);
            let resp: RefResponse = self.send_json(self.client.get(url)).await?;
            Ok(resp.object.sha)
        })
    }

    fn authenticated_user(&self) -> ApiFuture<'_, String> {
        Box::pin(async move {
            let resp: UserResponse = self.send_json(self.client.get(self.url(["user"]))).await?;
            Ok(resp.login)
        })
    }

    fn branch(&self) -> &str {
        &self.endpoint.branch
    }
}

fn network_error(err: reqwest::Error) -> ApiError {
    let kind = if err.is_timeout() {
        NetworkErrorKind::TimedOut
    } else if err.is_connect() {
        NetworkErrorKind::HostNotFound
    } else if err.is_request() || err.is_body() {
        NetworkErrorKind::ConnectionReset
    } else {
        NetworkErrorKind::Other
    };
    ApiError::network(kind, err.to_string())
}

async fn status_error(resp: Response) -> ApiError {
    let status = resp.status().as_u16();
    let headers = resp.headers().clone();
    let text = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.message,
        Err(_) if text.trim().is_empty() => resp_reason(status),
        Err(_) => text,
    };

    let mut err = ApiError::status(status, message).with_rate_limited(rate_limit_exhausted(&headers));
    if let Some(delay) = retry_after(&headers) {
        err = err.with_retry_after(delay);
    }
    err
}

fn resp_reason(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unknown status")
        .to_string()
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get(RATE_LIMIT_REMAINING_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0")
}

/// `retry-after` in delta-seconds form. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn api(base: &str) -> HttpContentApi {
        HttpContentApi::new(RemoteEndpoint {
            api_base: base.into(),
            owner: "octo".into(),
            repo: "notes".into(),
            branch: "main".into(),
            token: "t0ken".into(),
            api_version: "2022-11-28".into(),
            timeout: Duration::from_secs(10),
        })
        .unwrap()
    }

    #[test]
    fn contents_url_escapes_each_segment() {
        let api = api("https://api.github.com");
        let url = api.contents_url("docs/my file#1.md");
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octo/notes/contents/docs/my%20file%231.md"
        );
    }

    #[test]
    fn base_with_path_prefix_is_preserved() {
        let api = api("https://ghe.example.com/api/v3/");
        assert_eq!(api.url(["user"]).as_str(), "https://ghe.example.com/api/v3/user");
    }

    #[test]
    fn for_repo_switches_repository_only() {
        let other = api("https://api.github.com").for_repo("backup");
        assert_eq!(
            other.contents_url("a.txt").as_str(),
            "https://api.github.com/repos/octo/backup/contents/a.txt"
        );
        assert_eq!(other.branch(), "main");
    }

    #[test]
    fn debug_output_hides_token() {
        let out = format!("{:?}", api("https://api.github.com"));
        assert!(!out.contains("t0ken"));
    }

    #[test]
    fn rate_limit_headers_are_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from_static("0"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        assert!(rate_limit_exhausted(&headers));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn invalid_base_is_a_config_error() {
        let err = HttpContentApi::new(RemoteEndpoint {
            api_base: "not a url".into(),
            owner: "o".into(),
            repo: "r".into(),
            branch: "main".into(),
            token: String::new(),
            api_version: "v".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
