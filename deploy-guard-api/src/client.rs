//! JSON-over-HTTPS client for the authority.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::protocol::ErrorBody;

/// Client bound to one authority server.
///
/// Cloning is cheap: the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    base_url: String,
    http: Client,
    request_timeout: Duration,
}

impl AuthorityClient {
    /// Timeout applied to JSON requests unless overridden.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a client with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        Self::with_timeout(base_url, Self::DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client whose JSON requests time out after `request_timeout`.
    ///
    /// Artifact downloads are not subject to this timeout; callers bound
    /// them separately.
    pub fn with_timeout(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> ApiResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidUrl(base_url));
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url,
            http,
            request_timeout,
        })
    }

    /// Returns the server URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves a path against the server URL. Absolute URLs pass through.
    pub fn resolve(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            return path_or_url.to_string();
        }
        if path_or_url.starts_with('/') {
            format!("{}{}", self.base_url, path_or_url)
        } else {
            format!("{}/{}", self.base_url, path_or_url)
        }
    }

    /// POSTs `body` as JSON and decodes a JSON response.
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> ApiResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.resolve(path);
        debug!(%url, "POST");
        let response = self
            .http
            .post(&url)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// GETs `path` with the given query string and decodes a JSON response.
    pub async fn get_json<R>(&self, path: &str, query: &[(&str, String)]) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        let url = self.resolve(path);
        debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .timeout(self.request_timeout)
            .query(query)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// POSTs `fields` plus one file as `multipart/form-data` and decodes a
    /// JSON response. The file goes in the `file` part.
    pub async fn post_file<R>(
        &self,
        path: &str,
        fields: &[(&str, String)],
        file_name: &str,
        content_type: Option<&str>,
        data: Vec<u8>,
    ) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        let mut part = Part::bytes(data).file_name(file_name.to_string());
        if let Some(content_type) = content_type {
            part = part.mime_str(content_type)?;
        }
        let form = fields
            .iter()
            .fold(Form::new(), |form, (name, value)| {
                form.text(name.to_string(), value.clone())
            })
            .part("file", part);

        let url = self.resolve(path);
        debug!(%url, file_name, "POST multipart");
        let response = self
            .http
            .post(&url)
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Starts a streaming GET of an artifact. Non-200 responses are errors.
    pub async fn download(&self, path_or_url: &str) -> ApiResult<Response> {
        let url = self.resolve(path_or_url);
        debug!(%url, "GET artifact");
        let response = self.http.get(&url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(Self::status_error(response).await);
        }
        Ok(response)
    }

    async fn decode<R: DeserializeOwned>(response: Response) -> ApiResult<R> {
        if response.status() != StatusCode::OK {
            return Err(Self::status_error(response).await);
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn status_error(response: Response) -> ApiError {
        let status = response.status().as_u16();
        let body = response.bytes().await.unwrap_or_default();
        let code = serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .filter(|c| !c.is_empty());
        ApiError::Status { status, code }
    }
}
