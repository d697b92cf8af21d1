//! Thin transport over `reqwest`.
//!
//! Adds base-URL resolution, default headers merged under per-call overrides, status
//! validation, content-type aware decoding and a fixed-delay retry of connection-level
//! failures. Non-2xx responses are never retried.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{CdnError, ErrorKind, ResponseInfo, Result};

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Fixed-delay retry of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpClientConfig {
    pub base_url: Option<Url>,
    pub headers: HeaderMap,
    pub retry: RetryPolicy,
}

/// Per-call options. Headers here win over the client defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RequestConfig {
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Json(serde_json::Value),
    Text(String),
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub data: ResponseData,
}

impl HttpResponse {
    /// Deserialises the body. A text body is parsed as JSON as a fallback.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        let parsed = match self.data {
            ResponseData::Json(value) => serde_json::from_value(value),
            ResponseData::Text(text) => serde_json::from_str(&text),
        };
        parsed.map_err(|e| {
            CdnError::new(ErrorKind::BodyNotOk, "response body not ok").with_source(e)
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: Option<Url>,
    headers: HeaderMap,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .map_err(|e| {
                CdnError::new(ErrorKind::InvalidConfig, "cannot build the HTTP client")
                    .with_source(e)
            })?;
        Ok(Self {
            inner,
            base_url: config.base_url,
            headers: config.headers,
            retry: config.retry,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn get(&self, url: &str, config: RequestConfig) -> Result<HttpResponse> {
        self.request(Method::GET, url, config).await
    }

    pub async fn put(&self, url: &str, config: RequestConfig) -> Result<HttpResponse> {
        self.request(Method::PUT, url, config).await
    }

    pub async fn post(&self, url: &str, config: RequestConfig) -> Result<HttpResponse> {
        self.request(Method::POST, url, config).await
    }

    pub async fn delete(&self, url: &str, config: RequestConfig) -> Result<HttpResponse> {
        self.request(Method::DELETE, url, config).await
    }

    async fn request(&self, method: Method, url: &str, config: RequestConfig) -> Result<HttpResponse> {
        let url = self.resolve(url)?;
        debug!(%method, %url, "Sending request");
        let response = self.send_with_retry(&method, &url, &config).await?;
        let response = ok_handler(response).await?;
        decode(response).await
    }

    fn resolve(&self, url: &str) -> Result<Url> {
        let resolved = match &self.base_url {
            Some(base) => base.join(url),
            None => Url::parse(url),
        };
        resolved.map_err(|e| {
            CdnError::new(ErrorKind::InvalidUrl, format!("Invalid URL '{url}'")).with_source(e)
        })
    }

    fn merged_headers(&self, overrides: &HeaderMap) -> HeaderMap {
        let mut headers = self.headers.clone();
        for name in overrides.keys() {
            headers.remove(name);
        }
        for (name, value) in overrides {
            headers.append(name.clone(), value.clone());
        }
        headers
    }

    async fn send_with_retry(
        &self,
        method: &Method,
        url: &Url,
        config: &RequestConfig,
    ) -> Result<reqwest::Response> {
        let headers = self.merged_headers(&config.headers);
        let mut attempt: u32 = 0;
        loop {
            let mut request = self
                .inner
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(body) = &config.body {
                request = request.body(body.clone());
            }

            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.retry.retries => {
                    attempt += 1;
                    warn!(
                        %url,
                        attempt,
                        retries = self.retry.retries,
                        error = %e,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    return Err(
                        CdnError::new(ErrorKind::ResponseNotOk, "response not ok").with_source(e)
                    );
                }
            }
        }
    }
}

async fn ok_handler(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), %body, "Response not ok");
    Err(
        CdnError::new(ErrorKind::ResponseNotOk, "response not ok").with_response(ResponseInfo {
            status: status.as_u16(),
            body,
        }),
    )
}

fn content_type_essence(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
}

async fn decode(response: reqwest::Response) -> Result<HttpResponse> {
    let status = response.status();
    let headers = response.headers().clone();
    let body_not_ok =
        |e: reqwest::Error| CdnError::new(ErrorKind::BodyNotOk, "response body not ok").with_source(e);

    let data = match content_type_essence(&headers).as_deref() {
        Some("application/json") => {
            let bytes = response.bytes().await.map_err(body_not_ok)?;
            if bytes.is_empty() {
                ResponseData::Text(String::new())
            } else {
                serde_json::from_slice(&bytes)
                    .map(ResponseData::Json)
                    .map_err(|e| {
                        CdnError::new(ErrorKind::BodyNotOk, "response body not ok").with_source(e)
                    })?
            }
        }
        _ => ResponseData::Text(response.text().await.map_err(body_not_ok)?),
    };

    Ok(HttpResponse {
        status,
        headers,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_call_headers_override_defaults() {
        let mut defaults = HeaderMap::new();
        defaults.insert("accesskey", HeaderValue::from_static("default"));
        defaults.insert("accept", HeaderValue::from_static("application/json"));
        let client = HttpClient::new(HttpClientConfig {
            headers: defaults,
            ..Default::default()
        })
        .unwrap();

        let mut overrides = HeaderMap::new();
        overrides.insert("accept", HeaderValue::from_static("*/*"));
        let merged = client.merged_headers(&overrides);

        assert_eq!(merged["accesskey"], "default");
        assert_eq!(merged["accept"], "*/*");
    }

    #[test]
    fn multi_valued_overrides_replace_every_default_value() {
        let mut defaults = HeaderMap::new();
        defaults.append("accept", HeaderValue::from_static("application/json"));
        defaults.append("accept", HeaderValue::from_static("text/plain"));
        let client = HttpClient::new(HttpClientConfig {
            headers: defaults,
            ..Default::default()
        })
        .unwrap();

        let mut overrides = HeaderMap::new();
        overrides.append("accept", HeaderValue::from_static("*/*"));
        overrides.append("accept", HeaderValue::from_static("application/octet-stream"));
        let merged = client.merged_headers(&overrides);

        let values: Vec<&str> = merged
            .get_all("accept")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["*/*", "application/octet-stream"]);
    }

    #[test]
    fn resolves_relative_urls_against_base() {
        let client = HttpClient::new(HttpClientConfig {
            base_url: Some(Url::parse("https://api.example/").unwrap()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.resolve("/pullzone?search=x").unwrap().as_str(),
            "https://api.example/pullzone?search=x"
        );
        assert_eq!(
            client.resolve("https://other.example/a").unwrap().as_str(),
            "https://other.example/a"
        );
    }

    #[test]
    fn content_type_parameters_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        assert_eq!(
            content_type_essence(&headers).as_deref(),
            Some("application/json")
        );
    }

    #[test]
    fn text_body_decodes_as_json_fallback() {
        let response = HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            data: ResponseData::Text("[1,2]".into()),
        };
        let parsed: Vec<u8> = response.json().unwrap();
        assert_eq!(parsed, vec![1, 2]);

        let response = HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            data: ResponseData::Text("<html>".into()),
        };
        let err = response.json::<Vec<u8>>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BodyNotOk);
    }
}
