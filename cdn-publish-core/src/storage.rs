//! HTTP implementation of [`EdgeStorage`] against the storage API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::cdn::{CdnContext, RelPath};
use crate::contract::{EdgeStorage, FileContent, FileMeta, LoadingContext, RemoteContent};
use crate::error::{CdnError, ErrorKind, Result};
use crate::http::{HttpClient, HttpClientConfig, RequestConfig, RetryPolicy};
use crate::pipeline::{self, PutOptions};
use crate::report::Reporter;

const ACCESS_KEY: &str = "accesskey";
const CHECKSUM: &str = "checksum";

pub(crate) fn access_key_headers(access_key: &str) -> Result<HeaderMap> {
    let value = HeaderValue::from_str(access_key).map_err(|e| {
        CdnError::new(
            ErrorKind::InvalidConfig,
            "access key contains characters not allowed in a header",
        )
        .with_source(e)
    })?;
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static(ACCESS_KEY), value);
    Ok(headers)
}

fn accept_any() -> RequestConfig {
    RequestConfig::default().header(ACCEPT, HeaderValue::from_static("*/*"))
}

pub struct EdgeStorageClient {
    cdn: CdnContext,
    http: HttpClient,
    reporter: Arc<dyn Reporter>,
}

impl EdgeStorageClient {
    pub fn new(cdn: CdnContext, reporter: Arc<dyn Reporter>) -> Result<Self> {
        Self::with_retry(cdn, reporter, RetryPolicy::default())
    }

    pub fn with_retry(
        cdn: CdnContext,
        reporter: Arc<dyn Reporter>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = HttpClient::new(HttpClientConfig {
            base_url: Some(cdn.base_url().clone()),
            headers: access_key_headers(cdn.access_key())?,
            retry,
        })?;
        Ok(Self {
            cdn,
            http,
            reporter,
        })
    }

    pub fn cdn(&self) -> &CdnContext {
        &self.cdn
    }

    /// Runs the guarded batch upload against this storage.
    pub async fn put(
        &self,
        scope: &RelPath,
        contexts: Vec<LoadingContext>,
        options: PutOptions,
    ) -> Result<()> {
        pipeline::put(self, scope, contexts, options, self.reporter.as_ref()).await
    }
}

#[async_trait]
impl EdgeStorage for EdgeStorageClient {
    async fn list(&self, scope: &RelPath) -> Result<Vec<FileMeta>> {
        let url = self.cdn.build_url(&scope.as_dir(), &[])?;
        match self.http.get(url.as_str(), accept_any()).await {
            Ok(response) => response.json(),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND.as_u16()) => {
                debug!(%scope, "Remote directory not found, listing is empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn get(&self, scope: &RelPath) -> Result<RemoteContent> {
        if scope.is_dir() {
            return self.list(scope).await.map(RemoteContent::Listing);
        }
        let url = self.cdn.build_url(scope, &[])?;
        let response = self
            .http
            .get(url.as_str(), accept_any())
            .await
            .map_err(|e| CdnError::wrap(ErrorKind::UnableToGetFile, "unable to retrieve file", e))?;
        Ok(RemoteContent::File(response.data))
    }

    async fn put_object(
        &self,
        scope: &RelPath,
        pathname: &RelPath,
        content: FileContent,
    ) -> Result<()> {
        let url = self.cdn.build_url(scope, &[pathname])?;
        let mut config = RequestConfig::default().header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        if let Some(checksum) = content.checksum() {
            let value = HeaderValue::from_str(&checksum.to_uppercase()).map_err(|e| {
                CdnError::new(ErrorKind::InvalidConfig, "invalid checksum").with_source(e)
            })?;
            config = config.header(HeaderName::from_static(CHECKSUM), value);
        }
        self.http
            .put(url.as_str(), config.body(content.into_buffer()))
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        scope: &RelPath,
        pathname: &RelPath,
        avoid_throwing: bool,
    ) -> Result<()> {
        let url = self.cdn.build_url(scope, &[pathname])?;
        match self.http.delete(url.as_str(), RequestConfig::default()).await {
            Ok(_) => {
                info!(%url, "Deleted");
                Ok(())
            }
            Err(e) if avoid_throwing => {
                debug!(%url, error = %e, "Delete failed, ignoring");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
