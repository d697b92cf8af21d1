//! Pull-zone API client and cache purge.

use futures::future::join_all;
use reqwest::header::{HeaderValue, ACCEPT};
use tracing::{info, warn};

use crate::cdn::CdnContext;
use crate::contract::PullZoneMeta;
use crate::error::{CdnError, ErrorKind, Result};
use crate::http::{HttpClient, HttpClientConfig, RequestConfig, RetryPolicy};
use crate::report::{PurgeRow, Reporter};
use crate::storage::access_key_headers;

/// Outcome of one purge request. `status` is `None` when no response was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeResponse {
    pub id: u64,
    pub status: Option<u16>,
}

impl PurgeResponse {
    pub fn is_purged(&self) -> bool {
        self.status == Some(204)
    }
}

impl From<&PurgeResponse> for PurgeRow {
    fn from(response: &PurgeResponse) -> Self {
        let purged = match response.status {
            Some(204) => "Ok (204)".to_string(),
            Some(status) => format!("Error ({status})"),
            None => "Error (no response)".to_string(),
        };
        Self {
            id_zone: response.id,
            purged,
        }
    }
}

fn accept_json() -> RequestConfig {
    RequestConfig::default().header(ACCEPT, HeaderValue::from_static("application/json"))
}

pub struct PullZoneClient {
    cdn: CdnContext,
    http: HttpClient,
}

impl PullZoneClient {
    pub fn new(cdn: CdnContext) -> Result<Self> {
        Self::with_retry(cdn, RetryPolicy::default())
    }

    pub fn with_retry(cdn: CdnContext, retry: RetryPolicy) -> Result<Self> {
        let http = HttpClient::new(HttpClientConfig {
            base_url: Some(cdn.base_url().clone()),
            headers: access_key_headers(cdn.access_key())?,
            retry,
        })?;
        Ok(Self { cdn, http })
    }

    /// Every pull zone, optionally filtered server side by `search`.
    pub async fn list(&self, search: Option<&str>) -> Result<Vec<PullZoneMeta>> {
        let mut url = self.cdn.base_url().join("/pullzone").map_err(|e| {
            CdnError::new(ErrorKind::InvalidUrl, "Invalid URL").with_source(e)
        })?;
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            url.query_pairs_mut().append_pair("search", search);
        }
        self.http.get(url.as_str(), accept_json()).await?.json()
    }

    pub async fn purge_cache(&self, id: u64) -> Result<PurgeResponse> {
        let path = format!("/pullzone/{id}/purgeCache");
        let response = self.http.post(&path, accept_json()).await?;
        Ok(PurgeResponse {
            id,
            status: Some(response.status.as_u16()),
        })
    }

    /// Purges `zone`, or every listed zone when `None`. All purges run concurrently and
    /// are reported as one table before the outcome is decided.
    pub async fn purge(&self, zone: Option<u64>, reporter: &dyn Reporter) -> Result<()> {
        let ids = match zone {
            Some(id) => vec![id],
            None => self.list(None).await?.into_iter().map(|z| z.id).collect(),
        };
        info!(zones = ids.len(), "Purging pull zones");

        let responses = join_all(ids.iter().map(|&id| async move {
            match self.purge_cache(id).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(id, error = %e, "Purge failed");
                    PurgeResponse {
                        id,
                        status: e.status(),
                    }
                }
            }
        }))
        .await;

        reporter.table(tabled::Table::new(responses.iter().map(PurgeRow::from)));

        let failed: Vec<String> = responses
            .iter()
            .filter(|r| !r.is_purged())
            .map(|r| format!("'{}'", r.id))
            .collect();
        if failed.is_empty() {
            return Ok(());
        }
        let plural = if failed.len() < 2 { "" } else { "s" };
        Err(CdnError::new(
            ErrorKind::ResponseNotOk,
            format!(
                "something went wrong while attempting to purge zones with id{plural} {}",
                failed.join(", ")
            ),
        ))
    }
}
