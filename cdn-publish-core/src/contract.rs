//! # contract: types and the storage seam shared by the pipeline and its clients
//!
//! The upload pipeline never talks HTTP directly. It drives an [`EdgeStorage`]
//! implementation, which is the real [`crate::storage::EdgeStorageClient`] in production
//! and a `mockall` mock or an in-memory fake in tests.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::cdn::RelPath;
use crate::error::Result;
use crate::http::ResponseData;

/// Metadata of one remote entry, as returned by a directory listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FileMeta {
    pub array_number: u64,
    pub checksum: Option<String>,
    pub content_type: String,
    pub date_created: String,
    pub guid: String,
    pub is_directory: bool,
    pub last_changed: String,
    pub length: u64,
    pub object_name: String,
    pub path: String,
    pub replicated_zones: Option<String>,
    pub server_id: u64,
    pub storage_zone_id: u64,
    pub storage_zone_name: String,
    pub user_id: String,
}

/// Remote cache zone identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PullZoneMeta {
    pub id: u64,
    pub name: String,
}

/// What `get` returns: a listing for directory scopes, the decoded body otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteContent {
    Listing(Vec<FileMeta>),
    File(ResponseData),
}

/// Bytes of a local file, optionally paired with their uppercase hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Raw(Bytes),
    WithChecksum { buffer: Bytes, checksum: String },
}

impl FileContent {
    pub fn buffer(&self) -> &Bytes {
        match self {
            FileContent::Raw(buffer) | FileContent::WithChecksum { buffer, .. } => buffer,
        }
    }

    pub fn checksum(&self) -> Option<&str> {
        match self {
            FileContent::Raw(_) => None,
            FileContent::WithChecksum { checksum, .. } => Some(checksum),
        }
    }

    pub fn into_buffer(self) -> Bytes {
        match self {
            FileContent::Raw(buffer) | FileContent::WithChecksum { buffer, .. } => buffer,
        }
    }
}

pub type LoadFuture = BoxFuture<'static, Result<FileContent>>;
pub type Loader = Box<dyn FnOnce() -> LoadFuture + Send>;

/// One file to upload: where it lives locally, where it goes remotely, and a lazy
/// loader invoked only when its upload actually runs.
pub struct LoadingContext {
    absolute_path: PathBuf,
    pathname: RelPath,
    loader: Loader,
}

impl LoadingContext {
    pub fn new<F, Fut>(absolute_path: impl Into<PathBuf>, pathname: RelPath, loader: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<FileContent>> + Send + 'static,
    {
        Self {
            absolute_path: absolute_path.into(),
            pathname,
            loader: Box::new(move || loader().boxed()),
        }
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    pub fn pathname(&self) -> &RelPath {
        &self.pathname
    }

    pub fn into_parts(self) -> (PathBuf, RelPath, Loader) {
        (self.absolute_path, self.pathname, self.loader)
    }
}

impl fmt::Debug for LoadingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingContext")
            .field("absolute_path", &self.absolute_path)
            .field("pathname", &self.pathname)
            .finish_non_exhaustive()
    }
}

/// Remote storage operations the pipeline and the commands rely on.
///
/// Implemented by the HTTP client and by test doubles.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait EdgeStorage: Send + Sync {
    /// Lists a remote directory. A missing directory is an empty listing.
    async fn list(&self, scope: &RelPath) -> Result<Vec<FileMeta>>;

    /// Fetches a remote file, or lists when `scope` ends with `/`.
    async fn get(&self, scope: &RelPath) -> Result<RemoteContent>;

    /// Uploads one file to `scope` + `pathname`.
    async fn put_object(
        &self,
        scope: &RelPath,
        pathname: &RelPath,
        content: FileContent,
    ) -> Result<()>;

    /// Deletes `scope` + `pathname`; with `avoid_throwing` failures resolve to `Ok(())`.
    async fn delete(&self, scope: &RelPath, pathname: &RelPath, avoid_throwing: bool)
        -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_meta_reads_vendor_listing() {
        let raw = r#"[{
            "Guid": "a1",
            "StorageZoneName": "zone",
            "Path": "/zone/ns/pkg/1.0.0/",
            "ObjectName": "index.html",
            "Length": 29,
            "LastChanged": "2023-01-01T00:00:00",
            "ServerId": 1,
            "ArrayNumber": 0,
            "IsDirectory": false,
            "UserId": "u",
            "ContentType": "",
            "DateCreated": "2023-01-01T00:00:00",
            "StorageZoneId": 7,
            "Checksum": "DC28",
            "ReplicatedZones": null
        }]"#;
        let items: Vec<FileMeta> = serde_json::from_str(raw).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].object_name, "index.html");
        assert_eq!(items[0].checksum.as_deref(), Some("DC28"));
        assert!(!items[0].is_directory);
    }

    #[test]
    fn pull_zone_meta_uses_vendor_casing() {
        let zones: Vec<PullZoneMeta> =
            serde_json::from_str(r#"[{"Id": 12, "Name": "docs", "Enabled": true}]"#).unwrap();
        assert_eq!(
            zones,
            vec![PullZoneMeta {
                id: 12,
                name: "docs".into()
            }]
        );
    }

    #[tokio::test]
    async fn loader_runs_only_when_invoked() {
        let ctx = LoadingContext::new("/tmp/a.txt", RelPath::normalize("a.txt"), || async {
            Ok(FileContent::Raw(Bytes::from_static(b"hello")))
        });
        assert_eq!(ctx.pathname().as_str(), "./a.txt");

        let (_, _, loader) = ctx.into_parts();
        let content = loader().await.unwrap();
        assert_eq!(content.buffer().as_ref(), b"hello");
        assert_eq!(content.checksum(), None);
    }
}
