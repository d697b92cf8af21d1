#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use cdn_publish_core::cdn::RelPath;
use cdn_publish_core::contract::{
    EdgeStorage, FileContent, FileMeta, LoadingContext, RemoteContent,
};
use cdn_publish_core::error::{CdnError, ErrorKind, ResponseInfo, Result};
use cdn_publish_core::http::ResponseData;

/// `./a/b/` + `./c.txt` -> `a/b/c.txt`
pub fn key(scope: &RelPath, pathname: &RelPath) -> String {
    [scope.as_str(), pathname.as_str()]
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn not_found() -> CdnError {
    CdnError::new(ErrorKind::ResponseNotOk, "response not ok").with_response(ResponseInfo {
        status: 404,
        body: String::new(),
    })
}

/// Stateful in-memory storage that records concurrency and start order of uploads.
#[derive(Default)]
pub struct MemoryStorage {
    pub files: Mutex<BTreeMap<String, Bytes>>,
    pub checksums: Mutex<BTreeMap<String, String>>,
    pub fail_on: HashSet<String>,
    pub fail_delete: bool,
    pub started: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub put_delay: Duration,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            put_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }

    pub fn failing_on(pathnames: &[&str]) -> Self {
        Self {
            fail_on: pathnames.iter().map(|p| p.to_string()).collect(),
            ..Self::new()
        }
    }

    pub fn seed(&self, key: &str, body: &'static [u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from_static(body));
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl EdgeStorage for MemoryStorage {
    async fn list(&self, scope: &RelPath) -> Result<Vec<FileMeta>> {
        let prefix = key(scope, &RelPath::root());
        let prefix = if prefix.is_empty() {
            prefix
        } else {
            format!("{prefix}/")
        };
        let files = self.files.lock().unwrap();
        let mut seen = BTreeSet::new();
        let mut items = Vec::new();
        for k in files.keys().filter(|k| k.starts_with(&prefix)) {
            let rest = &k[prefix.len()..];
            let (name, is_directory) = match rest.split_once('/') {
                Some((dir, _)) => (dir.to_string(), true),
                None => (rest.to_string(), false),
            };
            if seen.insert(name.clone()) {
                items.push(FileMeta {
                    object_name: name,
                    is_directory,
                    path: format!("/zone/{prefix}"),
                    ..Default::default()
                });
            }
        }
        Ok(items)
    }

    async fn get(&self, scope: &RelPath) -> Result<RemoteContent> {
        if scope.is_dir() {
            return self.list(scope).await.map(RemoteContent::Listing);
        }
        let k = key(scope, &RelPath::root());
        let files = self.files.lock().unwrap();
        match files.get(&k) {
            Some(body) => Ok(RemoteContent::File(ResponseData::Text(
                String::from_utf8_lossy(body).into_owned(),
            ))),
            None => Err(CdnError::wrap(
                ErrorKind::UnableToGetFile,
                "unable to retrieve file",
                not_found(),
            )),
        }
    }

    async fn put_object(
        &self,
        scope: &RelPath,
        pathname: &RelPath,
        content: FileContent,
    ) -> Result<()> {
        self.started
            .lock()
            .unwrap()
            .push(pathname.as_str().to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.put_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.contains(pathname.as_str()) {
            return Err(
                CdnError::new(ErrorKind::ResponseNotOk, "response not ok").with_response(
                    ResponseInfo {
                        status: 500,
                        body: "boom".into(),
                    },
                ),
            );
        }

        let k = key(scope, pathname);
        if let Some(checksum) = content.checksum() {
            self.checksums
                .lock()
                .unwrap()
                .insert(k.clone(), checksum.to_string());
        }
        self.files.lock().unwrap().insert(k, content.into_buffer());
        Ok(())
    }

    async fn delete(
        &self,
        scope: &RelPath,
        pathname: &RelPath,
        avoid_throwing: bool,
    ) -> Result<()> {
        let outcome = if self.fail_delete {
            Err(CdnError::new(ErrorKind::ResponseNotOk, "response not ok"))
        } else if pathname.is_dir() {
            let prefix = key(scope, pathname);
            let mut files = self.files.lock().unwrap();
            files.retain(|k, _| !(prefix.is_empty() || k.starts_with(&format!("{prefix}/"))));
            Ok(())
        } else {
            let k = key(scope, pathname);
            match self.files.lock().unwrap().remove(&k) {
                Some(_) => Ok(()),
                None => Err(not_found()),
            }
        };
        match outcome {
            Err(_) if avoid_throwing => Ok(()),
            other => other,
        }
    }
}

pub fn memory_context(name: &str, body: &'static [u8]) -> LoadingContext {
    LoadingContext::new(
        format!("/work/{name}"),
        RelPath::normalize(name),
        move || async move { Ok(FileContent::Raw(Bytes::from_static(body))) },
    )
}
