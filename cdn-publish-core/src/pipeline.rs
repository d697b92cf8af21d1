//! # pipeline: guarded batch upload
//!
//! Uploads a list of [`LoadingContext`]s under one remote scope:
//!
//! 1. with semver versioning, refuse to write into a scope that already has content;
//! 2. run at most `batch_size` load-then-put jobs at once, admitted in input order;
//! 3. wait for every job to settle, even after a failure;
//! 4. on any failure, surface one aggregate error and, with semver versioning, delete the
//!    whole scope so a version is never left half published.
//!
//! Progress is reported every two seconds while the batch runs.

use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use crate::cdn::RelPath;
use crate::contract::{EdgeStorage, LoadingContext};
use crate::error::{CdnError, ErrorKind, Result, UploadFailures};
use crate::report::{progress_line, Reporter};

pub const DEFAULT_BATCH_SIZE: usize = 40;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOptions {
    pub is_semver: bool,
    /// Maximum number of uploads in flight. `0` is treated as `1`.
    pub batch_size: usize,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            is_semver: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

pub async fn put<S>(
    storage: &S,
    scope: &RelPath,
    contexts: Vec<LoadingContext>,
    options: PutOptions,
    reporter: &dyn Reporter,
) -> Result<()>
where
    S: EdgeStorage + ?Sized,
{
    let total = contexts.len();
    let batch_size = options.batch_size.max(1);
    info!(
        %scope,
        files = total,
        batch_size,
        is_semver = options.is_semver,
        "Starting batch upload"
    );

    if options.is_semver && !storage.list(scope).await?.is_empty() {
        return Err(CdnError::new(
            ErrorKind::PutOnNonEmptyFolder,
            format!("Folder {scope} is not empty and scoped with semver versioning"),
        ));
    }

    let completed = AtomicUsize::new(0);
    let completed_ref = &completed;
    let mut uploads = pin!(futures::stream::iter(contexts.into_iter().map(
        move |ctx| async move {
            let result = upload_one(storage, scope, ctx).await;
            completed_ref.fetch_add(1, Ordering::Relaxed);
            result
        }
    ))
    .buffer_unordered(batch_size));

    let mut ticker = interval_at(Instant::now() + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    let mut failures = Vec::new();
    loop {
        tokio::select! {
            next = uploads.next() => match next {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    error!(pathname = %e.message(), error = ?e, "Upload failed");
                    failures.push(e);
                }
                None => break,
            },
            _ = ticker.tick() => {
                reporter.message(&progress_line(completed.load(Ordering::Relaxed), total));
            }
        }
    }

    if failures.is_empty() {
        info!(%scope, files = total, "Batch upload completed");
        return Ok(());
    }

    let response = failures.iter().find_map(|f| f.response().cloned());
    let failures = UploadFailures { total, failures };
    let mut batch_error =
        CdnError::new(ErrorKind::UnableToUploadFile, failures.to_string()).with_source(failures);
    if let Some(response) = response {
        batch_error = batch_error.with_response(response);
    }

    if options.is_semver {
        return Err(rollback(storage, scope, batch_error).await);
    }
    Err(batch_error)
}

async fn upload_one<S>(storage: &S, scope: &RelPath, ctx: LoadingContext) -> Result<()>
where
    S: EdgeStorage + ?Sized,
{
    let (absolute_path, pathname, loader) = ctx.into_parts();
    let tag = |e: CdnError| CdnError::wrap(ErrorKind::UnableToUploadFile, pathname.as_str(), e);

    let content = loader().await.map_err(tag)?;
    storage
        .put_object(scope, &pathname, content)
        .await
        .map_err(tag)?;

    debug!(path = %absolute_path.display(), %pathname, "Uploaded");
    Ok(())
}

/// Deletes the whole scope. Returns the error to surface: the batch error when the
/// delete succeeds, an `UnableToDeleteFile` chaining the batch error otherwise.
async fn rollback<S>(storage: &S, scope: &RelPath, batch_error: CdnError) -> CdnError
where
    S: EdgeStorage + ?Sized,
{
    warn!(%scope, "Rolling back partially uploaded version");
    match storage.delete(scope, &RelPath::root(), false).await {
        Ok(()) => batch_error,
        Err(delete_error) => {
            error!(%scope, error = ?delete_error, "Rollback failed");
            CdnError::wrap(
                ErrorKind::UnableToDeleteFile,
                format!("unable to roll back {scope}: {delete_error}"),
                batch_error,
            )
        }
    }
}
