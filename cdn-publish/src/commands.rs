//! Command handlers: resolve options, build clients, call into `cdn-publish-core`,
//! report results.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use cdn_publish_core::cdn::{CdnContext, CdnOptions, RelPath};
use cdn_publish_core::contract::{EdgeStorage, RemoteContent};
use cdn_publish_core::error::{CdnError, ErrorKind};
use cdn_publish_core::files::{loading_contexts, resolve_files};
use cdn_publish_core::http::ResponseData;
use cdn_publish_core::manifest::load_package;
use cdn_publish_core::pipeline::PutOptions;
use cdn_publish_core::pullzone::PullZoneClient;
use cdn_publish_core::report::{listing_table, pull_zone_table, Reporter};
use cdn_publish_core::storage::EdgeStorageClient;
use tracing::info;

use crate::cli::{ApiArgs, PublishArgs, StorageArgs, UploadArgs};
use crate::load_config::{CliConfig, DEFAULT_API_BASE_URL, DEFAULT_STORAGE_BASE_URL};

pub struct RunContext {
    pub working_dir: PathBuf,
    pub reporter: Arc<dyn Reporter>,
    pub config: CliConfig,
}

fn storage_client(args: &StorageArgs, ctx: &RunContext) -> Result<EdgeStorageClient> {
    let section = &ctx.config.storage;
    let access_key = args
        .access_key
        .clone()
        .or_else(|| section.access_key.clone())
        .ok_or_else(|| {
            anyhow!("missing storage access key: pass -k/--storage-access-key, set CDN_STORAGE_ACCESS_KEY or storage.access_key in --config")
        })?;
    let zone_name = args
        .zone_name
        .clone()
        .or_else(|| section.zone_name.clone())
        .ok_or_else(|| {
            anyhow!("missing storage zone name: pass -s/--storage-zone-name, set CDN_STORAGE_ZONE_NAME or storage.zone_name in --config")
        })?;
    let server = args
        .base_url
        .clone()
        .or_else(|| section.base_url.clone())
        .unwrap_or_else(|| DEFAULT_STORAGE_BASE_URL.to_string());

    let cdn = CdnContext::new(
        access_key,
        CdnOptions {
            server: Some(server),
            storage_zone_name: Some(zone_name),
        },
    )?;
    Ok(EdgeStorageClient::with_retry(
        cdn,
        ctx.reporter.clone(),
        ctx.config.retry_policy(),
    )?)
}

fn pull_zone_client(args: &ApiArgs, ctx: &RunContext) -> Result<PullZoneClient> {
    let section = &ctx.config.api;
    let access_key = args
        .access_key
        .clone()
        .or_else(|| section.access_key.clone())
        .ok_or_else(|| {
            anyhow!("missing API access key: pass -k/--access-key, set CDN_ACCESS_KEY or api.access_key in --config")
        })?;
    let server = args
        .base_url
        .clone()
        .or_else(|| section.base_url.clone())
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

    let cdn = CdnContext::new(
        access_key,
        CdnOptions {
            server: Some(server),
            storage_zone_name: None,
        },
    )?;
    Ok(PullZoneClient::with_retry(cdn, ctx.config.retry_policy())?)
}

/// `./dir/` for any of `dir`, `/dir`, `./dir` with or without a trailing slash.
pub fn normalize_dir(input: &str) -> RelPath {
    RelPath::normalize(input).as_dir()
}

/// `./file` without a trailing slash.
pub fn normalize_file(input: &str) -> RelPath {
    RelPath::normalize(input).as_file()
}

/// Splits a remote path into its directory and optional file name:
/// `a/b.txt` is `(./a/, ./b.txt)`, `a/b/` is `(./a/b/, None)`.
pub fn split_remote_path(input: &str) -> (RelPath, Option<RelPath>) {
    let normalized = RelPath::normalize(input);
    let path = normalized.as_str();
    match path.rfind('/') {
        Some(idx) if idx + 1 < path.len() => (
            RelPath::normalize(&path[..=idx]),
            Some(RelPath::normalize(&path[idx + 1..])),
        ),
        _ => (normalized, None),
    }
}

pub async fn publish(args: PublishArgs, ctx: &RunContext) -> Result<()> {
    let storage = storage_client(&args.storage, ctx)?;
    let package = load_package(&ctx.working_dir, args.project.as_deref()).await?;

    let matchers = if args.files.is_empty() {
        package.matchers()?
    } else {
        args.files.clone()
    };
    let checksum = ctx.config.checksum(args.tuning.checksum);
    let files = resolve_files(&package.working_dir, &matchers)?;
    let contexts = loading_contexts(&package.working_dir, files, checksum)?;

    let tag = args.override_version.as_ref().and_then(|v| v.as_deref());
    let destination = package.destination(args.scope.as_deref(), tag)?;
    info!(
        command = "publish",
        root_dir = %destination.root_dir,
        is_semver = destination.is_semver,
        files = contexts.len(),
        "Publishing package"
    );

    if args.override_version.is_some() {
        storage
            .delete(&destination.root_dir, &RelPath::root(), true)
            .await?;
    }

    storage
        .put(
            &destination.root_dir,
            contexts,
            PutOptions {
                is_semver: destination.is_semver,
                batch_size: ctx.config.batch_size(args.tuning.batch_size),
            },
        )
        .await?;

    let reporter = &ctx.reporter;
    reporter.message(&format!(
        "Package: {}:{}",
        destination.name,
        destination.version.as_deref().unwrap_or_default()
    ));
    reporter.message(&format!("Storage: {}", storage.cdn().base_url()));
    reporter.message(&format!("Path: {}", destination.root_dir));
    Ok(())
}

pub async fn upload(args: UploadArgs, ctx: &RunContext) -> Result<()> {
    let storage = storage_client(&args.storage, ctx)?;
    if args.files.is_empty() {
        return Err(CdnError::new(ErrorKind::NoFiles, "There are no files/matcher in args").into());
    }

    let checksum = ctx.config.checksum(args.tuning.checksum);
    let files = resolve_files(&ctx.working_dir, &args.files)?;
    let contexts = loading_contexts(&ctx.working_dir, files, checksum)?;
    let dest = RelPath::normalize(&args.dest);
    info!(command = "upload", %dest, files = contexts.len(), "Uploading files");

    storage
        .put(
            &dest,
            contexts,
            PutOptions {
                is_semver: false,
                batch_size: ctx.config.batch_size(args.tuning.batch_size),
            },
        )
        .await?;

    ctx.reporter
        .message(&format!("Storage: {}", storage.cdn().base_url()));
    ctx.reporter.message(&format!("Path: {dest}"));
    Ok(())
}

pub async fn list(args: &StorageArgs, dir: &str, ctx: &RunContext) -> Result<()> {
    let storage = storage_client(args, ctx)?;
    let items = storage.list(&normalize_dir(dir)).await?;
    ctx.reporter.table(listing_table(&items));
    Ok(())
}

pub async fn get(args: &StorageArgs, file: &str, ctx: &RunContext) -> Result<()> {
    let storage = storage_client(args, ctx)?;
    match storage.get(&normalize_file(file)).await? {
        RemoteContent::Listing(items) => ctx.reporter.table(listing_table(&items)),
        RemoteContent::File(ResponseData::Text(text)) => ctx.reporter.message(&text),
        RemoteContent::File(ResponseData::Json(value)) => {
            ctx.reporter.message(&serde_json::to_string_pretty(&value)?)
        }
    }
    Ok(())
}

pub async fn delete(
    args: &StorageArgs,
    target: &str,
    avoid_throwing: bool,
    ctx: &RunContext,
) -> Result<()> {
    let storage = storage_client(args, ctx)?;
    let (dir, filename) = split_remote_path(target);
    let pathname = filename.clone().unwrap_or_else(RelPath::root);
    storage.delete(&dir, &pathname, avoid_throwing).await?;

    let deleted = match &filename {
        Some(file) => format!("{dir}{}", file.as_str().trim_start_matches("./")),
        None => format!("{dir}*"),
    };
    ctx.reporter.message(&format!("Deleted: {deleted}"));
    ctx.reporter
        .message(&format!("Storage: {}", storage.cdn().base_url()));
    Ok(())
}

pub async fn pullzone_list(args: &ApiArgs, search: Option<&str>, ctx: &RunContext) -> Result<()> {
    let client = pull_zone_client(args, ctx)?;
    let zones = client.list(search).await?;
    ctx.reporter.table(pull_zone_table(&zones));
    Ok(())
}

pub async fn pullzone_purge(args: &ApiArgs, zone: Option<u64>, ctx: &RunContext) -> Result<()> {
    let client = pull_zone_client(args, ctx)?;
    client.purge(zone, ctx.reporter.as_ref()).await?;
    Ok(())
}
