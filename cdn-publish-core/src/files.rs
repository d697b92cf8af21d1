//! # files: local file resolution
//!
//! Turns file matchers into a deduplicated set of absolute paths confined to a working
//! directory, then into [`LoadingContext`]s whose loaders read (and optionally hash) the
//! file only when invoked.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cdn::RelPath;
use crate::contract::{FileContent, LoadingContext};
use crate::error::{CdnError, ErrorKind, Result};
use crate::glob::{expand_braces, Glob};

/// Removes `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` resolved against `base` (an absolute `path` wins) and lexically normalised.
pub fn absolute_resolve(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    normalize_lexically(&base.join(path))
}

/// Uppercase hex SHA-256 of `data`.
pub fn checksum(data: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(data))
}

fn ensure_contained(working_dir: &Path, file: &Path) -> Result<()> {
    let lexical = file.starts_with(working_dir);
    let canonical = match (fs::canonicalize(working_dir), fs::canonicalize(file)) {
        (Ok(root), Ok(file)) => file.starts_with(root),
        _ => lexical,
    };
    if lexical && canonical {
        return Ok(());
    }
    Err(CdnError::new(
        ErrorKind::OutOfScopeFile,
        format!(
            "file: {} is not contained in the current working dir {}",
            file.display(),
            working_dir.display()
        ),
    ))
}

fn walk_dir(current: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let read_error = |e: std::io::Error| {
        CdnError::new(
            ErrorKind::ReadFile,
            format!("Cannot read {}", current.display()),
        )
        .with_source(e)
    };

    for entry in fs::read_dir(current).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        let metadata = fs::metadata(&path).map_err(read_error)?;
        if metadata.is_dir() {
            walk_dir(&path, files)?;
        } else if metadata.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn resolve_matcher(working_dir: &Path, matcher: &str) -> Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    for alternative in expand_braces(matcher) {
        let target = absolute_resolve(working_dir, &alternative);
        if target.is_dir() {
            ensure_contained(working_dir, &target)?;
            walk_dir(&target, &mut candidates)?;
            continue;
        }

        let glob = Glob::parse(&alternative)?;
        let base = absolute_resolve(working_dir, glob.base());
        ensure_contained(working_dir, &base)?;
        if glob.is_literal() {
            if base.is_file() {
                candidates.push(base);
            }
        } else if base.is_dir() {
            let mut walked = Vec::new();
            walk_dir(&base, &mut walked)?;
            candidates.extend(walked.into_iter().filter(|file| {
                relative_slash_path(&base, file).is_some_and(|rel| glob.matches(&rel))
            }));
        }
    }

    for file in &candidates {
        ensure_contained(working_dir, file)?;
    }
    debug!(matcher, files = candidates.len(), "Resolved matcher");
    Ok(candidates)
}

/// Every file matched by `matchers`, as absolute paths under `working_dir`.
///
/// A directory matcher selects every file beneath it. Anything resolving outside
/// `working_dir` fails the whole resolution with `OutOfScopeFile`.
pub fn resolve_files(working_dir: &Path, matchers: &[String]) -> Result<BTreeSet<PathBuf>> {
    let working_dir = normalize_lexically(working_dir);
    let mut files = BTreeSet::new();
    for matcher in matchers {
        files.extend(resolve_matcher(&working_dir, matcher)?);
    }
    Ok(files)
}

/// Destination path of `file`: relative to `working_dir`, or just the file name when
/// the working directory is the filesystem root.
pub fn pathname(working_dir: &Path, file: &Path) -> RelPath {
    if working_dir == Path::new("/") {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return RelPath::normalize(&name);
    }
    let relative = relative_slash_path(working_dir, file)
        .unwrap_or_else(|| file.to_string_lossy().into_owned());
    RelPath::normalize(&relative)
}

pub fn file_loading_context(
    working_dir: &Path,
    file: PathBuf,
    with_checksum: bool,
) -> LoadingContext {
    let pathname = pathname(working_dir, &file);
    let path = file.clone();
    LoadingContext::new(file, pathname, move || async move {
        let buffer = tokio::fs::read(&path).await.map_err(|e| {
            CdnError::new(ErrorKind::ReadFile, format!("Cannot read {}", path.display()))
                .with_source(e)
        })?;
        let buffer = Bytes::from(buffer);
        if with_checksum {
            let digest = checksum(&buffer);
            Ok(FileContent::WithChecksum {
                buffer,
                checksum: digest,
            })
        } else {
            Ok(FileContent::Raw(buffer))
        }
    })
}

/// One [`LoadingContext`] per file. Fails with `NothingToDo` on an empty set.
pub fn loading_contexts(
    working_dir: &Path,
    files: BTreeSet<PathBuf>,
    with_checksum: bool,
) -> Result<Vec<LoadingContext>> {
    if files.is_empty() {
        return Err(CdnError::new(
            ErrorKind::NothingToDo,
            "No file selected to PUT",
        ));
    }
    let working_dir = normalize_lexically(working_dir);
    Ok(files
        .into_iter()
        .map(|file| file_loading_context(&working_dir, file, with_checksum))
        .collect())
}
