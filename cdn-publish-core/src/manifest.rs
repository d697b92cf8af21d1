//! Package manifest (`package.json`) and the publish destination derived from it.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::cdn::RelPath;
use crate::error::{CdnError, ErrorKind, Result};
use crate::files::absolute_resolve;

pub const DEFAULT_MANIFEST: &str = "package.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

/// A parsed manifest and the directory it lives in, which is the working directory
/// for resolving its `files`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageContext {
    pub content: PackageJson,
    pub working_dir: PathBuf,
}

/// True when `version` is a semantic version, with an optional leading `v`.
pub fn is_semver(version: &str) -> bool {
    let version = version.strip_prefix('v').unwrap_or(version);
    semver::Version::parse(version).is_ok()
}

/// Where a package version is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub name: String,
    pub version: Option<String>,
    pub root_dir: RelPath,
    pub is_semver: bool,
}

pub async fn read_package_json(working_dir: &Path, project: &str) -> Result<PackageContext> {
    let path = absolute_resolve(working_dir, project);
    let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
        CdnError::new(ErrorKind::ReadFile, format!("Cannot read {}", path.display()))
            .with_source(e)
    })?;
    let content: PackageJson = serde_json::from_str(&text).map_err(|e| {
        CdnError::new(
            ErrorKind::JsonParseString,
            format!("Something went wrong while JSON-parsing {}", path.display()),
        )
        .with_source(e)
    })?;
    let manifest_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));
    debug!(path = %path.display(), "Read package manifest");
    Ok(PackageContext {
        content,
        working_dir: manifest_dir,
    })
}

/// Loads `project`, or `package.json` in `working_dir` when none is given. A missing
/// default manifest yields an empty one rooted at `working_dir`.
pub async fn load_package(working_dir: &Path, project: Option<&str>) -> Result<PackageContext> {
    match project {
        Some(project) => read_package_json(working_dir, project).await,
        None => match read_package_json(working_dir, DEFAULT_MANIFEST).await {
            Err(e) if e.kind() == ErrorKind::ReadFile => {
                info!(dir = %working_dir.display(), "No package.json found, using an empty manifest");
                Ok(PackageContext {
                    content: PackageJson::default(),
                    working_dir: working_dir.to_path_buf(),
                })
            }
            other => other,
        },
    }
}

impl PackageContext {
    pub fn matchers(&self) -> Result<Vec<String>> {
        match &self.content.files {
            Some(files) if !files.is_empty() => Ok(files.clone()),
            _ => Err(CdnError::new(
                ErrorKind::NoPackageJsonFiles,
                format!(
                    "There are no files/matchers listed in the package.json file {}",
                    self.working_dir.display()
                ),
            )),
        }
    }

    /// `scope/name` from an `@scope/name` package name, or the sanitised `input`.
    pub fn scope(&self, input: Option<&str>) -> Result<String> {
        if let Some(input) = input {
            return Ok(input
                .split('/')
                .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
                .collect::<Vec<_>>()
                .join("/"));
        }

        self.content
            .name
            .as_deref()
            .and_then(|name| name.strip_prefix('@'))
            .and_then(|rest| rest.split_once('/'))
            .filter(|(scope, name)| !scope.is_empty() && !name.is_empty())
            .map(|(scope, name)| format!("{scope}/{name}"))
            .ok_or_else(|| {
                CdnError::new(
                    ErrorKind::NoPackageJsonNameScope,
                    "No scope was matched in package.json `name` field or in --scope",
                )
            })
    }

    /// The override tag when given, else the manifest version.
    pub fn version(&self, override_version: Option<&str>) -> Option<String> {
        override_version
            .or(self.content.version.as_deref())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn destination(
        &self,
        scope: Option<&str>,
        override_version: Option<&str>,
    ) -> Result<Destination> {
        let scope = self.scope(scope)?;
        let version = self.version(override_version);
        Ok(Destination {
            name: self.content.name.clone().unwrap_or_default(),
            is_semver: version.as_deref().is_some_and(is_semver),
            root_dir: prefix(&scope, version.as_deref()),
            version,
        })
    }
}

/// `./{scope}` or `./{scope}/{version}`.
pub fn prefix(scope: &str, version: Option<&str>) -> RelPath {
    match version {
        None => RelPath::normalize(scope),
        Some(version) => {
            let version = version
                .split('/')
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("/");
            RelPath::normalize(&format!("{scope}/{version}"))
        }
    }
}
