//! URL/scope builder.
//!
//! A [`CdnContext`] is built once per command from an access key plus optional server and
//! storage-zone overrides. It owns the base URL of the storage root and maps relative
//! scopes (`./org/lib/1.0.0`) and nested segments onto absolute resource URLs. No I/O.

use std::fmt;

use reqwest::Url;

use crate::error::{CdnError, ErrorKind, Result};

/// A relative remote path. Always starts with `./`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelPath(String);

impl RelPath {
    /// Strict constructor: the input must already start with `./`.
    pub fn new(input: impl Into<String>) -> Result<Self> {
        let input = input.into();
        if input.starts_with("./") {
            Ok(Self(input))
        } else {
            Err(CdnError::new(
                ErrorKind::InvalidRelPath,
                format!("'{input}' is not a relative path starting with './'"),
            ))
        }
    }

    /// The root scope `./`.
    pub fn root() -> Self {
        Self("./".to_string())
    }

    /// Lenient constructor for user input: `/a` and `a` both become `./a`.
    pub fn normalize(input: &str) -> Self {
        if input.starts_with("./") {
            Self(input.to_string())
        } else if let Some(rest) = input.strip_prefix('/') {
            Self(format!("./{rest}"))
        } else {
            Self(format!("./{input}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_dir(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Same path with a forced trailing slash.
    pub fn as_dir(&self) -> Self {
        Self(ends_with_slash(&self.0))
    }

    /// Same path with every trailing slash removed (`./` is kept as is).
    pub fn as_file(&self) -> Self {
        let trimmed = self.0.trim_end_matches('/');
        if trimmed == "." || trimmed.is_empty() {
            Self::root()
        } else {
            Self(trimmed.to_string())
        }
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RelPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for RelPath {
    type Error = CdnError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

pub fn ends_with_slash(input: &str) -> String {
    if input.ends_with('/') {
        input.to_string()
    } else {
        format!("{input}/")
    }
}

/// Forces a leading and a trailing slash.
fn slash_wrapper(input: &str) -> String {
    let output = if input.starts_with('/') {
        input.to_string()
    } else {
        format!("/{input}")
    };
    ends_with_slash(&output)
}

#[derive(Debug, Clone, Default)]
pub struct CdnOptions {
    pub server: Option<String>,
    pub storage_zone_name: Option<String>,
}

/// Immutable addressing context of one command invocation.
#[derive(Clone)]
pub struct CdnContext {
    access_key: String,
    base_url: Url,
    server: String,
    storage_zone_name: String,
}

impl fmt::Debug for CdnContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdnContext")
            .field("access_key", &"***")
            .field("base_url", &self.base_url.as_str())
            .field("server", &self.server)
            .field("storage_zone_name", &self.storage_zone_name)
            .finish()
    }
}

impl CdnContext {
    /// Fails with `InvalidURL` when `server` joined with the zone is not an absolute URL.
    pub fn new(access_key: impl Into<String>, options: CdnOptions) -> Result<Self> {
        let server = options.server.unwrap_or_default();
        let zone = options.storage_zone_name.unwrap_or_default();

        let base_url = Url::parse(&server)
            .and_then(|server_url| server_url.join(&slash_wrapper(&zone)))
            .map_err(|e| {
                CdnError::new(ErrorKind::InvalidUrl, "Invalid URL").with_source(format!(
                    "cannot build a base URL from server '{server}' and storage zone '{zone}': {e}"
                ))
            })?;

        if base_url.cannot_be_a_base() {
            return Err(CdnError::new(
                ErrorKind::InvalidUrl,
                format!("Invalid URL: '{base_url}' cannot be used as a base"),
            ));
        }

        let origin = base_url.origin().ascii_serialization();
        let storage_zone_name = base_url.path().to_string();
        tracing::debug!(base_url = %base_url, "Built CDN context");

        Ok(Self {
            access_key: access_key.into(),
            base_url,
            server: origin,
            storage_zone_name,
        })
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Origin of the server, e.g. `https://storage.bunnycdn.com`.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Path segment of the storage zone, slash wrapped (`/zone/`).
    pub fn storage_zone_name(&self) -> &str {
        &self.storage_zone_name
    }

    /// Appends `scope` to the base URL, then each segment to the previous result, left to
    /// right. A trailing slash on the last piece is kept.
    pub fn build_url(&self, scope: &RelPath, segments: &[&RelPath]) -> Result<Url> {
        let first = build_segment(&self.base_url, scope)?;
        segments
            .iter()
            .try_fold(first, |url, segment| build_segment(&url, segment))
    }
}

/// Appends the path elements of `segment` to `base`, percent-encoding each one so that
/// names containing `#`, `?` or `%` stay inside the path.
fn build_segment(base: &Url, segment: &RelPath) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url.path_segments_mut().map_err(|()| {
            CdnError::new(
                ErrorKind::InvalidUrl,
                format!("Invalid URL: cannot append '{segment}' to '{base}'"),
            )
        })?;
        path.pop_if_empty();
        for name in segment.as_str().split('/') {
            match name {
                "" | "." => {}
                ".." => {
                    path.pop();
                }
                name => {
                    path.push(name);
                }
            }
        }
        if segment.is_dir() {
            path.push("");
        }
    }
    Ok(url)
}
