//! Error taxonomy shared by every component of the crate.
//!
//! All failures are a single [`CdnError`] value: a [`ErrorKind`] discriminant, a human
//! readable message and an optional chained cause. Failures coming from an HTTP response
//! additionally keep a [`ResponseInfo`] snapshot so callers can branch on the status code
//! (the CLI special-cases `401`).

use std::fmt;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = CdnError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ReadFile,
    ResponseNotOk,
    BodyNotOk,
    JsonParseString,
    NoFiles,
    NoPackageJsonFiles,
    NoPackageJsonNameScope,
    InvalidUrl,
    InvalidRelPath,
    InvalidConfig,
    NothingToDo,
    OutOfScopeFile,
    PutOnNonEmptyFolder,
    UnableToUploadFile,
    UnableToDeleteFile,
    UnableToGetFile,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ReadFile => "ReadFile",
            ErrorKind::ResponseNotOk => "ResponseNotOk",
            ErrorKind::BodyNotOk => "BodyNotOk",
            ErrorKind::JsonParseString => "JSONParseString",
            ErrorKind::NoFiles => "NoFiles",
            ErrorKind::NoPackageJsonFiles => "NoPackageJsonFiles",
            ErrorKind::NoPackageJsonNameScope => "NoPackageJsonNameScope",
            ErrorKind::InvalidUrl => "InvalidURL",
            ErrorKind::InvalidRelPath => "InvalidRelPath",
            ErrorKind::InvalidConfig => "InvalidConfig",
            ErrorKind::NothingToDo => "NothingToDo",
            ErrorKind::OutOfScopeFile => "OutOfScopeFile",
            ErrorKind::PutOnNonEmptyFolder => "PutOnNonEmptyFolder",
            ErrorKind::UnableToUploadFile => "UnableToUploadFile",
            ErrorKind::UnableToDeleteFile => "UnableToDeleteFile",
            ErrorKind::UnableToGetFile => "UnableToGetFile",
        };
        f.write_str(name)
    }
}

/// Snapshot of a non-2xx HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseInfo {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CdnError {
    kind: ErrorKind,
    message: String,
    response: Option<ResponseInfo>,
    #[source]
    source: Option<BoxError>,
}

impl CdnError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            response: None,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_response(mut self, response: ResponseInfo) -> Self {
        self.response = Some(response);
        self
    }

    /// Wraps `cause` under a new kind and message, keeping the response snapshot
    /// of the cause reachable from the outer error.
    pub fn wrap(kind: ErrorKind, message: impl Into<String>, cause: CdnError) -> Self {
        let response = cause.response.clone();
        Self {
            kind,
            message: message.into(),
            response,
            source: Some(Box::new(cause)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn response(&self) -> Option<&ResponseInfo> {
        self.response.as_ref()
    }

    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// The chained cause, when it is itself a [`CdnError`].
    pub fn cause(&self) -> Option<&CdnError> {
        self.source.as_ref().and_then(|s| s.downcast_ref::<CdnError>())
    }

    /// Individual per-file failures, when this error aggregates a failed batch.
    pub fn upload_failures(&self) -> Option<&UploadFailures> {
        self.source
            .as_ref()
            .and_then(|s| s.downcast_ref::<UploadFailures>())
            .or_else(|| self.cause().and_then(CdnError::upload_failures))
    }
}

/// Every failure of one batch upload, in settlement order.
#[derive(Debug)]
pub struct UploadFailures {
    pub total: usize,
    pub failures: Vec<CdnError>,
}

impl UploadFailures {
    pub fn pathnames(&self) -> Vec<&str> {
        self.failures.iter().map(CdnError::message).collect()
    }
}

impl fmt::Display for UploadFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} files failed to upload: {}",
            self.failures.len(),
            self.total,
            self.pathnames().join(", ")
        )
    }
}

impl std::error::Error for UploadFailures {}
