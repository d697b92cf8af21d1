#![doc = "cdn-publish-core: core logic library for cdn-publish."]

//! URL building, HTTP transport, the guarded batch upload pipeline, the edge-storage
//! and pull-zone clients, and local file/manifest resolution.
//!
//! # Usage
//! The `cdn-publish` binary wires these together per command. Library users normally
//! build a [`cdn::CdnContext`], wrap it in a [`storage::EdgeStorageClient`] and call
//! [`storage::EdgeStorageClient::put`] with contexts from [`files::loading_contexts`].

pub mod cdn;
pub mod contract;
pub mod error;
pub mod files;
pub mod glob;
pub mod http;
pub mod manifest;
pub mod pipeline;
pub mod pullzone;
pub mod report;
pub mod storage;

pub use error::{CdnError, ErrorKind, Result};
