//! repo-fetch: fetch remote git repositories into a local directory
//!
//! Requests are routed by host: Azure DevOps repositories are downloaded as zip
//! snapshots through the Azure DevOps REST API, everything else is cloned over the
//! git protocol with libgit2. Both paths share one configured HTTP transport.

pub mod config;
pub mod error;
pub mod fetch;

#[cfg(test)]
mod test_utils;

pub use config::FetchConfig;
pub use error::FetchError;
pub use fetch::{CancelToken, CloneRequest, Downloader, RepositoryHost, Service};
