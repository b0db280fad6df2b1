//! Azure DevOps repository download
//!
//! Azure DevOps serves a zip snapshot of any branch, tag or commit through its REST
//! API. The snapshot is streamed to a temporary file over the shared transport client
//! and unpacked into the destination, producing a working tree without metadata.

use crate::error::{AzureError, FetchError};
use crate::fetch::cancel::run_cancellable;
use crate::fetch::{CancelToken, CloneRequest, Downloader, TransportClient};
use reqwest::Url;
use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::Path;
use std::sync::Arc;

const API_VERSION: &str = "6.0";
const CHUNK_SIZE: usize = 64 * 1024;

/// Returns `true` if `url` is hosted on Azure DevOps (current or legacy domain).
pub fn is_azure_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains("dev.azure.com") || lower.contains("visualstudio.com")
}

/// Components of an Azure DevOps git URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureRepo {
    /// `https://dev.azure.com/{org}` or `https://{org}.visualstudio.com`
    pub base_url: String,
    pub project: String,
    pub repository: String,
}

/// Parse an Azure DevOps git URL.
///
/// Supported formats:
/// - `https://[user@]dev.azure.com/{org}/[{project}/]_git/{repo}`
/// - `https://{org}.visualstudio.com/[DefaultCollection/][{project}/]_git/{repo}`
/// - `git@ssh.dev.azure.com:v3/{org}/{project}/{repo}` (also as `ssh://`)
/// - `{org}@vs-ssh.visualstudio.com:v3/{org}/{project}/{repo}` (also as `ssh://`)
///
/// When the project segment is absent the project shares the repository's name.
pub fn parse_azure_url(url: &str) -> Result<AzureRepo, AzureError> {
    let invalid = || AzureError::InvalidUrl(url.to_string());
    let (host, path) = split_host_path(url).ok_or_else(invalid)?;
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let repo = match host.as_str() {
        "ssh.dev.azure.com" | "vs-ssh.visualstudio.com" => from_ssh_path(&host, &parts),
        "dev.azure.com" => from_dev_azure_path(&parts),
        h if h.ends_with(".visualstudio.com") => from_visualstudio_path(h, &parts),
        _ => None,
    };
    repo.ok_or_else(invalid)
}

/// Split `scheme://[user@]host/path` or scp-like `user@host:path`.
fn split_host_path(url: &str) -> Option<(String, String)> {
    if url.contains("://") {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        return Some((host, parsed.path().to_string()));
    }
    let (user_host, path) = url.split_once(':')?;
    let host = user_host.rsplit_once('@').map_or(user_host, |(_, host)| host);
    Some((host.to_ascii_lowercase(), path.to_string()))
}

fn repository_name(segment: &str) -> Option<String> {
    let name = segment.trim_end_matches(".git");
    (!name.is_empty()).then(|| name.to_string())
}

/// `v3/{org}/{project}/{repo}`
fn from_ssh_path(host: &str, parts: &[&str]) -> Option<AzureRepo> {
    let ["v3", org, project, repository] = parts else {
        return None;
    };
    let base_url = if host == "ssh.dev.azure.com" {
        format!("https://dev.azure.com/{org}")
    } else {
        format!("https://{org}.visualstudio.com")
    };
    Some(AzureRepo {
        base_url,
        project: project.to_string(),
        repository: repository_name(repository)?,
    })
}

/// `{org}/[{project}/]_git/{repo}`
fn from_dev_azure_path(parts: &[&str]) -> Option<AzureRepo> {
    let (org, project, repository) = match parts {
        [org, "_git", repository] => (org, None, repository),
        [org, project, "_git", repository] => (org, Some(project), repository),
        _ => return None,
    };
    let repository = repository_name(repository)?;
    let project = project.map_or_else(|| repository.clone(), |p| p.to_string());
    Some(AzureRepo { base_url: format!("https://dev.azure.com/{org}"), project, repository })
}

/// `[{collection}/][{project}/]_git/{repo}`
fn from_visualstudio_path(host: &str, parts: &[&str]) -> Option<AzureRepo> {
    let (project, repository) = match parts {
        ["_git", repository] => (None, repository),
        [project, "_git", repository] | [_, project, "_git", repository] => {
            (Some(project), repository)
        }
        _ => return None,
    };
    let repository = repository_name(repository)?;
    let project = project.map_or_else(|| repository.clone(), |p| p.to_string());
    Some(AzureRepo { base_url: format!("https://{host}"), project, repository })
}

/// Map a git reference name to Azure's `(version, versionType)` pair.
fn version_descriptor(reference: &str) -> (&str, &'static str) {
    if let Some(branch) = reference.strip_prefix("refs/heads/") {
        (branch, "branch")
    } else if let Some(tag) = reference.strip_prefix("refs/tags/") {
        (tag, "tag")
    } else if reference.len() == 40 && reference.chars().all(|c| c.is_ascii_hexdigit()) {
        (reference, "commit")
    } else {
        (reference, "branch")
    }
}

/// Build the `items` endpoint URL that returns the zip snapshot.
pub fn archive_url(repo: &AzureRepo, reference: Option<&str>) -> Result<Url, AzureError> {
    let endpoint = format!(
        "{}/{}/_apis/git/repositories/{}/items",
        repo.base_url, repo.project, repo.repository
    );
    let mut url = Url::parse(&endpoint).map_err(|_| AzureError::InvalidUrl(endpoint.clone()))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("scopePath", "/")
            .append_pair("recursionLevel", "full")
            .append_pair("download", "true")
            .append_pair("$format", "zip")
            .append_pair("api-version", API_VERSION);
        if let Some(reference) = reference {
            let (version, version_type) = version_descriptor(reference);
            query
                .append_pair("versionDescriptor.version", version)
                .append_pair("versionDescriptor.versionType", version_type);
        }
    }
    Ok(url)
}

/// Downloader for repositories hosted on Azure DevOps.
pub struct AzureDownloader {
    transport: Arc<TransportClient>,
}

impl AzureDownloader {
    pub fn new(transport: Arc<TransportClient>) -> Self {
        Self { transport }
    }

    /// Fetch the snapshot at `url` and unpack it into `destination`.
    ///
    /// The HTTP exchange runs on a transfer thread so that `cancel` is honoured while
    /// the server is slow to answer or stalls mid-body.
    pub fn download_archive(
        &self,
        cancel: &CancelToken,
        url: Url,
        destination: &Path,
        request: &CloneRequest,
    ) -> Result<(), FetchError> {
        let transport = Arc::clone(&self.transport);
        let owned = request.clone();
        let worker_cancel = cancel.clone();
        let mut archive = run_cancellable(cancel, &request.repository_url, move || {
            fetch_archive(&transport, &url, &owned, &worker_cancel)
        })?;

        archive
            .rewind()
            .map_err(|source| AzureError::Io { path: std::env::temp_dir(), source })?;
        extract_archive(archive, destination, cancel, &request.repository_url)
    }
}

/// Stream the archive into an anonymous temporary file, polling `cancel` between chunks.
fn fetch_archive(
    transport: &TransportClient,
    url: &Url,
    request: &CloneRequest,
    cancel: &CancelToken,
) -> Result<File, FetchError> {
    let io_err = |source| AzureError::Io { path: std::env::temp_dir(), source };
    let mut sink = tempfile::tempfile().map_err(io_err)?;

    let mut http_request = transport.http().get(url.clone());
    if request.has_credentials() {
        http_request = http_request.basic_auth(&request.username, Some(&request.password));
    }

    let mut response = http_request
        .send()
        .map_err(|source| AzureError::Request { url: url.to_string(), source })?;
    let status = response.status();
    if !status.is_success() {
        return Err(AzureError::Status { url: url.to_string(), status: status.as_u16() }.into());
    }

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled { url: request.repository_url.clone() });
        }
        let read = response.read(&mut buf).map_err(io_err)?;
        if read == 0 {
            break;
        }
        sink.write_all(&buf[..read]).map_err(io_err)?;
    }
    sink.flush().map_err(io_err)?;
    Ok(sink)
}

impl Downloader for AzureDownloader {
    fn download(
        &self,
        cancel: &CancelToken,
        destination: &Path,
        request: &CloneRequest,
    ) -> Result<(), FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled { url: request.repository_url.clone() });
        }

        let repo = parse_azure_url(&request.repository_url)?;
        let url = archive_url(&repo, request.reference())?;
        tracing::info!(
            "Downloading Azure DevOps repository {} into {}",
            repo.repository,
            destination.display()
        );
        tracing::debug!("Azure DevOps archive endpoint: {}", url);

        self.download_archive(cancel, url, destination, request)?;

        tracing::info!("Download complete: {}", destination.display());
        Ok(())
    }
}

/// Unpack a zip archive into `destination`.
///
/// Entries whose names would escape `destination` are skipped.
pub fn extract_archive<R: Read + Seek>(
    reader: R,
    destination: &Path,
    cancel: &CancelToken,
    url: &str,
) -> Result<(), FetchError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| AzureError::Io { path, source }
    };

    let mut archive = zip::ZipArchive::new(reader).map_err(AzureError::from)?;
    fs::create_dir_all(destination).map_err(io_err(destination))?;

    for index in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled { url: url.to_string() });
        }

        let mut entry = archive.by_index(index).map_err(AzureError::from)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        let target = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(io_err(&target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut file = File::create(&target).map_err(io_err(&target))?;
        io::copy(&mut entry, &mut file).map_err(io_err(&target))?;
    }

    Ok(())
}
