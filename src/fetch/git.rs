//! Clone over the git protocol (libgit2)

use crate::error::FetchError;
use crate::fetch::cancel::run_cancellable;
use crate::fetch::{CancelToken, CloneRequest, Downloader, TransportClient};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{CertificateCheckStatus, Cred, FetchOptions, ProxyOptions, RemoteCallbacks, Repository};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Version-control metadata directory inside a working tree.
pub const METADATA_DIR: &str = ".git";

#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Transfer options derived from a [`CloneRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub url: String,
    /// `None` fetches the full history.
    pub depth: Option<i32>,
    pub auth: Option<BasicAuth>,
    /// `None` checks out the remote's default branch.
    pub reference_name: Option<String>,
}

impl TransferConfig {
    pub fn from_request(request: &CloneRequest) -> Self {
        let auth = request.has_credentials().then(|| BasicAuth {
            username: request.username.clone(),
            password: request.password.clone(),
        });
        let depth =
            (request.depth > 0).then(|| i32::try_from(request.depth).unwrap_or(i32::MAX));

        Self {
            url: request.repository_url.clone(),
            depth,
            auth,
            reference_name: request.reference().map(str::to_string),
        }
    }
}

/// How a reference name gets checked out.
#[derive(Debug, PartialEq, Eq)]
enum Checkout<'a> {
    /// Cloned directly as the initial branch.
    Branch(&'a str),
    /// Fetched explicitly after the clone and checked out detached (tags, other refs).
    Pinned(&'a str),
}

fn classify_reference(name: &str) -> Checkout<'_> {
    if let Some(branch) = name.strip_prefix("refs/heads/") {
        Checkout::Branch(branch)
    } else if name.starts_with("refs/") {
        Checkout::Pinned(name)
    } else {
        Checkout::Branch(name)
    }
}

/// Apply the transport timeout to libgit2's own HTTP and socket transports.
///
/// libgit2 keeps these as process-wide options, so the last service built wins.
pub fn apply_server_timeouts(timeout: Duration) -> Result<(), git2::Error> {
    let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    // SAFETY: plain integer options; libgit2 reads them when opening a connection.
    unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)?;
        git2::opts::set_server_timeout_in_milliseconds(millis)?;
    }
    tracing::debug!("libgit2 server timeouts set to {} ms", millis);
    Ok(())
}

/// Everything one clone needs, owned so it can run on the transfer thread.
struct Transfer {
    config: TransferConfig,
    skip_tls_verify: bool,
    cancel: CancelToken,
}

impl Transfer {
    fn fetch_options(&self) -> FetchOptions<'_> {
        let mut callbacks = RemoteCallbacks::new();

        if let Some(auth) = &self.config.auth {
            // libgit2 keeps asking while the callback succeeds; offer the pair once.
            let mut offered = false;
            callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
                if offered {
                    return Err(git2::Error::from_str("remote rejected the supplied credentials"));
                }
                offered = true;
                Cred::userpass_plaintext(&auth.username, &auth.password)
            });
        }

        let skip_tls_verify = self.skip_tls_verify;
        callbacks.certificate_check(move |_cert, host| {
            if skip_tls_verify {
                tracing::trace!("Accepting certificate for {} without verification", host);
                Ok(CertificateCheckStatus::CertificateOk)
            } else {
                Ok(CertificateCheckStatus::CertificatePassthrough)
            }
        });

        let cancel = &self.cancel;
        callbacks.transfer_progress(move |progress| {
            tracing::trace!(
                "Receiving objects: {}/{} ({} bytes)",
                progress.received_objects(),
                progress.total_objects(),
                progress.received_bytes()
            );
            !cancel.is_cancelled()
        });
        callbacks.sideband_progress(move |_data| !cancel.is_cancelled());

        let mut proxy = ProxyOptions::new();
        proxy.auto();

        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);
        options.proxy_options(proxy);
        if let Some(depth) = self.config.depth {
            options.depth(depth);
        }
        options
    }

    fn clone_into(&self, destination: &Path) -> Result<Repository, git2::Error> {
        let mut builder = RepoBuilder::new();
        builder.fetch_options(self.fetch_options());

        let pinned = match self.config.reference_name.as_deref().map(classify_reference) {
            Some(Checkout::Branch(branch)) => {
                builder.branch(branch);
                None
            }
            Some(Checkout::Pinned(reference)) => Some(reference),
            None => None,
        };

        let repo = builder.clone(&self.config.url, destination)?;
        if let Some(reference) = pinned {
            self.checkout_pinned(&repo, reference)?;
        }
        Ok(repo)
    }

    /// Fetch `reference` with the same depth and credentials, then detach HEAD onto it.
    fn checkout_pinned(&self, repo: &Repository, reference: &str) -> Result<(), git2::Error> {
        let refspec = format!("+{reference}:{reference}");
        let mut options = self.fetch_options();
        repo.find_remote("origin")?.fetch(&[refspec.as_str()], Some(&mut options), None)?;

        let commit = repo.revparse_single(reference)?.peel_to_commit()?;
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        repo.set_head_detached(commit.id())?;
        Ok(())
    }

    fn run(&self, destination: &Path) -> Result<(), FetchError> {
        match self.clone_into(destination) {
            Ok(_repo) => Ok(()),
            Err(_) if self.cancel.is_cancelled() => {
                Err(FetchError::Cancelled { url: self.config.url.clone() })
            }
            Err(err) => Err(FetchError::Clone(err)),
        }
    }
}

/// Downloader speaking the standard git wire protocol.
pub struct GitDownloader {
    transport: Arc<TransportClient>,
    preserve_git_dir: bool,
}

impl GitDownloader {
    pub fn new(transport: Arc<TransportClient>) -> Self {
        Self { transport, preserve_git_dir: false }
    }

    /// Keep the `.git` directory after a successful clone.
    pub fn preserve_git_dir(mut self, preserve: bool) -> Self {
        self.preserve_git_dir = preserve;
        self
    }
}

impl Downloader for GitDownloader {
    fn download(
        &self,
        cancel: &CancelToken,
        destination: &Path,
        request: &CloneRequest,
    ) -> Result<(), FetchError> {
        let config = TransferConfig::from_request(request);
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled { url: config.url });
        }

        tracing::info!("Cloning {} into {}", config.url, destination.display());
        tracing::debug!(?config, "Git transfer configuration");

        let url = config.url.clone();
        let transfer = Transfer {
            config,
            skip_tls_verify: self.transport.accepts_invalid_certs(),
            cancel: cancel.clone(),
        };
        let target = destination.to_path_buf();
        run_cancellable(cancel, &url, move || transfer.run(&target))?;

        if !self.preserve_git_dir {
            remove_metadata_dir(destination);
        }

        tracing::info!("Clone complete: {}", destination.display());
        Ok(())
    }
}

/// Best-effort: the clone already succeeded, so failures are only logged.
fn remove_metadata_dir(destination: &Path) {
    let metadata = destination.join(METADATA_DIR);
    if let Err(err) = std::fs::remove_dir_all(&metadata) {
        tracing::warn!("Failed to remove {}: {}", metadata.display(), err);
    }
}
