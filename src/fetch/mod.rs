//! Repository fetching (generic git transport, Azure DevOps)

use crate::config::FetchConfig;
use crate::error::FetchError;
use std::path::Path;
use std::sync::Arc;

pub mod azure;
pub mod cancel;
pub mod git;
pub mod request;
pub mod transport;

pub use azure::AzureDownloader;
pub use cancel::CancelToken;
pub use git::GitDownloader;
pub use request::CloneRequest;
pub use transport::{TransportClient, TransportSettings};

/// A transfer strategy that materializes a repository at a destination path.
pub trait Downloader: Send + Sync {
    fn download(
        &self,
        cancel: &CancelToken,
        destination: &Path,
        request: &CloneRequest,
    ) -> Result<(), FetchError>;
}

/// Hosting classification that selects the downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryHost {
    /// `dev.azure.com` / `*.visualstudio.com`
    Azure,
    /// Anything reachable over the git protocol
    Generic,
}

impl RepositoryHost {
    pub fn classify(url: &str) -> Self {
        if azure::is_azure_url(url) {
            RepositoryHost::Azure
        } else {
            RepositoryHost::Generic
        }
    }
}

/// Dispatches clone requests to the downloader matching the repository host.
///
/// Built once and shared; it holds no per-call state, so concurrent clones through
/// the same instance are independent.
pub struct Service {
    transport: Arc<TransportClient>,
    azure: Box<dyn Downloader>,
    git: Box<dyn Downloader>,
}

impl Service {
    /// Build the shared transport client and both downloaders from `config`.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let transport = Arc::new(TransportClient::new(config.transport.clone())?);
        if let Err(err) = git::apply_server_timeouts(config.transport.timeout()) {
            tracing::warn!("Failed to apply transport timeout to libgit2: {}", err);
        }
        let azure = AzureDownloader::new(Arc::clone(&transport));
        let git = GitDownloader::new(Arc::clone(&transport))
            .preserve_git_dir(config.preserve_git_dir);
        Ok(Self::with_downloaders(transport, Box::new(azure), Box::new(git)))
    }

    pub fn with_downloaders(
        transport: Arc<TransportClient>,
        azure: Box<dyn Downloader>,
        git: Box<dyn Downloader>,
    ) -> Self {
        Self { transport, azure, git }
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    /// Shallow-clone a public repository into `destination`.
    ///
    /// An empty `reference_name` selects the remote's default branch.
    pub fn clone_public_repository(
        &self,
        repository_url: &str,
        reference_name: &str,
        destination: &Path,
    ) -> Result<(), FetchError> {
        self.dispatch(
            destination,
            &CloneRequest::public(repository_url, reference_name),
            &CancelToken::new(),
        )
    }

    /// Shallow-clone a private repository using HTTP basic authentication.
    pub fn clone_private_repository_with_basic_auth(
        &self,
        repository_url: &str,
        reference_name: &str,
        destination: &Path,
        username: &str,
        password: &str,
    ) -> Result<(), FetchError> {
        self.dispatch(
            destination,
            &CloneRequest::with_basic_auth(repository_url, reference_name, username, password),
            &CancelToken::new(),
        )
    }

    /// Run `request` under a caller-owned cancellation token.
    pub fn clone_repository_with_cancel(
        &self,
        destination: &Path,
        request: &CloneRequest,
        cancel: &CancelToken,
    ) -> Result<(), FetchError> {
        self.dispatch(destination, request, cancel)
    }

    fn downloader(&self, host: RepositoryHost) -> &dyn Downloader {
        match host {
            RepositoryHost::Azure => self.azure.as_ref(),
            RepositoryHost::Generic => self.git.as_ref(),
        }
    }

    fn dispatch(
        &self,
        destination: &Path,
        request: &CloneRequest,
        cancel: &CancelToken,
    ) -> Result<(), FetchError> {
        let host = RepositoryHost::classify(&request.repository_url);
        tracing::debug!(?host, ?request, "Dispatching clone request");
        self.downloader(host).download(cancel, destination, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    type Calls = Arc<Mutex<Vec<(PathBuf, CloneRequest)>>>;

    struct Recording {
        calls: Calls,
        fail_with: Option<&'static str>,
    }

    impl Downloader for Recording {
        fn download(
            &self,
            cancel: &CancelToken,
            destination: &Path,
            request: &CloneRequest,
        ) -> Result<(), FetchError> {
            self.calls.lock().expect("lock").push((destination.to_path_buf(), request.clone()));
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled { url: request.repository_url.clone() });
            }
            match self.fail_with {
                Some(message) => Err(FetchError::Clone(git2::Error::from_str(message))),
                None => Ok(()),
            }
        }
    }

    struct Harness {
        service: Service,
        azure: Calls,
        git: Calls,
    }

    fn harness(fail_with: Option<&'static str>) -> Harness {
        let transport =
            Arc::new(TransportClient::new(TransportSettings::default()).expect("transport"));
        let azure = Calls::default();
        let git = Calls::default();
        let service = Service::with_downloaders(
            transport,
            Box::new(Recording { calls: Arc::clone(&azure), fail_with }),
            Box::new(Recording { calls: Arc::clone(&git), fail_with }),
        );
        Harness { service, azure, git }
    }

    #[test]
    fn test_classify_hosts() {
        assert_eq!(
            RepositoryHost::classify("https://dev.azure.com/org/proj/_git/repo"),
            RepositoryHost::Azure
        );
        assert_eq!(
            RepositoryHost::classify("https://org.visualstudio.com/proj/_git/repo"),
            RepositoryHost::Azure
        );
        assert_eq!(
            RepositoryHost::classify("git@ssh.dev.azure.com:v3/org/proj/repo"),
            RepositoryHost::Azure
        );
        assert_eq!(
            RepositoryHost::classify("https://example.com/repo.git"),
            RepositoryHost::Generic
        );
        assert_eq!(
            RepositoryHost::classify("git@github.com:owner/repo.git"),
            RepositoryHost::Generic
        );
    }

    #[test]
    fn test_public_clone_routes_to_git() {
        let h = harness(None);
        h.service
            .clone_public_repository("https://example.com/repo.git", "main", Path::new("/tmp/a"))
            .expect("clone");

        assert!(h.azure.lock().unwrap().is_empty());
        let calls = h.git.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, PathBuf::from("/tmp/a"));
        assert_eq!(
            calls[0].1,
            CloneRequest {
                repository_url: "https://example.com/repo.git".into(),
                username: String::new(),
                password: String::new(),
                reference_name: "main".into(),
                depth: 1,
            }
        );
    }

    #[test]
    fn test_private_clone_routes_to_azure_with_credentials() {
        let h = harness(None);
        h.service
            .clone_private_repository_with_basic_auth(
                "https://dev.azure.com/org/proj/_git/repo",
                "",
                Path::new("/tmp/b"),
                "u",
                "p",
            )
            .expect("clone");

        assert!(h.git.lock().unwrap().is_empty());
        let calls = h.azure.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let request = &calls[0].1;
        assert_eq!(request.username, "u");
        assert_eq!(request.password, "p");
        assert_eq!(request.depth, 1);
        assert_eq!(request.reference_name, "");
    }

    #[test]
    fn test_downloader_error_propagates_unchanged() {
        let h = harness(Some("authentication required"));
        let err = h
            .service
            .clone_public_repository("https://example.com/repo.git", "", Path::new("/tmp/c"))
            .expect_err("should fail");

        let message = err.to_string();
        assert!(message.starts_with(crate::error::CLONE_FAILURE_PREFIX));
        assert!(message.contains("authentication required"));
    }

    #[test]
    fn test_cancellation_reaches_downloader() {
        let h = harness(None);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = h
            .service
            .clone_repository_with_cancel(
                Path::new("/tmp/d"),
                &CloneRequest::public("https://example.com/repo.git", ""),
                &cancel,
            )
            .expect_err("cancelled");
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_service_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Service>();
    }

    #[test]
    fn test_service_new_applies_config() {
        let config = FetchConfig {
            transport: TransportSettings { timeout_secs: 30, skip_tls_verify: false },
            preserve_git_dir: true,
        };
        let service = Service::new(&config).expect("service");
        assert_eq!(service.transport().settings().timeout_secs, 30);
        assert!(!service.transport().accepts_invalid_certs());
    }
}
