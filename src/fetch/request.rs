//! Normalized clone request handed to every downloader

use std::fmt;

/// History depth used for every request built by the service.
pub const SHALLOW_DEPTH: u32 = 1;

/// A uniform description of one clone.
///
/// Empty strings mean "absent": no username/password means anonymous access and an
/// empty `reference_name` means the remote's default branch. A `depth` of 0 fetches
/// the full history.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CloneRequest {
    pub repository_url: String,
    pub username: String,
    pub password: String,
    pub reference_name: String,
    pub depth: u32,
}

impl CloneRequest {
    /// Anonymous shallow clone.
    pub fn public(repository_url: &str, reference_name: &str) -> Self {
        Self {
            repository_url: repository_url.to_string(),
            reference_name: reference_name.to_string(),
            depth: SHALLOW_DEPTH,
            ..Self::default()
        }
    }

    /// Shallow clone authenticated with HTTP basic auth. Credentials are kept as given.
    pub fn with_basic_auth(
        repository_url: &str,
        reference_name: &str,
        username: &str,
        password: &str,
    ) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            ..Self::public(repository_url, reference_name)
        }
    }

    /// Basic auth is used as soon as either field is non-empty.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() || !self.password.is_empty()
    }

    pub fn reference(&self) -> Option<&str> {
        if self.reference_name.is_empty() {
            None
        } else {
            Some(&self.reference_name)
        }
    }
}

impl fmt::Debug for CloneRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("CloneRequest")
            .field("repository_url", &self.repository_url)
            .field("username", &self.username)
            .field("password", &password)
            .field("reference_name", &self.reference_name)
            .field("depth", &self.depth)
            .finish()
    }
}
