//! Clone command implementation

use anyhow::{Context, Result};
use clap::Args;
use repo_fetch::config::load_config;
use repo_fetch::{FetchConfig, Service};
use std::path::PathBuf;

#[derive(Args)]
pub struct CloneArgs {
    /// Repository URL (any git remote, or an Azure DevOps `_git` URL)
    #[arg(value_name = "URL")]
    pub url: String,

    /// Directory to write the working tree into
    #[arg(value_name = "DEST")]
    pub destination: PathBuf,

    /// Branch or tag to check out (e.g. `main`, `refs/tags/v1.0`); defaults to the remote HEAD
    #[arg(long = "ref", value_name = "REF", default_value = "")]
    pub reference: String,

    /// Username for HTTP basic authentication
    #[arg(short, long, value_name = "USER")]
    pub username: Option<String>,

    /// Password or access token for HTTP basic authentication
    #[arg(short, long, value_name = "PASS", env = "REPO_FETCH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to config file (repo-fetch.toml or .repo-fetch.yml)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Keep the .git directory after cloning
    #[arg(long)]
    pub keep_git_dir: bool,

    /// Verify TLS certificates of the remote
    #[arg(long)]
    pub verify_tls: bool,

    /// HTTP timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl CloneArgs {
    fn apply_overrides(&self, mut config: FetchConfig) -> FetchConfig {
        if self.keep_git_dir {
            config.preserve_git_dir = true;
        }
        if self.verify_tls {
            config.transport.skip_tls_verify = false;
        }
        if let Some(timeout) = self.timeout {
            config.transport.timeout_secs = timeout;
        }
        config
    }
}

pub fn run(args: CloneArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config = args.apply_overrides(load_config(&cwd, args.config.as_deref())?);
    let service = Service::new(&config)?;

    let result = match (&args.username, &args.password) {
        (None, None) => {
            service.clone_public_repository(&args.url, &args.reference, &args.destination)
        }
        (username, password) => service.clone_private_repository_with_basic_auth(
            &args.url,
            &args.reference,
            &args.destination,
            username.as_deref().unwrap_or(""),
            password.as_deref().unwrap_or(""),
        ),
    };
    result.with_context(|| format!("Failed to fetch {}", args.url))?;

    println!("Fetched {} into {}", args.url, args.destination.display());
    Ok(())
}
