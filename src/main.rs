//! repo-fetch: fetch remote git repositories into a local directory

use anyhow::Result;

mod cli;

fn main() -> Result<()> {
    cli::run()
}
