//! Configuration loading
//!
//! Settings come from an optional config file and are then overridden by CLI flags
//! (CLI > File > Defaults).

use crate::fetch::TransportSettings;
use serde::{Deserialize, Serialize};

pub mod loader;

pub use loader::load_config;

/// Everything needed to build a [`crate::fetch::Service`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub transport: TransportSettings,
    /// Keep `.git` after a generic git clone.
    pub preserve_git_dir: bool,
}
