use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::digest::{DigestAlgorithm, DEFAULT_ALGORITHM};
use crate::error::{IoResultExt, Result};

/// repository configuration stored in config.toml
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// digest algorithm used for newly written objects
    #[serde(default = "default_algorithm")]
    pub digest_algorithm: DigestAlgorithm,

    /// configured remotes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remotes: Vec<Remote>,
}

fn default_algorithm() -> DigestAlgorithm {
    DEFAULT_ALGORITHM
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    pub fn get_remote(&self, name: &str) -> Option<&Remote> {
        self.remotes.iter().find(|r| r.name == name)
    }

    pub fn set_remote(&mut self, name: impl Into<String>, command: Vec<String>) {
        let name = name.into();
        self.remotes.retain(|r| r.name != name);
        self.remotes.push(Remote { name, command });
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            digest_algorithm: DEFAULT_ALGORITHM,
            remotes: vec![],
        }
    }
}

/// a named remote: the command whose stdio carries the transfer protocol
/// (e.g. `["ssh", "host", "arbor", "serve", "--repo", "/srv/store"]`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub command: Vec<String>,
}
