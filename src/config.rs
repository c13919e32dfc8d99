// mirrormediad/src/config.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::defs;

pub const CONFIG_FILE_DEFAULT: &str = "/data/system/mirrormedia/config.json";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub socket_name: String,
    pub staging_dir: PathBuf,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_name: defs::SOCKET_NAME.to_string(),
            staging_dir: PathBuf::from(defs::STAGING_DIR),
            verbose: false,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn load_default() -> Result<Self> {
        Self::from_file(Path::new(CONFIG_FILE_DEFAULT))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    pub fn merge_with_cli(
        &mut self,
        socket: Option<String>,
        staging_dir: Option<PathBuf>,
        verbose: bool,
    ) {
        if let Some(socket) = socket {
            self.socket_name = socket;
        }
        if let Some(staging_dir) = staging_dir {
            self.staging_dir = staging_dir;
        }
        if verbose {
            self.verbose = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sub/config.json");

        let mut config = Config::default();
        config.verbose = true;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.socket_name, defs::SOCKET_NAME);
        assert!(loaded.verbose);
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{ "socket_name": "testsock" }"#).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.socket_name, "testsock");
        assert_eq!(loaded.staging_dir, PathBuf::from(defs::STAGING_DIR));
    }

    #[test]
    fn test_merge_with_cli() {
        let mut config = Config::default();
        config.merge_with_cli(Some("alt".to_string()), None, true);
        assert_eq!(config.socket_name, "alt");
        assert_eq!(config.staging_dir, PathBuf::from(defs::STAGING_DIR));
        assert!(config.verbose);
    }
}
