use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::OdmError;

/// Optional settings read from `config.toml`. Unset fields fall back to
/// command line flags or to code defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub make_output_dir: Option<bool>,
    /// remove the `.odm` file after a successful run
    pub delete_source: Option<bool>,
    pub max_retries: Option<u32>,
    /// wait before the first retry in seconds (can be fractional)
    pub wait_between_retries_secs: Option<f64>,
    /// longest wait between two retries in seconds (can be fractional)
    pub max_wait_secs: Option<f64>,
    /// connect timeout in seconds (can be fractional)
    pub connect_timeout_secs: Option<f64>,
}

impl Config {
    /// `<config dir>/odm-dl/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("odm-dl");
            path.push("config.toml");
            path
        })
    }

    /// Loads the file at `path`. A missing file yields the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config, OdmError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let s = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&s)?)
    }
}
