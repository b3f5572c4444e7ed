//! CLI configuration
//!
//! Read from `~/.boltcard/boltcard.toml` (or `--config`), then overridden by
//! `BOLTCARD_*` environment variables, e.g. `BOLTCARD_PROVISIONER__RESET_URL`.

use std::error::Error;
use std::path::{Path, PathBuf};

use boltcard_ntag424::{AesKey, KeySet, ProvisionerConfig};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;

/// Keys of one provisioned card
#[derive(Debug, Clone, Deserialize)]
pub struct CardEntry {
    /// Label shown in output
    #[serde(default)]
    pub name: Option<String>,
    /// Key 0 (application master key)
    pub key0: AesKey,
    /// Key for decrypting PICC data
    pub picc_data_key: AesKey,
    /// Key for the SUN MAC
    pub cmac_key: AesKey,
    /// Last accepted read counter
    #[serde(default)]
    pub last_counter: Option<u32>,
}

impl CardEntry {
    /// The card's key set
    pub fn key_set(&self) -> KeySet {
        KeySet::new(
            self.key0.clone(),
            self.picc_data_key.clone(),
            self.cmac_key.clone(),
        )
    }

    /// Name, or the position in the config when unnamed
    pub fn label(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("card #{index}"))
    }
}

/// Everything the CLI reads from its config file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provisioning knobs
    pub provisioner: ProvisionerConfig,
    /// Known cards
    pub cards: Vec<CardEntry>,
}

impl Config {
    /// Card at `index`
    pub fn card(&self, index: usize) -> Result<&CardEntry, Box<dyn Error>> {
        self.cards
            .get(index)
            .ok_or_else(|| format!("No card #{index} in config ({} known)", self.cards.len()).into())
    }
}

/// Returns the base config directory
pub fn config_dir() -> Result<PathBuf, Box<dyn Error>> {
    let home = std::env::home_dir().ok_or("home directory not found")?;
    Ok(home.join(".boltcard"))
}

/// Load the config from `path`, or the default location
///
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn Error>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_dir()?.join("boltcard.toml"),
    };

    Ok(Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("BOLTCARD_").split("__"))
        .extract()?)
}
