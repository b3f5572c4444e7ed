//! Utility functions and types for the Bolt Card CLI

pub mod display;
pub mod reader;

use std::error::Error;

use boltcard_ntag424::{AesKey, KeySet};
use clap::Args;

use crate::config::Config;

/// Common arguments for a card's keys
#[derive(Args, Debug, Clone, Default)]
pub struct KeyArgs {
    /// Key 0 in hex
    #[arg(long)]
    pub key0: Option<AesKey>,

    /// PICC data key in hex
    #[arg(long)]
    pub picc_data_key: Option<AesKey>,

    /// CMAC key in hex
    #[arg(long)]
    pub cmac_key: Option<AesKey>,

    /// Take the keys of this card from the config instead
    #[arg(long, conflicts_with_all = ["key0", "picc_data_key", "cmac_key"])]
    pub card: Option<usize>,
}

impl KeyArgs {
    /// Keys from `--card`, or from the individual flags when all three are given
    pub fn key_set(&self, config: &Config) -> Result<Option<KeySet>, Box<dyn Error>> {
        if let Some(index) = self.card {
            return Ok(Some(config.card(index)?.key_set()));
        }

        match (&self.key0, &self.picc_data_key, &self.cmac_key) {
            (Some(key0), Some(picc), Some(cmac)) => {
                Ok(Some(KeySet::new(key0.clone(), picc.clone(), cmac.clone())))
            }
            (None, None, None) => Ok(None),
            _ => Err("--key0, --picc-data-key and --cmac-key must be given together".into()),
        }
    }

    /// Key 0 from `--card` or `--key0`
    pub fn key0(&self, config: &Config) -> Result<Option<AesKey>, Box<dyn Error>> {
        match self.card {
            Some(index) => Ok(Some(config.card(index)?.key0.clone())),
            None => Ok(self.key0.clone()),
        }
    }
}
