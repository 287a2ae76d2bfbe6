pub mod init;
pub mod run;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use dcsim_core::SimConfig;

/// The configuration at `path`, or the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SimConfig> {
    let config = match path {
        Some(path) => {
            SimConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    config.validate().context("validating config")?;
    Ok(config)
}
