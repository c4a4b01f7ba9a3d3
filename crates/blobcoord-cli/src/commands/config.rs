//! Config command: load and print the effective configuration, the same
//! way `kimberlite-cli`'s `commands::config` surfaces a merged config for
//! operator inspection before starting the server.

use anyhow::{Context, Result};
use blobcoord_config::CoordinatorConfig;
use std::path::Path;

pub fn run(project_dir: Option<&Path>) -> Result<()> {
    let config = match project_dir {
        Some(dir) => CoordinatorConfig::load_from_dir(dir),
        None => CoordinatorConfig::load(),
    }
    .context("failed to load configuration")?;

    config.validate().context("configuration failed validation")?;

    let rendered = toml::to_string_pretty(&config).context("failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}
