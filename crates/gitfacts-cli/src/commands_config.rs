//! `gitfacts config` — show or initialize configuration.

use gitfacts_core::GitfactsConfig;
use std::path::Path;

pub(crate) fn cmd_config(config: &GitfactsConfig, init: bool) -> anyhow::Result<()> {
    let path = GitfactsConfig::default_path();
    if init {
        if init_config(&path)? {
            eprintln!("Wrote default configuration to {}", path.display());
        } else {
            eprintln!("Configuration already exists at {}", path.display());
        }
        return Ok(());
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Write the default configuration unless a file is already there.
fn init_config(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    GitfactsConfig::default().save(path)?;
    Ok(true)
}
