//! Init command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;

/// Write the commented default configuration to `config_path`.
pub fn run(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        println!(
            "[WARN] {} already exists (use --force to replace it)",
            config_path.display()
        );
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    std::fs::write(config_path, Config::generate_default_yaml())
        .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

    println!("[OK] Wrote {}", config_path.display());
    Ok(())
}
