//! `classboard init` — write a starter `~/.classboard/config.yaml`.

use anyhow::{Context, Result};
use clap::Args;

use classboard_core::config;

/// Create the config file if it does not exist yet.
#[derive(Args, Debug)]
pub struct InitArgs {}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = config::home()?;
        let path = config::config_path_at(&home);
        let existed = path.exists();
        config::init_at(&home)
            .with_context(|| format!("failed to initialise {}", path.display()))?;

        if existed {
            println!("✓ Config already present: {}", path.display());
        } else {
            println!("✓ Wrote starter config: {}", path.display());
            println!("  Fill in the Canvas and Trello credentials, then run `classboard validate`.");
        }
        Ok(())
    }
}
