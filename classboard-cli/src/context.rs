//! Config, state and API clients shared by the commands.

use std::path::PathBuf;

use anyhow::{Context as _, Result};

use classboard_core::config::{self, Config};
use classboard_sync::{BoardApi, FileStateStore};

use crate::canvas::CanvasClient;
use crate::trello::TrelloClient;

pub struct Context {
    pub home: PathBuf,
    pub config: Config,
}

impl Context {
    /// Load `~/.classboard/config.yaml` with environment overrides applied.
    pub fn load() -> Result<Self> {
        let home = config::home()?;
        let mut config = config::load_at(&home)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(Self { home, config })
    }

    /// [`Context::load`], then require every value a sync needs.
    pub fn load_validated() -> Result<Self> {
        let ctx = Self::load()?;
        ctx.config.validate().context("configuration incomplete")?;
        Ok(ctx)
    }

    pub fn state_path(&self) -> PathBuf {
        self.config.state_path_at(&self.home)
    }

    pub fn state_store(&self) -> FileStateStore {
        FileStateStore::new(self.state_path())
    }

    pub fn board(&self) -> Result<TrelloClient> {
        let client = TrelloClient::connect(&self.config.trello).context("cannot open Trello board")?;
        log::info!("board: {} ({})", client.board_name(), client.board_id());
        Ok(client)
    }

    pub fn canvas(&self) -> CanvasClient {
        CanvasClient::new(&self.config.canvas)
    }
}
