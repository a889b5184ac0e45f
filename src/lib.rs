pub mod commands;
pub mod config;
pub mod db;
pub mod deferred;
pub mod error;
pub mod export;
pub mod filter;
pub mod logging;
pub mod models;
pub mod playlist_cache;
pub mod playlists;
pub mod session;
pub mod slug;
pub mod store;
pub mod taxonomy;
pub mod undo;

pub use error::{Error, Result};

use anyhow::Context;
use clap::Parser;
use commands::{Cli, CommandContext};
use config::Config;
use db::Database;
use deferred::SystemClock;
use playlist_cache::PlaylistCache;
use playlists::LocalPlaylists;
use session::{SessionOptions, TagSession};
use std::sync::Arc;
use tracing::{error, info};

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.debug {
        config.logging.debug = true;
    }
    let logs = logging::init(&config.logging);

    let data_dir = config.resolve_data_dir(cli.data_dir.as_deref())?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let db_path = data_dir.join("tagify.db");
    let storage = Arc::new(
        Database::new(&db_path).with_context(|| format!("failed to open {}", db_path.display()))?,
    );
    info!("Using database at {}", db_path.display());

    let playlists_key = format!("{}:playlists", config.storage_key);
    let cache_key = config.playlist_cache_key();
    let cache = PlaylistCache::load(storage.as_ref(), &cache_key)?;

    let mut session = TagSession::load(
        Box::new(storage.clone()),
        Box::new(SystemClock),
        SessionOptions::from(&config),
    )
    .with_playlist_sync(Box::new(LocalPlaylists::new(storage.clone(), playlists_key.clone())));
    if let Some(cache) = cache {
        session = session.with_playlist_cache(cache);
    }

    let playlists = LocalPlaylists::new(storage.clone(), playlists_key);
    let ctx = CommandContext {
        config: &config,
        storage: storage.as_ref(),
        playlists: &playlists,
        logs: Some(logs.as_ref()),
    };
    let result = commands::execute(&mut session, &ctx, cli.command);

    if !session.finish() {
        error!("Tag data could not be saved");
    }
    if let Some(cache) = session.playlist_cache() {
        if let Err(e) = cache.save(storage.as_ref(), &cache_key) {
            error!("Failed to save playlist cache: {}", e);
        }
    }

    let output = result?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
