//! hardhatd - PPE detection service daemon
//!
//! This daemon:
//! 1. Loads configuration (TOML file plus environment overrides)
//! 2. Opens the SQLite record store
//! 3. Registers the detector backends and selects the configured default
//! 4. Serves the HTTP API until interrupted

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use hardhat::api;
use hardhat::config::ServerConfig;
use hardhat::detect::{BackendRegistry, HiVisBackend, StubBackend};
use hardhat::store::SqliteDetectionStore;
use hardhat::Engine;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = ServerConfig::load()?;

    let store = SqliteDetectionStore::open(&cfg.db_path)
        .with_context(|| format!("open record store at {}", cfg.db_path))?;

    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());
    registry.register(HiVisBackend::new());
    registry.set_default(&cfg.backend)?;
    {
        let backend = registry
            .default_backend()
            .context("no detector backend registered")?;
        let mut guard = backend.lock().map_err(|_| anyhow!("backend lock poisoned"))?;
        guard.warm_up()?;
        log::info!("detector backend {} ready", guard.name());
    }

    let engine = Arc::new(Engine::new(registry, Box::new(store), cfg.engine_settings()));

    log::info!("serving on {} (db {})", cfg.addr, cfg.db_path);
    api::http_server(engine, &cfg.addr)?.await?;
    Ok(())
}
