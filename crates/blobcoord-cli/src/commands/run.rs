//! Run command: loads configuration and topology, wires up the
//! coordinator and HTTP ingress, and blocks until shutdown.
//!
//! Grounded on `kimberlite-cli`'s `commands::start` (load config from a
//! file, print a short startup banner, run to completion with signal
//! handling) generalized to this crate's `Coordinator`/`Server` pair.

use crate::topology::TopologyFile;
use anyhow::{Context, Result};
use blobcoord_client::Coordinator;
use blobcoord_config::CoordinatorConfig;
use blobcoord_pool::TcpConnectionPool;
use blobcoord_server::handler::INGRESS_CLIENT_ID;
use blobcoord_server::{HealthState, Server};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub fn run(config_dir: Option<&Path>, topology_path: &Path) -> Result<()> {
    let config = match config_dir {
        Some(dir) => CoordinatorConfig::load_from_dir(dir),
        None => CoordinatorConfig::load(),
    }
    .context("failed to load configuration")?;
    config.validate().context("configuration failed validation")?;

    let topology = TopologyFile::load(topology_path).context("failed to load cluster topology")?;
    let cluster_map = Arc::new(topology.cluster_map());
    let pool = Arc::new(TcpConnectionPool::new(topology.addresses(), config.pool.connection_pool_size_per_replica));

    let coordinator = Arc::new(
        Coordinator::new(cluster_map, pool, INGRESS_CLIENT_ID)
            .with_parallelism(config.get.get_parallelism)
            .with_success_target(config.get.get_success_target),
    );

    info!(
        bind_address = %config.bind_address(),
        worker_threads = config.server.worker_thread_count,
        "starting blobcoord coordinator"
    );
    println!();
    println!("blobcoord coordinator");
    println!("  bind address:  {}", config.bind_address());
    println!("  workers:       {}", config.server.worker_thread_count);
    println!("  get parallelism / success target: {} / {}", config.get.get_parallelism, config.get.get_success_target);
    println!();
    println!("Ready. Press Ctrl+C to stop.");
    println!();

    let health = HealthState::new();
    let server = Server::bind(&config.server).context("failed to bind ingress listener")?;
    let shutdown_handle = server
        .run(&config.server, config.get.operation_timeout(), coordinator, health, config.server.startup_wait())
        .context("failed to start ingress")?;

    wait_for_shutdown_signal()?;
    info!("shutdown signal received, draining connections");
    shutdown_handle.stop();
    println!("Coordinator stopped gracefully.");

    Ok(())
}

#[cfg(unix)]
fn wait_for_shutdown_signal() -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGTERM, Arc::clone(&term)).context("failed to register SIGTERM handler")?;
    signal_hook::flag::register(SIGINT, Arc::clone(&term)).context("failed to register SIGINT handler")?;

    while !term.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown_signal() -> Result<()> {
    // `signal-hook` only covers POSIX signals; non-Unix builds fall back
    // to blocking forever and rely on the OS killing the process.
    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}
