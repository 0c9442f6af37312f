//! Least-connections HTTP load balancer.
//!
//! - [`pool`] -- backend bookkeeping: address, in-flight count, health.
//! - [`health`] -- periodic and startup health probing.
//! - [`forward`] -- the request-forwarding handler.
//! - [`server`] -- router assembly and shared state.
//! - [`config`] -- environment-driven configuration.

pub mod config;
pub mod forward;
pub mod health;
pub mod pool;
pub mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

pub use config::BalancerConfig;
pub use pool::{Backend, Pool};
pub use server::AppState;

/// Builds the pool and HTTP client, probes every backend once, spawns the
/// per-backend health-check loops, and serves the router until the process
/// is terminated. Mirrors the upstream `main`'s startup sequence.
pub async fn serve(config: BalancerConfig) -> anyhow::Result<()> {
    let pool = Arc::new(Pool::new(config.backends.clone()));
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()?;
    let config = Arc::new(config);

    health::initial_probe_all(&pool, &client, &config).await;
    health::spawn_health_loops(Arc::clone(&pool), client.clone(), Arc::clone(&config));

    let state = AppState {
        pool,
        client,
        config: Arc::clone(&config),
    };
    let router = server::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, trace = config.trace, backends = ?config.backends, "starting load balancer");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
