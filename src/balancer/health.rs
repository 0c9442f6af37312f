//! Periodic backend health probing.
//!
//! Mirrors the upstream's `time.Tick(10 * time.Second)` goroutine per
//! backend, plus an initial synchronous probe of every backend before the
//! balancer starts accepting traffic (the upstream does this too, in its
//! startup loop, before spawning the ticking goroutines).

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::config::BalancerConfig;
use super::pool::Pool;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Issues a single `GET <scheme>://<address>/health` and reports whether it
/// returned a 200. Any transport error, timeout, or non-200 status counts
/// as unhealthy.
pub async fn probe_once(client: &reqwest::Client, scheme: &str, address: &str) -> bool {
    let url = format!("{scheme}://{address}/health");
    match client.get(url.as_str()).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// Probes every backend once, synchronously, and records the result. Called
/// before the balancer starts serving so the first request never races an
/// empty health picture.
pub async fn initial_probe_all(pool: &Pool, client: &reqwest::Client, config: &BalancerConfig) {
    for index in 0..pool.len() {
        let Some(address) = pool.address(index) else {
            continue;
        };
        let healthy = probe_once(client, config.scheme(), &address).await;
        pool.set_healthy(index, healthy);
        info!(backend = %address, healthy, "initial health probe");
    }
}

/// Spawns one background task per backend that re-probes every 10 seconds
/// for as long as the pool handle stays alive.
pub fn spawn_health_loops(pool: Arc<Pool>, client: reqwest::Client, config: Arc<BalancerConfig>) {
    for index in 0..pool.len() {
        let pool = Arc::clone(&pool);
        let client = client.clone();
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            // The first tick fires immediately; skip it since
            // `initial_probe_all` already covered t=0.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(address) = pool.address(index) else {
                    continue;
                };
                let healthy = probe_once(&client, config.scheme(), &address).await;
                pool.set_healthy(index, healthy);
                let snapshot = pool.snapshot();
                info!(
                    backend = %address,
                    healthy,
                    in_flight = snapshot[index].in_flight,
                    "health probe"
                );
            }
        });
    }
}
