//! Load balancer binary: reads configuration from the environment and
//! serves until terminated.

use logkv::balancer::{self, BalancerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = BalancerConfig::from_env();
    tracing::info!("Tracing support enabled: {}", config.trace);
    balancer::serve(config).await
}
