//! gatehouse: reverse proxy with basic auth, latency and access logging.
//!
//! Run with:
//!   GATEHOUSE_AUTH=true RUST_LOG=info cargo run
//!
//! Try:
//!   curl -u user:secret http://localhost:8080/
//!   curl http://localhost:8080/metrics

use std::sync::Arc;

use anyhow::{Context, anyhow};
use tracing::info;

use gatehouse::log::{self, Logger};
use gatehouse::{Config, Metrics, Server, app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    log::init().map_err(|e| anyhow!(e))?;

    let config = Config::from_env().context("loading configuration")?;
    info!(
        upstream = %config.upstream,
        auth = config.auth.is_some(),
        "starting gatehouse"
    );

    let router = app::build(&config, Arc::new(Metrics::new()), Logger::ambient());

    Server::bind(config.listen)
        .serve(router)
        .await
        .context("serving")?;

    Ok(())
}
