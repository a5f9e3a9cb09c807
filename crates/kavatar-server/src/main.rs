//! Kavatar match host.

use anyhow::Context;
use kavatar_core::RuleSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod protocol;
mod server;
mod session;
mod store;

use server::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse address from env or use default
    let addr: SocketAddr = std::env::var("KAVATAR_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".into())
        .parse()?;

    let rules = match std::env::var("KAVATAR_RULES") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading rules from {path}"))?;
            let rules = RuleSet::from_json(&json).with_context(|| format!("parsing rules in {path}"))?;
            info!(%path, "loaded rules override");
            Some(rules)
        }
        Err(_) => None,
    };

    info!("Starting Kavatar server...");

    let state = Arc::new(ServerState::new(rules));

    server::run_server(addr, state).await
}
