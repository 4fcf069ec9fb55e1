//! Stash demo - exercises a Redis-backed stash end to end
//!
//! Connects to the Redis server described by the `STASH_*` environment
//! variables, stores a few clients, reads them back and evicts them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use stash::{
    Backend, CacheProvider, ConnectionConfig, ExpiryPolicy, Keyspace, ResultAdapter, StashBuilder,
    ValueAdapter,
};

/// Default lifetime of demo entries, in seconds
const DEFAULT_EXPIRY_SECS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Client {
    uuid: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

impl Client {
    fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "stash=info", can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stash=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let connection = ConnectionConfig::from_env();
    let expiry_secs = std::env::var("STASH_EXPIRY_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_EXPIRY_SECS);
    info!(?connection, expiry_secs, "Configuration loaded");

    let keyspace = Keyspace::display("stash.demo.clients", &connection);
    let stash = StashBuilder::<Uuid, Client>::new(Backend::Redis)
        .with_expiry(ExpiryPolicy::from(Duration::from_secs(expiry_secs)))
        .with_connection(connection)?
        .with_keyspace(keyspace)?
        .with_result_adapter(ResultAdapter::json_decoder())?
        .with_type_adapter(ValueAdapter::json_encoder())?
        .build()?;

    let clients: Vec<Client> = ["Ada", "Grace", "Edsger"]
        .into_iter()
        .map(Client::new)
        .collect();

    for client in &clients {
        stash.store(&client.uuid, client.clone()).await?;
        info!(uuid = %client.uuid, name = %client.name, "Stored client");
    }

    let first = &clients[0];
    match stash.retrieve(&first.uuid).await? {
        Some(found) => info!(uuid = %found.uuid, name = %found.name, "Retrieved client"),
        None => warn!(uuid = %first.uuid, "Client expired before it was read back"),
    }

    let all = stash.retrieve_all().await?;
    info!(count = all.len(), "Retrieved every client");

    let evicted = stash.evict(&first.uuid).await?;
    info!(uuid = %first.uuid, evicted, "Evicted client");

    let removed = stash.evict_all().await?;
    info!(removed, "Evicted remaining clients");

    stash.close();
    info!("Stash closed");
    Ok(())
}
