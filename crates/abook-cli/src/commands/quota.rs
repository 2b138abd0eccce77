use std::sync::Arc;

use abook_config::AbookConfig;
use abook_remote::{RemoteFacade, SimulatedRemote};
use chrono::{DateTime, Utc};

pub async fn run(config: &AbookConfig) -> anyhow::Result<()> {
    let remote = Arc::new(SimulatedRemote::from_config(&config.remote));
    let facade = RemoteFacade::new(
        remote,
        config.collection.as_str(),
        config.sync.page_size,
        config.remote.page_cache_capacity,
    );
    let quota = facade.quota_status().await.into_result()?;

    let reset = DateTime::<Utc>::from_timestamp(quota.reset_at, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| quota.reset_at.to_string());
    println!("Collection: {}", config.collection);
    println!("Limit:      {}", quota.limit);
    println!("Remaining:  {}", quota.remaining);
    println!("Resets at:  {}", reset);
    Ok(())
}
