use std::sync::Arc;
use std::time::Duration;

use abook_command::{CommandIntent, CommandRegistry, CommandService, RemoteSync};
use abook_config::AbookConfig;
use abook_core::{
    AlertSink, BookStorage, CommandObserver, CommandState, InputProvider, LocalBook,
    MemoryStorage, PersonInput,
};
use abook_remote::{RemoteFacade, SimulatedRemote};
use tracing::{info, warn};

use crate::console::{format_result, NoPrompt, PrintAlerts, PrintProgress};

/// Submit one add per name, optionally cancel whatever is still in its grace
/// period, and print the result feed and the final book.
pub async fn run(
    config: &AbookConfig,
    names: Vec<String>,
    cancel_after: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let remote = Arc::new(SimulatedRemote::from_config(&config.remote));
    let quota_reset = remote.store().spawn_quota_reset();
    let facade = Arc::new(RemoteFacade::new(
        remote,
        config.collection.as_str(),
        config.sync.page_size,
        config.remote.page_cache_capacity,
    ));
    let book = Arc::new(LocalBook::new());
    let registry = Arc::new(CommandRegistry::new());
    let storage = Arc::new(MemoryStorage::new());

    let service = CommandService::builder(
        Arc::clone(&book),
        Arc::clone(&facade),
        Arc::new(NoPrompt) as Arc<dyn InputProvider>,
    )
    .alerts(Arc::new(PrintAlerts) as Arc<dyn AlertSink>)
    .observer(Arc::new(PrintProgress) as Arc<dyn CommandObserver>)
    .storage(Arc::clone(&storage) as Arc<dyn BookStorage>)
    .registry(Arc::clone(&registry))
    .config(&config.command)
    .build();

    let sync = Arc::new(RemoteSync::new(
        Arc::clone(&book),
        Arc::clone(&facade),
        Arc::clone(&registry),
    ));
    if let Err(e) = sync.sync_once().await {
        warn!(error = %e, "initial sync failed");
    }
    let periodic = (!config.sync.interval.is_zero())
        .then(|| sync.spawn_periodic(config.sync.interval.as_duration()));

    let mut feed = service.subscribe();
    for name in names {
        service.submit(CommandIntent::Add {
            input: Some(PersonInput::named(name)),
        });
    }

    if let Some(secs) = cancel_after {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        for id in service.in_flight() {
            if service.state(id) == Some(CommandState::GracePeriod) && service.cancel(id) {
                info!(command_id = %id, "cancelled");
            }
        }
    }

    service.wait_idle().await;
    if let Some(task) = periodic {
        task.abort();
    }
    quota_reset.abort();

    println!();
    while let Ok(result) = feed.try_recv() {
        if json {
            println!("{}", serde_json::to_string(&result)?);
        } else {
            println!("{}", format_result(&result));
        }
    }

    println!();
    println!("Book ({} saves):", storage.save_count());
    for (person, _) in book.visible_persons() {
        println!("  {:<6} {}", person.id, person.name());
    }
    Ok(())
}
