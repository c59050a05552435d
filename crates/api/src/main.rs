use std::sync::Arc;

use anyhow::Context;

use ledgerbridge_api::app::{build_app, AppServices, Backends};
use ledgerbridge_core::PartitionId;
use ledgerbridge_infra::{ErpStore, InMemoryErpStore, SyncConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ledgerbridge_observability::init();

    let config = SyncConfig::from_env().context("loading configuration")?;
    let backends = Backends::from_config(&config).await?;

    // No ERP adapter ships with the binary; it serves two empty in-memory stores.
    tracing::warn!(
        primary = %config.primary_store,
        target = %config.target_store,
        "serving in-memory ERP stores"
    );
    let primary = InMemoryErpStore::new(config.primary_store.clone());
    primary.add_partition(PartitionId::new(1))?;
    let target = InMemoryErpStore::new(config.target_store.clone());
    target.add_partition(PartitionId::new(1))?;
    let primary: Arc<dyn ErpStore> = Arc::new(primary);
    let target: Arc<dyn ErpStore> = Arc::new(target);

    let listen_addr = config.listen_addr.clone();
    let services = tokio::task::spawn_blocking(move || {
        AppServices::bootstrap(&config, primary, target, backends)
    })
    .await??;

    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
