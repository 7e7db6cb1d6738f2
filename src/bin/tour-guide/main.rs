mod dom;
mod driver;
mod face;
mod hands;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use page_tour::bus::{TabBus, TabHost};
use page_tour::config::Config;
use page_tour::coordinator::{Coordinator, CoordinatorHandle};
use page_tour::credential::{Credential, CredentialStore, FileCredentialStore};
use page_tour::gateway::{HttpTransport, ModelGateway};
use page_tour::initiator::Initiator;

use hands::{BrowserSession, ChromeTabs};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("page_tour=info,tour_guide=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Writes the key from the environment when nothing is stored yet.
fn seed_credential(store: &FileCredentialStore, api_key: Option<&str>) -> Result<()> {
    let Some(raw) = api_key else {
        return Ok(());
    };
    let credential = Credential::new(raw);
    if credential.is_blank() || store.read()?.is_some() {
        return Ok(());
    }
    store.write(&credential)?;
    info!(path = %store.path().display(), "stored API key from environment");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();
    let config = Config::parse();

    let store = Arc::new(FileCredentialStore::new(config.credential_path()));
    seed_credential(&store, config.api_key.as_deref())?;

    let launch_config = config.clone();
    let session = tokio::task::spawn_blocking(move || BrowserSession::launch(&launch_config))
        .await
        .map_err(|e| anyhow!("browser launch panicked: {}", e))??;
    let session = Arc::new(session);

    let (handle, inbox) = CoordinatorHandle::channel(32);
    let bus = Arc::new(TabBus::new(Arc::new(ChromeTabs::new(
        session.clone(),
        handle.clone(),
    ))));

    let transport = HttpTransport::new(config.model_endpoint.clone())
        .context("could not build the model client")?;
    let coordinator = Coordinator::new(
        bus.clone(),
        store.clone(),
        ModelGateway::new(Arc::new(transport)),
    )
    .with_driver_assets(config.driver_assets());
    tokio::spawn(Arc::new(coordinator).run(inbox));

    // Tours started from the control page go straight to the renderer.
    match bus.active_tab().await {
        Some(tab) => {
            if let Err(e) = bus.inject_renderer(&tab).await {
                warn!(%tab, "could not attach to the active tab: {}", e);
            }
        }
        None => warn!("no active tab at startup"),
    }

    let initiator = Arc::new(Initiator::new(store, handle, bus));
    face::serve(initiator, config.port).await
}
