//! Message delivery between the coordinator and per-tab renderers.
//!
//! Every attached tab runs its renderer on its own task and serves requests
//! one at a time. Sending to a tab without a renderer fails with
//! [`DeliveryError::NoListener`], which the coordinator answers by
//! injecting one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::messages::{RendererReply, RendererRequest};
use crate::renderer::Renderer;

/// Identifies one browser tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub String);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    #[error("no renderer listening in tab {0}")]
    NoListener(TabId),
    #[error("tab {0} closed the channel before replying")]
    Dropped(TabId),
    #[error("{0}")]
    Other(String),
}

impl DeliveryError {
    pub fn is_no_listener(&self) -> bool {
        matches!(self, DeliveryError::NoListener(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct InjectionError(pub String);

/// Stylesheet and script of the bundled highlighting library.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverAssets {
    pub style: String,
    pub script: String,
}

/// What the coordinator needs from the browser.
#[async_trait]
pub trait TabHost: Send + Sync {
    /// The single active foreground tab, if any.
    async fn active_tab(&self) -> Option<TabId>;

    async fn send_to_tab(
        &self,
        tab: &TabId,
        request: RendererRequest,
    ) -> Result<RendererReply, DeliveryError>;

    /// Loads a renderer into a tab that does not have one yet.
    async fn inject_renderer(&self, tab: &TabId) -> Result<(), InjectionError>;

    async fn inject_assets(&self, tab: &TabId, assets: &DriverAssets)
        -> Result<(), InjectionError>;
}

/// Browser-specific half of the bus: finds tabs and builds renderers.
#[async_trait]
pub trait TabAttacher: Send + Sync {
    async fn active_tab(&self) -> Option<TabId>;

    async fn attach(&self, tab: &TabId) -> Result<Renderer, InjectionError>;

    async fn inject_assets(&self, tab: &TabId, assets: &DriverAssets)
        -> Result<(), InjectionError>;
}

struct Envelope {
    request: RendererRequest,
    reply: oneshot::Sender<RendererReply>,
}

/// In-process [`TabHost`] backed by one task per attached tab.
pub struct TabBus {
    listeners: Mutex<HashMap<TabId, mpsc::Sender<Envelope>>>,
    attacher: Arc<dyn TabAttacher>,
}

impl TabBus {
    pub fn new(attacher: Arc<dyn TabAttacher>) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            attacher,
        }
    }

    /// Starts serving `renderer` for `tab`, replacing any previous one.
    pub fn listen(&self, tab: TabId, renderer: Renderer) {
        let (tx, mut rx) = mpsc::channel::<Envelope>(16);
        let task_tab = tab.clone();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                debug!(tab = %task_tab, "renderer got {}", envelope.request.name());
                let reply = renderer.handle(envelope.request).await;
                let _ = envelope.reply.send(reply);
            }
            debug!(tab = %task_tab, "renderer stopped");
        });
        self.lock().insert(tab, tx);
    }

    pub fn detach(&self, tab: &TabId) -> bool {
        self.lock().remove(tab).is_some()
    }

    pub fn is_attached(&self, tab: &TabId) -> bool {
        self.lock().get(tab).is_some_and(|tx| !tx.is_closed())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TabId, mpsc::Sender<Envelope>>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TabHost for TabBus {
    async fn active_tab(&self) -> Option<TabId> {
        self.attacher.active_tab().await
    }

    async fn send_to_tab(
        &self,
        tab: &TabId,
        request: RendererRequest,
    ) -> Result<RendererReply, DeliveryError> {
        let sender = self.lock().get(tab).cloned();
        let Some(sender) = sender else {
            return Err(DeliveryError::NoListener(tab.clone()));
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            request,
            reply: reply_tx,
        };
        if sender.send(envelope).await.is_err() {
            self.lock().remove(tab);
            return Err(DeliveryError::NoListener(tab.clone()));
        }
        reply_rx
            .await
            .map_err(|_| DeliveryError::Dropped(tab.clone()))
    }

    async fn inject_renderer(&self, tab: &TabId) -> Result<(), InjectionError> {
        info!(%tab, "injecting renderer");
        match self.attacher.attach(tab).await {
            Ok(renderer) => {
                self.listen(tab.clone(), renderer);
                Ok(())
            }
            Err(e) => {
                warn!(%tab, "renderer injection failed: {}", e);
                Err(e)
            }
        }
    }

    async fn inject_assets(
        &self,
        tab: &TabId,
        assets: &DriverAssets,
    ) -> Result<(), InjectionError> {
        self.attacher.inject_assets(tab, assets).await
    }
}
