//! The user-facing surface: collects the prompt and credential, sends one
//! request to the coordinator and turns the reply into something to show.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::bus::{TabHost, TabId};
use crate::coordinator::CoordinatorHandle;
use crate::credential::{Credential, CredentialStore, StoreError};
use crate::messages::{CoordinatorReply, CoordinatorRequest, RendererReply, RendererRequest};
use crate::types::{PredefinedTour, TourStep};

/// What the surface does after a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Success: close the surface, optionally after showing the raw output.
    Close {
        #[serde(rename = "rawText", skip_serializing_if = "Option::is_none")]
        raw_text: Option<String>,
    },
    /// Failure: block with this message.
    Alert { message: String },
}

impl Outcome {
    fn alert(message: impl Into<String>) -> Self {
        Outcome::Alert {
            message: message.into(),
        }
    }
}

/// Status updates broadcast to anyone watching the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum InitiatorEvent {
    Generating { prompt: String },
    Completed,
    Failed { message: String },
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub mock: bool,
    pub show_raw: bool,
}

pub struct Initiator {
    credentials: Arc<dyn CredentialStore>,
    coordinator: CoordinatorHandle,
    host: Arc<dyn TabHost>,
    events: broadcast::Sender<InitiatorEvent>,
}

impl Initiator {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        coordinator: CoordinatorHandle,
        host: Arc<dyn TabHost>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            credentials,
            coordinator,
            host,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InitiatorEvent> {
        self.events.subscribe()
    }

    /// The saved credential, masked for display.
    pub fn saved_credential(&self) -> Option<String> {
        match self.credentials.read() {
            Ok(c) => c.map(|c| c.masked()),
            Err(e) => {
                warn!("could not read saved credential: {}", e);
                None
            }
        }
    }

    pub fn save_credential(&self, raw: &str) -> Result<bool, StoreError> {
        let credential = Credential::new(raw);
        if credential.is_blank() {
            return Ok(false);
        }
        self.credentials.write(&credential)?;
        info!("credential saved");
        Ok(true)
    }

    /// Saves a newly entered credential, then asks for a tour.
    pub async fn generate(
        &self,
        prompt: &str,
        credential: Option<&str>,
        options: GenerateOptions,
    ) -> Outcome {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Outcome::alert("Please enter a prompt.");
        }
        if let Some(raw) = credential {
            if let Err(e) = self.save_credential(raw) {
                return Outcome::alert(format!("Could not save the API key: {e}"));
            }
        }

        let _ = self.events.send(InitiatorEvent::Generating {
            prompt: prompt.to_string(),
        });
        let request = CoordinatorRequest::GenerateTour {
            prompt: prompt.to_string(),
            mock: options.mock,
            show_raw: options.show_raw,
        };
        let outcome = match self.coordinator.request(None, request).await {
            Ok(CoordinatorReply::Generate(reply)) if reply.ok => Outcome::Close {
                raw_text: reply.raw_text,
            },
            Ok(reply) => Outcome::alert(reply.error().unwrap_or("Unknown error")),
            Err(e) => Outcome::alert(e.to_string()),
        };

        let _ = self.events.send(match &outcome {
            Outcome::Close { .. } => InitiatorEvent::Completed,
            Outcome::Alert { message } => InitiatorEvent::Failed {
                message: message.clone(),
            },
        });
        outcome
    }

    pub async fn predefined_tours(&self, url: &str) -> Vec<PredefinedTour> {
        let request = CoordinatorRequest::PredefinedTours {
            url: url.to_string(),
        };
        match self.coordinator.request(None, request).await {
            Ok(CoordinatorReply::Tours(reply)) => reply.tours,
            Ok(_) | Err(_) => Vec::new(),
        }
    }

    pub async fn fill_form_inputs(
        &self,
        tour: PredefinedTour,
        prompt: &str,
    ) -> Result<Vec<TourStep>, String> {
        let request = CoordinatorRequest::FillFormInputs {
            tour,
            prompt: prompt.to_string(),
        };
        match self.coordinator.request(None, request).await {
            Ok(CoordinatorReply::Steps(reply)) if reply.ok => Ok(reply.steps),
            Ok(reply) => Err(reply.error().unwrap_or("Unknown error").to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Plays known steps in the active tab without going through the model.
    pub async fn start_tour(&self, steps: Vec<TourStep>) -> Outcome {
        let Some(tab) = self.host.active_tab().await else {
            return Outcome::alert("NoActiveTab");
        };
        self.send_steps(&tab, steps).await
    }

    /// URL of the page in the active tab, used to pick predefined tours.
    pub async fn active_page_url(&self) -> Option<String> {
        let tab = self.host.active_tab().await?;
        let request = RendererRequest::RequestPageContext { prompt: None };
        match self.host.send_to_tab(&tab, request).await {
            Ok(RendererReply::PageContext(reply)) => Some(reply.page_context.url),
            Ok(RendererReply::Ack(_)) => None,
            Err(e) => {
                warn!(%tab, "could not read page url: {}", e);
                None
            }
        }
    }

    async fn send_steps(&self, tab: &TabId, steps: Vec<TourStep>) -> Outcome {
        let request = RendererRequest::GeminiResult { result: steps };
        match self.host.send_to_tab(tab, request).await {
            Ok(RendererReply::Ack(ack)) if ack.ok => Outcome::Close { raw_text: None },
            Ok(RendererReply::Ack(ack)) => {
                Outcome::alert(ack.error.unwrap_or_else(|| "render failed".into()))
            }
            Ok(RendererReply::PageContext(_)) => Outcome::alert("unexpected renderer reply"),
            Err(e) => Outcome::alert(format!("DeliveryFailure: {e}")),
        }
    }
}
