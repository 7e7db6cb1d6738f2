//! Messages exchanged between the initiator, coordinator and renderers.
//!
//! Each context has its own request enum, tagged by `type`, and every
//! request has one reply shape.

use serde::{Deserialize, Serialize};

use crate::types::{PageContext, PredefinedTour, TourStep};

/// Requests handled by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorRequest {
    GenerateTour {
        prompt: String,
        #[serde(default)]
        mock: bool,
        #[serde(default, rename = "showRaw")]
        show_raw: bool,
    },
    PredefinedTours {
        url: String,
    },
    FillFormInputs {
        tour: PredefinedTour,
        prompt: String,
    },
    InjectDriver {},
}

impl CoordinatorRequest {
    pub fn name(&self) -> &'static str {
        match self {
            CoordinatorRequest::GenerateTour { .. } => "GENERATE_TOUR",
            CoordinatorRequest::PredefinedTours { .. } => "PREDEFINED_TOURS",
            CoordinatorRequest::FillFormInputs { .. } => "FILL_FORM_INPUTS",
            CoordinatorRequest::InjectDriver {} => "INJECT_DRIVER",
        }
    }
}

/// Requests handled by a tab's renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RendererRequest {
    RequestPageContext {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
    GeminiResult {
        result: Vec<TourStep>,
    },
}

impl RendererRequest {
    pub fn name(&self) -> &'static str {
        match self {
            RendererRequest::RequestPageContext { .. } => "REQUEST_PAGE_CONTEXT",
            RendererRequest::GeminiResult { .. } => "GEMINI_RESULT",
        }
    }
}

/// Plain success/failure reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, rename = "rawText", skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl GenerateReply {
    pub fn failed(error: impl ToString) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
            raw_text: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToursReply {
    pub ok: bool,
    pub tours: Vec<PredefinedTour>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepsReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub steps: Vec<TourStep>,
}

impl StepsReply {
    pub fn failed(error: impl ToString) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
            steps: Vec::new(),
        }
    }
}

/// Reply to any coordinator request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CoordinatorReply {
    Generate(GenerateReply),
    Tours(ToursReply),
    Steps(StepsReply),
    Ack(Ack),
}

impl CoordinatorReply {
    pub fn is_ok(&self) -> bool {
        match self {
            CoordinatorReply::Generate(r) => r.ok,
            CoordinatorReply::Tours(r) => r.ok,
            CoordinatorReply::Steps(r) => r.ok,
            CoordinatorReply::Ack(r) => r.ok,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            CoordinatorReply::Generate(r) => r.error.as_deref(),
            CoordinatorReply::Steps(r) => r.error.as_deref(),
            CoordinatorReply::Ack(r) => r.error.as_deref(),
            CoordinatorReply::Tours(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContextReply {
    #[serde(rename = "pageContext")]
    pub page_context: PageContext,
}

/// Reply to any renderer request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RendererReply {
    PageContext(PageContextReply),
    Ack(Ack),
}
