//! Page-attached agent: snapshots the page for the model and plays tours
//! through the highlighting library.

mod steps;
#[cfg(test)]
pub(crate) mod testing;

pub use steps::{DriveStep, InputWait, element_expression, js_string, normalize_step};

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex_lite::Regex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordinator::CoordinatorLink;
use crate::messages::{Ack, PageContextReply, RendererReply, RendererRequest};
use crate::types::{Locator, PageContext, TourStep};

/// Elements whose markup goes into the page snapshot.
pub const INTERACTIVE_SELECTOR: &str = "a, button";

/// Pause between an automatic action and moving to the next step.
pub const ADVANCE_DELAY: Duration = Duration::from_millis(500);

static SVG_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<svg\b[^>]*/>|<svg\b.*?</svg>").expect("svg pattern compiles")
});

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PageError(pub String);

/// Read access to the live page plus the few events a tour dispatches.
///
/// Calls may block; the renderer runs the slow ones on the blocking pool.
pub trait Page: Send + Sync {
    fn title(&self) -> Result<String, PageError>;
    fn url(&self) -> Result<String, PageError>;
    /// Serialized markup of every element matching `selector`.
    fn outer_html(&self, selector: &str) -> Result<Vec<String>, PageError>;
    /// Blocks until the located element loses focus once. Returns `false`
    /// if `cancel` fires first.
    fn wait_for_blur(
        &self,
        locator: &Locator,
        cancel: &CancellationToken,
    ) -> Result<bool, PageError>;
    /// Sets an input's value and fires `input` and `change`.
    fn set_input_value(&self, locator: &Locator, value: &str) -> Result<(), PageError>;
    fn click(&self, locator: &Locator) -> Result<(), PageError>;
}

/// Progress notifications from a running tour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TourEvent {
    Highlighted(usize),
    NextRequested(usize),
    Destroyed,
}

/// Controls a tour the highlighter has started.
pub trait TourHandle: Send + Sync {
    fn drive(&self, index: usize);
    fn move_next(&self);
    fn show_next_button(&self, index: usize);
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HighlightError(pub String);

/// The highlighting library.
pub trait Highlighter: Send + Sync {
    /// Whether the library's entry point is loaded.
    fn is_available(&self) -> bool;

    fn start(
        &self,
        steps: &[DriveStep],
    ) -> Result<(Arc<dyn TourHandle>, mpsc::UnboundedReceiver<TourEvent>), HighlightError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("NoSteps")]
    NoSteps,
    #[error("RenderUnavailable")]
    RenderUnavailable,
}

pub struct Renderer {
    page: Arc<dyn Page>,
    highlighter: Arc<dyn Highlighter>,
    coordinator: Option<CoordinatorLink>,
}

impl Renderer {
    pub fn new(page: Arc<dyn Page>, highlighter: Arc<dyn Highlighter>) -> Self {
        Self {
            page,
            highlighter,
            coordinator: None,
        }
    }

    /// Lets the renderer ask the coordinator for bundled driver assets.
    pub fn with_coordinator(mut self, link: CoordinatorLink) -> Self {
        self.coordinator = Some(link);
        self
    }

    pub async fn handle(&self, request: RendererRequest) -> RendererReply {
        match request {
            RendererRequest::RequestPageContext { .. } => {
                let page = self.page.clone();
                let page_context = tokio::task::spawn_blocking(move || snapshot(page.as_ref()))
                    .await
                    .unwrap_or_else(|e| {
                        error!("snapshot task failed: {}", e);
                        empty_context()
                    });
                RendererReply::PageContext(PageContextReply { page_context })
            }
            RendererRequest::GeminiResult { result } => match self.render(result).await {
                Ok(()) => RendererReply::Ack(Ack::ok()),
                Err(e) => RendererReply::Ack(Ack::failed(e)),
            },
        }
    }

    pub fn snapshot(&self) -> PageContext {
        snapshot(self.page.as_ref())
    }

    /// Starts a tour over `steps`, beginning at the first one.
    pub async fn render(&self, steps: Vec<TourStep>) -> Result<(), RenderError> {
        if steps.is_empty() {
            return Err(RenderError::NoSteps);
        }
        let steps: Vec<DriveStep> = steps.into_iter().map(normalize_step).collect();

        if !self.ensure_highlighter().await {
            warn!("highlighting library unavailable, tour not started");
            return Err(RenderError::RenderUnavailable);
        }

        let (handle, events) = match self.highlighter.start(&steps) {
            Ok(started) => started,
            Err(e) => {
                warn!("highlighter refused the tour: {}", e);
                return Err(RenderError::RenderUnavailable);
            }
        };
        info!(steps = steps.len(), "tour started");
        handle.drive(0);

        tokio::spawn(run_tour(self.page.clone(), handle, steps, events));
        Ok(())
    }

    async fn ensure_highlighter(&self) -> bool {
        if self.highlighter.is_available() {
            return true;
        }
        let Some(link) = &self.coordinator else {
            return false;
        };
        debug!("highlighter missing, asking for bundled assets");
        let ack = link.inject_driver().await;
        if !ack.ok {
            warn!(
                "bundled driver injection failed: {}",
                ack.error.unwrap_or_default()
            );
            return false;
        }
        self.highlighter.is_available()
    }
}

fn snapshot(page: &dyn Page) -> PageContext {
    let title = page.title().unwrap_or_else(|e| {
        debug!("title unavailable: {}", e);
        String::new()
    });
    let url = page.url().unwrap_or_else(|e| {
        debug!("url unavailable: {}", e);
        String::new()
    });
    let text_snippet = match page.outer_html(INTERACTIVE_SELECTOR) {
        Ok(markup) if !markup.is_empty() => Some(strip_svg(&markup.join("\n"))),
        Ok(_) => None,
        Err(e) => {
            warn!("snapshot failed, sending empty snippet: {}", e);
            None
        }
    };

    PageContext {
        title,
        url,
        timestamp: now(),
        text_snippet,
    }
}

fn empty_context() -> PageContext {
    PageContext {
        title: String::new(),
        url: String::new(),
        timestamp: now(),
        text_snippet: None,
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Removes inline vector graphics from serialized markup.
pub fn strip_svg(markup: &str) -> String {
    SVG_MARKUP.replace_all(markup, "").into_owned()
}

async fn run_tour(
    page: Arc<dyn Page>,
    handle: Arc<dyn TourHandle>,
    steps: Vec<DriveStep>,
    mut events: mpsc::UnboundedReceiver<TourEvent>,
) {
    let tour = CancellationToken::new();
    // Pending work of the step on screen; replaced whenever another step shows.
    let mut shown: Option<CancellationToken> = None;

    while let Some(event) = events.recv().await {
        match event {
            TourEvent::Highlighted(index) => {
                if let Some(previous) = shown.take() {
                    previous.cancel();
                }
                let Some(step) = steps.get(index) else {
                    continue;
                };
                if let (Some(wait), Some(element)) = (&step.input, &step.element) {
                    let token = tour.child_token();
                    tokio::spawn(await_input(
                        page.clone(),
                        handle.clone(),
                        token.clone(),
                        index,
                        element.clone(),
                        wait.value.clone(),
                    ));
                    shown = Some(token);
                }
            }
            TourEvent::NextRequested(index) => {
                let clicks = steps.get(index).map(|s| s.clicks.clone()).unwrap_or_default();
                if clicks.is_empty() {
                    handle.move_next();
                } else {
                    tokio::spawn(click_through(
                        page.clone(),
                        handle.clone(),
                        tour.clone(),
                        clicks,
                    ));
                }
            }
            TourEvent::Destroyed => break,
        }
    }
    tour.cancel();
    debug!("tour finished");
}

async fn await_input(
    page: Arc<dyn Page>,
    handle: Arc<dyn TourHandle>,
    cancel: CancellationToken,
    index: usize,
    element: Locator,
    value: Option<String>,
) {
    let token = cancel.clone();
    let blurred = tokio::task::spawn_blocking(move || {
        if !page.wait_for_blur(&element, &token)? || token.is_cancelled() {
            return Ok(false);
        }
        if let Some(value) = value {
            page.set_input_value(&element, &value)?;
        }
        Ok::<bool, PageError>(true)
    })
    .await;

    match blurred {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => {
            debug!(step = index, "input wait cancelled");
            return;
        }
        Ok(Err(e)) => {
            warn!(step = index, "input wait abandoned: {}", e);
            return;
        }
        Err(e) => {
            error!(step = index, "input wait task failed: {}", e);
            return;
        }
    }

    handle.show_next_button(index);
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(ADVANCE_DELAY) => handle.move_next(),
    }
}

async fn click_through(
    page: Arc<dyn Page>,
    handle: Arc<dyn TourHandle>,
    tour: CancellationToken,
    clicks: Vec<Locator>,
) {
    let clicked = tokio::task::spawn_blocking(move || {
        for locator in &clicks {
            if let Err(e) = page.click(locator) {
                warn!(?locator, "scripted click failed: {}", e);
            }
        }
    })
    .await;
    if let Err(e) = clicked {
        error!("click task failed: {}", e);
    }
    tokio::select! {
        _ = tour.cancelled() => {}
        _ = tokio::time::sleep(ADVANCE_DELAY) => handle.move_next(),
    }
}
