//! Background coordinator.
//!
//! Owns the end-to-end flow of a generation request: snapshot the active
//! tab, call the model, hand the steps to the tab's renderer. It is the only
//! context that reads the credential while a request runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::bus::{DeliveryError, DriverAssets, InjectionError, TabHost, TabId};
use crate::credential::{Credential, CredentialStore, StoreError};
use crate::gateway::{GatewayError, ModelGateway};
use crate::library::TourLibrary;
use crate::messages::{
    Ack, CoordinatorReply, CoordinatorRequest, GenerateReply, RendererReply, RendererRequest,
    StepsReply, ToursReply,
};
use crate::types::{
    Locator, MOCK_PROMPT_PREFIX, ModelResult, PageContext, PredefinedTour, TourStep,
};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("NoActiveTab")]
    NoActiveTab,
    #[error("MissingCredential")]
    MissingCredential,
    #[error("MissingCredential: {0}")]
    CredentialStore(#[from] StoreError),
    #[error("DeliveryFailure: {0}")]
    Delivery(DeliveryError),
    #[error("InjectionFailure: {0}")]
    Injection(InjectionError),
    #[error("DeliveryFailure: unexpected reply to {0}")]
    UnexpectedReply(&'static str),
    #[error("generation: {0}")]
    Generation(#[from] GatewayError),
    #[error("generation: model returned a {0} result")]
    UnexpectedResult(&'static str),
    #[error("render: {0}")]
    Render(String),
    #[error("GenerationInProgress")]
    Busy,
}

/// Where the bundled highlighting library lives on disk.
#[derive(Debug, Clone, Default)]
pub struct DriverAssetPaths {
    pub style: Option<PathBuf>,
    pub script: Option<PathBuf>,
}

impl DriverAssetPaths {
    async fn load(&self) -> Result<DriverAssets, InjectionError> {
        let (Some(style), Some(script)) = (&self.style, &self.script) else {
            return Err(InjectionError(
                "no bundled driver assets configured".to_string(),
            ));
        };
        let read = |path: PathBuf| async move {
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| InjectionError(format!("{}: {}", path.display(), e)))
        };
        Ok(DriverAssets {
            style: read(style.clone()).await?,
            script: read(script.clone()).await?,
        })
    }
}

/// Steps used when the model call is bypassed.
pub fn mock_tour() -> Vec<TourStep> {
    vec![
        TourStep::new(
            None,
            "Welcome",
            "This is a sample tour generated without calling the model.",
        ),
        TourStep::new(
            Some(Locator::Selector("a".into())),
            "A link",
            "Links take you to other pages.",
        ),
        TourStep::new(None, "That's it", "Close this popover to end the tour."),
    ]
}

fn is_mock(prompt: &str, mock: bool) -> bool {
    mock || prompt.trim_start().starts_with(MOCK_PROMPT_PREFIX)
}

/// Clears the in-flight flag when a request finishes, however it finishes.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, CoordinatorError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| CoordinatorError::Busy)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Coordinator {
    host: Arc<dyn TabHost>,
    credentials: Arc<dyn CredentialStore>,
    gateway: ModelGateway,
    library: TourLibrary,
    assets: DriverAssetPaths,
    in_flight: AtomicBool,
}

impl Coordinator {
    pub fn new(
        host: Arc<dyn TabHost>,
        credentials: Arc<dyn CredentialStore>,
        gateway: ModelGateway,
    ) -> Self {
        Self {
            host,
            credentials,
            gateway,
            library: TourLibrary::bundled(),
            assets: DriverAssetPaths::default(),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_library(mut self, library: TourLibrary) -> Self {
        self.library = library;
        self
    }

    pub fn with_driver_assets(mut self, assets: DriverAssetPaths) -> Self {
        self.assets = assets;
        self
    }

    /// Serves requests until every [`CoordinatorHandle`] is dropped. Each
    /// request runs on its own task.
    pub async fn run(self: Arc<Self>, mut inbox: CoordinatorInbox) {
        info!("coordinator ready");
        while let Some(envelope) = inbox.rx.recv().await {
            let this = self.clone();
            tokio::spawn(async move {
                let reply = this.handle(envelope.sender.as_ref(), envelope.request).await;
                let _ = envelope.reply.send(reply);
            });
        }
        debug!("coordinator inbox closed");
    }

    pub async fn handle(
        &self,
        sender: Option<&TabId>,
        request: CoordinatorRequest,
    ) -> CoordinatorReply {
        let name = request.name();
        debug!(request = name, "coordinator received");
        let reply = match request {
            CoordinatorRequest::GenerateTour {
                prompt,
                mock,
                show_raw,
            } => CoordinatorReply::Generate(match self.generate(&prompt, mock).await {
                Ok(raw_text) => GenerateReply {
                    ok: true,
                    error: None,
                    raw_text: raw_text.filter(|_| show_raw),
                },
                Err(e) => GenerateReply::failed(e),
            }),
            CoordinatorRequest::PredefinedTours { url } => CoordinatorReply::Tours(ToursReply {
                ok: true,
                tours: self.library.for_url(&url),
            }),
            CoordinatorRequest::FillFormInputs { tour, prompt } => {
                CoordinatorReply::Steps(match self.fill_form_inputs(tour, &prompt).await {
                    Ok(steps) => StepsReply {
                        ok: true,
                        error: None,
                        steps,
                    },
                    Err(e) => StepsReply::failed(e),
                })
            }
            CoordinatorRequest::InjectDriver {} => CoordinatorReply::Ack(match sender {
                Some(tab) => match self.inject_driver(tab).await {
                    Ok(()) => Ack::ok(),
                    Err(e) => Ack::failed(e),
                },
                None => Ack::failed(CoordinatorError::NoActiveTab),
            }),
        };
        if let Some(err) = reply.error() {
            warn!(request = name, "request failed: {}", err);
        }
        reply
    }

    /// Runs one generation end to end. Returns the raw model text, if the
    /// model was called.
    pub async fn generate(
        &self,
        prompt: &str,
        mock: bool,
    ) -> Result<Option<String>, CoordinatorError> {
        let _guard = InFlight::acquire(&self.in_flight)?;

        let tab = self.active_tab().await?;
        let mock = is_mock(prompt, mock);
        let credential = if mock {
            None
        } else {
            Some(self.credential()?)
        };

        let context = self.page_context(&tab, prompt).await?;

        let (steps, raw_text) = match credential {
            None => {
                info!(%tab, "mock generation, skipping model call");
                (mock_tour(), None)
            }
            Some(credential) => {
                let generation = self
                    .gateway
                    .generate(&credential, prompt, &context, None)
                    .await?;
                match generation.result {
                    ModelResult::Tour(steps) => (steps, Some(generation.raw_text)),
                    other => return Err(CoordinatorError::UnexpectedResult(other.kind())),
                }
            }
        };
        self.render(&tab, steps).await?;
        info!(%tab, "tour delivered");
        Ok(raw_text)
    }

    /// Asks the model for values for a predefined tour's inputs and returns
    /// the tour's steps with those values filled in.
    pub async fn fill_form_inputs(
        &self,
        mut tour: PredefinedTour,
        prompt: &str,
    ) -> Result<Vec<TourStep>, CoordinatorError> {
        let _guard = InFlight::acquire(&self.in_flight)?;

        let tab = self.active_tab().await?;
        let credential = self.credential()?;
        let context = self.page_context(&tab, prompt).await?;

        let generation = self
            .gateway
            .generate(&credential, prompt, &context, Some(&tour))
            .await?;
        let form_input = match generation.result {
            ModelResult::FillForm { form_input, .. } => form_input,
            other => return Err(CoordinatorError::UnexpectedResult(other.kind())),
        };

        let filled = tour.apply_form_input(&form_input);
        info!(tour = %tour.tour_name, filled, "form inputs filled");
        Ok(tour.steps)
    }

    /// Loads the bundled highlighting library into `tab`.
    pub async fn inject_driver(&self, tab: &TabId) -> Result<(), CoordinatorError> {
        let assets = self
            .assets
            .load()
            .await
            .map_err(CoordinatorError::Injection)?;
        self.host
            .inject_assets(tab, &assets)
            .await
            .map_err(CoordinatorError::Injection)?;
        info!(%tab, "bundled driver injected");
        Ok(())
    }

    async fn active_tab(&self) -> Result<TabId, CoordinatorError> {
        self.host
            .active_tab()
            .await
            .ok_or(CoordinatorError::NoActiveTab)
    }

    fn credential(&self) -> Result<Credential, CoordinatorError> {
        match self.credentials.read()? {
            Some(credential) if !credential.is_blank() => Ok(credential),
            _ => Err(CoordinatorError::MissingCredential),
        }
    }

    async fn page_context(&self, tab: &TabId, prompt: &str) -> Result<PageContext, CoordinatorError> {
        let request = RendererRequest::RequestPageContext {
            prompt: Some(prompt.to_string()),
        };
        match self.deliver(tab, request).await? {
            RendererReply::PageContext(reply) => Ok(reply.page_context),
            RendererReply::Ack(_) => Err(CoordinatorError::UnexpectedReply("REQUEST_PAGE_CONTEXT")),
        }
    }

    async fn render(&self, tab: &TabId, steps: Vec<TourStep>) -> Result<(), CoordinatorError> {
        let request = RendererRequest::GeminiResult { result: steps };
        match self.deliver(tab, request).await? {
            RendererReply::Ack(ack) if ack.ok => Ok(()),
            RendererReply::Ack(ack) => Err(CoordinatorError::Render(
                ack.error.unwrap_or_else(|| "renderer failed".to_string()),
            )),
            RendererReply::PageContext(_) => Err(CoordinatorError::UnexpectedReply("GEMINI_RESULT")),
        }
    }

    /// Sends to the tab's renderer, injecting it and resending exactly once
    /// when nothing is listening.
    async fn deliver(
        &self,
        tab: &TabId,
        request: RendererRequest,
    ) -> Result<RendererReply, CoordinatorError> {
        let name = request.name();
        match self.host.send_to_tab(tab, request.clone()).await {
            Ok(reply) => Ok(reply),
            Err(e) if e.is_no_listener() => {
                info!(%tab, request = name, "renderer not loaded, injecting");
                self.host
                    .inject_renderer(tab)
                    .await
                    .map_err(CoordinatorError::Injection)?;
                self.host.send_to_tab(tab, request).await.map_err(|e| {
                    error!(%tab, request = name, "resend after injection failed: {}", e);
                    CoordinatorError::Delivery(e)
                })
            }
            Err(e) => Err(CoordinatorError::Delivery(e)),
        }
    }
}

struct Envelope {
    sender: Option<TabId>,
    request: CoordinatorRequest,
    reply: oneshot::Sender<CoordinatorReply>,
}

/// Receiving side of the coordinator's channel, consumed by [`Coordinator::run`].
pub struct CoordinatorInbox {
    rx: mpsc::Receiver<Envelope>,
}

/// Cheap, cloneable way to reach the coordinator from other contexts.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Envelope>,
}

impl CoordinatorHandle {
    pub fn channel(capacity: usize) -> (Self, CoordinatorInbox) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, CoordinatorInbox { rx })
    }

    pub async fn request(
        &self,
        sender: Option<TabId>,
        request: CoordinatorRequest,
    ) -> Result<CoordinatorReply, CoordinatorGone> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            sender,
            request,
            reply: reply_tx,
        };
        self.tx.send(envelope).await.map_err(|_| CoordinatorGone)?;
        reply_rx.await.map_err(|_| CoordinatorGone)
    }

    /// A link scoped to requests coming from `tab`.
    pub fn for_tab(&self, tab: TabId) -> CoordinatorLink {
        CoordinatorLink {
            handle: self.clone(),
            tab,
        }
    }
}

#[derive(Debug, Clone, Copy, Error)]
#[error("coordinator is not running")]
pub struct CoordinatorGone;

/// A renderer's way back to the coordinator.
#[derive(Clone)]
pub struct CoordinatorLink {
    handle: CoordinatorHandle,
    tab: TabId,
}

impl CoordinatorLink {
    pub fn tab(&self) -> &TabId {
        &self.tab
    }

    pub async fn inject_driver(&self) -> Ack {
        match self
            .handle
            .request(Some(self.tab.clone()), CoordinatorRequest::InjectDriver {})
            .await
        {
            Ok(CoordinatorReply::Ack(ack)) => ack,
            Ok(_) => Ack::failed("unexpected reply to INJECT_DRIVER"),
            Err(e) => Ack::failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::credential::MemoryCredentialStore;
    use crate::gateway::{GenerateContentRequest, ModelTransport, TransportError, TransportResponse};
    use crate::messages::{Ack, PageContextReply};
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::renderer::testing::{FakeHighlighter, FakePage};
    use crate::renderer::{
        DriveStep, HighlightError, Highlighter, Renderer, TourEvent, TourHandle,
    };
    use crate::types::FormInput;

    /// Host whose tab never has a renderer unless `attach_on_inject` is set,
    /// and which records every call.
    #[derive(Default)]
    struct ScriptedHost {
        tab: Option<TabId>,
        attached: Mutex<bool>,
        attach_on_inject: bool,
        fatal: Option<DeliveryError>,
        sends: Mutex<Vec<&'static str>>,
        injections: Mutex<u32>,
        assets: Mutex<Vec<DriverAssets>>,
        rendered: Mutex<Vec<Vec<TourStep>>>,
    }

    impl ScriptedHost {
        fn attached() -> Self {
            Self {
                tab: Some(TabId::from("tab-1")),
                attached: Mutex::new(true),
                ..Default::default()
            }
        }

        fn unattached(attach_on_inject: bool) -> Self {
            Self {
                tab: Some(TabId::from("tab-1")),
                attach_on_inject,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl TabHost for ScriptedHost {
        async fn active_tab(&self) -> Option<TabId> {
            self.tab.clone()
        }

        async fn send_to_tab(
            &self,
            tab: &TabId,
            request: RendererRequest,
        ) -> Result<RendererReply, DeliveryError> {
            self.sends.lock().unwrap().push(request.name());
            if let Some(fatal) = &self.fatal {
                return Err(fatal.clone());
            }
            if !*self.attached.lock().unwrap() {
                return Err(DeliveryError::NoListener(tab.clone()));
            }
            Ok(match request {
                RendererRequest::RequestPageContext { .. } => {
                    RendererReply::PageContext(PageContextReply {
                        page_context: PageContext {
                            title: "Example".into(),
                            url: "https://example.com/".into(),
                            timestamp: "2026-01-01T00:00:00Z".into(),
                            text_snippet: Some("<a id=\"signup\">Sign Up</a>".into()),
                        },
                    })
                }
                RendererRequest::GeminiResult { result } => {
                    self.rendered.lock().unwrap().push(result);
                    RendererReply::Ack(Ack::ok())
                }
            })
        }

        async fn inject_renderer(&self, _tab: &TabId) -> Result<(), InjectionError> {
            *self.injections.lock().unwrap() += 1;
            if self.attach_on_inject {
                *self.attached.lock().unwrap() = true;
            }
            Ok(())
        }

        async fn inject_assets(
            &self,
            _tab: &TabId,
            assets: &DriverAssets,
        ) -> Result<(), InjectionError> {
            self.assets.lock().unwrap().push(assets.clone());
            Ok(())
        }
    }

    struct CannedModel {
        text: String,
        calls: Mutex<u32>,
    }

    impl CannedModel {
        fn answering(text: &str) -> Arc<Self> {
            Arc::new(Self {
                text: text.to_string(),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ModelTransport for CannedModel {
        async fn post(
            &self,
            _credential: &Credential,
            _request: &GenerateContentRequest,
        ) -> Result<TransportResponse, TransportError> {
            *self.calls.lock().unwrap() += 1;
            Ok(TransportResponse {
                status: 200,
                body: json!({"candidates": [{"content": {"parts": [{"text": self.text}]}}]})
                    .to_string(),
            })
        }
    }

    /// Library that only appears once driver assets reached the host.
    struct LoadsWithAssets {
        host: Arc<ScriptedHost>,
        inner: FakeHighlighter,
    }

    impl Highlighter for LoadsWithAssets {
        fn is_available(&self) -> bool {
            !self.host.assets.lock().unwrap().is_empty()
        }

        fn start(
            &self,
            steps: &[DriveStep],
        ) -> Result<(Arc<dyn TourHandle>, UnboundedReceiver<TourEvent>), HighlightError> {
            self.inner.start(steps)
        }
    }

    const SIGNUP_TOUR: &str = r##"{"type":"tour","data":[{"element":"#signup","popover":{"title":"Sign Up","description":"Click here"}}]}"##;

    fn coordinator(
        host: &Arc<ScriptedHost>,
        model: &Arc<CannedModel>,
        credential: Option<&str>,
    ) -> Coordinator {
        let store: Arc<dyn CredentialStore> = match credential {
            Some(c) => Arc::new(MemoryCredentialStore::with(Credential::new(c))),
            None => Arc::new(MemoryCredentialStore::default()),
        };
        Coordinator::new(host.clone(), store, ModelGateway::new(model.clone()))
    }

    #[tokio::test]
    async fn generate_delivers_normalized_steps() {
        let host = Arc::new(ScriptedHost::attached());
        let model = CannedModel::answering(SIGNUP_TOUR);
        let coord = coordinator(&host, &model, Some("key"));

        let reply = coord
            .handle(
                None,
                CoordinatorRequest::GenerateTour {
                    prompt: "show me how to sign up".into(),
                    mock: false,
                    show_raw: true,
                },
            )
            .await;

        assert_eq!(
            reply,
            CoordinatorReply::Generate(GenerateReply {
                ok: true,
                error: None,
                raw_text: Some(SIGNUP_TOUR.into()),
            })
        );
        assert_eq!(
            *host.sends.lock().unwrap(),
            ["REQUEST_PAGE_CONTEXT", "GEMINI_RESULT"]
        );
        let rendered = host.rendered.lock().unwrap();
        assert_eq!(rendered[0].len(), 1);
        assert_eq!(rendered[0][0].target, Some(Locator::Selector("#signup".into())));
    }

    #[tokio::test]
    async fn missing_credential_stops_before_any_call() {
        let host = Arc::new(ScriptedHost::attached());
        let model = CannedModel::answering(SIGNUP_TOUR);
        let coord = coordinator(&host, &model, None);

        let reply = coord
            .handle(
                None,
                CoordinatorRequest::GenerateTour {
                    prompt: "show me how to sign up".into(),
                    mock: false,
                    show_raw: false,
                },
            )
            .await;

        assert_eq!(
            reply,
            CoordinatorReply::Generate(GenerateReply::failed("MissingCredential"))
        );
        assert_eq!(*model.calls.lock().unwrap(), 0);
        assert!(host.sends.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mock_prompt_bypasses_credential_and_model() {
        let host = Arc::new(ScriptedHost::attached());
        let model = CannedModel::answering(SIGNUP_TOUR);
        let coord = coordinator(&host, &model, None);

        let raw = coord.generate("mock: anything", false).await.unwrap();

        assert!(raw.is_none());
        assert_eq!(*model.calls.lock().unwrap(), 0);
        assert_eq!(host.rendered.lock().unwrap()[0], mock_tour());
    }

    #[tokio::test]
    async fn no_active_tab_fails_first() {
        let host = Arc::new(ScriptedHost::default());
        let model = CannedModel::answering(SIGNUP_TOUR);
        let err = coordinator(&host, &model, Some("key"))
            .generate("tour", false)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "NoActiveTab");
    }

    #[tokio::test]
    async fn missing_listener_injects_once_and_resends() {
        let host = Arc::new(ScriptedHost::unattached(true));
        let model = CannedModel::answering(SIGNUP_TOUR);
        coordinator(&host, &model, Some("key"))
            .generate("tour", false)
            .await
            .unwrap();

        assert_eq!(*host.injections.lock().unwrap(), 1);
        assert_eq!(
            *host.sends.lock().unwrap(),
            ["REQUEST_PAGE_CONTEXT", "REQUEST_PAGE_CONTEXT", "GEMINI_RESULT"]
        );
    }

    #[tokio::test]
    async fn second_delivery_failure_is_terminal() {
        let host = Arc::new(ScriptedHost::unattached(false));
        let model = CannedModel::answering(SIGNUP_TOUR);
        let err = coordinator(&host, &model, Some("key"))
            .generate("tour", false)
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::Delivery(DeliveryError::NoListener(_))));
        assert!(err.to_string().starts_with("DeliveryFailure"));
        assert_eq!(*host.injections.lock().unwrap(), 1);
        assert_eq!(host.sends.lock().unwrap().len(), 2);
        assert_eq!(*model.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn other_delivery_failures_are_not_retried() {
        let host = Arc::new(ScriptedHost {
            fatal: Some(DeliveryError::Other("tab crashed".into())),
            ..ScriptedHost::attached()
        });
        let model = CannedModel::answering(SIGNUP_TOUR);
        let err = coordinator(&host, &model, Some("key"))
            .generate("tour", false)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "DeliveryFailure: tab crashed");
        assert_eq!(*host.injections.lock().unwrap(), 0);
        assert_eq!(host.sends.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gateway_errors_carry_the_stage_tag() {
        let host = Arc::new(ScriptedHost::attached());
        let model = CannedModel::answering("no json here");
        let err = coordinator(&host, &model, Some("key"))
            .generate("tour", false)
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("generation: UnparsableModelOutput"));
        assert_eq!(*host.sends.lock().unwrap(), ["REQUEST_PAGE_CONTEXT"]);
    }

    #[tokio::test]
    async fn overlapping_generation_is_rejected() {
        let host = Arc::new(ScriptedHost::attached());
        let model = CannedModel::answering(SIGNUP_TOUR);
        let coord = coordinator(&host, &model, Some("key"));

        let guard = InFlight::acquire(&coord.in_flight).unwrap();
        let err = coord.generate("tour", false).await.unwrap_err();
        assert_eq!(err.to_string(), "GenerationInProgress");
        drop(guard);

        coord.generate("tour", false).await.unwrap();
    }

    #[tokio::test]
    async fn fill_form_inputs_writes_values_into_steps() {
        let host = Arc::new(ScriptedHost::attached());
        let model = CannedModel::answering(r#"{"query": "Ada Lovelace"}"#);
        let coord = coordinator(&host, &model, Some("key"));
        let tour = PredefinedTour {
            tour_name: "Search".into(),
            description: String::new(),
            url: "wikipedia.org".into(),
            steps: vec![TourStep {
                target: Some(Locator::Selector("#searchInput".into())),
                wait_for_input: true,
                input_name: Some("query".into()),
                ..Default::default()
            }],
            form_inputs: vec![FormInput {
                name: "query".into(),
                description: String::new(),
            }],
        };

        let reply = coord
            .handle(
                None,
                CoordinatorRequest::FillFormInputs {
                    tour,
                    prompt: "find Ada Lovelace".into(),
                },
            )
            .await;

        match reply {
            CoordinatorReply::Steps(StepsReply { ok, steps, .. }) => {
                assert!(ok);
                assert_eq!(steps[0].input_value.as_deref(), Some("Ada Lovelace"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn predefined_tours_filter_by_url() {
        let host = Arc::new(ScriptedHost::attached());
        let model = CannedModel::answering(SIGNUP_TOUR);
        let reply = coordinator(&host, &model, None)
            .handle(
                None,
                CoordinatorRequest::PredefinedTours {
                    url: "https://en.wikipedia.org/wiki/Main_Page".into(),
                },
            )
            .await;
        match reply {
            CoordinatorReply::Tours(ToursReply { ok, tours }) => {
                assert!(ok);
                assert_eq!(tours.len(), 1);
                assert_eq!(tours[0].tour_name, "Wikipedia: search");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn inject_driver_loads_configured_assets() {
        let dir = tempfile::tempdir().unwrap();
        let style = dir.path().join("driver.css");
        let script = dir.path().join("driver.js.iife.js");
        std::fs::write(&style, ".driver-popover{}").unwrap();
        std::fs::write(&script, "window.driver={js:{driver(){}}}").unwrap();

        let host = Arc::new(ScriptedHost::attached());
        let model = CannedModel::answering(SIGNUP_TOUR);
        let coord = coordinator(&host, &model, None).with_driver_assets(DriverAssetPaths {
            style: Some(style),
            script: Some(script),
        });

        let tab = TabId::from("tab-1");
        let reply = coord
            .handle(Some(&tab), CoordinatorRequest::InjectDriver {})
            .await;
        assert_eq!(reply, CoordinatorReply::Ack(Ack::ok()));
        assert_eq!(host.assets.lock().unwrap()[0].style, ".driver-popover{}");

        let unscoped = coord.handle(None, CoordinatorRequest::InjectDriver {}).await;
        assert!(!unscoped.is_ok());
    }

    #[tokio::test]
    async fn renderer_falls_back_to_bundled_driver_through_the_link() {
        let dir = tempfile::tempdir().unwrap();
        let style = dir.path().join("driver.css");
        let script = dir.path().join("driver.js");
        std::fs::write(&style, "").unwrap();
        std::fs::write(&script, "").unwrap();

        let host = Arc::new(ScriptedHost::attached());
        let model = CannedModel::answering(SIGNUP_TOUR);
        let coord = Arc::new(coordinator(&host, &model, None).with_driver_assets(
            DriverAssetPaths {
                style: Some(style),
                script: Some(script),
            },
        ));
        let (handle, inbox) = CoordinatorHandle::channel(8);
        tokio::spawn(coord.clone().run(inbox));

        let highlighter = Arc::new(LoadsWithAssets {
            host: host.clone(),
            inner: FakeHighlighter::available(),
        });
        let renderer = Renderer::new(Arc::new(FakePage::default()), highlighter.clone())
            .with_coordinator(handle.for_tab(TabId::from("tab-1")));

        renderer
            .render(vec![TourStep::new(None, "Hi", "")])
            .await
            .unwrap();

        assert_eq!(highlighter.inner.started().len(), 1);
        assert_eq!(host.assets.lock().unwrap().len(), 1);
    }
}
