//! In-memory page and highlighter used by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{DriveStep, HighlightError, Highlighter, Page, PageError, TourEvent, TourHandle};
use crate::types::Locator;

#[derive(Debug, Clone, PartialEq)]
pub enum PageCall {
    WaitForBlur(Locator),
    SetValue(Locator, String),
    Click(Locator),
}

pub struct FakePage {
    markup: Option<Vec<String>>,
    calls: Mutex<Vec<PageCall>>,
    /// Inputs never lose focus; blur waits end only when cancelled.
    focus_held: bool,
    waiting: AtomicUsize,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::with_markup(vec!["<a id=\"signup\">Sign Up</a>".into()])
    }
}

impl FakePage {
    pub fn with_markup(markup: Vec<String>) -> Self {
        Self {
            markup: Some(markup),
            calls: Mutex::new(Vec::new()),
            focus_held: false,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Every DOM query fails.
    pub fn failing() -> Self {
        Self {
            markup: None,
            ..Self::with_markup(vec![])
        }
    }

    pub fn holding_focus() -> Self {
        Self {
            focus_held: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<PageCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Blur waits currently blocked.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    fn broken(&self) -> Result<(), PageError> {
        match self.markup {
            Some(_) => Ok(()),
            None => Err(PageError("page detached".into())),
        }
    }
}

impl Page for FakePage {
    fn title(&self) -> Result<String, PageError> {
        self.broken()?;
        Ok("Example".into())
    }

    fn url(&self) -> Result<String, PageError> {
        self.broken()?;
        Ok("https://example.com/".into())
    }

    fn outer_html(&self, _selector: &str) -> Result<Vec<String>, PageError> {
        self.markup
            .clone()
            .ok_or_else(|| PageError("page detached".into()))
    }

    fn wait_for_blur(
        &self,
        locator: &Locator,
        cancel: &CancellationToken,
    ) -> Result<bool, PageError> {
        if self.focus_held {
            self.waiting.fetch_add(1, Ordering::SeqCst);
        }
        self.calls
            .lock()
            .unwrap()
            .push(PageCall::WaitForBlur(locator.clone()));
        if !self.focus_held {
            return Ok(true);
        }
        while !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        Ok(false)
    }

    fn set_input_value(&self, locator: &Locator, value: &str) -> Result<(), PageError> {
        self.calls
            .lock()
            .unwrap()
            .push(PageCall::SetValue(locator.clone(), value.to_string()));
        Ok(())
    }

    fn click(&self, locator: &Locator) -> Result<(), PageError> {
        self.calls
            .lock()
            .unwrap()
            .push(PageCall::Click(locator.clone()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandleCall {
    Drive(usize),
    MoveNext,
    ShowNext(usize),
}

#[derive(Default)]
pub struct FakeHandle {
    calls: Mutex<Vec<HandleCall>>,
}

impl FakeHandle {
    pub fn calls(&self) -> Vec<HandleCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl TourHandle for FakeHandle {
    fn drive(&self, index: usize) {
        self.calls.lock().unwrap().push(HandleCall::Drive(index));
    }

    fn move_next(&self) {
        self.calls.lock().unwrap().push(HandleCall::MoveNext);
    }

    fn show_next_button(&self, index: usize) {
        self.calls.lock().unwrap().push(HandleCall::ShowNext(index));
    }
}

pub struct FakeHighlighter {
    available: Mutex<bool>,
    started: Mutex<Vec<Vec<DriveStep>>>,
    handle: Arc<FakeHandle>,
    events: Mutex<Option<mpsc::UnboundedSender<TourEvent>>>,
}

impl FakeHighlighter {
    pub fn available() -> Self {
        Self::new(true)
    }

    pub fn unavailable() -> Self {
        Self::new(false)
    }

    fn new(available: bool) -> Self {
        Self {
            available: Mutex::new(available),
            started: Mutex::new(Vec::new()),
            handle: Arc::new(FakeHandle::default()),
            events: Mutex::new(None),
        }
    }

    pub fn started(&self) -> Vec<Vec<DriveStep>> {
        self.started.lock().unwrap().clone()
    }

    pub fn handle(&self) -> Arc<FakeHandle> {
        self.handle.clone()
    }

    pub fn emit(&self, event: TourEvent) {
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }
}

impl Highlighter for FakeHighlighter {
    fn is_available(&self) -> bool {
        *self.available.lock().unwrap()
    }

    fn start(
        &self,
        steps: &[DriveStep],
    ) -> Result<(Arc<dyn TourHandle>, mpsc::UnboundedReceiver<TourEvent>), HighlightError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        self.started.lock().unwrap().push(steps.to_vec());
        let handle: Arc<dyn TourHandle> = self.handle.clone();
        Ok((handle, rx))
    }
}
