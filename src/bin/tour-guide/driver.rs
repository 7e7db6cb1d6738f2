//! driver.js, driven from outside the page.
//!
//! The page keeps a queue of tour events in `window.__pageTour.events`; a
//! watcher thread drains it and forwards the events to the renderer.

use std::sync::Arc;
use std::time::Duration;

use headless_chrome::Tab;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use page_tour::renderer::{
    DriveStep, HighlightError, Highlighter, TourEvent, TourHandle, element_expression,
};
use page_tour::types::Locator;

const EVENT_POLL: Duration = Duration::from_millis(200);

pub struct ChromeHighlighter {
    tab: Arc<Tab>,
}

impl ChromeHighlighter {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }
}

fn step_literal(step: &DriveStep) -> String {
    // Selectors are resolved by driver.js when the step shows; XPath
    // locators become a function evaluated at the same moment.
    let element = match &step.element {
        None => "undefined".to_string(),
        Some(Locator::Selector(s)) => page_tour::renderer::js_string(s),
        Some(xpath @ Locator::XPath { .. }) => format!("() => {}", element_expression(xpath)),
    };
    let buttons = if step.show_next {
        json!(["next", "previous", "close"])
    } else {
        json!(["previous", "close"])
    };
    let mut popover = serde_json::to_value(&step.popover).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut popover {
        map.insert("showButtons".into(), buttons);
    }
    format!("{{ element: {element}, popover: {popover} }}")
}

fn start_script(steps: &[DriveStep]) -> String {
    let steps: Vec<String> = steps.iter().map(step_literal).collect();
    format!(
        r#"(() => {{
  const previous = window.__pageTour;
  if (previous && previous.driver) {{ try {{ previous.driver.destroy(); }} catch (e) {{}} }}
  const state = (window.__pageTour = {{ events: [], driver: null }});
  const push = (event) => state.events.push(event);
  state.driver = window.driver.js.driver({{
    showProgress: true,
    steps: [{}],
    onHighlighted: (el, step, opts) => push({{ kind: 'highlighted', index: opts.state.activeIndex }}),
    onNextClick: (el, step, opts) => push({{ kind: 'next', index: opts.state.activeIndex }}),
    onDestroyed: () => push({{ kind: 'destroyed' }}),
  }});
  return true;
}})()"#,
        steps.join(",\n")
    )
}

const DRAIN_SCRIPT: &str = "(() => { const s = window.__pageTour; if (!s) return '[{\"kind\":\"destroyed\"}]'; \
     const q = s.events; s.events = []; return JSON.stringify(q); })()";

#[derive(Debug, Deserialize)]
struct RawEvent {
    kind: String,
    #[serde(default)]
    index: Option<usize>,
}

impl RawEvent {
    fn into_event(self) -> Option<TourEvent> {
        match (self.kind.as_str(), self.index) {
            ("highlighted", Some(i)) => Some(TourEvent::Highlighted(i)),
            ("next", Some(i)) => Some(TourEvent::NextRequested(i)),
            ("destroyed", _) => Some(TourEvent::Destroyed),
            _ => None,
        }
    }
}

fn watch(tab: Arc<Tab>, events: mpsc::UnboundedSender<TourEvent>) {
    loop {
        std::thread::sleep(EVENT_POLL);
        let drained = match tab.evaluate(DRAIN_SCRIPT, false) {
            Ok(obj) => obj.value,
            Err(e) => {
                debug!("tour watcher stopping: {:#}", e);
                let _ = events.send(TourEvent::Destroyed);
                return;
            }
        };
        let Some(Value::String(raw)) = drained else {
            continue;
        };
        let batch: Vec<RawEvent> = match serde_json::from_str(&raw) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("unreadable tour events: {}", e);
                continue;
            }
        };
        for event in batch.into_iter().filter_map(RawEvent::into_event) {
            let done = event == TourEvent::Destroyed;
            if events.send(event).is_err() || done {
                return;
            }
        }
    }
}

impl Highlighter for ChromeHighlighter {
    fn is_available(&self) -> bool {
        let probe = "typeof window.driver?.js?.driver === 'function'";
        matches!(
            self.tab.evaluate(probe, false).map(|o| o.value),
            Ok(Some(Value::Bool(true)))
        )
    }

    fn start(
        &self,
        steps: &[DriveStep],
    ) -> Result<(Arc<dyn TourHandle>, mpsc::UnboundedReceiver<TourEvent>), HighlightError> {
        self.tab
            .evaluate(&start_script(steps), false)
            .map_err(|e| HighlightError(format!("{e:#}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let tab = self.tab.clone();
        std::thread::spawn(move || watch(tab, tx));

        let handle: Arc<dyn TourHandle> = Arc::new(ChromeTour {
            tab: self.tab.clone(),
        });
        Ok((handle, rx))
    }
}

struct ChromeTour {
    tab: Arc<Tab>,
}

impl ChromeTour {
    fn call(&self, js: &str) {
        if let Err(e) = self.tab.evaluate(js, false) {
            warn!("tour command failed: {:#}", e);
        }
    }
}

impl TourHandle for ChromeTour {
    fn drive(&self, index: usize) {
        self.call(&format!("window.__pageTour && window.__pageTour.driver.drive({index})"));
    }

    fn move_next(&self) {
        self.call("window.__pageTour && window.__pageTour.driver.moveNext()");
    }

    fn show_next_button(&self, index: usize) {
        debug!(step = index, "revealing next button");
        self.call(
            "(() => { const b = document.querySelector('.driver-popover-next-btn'); \
             if (b) { b.style.removeProperty('display'); } })()",
        );
    }
}
