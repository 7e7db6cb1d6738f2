use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use headless_chrome::Tab;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use page_tour::renderer::{Page, PageError, element_expression, js_string};
use page_tour::types::Locator;

const BLUR_POLL: Duration = Duration::from_millis(250);
/// Input steps are abandoned if the user never leaves the field.
const BLUR_TIMEOUT: Duration = Duration::from_secs(15 * 60);

static NEXT_WATCH: AtomicU64 = AtomicU64::new(0);

/// [`Page`] over a live Chrome tab. Every call is a blocking DevTools round trip.
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    fn eval(&self, js: &str) -> Result<Option<Value>, PageError> {
        self.tab
            .evaluate(js, false)
            .map(|obj| obj.value)
            .map_err(|e| PageError(format!("{e:#}")))
    }

    fn eval_bool(&self, js: &str) -> Result<bool, PageError> {
        Ok(matches!(self.eval(js)?, Some(Value::Bool(true))))
    }

    /// Runs `body` with `el` bound to the located element. Fails when the
    /// element is missing.
    fn with_element(&self, locator: &Locator, body: &str) -> Result<(), PageError> {
        let js = format!(
            "(() => {{ const el = {}; if (!el) return false; {} return true; }})()",
            element_expression(locator),
            body
        );
        if self.eval_bool(&js)? {
            Ok(())
        } else {
            Err(PageError(format!("no element for {locator:?}")))
        }
    }
}

impl Page for ChromePage {
    fn title(&self) -> Result<String, PageError> {
        self.tab.get_title().map_err(|e| PageError(format!("{e:#}")))
    }

    fn url(&self) -> Result<String, PageError> {
        Ok(self.tab.get_url())
    }

    fn outer_html(&self, selector: &str) -> Result<Vec<String>, PageError> {
        let js = format!(
            "JSON.stringify(Array.from(document.querySelectorAll({})).map(e => e.outerHTML))",
            js_string(selector)
        );
        let raw = match self.eval(&js)? {
            Some(Value::String(s)) => s,
            _ => return Ok(Vec::new()),
        };
        serde_json::from_str(&raw).map_err(|e| PageError(e.to_string()))
    }

    fn wait_for_blur(
        &self,
        locator: &Locator,
        cancel: &CancellationToken,
    ) -> Result<bool, PageError> {
        let key = NEXT_WATCH.fetch_add(1, Ordering::Relaxed);
        self.with_element(
            locator,
            &format!(
                "const w = (window.__pageTourBlur = window.__pageTourBlur || {{}}); w[{key}] = false; \
                 el.addEventListener('blur', () => {{ w[{key}] = true; }}, {{ once: true }});"
            ),
        )?;

        let check = format!("!!(window.__pageTourBlur && window.__pageTourBlur[{key}] === true)");
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            if self.eval_bool(&check)? {
                return Ok(true);
            }
            if started.elapsed() > BLUR_TIMEOUT {
                return Err(PageError("input was never left".into()));
            }
            std::thread::sleep(BLUR_POLL);
        }
    }

    fn set_input_value(&self, locator: &Locator, value: &str) -> Result<(), PageError> {
        // Go through the prototype setter so framework-managed inputs notice.
        self.with_element(
            locator,
            &format!(
                "const v = {}; \
                 const d = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value'); \
                 if (d && d.set) {{ d.set.call(el, v); }} else {{ el.value = v; }} \
                 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                 el.dispatchEvent(new Event('change', {{ bubbles: true }}));",
                js_string(value)
            ),
        )
    }

    fn click(&self, locator: &Locator) -> Result<(), PageError> {
        self.with_element(locator, "el.click();")
    }
}
