use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info, warn};

use page_tour::bus::{DriverAssets, InjectionError, TabAttacher};
use page_tour::coordinator::CoordinatorHandle;
use page_tour::renderer::{Renderer, js_string};
use page_tour::{TabId, config::Config};

use crate::dom::ChromePage;
use crate::driver::ChromeHighlighter;

/// Browser the tours run in. Created once and shared by every context.
pub struct BrowserSession {
    browser: Browser,
    active: Mutex<Arc<Tab>>,
}

impl BrowserSession {
    pub fn launch(config: &Config) -> Result<Self> {
        if let Some(url) = &config.chrome_url {
            info!(%url, "attaching to running Chrome");
            let browser = Browser::connect(url.clone())
                .with_context(|| format!("could not attach to Chrome at {url}"))?;
            let existing = {
                let tabs = browser.get_tabs().lock().unwrap_or_else(|e| e.into_inner());
                tabs.first().cloned()
            };
            let tab = match existing {
                Some(tab) => tab,
                None => browser.new_tab()?,
            };
            return Ok(Self {
                browser,
                active: Mutex::new(tab),
            });
        }

        let options = LaunchOptions {
            headless: config.headless,
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-infobars"),
            ],
            idle_browser_timeout: Duration::from_secs(60 * 60),
            ..Default::default()
        };

        info!(headless = config.headless, "launching Chrome");
        let browser = Browser::new(options).context("browser launch failed")?;
        let tab = browser.new_tab()?;
        tab.navigate_to(&config.start_url)?;
        info!("Chrome ready");

        Ok(Self {
            browser,
            active: Mutex::new(tab),
        })
    }

    pub fn active_tab(&self) -> Arc<Tab> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn active_id(&self) -> TabId {
        TabId(self.active_tab().get_target_id().to_string())
    }

    pub fn find(&self, id: &TabId) -> Option<Arc<Tab>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        tabs.iter()
            .find(|t| t.get_target_id().as_str() == id.0)
            .cloned()
    }
}

/// Attaches renderers to Chrome tabs on demand.
pub struct ChromeTabs {
    session: Arc<BrowserSession>,
    coordinator: CoordinatorHandle,
}

impl ChromeTabs {
    pub fn new(session: Arc<BrowserSession>, coordinator: CoordinatorHandle) -> Self {
        Self {
            session,
            coordinator,
        }
    }

    fn tab(&self, id: &TabId) -> Result<Arc<Tab>, InjectionError> {
        self.session
            .find(id)
            .ok_or_else(|| InjectionError(format!("tab {id} no longer exists")))
    }
}

#[async_trait]
impl TabAttacher for ChromeTabs {
    async fn active_tab(&self) -> Option<TabId> {
        Some(self.session.active_id())
    }

    async fn attach(&self, id: &TabId) -> Result<Renderer, InjectionError> {
        let tab = self.tab(id)?;
        debug!(tab = %id, "attaching renderer");
        Ok(Renderer::new(
            Arc::new(ChromePage::new(tab.clone())),
            Arc::new(ChromeHighlighter::new(tab)),
        )
        .with_coordinator(self.coordinator.for_tab(id.clone())))
    }

    async fn inject_assets(
        &self,
        id: &TabId,
        assets: &DriverAssets,
    ) -> Result<(), InjectionError> {
        let tab = self.tab(id)?;
        let style = format!(
            "(() => {{ const s = document.createElement('style'); s.dataset.pageTour = 'driver'; \
             s.textContent = {}; document.head.appendChild(s); return true; }})()",
            js_string(&assets.style)
        );
        let script = assets.script.clone();

        tokio::task::spawn_blocking(move || {
            tab.evaluate(&style, false)?;
            tab.evaluate(&script, false)?;
            Ok::<(), anyhow::Error>(())
        })
        .await
        .map_err(|e| InjectionError(format!("injection task failed: {e}")))?
        .map_err(|e| {
            warn!(tab = %id, "asset injection failed: {:#}", e);
            InjectionError(format!("{e:#}"))
        })
    }
}
