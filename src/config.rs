use std::path::PathBuf;

use clap::Parser;

use crate::coordinator::DriverAssetPaths;
use crate::credential::FileCredentialStore;
use crate::gateway::DEFAULT_ENDPOINT;

/// Guided page tours generated by a language model.
#[derive(Debug, Clone, Parser)]
#[command(name = "tour-guide", version)]
pub struct Config {
    /// Port of the local control page.
    #[arg(long, env = "TOUR_GUIDE_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Content-generation endpoint of the model provider.
    #[arg(long, env = "TOUR_GUIDE_MODEL_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub model_endpoint: String,

    /// Where the API key is stored. Defaults to the user config directory.
    #[arg(long, env = "TOUR_GUIDE_CREDENTIAL_FILE")]
    pub credential_file: Option<PathBuf>,

    /// Seeds the credential store when it is empty.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Bundled highlighting library stylesheet.
    #[arg(long, env = "TOUR_GUIDE_DRIVER_CSS")]
    pub driver_css: Option<PathBuf>,

    /// Bundled highlighting library script.
    #[arg(long, env = "TOUR_GUIDE_DRIVER_JS")]
    pub driver_js: Option<PathBuf>,

    /// Attach to a running Chrome at this DevTools URL instead of launching one.
    #[arg(long, env = "TOUR_GUIDE_CHROME_URL")]
    pub chrome_url: Option<String>,

    /// Launch Chrome without a window.
    #[arg(long, env = "TOUR_GUIDE_HEADLESS", default_value_t = false)]
    pub headless: bool,

    /// Page opened in the launched browser.
    #[arg(long, env = "TOUR_GUIDE_START_URL", default_value = "about:blank")]
    pub start_url: String,
}

impl Config {
    pub fn credential_path(&self) -> PathBuf {
        self.credential_file
            .clone()
            .unwrap_or_else(FileCredentialStore::default_path)
    }

    pub fn driver_assets(&self) -> DriverAssetPaths {
        DriverAssetPaths {
            style: self.driver_css.clone(),
            script: self.driver_js.clone(),
        }
    }
}
