use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::model::Category;

const CONFIG_FILE: &str = "menu_intel";
const ENV_PREFIX: &str = "MENU_INTEL";

/// Layered settings: defaults, then `menu_intel.toml`, then
/// `MENU_INTEL_<SECTION>__<KEY>` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub db_path: String,
    pub browser: BrowserSettings,
    pub age_gate: AgeGateSettings,
    pub scroll: ScrollSettings,
    pub run: RunSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub user_agent: Option<String>,
    pub navigation_timeout_secs: u64,
    pub navigation_retries: u32,
    pub retry_backoff_ms: u64,
    /// How long the CDP connection may stay silent before the backend gives up.
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgeGateSettings {
    pub affirmative_text: String,
    pub wait_secs: u64,
    pub settle_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrollSettings {
    pub entry_selector: String,
    pub initial_wait_secs: u64,
    pub settle_secs: u64,
    pub grace_iterations: u32,
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub category_pause_secs: u64,
    /// When false, a record with no THC reading counts as 0% against `--min-thc`.
    pub keep_missing_thc: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "https://dutchie.com/dispensary".to_string(),
            db_path: "data/menu_intel.sqlite".to_string(),
            browser: BrowserSettings::default(),
            age_gate: AgeGateSettings::default(),
            scroll: ScrollSettings::default(),
            run: RunSettings::default(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1920, 1080),
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            navigation_timeout_secs: 30,
            navigation_retries: 2,
            retry_backoff_ms: 2000,
            idle_timeout_secs: 300,
        }
    }
}

impl Default for AgeGateSettings {
    fn default() -> Self {
        Self {
            affirmative_text: "yes".to_string(),
            wait_secs: 10,
            settle_secs: 2,
        }
    }
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            entry_selector: r#"[data-testid="product-list-item"]"#.to_string(),
            initial_wait_secs: 20,
            settle_secs: 3,
            grace_iterations: 4,
            max_iterations: 50,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            category_pause_secs: 3,
            keep_missing_thc: false,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn category_url(&self, dispensary: &str, category: Category) -> String {
        format!(
            "{}/{}/products/{}",
            self.base_url.trim_end_matches('/'),
            dispensary,
            category.slug()
        )
    }
}

impl BrowserSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(2u64.saturating_pow(attempt)))
    }
}

impl RunSettings {
    pub fn category_pause(&self) -> Duration {
        Duration::from_secs(self.category_pause_secs)
    }
}
