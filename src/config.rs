//! Configuration: defaults, optional TOML file, CLI overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default config file looked up in the working directory.
pub const CONFIG_FILE: &str = "wilsonscrape.toml";

/// Last known search-results page of the archive (0-indexed, inclusive).
pub const DEFAULT_LAST_PAGE: u32 = 1615;

/// Runtime settings for a scrape run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database file.
    pub db_path: PathBuf,

    /// Archive root; search and document URLs are resolved against this.
    pub base_url: String,

    /// Default end of the page range when none is given.
    pub last_page: u32,

    /// Refuse to mark a page complete when any document on it failed.
    /// Off by default: a completed page then promises attempts, not successes.
    pub strict_completion: bool,

    pub browser: BrowserSettings,
    pub delays: DelaySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("wilson_archive.db"),
            base_url: "https://digitalarchive.wilsoncenter.org".to_string(),
            last_page: DEFAULT_LAST_PAGE,
            strict_completion: false,
            browser: BrowserSettings::default(),
            delays: DelaySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from an explicit file, the default file if present,
    /// or built-in defaults.
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match config_path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path)?;
        let settings = toml::from_str(&text)?;
        Ok(settings)
    }

    /// Search-results URL for a page number.
    pub fn search_url(&self, page: u32) -> String {
        format!("{}/search?page={}", self.base_url.trim_end_matches('/'), page)
    }
}

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run in headless mode (default: true).
    /// Set to false for debugging or if headless detection is an issue.
    pub headless: bool,

    /// Navigation timeout in seconds.
    pub timeout_secs: u64,

    /// Explicit Chrome/Chromium binary; discovered automatically when unset.
    pub chrome_executable: Option<PathBuf>,

    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_secs: 30,
            chrome_executable: None,
            chrome_args: Vec::new(),
        }
    }
}

/// Settle and politeness delays, all in milliseconds.
///
/// The archive renders client-side, so each navigation gets a fixed settle
/// wait on top of the page-ready check. Inter-page delay is randomized
/// within `[page_gap_min_ms, page_gap_max_ms]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelaySettings {
    pub search_settle_ms: u64,
    pub document_settle_ms: u64,
    pub document_gap_ms: u64,
    pub page_gap_min_ms: u64,
    pub page_gap_max_ms: u64,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            search_settle_ms: 5000,
            document_settle_ms: 3000,
            document_gap_ms: 1000,
            page_gap_min_ms: 1000,
            page_gap_max_ms: 3000,
        }
    }
}

impl DelaySettings {
    /// Zero delays, for tests.
    pub fn none() -> Self {
        Self {
            search_settle_ms: 0,
            document_settle_ms: 0,
            document_gap_ms: 0,
            page_gap_min_ms: 0,
            page_gap_max_ms: 0,
        }
    }
}
