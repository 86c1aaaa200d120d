//! Defaults and per-run settings.

use std::path::PathBuf;
use std::time::Duration;

use crate::job::PageSize;
use crate::timeout::TimeoutRule;

pub const DEFAULT_BASE_URL: &str = "https://preview.door43.org";
pub const DEFAULT_CATALOG_URL: &str = "https://git.door43.org/api/v1/catalog/entry";
pub const CACHE_HTML_URL: &str = "https://preview.door43.org/.netlify/functions/cache-html";
pub const DEFAULT_OWNER: &str = "unfoldingWord";
pub const DEFAULT_REF: &str = "master";

pub const NAVIGATION_TIMEOUT: TimeoutRule = TimeoutRule::new(90, 0.05);
pub const RENDER_TIMEOUT: TimeoutRule = TimeoutRule::new(600, 0.15);
pub const CACHE_TIMEOUT: TimeoutRule = TimeoutRule::new(300, 0.1);

pub const CATALOG_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The owner/repo/ref triple every job of a run shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub owner: String,
    pub repo: String,
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// Paged.js layout inside Chromium, then print to PDF.
    Browser,
    /// WeasyPrint lays the document out on this machine.
    Server,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub base_url: String,
    pub output_dir: PathBuf,
    pub page_sizes: Vec<PageSize>,
    pub navigation: TimeoutRule,
    pub render: TimeoutRule,
    pub sleep_after_ready: Duration,
    pub backend: Backend,
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct WarmSettings {
    pub base_url: String,
    pub cache_url: String,
    pub navigation: TimeoutRule,
    pub cache: TimeoutRule,
}
