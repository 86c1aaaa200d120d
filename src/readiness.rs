//! Detection of the preview's print-ready state.
//!
//! The print UI has shipped several markups over time. Instead of detecting
//! which one is live, the detector walks an ordered list of strategies, each
//! with its own bounded wait, and accepts the first that succeeds.

use std::fmt;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::browser::PageDriver;
use crate::error::{Error, Result};

pub const PRINT_TOGGLE_SELECTOR: &str = r#"button[aria-label^="Print view"]"#;
pub const PRINT_ICON_SELECTOR: &str = r#"button[aria-label^="Open print options"]"#;
pub const HTML_DOWNLOAD_BUTTON_SELECTOR: &str =
    r#"button[aria-label="Download the HTML for printing"]"#;

const DRAWER_OPEN_CHECK: Duration = Duration::from_secs(1);

const PRINT_VIEW_ENGAGED: &str = r#"document.querySelector('button[aria-label^="Print view"]')?.getAttribute('aria-pressed') === 'true'"#;
const MAIN_CONTENT_PRESENT: &str = "!!(document.querySelector('.pagedjs_pages') || document.querySelector('[data-book]') || document.querySelector('main'))";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PrimaryToggle,
    DirectDownloadAvailable,
    AlternateIconPath,
    ContentFallback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PrimaryToggle => "primary print toggle",
            Stage::DirectDownloadAvailable => "direct download button",
            Stage::AlternateIconPath => "print options icon",
            Stage::ContentFallback => "main content fallback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
enum Probe {
    Visible(&'static str),
    Script(&'static str),
}

#[derive(Debug, Clone, Copy)]
enum Action {
    None,
    Click(&'static str),
    /// Click a toggle unless its `aria-pressed` is already `true`.
    Engage(&'static str),
}

#[derive(Debug, Clone, Copy)]
enum Confirm {
    Immediately,
    Visible(&'static str),
    Script(&'static str),
}

#[derive(Debug, Clone, Copy)]
struct Strategy {
    stage: Stage,
    probe: Probe,
    action: Action,
    confirm: Confirm,
    /// Each wait of this strategy gets `budget / budget_divisor`.
    budget_divisor: u32,
    degraded: bool,
}

const STRATEGIES: [Strategy; 4] = [
    Strategy {
        stage: Stage::PrimaryToggle,
        probe: Probe::Visible(PRINT_TOGGLE_SELECTOR),
        action: Action::Engage(PRINT_TOGGLE_SELECTOR),
        confirm: Confirm::Script(PRINT_VIEW_ENGAGED),
        budget_divisor: 1,
        degraded: false,
    },
    Strategy {
        stage: Stage::DirectDownloadAvailable,
        probe: Probe::Visible(HTML_DOWNLOAD_BUTTON_SELECTOR),
        action: Action::None,
        confirm: Confirm::Immediately,
        budget_divisor: 3,
        degraded: false,
    },
    Strategy {
        stage: Stage::AlternateIconPath,
        probe: Probe::Visible(PRINT_ICON_SELECTOR),
        action: Action::Click(PRINT_ICON_SELECTOR),
        confirm: Confirm::Visible(HTML_DOWNLOAD_BUTTON_SELECTOR),
        budget_divisor: 3,
        degraded: false,
    },
    Strategy {
        stage: Stage::ContentFallback,
        probe: Probe::Script(MAIN_CONTENT_PRESENT),
        action: Action::None,
        confirm: Confirm::Immediately,
        budget_divisor: 3,
        degraded: true,
    },
];

/// Which strategy got the page ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub stage: Stage,
    /// True when only generic content was seen, not the print UI itself.
    pub degraded: bool,
}

async fn wait_probe<P: PageDriver>(page: &P, probe: Probe, wait: Duration) -> Result<bool> {
    match probe {
        Probe::Visible(selector) => page.wait_for_visible(selector, wait).await,
        Probe::Script(expression) => page.wait_for_script(expression, wait).await,
    }
}

/// Runs a strategy's action. `Ok(true)` means the page is already in the
/// confirmed state.
async fn act<P: PageDriver>(page: &P, action: Action) -> Result<bool> {
    match action {
        Action::None => {}
        Action::Click(selector) => {
            debug!("Clicking {}", selector);
            page.click(selector).await?;
        }
        Action::Engage(selector) => {
            let pressed = page.attribute(selector, "aria-pressed").await?;
            if pressed.as_deref() == Some("true") {
                return Ok(true);
            }
            debug!("Enabling print preview toggle");
            page.click(selector).await?;
        }
    }
    Ok(false)
}

async fn attempt<P: PageDriver>(page: &P, strategy: &Strategy, budget: Duration) -> Result<bool> {
    let wait = budget / strategy.budget_divisor;

    if !wait_probe(page, strategy.probe, wait).await? {
        return Ok(false);
    }

    match act(page, strategy.action).await {
        Ok(true) => return Ok(true),
        Ok(false) => {}
        Err(e) => {
            // The control can detach between the probe and the action.
            debug!("{} action failed: {}", strategy.stage, e);
            return Ok(false);
        }
    }

    match strategy.confirm {
        Confirm::Immediately => Ok(true),
        Confirm::Visible(selector) => page.wait_for_visible(selector, wait).await,
        Confirm::Script(expression) => page.wait_for_script(expression, wait).await,
    }
}

/// Waits for the print UI, trying each known markup in priority order.
pub async fn wait_until_ready<P: PageDriver>(page: &P, budget: Duration) -> Result<Readiness> {
    let mut reached = STRATEGIES[0].stage;

    for strategy in &STRATEGIES {
        reached = strategy.stage;
        if attempt(page, strategy, budget).await? {
            if strategy.degraded {
                warn!("Proceeding despite not seeing explicit print UI; main content detected");
            } else {
                debug!("Print UI ready via {}", strategy.stage);
            }
            return Ok(Readiness {
                stage: strategy.stage,
                degraded: strategy.degraded,
            });
        }
        debug!("{} did not appear, trying next strategy", strategy.stage);
    }

    error!("Failed to find print UI or main content within timeout");
    Err(Error::RenderTimeout {
        stage: reached.to_string(),
    })
}

/// Opens the print options drawer so the download button is shown. A drawer
/// that is already open (the icon fallback opens it) is left alone.
pub async fn open_print_drawer<P: PageDriver>(page: &P, timeout: Duration) -> Result<()> {
    if page
        .wait_for_visible(HTML_DOWNLOAD_BUTTON_SELECTOR, DRAWER_OPEN_CHECK)
        .await?
    {
        debug!("Print options drawer already open");
        return Ok(());
    }

    debug!("Opening print options drawer");
    if !page.wait_for_visible(PRINT_ICON_SELECTOR, timeout).await? {
        return Err(Error::RenderTimeout {
            stage: Stage::AlternateIconPath.to_string(),
        });
    }
    page.click(PRINT_ICON_SELECTOR).await?;
    if !page.wait_for_visible(HTML_DOWNLOAD_BUTTON_SELECTOR, timeout).await? {
        return Err(Error::RenderTimeout {
            stage: Stage::DirectDownloadAvailable.to_string(),
        });
    }
    Ok(())
}
