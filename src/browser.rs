use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, SetDownloadBehaviorBehavior,
    SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::emulation::SetEmulatedMediaParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use colored::*;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::{fs, time};
use tracing::{debug, error};

use crate::config::BrowserSettings;
use crate::error::{Error, Result};
use crate::job::PageSize;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// How long the network has to stay silent before a page counts as loaded.
const NETWORK_IDLE: Duration = Duration::from_millis(500);
/// Upper bound for a single DevTools command. Every wait in this crate has
/// its own, shorter, timeout on top.
const CDP_REQUEST_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// The page operations readiness detection needs. Implemented for Chromium
/// pages; tests provide a scripted fake.
#[allow(async_fn_in_trait)]
pub trait PageDriver {
    /// Waits until `selector` matches a rendered element. `Ok(false)` on timeout.
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<bool>;

    /// Waits until a JavaScript expression evaluates to `true`. `Ok(false)` on timeout.
    async fn wait_for_script(&self, expression: &str, timeout: Duration) -> Result<bool>;

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    async fn click(&self, selector: &str) -> Result<()>;
}

/// JavaScript expression that is true once `selector` matches a visible element.
pub fn visible_expression(selector: &str) -> String {
    let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(() => {{
            const el = document.querySelector({quoted});
            if (!el) return false;
            const style = window.getComputedStyle(el);
            return style.visibility !== 'hidden' && style.display !== 'none' && el.getClientRects().length > 0;
        }})()"#
    )
}

impl PageDriver for Page {
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<bool> {
        self.wait_for_script(&visible_expression(selector), timeout).await
    }

    async fn wait_for_script(&self, expression: &str, timeout: Duration) -> Result<bool> {
        let poll = async {
            loop {
                // Evaluation fails while a navigation swaps the execution context.
                let ready = match self.evaluate(expression).await {
                    Ok(result) => result.into_value::<bool>().unwrap_or(false),
                    Err(e) => {
                        debug!("Evaluation failed while polling: {}", e);
                        false
                    }
                };
                if ready {
                    return;
                }
                time::sleep(POLL_INTERVAL).await;
            }
        };
        Ok(time::timeout(timeout, poll).await.is_ok())
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let element = self.find_element(selector).await?;
        Ok(element.attribute(name).await?)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.find_element(selector).await?.click().await?;
        Ok(())
    }
}

/// One Chromium instance shared by every book of a run.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .request_timeout(CDP_REQUEST_TIMEOUT);
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| Error::Browser(format!("Failed to create browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Browser(format!("Failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(err) = h {
                    // Only log if it's not a common websocket deserialization error
                    let err_str = err.to_string();
                    if !err_str.contains("data did not match any variant")
                        && !err_str.contains("untagged enum Message")
                    {
                        error!("Browser handler error: {}", err);
                    } else {
                        debug!("Chrome protocol message ignored: {}", err);
                    }
                }
            }
        });

        Ok(Self { browser, handler })
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub async fn new_page(&self) -> Result<Page> {
        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::Browser(format!("Failed to create new page: {}", e)))
    }

    pub async fn close(mut self) {
        self.browser.close().await.ok();
        self.handler.abort();
    }
}

/// Request ids a page has started and not yet finished.
#[derive(Debug, Default)]
pub struct InflightRequests {
    pending: HashSet<String>,
    /// Ends that were seen before their start.
    finished_early: HashSet<String>,
}

impl InflightRequests {
    pub fn on_sent(&mut self, request_id: &str) {
        if !self.finished_early.remove(request_id) {
            self.pending.insert(request_id.to_string());
        }
    }

    pub fn on_done(&mut self, request_id: &str) {
        if !self.pending.remove(request_id) {
            self.finished_early.insert(request_id.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Tracks in-flight requests of a page and logs traffic at debug level.
pub struct NetworkMonitor {
    inflight: watch::Receiver<usize>,
    task: JoinHandle<()>,
}

impl NetworkMonitor {
    /// Must be attached before navigating so no request is missed.
    pub async fn attach(page: &Page) -> Result<Self> {
        let mut sent = page.event_listener::<EventRequestWillBeSent>().await?;
        let mut received = page.event_listener::<EventResponseReceived>().await?;
        let mut finished = page.event_listener::<EventLoadingFinished>().await?;
        let mut failed = page.event_listener::<EventLoadingFailed>().await?;

        let (tx, inflight) = watch::channel(0usize);
        let task = tokio::spawn(async move {
            let mut pending = InflightRequests::default();
            loop {
                // Starts are drained first so a queued finish never beats its own start.
                tokio::select! {
                    biased;
                    Some(event) = sent.next() => {
                        debug!("→ REQUEST: {} {}", event.request.method, event.request.url);
                        pending.on_sent(event.request_id.inner());
                    }
                    Some(event) = finished.next() => {
                        pending.on_done(event.request_id.inner());
                    }
                    Some(event) = failed.next() => {
                        pending.on_done(event.request_id.inner());
                    }
                    Some(event) = received.next() => {
                        debug!("← RESPONSE: {} -> {}", event.response.url, event.response.status);
                    }
                    else => break,
                }
                let _ = tx.send(pending.len());
            }
        });

        Ok(Self { inflight, task })
    }

    /// Returns once no request has been in flight for `quiet`.
    pub async fn wait_for_idle(&mut self, quiet: Duration) {
        loop {
            while *self.inflight.borrow_and_update() != 0 {
                if self.inflight.changed().await.is_err() {
                    return;
                }
            }
            match time::timeout(quiet, self.inflight.changed()).await {
                Err(_) | Ok(Err(_)) => return,
                Ok(Ok(())) => continue,
            }
        }
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Navigates and waits for network quiescence within `timeout`.
pub async fn navigate(page: &Page, url: &str, timeout: Duration) -> Result<()> {
    let mut monitor = NetworkMonitor::attach(page).await?;
    let load = async {
        page.goto(url)
            .await
            .map_err(|e| Error::Browser(format!("Failed to navigate to {}: {}", url, e)))?;
        monitor.wait_for_idle(NETWORK_IDLE).await;
        Ok::<_, Error>(())
    };
    time::timeout(timeout, load)
        .await
        .map_err(|_| Error::NavigationTimeout(timeout))?
}

/// Clicks `selector` and moves the resulting browser download to
/// `destination` once Chromium reports it complete.
///
/// The file is staged in a hidden directory next to `destination`, so an
/// interrupted download never shows up under the final name.
pub async fn download(
    browser: &Browser,
    page: &Page,
    selector: &str,
    destination: &Path,
    timeout: Duration,
) -> Result<()> {
    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).await?;
    let staging = tempfile::Builder::new()
        .prefix(".download-")
        .tempdir_in(parent)?;

    let behavior = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::AllowAndName)
        .download_path(staging.path().to_string_lossy().into_owned())
        .events_enabled(true)
        .build()
        .map_err(Error::Browser)?;
    browser.execute(behavior).await?;

    let mut progress = browser.event_listener::<EventDownloadProgress>().await?;
    PageDriver::click(page, selector).await?;

    let wait = async {
        while let Some(event) = progress.next().await {
            match event.state {
                DownloadProgressState::Completed => return Ok(event.guid.clone()),
                DownloadProgressState::Canceled => {
                    return Err(Error::Browser("Download was canceled".to_string()))
                }
                _ => debug!(
                    "Download progress: {} / {} bytes",
                    event.received_bytes, event.total_bytes
                ),
            }
        }
        Err(Error::Browser("Download event stream closed".to_string()))
    };
    let guid = time::timeout(timeout, wait)
        .await
        .map_err(|_| Error::DownloadTimeout(timeout))??;

    fs::rename(staging.path().join(&guid), destination).await?;
    debug!("Download {} saved to {}", guid, destination.display().to_string().blue());
    Ok(())
}

/// Switches the page to print media and prints it with zero margins,
/// letting the document's own `@page` size win over `size`.
pub async fn print_to_pdf(page: &Page, size: PageSize) -> Result<Vec<u8>> {
    page.execute(SetEmulatedMediaParams::builder().media("print").build())
        .await?;

    let (width, height) = size.paper_inches();
    let params = PrintToPdfParams {
        print_background: Some(true),
        prefer_css_page_size: Some(true),
        paper_width: Some(width),
        paper_height: Some(height),
        margin_top: Some(0.0),
        margin_right: Some(0.0),
        margin_bottom: Some(0.0),
        margin_left: Some(0.0),
        ..Default::default()
    };

    page.pdf(params)
        .await
        .map_err(|e| Error::Browser(format!("Failed to generate PDF: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_expression_quotes_selector() {
        let js = visible_expression(r#"button[aria-label="Print"]"#);
        assert!(js.contains(r#"document.querySelector("button[aria-label=\"Print\"]")"#));
    }

    #[test]
    fn inflight_count_settles_when_finish_arrives_first() {
        let mut inflight = InflightRequests::default();
        inflight.on_sent("1");
        inflight.on_done("2");
        inflight.on_sent("3");
        assert_eq!(inflight.len(), 2);

        inflight.on_sent("2");
        inflight.on_done("1");
        inflight.on_done("3");
        assert!(inflight.is_empty());
    }

    #[test]
    fn redirects_share_one_pending_entry() {
        let mut inflight = InflightRequests::default();
        inflight.on_sent("7");
        inflight.on_sent("7");
        assert_eq!(inflight.len(), 1);
        inflight.on_done("7");
        assert!(inflight.is_empty());
    }
}
