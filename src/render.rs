//! HTML to PDF conversion backends.
//!
//! A run picks one [`PdfRenderer`] up front; the export loop never branches
//! on the backend.

use colored::*;
use lopdf::Document;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::{fs, time};
use tracing::{debug, info};
use url::Url;

use crate::browser::{self, BrowserSession, PageDriver};
use crate::error::{Error, Result};
use crate::fsutil;
use crate::job::PageSize;

/// True once Paged.js has produced pages and the page count has not changed
/// for over a second.
const PAGED_LAYOUT_STABLE: &str = r#"(() => {
    const pages = document.querySelectorAll('.pagedjs_pages .pagedjs_page');
    if (!pages.length) {
        window.__PAGED_LAST_COUNT = 0;
        window.__PAGED_LAST_CHANGE = Date.now();
        return false;
    }
    if (window.__PAGED_LAST_COUNT !== pages.length) {
        window.__PAGED_LAST_COUNT = pages.length;
        window.__PAGED_LAST_CHANGE = Date.now();
        return false;
    }
    return Date.now() - (window.__PAGED_LAST_CHANGE || 0) > 1000;
})()"#;

#[allow(async_fn_in_trait)]
pub trait PdfRenderer {
    fn name(&self) -> &'static str;

    /// Converts `html` to a PDF at `destination`. Nothing is left at
    /// `destination` unless the conversion succeeded.
    async fn render(
        &self,
        html: &Path,
        destination: &Path,
        size: PageSize,
        timeout: Duration,
    ) -> Result<()>;
}

/// Number of pages in a PDF, failing for anything that is not a usable PDF.
pub fn count_pages(data: &[u8]) -> Result<usize> {
    let document = Document::load_mem(data)
        .map_err(|e| Error::Conversion(format!("output is not a valid PDF: {}", e)))?;
    let pages = document.get_pages().len();
    if pages == 0 {
        return Err(Error::Conversion("output PDF has no pages".to_string()));
    }
    Ok(pages)
}

fn file_url(path: &Path) -> Result<Url> {
    Url::from_file_path(path)
        .map_err(|_| Error::Conversion(format!("cannot build file URL for {}", path.display())))
}

/// Lays the document out with Paged.js inside Chromium and prints it.
pub struct BrowserRenderer<'a> {
    session: &'a BrowserSession,
    sleep_after_ready: Duration,
}

impl<'a> BrowserRenderer<'a> {
    pub fn new(session: &'a BrowserSession, sleep_after_ready: Duration) -> Self {
        Self {
            session,
            sleep_after_ready,
        }
    }

    async fn render_on(
        &self,
        page: &chromiumoxide::Page,
        html: &Path,
        destination: &Path,
        size: PageSize,
        timeout: Duration,
    ) -> Result<()> {
        let url = file_url(&fs::canonicalize(html).await?)?;
        debug!("Loading downloaded HTML {}", html.display());
        time::timeout(timeout, page.goto(url.as_str()))
            .await
            .map_err(|_| Error::NavigationTimeout(timeout))??;

        debug!("Waiting for Paged.js to finish layout");
        if !page.wait_for_script(PAGED_LAYOUT_STABLE, timeout).await? {
            return Err(Error::RenderTimeout {
                stage: "Paged.js layout".to_string(),
            });
        }

        if !self.sleep_after_ready.is_zero() {
            debug!(
                "Waiting {:.1} seconds after Paged.js render",
                self.sleep_after_ready.as_secs_f64()
            );
            time::sleep(self.sleep_after_ready).await;
        }

        let pdf = browser::print_to_pdf(page, size).await?;
        let pages = count_pages(&pdf)?;
        fsutil::write_atomic(destination, &pdf).await?;
        debug!("Wrote {} page(s)", pages);
        Ok(())
    }
}

impl PdfRenderer for BrowserRenderer<'_> {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn render(
        &self,
        html: &Path,
        destination: &Path,
        size: PageSize,
        timeout: Duration,
    ) -> Result<()> {
        info!(
            "Writing {} PDF to {}",
            size,
            destination.display().to_string().blue()
        );
        let page = self.session.new_page().await?;
        let result = self.render_on(&page, html, destination, size, timeout).await;
        page.close().await.ok();
        result
    }
}

/// Lays the document out with WeasyPrint on this machine. Much faster than
/// Paged.js for large books.
///
/// Each document is converted by its own `weasyprint` process, so memory is
/// handed back to the system after every book.
pub struct ServerRenderer {
    program: PathBuf,
}

impl ServerRenderer {
    pub fn new(program: impl AsRef<Path>) -> Result<Self> {
        let program = which::which(program.as_ref()).map_err(|e| {
            Error::Conversion(format!(
                "{} not found ({}); is WeasyPrint installed?",
                program.as_ref().display(),
                e
            ))
        })?;
        Ok(Self { program })
    }

    /// User stylesheet that sets the page size when the document does not.
    pub fn page_stylesheet(size: PageSize) -> String {
        format!("@page {{ size: {}; }}\n", size.css_size())
    }

    fn base_url(html: &Path) -> Result<String> {
        let dir = html
            .parent()
            .ok_or_else(|| Error::Conversion(format!("{} has no parent directory", html.display())))?;
        let mut url = file_url(dir)?.to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        Ok(url)
    }
}

impl PdfRenderer for ServerRenderer {
    fn name(&self) -> &'static str {
        "server"
    }

    async fn render(
        &self,
        html: &Path,
        destination: &Path,
        size: PageSize,
        timeout: Duration,
    ) -> Result<()> {
        info!(
            "Writing {} PDF to {} using WeasyPrint",
            size,
            destination.display().to_string().blue()
        );

        let html = fs::canonicalize(html).await?;
        let base_url = Self::base_url(&html)?;

        let stylesheet = tempfile::Builder::new().suffix(".css").tempfile()?;
        fs::write(stylesheet.path(), Self::page_stylesheet(size)).await?;

        let partial = fsutil::partial_path(destination);
        let mut command = Command::new(&self.program);
        command
            .arg("--encoding")
            .arg("utf-8")
            .arg("--base-url")
            .arg(&base_url)
            .arg("--stylesheet")
            .arg(stylesheet.path())
            .arg(&html)
            .arg(&partial)
            .kill_on_drop(true);
        debug!("Running {:?}", command);

        let output = match time::timeout(timeout, command.output()).await {
            Ok(output) => output?,
            Err(_) => {
                let _ = fs::remove_file(&partial).await;
                return Err(Error::RenderTimeout {
                    stage: "WeasyPrint layout".to_string(),
                });
            }
        };

        if !output.status.success() {
            let _ = fs::remove_file(&partial).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Conversion(format!(
                "weasyprint exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let pdf = fs::read(&partial).await?;
        match count_pages(&pdf) {
            Ok(pages) => debug!("Successfully rendered {} PDF ({} page(s))", size, pages),
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        }
        fs::rename(&partial, destination).await?;
        Ok(())
    }
}
