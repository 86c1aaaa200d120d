use colored::*;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::books::BookInfo;
use crate::browser::{self, BrowserSession, PageDriver};
use crate::config::RenderSettings;
use crate::error::{Error, Result};
use crate::fsutil;
use crate::job::{ExportJob, PageSize};
use crate::letter;
use crate::readiness::{self, HTML_DOWNLOAD_BUTTON_SELECTOR};
use crate::render::PdfRenderer;
use crate::runner::BookTask;
use crate::timeout::TimeoutBudget;

/// Where the printable A4 HTML of a job comes from.
#[allow(async_fn_in_trait)]
pub trait HtmlSource {
    async fn fetch(&self, job: &ExportJob, budget: TimeoutBudget, destination: &Path) -> Result<()>;
}

/// Fetches the printable HTML through the preview site's print UI.
pub struct PreviewDownloader<'a> {
    session: &'a BrowserSession,
    base_url: String,
}

impl<'a> PreviewDownloader<'a> {
    pub fn new(session: &'a BrowserSession, base_url: impl Into<String>) -> Self {
        Self {
            session,
            base_url: base_url.into(),
        }
    }

    async fn fetch_on(
        &self,
        page: &chromiumoxide::Page,
        url: &str,
        budget: TimeoutBudget,
        destination: &Path,
    ) -> Result<()> {
        info!("Navigating to {}", url.green());
        browser::navigate(page, url, budget.navigation).await?;

        readiness::wait_until_ready(page, budget.work).await?;
        readiness::open_print_drawer(page, budget.work).await?;

        info!(
            "Downloading printable HTML to {}",
            destination.display().to_string().blue()
        );
        if !page
            .wait_for_visible(HTML_DOWNLOAD_BUTTON_SELECTOR, budget.work)
            .await?
        {
            return Err(Error::DownloadTimeout(budget.work));
        }
        browser::download(
            self.session.browser(),
            page,
            HTML_DOWNLOAD_BUTTON_SELECTOR,
            destination,
            budget.work,
        )
        .await
    }
}

impl HtmlSource for PreviewDownloader<'_> {
    async fn fetch(&self, job: &ExportJob, budget: TimeoutBudget, destination: &Path) -> Result<()> {
        let url = job.url(&self.base_url, false)?;
        let page = self.session.new_page().await?;
        let result = self.fetch_on(&page, url.as_str(), budget, destination).await;
        page.close().await.ok();
        result
    }
}

/// Per-book export pipeline: printable HTML, optional Letter variant, PDFs.
///
/// Files already on disk are reused unless `force` is set.
pub struct Exporter<'s, S, R> {
    source: S,
    renderer: R,
    settings: &'s RenderSettings,
}

impl<'s, S: HtmlSource, R: PdfRenderer> Exporter<'s, S, R> {
    pub fn new(source: S, renderer: R, settings: &'s RenderSettings) -> Self {
        Self {
            source,
            renderer,
            settings,
        }
    }

    pub fn into_parts(self) -> (S, R) {
        (self.source, self.renderer)
    }

    async fn ensure_html(&self, job: &ExportJob, budget: TimeoutBudget) -> Result<PathBuf> {
        let path = job.html_path(PageSize::A4);
        if fsutil::exists(&path).await && !self.settings.force {
            info!("HTML already exists: {} (skipping download)", file_name(&path));
        } else {
            self.source.fetch(job, budget, &path).await?;
        }
        Ok(path)
    }

    async fn ensure_letter_html(&self, job: &ExportJob, a4: &Path) -> Result<PathBuf> {
        let path = job.html_path(PageSize::Letter);
        if fsutil::exists(&path).await && !self.settings.force {
            info!("LETTER HTML already exists: {} (skipping creation)", file_name(&path));
        } else {
            letter::create_letter_variant(a4, &path).await?;
        }
        Ok(path)
    }

    pub async fn export(&self, job: &ExportJob, budget: TimeoutBudget) -> Result<()> {
        let a4 = self.ensure_html(job, budget).await?;

        let mut variants = vec![(PageSize::A4, a4.clone())];
        if job.page_sizes.contains(&PageSize::Letter) {
            variants.push((PageSize::Letter, self.ensure_letter_html(job, &a4).await?));
        }

        for size in &job.page_sizes {
            let Some((_, html)) = variants.iter().find(|(s, _)| s == size) else {
                continue;
            };

            let pdf = job.pdf_path(*size);
            if fsutil::exists(&pdf).await && !self.settings.force {
                info!("PDF already exists: {} (skipping generation)", file_name(&pdf));
                continue;
            }

            self.renderer.render(html, &pdf, *size, budget.work).await?;
        }

        Ok(())
    }
}

impl<S: HtmlSource, R: PdfRenderer> BookTask for Exporter<'_, S, R> {
    fn budget(&self, book: Option<&BookInfo>) -> TimeoutBudget {
        TimeoutBudget::for_book(book, &self.settings.navigation, &self.settings.render)
    }

    async fn process(&self, job: &ExportJob, budget: TimeoutBudget) -> Result<()> {
        self.export(job, budget).await
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
