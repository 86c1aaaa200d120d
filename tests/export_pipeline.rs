// tests/export_pipeline.rs
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use preview2pdf::books;
use preview2pdf::config::{Backend, RenderSettings, Resource};
use preview2pdf::timeout::{TimeoutBudget, TimeoutRule};
use preview2pdf::{run_books, Error, ExportJob, Exporter, HtmlSource, PageSize, PdfRenderer};
use tempfile::TempDir;

const PRINT_HTML: &str = "<html><style>@page { size: 210mm 297mm; }</style><body>Genesis</body></html>";

#[derive(Default)]
struct FakeSource {
    fetches: AtomicUsize,
    fail_for: Option<&'static str>,
}

impl HtmlSource for FakeSource {
    async fn fetch(&self, job: &ExportJob, _budget: TimeoutBudget, destination: &Path) -> preview2pdf::Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_for.is_some() && job.book_code() == self.fail_for {
            return Err(Error::RenderTimeout {
                stage: "print view toggle".into(),
            });
        }
        fs::write(destination, PRINT_HTML)?;
        Ok(())
    }
}

#[derive(Default)]
struct FakeRenderer {
    renders: AtomicUsize,
}

impl PdfRenderer for FakeRenderer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn render(
        &self,
        html: &Path,
        destination: &Path,
        size: PageSize,
        _timeout: Duration,
    ) -> preview2pdf::Result<()> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        assert!(html.exists(), "renderer got a missing {} document", size);
        fs::write(destination, b"%PDF-1.4 fake")?;
        Ok(())
    }
}

fn settings(dir: &Path, page_sizes: &[PageSize], force: bool) -> RenderSettings {
    RenderSettings {
        base_url: "https://preview.door43.org".into(),
        output_dir: dir.to_path_buf(),
        page_sizes: page_sizes.to_vec(),
        navigation: TimeoutRule::new(90, 0.05),
        render: TimeoutRule::new(600, 0.15),
        sleep_after_ready: Duration::ZERO,
        backend: Backend::Browser,
        force,
    }
}

fn jobs(dir: &Path, codes: &[&str], page_sizes: &[PageSize]) -> Vec<ExportJob> {
    let resource = Resource {
        owner: "unfoldingWord".into(),
        repo: "en_ult".into(),
        reference: "v86".into(),
    };
    codes
        .iter()
        .map(|code| ExportJob::new(&resource, books::lookup(code), dir, page_sizes))
        .collect()
}

#[tokio::test]
async fn exports_both_sizes_then_reuses_files() {
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path(), &PageSize::ALL, false);
    let jobs = jobs(dir.path(), &["gen"], &PageSize::ALL);

    let exporter = Exporter::new(FakeSource::default(), FakeRenderer::default(), &settings);
    let summary = run_books(&exporter, &jobs).await;
    assert!(summary.is_clean());
    assert_eq!(summary.successful, vec!["GEN".to_string()]);

    for name in [
        "en_ult_01-GEN_v86_A4.html",
        "en_ult_01-GEN_v86_LETTER.html",
        "en_ult_01-GEN_v86_A4.pdf",
        "en_ult_01-GEN_v86_LETTER.pdf",
    ] {
        assert!(dir.path().join(name).exists(), "{} was not written", name);
    }
    let letter = fs::read_to_string(dir.path().join("en_ult_01-GEN_v86_LETTER.html")).unwrap();
    assert!(letter.contains("size: letter;"));

    // Everything is on disk now, so a second run does no work.
    let second = Exporter::new(FakeSource::default(), FakeRenderer::default(), &settings);
    let summary = run_books(&second, &jobs).await;
    assert!(summary.is_clean());
}

#[tokio::test]
async fn existing_files_skip_download_and_render() {
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path(), &PageSize::ALL, false);
    let jobs = jobs(dir.path(), &["gen"], &PageSize::ALL);

    let first = Exporter::new(FakeSource::default(), FakeRenderer::default(), &settings);
    run_books(&first, &jobs).await;

    let source = FakeSource::default();
    let renderer = FakeRenderer::default();
    let second = Exporter::new(source, renderer, &settings);
    let budget = TimeoutBudget {
        navigation: Duration::from_secs(1),
        work: Duration::from_secs(1),
    };
    second.export(&jobs[0], budget).await.unwrap();

    let (source, renderer) = second.into_parts();
    assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(renderer.renders.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn force_regenerates_everything() {
    let dir = TempDir::new().unwrap();
    let jobs = jobs(dir.path(), &["gen"], &PageSize::ALL);

    let cached = settings(dir.path(), &PageSize::ALL, false);
    run_books(&Exporter::new(FakeSource::default(), FakeRenderer::default(), &cached), &jobs).await;

    let forced = settings(dir.path(), &PageSize::ALL, true);
    let exporter = Exporter::new(FakeSource::default(), FakeRenderer::default(), &forced);
    let summary = run_books(&exporter, &jobs).await;
    assert!(summary.is_clean());

    let (source, renderer) = exporter.into_parts();
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(renderer.renders.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn single_page_size_skips_letter_variant() {
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path(), &[PageSize::A4], false);
    let jobs = jobs(dir.path(), &["rut"], &[PageSize::A4]);

    let exporter = Exporter::new(FakeSource::default(), FakeRenderer::default(), &settings);
    assert!(run_books(&exporter, &jobs).await.is_clean());

    assert!(dir.path().join("en_ult_08-RUT_v86_A4.pdf").exists());
    assert!(!dir.path().join("en_ult_08-RUT_v86_LETTER.html").exists());
    assert!(!dir.path().join("en_ult_08-RUT_v86_LETTER.pdf").exists());
}

#[tokio::test]
async fn failed_book_does_not_stop_the_run() {
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path(), &[PageSize::A4], false);
    let jobs = jobs(dir.path(), &["gen", "exo", "lev"], &[PageSize::A4]);

    let source = FakeSource {
        fail_for: Some("exo"),
        ..Default::default()
    };
    let exporter = Exporter::new(source, FakeRenderer::default(), &settings);
    let summary = run_books(&exporter, &jobs).await;

    assert_eq!(summary.successful, vec!["GEN".to_string(), "LEV".to_string()]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "EXO");
    assert!(summary.failed[0].1.contains("print view toggle"));
    assert!(!dir.path().join("en_ult_02-EXO_v86_A4.pdf").exists());

    let (source, renderer) = exporter.into_parts();
    assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    assert_eq!(renderer.renders.load(Ordering::SeqCst), 2);
}
