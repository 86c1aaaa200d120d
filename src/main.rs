use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use preview2pdf::books::{self, BookSelection, DEFAULT_BOOKS};
use preview2pdf::config::{
    Backend, BrowserSettings, RenderSettings, Resource, WarmSettings, CACHE_HTML_URL, CACHE_TIMEOUT,
    DEFAULT_BASE_URL, DEFAULT_CATALOG_URL, DEFAULT_OWNER, DEFAULT_REF, NAVIGATION_TIMEOUT,
    RENDER_TIMEOUT,
};
use preview2pdf::rename::{self, RenameStats};
use preview2pdf::timeout::TimeoutRule;
use preview2pdf::{
    run_books, BrowserRenderer, BrowserSession, CacheWarmer, CatalogClient, Error, ExportJob,
    Exporter, PageSize, PdfRenderer, PreviewDownloader, ServerRenderer,
};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tokio::fs;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const WEASYPRINT: &str = "weasyprint";

#[derive(Parser)]
#[command(name = "preview2pdf")]
#[command(about = "CLI utility to export Door43 print previews to PDF, one file per book and page size")]
#[command(version = "0.1.0")]
struct Args {
    /// Enable debug logging output
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download printable HTML from the preview site and convert it to PDF
    Render {
        #[command(flatten)]
        target: TargetArgs,

        /// Directory where generated HTML and PDFs are written
        #[arg(short = 'o', long = "output-dir", default_value = "output")]
        output_dir: PathBuf,

        /// Seconds to wait for initial navigation
        #[arg(long = "navigation-timeout", default_value_t = NAVIGATION_TIMEOUT.base_seconds)]
        navigation_timeout: u64,

        /// Additional navigation seconds per verse
        #[arg(long = "navigation-timeout-per-verse", default_value_t = NAVIGATION_TIMEOUT.per_verse_seconds, value_parser = parse_seconds)]
        navigation_per_verse: f64,

        /// Seconds to wait for print rendering before failing
        #[arg(long = "render-timeout", default_value_t = RENDER_TIMEOUT.base_seconds)]
        render_timeout: u64,

        /// Additional render seconds per verse
        #[arg(long = "render-timeout-per-verse", default_value_t = RENDER_TIMEOUT.per_verse_seconds, value_parser = parse_seconds)]
        render_per_verse: f64,

        /// Extra seconds to wait after the print view is ready for layout to settle
        #[arg(long = "sleep-after-ready", default_value = "5.0", value_parser = parse_seconds)]
        sleep_after_ready: f64,

        /// Page size to generate (A4 or LETTER). Both sizes when omitted
        #[arg(long = "page", value_parser = parse_page_size)]
        page: Option<PageSize>,

        /// Download HTML and generate PDFs again even if the files already exist
        #[arg(long = "force")]
        force: bool,

        /// PDF backend: `browser` runs Paged.js in Chromium, `server` runs WeasyPrint locally
        #[arg(long = "backend", value_enum, default_value_t = Backend::Browser)]
        backend: Backend,
    },
    /// Load preview pages with rerender=1 so the site caches their HTML
    Warm {
        #[command(flatten)]
        target: TargetArgs,

        /// Seconds to wait for initial navigation
        #[arg(long = "navigation-timeout", default_value_t = NAVIGATION_TIMEOUT.base_seconds)]
        navigation_timeout: u64,

        /// Additional navigation seconds per verse
        #[arg(long = "navigation-timeout-per-verse", default_value_t = NAVIGATION_TIMEOUT.per_verse_seconds, value_parser = parse_seconds)]
        navigation_per_verse: f64,

        /// Seconds to wait for the cache-html POST
        #[arg(long = "cache-timeout", default_value_t = CACHE_TIMEOUT.base_seconds)]
        cache_timeout: u64,

        /// Additional cache seconds per verse
        #[arg(long = "cache-timeout-per-verse", default_value_t = CACHE_TIMEOUT.per_verse_seconds, value_parser = parse_seconds)]
        cache_per_verse: f64,
    },
    /// Rename exports from the old `unfoldingWord--repo--ref--BOOK--SIZE` naming
    Rename {
        /// Directories containing files to rename
        #[arg(required = true)]
        directories: Vec<PathBuf>,

        /// Actually rename files (default is a dry run)
        #[arg(long = "execute")]
        execute: bool,

        /// Process subdirectories recursively
        #[arg(short = 'r', long = "recursive")]
        recursive: bool,
    },
    /// List book codes grouped by testament
    Books,
}

/// Which resource to process and where to find it.
#[derive(clap::Args)]
struct TargetArgs {
    /// Book codes to process, or `ot`, `nt`, `all` [default: gen exo lev num deu]
    #[arg(short = 'b', long = "books", num_args = 1.., value_delimiter = ',')]
    books: Option<Vec<String>>,

    /// Owner segment of the preview URL
    #[arg(long = "owner", default_value = DEFAULT_OWNER)]
    owner: String,

    /// Repository slug of the preview URL
    #[arg(long = "repo")]
    repo: String,

    /// Branch or tag of the preview URL
    #[arg(long = "ref", default_value = DEFAULT_REF)]
    reference: String,

    /// Preview site base URL
    #[arg(long = "base-url", env = "PREVIEW_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Catalog entry API base URL
    #[arg(long = "catalog-url", env = "CATALOG_BASE_URL", default_value = DEFAULT_CATALOG_URL)]
    catalog_url: String,

    /// Run Chromium with a visible window for debugging
    #[arg(long = "headed")]
    headed: bool,
}

impl TargetArgs {
    fn resource(&self) -> Resource {
        Resource {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            reference: self.reference.clone(),
        }
    }

    fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings {
            headless: !self.headed,
        }
    }
}

fn parse_seconds(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|_| "Not a number.")?;
    if value < 0.0 || !value.is_finite() {
        return Err("Must be zero or positive number.".to_string());
    }
    Ok(value)
}

fn parse_page_size(s: &str) -> Result<PageSize, String> {
    s.parse::<PageSize>().map_err(|e| e.to_string())
}

/// Intersects the requested books with what the catalog entry publishes.
async fn resolve_selection(target: &TargetArgs, resource: &Resource) -> Result<BookSelection> {
    let request = match &target.books {
        Some(values) => books::expand_book_arguments(values)?,
        None => books::expand_book_arguments(DEFAULT_BOOKS)?,
    };

    let catalog = CatalogClient::new(&target.catalog_url)?;
    let available = catalog.available_books(resource).await?;
    let selection = BookSelection::resolve(&request, &available);

    if selection.is_bookless() {
        info!(
            "{} publishes no books; processing it as a single document",
            resource.repo.green()
        );
    } else {
        selection.warn_missing();
    }

    if selection.is_empty() {
        return Err(Error::NoBooks.into());
    }

    if !selection.is_bookless() {
        let codes: Vec<String> = selection
            .books()
            .iter()
            .flatten()
            .map(|code| code.to_uppercase())
            .collect();
        info!("Processing {} book(s): {}", selection.len(), codes.join(", "));
    }

    Ok(selection)
}

fn build_jobs(
    resource: &Resource,
    selection: &BookSelection,
    output_dir: &Path,
    page_sizes: &[PageSize],
) -> Vec<ExportJob> {
    selection
        .books()
        .iter()
        .map(|book| ExportJob::new(resource, book.and_then(books::lookup), output_dir, page_sizes))
        .collect()
}

async fn render(target: TargetArgs, settings: RenderSettings) -> Result<()> {
    let resource = target.resource();
    let selection = resolve_selection(&target, &resource).await?;

    fs::create_dir_all(&settings.output_dir).await?;
    let jobs = build_jobs(&resource, &selection, &settings.output_dir, &settings.page_sizes);

    // Fail before launching Chromium when WeasyPrint is missing.
    let server = match settings.backend {
        Backend::Server => Some(ServerRenderer::new(WEASYPRINT)?),
        Backend::Browser => None,
    };

    let session = BrowserSession::launch(&target.browser_settings()).await?;
    let source = PreviewDownloader::new(&session, settings.base_url.clone());

    let summary = match server {
        Some(renderer) => {
            info!("Rendering PDFs with the {} backend", renderer.name());
            run_books(&Exporter::new(source, renderer, &settings), &jobs).await
        }
        None => {
            let renderer = BrowserRenderer::new(&session, settings.sleep_after_ready);
            info!("Rendering PDFs with the {} backend", renderer.name());
            run_books(&Exporter::new(source, renderer, &settings), &jobs).await
        }
    };

    session.close().await;
    summary.report("EXPORT SUMMARY", "generated");
    Ok(())
}

async fn warm(target: TargetArgs, settings: WarmSettings) -> Result<()> {
    let resource = target.resource();
    let selection = resolve_selection(&target, &resource).await?;
    let jobs = build_jobs(&resource, &selection, Path::new("."), &[]);

    let session = BrowserSession::launch(&target.browser_settings()).await?;
    let summary = run_books(&CacheWarmer::new(&session, &settings), &jobs).await;

    session.close().await;
    summary.report("LOAD SUMMARY", "loaded");
    Ok(())
}

fn rename_directories(directories: &[PathBuf], execute: bool, recursive: bool) -> Result<()> {
    if !execute {
        info!("{}", "DRY RUN MODE - no files will be renamed".yellow());
        info!("Use --execute to actually rename files");
    }

    let mut total = RenameStats::default();
    for dir in directories {
        if !dir.exists() {
            error!("Directory not found: {}", dir.display());
            continue;
        }
        if !dir.is_dir() {
            error!("Not a directory: {}", dir.display());
            continue;
        }

        info!("Processing: {}", dir.display().to_string().green());
        let stats = rename::process_directory(dir, !execute, recursive)?;
        info!("Summary for {}: renamed {}, skipped {}", dir.display(), stats.renamed, stats.skipped);
        total += stats;
    }

    info!("{}", "=".repeat(60));
    info!("TOTAL: {} renamed, {} skipped", total.renamed, total.skipped);
    if !execute && total.renamed > 0 {
        warn!("Re-run with --execute to perform the renames");
    }
    Ok(())
}

/// Default directives first, then `RUST_LOG`, so the user's directives win.
fn log_directives(verbose: bool, rust_log: &str) -> String {
    let level = if verbose { "debug" } else { "info" };
    // Keep chromiumoxide's websocket noise out of the output
    let mut directives = format!(
        "chromiumoxide::conn=off,chromiumoxide::handler=off,preview2pdf={}",
        level
    );
    if !rust_log.trim().is_empty() {
        directives.push(',');
        directives.push_str(rust_log.trim());
    }
    directives
}

fn log_filter(verbose: bool) -> EnvFilter {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_default();
    EnvFilter::builder().parse_lossy(log_directives(verbose, &rust_log))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(log_filter(args.verbose))
        .init();

    let result = match args.command {
        Commands::Render {
            target,
            output_dir,
            navigation_timeout,
            navigation_per_verse,
            render_timeout,
            render_per_verse,
            sleep_after_ready,
            page,
            force,
            backend,
        } => {
            let settings = RenderSettings {
                base_url: target.base_url.clone(),
                output_dir,
                page_sizes: page.map_or_else(|| PageSize::ALL.to_vec(), |size| vec![size]),
                navigation: TimeoutRule::new(navigation_timeout, navigation_per_verse),
                render: TimeoutRule::new(render_timeout, render_per_verse),
                sleep_after_ready: Duration::from_secs_f64(sleep_after_ready),
                backend,
                force,
            };
            render(target, settings).await
        }
        Commands::Warm {
            target,
            navigation_timeout,
            navigation_per_verse,
            cache_timeout,
            cache_per_verse,
        } => {
            let settings = WarmSettings {
                base_url: target.base_url.clone(),
                cache_url: CACHE_HTML_URL.to_string(),
                navigation: TimeoutRule::new(navigation_timeout, navigation_per_verse),
                cache: TimeoutRule::new(cache_timeout, cache_per_verse),
            };
            warm(target, settings).await
        }
        Commands::Rename {
            directories,
            execute,
            recursive,
        } => rename_directories(&directories, execute, recursive),
        Commands::Books => {
            books::print_available_books();
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_comes_after_defaults() {
        assert_eq!(
            log_directives(false, ""),
            "chromiumoxide::conn=off,chromiumoxide::handler=off,preview2pdf=info"
        );

        let directives = log_directives(true, "preview2pdf=trace");
        assert!(directives.ends_with(",preview2pdf=trace"));
        assert!(directives.contains("preview2pdf=debug,"));
    }

    #[test]
    fn user_level_overrides_default() {
        let filter = EnvFilter::builder().parse_lossy(log_directives(false, "preview2pdf=trace"));
        assert!(filter.to_string().contains("preview2pdf=trace"));
        assert!(!filter.to_string().contains("preview2pdf=info"));
    }
}
