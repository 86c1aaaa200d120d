//! # preview2pdf
//!
//! CLI utility to export Door43 print previews to PDF, one file per Bible book
//! and page size.
//!
//! ## Features
//!
//! - Book selection by code, testament shortcut or everything a catalog entry publishes
//! - PDF conversion inside Chromium (Paged.js) or with WeasyPrint
//! - A4 and Letter output from a single downloaded document
//! - Cache warming for the preview site
//! - Renaming of exports made with the old naming scheme
//!
//! ## Usage
//!
//! ```bash
//! preview2pdf render --repo en_tn --ref v87 --books nt --backend server
//! preview2pdf warm --repo en_ult --books all
//! preview2pdf rename en_tn_v87 --execute
//! ```

pub mod books;
pub mod browser;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod fsutil;
pub mod job;
pub mod letter;
pub mod readiness;
pub mod render;
pub mod rename;
pub mod runner;
pub mod timeout;
pub mod warm;

pub use books::{BookInfo, BookRequest, BookSelection};
pub use browser::BrowserSession;
pub use catalog::CatalogClient;
pub use config::{Backend, RenderSettings, Resource, WarmSettings};
pub use error::{Error, Result};
pub use export::{Exporter, HtmlSource, PreviewDownloader};
pub use job::{ExportJob, PageSize};
pub use render::{BrowserRenderer, PdfRenderer, ServerRenderer};
pub use runner::{run_books, BookTask, RunSummary};
pub use warm::CacheWarmer;
