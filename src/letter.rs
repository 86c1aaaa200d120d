use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::Result;

fn a4_size_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)(size:\s*)210mm\s+297mm;").expect("valid regex"))
}

/// Rewrites the first A4 `@page` size declaration to `letter`.
///
/// Returns the content and whether a declaration was found. When none is
/// found the content is returned as is.
pub fn to_letter(content: &str) -> (String, bool) {
    let pattern = a4_size_pattern();
    if !pattern.is_match(content) {
        return (content.to_string(), false);
    }
    (pattern.replacen(content, 1, "${1}letter;").into_owned(), true)
}

/// Writes the LETTER variant of an A4 printable HTML file.
pub async fn create_letter_variant(source: &Path, destination: &Path) -> Result<()> {
    debug!("Creating Letter-sized HTML {}", destination.display());
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }

    let content = fs::read_to_string(source).await?;
    let (updated, replaced) = to_letter(&content);
    if !replaced {
        warn!(
            "Could not find A4 size declaration in {}; writing unmodified content for Letter variant",
            source.display()
        );
    }

    crate::fsutil::write_atomic(destination, updated.as_bytes()).await
}
