use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

use crate::books::{self, BookInfo};
use crate::config::Resource;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageSize {
    A4,
    Letter,
}

impl PageSize {
    pub const ALL: [PageSize; 2] = [PageSize::A4, PageSize::Letter];

    /// Label used in file names and logs.
    pub fn label(self) -> &'static str {
        match self {
            PageSize::A4 => "A4",
            PageSize::Letter => "LETTER",
        }
    }

    /// Value for a CSS `@page { size: ... }` declaration.
    pub fn css_size(self) -> &'static str {
        match self {
            PageSize::A4 => "A4",
            PageSize::Letter => "letter",
        }
    }

    /// Paper width and height in inches.
    pub fn paper_inches(self) -> (f64, f64) {
        match self {
            PageSize::A4 => (8.27, 11.69),
            PageSize::Letter => (8.5, 11.0),
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PageSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A4" => Ok(PageSize::A4),
            "LETTER" => Ok(PageSize::Letter),
            _ => Err(Error::InvalidPageSize(s.to_string())),
        }
    }
}

/// Preview page for a resource, optionally scoped to one book.
pub fn build_url(
    base_url: &str,
    resource: &Resource,
    book: Option<&str>,
    rerender: bool,
) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!(
        "{}/u/{}/{}/{}/",
        base_url.trim_end_matches('/'),
        resource.owner,
        resource.repo,
        resource.reference
    ))?;

    if book.is_some() || rerender {
        let mut query = url.query_pairs_mut();
        if let Some(code) = book {
            query.append_pair("book", code);
        }
        if rerender {
            query.append_pair("rerender", "1");
        }
    }

    Ok(url)
}

/// File name prefix: `<repo>_<NN>-<BOOK>_<ref>`, or `<repo>_<ref>` without a
/// book. Example: `en_tn_01-GEN_v87`.
pub fn build_output_prefix(_owner: &str, repo: &str, reference: &str, book: Option<&str>) -> String {
    match book {
        None => format!("{}_{}", repo, reference),
        Some(code) => {
            let number = books::lookup(code).map(|b| b.number).unwrap_or(0);
            format!("{}_{:02}-{}_{}", repo, number, code.to_uppercase(), reference)
        }
    }
}

/// One unit of work: a single book (or the whole bookless resource).
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub resource: Resource,
    pub book: Option<&'static BookInfo>,
    pub prefix: String,
    pub page_sizes: Vec<PageSize>,
    output_dir: PathBuf,
}

impl ExportJob {
    pub fn new(
        resource: &Resource,
        book: Option<&'static BookInfo>,
        output_dir: &Path,
        page_sizes: &[PageSize],
    ) -> Self {
        let prefix = build_output_prefix(
            &resource.owner,
            &resource.repo,
            &resource.reference,
            book.map(|b| b.code),
        );
        Self {
            resource: resource.clone(),
            book,
            prefix,
            page_sizes: page_sizes.to_vec(),
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn book_code(&self) -> Option<&'static str> {
        self.book.map(|b| b.code)
    }

    /// Uppercased book code, or the repo name for bookless jobs.
    pub fn display_name(&self) -> String {
        match self.book {
            Some(info) => info.code.to_uppercase(),
            None => self.resource.repo.to_uppercase(),
        }
    }

    pub fn html_path(&self, size: PageSize) -> PathBuf {
        self.output_dir.join(format!("{}_{}.html", self.prefix, size.label()))
    }

    pub fn pdf_path(&self, size: PageSize) -> PathBuf {
        self.output_dir.join(format!("{}_{}.pdf", self.prefix, size.label()))
    }

    pub fn url(&self, base_url: &str, rerender: bool) -> Result<Url, url::ParseError> {
        build_url(base_url, &self.resource, self.book_code(), rerender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(repo: &str) -> Resource {
        Resource {
            owner: "unfoldingWord".into(),
            repo: repo.into(),
            reference: "v87".into(),
        }
    }

    #[test]
    fn prefix_with_book() {
        assert_eq!(build_output_prefix("uW", "en_tn", "v87", Some("act")), "en_tn_45-ACT_v87");
        assert_eq!(build_output_prefix("uW", "en_ult", "v86", Some("gen")), "en_ult_01-GEN_v86");
    }

    #[test]
    fn prefix_without_book() {
        assert_eq!(build_output_prefix("uW", "en_ta", "v87", None), "en_ta_v87");
    }

    #[test]
    fn preview_urls() {
        let res = resource("en_tn");
        let base = "https://preview.door43.org/";
        assert_eq!(
            build_url(base, &res, None, false).unwrap().as_str(),
            "https://preview.door43.org/u/unfoldingWord/en_tn/v87/"
        );
        assert_eq!(
            build_url(base, &res, Some("gen"), false).unwrap().as_str(),
            "https://preview.door43.org/u/unfoldingWord/en_tn/v87/?book=gen"
        );
        assert_eq!(
            build_url(base, &res, Some("gen"), true).unwrap().as_str(),
            "https://preview.door43.org/u/unfoldingWord/en_tn/v87/?book=gen&rerender=1"
        );
        assert_eq!(
            build_url(base, &res, None, true).unwrap().as_str(),
            "https://preview.door43.org/u/unfoldingWord/en_tn/v87/?rerender=1"
        );
    }

    #[test]
    fn page_size_parsing() {
        assert_eq!("letter".parse::<PageSize>().unwrap(), PageSize::Letter);
        assert_eq!(" a4 ".parse::<PageSize>().unwrap(), PageSize::A4);
        assert!(matches!("B5".parse::<PageSize>(), Err(Error::InvalidPageSize(_))));
    }

    #[test]
    fn job_paths_and_names() {
        let job = ExportJob::new(
            &resource("en_tn"),
            books::lookup("act"),
            Path::new("out"),
            &PageSize::ALL,
        );
        assert_eq!(job.display_name(), "ACT");
        assert_eq!(job.html_path(PageSize::A4), Path::new("out/en_tn_45-ACT_v87_A4.html"));
        assert_eq!(job.pdf_path(PageSize::Letter), Path::new("out/en_tn_45-ACT_v87_LETTER.pdf"));

        let bookless = ExportJob::new(&resource("en_ta"), None, Path::new("out"), &[PageSize::A4]);
        assert_eq!(bookless.display_name(), "EN_TA");
        assert_eq!(bookless.pdf_path(PageSize::A4), Path::new("out/en_ta_v87_A4.pdf"));
    }
}
