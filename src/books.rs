//! Static Bible book table and book selection.
//!
//! Canonical numbers follow the usual USFM ordering, which leaves 40 unused
//! between Malachi and Matthew. They are only used for file name ordering.

use colored::*;
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Testament {
    Old,
    New,
}

impl fmt::Display for Testament {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Testament::Old => f.write_str("Old Testament"),
            Testament::New => f.write_str("New Testament"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookInfo {
    pub code: &'static str,
    pub title: &'static str,
    pub testament: Testament,
    pub verse_count: u32,
    pub number: u8,
}

const fn book(
    code: &'static str,
    title: &'static str,
    testament: Testament,
    verse_count: u32,
    number: u8,
) -> BookInfo {
    BookInfo {
        code,
        title,
        testament,
        verse_count,
        number,
    }
}

use Testament::{New, Old};

pub static BOOKS: &[BookInfo] = &[
    book("gen", "Genesis", Old, 1533, 1),
    book("exo", "Exodus", Old, 1213, 2),
    book("lev", "Leviticus", Old, 859, 3),
    book("num", "Numbers", Old, 1288, 4),
    book("deu", "Deuteronomy", Old, 959, 5),
    book("jos", "Joshua", Old, 658, 6),
    book("jdg", "Judges", Old, 618, 7),
    book("rut", "Ruth", Old, 85, 8),
    book("1sa", "1 Samuel", Old, 810, 9),
    book("2sa", "2 Samuel", Old, 695, 10),
    book("1ki", "1 Kings", Old, 816, 11),
    book("2ki", "2 Kings", Old, 719, 12),
    book("1ch", "1 Chronicles", Old, 942, 13),
    book("2ch", "2 Chronicles", Old, 822, 14),
    book("ezr", "Ezra", Old, 280, 15),
    book("neh", "Nehemiah", Old, 406, 16),
    book("est", "Esther", Old, 167, 17),
    book("job", "Job", Old, 1070, 18),
    book("psa", "Psalms", Old, 2461, 19),
    book("pro", "Proverbs", Old, 915, 20),
    book("ecc", "Ecclesiastes", Old, 222, 21),
    book("sng", "Song of Songs", Old, 117, 22),
    book("isa", "Isaiah", Old, 1292, 23),
    book("jer", "Jeremiah", Old, 1364, 24),
    book("lam", "Lamentations", Old, 154, 25),
    book("ezk", "Ezekiel", Old, 1273, 26),
    book("dan", "Daniel", Old, 357, 27),
    book("hos", "Hosea", Old, 197, 28),
    book("jol", "Joel", Old, 73, 29),
    book("amo", "Amos", Old, 146, 30),
    book("oba", "Obadiah", Old, 21, 31),
    book("jon", "Jonah", Old, 48, 32),
    book("mic", "Micah", Old, 105, 33),
    book("nam", "Nahum", Old, 47, 34),
    book("hab", "Habakkuk", Old, 56, 35),
    book("zep", "Zephaniah", Old, 53, 36),
    book("hag", "Haggai", Old, 38, 37),
    book("zec", "Zechariah", Old, 211, 38),
    book("mal", "Malachi", Old, 55, 39),
    book("mat", "Matthew", New, 1071, 41),
    book("mrk", "Mark", New, 678, 42),
    book("luk", "Luke", New, 1151, 43),
    book("jhn", "John", New, 879, 44),
    book("act", "Acts", New, 1007, 45),
    book("rom", "Romans", New, 433, 46),
    book("1co", "1 Corinthians", New, 437, 47),
    book("2co", "2 Corinthians", New, 257, 48),
    book("gal", "Galatians", New, 149, 49),
    book("eph", "Ephesians", New, 155, 50),
    book("php", "Philippians", New, 104, 51),
    book("col", "Colossians", New, 95, 52),
    book("1th", "1 Thessalonians", New, 89, 53),
    book("2th", "2 Thessalonians", New, 47, 54),
    book("1ti", "1 Timothy", New, 113, 55),
    book("2ti", "2 Timothy", New, 83, 56),
    book("tit", "Titus", New, 46, 57),
    book("phm", "Philemon", New, 25, 58),
    book("heb", "Hebrews", New, 303, 59),
    book("jas", "James", New, 108, 60),
    book("1pe", "1 Peter", New, 105, 61),
    book("2pe", "2 Peter", New, 61, 62),
    book("1jn", "1 John", New, 105, 63),
    book("2jn", "2 John", New, 13, 64),
    book("3jn", "3 John", New, 15, 65),
    book("jud", "Jude", New, 25, 66),
    book("rev", "Revelation", New, 404, 67),
];

/// Books exported when `--books` is not given.
pub const DEFAULT_BOOKS: &[&str] = &["gen", "exo", "lev", "num", "deu"];

/// Case-insensitive lookup by 3-letter code.
pub fn lookup(code: &str) -> Option<&'static BookInfo> {
    let code = code.trim();
    BOOKS.iter().find(|b| b.code.eq_ignore_ascii_case(code))
}

pub fn testament_codes(testament: Testament) -> impl Iterator<Item = &'static str> {
    BOOKS
        .iter()
        .filter(move |b| b.testament == testament)
        .map(|b| b.code)
}

pub fn all_codes() -> impl Iterator<Item = &'static str> {
    BOOKS.iter().map(|b| b.code)
}

/// Parsed form of the `--books` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookRequest {
    /// Whatever the catalog entry publishes.
    All,
    Codes(Vec<&'static str>),
}

/// Expands `all`, `ot` and `nt` shortcuts and validates explicit codes.
///
/// `all` wins as soon as it is seen. Everything else is deduplicated keeping
/// the first occurrence.
pub fn expand_book_arguments<S: AsRef<str>>(values: &[S]) -> Result<BookRequest> {
    let mut requested: Vec<&'static str> = Vec::new();

    for value in values {
        let token = value.as_ref().trim().to_lowercase();
        match token.as_str() {
            "" => continue,
            "all" => return Ok(BookRequest::All),
            "ot" => requested.extend(testament_codes(Testament::Old)),
            "nt" => requested.extend(testament_codes(Testament::New)),
            other => {
                let info =
                    lookup(other).ok_or_else(|| Error::UnknownBook(value.as_ref().to_string()))?;
                requested.push(info.code);
            }
        }
    }

    let mut seen = HashSet::new();
    requested.retain(|code| seen.insert(*code));

    if requested.is_empty() {
        return Err(Error::NoBooks);
    }

    Ok(BookRequest::Codes(requested))
}

/// The books one run will process. `None` stands for a bookless resource
/// (translation academy, word lists, ...) handled as a single job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSelection {
    books: Vec<Option<&'static str>>,
    missing: Vec<&'static str>,
}

impl BookSelection {
    /// Intersects the request with what the catalog entry actually offers.
    pub fn resolve(request: &BookRequest, available: &[&'static str]) -> Self {
        if available.is_empty() {
            return Self {
                books: vec![None],
                missing: Vec::new(),
            };
        }

        match request {
            BookRequest::All => Self {
                books: available.iter().map(|code| Some(*code)).collect(),
                missing: Vec::new(),
            },
            BookRequest::Codes(codes) => {
                let (present, missing): (Vec<_>, Vec<_>) =
                    codes.iter().copied().partition(|code| available.contains(code));
                Self {
                    books: present.into_iter().map(Some).collect(),
                    missing,
                }
            }
        }
    }

    pub fn books(&self) -> &[Option<&'static str>] {
        &self.books
    }

    /// Requested codes the catalog entry does not publish.
    pub fn missing(&self) -> &[&'static str] {
        &self.missing
    }

    pub fn is_bookless(&self) -> bool {
        matches!(self.books.as_slice(), [None])
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn warn_missing(&self) {
        if self.missing.is_empty() {
            return;
        }
        let codes: Vec<String> = self.missing.iter().map(|c| c.to_uppercase()).collect();
        warn!(
            "Skipping {} unavailable book(s): {}",
            self.missing.len(),
            codes.join(", ").yellow()
        );
    }
}

pub fn print_available_books() {
    for testament in [Testament::Old, Testament::New] {
        println!("{}:", testament.to_string().bold());
        for info in BOOKS.iter().filter(|b| b.testament == testament) {
            println!("  {:<4} {}", info.code.to_uppercase(), info.title);
        }
    }
}
