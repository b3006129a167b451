//! Filename metadata codec.
//!
//! New-format task files carry their priority, creation date, and a title
//! slug in the basename:
//!
//! ```text
//! P<priority>--<YYYY-MM-DD>--<slug>.md
//! ```
//!
//! Any other `.md` basename is a legacy name whose metadata lives only in the
//! frontmatter. [`decode`] never fails on such names; it returns `None`.
//!
//! The date component is fixed width, so lexicographic order of names with
//! the same priority tracks creation order.
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use gitshelf_core::filename::{decode, encode};
//!
//! let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
//! let name = encode(2, date, "Renew  TLS certs");
//! assert_eq!(name, "P2--2024-03-09--renew-tls-certs.md");
//!
//! let meta = decode(&name).unwrap();
//! assert_eq!(meta.priority, 2);
//! assert_eq!(meta.title, "renew tls certs");
//! assert!(decode("notes from monday.md").is_none());
//! ```

use chrono::NaiveDate;

/// Most urgent priority.
pub const PRIORITY_MIN: u8 = 1;
/// Least urgent priority.
pub const PRIORITY_MAX: u8 = 5;
/// Priority assigned when none is given.
pub const DEFAULT_PRIORITY: u8 = 3;

const EXTENSION: &str = ".md";
const SEPARATOR: &str = "--";
const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_LEN: usize = 10;

/// Metadata recovered from a new-format filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameMetadata {
    pub priority: u8,
    pub date: NaiveDate,
    /// Slug exactly as it appears in the filename.
    pub slug: String,
    /// Slug with hyphens turned back into spaces. Case is not recoverable.
    pub title: String,
}

/// Encode priority, date, and title into a new-format filename.
///
/// Priorities outside `PRIORITY_MIN..=PRIORITY_MAX` are clamped so the result
/// always decodes.
pub fn encode(priority: u8, date: NaiveDate, title: &str) -> String {
    let priority = priority.clamp(PRIORITY_MIN, PRIORITY_MAX);
    format!(
        "P{}{sep}{}{sep}{}{}",
        priority,
        date.format(DATE_FORMAT),
        slugify(title),
        EXTENSION,
        sep = SEPARATOR
    )
}

/// Decode a filename (or a path; only the basename is inspected).
///
/// Returns `None` for anything that is not a new-format name.
pub fn decode(name: &str) -> Option<FilenameMetadata> {
    let stem = basename(name).strip_suffix(EXTENSION)?;
    let mut parts = stem.splitn(3, SEPARATOR);

    let priority = parse_priority(parts.next()?)?;
    let date = parse_date(parts.next()?)?;
    let slug = parts.next()?;
    if slug.is_empty() {
        return None;
    }

    Some(FilenameMetadata {
        priority,
        date,
        slug: slug.to_string(),
        title: slug.replace('-', " "),
    })
}

/// Whether `name` follows the new filename format.
pub fn is_new_format(name: &str) -> bool {
    decode(name).is_some()
}

/// Lowercase the title and join its words with single hyphens.
///
/// Alphanumeric characters (any script) are kept, whitespace, hyphens and
/// underscores separate words, and all other punctuation is dropped. An
/// empty result becomes `untitled`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;

    for c in title.chars() {
        if c.is_whitespace() || c == '-' || c == '_' {
            pending_separator = true;
        } else if c.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.extend(c.to_lowercase());
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Final path component of `path`.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Basename of `path` without its `.md` extension.
pub fn stem(path: &str) -> &str {
    let name = basename(path);
    name.strip_suffix(EXTENSION).unwrap_or(name)
}

fn parse_priority(part: &str) -> Option<u8> {
    let digits = part.strip_prefix('P')?;
    // `encode` never zero-pads.
    if digits.is_empty()
        || digits.starts_with('0')
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let priority: u8 = digits.parse().ok()?;
    (PRIORITY_MIN..=PRIORITY_MAX)
        .contains(&priority)
        .then_some(priority)
}

fn parse_date(part: &str) -> Option<NaiveDate> {
    if part.len() != DATE_LEN {
        return None;
    }
    NaiveDate::parse_from_str(part, DATE_FORMAT).ok()
}
