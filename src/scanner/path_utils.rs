//! Path and name helpers used when materializing queue rows.
//!
//! # Overview
//!
//! - [`folder_path`]: the folder a file was dropped from, always rooted at `/`
//! - [`file_extension`]: lower-cased text after the last `.`
//! - [`is_unsupported`]: extension check against a configurable deny list
//! - [`locale_cmp`]: case-folded ordering used for folder and name sorting
//! - [`folders_related`]: identical or suffix-related folder paths
//!
//! Names are normalized to NFC so that a file dropped from an NFD filesystem
//! (macOS) produces the same metadata digest as the same name elsewhere.
//!
//! # Example
//!
//! ```
//! use queuedupe::scanner::path_utils::{file_extension, folder_path};
//!
//! assert_eq!(folder_path("matters/smith/brief.pdf"), "/matters/smith");
//! assert_eq!(folder_path("brief.pdf"), "/");
//! assert_eq!(file_extension("Brief.PDF"), "pdf");
//! ```

use std::cmp::Ordering;
use std::path::{Component, Path};

use unicode_normalization::UnicodeNormalization;

/// Extensions that are never uploaded or hashed.
pub const DEFAULT_UNSUPPORTED_EXTENSIONS: &[&str] = &["lnk", "tmp"];

/// Normalize a string to NFC (Composed) form.
#[must_use]
pub fn normalize_path_str(s: &str) -> String {
    s.nfc().collect()
}

/// Render a relative path with `/` separators, NFC-normalized.
#[must_use]
pub fn to_slash_path(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(normalize_path_str(&part.to_string_lossy())),
            _ => None,
        })
        .collect();
    parts.join("/")
}

/// Folder portion of a relative path.
///
/// The file name is dropped and the remainder is prefixed with `/`. Files
/// without a folder component live at `/`.
///
/// # Arguments
///
/// * `relative_path` - Path relative to the drop root, `/` separated
#[must_use]
pub fn folder_path(relative_path: &str) -> String {
    let trimmed = relative_path.trim_matches('/');
    match trimmed.rfind('/') {
        Some(idx) if idx > 0 => format!("/{}", &trimmed[..idx]),
        _ => "/".to_string(),
    }
}

/// Lower-cased extension without the dot, or an empty string.
#[must_use]
pub fn file_extension(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) => name[idx + 1..].to_lowercase(),
        None => String::new(),
    }
}

/// Check whether a file's last extension is on the deny list.
///
/// Comparison is case-insensitive; entries may be written with or without
/// a leading dot.
#[must_use]
pub fn is_unsupported<S: AsRef<str>>(name: &str, unsupported: &[S]) -> bool {
    let ext = file_extension(name);
    if ext.is_empty() {
        return false;
    }
    unsupported
        .iter()
        .any(|u| u.as_ref().trim_start_matches('.').eq_ignore_ascii_case(&ext))
}

/// Case-folded comparison with a case-sensitive tiebreak.
///
/// Gives the "a < B < c" ordering users expect from file managers while
/// staying total and deterministic.
#[must_use]
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}

/// Folder paths that are identical, or where one ends with the other.
///
/// Used by the prefilter to decide that two same-name, same-date files are
/// the same document re-dropped from a parent or child folder.
#[must_use]
pub fn folders_related(a: &str, b: &str) -> bool {
    a == b || a.ends_with(b) || b.ends_with(a)
}
