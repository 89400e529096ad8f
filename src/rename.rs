//! Filename rules
//!
//! A renaming rule is a template with `$`-placeholders that is expanded
//! against a comic to produce the relative path of the comic file, or the
//! entry name of a page.
//!
//! ## Placeholders
//!
//! | Placeholder | Value | Fallback |
//! |---|---|---|
//! | `$PUBLISHER` | publisher | `Unknown` |
//! | `$IMPRINT` | imprint | `Unknown` |
//! | `$SERIES` | series | `Unknown` |
//! | `$VOLUME` | volume | `Unknown` |
//! | `$ISSUE` | issue number | `Unknown` |
//! | `$ISSUE(n)` | issue number left-padded with `0` to `n` characters, `n` up to 255 | `Unknown` |
//! | `$TITLE` | title | `Unknown` |
//! | `$COVERDATE` | cover date as `Mar 2020` | `No Cover Date` |
//! | `$PUBYEAR` | cover year | `Unknown` |
//! | `$PUBMONTH` | two digit cover month | `Unknown` |
//! | `$PAGE` | page position, pages only | |
//!
//! ## Usage
//!
//! ```rust
//! use std::path::{Path, PathBuf};
//! use lib_comic::{rename::RenamingRule, types::{ArchiveFormat, Comic}};
//!
//! let mut comic = Comic::new("/inbox/foo.cbz", ArchiveFormat::Zip);
//! comic.metadata.series = "Foo".to_string();
//! comic.metadata.issue_number = "7".to_string();
//!
//! let rule = RenamingRule::new("$SERIES/$SERIES #$ISSUE(3)");
//! let path = rule.expand(&comic, Path::new("/library"));
//! assert_eq!(path, PathBuf::from("/library/Foo/Foo #007"));
//! ```

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use chrono::Datelike;
use log::warn;
use regex::{Captures, Regex};

use crate::{
    types::Comic,
    utils::{NormalizeWhitespace, normalize_path},
};

const UNKNOWN_VALUE: &str = "Unknown";
const NO_COVER_DATE: &str = "No Cover Date";
const PAGE_PLACEHOLDER: &str = "$PAGE";

/// Widest padding applied by `$ISSUE(n)`, larger widths leave the issue unpadded
const MAX_ISSUE_WIDTH: usize = 255;

/// Characters removed from the raw template
const FORBIDDEN_RULE_CHARACTERS: &[char] = &['"', '\'', ':', '*', '?', '|', '<', '>'];

/// Characters replaced with `_` in the leaf component of an expanded rule
const FORBIDDEN_NAME_CHARACTERS: &[char] =
    &['"', '\'', ':', '*', '?', '|', '<', '>', '/', '\\'];

/// The padded issue form comes first so that it wins over the bare `$ISSUE`
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$(?:ISSUE\((?P<width>\d+)\)|(?P<name>PUBLISHER|IMPRINT|SERIES|VOLUME|ISSUE|TITLE|COVERDATE|PUBYEAR|PUBMONTH))",
    )
    .expect("placeholder pattern is valid")
});

/// A filename template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamingRule {
    template: String,
}

impl RenamingRule {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_empty(&self) -> bool {
        self.template.trim().is_empty()
    }

    /// Expands the rule into the path of a comic file, without extension
    ///
    /// The expanded text is split into a directory part and a leaf name.
    /// Only the leaf is sanitized; the directory part keeps its separators.
    /// Both are joined below `target_dir` and lexically normalized.
    ///
    /// An empty rule returns `target_dir` joined with the unchanged file name
    /// of the comic, extension included.
    pub fn expand(&self, comic: &Comic, target_dir: &Path) -> PathBuf {
        if self.is_empty() {
            let name = comic.filename.file_name().unwrap_or_default();
            return target_dir.join(name);
        }

        let expanded = self.substitute(comic);
        let (directory, leaf) = match expanded.rfind(['/', '\\']) {
            Some(position) => (&expanded[..position], &expanded[position + 1..]),
            None => ("", expanded.as_str()),
        };
        let directory = directory.trim_start_matches(['/', '\\']);

        normalize_path(target_dir.join(directory).join(sanitize_name(leaf)))
    }

    /// Expands the rule into the entry name of a page
    ///
    /// `$PAGE` is replaced by the 1-based page position, left-padded with `0`
    /// to the number of digits of `total_pages`; without `$PAGE` the padded
    /// position is appended. The extension of `original_name` is kept.
    ///
    /// # Parameters
    /// - `comic`: The comic the page belongs to
    /// - `index`: Zero-based position of the page among the written pages
    /// - `total_pages`: Number of written pages
    /// - `original_name`: Current entry name of the page
    pub fn expand_page(
        &self,
        comic: &Comic,
        index: usize,
        total_pages: usize,
        original_name: &str,
    ) -> String {
        if self.is_empty() {
            return original_name.to_string();
        }

        let width = total_pages.max(1).to_string().len();
        let position = format!("{:0width$}", index + 1, width = width);

        let expanded = self.substitute(comic);
        let expanded = if expanded.contains(PAGE_PLACEHOLDER) {
            expanded.replace(PAGE_PLACEHOLDER, &position)
        } else {
            format!("{}{}", expanded, position)
        };

        let name = sanitize_name(&expanded);
        match Path::new(original_name).extension() {
            Some(extension) => format!("{}.{}", name, extension.to_string_lossy()),
            None => name,
        }
    }

    /// Strips forbidden characters from the template and substitutes the comic placeholders
    pub fn substitute(&self, comic: &Comic) -> String {
        let template = self
            .template
            .replace(FORBIDDEN_RULE_CHARACTERS, "");

        PLACEHOLDER
            .replace_all(&template, |captures: &Captures| {
                placeholder_value(comic, captures)
            })
            .to_string()
    }
}

fn placeholder_value(comic: &Comic, captures: &Captures) -> String {
    let metadata = &comic.metadata;

    if let Some(width) = captures.name("width") {
        if metadata.issue_number.trim().is_empty() {
            return UNKNOWN_VALUE.to_string();
        }

        let issue = scrub_value(&metadata.issue_number);
        return match width.as_str().parse::<usize>() {
            Ok(width) if width <= MAX_ISSUE_WIDTH => {
                format!("{:0>width$}", issue, width = width)
            }
            _ => {
                warn!(
                    "Padding width of {} is above {}, leaving the issue unpadded",
                    &captures[0], MAX_ISSUE_WIDTH
                );
                issue
            }
        };
    }

    let name = captures.name("name").map(|m| m.as_str()).unwrap_or_default();
    match name {
        "PUBLISHER" => value_or_unknown(&metadata.publisher),
        "IMPRINT" => value_or_unknown(&metadata.imprint),
        "SERIES" => value_or_unknown(&metadata.series),
        "VOLUME" => value_or_unknown(&metadata.volume),
        "ISSUE" => value_or_unknown(&metadata.issue_number),
        "TITLE" => value_or_unknown(&metadata.title),
        "COVERDATE" => match metadata.cover_date {
            Some(date) => date.format("%b %Y").to_string(),
            None => NO_COVER_DATE.to_string(),
        },
        "PUBYEAR" => match metadata.cover_date {
            Some(date) => date.year().to_string(),
            None => UNKNOWN_VALUE.to_string(),
        },
        "PUBMONTH" => match metadata.cover_date {
            Some(date) => format!("{:02}", date.month()),
            None => UNKNOWN_VALUE.to_string(),
        },
        _ => captures[0].to_string(),
    }
}

fn value_or_unknown(value: &str) -> String {
    if value.trim().is_empty() {
        UNKNOWN_VALUE.to_string()
    } else {
        scrub_value(value)
    }
}

/// Field values never introduce directories
fn scrub_value(value: &str) -> String {
    value.trim().replace(['/', '\\'], "_")
}

fn sanitize_name(name: &str) -> String {
    name.replace(FORBIDDEN_NAME_CHARACTERS, "_")
        .normalize_whitespace()
}
