//! Comic library
//!
//! A Rust library for reading, rewriting and converting comic book archives.
//!
//! Comic books are distributed as archives of page images, optionally with a
//! `ComicInfo.xml` metadata sidecar. This library reads such archives in the
//! ZIP (`.cbz`), 7z (`.cb7`) and RAR (`.cbr`) formats behind one adaptor
//! contract, decodes and encodes the metadata sidecar, expands filename rules,
//! and converts a comic from one container format to another.
//!
//! ## Features
//!
//! - One read/write contract for every container format; RAR is read-only.
//! - Damaged pages are replaced with a placeholder image instead of failing
//!   the whole archive.
//! - `ComicInfo.xml` decoding and encoding, including credits and cover dates.
//! - Filename rules with `$SERIES`, `$ISSUE(3)` and similar placeholders.
//! - Format conversion that only replaces the original once the new archive
//!   is in place.
//!
//! ## Quick Start
//!
//! ### Read a comic
//!
//! ```rust, no_run
//! # use lib_comic::convert::load_comic;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let comic = load_comic("path/to/comic.cbz")?;
//!
//! println!("Series: {}", comic.metadata.series);
//! println!("Pages: {}", comic.pages.len());
//! # Ok(())
//! # }
//! ```
//!
//! ### Convert a comic
//!
//! ```rust, no_run
//! # use lib_comic::{convert::{ConvertOptions, convert, load_comic}, types::ArchiveFormat};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut comic = load_comic("path/to/comic.cbr")?;
//!
//! let mut options = ConvertOptions::new(ArchiveFormat::Zip);
//! options.set_drop_deleted(true);
//! convert(&mut comic, &options)?;
//!
//! println!("Written to {}", comic.filename.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `rar` (default): Enable `lib_comic::archive::cbr`, the RAR-style adaptor.
//!   It links the `unrar` library; without this feature the registry has no
//!   adaptor for RAR and looking one up fails with `UnsupportedFormat`.

pub(crate) mod utils;

pub mod archive;
pub mod classify;
pub mod convert;
pub mod error;
pub mod fs;
pub mod registry;
pub mod rename;
pub mod sidecar;
pub mod types;

pub use utils::{DecodeBytes, sha1_hex};
