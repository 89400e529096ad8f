//! Comic conversion
//!
//! Rewrites a comic into another container format. The metadata sidecar is
//! written first, then every page in its current order, optionally renamed.
//! The new archive is built in a temporary file next to the original and
//! only moved into place once it is complete.
//!
//! ## Replacement order
//!
//! The temporary archive is moved to its destination before the original is
//! removed. If the move fails, the original stays untouched and the temporary
//! archive is deleted; if the removal of the original fails after a
//! successful move, the conversion still succeeds and a warning is logged.
//!
//! ## Usage
//!
//! ```rust, no_run
//! # fn main() -> Result<(), lib_comic::error::ComicError> {
//! use lib_comic::{
//!     convert::{ConvertOptions, convert, load_comic},
//!     types::ArchiveFormat,
//! };
//!
//! let mut comic = load_comic("library/Foo 007.cbr")?;
//!
//! let mut options = ConvertOptions::new(ArchiveFormat::Zip);
//! options
//!     .set_drop_deleted(true)
//!     .set_page_renaming_rule("$SERIES $ISSUE(3) - $PAGE");
//!
//! convert(&mut comic, &options)?;
//! assert_eq!(comic.format, ArchiveFormat::Zip);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::{
    archive::{ArchiveReader, ArchiveWriter},
    classify::SIDECAR_NAME,
    error::ComicError,
    fs::{FileSystem, LocalFileSystem, find_available_filename},
    registry::{FormatRegistry, detect_format},
    rename::RenamingRule,
    sidecar,
    types::{ArchiveFormat, Comic, EntryKind, Page},
    utils::{normalize_path, sha1_hex},
};

/// Steps of a conversion, in the order they are reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertState {
    Idle,
    SourceOpen,
    DestOpen,
    MetadataWritten,
    PagesWritten,
    HandlesClosed,
    FileReplaced,
    Done,
    Failed,
}

/// Settings of one conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// The container format to convert to
    pub target: ArchiveFormat,

    /// Whether pages flagged as deleted are dropped before writing
    pub drop_deleted: bool,

    /// Rule for the entry names of the written pages; pages keep their
    /// names when it is `None` or empty
    pub page_renaming_rule: Option<String>,
}

impl ConvertOptions {
    pub fn new(target: ArchiveFormat) -> Self {
        Self {
            target,
            drop_deleted: false,
            page_renaming_rule: None,
        }
    }

    pub fn set_drop_deleted(&mut self, drop_deleted: bool) -> &mut Self {
        self.drop_deleted = drop_deleted;
        self
    }

    pub fn set_page_renaming_rule(&mut self, rule: &str) -> &mut Self {
        self.page_renaming_rule = Some(rule.to_string());
        self
    }
}

/// Converts a comic with the global registry and the local filesystem
///
/// On success the comic points to its new file, carries the target format,
/// and its pages carry the names they were written under.
pub fn convert(comic: &mut Comic, options: &ConvertOptions) -> Result<(), ComicError> {
    convert_with(FormatRegistry::global(), &LocalFileSystem, comic, options)
}

/// Converts a comic with the given registry and filesystem
pub fn convert_with(
    registry: &FormatRegistry,
    fs: &dyn FileSystem,
    comic: &mut Comic,
    options: &ConvertOptions,
) -> Result<(), ComicError> {
    let mut conversion = Conversion {
        registry,
        fs,
        source: comic.filename.clone(),
        state: ConvertState::Idle,
    };

    match conversion.run(comic, options) {
        Ok(()) => {
            info!(
                "Converted {} to {}",
                conversion.source.display(),
                comic.filename.display()
            );
            Ok(())
        }
        Err(err) => {
            debug!(
                "Conversion of {} failed after {:?}",
                conversion.source.display(),
                conversion.state
            );
            conversion.advance(ConvertState::Failed);
            Err(err)
        }
    }
}

/// Loads a comic from a file with the global registry
pub fn load_comic<P: AsRef<Path>>(path: P) -> Result<Comic, ComicError> {
    load_comic_with(FormatRegistry::global(), path.as_ref())
}

/// Loads a comic from a file
///
/// The format is detected from the file signature. Every image entry becomes
/// a page, in container order, hashed with SHA-1. The metadata sidecar is
/// decoded when the container has one. Every entry is extracted once.
pub fn load_comic_with(registry: &FormatRegistry, path: &Path) -> Result<Comic, ComicError> {
    let format = detect_format(path)?;
    let mut reader = registry.get(format)?.open_for_read(path)?;

    let mut comic = Comic::new(path, format);
    let mut sidecar_loaded = false;
    reader.visit_entries(&mut |entry, data| {
        match entry.kind {
            EntryKind::Image => {
                comic.pages.push(Page::new(&entry.name, &sha1_hex(&data)));
            }
            EntryKind::Metadata if !sidecar_loaded => {
                comic.metadata = sidecar::decode(&data)?;
                sidecar_loaded = true;
            }
            _ => {}
        }
        Ok(())
    })?;

    reader.close()?;
    Ok(comic)
}

struct Conversion<'a> {
    registry: &'a FormatRegistry,
    fs: &'a dyn FileSystem,
    source: PathBuf,
    state: ConvertState,
}

impl Conversion<'_> {
    fn advance(&mut self, state: ConvertState) {
        debug!(
            "{}: {:?} -> {:?}",
            self.source.display(),
            self.state,
            state
        );
        self.state = state;
    }

    fn run(&mut self, comic: &mut Comic, options: &ConvertOptions) -> Result<(), ComicError> {
        let registry = self.registry;
        let source_adaptor = registry.get(comic.format)?;
        let dest_adaptor = registry.get(options.target)?;
        if !options.target.is_writable() {
            return Err(ComicError::WriteUnsupported {
                format: options.target.to_string(),
            });
        }

        if options.drop_deleted {
            comic.remove_deleted_pages();
        }

        let directory = match comic.filename.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut reader = source_adaptor.open_for_read(&comic.filename)?;
        self.advance(ConvertState::SourceOpen);

        let temp = self
            .fs
            .temp_file_near(&directory, options.target.extension())?;
        let writer = match dest_adaptor.open_for_write(&temp) {
            Ok(writer) => writer,
            Err(err) => {
                self.discard(&temp);
                return Err(err);
            }
        };
        self.advance(ConvertState::DestOpen);

        let page_names = match self.write_archive(comic, options, reader.as_mut(), writer) {
            Ok(names) => names,
            Err(err) => {
                self.discard(&temp);
                return Err(err);
            }
        };

        if let Err(err) = reader.close() {
            self.discard(&temp);
            return Err(err);
        }
        self.advance(ConvertState::HandlesClosed);

        let stem = comic
            .filename
            .file_stem()
            .map(|stem| stem.to_os_string())
            .unwrap_or_default();
        let destination = find_available_filename(
            self.fs,
            &comic.filename,
            &directory.join(stem),
            options.target.extension(),
        );

        if let Err(err) = self.fs.rename(&temp, &destination) {
            self.discard(&temp);
            return Err(err);
        }

        let replaced = normalize_path(&destination) == normalize_path(&comic.filename);
        if !replaced && self.fs.exists(&comic.filename) {
            if let Err(err) = self.fs.remove_file(&comic.filename) {
                warn!(
                    "Converted to {} but unable to remove {}: {}",
                    destination.display(),
                    comic.filename.display(),
                    err
                );
            }
        }
        self.advance(ConvertState::FileReplaced);

        comic.filename = destination;
        comic.format = options.target;
        for (page, name) in comic.pages.iter_mut().zip(page_names) {
            page.filename = name;
        }
        self.advance(ConvertState::Done);

        Ok(())
    }

    /// Writes the sidecar and the pages, then finalizes the new archive
    ///
    /// Returns the entry names the pages were written under.
    fn write_archive(
        &mut self,
        comic: &Comic,
        options: &ConvertOptions,
        reader: &mut dyn ArchiveReader,
        mut writer: Box<dyn ArchiveWriter>,
    ) -> Result<Vec<String>, ComicError> {
        writer.write_entry(SIDECAR_NAME, &sidecar::encode(comic)?)?;
        self.advance(ConvertState::MetadataWritten);

        let rule = RenamingRule::new(options.page_renaming_rule.as_deref().unwrap_or_default());
        if !rule.is_empty() {
            debug!(
                "Naming the pages of {} after \"{}\"",
                self.source.display(),
                rule.template()
            );
        }
        let total_pages = comic.pages.len();

        let mut names = Vec::with_capacity(total_pages);
        let mut write_page = |index: usize, data: &[u8]| -> Result<(), ComicError> {
            let page = &comic.pages[index];
            let name = rule.expand_page(comic, index, total_pages, &page.filename);

            let entry = writer.write_entry(&name, data)?;
            debug!("Wrote page {} as {} ({} bytes)", page.filename, name, entry.size);
            names.push(name);
            Ok(())
        };

        if pages_in_container_order(comic, reader) {
            let mut next = 0;
            reader.visit_entries(&mut |entry, data| {
                if next < total_pages && entry.name == comic.pages[next].filename {
                    write_page(next, &data)?;
                    next += 1;
                }
                Ok(())
            })?;
        } else {
            for (index, page) in comic.pages.iter().enumerate() {
                let data = reader.read_entry(&page.filename)?;
                write_page(index, &data)?;
            }
        }
        self.advance(ConvertState::PagesWritten);

        writer.close()?;
        Ok(names)
    }

    /// Removes an unfinished temporary archive
    fn discard(&self, temp: &Path) {
        if !self.fs.exists(temp) {
            return;
        }

        if let Err(err) = self.fs.remove_file(temp) {
            warn!("Unable to remove {}: {}", temp.display(), err);
        }
    }
}

/// Whether every page names an entry of the container and the pages follow
/// the container order, so all of them can be written in one pass
fn pages_in_container_order(comic: &Comic, reader: &dyn ArchiveReader) -> bool {
    let table = reader.entry_table();

    let mut previous = None;
    for page in &comic.pages {
        match table.get_index_of(&page.filename) {
            Some(position) if previous.is_none_or(|previous| position > previous) => {
                previous = Some(position);
            }
            _ => return false,
        }
    }

    true
}
