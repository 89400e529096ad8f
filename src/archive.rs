//! Archive adaptors
//!
//! This module defines the contract every container format implements, and the
//! behaviour shared by all formats: classification of listed entries and the
//! substitution of unreadable entries with the missing-page placeholder.
//!
//! Each format provides an [ArchiveAdaptor] that opens read handles
//! ([ArchiveReader]) and write handles ([ArchiveWriter]). A handle is bound to
//! one file and is consumed by its `close` method, so a closed handle can
//! never be used again. Dropping a handle without closing it releases the
//! file as well, but errors raised while finalizing are then lost.
//!
//! ## Usage
//!
//! ```rust, no_run
//! # fn main() -> Result<(), lib_comic::error::ComicError> {
//! use std::path::Path;
//! use lib_comic::{registry::FormatRegistry, types::ArchiveFormat};
//!
//! let adaptor = FormatRegistry::global().get(ArchiveFormat::Zip)?;
//!
//! let mut writer = adaptor.open_for_write(Path::new("issue.cbz"))?;
//! writer.write_entry("page-01.jpg", b"\xFF\xD8\xFF\xE0")?;
//! writer.close()?;
//!
//! let mut reader = adaptor.open_for_read(Path::new("issue.cbz"))?;
//! for entry in reader.list_entries()? {
//!     println!("{} {} {:?}", entry.name, entry.mime, entry.kind);
//! }
//! let _page = reader.read_entry("page-01.jpg")?;
//! reader.close()?;
//! # Ok(())
//! # }
//! ```

pub mod cb7;
#[cfg(feature = "rar")]
pub mod cbr;
pub mod cbz;

use std::{collections::HashSet, path::Path};

use indexmap::IndexMap;
use log::warn;

use crate::{
    classify::{MISSING_PAGE, classify, classify_placeholder},
    error::ComicError,
    types::{ArchiveFormat, ContainerEntry},
};

/// Location of an entry inside its container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEntry {
    /// Position of the entry among all records of the container, directories included
    pub slot: usize,

    /// Declared uncompressed size
    pub size: u64,
}

/// Entry names of a container mapped to their location, in container order
pub type EntryTable = IndexMap<String, RawEntry>;

/// Receives a listed entry and its content, see [ArchiveReader::visit_entries]
pub type EntryVisitor<'a> = dyn FnMut(ContainerEntry, Vec<u8>) -> Result<(), ComicError> + 'a;

/// Factory of read and write handles for one container format
pub trait ArchiveAdaptor: Send + Sync {
    /// The format handled by this adaptor
    fn format(&self) -> ArchiveFormat;

    /// Opens an existing container for reading
    ///
    /// # Return
    /// - `Err(ComicError::OpenFailed)`: The file is missing, unreadable or
    ///   not a container of this format
    fn open_for_read(&self, path: &Path) -> Result<Box<dyn ArchiveReader>, ComicError>;

    /// Creates or truncates a container for writing
    ///
    /// # Return
    /// - `Err(ComicError::OpenFailed)`: The file cannot be created
    /// - `Err(ComicError::WriteUnsupported)`: The format is read-only
    fn open_for_write(&self, path: &Path) -> Result<Box<dyn ArchiveWriter>, ComicError>;
}

/// An open container, bound to the file it was opened from
pub trait ArchiveReader {
    /// The file this handle reads from
    fn path(&self) -> &Path;

    /// The file entries of the container, in the container's own order
    fn entry_table(&self) -> &EntryTable;

    /// Extracts the content of one entry, without any fallback
    fn extract_entry(&mut self, name: &str, entry: RawEntry) -> Result<Vec<u8>, ComicError>;

    /// Releases the container
    fn close(self: Box<Self>) -> Result<(), ComicError>;

    /// Hands every file entry over to `visit` together with its content
    ///
    /// Entries are extracted once each, in container order. An entry whose
    /// content cannot be extracted is handed over as the missing-page
    /// placeholder. The first error returned by `visit` stops the walk.
    fn visit_entries(&mut self, visit: &mut EntryVisitor<'_>) -> Result<(), ComicError> {
        visit_in_table_order(self, 0, visit)
    }

    /// Lists and classifies every file entry of the container
    ///
    /// Entries whose content cannot be extracted are still listed, classified
    /// as the missing-page placeholder, so the page count of a damaged
    /// container stays complete.
    fn list_entries(&mut self) -> Result<Vec<ContainerEntry>, ComicError> {
        let mut entries = Vec::with_capacity(self.entry_table().len());
        self.visit_entries(&mut |entry, _data| {
            entries.push(entry);
            Ok(())
        })?;

        Ok(entries)
    }

    /// Reads the content of an entry by name
    ///
    /// # Return
    /// - `Ok(Vec<u8>)`: The entry content, or the missing-page placeholder
    ///   if the content cannot be extracted
    /// - `Err(ComicError::EntryNotFound)`: The container has no such entry
    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, ComicError> {
        let raw = *self
            .entry_table()
            .get(name)
            .ok_or_else(|| ComicError::EntryNotFound {
                entry: name.to_string(),
            })?;

        match self.extract_entry(name, raw) {
            Ok(data) => Ok(data),
            Err(err) => {
                warn!(
                    "Replacing unreadable entry \"{}\" of {}: {}",
                    name,
                    self.path().display(),
                    err
                );
                Ok(MISSING_PAGE.to_vec())
            }
        }
    }
}

/// A container being written, bound to the file it writes to
pub trait ArchiveWriter {
    /// The file this handle writes to
    fn path(&self) -> &Path;

    /// Appends one entry; the call order defines the entry order
    ///
    /// # Return
    /// - `Ok(ContainerEntry)`: The written entry with its write position
    /// - `Err(ComicError::DuplicateEntry)`: The name was already written
    fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<ContainerEntry, ComicError>;

    /// Finalizes and flushes the container
    fn close(self: Box<Self>) -> Result<(), ComicError>;
}

/// Tracks the names written through one write handle
#[derive(Debug, Default)]
pub(crate) struct WrittenNames {
    names: HashSet<String>,
}

impl WrittenNames {
    /// Reserves a name and returns its write position
    pub(crate) fn claim(&mut self, name: &str) -> Result<usize, ComicError> {
        if name.is_empty() || name.ends_with('/') {
            return Err(ComicError::InvalidEntryName {
                entry: name.to_string(),
            });
        }

        if !self.names.insert(name.to_string()) {
            return Err(ComicError::DuplicateEntry {
                entry: name.to_string(),
            });
        }

        Ok(self.names.len() - 1)
    }
}

/// Extracts the entries of the table one by one, starting at position `from`
pub(crate) fn visit_in_table_order<R: ArchiveReader + ?Sized>(
    reader: &mut R,
    from: usize,
    visit: &mut EntryVisitor<'_>,
) -> Result<(), ComicError> {
    let table = reader
        .entry_table()
        .iter()
        .skip(from)
        .map(|(name, entry)| (name.clone(), *entry))
        .collect::<Vec<_>>();

    for (index, (name, raw)) in (from..).zip(table) {
        let extracted = reader.extract_entry(&name, raw);
        let (entry, data) = settle_entry(reader.path(), index, name, extracted);
        visit(entry, data)?;
    }

    Ok(())
}

/// Builds the listed form of an entry from the outcome of its extraction
///
/// Returns the entry together with the content to use for it, which is the
/// missing-page placeholder when the extraction failed.
pub(crate) fn settle_entry(
    path: &Path,
    index: usize,
    name: String,
    extracted: Result<Vec<u8>, ComicError>,
) -> (ContainerEntry, Vec<u8>) {
    let (data, (mime, kind)) = match extracted {
        Ok(data) => {
            let class = classify(&name, &data);
            (data, class)
        }
        Err(err) => {
            warn!(
                "Unable to extract entry \"{}\" of {}, using the missing page: {}",
                name,
                path.display(),
                err
            );
            (MISSING_PAGE.to_vec(), classify_placeholder(&name))
        }
    };

    let entry = ContainerEntry {
        index,
        name,
        size: data.len() as u64,
        mime,
        kind,
    };
    (entry, data)
}

/// Builds the entry description returned by a write
pub(crate) fn written_entry(index: usize, name: &str, data: &[u8]) -> ContainerEntry {
    let (mime, kind) = classify(name, data);

    ContainerEntry {
        index,
        name: name.to_string(),
        size: data.len() as u64,
        mime,
        kind,
    }
}

/// Wraps the failure to open a container
pub(crate) fn open_failed<E: std::fmt::Display>(path: &Path, err: E) -> ComicError {
    ComicError::OpenFailed {
        path: path.to_string_lossy().to_string(),
        reason: err.to_string(),
    }
}
