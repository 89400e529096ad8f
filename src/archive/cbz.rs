//! ZIP-style containers (`.cbz`)
//!
//! Backed by the `zip` crate. Image entries are stored without compression,
//! since their content is already compressed; every other entry, the metadata
//! sidecar included, is deflated.

use std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::{Path, PathBuf},
};

use log::{debug, warn};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::FileOptions};

use crate::{
    archive::{
        ArchiveAdaptor, ArchiveReader, ArchiveWriter, EntryTable, RawEntry, WrittenNames,
        open_failed, written_entry,
    },
    error::ComicError,
    types::{ArchiveFormat, ContainerEntry, EntryKind},
};

/// Upper bound of the buffer reserved ahead of reading one entry
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Adaptor for ZIP-style containers
#[derive(Debug, Default, Clone, Copy)]
pub struct CbzAdaptor;

impl ArchiveAdaptor for CbzAdaptor {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn open_for_read(&self, path: &Path) -> Result<Box<dyn ArchiveReader>, ComicError> {
        Ok(Box::new(CbzReader::open(path)?))
    }

    fn open_for_write(&self, path: &Path) -> Result<Box<dyn ArchiveWriter>, ComicError> {
        Ok(Box::new(CbzWriter::create(path)?))
    }
}

/// Read handle of a ZIP-style container
pub struct CbzReader {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
    table: EntryTable,
}

impl CbzReader {
    /// Opens a ZIP-style container and indexes its file entries
    ///
    /// Directory records are skipped. When a name appears twice in the
    /// central directory, the first record wins.
    pub fn open(path: &Path) -> Result<Self, ComicError> {
        let file = File::open(path).map_err(|err| open_failed(path, err))?;
        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|err| open_failed(path, err))?;

        let mut table = EntryTable::new();
        for slot in 0..archive.len() {
            let record = archive
                .by_index(slot)
                .map(|file| (file.is_dir(), file.name().to_string(), file.size()));

            let (name, entry) = match record {
                Ok((true, _, _)) => continue,
                Ok((false, name, size)) => (name, RawEntry { slot, size }),

                // keep unreadable records listed, their content is replaced later
                Err(err) => match archive.name_for_index(slot) {
                    Some(name) if !name.ends_with('/') => {
                        warn!("Damaged record \"{}\" in {}: {}", name, path.display(), err);
                        (name.to_string(), RawEntry { slot, size: 0 })
                    }
                    _ => continue,
                },
            };

            table.entry(name).or_insert(entry);
        }

        debug!("Opened {} with {} entries", path.display(), table.len());
        Ok(Self {
            path: path.to_path_buf(),
            archive,
            table,
        })
    }
}

impl ArchiveReader for CbzReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entry_table(&self) -> &EntryTable {
        &self.table
    }

    fn extract_entry(&mut self, _name: &str, entry: RawEntry) -> Result<Vec<u8>, ComicError> {
        let mut file = self.archive.by_index(entry.slot)?;

        let mut data = Vec::with_capacity(entry.size.min(MAX_PREALLOCATION) as usize);
        file.read_to_end(&mut data)?;

        Ok(data)
    }

    fn close(self: Box<Self>) -> Result<(), ComicError> {
        debug!("Closed {}", self.path.display());
        Ok(())
    }
}

/// Write handle of a ZIP-style container
pub struct CbzWriter {
    path: PathBuf,
    zip: ZipWriter<File>,
    names: WrittenNames,
}

impl CbzWriter {
    /// Creates or truncates a ZIP-style container
    pub fn create(path: &Path) -> Result<Self, ComicError> {
        let file = File::create(path).map_err(|err| open_failed(path, err))?;

        Ok(Self {
            path: path.to_path_buf(),
            zip: ZipWriter::new(file),
            names: WrittenNames::default(),
        })
    }
}

impl ArchiveWriter for CbzWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<ContainerEntry, ComicError> {
        let index = self.names.claim(name)?;
        let entry = written_entry(index, name, data);

        let method = match entry.kind {
            EntryKind::Image => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let options = FileOptions::<()>::default().compression_method(method);

        self.zip.start_file(name, options)?;
        self.zip.write_all(data)?;

        Ok(entry)
    }

    fn close(self: Box<Self>) -> Result<(), ComicError> {
        let CbzWriter { path, zip, .. } = *self;

        let file = zip.finish()?;
        file.sync_all()?;

        debug!("Finished {}", path.display());
        Ok(())
    }
}
