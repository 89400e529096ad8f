//! 7z-style containers (`.cb7`)
//!
//! Backed by `zesven`. Entries are handed to the archive writer as real
//! files: every `write_entry` call stages its content in a scratch file,
//! registers that file with the writer and deletes it again before returning.
//!
//! Entries of a solid archive share one compressed stream. Extracting them
//! one by one decodes the stream from its start every time, so walking all
//! entries of a solid archive goes through the streaming reader instead.

use std::{
    env,
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use zesven::{Archive, ArchivePath, Writer, read::ArchiveSource, streaming::StreamingArchive};

use crate::{
    archive::{
        ArchiveAdaptor, ArchiveReader, ArchiveWriter, EntryTable, EntryVisitor, RawEntry,
        WrittenNames, open_failed, settle_entry, visit_in_table_order, written_entry,
    },
    error::ComicError,
    types::{ArchiveFormat, ContainerEntry},
    utils::scratch_name,
};

/// Adaptor for 7z-style containers
#[derive(Debug, Default, Clone, Copy)]
pub struct Cb7Adaptor;

impl ArchiveAdaptor for Cb7Adaptor {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::SevenZip
    }

    fn open_for_read(&self, path: &Path) -> Result<Box<dyn ArchiveReader>, ComicError> {
        Ok(Box::new(Cb7Reader::open(path)?))
    }

    fn open_for_write(&self, path: &Path) -> Result<Box<dyn ArchiveWriter>, ComicError> {
        Ok(Box::new(Cb7Writer::create(path)?))
    }
}

/// Read handle of a 7z-style container
pub struct Cb7Reader {
    path: PathBuf,
    archive: Archive<ArchiveSource>,
    table: EntryTable,
}

impl Cb7Reader {
    /// Opens a 7z-style container and indexes its file entries
    pub fn open(path: &Path) -> Result<Self, ComicError> {
        let archive = Archive::open_path(path).map_err(|err| open_failed(path, err))?;

        let mut table = EntryTable::new();
        for (slot, entry) in archive.entries().iter().enumerate() {
            if entry.is_directory {
                continue;
            }

            table
                .entry(entry.path.as_str().to_string())
                .or_insert(RawEntry {
                    slot,
                    size: entry.size,
                });
        }

        debug!("Opened {} with {} entries", path.display(), table.len());
        Ok(Self {
            path: path.to_path_buf(),
            archive,
            table,
        })
    }

    /// Walks the entries of a solid archive with a single decoder
    ///
    /// Returns how many entries of the table were handed over. The walk ends
    /// early at the first entry that fails to decode, since the decoder state
    /// cannot be trusted after it; that entry is handed over as the missing
    /// page and the remaining ones are left to the caller.
    fn visit_solid(&self, visit: &mut EntryVisitor<'_>) -> Result<usize, ComicError> {
        let mut streaming = match StreamingArchive::open_path(&self.path, "") {
            Ok(streaming) => streaming,
            Err(err) => {
                warn!("Unable to stream {}: {}", self.path.display(), err);
                return Ok(0);
            }
        };
        let mut entries = match streaming.entries() {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Unable to stream {}: {}", self.path.display(), err);
                return Ok(0);
            }
        };

        let mut visited = 0;
        while let Some(Ok(streamed)) = entries.next() {
            if streamed.is_directory() {
                continue;
            }

            let name = streamed.name().to_string();
            let expected_crc = streamed.entry().crc32;
            let slot = match self.table.get_full(&name) {
                Some((index, _, raw)) if index == visited => raw.slot,
                // a later record with a name already visited
                Some((index, _, _)) if index < visited => continue,
                _ => break,
            };

            let extracted = entries
                .extract_current_to_vec()
                .map_err(ComicError::from)
                .and_then(|data| check_crc(slot, &name, expected_crc, data));
            let failed = extracted.is_err();

            let (entry, data) = settle_entry(&self.path, visited, name, extracted);
            visit(entry, data)?;
            visited += 1;

            if failed {
                break;
            }
        }

        Ok(visited)
    }
}

/// Compares extracted content against the checksum recorded in the archive
fn check_crc(
    slot: usize,
    name: &str,
    expected: Option<u32>,
    data: Vec<u8>,
) -> Result<Vec<u8>, ComicError> {
    let actual = crc32fast::hash(&data);
    match expected {
        Some(expected) if expected != actual => Err(zesven::Error::CrcMismatch {
            entry_index: slot,
            entry_name: Some(name.to_string()),
            expected,
            actual,
        }
        .into()),
        _ => Ok(data),
    }
}

impl ArchiveReader for Cb7Reader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entry_table(&self) -> &EntryTable {
        &self.table
    }

    fn extract_entry(&mut self, _name: &str, entry: RawEntry) -> Result<Vec<u8>, ComicError> {
        Ok(self.archive.extract_entry_to_vec_by_index(entry.slot)?)
    }

    fn visit_entries(&mut self, visit: &mut EntryVisitor<'_>) -> Result<(), ComicError> {
        if !self.archive.info().is_solid {
            return visit_in_table_order(self, 0, visit);
        }

        let visited = self.visit_solid(visit)?;
        if visited < self.table.len() {
            debug!(
                "Extracting the last {} entries of {} one by one",
                self.table.len() - visited,
                self.path.display()
            );
        }
        visit_in_table_order(self, visited, visit)
    }

    fn close(self: Box<Self>) -> Result<(), ComicError> {
        debug!("Closed {}", self.path.display());
        Ok(())
    }
}

/// Write handle of a 7z-style container
pub struct Cb7Writer {
    path: PathBuf,
    writer: Writer<BufWriter<File>>,
    names: WrittenNames,
    scratch_dir: PathBuf,
}

impl Cb7Writer {
    /// Creates or truncates a 7z-style container
    ///
    /// Entry content is staged below the system temporary directory
    /// unless another location is set with [Cb7Writer::with_scratch_dir].
    pub fn create(path: &Path) -> Result<Self, ComicError> {
        let writer = Writer::create_path(path).map_err(|err| open_failed(path, err))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            names: WrittenNames::default(),
            scratch_dir: env::temp_dir(),
        })
    }

    /// Sets the directory the entry content is staged in
    pub fn with_scratch_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.scratch_dir = dir.as_ref().to_path_buf();
        self
    }
}

impl ArchiveWriter for Cb7Writer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<ContainerEntry, ComicError> {
        let archive_path = ArchivePath::new(name).map_err(|_| ComicError::InvalidEntryName {
            entry: name.to_string(),
        })?;
        let index = self.names.claim(name)?;

        let scratch = ScratchFile::stage(&self.scratch_dir, data)?;
        self.writer.add_path(&scratch.path, archive_path)?;

        Ok(written_entry(index, name, data))
    }

    fn close(self: Box<Self>) -> Result<(), ComicError> {
        let Cb7Writer { path, writer, .. } = *self;
        writer.finish()?;

        debug!("Finished {}", path.display());
        Ok(())
    }
}

/// A staged entry file, deleted when dropped
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn stage(dir: &Path, data: &[u8]) -> Result<Self, ComicError> {
        let scratch = ScratchFile {
            path: dir.join(scratch_name("lib-comic-entry", ".tmp")),
        };
        fs::write(&scratch.path, data)?;

        Ok(scratch)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }

        if let Err(err) = fs::remove_file(&self.path) {
            warn!("Unable to remove {}: {}", self.path.display(), err);
        };
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use zesven::{ArchivePath, WriteOptions, Writer};

    use crate::{
        archive::{
            ArchiveAdaptor, ArchiveReader, ArchiveWriter,
            cb7::{Cb7Adaptor, Cb7Reader, Cb7Writer, ScratchFile},
        },
        classify::MISSING_PAGE,
        error::ComicError,
        types::{ArchiveFormat, EntryKind},
        utils::test_support::{page_bytes, test_dir},
    };

    fn is_empty_dir(dir: &std::path::Path) -> bool {
        fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_write_then_read() {
        let dir = test_dir();
        let path = dir.join("issue.cb7");
        let adaptor = Cb7Adaptor;
        assert_eq!(adaptor.format(), ArchiveFormat::SevenZip);

        let mut writer = adaptor.open_for_write(&path).unwrap();
        for (index, name) in ["003.png", "001.png", "002.png"].iter().enumerate() {
            writer.write_entry(name, &page_bytes(index)).unwrap();
        }
        writer
            .write_entry("ComicInfo.xml", b"<ComicInfo></ComicInfo>")
            .unwrap();
        writer.close().unwrap();

        let mut reader = adaptor.open_for_read(&path).unwrap();
        let entries = reader.list_entries().unwrap();
        let names = entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["003.png", "001.png", "002.png", "ComicInfo.xml"]);
        assert_eq!(entries[1].kind, EntryKind::Image);
        assert_eq!(entries[3].kind, EntryKind::Metadata);

        assert_eq!(reader.read_entry("001.png").unwrap(), page_bytes(1));
        assert_eq!(reader.read_entry("003.png").unwrap(), page_bytes(0));
        assert_eq!(
            reader.read_entry("004.png").unwrap_err(),
            ComicError::EntryNotFound {
                entry: "004.png".to_string()
            }
        );
        reader.close().unwrap();

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_scratch_files_are_removed() {
        let dir = test_dir();
        let scratch_dir = dir.join("scratch");
        fs::create_dir_all(&scratch_dir).unwrap();

        let mut writer = Cb7Writer::create(&dir.join("staged.cb7"))
            .unwrap()
            .with_scratch_dir(&scratch_dir);

        writer.write_entry("001.png", &page_bytes(0)).unwrap();
        assert!(is_empty_dir(&scratch_dir));

        writer.write_entry("002.png", &page_bytes(1)).unwrap();
        assert!(is_empty_dir(&scratch_dir));

        let result = writer.write_entry("002.png", &page_bytes(2));
        assert!(matches!(result, Err(ComicError::DuplicateEntry { .. })));
        assert!(is_empty_dir(&scratch_dir));

        Box::new(writer).close().unwrap();
        assert!(is_empty_dir(&scratch_dir));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_scratch_file_removed_on_error_path() {
        let dir = test_dir();

        let staged = || -> Result<(), ComicError> {
            let scratch = ScratchFile::stage(&dir, b"content")?;
            assert!(scratch.path.exists());
            Err(ComicError::EmptyDataError)
        };
        assert!(staged().is_err());
        assert!(is_empty_dir(&dir));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_invalid_entry_name() {
        let dir = test_dir();
        let mut writer = Cb7Adaptor.open_for_write(&dir.join("names.cb7")).unwrap();
        writer.write_entry("pages/001.png", &page_bytes(0)).unwrap();

        let result = writer.write_entry("../escape.png", &page_bytes(1));
        assert_eq!(
            result.unwrap_err(),
            ComicError::InvalidEntryName {
                entry: "../escape.png".to_string()
            }
        );
        writer.close().unwrap();

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_open_failures() {
        let dir = test_dir();

        let garbage = dir.join("garbage.cb7");
        fs::write(&garbage, b"definitely not 7z").unwrap();
        let result = Cb7Adaptor.open_for_read(&garbage);
        assert!(matches!(result, Err(ComicError::OpenFailed { .. })));

        let result = Cb7Adaptor.open_for_read(&dir.join("absent.cb7"));
        assert!(matches!(result, Err(ComicError::OpenFailed { .. })));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_corrupted_entry_becomes_missing_page() {
        let dir = test_dir();
        let path = dir.join("damaged.cb7");

        let mut writer = Cb7Adaptor.open_for_write(&path).unwrap();
        for index in 0..3 {
            let name = format!("{:03}.png", index + 1);
            writer.write_entry(&name, &page_bytes(index)).unwrap();
        }
        writer.close().unwrap();

        // packed streams start right after the 32-byte signature header,
        // the entry headers sit at the end of the file and stay intact
        let mut bytes = fs::read(&path).unwrap();
        bytes[32] ^= 0xFF;
        bytes[33] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let mut reader = Cb7Adaptor.open_for_read(&path).unwrap();
        let entries = reader.list_entries().unwrap();
        let names = entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["001.png", "002.png", "003.png"]);
        assert!(entries.iter().all(|e| e.kind == EntryKind::Image));

        let mut missing = 0;
        for (index, name) in names.iter().enumerate() {
            let data = reader.read_entry(name).unwrap();
            if data == MISSING_PAGE {
                missing += 1;
            } else {
                assert_eq!(data, page_bytes(index));
            }
        }
        assert!(missing >= 1);
        reader.close().unwrap();

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_solid_archive_is_walked_once() {
        let dir = test_dir();
        let path = dir.join("solid.cb7");

        let mut writer = Writer::create_path(&path)
            .unwrap()
            .options(WriteOptions::new().solid());
        for index in 0..4 {
            let name = ArchivePath::new(&format!("pages/{:03}.png", index + 1)).unwrap();
            writer.add_bytes(name, &page_bytes(index)).unwrap();
        }
        writer
            .add_bytes(ArchivePath::new("ComicInfo.xml").unwrap(), b"<ComicInfo/>")
            .unwrap();
        writer.finish().unwrap();

        let mut reader = Cb7Reader::open(&path).unwrap();
        assert!(reader.archive.info().is_solid);

        let mut visited = Vec::new();
        reader
            .visit_entries(&mut |entry, data| {
                visited.push((entry.index, entry.name, entry.kind, data));
                Ok(())
            })
            .unwrap();

        assert_eq!(visited.len(), 5);
        for (index, (position, name, kind, data)) in visited.iter().take(4).enumerate() {
            assert_eq!(*position, index);
            assert_eq!(name, &format!("pages/{:03}.png", index + 1));
            assert_eq!(*kind, EntryKind::Image);
            assert_eq!(data, &page_bytes(index));
        }
        assert_eq!(visited[4].2, EntryKind::Metadata);
        assert_eq!(visited[4].3, b"<ComicInfo/>");

        assert_eq!(reader.read_entry("pages/003.png").unwrap(), page_bytes(2));
        Box::new(reader).close().unwrap();

        fs::remove_dir_all(dir).unwrap();
    }
}
