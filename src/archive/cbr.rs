//! RAR-style containers (`.cbr`)
//!
//! Read-only, backed by `unrar`. The RAR library only offers sequential
//! access. A read handle keeps its processing cursor between extractions,
//! so entries requested in container order are reached in one pass; asking
//! for an entry behind the cursor reopens the archive and skips forward.

use std::path::{Path, PathBuf};

use log::debug;
use unrar::{Archive, CursorBeforeHeader, OpenArchive, Process};

use crate::{
    archive::{
        ArchiveAdaptor, ArchiveReader, ArchiveWriter, EntryTable, RawEntry, open_failed,
    },
    error::ComicError,
    types::ArchiveFormat,
};

/// Adaptor for RAR-style containers
#[derive(Debug, Default, Clone, Copy)]
pub struct CbrAdaptor;

impl ArchiveAdaptor for CbrAdaptor {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Rar
    }

    fn open_for_read(&self, path: &Path) -> Result<Box<dyn ArchiveReader>, ComicError> {
        Ok(Box::new(CbrReader::open(path)?))
    }

    /// RAR containers cannot be created, no file is touched
    fn open_for_write(&self, _path: &Path) -> Result<Box<dyn ArchiveWriter>, ComicError> {
        Err(ComicError::WriteUnsupported {
            format: ArchiveFormat::Rar.to_string(),
        })
    }
}

/// Read handle of a RAR-style container
pub struct CbrReader {
    path: PathBuf,
    table: EntryTable,
    cursor: Option<ProcessingCursor>,
}

/// An archive opened for processing, positioned before the header of `slot`
struct ProcessingCursor {
    archive: OpenArchive<Process, CursorBeforeHeader>,
    slot: usize,
}

impl CbrReader {
    /// Opens a RAR-style container and indexes its file entries
    pub fn open(path: &Path) -> Result<Self, ComicError> {
        if !path.is_file() {
            return Err(open_failed(path, "no such file"));
        }

        let listing = Archive::new(path)
            .open_for_listing()
            .map_err(|err| open_failed(path, err))?;

        let mut table = EntryTable::new();
        for (slot, header) in listing.enumerate() {
            let header = header.map_err(|err| open_failed(path, err))?;
            if !header.is_file() {
                continue;
            }

            let name = header.filename.to_string_lossy().to_string();
            table.entry(name).or_insert(RawEntry {
                slot,
                size: header.unpacked_size,
            });
        }

        debug!("Opened {} with {} entries", path.display(), table.len());
        Ok(Self {
            path: path.to_path_buf(),
            table,
            cursor: None,
        })
    }
}

impl ArchiveReader for CbrReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entry_table(&self) -> &EntryTable {
        &self.table
    }

    fn extract_entry(&mut self, name: &str, entry: RawEntry) -> Result<Vec<u8>, ComicError> {
        let ProcessingCursor {
            mut archive,
            mut slot,
        } = match self.cursor.take() {
            Some(cursor) if cursor.slot <= entry.slot => cursor,
            _ => {
                debug!("Rewinding {} to reach \"{}\"", self.path.display(), name);
                ProcessingCursor {
                    archive: Archive::new(&self.path).open_for_processing()?,
                    slot: 0,
                }
            }
        };

        while let Some(header) = archive.read_header()? {
            if slot == entry.slot {
                let (data, rest) = header.read()?;
                self.cursor = Some(ProcessingCursor {
                    archive: rest,
                    slot: slot + 1,
                });
                return Ok(data);
            }

            archive = header.skip()?;
            slot += 1;
        }

        // the file changed since it was listed
        Err(ComicError::EntryNotFound {
            entry: name.to_string(),
        })
    }

    fn close(self: Box<Self>) -> Result<(), ComicError> {
        debug!("Closed {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use crate::{
        archive::{
            ArchiveAdaptor, ArchiveReader,
            cbr::{CbrAdaptor, CbrReader},
        },
        classify::MISSING_PAGE,
        error::ComicError,
        registry::{FormatRegistry, detect_format},
        types::{ArchiveFormat, EntryKind},
        utils::test_support::{page_bytes, test_dir},
    };

    /// Stored RAR 4 archive holding, in this order: a `pages` directory,
    /// `pages/002.png` (`page_bytes(1)`), `pages/001.png` (`page_bytes(0)`)
    /// and a `ComicInfo.xml` for series "Foo", issue 7, publisher "Acme"
    const TWO_PAGES: &[u8] = include_bytes!("../../assets/test/two-pages.cbr");

    fn write_fixture() -> (PathBuf, PathBuf) {
        let dir = test_dir();
        let path = dir.join("two-pages.cbr");
        fs::write(&path, TWO_PAGES).unwrap();
        (dir, path)
    }

    #[test]
    fn test_list_entries() {
        let (dir, path) = write_fixture();

        let mut reader = CbrAdaptor.open_for_read(&path).unwrap();
        let entries = reader.list_entries().unwrap();

        let names = entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["pages/002.png", "pages/001.png", "ComicInfo.xml"]);
        assert_eq!(
            entries.iter().map(|e| e.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(entries[0].kind, EntryKind::Image);
        assert_eq!(entries[0].mime, "image/png");
        assert_eq!(entries[1].kind, EntryKind::Image);
        assert_eq!(entries[1].size, page_bytes(0).len() as u64);
        assert_eq!(entries[2].kind, EntryKind::Metadata);
        reader.close().unwrap();

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_read_entry() {
        let (dir, path) = write_fixture();

        let mut reader = CbrAdaptor.open_for_read(&path).unwrap();
        assert_eq!(reader.read_entry("pages/001.png").unwrap(), page_bytes(0));
        assert_eq!(reader.read_entry("pages/002.png").unwrap(), page_bytes(1));
        assert_eq!(reader.read_entry("pages/002.png").unwrap(), page_bytes(1));
        assert!(
            String::from_utf8(reader.read_entry("ComicInfo.xml").unwrap())
                .unwrap()
                .contains("<Series>Foo</Series>")
        );

        assert_eq!(
            reader.read_entry("pages").unwrap_err(),
            ComicError::EntryNotFound {
                entry: "pages".to_string()
            }
        );
        assert_eq!(
            reader.read_entry("pages/003.png").unwrap_err(),
            ComicError::EntryNotFound {
                entry: "pages/003.png".to_string()
            }
        );
        reader.close().unwrap();

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_cursor_follows_container_order() {
        let (dir, path) = write_fixture();

        let mut reader = CbrReader::open(&path).unwrap();
        assert_eq!(reader.table.len(), 3);
        assert!(reader.cursor.is_none());

        let mut visited = Vec::new();
        reader
            .visit_entries(&mut |entry, data| {
                visited.push((entry.name, data));
                Ok(())
            })
            .unwrap();
        assert_eq!(visited[0], ("pages/002.png".to_string(), page_bytes(1)));
        assert_eq!(visited[1], ("pages/001.png".to_string(), page_bytes(0)));

        // directory record plus three files
        assert_eq!(reader.cursor.as_ref().map(|cursor| cursor.slot), Some(4));

        assert_eq!(reader.read_entry("pages/002.png").unwrap(), page_bytes(1));
        assert_eq!(reader.cursor.as_ref().map(|cursor| cursor.slot), Some(2));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_detected_as_rar() {
        let (dir, path) = write_fixture();

        assert_eq!(detect_format(&path).unwrap(), ArchiveFormat::Rar);
        let adaptor = FormatRegistry::global().for_file(&path).unwrap();
        assert_eq!(adaptor.format(), ArchiveFormat::Rar);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_write_is_unsupported() {
        let dir = test_dir();
        let path = dir.join("issue.cbr");
        assert_eq!(CbrAdaptor.format(), ArchiveFormat::Rar);

        let result = CbrAdaptor.open_for_write(&path);
        assert_eq!(
            result.err().unwrap(),
            ComicError::WriteUnsupported {
                format: "cbr".to_string()
            }
        );
        assert!(!path.exists());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_open_failures() {
        let dir = test_dir();

        let result = CbrAdaptor.open_for_read(&dir.join("absent.cbr"));
        assert!(matches!(result, Err(ComicError::OpenFailed { .. })));

        let garbage = dir.join("garbage.cbr");
        fs::write(&garbage, b"Rar! but not really").unwrap();
        let result = CbrAdaptor.open_for_read(&garbage);
        assert!(matches!(result, Err(ComicError::OpenFailed { .. })));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_corrupted_entry_becomes_missing_page() {
        let (dir, path) = write_fixture();

        // stored entries keep their bytes verbatim, break the checksum of 001
        let page = page_bytes(0);
        let mut bytes = TWO_PAGES.to_vec();
        let offset = bytes
            .windows(page.len())
            .position(|window| window == page.as_slice())
            .unwrap();
        bytes[offset + page.len() - 1] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let mut reader = CbrAdaptor.open_for_read(&path).unwrap();
        let entries = reader.list_entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].name, "pages/001.png");
        assert_eq!(entries[1].kind, EntryKind::Image);
        assert_eq!(entries[1].size, MISSING_PAGE.len() as u64);
        assert_eq!(entries[2].kind, EntryKind::Metadata);

        assert_eq!(reader.read_entry("pages/001.png").unwrap(), MISSING_PAGE);
        assert_eq!(reader.read_entry("pages/002.png").unwrap(), page_bytes(1));
        reader.close().unwrap();

        fs::remove_dir_all(dir).unwrap();
    }
}
