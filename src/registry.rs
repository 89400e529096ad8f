//! Format registry
//!
//! Maps archive formats, file extensions and file signatures to the adaptor
//! that handles them. The table is built once from a static list of the
//! adaptors compiled into the crate; the RAR-style adaptor is only present
//! with the `rar` feature.

use std::{fs::File, io::Read, path::Path, sync::LazyLock};

use crate::{
    archive::{ArchiveAdaptor, cb7::Cb7Adaptor, cbz::CbzAdaptor},
    error::ComicError,
    types::ArchiveFormat,
};

#[cfg(feature = "rar")]
use crate::archive::cbr::CbrAdaptor;

/// Number of leading bytes read to recognise a container signature
const SIGNATURE_LENGTH: usize = 16;

static GLOBAL_REGISTRY: LazyLock<FormatRegistry> = LazyLock::new(FormatRegistry::new);

/// Table of the available archive adaptors
pub struct FormatRegistry {
    adaptors: Vec<Box<dyn ArchiveAdaptor>>,
}

impl FormatRegistry {
    /// Builds a registry holding every adaptor compiled into the crate
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut adaptors: Vec<Box<dyn ArchiveAdaptor>> =
            vec![Box::new(CbzAdaptor), Box::new(Cb7Adaptor)];

        #[cfg(feature = "rar")]
        adaptors.push(Box::new(CbrAdaptor));

        Self { adaptors }
    }

    /// Builds a registry from the given adaptors
    ///
    /// When several adaptors handle the same format, the first one wins.
    pub fn with_adaptors(adaptors: Vec<Box<dyn ArchiveAdaptor>>) -> Self {
        Self { adaptors }
    }

    /// Returns the process-wide registry
    pub fn global() -> &'static FormatRegistry {
        &GLOBAL_REGISTRY
    }

    /// Returns the formats this registry has an adaptor for, in the order of
    /// [ArchiveFormat::ALL]
    pub fn formats(&self) -> Vec<ArchiveFormat> {
        ArchiveFormat::ALL
            .into_iter()
            .filter(|format| self.get(*format).is_ok())
            .collect()
    }

    /// Returns the adaptor of a format
    ///
    /// # Return
    /// - `Err(ComicError::UnsupportedFormat)`: No adaptor is compiled in for the format
    pub fn get(&self, format: ArchiveFormat) -> Result<&dyn ArchiveAdaptor, ComicError> {
        self.adaptors
            .iter()
            .find(|adaptor| adaptor.format() == format)
            .map(|adaptor| adaptor.as_ref())
            .ok_or_else(|| ComicError::UnsupportedFormat {
                format: format.to_string(),
            })
    }

    /// Returns the adaptor for a file extension, such as `cbz` or `.7z`
    pub fn for_extension(&self, extension: &str) -> Result<&dyn ArchiveAdaptor, ComicError> {
        let format = ArchiveFormat::from_extension(extension).ok_or_else(|| {
            ComicError::UnsupportedFormat {
                format: extension.to_string(),
            }
        })?;

        self.get(format)
    }

    /// Returns the adaptor for a file, judged by the first bytes of its content
    ///
    /// # Return
    /// - `Err(ComicError::OpenFailed)`: The file cannot be read
    /// - `Err(ComicError::UnsupportedFormat)`: The content is not a known container
    pub fn for_file(&self, path: &Path) -> Result<&dyn ArchiveAdaptor, ComicError> {
        self.get(detect_format(path)?)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Detects the container format of a file from its signature
///
/// The file extension is not consulted, so a ZIP archive named `.cbr`
/// is still recognised as ZIP.
pub fn detect_format(path: &Path) -> Result<ArchiveFormat, ComicError> {
    let open_failed = |err: std::io::Error| ComicError::OpenFailed {
        path: path.to_string_lossy().to_string(),
        reason: err.to_string(),
    };

    let mut head = Vec::with_capacity(SIGNATURE_LENGTH);
    File::open(path)
        .map_err(open_failed)?
        .take(SIGNATURE_LENGTH as u64)
        .read_to_end(&mut head)
        .map_err(open_failed)?;

    detect_signature(&head).ok_or_else(|| ComicError::UnsupportedFormat {
        format: path.to_string_lossy().to_string(),
    })
}

/// Recognises a container format from the leading bytes of a file
pub fn detect_signature(head: &[u8]) -> Option<ArchiveFormat> {
    if infer::archive::is_zip(head) {
        Some(ArchiveFormat::Zip)
    } else if infer::archive::is_7z(head) {
        Some(ArchiveFormat::SevenZip)
    } else if infer::archive::is_rar(head) {
        Some(ArchiveFormat::Rar)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::{
        archive::{ArchiveAdaptor, cb7::Cb7Adaptor, cbz::CbzAdaptor},
        error::ComicError,
        registry::{FormatRegistry, detect_format, detect_signature},
        types::ArchiveFormat,
        utils::test_support::{page_bytes, test_dir},
    };

    #[test]
    fn test_lookup_by_format() {
        let registry = FormatRegistry::global();

        assert_eq!(
            registry.get(ArchiveFormat::Zip).unwrap().format(),
            ArchiveFormat::Zip
        );
        assert_eq!(
            registry.get(ArchiveFormat::SevenZip).unwrap().format(),
            ArchiveFormat::SevenZip
        );

        #[cfg(feature = "rar")]
        assert_eq!(
            registry.get(ArchiveFormat::Rar).unwrap().format(),
            ArchiveFormat::Rar
        );
        #[cfg(not(feature = "rar"))]
        assert!(registry.get(ArchiveFormat::Rar).is_err());
    }

    #[test]
    fn test_lookup_by_extension() {
        let registry = FormatRegistry::new();

        assert_eq!(
            registry.for_extension("CBZ").unwrap().format(),
            ArchiveFormat::Zip
        );
        assert_eq!(
            registry.for_extension(".7z").unwrap().format(),
            ArchiveFormat::SevenZip
        );
        assert_eq!(
            registry.for_extension("cbt").err().unwrap(),
            ComicError::UnsupportedFormat {
                format: "cbt".to_string()
            }
        );
    }

    #[test]
    fn test_detect_signature() {
        assert_eq!(
            detect_signature(b"PK\x03\x04\x14\x00"),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(
            detect_signature(b"7z\xBC\xAF\x27\x1C\x00\x04"),
            Some(ArchiveFormat::SevenZip)
        );
        assert_eq!(
            detect_signature(b"Rar!\x1A\x07\x00\xCF"),
            Some(ArchiveFormat::Rar)
        );
        assert_eq!(detect_signature(b"%PDF-1.7"), None);
        assert_eq!(detect_signature(b""), None);
    }

    #[test]
    fn test_lookup_by_file_content() {
        let dir = test_dir();
        let registry = FormatRegistry::global();

        // a 7z archive with a misleading extension
        let path = dir.join("misnamed.cbz");
        let mut writer = registry
            .get(ArchiveFormat::SevenZip)
            .unwrap()
            .open_for_write(&path)
            .unwrap();
        writer.write_entry("001.png", &page_bytes(0)).unwrap();
        writer.close().unwrap();

        assert_eq!(detect_format(&path).unwrap(), ArchiveFormat::SevenZip);
        assert_eq!(
            registry.for_file(&path).unwrap().format(),
            ArchiveFormat::SevenZip
        );

        let text = dir.join("notes.txt");
        fs::write(&text, b"plain text").unwrap();
        assert!(matches!(
            registry.for_file(&text),
            Err(ComicError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            detect_format(&dir.join("absent.cbz")),
            Err(ComicError::OpenFailed { .. })
        ));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_formats() {
        let formats = FormatRegistry::new().formats();
        assert_eq!(formats[..2], [ArchiveFormat::Zip, ArchiveFormat::SevenZip]);
        assert_eq!(formats.contains(&ArchiveFormat::Rar), cfg!(feature = "rar"));

        let registry = FormatRegistry::with_adaptors(vec![Box::new(Cb7Adaptor)]);
        assert_eq!(registry.formats(), vec![ArchiveFormat::SevenZip]);
        assert_eq!(
            registry.get(ArchiveFormat::Zip).err().unwrap(),
            ComicError::UnsupportedFormat {
                format: "cbz".to_string()
            }
        );

        let registry = FormatRegistry::with_adaptors(vec![
            Box::new(CbzAdaptor),
            Box::new(Cb7Adaptor),
            Box::new(CbzAdaptor),
        ]);
        assert_eq!(
            registry.formats(),
            vec![ArchiveFormat::Zip, ArchiveFormat::SevenZip]
        );
    }
}
