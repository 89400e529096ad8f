//! Error Type Definition Module
//!
//! This module defines the error type returned by every operation of the crate.
//! Failures of the underlying containers (ZIP, 7z, RAR), of the filesystem and of
//! the metadata sidecar are all wrapped in [ComicError], which keeps the original
//! cause as its source.
//!
//! ## Error kinds
//!
//! - `OpenFailed` - a container could not be opened for reading or writing
//! - `EntryNotFound` - an entry was requested by a name the container does not have
//! - `WriteUnsupported` - a write was attempted against a read-only format
//! - `SidecarMalformed` - the `ComicInfo.xml` document is not well-formed
//! - I/O failures - `IOError`, `ArchiveError`, `SevenZipError` and `RarError`,
//!   see [ComicError::is_io_failure]

use thiserror::Error;

/// Types of errors that can occur while handling comic archives
#[derive(Debug, Error)]
pub enum ComicError {
    /// ZIP archive related errors
    ///
    /// Raised by the zip backend while reading or writing a CBZ container,
    /// such as a truncated central directory or a failed flush.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// Duplicate entry error
    ///
    /// Entry names must be unique inside one container. This error occurs when
    /// the same name is written twice through one write handle.
    #[error("Duplicate entry: The \"{entry}\" entry has already been written.")]
    DuplicateEntry { entry: String },

    /// Data Decoding Error - Null data
    ///
    /// This error occurs when trying to decode an empty stream.
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    /// Entry lookup error
    ///
    /// This error occurs when an entry is requested by a name that the
    /// open container does not contain. Unlike a corrupted entry, which is
    /// replaced by the missing-page placeholder, this is never recovered from.
    #[error("Entry not found: There is no entry named \"{entry}\" in the archive.")]
    EntryNotFound { entry: String },

    /// Invalid entry name error
    ///
    /// The container backend refused the logical name given for an entry.
    #[error("Invalid entry name: \"{entry}\" cannot be used as an entry name.")]
    InvalidEntryName { entry: String },

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// Container open error
    ///
    /// This error occurs when the file is missing, unreadable, or is not a
    /// valid container of the requested format.
    #[error("Open failed: Unable to open \"{path}\": {reason}")]
    OpenFailed { path: String, reason: String },

    /// RAR backend error
    #[cfg(feature = "rar")]
    #[error("RAR error: {source}")]
    RarError { source: unrar::error::UnrarError },

    /// 7z backend error
    #[error("7z error: {source}")]
    SevenZipError { source: zesven::Error },

    /// Malformed metadata sidecar error
    ///
    /// The only fatal condition while decoding `ComicInfo.xml`: the document
    /// is not well-formed XML. Unknown elements never raise this error.
    #[error("Sidecar malformed: {reason}")]
    SidecarMalformed { reason: String },

    /// Unsupported archive format error
    ///
    /// This error occurs when no adaptor is registered for a format identifier,
    /// file extension or file signature.
    #[error("Unsupported format: No archive adaptor is registered for \"{format}\".")]
    UnsupportedFormat { format: String },

    /// UTF-8 decoding error
    #[error("Decode error: {source}")]
    Utf8DecodeError { source: std::string::FromUtf8Error },

    /// UTF-16 decoding error
    #[error("Decode error: {source}")]
    Utf16DecodeError { source: std::string::FromUtf16Error },

    /// Read-only format error
    ///
    /// This error occurs when a write handle is requested from an adaptor
    /// whose format cannot be written, such as RAR.
    #[error("Write unsupported: The \"{format}\" format is read-only.")]
    WriteUnsupported { format: String },
}

impl ComicError {
    /// Returns `true` if the error is a generic read/write/close failure of
    /// the underlying storage or container backend
    pub fn is_io_failure(&self) -> bool {
        match self {
            ComicError::ArchiveError { .. }
            | ComicError::IOError { .. }
            | ComicError::SevenZipError { .. } => true,

            #[cfg(feature = "rar")]
            ComicError::RarError { .. } => true,

            _ => false,
        }
    }
}

impl From<zip::result::ZipError> for ComicError {
    fn from(value: zip::result::ZipError) -> Self {
        ComicError::ArchiveError { source: value }
    }
}

impl From<zesven::Error> for ComicError {
    fn from(value: zesven::Error) -> Self {
        ComicError::SevenZipError { source: value }
    }
}

#[cfg(feature = "rar")]
impl From<unrar::error::UnrarError> for ComicError {
    fn from(value: unrar::error::UnrarError) -> Self {
        ComicError::RarError { source: value }
    }
}

impl From<quick_xml::Error> for ComicError {
    fn from(value: quick_xml::Error) -> Self {
        ComicError::SidecarMalformed {
            reason: value.to_string(),
        }
    }
}

impl From<std::io::Error> for ComicError {
    fn from(value: std::io::Error) -> Self {
        ComicError::IOError { source: value }
    }
}

impl From<std::string::FromUtf8Error> for ComicError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        ComicError::Utf8DecodeError { source: value }
    }
}

impl From<std::string::FromUtf16Error> for ComicError {
    fn from(value: std::string::FromUtf16Error) -> Self {
        ComicError::Utf16DecodeError { source: value }
    }
}

#[cfg(test)]
impl PartialEq for ComicError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::DuplicateEntry { entry: l_entry }, Self::DuplicateEntry { entry: r_entry }) => {
                l_entry == r_entry
            }
            (Self::EntryNotFound { entry: l_entry }, Self::EntryNotFound { entry: r_entry }) => {
                l_entry == r_entry
            }
            (
                Self::InvalidEntryName { entry: l_entry },
                Self::InvalidEntryName { entry: r_entry },
            ) => l_entry == r_entry,
            (
                Self::UnsupportedFormat { format: l_format },
                Self::UnsupportedFormat { format: r_format },
            ) => l_format == r_format,
            (
                Self::WriteUnsupported { format: l_format },
                Self::WriteUnsupported { format: r_format },
            ) => l_format == r_format,
            (
                Self::Utf8DecodeError { source: l_source },
                Self::Utf8DecodeError { source: r_source },
            ) => l_source == r_source,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ComicError;

    #[test]
    fn test_is_io_failure() {
        let io = ComicError::from(std::io::Error::other("disk full"));
        assert!(io.is_io_failure());

        let zip = ComicError::from(zip::result::ZipError::FileNotFound);
        assert!(zip.is_io_failure());

        let missing = ComicError::EntryNotFound {
            entry: "page-01.jpg".to_string(),
        };
        assert!(!missing.is_io_failure());

        let read_only = ComicError::WriteUnsupported {
            format: "cbr".to_string(),
        };
        assert!(!read_only.is_io_failure());
    }

    #[test]
    fn test_error_messages() {
        let err = ComicError::EntryNotFound {
            entry: "page-01.jpg".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Entry not found: There is no entry named \"page-01.jpg\" in the archive."
        );

        let err = ComicError::WriteUnsupported {
            format: "cbr".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Write unsupported: The \"cbr\" format is read-only."
        );
    }
}
