//! Filesystem access of the conversion pipeline
//!
//! The pipeline only touches the filesystem through the [FileSystem] trait:
//! it allocates a temporary file next to the destination, moves it into place
//! and removes the original. [LocalFileSystem] is the implementation used in
//! practice; another implementation can be injected to observe or to fail
//! individual steps.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::ComicError,
    utils::{normalize_path, scratch_name},
};

/// File operations needed to replace a comic file
pub trait FileSystem {
    /// Returns whether a file or directory exists at the path
    fn exists(&self, path: &Path) -> bool;

    /// Removes a file
    fn remove_file(&self, path: &Path) -> Result<(), ComicError>;

    /// Moves a file, replacing the destination if it exists
    fn rename(&self, from: &Path, to: &Path) -> Result<(), ComicError>;

    /// Allocates an unused file path inside `dir`
    ///
    /// The file itself is not created. Keeping the temporary file in the
    /// directory of its final destination keeps the later move on one volume.
    fn temp_file_near(&self, dir: &Path, extension: &str) -> Result<PathBuf, ComicError>;
}

/// The local filesystem, through `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove_file(&self, path: &Path) -> Result<(), ComicError> {
        Ok(fs::remove_file(path)?)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), ComicError> {
        Ok(fs::rename(from, to)?)
    }

    fn temp_file_near(&self, dir: &Path, extension: &str) -> Result<PathBuf, ComicError> {
        if !dir.is_dir() {
            return Err(ComicError::OpenFailed {
                path: dir.to_string_lossy().to_string(),
                reason: "not a directory".to_string(),
            });
        }

        loop {
            let suffix = format!(".{}.tmp", extension);
            let candidate = dir.join(format!(".{}", scratch_name("lib-comic", &suffix)));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
    }
}

/// Finds a file path that does not collide with an existing file
///
/// Probes `base.ext`, then `base-1.ext`, `base-2.ext` and so on, and returns
/// the first candidate that does not exist. A candidate equal to `original`
/// is returned as well, since the original file is about to be replaced.
///
/// # Parameters
/// - `fs`: The filesystem to probe
/// - `original`: The path of the file being replaced
/// - `base`: The destination path without extension
/// - `extension`: The destination extension, without the dot
pub fn find_available_filename(
    fs: &dyn FileSystem,
    original: &Path,
    base: &Path,
    extension: &str,
) -> PathBuf {
    let original = normalize_path(original);

    let mut counter = 0usize;
    loop {
        let mut name = OsString::from(base.as_os_str());
        if counter > 0 {
            name.push(format!("-{}", counter));
        }
        name.push(".");
        name.push(extension);

        let candidate = PathBuf::from(name);
        if normalize_path(&candidate) == original || !fs.exists(&candidate) {
            return candidate;
        }

        counter += 1;
    }
}
