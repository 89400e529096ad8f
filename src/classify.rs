//! Entry classification
//!
//! Assigns a MIME type and an [EntryKind] to the content of an archive entry.
//! The kind is sniffed from the raw bytes with `infer`; the entry name is only
//! consulted to recognise the reserved metadata sidecar.

use infer::{Infer, MatcherType};

use crate::types::EntryKind;

/// Reserved name of the metadata sidecar entry
pub const SIDECAR_NAME: &str = "ComicInfo.xml";

/// Image substituted for pages whose content cannot be extracted
pub const MISSING_PAGE: &[u8] = include_bytes!("../assets/missing-page.png");

/// MIME type used when the content cannot be identified
pub const UNKNOWN_MIME: &str = "application/octet-stream";

const SIDECAR_MIME: &str = "application/xml";

/// Returns whether an entry name designates the metadata sidecar
///
/// Only the leaf name is compared, ignoring case, so a sidecar stored
/// below a directory inside the container is recognised as well.
pub fn is_sidecar_name(name: &str) -> bool {
    let leaf = name.rsplit(['/', '\\']).next().unwrap_or(name);
    leaf.eq_ignore_ascii_case(SIDECAR_NAME)
}

/// Classifies an entry from its name and content
///
/// # Parameters
/// - `name`: The entry path inside the container
/// - `data`: The raw entry content
///
/// # Return
/// - `(String, EntryKind)`: The MIME type and the coarse entry kind
pub fn classify(name: &str, data: &[u8]) -> (String, EntryKind) {
    if is_sidecar_name(name) {
        return (SIDECAR_MIME.to_string(), EntryKind::Metadata);
    }

    match Infer::new().get(data) {
        Some(file_type) if file_type.matcher_type() == MatcherType::Image => {
            (file_type.mime_type().to_string(), EntryKind::Image)
        }
        Some(file_type) => (file_type.mime_type().to_string(), EntryKind::Other),
        None => (UNKNOWN_MIME.to_string(), EntryKind::Other),
    }
}

/// Returns the classification of the missing-page placeholder
pub fn classify_placeholder(name: &str) -> (String, EntryKind) {
    classify(name, MISSING_PAGE)
}
