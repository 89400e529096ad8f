use std::{fmt, path::PathBuf};

use chrono::NaiveDate;

/// Container formats a comic can be stored in
///
/// The format tag travels with a [Comic] and decides which archive adaptor
/// reads it. Only ZIP-style and 7z-style containers can be written; RAR is
/// read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// ZIP-style container, usually with the `.cbz` extension
    Zip,

    /// 7z-style container, usually with the `.cb7` extension
    SevenZip,

    /// RAR-style container, usually with the `.cbr` extension
    Rar,
}

impl ArchiveFormat {
    /// Every format, in the order registries report them
    pub const ALL: [ArchiveFormat; 3] = [
        ArchiveFormat::Zip,
        ArchiveFormat::SevenZip,
        ArchiveFormat::Rar,
    ];

    /// Returns the canonical comic book extension of the format, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "cbz",
            ArchiveFormat::SevenZip => "cb7",
            ArchiveFormat::Rar => "cbr",
        }
    }

    /// Returns whether archives of this format can be created
    pub fn is_writable(&self) -> bool {
        !matches!(self, ArchiveFormat::Rar)
    }

    /// Maps a file extension (case-insensitive, with or without the dot) to a format
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.trim_start_matches('.').to_lowercase();
        match extension.as_str() {
            "cbz" | "zip" => Some(ArchiveFormat::Zip),
            "cb7" | "7z" => Some(ArchiveFormat::SevenZip),
            "cbr" | "rar" => Some(ArchiveFormat::Rar),
            _ => None,
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Coarse classification of a container entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Image,
    Metadata,
    Other,
}

/// Represents one named entry of an open container
///
/// Entries are listed in the natural iteration order of the container, and
/// their kind is derived from the entry bytes, except for the metadata
/// sidecar which is recognised by its reserved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    /// Zero-based position in read order
    pub index: usize,

    /// The path of the entry inside the container
    pub name: String,

    /// Size of the entry content in bytes
    ///
    /// When the entry could not be extracted, this is the size of the
    /// placeholder image that replaces it.
    pub size: u64,

    /// The MIME type sniffed from the entry content
    pub mime: String,

    pub kind: EntryKind,
}

/// Roles a person can be credited with in the metadata sidecar
///
/// Every role has exactly one external tag spelling. [CreditRole::tag] and
/// [CreditRole::from_tag] are inverse to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreditRole {
    Writer,
    Editor,
    Penciller,
    Inker,
    Colorist,
    Letterer,
    CoverArtist,
}

impl CreditRole {
    pub const ALL: [CreditRole; 7] = [
        CreditRole::Writer,
        CreditRole::Editor,
        CreditRole::Penciller,
        CreditRole::Inker,
        CreditRole::Colorist,
        CreditRole::Letterer,
        CreditRole::CoverArtist,
    ];

    /// Returns the element name used for this role in `ComicInfo.xml`
    pub fn tag(&self) -> &'static str {
        match self {
            CreditRole::Writer => "Writer",
            CreditRole::Editor => "Editor",
            CreditRole::Penciller => "Penciller",
            CreditRole::Inker => "Inker",
            CreditRole::Colorist => "Colorist",
            CreditRole::Letterer => "Letterer",
            CreditRole::CoverArtist => "CoverArtist",
        }
    }

    /// Returns the role identifier stored with a credit
    pub fn identifier(&self) -> &'static str {
        match self {
            CreditRole::Writer => "writer",
            CreditRole::Editor => "editor",
            CreditRole::Penciller => "penciller",
            CreditRole::Inker => "inker",
            CreditRole::Colorist => "colorist",
            CreditRole::Letterer => "letterer",
            CreditRole::CoverArtist => "cover",
        }
    }

    /// Maps a `ComicInfo.xml` element name back to its role
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.tag() == tag)
    }

    /// Maps a stored role identifier back to its role
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|role| role.identifier() == identifier)
    }
}

/// A person credited on a comic
///
/// The role is kept as its identifier string, because credits imported from
/// other sources may carry roles that have no sidecar element. Those credits
/// are skipped when the sidecar is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    pub name: String,
    pub role: String,
}

impl Credit {
    pub fn new(name: &str, role: CreditRole) -> Self {
        Self {
            name: name.to_string(),
            role: role.identifier().to_string(),
        }
    }

    /// Returns the sidecar role of this credit, if the role is recognised
    pub fn credit_role(&self) -> Option<CreditRole> {
        CreditRole::from_identifier(&self.role)
    }
}

/// Descriptive metadata of a comic, as carried by the `ComicInfo.xml` sidecar
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComicMetadata {
    pub publisher: String,
    pub imprint: String,
    pub series: String,
    pub volume: String,
    pub issue_number: String,
    pub title: String,
    pub description: String,
    pub notes: String,

    /// Cover date, always on the first day of the cover month
    pub cover_date: Option<NaiveDate>,

    pub characters: Vec<String>,
    pub teams: Vec<String>,
    pub locations: Vec<String>,
    pub stories: Vec<String>,
    pub credits: Vec<Credit>,
}

/// One page of a comic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// The entry name of the page inside the comic's container
    pub filename: String,

    /// Hex encoded SHA-1 digest of the page content
    pub hash: String,

    /// Pages flagged as deleted can be dropped when the comic is rewritten
    pub deleted: bool,
}

impl Page {
    pub fn new(filename: &str, hash: &str) -> Self {
        Self {
            filename: filename.to_string(),
            hash: hash.to_string(),
            deleted: false,
        }
    }
}

/// A comic book file
///
/// The aggregate is owned by the caller; the archive layer reads pages and
/// metadata into it and updates its filename and format tag when the comic
/// is rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comic {
    pub filename: PathBuf,
    pub format: ArchiveFormat,
    pub pages: Vec<Page>,
    pub metadata: ComicMetadata,
}

impl Comic {
    pub fn new<P: Into<PathBuf>>(filename: P, format: ArchiveFormat) -> Self {
        Self {
            filename: filename.into(),
            format,
            pages: vec![],
            metadata: ComicMetadata::default(),
        }
    }

    /// Returns the pages that are not flagged as deleted
    pub fn active_pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter().filter(|page| !page.deleted)
    }

    /// Removes the pages flagged as deleted, keeping the order of the others
    pub fn remove_deleted_pages(&mut self) {
        self.pages.retain(|page| !page.deleted);
    }
}
