//! ComicInfo sidecar codec
//!
//! Converts between the `ComicInfo.xml` document stored inside a comic archive
//! and the [ComicMetadata] of a [Comic].
//!
//! Decoding walks the children of the root element as a flat stream and
//! dispatches on their tag name. Unknown elements are skipped, so documents
//! written by newer tools still load. The only fatal condition is a document
//! that is not well-formed XML.
//!
//! ## Usage
//!
//! ```rust, no_run
//! # fn main() -> Result<(), lib_comic::error::ComicError> {
//! use lib_comic::{sidecar, types::{ArchiveFormat, Comic}};
//!
//! let mut comic = Comic::new("issue.cbz", ArchiveFormat::Zip);
//! comic.metadata.series = "Foo".to_string();
//!
//! let document = sidecar::encode(&comic)?;
//! let metadata = sidecar::decode(&document)?;
//! assert_eq!(metadata.series, "Foo");
//! # Ok(())
//! # }
//! ```

use std::io::Cursor;

use chrono::{Datelike, NaiveDate};
use log::warn;
use quick_xml::{
    Reader, Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::{
    error::ComicError,
    types::{Comic, ComicMetadata, Credit, CreditRole},
    utils::DecodeBytes,
};

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Marker written as a comment at the top of every generated sidecar
pub const GENERATOR_MARKER: &str = concat!("Generated by lib-comic ", env!("CARGO_PKG_VERSION"));

/// Decodes a `ComicInfo.xml` document
///
/// # Parameters
/// - `data`: The raw sidecar bytes, UTF-8 or UTF-16 with BOM
///
/// # Return
/// - `Ok(ComicMetadata)`: The metadata carried by the document
/// - `Err(ComicError)`: `SidecarMalformed` if the document is not well-formed
pub fn decode(data: &[u8]) -> Result<ComicMetadata, ComicError> {
    let content = data.decode().map_err(|err| ComicError::SidecarMalformed {
        reason: err.to_string(),
    })?;

    let mut reader = Reader::from_str(&content);
    let mut metadata = ComicMetadata::default();
    let mut cover = CoverDateBuffer::default();

    let mut depth = 0usize;
    let mut has_root = false;
    let mut current: Option<(String, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Eof => break,

            Event::Start(e) => {
                if depth == 0 && has_root {
                    return Err(malformed("more than one root element"));
                }

                depth += 1;
                has_root = true;

                if depth == 2 {
                    let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    current = Some((tag, String::new()));
                }
            }

            Event::End(_) => {
                if depth == 2 {
                    if let Some((tag, text)) = current.take() {
                        apply_element(&mut metadata, &mut cover, &tag, text.trim());
                    }
                }

                depth = depth.saturating_sub(1);
            }

            Event::Empty(_) => {
                if depth == 0 {
                    if has_root {
                        return Err(malformed("more than one root element"));
                    }
                    has_root = true;
                }
            }

            Event::Text(e) => {
                let text = String::from_utf8_lossy(e.as_ref()).to_string();
                if depth == 0 && !text.trim().is_empty() {
                    return Err(malformed("text outside of the root element"));
                }

                push_text(&mut current, depth, &text);
            }

            Event::CData(e) => {
                let text = String::from_utf8_lossy(e.as_ref()).to_string();
                push_text(&mut current, depth, &text);
            }

            Event::GeneralRef(e) => {
                let entity = String::from_utf8_lossy(e.as_ref()).to_string();
                let resolved = resolve_entity(&entity)
                    .ok_or_else(|| malformed(&format!("unknown entity &{};", entity)))?;

                if depth == 0 {
                    return Err(malformed("text outside of the root element"));
                }
                push_text(&mut current, depth, &resolved);
            }

            // Comment, PI, Declaration, Doctype
            _ => continue,
        }
    }

    if depth != 0 {
        return Err(malformed("unexpected end of document"));
    }

    if !has_root {
        return Err(malformed("no root element"));
    }

    metadata.cover_date = cover.resolve();
    Ok(metadata)
}

/// Encodes the metadata of a comic as a `ComicInfo.xml` document
///
/// Elements are written in a fixed order and only for non-empty fields.
/// Credits whose role has no sidecar element are skipped.
pub fn encode(comic: &Comic) -> Result<Vec<u8>, ComicError> {
    let metadata = &comic.metadata;
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("ComicInfo").with_attributes([
        ("xmlns:xsd", "http://www.w3.org/2001/XMLSchema"),
        ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
    ])))?;
    writer.write_event(Event::Comment(BytesText::new(&format!(
        " {} ",
        GENERATOR_MARKER
    ))))?;

    write_element(&mut writer, "Publisher", &metadata.publisher)?;
    write_element(&mut writer, "Imprint", &metadata.imprint)?;
    write_element(&mut writer, "Series", &metadata.series)?;
    write_element(&mut writer, "Volume", &metadata.volume)?;
    write_element(&mut writer, "Number", &metadata.issue_number)?;
    write_element(&mut writer, "Title", &metadata.title)?;
    write_element(&mut writer, "Summary", &metadata.description)?;
    write_element(&mut writer, "Notes", &metadata.notes)?;

    if let Some(cover_date) = metadata.cover_date {
        write_element(&mut writer, "Year", &cover_date.year().to_string())?;
        write_element(&mut writer, "Month", &cover_date.month().to_string())?;
    }

    write_element(
        &mut writer,
        "PageCount",
        &comic.active_pages().count().to_string(),
    )?;

    write_element(&mut writer, "Characters", &metadata.characters.join(","))?;
    write_element(&mut writer, "Teams", &metadata.teams.join(","))?;
    write_element(&mut writer, "Locations", &metadata.locations.join(","))?;
    write_element(&mut writer, "AlternateSeries", &metadata.stories.join(","))?;

    for credit in &metadata.credits {
        match credit.credit_role() {
            Some(role) => write_element(&mut writer, role.tag(), &credit.name)?,
            None => warn!(
                "Skipping credit \"{}\" with unsupported role \"{}\"",
                credit.name, credit.role
            ),
        }
    }

    writer.write_event(Event::End(BytesEnd::new("ComicInfo")))?;

    Ok(writer.into_inner().into_inner())
}

/// Year and month are only combined once the whole document has been read
#[derive(Default)]
struct CoverDateBuffer {
    year: Option<i32>,
    month: Option<u32>,
}

impl CoverDateBuffer {
    fn resolve(&self) -> Option<NaiveDate> {
        match (self.year, self.month) {
            (Some(year), month) => NaiveDate::from_ymd_opt(year, month.unwrap_or(1), 1)
                .or_else(|| {
                    warn!("Ignoring invalid cover month {:?} of year {}", month, year);
                    NaiveDate::from_ymd_opt(year, 1, 1)
                }),
            (None, Some(month)) => {
                warn!("Discarding cover month {} without a cover year", month);
                None
            }
            (None, None) => None,
        }
    }
}

fn apply_element(
    metadata: &mut ComicMetadata,
    cover: &mut CoverDateBuffer,
    tag: &str,
    value: &str,
) {
    match tag {
        "Publisher" => metadata.publisher = value.to_string(),
        "Imprint" => metadata.imprint = value.to_string(),
        "Series" => metadata.series = value.to_string(),
        "Volume" => metadata.volume = value.to_string(),
        "Number" => metadata.issue_number = value.to_string(),
        "Title" => metadata.title = value.to_string(),
        "Summary" => metadata.description = value.to_string(),
        "Notes" => metadata.notes = value.to_string(),
        "Year" => cover.year = parse_number(tag, value),
        "Month" => cover.month = parse_number(tag, value),
        "Characters" => metadata.characters.extend(split_list(value)),
        "Teams" => metadata.teams.extend(split_list(value)),
        "Locations" => metadata.locations.extend(split_list(value)),
        "AlternateSeries" => metadata.stories.extend(split_list(value)),

        _ => {
            if let Some(role) = CreditRole::from_tag(tag) {
                metadata
                    .credits
                    .extend(split_list(value).map(|name| Credit::new(&name, role)));
            }
        }
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn parse_number<T: std::str::FromStr>(tag: &str, value: &str) -> Option<T> {
    match value.parse::<T>() {
        Ok(number) => Some(number),
        Err(_) => {
            warn!("Ignoring non-numeric <{}> value \"{}\"", tag, value);
            None
        }
    }
}

fn push_text(current: &mut Option<(String, String)>, depth: usize, text: &str) {
    // text of nested elements belongs to an element we do not decode
    if depth != 2 {
        return;
    }

    if let Some((_, buffer)) = current.as_mut() {
        buffer.push_str(text);
    }
}

/// Resolves predefined entities and character references
fn resolve_entity(entity: &str) -> Option<String> {
    let resolved = match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        _ => {
            let code = entity.strip_prefix('#')?;
            let code = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse::<u32>().ok()?,
            };

            return char::from_u32(code).map(|c| c.to_string());
        }
    };

    Some(resolved.to_string())
}

fn write_element(writer: &mut XmlWriter, tag: &str, value: &str) -> Result<(), ComicError> {
    if value.is_empty() {
        return Ok(());
    }

    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;

    Ok(())
}

fn malformed(reason: &str) -> ComicError {
    ComicError::SidecarMalformed {
        reason: reason.to_string(),
    }
}
