//! ID3v2 tags (frame-based, at the start of the file)
//!
//! Byte layout:
//!
//! ```text
//! "ID3" major revision flags size(4, syncsafe)      10-byte header
//! [extended header]                                  if flags & 0x40
//! id(4) size(4) flags(2) body                        repeated frames
//! 00 00 ..                                           optional padding
//! ["3DI" footer]                                     v2.4, if flags & 0x10
//! ```
//!
//! Versions 2.3 and 2.4 are read; the adapter writes the version it was built
//! with. Frames map to store keys as follows:
//!
//! - text frames named in the field map: `title`, `artist`, `tracknumber`, ...
//! - other text frames: the frame id (`TKEY`)
//! - `TXXX`: the description (`Producer`), or `TXXX:<desc>` when the
//!   description would be routed to another frame
//! - `COMM` with an empty description: `comment`
//! - `PRIV`: the owner as a binary field, or `PRIV:<owner>` when needed
//! - anything else: the frame id with the raw body as binary (`APIC`)
//!
//! Duplicate keys keep the first frame.

mod frame;
mod header;

use crate::id3v2::frame::Route;
use crate::id3v2::header::{
    read_syncsafe, resynchronise, write_syncsafe, Header, FLAG_EXTENDED_HEADER,
    FLAG_UNSYNCHRONISATION, HEADER_LEN, MAX_SYNCSAFE,
};
use mtag_core::{
    Confidence, Decoded, Detection, FieldMapping, MergePolicy, Placement, Result, TagError,
    TagFormatAdapter, TagStore, TagValue,
};
use std::borrow::Cow;
use tracing::{debug, warn};

pub(crate) const FORMAT: &str = "ID3";

const FRAME_HEADER_LEN: usize = 10;

/// Largest padding a tag can carry (the whole tag body is at most 2^28 - 1 bytes)
pub const MAX_PADDING: usize = MAX_SYNCSAFE;

/// Field map for ID3v2.4
pub const FIELD_MAP_V24: &[FieldMapping] = &[
    FieldMapping::text("title", "TIT2"),
    FieldMapping::text("artist", "TPE1"),
    FieldMapping::text("album", "TALB"),
    FieldMapping::text("albumartist", "TPE2"),
    FieldMapping::text("composer", "TCOM"),
    FieldMapping::text("genre", "TCON"),
    FieldMapping::integer("tracknumber", "TRCK"),
    FieldMapping::integer("discnumber", "TPOS"),
    FieldMapping::integer("year", "TDRC"),
    FieldMapping::integer("bpm", "TBPM"),
    FieldMapping::integer("length", "TLEN"),
    FieldMapping::text("comment", "COMM"),
    FieldMapping::text("grouping", "TIT1"),
    FieldMapping::text("subtitle", "TIT3"),
    FieldMapping::text("lyricist", "TEXT"),
    FieldMapping::text("conductor", "TPE3"),
    FieldMapping::text("remixer", "TPE4"),
    FieldMapping::text("publisher", "TPUB"),
    FieldMapping::text("key", "TKEY"),
    FieldMapping::text("mood", "TMOO"),
    FieldMapping::text("language", "TLAN"),
    FieldMapping::text("isrc", "TSRC"),
    FieldMapping::text("encodedby", "TENC"),
    FieldMapping::text("encodersettings", "TSSE"),
    FieldMapping::text("copyright", "TCOP"),
    FieldMapping::text("titlesort", "TSOT"),
    FieldMapping::text("artistsort", "TSOP"),
    FieldMapping::text("albumsort", "TSOA"),
];

/// Field map for ID3v2.3 (TYER instead of TDRC, no mood or sort frames)
pub const FIELD_MAP_V23: &[FieldMapping] = &[
    FieldMapping::text("title", "TIT2"),
    FieldMapping::text("artist", "TPE1"),
    FieldMapping::text("album", "TALB"),
    FieldMapping::text("albumartist", "TPE2"),
    FieldMapping::text("composer", "TCOM"),
    FieldMapping::text("genre", "TCON"),
    FieldMapping::integer("tracknumber", "TRCK"),
    FieldMapping::integer("discnumber", "TPOS"),
    FieldMapping::integer("year", "TYER"),
    FieldMapping::integer("bpm", "TBPM"),
    FieldMapping::integer("length", "TLEN"),
    FieldMapping::text("comment", "COMM"),
    FieldMapping::text("grouping", "TIT1"),
    FieldMapping::text("subtitle", "TIT3"),
    FieldMapping::text("lyricist", "TEXT"),
    FieldMapping::text("conductor", "TPE3"),
    FieldMapping::text("remixer", "TPE4"),
    FieldMapping::text("publisher", "TPUB"),
    FieldMapping::text("key", "TKEY"),
    FieldMapping::text("language", "TLAN"),
    FieldMapping::text("isrc", "TSRC"),
    FieldMapping::text("encodedby", "TENC"),
    FieldMapping::text("encodersettings", "TSSE"),
    FieldMapping::text("copyright", "TCOP"),
];

/// ID3v2 revision written by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Id3v2Version {
    V3,
    #[default]
    V4,
}

impl Id3v2Version {
    pub fn major(self) -> u8 {
        match self {
            Self::V3 => 3,
            Self::V4 => 4,
        }
    }

    pub fn from_major(major: u8) -> Option<Self> {
        match major {
            3 => Some(Self::V3),
            4 => Some(Self::V4),
            _ => None,
        }
    }
}

/// Mapping for a frame id, falling back to the other revision's map
///
/// v2.3 files often carry v2.4 frames (TSOP, TDRC) and vice versa; they decode
/// to the same field names either way.
pub(crate) fn mapping_for_frame(
    map: &'static [FieldMapping],
    id: &str,
) -> Option<&'static FieldMapping> {
    FieldMapping::by_native(map, id, false)
        .or_else(|| FieldMapping::by_native(FIELD_MAP_V24, id, false))
        .or_else(|| FieldMapping::by_native(FIELD_MAP_V23, id, false))
}

fn field_map(major: u8) -> &'static [FieldMapping] {
    if major >= 4 {
        FIELD_MAP_V24
    } else {
        FIELD_MAP_V23
    }
}

/// ID3v2 codec
#[derive(Debug, Clone, Default)]
pub struct Id3v2Adapter {
    version: Id3v2Version,
    padding: usize,
}

impl Id3v2Adapter {
    /// Writes ID3v2.4 without padding
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: Id3v2Version) -> Self {
        self.version = version;
        self
    }

    /// Zero bytes appended after the last frame
    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn version(&self) -> Id3v2Version {
        self.version
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    fn decode_frame(
        map: &'static [FieldMapping],
        id: &str,
        data: &[u8],
    ) -> Result<Option<(String, TagValue)>> {
        let field = match id {
            "TXXX" => {
                let (desc, value) = frame::decode_user_text_body(data)?;
                (frame::user_text_key(map, &desc), TagValue::Text(value))
            }
            "COMM" => match frame::decode_comment_body(data) {
                Ok((desc, text)) if desc.is_empty() => ("comment".to_string(), TagValue::Text(text)),
                _ => (id.to_string(), TagValue::Binary(data.to_vec())),
            },
            "PRIV" => match frame::decode_private_body(data) {
                Some((owner, bytes)) => (frame::private_key(&owner), TagValue::Binary(bytes)),
                None => {
                    warn!("Skipping PRIV frame without an owner identifier");
                    return Ok(None);
                }
            },
            _ if id.starts_with('T') => {
                let text = frame::decode_text_body(id, data)?;
                match mapping_for_frame(map, id) {
                    Some(mapping) => (mapping.field.to_string(), mapping.kind.value_from_text(text)),
                    None => (id.to_string(), TagValue::Text(text)),
                }
            }
            _ => (id.to_string(), TagValue::Binary(data.to_vec())),
        };
        Ok(Some(field))
    }
}

/// Length of the extended header at the start of the tag body
fn extended_header_len(major: u8, body: &[u8]) -> Result<usize> {
    let raw = body
        .get(..4)
        .ok_or_else(|| TagError::format(FORMAT, "truncated extended header"))?;
    let len = if major >= 4 {
        read_syncsafe(raw)
            .map(|n| n as usize)
            .filter(|&n| n >= 6)
    } else {
        Some(4 + u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
    };
    len.filter(|&n| n <= body.len())
        .ok_or_else(|| TagError::format(FORMAT, "extended header overruns the tag"))
}

/// Strip per-frame prefixes and undo per-frame transforms
///
/// Returns `None` for frames that are compressed or encrypted.
fn frame_payload<'a>(major: u8, id: &str, flags: u16, data: &'a [u8]) -> Result<Option<Cow<'a, [u8]>>> {
    let (grouped, compressed, encrypted, unsynchronised, length_indicator) = if major >= 4 {
        (
            flags & 0x0040 != 0,
            flags & 0x0008 != 0,
            flags & 0x0004 != 0,
            flags & 0x0002 != 0,
            flags & 0x0001 != 0,
        )
    } else {
        (flags & 0x0020 != 0, flags & 0x0080 != 0, flags & 0x0040 != 0, false, false)
    };

    if compressed || encrypted {
        warn!("Skipping compressed or encrypted {} frame {}", FORMAT, id);
        return Ok(None);
    }

    let skip = usize::from(grouped) + if length_indicator { 4 } else { 0 };
    let data = data.get(skip..).ok_or_else(|| {
        TagError::format(FORMAT, format!("frame {} is shorter than its flags require", id))
    })?;

    Ok(Some(if unsynchronised {
        Cow::Owned(resynchronise(data))
    } else {
        Cow::Borrowed(data)
    }))
}

fn write_frame(out: &mut Vec<u8>, major: u8, id: &str, body: &[u8]) {
    out.extend_from_slice(id.as_bytes());
    if major >= 4 {
        out.extend_from_slice(&write_syncsafe(body.len() as u32));
    } else {
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(body);
}

impl TagFormatAdapter for Id3v2Adapter {
    fn name(&self) -> &'static str {
        "ID3v2"
    }

    fn detect(&self, file: &[u8]) -> Detection {
        let Some(header) = Header::parse(file) else {
            return Detection::NoMatch;
        };
        if !(2..=4).contains(&header.major) {
            return Detection::NoMatch;
        }

        let total = header.total_len();
        if total <= file.len() {
            Detection::Match {
                region: 0..total,
                confidence: Confidence::Certain,
            }
        } else {
            debug!(
                "ID3v2 header declares {} bytes but file has {}",
                total,
                file.len()
            );
            Detection::Match {
                region: 0..HEADER_LEN,
                confidence: Confidence::Likely,
            }
        }
    }

    fn decode(&self, region: &[u8]) -> Result<TagStore> {
        self.decode_report(region).map(|decoded| decoded.store)
    }

    fn decode_report(&self, region: &[u8]) -> Result<Decoded> {
        let header =
            Header::parse(region).ok_or_else(|| TagError::format(FORMAT, "missing ID3v2 header"))?;
        match header.major {
            3 | 4 => {}
            2 => return Err(TagError::format(FORMAT, "ID3v2.2 tags are not supported")),
            other => {
                return Err(TagError::format(
                    FORMAT,
                    format!("unknown version 2.{}", other),
                ))
            }
        }

        let end = HEADER_LEN + header.size;
        if end > region.len() {
            return Err(TagError::format(
                FORMAT,
                format!(
                    "declared size {} exceeds the {} bytes available",
                    header.size,
                    region.len() - HEADER_LEN
                ),
            ));
        }

        let raw = &region[HEADER_LEN..end];
        let body: Cow<'_, [u8]> =
            if header.major == 3 && header.flags & FLAG_UNSYNCHRONISATION != 0 {
                Cow::Owned(resynchronise(raw))
            } else {
                Cow::Borrowed(raw)
            };

        let mut pos = if header.flags & FLAG_EXTENDED_HEADER != 0 {
            extended_header_len(header.major, &body)?
        } else {
            0
        };

        let map = field_map(header.major);
        let mut store = TagStore::new();
        let mut skipped = Vec::new();

        while pos + FRAME_HEADER_LEN <= body.len() {
            if body[pos] == 0 {
                break;
            }

            let id = std::str::from_utf8(&body[pos..pos + 4])
                .ok()
                .filter(|id| frame::is_frame_id(id))
                .ok_or_else(|| {
                    TagError::format(FORMAT, format!("invalid frame id at offset {}", pos))
                })?;
            let size_bytes = &body[pos + 4..pos + 8];
            let size = if header.major >= 4 {
                read_syncsafe(size_bytes).ok_or_else(|| {
                    TagError::format(FORMAT, format!("frame {} has an invalid size", id))
                })? as usize
            } else {
                u32::from_be_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]])
                    as usize
            };
            let flags = u16::from_be_bytes([body[pos + 8], body[pos + 9]]);

            let start = pos + FRAME_HEADER_LEN;
            let data_end = start
                .checked_add(size)
                .filter(|&e| e <= body.len())
                .ok_or_else(|| TagError::format(FORMAT, format!("frame {} overruns the tag", id)))?;
            pos = data_end;

            let Some(data) = frame_payload(header.major, id, flags, &body[start..data_end])? else {
                skipped.push(id.to_string());
                continue;
            };
            match Self::decode_frame(map, id, &data)? {
                Some((key, value)) => {
                    if store.merge(key.clone(), value, MergePolicy::FirstWins) {
                        debug!("Ignoring repeated {} field '{}'", FORMAT, key);
                        skipped.push(id.to_string());
                    }
                }
                None => skipped.push(id.to_string()),
            }
        }

        Ok(Decoded { store, skipped })
    }

    fn encode(&self, store: &TagStore) -> Result<Vec<u8>> {
        let major = self.version.major();
        let map = field_map(major);
        if self.padding > MAX_PADDING {
            return Err(TagError::Config(format!(
                "{} padding of {} bytes exceeds the 256 MiB size limit",
                FORMAT, self.padding
            )));
        }
        let mut frames = Vec::new();

        for (key, value) in store.iter() {
            let bytes = value.as_binary().unwrap_or_default();
            let (id, body) = match frame::route(map, key, value)? {
                Route::Mapped(mapping) => (
                    mapping.native,
                    frame::encode_text_body(major, &value.to_display_string()),
                ),
                Route::Comment => ("COMM", frame::encode_comment_body(major, &value.to_display_string())),
                Route::TextFrame(id) => (id, frame::encode_text_body(major, &value.to_display_string())),
                Route::UserText(desc) => (
                    "TXXX",
                    frame::encode_user_text_body(major, desc, &value.to_display_string()),
                ),
                Route::Private(owner) => ("PRIV", frame::encode_private_body(key, owner, bytes)?),
                Route::RawFrame(id) => {
                    if id == "COMM"
                        && matches!(frame::decode_comment_body(bytes), Ok((desc, _)) if desc.is_empty())
                    {
                        return Err(TagError::unsupported(
                            FORMAT,
                            key,
                            "a COMM frame without description is addressed as 'comment'",
                        ));
                    }
                    (id, bytes.to_vec())
                }
            };

            if frames.len() + FRAME_HEADER_LEN + body.len() + self.padding > MAX_SYNCSAFE {
                return Err(TagError::unsupported(
                    FORMAT,
                    key,
                    "tag would exceed the 256 MiB ID3v2 size limit",
                ));
            }
            write_frame(&mut frames, major, id, &body);
        }

        frames.resize(frames.len() + self.padding, 0);

        let header = Header {
            major,
            revision: 0,
            flags: 0,
            size: frames.len(),
        };
        let mut out = Vec::with_capacity(HEADER_LEN + frames.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&frames);
        Ok(out)
    }

    fn placement(&self) -> Placement {
        Placement::Leading { order: 0 }
    }

    fn default_field_map(&self) -> &'static [FieldMapping] {
        field_map(self.version.major())
    }

    fn merge_policy(&self) -> MergePolicy {
        MergePolicy::FirstWins
    }
}
