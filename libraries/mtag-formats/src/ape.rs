//! APEv2 tags (flat typed key/value items, at the end of the file)
//!
//! Byte layout:
//!
//! ```text
//! ["APETAGEX" header]                      32 bytes, optional
//! size(4) flags(4) key NUL value           repeated items
//! "APETAGEX" footer                        32 bytes
//! ["TAG" ID3v1 trailer]                    128 bytes, optional
//! ```
//!
//! Header and footer share one layout: preamble, version, tag size (items +
//! footer), item count, flags, 8 reserved bytes. All integers are
//! little-endian.
//!
//! Item keys are case-insensitive on disk. Keys named in the field map
//! (`Title`, `Track`, ...) surface as the neutral field names; everything else
//! keeps its on-disk spelling.

use mtag_core::{
    Confidence, Decoded, Detection, FieldKind, FieldMapping, MergePolicy, Placement, Result,
    TagError, TagFormatAdapter, TagStore, TagValue,
};
use std::collections::HashSet;
use tracing::debug;

pub(crate) const FORMAT: &str = "APE";

const PREAMBLE: &[u8; 8] = b"APETAGEX";
const BLOCK_LEN: usize = 32;
const ID3V1_LEN: usize = 128;

const VERSION_1: u32 = 1000;
const VERSION_2: u32 = 2000;

const FLAG_HAS_HEADER: u32 = 1 << 31;
const FLAG_IS_HEADER: u32 = 1 << 29;

const ITEM_TEXT: u32 = 0;
const ITEM_BINARY: u32 = 1;
const ITEM_LOCATOR: u32 = 2;

const RESERVED_KEYS: [&str; 4] = ["ID3", "TAG", "OggS", "MP+"];

/// Field map for APEv2 item keys
pub const FIELD_MAP: &[FieldMapping] = &[
    FieldMapping::text("title", "Title"),
    FieldMapping::text("artist", "Artist"),
    FieldMapping::text("album", "Album"),
    FieldMapping::text("albumartist", "Album Artist"),
    FieldMapping::text("composer", "Composer"),
    FieldMapping::text("genre", "Genre"),
    FieldMapping::integer("tracknumber", "Track"),
    FieldMapping::integer("discnumber", "Disc"),
    FieldMapping::integer("year", "Year"),
    FieldMapping::integer("bpm", "BPM"),
    FieldMapping::integer("length", "Length"),
    FieldMapping::text("comment", "Comment"),
    FieldMapping::text("grouping", "Grouping"),
    FieldMapping::text("subtitle", "Subtitle"),
    FieldMapping::text("lyricist", "Lyricist"),
    FieldMapping::text("conductor", "Conductor"),
    FieldMapping::text("remixer", "MixArtist"),
    FieldMapping::text("publisher", "Label"),
    FieldMapping::text("mood", "Mood"),
    FieldMapping::text("language", "Language"),
    FieldMapping::text("isrc", "ISRC"),
    FieldMapping::text("encodedby", "EncodedBy"),
    FieldMapping::text("copyright", "Copyright"),
];

/// 32-byte header or footer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    version: u32,
    /// Items plus footer, excluding the header
    size: usize,
    item_count: u32,
    flags: u32,
}

impl Block {
    fn parse(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..BLOCK_LEN)?;
        if &raw[..8] != PREAMBLE {
            return None;
        }
        Some(Self {
            version: read_u32(&raw[8..12]),
            size: read_u32(&raw[12..16]) as usize,
            item_count: read_u32(&raw[16..20]),
            flags: read_u32(&raw[20..24]),
        })
    }

    fn has_header(&self) -> bool {
        self.flags & FLAG_HAS_HEADER != 0
    }

    fn is_header(&self) -> bool {
        self.flags & FLAG_IS_HEADER != 0
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(PREAMBLE);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.size as u32).to_le_bytes());
        out.extend_from_slice(&self.item_count.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&[0; 8]);
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// 2-255 printable ASCII characters
fn is_valid_key(key: &str) -> bool {
    (2..=255).contains(&key.len()) && key.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.iter().any(|r| r.eq_ignore_ascii_case(key))
}

/// APEv2 codec
#[derive(Debug, Clone)]
pub struct ApeAdapter {
    write_header: bool,
}

impl Default for ApeAdapter {
    fn default() -> Self {
        Self { write_header: true }
    }
}

impl ApeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit the optional header block in front of the items
    pub fn with_header(mut self, write_header: bool) -> Self {
        self.write_header = write_header;
        self
    }

    pub fn writes_header(&self) -> bool {
        self.write_header
    }

    /// Footer position: end of file, or just before an ID3v1 trailer
    fn find_footer(file: &[u8]) -> Option<(usize, Block)> {
        let mut ends = vec![file.len()];
        if file.len() >= ID3V1_LEN && file[file.len() - ID3V1_LEN..].starts_with(b"TAG") {
            ends.push(file.len() - ID3V1_LEN);
        }
        ends.into_iter().find_map(|end| {
            let start = end.checked_sub(BLOCK_LEN)?;
            let block = Block::parse(&file[start..end])?;
            (!block.is_header() && matches!(block.version, VERSION_1 | VERSION_2))
                .then_some((end, block))
        })
    }

    /// Item key and value for one store entry
    fn item_for<'a>(key: &'a str, value: &'a TagValue) -> Result<(&'a str, u32, Vec<u8>)> {
        let reject = |reason: &str| TagError::unsupported(FORMAT, key, reason);

        if let Some(mapping) = FieldMapping::by_field(FIELD_MAP, key) {
            return match value {
                TagValue::Text(text) => Ok((mapping.native, ITEM_TEXT, text.as_bytes().to_vec())),
                TagValue::Integer(n) if mapping.kind == FieldKind::Integer => {
                    Ok((mapping.native, ITEM_TEXT, n.to_string().into_bytes()))
                }
                TagValue::Integer(_) => Err(reject("field does not hold integers")),
                TagValue::Binary(_) => Err(reject("mapped fields cannot hold binary values")),
            };
        }

        if !is_valid_key(key) {
            return Err(reject("item keys must be 2-255 printable ASCII characters"));
        }
        if is_reserved_key(key) {
            return Err(reject("reserved item key"));
        }

        let mapped_native = FieldMapping::by_native(FIELD_MAP, key, true).is_some();
        match value {
            TagValue::Binary(bytes) => Ok((key, ITEM_BINARY, bytes.clone())),
            TagValue::Text(_) if mapped_native => {
                Err(reject("item is addressed by its field name"))
            }
            TagValue::Text(text) => Ok((key, ITEM_TEXT, text.as_bytes().to_vec())),
            TagValue::Integer(_) => Err(reject("only mapped numeric fields hold integers")),
        }
    }

    fn decode_item(key: &str, kind: u32, value: &[u8]) -> Result<(String, TagValue)> {
        if kind == ITEM_TEXT || kind == ITEM_LOCATOR {
            let text = std::str::from_utf8(value)
                .map_err(|_| {
                    TagError::format(FORMAT, format!("item '{}' is not valid UTF-8", key))
                })?
                .to_string();
            if kind == ITEM_LOCATOR {
                debug!("Reading APE locator item '{}' as text", key);
            }
            return Ok(match FieldMapping::by_native(FIELD_MAP, key, true) {
                Some(mapping) => (mapping.field.to_string(), mapping.kind.value_from_text(text)),
                None => (key.to_string(), TagValue::Text(text)),
            });
        }
        Ok((key.to_string(), TagValue::Binary(value.to_vec())))
    }
}

impl TagFormatAdapter for ApeAdapter {
    fn name(&self) -> &'static str {
        "APEv2"
    }

    fn detect(&self, file: &[u8]) -> Detection {
        let Some((end, footer)) = Self::find_footer(file) else {
            return Detection::NoMatch;
        };

        let header_len = if footer.has_header() { BLOCK_LEN } else { 0 };
        let start = footer
            .size
            .checked_add(header_len)
            .filter(|_| footer.size >= BLOCK_LEN)
            .and_then(|len| end.checked_sub(len));
        let header_ok = |start: usize| {
            !footer.has_header()
                || Block::parse(&file[start..]).is_some_and(|header| header.is_header())
        };

        match start {
            Some(start) if header_ok(start) => Detection::Match {
                region: start..end,
                confidence: Confidence::Certain,
            },
            _ => {
                debug!("APE footer at {} declares an impossible size {}", end - BLOCK_LEN, footer.size);
                Detection::Match {
                    region: end - BLOCK_LEN..end,
                    confidence: Confidence::Likely,
                }
            }
        }
    }

    fn decode(&self, region: &[u8]) -> Result<TagStore> {
        self.decode_report(region).map(|decoded| decoded.store)
    }

    fn decode_report(&self, region: &[u8]) -> Result<Decoded> {
        let footer_start = region
            .len()
            .checked_sub(BLOCK_LEN)
            .ok_or_else(|| TagError::format(FORMAT, "region is shorter than a footer"))?;
        let footer = Block::parse(&region[footer_start..])
            .filter(|block| !block.is_header())
            .ok_or_else(|| TagError::format(FORMAT, "missing APE footer"))?;
        if footer.size < BLOCK_LEN || footer.size > region.len() {
            return Err(TagError::format(
                FORMAT,
                format!(
                    "declared size {} does not fit the {} bytes available",
                    footer.size,
                    region.len()
                ),
            ));
        }

        let items = &region[region.len() - footer.size..footer_start];
        let mut store = TagStore::new();
        let mut skipped = Vec::new();
        let mut pos = 0;

        for index in 0..footer.item_count {
            let overrun = || TagError::format(FORMAT, format!("item {} overruns the tag", index));

            let fixed = items.get(pos..pos + 8).ok_or_else(overrun)?;
            let value_len = read_u32(&fixed[..4]) as usize;
            let flags = read_u32(&fixed[4..8]);
            pos += 8;

            let key_len = items[pos..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(overrun)?;
            let key = std::str::from_utf8(&items[pos..pos + key_len])
                .ok()
                .filter(|key| is_valid_key(key))
                .ok_or_else(|| TagError::format(FORMAT, format!("item {} has an invalid key", index)))?;
            pos += key_len + 1;

            let value = pos
                .checked_add(value_len)
                .and_then(|end| items.get(pos..end))
                .ok_or_else(overrun)?;
            pos += value_len;

            let kind = if footer.version == VERSION_1 {
                ITEM_TEXT
            } else {
                (flags >> 1) & 0x03
            };
            let (field, value) = Self::decode_item(key, kind, value)?;
            if store.merge(field.clone(), value, MergePolicy::LastWins) {
                debug!("Repeated {} item '{}', keeping the last one", FORMAT, field);
                skipped.push(key.to_string());
            }
        }

        Ok(Decoded { store, skipped })
    }

    fn encode(&self, store: &TagStore) -> Result<Vec<u8>> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for (key, value) in store.iter() {
            let (native, kind, bytes) = Self::item_for(key, value)?;
            if !seen.insert(native.to_ascii_lowercase()) {
                return Err(TagError::unsupported(
                    FORMAT,
                    key,
                    "item keys are case-insensitive and this one is already used",
                ));
            }
            if items.len() + bytes.len() + native.len() + 9 + 2 * BLOCK_LEN > u32::MAX as usize {
                return Err(TagError::unsupported(
                    FORMAT,
                    key,
                    "tag would exceed the 4 GiB APE size limit",
                ));
            }

            items.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            items.extend_from_slice(&(kind << 1).to_le_bytes());
            items.extend_from_slice(native.as_bytes());
            items.push(0);
            items.extend_from_slice(&bytes);
        }

        let has_header = if self.write_header { FLAG_HAS_HEADER } else { 0 };
        let footer = Block {
            version: VERSION_2,
            size: items.len() + BLOCK_LEN,
            item_count: store.len() as u32,
            flags: has_header,
        };

        let mut out = Vec::with_capacity(items.len() + 2 * BLOCK_LEN);
        if self.write_header {
            Block {
                flags: has_header | FLAG_IS_HEADER,
                ..footer
            }
            .write(&mut out);
        }
        out.extend_from_slice(&items);
        footer.write(&mut out);
        Ok(out)
    }

    fn placement(&self) -> Placement {
        Placement::Trailing { order: 0 }
    }

    fn default_field_map(&self) -> &'static [FieldMapping] {
        FIELD_MAP
    }

    fn merge_policy(&self) -> MergePolicy {
        MergePolicy::LastWins
    }
}
