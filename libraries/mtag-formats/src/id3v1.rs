//! ID3v1 and ID3v1.1 trailers (fixed 128-byte block at the end of the file)
//!
//! ```text
//! "TAG" title(30) artist(30) album(30) year(4) comment(30) genre(1)
//! ```
//!
//! ID3v1.1 splits the comment into 28 bytes, a zero byte and a track number.
//! Text is Latin-1, padded with NUL (some writers pad with spaces). Only the
//! seven fields of the block exist; genre 255 means "no genre".
//!
//! A decoded store always lists its fields in slot order, so `encode` only
//! accepts stores in that order and [`Id3v1Adapter::arrange`] sorts edits
//! into it.

use crate::text;
use mtag_core::{
    Confidence, Detection, FieldMapping, MergePolicy, Placement, Result, TagError,
    TagFormatAdapter, TagStore, TagValue,
};
use std::ops::RangeInclusive;

pub(crate) const FORMAT: &str = "ID3v1";

const TAG_LEN: usize = 128;
const TEXT_SLOT: usize = 30;
const YEAR_SLOT: usize = 4;
const SHORT_COMMENT_SLOT: usize = 28;
const NO_GENRE: u8 = 255;

/// Field map for the ID3v1 block (natives name the slots)
pub const FIELD_MAP: &[FieldMapping] = &[
    FieldMapping::text("title", "Title"),
    FieldMapping::text("artist", "Artist"),
    FieldMapping::text("album", "Album"),
    FieldMapping::integer("year", "Year"),
    FieldMapping::text("comment", "Comment"),
    FieldMapping::integer("tracknumber", "Track"),
    FieldMapping::integer("genre", "Genre"),
];

/// Store keys in the order their slots appear in the block
const SLOT_ORDER: [&str; 7] = [
    "title",
    "artist",
    "album",
    "year",
    "comment",
    "tracknumber",
    "genre",
];

fn slot_rank(key: &str) -> usize {
    SLOT_ORDER
        .iter()
        .position(|slot| *slot == key)
        .unwrap_or(SLOT_ORDER.len())
}

const TRACK_RANGE: RangeInclusive<i64> = 1..=255;
const GENRE_RANGE: RangeInclusive<i64> = 0..=254;
const YEAR_RANGE: RangeInclusive<i64> = 0..=9999;

/// ID3v1 codec
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3v1Adapter;

impl Id3v1Adapter {
    pub fn new() -> Self {
        Self
    }
}

fn decode_slot(bytes: &[u8]) -> Option<String> {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0 && b != b' ')
        .map_or(0, |i| i + 1);
    (end > 0).then(|| text::decode_latin1(&bytes[..end]))
}

/// Latin-1 bytes of a text slot value
fn encode_slot(key: &str, value: &TagValue, slot: usize) -> Result<Vec<u8>> {
    let reject = |reason: String| TagError::unsupported(FORMAT, key, reason);

    let text = value
        .as_text()
        .ok_or_else(|| reject(format!("{} values cannot be stored", value.kind_name())))?;
    if text.is_empty() {
        return Err(reject("empty values cannot be stored".into()));
    }
    if text.contains('\0') || text.ends_with(char::is_whitespace) {
        return Err(reject("text cannot contain NUL or end in whitespace".into()));
    }
    let bytes = text::encode_latin1(text)
        .ok_or_else(|| reject("text is not representable in Latin-1".into()))?;
    if bytes.len() > slot {
        return Err(reject(format!("text is longer than {} bytes", slot)));
    }
    Ok(bytes)
}

/// Integer held by `value` within `range`
fn encode_number(key: &str, value: &TagValue, range: RangeInclusive<i64>) -> Result<i64> {
    value.as_integer().filter(|n| range.contains(n)).ok_or_else(|| {
        TagError::unsupported(
            FORMAT,
            key,
            format!("expected an integer in {}..={}", range.start(), range.end()),
        )
    })
}

fn put(out: &mut [u8], at: usize, bytes: &[u8]) {
    out[at..at + bytes.len()].copy_from_slice(bytes);
}

impl TagFormatAdapter for Id3v1Adapter {
    fn name(&self) -> &'static str {
        "ID3v1"
    }

    fn detect(&self, file: &[u8]) -> Detection {
        match file.len().checked_sub(TAG_LEN) {
            Some(start) if file[start..].starts_with(b"TAG") => Detection::Match {
                region: start..file.len(),
                confidence: Confidence::Certain,
            },
            _ => Detection::NoMatch,
        }
    }

    fn decode(&self, region: &[u8]) -> Result<TagStore> {
        if region.len() != TAG_LEN || !region.starts_with(b"TAG") {
            return Err(TagError::format(
                FORMAT,
                format!("expected a 128-byte TAG block, got {} bytes", region.len()),
            ));
        }

        let mut store = TagStore::new();
        let mut put_field = |key: &str, value: TagValue| {
            store.merge(key.to_string(), value, MergePolicy::LastWins);
        };

        for (key, at) in [("title", 3), ("artist", 33), ("album", 63)] {
            if let Some(value) = decode_slot(&region[at..at + TEXT_SLOT]) {
                put_field(key, TagValue::Text(value));
            }
        }
        if let Some(year) = decode_slot(&region[93..93 + YEAR_SLOT]) {
            put_field("year", TagValue::canonical_integer(&year).map_or(TagValue::Text(year), TagValue::Integer));
        }

        let comment = &region[97..127];
        let track = (comment[28] == 0 && comment[29] != 0).then_some(comment[29]);
        let comment_len = if track.is_some() { SHORT_COMMENT_SLOT } else { TEXT_SLOT };
        if let Some(value) = decode_slot(&comment[..comment_len]) {
            put_field("comment", TagValue::Text(value));
        }
        if let Some(track) = track {
            put_field("tracknumber", TagValue::Integer(i64::from(track)));
        }
        if region[127] != NO_GENRE {
            put_field("genre", TagValue::Integer(i64::from(region[127])));
        }

        Ok(store)
    }

    fn encode(&self, store: &TagStore) -> Result<Vec<u8>> {
        let mut out = vec![0_u8; TAG_LEN];
        put(&mut out, 0, b"TAG");
        out[127] = NO_GENRE;

        let has_track = store.contains_key("tracknumber");
        let mut last_rank = 0;

        for (key, value) in store.iter() {
            let rank = slot_rank(key);
            if rank < last_rank {
                return Err(TagError::unsupported(
                    FORMAT,
                    key,
                    "ID3v1 fields must be in slot order (title, artist, album, year, comment, tracknumber, genre)",
                ));
            }
            last_rank = rank;

            match key {
                "title" => put(&mut out, 3, &encode_slot(key, value, TEXT_SLOT)?),
                "artist" => put(&mut out, 33, &encode_slot(key, value, TEXT_SLOT)?),
                "album" => put(&mut out, 63, &encode_slot(key, value, TEXT_SLOT)?),
                "year" => {
                    let bytes = match value {
                        TagValue::Integer(_) => encode_number(key, value, YEAR_RANGE)?
                            .to_string()
                            .into_bytes(),
                        TagValue::Text(text) if TagValue::canonical_integer(text).is_some() => {
                            return Err(TagError::unsupported(
                                FORMAT,
                                key,
                                "numeric years are stored as integers",
                            ))
                        }
                        _ => encode_slot(key, value, YEAR_SLOT)?,
                    };
                    put(&mut out, 93, &bytes);
                }
                "comment" => {
                    let slot = if has_track { SHORT_COMMENT_SLOT } else { TEXT_SLOT };
                    put(&mut out, 97, &encode_slot(key, value, slot)?);
                }
                "tracknumber" => out[126] = encode_number(key, value, TRACK_RANGE)? as u8,
                "genre" => out[127] = encode_number(key, value, GENRE_RANGE)? as u8,
                _ => {
                    return Err(TagError::unsupported(
                        FORMAT,
                        key,
                        "ID3v1 only stores title, artist, album, year, comment, tracknumber and genre",
                    ))
                }
            }
        }

        Ok(out)
    }

    fn placement(&self) -> Placement {
        Placement::Trailing { order: 255 }
    }

    fn default_field_map(&self) -> &'static [FieldMapping] {
        FIELD_MAP
    }

    fn merge_policy(&self) -> MergePolicy {
        MergePolicy::LastWins
    }

    /// Sort fields into slot order; keys without a slot go last
    fn arrange(&self, store: &mut TagStore) {
        store.sort_by_rank(slot_rank);
    }
}
