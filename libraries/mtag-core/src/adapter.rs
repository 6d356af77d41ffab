/// Format adapter trait and the small types it speaks in
use crate::error::Result;
use crate::store::{MergePolicy, TagStore};
use crate::value::TagValue;
use std::fmt::Debug;
use std::ops::Range;

/// How sure an adapter is about a signature match
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    /// Signature present but the surrounding structure does not add up
    Likely,
    /// Header validated and the declared size fits the input
    Certain,
}

/// Outcome of sniffing a file for one format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    NoMatch,
    Match {
        /// Byte range of the tag block within the file
        region: Range<usize>,
        confidence: Confidence,
    },
}

impl Detection {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match { .. })
    }

    pub fn region(&self) -> Option<Range<usize>> {
        match self {
            Self::Match { region, .. } => Some(region.clone()),
            Self::NoMatch => None,
        }
    }

    pub fn confidence(&self) -> Option<Confidence> {
        match self {
            Self::Match { confidence, .. } => Some(*confidence),
            Self::NoMatch => None,
        }
    }
}

/// Where a freshly encoded block goes when a file is rewritten
///
/// Blocks on the same side are ordered by ascending `order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Leading { order: u8 },
    Trailing { order: u8 },
}

/// Value type a mapped field carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
}

impl FieldKind {
    /// Turn decoded native text into a value of this kind
    ///
    /// Integer fields only become `TagValue::Integer` when the text is a
    /// canonical decimal; anything else ("3/12") stays text.
    pub fn value_from_text(self, text: String) -> TagValue {
        match self {
            Self::Integer => match TagValue::canonical_integer(&text) {
                Some(n) => TagValue::Integer(n),
                None => TagValue::Text(text),
            },
            Self::Text => TagValue::Text(text),
        }
    }
}

/// Mapping between a format-neutral field name and a native key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    /// Format-neutral name, e.g. "title"
    pub field: &'static str,
    /// Native key, e.g. "TIT2"
    pub native: &'static str,
    pub kind: FieldKind,
}

impl FieldMapping {
    pub const fn text(field: &'static str, native: &'static str) -> Self {
        Self {
            field,
            native,
            kind: FieldKind::Text,
        }
    }

    pub const fn integer(field: &'static str, native: &'static str) -> Self {
        Self {
            field,
            native,
            kind: FieldKind::Integer,
        }
    }

    /// Look up a mapping by its format-neutral name
    pub fn by_field<'a>(map: &'a [FieldMapping], field: &str) -> Option<&'a FieldMapping> {
        map.iter().find(|m| m.field == field)
    }

    /// Look up a mapping by native key
    pub fn by_native<'a>(
        map: &'a [FieldMapping],
        native: &str,
        ignore_case: bool,
    ) -> Option<&'a FieldMapping> {
        map.iter().find(|m| {
            if ignore_case {
                m.native.eq_ignore_ascii_case(native)
            } else {
                m.native == native
            }
        })
    }
}

/// A decoded store plus whatever the decoder had to leave out
///
/// `skipped` names frames or items that were present in the block but are
/// not in the store (unreadable frames, duplicates dropped by the merge
/// policy). Encoding the store again loses them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub store: TagStore,
    pub skipped: Vec<String>,
}

/// Codec for one on-disk tag format
///
/// Adapters hold only static format rules and are shared read-only by every
/// open file, so they must be `Send + Sync`.
///
/// Contract:
/// - `detect` never fails and never mutates its input; foreign or garbage
///   input is `Detection::NoMatch`.
/// - `decode` either returns a complete store or an error, never a partial one.
/// - `encode` is deterministic and names the offending key when it rejects a
///   field. For every store it accepts, `decode(encode(s)) == s`.
pub trait TagFormatAdapter: Send + Sync + Debug {
    /// Human-readable format name
    fn name(&self) -> &'static str;

    /// Sniff a whole file for this format's block
    fn detect(&self, file: &[u8]) -> Detection;

    /// Parse the bytes of a detected region into a store
    fn decode(&self, region: &[u8]) -> Result<TagStore>;

    /// Like `decode`, also reporting what did not make it into the store
    fn decode_report(&self, region: &[u8]) -> Result<Decoded> {
        Ok(Decoded {
            store: self.decode(region)?,
            skipped: Vec::new(),
        })
    }

    /// Serialize a store into a complete tag block
    fn encode(&self, store: &TagStore) -> Result<Vec<u8>>;

    /// Where the encoded block belongs in the file
    fn placement(&self) -> Placement;

    /// Format-neutral field names this format understands natively
    fn default_field_map(&self) -> &'static [FieldMapping];

    /// Duplicate-key policy applied while decoding
    fn merge_policy(&self) -> MergePolicy {
        MergePolicy::LastWins
    }

    /// Reorder a store into the order `decode` produces for this format
    ///
    /// Formats that keep fields in insertion order leave the store alone.
    fn arrange(&self, _store: &mut TagStore) {}
}
