/// ID3v2 tag header, syncsafe integers and unsynchronisation

pub(crate) const HEADER_LEN: usize = 10;
pub(crate) const FOOTER_LEN: usize = 10;

/// Largest value a 28-bit syncsafe integer can hold
pub(crate) const MAX_SYNCSAFE: usize = 0x0FFF_FFFF;

pub(crate) const FLAG_UNSYNCHRONISATION: u8 = 0x80;
pub(crate) const FLAG_EXTENDED_HEADER: u8 = 0x40;
pub(crate) const FLAG_FOOTER: u8 = 0x10;

/// Parsed 10-byte tag header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub major: u8,
    pub revision: u8,
    pub flags: u8,
    /// Size of everything after the header, excluding any footer
    pub size: usize,
}

impl Header {
    /// Parse a header at the start of `bytes`
    ///
    /// Only the fixed structure is checked here: magic, version bytes that are
    /// not 0xFF, and size bytes with the high bit clear.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..HEADER_LEN)?;
        if &raw[..3] != b"ID3" || raw[3] == 0xFF || raw[4] == 0xFF {
            return None;
        }
        let size = read_syncsafe(&raw[6..10])?;
        Some(Self {
            major: raw[3],
            revision: raw[4],
            flags: raw[5],
            size: size as usize,
        })
    }

    pub fn has_footer(&self) -> bool {
        self.major >= 4 && self.flags & FLAG_FOOTER != 0
    }

    /// Header + body + optional footer
    pub fn total_len(&self) -> usize {
        HEADER_LEN + self.size + if self.has_footer() { FOOTER_LEN } else { 0 }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let size = write_syncsafe(self.size as u32);
        [
            b'I',
            b'D',
            b'3',
            self.major,
            self.revision,
            self.flags,
            size[0],
            size[1],
            size[2],
            size[3],
        ]
    }
}

/// Read a 4-byte syncsafe integer (7 bits per byte)
pub(crate) fn read_syncsafe(bytes: &[u8]) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    if raw.iter().any(|b| b & 0x80 != 0) {
        return None;
    }
    Some(raw.iter().fold(0_u32, |acc, &b| (acc << 7) | u32::from(b)))
}

pub(crate) fn write_syncsafe(n: u32) -> [u8; 4] {
    [
        ((n >> 21) & 0x7F) as u8,
        ((n >> 14) & 0x7F) as u8,
        ((n >> 7) & 0x7F) as u8,
        (n & 0x7F) as u8,
    ]
}

/// Undo unsynchronisation: every 0xFF 0x00 pair becomes 0xFF
pub(crate) fn resynchronise(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut prev_ff = false;
    for &b in bytes {
        if prev_ff && b == 0x00 {
            prev_ff = false;
            continue;
        }
        out.push(b);
        prev_ff = b == 0xFF;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syncsafe_round_trip() {
        assert_eq!(write_syncsafe(257), [0, 0, 2, 1]);
        assert_eq!(read_syncsafe(&[0, 0, 2, 1]), Some(257));
        assert_eq!(
            read_syncsafe(&write_syncsafe(MAX_SYNCSAFE as u32)),
            Some(MAX_SYNCSAFE as u32)
        );
        assert_eq!(read_syncsafe(&[0, 0x80, 0, 0]), None);
    }

    #[test]
    fn parse_rejects_foreign_bytes() {
        assert!(Header::parse(b"RIFF\0\0\0\0WAVE").is_none());
        assert!(Header::parse(b"ID3").is_none());
        assert!(Header::parse(b"ID3\xff\0\0\0\0\0\0").is_none());
        assert!(Header::parse(b"ID3\x04\0\0\0\0\x80\0").is_none());
    }

    #[test]
    fn footer_only_counts_for_v4() {
        let mut header = Header::parse(b"ID3\x04\0\x10\0\0\0\x05").unwrap();
        assert_eq!(header.total_len(), 25);
        header.major = 3;
        assert_eq!(header.total_len(), 15);
    }

    #[test]
    fn resynchronise_drops_inserted_zeroes() {
        assert_eq!(
            resynchronise(&[0xFF, 0x00, 0xE0, 0xFF, 0x00, 0x00]),
            [0xFF, 0xE0, 0xFF, 0x00]
        );
    }
}
