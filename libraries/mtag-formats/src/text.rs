//! Byte/text conversions shared by the adapters

/// Decode ISO-8859-1 bytes; every byte maps to the code point of the same value
pub(crate) fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encode text as ISO-8859-1, or `None` if a character falls outside it
pub(crate) fn encode_latin1(text: &str) -> Option<Vec<u8>> {
    text.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}

pub(crate) fn is_latin1(text: &str) -> bool {
    text.chars().all(|c| u32::from(c) <= 0xFF)
}

/// Decode UTF-16 with an optional byte order mark (little-endian if absent)
pub(crate) fn decode_utf16_bom(bytes: &[u8]) -> Option<String> {
    match bytes {
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, false),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, true),
        _ => decode_utf16(bytes, false),
    }
}

pub(crate) fn decode_utf16(bytes: &[u8], big_endian: bool) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units = bytes.chunks_exact(2).map(|pair| {
        if big_endian {
            u16::from_be_bytes([pair[0], pair[1]])
        } else {
            u16::from_le_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

/// Little-endian UTF-16 with a leading BOM
pub(crate) fn encode_utf16_bom(text: &str) -> Vec<u8> {
    let mut out = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Split at the first terminator, returning (before, after)
///
/// `wide` terminators are two zero bytes aligned on an even offset.
pub(crate) fn split_terminated(bytes: &[u8], wide: bool) -> Option<(&[u8], &[u8])> {
    if wide {
        let pos = bytes
            .chunks_exact(2)
            .position(|pair| pair == [0, 0])?
            * 2;
        Some((&bytes[..pos], &bytes[pos + 2..]))
    } else {
        let pos = bytes.iter().position(|&b| b == 0)?;
        Some((&bytes[..pos], &bytes[pos + 1..]))
    }
}

/// Drop trailing zero bytes (narrow) or zero code units (wide)
pub(crate) fn trim_terminators(bytes: &[u8], wide: bool) -> &[u8] {
    let mut end = bytes.len();
    if wide {
        end -= end % 2;
        while end >= 2 && bytes[end - 2] == 0 && bytes[end - 1] == 0 {
            end -= 2;
        }
    } else {
        while end > 0 && bytes[end - 1] == 0 {
            end -= 1;
        }
    }
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_round_trip_and_rejection() {
        assert_eq!(encode_latin1("Café").unwrap(), b"Caf\xe9");
        assert_eq!(decode_latin1(b"Caf\xe9"), "Café");
        assert!(encode_latin1("日本").is_none());
        assert!(is_latin1("ÿ"));
        assert!(!is_latin1("Ā"));
    }

    #[test]
    fn utf16_bom_detection() {
        assert_eq!(decode_utf16_bom(&[0xFF, 0xFE, b'A', 0]).unwrap(), "A");
        assert_eq!(decode_utf16_bom(&[0xFE, 0xFF, 0, b'A']).unwrap(), "A");
        assert_eq!(decode_utf16_bom(&encode_utf16_bom("日本")).unwrap(), "日本");
        assert!(decode_utf16(&[0x41], false).is_none());
    }

    #[test]
    fn split_respects_alignment() {
        // 0x00 0x00 at an odd offset is not a wide terminator
        let bytes = [b'A', 0, 0, b'B', 0, 0, b'C', 0];
        let (head, tail) = split_terminated(&bytes, true).unwrap();
        assert_eq!(head, &[b'A', 0, 0, b'B']);
        assert_eq!(tail, &[b'C', 0]);

        let (head, tail) = split_terminated(b"ab\0cd", false).unwrap();
        assert_eq!(head, b"ab");
        assert_eq!(tail, b"cd");
        assert!(split_terminated(b"abc", false).is_none());
    }

    #[test]
    fn trims_trailing_terminators() {
        assert_eq!(trim_terminators(b"abc\0\0", false), b"abc");
        assert_eq!(trim_terminators(&[b'a', 0, 0, 0], true), &[b'a', 0]);
    }
}
