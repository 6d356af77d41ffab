//! ID3v2 frame bodies and the mapping between store keys and frames
//!
//! Every store key has exactly one destination frame ("route"), and decoding
//! a frame produces the key that routes back to it. Keys that would not
//! survive that trip are rejected at encode time.

use super::{mapping_for_frame, FORMAT};
use crate::text;
use mtag_core::{FieldKind, FieldMapping, Result, TagError, TagValue};

pub(crate) const ENCODING_LATIN1: u8 = 0;
pub(crate) const ENCODING_UTF16_BOM: u8 = 1;
pub(crate) const ENCODING_UTF16_BE: u8 = 2;
pub(crate) const ENCODING_UTF8: u8 = 3;

const USER_TEXT_PREFIX: &str = "TXXX:";
const PRIVATE_PREFIX: &str = "PRIV:";
const COMMENT_LANGUAGE: &[u8; 3] = b"eng";

/// Destination frame of a store key
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route<'a> {
    /// Text frame named by the field map
    Mapped(&'static FieldMapping),
    /// COMM frame with an empty description
    Comment,
    /// Unmapped T*** frame addressed by its id
    TextFrame(&'a str),
    /// TXXX frame with the given description
    UserText(&'a str),
    /// PRIV frame with the given owner
    Private(&'a str),
    /// Any other frame, body passed through untouched
    RawFrame(&'a str),
}

/// Four characters of `[A-Z0-9]`, starting with a letter
pub(crate) fn is_frame_id(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() == 4
        && bytes[0].is_ascii_uppercase()
        && bytes
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Natural destination of a text or integer field
fn text_route<'a>(map: &'static [FieldMapping], key: &'a str) -> Route<'a> {
    if let Some(mapping) = FieldMapping::by_field(map, key) {
        return if mapping.native == "COMM" {
            Route::Comment
        } else {
            Route::Mapped(mapping)
        };
    }
    if is_frame_id(key) && key.starts_with('T') && key != "TXXX" {
        return Route::TextFrame(key);
    }
    Route::UserText(key)
}

/// Natural destination of a binary field
fn binary_route(key: &str) -> Route<'_> {
    if is_frame_id(key) && !key.starts_with('T') && key != "PRIV" {
        Route::RawFrame(key)
    } else {
        Route::Private(key)
    }
}

/// Pick the frame a field is written to, or explain why it cannot be written
pub(crate) fn route<'a>(
    map: &'static [FieldMapping],
    key: &'a str,
    value: &TagValue,
) -> Result<Route<'a>> {
    let reject = |reason: String| TagError::unsupported(FORMAT, key, reason);

    if key.contains(&['\0', '\u{FEFF}'][..]) {
        return Err(reject("keys cannot contain NUL or byte order marks".into()));
    }
    if let TagValue::Text(text) = value {
        if text.contains(&['\0', '\u{FEFF}'][..]) {
            return Err(reject("text cannot contain NUL or byte order marks".into()));
        }
    }

    if let Some(desc) = key.strip_prefix(USER_TEXT_PREFIX) {
        if !desc.is_empty() && text_route(map, desc) == Route::UserText(desc) {
            return Err(reject(format!("address this field as '{}'", desc)));
        }
        return match value {
            TagValue::Text(_) => Ok(Route::UserText(desc)),
            other => Err(reject(format!("TXXX frames hold text, not {}", other.kind_name()))),
        };
    }
    if let Some(owner) = key.strip_prefix(PRIVATE_PREFIX) {
        if !owner.is_empty() && binary_route(owner) == Route::Private(owner) {
            return Err(reject(format!("address this field as '{}'", owner)));
        }
        return match value {
            TagValue::Binary(_) => Ok(Route::Private(owner)),
            other => Err(reject(format!("PRIV frames hold binary, not {}", other.kind_name()))),
        };
    }

    match value {
        TagValue::Binary(_) => {
            if FieldMapping::by_field(map, key).is_some() {
                return Err(reject("mapped fields cannot hold binary data".into()));
            }
            Ok(binary_route(key))
        }
        TagValue::Text(_) | TagValue::Integer(_) => {
            let route = text_route(map, key);
            if route == Route::TextFrame(key) {
                if let Some(mapping) = mapping_for_frame(map, key) {
                    return Err(reject(format!("address this frame as '{}'", mapping.field)));
                }
            }
            let integer_ok =
                matches!(route, Route::Mapped(m) if m.kind == FieldKind::Integer);
            if matches!(value, TagValue::Integer(_)) && !integer_ok {
                return Err(reject("integers are only stored in numeric frames".into()));
            }
            Ok(route)
        }
    }
}

/// Store key a user-text frame decodes to
pub(crate) fn user_text_key(map: &'static [FieldMapping], desc: &str) -> String {
    if !desc.is_empty() && text_route(map, desc) == Route::UserText(desc) {
        desc.to_string()
    } else {
        format!("{}{}", USER_TEXT_PREFIX, desc)
    }
}

/// Store key a private frame decodes to
pub(crate) fn private_key(owner: &str) -> String {
    if !owner.is_empty() && binary_route(owner) == Route::Private(owner) {
        owner.to_string()
    } else {
        format!("{}{}", PRIVATE_PREFIX, owner)
    }
}

// ===== Decoding =====

fn is_wide(encoding: u8) -> bool {
    matches!(encoding, ENCODING_UTF16_BOM | ENCODING_UTF16_BE)
}

fn decode_string(frame_id: &str, encoding: u8, bytes: &[u8]) -> Result<String> {
    let wide = is_wide(encoding);
    let bytes = text::trim_terminators(bytes, wide);
    let decoded = match encoding {
        ENCODING_LATIN1 => Some(text::decode_latin1(bytes)),
        ENCODING_UTF16_BOM => text::decode_utf16_bom(bytes),
        ENCODING_UTF16_BE => text::decode_utf16(bytes, true),
        ENCODING_UTF8 => String::from_utf8(bytes.to_vec()).ok(),
        other => {
            return Err(TagError::format(
                FORMAT,
                format!("frame {} uses unknown text encoding {}", frame_id, other),
            ))
        }
    };
    let decoded = decoded.ok_or_else(|| {
        TagError::format(FORMAT, format!("frame {} holds invalid text", frame_id))
    })?;

    // Multiple values are NUL separated; later UTF-16 values repeat the BOM
    Ok(decoded
        .replace('\u{FEFF}', "")
        .split('\0')
        .collect::<Vec<_>>()
        .join("/"))
}

/// Body of a T*** frame
pub(crate) fn decode_text_body(frame_id: &str, body: &[u8]) -> Result<String> {
    match body.split_first() {
        Some((&encoding, rest)) => decode_string(frame_id, encoding, rest),
        None => Ok(String::new()),
    }
}

/// Split an encoded, terminated description off the front of `bytes`
fn split_description<'a>(
    frame_id: &str,
    encoding: u8,
    bytes: &'a [u8],
) -> Result<(String, &'a [u8])> {
    let (desc, rest) = text::split_terminated(bytes, is_wide(encoding)).ok_or_else(|| {
        TagError::format(FORMAT, format!("frame {} has an unterminated description", frame_id))
    })?;
    Ok((decode_string(frame_id, encoding, desc)?, rest))
}

/// Body of a TXXX frame: (description, value)
pub(crate) fn decode_user_text_body(body: &[u8]) -> Result<(String, String)> {
    let (&encoding, rest) = body
        .split_first()
        .ok_or_else(|| TagError::format(FORMAT, "empty TXXX frame"))?;
    let (desc, value) = split_description("TXXX", encoding, rest)?;
    Ok((desc, decode_string("TXXX", encoding, value)?))
}

/// Body of a COMM frame: (description, text)
pub(crate) fn decode_comment_body(body: &[u8]) -> Result<(String, String)> {
    if body.len() < 4 {
        return Err(TagError::format(FORMAT, "COMM frame too short"));
    }
    let encoding = body[0];
    let (desc, text) = split_description("COMM", encoding, &body[4..])?;
    Ok((desc, decode_string("COMM", encoding, text)?))
}

/// Body of a PRIV frame: (owner, data)
pub(crate) fn decode_private_body(body: &[u8]) -> Option<(String, Vec<u8>)> {
    let (owner, data) = text::split_terminated(body, false)?;
    Some((text::decode_latin1(owner), data.to_vec()))
}

// ===== Encoding =====

/// Choose an encoding for the target version and encode `value`
fn encode_string(major: u8, value: &str) -> (u8, Vec<u8>) {
    if major >= 4 {
        (ENCODING_UTF8, value.as_bytes().to_vec())
    } else if let Some(latin1) = text::encode_latin1(value) {
        (ENCODING_LATIN1, latin1)
    } else {
        (ENCODING_UTF16_BOM, text::encode_utf16_bom(value))
    }
}

fn terminator(encoding: u8) -> &'static [u8] {
    if is_wide(encoding) {
        &[0, 0]
    } else {
        &[0]
    }
}

pub(crate) fn encode_text_body(major: u8, value: &str) -> Vec<u8> {
    let (encoding, bytes) = encode_string(major, value);
    let mut body = Vec::with_capacity(bytes.len() + 1);
    body.push(encoding);
    body.extend_from_slice(&bytes);
    body
}

/// Description and value share one encoding so both must fit it
fn encode_pair(major: u8, desc: &str, value: &str) -> (u8, Vec<u8>, Vec<u8>) {
    let joined = format!("{}{}", desc, value);
    let (encoding, _) = encode_string(major, &joined);
    let encode = |s: &str| match encoding {
        ENCODING_LATIN1 => text::encode_latin1(s).unwrap_or_default(),
        ENCODING_UTF16_BOM => text::encode_utf16_bom(s),
        _ => s.as_bytes().to_vec(),
    };
    (encoding, encode(desc), encode(value))
}

pub(crate) fn encode_user_text_body(major: u8, desc: &str, value: &str) -> Vec<u8> {
    let (encoding, desc, value) = encode_pair(major, desc, value);
    let mut body = vec![encoding];
    body.extend_from_slice(&desc);
    body.extend_from_slice(terminator(encoding));
    body.extend_from_slice(&value);
    body
}

pub(crate) fn encode_comment_body(major: u8, text: &str) -> Vec<u8> {
    let (encoding, desc, text) = encode_pair(major, "", text);
    let mut body = vec![encoding];
    body.extend_from_slice(COMMENT_LANGUAGE);
    body.extend_from_slice(&desc);
    body.extend_from_slice(terminator(encoding));
    body.extend_from_slice(&text);
    body
}

pub(crate) fn encode_private_body(key: &str, owner: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut body = text::encode_latin1(owner).ok_or_else(|| {
        TagError::unsupported(FORMAT, key, "PRIV owner must be ISO-8859-1")
    })?;
    body.push(0);
    body.extend_from_slice(data);
    Ok(body)
}
