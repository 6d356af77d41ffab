use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;

/// A single field value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagValue {
    /// Unicode text
    Text(String),
    /// Whole number (track, disc, year, bpm, ...)
    Integer(i64),
    /// Opaque bytes (pictures, private frames)
    Binary(Vec<u8>),
}

impl TagValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Binary(_) => "binary",
        }
    }

    /// Render the value as a string
    ///
    /// Binary values are rendered as standard base64.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Binary(b) => STANDARD.encode(b),
        }
    }

    /// Interpret text as an integer only if it is written canonically
    ///
    /// "7" parses, "07", "+7", " 7" and "3/12" do not, so that re-encoding
    /// the integer reproduces the original text.
    pub fn canonical_integer(text: &str) -> Option<i64> {
        let n: i64 = text.parse().ok()?;
        (n.to_string() == text).then_some(n)
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for TagValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<u32> for TagValue {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<Vec<u8>> for TagValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

impl From<&[u8]> for TagValue {
    fn from(b: &[u8]) -> Self {
        Self::Binary(b.to_vec())
    }
}
