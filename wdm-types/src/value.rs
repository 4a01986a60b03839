//! Property values stored at trait paths.

use bigdecimal::num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value that can be written to, or read from, a trait property path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Signed(i64),
    Unsigned(u64),
    Double(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Null,
}

/// The kind of a [`PropertyValue`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Signed,
    Unsigned,
    Double,
    Bool,
    String,
    Bytes,
    Null,
}

impl PropertyValue {
    /// Builds a signed value from an arbitrary-precision integer, keeping
    /// only the low 64 bits.
    #[must_use]
    pub fn signed_from_big(value: &BigInt) -> Self {
        Self::Signed(truncate_to_i64(value))
    }

    /// Builds an unsigned value from an arbitrary-precision integer, keeping
    /// only the low 64 bits.
    #[must_use]
    pub fn unsigned_from_big(value: &BigInt) -> Self {
        Self::Unsigned(truncate_to_u64(value))
    }

    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Signed(_) => ValueKind::Signed,
            Self::Unsigned(_) => ValueKind::Unsigned,
            Self::Double(_) => ValueKind::Double,
            Self::Bool(_) => ValueKind::Bool,
            Self::String(_) => ValueKind::String,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Null => ValueKind::Null,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the 64-bit integer payload and its signedness.
    ///
    /// Signed and unsigned values share one integer channel: the payload is
    /// the raw bit pattern, the flag says how to interpret it.
    #[must_use]
    pub const fn int_bits(&self) -> Option<(i64, bool)> {
        match *self {
            Self::Signed(v) => Some((v, true)),
            Self::Unsigned(v) => Some((v as i64, false)),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Signed => "signed",
            Self::Unsigned => "unsigned",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Null => "null",
        };
        f.write_str(name)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::Null => f.write_str("null"),
        }
    }
}

/// Truncates an arbitrary-precision integer to its low 64 bits,
/// interpreted as two's-complement `i64`.
#[must_use]
pub fn truncate_to_i64(value: &BigInt) -> i64 {
    let bytes = value.to_signed_bytes_le();
    // sign-extend short encodings
    let fill = match bytes.last() {
        Some(b) if b & 0x80 != 0 => 0xFF,
        _ => 0x00,
    };
    let mut raw = [fill; 8];
    for (dst, src) in raw.iter_mut().zip(bytes.iter()) {
        *dst = *src;
    }
    i64::from_le_bytes(raw)
}

/// Truncates an arbitrary-precision integer to its low 64 bits, as `u64`.
#[must_use]
pub fn truncate_to_u64(value: &BigInt) -> u64 {
    truncate_to_i64(value) as u64
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty, $($t:ty),+) => {
        $(
            impl From<$t> for PropertyValue {
                fn from(v: $t) -> Self {
                    Self::$variant(<$target>::from(v))
                }
            }
        )+
    };
}

impl_from_int!(Signed, i64, i8, i16, i32, i64);
impl_from_int!(Unsigned, u64, u8, u16, u32, u64);

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        Self::Double(f64::from(v))
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for PropertyValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
