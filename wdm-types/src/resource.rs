//! Resource identifiers naming the entity that owns a trait instance.
//!
//! A resource identifier pairs an open-ended resource type tag with a
//! 64-bit id. The id has a fixed 8-byte little-endian binary form which is
//! shared with other implementations and must stay bit-exact.

use crate::{Error, Result};
use bigdecimal::num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length in bytes of the binary resource id encoding.
pub const RESOURCE_ID_LEN: usize = 8;

/// Reserved resource id naming the node that owns the trait instance.
pub const SELF_NODE_ID: i64 = -2;

/// Tag describing what kind of resource an id refers to.
///
/// The set of tags is open: any value is accepted, only [`ResourceType::RESERVED`]
/// carries meaning locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(i32);

impl ResourceType {
    /// Sentinel tag used by the default identifier.
    pub const RESERVED: Self = Self(0);

    #[must_use]
    pub const fn new(tag: i32) -> Self {
        Self(tag)
    }

    #[must_use]
    pub const fn as_i32(&self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        self.0 == Self::RESERVED.0
    }
}

impl Default for ResourceType {
    fn default() -> Self {
        Self::RESERVED
    }
}

impl From<i32> for ResourceType {
    fn from(tag: i32) -> Self {
        Self(tag)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies the physical or logical resource that owns a trait instance.
///
/// Equality and hashing cover exactly `(resource_type, resource_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    resource_type: ResourceType,
    resource_id: i64,
}

impl ResourceIdentifier {
    /// Creates an identifier from its parts.
    #[must_use]
    pub const fn new(resource_type: ResourceType, resource_id: i64) -> Self {
        Self {
            resource_type,
            resource_id,
        }
    }

    /// The identifier naming the local node.
    #[must_use]
    pub const fn self_node() -> Self {
        Self::new(ResourceType::RESERVED, SELF_NODE_ID)
    }

    /// Creates an identifier from an arbitrary-precision integer.
    ///
    /// Only the low 64 bits of the two's-complement representation are
    /// kept, so values outside the `i64` range wrap silently.
    #[must_use]
    pub fn from_big_int(resource_type: ResourceType, value: &BigInt) -> Self {
        Self::new(resource_type, crate::truncate_to_i64(value))
    }

    /// Creates an identifier from an 8-byte little-endian id.
    ///
    /// Byte 0 is the least significant byte. Any other length is rejected.
    pub fn from_le_bytes(resource_type: ResourceType, bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(resource_type, Self::id_from_bytes(bytes)?))
    }

    /// Decodes an 8-byte little-endian resource id.
    pub fn id_from_bytes(bytes: &[u8]) -> Result<i64> {
        let raw: [u8; RESOURCE_ID_LEN] =
            bytes.try_into().map_err(|_| Error::InvalidResourceIdLength {
                expected: RESOURCE_ID_LEN,
                len: bytes.len(),
            })?;
        Ok(i64::from_le_bytes(raw))
    }

    /// Encodes a resource id as 8 little-endian bytes.
    #[must_use]
    pub const fn id_to_bytes(resource_id: i64) -> [u8; RESOURCE_ID_LEN] {
        resource_id.to_le_bytes()
    }

    #[must_use]
    pub const fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    #[must_use]
    pub const fn resource_id(&self) -> i64 {
        self.resource_id
    }

    /// Returns the id in its 8-byte little-endian form.
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; RESOURCE_ID_LEN] {
        Self::id_to_bytes(self.resource_id)
    }

    /// Returns true if this names the local node.
    #[must_use]
    pub const fn is_self_node(&self) -> bool {
        self.resource_id == SELF_NODE_ID
    }
}

impl Default for ResourceIdentifier {
    fn default() -> Self {
        Self::self_node()
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.resource_id)
    }
}

impl FromStr for ResourceIdentifier {
    type Err = Error;

    /// Parses the `"<type>:<id>"` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self> {
        let (tag, id) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidResourceIdentifier(format!("missing ':' in {s:?}")))?;
        let tag: i32 = tag
            .trim()
            .parse()
            .map_err(|e| Error::InvalidResourceIdentifier(format!("bad type {tag:?}: {e}")))?;
        let id: i64 = id
            .trim()
            .parse()
            .map_err(|e| Error::InvalidResourceIdentifier(format!("bad id {id:?}: {e}")))?;
        Ok(Self::new(ResourceType::new(tag), id))
    }
}
