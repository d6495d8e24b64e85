//! 24-bit record offsets

use std::fmt;

use crate::{Error, Result};

/// Largest offset a record can address
pub const MAX_OFFSET: u32 = 0x00FF_FFFF;

/// Offset value spelled by the ASCII bytes `EOF`
pub const EOF_OFFSET: u32 = 0x0045_4F46;

/// Big-endian 24-bit offset into the target file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Offset(u32);

impl Offset {
    /// Create an offset from a numeric value
    ///
    /// Fails with [`Error::MalformedOffset`] when the value needs more than
    /// 24 bits. The reserved `EOF` value is accepted here and rejected by
    /// record validation.
    pub fn new(value: u32) -> Result<Self> {
        if value > MAX_OFFSET {
            return Err(Error::malformed_offset(format!(
                "0x{value:X} does not fit in 24 bits"
            )));
        }
        Ok(Offset(value))
    }

    /// Create an offset from its 3-byte big-endian encoding
    pub fn from_be_bytes(bytes: [u8; 3]) -> Self {
        Offset(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    /// The 3-byte big-endian encoding of this offset
    pub fn to_be_bytes(self) -> [u8; 3] {
        let [_, a, b, c] = self.0.to_be_bytes();
        [a, b, c]
    }

    /// Numeric value of the offset
    pub fn get(self) -> u32 {
        self.0
    }

    /// Whether this offset spells the `EOF` terminator
    pub fn is_eof_marker(self) -> bool {
        self.0 == EOF_OFFSET
    }
}

impl TryFrom<&[u8]> for Offset {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 3] = bytes.try_into().map_err(|_| {
            Error::malformed_offset(format!("expected 3 bytes, got {}", bytes.len()))
        })?;
        Ok(Offset::from_be_bytes(bytes))
    }
}

impl TryFrom<u32> for Offset {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Offset::new(value)
    }
}

impl From<Offset> for u32 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

impl From<Offset> for u64 {
    fn from(offset: Offset) -> Self {
        offset.0 as u64
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.0)
    }
}
