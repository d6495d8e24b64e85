//! Patch records
//!
//! A record is one edit: either a run of literal bytes or a single byte
//! repeated (RLE). Both start at a 24-bit [`Offset`].
//!
//! # Encoding
//!
//! | Variant | Layout |
//! |---------|--------|
//! | Literal | `offset (3)` `size (2)` `data (size)` |
//! | RLE     | `offset (3)` `0x0000 (2)` `count (2)` `fill (1)` |
//!
//! All integers are big-endian. A size field of zero is what marks a record
//! as RLE.

use std::borrow::Cow;
use std::fmt;
use std::io::Write;

use crate::offset::Offset;
use crate::{Error, Result};

/// Encoded size of a record offset
pub const OFFSET_SIZE: usize = 3;

/// Encoded size of an RLE record
pub const RLE_RECORD_SIZE: usize = 8;

/// Encoded size of a literal record header (offset and size)
pub const LITERAL_HEADER_SIZE: usize = 5;

/// A single IPS record
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "lowercase"))]
pub enum PatchRecord {
    /// Bytes written verbatim starting at `offset`
    Literal {
        /// Where the bytes go
        offset: Offset,
        /// The bytes themselves
        data: Vec<u8>,
    },
    /// `fill` repeated starting at `offset`
    Rle {
        /// Where the run starts
        offset: Offset,
        /// Repeat count as stored in the patch
        count: u16,
        /// Byte value of the run
        fill: u8,
    },
}

impl PatchRecord {
    /// Build a record from its wire fields
    ///
    /// `offset` must be exactly 3 bytes and must not spell `EOF`. For RLE
    /// records `size` is the repeat count and `data` holds the single fill
    /// byte; for literal records `data` must be `size` bytes long.
    ///
    /// Combinations the record type cannot hold (an RLE record with several
    /// data bytes, a literal record whose data length disagrees with `size`)
    /// are rejected here rather than deferred to
    /// [`validate`](Self::validate), because the record type cannot hold
    /// them. A zero size is kept and reported by `validate`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ips_patch::PatchRecord;
    ///
    /// let record = PatchRecord::new(&[0x00, 0x00, 0x10], 3, vec![0xAA, 0xBB, 0xCC], false)?;
    /// assert_eq!(record.offset().get(), 0x10);
    /// assert_eq!(record.size(), 3);
    /// # Ok::<(), ips_patch::Error>(())
    /// ```
    pub fn new(offset: &[u8], size: u16, data: Vec<u8>, is_rle: bool) -> Result<Self> {
        let offset = Offset::try_from(offset)?;
        if offset.is_eof_marker() {
            return Err(Error::ReservedOffset);
        }

        if is_rle {
            return match *data.as_slice() {
                [fill] => Ok(PatchRecord::Rle {
                    offset,
                    count: size,
                    fill,
                }),
                [] => Err(Error::SizeMismatch {
                    expected: 1,
                    actual: 0,
                }),
                _ => Err(Error::RleDataOverflow(data.len())),
            };
        }

        if data.len() != size as usize {
            if size == 0 {
                return Err(Error::ZeroSize);
            }
            return Err(Error::SizeMismatch {
                expected: size as u64,
                actual: data.len() as u64,
            });
        }

        Ok(PatchRecord::Literal { offset, data })
    }

    /// Create a literal record
    pub fn literal(offset: Offset, data: impl Into<Vec<u8>>) -> Self {
        PatchRecord::Literal {
            offset,
            data: data.into(),
        }
    }

    /// Create an RLE record
    pub fn rle(offset: Offset, count: u16, fill: u8) -> Self {
        PatchRecord::Rle {
            offset,
            count,
            fill,
        }
    }

    /// Record offset
    pub fn offset(&self) -> Offset {
        match self {
            PatchRecord::Literal { offset, .. } | PatchRecord::Rle { offset, .. } => *offset,
        }
    }

    /// Size field: literal length or RLE repeat count
    ///
    /// Literal payloads longer than `u16::MAX` report `u16::MAX`; such records
    /// fail validation.
    pub fn size(&self) -> u16 {
        match self {
            PatchRecord::Literal { data, .. } => u16::try_from(data.len()).unwrap_or(u16::MAX),
            PatchRecord::Rle { count, .. } => *count,
        }
    }

    /// Whether this is an RLE record
    pub fn is_rle(&self) -> bool {
        matches!(self, PatchRecord::Rle { .. })
    }

    /// Data field: the literal payload, or the single fill byte
    pub fn data(&self) -> &[u8] {
        match self {
            PatchRecord::Literal { data, .. } => data,
            PatchRecord::Rle { fill, .. } => std::slice::from_ref(fill),
        }
    }

    /// Exclusive end of the range written when this record is applied
    ///
    /// RLE records write `count + 1` bytes.
    pub fn end(&self) -> u64 {
        let start = u64::from(self.offset());
        match self {
            PatchRecord::Literal { data, .. } => start + data.len() as u64,
            PatchRecord::Rle { count, .. } => start + *count as u64 + 1,
        }
    }

    /// Bytes a target holds at [`offset`](Self::offset) once this record is applied
    ///
    /// For RLE records this is `count` copies of the fill byte.
    pub fn expected_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            PatchRecord::Literal { data, .. } => Cow::Borrowed(data),
            PatchRecord::Rle { count, fill, .. } => Cow::Owned(vec![*fill; *count as usize]),
        }
    }

    /// Check the record invariants
    ///
    /// Reports, in order: an offset spelling `EOF`, a zero size, and a literal
    /// payload too long for the 16-bit size field.
    pub fn validate(&self) -> Result<()> {
        if self.offset().is_eof_marker() {
            return Err(Error::ReservedOffset);
        }

        match self {
            PatchRecord::Literal { data, .. } => {
                if data.is_empty() {
                    return Err(Error::ZeroSize);
                }
                if data.len() > u16::MAX as usize {
                    return Err(Error::SizeMismatch {
                        expected: u16::MAX as u64,
                        actual: data.len() as u64,
                    });
                }
            }
            PatchRecord::Rle { count, .. } => {
                if *count == 0 {
                    return Err(Error::ZeroSize);
                }
            }
        }

        Ok(())
    }

    /// Number of bytes [`encode`](Self::encode) produces
    pub fn encoded_len(&self) -> usize {
        match self {
            PatchRecord::Literal { data, .. } => LITERAL_HEADER_SIZE + data.len(),
            PatchRecord::Rle { .. } => RLE_RECORD_SIZE,
        }
    }

    /// Encode the record into its wire form
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.offset().to_be_bytes());

        match self {
            PatchRecord::Literal { data, .. } => {
                buf.extend_from_slice(&self.size().to_be_bytes());
                buf.extend_from_slice(data);
            }
            PatchRecord::Rle { count, fill, .. } => {
                buf.extend_from_slice(&0u16.to_be_bytes());
                buf.extend_from_slice(&count.to_be_bytes());
                buf.push(*fill);
            }
        }

        buf
    }

    /// Validate the record and write its encoding
    ///
    /// Nothing is written when validation fails. Returns the number of bytes
    /// written.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize> {
        self.write_logged(writer, log::Level::Trace)
    }

    pub(crate) fn write_logged<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        level: log::Level,
    ) -> Result<usize> {
        self.validate()?;

        let bytes = self.encode();
        writer.write_all(&bytes)?;

        log::log!(
            level,
            "Wrote record: offset={}, size={}, rle={}, data=[{}]",
            self.offset(),
            self.size(),
            self.is_rle(),
            hex_preview(self.data())
        );

        Ok(bytes.len())
    }
}

impl fmt::Display for PatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchRecord::Literal { offset, data } => {
                write!(f, "Literal at {} ({} bytes)", offset, data.len())
            }
            PatchRecord::Rle {
                offset,
                count,
                fill,
            } => write!(f, "RLE at {} ({} x 0x{:02X})", offset, count, fill),
        }
    }
}

/// Space separated hex of the first bytes of `data`
pub(crate) fn hex_preview(data: &[u8]) -> String {
    const PREVIEW_LEN: usize = 16;

    let mut out = data
        .iter()
        .take(PREVIEW_LEN)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > PREVIEW_LEN {
        out.push_str(" ..");
    }
    out
}
