//! IPS patch files
//!
//! A patch file is the `PATCH` header, a sequence of records, the `EOF`
//! marker and an optional 2-byte truncation length:
//!
//! ```text
//! "PATCH" record* "EOF" [truncate: u16 BE]
//! ```
//!
//! Records are kept in file order, which is also the order they are applied
//! in. Overlapping records are legal; later ones win.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::num::NonZeroU16;
use std::path::Path;

use crate::error::Operation;
use crate::record::{OFFSET_SIZE, PatchRecord};
use crate::target::Resize;
use crate::{Error, Result};

/// Magic bytes at the start of every IPS patch
pub const IPS_HEADER: &[u8; 5] = b"PATCH";

/// Marker ending the record list
pub const IPS_EOF: &[u8; 3] = b"EOF";

/// Size of the optional truncation field after the `EOF` marker
pub const TRUNCATE_SIZE: usize = 2;

/// An IPS patch: ordered records plus an optional truncation length
///
/// # Examples
///
/// ```
/// use ips_patch::{Offset, PatchFile, PatchRecord};
///
/// let mut patch = PatchFile::new();
/// patch.push(PatchRecord::literal(Offset::new(0x10)?, vec![0xAA, 0xBB, 0xCC]));
/// patch.push(PatchRecord::rle(Offset::new(0)?, 4, 0xFF));
///
/// let bytes = patch.to_bytes()?;
/// let decoded = PatchFile::from_bytes(&bytes)?;
/// assert_eq!(decoded, patch);
/// # Ok::<(), ips_patch::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PatchFile {
    records: Vec<PatchRecord>,
    truncate: Option<NonZeroU16>,
    #[cfg_attr(feature = "serde", serde(skip))]
    verbose: bool,
}

impl PatchFile {
    /// Create an empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a patch from an existing record list
    pub fn with_records(records: Vec<PatchRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Parse a patch from a reader
    ///
    /// The whole stream is consumed: bytes after the `EOF` marker other than
    /// a single 2-byte truncation field are rejected.
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let mut reader = PatchReader::new(reader);

        let mut header = [0u8; IPS_HEADER.len()];
        let read = reader.read_up_to(&mut header)?;
        if &header[..read] != IPS_HEADER {
            return Err(Error::BadHeader {
                found: header[..read].to_vec(),
            });
        }

        let mut patch = PatchFile::new();
        loop {
            let index = patch.records.len();
            match reader
                .read_record()
                .map_err(|e| e.at_record(Operation::Decoding, index))?
            {
                Some(record) => {
                    log::trace!("Read record {index}: {record}");
                    patch.records.push(record);
                }
                None => break,
            }
        }

        let position = reader.position;
        let mut truncate = [0u8; TRUNCATE_SIZE];
        let read = reader.read_up_to(&mut truncate)?;
        match read {
            0 => {}
            TRUNCATE_SIZE => {
                patch.truncate = NonZeroU16::new(u16::from_be_bytes(truncate));
                log::debug!("Truncation extension: {:?}", patch.truncate());
            }
            _ => {
                return Err(Error::TrailingData {
                    position,
                    count: read,
                });
            }
        }

        let position = reader.position;
        let remaining = reader.drain()?;
        if remaining > 0 {
            return Err(Error::TrailingData {
                position,
                count: usize::try_from(remaining).unwrap_or(usize::MAX),
            });
        }

        log::debug!(
            "Parsed IPS patch: {} records, truncate={:?}",
            patch.records.len(),
            patch.truncate()
        );

        Ok(patch)
    }

    /// Parse a patch held in memory
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(data)
    }

    /// Open and parse a patch file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file))
    }

    /// Records in application order
    pub fn records(&self) -> &[PatchRecord] {
        &self.records
    }

    /// Mutable access to the record list
    pub fn records_mut(&mut self) -> &mut Vec<PatchRecord> {
        &mut self.records
    }

    /// Consume the patch, returning its records
    pub fn into_records(self) -> Vec<PatchRecord> {
        self.records
    }

    /// Append a record
    pub fn push(&mut self, record: PatchRecord) {
        self.records.push(record);
    }

    /// Iterate over the records
    pub fn iter(&self) -> std::slice::Iter<'_, PatchRecord> {
        self.records.iter()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the patch has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of RLE records
    pub fn rle_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_rle()).count()
    }

    /// Target length requested by the truncation extension
    pub fn truncate(&self) -> Option<u16> {
        self.truncate.map(NonZeroU16::get)
    }

    /// Set the truncation length; `0` removes it
    pub fn set_truncate(&mut self, len: u16) {
        self.truncate = NonZeroU16::new(len);
    }

    /// Whether per-record tracing is raised to `info` level
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Raise per-record tracing to `info` level
    ///
    /// This only changes what is logged.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub(crate) fn record_log_level(&self) -> log::Level {
        if self.verbose {
            log::Level::Info
        } else {
            log::Level::Trace
        }
    }

    /// Smallest target length that holds every byte the records write
    pub fn required_len(&self) -> u64 {
        self.records.iter().map(PatchRecord::end).max().unwrap_or(0)
    }

    /// Check every record, returning the first violation
    pub fn validate(&self) -> Result<()> {
        for (index, record) in self.records.iter().enumerate() {
            record.validate().inspect_err(|e| {
                log::debug!("Record {index} is invalid: {e}");
            })?;
        }
        Ok(())
    }

    /// Replace the contents of `sink` with this patch
    ///
    /// The sink is emptied first. If a record fails validation the bytes
    /// written before it stay in the sink.
    pub fn write<W: Write + Seek + Resize + ?Sized>(&self, sink: &mut W) -> Result<()> {
        sink.seek(SeekFrom::Start(0))?;
        sink.set_len(0)?;
        self.write_to(sink)?;
        sink.flush()?;
        Ok(())
    }

    /// Encode this patch to a stream, returning the number of bytes written
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<u64> {
        let level = self.record_log_level();

        writer.write_all(IPS_HEADER)?;
        let mut written = IPS_HEADER.len() as u64;

        for (index, record) in self.records.iter().enumerate() {
            let len = record
                .write_logged(writer, level)
                .map_err(|e| e.at_record(Operation::Writing, index))?;
            written += len as u64;
        }

        writer.write_all(IPS_EOF)?;
        written += IPS_EOF.len() as u64;

        if let Some(truncate) = self.truncate {
            writer.write_all(&truncate.get().to_be_bytes())?;
            written += TRUNCATE_SIZE as u64;
        }

        log::debug!(
            "Wrote IPS patch: {} records, {} bytes",
            self.records.len(),
            written
        );

        Ok(written)
    }

    /// Encode this patch into a new buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Number of bytes the encoded patch occupies
    pub fn encoded_len(&self) -> usize {
        let records: usize = self.records.iter().map(PatchRecord::encoded_len).sum();
        let truncate = if self.truncate.is_some() {
            TRUNCATE_SIZE
        } else {
            0
        };
        IPS_HEADER.len() + records + IPS_EOF.len() + truncate
    }
}

impl PartialEq for PatchFile {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records && self.truncate == other.truncate
    }
}

impl Eq for PatchFile {}

impl From<Vec<PatchRecord>> for PatchFile {
    fn from(records: Vec<PatchRecord>) -> Self {
        Self::with_records(records)
    }
}

impl FromIterator<PatchRecord> for PatchFile {
    fn from_iter<I: IntoIterator<Item = PatchRecord>>(iter: I) -> Self {
        Self::with_records(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PatchFile {
    type Item = &'a PatchRecord;
    type IntoIter = std::slice::Iter<'a, PatchRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl fmt::Display for PatchFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPS patch ({} records, {} RLE",
            self.records.len(),
            self.rle_count()
        )?;
        if let Some(truncate) = self.truncate {
            write!(f, ", truncate to {truncate} bytes")?;
        }
        write!(f, ")")
    }
}

/// Reader tracking its position for error reporting
struct PatchReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> PatchReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Fill `buf` completely or fail with `TruncatedStream`
    fn read_field(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.position += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::TruncatedStream {
                position: self.position,
            }),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Read into `buf` until it is full or the input ends
    fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        self.position += filled as u64;
        Ok(filled)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_field(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Read the next record, or `None` once the `EOF` marker is reached
    fn read_record(&mut self) -> Result<Option<PatchRecord>> {
        let mut offset = [0u8; OFFSET_SIZE];
        self.read_field(&mut offset)?;
        if &offset == IPS_EOF {
            return Ok(None);
        }

        let size = self.read_u16()?;
        let record = if size == 0 {
            let count = self.read_u16()?;
            let mut fill = [0u8; 1];
            self.read_field(&mut fill)?;
            PatchRecord::new(&offset, count, fill.to_vec(), true)?
        } else {
            let mut data = vec![0u8; size as usize];
            self.read_field(&mut data)?;
            PatchRecord::new(&offset, size, data, false)?
        };

        Ok(Some(record))
    }

    /// Consume the rest of the input, returning how many bytes were left
    fn drain(&mut self) -> Result<u64> {
        let count = io::copy(&mut self.inner, &mut io::sink())?;
        self.position += count;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Offset;
    use std::io::Cursor;

    fn offset(value: u32) -> Offset {
        Offset::new(value).unwrap()
    }

    fn literal_patch() -> Vec<u8> {
        let mut data = IPS_HEADER.to_vec();
        data.extend_from_slice(&[0x00, 0x00, 0x10, 0x00, 0x03, 0xAA, 0xBB, 0xCC]);
        data.extend_from_slice(IPS_EOF);
        data
    }

    #[test]
    fn test_parse_literal() {
        let patch = PatchFile::from_bytes(&literal_patch()).unwrap();
        assert_eq!(patch.len(), 1);
        assert_eq!(
            patch.records()[0],
            PatchRecord::literal(offset(0x10), vec![0xAA, 0xBB, 0xCC])
        );
        assert_eq!(patch.truncate(), None);
    }

    #[test]
    fn test_parse_rle() {
        let mut data = IPS_HEADER.to_vec();
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0xFF]);
        data.extend_from_slice(IPS_EOF);

        let patch = PatchFile::from_bytes(&data).unwrap();
        assert_eq!(patch.records(), &[PatchRecord::rle(offset(0), 4, 0xFF)]);
        assert_eq!(patch.rle_count(), 1);
    }

    #[test]
    fn test_parse_empty_patch() {
        let patch = PatchFile::from_bytes(b"PATCHEOF").unwrap();
        assert!(patch.is_empty());
        assert_eq!(patch.required_len(), 0);
    }

    #[test]
    fn test_parse_truncate() {
        let mut data = literal_patch();
        data.extend_from_slice(&[0x00, 0x64]);
        let patch = PatchFile::from_bytes(&data).unwrap();
        assert_eq!(patch.truncate(), Some(100));
    }

    #[test]
    fn test_parse_zero_truncate_is_absent() {
        let mut data = literal_patch();
        data.extend_from_slice(&[0x00, 0x00]);
        let patch = PatchFile::from_bytes(&data).unwrap();
        assert_eq!(patch.truncate(), None);
    }

    #[test]
    fn test_bad_header() {
        let err = PatchFile::from_bytes(b"PATCX\0\0\0").unwrap_err();
        assert!(matches!(err, Error::BadHeader { ref found } if found == b"PATCX"));

        let err = PatchFile::from_bytes(b"PAT").unwrap_err();
        assert!(matches!(err, Error::BadHeader { ref found } if found == b"PAT"));
    }

    #[test]
    fn test_missing_eof() {
        let mut data = literal_patch();
        data.truncate(data.len() - IPS_EOF.len());
        let err = PatchFile::from_bytes(&data).unwrap_err();
        assert!(matches!(err, Error::TruncatedStream { position: 13 }));
    }

    #[test]
    fn test_truncated_payload() {
        let mut data = IPS_HEADER.to_vec();
        data.extend_from_slice(&[0x00, 0x00, 0x10, 0x00, 0x03, 0xAA]);
        let err = PatchFile::from_bytes(&data).unwrap_err();
        assert!(matches!(err, Error::TruncatedStream { position: 10 }));
    }

    #[test]
    fn test_trailing_data() {
        let mut data = literal_patch();
        data.extend_from_slice(&[0x00, 0x64, 0x01]);
        let err = PatchFile::from_bytes(&data).unwrap_err();
        assert!(matches!(
            err,
            Error::TrailingData {
                position: 18,
                count: 1
            }
        ));

        let mut data = literal_patch();
        data.push(0x01);
        let err = PatchFile::from_bytes(&data).unwrap_err();
        assert!(matches!(
            err,
            Error::TrailingData {
                position: 16,
                count: 1
            }
        ));
    }

    #[test]
    fn test_reserved_offset_unreachable_in_stream() {
        // "EOF" in the offset position always ends the loop, so the bytes
        // after it are trailing data rather than a record.
        let mut data = IPS_HEADER.to_vec();
        data.extend_from_slice(b"EOF");
        data.extend_from_slice(&[0x00, 0x01, 0x00]);
        data.extend_from_slice(IPS_EOF);
        assert!(matches!(
            PatchFile::from_bytes(&data),
            Err(Error::TrailingData { .. })
        ));
    }

    #[test]
    fn test_write_to() {
        let mut patch = PatchFile::new();
        patch.push(PatchRecord::literal(offset(0x10), vec![0xAA, 0xBB, 0xCC]));
        assert_eq!(patch.to_bytes().unwrap(), literal_patch());

        patch.set_truncate(100);
        let mut expected = literal_patch();
        expected.extend_from_slice(&[0x00, 0x64]);
        assert_eq!(patch.to_bytes().unwrap(), expected);
        assert_eq!(patch.encoded_len(), expected.len());
    }

    #[test]
    fn test_write_resets_sink() {
        let patch = PatchFile::from_bytes(&literal_patch()).unwrap();
        let mut sink = Cursor::new(vec![0xEEu8; 64]);
        sink.set_position(40);

        patch.write(&mut sink).unwrap();
        assert_eq!(sink.into_inner(), literal_patch());
    }

    #[test]
    fn test_write_stops_at_invalid_record() {
        let mut patch = PatchFile::new();
        patch.push(PatchRecord::literal(offset(1), vec![1]));
        patch.push(PatchRecord::rle(offset(2), 0, 0xFF));
        patch.push(PatchRecord::literal(offset(3), vec![3]));

        let mut out = Vec::new();
        let err = patch.write_to(&mut out).unwrap_err();
        assert!(matches!(err, Error::ZeroSize));
        // Header and the first record made it out, nothing after
        assert_eq!(out.len(), IPS_HEADER.len() + 6);
    }

    #[test]
    fn test_set_truncate_zero_clears() {
        let mut patch = PatchFile::new();
        patch.set_truncate(10);
        assert_eq!(patch.truncate(), Some(10));
        patch.set_truncate(0);
        assert_eq!(patch.truncate(), None);
    }

    #[test]
    fn test_required_len() {
        let patch: PatchFile = vec![
            PatchRecord::literal(offset(16), vec![1, 2, 3]),
            PatchRecord::rle(offset(0), 4, 0xFF),
        ]
        .into_iter()
        .collect();
        assert_eq!(patch.required_len(), 19);
    }

    #[test]
    fn test_verbose_does_not_change_output() {
        let mut patch = PatchFile::from_bytes(&literal_patch()).unwrap();
        let quiet = patch.to_bytes().unwrap();
        patch.set_verbose(true);
        assert!(patch.verbose());
        assert_eq!(patch.to_bytes().unwrap(), quiet);
    }

    #[test]
    fn test_display() {
        let mut patch = PatchFile::from_bytes(&literal_patch()).unwrap();
        assert_eq!(patch.to_string(), "IPS patch (1 records, 0 RLE)");
        patch.set_truncate(100);
        assert_eq!(
            patch.to_string(),
            "IPS patch (1 records, 0 RLE, truncate to 100 bytes)"
        );
    }
}
