//! Patch application and verification
//!
//! Application writes each record at its absolute offset, in order, and then
//! applies the truncation extension. It is not transactional: a failure part
//! way through leaves the earlier records in place.
//!
//! # RLE run length
//!
//! An RLE record with count `n` writes `n + 1` bytes when applied. Legacy IPS
//! tooling treats the stored count as the last index of the run, and targets
//! patched by that tooling depend on it. Verification compares only `n`
//! bytes.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::error::Operation;
use crate::patch::PatchFile;
use crate::record::{PatchRecord, hex_preview};
use crate::target::{Resize, stream_len};
use crate::{Error, Result};

impl PatchFile {
    /// Apply the patch to a byte-addressable target
    ///
    /// Every record is validated before the target is touched. Writes past
    /// the current end of the target extend it the way positional writes do.
    /// When a truncation length is set the target is resized to exactly that
    /// length afterwards.
    ///
    /// # Examples
    ///
    /// ```
    /// use ips_patch::PatchFile;
    ///
    /// let patch = PatchFile::from_bytes(b"PATCH\x00\x00\x02\x00\x01\xAAEOF")?;
    /// let mut rom = vec![0u8; 4];
    /// patch.apply_to_vec(&mut rom)?;
    /// assert_eq!(rom, [0, 0, 0xAA, 0]);
    /// # Ok::<(), ips_patch::Error>(())
    /// ```
    pub fn apply<T: Write + Seek + Resize + ?Sized>(&self, target: &mut T) -> Result<()> {
        self.validate()?;

        let level = self.record_log_level();
        for (index, record) in self.records().iter().enumerate() {
            apply_record(target, record)
                .map_err(|e| Error::record_io(Operation::Applying, index, e))?;
            log::log!(level, "Applied record {index}: {record}");
        }

        if let Some(len) = self.truncate() {
            target.set_len(len as u64)?;
            log::debug!("Resized target to {len} bytes");
        }

        target.flush()?;
        Ok(())
    }

    /// Apply the patch to an in-memory buffer
    pub fn apply_to_vec(&self, data: &mut Vec<u8>) -> Result<()> {
        self.apply(&mut Cursor::new(data))
    }

    /// Check whether a target already holds the patched content
    ///
    /// With a truncation length set, the target must be exactly that long
    /// ([`Error::SizeMismatch`]). Each record's range is then compared in
    /// order; the first difference, or a target too short to hold the range,
    /// is reported as [`Error::ContentMismatch`].
    pub fn check<T: Read + Seek + ?Sized>(&self, target: &mut T) -> Result<()> {
        if let Some(expected) = self.truncate() {
            let actual = stream_len(target)?;
            if actual != expected as u64 {
                log::debug!("Target is {actual} bytes, patch expects {expected}");
                return Err(Error::SizeMismatch {
                    expected: expected as u64,
                    actual,
                });
            }
        }

        for (index, record) in self.records().iter().enumerate() {
            let offset = record.offset();
            let expected = record.expected_bytes();
            let mut actual = vec![0u8; expected.len()];

            target
                .seek(SeekFrom::Start(offset.into()))
                .map_err(|e| Error::record_io(Operation::Checking, index, e))?;

            match target.read_exact(&mut actual) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    log::debug!("Record {index}: target ends inside {record}");
                    return Err(Error::ContentMismatch {
                        index,
                        offset: offset.get(),
                    });
                }
                Err(e) => return Err(Error::record_io(Operation::Checking, index, e)),
            }

            if actual != *expected {
                log::debug!(
                    "Record {index} differs at {offset}: expected [{}], found [{}]",
                    hex_preview(&expected),
                    hex_preview(&actual)
                );
                return Err(Error::ContentMismatch {
                    index,
                    offset: offset.get(),
                });
            }
        }

        Ok(())
    }

    /// Check an in-memory buffer
    pub fn check_bytes(&self, data: &[u8]) -> Result<()> {
        self.check(&mut Cursor::new(data))
    }

    /// Whether the target already holds the patched content
    ///
    /// Content and size differences yield `false`; I/O failures are errors.
    pub fn is_applied<T: Read + Seek + ?Sized>(&self, target: &mut T) -> Result<bool> {
        match self.check(target) {
            Ok(()) => Ok(true),
            Err(Error::ContentMismatch { .. } | Error::SizeMismatch { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn apply_record<T: Write + Seek + ?Sized>(target: &mut T, record: &PatchRecord) -> io::Result<()> {
    target.seek(SeekFrom::Start(record.offset().into()))?;
    match record {
        PatchRecord::Literal { data, .. } => target.write_all(data),
        PatchRecord::Rle { count, fill, .. } => {
            // Inclusive: indices 0..=count
            let run = vec![*fill; *count as usize + 1];
            target.write_all(&run)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Offset;

    fn offset(value: u32) -> Offset {
        Offset::new(value).unwrap()
    }

    #[test]
    fn test_apply_literal() {
        let patch = PatchFile::with_records(vec![PatchRecord::literal(
            offset(16),
            vec![0xAA, 0xBB, 0xCC],
        )]);
        let mut data = vec![0u8; 20];
        patch.apply_to_vec(&mut data).unwrap();

        assert_eq!(&data[16..19], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(data[15], 0);
        assert_eq!(data[19], 0);
        assert_eq!(data.len(), 20);
    }

    #[test]
    fn test_apply_rle_is_inclusive() {
        let patch = PatchFile::with_records(vec![PatchRecord::rle(offset(0), 4, 0xFF)]);
        let mut data = vec![0u8; 8];
        patch.apply_to_vec(&mut data).unwrap();

        assert_eq!(data, vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0]);
    }

    #[test]
    fn test_apply_later_records_win() {
        let patch = PatchFile::with_records(vec![
            PatchRecord::rle(offset(0), 3, 0x11),
            PatchRecord::literal(offset(1), vec![0x22]),
        ]);
        let mut data = vec![0u8; 4];
        patch.apply_to_vec(&mut data).unwrap();

        assert_eq!(data, vec![0x11, 0x22, 0x11, 0x11]);
    }

    #[test]
    fn test_apply_extends_target() {
        let patch = PatchFile::with_records(vec![PatchRecord::literal(offset(6), vec![1, 2])]);
        let mut data = vec![9u8; 2];
        patch.apply_to_vec(&mut data).unwrap();

        assert_eq!(data, vec![9, 9, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_apply_truncate() {
        let mut patch = PatchFile::with_records(vec![PatchRecord::literal(offset(0), vec![1])]);
        patch.set_truncate(100);

        let mut grown = vec![0u8; 10];
        patch.apply_to_vec(&mut grown).unwrap();
        assert_eq!(grown.len(), 100);

        let mut shrunk = vec![0u8; 300];
        patch.apply_to_vec(&mut shrunk).unwrap();
        assert_eq!(shrunk.len(), 100);
        assert_eq!(shrunk[0], 1);
    }

    #[test]
    fn test_apply_rejects_invalid_record_before_writing() {
        let patch = PatchFile::with_records(vec![
            PatchRecord::literal(offset(0), vec![1]),
            PatchRecord::rle(offset(1), 0, 0xFF),
        ]);
        let mut data = vec![0u8; 4];
        let err = patch.apply_to_vec(&mut data).unwrap_err();

        assert!(matches!(err, Error::ZeroSize));
        assert_eq!(data, vec![0u8; 4]);
    }

    /// In-memory target whose Nth write fails
    struct FailingTarget {
        inner: Cursor<Vec<u8>>,
        writes: usize,
        fail_on: usize,
    }

    impl Write for FailingTarget {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            if self.writes == self.fail_on {
                return Err(io::Error::other("disk full"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl Seek for FailingTarget {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl Resize for FailingTarget {
        fn set_len(&mut self, len: u64) -> io::Result<()> {
            self.inner.set_len(len)
        }
    }

    #[test]
    fn test_apply_io_failure_keeps_earlier_records() {
        let patch = PatchFile::with_records(vec![
            PatchRecord::literal(offset(0), vec![0xAA]),
            PatchRecord::rle(offset(2), 1, 0xBB),
            PatchRecord::literal(offset(5), vec![0xCC]),
            PatchRecord::literal(offset(6), vec![0xDD]),
        ]);
        let mut target = FailingTarget {
            inner: Cursor::new(vec![0u8; 8]),
            writes: 0,
            fail_on: 3,
        };

        let err = patch.apply(&mut target).unwrap_err();
        match err {
            Error::RecordIo {
                operation: Operation::Applying,
                index,
                ref source,
            } => {
                assert_eq!(index, 2);
                assert_eq!(source.to_string(), "disk full");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(
            target.inner.into_inner(),
            vec![0xAA, 0, 0xBB, 0xBB, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut patch = PatchFile::with_records(vec![
            PatchRecord::literal(offset(2), vec![1, 2, 3]),
            PatchRecord::rle(offset(8), 2, 0x7F),
        ]);
        patch.set_truncate(12);

        let mut once = vec![0x55u8; 16];
        patch.apply_to_vec(&mut once).unwrap();
        let mut twice = once.clone();
        patch.apply_to_vec(&mut twice).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_check_matches_after_apply() {
        let mut patch = PatchFile::with_records(vec![
            PatchRecord::literal(offset(16), vec![0xAA, 0xBB, 0xCC]),
            PatchRecord::rle(offset(0), 4, 0xFF),
        ]);
        patch.set_truncate(32);

        let mut data = vec![0u8; 32];
        assert!(!patch.is_applied(&mut Cursor::new(&data)).unwrap());

        patch.apply_to_vec(&mut data).unwrap();
        patch.check_bytes(&data).unwrap();
        assert!(patch.is_applied(&mut Cursor::new(&data)).unwrap());
    }

    #[test]
    fn test_check_reports_record_index() {
        let patch = PatchFile::with_records(vec![
            PatchRecord::literal(offset(0), vec![1, 2]),
            PatchRecord::literal(offset(4), vec![3, 4]),
        ]);
        let mut data = vec![0u8; 8];
        patch.apply_to_vec(&mut data).unwrap();
        data[5] ^= 0xFF;

        let err = patch.check_bytes(&data).unwrap_err();
        assert!(matches!(
            err,
            Error::ContentMismatch {
                index: 1,
                offset: 4
            }
        ));
    }

    #[test]
    fn test_check_size_mismatch() {
        let mut patch = PatchFile::new();
        patch.set_truncate(10);

        let err = patch.check_bytes(&[0u8; 9]).unwrap_err();
        assert!(matches!(
            err,
            Error::SizeMismatch {
                expected: 10,
                actual: 9
            }
        ));
    }

    #[test]
    fn test_check_short_target() {
        let patch = PatchFile::with_records(vec![PatchRecord::literal(offset(6), vec![1, 2])]);
        let err = patch.check_bytes(&[0u8; 7]).unwrap_err();
        assert!(matches!(err, Error::ContentMismatch { index: 0, .. }));
    }

    #[test]
    fn test_check_rle_compares_count_bytes() {
        let patch = PatchFile::with_records(vec![PatchRecord::rle(offset(0), 2, 0xEE)]);
        patch.check_bytes(&[0xEE, 0xEE, 0x00]).unwrap();
    }

    #[test]
    fn test_apply_to_file() {
        let patch = PatchFile::with_records(vec![PatchRecord::literal(offset(1), vec![7, 8])]);
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[0u8; 4]).unwrap();

        patch.apply(&mut file).unwrap();
        patch.check(&mut file).unwrap();

        let mut contents = Vec::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, vec![0, 7, 8, 0]);
    }
}
