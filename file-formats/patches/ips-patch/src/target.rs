//! Byte-addressable patch targets
//!
//! Patching needs positional writes plus the ability to change a target's
//! length. Positional access comes from [`Seek`](std::io::Seek); length
//! changes come from [`Resize`], implemented here for files and in-memory
//! cursors so the same code path works against both.

use std::fs::File;
use std::io::{self, Cursor, Seek, SeekFrom};

/// A resource whose length can be set explicitly
pub trait Resize {
    /// Set the length to exactly `len` bytes, zero-filling when growing
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl Resize for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

impl Resize for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        resize_vec(self.get_mut(), len)
    }
}

impl Resize for Cursor<&mut Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        resize_vec(self.get_mut(), len)
    }
}

impl<T: Resize + ?Sized> Resize for &mut T {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }
}

fn resize_vec(buf: &mut Vec<u8>, len: u64) -> io::Result<()> {
    let len = usize::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds address space"))?;
    buf.resize(len, 0);
    Ok(())
}

/// Current length of a seekable resource
///
/// The stream position is restored afterwards.
pub fn stream_len<S: Seek + ?Sized>(stream: &mut S) -> io::Result<u64> {
    let position = stream.stream_position()?;
    let len = stream.seek(SeekFrom::End(0))?;
    if position != len {
        stream.seek(SeekFrom::Start(position))?;
    }
    Ok(len)
}
