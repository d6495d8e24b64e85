//! Reader, writer and applier for IPS binary patches.
//!
//! IPS (International Patching System) patches describe a sparse set of
//! byte-range overwrites against a target file, optionally followed by a
//! final length for the target. This crate parses patches into records,
//! validates them, applies them to any seekable target and re-encodes them.
//!
//! # Examples
//!
//! ```no_run
//! use std::fs::OpenOptions;
//! use ips_patch::PatchFile;
//!
//! let patch = PatchFile::open("fix.ips")?;
//! println!("{patch}");
//!
//! let mut rom = OpenOptions::new().read(true).write(true).open("game.bin")?;
//! if !patch.is_applied(&mut rom)? {
//!     patch.apply(&mut rom)?;
//! }
//! # Ok::<(), ips_patch::Error>(())
//! ```
//!
//! Patches can also be built and written programmatically:
//!
//! ```
//! use std::io::Cursor;
//! use ips_patch::{Offset, PatchFile, PatchRecord};
//!
//! let mut patch = PatchFile::new();
//! patch.push(PatchRecord::literal(Offset::new(0x10)?, b"HELLO".to_vec()));
//! patch.push(PatchRecord::rle(Offset::new(0x20)?, 7, 0x00));
//! patch.set_truncate(0x40);
//!
//! let mut out = Cursor::new(Vec::new());
//! patch.write(&mut out)?;
//! assert!(out.get_ref().starts_with(b"PATCH"));
//! # Ok::<(), ips_patch::Error>(())
//! ```
//!
//! # Logging
//!
//! Diagnostics go through the [`log`] facade. Per-record tracing is emitted
//! at `trace` level, or at `info` level for a patch marked with
//! [`PatchFile::set_verbose`]. Logging never changes the outcome of an
//! operation.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod apply;
pub mod error;
pub mod offset;
pub mod patch;
pub mod record;
pub mod target;

pub use error::{Error, Operation, Result};
pub use offset::{EOF_OFFSET, MAX_OFFSET, Offset};
pub use patch::{IPS_EOF, IPS_HEADER, PatchFile};
pub use record::PatchRecord;
pub use target::Resize;
