//! Formatting utilities

use humansize::{DECIMAL, format_size};

/// Format file size in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes, DECIMAL)
}

/// Format the leading bytes of a buffer as space separated hex
///
/// At most `max_len` bytes are shown; longer input ends with `...`.
pub fn format_hex(data: &[u8], max_len: usize) -> String {
    let mut out = data
        .iter()
        .take(max_len)
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > max_len {
        out.push_str(" ...");
    }
    out
}

/// Format a byte offset the way patch offsets are usually written
pub fn format_offset(offset: u64) -> String {
    format!("0x{offset:06X}")
}
