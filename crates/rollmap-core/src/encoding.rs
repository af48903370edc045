//! Byte-order selector for [`crate::single::SingleProcessFile::write_chars`]
//! and [`crate::multi::MultiProcessFile::write_chars`].

/// Byte order for UTF-16 code units written by `write_chars`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

/// ASCII-encode `text`, replacing any non-ASCII code point with `?` (0x3F),
/// matching the writer surface's `writeAscii` contract.
pub fn ascii_lossy(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// UTF-16-encode `text` as code units in `order`, matching `writeChars`.
pub fn utf16_bytes(text: &str, order: ByteOrder) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() * 2);
    for unit in text.encode_utf16() {
        let pair = match order {
            ByteOrder::Little => unit.to_le_bytes(),
            ByteOrder::Big => unit.to_be_bytes(),
        };
        bytes.extend_from_slice(&pair);
    }
    bytes
}
