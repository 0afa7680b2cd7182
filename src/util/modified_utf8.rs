//! Conversions between Rust strings and the "modified UTF-8" encoding used by
//! `CONSTANT_Utf8_info` structures (JVMS §4.4.7).
//!
//! Modified UTF-8 differs from standard UTF-8 in two ways: the null character
//! is encoded with two bytes, and supplementary characters are encoded as a
//! surrogate pair of two three-byte sequences.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("illegal byte {byte:#04x} at offset {offset}")]
    IllegalByte { byte: u8, offset: usize },
    #[error("truncated multi-byte sequence at offset {offset}")]
    Truncated { offset: usize },
    #[error("unpaired surrogate in string")]
    UnpairedSurrogate,
}

/// Returns true if `byte` may never appear in modified UTF-8.
pub fn is_illegal(byte: u8) -> bool {
    byte == 0 || byte >= 0xf0
}

/// Decodes modified UTF-8 bytes into a `String`.
pub fn to_string(bytes: &[u8]) -> Result<String, Error> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if is_illegal(b) {
            return Err(Error::IllegalByte { byte: b, offset: i });
        }
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xe0 == 0xc0 {
            let b2 = continuation(bytes, i, 1)?;
            units.push((u16::from(b & 0x1f) << 6) | u16::from(b2 & 0x3f));
            i += 2;
        } else if b & 0xf0 == 0xe0 {
            let b2 = continuation(bytes, i, 1)?;
            let b3 = continuation(bytes, i, 2)?;
            units.push(
                (u16::from(b & 0x0f) << 12) | (u16::from(b2 & 0x3f) << 6) | u16::from(b3 & 0x3f),
            );
            i += 3;
        } else {
            return Err(Error::IllegalByte { byte: b, offset: i });
        }
    }
    String::from_utf16(&units).map_err(|_| Error::UnpairedSurrogate)
}

fn continuation(bytes: &[u8], start: usize, n: usize) -> Result<u8, Error> {
    match bytes.get(start + n) {
        Some(&b) if b & 0xc0 == 0x80 => Ok(b),
        Some(&b) => Err(Error::IllegalByte { byte: b, offset: start + n }),
        None => Err(Error::Truncated { offset: start }),
    }
}

/// Encodes a string as modified UTF-8.
pub fn from_str(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | ((unit >> 6) & 0x1f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | ((unit >> 12) & 0x0f) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ascii() {
        assert_eq!(from_str("java/lang/Object"), b"java/lang/Object".to_vec());
        assert_eq!(to_string(b"java/lang/Object").unwrap(), "java/lang/Object");
    }

    #[test]
    fn test_null_and_supplementary() {
        let s = "a\u{0}b\u{1F600}";
        let bytes = from_str(s);
        assert_eq!(&bytes[1..3], &[0xc0, 0x80]);
        // Surrogate pair: two three-byte sequences.
        assert_eq!(bytes.len(), 1 + 2 + 1 + 6);
        assert_eq!(to_string(&bytes).unwrap(), s);
    }

    #[test]
    fn test_illegal() {
        assert_eq!(to_string(&[0x41, 0x00]), Err(Error::IllegalByte { byte: 0, offset: 1 }));
        assert_eq!(to_string(&[0xc3]), Err(Error::Truncated { offset: 0 }));
        assert_eq!(to_string(&[0xf0, 0x80]), Err(Error::IllegalByte { byte: 0xf0, offset: 0 }));
    }
}
