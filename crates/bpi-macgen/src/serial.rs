//! Serial number parsing

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::MacError;

/// Number of serial bytes carried into each MAC address
pub const SERIAL_BYTES: usize = 3;

/// Read the serial number from the first line of `path`.
///
/// Trailing whitespace (including a `\r` line ending) is dropped.
pub fn read_serial_number(path: &Path) -> Result<String, MacError> {
    let file = File::open(path).map_err(|source| MacError::SerialUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let mut line = String::new();
    BufReader::new(file)
        .read_line(&mut line)
        .map_err(|source| MacError::SerialUnreadable {
            path: path.to_path_buf(),
            source,
        })?;

    let serial = line.trim_end().to_string();
    if serial.is_empty() {
        return Err(MacError::EmptySerial(path.to_path_buf()));
    }
    Ok(serial)
}

/// The last [`SERIAL_BYTES`] bytes encoded in `serial`.
///
/// The trailing six characters are read as hex pairs. A pair that does not
/// start with a hex digit reads as `0`; a pair like `"4z"` reads as `0x4`.
/// Short serials are padded with leading zero bytes and an odd leftover
/// character is ignored.
pub fn extract_serial_bytes(serial: &str) -> [u8; SERIAL_BYTES] {
    let raw = serial.as_bytes();
    let tail = raw.get(raw.len().saturating_sub(SERIAL_BYTES * 2)..).unwrap_or_default();

    let parsed: Vec<u8> = tail.chunks_exact(2).map(parse_hex_pair).collect();
    let mut bytes = [0u8; SERIAL_BYTES];
    let pad = SERIAL_BYTES.saturating_sub(parsed.len());
    for (slot, value) in bytes.iter_mut().skip(pad).zip(parsed) {
        *slot = value;
    }
    bytes
}

fn parse_hex_pair(pair: &[u8]) -> u8 {
    pair.iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .map_while(|&b| char::from(b).to_digit(16))
        .filter_map(|digit| u8::try_from(digit).ok())
        .fold(0u8, |acc, digit| acc.wrapping_shl(4) | digit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uses_trailing_six_characters() {
        assert_eq!(extract_serial_bytes("BPI0012AB34CD"), [0xab, 0x34, 0xcd]);
        assert_eq!(extract_serial_bytes("a1b2c3"), [0xa1, 0xb2, 0xc3]);
    }

    #[test]
    fn test_short_serial_is_left_padded() {
        assert_eq!(extract_serial_bytes("1234"), [0x00, 0x12, 0x34]);
        assert_eq!(extract_serial_bytes("7F"), [0x00, 0x00, 0x7f]);
        assert_eq!(extract_serial_bytes(""), [0, 0, 0]);
    }

    #[test]
    fn test_odd_leftover_is_ignored() {
        assert_eq!(extract_serial_bytes("12345"), [0x00, 0x12, 0x34]);
    }

    #[test]
    fn test_invalid_pairs() {
        assert_eq!(extract_serial_bytes("zz12yy"), [0x00, 0x12, 0x00]);
        assert_eq!(extract_serial_bytes("4z12 9"), [0x04, 0x12, 0x09]);
    }

    #[test]
    fn test_read_first_line_only() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("serial_number.txt");
        std::fs::write(&path, "00c0ffee\r\nsecond line\n")?;
        assert_eq!(read_serial_number(&path)?, "00c0ffee");
        Ok(())
    }

    #[test]
    fn test_empty_serial_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("serial_number.txt");
        std::fs::write(&path, "\n")?;
        assert!(matches!(
            read_serial_number(&path),
            Err(MacError::EmptySerial(_))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_serial_number(Path::new("/nonexistent/serial_number.txt")),
            Err(MacError::SerialUnreadable { .. })
        ));
    }
}
