// Hex text encoding of byte buffers, the unit carried on the wire.
use crate::{ChannelError, Result};

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .fold(String::with_capacity(bytes.len() * 2), |s, hb| s + &hb)
}

pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(ChannelError::MalformedFrame(format!(
            "odd number of hex digits ({})",
            hex.len()
        )));
    }
    hex.as_bytes().chunks(2).map(hex_item_to_byte).collect()
}

fn hex_item_to_byte(item: &[u8]) -> Result<u8> {
    let digits = std::str::from_utf8(item)
        .map_err(|_| ChannelError::MalformedFrame("non-ASCII character".to_string()))?;
    // from_str_radix accepts a leading '+', which is not a hex digit.
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ChannelError::MalformedFrame(format!(
            "'{digits}' is not a hex byte"
        )));
    }
    u8::from_str_radix(digits, 16).map_err(|e| ChannelError::MalformedFrame(format!("{e}")))
}

#[cfg(test)]
mod test {
    use super::*;

    use rstest::rstest;

    #[test]
    fn test_hex_to_bytes_valid() {
        let hex = "0A3F";
        let expected: Vec<u8> = vec![0x0A, 0x3F];
        let result = hex_to_bytes(hex).unwrap();
        assert_eq!(result, expected);
    }

    #[test]
    fn bytes_to_hex_is_lowercase_two_digits_per_byte() {
        let hex = bytes_to_hex(&[0x00, 0x0f, 0xab, 0xff, 0x10]);

        assert_eq!(hex, "000fabff10");
    }

    #[test]
    fn empty_buffer_is_empty_frame() {
        assert_eq!(bytes_to_hex(&[]), "");
        assert_eq!(hex_to_bytes("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn hex_round_trips_all_byte_values() {
        let bytes: Vec<u8> = (0..=255).collect();

        let hex = bytes_to_hex(&bytes);

        assert_eq!(hex.len(), 512);
        assert_eq!(hex_to_bytes(&hex).unwrap(), bytes);
    }

    #[rstest]
    #[case("abc")]
    #[case("zz")]
    #[case("+f")]
    #[case("0x")]
    #[case("é0")]
    fn hex_to_bytes_rejects_malformed_frames(#[case] hex: &str) {
        assert!(matches!(
            hex_to_bytes(hex),
            Err(ChannelError::MalformedFrame(_))
        ));
    }
}
