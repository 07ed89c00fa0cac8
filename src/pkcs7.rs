// PKCS#7 padding

use crate::{ChannelError, Result};

/// Pad `bytes` up to a multiple of `block_size`. A full block of padding is
/// added when the input is already aligned, so padding always grows the
/// buffer.
///
/// # Panics
///
/// Panics if `block_size` is zero.
pub fn pkcs7_pad(bytes: &[u8], block_size: u8) -> Vec<u8> {
    assert!(block_size > 0, "PKCS#7 block size must be non-zero");
    let n_pad = block_size - (bytes.len() % block_size as usize) as u8;
    let mut out = Vec::with_capacity(bytes.len() + n_pad as usize);
    out.extend_from_slice(bytes);
    out.resize(bytes.len() + n_pad as usize, n_pad);
    out
}

pub fn pkcs7_unpad(bytes: &[u8], block_size: u8) -> Result<Vec<u8>> {
    if pkcs7_check_invalid(bytes, block_size) {
        return Err(ChannelError::InvalidPadding);
    }
    let n_pad = bytes[bytes.len() - 1] as usize;
    Ok(bytes[..bytes.len() - n_pad].to_vec())
}

/// True when `bytes` does not end in well-formed padding for `block_size`.
pub fn pkcs7_check_invalid(bytes: &[u8], block_size: u8) -> bool {
    if block_size == 0 || bytes.len() % block_size as usize != 0 {
        return true;
    }
    let Some(&n_pad) = bytes.last() else {
        return true;
    };
    if n_pad == 0 || n_pad as usize > bytes.len() {
        return true;
    }
    let padded = &bytes[(bytes.len() - n_pad as usize)..];
    !padded.iter().all(|el| *el == n_pad)
}

#[cfg(test)]
mod test {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case("YELL", 4, "YELL\x04\x04\x04\x04")]
    #[case("YELLOWS!!!", 6, "YELLOWS!!!\x02\x02")]
    #[case("YELLOW SUBMARINE", 20, "YELLOW SUBMARINE\x04\x04\x04\x04")]
    #[case("", 4, "\x04\x04\x04\x04")]
    fn pkcs7_pad_pads_message(#[case] msg: &str, #[case] block_size: u8, #[case] expected: &str) {
        let msg = msg.as_bytes();

        let padded = pkcs7_pad(msg, block_size);

        assert_eq!(padded, expected.as_bytes());
    }

    #[test]
    #[should_panic(expected = "block size must be non-zero")]
    fn pkcs7_pad_refuses_zero_block_size() {
        pkcs7_pad(b"anything", 0);
    }

    #[test]
    fn pkcs7_pad_pads_hello_to_one_block() {
        let padded = pkcs7_pad(b"hello", 16);

        assert_eq!(padded.len(), 16);
        assert_eq!(&padded[..5], b"hello");
        assert!(padded[5..].iter().all(|&b| b == 0x0b));
    }

    #[rstest]
    #[case(1, 16)]
    #[case(15, 16)]
    #[case(16, 16)]
    #[case(17, 16)]
    #[case(32, 16)]
    #[case(7, 8)]
    #[case(255, 255)]
    fn pkcs7_pad_always_grows_to_block_multiple(#[case] len: usize, #[case] block_size: u8) {
        let msg: Vec<u8> = (0..len).map(|i| i as u8).collect();

        let padded = pkcs7_pad(&msg, block_size);

        assert!(padded.len() > msg.len());
        assert_eq!(padded.len() % block_size as usize, 0);
        assert_eq!(pkcs7_unpad(&padded, block_size).unwrap(), msg);
    }

    #[test]
    fn pkcs7_unpad_unpads_message() {
        let msg = b"ICE ICE BABY\x04\x04\x04\x04";

        let unpadded = pkcs7_unpad(msg, 16);

        assert_eq!(unpadded.unwrap(), b"ICE ICE BABY");
    }

    #[rstest]
    #[case("ICE ICE BABY\x05\x05\x05\x05")]
    #[case("ICE ICE BABY\x01\x02\x03\x04")]
    #[case("ICE ICE BABY\x04\x04\x04\x00")]
    #[case("ICE ICE BABY\x04\x04\x04")]
    #[case("ICE ICE BABY\x04\x04\x04\x04\x04")]
    #[case("\x11\x11\x11\x11\x11\x11\x11\x11\x11\x11\x11\x11\x11\x11\x11\x11")]
    #[case("")]
    fn pkcs7_unpad_returns_err_given_invalid_padding(#[case] padded: &str) {
        let msg = padded.as_bytes();

        assert!(pkcs7_check_invalid(msg, 16));
        assert!(matches!(
            pkcs7_unpad(msg, 16),
            Err(ChannelError::InvalidPadding)
        ));
    }

    #[test]
    fn full_block_of_padding_unpads_to_empty() {
        let msg = [16u8; 16];

        assert!(!pkcs7_check_invalid(&msg, 16));
        assert_eq!(pkcs7_unpad(&msg, 16).unwrap(), Vec::<u8>::new());
    }
}
