//! Base64 codec
//!
//! Standard alphabet with padding. Decoding is all-or-nothing: malformed
//! input yields an empty result, never a partial one.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode(input: &str) -> Vec<u8> {
    STANDARD.decode(input).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let data = b"OCPP 1.6 security profile";
        assert_eq!(decode(&encode(data)), data);
    }

    #[test]
    fn known_encoding() {
        assert_eq!(encode(b"foobar"), "Zm9vYmFy");
        assert_eq!(decode("Zm9vYmFy"), b"foobar");
    }

    #[test]
    fn malformed_input_decodes_to_empty() {
        assert!(decode("not base64 !!").is_empty());
        assert!(decode("Zm9vYmFy=").is_empty());
        assert!(decode("").is_empty());
    }
}
