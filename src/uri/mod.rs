//! Share-link codec.
//!
//! [`parse`] turns one share link into a [`Node`](crate::Node), [`generate`]
//! turns a node back into a link. Supported schemes: `vmess://`, `vless://`,
//! `ss://`, `trojan://`, `hysteria2://` (`hy2://`) and `tuic://`.

mod generate;
mod parse;

pub use generate::generate;
pub use parse::{parse, parse_batch, LineError, ParsedBatch};

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Same set as JavaScript's `encodeURIComponent`
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Decode base64 in either alphabet, with or without padding.
pub(crate) fn decode_base64(input: &str) -> Option<Vec<u8>> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let cleaned = cleaned.trim_end_matches('=');
    if cleaned.is_empty() {
        return None;
    }
    STANDARD_NO_PAD
        .decode(cleaned)
        .or_else(|_| URL_SAFE_NO_PAD.decode(cleaned))
        .ok()
}

/// Decode base64 into a UTF-8 string.
pub(crate) fn decode_base64_utf8(input: &str) -> Option<String> {
    decode_base64(input).and_then(|bytes| String::from_utf8(bytes).ok())
}

pub(crate) fn encode_base64(input: impl AsRef<[u8]>) -> String {
    STANDARD.encode(input)
}

/// Percent-decode, keeping the raw text when it is not valid UTF-8.
pub(crate) fn percent_decode(s: &str) -> String {
    match percent_decode_str(s).decode_utf8() {
        Ok(cow) => cow.into_owned(),
        Err(_) => s.to_string(),
    }
}

pub(crate) fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_variants() {
        // encodes to "c3ViamVjdHM/Pj4=", which differs between alphabets
        let standard = STANDARD.encode("subjects?>>");
        let url_safe = base64::engine::general_purpose::URL_SAFE.encode("subjects?>>");
        assert_eq!(decode_base64_utf8(&standard).unwrap(), "subjects?>>");
        assert_eq!(decode_base64_utf8(&url_safe).unwrap(), "subjects?>>");
        assert_eq!(
            decode_base64_utf8(standard.trim_end_matches('=')).unwrap(),
            "subjects?>>"
        );
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        assert!(decode_base64("not base64 at all!").is_none());
        assert!(decode_base64("").is_none());
    }

    #[test]
    fn test_percent_decode_keeps_invalid_utf8_raw() {
        assert_eq!(percent_decode("My%20Node"), "My Node");
        assert_eq!(percent_decode("%FF%FE"), "%FF%FE");
    }

    #[test]
    fn test_encode_component_matches_js() {
        assert_eq!(encode_component("A B/c"), "A%20B%2Fc");
        assert_eq!(encode_component("~ok-(1)"), "~ok-(1)");
        assert_eq!(encode_component("香港"), "%E9%A6%99%E6%B8%AF");
    }
}
