//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 encoded words.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Maximum encoded line length (RFC 2045).
const MAX_LINE_LENGTH: usize = 76;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 split into CRLF-terminated lines of 76 characters.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = encode_base64(data);
    let mut wrapped =
        String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2 + 2);
    // Base64 output is ASCII, so byte chunks are always valid str boundaries.
    for chunk in encoded.as_bytes().chunks(MAX_LINE_LENGTH) {
        wrapped.push_str(&String::from_utf8_lossy(chunk));
        wrapped.push_str("\r\n");
    }
    wrapped
}

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Decodes Quoted-Printable text (RFC 2045) into raw bytes.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'=' {
            result.push(bytes[i]);
            i += 1;
            continue;
        }

        // Soft line break
        if bytes.get(i + 1..i + 3) == Some(b"\r\n".as_slice()) {
            i += 3;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'\n') {
            i += 2;
            continue;
        }

        let hex = bytes
            .get(i + 1..i + 3)
            .ok_or_else(|| Error::InvalidEncoding("Incomplete escape sequence".to_string()))?;
        let hex = std::str::from_utf8(hex)
            .map_err(|_| Error::InvalidEncoding("Non-ASCII escape sequence".to_string()))?;
        let byte = u8::from_str_radix(hex, 16)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        result.push(byte);
        i += 3;
    }

    Ok(result)
}

/// Encodes a header value as a single RFC 2047 `B` encoded word when needed.
///
/// Pure ASCII values without `=?` are returned unchanged.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    if text.is_ascii() && !text.contains("=?") {
        return text.to_string();
    }
    format!("=?utf-8?B?{}?=", encode_base64(text.as_bytes()))
}

/// Decodes every RFC 2047 encoded word inside a header value.
///
/// Decoding is lenient: malformed encoded words are kept verbatim, and
/// whitespace between two adjacent encoded words is dropped (RFC 2047 §6.2).
///
/// ```ignore
/// let subject = decode_rfc2047("Undeliverable: =?utf-8?Q?T1-abc?=");
/// assert_eq!(subject, "Undeliverable: T1-abc");
/// ```
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;
    let mut after_encoded_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((word, consumed)) = parse_encoded_word(candidate) {
            let only_whitespace = before.chars().all(char::is_whitespace);
            if !(after_encoded_word && only_whitespace) {
                decoded.push_str(before);
            }
            decoded.push_str(&word);
            rest = &candidate[consumed..];
            after_encoded_word = true;
        } else {
            decoded.push_str(before);
            decoded.push_str("=?");
            rest = &candidate[2..];
            after_encoded_word = false;
        }
    }

    decoded.push_str(rest);
    decoded
}

/// Parses one `=?charset?encoding?text?=` word at the start of `s`.
///
/// Returns the decoded text and the number of bytes consumed.
fn parse_encoded_word(s: &str) -> Option<(String, usize)> {
    let body = s.strip_prefix("=?")?;
    let (charset, rest) = body.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let payload = &rest[..end];

    if charset.is_empty() || payload.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64(payload).ok()?,
        "Q" | "q" => decode_quoted_printable(&payload.replace('_', " ")).ok()?,
        _ => return None,
    };

    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    Some((decode_charset(charset, &bytes), consumed))
}

/// Converts bytes in the named charset to a `String`.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    // RFC 2231 language suffix: utf-8*en
    let charset = charset.split('*').next().unwrap_or(charset);
    match charset.to_ascii_lowercase().as_str() {
        "iso-8859-1" | "latin1" | "windows-1252" => bytes.iter().map(|&b| char::from(b)).collect(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base64_encode_decode() {
        let encoded = encode_base64(b"Hello, World!");
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");
        assert_eq!(decode_base64(&encoded).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_base64_wrapped_line_length() {
        let wrapped = encode_base64_wrapped(&[0u8; 200]);
        for line in wrapped.split("\r\n").filter(|l| !l.is_empty()) {
            assert!(line.len() <= MAX_LINE_LENGTH);
        }
        assert!(wrapped.ends_with("\r\n"));
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable("H=C3=A9llo").unwrap(), "Héllo".as_bytes());
        assert_eq!(decode_quoted_printable("Hello=\r\nWorld").unwrap(), b"HelloWorld");
        assert!(decode_quoted_printable("broken=4").is_err());
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("T1-abc"), "T1-abc");
        let encoded = encode_rfc2047("Héllo");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert_eq!(decode_rfc2047(&encoded), "Héllo");
    }

    #[test]
    fn test_rfc2047_decode_embedded_word() {
        assert_eq!(
            decode_rfc2047("Undeliverable: =?utf-8?Q?T1-abc?="),
            "Undeliverable: T1-abc"
        );
    }

    #[test]
    fn test_rfc2047_decode_adjacent_words() {
        assert_eq!(
            decode_rfc2047("=?utf-8?B?SMOp?= =?utf-8?Q?llo_there?="),
            "Héllo there"
        );
    }

    #[test]
    fn test_rfc2047_decode_latin1() {
        assert_eq!(decode_rfc2047("=?iso-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_rfc2047_malformed_kept_verbatim() {
        assert_eq!(decode_rfc2047("=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
        assert_eq!(decode_rfc2047("a =? b"), "a =? b");
    }

    proptest! {
        #[test]
        fn decode_never_panics(input in ".*") {
            let _ = decode_rfc2047(&input);
        }

        #[test]
        fn plain_values_pass_through(input in "[a-zA-Z0-9 :,.-]*") {
            prop_assert_eq!(decode_rfc2047(&input), input);
        }
    }
}
