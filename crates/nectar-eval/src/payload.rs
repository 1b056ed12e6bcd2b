//! Payload buffers, codecs, and the log wrapper for captured bytes.
//!
//! Captured bodies and payloads are stored size-capped; the cap metadata
//! travels with the bytes so the log record can report truncation. The same
//! codecs back the evaluator's `decode` leaf option and the logged payload
//! encoding.

use std::io::Read;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::read::GzDecoder;
use serde::Serialize;

use nectar_rules::Decode;

/// A captured byte buffer, truncated at a configured cap.
///
/// Matching runs against `data` (the capped view); `original_size` is the
/// pre-truncation length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub data: Vec<u8>,
    pub original_size: usize,
    pub truncated: bool,
}

impl Payload {
    /// Take ownership of `bytes`, truncating at `cap`.
    pub fn capped(mut bytes: Vec<u8>, cap: usize) -> Payload {
        let original_size = bytes.len();
        let truncated = original_size > cap;
        if truncated {
            bytes.truncate(cap);
        }
        Payload {
            data: bytes,
            original_size,
            truncated,
        }
    }

    /// The log-record form of this buffer.
    pub fn to_log(&self) -> PayloadLog {
        PayloadLog {
            encoding: "base64",
            data: BASE64.encode(&self.data),
            truncated: self.truncated,
            original_size: self.original_size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The serialized form of a captured payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadLog {
    pub encoding: &'static str,
    pub data: String,
    pub truncated: bool,
    pub original_size: usize,
}

/// Encode up to `cap` bytes of `bytes` for the log record.
pub fn payload_log(bytes: &[u8], cap: usize) -> PayloadLog {
    let truncated = bytes.len() > cap;
    let kept = if truncated { &bytes[..cap] } else { bytes };
    PayloadLog {
        encoding: "base64",
        data: BASE64.encode(kept),
        truncated,
        original_size: bytes.len(),
    }
}

/// Decode `input` per `mode` into `out`, clearing `out` first.
///
/// Returns `false` on any decode failure; the evaluator treats that as a
/// non-match. Gzip output is capped at `max` bytes; base64/hex inputs are
/// trimmed of ASCII whitespace before decoding.
pub fn decode_field(mode: Decode, input: &[u8], out: &mut Vec<u8>, max: usize) -> bool {
    out.clear();
    match mode {
        Decode::None => {
            out.extend_from_slice(input);
            true
        }
        Decode::Base64 => {
            let Ok(text) = std::str::from_utf8(input) else {
                return false;
            };
            BASE64.decode_vec(text.trim(), out).is_ok()
        }
        Decode::Hex => {
            let Ok(text) = std::str::from_utf8(input) else {
                return false;
            };
            match hex::decode(text.trim()) {
                Ok(bytes) => {
                    out.extend_from_slice(&bytes);
                    true
                }
                Err(_) => false,
            }
        }
        Decode::Gzip => {
            let mut decoder = GzDecoder::new(input).take(max as u64);
            decoder.read_to_end(out).is_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_below_cap_keeps_everything() {
        let p = Payload::capped(b"hello".to_vec(), 16);
        assert_eq!(p.data, b"hello");
        assert_eq!(p.original_size, 5);
        assert!(!p.truncated);
    }

    #[test]
    fn capped_above_cap_truncates_and_flags() {
        let p = Payload::capped(vec![0xAA; 100], 10);
        assert_eq!(p.data.len(), 10);
        assert_eq!(p.original_size, 100);
        assert!(p.truncated);
    }

    #[test]
    fn payload_log_round_trip() {
        let body = b"log=admin&pwd=hunter2";
        let log = payload_log(body, 1024);
        assert!(!log.truncated);
        assert_eq!(log.original_size, body.len());
        assert_eq!(BASE64.decode(&log.data).unwrap(), body);
    }

    #[test]
    fn payload_log_truncation_reports_original_size() {
        let log = payload_log(&[0x41; 64], 8);
        assert!(log.truncated);
        assert_eq!(log.original_size, 64);
        assert_eq!(BASE64.decode(&log.data).unwrap().len(), 8);
    }

    #[test]
    fn decode_base64_field() {
        let mut out = Vec::new();
        assert!(decode_field(Decode::Base64, b"PD9waHA=", &mut out, 1024));
        assert_eq!(out, b"<?php");
        assert!(!decode_field(Decode::Base64, b"!!! not base64", &mut out, 1024));
    }

    #[test]
    fn decode_hex_field() {
        let mut out = Vec::new();
        assert!(decode_field(Decode::Hex, b"deadbeef", &mut out, 1024));
        assert_eq!(out, [0xde, 0xad, 0xbe, 0xef]);
        assert!(!decode_field(Decode::Hex, b"xyz", &mut out, 1024));
    }

    #[test]
    fn decode_gzip_field() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"GET /admin HTTP/1.1").unwrap();
        let compressed = enc.finish().unwrap();

        let mut out = Vec::new();
        assert!(decode_field(Decode::Gzip, &compressed, &mut out, 1 << 16));
        assert_eq!(out, b"GET /admin HTTP/1.1");

        assert!(!decode_field(Decode::Gzip, b"not gzip", &mut out, 1 << 16));
    }

    #[test]
    fn decode_none_copies_input() {
        let mut out = vec![1, 2, 3];
        assert!(decode_field(Decode::None, b"raw", &mut out, 16));
        assert_eq!(out, b"raw");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // payload_log(b, cap) with cap >= len(b) decodes back bit-exactly.
        #[test]
        fn payload_log_round_trips_when_uncapped(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let log = payload_log(&bytes, bytes.len());
            prop_assert!(!log.truncated);
            prop_assert_eq!(log.original_size, bytes.len());
            let decoded = BASE64.decode(&log.data).unwrap();
            prop_assert_eq!(decoded, bytes);
        }
    }

    proptest! {
        // Truncation keeps exactly `cap` bytes, a prefix of the original.
        #[test]
        fn payload_log_truncates_to_prefix(
            bytes in proptest::collection::vec(any::<u8>(), 1..512),
            cap in 0usize..256,
        ) {
            let log = payload_log(&bytes, cap);
            let decoded = BASE64.decode(&log.data).unwrap();
            let expect = &bytes[..bytes.len().min(cap)];
            prop_assert_eq!(decoded.as_slice(), expect);
            prop_assert_eq!(log.truncated, bytes.len() > cap);
        }
    }
}
