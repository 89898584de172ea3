//! Text decoding for uploaded exports. Exports arrive as raw bytes in
//! whatever encoding the ad platform or spreadsheet tool chose.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use tracing::debug;

/// A candidate text encoding, tried in order until one decodes cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// UTF-8 with a mandatory-if-present byte order mark.
    Utf8Sig,
    /// UTF-16 with BOM detection, little-endian when no BOM.
    Utf16,
    Utf16Le,
    Utf16Be,
    Latin1,
    Cp1252,
    /// A statistical guess outside the fixed list.
    Detected(&'static Encoding),
}

/// The fixed fallback order after the detected encoding.
pub const FALLBACK_ORDER: [TextEncoding; 7] = [
    TextEncoding::Utf8,
    TextEncoding::Utf8Sig,
    TextEncoding::Utf16,
    TextEncoding::Utf16Le,
    TextEncoding::Utf16Be,
    TextEncoding::Latin1,
    TextEncoding::Cp1252,
];

impl TextEncoding {
    pub fn label(&self) -> String {
        match self {
            Self::Utf8 => "utf-8".to_string(),
            Self::Utf8Sig => "utf-8-sig".to_string(),
            Self::Utf16 => "utf-16".to_string(),
            Self::Utf16Le => "utf-16-le".to_string(),
            Self::Utf16Be => "utf-16-be".to_string(),
            Self::Latin1 => "latin-1".to_string(),
            Self::Cp1252 => "cp1252".to_string(),
            Self::Detected(enc) => enc.name().to_ascii_lowercase(),
        }
    }

    fn from_encoding(enc: &'static Encoding) -> Self {
        if enc == UTF_8 {
            Self::Utf8
        } else if enc == WINDOWS_1252 {
            Self::Cp1252
        } else if enc == UTF_16LE {
            Self::Utf16Le
        } else if enc == UTF_16BE {
            Self::Utf16Be
        } else {
            Self::Detected(enc)
        }
    }

    /// Strict decode: any malformed sequence is a failure, never a
    /// replacement character. A leading U+FEFF is stripped from the result.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        let text = match self {
            Self::Utf8 => strict(UTF_8, bytes)?,
            Self::Utf8Sig => strict(UTF_8, bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes))?,
            Self::Utf16 => {
                if let Some(rest) = bytes.strip_prefix(b"\xFE\xFF") {
                    strict(UTF_16BE, rest)?
                } else {
                    strict(UTF_16LE, bytes.strip_prefix(b"\xFF\xFE").unwrap_or(bytes))?
                }
            }
            Self::Utf16Le => strict(UTF_16LE, bytes)?,
            Self::Utf16Be => strict(UTF_16BE, bytes)?,
            Self::Latin1 => encoding_rs::mem::decode_latin1(bytes).into_owned(),
            Self::Cp1252 => strict(WINDOWS_1252, bytes)?,
            Self::Detected(enc) => strict(*enc, bytes)?,
        };
        Some(match text.strip_prefix('\u{FEFF}') {
            Some(rest) => rest.to_string(),
            None => text,
        })
    }
}

fn strict(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|cow| cow.into_owned())
}

/// Sniff the most likely encoding: byte order mark first, then a UTF-8
/// validity check, then a statistical guess.
pub fn detect(bytes: &[u8]) -> TextEncoding {
    if bytes.starts_with(b"\xEF\xBB\xBF") {
        return TextEncoding::Utf8Sig;
    }
    if bytes.starts_with(b"\xFF\xFE") || bytes.starts_with(b"\xFE\xFF") {
        return TextEncoding::Utf16;
    }
    if std::str::from_utf8(bytes).is_ok() {
        return TextEncoding::Utf8;
    }
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, false);
    debug!(encoding = guess.name(), "Statistical encoding guess");
    TextEncoding::from_encoding(guess)
}

/// The detected encoding followed by the fixed fallback order,
/// de-duplicated by label.
pub fn candidates(bytes: &[u8]) -> Vec<TextEncoding> {
    let mut out: Vec<TextEncoding> = Vec::with_capacity(FALLBACK_ORDER.len() + 1);
    for candidate in std::iter::once(detect(bytes)).chain(FALLBACK_ORDER) {
        if !out.iter().any(|c| c.label() == candidate.label()) {
            out.push(candidate);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_bom_is_detected_and_stripped() {
        let bytes = b"\xEF\xBB\xBFCampaign,Clicks\nA,1\n";
        assert_eq!(detect(bytes), TextEncoding::Utf8Sig);
        let text = TextEncoding::Utf8Sig.decode(bytes).unwrap();
        assert!(text.starts_with("Campaign"));
        // Plain utf-8 keeps the BOM bytes as U+FEFF, which is then stripped.
        let text = TextEncoding::Utf8.decode(bytes).unwrap();
        assert!(text.starts_with("Campaign"));
    }

    #[test]
    fn test_utf16_le_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "Day,Cost\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(detect(&bytes), TextEncoding::Utf16);
        assert_eq!(TextEncoding::Utf16.decode(&bytes).unwrap(), "Day,Cost\n");
    }

    #[test]
    fn test_invalid_utf8_fails_strictly() {
        let bytes = b"Caf\xE9,12\n";
        assert!(TextEncoding::Utf8.decode(bytes).is_none());
        assert_eq!(TextEncoding::Latin1.decode(bytes).unwrap(), "Caf\u{e9},12\n");
    }

    #[test]
    fn test_odd_length_utf16_fails() {
        assert!(TextEncoding::Utf16Le.decode(b"abc").is_none());
    }

    #[test]
    fn test_candidates_are_deduplicated() {
        let list = candidates(b"plain ascii");
        let labels: Vec<String> = list.iter().map(|c| c.label()).collect();
        assert_eq!(labels[0], "utf-8");
        assert_eq!(labels.iter().filter(|l| *l == "utf-8").count(), 1);
        assert_eq!(labels.len(), FALLBACK_ORDER.len());
    }
}
