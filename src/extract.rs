//! Text extraction and character decoding for reference files.
//!
//! PDF text goes through `pdf-extract`; CSV bytes are decoded by trying an
//! ordered list of character encodings until one succeeds.

use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";

/// Extraction or decoding failure for a single file. Never fatal to a batch.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("not valid {0}")]
    Decode(&'static str),
    #[error("no encoding in [{0}] could decode the file")]
    Undecodable(String),
}

/// Extracts plain text from binary content.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// ISO-8859-1; every byte maps to the code point of the same value.
    Latin1,
    Windows1252,
}

impl TextEncoding {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(TextEncoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Some(TextEncoding::Latin1),
            "windows-1252" | "cp1252" => Some(TextEncoding::Windows1252),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Windows1252 => "windows-1252",
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes)
                .map(|s| s.to_string())
                .map_err(|_| ExtractError::Decode("utf-8")),
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            TextEncoding::Windows1252 => bytes
                .iter()
                .map(|&b| windows_1252_char(b).ok_or(ExtractError::Decode("windows-1252")))
                .collect(),
        }
    }
}

/// Code points for 0x80..=0x9F; `None` marks bytes the code page leaves undefined.
const WINDOWS_1252_HIGH: [Option<char>; 32] = [
    Some('€'), None, Some('‚'), Some('ƒ'), Some('„'), Some('…'), Some('†'), Some('‡'),
    Some('ˆ'), Some('‰'), Some('Š'), Some('‹'), Some('Œ'), None, Some('Ž'), None,
    None, Some('‘'), Some('’'), Some('“'), Some('”'), Some('•'), Some('–'), Some('—'),
    Some('˜'), Some('™'), Some('š'), Some('›'), Some('œ'), None, Some('ž'), Some('Ÿ'),
];

fn windows_1252_char(b: u8) -> Option<char> {
    match b {
        0x80..=0x9F => WINDOWS_1252_HIGH[(b - 0x80) as usize],
        _ => Some(b as char),
    }
}

/// Decodes `bytes` with the first encoding in `labels` that succeeds.
pub fn decode_with_fallback(
    bytes: &[u8],
    labels: &[String],
) -> Result<(String, TextEncoding), ExtractError> {
    for label in labels {
        let Some(encoding) = TextEncoding::from_label(label) else {
            tracing::warn!(label = %label, "skipping unknown encoding label");
            continue;
        };
        match encoding.decode(bytes) {
            Ok(text) => return Ok((text, encoding)),
            Err(e) => tracing::debug!(encoding = encoding.name(), "decode attempt failed: {}", e),
        }
    }
    Err(ExtractError::Undecodable(labels.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn utf8_wins_when_valid() {
        let (text, enc) =
            decode_with_fallback("espèce".as_bytes(), &labels(&["utf-8", "latin-1"])).unwrap();
        assert_eq!(text, "espèce");
        assert_eq!(enc, TextEncoding::Utf8);
    }

    #[test]
    fn latin1_fallback_decodes_accents() {
        // "pêche" in ISO-8859-1
        let bytes = [b'p', 0xEA, b'c', b'h', b'e'];
        let (text, enc) = decode_with_fallback(&bytes, &labels(&["utf-8", "latin-1"])).unwrap();
        assert_eq!(text, "pêche");
        assert_eq!(enc, TextEncoding::Latin1);
    }

    #[test]
    fn windows_1252_maps_smart_quotes() {
        let bytes = [0x93, b'o', b'k', 0x94, b' ', 0x80];
        let text = TextEncoding::Windows1252.decode(&bytes).unwrap();
        assert_eq!(text, "“ok” €");
    }

    #[test]
    fn windows_1252_rejects_undefined_bytes() {
        assert!(TextEncoding::Windows1252.decode(&[0x81]).is_err());
    }

    #[test]
    fn no_working_encoding_is_reported() {
        let err = decode_with_fallback(&[0xFF, 0x81], &labels(&["utf-8", "cp1252"])).unwrap_err();
        assert!(matches!(err, ExtractError::Undecodable(_)));
    }

    #[test]
    fn unknown_labels_are_skipped() {
        let (text, _) =
            decode_with_fallback(b"abc", &labels(&["ebcdic", "utf-8"])).unwrap();
        assert_eq!(text, "abc");
    }
}
