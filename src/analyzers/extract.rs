//! Text extraction for binary uploads.

use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use crate::error::ExtractionError;

/// Turns uploaded bytes into analyzable text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// Accepts UTF-8 text only. Binary PDFs are reported as unsupported so the
/// caller records a processing error.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8TextExtractor;

impl TextExtractor for Utf8TextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ExtractionError::Empty);
        }
        if bytes.starts_with(b"%PDF-") {
            return Err(ExtractionError::Unsupported(
                "binary PDF streams need a PDF text extractor".into(),
            ));
        }
        let text = std::str::from_utf8(bytes).map_err(|e| ExtractionError::Decode(e.to_string()))?;
        Ok(text.trim().to_string())
    }
}

/// Extracts page text from binary PDFs with `pdf-extract`. Uploads that are
/// already text (a `.pdf` name on a text body) are decoded as UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        if !bytes.starts_with(b"%PDF-") {
            return Utf8TextExtractor.extract(bytes);
        }

        // pdf-extract panics on some malformed streams.
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(bytes)
        }))
        .map_err(|_| ExtractionError::Decode("PDF parser aborted on malformed input".into()))?
        .map_err(|e| ExtractionError::Decode(e.to_string()))?;

        let text = extracted.trim();
        if text.is_empty() {
            // Scanned documents carry no text layer.
            return Err(ExtractionError::Empty);
        }
        debug!(bytes = bytes.len(), chars = text.len(), "Extracted PDF text");
        Ok(text.to_string())
    }
}

/// Whether bytes should go through a `TextExtractor` rather than plain
/// decoding.
pub fn needs_extraction(bytes: &[u8], filename: Option<&str>) -> bool {
    bytes.starts_with(b"%PDF-")
        || filename.is_some_and(|f| f.to_ascii_lowercase().ends_with(".pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::samples::render_pdf;

    #[test]
    fn plain_text_passes_through() {
        let text = Utf8TextExtractor.extract(b"  Invoice #42\nTotal Amount: $10 \n").unwrap();
        assert_eq!(text, "Invoice #42\nTotal Amount: $10");
    }

    #[test]
    fn binary_pdf_is_unsupported() {
        let err = Utf8TextExtractor.extract(b"%PDF-1.7\n\x00\x01").unwrap_err();
        assert!(matches!(err, ExtractionError::Unsupported(_)));
    }

    #[test]
    fn invalid_utf8_is_decode_error() {
        let err = Utf8TextExtractor.extract(&[0xff, 0xfe, 0x41]).unwrap_err();
        assert!(matches!(err, ExtractionError::Decode(_)));
    }

    #[test]
    fn empty_input() {
        assert!(matches!(
            Utf8TextExtractor.extract(b"  \n"),
            Err(ExtractionError::Empty)
        ));
    }

    #[test]
    fn pdf_text_layer_is_extracted() {
        let pdf = render_pdf(&["Invoice Number: INV-7", "Total Amount: $25,000.00"]);
        let text = PdfTextExtractor.extract(&pdf).unwrap();
        assert!(text.contains("Invoice Number: INV-7"), "{text}");
        assert!(text.contains("Total Amount: $25,000.00"), "{text}");
    }

    #[test]
    fn corrupt_pdf_is_decode_error() {
        let err = PdfTextExtractor.extract(b"%PDF-1.7\n\x00\x01\x02").unwrap_err();
        assert!(matches!(err, ExtractionError::Decode(_)));
    }

    #[test]
    fn text_body_with_pdf_name_is_decoded() {
        let text = PdfTextExtractor.extract(b"Total Amount: $10\n").unwrap();
        assert_eq!(text, "Total Amount: $10");
    }

    #[test]
    fn extraction_routing() {
        assert!(needs_extraction(b"%PDF-1.4", None));
        assert!(needs_extraction(b"text", Some("Scan.PDF")));
        assert!(!needs_extraction(b"text", Some("notes.txt")));
        assert!(!needs_extraction(b"{}", None));
    }
}
