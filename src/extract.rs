//! PDF text extraction for uploaded reference documents.
//!
//! Extraction never panics; malformed input comes back as an
//! [`ExtractError`] and the caller decides whether to abort.

use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("document is empty")]
    Empty,
    #[error("not a PDF document")]
    NotPdf,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extract plain UTF-8 text from PDF bytes.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    if bytes.is_empty() {
        return Err(ExtractError::Empty);
    }
    if !looks_like_pdf(bytes) {
        return Err(ExtractError::NotPdf);
    }
    // pdf-extract can panic on some malformed streams.
    let owned = bytes.to_vec();
    match std::panic::catch_unwind(move || pdf_extract::extract_text_from_mem(&owned)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked on malformed input".to_string())),
    }
}

/// PDF files start with `%PDF-`, possibly after a little leading junk.
fn looks_like_pdf(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(5).any(|w| w == b"%PDF-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bytes() {
        assert!(matches!(extract_pdf_text(&[]), Err(ExtractError::Empty)));
    }

    #[test]
    fn test_non_pdf_rejected() {
        assert!(matches!(
            extract_pdf_text(b"plain text, not a pdf"),
            Err(ExtractError::NotPdf)
        ));
    }

    #[test]
    fn test_truncated_pdf_is_error_not_panic() {
        let result = extract_pdf_text(b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog");
        assert!(matches!(result, Err(ExtractError::Pdf(_))));
    }

    #[test]
    fn test_magic_detection() {
        assert!(looks_like_pdf(b"%PDF-1.7 rest"));
        assert!(looks_like_pdf(b"\xEF\xBB\xBF%PDF-1.4"));
        assert!(!looks_like_pdf(b"PK\x03\x04"));
    }
}
