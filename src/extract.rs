//! Page-level text extraction.
//!
//! PDFs are split into one [`Page`] per PDF page, in page order. Plain text
//! and Markdown files become a single page 0. Extraction never panics on bad
//! input; a corrupt file yields a [`DocumentError`] and the pipeline skips it.

use crate::error::DocumentError;
use crate::models::Page;

/// Kinds of document the extractor understands, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" | "md" | "markdown" => Some(DocumentKind::Text),
            _ => None,
        }
    }
}

/// Extract the pages of a document held in memory. `origin` names the
/// document in error messages.
pub fn extract_pages(bytes: &[u8], kind: DocumentKind, origin: &str) -> Result<Vec<Page>, DocumentError> {
    match kind {
        DocumentKind::Pdf => extract_pdf_pages(bytes, origin),
        DocumentKind::Text => extract_text_page(bytes, origin),
    }
}

fn extract_pdf_pages(bytes: &[u8], origin: &str) -> Result<Vec<Page>, DocumentError> {
    let pdf_err = |message: String| DocumentError::Pdf {
        path: origin.to_string(),
        message,
    };

    let document = lopdf::Document::load_mem(bytes).map_err(|e| pdf_err(e.to_string()))?;

    document
        .get_pages()
        .keys()
        .enumerate()
        .map(|(index, page_number)| {
            let text = document
                .extract_text(&[*page_number])
                .map_err(|e| pdf_err(format!("page {}: {}", page_number, e)))?;
            Ok(Page { index, text })
        })
        .collect()
}

fn extract_text_page(bytes: &[u8], origin: &str) -> Result<Vec<Page>, DocumentError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DocumentError::Io {
        path: origin.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    Ok(vec![Page {
        index: 0,
        text: text.to_string(),
    }])
}
