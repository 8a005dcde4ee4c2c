use super::{CandidateDocument, DocumentKind, ValidatedDocument, ValidationError};
use super::DEFAULT_MAX_DOCUMENT_BYTES;

/// MIME type browsers send when they do not know better.
const GENERIC_MIME: &str = "application/octet-stream";

/// Enforces the type and size policy on candidate documents.
#[derive(Debug, Clone, Copy)]
pub struct FileValidator {
    max_bytes: u64,
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DOCUMENT_BYTES)
    }
}

impl FileValidator {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Check the document, returning the first violated rule.
    ///
    /// Order: type, then size, then emptiness.
    pub fn validate(&self, doc: &CandidateDocument) -> Result<ValidatedDocument, ValidationError> {
        let kind = Self::resolve_kind(doc).ok_or(ValidationError::UnsupportedType)?;

        let size = doc.size();
        if size > self.max_bytes {
            return Err(ValidationError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        if size == 0 {
            return Err(ValidationError::Empty);
        }

        Ok(ValidatedDocument {
            name: doc.name.clone(),
            kind,
            bytes: doc.bytes.clone(),
        })
    }

    /// Extension and declared MIME type must both be allowed and agree.
    /// A missing or generic MIME type defers to the extension.
    fn resolve_kind(doc: &CandidateDocument) -> Option<DocumentKind> {
        let by_extension = DocumentKind::from_file_name(&doc.name)?;

        match doc.mime_type.as_deref().map(str::trim) {
            None | Some("") => Some(by_extension),
            Some(mime) if mime.eq_ignore_ascii_case(GENERIC_MIME) => Some(by_extension),
            Some(mime) => DocumentKind::from_mime(mime).filter(|k| *k == by_extension),
        }
    }
}
