//! Types for candidate documents.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Document formats accepted for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Doc,
    Docx,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [DocumentKind::Pdf, DocumentKind::Doc, DocumentKind::Docx];

    /// Canonical MIME type sent to the workflow engine.
    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Doc => "application/msword",
            DocumentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Doc => "doc",
            DocumentKind::Docx => "docx",
        }
    }

    /// Resolve a kind from a MIME type (parameters such as `; charset=` ignored).
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        Self::ALL
            .into_iter()
            .find(|k| k.mime_type().eq_ignore_ascii_case(essence))
    }

    /// Resolve a kind from the extension of a file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        Self::ALL
            .into_iter()
            .find(|k| k.extension().eq_ignore_ascii_case(ext))
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// A file as selected by the candidate, before validation.
#[derive(Debug, Clone)]
pub struct CandidateDocument {
    /// Original file name, including extension.
    pub name: String,
    /// MIME type declared by the client, if any.
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl CandidateDocument {
    pub fn new(name: impl Into<String>, mime_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.map(str::to_string),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// A document that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedDocument {
    pub name: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl ValidatedDocument {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            name: self.name.clone(),
            kind: self.kind,
            size_bytes: self.size(),
        }
    }
}

/// What observers get to see of the selected document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub name: String,
    pub kind: DocumentKind,
    pub size_bytes: u64,
}

/// Reasons a document is refused. Messages are shown to the candidate as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please upload a PDF, DOC, or DOCX file")]
    UnsupportedType,

    #[error("File size must be less than {}MB", .max / (1024 * 1024))]
    TooLarge { size: u64, max: u64 },

    #[error("The selected file is empty")]
    Empty,
}

impl ValidationError {
    /// Short machine-readable reason, used as a metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::UnsupportedType => "unsupported_type",
            ValidationError::TooLarge { .. } => "too_large",
            ValidationError::Empty => "empty",
        }
    }
}
