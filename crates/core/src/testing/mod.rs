//! Testing utilities and mock implementations.
//!
//! Mocks for the two outbound collaborators, the workflow submission
//! endpoint and the result poller, so pipelines can be driven end to end
//! without a workflow engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use matchpro_core::testing::{MockResultPoller, MockSubmissionClient, fixtures};
//!
//! let submitter = MockSubmissionClient::new();
//! submitter.push_accepted("abc").await;
//!
//! let poller = MockResultPoller::new();
//! poller.script("abc", vec![Ok(PollStatus::Completed(fixtures::analysis_result(82)))]).await;
//! ```

mod mock_result_poller;
mod mock_submission_client;

pub use mock_result_poller::MockResultPoller;
pub use mock_submission_client::{MockSubmissionClient, RecordedSubmission};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;
    use std::collections::BTreeSet;

    use crate::analysis::AnalysisResult;
    use crate::document::{CandidateDocument, DocumentKind, ValidatedDocument};
    use crate::submission::SubmissionRequest;

    /// A plausible analysis with the given score.
    pub fn analysis_result(score: u8) -> AnalysisResult {
        AnalysisResult {
            score,
            strengths: vec![
                "Clear project descriptions".to_string(),
                "Quantified achievements".to_string(),
            ],
            improvements: vec!["Add a skills summary".to_string()],
            found_keywords: BTreeSet::from(["rust".to_string(), "kubernetes".to_string()]),
            missing_keywords: BTreeSet::from(["terraform".to_string()]),
            optimized_document_url: None,
        }
    }

    /// PDF bytes of the given size, starting with the PDF magic.
    pub fn pdf_bytes(size: usize) -> Vec<u8> {
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.resize(size, b'0');
        bytes.truncate(size);
        bytes
    }

    /// A PDF as selected by the candidate.
    pub fn candidate_pdf(name: &str, size: usize) -> CandidateDocument {
        CandidateDocument::new(name, Some(DocumentKind::Pdf.mime_type()), pdf_bytes(size))
    }

    /// A PDF that already passed validation.
    pub fn validated_pdf(name: &str, size: usize) -> ValidatedDocument {
        ValidatedDocument {
            name: name.to_string(),
            kind: DocumentKind::Pdf,
            bytes: pdf_bytes(size),
        }
    }

    /// A submission of `cv.pdf` for `role`.
    pub fn submission_request(role: &str, size: usize) -> SubmissionRequest {
        SubmissionRequest {
            document: validated_pdf("cv.pdf", size),
            declared_role: role.to_string(),
            submitted_at: Utc::now(),
        }
    }
}
