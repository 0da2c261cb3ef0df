use crate::objects::ObjectId;
use crate::parser::ParseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Document root could not be located, even after rebuilding the xref index")]
    MissingRoot,

    #[error("Security handler error: {0}")]
    Security(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Change recorded for unassigned reference {0}")]
    UnassignedReference(ObjectId),

    #[error("Invalid page index: {0}")]
    InvalidPageIndex(usize),

    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),

    #[error("Compression error: {0}")]
    Compression(String),
}

impl PdfError {
    /// True for cooperative cancellation, which callers must not treat as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PdfError::Cancelled)
    }

    /// True when the failure came from the security collaborator.
    pub fn is_security(&self) -> bool {
        matches!(self, PdfError::Security(_))
    }
}

pub type Result<T> = std::result::Result<T, PdfError>;
