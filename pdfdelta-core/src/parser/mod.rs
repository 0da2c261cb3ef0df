//! PDF Parser Module
//!
//! Tokenizer, object parser and cross-reference machinery for reading the
//! container format, plus the filter pipeline and the content-stream tokenizer.

pub mod content;
pub mod encryption_handler;
pub mod filter_impls;
pub mod filters;
pub mod header;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod page_tree;
pub mod stack_safe;
pub mod trailer;
pub mod xref;
pub mod xref_stream;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use self::content::{ContentToken, ContentTokenizer, Operator};
pub use self::encryption_handler::{SecurityHandler, SecurityProvider};
pub use self::filters::{decode_stream, Filter, FilterParams};
pub use self::objects::ObjectParser;
pub use self::trailer::Trailer;
pub use self::xref::{XRefEntry, XRefTable};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Invalid object reference: {0} {1} R")]
    InvalidReference(u32, u16),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid xref table")]
    InvalidXRef,

    #[error("Invalid trailer")]
    InvalidTrailer,

    #[error("Circular reference detected")]
    CircularReference,

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),
}

/// Parsing behaviour switches, passed explicitly into the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
    /// Repair bad stream lengths by scanning for `endstream`.
    pub lenient_syntax: bool,
    /// Longest chain of reference-to-reference hops followed by `resolve`.
    pub max_reference_chain: usize,
    /// Nesting limit for arrays and dictionaries.
    pub max_nesting_depth: usize,
    /// Allow the one-shot linear scan when the xref index is unusable.
    pub allow_recovery: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParseOptions {
    pub fn lenient() -> Self {
        Self {
            lenient_syntax: true,
            max_reference_chain: 32,
            max_nesting_depth: stack_safe::MAX_RECURSION_DEPTH,
            allow_recovery: true,
        }
    }

    /// No stream-length repair and no linear-scan recovery.
    pub fn strict() -> Self {
        Self {
            lenient_syntax: false,
            allow_recovery: false,
            ..Self::lenient()
        }
    }
}

/// PDF whitespace per ISO 32000-1 Table 1.
#[inline]
pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

#[inline]
pub(crate) fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Position of the first occurrence of `needle` at or after `from`.
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Position of the last occurrence of `needle`.
pub(crate) fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}
