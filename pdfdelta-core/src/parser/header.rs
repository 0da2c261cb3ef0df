//! PDF Header Parser
//!
//! Parses PDF header and version according to ISO 32000-1 Section 7.5.2

use super::{find_bytes, ParseError, ParseResult};

/// How far into the file the `%PDF-` marker may appear.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// PDF Version information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// PDF Header information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfHeader {
    pub version: PdfVersion,
    /// Byte offset of `%PDF-`; non-zero when the file carries leading garbage.
    pub offset: usize,
    pub has_binary_marker: bool,
}

impl PdfHeader {
    pub fn parse(data: &[u8]) -> ParseResult<Self> {
        let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
        let offset = find_bytes(window, b"%PDF-", 0).ok_or(ParseError::InvalidHeader)?;

        let rest = &data[offset + 5..];
        let major = rest
            .first()
            .filter(|b| b.is_ascii_digit())
            .map(|b| b - b'0')
            .ok_or(ParseError::InvalidHeader)?;
        if rest.get(1) != Some(&b'.') {
            return Err(ParseError::InvalidHeader);
        }
        let minor = rest
            .get(2)
            .filter(|b| b.is_ascii_digit())
            .map(|b| b - b'0')
            .ok_or(ParseError::InvalidHeader)?;

        Ok(Self {
            version: PdfVersion::new(major, minor),
            offset,
            has_binary_marker: Self::check_binary_marker(&rest[3..]),
        })
    }

    /// A comment line of four or more bytes >= 128 right after the version line.
    fn check_binary_marker(after_version: &[u8]) -> bool {
        let mut pos = 0;
        while pos < after_version.len() && !matches!(after_version[pos], b'\r' | b'\n') {
            pos += 1;
        }
        while pos < after_version.len() && matches!(after_version[pos], b'\r' | b'\n') {
            pos += 1;
        }
        let line = &after_version[pos..];
        line.first() == Some(&b'%')
            && line[1..]
                .iter()
                .take_while(|b| !matches!(b, b'\r' | b'\n'))
                .filter(|b| **b >= 128)
                .count()
                >= 4
    }
}
