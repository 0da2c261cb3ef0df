//! PDF Trailer
//!
//! Parses the trailer dictionary according to ISO 32000-1 Section 7.5.5.
//! The same type describes the dictionary of a cross-reference stream, which
//! carries the trailer keys itself.

use super::{ParseError, ParseResult};
use crate::objects::{Dictionary, Object, ObjectId};

/// PDF Trailer information
#[derive(Debug, Clone, PartialEq)]
pub struct Trailer {
    /// The trailer dictionary (merged across the Prev chain, newest wins)
    pub dict: Dictionary,
    /// Byte offset of the newest xref section, `None` when the index was rebuilt by scanning
    pub xref_offset: Option<u64>,
}

/// Keys that describe a single xref section rather than the document.
const SECTION_KEYS: &[&str] = &[
    "Prev", "XRefStm", "Type", "W", "Index", "Length", "Filter", "DecodeParms",
];

impl Trailer {
    pub fn new(dict: Dictionary, xref_offset: Option<u64>) -> Self {
        Self { dict, xref_offset }
    }

    /// Trailer of one section: a table trailer, or an xref stream dictionary
    /// with its stream-only keys dropped.
    pub fn from_xref_stream_dict(dict: &Dictionary, xref_offset: u64) -> Self {
        let mut trailer = Dictionary::new();
        for (key, value) in dict {
            if !matches!(key.as_str(), "Type" | "W" | "Index" | "Length" | "Filter" | "DecodeParms")
            {
                trailer.set(key.clone(), value.clone());
            }
        }
        Self::new(trailer, Some(xref_offset))
    }

    /// Fill keys missing from `self` with those of an older section.
    pub fn merge_older(&mut self, older: &Dictionary) {
        for (key, value) in older {
            if !self.dict.contains_key(key) && !SECTION_KEYS.contains(&key.as_str()) {
                self.dict.set(key.clone(), value.clone());
            }
        }
    }

    pub fn size(&self) -> Option<u32> {
        self.dict
            .get_integer("Size")
            .and_then(|n| u32::try_from(n).ok())
    }

    pub fn prev(&self) -> Option<u64> {
        self.dict
            .get_integer("Prev")
            .and_then(|n| u64::try_from(n).ok())
    }

    /// Document catalog reference
    pub fn root(&self) -> ParseResult<ObjectId> {
        self.dict
            .get_reference("Root")
            .ok_or_else(|| ParseError::MissingKey("Root".to_string()))
    }

    pub fn info(&self) -> Option<ObjectId> {
        self.dict.get_reference("Info")
    }

    pub fn id(&self) -> Option<&Object> {
        self.dict.get("ID")
    }

    /// The `Encrypt` entry: usually a reference, occasionally a direct dictionary.
    pub fn encrypt(&self) -> Option<&Object> {
        self.dict.get("Encrypt")
    }

    pub fn is_encrypted(&self) -> bool {
        self.dict.contains_key("Encrypt")
    }

    /// First element of the ID array, used as key material by security providers.
    pub fn first_id(&self) -> Option<&[u8]> {
        self.id()
            .and_then(Object::as_array)
            .and_then(|ids| ids.first())
            .and_then(Object::as_string)
            .map(|s| s.as_bytes())
    }
}
