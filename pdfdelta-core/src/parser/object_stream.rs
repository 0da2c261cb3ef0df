//! PDF Object Stream Parser
//!
//! Handles compressed objects stored in object streams (PDF 1.5+). The
//! header table of `(object number, offset)` pairs is parsed once, on first
//! lookup, and only the requested inner object is parsed after that.

use super::lexer::{Lexer, Token};
use super::objects::ObjectParser;
use super::ParseOptions;
use crate::objects::{Dictionary, Object, ObjectId};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// A decoded object stream.
#[derive(Debug)]
pub struct ObjectStream {
    id: ObjectId,
    data: Arc<Vec<u8>>,
    declared: usize,
    first: usize,
    header: OnceLock<Vec<(u32, usize)>>,
    options: ParseOptions,
}

impl ObjectStream {
    /// Wrap the decoded bytes of container `id`. `dict` supplies `/N` and `/First`.
    pub fn new(id: ObjectId, dict: &Dictionary, data: Arc<Vec<u8>>, options: &ParseOptions) -> Self {
        let declared = dict
            .get_integer("N")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        let first = dict
            .get_integer("First")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        if !dict.is_type("ObjStm") {
            debug!("Object stream {} lacks /Type /ObjStm", id);
        }

        Self {
            id,
            data,
            declared,
            first,
            header: OnceLock::new(),
            options: options.clone(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The offset table. A malformed table is logged and yields no entries.
    pub fn header(&self) -> &[(u32, usize)] {
        self.header.get_or_init(|| self.parse_header())
    }

    pub fn len(&self) -> usize {
        self.header().len()
    }

    pub fn is_empty(&self) -> bool {
        self.header().is_empty()
    }

    fn parse_header(&self) -> Vec<(u32, usize)> {
        let table_end = self.first.min(self.data.len());
        // Each pair takes at least two digits and a separator
        if self.declared > table_end / 2 {
            warn!(
                "Object stream {} declares {} objects but its offset table is {} bytes, treating it as empty",
                self.id, self.declared, table_end
            );
            return Vec::new();
        }
        let mut lexer = Lexer::new(&self.data[..table_end]);
        let mut pairs = Vec::with_capacity(self.declared);

        for _ in 0..self.declared {
            let number = lexer.next_token();
            let offset = lexer.next_token();
            match (number, offset) {
                (Ok(Token::Integer(n)), Ok(Token::Integer(o))) => {
                    match (u32::try_from(n), usize::try_from(o)) {
                        (Ok(n), Ok(o)) => pairs.push((n, o)),
                        _ => {
                            warn!("Object stream {} has an out-of-range header entry", self.id);
                            return Vec::new();
                        }
                    }
                }
                (n, o) => {
                    warn!(
                        "Malformed header in object stream {} ({:?} {:?}), treating it as empty",
                        self.id, n, o
                    );
                    return Vec::new();
                }
            }
        }

        pairs
    }

    /// Object at `index`, together with the object number stored for it.
    pub fn get(&self, index: usize) -> Option<(u32, Object)> {
        let &(number, offset) = self.header().get(index)?;
        let start = self.first.checked_add(offset)?;
        if start >= self.data.len() {
            warn!(
                "Object {} points past the end of object stream {}",
                number, self.id
            );
            return None;
        }

        match ObjectParser::at(&self.data, start, &self.options).parse_object() {
            Ok(object) => Some((number, object)),
            Err(err) => {
                warn!(
                    "Failed to parse object {} in object stream {}: {}",
                    number, self.id, err
                );
                None
            }
        }
    }

    /// Object `number`, trying `index` first and falling back to a search
    /// of the header when the index is stale.
    pub fn get_object(&self, number: u32, index: usize) -> Option<Object> {
        if let Some(&(stored, _)) = self.header().get(index) {
            if stored == number {
                return self.get(index).map(|(_, object)| object);
            }
        }
        let position = self.header().iter().position(|&(n, _)| n == number)?;
        debug!(
            "Object {} found at index {} of object stream {}, not {}",
            number, position, self.id, index
        );
        self.get(position).map(|(_, object)| object)
    }
}
