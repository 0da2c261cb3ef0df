//! PDF Cross-Reference Table Parser
//!
//! Builds the cross-reference index of ISO 32000-1 Section 7.5.4 from the
//! newest section named by `startxref` back through every `Prev` link,
//! including cross-reference streams and hybrid `XRefStm` sections.

use super::lexer::{Lexer, Token};
use super::objects::ObjectParser;
use super::trailer::Trailer;
use super::xref_stream::parse_xref_stream;
use super::{is_whitespace, rfind_bytes, ParseError, ParseOptions, ParseResult};
use crate::objects::{Dictionary, ObjectId};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

/// Generation of the free-list head, object 0.
pub const FREE_HEAD_GENERATION: u16 = 65535;

/// How many bytes from the end are searched for `startxref`.
const STARTXREF_WINDOW: usize = 1024;

/// Used entries checked against the bytes after the index is built.
const VALIDATION_SAMPLE: usize = 8;

/// Location of one object number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Stored uncompressed at `offset`.
    Used { offset: u64, generation: u16 },
    /// Packed at `index` inside object stream `container`.
    Compressed { container: u32, index: u32 },
    /// Not in use; `next_free` links the free list.
    Free { next_free: u32, generation: u16 },
}

impl XRefEntry {
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Used { generation, .. } | XRefEntry::Free { generation, .. } => *generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }
}

/// Cross-reference index plus the merged trailer.
#[derive(Debug, Clone)]
pub struct XRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Trailer,
}

impl XRefTable {
    pub fn new(trailer: Trailer) -> Self {
        let mut table = Self {
            entries: BTreeMap::new(),
            trailer,
        };
        table.ensure_free_head();
        table
    }

    /// Parse every section reachable from `startxref`.
    pub fn parse(data: &[u8], options: &ParseOptions) -> ParseResult<Self> {
        let start = find_startxref(data)?;
        let mut entries: BTreeMap<u32, XRefEntry> = BTreeMap::new();
        let mut trailer: Option<Trailer> = None;
        let mut visited = HashSet::new();
        let mut next = Some(start);

        while let Some(offset) = next.take() {
            if !visited.insert(offset) {
                debug!("Prev chain loops back to {}", offset);
                break;
            }
            let section = parse_section(data, offset, options)?;
            trace!(
                "xref section at {} with {} entries",
                offset,
                section.entries.len()
            );

            // Newer sections were read first and win
            for (number, entry) in section.entries {
                entries.entry(number).or_insert(entry);
            }

            let section_trailer = Trailer::from_xref_stream_dict(&section.trailer, offset);
            next = section_trailer.prev();
            match trailer.as_mut() {
                Some(newest) => newest.merge_older(&section_trailer.dict),
                None => trailer = Some(section_trailer),
            }
        }

        let trailer = trailer.ok_or(ParseError::InvalidXRef)?;
        let mut table = Self { entries, trailer };
        table.ensure_free_head();
        Ok(table)
    }

    fn ensure_free_head(&mut self) {
        let next_free = match self.entries.get(&0) {
            Some(XRefEntry::Free { next_free, .. }) => *next_free,
            _ => 0,
        };
        self.entries.insert(
            0,
            XRefEntry::Free {
                next_free,
                generation: FREE_HEAD_GENERATION,
            },
        );
    }

    pub fn get(&self, number: u32) -> Option<&XRefEntry> {
        self.entries.get(&number)
    }

    /// Insert or replace an entry. Object 0 stays the free-list head.
    pub fn insert(&mut self, number: u32, entry: XRefEntry) {
        if number == 0 {
            return;
        }
        self.entries.insert(number, entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> {
        self.entries.iter().map(|(n, e)| (*n, e))
    }

    /// References of every in-use (uncompressed or compressed) entry.
    pub fn in_use_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.iter().filter_map(|(number, entry)| match entry {
            XRefEntry::Used { generation, .. } => Some(ObjectId::new(*number, *generation)),
            XRefEntry::Compressed { .. } => Some(ObjectId::new(*number, 0)),
            XRefEntry::Free { .. } => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn max_object_number(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    /// Declared `/Size`, or one past the highest entry when absent.
    pub fn size(&self) -> u32 {
        let derived = self.max_object_number() + 1;
        self.trailer.size().map_or(derived, |s| s.max(derived))
    }

    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Trailer {
        &mut self.trailer
    }

    /// Check the root and a sample of used entries against the bytes they
    /// point at. Any mismatch means the index cannot be trusted.
    pub fn validate(&self, data: &[u8]) -> ParseResult<()> {
        let root = self.trailer.root()?;
        match self.entries.get(&root.number()) {
            Some(XRefEntry::Used { .. }) | Some(XRefEntry::Compressed { .. }) => {}
            _ => return Err(ParseError::InvalidReference(root.number(), root.generation())),
        }

        let used: Vec<(u32, u64, u16)> = self
            .entries
            .iter()
            .filter_map(|(n, e)| match e {
                XRefEntry::Used { offset, generation } => Some((*n, *offset, *generation)),
                _ => None,
            })
            .collect();
        let step = (used.len() / VALIDATION_SAMPLE).max(1);
        let sample = used
            .iter()
            .filter(|(n, _, _)| *n == root.number())
            .chain(used.iter().step_by(step).take(VALIDATION_SAMPLE));

        let options = ParseOptions::lenient();
        for &(number, offset, generation) in sample {
            let Ok(position) = usize::try_from(offset) else {
                return Err(ParseError::InvalidXRef);
            };
            if position >= data.len() {
                return Err(ParseError::InvalidXRef);
            }
            let header = ObjectParser::at(data, position, &options).parse_object_header();
            match header {
                Ok(id) if id.number() == number && id.generation() == generation => {}
                Ok(id) => {
                    debug!("xref entry {} points at object {}", number, id);
                    return Err(ParseError::InvalidXRef);
                }
                Err(err) => {
                    debug!("xref entry {} at {} is not an object header: {}", number, offset, err);
                    return Err(ParseError::InvalidXRef);
                }
            }
        }

        for entry in self.entries.values() {
            if let XRefEntry::Compressed { container, .. } = entry {
                if !matches!(self.entries.get(container), Some(XRefEntry::Used { .. })) {
                    debug!("Compressed entry names container {} which is not in use", container);
                    return Err(ParseError::InvalidXRef);
                }
            }
        }

        Ok(())
    }
}

/// One section: its entries and its trailer (or xref stream) dictionary.
pub(crate) struct XRefSection {
    pub entries: Vec<(u32, XRefEntry)>,
    pub trailer: Dictionary,
}

/// Byte offset named by the last `startxref`.
pub fn find_startxref(data: &[u8]) -> ParseResult<u64> {
    let window_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let marker = rfind_bytes(&data[window_start..], b"startxref").ok_or(ParseError::InvalidXRef)?;
    let mut lexer = Lexer::at(data, window_start + marker + b"startxref".len());
    match lexer.next_token()? {
        Token::Integer(offset) if offset >= 0 => Ok(offset as u64),
        _ => Err(ParseError::InvalidXRef),
    }
}

fn parse_section(data: &[u8], offset: u64, options: &ParseOptions) -> ParseResult<XRefSection> {
    let mut position = usize::try_from(offset).map_err(|_| ParseError::InvalidXRef)?;
    if position >= data.len() {
        return Err(ParseError::InvalidXRef);
    }
    while position < data.len() && is_whitespace(data[position]) {
        position += 1;
    }

    if data[position..].starts_with(b"xref") {
        let mut section = parse_table_section(data, position + 4)?;
        if let Some(stm_offset) = section
            .trailer
            .get_integer("XRefStm")
            .and_then(|n| u64::try_from(n).ok())
        {
            match parse_xref_stream(data, stm_offset, options) {
                Ok(stream) => merge_hybrid(&mut section.entries, stream.entries),
                Err(err) => debug!("Ignoring unreadable XRefStm at {}: {}", stm_offset, err),
            }
        }
        Ok(section)
    } else {
        parse_xref_stream(data, offset, options)
    }
}

/// Stream entries fill gaps in a hybrid table and replace its free placeholders.
fn merge_hybrid(table: &mut Vec<(u32, XRefEntry)>, stream: Vec<(u32, XRefEntry)>) {
    let mut index: BTreeMap<u32, usize> = BTreeMap::new();
    for (i, (number, _)) in table.iter().enumerate() {
        index.insert(*number, i);
    }
    for (number, entry) in stream {
        match index.get(&number) {
            Some(&i) if table[i].1.is_free() && !entry.is_free() => table[i].1 = entry,
            Some(_) => {}
            None => table.push((number, entry)),
        }
    }
}

/// Parse a classic `xref` table starting after the keyword, then its trailer.
fn parse_table_section(data: &[u8], position: usize) -> ParseResult<XRefSection> {
    let mut lexer = Lexer::at(data, position);
    let mut entries = Vec::new();
    let mut cursor: Option<u32> = None;

    loop {
        let first = match lexer.next_token()? {
            Token::Trailer => break,
            Token::Integer(n) => n,
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "xref entry or trailer".to_string(),
                    found: format!("{other:?}"),
                })
            }
        };
        let second = match lexer.next_token()? {
            Token::Integer(n) => n,
            _ => return Err(ParseError::InvalidXRef),
        };

        let saved = lexer.position();
        match lexer.next_token()? {
            Token::Keyword(kind) if kind == "n" || kind == "f" => {
                let number = cursor.ok_or(ParseError::InvalidXRef)?;
                cursor = Some(number + 1);
                let generation = u16::try_from(second).unwrap_or(FREE_HEAD_GENERATION);
                let entry = if kind == "n" && first > 0 {
                    XRefEntry::Used {
                        offset: first as u64,
                        generation,
                    }
                } else {
                    XRefEntry::Free {
                        next_free: u32::try_from(first).unwrap_or(0),
                        generation,
                    }
                };
                entries.push((number, entry));
            }
            _ => {
                // Subsection header: start count
                lexer.set_position(saved);
                cursor = Some(u32::try_from(first).map_err(|_| ParseError::InvalidXRef)?);
            }
        }
    }

    let trailer = match ObjectParser::at(data, lexer.position(), &ParseOptions::lenient())
        .parse_object()?
    {
        crate::objects::Object::Dictionary(dict) => dict,
        _ => return Err(ParseError::InvalidTrailer),
    };

    Ok(XRefSection { entries, trailer })
}
