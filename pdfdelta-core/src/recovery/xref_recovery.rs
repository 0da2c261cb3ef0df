//! XRef recovery for corrupted PDF files
//!
//! Rebuilds the cross-reference index by scanning the whole byte source for
//! object headers. A later definition of the same object number replaces an
//! earlier one, mirroring how incremental updates shadow older revisions.

use crate::objects::{Dictionary, Object, ObjectId};
use crate::parser::filters::decode_stream;
use crate::parser::object_stream::ObjectStream;
use crate::parser::objects::{no_length_resolver, ObjectParser};
use crate::parser::xref::{XRefEntry, XRefTable};
use crate::parser::{find_bytes, is_delimiter, is_whitespace, ParseError, ParseOptions, ParseResult, Trailer};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Recovery statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecoveryStats {
    /// Number of `N G obj` headers found
    pub objects_found: usize,
    /// Objects located inside object streams found by the scan
    pub compressed_found: usize,
    /// Number of `trailer` dictionaries parsed
    pub trailers_found: usize,
    /// The root came from a `/Type /Catalog` search rather than a trailer
    pub catalog_searched: bool,
}

/// XRef recovery engine
pub struct XRefRecovery<'a> {
    data: &'a [u8],
    options: ParseOptions,
    /// Object number -> (generation, offset), later definitions win
    objects: BTreeMap<u32, (u16, u64)>,
    trailers: Vec<Dictionary>,
    stats: RecoveryStats,
}

impl<'a> XRefRecovery<'a> {
    pub fn new(data: &'a [u8], options: &ParseOptions) -> Self {
        Self {
            data,
            options: ParseOptions {
                lenient_syntax: true,
                ..options.clone()
            },
            objects: BTreeMap::new(),
            trailers: Vec::new(),
            stats: RecoveryStats::default(),
        }
    }

    /// Scan, then build the table. Fails only when no object is found at all.
    pub fn recover(mut self) -> ParseResult<(XRefTable, RecoveryStats)> {
        self.scan_objects();
        self.scan_trailers();
        if self.objects.is_empty() {
            return Err(ParseError::InvalidXRef);
        }
        let table = self.build_xref_table();
        Ok((table, self.stats))
    }

    fn scan_objects(&mut self) {
        let mut from = 0;
        while let Some(found) = find_bytes(self.data, b"obj", from) {
            from = found + 3;
            if let Some((number, generation, start)) = self.object_header_before(found) {
                self.objects.insert(number, (generation, start as u64));
                self.stats.objects_found += 1;
            }
        }
        debug!("Linear scan found {} object headers", self.stats.objects_found);
    }

    /// Match `N G obj` ending at the `obj` found at `keyword`.
    fn object_header_before(&self, keyword: usize) -> Option<(u32, u16, usize)> {
        let data = self.data;
        // Reject "endobj" and longer words
        if keyword >= 3 && &data[keyword - 3..keyword] == b"end" {
            return None;
        }
        if let Some(&next) = data.get(keyword + 3) {
            if !is_whitespace(next) && !is_delimiter(next) {
                return None;
            }
        }

        let mut pos = keyword;
        let gen_end = skip_back_whitespace(data, pos)?;
        if gen_end == pos {
            return None;
        }
        let gen_start = skip_back_digits(data, gen_end);
        if gen_start == gen_end {
            return None;
        }
        pos = gen_start;
        let num_end = skip_back_whitespace(data, pos)?;
        if num_end == pos {
            return None;
        }
        let num_start = skip_back_digits(data, num_end);
        if num_start == num_end {
            return None;
        }
        if num_start > 0 {
            let before = data[num_start - 1];
            if !is_whitespace(before) && !is_delimiter(before) {
                return None;
            }
        }

        let number = std::str::from_utf8(&data[num_start..num_end]).ok()?.parse().ok()?;
        let generation = std::str::from_utf8(&data[gen_start..gen_end]).ok()?.parse().ok()?;
        Some((number, generation, num_start))
    }

    fn scan_trailers(&mut self) {
        let mut from = 0;
        while let Some(found) = find_bytes(self.data, b"trailer", from) {
            from = found + 7;
            let mut parser = ObjectParser::at(self.data, from, &self.options);
            match parser.parse_object() {
                Ok(Object::Dictionary(dict)) => {
                    self.trailers.push(dict);
                    self.stats.trailers_found += 1;
                }
                Ok(other) => debug!("trailer at {} holds a {}", found, other.type_name()),
                Err(err) => debug!("Unreadable trailer at {}: {}", found, err),
            }
        }
    }

    fn build_xref_table(&mut self) -> XRefTable {
        let mut trailer = self
            .trailers
            .iter()
            .rev()
            .find(|dict| dict.get_reference("Root").is_some())
            .cloned()
            .or_else(|| self.trailer_from_xref_streams())
            .unwrap_or_default();
        for key in ["Prev", "XRefStm"] {
            trailer.remove(key);
        }

        let mut table = XRefTable::new(Trailer::new(Dictionary::new(), None));
        for (&number, &(generation, offset)) in &self.objects {
            table.insert(number, XRefEntry::Used { offset, generation });
        }
        self.add_object_stream_members(&mut table);

        if trailer.get_reference("Root").is_none() {
            match self.find_catalog() {
                Some(root) => {
                    trailer.set("Root", root);
                    self.stats.catalog_searched = true;
                }
                None => warn!("Linear scan found no catalog"),
            }
        }
        let size = i64::from(table.max_object_number()) + 1;
        let declared = trailer.get_integer("Size").unwrap_or(0);
        trailer.set("Size", size.max(declared));

        *table.trailer_mut() = Trailer::new(trailer, None);
        table
    }

    /// Parse the object recorded for `number`.
    fn parse_found(&self, number: u32) -> Option<Object> {
        let &(_, offset) = self.objects.get(&number)?;
        let mut parser = ObjectParser::at(self.data, offset as usize, &self.options);
        parser
            .parse_indirect(&no_length_resolver)
            .ok()
            .map(|(_, object)| object)
    }

    /// Cross-reference streams carry the trailer keys in their dictionary.
    fn trailer_from_xref_streams(&self) -> Option<Dictionary> {
        let mut found = None;
        for &number in self.objects.keys() {
            if let Some(Object::Stream(stream)) = self.parse_found(number) {
                let dict = stream.dictionary();
                if dict.is_type("XRef") && dict.get_reference("Root").is_some() {
                    found = Some(Trailer::from_xref_stream_dict(dict, 0).dict);
                }
            }
        }
        found
    }

    /// Objects packed in object streams have no header of their own. Add them
    /// as compressed entries unless the scan saw a direct definition.
    fn add_object_stream_members(&mut self, table: &mut XRefTable) {
        let numbers: Vec<u32> = self.objects.keys().copied().collect();
        for container in numbers {
            let Some(Object::Stream(stream)) = self.parse_found(container) else {
                continue;
            };
            if !stream.dictionary().is_type("ObjStm") {
                continue;
            }
            let decoded = match decode_stream(stream.raw_data(), stream.dictionary()) {
                Ok(decoded) => decoded,
                Err(err) => {
                    debug!("Skipping undecodable object stream {}: {}", container, err);
                    continue;
                }
            };
            let objects = ObjectStream::new(
                ObjectId::new(container, 0),
                stream.dictionary(),
                Arc::new(decoded),
                &self.options,
            );
            for (index, &(number, _)) in objects.header().iter().enumerate() {
                if number == 0 || self.objects.contains_key(&number) {
                    continue;
                }
                let Ok(index) = u32::try_from(index) else {
                    break;
                };
                table.insert(number, XRefEntry::Compressed { container, index });
                self.stats.compressed_found += 1;
            }
        }
    }

    /// The last object in file order whose dictionary is `/Type /Catalog`.
    fn find_catalog(&self) -> Option<ObjectId> {
        let mut by_offset: Vec<(u64, u32, u16)> = self
            .objects
            .iter()
            .map(|(&number, &(generation, offset))| (offset, number, generation))
            .collect();
        by_offset.sort_unstable();

        by_offset
            .into_iter()
            .rev()
            .find(|&(_, number, _)| {
                matches!(self.parse_found(number), Some(Object::Dictionary(dict)) if dict.is_type("Catalog"))
            })
            .map(|(_, number, generation)| ObjectId::new(number, generation))
    }
}

fn skip_back_whitespace(data: &[u8], mut pos: usize) -> Option<usize> {
    while pos > 0 && is_whitespace(data[pos - 1]) {
        pos -= 1;
    }
    (pos > 0).then_some(pos)
}

fn skip_back_digits(data: &[u8], mut pos: usize) -> usize {
    while pos > 0 && data[pos - 1].is_ascii_digit() {
        pos -= 1;
    }
    pos
}

/// Rebuild the index of `data` by linear scan.
pub fn recover_xref(data: &[u8], options: &ParseOptions) -> ParseResult<(XRefTable, RecoveryStats)> {
    XRefRecovery::new(data, options).recover()
}
