//! Cross-reference stream support for PDF 1.5+
//!
//! Decodes `/Type /XRef` streams (ISO 32000-1 Section 7.5.8) into the same
//! [`XRefEntry`] model the classic table produces.

use super::filters::decode_stream;
use super::objects::{no_length_resolver, ObjectParser};
use super::xref::{XRefEntry, XRefSection};
use super::{ParseError, ParseOptions, ParseResult};
use crate::objects::{Dictionary, Object};
use tracing::{debug, warn};

/// Parse the xref stream object at `offset`.
pub(crate) fn parse_xref_stream(
    data: &[u8],
    offset: u64,
    options: &ParseOptions,
) -> ParseResult<XRefSection> {
    let position = usize::try_from(offset).map_err(|_| ParseError::InvalidXRef)?;
    if position >= data.len() {
        return Err(ParseError::InvalidXRef);
    }
    let (id, object) = ObjectParser::at(data, position, options).parse_indirect(&no_length_resolver)?;

    let stream = match object {
        Object::Stream(stream) => stream,
        other => {
            debug!("Object {} at xref offset is a {}", id, other.type_name());
            return Err(ParseError::InvalidXRef);
        }
    };
    let dict = stream.dictionary();
    if !dict.is_type("XRef") {
        warn!("Cross-reference stream {} lacks /Type /XRef", id);
    }

    let decoded = decode_stream(stream.raw_data(), dict)?;
    let entries = decode_entries(dict, &decoded)?;

    Ok(XRefSection {
        entries,
        trailer: dict.clone(),
    })
}

/// Split decoded stream bytes into entries according to `/W` and `/Index`.
pub(crate) fn decode_entries(dict: &Dictionary, decoded: &[u8]) -> ParseResult<Vec<(u32, XRefEntry)>> {
    let widths: Vec<usize> = dict
        .get_array("W")
        .ok_or_else(|| ParseError::MissingKey("W".to_string()))?
        .iter()
        .map(|w| w.as_integer().and_then(|w| usize::try_from(w).ok()))
        .collect::<Option<Vec<_>>>()
        .filter(|w| w.len() == 3 && w.iter().all(|&n| n <= 8))
        .ok_or(ParseError::InvalidXRef)?;
    let entry_len: usize = widths.iter().sum();
    if entry_len == 0 {
        return Err(ParseError::InvalidXRef);
    }

    let size = dict
        .get_integer("Size")
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ParseError::MissingKey("Size".to_string()))?;
    let ranges: Vec<(u32, u32)> = match dict.get_array("Index") {
        Some(index) => index
            .chunks(2)
            .filter_map(|pair| match pair {
                [start, count] => Some((
                    u32::try_from(start.as_integer()?).ok()?,
                    u32::try_from(count.as_integer()?).ok()?,
                )),
                _ => None,
            })
            .collect(),
        None => vec![(0, size)],
    };

    let mut entries = Vec::new();
    let mut rows = decoded.chunks_exact(entry_len);
    'ranges: for (start, count) in ranges {
        for number in start..start.saturating_add(count) {
            let Some(row) = rows.next() else {
                warn!("Cross-reference stream shorter than its /Index claims");
                break 'ranges;
            };
            let (type_field, rest) = row.split_at(widths[0]);
            let (second, third) = rest.split_at(widths[1]);
            // A zero-width type field defaults to type 1
            let kind = if widths[0] == 0 { 1 } else { read_field(type_field) };
            let second = read_field(second);
            let third = read_field(third);

            let entry = match kind {
                0 => XRefEntry::Free {
                    next_free: second as u32,
                    generation: third as u16,
                },
                1 => XRefEntry::Used {
                    offset: second,
                    generation: third as u16,
                },
                2 => XRefEntry::Compressed {
                    container: second as u32,
                    index: third as u32,
                },
                other => {
                    // Reserved types read as references to the null object
                    debug!("Skipping xref stream entry {} of type {}", number, other);
                    continue;
                }
            };
            entries.push((number, entry));
        }
    }

    Ok(entries)
}

/// Big-endian unsigned field.
fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}
