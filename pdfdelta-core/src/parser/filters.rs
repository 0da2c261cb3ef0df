//! PDF Stream Filters
//!
//! The filter pipeline of ISO 32000-1 Section 7.4: an ordered chain of byte
//! transforms read from a stream's `/Filter` and `/DecodeParms`. Decryption by
//! a security handler, when present, runs before the first named filter.

use super::encryption_handler::SecurityHandler;
use super::filter_impls::{apply_predictor, decode_lzw, decode_run_length};
use super::lexer::hex_value;
use super::{ParseError, ParseResult};
use crate::objects::{Dictionary, Object, ObjectId};
use tracing::{debug, warn};

#[cfg(feature = "compression")]
use flate2::{Decompress, FlushDecompress, Status};

/// Supported PDF filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    ASCIIHexDecode,
    ASCII85Decode,
    LZWDecode,
    FlateDecode,
    RunLengthDecode,
    CCITTFaxDecode,
    JBIG2Decode,
    DCTDecode,
    JPXDecode,
    Crypt,
    /// A name no stage recognises; passed through with a warning.
    Unknown(String),
}

impl Filter {
    /// Parse a filter name, accepting the abbreviations of inline images.
    pub fn from_name(name: &str) -> Self {
        match name {
            "ASCIIHexDecode" | "AHx" => Filter::ASCIIHexDecode,
            "ASCII85Decode" | "A85" => Filter::ASCII85Decode,
            "LZWDecode" | "LZW" => Filter::LZWDecode,
            "FlateDecode" | "Fl" => Filter::FlateDecode,
            "RunLengthDecode" | "RL" => Filter::RunLengthDecode,
            "CCITTFaxDecode" | "CCF" => Filter::CCITTFaxDecode,
            "JBIG2Decode" => Filter::JBIG2Decode,
            "DCTDecode" | "DCT" => Filter::DCTDecode,
            "JPXDecode" => Filter::JPXDecode,
            "Crypt" => Filter::Crypt,
            other => Filter::Unknown(other.to_string()),
        }
    }

    /// Long-form name.
    pub fn name(&self) -> &str {
        match self {
            Filter::ASCIIHexDecode => "ASCIIHexDecode",
            Filter::ASCII85Decode => "ASCII85Decode",
            Filter::LZWDecode => "LZWDecode",
            Filter::FlateDecode => "FlateDecode",
            Filter::RunLengthDecode => "RunLengthDecode",
            Filter::CCITTFaxDecode => "CCITTFaxDecode",
            Filter::JBIG2Decode => "JBIG2Decode",
            Filter::DCTDecode => "DCTDecode",
            Filter::JPXDecode => "JPXDecode",
            Filter::Crypt => "Crypt",
            Filter::Unknown(name) => name,
        }
    }

    /// Image codecs are decoded by an external collaborator.
    pub fn is_image_codec(&self) -> bool {
        matches!(
            self,
            Filter::CCITTFaxDecode | Filter::JBIG2Decode | Filter::DCTDecode | Filter::JPXDecode
        )
    }
}

/// Predictor and LZW parameters from a `DecodeParms` dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterParams {
    pub predictor: usize,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
    pub early_change: bool,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
            early_change: true,
        }
    }
}

impl FilterParams {
    pub fn from_dict(dict: &Dictionary) -> Self {
        let get = |key: &str, default: usize| {
            dict.get_integer(key)
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(default)
        };
        let defaults = Self::default();
        Self {
            predictor: get("Predictor", defaults.predictor),
            colors: get("Colors", defaults.colors),
            bits_per_component: get("BitsPerComponent", defaults.bits_per_component),
            columns: get("Columns", defaults.columns),
            early_change: dict.get_integer("EarlyChange").map_or(true, |v| v != 0),
        }
    }
}

/// Filters and their aligned parameters from a stream dictionary.
///
/// Values must already be direct; the object store resolves referenced
/// `Filter`/`DecodeParms` entries before calling this.
pub fn filters_from_dict(dict: &Dictionary) -> (Vec<Filter>, Vec<Option<FilterParams>>) {
    let filter_obj = dict.get("Filter").or_else(|| dict.get("F"));
    let params_obj = dict.get("DecodeParms").or_else(|| dict.get("DP"));

    let filters: Vec<Filter> = match filter_obj {
        Some(Object::Name(name)) => vec![Filter::from_name(name)],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Object::Name(name) => Some(Filter::from_name(name)),
                other => {
                    warn!("Ignoring non-name filter entry of type {}", other.type_name());
                    None
                }
            })
            .collect(),
        Some(Object::Null) | None => Vec::new(),
        Some(other) => {
            warn!("Ignoring /Filter of type {}", other.type_name());
            Vec::new()
        }
    };

    let params_at = |index: usize| -> Option<FilterParams> {
        match params_obj {
            Some(Object::Dictionary(d)) if index == 0 => Some(FilterParams::from_dict(d)),
            Some(Object::Array(items)) => items.get(index).and_then(|item| match item {
                Object::Dictionary(d) => Some(FilterParams::from_dict(d)),
                _ => None,
            }),
            _ => None,
        }
    };
    let params = (0..filters.len()).map(params_at).collect();

    (filters, params)
}

/// Decryption applied ahead of the named filters.
pub struct Decryption<'h> {
    pub handler: &'h dyn SecurityHandler,
    pub id: ObjectId,
}

/// Run `raw` through `filters` in order.
///
/// An unknown filter is logged and skipped. An image codec ends decoding
/// and its input is returned for an external decoder. Errors are reserved for
/// malformed input to a filter this pipeline implements.
pub fn decode(
    raw: &[u8],
    filters: &[Filter],
    params: &[Option<FilterParams>],
    decryption: Option<Decryption<'_>>,
) -> ParseResult<Vec<u8>> {
    let mut data = match decryption {
        Some(decryption) => decrypt(raw, decryption)?,
        None => raw.to_vec(),
    };

    for (index, filter) in filters.iter().enumerate() {
        let params = params.get(index).and_then(Option::as_ref);
        data = match filter {
            Filter::FlateDecode => {
                let inflated = decode_flate(&data)?;
                with_predictor(inflated, params)
            }
            Filter::LZWDecode => {
                let early_change = params.map_or(true, |p| p.early_change);
                with_predictor(decode_lzw(&data, early_change), params)
            }
            Filter::ASCIIHexDecode => decode_ascii_hex(&data)?,
            Filter::ASCII85Decode => decode_ascii85(&data)?,
            Filter::RunLengthDecode => decode_run_length(&data),
            Filter::Crypt => {
                // Identity crypt filter; real crypt filters are applied by the security handler
                data
            }
            Filter::Unknown(name) => {
                warn!("Unsupported filter /{}, passing bytes through", name);
                data
            }
            codec => {
                debug!("Leaving /{} data for an external image codec", codec.name());
                return Ok(data);
            }
        };
    }

    Ok(data)
}

/// The security stage on its own.
pub fn decrypt(raw: &[u8], decryption: Decryption<'_>) -> ParseResult<Vec<u8>> {
    let Decryption { handler, id } = decryption;
    handler
        .decrypt(id, raw)
        .map_err(|e| ParseError::StreamDecodeError(format!("Decryption of {id} failed: {e}")))
}

/// Decode a stream given its dictionary (all entries direct).
pub fn decode_stream(raw: &[u8], dict: &Dictionary) -> ParseResult<Vec<u8>> {
    let (filters, params) = filters_from_dict(dict);
    decode(raw, &filters, &params, None)
}

fn with_predictor(data: Vec<u8>, params: Option<&FilterParams>) -> Vec<u8> {
    match params {
        Some(p) if p.predictor > 1 => apply_predictor(data, p),
        _ => data,
    }
}

/// Inflate zlib data. Corrupt or truncated input keeps the bytes inflated
/// before the fault, which is what most viewers display.
#[cfg(feature = "compression")]
fn decode_flate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut decompress = Decompress::new(true);
    let mut output = Vec::with_capacity(data.len().saturating_mul(4).max(64));

    loop {
        if output.len() == output.capacity() {
            output.reserve(output.capacity().max(1024));
        }
        let consumed = decompress.total_in() as usize;
        let result = decompress.decompress_vec(
            &data[consumed.min(data.len())..],
            &mut output,
            FlushDecompress::None,
        );
        match result {
            Ok(Status::StreamEnd) => break,
            Ok(Status::Ok) | Ok(Status::BufError) => {
                let made_progress = decompress.total_in() as usize != consumed;
                if !made_progress && output.len() < output.capacity() {
                    debug!("Flate stream ended without end marker");
                    break;
                }
            }
            Err(err) => {
                if output.is_empty() {
                    return Err(ParseError::StreamDecodeError(format!(
                        "Flate decode error: {err}"
                    )));
                }
                warn!(
                    "Flate stream corrupt after {} bytes, keeping partial output: {}",
                    output.len(),
                    err
                );
                break;
            }
        }
    }

    Ok(output)
}

#[cfg(not(feature = "compression"))]
fn decode_flate(_data: &[u8]) -> ParseResult<Vec<u8>> {
    Err(ParseError::StreamDecodeError(
        "FlateDecode requires 'compression' feature".to_string(),
    ))
}

fn decode_ascii_hex(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &ch in data {
        if ch == b'>' {
            break;
        }
        if super::is_whitespace(ch) {
            continue;
        }
        let value = hex_value(ch).ok_or_else(|| {
            ParseError::StreamDecodeError(format!("Invalid hex digit: {}", ch as char))
        })?;
        match high.take() {
            Some(h) => result.push((h << 4) | value),
            None => high = Some(value),
        }
    }
    if let Some(h) = high {
        result.push(h << 4);
    }

    Ok(result)
}

fn decode_ascii85(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut body = data;
    if body.starts_with(b"<~") {
        body = &body[2..];
    }

    let mut result = Vec::with_capacity(body.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut count = 0;

    for &ch in body {
        match ch {
            b'~' => break,
            b'z' if count == 0 => result.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[count] = ch - b'!';
                count += 1;
                if count == 5 {
                    result.extend_from_slice(&ascii85_group(&group)?);
                    count = 0;
                }
            }
            _ if super::is_whitespace(ch) => {}
            _ => {
                return Err(ParseError::StreamDecodeError(format!(
                    "Invalid ASCII85 character: {}",
                    ch as char
                )))
            }
        }
    }

    if count == 1 {
        return Err(ParseError::StreamDecodeError(
            "ASCII85 final group has a single character".to_string(),
        ));
    }
    if count > 1 {
        // Pad the partial group with 'u' and keep count-1 bytes
        group[count..].fill(b'u' - b'!');
        let bytes = ascii85_group(&group)?;
        result.extend_from_slice(&bytes[..count - 1]);
    }

    Ok(result)
}

fn ascii85_group(group: &[u8; 5]) -> ParseResult<[u8; 4]> {
    let value = group
        .iter()
        .fold(0u64, |acc, &digit| acc * 85 + digit as u64);
    u32::try_from(value)
        .map(u32::to_be_bytes)
        .map_err(|_| ParseError::StreamDecodeError(format!("ASCII85 group {value} exceeds 32 bits")))
}
