//! Predictor un-diffing for Flate and LZW (ISO 32000-1 Section 7.4.4.4)

use crate::parser::filters::FilterParams;
use tracing::warn;

/// Undo the predictor described by `params`. Predictor 1, anything
/// unrecognised, and row sizes the data cannot hold return the input
/// unchanged.
pub fn apply_predictor(data: Vec<u8>, params: &FilterParams) -> Vec<u8> {
    if params.predictor <= 1 {
        return data;
    }
    let colors = params.colors.max(1);
    let bpc = params.bits_per_component.max(1);
    let columns = params.columns.max(1);

    let Some(bits_per_pixel) = colors.checked_mul(bpc) else {
        warn!("Predictor pixel size {} x {} bits overflows, leaving data unchanged", colors, bpc);
        return data;
    };
    let bytes_per_pixel = bits_per_pixel.div_ceil(8);
    let bytes_per_row = match bits_per_pixel.checked_mul(columns) {
        Some(bits) if bits.div_ceil(8) <= data.len() => bits.div_ceil(8),
        _ => {
            warn!(
                "Predictor row of {} columns does not fit {} bytes, leaving data unchanged",
                columns,
                data.len()
            );
            return data;
        }
    };

    match params.predictor {
        1 => data,
        2 => tiff_predictor(data, bytes_per_row, colors, bpc),
        10..=15 => png_predictor(&data, bytes_per_row, bytes_per_pixel),
        other => {
            warn!("Unknown predictor {}, leaving data unchanged", other);
            data
        }
    }
}

fn png_predictor(data: &[u8], bytes_per_row: usize, bytes_per_pixel: usize) -> Vec<u8> {
    let row_size = bytes_per_row + 1;
    let mut result = Vec::with_capacity(data.len() / row_size * bytes_per_row + bytes_per_row);
    let mut prev_row = vec![0u8; bytes_per_row];
    let mut row = vec![0u8; bytes_per_row];

    for chunk in data.chunks(row_size) {
        let filter_type = chunk[0];
        let encoded = &chunk[1..];
        // Short final row is padded with zeros
        row[..encoded.len()].copy_from_slice(encoded);
        row[encoded.len()..].fill(0);

        for i in 0..bytes_per_row {
            let left = if i >= bytes_per_pixel {
                row[i - bytes_per_pixel]
            } else {
                0
            };
            let up = prev_row[i];
            let up_left = if i >= bytes_per_pixel {
                prev_row[i - bytes_per_pixel]
            } else {
                0
            };

            row[i] = match filter_type {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    warn!("Unknown PNG filter type {} treated as None", other);
                    row[i]
                }
            };
        }

        result.extend_from_slice(&row);
        std::mem::swap(&mut prev_row, &mut row);
    }

    result
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn tiff_predictor(mut data: Vec<u8>, bytes_per_row: usize, colors: usize, bpc: usize) -> Vec<u8> {
    match bpc {
        8 => {
            for row in data.chunks_mut(bytes_per_row) {
                for i in colors..row.len() {
                    row[i] = row[i].wrapping_add(row[i - colors]);
                }
            }
        }
        16 => {
            let stride = colors * 2;
            for row in data.chunks_mut(bytes_per_row) {
                let mut i = stride;
                while i + 1 < row.len() {
                    let prev = u16::from_be_bytes([row[i - stride], row[i - stride + 1]]);
                    let cur = u16::from_be_bytes([row[i], row[i + 1]]);
                    let [hi, lo] = cur.wrapping_add(prev).to_be_bytes();
                    row[i] = hi;
                    row[i + 1] = lo;
                    i += 2;
                }
            }
        }
        other => warn!("TIFF predictor with {} bits per component is not supported", other),
    }
    data
}

/// PNG "Up" encoding of `data`, the inverse of predictor 12.
pub fn encode_png_up(data: &[u8], columns: usize) -> Vec<u8> {
    let columns = columns.max(1);
    let mut out = Vec::with_capacity(data.len() + data.len() / columns + 1);
    let mut prev = vec![0u8; columns];
    for row in data.chunks(columns) {
        out.push(2);
        for (i, &byte) in row.iter().enumerate() {
            out.push(byte.wrapping_sub(prev[i]));
        }
        prev[..row.len()].copy_from_slice(row);
    }
    out
}
