//! LZWDecode (ISO 32000-1 Section 7.4.4)

use weezl::{decode::Decoder, BitOrder};

/// Decode LZW data with PDF bit order (MSB first, 8-bit symbols).
///
/// `early_change` follows the `EarlyChange` parameter: `true` (the PDF
/// default) widens codes one code early, as TIFF does; `false` is the GIF
/// schedule.
/// Corrupt input yields whatever was decoded before the fault.
pub fn decode_lzw(data: &[u8], early_change: bool) -> Vec<u8> {
    let mut decoder = if early_change {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Decoder::new(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    let result = decoder.into_vec(&mut output).decode(data);
    if let Err(err) = result.status {
        tracing::warn!("LZW stream truncated after {} bytes: {:?}", output.len(), err);
    }
    output
}
