//! RunLengthDecode (ISO 32000-1 Section 7.4.5)

/// Decode run-length data. A stream that ends before the EOD marker (128)
/// keeps what was decoded so far.
pub fn decode_run_length(data: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::with_capacity(data.len() * 2);
    let mut pos = 0;

    while pos < data.len() {
        let length = data[pos];
        pos += 1;
        match length {
            128 => return decoded,
            0..=127 => {
                let count = length as usize + 1;
                let end = (pos + count).min(data.len());
                decoded.extend_from_slice(&data[pos..end]);
                pos = end;
            }
            _ => {
                let Some(&byte) = data.get(pos) else {
                    break;
                };
                pos += 1;
                decoded.extend(std::iter::repeat(byte).take(257 - length as usize));
            }
        }
    }

    tracing::warn!("Run-length stream ended without EOD marker");
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_length() {
        let input = [4, 10, 11, 12, 13, 14, 253, 3, 128];
        assert_eq!(decode_run_length(&input), vec![10, 11, 12, 13, 14, 3, 3, 3, 3]);
    }

    #[test]
    fn test_data_after_eod_is_ignored() {
        assert_eq!(decode_run_length(&[0, 7, 128, 0, 9]), vec![7]);
    }

    #[test]
    fn test_truncated_literal_run() {
        assert_eq!(decode_run_length(&[5, 1, 2]), vec![1, 2]);
    }
}
