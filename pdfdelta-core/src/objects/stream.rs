use crate::objects::{Dictionary, Object};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A stream object: dictionary plus raw (still encoded) bytes.
///
/// `decoded` is an optional cache slot filled by the filter pipeline the first
/// time a caller asks for cached decoding. It is not part of equality.
#[derive(Clone)]
pub struct Stream {
    dictionary: Dictionary,
    raw: Arc<Vec<u8>>,
    decoded: OnceLock<Arc<Vec<u8>>>,
    compressed: bool,
}

impl Stream {
    pub fn new(dictionary: Dictionary, raw: Vec<u8>) -> Self {
        let compressed = dictionary.contains_key("Filter");
        Self {
            dictionary,
            raw: Arc::new(raw),
            decoded: OnceLock::new(),
            compressed,
        }
    }

    /// Build a stream whose raw bytes are the flate encoding of `data`.
    #[cfg(feature = "compression")]
    pub fn new_flate(mut dictionary: Dictionary, data: &[u8]) -> crate::Result<Self> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .map_err(|e| crate::PdfError::Compression(e.to_string()))?;
        let raw = encoder
            .finish()
            .map_err(|e| crate::PdfError::Compression(e.to_string()))?;

        dictionary.set("Filter", Object::Name("FlateDecode".to_string()));
        dictionary.remove("DecodeParms");
        Ok(Self::new(dictionary, raw))
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn dictionary_mut(&mut self) -> &mut Dictionary {
        &mut self.dictionary
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.raw
    }

    /// Replace the raw bytes. Drops any decoded cache.
    pub fn set_raw_data(&mut self, raw: Vec<u8>) {
        self.raw = Arc::new(raw);
        self.decoded = OnceLock::new();
        self.compressed = self.dictionary.contains_key("Filter");
    }

    /// True when the raw bytes must go through the filter pipeline before use.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn cached_decoded(&self) -> Option<Arc<Vec<u8>>> {
        self.decoded.get().cloned()
    }

    /// Publish decoded bytes into the cache slot. The first publication wins.
    pub fn store_decoded(&self, data: Vec<u8>) -> Arc<Vec<u8>> {
        let candidate = Arc::new(data);
        match self.decoded.set(candidate.clone()) {
            Ok(()) => candidate,
            Err(_) => self.decoded.get().cloned().unwrap_or(candidate),
        }
    }
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        self.dictionary == other.dictionary && self.raw == other.raw
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("dictionary", &self.dictionary)
            .field("raw_len", &self.raw.len())
            .field("decoded", &self.decoded.get().map(|d| d.len()))
            .field("compressed", &self.compressed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_flag_follows_filter() {
        let plain = Stream::new(Dictionary::new(), b"BT ET".to_vec());
        assert!(!plain.is_compressed());

        let mut dict = Dictionary::new();
        dict.set("Filter", Object::Name("ASCIIHexDecode".into()));
        let encoded = Stream::new(dict, b"41>".to_vec());
        assert!(encoded.is_compressed());
    }

    #[test]
    fn test_decoded_cache_first_write_wins() {
        let stream = Stream::new(Dictionary::new(), b"abc".to_vec());
        assert!(stream.cached_decoded().is_none());

        let first = stream.store_decoded(b"one".to_vec());
        let second = stream.store_decoded(b"two".to_vec());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(stream.cached_decoded().as_deref().map(Vec::as_slice), Some(&b"one"[..]));
    }

    #[test]
    fn test_equality_ignores_cache() {
        let a = Stream::new(Dictionary::new(), b"abc".to_vec());
        let b = a.clone();
        a.store_decoded(b"abc".to_vec());
        assert_eq!(a, b);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_new_flate_sets_filter() {
        let stream = Stream::new_flate(Dictionary::new(), b"0 0 m 1 1 l S").unwrap();
        assert!(stream.is_compressed());
        assert_eq!(stream.dictionary().get_name("Filter"), Some("FlateDecode"));
    }
}
