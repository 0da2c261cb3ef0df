//! Byte-transform stages used by the filter pipeline
//!
//! Image codecs (CCITT, DCT, JBIG2, JPX) are not decoded here; the pipeline
//! hands their bytes through untouched for an external codec.

pub mod lzw;
pub mod predictor;
pub mod run_length;

pub use lzw::decode_lzw;
pub use predictor::{apply_predictor, encode_png_up};
pub use run_length::decode_run_length;
