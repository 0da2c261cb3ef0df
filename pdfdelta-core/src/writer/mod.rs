//! Incremental saving

mod incremental;
mod serialize;

pub use incremental::{append_revision, build_delta, UNKNOWN_PREV};
pub use serialize::{encode_name, escape_literal, format_real, ObjectWriter};
