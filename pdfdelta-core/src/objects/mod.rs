//! Value model: the tagged union every other layer reads and writes.

mod dictionary;
mod primitive;
mod resolve;
mod stream;

pub use dictionary::Dictionary;
pub use primitive::{Object, ObjectId, PdfString, StringFormat};
pub use resolve::{Resolve, Resolved};
pub use stream::Stream;
