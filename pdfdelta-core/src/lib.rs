//! # pdfdelta
//!
//! Lazy PDF object graph, content-stream interpreter and incremental-update
//! writer.
//!
//! ## Features
//!
//! - **Lazy loading**: objects are parsed on first access and shared behind `Arc`
//! - **Recovery**: a damaged cross-reference index is rebuilt once by scanning the file
//! - **Filters**: Flate, LZW, ASCIIHex, ASCII85 and RunLength with PNG/TIFF predictors
//! - **Interpretation**: page content becomes an ordered list of drawable shapes
//! - **Incremental saving**: edits are appended as a new revision, the original bytes stay untouched
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfdelta::graphics::Shape;
//! use pdfdelta::objects::{Object, ObjectId};
//! use pdfdelta::{Document, DocumentOptions, Result};
//!
//! # fn main() -> Result<()> {
//! let document = Document::open_file("report.pdf", DocumentOptions::default())?;
//!
//! for index in 0..document.page_count()? {
//!     let shapes = document.interpret_page(index)?;
//!     let runs = shapes.iter().filter(|s| matches!(s, Shape::TextRun(_))).count();
//!     println!("Page {}: {} shapes, {} text runs", index + 1, shapes.len(), runs);
//! }
//!
//! document.set_object(ObjectId::new(7, 0), Object::Integer(0));
//! document.append_to_file("report.pdf")?;
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod error;
pub mod fonts;
pub mod geometry;
pub mod graphics;
pub mod interpreter;
pub mod memory;
pub mod objects;
pub mod parser;
pub mod recovery;
pub mod writer;

pub use document::{ChangeKind, ChangeRecord, ChangeTracker, Document, DocumentOptions};
pub use error::{PdfError, Result};
pub use graphics::{Shape, ShapeList};
pub use interpreter::{CancellationToken, Interpreter, InterpreterOptions};
pub use memory::MemoryOptions;
pub use objects::{Dictionary, Object, ObjectId, PdfString, Stream};
pub use parser::{ParseError, ParseOptions, SecurityHandler, SecurityProvider};

/// Current version of pdfdelta
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
