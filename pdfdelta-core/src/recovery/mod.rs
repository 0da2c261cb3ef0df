//! Cross-reference recovery
//!
//! When the cross-reference index cannot be parsed or fails validation, the
//! document falls back once to a full linear scan of its bytes, collecting
//! every `N G obj` header and rebuilding a complete index from them.
//!
//! # Example
//!
//! ```rust
//! use pdfdelta::parser::ParseOptions;
//! use pdfdelta::recovery::recover_xref;
//!
//! let damaged = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n";
//! let (table, stats) = recover_xref(damaged, &ParseOptions::lenient()).unwrap();
//! assert_eq!(stats.objects_found, 1);
//! assert!(table.trailer().xref_offset.is_none());
//! ```

pub mod xref_recovery;

pub use xref_recovery::{recover_xref, RecoveryStats, XRefRecovery};
