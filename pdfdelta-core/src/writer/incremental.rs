//! Incremental update writer
//!
//! Appends one revision (ISO 32000-1 Section 7.5.6) holding only the
//! objects recorded in the document's change tracker, a cross-reference
//! table for exactly those objects, and a trailer chained to the previous
//! one. The bytes of the loaded revision are never rewritten.

use super::serialize::ObjectWriter;
use crate::document::{ChangeKind, ChangeRecord, Document};
use crate::error::{PdfError, Result};
use crate::memory::lock_sources;
use crate::objects::{Dictionary, Object};
use crate::parser::xref::FREE_HEAD_GENERATION;
use std::io::Write;
use tracing::{debug, warn};

/// `Prev` written when the previous section's offset is unknown because
/// the index was rebuilt by scanning. Offset 0 is the header, never an
/// xref section, so readers fall back to their own recovery.
pub const UNKNOWN_PREV: u64 = 0;

/// One line of the appended cross-reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum XRefLine {
    InUse { offset: u64, generation: u16 },
    Free { next_free: u32, generation: u16 },
}

impl XRefLine {
    /// Exactly 20 bytes, CRLF terminated.
    pub(crate) fn format(&self) -> String {
        match self {
            XRefLine::InUse { offset, generation } => format!("{offset:010} {generation:05} n\r\n"),
            XRefLine::Free {
                next_free,
                generation,
            } => format!("{next_free:010} {generation:05} f\r\n"),
        }
    }
}

/// Write the loaded bytes followed by the delta. Returns the number of
/// bytes written. Holds the process-wide source lock throughout.
pub fn append_revision<W: Write>(document: &Document, sink: &mut W) -> Result<u64> {
    let _lock = lock_sources();
    let original = document.data();
    let delta = build_delta(document)?;

    sink.write_all(original)?;
    sink.write_all(&delta)?;
    sink.flush()?;
    Ok((original.len() + delta.len()) as u64)
}

/// The bytes to append after the loaded revision. Empty when no change is
/// recorded.
pub fn build_delta(document: &Document) -> Result<Vec<u8>> {
    let changes = latest_generations(document.changes().iterate_ascending());
    if changes.is_empty() {
        debug!("No recorded changes, nothing to append");
        return Ok(Vec::new());
    }
    check_assigned(document, &changes)?;

    let original = document.data();
    let mut writer = ObjectWriter::new(Vec::new(), original.len() as u64)
        .with_security(document.store().security_handler().cloned());
    if !original.ends_with(b"\n") && !original.ends_with(b"\r") {
        writer.write_bytes(b"\n")?;
    }

    let mut lines: Vec<(u32, XRefLine)> = Vec::with_capacity(changes.len() + 1);
    for change in &changes {
        let id = change.id;
        match change.kind {
            ChangeKind::Delete => lines.push((
                id.number(),
                XRefLine::Free {
                    next_free: 0,
                    generation: id.generation().saturating_add(1),
                },
            )),
            ChangeKind::Change | ChangeKind::Synthetic => {
                let offset = writer.write_object(id, &change.value)?;
                lines.push((
                    id.number(),
                    XRefLine::InUse {
                        offset,
                        generation: id.generation(),
                    },
                ));
            }
        }
    }
    lines.insert(
        0,
        (
            0,
            XRefLine::Free {
                next_free: 0,
                generation: FREE_HEAD_GENERATION,
            },
        ),
    );
    link_free_entries(&mut lines);

    let xref_offset = writer.position();
    writer.write_bytes(b"xref\n")?;
    for run in contiguous_runs(&lines) {
        writer.write_bytes(format!("{} {}\n", run[0].0, run.len()).as_bytes())?;
        for (_, line) in run {
            writer.write_bytes(line.format().as_bytes())?;
        }
    }

    let highest = lines.last().map_or(0, |(number, _)| *number);
    let trailer = next_trailer(document, highest);
    writer.write_bytes(b"trailer\n")?;
    writer.write_value(&Object::Dictionary(trailer), None)?;
    writer.write_bytes(format!("\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes())?;

    debug!(
        "Incremental update with {} changes, xref at {}",
        changes.len(),
        xref_offset
    );
    Ok(writer.into_inner())
}

/// One record per object number. Records arrive sorted by id, so the
/// highest generation of a number is the last of its group.
fn latest_generations(mut changes: Vec<ChangeRecord>) -> Vec<ChangeRecord> {
    changes.dedup_by(|later, earlier| {
        if later.id.number() != earlier.id.number() {
            return false;
        }
        warn!("Dropping change to {} in favour of {}", earlier.id, later.id);
        std::mem::swap(later, earlier);
        true
    });
    changes
}

/// Every record must name a number the document knows: one in its index
/// or one minted by the tracker.
fn check_assigned(document: &Document, changes: &[ChangeRecord]) -> Result<()> {
    let minted_below = document.changes().next_number();
    for change in changes {
        let number = change.id.number();
        let assigned = number != 0 && (number < minted_below || document.xref().get(number).is_some());
        if !assigned {
            return Err(PdfError::UnassignedReference(change.id));
        }
    }
    Ok(())
}

/// Link free lines in ascending order, each pointing at the next free
/// number, the last one back at object 0. Walks the sorted list backwards.
pub(crate) fn link_free_entries(lines: &mut [(u32, XRefLine)]) {
    let mut next = 0;
    for (number, line) in lines.iter_mut().rev() {
        if let XRefLine::Free { next_free, .. } = line {
            *next_free = next;
            next = *number;
        }
    }
}

/// Maximal runs of consecutive object numbers.
pub(crate) fn contiguous_runs(lines: &[(u32, XRefLine)]) -> Vec<&[(u32, XRefLine)]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=lines.len() {
        let breaks = i == lines.len() || lines[i].0 != lines[i - 1].0 + 1;
        if breaks {
            runs.push(&lines[start..i]);
            start = i;
        }
    }
    runs
}

fn next_trailer(document: &Document, highest: u32) -> Dictionary {
    let previous = document.trailer();
    let mut trailer = previous.dict.clone();
    for key in ["Prev", "XRefStm"] {
        trailer.remove(key);
    }

    let size = document.xref().size().max(highest + 1);
    trailer.set("Size", Object::Integer(i64::from(size)));

    let prev = match previous.xref_offset {
        Some(offset) if !document.is_recovered() => offset,
        _ => UNKNOWN_PREV,
    };
    trailer.set("Prev", Object::Integer(prev as i64));
    trailer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::ObjectId;
    use crate::parser::rfind_bytes;
    use crate::parser::test_helpers::build_pdf;
    use crate::{Document, DocumentOptions};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn document() -> Document {
        Document::open(build_pdf(&[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
            (3, "(three)"),
            (4, "(four)"),
            (5, "(five)"),
        ]))
        .unwrap()
    }

    #[test]
    fn test_no_changes_appends_nothing() {
        let doc = document();
        assert!(build_delta(&doc).unwrap().is_empty());

        let mut out = Vec::new();
        let written = append_revision(&doc, &mut out).unwrap();
        assert_eq!(written as usize, doc.data().len());
        assert_eq!(out, doc.data());
    }

    #[test]
    fn test_free_chain_links_deletions() {
        let mut lines = vec![
            (0, XRefLine::Free { next_free: 0, generation: 65535 }),
            (3, XRefLine::Free { next_free: 0, generation: 1 }),
            (4, XRefLine::InUse { offset: 10, generation: 0 }),
            (5, XRefLine::Free { next_free: 0, generation: 1 }),
        ];
        link_free_entries(&mut lines);
        assert_eq!(lines[0].1, XRefLine::Free { next_free: 3, generation: 65535 });
        assert_eq!(lines[1].1, XRefLine::Free { next_free: 5, generation: 1 });
        assert_eq!(lines[3].1, XRefLine::Free { next_free: 0, generation: 1 });
    }

    #[test]
    fn test_runs_split_on_gaps() {
        let line = XRefLine::InUse { offset: 0, generation: 0 };
        let lines = vec![(0, line), (1, line), (2, line), (7, line), (9, line), (10, line)];
        let lengths: Vec<(u32, usize)> = contiguous_runs(&lines).iter().map(|r| (r[0].0, r.len())).collect();
        assert_eq!(lengths, vec![(0, 3), (7, 1), (9, 2)]);
    }

    #[test]
    fn test_delta_layout() {
        let doc = document();
        doc.set_object(ObjectId::new(3, 0), Object::Integer(33));
        doc.delete_object(ObjectId::new(4, 0));

        let delta = String::from_utf8(build_delta(&doc).unwrap()).unwrap();
        let base = doc.data().len();
        assert!(delta.starts_with("3 0 obj\n33\nendobj\nxref\n0 1\n0000000004 65535 f\r\n3 2\n"));
        assert!(delta.contains(&format!("{base:010} 00000 n\r\n")));
        assert!(delta.contains("0000000000 00001 f\r\n"));
        let prev = doc.trailer().xref_offset.unwrap();
        assert!(delta.contains(&format!("/Prev {prev}")));
        assert!(delta.contains("/Size 6"));
        assert!(delta.ends_with("%%EOF\n"));
    }

    #[test]
    fn test_new_objects_raise_size() {
        let doc = document();
        let id = doc.create_object(Object::Boolean(true));
        assert_eq!(id, ObjectId::new(6, 0));
        let delta = String::from_utf8(build_delta(&doc).unwrap()).unwrap();
        assert!(delta.contains("/Size 7"));
        assert!(delta.contains("6 1\n"));
    }

    #[test]
    fn test_one_line_per_number_across_generations() {
        let doc = document();
        doc.set_object(ObjectId::new(3, 0), Object::Integer(30));
        doc.set_object(ObjectId::new(3, 2), Object::Integer(32));
        doc.delete_object(ObjectId::new(4, 1));
        doc.set_object(ObjectId::new(4, 0), Object::Integer(40));

        let delta = String::from_utf8(build_delta(&doc).unwrap()).unwrap();
        assert!(delta.starts_with("3 2 obj\n32\nendobj\nxref\n"));
        assert!(!delta.contains("3 0 obj"));
        assert!(!delta.contains("4 0 obj"));
        // 0, 3 and 4: one subsection of three lines
        assert!(delta.contains("0 1\n0000000004 65535 f\r\n3 2\n"));
        assert!(delta.contains("0000000000 00002 f\r\ntrailer"));
        assert_eq!(delta.matches(" n\r\n").count(), 1);
    }

    #[test]
    fn test_unassigned_reference_fails() {
        let doc = document();
        doc.set_object(ObjectId::new(40, 0), Object::Null);
        let err = build_delta(&doc).unwrap_err();
        assert!(matches!(err, PdfError::UnassignedReference(id) if id == ObjectId::new(40, 0)));
    }

    #[test]
    fn test_recovered_document_gets_sentinel_prev() {
        let mut pdf = build_pdf(&[(1, "<< /Type /Catalog /Pages 2 0 R >>"), (2, "<< /Type /Pages /Kids [] /Count 0 >>")]);
        // Point startxref past the end so the index has to be rebuilt
        let at = rfind_bytes(&pdf, b"startxref\n").unwrap();
        pdf.truncate(at);
        pdf.extend_from_slice(b"startxref\n99999\n%%EOF\n");

        let doc = Document::open_with_options(pdf, DocumentOptions::default()).unwrap();
        assert!(doc.is_recovered());
        doc.set_object(ObjectId::new(2, 0), Object::Null);
        let delta = String::from_utf8(build_delta(&doc).unwrap()).unwrap();
        assert!(delta.contains("/Prev 0 "));
    }

    proptest! {
        #[test]
        fn prop_xref_lines_are_twenty_bytes(offset in 0u64..10_000_000_000, generation: u16, free: bool) {
            let line = if free {
                XRefLine::Free { next_free: (offset % u64::from(u32::MAX)) as u32, generation }
            } else {
                XRefLine::InUse { offset, generation }
            };
            prop_assert_eq!(line.format().len(), 20);
        }
    }
}
