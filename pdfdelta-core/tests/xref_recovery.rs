//! Cross-reference loading, validation and the one-shot linear scan

mod common;

use common::{append_update, break_startxref, startxref, PdfBuilder};
use pdfdelta::objects::{Object, ObjectId};
use pdfdelta::parser::XRefEntry;
use pdfdelta::recovery::recover_xref;
use pdfdelta::{Document, DocumentOptions, ParseError, ParseOptions, PdfError};
use pretty_assertions::assert_eq;

fn strict() -> DocumentOptions {
    DocumentOptions::default().with_parse(ParseOptions::strict())
}

fn three_objects() -> PdfBuilder {
    PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(3, "(original)")
}

#[test]
fn test_clean_file_loads_without_recovery() {
    let doc = Document::open_with_options(three_objects().build(), strict()).unwrap();
    assert!(!doc.is_recovered());
    assert_eq!(doc.xref().size(), 4);
    assert_eq!(doc.object_count(), 3);
    assert_eq!(doc.version().map(|v| v.to_string()), Some("1.7".to_string()));
}

#[test]
fn test_prev_chain_newer_section_wins() {
    let base = three_objects().build();
    let prev = startxref(&base);
    let updated = append_update(base, &[(3, "(updated)")], 4, prev);

    let doc = Document::open_with_options(updated, strict()).unwrap();
    let value = doc.resolve(ObjectId::new(3, 0));
    assert_eq!(value.as_string().unwrap().as_bytes(), b"updated");
}

#[test]
fn test_xref_stream_with_object_stream() {
    let pdf = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object_stream(3, &[(4, "<< /Packed true >>"), (5, "[1 2 3]")])
        .build_with_xref_stream();

    let doc = Document::open_with_options(pdf, strict()).unwrap();
    assert!(!doc.is_recovered());
    assert!(matches!(
        doc.xref().get(5),
        Some(XRefEntry::Compressed { container: 3, index: 1 })
    ));
    assert_eq!(
        *doc.resolve(ObjectId::new(5, 0)),
        Object::Array(vec![Object::Integer(1), Object::Integer(2), Object::Integer(3)])
    );
    let packed = doc.resolve(ObjectId::new(4, 0));
    assert_eq!(packed.as_dict().unwrap().get("Packed"), Some(&Object::Boolean(true)));
}

#[test]
fn test_bad_startxref_falls_back_to_scan() {
    let pdf = break_startxref(&three_objects().build(), 5);
    let doc = Document::open(pdf.clone()).unwrap();
    assert!(doc.is_recovered());
    assert_eq!(doc.root().unwrap(), ObjectId::new(1, 0));
    assert_eq!(doc.resolve(ObjectId::new(3, 0)).as_string().unwrap().as_bytes(), b"original");

    let err = Document::open_with_options(pdf, strict()).unwrap_err();
    assert!(matches!(err, PdfError::Parse(_)));
}

#[test]
fn test_offsets_that_miss_their_objects_trigger_recovery() {
    let mut pdf = three_objects().build();
    // Shift every body so each recorded offset lands inside a comment
    pdf.splice(9..9, b"%padding\n".iter().copied());
    let doc = Document::open(pdf).unwrap();
    assert!(doc.is_recovered());
    assert_eq!(doc.page_count().unwrap(), 0);
}

#[test]
fn test_missing_trailer_recovers_catalog_by_type() {
    let mut pdf = three_objects().build();
    let cut = pdf.windows(4).position(|w| w == b"xref").unwrap();
    pdf.truncate(cut);

    let (table, stats) = recover_xref(&pdf, &ParseOptions::default()).unwrap();
    assert_eq!(stats.objects_found, 3);
    assert_eq!(table.trailer().root().unwrap(), ObjectId::new(1, 0));

    let doc = Document::open(pdf).unwrap();
    assert!(doc.is_recovered());
    assert!(doc.catalog().is_ok());
}

#[test]
fn test_later_definition_wins_in_scan() {
    let mut pdf = three_objects().build();
    let cut = pdf.windows(4).position(|w| w == b"xref").unwrap();
    pdf.truncate(cut);
    pdf.extend_from_slice(b"3 0 obj\n(second)\nendobj\n%%EOF\n");

    let doc = Document::open(pdf).unwrap();
    assert_eq!(doc.resolve(ObjectId::new(3, 0)).as_string().unwrap().as_bytes(), b"second");
}

#[test]
fn test_container_count_beyond_its_table_is_empty() {
    let pdf = three_objects()
        .stream(4, "/Type /ObjStm /N 4611686018427387903 /First 4", b"5 0 (packed)")
        .build();

    let doc = Document::open(pdf.clone()).unwrap();
    assert!(!doc.is_recovered());
    assert!(doc.is_missing(&doc.resolve(ObjectId::new(5, 0))));

    // The linear scan walks containers too
    let doc = Document::open(break_startxref(&pdf, 5)).unwrap();
    assert!(doc.is_recovered());
    assert_eq!(doc.resolve(ObjectId::new(3, 0)).as_string().unwrap().as_bytes(), b"original");
    assert!(doc.is_missing(&doc.resolve(ObjectId::new(5, 0))));
}

#[test]
fn test_unrecoverable_without_header() {
    let err = Document::open(b"this is not a pdf at all".to_vec()).unwrap_err();
    assert!(matches!(err, PdfError::Parse(ParseError::InvalidHeader)));
}

#[test]
fn test_no_root_anywhere() {
    let pdf = PdfBuilder::new().trailer("").object(1, "(just a string)").build();
    assert!(matches!(Document::open(pdf), Err(PdfError::MissingRoot)));
}

#[test]
fn test_leading_garbage_before_header() {
    let mut pdf = b"garbage\n".to_vec();
    pdf.extend_from_slice(&three_objects().build());
    // Offsets are now all eight bytes short; recovery rebuilds them
    let doc = Document::open(pdf).unwrap();
    assert_eq!(doc.version().map(|v| v.to_string()), Some("1.7".to_string()));
    assert_eq!(doc.resolve(ObjectId::new(3, 0)).as_string().unwrap().as_bytes(), b"original");
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_scan_finds_every_indexed_object(count in 1u32..30, gaps in proptest::collection::vec(any::<bool>(), 30)) {
            let mut builder = PdfBuilder::new()
                .object(1, "<< /Type /Catalog >>");
            for number in 2..=count + 1 {
                if gaps[(number as usize) % gaps.len()] {
                    builder = builder.object(number, &format!("<< /N {number} >>"));
                }
            }
            let pdf = builder.build();
            let doc = Document::open_with_options(pdf.clone(), strict()).unwrap();
            let (scanned, _) = recover_xref(&pdf, &ParseOptions::default()).unwrap();

            for (number, entry) in doc.xref().iter() {
                if let XRefEntry::Used { offset, generation } = entry {
                    prop_assert_eq!(
                        scanned.get(number),
                        Some(&XRefEntry::Used { offset: *offset, generation: *generation })
                    );
                }
            }
        }
    }
}
