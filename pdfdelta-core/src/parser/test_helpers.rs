//! Helper functions for creating valid test PDFs with correct offsets

/// Builds a PDF from `(number, body)` pairs with a correct xref table.
/// Object 1 is taken to be the catalog.
pub fn build_pdf(objects: &[(u32, &str)]) -> Vec<u8> {
    build_pdf_with_trailer(objects, "/Root 1 0 R")
}

/// Like [`build_pdf`] with extra trailer entries (without `/Size`).
pub fn build_pdf_with_trailer(objects: &[(u32, &str)], trailer_extra: &str) -> Vec<u8> {
    let mut content = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = std::collections::BTreeMap::new();

    for (number, body) in objects {
        offsets.insert(*number, content.len());
        content.extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
    }

    let size = offsets.keys().next_back().copied().unwrap_or(0) + 1;
    let xref_start = content.len();
    let mut xref = format!("xref\n0 {size}\n0000000000 65535 f\r\n");
    for number in 1..size {
        match offsets.get(&number) {
            Some(offset) => xref.push_str(&format!("{offset:010} 00000 n\r\n")),
            None => xref.push_str("0000000000 00000 f\r\n"),
        }
    }
    xref.push_str(&format!(
        "trailer\n<< /Size {size} {trailer_extra} >>\nstartxref\n{xref_start}\n%%EOF\n"
    ));
    content.extend_from_slice(xref.as_bytes());
    content
}

/// Creates a minimal valid PDF with correct xref offsets
pub fn create_minimal_pdf() -> Vec<u8> {
    build_pdf(&[
        (1, "<< /Type /Catalog /Pages 2 0 R >>"),
        (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
    ])
}

/// A one-page PDF whose page content is `content`.
pub fn create_single_page_pdf(content: &str) -> Vec<u8> {
    let page = "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
                /Resources << /Font << /F1 5 0 R >> >> >>";
    let stream = format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content);
    let font = "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica \
                /FirstChar 65 /LastChar 66 /Widths [600 600] >>";
    build_pdf(&[
        (1, "<< /Type /Catalog /Pages 2 0 R >>"),
        (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
        (3, page),
        (4, &stream),
        (5, font),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_pdf_structure() {
        let pdf = create_minimal_pdf();
        assert!(pdf.starts_with(b"%PDF-1.4\n"));
        assert!(pdf.ends_with(b"%%EOF\n"));

        let pdf_str = String::from_utf8_lossy(&pdf);
        assert!(pdf_str.contains("xref"));
        assert!(pdf_str.contains("startxref"));
    }

    #[test]
    fn test_gaps_become_free_entries() {
        let pdf = build_pdf(&[(1, "<< /Type /Catalog >>"), (3, "42")]);
        let text = String::from_utf8_lossy(&pdf);
        assert!(text.contains("0 4\n0000000000 65535 f\r\n"));
        assert!(text.contains("0000000000 00000 f\r\n"));
    }
}
