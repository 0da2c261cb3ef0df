//! Builders for test PDFs with correct byte offsets

#![allow(dead_code)]

use std::collections::BTreeMap;

enum Body {
    Direct(Vec<u8>),
    /// Packed into an object stream: (container, index)
    Packed(u32, u32),
}

/// Collects numbered object bodies and lays them out with a cross-reference
/// section that points at the right bytes.
pub struct PdfBuilder {
    version: &'static str,
    objects: BTreeMap<u32, Body>,
    trailer: String,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.7",
            objects: BTreeMap::new(),
            trailer: "/Root 1 0 R".to_string(),
        }
    }

    pub fn version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Extra trailer entries, replacing the default `/Root 1 0 R`.
    pub fn trailer(mut self, entries: &str) -> Self {
        self.trailer = entries.to_string();
        self
    }

    pub fn object(mut self, number: u32, body: &str) -> Self {
        self.objects.insert(number, Body::Direct(body.as_bytes().to_vec()));
        self
    }

    /// A stream object; `entries` go into its dictionary next to `/Length`.
    pub fn stream(mut self, number: u32, entries: &str, data: &[u8]) -> Self {
        let mut body = format!("<< {} /Length {} >>\nstream\n", entries, data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.objects.insert(number, Body::Direct(body));
        self
    }

    /// Pack `objects` into object stream `container`. Only a
    /// cross-reference stream can point into it.
    pub fn object_stream(mut self, container: u32, objects: &[(u32, &str)]) -> Self {
        let mut header = String::new();
        let mut body = String::new();
        for (index, (number, text)) in objects.iter().enumerate() {
            header.push_str(&format!("{} {} ", number, body.len()));
            body.push_str(text);
            body.push(' ');
            self.objects.insert(*number, Body::Packed(container, index as u32));
        }
        let data = format!("{header}{body}");
        let entries = format!("/Type /ObjStm /N {} /First {}", objects.len(), header.len());
        self.stream(container, &entries, data.as_bytes())
    }

    /// One page whose content stream is `content`, using font `/F1`
    /// with 600-unit widths for `A` and `B`.
    pub fn single_page(content: &str) -> Self {
        Self::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
            .object(
                3,
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
                 /Resources << /Font << /F1 5 0 R >> >> >>",
            )
            .stream(4, "", content.as_bytes())
            .object(
                5,
                "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /FirstChar 65 /LastChar 66 /Widths [600 600] >>",
            )
    }

    fn write_bodies(&self, pdf: &mut Vec<u8>) -> BTreeMap<u32, usize> {
        let mut offsets = BTreeMap::new();
        for (number, body) in &self.objects {
            if let Body::Direct(bytes) = body {
                offsets.insert(*number, pdf.len());
                pdf.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
                pdf.extend_from_slice(bytes);
                pdf.extend_from_slice(b"\nendobj\n");
            }
        }
        offsets
    }

    fn header(&self) -> Vec<u8> {
        format!("%PDF-{}\n%\u{e2}\u{e3}\n", self.version).into_bytes()
    }

    fn size(&self) -> u32 {
        self.objects.keys().next_back().copied().unwrap_or(0) + 1
    }

    /// Classic `xref` table. Packed objects are not supported here.
    pub fn build(&self) -> Vec<u8> {
        let mut pdf = self.header();
        let offsets = self.write_bodies(&mut pdf);
        let size = self.size();

        let xref = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {size}\n0000000000 65535 f\r\n").as_bytes());
        for number in 1..size {
            match offsets.get(&number) {
                Some(offset) => pdf.extend_from_slice(format!("{offset:010} 00000 n\r\n").as_bytes()),
                None => pdf.extend_from_slice(b"0000000000 00000 f\r\n"),
            }
        }
        pdf.extend_from_slice(
            format!("trailer\n<< /Size {} {} >>\nstartxref\n{}\n%%EOF\n", size, self.trailer, xref).as_bytes(),
        );
        pdf
    }

    /// Cross-reference stream with `/W [1 4 2]`, stored as the last object.
    pub fn build_with_xref_stream(&self) -> Vec<u8> {
        let mut pdf = self.header();
        let offsets = self.write_bodies(&mut pdf);
        let stream_number = self.size();
        let size = stream_number + 1;
        let xref = pdf.len();

        let mut data = Vec::new();
        let mut push = |kind: u8, field2: u32, field3: u16| {
            data.push(kind);
            data.extend_from_slice(&field2.to_be_bytes());
            data.extend_from_slice(&field3.to_be_bytes());
        };
        push(0, 0, 65535);
        for number in 1..stream_number {
            match (self.objects.get(&number), offsets.get(&number)) {
                (Some(Body::Packed(container, index)), _) => push(2, *container, *index as u16),
                (_, Some(offset)) => push(1, *offset as u32, 0),
                _ => push(0, 0, 0),
            }
        }
        push(1, xref as u32, 0);

        pdf.extend_from_slice(
            format!(
                "{} 0 obj\n<< /Type /XRef /W [1 4 2] /Size {} {} /Length {} >>\nstream\n",
                stream_number,
                size,
                self.trailer,
                data.len()
            )
            .as_bytes(),
        );
        pdf.extend_from_slice(&data);
        pdf.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{xref}\n%%EOF\n").as_bytes());
        pdf
    }
}

/// Append a classic incremental section that replaces `objects`.
pub fn append_update(mut pdf: Vec<u8>, objects: &[(u32, &str)], size: u32, prev: usize) -> Vec<u8> {
    let mut lines = String::from("xref\n0 1\n0000000000 65535 f\r\n");
    for (number, body) in objects {
        let offset = pdf.len();
        pdf.extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
        lines.push_str(&format!("{number} 1\n{offset:010} 00000 n\r\n"));
    }
    let xref = pdf.len();
    pdf.extend_from_slice(lines.as_bytes());
    pdf.extend_from_slice(
        format!("trailer\n<< /Size {size} /Root 1 0 R /Prev {prev} >>\nstartxref\n{xref}\n%%EOF\n").as_bytes(),
    );
    pdf
}

fn rfind(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
        .unwrap()
}

/// Offset named by the last `startxref`.
pub fn startxref(pdf: &[u8]) -> usize {
    let at = rfind(pdf, b"startxref") + "startxref".len();
    let text = String::from_utf8_lossy(&pdf[at..]);
    text.split_whitespace().next().unwrap().parse().unwrap()
}

/// Overwrite the last `startxref` offset, keeping the file otherwise intact.
pub fn break_startxref(pdf: &[u8], offset: usize) -> Vec<u8> {
    let at = rfind(pdf, b"startxref");
    let mut out = pdf[..at].to_vec();
    out.extend_from_slice(format!("startxref\n{offset}\n%%EOF\n").as_bytes());
    out
}
