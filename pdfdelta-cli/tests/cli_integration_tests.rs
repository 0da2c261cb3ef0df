//! Integration tests for the pdfdelta CLI
//!
//! Each test writes a small PDF into a temp directory and runs the built
//! binary against it.

use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::{tempdir, TempDir};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pdfdelta"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to spawn pdfdelta")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A PDF whose xref offsets are correct, one object per body.
fn build_pdf(objects: &[&str]) -> Vec<u8> {
    let mut pdf = b"%PDF-1.5\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f\r\n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{offset:010} 00000 n\r\n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    pdf
}

fn sample(dir: &TempDir) -> PathBuf {
    let content = "0 0 m 100 100 l S BT /F1 10 Tf (AB) Tj ET";
    let stream = format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content);
    let pdf = build_pdf(&[
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>",
        &stream,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /FirstChar 65 /LastChar 66 /Widths [500 500] >>",
        "(spare)",
    ]);
    let path = dir.path().join("sample.pdf");
    fs::write(&path, pdf).unwrap();
    path
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_info() {
    let dir = tempdir().unwrap();
    let path = sample(&dir);
    let output = run(&["info", arg(&path)]);
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains("PDF Version: 1.5"));
    assert!(text.contains("Objects: 6"));
    assert!(text.contains("Recovered: no"));
    assert!(text.contains("Pages: 1"));
}

#[test]
fn test_objects_lists_used_entries() {
    let dir = tempdir().unwrap();
    let path = sample(&dir);
    let output = run(&["objects", arg(&path)]);
    assert!(output.status.success());
    let lines: Vec<_> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].trim_start().starts_with("1 "));

    let with_free = run(&["objects", "--all", arg(&path)]);
    assert_eq!(stdout(&with_free).lines().count(), 7);
}

#[test]
fn test_show_prints_object_syntax() {
    let dir = tempdir().unwrap();
    let path = sample(&dir);
    let output = run(&["show", arg(&path), "1"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "<< /Type /Catalog /Pages 2 0 R >>");

    let stream = run(&["show", arg(&path), "4"]);
    assert!(stdout(&stream).contains("stream ("));
}

#[test]
fn test_show_missing_object_fails() {
    let dir = tempdir().unwrap();
    let path = sample(&dir);
    let output = run(&["show", arg(&path), "99"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not present"));
}

#[test]
fn test_shapes_summary() {
    let dir = tempdir().unwrap();
    let path = sample(&dir);
    let output = run(&["shapes", arg(&path), "1"]);
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains("path, 2 segments"));
    assert!(text.contains("stroke"));
    assert!(text.contains("text \"AB\""));
    assert!(text.contains("advance 1.000"));
    assert!(text.contains("4 shapes"));
}

#[test]
fn test_shapes_page_out_of_range() {
    let dir = tempdir().unwrap();
    let path = sample(&dir);
    assert!(!run(&["shapes", arg(&path), "2"]).status.success());
    assert!(!run(&["shapes", arg(&path), "0"]).status.success());
}

#[test]
fn test_delete_appends_revision() {
    let dir = tempdir().unwrap();
    let path = sample(&dir);
    let out = dir.path().join("out.pdf");
    let output = run(&["delete", arg(&path), "6", "-o", arg(&out)]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let original = fs::read(&path).unwrap();
    let updated = fs::read(&out).unwrap();
    assert!(updated.starts_with(&original));
    let delta = String::from_utf8_lossy(&updated[original.len()..]).into_owned();
    assert!(delta.contains("6 1\n0000000000 00001 f\r\n"));

    let info = run(&["info", arg(&out)]);
    assert!(stdout(&info).contains("Recovered: no"));
    assert!(!run(&["show", arg(&out), "6"]).status.success());
}

#[test]
fn test_delete_unknown_object_fails() {
    let dir = tempdir().unwrap();
    let path = sample(&dir);
    let out = dir.path().join("out.pdf");
    let output = run(&["delete", arg(&path), "42", "-o", arg(&out)]);
    assert!(!output.status.success());
    assert!(!out.exists());
}

#[test]
fn test_damaged_index_is_recovered_unless_strict() {
    let dir = tempdir().unwrap();
    let path = sample(&dir);
    let mut bytes = fs::read(&path).unwrap();
    let len = bytes.len();
    // Replace the startxref offset digits with an offset past the end
    let tail = String::from_utf8_lossy(&bytes[len - 30..]).into_owned();
    let at = tail.find("startxref\n").unwrap() + len - 30 + "startxref\n".len();
    let end = at + bytes[at..].iter().position(|&b| b == b'\n').unwrap();
    bytes.splice(at..end, b"999999".iter().copied());
    fs::write(&path, bytes).unwrap();

    let lenient = run(&["info", arg(&path)]);
    assert!(lenient.status.success());
    assert!(stdout(&lenient).contains("Recovered: yes"));

    assert!(!run(&["--strict", "info", arg(&path)]).status.success());
}
