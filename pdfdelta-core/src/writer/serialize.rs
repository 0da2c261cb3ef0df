//! Object serialization
//!
//! Writes values in the syntax of ISO 32000-1 Section 7.3 and keeps the
//! running byte position, so the caller knows where every object began.

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId, PdfString, StringFormat};
use crate::parser::SecurityHandler;
use std::io::Write;
use std::sync::Arc;

/// Serializes indirect objects to `W`, starting at byte `position`.
pub struct ObjectWriter<W: Write> {
    writer: W,
    position: u64,
    security: Option<Arc<dyn SecurityHandler>>,
}

impl<W: Write> ObjectWriter<W> {
    /// `position` is the offset of the first byte written, relative to the
    /// start of the file.
    pub fn new(writer: W, position: u64) -> Self {
        Self {
            writer,
            position,
            security: None,
        }
    }

    /// Encrypt strings and stream bodies of every object written from now on.
    pub fn with_security(mut self, handler: Option<Arc<dyn SecurityHandler>>) -> Self {
        self.security = handler;
        self
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write `N G obj ... endobj` and return the offset it starts at.
    pub fn write_object(&mut self, id: ObjectId, object: &Object) -> Result<u64> {
        let offset = self.position;
        self.write_bytes(format!("{} {} obj\n", id.number(), id.generation()).as_bytes())?;
        self.write_value(object, Some(id))?;
        self.write_bytes(b"\nendobj\n")?;
        Ok(offset)
    }

    /// Write a direct value. `owner` is the enclosing indirect object, the
    /// key for encryption; trailers pass `None` and are written in the clear.
    pub fn write_value(&mut self, object: &Object, owner: Option<ObjectId>) -> Result<()> {
        match object {
            Object::Null => self.write_bytes(b"null"),
            Object::Boolean(b) => self.write_bytes(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => self.write_bytes(i.to_string().as_bytes()),
            Object::Real(f) => self.write_bytes(format_real(*f).as_bytes()),
            Object::String(s) => self.write_string(s, owner),
            Object::Name(n) => self.write_bytes(&encode_name(n)),
            Object::Array(items) => {
                self.write_bytes(b"[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.write_bytes(b" ")?;
                    }
                    self.write_value(item, owner)?;
                }
                self.write_bytes(b"]")
            }
            Object::Dictionary(dict) => self.write_dictionary(dict, owner),
            Object::Stream(stream) => {
                let dict = stream.dictionary();
                let data = match (&self.security, owner) {
                    (Some(handler), Some(id)) if handler.encrypts_streams() && !dict.is_type("XRef") => {
                        handler
                            .encrypt(id, stream.raw_data())
                            .map_err(|e| PdfError::Security(e.to_string()))?
                    }
                    _ => stream.raw_data().to_vec(),
                };

                let mut dict = dict.clone();
                dict.set("Length", Object::Integer(data.len() as i64));
                self.write_dictionary(&dict, owner)?;
                self.write_bytes(b"\nstream\n")?;
                self.write_bytes(&data)?;
                self.write_bytes(b"\nendstream")
            }
            Object::Reference(id) => {
                self.write_bytes(format!("{} {} R", id.number(), id.generation()).as_bytes())
            }
        }
    }

    fn write_dictionary(&mut self, dict: &Dictionary, owner: Option<ObjectId>) -> Result<()> {
        self.write_bytes(b"<<")?;
        for (key, value) in dict.iter() {
            self.write_bytes(b" ")?;
            self.write_bytes(&encode_name(key))?;
            self.write_bytes(b" ")?;
            self.write_value(value, owner)?;
        }
        self.write_bytes(b" >>")
    }

    fn write_string(&mut self, string: &PdfString, owner: Option<ObjectId>) -> Result<()> {
        let encrypted;
        let bytes = match (&self.security, owner) {
            (Some(handler), Some(id)) if handler.encrypts_strings() => {
                encrypted = handler
                    .encrypt(id, string.as_bytes())
                    .map_err(|e| PdfError::Security(e.to_string()))?;
                &encrypted[..]
            }
            _ => string.as_bytes(),
        };

        match string.format {
            StringFormat::Hex => {
                let mut out = Vec::with_capacity(bytes.len() * 2 + 2);
                out.push(b'<');
                for byte in bytes {
                    out.extend_from_slice(format!("{byte:02X}").as_bytes());
                }
                out.push(b'>');
                self.write_bytes(&out)
            }
            StringFormat::Literal => self.write_bytes(&escape_literal(bytes)),
        }
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }
}

/// Up to six fractional digits, trailing zeros trimmed.
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let formatted = format!("{value:.6}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

/// `/Name` with delimiters, whitespace, `#` and bytes outside `!`..`~`
/// written as `#xx`.
pub fn encode_name(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 1);
    out.push(b'/');
    for &byte in name.as_bytes() {
        let plain = (b'!'..=b'~').contains(&byte)
            && !matches!(
                byte,
                b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
            );
        if plain {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{byte:02X}").as_bytes());
        }
    }
    out
}

/// `(...)` with `(`, `)`, `\` and CR escaped.
pub fn escape_literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(byte),
        }
    }
    out.push(b')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Stream;
    use crate::parser::encryption_handler::tests::XorHandler;
    use crate::parser::ParseOptions;
    use pretty_assertions::assert_eq;

    fn serialize(object: &Object) -> String {
        let mut writer = ObjectWriter::new(Vec::new(), 0);
        writer.write_value(object, None).unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_reals() {
        assert_eq!(format_real(1.5), "1.5");
        assert_eq!(format_real(2.0), "2");
        assert_eq!(format_real(0.1234567), "0.123457");
        assert_eq!(format_real(-0.0000001), "0");
        assert_eq!(format_real(f64::NAN), "0");
    }

    #[test]
    fn test_names_escape_delimiters_and_spaces() {
        assert_eq!(encode_name("Type"), b"/Type".to_vec());
        assert_eq!(encode_name("A B#(x)"), b"/A#20B#23#28x#29".to_vec());
    }

    #[test]
    fn test_literal_strings_escape_parentheses_and_cr() {
        assert_eq!(escape_literal(b"a(b)\\c\rd"), b"(a\\(b\\)\\\\c\\rd)".to_vec());
    }

    #[test]
    fn test_nested_values() {
        let mut dict = Dictionary::new();
        dict.set("Kids", Object::Array(vec![Object::Reference(ObjectId::new(3, 0)), Object::Null]));
        dict.set("Label", Object::String(PdfString::hex(vec![0xAB, 0x01])));
        assert_eq!(serialize(&Object::Dictionary(dict)), "<< /Kids [3 0 R null] /Label <AB01> >>");
    }

    #[test]
    fn test_stream_length_is_rewritten() {
        let mut dict = Dictionary::new();
        dict.set("Length", Object::Integer(999));
        let stream = Object::Stream(Stream::new(dict, b"abc".to_vec()));
        assert_eq!(serialize(&stream), "<< /Length 3 >>\nstream\nabc\nendstream");
    }

    #[test]
    fn test_object_offsets_are_tracked() {
        let mut writer = ObjectWriter::new(Vec::new(), 100);
        let first = writer.write_object(ObjectId::new(1, 0), &Object::Integer(5)).unwrap();
        let second = writer.write_object(ObjectId::new(2, 0), &Object::Boolean(true)).unwrap();
        assert_eq!(first, 100);
        assert_eq!(second, 100 + "1 0 obj\n5\nendobj\n".len() as u64);
    }

    #[test]
    fn test_serialized_values_parse_back() {
        let mut dict = Dictionary::new();
        dict.set("Odd Name", Object::Real(0.25));
        dict.set("Text", Object::String(PdfString::literal(b"(nested) \\ \r".to_vec())));
        let original = Object::Dictionary(dict);

        let text = serialize(&original);
        let parsed = crate::parser::ObjectParser::at(text.as_bytes(), 0, &ParseOptions::lenient())
            .parse_object()
            .unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_strings_encrypted_with_owner_id() {
        let id = ObjectId::new(7, 0);
        let mut writer = ObjectWriter::new(Vec::new(), 0).with_security(Some(Arc::new(XorHandler)));
        writer
            .write_value(&Object::String(PdfString::hex(b"hi".to_vec())), Some(id))
            .unwrap();
        let expected = XorHandler.encrypt(id, b"hi").unwrap();
        let hex: String = expected.iter().map(|b| format!("{b:02X}")).collect();
        assert_eq!(String::from_utf8(writer.into_inner()).unwrap(), format!("<{hex}>"));
    }
}
