//! PDF object parser
//!
//! Builds [`Object`] values from lexer tokens: direct objects, indirect
//! object definitions (`N G obj ... endobj`) and stream bodies.

use super::lexer::{Lexer, Token};
use super::stack_safe::StackSafeContext;
use super::{find_bytes, is_whitespace, ParseError, ParseOptions, ParseResult};
use crate::objects::{Dictionary, Object, ObjectId, PdfString, Stream};
use tracing::warn;

/// Resolves an indirect `/Length` while a stream body is being read.
pub type LengthResolver<'r> = &'r dyn Fn(ObjectId) -> Option<i64>;

/// Resolver for contexts with no object store behind them.
pub fn no_length_resolver(_: ObjectId) -> Option<i64> {
    None
}

pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    lenient: bool,
    nesting: StackSafeContext,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8], options: &ParseOptions) -> Self {
        Self::at(data, 0, options)
    }

    pub fn at(data: &'a [u8], position: usize, options: &ParseOptions) -> Self {
        Self {
            lexer: Lexer::at(data, position),
            lenient: options.lenient_syntax,
            nesting: StackSafeContext::with_limit(options.max_nesting_depth),
        }
    }

    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    pub fn lexer_mut(&mut self) -> &mut Lexer<'a> {
        &mut self.lexer
    }

    /// Parse one direct object. Dictionaries followed by `stream` are returned
    /// as plain dictionaries; only [`parse_indirect`](Self::parse_indirect) reads stream bodies.
    pub fn parse_object(&mut self) -> ParseResult<Object> {
        let token = self.lexer.next_token()?;
        self.parse_from_token(token)
    }

    fn parse_from_token(&mut self, token: Token) -> ParseResult<Object> {
        match token {
            Token::Null => Ok(Object::Null),
            Token::Boolean(b) => Ok(Object::Boolean(b)),
            Token::Real(r) => Ok(Object::Real(r)),
            Token::Integer(i) => Ok(self.integer_or_reference(i)),
            Token::String(bytes) => Ok(Object::String(PdfString::literal(bytes))),
            Token::HexString(bytes) => Ok(Object::String(PdfString::hex(bytes))),
            Token::Name(name) => Ok(Object::Name(name)),
            Token::ArrayStart => self.parse_array(),
            Token::DictStart => Ok(Object::Dictionary(self.parse_dictionary_inner()?)),
            other => Err(ParseError::UnexpectedToken {
                expected: "object".to_string(),
                found: format!("{other:?}"),
            }),
        }
    }

    /// `N G R` lookahead after an integer.
    fn integer_or_reference(&mut self, number: i64) -> Object {
        let saved = self.lexer.position();
        if let (Ok(Token::Integer(generation)), Ok(Token::R)) =
            (self.lexer.next_token(), self.lexer.next_token())
        {
            if let (Ok(number), Ok(generation)) =
                (u32::try_from(number), u16::try_from(generation))
            {
                return Object::Reference(ObjectId::new(number, generation));
            }
        }
        self.lexer.set_position(saved);
        Object::Integer(number)
    }

    fn parse_array(&mut self) -> ParseResult<Object> {
        self.nesting.enter()?;
        let mut items = Vec::new();
        loop {
            match self.lexer.next_token()? {
                Token::ArrayEnd => break,
                Token::Eof => {
                    return Err(ParseError::SyntaxError {
                        position: self.lexer.position(),
                        message: "Unterminated array".to_string(),
                    })
                }
                token => items.push(self.parse_from_token(token)?),
            }
        }
        self.nesting.exit();
        Ok(Object::Array(items))
    }

    fn parse_dictionary_inner(&mut self) -> ParseResult<Dictionary> {
        self.nesting.enter()?;
        let mut dict = Dictionary::new();
        loop {
            let key = match self.lexer.next_token()? {
                Token::DictEnd => break,
                Token::Name(name) => name,
                Token::Eof => {
                    return Err(ParseError::SyntaxError {
                        position: self.lexer.position(),
                        message: "Unterminated dictionary".to_string(),
                    })
                }
                other if self.lenient => {
                    warn!("Skipping non-name dictionary key {:?}", other);
                    continue;
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "name".to_string(),
                        found: format!("{other:?}"),
                    })
                }
            };

            let value = match self.lexer.peek_token()? {
                // `/Key >>` with the value missing
                Token::DictEnd => Object::Null,
                _ => self.parse_object()?,
            };
            dict.set(key, value);
        }
        self.nesting.exit();
        Ok(dict)
    }

    /// Parse `N G obj <object> [stream ... endstream] endobj` at the current position.
    pub fn parse_indirect(
        &mut self,
        resolve_length: LengthResolver<'_>,
    ) -> ParseResult<(ObjectId, Object)> {
        let id = self.parse_object_header()?;
        let object = self.parse_object()?;

        let object = match object {
            Object::Dictionary(dict) if self.lexer.peek_token()? == Token::Stream => {
                self.lexer.next_token()?;
                let data = self.read_stream_data(&dict, resolve_length)?;
                Object::Stream(Stream::new(dict, data))
            }
            other => other,
        };

        match self.lexer.peek_token()? {
            Token::EndObj => {
                self.lexer.next_token()?;
            }
            other if self.lenient => {
                tracing::debug!("Object {} not closed by endobj (found {:?})", id, other);
            }
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "endobj".to_string(),
                    found: format!("{other:?}"),
                })
            }
        }

        Ok((id, object))
    }

    /// Parse just the `N G obj` header.
    pub fn parse_object_header(&mut self) -> ParseResult<ObjectId> {
        let start = self.lexer.position();
        let number = self.lexer.next_token()?;
        let generation = self.lexer.next_token()?;
        let keyword = self.lexer.next_token()?;

        match (number, generation, keyword) {
            (Token::Integer(n), Token::Integer(g), Token::Obj) => {
                let number = u32::try_from(n).map_err(|_| ParseError::SyntaxError {
                    position: start,
                    message: format!("Object number out of range: {n}"),
                })?;
                let generation = u16::try_from(g).map_err(|_| ParseError::SyntaxError {
                    position: start,
                    message: format!("Generation out of range: {g}"),
                })?;
                Ok(ObjectId::new(number, generation))
            }
            (n, g, k) => Err(ParseError::SyntaxError {
                position: start,
                message: format!("Expected object header, found {n:?} {g:?} {k:?}"),
            }),
        }
    }

    fn read_stream_data(
        &mut self,
        dict: &Dictionary,
        resolve_length: LengthResolver<'_>,
    ) -> ParseResult<Vec<u8>> {
        let data = self.lexer.data();
        let mut start = self.lexer.position();
        // Spaces before the EOL are a common producer bug
        while data.get(start) == Some(&b' ') {
            start += 1;
        }
        self.lexer.set_position(start);
        self.lexer.skip_eol();
        let start = self.lexer.position();

        let declared = match dict.get("Length") {
            Some(Object::Integer(n)) => Some(*n),
            Some(Object::Reference(id)) => resolve_length(*id),
            _ => None,
        };

        if let Some(length) = declared.and_then(|n| usize::try_from(n).ok()) {
            if let Some(end) = start.checked_add(length).filter(|end| *end <= data.len()) {
                let mut cursor = end;
                while cursor < data.len() && is_whitespace(data[cursor]) {
                    cursor += 1;
                }
                if data[cursor..].starts_with(b"endstream") {
                    self.lexer.set_position(cursor + b"endstream".len());
                    return Ok(data[start..end].to_vec());
                }
            }
        }

        if !self.lenient {
            return Err(ParseError::SyntaxError {
                position: start,
                message: format!("Stream /Length {declared:?} does not reach endstream"),
            });
        }

        let marker = find_bytes(data, b"endstream", start).ok_or_else(|| {
            ParseError::SyntaxError {
                position: start,
                message: "Stream without endstream".to_string(),
            }
        })?;
        warn!(
            "Stream at {} has unusable /Length {:?}; using endstream marker",
            start, declared
        );

        let mut end = marker;
        if end > start && data[end - 1] == b'\n' {
            end -= 1;
        }
        if end > start && data[end - 1] == b'\r' {
            end -= 1;
        }
        self.lexer.set_position(marker + b"endstream".len());
        Ok(data[start..end].to_vec())
    }
}

/// Parse a single direct object from a byte slice.
pub fn parse_direct_object(data: &[u8], options: &ParseOptions) -> ParseResult<Object> {
    ObjectParser::new(data, options).parse_object()
}
