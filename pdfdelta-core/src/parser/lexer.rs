//! PDF Lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-1 Section 7.2. The lexer works
//! directly over the backing byte slice so callers can seek by setting the
//! position instead of re-reading.

use super::{is_delimiter, is_whitespace, ParseError, ParseResult};

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Boolean: true or false
    Boolean(bool),

    /// Integer number
    Integer(i64),

    /// Real number
    Real(f64),

    /// Literal string `( ... )`
    String(Vec<u8>),

    /// Hexadecimal string `< ... >`
    HexString(Vec<u8>),

    /// Name object (e.g., /Type)
    Name(String),

    /// Left square bracket [
    ArrayStart,

    /// Right square bracket ]
    ArrayEnd,

    /// Dictionary start <<
    DictStart,

    /// Dictionary end >>
    DictEnd,

    /// Stream keyword
    Stream,

    /// Endstream keyword
    EndStream,

    /// Obj keyword
    Obj,

    /// Endobj keyword
    EndObj,

    /// xref keyword
    XRef,

    /// trailer keyword
    Trailer,

    /// StartXRef keyword
    StartXRef,

    /// The `R` of an indirect reference
    R,

    /// Null object
    Null,

    /// Any other bare word
    Keyword(String),

    /// Comment (usually ignored)
    Comment(String),

    /// End of input
    Eof,
}

/// Slice-backed PDF lexer
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Lexer positioned at `position`.
    pub fn at(data: &'a [u8], position: usize) -> Self {
        Self {
            data,
            position: position.min(data.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.data.len());
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Next token, skipping comments.
    pub fn next_token(&mut self) -> ParseResult<Token> {
        loop {
            match self.next_raw_token()? {
                Token::Comment(_) => continue,
                token => return Ok(token),
            }
        }
    }

    /// Peek the next non-comment token without consuming it.
    pub fn peek_token(&mut self) -> ParseResult<Token> {
        let saved = self.position;
        let token = self.next_token();
        self.position = saved;
        token
    }

    /// Next token including comments.
    pub fn next_raw_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace();

        let ch = match self.peek_byte() {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        match ch {
            b'%' => Ok(self.read_comment()),
            b'/' => self.read_name(),
            b'(' => self.read_literal_string(),
            b'<' => self.read_angle_bracket(),
            b'>' => {
                self.position += 1;
                if self.peek_byte() == Some(b'>') {
                    self.position += 1;
                    Ok(Token::DictEnd)
                } else {
                    Err(ParseError::SyntaxError {
                        position: self.position,
                        message: "Expected '>' after '>'".to_string(),
                    })
                }
            }
            b'[' => {
                self.position += 1;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.position += 1;
                Ok(Token::ArrayEnd)
            }
            b'+' | b'-' | b'0'..=b'9' | b'.' => self.read_number(),
            b')' | b'{' | b'}' => {
                self.position += 1;
                Err(ParseError::SyntaxError {
                    position: self.position - 1,
                    message: format!("Unexpected delimiter: {}", ch as char),
                })
            }
            _ => Ok(self.read_keyword()),
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    /// Skip whitespace and return the number of bytes skipped
    pub fn skip_whitespace(&mut self) -> usize {
        let start = self.position;
        while let Some(ch) = self.peek_byte() {
            if !is_whitespace(ch) {
                break;
            }
            self.position += 1;
        }
        self.position - start
    }

    /// Skip a single end-of-line marker (CRLF, LF or CR).
    pub fn skip_eol(&mut self) {
        match self.peek_byte() {
            Some(b'\r') => {
                self.position += 1;
                if self.peek_byte() == Some(b'\n') {
                    self.position += 1;
                }
            }
            Some(b'\n') => self.position += 1,
            _ => {}
        }
    }

    fn read_comment(&mut self) -> Token {
        self.position += 1;
        let start = self.position;
        while let Some(ch) = self.peek_byte() {
            if ch == b'\n' || ch == b'\r' {
                break;
            }
            self.position += 1;
        }
        Token::Comment(String::from_utf8_lossy(&self.data[start..self.position]).into_owned())
    }

    fn read_name(&mut self) -> ParseResult<Token> {
        self.position += 1;
        let mut name = String::new();

        while let Some(ch) = self.peek_byte() {
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.position += 1;

            // #xx escapes; a malformed escape is kept literally
            if ch == b'#' {
                let hex = self.data.get(self.position..self.position + 2);
                if let Some(value) = hex.and_then(|h| {
                    std::str::from_utf8(h)
                        .ok()
                        .and_then(|s| u8::from_str_radix(s, 16).ok())
                }) {
                    self.position += 2;
                    name.push(value as char);
                    continue;
                }
            }
            name.push(ch as char);
        }

        Ok(Token::Name(name))
    }

    fn read_literal_string(&mut self) -> ParseResult<Token> {
        let start = self.position;
        self.position += 1;
        let mut string = Vec::new();
        let mut paren_depth = 1;

        while paren_depth > 0 {
            let ch = self.peek_byte().ok_or_else(|| ParseError::SyntaxError {
                position: start,
                message: "Unterminated string".to_string(),
            })?;
            self.position += 1;

            match ch {
                b'\\' => {
                    let Some(next) = self.peek_byte() else {
                        continue;
                    };
                    self.position += 1;
                    match next {
                        b'n' => string.push(b'\n'),
                        b'r' => string.push(b'\r'),
                        b't' => string.push(b'\t'),
                        b'b' => string.push(b'\x08'),
                        b'f' => string.push(b'\x0C'),
                        b'(' | b')' | b'\\' => string.push(next),
                        b'\r' => {
                            // Line continuation
                            if self.peek_byte() == Some(b'\n') {
                                self.position += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut value = (next - b'0') as u32;
                            for _ in 0..2 {
                                match self.peek_byte() {
                                    Some(digit @ b'0'..=b'7') => {
                                        self.position += 1;
                                        value = value * 8 + (digit - b'0') as u32;
                                    }
                                    _ => break,
                                }
                            }
                            string.push((value & 0xFF) as u8);
                        }
                        _ => string.push(next),
                    }
                }
                b'(' => {
                    paren_depth += 1;
                    string.push(ch);
                }
                b')' => {
                    paren_depth -= 1;
                    if paren_depth > 0 {
                        string.push(ch);
                    }
                }
                _ => string.push(ch),
            }
        }

        Ok(Token::String(string))
    }

    fn read_angle_bracket(&mut self) -> ParseResult<Token> {
        let start = self.position;
        self.position += 1;

        if self.peek_byte() == Some(b'<') {
            self.position += 1;
            return Ok(Token::DictStart);
        }

        let mut bytes = Vec::new();
        let mut high: Option<u8> = None;
        loop {
            let ch = self.peek_byte().ok_or_else(|| ParseError::SyntaxError {
                position: start,
                message: "Unterminated hex string".to_string(),
            })?;
            self.position += 1;

            if ch == b'>' {
                break;
            }
            if is_whitespace(ch) {
                continue;
            }
            let value = hex_value(ch).ok_or_else(|| ParseError::SyntaxError {
                position: self.position - 1,
                message: format!("Invalid character in hex string: {}", ch as char),
            })?;
            match high.take() {
                Some(h) => bytes.push((h << 4) | value),
                None => high = Some(value),
            }
        }

        // Odd digit count: pad with 0
        if let Some(h) = high {
            bytes.push(h << 4);
        }

        Ok(Token::HexString(bytes))
    }

    fn read_number(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let mut has_dot = false;

        if matches!(self.peek_byte(), Some(b'+' | b'-')) {
            self.position += 1;
            // Producers occasionally emit doubled signs such as "--5"
            while matches!(self.peek_byte(), Some(b'+' | b'-')) {
                self.position += 1;
            }
        }

        while let Some(ch) = self.peek_byte() {
            match ch {
                b'0'..=b'9' => self.position += 1,
                b'.' if !has_dot => {
                    has_dot = true;
                    self.position += 1;
                }
                _ => break,
            }
        }

        let text = std::str::from_utf8(&self.data[start..self.position]).map_err(|_| {
            ParseError::SyntaxError {
                position: start,
                message: "Invalid number".to_string(),
            }
        })?;
        let negative = text.starts_with('-');
        let digits = text.trim_start_matches(['+', '-']);

        if digits.is_empty() || digits == "." {
            // A lone sign or dot reads as zero
            return Ok(Token::Integer(0));
        }

        if has_dot {
            let value = digits.parse::<f64>().map_err(|_| ParseError::SyntaxError {
                position: start,
                message: format!("Invalid real number: '{text}'"),
            })?;
            Ok(Token::Real(if negative { -value } else { value }))
        } else {
            match digits.parse::<i64>() {
                Ok(value) => Ok(Token::Integer(if negative { -value } else { value })),
                // Out-of-range integers degrade to reals
                Err(_) => {
                    let value = digits.parse::<f64>().map_err(|_| ParseError::SyntaxError {
                        position: start,
                        message: format!("Invalid integer: '{text}'"),
                    })?;
                    Ok(Token::Real(if negative { -value } else { value }))
                }
            }
        }
    }

    fn read_keyword(&mut self) -> Token {
        let start = self.position;
        while let Some(ch) = self.peek_byte() {
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.position += 1;
        }
        if self.position == start {
            // Stray byte that is neither delimiter nor regular: consume it alone
            self.position += 1;
        }
        let word = &self.data[start..self.position];

        match word {
            b"true" => Token::Boolean(true),
            b"false" => Token::Boolean(false),
            b"null" => Token::Null,
            b"R" => Token::R,
            b"obj" => Token::Obj,
            b"endobj" => Token::EndObj,
            b"stream" => Token::Stream,
            b"endstream" => Token::EndStream,
            b"xref" => Token::XRef,
            b"trailer" => Token::Trailer,
            b"startxref" => Token::StartXRef,
            _ => Token::Keyword(String::from_utf8_lossy(word).into_owned()),
        }
    }
}

pub(crate) fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}
