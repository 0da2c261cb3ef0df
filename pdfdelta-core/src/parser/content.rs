//! PDF Content Stream Tokenizer
//!
//! Splits a decoded content stream into operands and operators. Operators
//! are decoded once, here, into the closed [`Operator`] enumeration so the
//! interpreter dispatches with a `match` instead of comparing strings.
//! Inline image data is read on request, after the interpreter has seen `ID`.

use super::lexer::{Lexer, Token};
use super::{find_bytes, is_whitespace};
use crate::objects::{Dictionary, Object, PdfString};
use tracing::{debug, warn};

/// Nesting limit for operand arrays and dictionaries.
const MAX_OPERAND_DEPTH: usize = 64;

/// Content stream operators (ISO 32000-1 Annex A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // Path construction
    MoveTo,      // m
    LineTo,      // l
    CurveTo,     // c
    CurveToV,    // v
    CurveToY,    // y
    ClosePath,   // h
    Rectangle,   // re

    // Path painting
    Stroke,                 // S
    CloseStroke,            // s
    Fill,                   // f or F
    FillEvenOdd,            // f*
    FillStroke,             // B
    FillStrokeEvenOdd,      // B*
    CloseFillStroke,        // b
    CloseFillStrokeEvenOdd, // b*
    EndPath,                // n

    // Clipping
    Clip,        // W
    ClipEvenOdd, // W*

    // Graphics state
    SaveState,          // q
    RestoreState,       // Q
    ConcatMatrix,       // cm
    SetLineWidth,       // w
    SetLineCap,         // J
    SetLineJoin,        // j
    SetMiterLimit,      // M
    SetDash,            // d
    SetExtGState,       // gs
    SetRenderingIntent, // ri
    SetFlatness,        // i

    // Color
    SetFillGray,          // g
    SetStrokeGray,        // G
    SetFillRgb,           // rg
    SetStrokeRgb,         // RG
    SetFillCmyk,          // k
    SetStrokeCmyk,        // K
    SetFillColorSpace,    // cs
    SetStrokeColorSpace,  // CS
    SetFillColor,         // sc
    SetFillColorN,        // scn
    SetStrokeColor,       // SC
    SetStrokeColorN,      // SCN
    PaintShading,         // sh

    // Text objects, state and positioning
    BeginText,          // BT
    EndText,            // ET
    SetFont,            // Tf
    MoveText,           // Td
    MoveTextSetLeading, // TD
    SetTextMatrix,      // Tm
    NextLine,           // T*
    SetCharSpacing,     // Tc
    SetWordSpacing,     // Tw
    SetLeading,         // TL
    SetRenderMode,      // Tr
    SetHorizontalScale, // Tz
    SetRise,            // Ts

    // Text showing
    ShowText,                // Tj
    ShowTextArray,           // TJ
    NextLineShowText,        // '
    NextLineShowTextSpacing, // "

    // External objects and inline images
    PaintXObject,     // Do
    BeginInlineImage, // BI
    InlineImageData,  // ID
    EndInlineImage,   // EI

    // Marked content
    BeginMarkedContent,         // BMC
    BeginMarkedContentProps,    // BDC
    EndMarkedContent,           // EMC
    MarkedContentPoint,         // MP
    MarkedContentPointProps,    // DP

    // Compatibility
    BeginCompatibility, // BX
    EndCompatibility,   // EX

    // Type 3 glyph metrics
    SetGlyphWidth,        // d0
    SetGlyphWidthAndBBox, // d1
}

impl Operator {
    /// Decode an operator word.
    pub fn from_word(word: &str) -> Option<Self> {
        use Operator::*;
        let op = match word {
            "m" => MoveTo,
            "l" => LineTo,
            "c" => CurveTo,
            "v" => CurveToV,
            "y" => CurveToY,
            "h" => ClosePath,
            "re" => Rectangle,
            "S" => Stroke,
            "s" => CloseStroke,
            "f" | "F" => Fill,
            "f*" => FillEvenOdd,
            "B" => FillStroke,
            "B*" => FillStrokeEvenOdd,
            "b" => CloseFillStroke,
            "b*" => CloseFillStrokeEvenOdd,
            "n" => EndPath,
            "W" => Clip,
            "W*" => ClipEvenOdd,
            "q" => SaveState,
            "Q" => RestoreState,
            "cm" => ConcatMatrix,
            "w" => SetLineWidth,
            "J" => SetLineCap,
            "j" => SetLineJoin,
            "M" => SetMiterLimit,
            "d" => SetDash,
            "gs" => SetExtGState,
            "ri" => SetRenderingIntent,
            "i" => SetFlatness,
            "g" => SetFillGray,
            "G" => SetStrokeGray,
            "rg" => SetFillRgb,
            "RG" => SetStrokeRgb,
            "k" => SetFillCmyk,
            "K" => SetStrokeCmyk,
            "cs" => SetFillColorSpace,
            "CS" => SetStrokeColorSpace,
            "sc" => SetFillColor,
            "scn" => SetFillColorN,
            "SC" => SetStrokeColor,
            "SCN" => SetStrokeColorN,
            "sh" => PaintShading,
            "BT" => BeginText,
            "ET" => EndText,
            "Tf" => SetFont,
            "Td" => MoveText,
            "TD" => MoveTextSetLeading,
            "Tm" => SetTextMatrix,
            "T*" => NextLine,
            "Tc" => SetCharSpacing,
            "Tw" => SetWordSpacing,
            "TL" => SetLeading,
            "Tr" => SetRenderMode,
            "Tz" => SetHorizontalScale,
            "Ts" => SetRise,
            "Tj" => ShowText,
            "TJ" => ShowTextArray,
            "'" => NextLineShowText,
            "\"" => NextLineShowTextSpacing,
            "Do" => PaintXObject,
            "BI" => BeginInlineImage,
            "ID" => InlineImageData,
            "EI" => EndInlineImage,
            "BMC" => BeginMarkedContent,
            "BDC" => BeginMarkedContentProps,
            "EMC" => EndMarkedContent,
            "MP" => MarkedContentPoint,
            "DP" => MarkedContentPointProps,
            "BX" => BeginCompatibility,
            "EX" => EndCompatibility,
            "d0" => SetGlyphWidth,
            "d1" => SetGlyphWidthAndBBox,
            _ => return None,
        };
        Some(op)
    }

    /// Canonical operator word.
    pub fn as_str(&self) -> &'static str {
        use Operator::*;
        match self {
            MoveTo => "m",
            LineTo => "l",
            CurveTo => "c",
            CurveToV => "v",
            CurveToY => "y",
            ClosePath => "h",
            Rectangle => "re",
            Stroke => "S",
            CloseStroke => "s",
            Fill => "f",
            FillEvenOdd => "f*",
            FillStroke => "B",
            FillStrokeEvenOdd => "B*",
            CloseFillStroke => "b",
            CloseFillStrokeEvenOdd => "b*",
            EndPath => "n",
            Clip => "W",
            ClipEvenOdd => "W*",
            SaveState => "q",
            RestoreState => "Q",
            ConcatMatrix => "cm",
            SetLineWidth => "w",
            SetLineCap => "J",
            SetLineJoin => "j",
            SetMiterLimit => "M",
            SetDash => "d",
            SetExtGState => "gs",
            SetRenderingIntent => "ri",
            SetFlatness => "i",
            SetFillGray => "g",
            SetStrokeGray => "G",
            SetFillRgb => "rg",
            SetStrokeRgb => "RG",
            SetFillCmyk => "k",
            SetStrokeCmyk => "K",
            SetFillColorSpace => "cs",
            SetStrokeColorSpace => "CS",
            SetFillColor => "sc",
            SetFillColorN => "scn",
            SetStrokeColor => "SC",
            SetStrokeColorN => "SCN",
            PaintShading => "sh",
            BeginText => "BT",
            EndText => "ET",
            SetFont => "Tf",
            MoveText => "Td",
            MoveTextSetLeading => "TD",
            SetTextMatrix => "Tm",
            NextLine => "T*",
            SetCharSpacing => "Tc",
            SetWordSpacing => "Tw",
            SetLeading => "TL",
            SetRenderMode => "Tr",
            SetHorizontalScale => "Tz",
            SetRise => "Ts",
            ShowText => "Tj",
            ShowTextArray => "TJ",
            NextLineShowText => "'",
            NextLineShowTextSpacing => "\"",
            PaintXObject => "Do",
            BeginInlineImage => "BI",
            InlineImageData => "ID",
            EndInlineImage => "EI",
            BeginMarkedContent => "BMC",
            BeginMarkedContentProps => "BDC",
            EndMarkedContent => "EMC",
            MarkedContentPoint => "MP",
            MarkedContentPointProps => "DP",
            BeginCompatibility => "BX",
            EndCompatibility => "EX",
            SetGlyphWidth => "d0",
            SetGlyphWidthAndBBox => "d1",
        }
    }

    /// Operators ISO 32000-1 Figure 9 permits inside `BT`/`ET`.
    pub fn allowed_in_text_object(&self) -> bool {
        use Operator::*;
        matches!(
            self,
            EndText
                | SetFont
                | MoveText
                | MoveTextSetLeading
                | SetTextMatrix
                | NextLine
                | SetCharSpacing
                | SetWordSpacing
                | SetLeading
                | SetRenderMode
                | SetHorizontalScale
                | SetRise
                | ShowText
                | ShowTextArray
                | NextLineShowText
                | NextLineShowTextSpacing
                | ConcatMatrix
                | SetLineWidth
                | SetLineCap
                | SetLineJoin
                | SetMiterLimit
                | SetDash
                | SetExtGState
                | SetRenderingIntent
                | SetFlatness
                | SetFillGray
                | SetStrokeGray
                | SetFillRgb
                | SetStrokeRgb
                | SetFillCmyk
                | SetStrokeCmyk
                | SetFillColorSpace
                | SetStrokeColorSpace
                | SetFillColor
                | SetFillColorN
                | SetStrokeColor
                | SetStrokeColorN
                | BeginMarkedContent
                | BeginMarkedContentProps
                | EndMarkedContent
                | MarkedContentPoint
                | MarkedContentPointProps
                | BeginCompatibility
                | EndCompatibility
        )
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a content stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentToken {
    Operand(Object),
    Operator(Operator),
    /// A bare word that is not a known operator
    Unknown(String),
}

/// Content stream tokenizer
pub struct ContentTokenizer<'a> {
    lexer: Lexer<'a>,
}

impl<'a> ContentTokenizer<'a> {
    /// Create a new tokenizer for the given input
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(input),
        }
    }

    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    /// Next token, or `None` at the end of the stream. Malformed syntax is
    /// logged and skipped.
    pub fn next_token(&mut self) -> Option<ContentToken> {
        loop {
            let token = self.next_lexer_token()?;
            match token {
                Token::Keyword(word) => {
                    return Some(match Operator::from_word(&word) {
                        Some(op) => ContentToken::Operator(op),
                        None => ContentToken::Unknown(word),
                    })
                }
                Token::ArrayEnd | Token::DictEnd => {
                    debug!("Stray {:?} at {} in content stream", token, self.lexer.position());
                }
                other => match self.operand_from(other, 0) {
                    Some(operand) => return Some(ContentToken::Operand(operand)),
                    None => continue,
                },
            }
        }
    }

    /// Next lexer token, skipping comments and unreadable bytes.
    fn next_lexer_token(&mut self) -> Option<Token> {
        loop {
            let before = self.lexer.position();
            match self.lexer.next_token() {
                Ok(Token::Eof) => return None,
                Ok(token) => return Some(token),
                Err(err) => {
                    warn!("Skipping malformed content at {}: {}", before, err);
                    if self.lexer.position() == before {
                        self.lexer.set_position(before + 1);
                    }
                }
            }
        }
    }

    fn operand_from(&mut self, token: Token, depth: usize) -> Option<Object> {
        match token {
            Token::Integer(i) => Some(Object::Integer(i)),
            Token::Real(r) => Some(Object::Real(r)),
            Token::Boolean(b) => Some(Object::Boolean(b)),
            Token::Null => Some(Object::Null),
            Token::String(bytes) => Some(Object::String(PdfString::literal(bytes))),
            Token::HexString(bytes) => Some(Object::String(PdfString::hex(bytes))),
            Token::Name(name) => Some(Object::Name(name)),
            Token::ArrayStart if depth < MAX_OPERAND_DEPTH => Some(self.read_array(depth + 1)),
            Token::DictStart if depth < MAX_OPERAND_DEPTH => Some(self.read_dict(depth + 1)),
            other => {
                // Words that are keywords of the file syntax (obj, R, ...) are not operators here
                warn!("Unexpected {:?} in content stream", other);
                None
            }
        }
    }

    fn read_array(&mut self, depth: usize) -> Object {
        let mut items = Vec::new();
        while let Some(token) = self.next_lexer_token() {
            match token {
                Token::ArrayEnd => return Object::Array(items),
                Token::Keyword(word) => debug!("Operator {} inside an operand array", word),
                other => items.extend(self.operand_from(other, depth)),
            }
        }
        debug!("Unterminated array in content stream");
        Object::Array(items)
    }

    fn read_dict(&mut self, depth: usize) -> Object {
        let mut dict = Dictionary::new();
        while let Some(token) = self.next_lexer_token() {
            match token {
                Token::DictEnd => return Object::Dictionary(dict),
                Token::Name(key) => {
                    let Some(value_token) = self.next_lexer_token() else {
                        break;
                    };
                    if value_token == Token::DictEnd {
                        return Object::Dictionary(dict);
                    }
                    if let Some(value) = self.operand_from(value_token, depth) {
                        dict.set(key, value);
                    }
                }
                other => debug!("Non-name key {:?} in content stream dictionary", other),
            }
        }
        debug!("Unterminated dictionary in content stream");
        Object::Dictionary(dict)
    }

    /// Raw inline image bytes following `ID`, up to the matching `EI`, which
    /// is consumed. With a known `length` the data is taken exactly when an
    /// `EI` follows it; otherwise the first `EI` delimited by whitespace ends it.
    pub fn read_inline_image_data(&mut self, length: Option<usize>) -> Vec<u8> {
        let data = self.lexer.data();
        let mut start = self.lexer.position();
        // Exactly one whitespace byte separates ID from the data
        if data.get(start).copied().is_some_and(is_whitespace) {
            start += 1;
        }

        if let Some(length) = length {
            let end = start.saturating_add(length);
            if end <= data.len() {
                let mut after = end;
                while data.get(after).copied().is_some_and(is_whitespace) {
                    after += 1;
                }
                if data[after..].starts_with(b"EI") && is_token_end(data, after + 2) {
                    self.lexer.set_position(after + 2);
                    return data[start..end].to_vec();
                }
            }
        }

        let mut search = start;
        while let Some(found) = find_bytes(data, b"EI", search) {
            let delimited_before = found > start && is_whitespace(data[found - 1]);
            if delimited_before && is_token_end(data, found + 2) {
                self.lexer.set_position(found + 2);
                return data[start..found - 1].to_vec();
            }
            search = found + 1;
        }

        warn!("Inline image data without EI");
        self.lexer.set_position(data.len());
        data[start.min(data.len())..].to_vec()
    }
}

fn is_token_end(data: &[u8], position: usize) -> bool {
    data.get(position).map_or(true, |&b| is_whitespace(b))
}

impl Iterator for ContentTokenizer<'_> {
    type Item = ContentToken;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(input: &str) -> Vec<ContentToken> {
        ContentTokenizer::new(input.as_bytes()).collect()
    }

    #[test]
    fn test_path_tokens() {
        assert_eq!(
            tokens("0 0 m 10.5 0 l S"),
            vec![
                ContentToken::Operand(Object::Integer(0)),
                ContentToken::Operand(Object::Integer(0)),
                ContentToken::Operator(Operator::MoveTo),
                ContentToken::Operand(Object::Real(10.5)),
                ContentToken::Operand(Object::Integer(0)),
                ContentToken::Operator(Operator::LineTo),
                ContentToken::Operator(Operator::Stroke),
            ]
        );
    }

    #[test]
    fn test_operator_words_round_trip() {
        for word in [
            "m", "re", "f*", "B*", "W*", "cm", "scn", "SCN", "T*", "'", "\"", "TJ", "BDC", "d1",
        ] {
            let op = Operator::from_word(word).unwrap();
            assert_eq!(op.as_str(), word);
        }
        assert_eq!(Operator::from_word("F"), Some(Operator::Fill));
        assert_eq!(Operator::from_word("foo"), None);
    }

    #[test]
    fn test_text_array_and_quote_operators() {
        let result = tokens("[(A) -250 <42>] TJ 1 2 (x) \"");
        assert_eq!(
            result[0],
            ContentToken::Operand(Object::Array(vec![
                Object::String(PdfString::literal(b"A".to_vec())),
                Object::Integer(-250),
                Object::String(PdfString::hex(vec![0x42])),
            ]))
        );
        assert_eq!(result[1], ContentToken::Operator(Operator::ShowTextArray));
        assert_eq!(result[5], ContentToken::Operator(Operator::NextLineShowTextSpacing));
    }

    #[test]
    fn test_marked_content_dictionary() {
        let result = tokens("/Span << /ActualText (hi) /MCID 3 >> BDC EMC");
        let ContentToken::Operand(Object::Dictionary(props)) = &result[1] else {
            panic!("expected dictionary operand, got {:?}", result[1]);
        };
        assert_eq!(props.get_integer("MCID"), Some(3));
        assert_eq!(result[2], ContentToken::Operator(Operator::BeginMarkedContentProps));
        assert_eq!(result[3], ContentToken::Operator(Operator::EndMarkedContent));
    }

    #[test]
    fn test_unknown_and_malformed() {
        let result = tokens("% comment\n1 foo ) 2 g");
        assert_eq!(
            result,
            vec![
                ContentToken::Operand(Object::Integer(1)),
                ContentToken::Unknown("foo".to_string()),
                ContentToken::Operand(Object::Integer(2)),
                ContentToken::Operator(Operator::SetFillGray),
            ]
        );
    }

    #[test]
    fn test_inline_image_scan_for_ei() {
        let input = b"BI /W 2 /H 1 /BPC 8 /CS /G ID \x00EI\xFF EI Q";
        let mut tokenizer = ContentTokenizer::new(input);
        let mut seen = Vec::new();
        while let Some(token) = tokenizer.next_token() {
            if token == ContentToken::Operator(Operator::InlineImageData) {
                break;
            }
            seen.push(token);
        }
        assert_eq!(seen.len(), 9);

        let data = tokenizer.read_inline_image_data(None);
        assert_eq!(data, b"\x00EI\xFF");
        assert_eq!(tokenizer.next_token(), Some(ContentToken::Operator(Operator::RestoreState)));
    }

    #[test]
    fn test_inline_image_with_length() {
        let input = b"ID abc EI def EI n";
        let mut tokenizer = ContentTokenizer::new(input);
        assert_eq!(tokenizer.next_token(), Some(ContentToken::Operator(Operator::InlineImageData)));
        assert_eq!(tokenizer.read_inline_image_data(Some(3)), b"abc");
        assert_eq!(tokenizer.next_token(), Some(ContentToken::Unknown("def".to_string())));
    }

    #[test]
    fn test_text_object_operator_classes() {
        assert!(Operator::ShowText.allowed_in_text_object());
        assert!(Operator::SetFillRgb.allowed_in_text_object());
        assert!(!Operator::MoveTo.allowed_in_text_object());
        assert!(!Operator::PaintXObject.allowed_in_text_object());
    }
}
