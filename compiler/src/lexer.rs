//! Lexer: source text to token stream (spec §4.3).

use crate::pos::Pos;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(u32),
    Str(String),
    Ident(String),

    KwFunc,
    KwStruct,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    KwReturn,
    KwBreak,
    KwContinue,
    KwNew,
    KwCast,

    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Colon,
    ColonColon,
    ColonEq,
    Dot,

    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,

    AmpAmp,
    PipePipe,
    EqEq,
    BangEq,
    Lt,
    Lte,
    Gt,
    Gte,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Bang,

    /// End-of-input.
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("func", TokenKind::KwFunc),
    ("struct", TokenKind::KwStruct),
    ("if", TokenKind::KwIf),
    ("else", TokenKind::KwElse),
    ("while", TokenKind::KwWhile),
    ("for", TokenKind::KwFor),
    ("return", TokenKind::KwReturn),
    ("break", TokenKind::KwBreak),
    ("continue", TokenKind::KwContinue),
    ("new", TokenKind::KwNew),
    ("cast", TokenKind::KwCast),
];

/// Punctuation table for the longest-match scanner. Order doesn't matter for
/// correctness (every candidate is checked), but longer operators are
/// listed first for readability.
const OPERATORS: &[(&str, TokenKind)] = &[
    ("::", TokenKind::ColonColon),
    (":=", TokenKind::ColonEq),
    ("+=", TokenKind::PlusEq),
    ("-=", TokenKind::MinusEq),
    ("*=", TokenKind::StarEq),
    ("/=", TokenKind::SlashEq),
    ("%=", TokenKind::PercentEq),
    ("&=", TokenKind::AmpEq),
    ("|=", TokenKind::PipeEq),
    ("&&", TokenKind::AmpAmp),
    ("||", TokenKind::PipePipe),
    ("==", TokenKind::EqEq),
    ("!=", TokenKind::BangEq),
    ("<=", TokenKind::Lte),
    (">=", TokenKind::Gte),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    (",", TokenKind::Comma),
    (";", TokenKind::Semi),
    (":", TokenKind::Colon),
    (".", TokenKind::Dot),
    ("=", TokenKind::Eq),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("&", TokenKind::Amp),
    ("|", TokenKind::Pipe),
    ("!", TokenKind::Bang),
];

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub pos: Pos,
    pub message: String,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for LexError {}

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    file: Rc<str>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(file: Rc<str>, src: &'a str) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            file,
            pos: 0,
        }
    }

    fn pos_here(&self) -> Pos {
        Pos::new(self.file.clone(), self.pos)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.pos += 1;
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();
        let pos = self.pos_here();
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Sub,
                pos,
            });
        };

        if c.is_ascii_digit() {
            return self.lex_number(pos);
        }
        if c == b'_' || c.is_ascii_alphabetic() {
            return Ok(self.lex_ident_or_keyword(pos));
        }
        if c == b'\'' {
            return self.lex_char(pos);
        }
        if c == b'"' {
            return self.lex_string(pos);
        }
        self.lex_operator(pos)
    }

    fn lex_number(&mut self, pos: Pos) -> Result<Token, LexError> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.pos += 2;
            let hex_start = self.pos;
            while self.peek().map(|c| c.is_ascii_hexdigit()).unwrap_or(false) {
                self.pos += 1;
            }
            let text = &self.src[hex_start..self.pos];
            let value = i64::from_str_radix(text, 16).map_err(|_| LexError {
                pos: pos.clone(),
                message: "invalid hex literal".to_string(),
            })?;
            return Ok(Token {
                kind: TokenKind::Int(value),
                pos,
            });
        }

        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false)
        {
            is_float = true;
            self.pos += 1;
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.pos += 1;
            }
        }
        let text = &self.src[start..self.pos];
        if is_float {
            let value: f64 = text.parse().map_err(|_| LexError {
                pos: pos.clone(),
                message: format!("invalid float literal '{text}'"),
            })?;
            Ok(Token {
                kind: TokenKind::Float(value),
                pos,
            })
        } else {
            let value: i64 = text.parse().map_err(|_| LexError {
                pos: pos.clone(),
                message: format!("invalid integer literal '{text}'"),
            })?;
            Ok(Token {
                kind: TokenKind::Int(value),
                pos,
            })
        }
    }

    fn lex_ident_or_keyword(&mut self, pos: Pos) -> Token {
        let start = self.pos;
        while self
            .peek()
            .map(|c| c == b'_' || c.is_ascii_alphanumeric())
            .unwrap_or(false)
        {
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];
        if text == "true" {
            return Token {
                kind: TokenKind::Bool(true),
                pos,
            };
        }
        if text == "false" {
            return Token {
                kind: TokenKind::Bool(false),
                pos,
            };
        }
        if let Some((_, kind)) = KEYWORDS.iter().find(|(kw, _)| *kw == text) {
            return Token {
                kind: kind.clone(),
                pos,
            };
        }
        Token {
            kind: TokenKind::Ident(text.to_string()),
            pos,
        }
    }

    fn lex_escape(&mut self, pos: &Pos) -> Result<u32, LexError> {
        match self.bump() {
            Some(b'n') => Ok(b'\n' as u32),
            Some(b't') => Ok(b'\t' as u32),
            Some(b'\\') => Ok(b'\\' as u32),
            Some(b'"') => Ok(b'"' as u32),
            Some(b'\'') => Ok(b'\'' as u32),
            Some(c) if c.is_ascii_digit() && c < b'8' => {
                // Three-digit octal escape, first digit already consumed.
                let mut value = (c - b'0') as u32;
                for _ in 0..2 {
                    match self.peek() {
                        Some(d) if (b'0'..=b'7').contains(&d) => {
                            value = value * 8 + (d - b'0') as u32;
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                Ok(value)
            }
            _ => Err(LexError {
                pos: pos.clone(),
                message: "invalid escape sequence".to_string(),
            }),
        }
    }

    fn lex_char(&mut self, pos: Pos) -> Result<Token, LexError> {
        self.bump(); // consume opening quote
        let value = match self.bump() {
            Some(b'\\') => self.lex_escape(&pos)?,
            Some(c) => c as u32,
            None => {
                return Err(LexError {
                    pos,
                    message: "unterminated character literal".to_string(),
                })
            }
        };
        if self.bump() != Some(b'\'') {
            return Err(LexError {
                pos,
                message: "unterminated character literal".to_string(),
            });
        }
        Ok(Token {
            kind: TokenKind::Char(value),
            pos,
        })
    }

    fn lex_string(&mut self, pos: Pos) -> Result<Token, LexError> {
        self.bump(); // consume opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => {
                    let code = self.lex_escape(&pos)?;
                    out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                }
                Some(c) => out.push(c as char),
                None => {
                    return Err(LexError {
                        pos,
                        message: "unterminated string literal".to_string(),
                    })
                }
            }
        }
        Ok(Token {
            kind: TokenKind::Str(out),
            pos,
        })
    }

    fn lex_operator(&mut self, pos: Pos) -> Result<Token, LexError> {
        let start = self.pos;
        let mut best: Option<(usize, TokenKind)> = None;
        let mut acc = String::new();
        loop {
            let Some(c) = self.bytes.get(start + acc.len()) else {
                break;
            };
            let mut candidate = acc.clone();
            candidate.push(*c as char);
            if OPERATORS.iter().any(|(op, _)| op.starts_with(&candidate)) {
                acc = candidate;
                if let Some((_, kind)) = OPERATORS.iter().find(|(op, _)| *op == acc) {
                    best = Some((acc.len(), kind.clone()));
                }
            } else {
                break;
            }
        }
        match best {
            Some((len, kind)) => {
                self.pos = start + len;
                Ok(Token { kind, pos })
            }
            None => Err(LexError {
                pos,
                message: format!(
                    "unrecognized character '{}'",
                    self.bytes[start] as char
                ),
            }),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Sub;
            tokens.push(tok);
            if done {
                break;
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<TokenKind> {
        Lexer::new(Rc::from("test.tiny"), src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        assert_eq!(
            lex("func foo"),
            vec![
                TokenKind::KwFunc,
                TokenKind::Ident("foo".into()),
                TokenKind::Sub
            ]
        );
    }

    #[test]
    fn lexes_int_and_float_literals() {
        assert_eq!(
            lex("10 3.25 0xFF"),
            vec![
                TokenKind::Int(10),
                TokenKind::Float(3.25),
                TokenKind::Int(255),
                TokenKind::Sub
            ]
        );
    }

    #[test]
    fn longest_match_picks_compound_assignment_over_assignment() {
        assert_eq!(
            lex("x += 1"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::PlusEq,
                TokenKind::Int(1),
                TokenKind::Sub
            ]
        );
    }

    #[test]
    fn string_escapes_decode() {
        assert_eq!(
            lex(r#""a\nb\"c""#),
            vec![TokenKind::Str("a\nb\"c".into()), TokenKind::Sub]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = Lexer::new(Rc::from("t.tiny"), "\"abc").tokenize().unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn line_comments_are_skipped() {
        assert_eq!(
            lex("1 // comment\n2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Sub]
        );
    }
}
