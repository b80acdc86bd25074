//! Tokenizer for the clear-text exchange structure.

use crate::error::DocGraphError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Section names, type names and `ISO-10303-21`-style markers
    Keyword(String),
    /// `#12`
    InstanceRef(u64),
    /// Decoded contents of a `'...'` literal
    Str(String),
    /// Contents of a `"..."` literal, still hex encoded
    Binary(String),
    Integer(i64),
    Real(f64),
    /// `.NAME.`
    Enum(String),
    Dollar,
    Star,
    LParen,
    RParen,
    Comma,
    Equals,
    Semicolon,
}

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            pos: 0,
            line: 1,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl std::fmt::Display) -> DocGraphError {
        DocGraphError::Parse(format!("line {}: {}", self.line, message))
    }

    fn skip_trivia(&mut self) -> Result<(), DocGraphError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_second() == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(self.error("unterminated comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, DocGraphError> {
        self.skip_trivia()?;
        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let token = match c {
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            ',' => self.single(Token::Comma),
            '=' => self.single(Token::Equals),
            ';' => self.single(Token::Semicolon),
            '$' => self.single(Token::Dollar),
            '*' => self.single(Token::Star),
            '#' => {
                self.bump();
                let digits = self.take_while(|c| c.is_ascii_digit());
                let id = digits
                    .parse()
                    .map_err(|_| self.error("expected an instance number after '#'"))?;
                Token::InstanceRef(id)
            }
            '\'' => Token::Str(self.string()?),
            '"' => {
                self.bump();
                let hex = self.take_while(|c| c != '"').to_string();
                if self.bump() != Some('"') {
                    return Err(self.error("unterminated binary literal"));
                }
                Token::Binary(hex)
            }
            '.' => {
                self.bump();
                let name = self
                    .take_while(|c| c.is_ascii_alphanumeric() || c == '_')
                    .to_string();
                if self.bump() != Some('.') {
                    return Err(self.error(format!("unterminated enumeration '.{name}'")));
                }
                Token::Enum(name)
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' => self.number()?,
            c if c.is_ascii_alphabetic() || c == '_' || c == '!' => {
                let word = self
                    .take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '!')
                    .to_string();
                Token::Keyword(word)
            }
            other => return Err(self.error(format!("unexpected character '{other}'"))),
        };
        Ok(Some(token))
    }

    fn single(&mut self, token: Token) -> Token {
        self.bump();
        token
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
        &self.input[start..self.pos]
    }

    fn number(&mut self) -> Result<Token, DocGraphError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        self.take_while(|c| c.is_ascii_digit());
        let mut is_real = false;
        if self.peek() == Some('.') {
            is_real = true;
            self.bump();
            self.take_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('E' | 'e')) {
            is_real = true;
            self.bump();
            if matches!(self.peek(), Some('-' | '+')) {
                self.bump();
            }
            self.take_while(|c| c.is_ascii_digit());
        }
        let text = &self.input[start..self.pos];
        if is_real {
            // `1.E-05` is valid exchange syntax but not valid Rust float syntax
            let normalized = text.replace(".E", ".0E").replace(".e", ".0e");
            let value = normalized
                .parse()
                .map_err(|_| self.error(format!("malformed real '{text}'")))?;
            Ok(Token::Real(value))
        } else {
            let value = text
                .parse()
                .map_err(|_| self.error(format!("malformed integer '{text}'")))?;
            Ok(Token::Integer(value))
        }
    }

    /// Read a quoted string, decoding `''`, `\\`, `\X\HH` and `\X2\HHHH...\X0\`.
    fn string(&mut self) -> Result<String, DocGraphError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('\'') => {
                    if self.peek() == Some('\'') {
                        self.bump();
                        out.push('\'');
                    } else {
                        return Ok(out);
                    }
                }
                Some('\\') => self.escape(&mut out)?,
                Some(c) => out.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), DocGraphError> {
        let rest = &self.input[self.pos..];
        if rest.starts_with('\\') {
            self.bump();
            out.push('\\');
        } else if let Some(body) = rest.strip_prefix("X2\\") {
            let end = body
                .find("\\X0\\")
                .ok_or_else(|| self.error("unterminated \\X2\\ escape"))?;
            let hex = &body[..end];
            if hex.len() % 4 != 0 {
                return Err(self.error("\\X2\\ escape length is not a multiple of 4"));
            }
            let units = (0..hex.len())
                .step_by(4)
                .map(|i| u16::from_str_radix(&hex[i..i + 4], 16))
                .collect::<Result<Vec<u16>, _>>()
                .map_err(|_| self.error("malformed \\X2\\ escape"))?;
            out.push_str(&String::from_utf16_lossy(&units));
            let consumed = "X2\\".len() + end + "\\X0\\".len();
            self.advance(consumed);
        } else if let Some(body) = rest.strip_prefix("X\\") {
            let hex = body
                .get(..2)
                .ok_or_else(|| self.error("truncated \\X\\ escape"))?;
            let byte =
                u8::from_str_radix(hex, 16).map_err(|_| self.error("malformed \\X\\ escape"))?;
            out.push(char::from(byte));
            self.advance("X\\".len() + 2);
        } else {
            // Unknown directive: keep the backslash literally
            out.push('\\');
        }
        Ok(())
    }

    fn advance(&mut self, bytes: usize) {
        let target = self.pos + bytes;
        while self.pos < target {
            if self.bump().is_none() {
                break;
            }
        }
    }
}

/// Encode a string literal, including the surrounding quotes.
pub fn encode_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    let mut wide: Vec<u16> = Vec::new();
    let flush = |wide: &mut Vec<u16>, out: &mut String| {
        if !wide.is_empty() {
            out.push_str("\\X2\\");
            for unit in wide.drain(..) {
                out.push_str(&format!("{unit:04X}"));
            }
            out.push_str("\\X0\\");
        }
    };
    for c in text.chars() {
        if (' '..='~').contains(&c) {
            flush(&mut wide, &mut out);
            match c {
                '\'' => out.push_str("''"),
                '\\' => out.push_str("\\\\"),
                c => out.push(c),
            }
        } else {
            let mut buf = [0u16; 2];
            wide.extend_from_slice(c.encode_utf16(&mut buf));
        }
    }
    flush(&mut wide, &mut out);
    out.push('\'');
    out
}

/// Spell a real so that it always contains a decimal point: `1.`, `0.5`, `1.E-05`.
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0.".to_string();
    }
    let text = format!("{value:?}");
    if let Some((mantissa, exponent)) = text.split_once('e') {
        let mantissa = if mantissa.contains('.') {
            mantissa.to_string()
        } else {
            format!("{mantissa}.")
        };
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { "-" } else { "" };
        return format!("{mantissa}E{sign}{:02}", exponent.abs());
    }
    match text.strip_suffix(".0") {
        Some(whole) => format!("{whole}."),
        None => text,
    }
}
