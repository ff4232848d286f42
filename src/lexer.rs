//! Lexical analysis of a single command line.
//!
//! Tokenization is destructive: every word is NUL-terminated in place inside the
//! [`LineBuffer`], so the words can later be handed to `exec` as borrowed C strings
//! without copying. Operators never alias the buffer; they are returned as small
//! constant values instead.

use std::ffi::CStr;
use std::fmt;

/// One of the four single-character operators understood by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// The pipe operator, `|`.
    Pipe,
    /// Input redirection symbol, `<`.
    RedirectIn,
    /// Output redirection symbol, `>`.
    RedirectOut,
    /// Background marker, `&`.
    Background,
}

impl Operator {
    /// Classifies a byte as an operator, if it is one.
    pub fn from_byte(c: u8) -> Option<Operator> {
        match c {
            b'|' => Some(Operator::Pipe),
            b'<' => Some(Operator::RedirectIn),
            b'>' => Some(Operator::RedirectOut),
            b'&' => Some(Operator::Background),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Operator::Pipe => '|',
            Operator::RedirectIn => '<',
            Operator::RedirectOut => '>',
            Operator::Background => '&',
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Location of a word inside a [`LineBuffer`].
///
/// `start..end` covers the word's bytes; the byte at `end` is the NUL terminator
/// written by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// A maximal run of bytes that are neither whitespace nor operators.
    Word(Span),
    /// One of `|`, `<`, `>` or `&`.
    Op(Operator),
}

/// Owned storage for one input line.
///
/// The bytes always end with a single NUL, which marks the end of input for the
/// lexer and terminates the last word.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    pub fn new(line: impl Into<Vec<u8>>) -> Self {
        let mut bytes = line.into();
        // An interior NUL would silently cut the line short; treat it as the end.
        if let Some(nul) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(nul);
        }
        bytes.push(0);
        Self { bytes }
    }

    /// The line content, without the trailing NUL.
    pub fn text(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 1]
    }

    #[cfg(test)]
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Returns the NUL-terminated word covered by `span`.
    ///
    /// Only meaningful after the line has been tokenized.
    pub fn word(&self, span: Span) -> Option<&CStr> {
        let bytes = self.bytes.get(span.start..=span.end)?;
        CStr::from_bytes_with_nul(bytes).ok()
    }
}

impl From<String> for LineBuffer {
    fn from(line: String) -> Self {
        LineBuffer::new(line.into_bytes())
    }
}

impl From<&str> for LineBuffer {
    fn from(line: &str) -> Self {
        LineBuffer::new(line.as_bytes())
    }
}

pub(crate) fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

fn is_word_byte(c: u8) -> bool {
    c != 0 && !is_space(c) && Operator::from_byte(c).is_none()
}

/// Single-pass lexer over a mutable line buffer with one token of lookahead.
///
/// The stream is finite and cannot be restarted. End of input is reported through
/// [`Lexer::has_next`] rather than through a special token.
pub struct Lexer<'b> {
    buf: &'b mut [u8],
    pos: usize,
    saved: Option<Operator>,
    has_next: bool,
}

impl<'b> Lexer<'b> {
    pub fn new(line: &'b mut LineBuffer) -> Self {
        let mut lexer = Lexer {
            buf: line.bytes_mut(),
            pos: 0,
            saved: None,
            has_next: false,
        };
        lexer.skip_whitespace();
        lexer.has_next = lexer.peek_byte() != 0;
        lexer
    }

    /// Whether another token can be read.
    pub fn has_next(&self) -> bool {
        self.has_next
    }

    /// Returns the next token, or `None` once the stream is exhausted.
    pub fn next_token(&mut self) -> Option<Token> {
        if !self.has_next {
            return None;
        }

        // Operator that was overwritten by the terminator of the previous word.
        if let Some(op) = self.saved.take() {
            self.finish_token();
            return Some(Token::Op(op));
        }

        let c = self.peek_byte();
        if let Some(op) = Operator::from_byte(c) {
            self.pos += 1;
            self.finish_token();
            return Some(Token::Op(op));
        }

        let start = self.pos;
        while is_word_byte(self.peek_byte()) {
            self.pos += 1;
        }
        let end = self.pos;

        let next = self.peek_byte();
        if is_space(next) {
            self.buf[end] = 0;
            self.pos += 1;
        } else if let Some(op) = Operator::from_byte(next) {
            // The operator byte becomes this word's terminator; hand the operator
            // out on the next call instead.
            self.saved = Some(op);
            self.buf[end] = 0;
            self.pos += 1;
        }

        self.finish_token();
        Some(Token::Word(Span { start, end }))
    }

    fn finish_token(&mut self) {
        if self.saved.is_some() {
            self.has_next = true;
            return;
        }
        self.skip_whitespace();
        self.has_next = self.peek_byte() != 0;
    }

    fn skip_whitespace(&mut self) {
        while is_space(self.peek_byte()) {
            self.pos += 1;
        }
    }

    fn peek_byte(&self) -> u8 {
        self.buf.get(self.pos).copied().unwrap_or(0)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

/// Counts produced by [`estimate_size`], used only to size the arenas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineSize {
    /// Number of words on the line, redirection targets included.
    pub items: usize,
    /// Number of `|` operators.
    pub pipes: usize,
}

/// Fast pre-pass over a raw line counting words and pipes.
///
/// Operators other than `|` are skipped without being counted. The grammar is not
/// validated here.
pub fn estimate_size(line: &[u8]) -> LineSize {
    let mut size = LineSize::default();
    let mut i = 0;
    let at = |i: usize| line.get(i).copied().unwrap_or(0);

    while at(i) != 0 {
        while is_space(at(i)) {
            i += 1;
        }

        let c = at(i);
        if let Some(op) = Operator::from_byte(c) {
            if op == Operator::Pipe {
                size.pipes += 1;
            }
            i += 1;
        } else if c != 0 {
            size.items += 1;
            while is_word_byte(at(i)) {
                i += 1;
            }
        }
    }

    size
}
