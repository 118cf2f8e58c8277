pub mod token;

pub use token::{Token, TokenKind};
use token::Span;


use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnterminatedString { span: Span },
    InvalidNumber { text: String, span: Span },
    InvalidEscape { ch: char, span: Span },
}

pub type LexResult = Result<Vec<Token>, LexError>;

/// Lex a whole source file into a flat token vector.
///
/// `file` is only recorded into the spans; the lexer performs no I/O.
pub fn lex(input: &str, file: &str) -> LexResult {
    let mut lexer = Lexer::new(input, file);
    lexer.lex_all()
}

/// Characters that always end an identifier or number run.
fn is_terminator(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '[' | ']' | '&' | '"' | '#')
}

struct Lexer {
    input: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
    file: Rc<str>,
}

impl Lexer {
    fn new(input: &str, file: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            file: Rc::from(file),
        }
    }

    fn lex_all(&mut self) -> LexResult {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments();

            if self.is_at_end() {
                break;
            }

            tokens.push(self.next_token()?);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let ch = self.peek();

        match ch {
            '[' | ']' | '&' => {
                self.advance();
                let kind = match ch {
                    '[' => TokenKind::LSquare,
                    ']' => TokenKind::RSquare,
                    _ => TokenKind::Ampersand,
                };
                Ok(Token::new(kind, ch, self.span_from(line, column)))
            }
            '"' => self.lex_string(line, column, None),
            _ => self.lex_word(line, column),
        }
    }

    /// Lex an identifier or integer run. A single letter directly followed by
    /// an opening quote becomes the attribute of the string that follows.
    fn lex_word(&mut self, line: u32, column: u32) -> Result<Token, LexError> {
        let mut text = String::new();

        while !self.is_at_end() && !is_terminator(self.peek()) {
            text.push(self.advance());
        }

        if text.chars().count() == 1 && !self.is_at_end() && self.peek() == '"' {
            let tag = text.chars().next().unwrap_or('\0');
            if tag.is_ascii_alphabetic() {
                return self.lex_string(line, column, Some(text));
            }
        }

        let first = text.chars().next().unwrap_or('\0');
        let second = text.chars().nth(1).unwrap_or('\0');
        if first.is_ascii_digit() || (first == '-' && second.is_ascii_digit()) {
            let span = self.span_from(line, column);
            if valid_number(&text) {
                return Ok(Token::new(TokenKind::Integer, text, span));
            }
            // A malformed radix prefix is a numeric literal with a typo;
            // anything else digit-led is an ordinary identifier, which is
            // what lets feature tags like `16Bit` through.
            let unsigned = text.strip_prefix('-').unwrap_or(&text);
            let lower = unsigned.get(..2).unwrap_or("").to_ascii_lowercase();
            if lower == "0x" || lower == "0b" {
                return Err(LexError::InvalidNumber { text, span });
            }
            return Ok(Token::new(TokenKind::Identifier, text, span));
        }

        Ok(Token::new(TokenKind::Identifier, text, self.span_from(line, column)))
    }

    fn lex_string(
        &mut self,
        line: u32,
        column: u32,
        extra: Option<String>,
    ) -> Result<Token, LexError> {
        self.advance(); // opening quote

        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.advance();

            if ch == '"' {
                let mut token = Token::new(TokenKind::String, value, self.span_from(line, column));
                token.extra = extra;
                return Ok(token);
            }

            if ch == '\\' {
                if self.is_at_end() {
                    break;
                }
                let escaped = self.advance();
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    'e' => '\u{1b}',
                    '"' => '"',
                    '\\' => '\\',
                    _ => {
                        return Err(LexError::InvalidEscape {
                            ch: escaped,
                            span: self.span_from(line, column),
                        })
                    }
                });
            } else {
                value.push(ch);
            }
        }

        Err(LexError::UnterminatedString {
            span: self.span_from(line, column),
        })
    }

    /// Span starting at the recorded position and ending just before the
    /// cursor. Length is measured in characters; a token never usefully spans
    /// lines for underlining purposes, so the count is taken as-is.
    fn span_from(&self, line: u32, column: u32) -> Span {
        let length = if self.line == line {
            self.column.saturating_sub(column).max(1)
        } else {
            1
        };
        Span::new(Rc::clone(&self.file), line, column, length)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while !self.is_at_end() {
            let ch = self.peek();
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '#' {
                while !self.is_at_end() && self.peek() != '\n' {
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek(&self) -> char {
        self.input.get(self.position).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let ch = self.peek();
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }
}

/// Validate the digit set of an integer lexeme: decimal, `0x` hex or `0b`
/// binary, with `_` separators. Conversion to a value happens in the parser.
fn valid_number(text: &str) -> bool {
    let unsigned = text.strip_prefix('-').unwrap_or(text);

    let (digits, radix) = if let Some(hex) = unsigned.strip_prefix("0x").or_else(|| unsigned.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(bin) = unsigned.strip_prefix("0b").or_else(|| unsigned.strip_prefix("0B")) {
        (bin, 2)
    } else {
        (unsigned, 10)
    };

    let mut seen_digit = false;
    for ch in digits.chars() {
        if ch == '_' {
            continue;
        }
        if !ch.is_digit(radix) {
            return false;
        }
        seen_digit = true;
    }
    seen_digit
}
