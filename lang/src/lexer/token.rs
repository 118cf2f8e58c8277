use std::rc::Rc;

/// Location of a lexeme within a source file (line and column are 1-indexed).
///
/// Spans are attached to every token and every AST node so diagnostics can
/// point at the offending text; they never influence semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub file: Rc<str>,
    pub line: u32,
    pub column: u32,
    /// Width of the lexeme in columns, used for the diagnostic underline.
    pub length: u32,
}

impl Span {
    pub fn new(file: Rc<str>, line: u32, column: u32, length: u32) -> Self {
        Self {
            file,
            line,
            column,
            length,
        }
    }
}

/// Token type produced by the lexer.
///
/// Keywords are not distinguished here: they come out as `Identifier` tokens
/// and the parser dispatches on their text. This keeps the lexer free of any
/// knowledge about the statement grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Integer,
    Identifier,
    String,
    LSquare,
    RSquare,
    Ampersand,
}

/// Token with its raw text and position information.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The textual lexeme. For strings this is the unescaped body; for
    /// identifiers it is the exact text, including punctuation identifiers
    /// such as `->`, `:` and `=`.
    pub contents: String,
    /// Optional attribute, used by string tokens to carry the single-letter
    /// tag written before the opening quote (`c"..."`).
    pub extra: Option<String>,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, contents: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            contents: contents.into(),
            extra: None,
            span,
        }
    }
}
