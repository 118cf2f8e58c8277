use expect_test::expect;

use super::*;

fn span(line: u32, column: u32, length: u32) -> Span {
    Span::new("main.cal".into(), line, column, length)
}

#[test]
fn lex_error_display() {
    let err = CallistoError::Lex {
        message: "unterminated string literal".to_string(),
        span: span(3, 7, 1),
    };
    expect![[r#"main.cal:3:7: error: unterminated string literal"#]].assert_eq(&err.to_string());
    assert_eq!(err.kind(), "LexError");
}

#[test]
fn parse_error_display() {
    let err = CallistoError::Parse {
        message: "unexpected EOF while parsing if".to_string(),
        span: span(10, 1, 2),
    };
    expect![[r#"main.cal:10:1: error: unexpected EOF while parsing if"#]].assert_eq(&err.to_string());
    assert_eq!(err.kind(), "ParseError");
}

#[test]
fn compile_error_display() {
    let err = CallistoError::Compile {
        message: "undefined identifier 'foo'".to_string(),
        span: span(5, 12, 3),
    };
    expect![[r#"main.cal:5:12: error: undefined identifier 'foo'"#]].assert_eq(&err.to_string());
    assert_eq!(err.kind(), "CompileError");
}

#[test]
fn lex_error_conversions() {
    let err: CallistoError = LexError::InvalidNumber {
        text: "0xzz".to_string(),
        span: span(1, 1, 4),
    }
    .into();
    assert_eq!(err.message(), "invalid numeric literal '0xzz'");

    let err: CallistoError = LexError::UnterminatedString { span: span(2, 3, 1) }.into();
    assert_eq!(err.message(), "unterminated string literal");
    assert_eq!(err.span().line, 2);

    let err: CallistoError = LexError::InvalidEscape {
        ch: 'q',
        span: span(1, 2, 1),
    }
    .into();
    assert_eq!(err.message(), "invalid escape sequence '\\q'");
}

#[test]
fn parse_error_conversion_keeps_the_span() {
    let err: CallistoError = ParseError {
        message: "unexpected ']'".to_string(),
        span: span(4, 9, 1),
    }
    .into();
    assert_eq!(err.span().column, 9);
    assert_eq!(err.span().length, 1);
}

#[test]
fn compile_error_conversion_keeps_the_span() {
    let err: CallistoError = CompileError::new("break outside of a loop", &span(7, 1, 5)).into();
    assert_eq!(err.message(), "break outside of a loop");
    assert_eq!(err.span().line, 7);
}
