//! Diagnostic rendering for the driver.
//!
//! The compiler library reports structured errors with spans; this module
//! turns them into terminal output: human-readable text with the offending
//! source line underlined, or a machine-readable JSON object for editors and
//! CI systems.

use std::collections::HashMap;

use clap::ValueEnum;
use lang::error::CallistoError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with a caret underline
    Text,
    /// A single JSON object per error
    Json,
}

#[derive(Debug, Clone, Serialize)]
struct JsonErrorOutput<'a> {
    #[serde(rename = "type")]
    output_type: &'static str,
    kind: &'static str,
    message: &'a str,
    file: &'a str,
    line: u32,
    column: u32,
    length: u32,
}

/// `<file>:<line>:<col>: error: <message>`, then the offending source line
/// with a caret/underline spanning the error's length.
pub fn format_error_text(error: &CallistoError, sources: &HashMap<String, String>) -> String {
    let span = error.span();
    let mut out = error.to_string();

    let source_line = sources
        .get(&*span.file)
        .and_then(|text| text.lines().nth(span.line.saturating_sub(1) as usize));
    if let Some(line) = source_line {
        out.push('\n');
        out.push_str(line);
        out.push('\n');
        out.push_str(&" ".repeat(span.column.saturating_sub(1) as usize));
        out.push('^');
        for _ in 1..span.length {
            out.push('~');
        }
    }

    out
}

pub fn format_error_json(error: &CallistoError) -> String {
    let span = error.span();
    let output = JsonErrorOutput {
        output_type: "error",
        kind: error.kind(),
        message: error.message(),
        file: span.file.as_ref(),
        line: span.line,
        column: span.column,
        length: span.length,
    };
    serde_json::to_string(&output).unwrap()
}

pub fn report(error: &CallistoError, sources: &HashMap<String, String>, format: OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("{}", format_error_text(error, sources)),
        OutputFormat::Json => eprintln!("{}", format_error_json(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lang::lexer::token::Span;

    fn error() -> CallistoError {
        CallistoError::Compile {
            message: "undefined identifier 'foo'".to_string(),
            span: Span::new("main.cal".into(), 2, 5, 3),
        }
    }

    #[test]
    fn text_format_underlines_the_span() {
        let mut sources = HashMap::new();
        sources.insert("main.cal".to_string(), "1 2\nadd foo\n".to_string());
        let rendered = format_error_text(&error(), &sources);
        assert_eq!(
            rendered,
            "main.cal:2:5: error: undefined identifier 'foo'\nadd foo\n    ^~~"
        );
    }

    #[test]
    fn text_format_without_source_keeps_the_header() {
        let rendered = format_error_text(&error(), &HashMap::new());
        assert_eq!(rendered, "main.cal:2:5: error: undefined identifier 'foo'");
    }

    #[test]
    fn json_format_carries_the_location() {
        let json = format_error_json(&error());
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""kind":"CompileError""#));
        assert!(json.contains(r#""message":"undefined identifier 'foo'""#));
        assert!(json.contains(r#""file":"main.cal""#));
        assert!(json.contains(r#""line":2"#));
        assert!(json.contains(r#""column":5"#));
    }
}
