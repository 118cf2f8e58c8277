//! Recursive-descent parser over the flat token vector.
//!
//! Each production advances the cursor until it sits on the last token it
//! consumed and then returns; the statement loops step past that token before
//! dispatching again. Keywords are ordinary identifier tokens dispatched by
//! string comparison, so the lexer stays grammar-free.

pub mod ast;

#[cfg(test)]
mod tests;

use crate::lexer::token::{Span, Token, TokenKind};
use ast::*;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    fn new(message: impl Into<String>, span: &Span) -> Self {
        Self {
            message: message.into(),
            span: span.clone(),
        }
    }
}

/// Parse a token stream into the ordered list of AST roots.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Node>, ParseError> {
    Parser::new(tokens).parse_program()
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    /// Name of the production being parsed, reported when the token stream
    /// runs out. Inner statement loops re-set it after every nested
    /// statement so EOF names the innermost unfinished production.
    parsing: &'static str,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            parsing: "statement",
        }
    }

    pub fn parse_program(mut self) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();

        while self.current < self.tokens.len() {
            nodes.push(self.parse_statement()?);
            self.current += 1;
        }

        Ok(nodes)
    }

    pub fn parse_statement(&mut self) -> Result<Node, ParseError> {
        let token = self.token()?.clone();

        match token.kind {
            TokenKind::Integer => self.parse_integer(&token),
            TokenKind::String => self.parse_string(&token),
            TokenKind::LSquare => self.parse_array(),
            TokenKind::Ampersand => self.parse_addr(),
            TokenKind::RSquare => Err(ParseError::new("unexpected ']'", &token.span)),
            TokenKind::Identifier => match token.contents.as_str() {
                "func" | "inline" => self.parse_func_def(),
                "include" => self.parse_include(),
                "asm" => self.parse_asm(),
                "if" => self.parse_if(),
                "while" => self.parse_while(),
                "let" => self.parse_let(),
                "enable" | "requires" | "restrict" => self.parse_feature(&token),
                "struct" => self.parse_struct(),
                "version" => self.parse_version(),
                "const" => self.parse_const(),
                "enum" => self.parse_enum(),
                "union" => self.parse_union(),
                "alias" => self.parse_alias(),
                "extern" => self.parse_extern(),
                "implement" => self.parse_implement(),
                "->" => self.parse_set(),
                _ => Ok(Node::Word(WordNode {
                    name: token.contents,
                    span: token.span,
                })),
            },
        }
    }

    // Token access -----------------------------------------------------------

    fn token(&self) -> Result<&Token, ParseError> {
        self.tokens.get(self.current).ok_or_else(|| {
            let span = self
                .tokens
                .last()
                .map(|t| t.span.clone())
                .unwrap_or_else(|| Span::new("".into(), 1, 1, 1));
            ParseError {
                message: format!("unexpected EOF while parsing {}", self.parsing),
                span,
            }
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current + 1)
    }

    fn peek_is_identifier(&self, contents: &str) -> bool {
        self.peek()
            .map(|t| t.kind == TokenKind::Identifier && t.contents == contents)
            .unwrap_or(false)
    }

    fn next_identifier(&mut self) -> Result<Token, ParseError> {
        self.current += 1;
        let token = self.token()?;
        if token.kind != TokenKind::Identifier {
            return Err(ParseError::new(
                format!("expected an identifier, got {}", describe(token)),
                &token.span,
            ));
        }
        Ok(token.clone())
    }

    fn next_integer(&mut self) -> Result<IntegerNode, ParseError> {
        self.current += 1;
        let token = self.token()?.clone();
        if token.kind != TokenKind::Integer {
            return Err(ParseError::new(
                format!("expected an integer, got {}", describe(&token)),
                &token.span,
            ));
        }
        let Node::Integer(node) = self.parse_integer(&token)? else {
            unreachable!("parse_integer always returns an integer node");
        };
        Ok(node)
    }

    // Productions ------------------------------------------------------------

    fn parse_integer(&self, token: &Token) -> Result<Node, ParseError> {
        let value = integer_value(&token.contents).ok_or_else(|| {
            ParseError::new(
                format!("integer literal '{}' is out of range", token.contents),
                &token.span,
            )
        })?;
        Ok(Node::Integer(IntegerNode {
            value,
            span: token.span.clone(),
        }))
    }

    fn parse_string(&self, token: &Token) -> Result<Node, ParseError> {
        let constant = match token.extra.as_deref() {
            None => false,
            Some("c") => true,
            Some(tag) => {
                return Err(ParseError::new(
                    format!("invalid string attribute '{tag}'"),
                    &token.span,
                ))
            }
        };
        Ok(Node::String(StringNode {
            value: token.contents.clone(),
            constant,
            span: token.span.clone(),
        }))
    }

    fn parse_array(&mut self) -> Result<Node, ParseError> {
        self.parsing = "array";
        let span = self.token()?.span.clone();

        let mut first = self.next_identifier()?;
        let mut constant = false;
        if first.contents == "c" && self.peek().map(|t| t.kind) == Some(TokenKind::Identifier) {
            constant = true;
            first = self.next_identifier()?;
        }
        let element_type = first.contents;

        let mut elements = Vec::new();
        loop {
            self.current += 1;
            if self.token()?.kind == TokenKind::RSquare {
                break;
            }
            elements.push(self.parse_statement()?);
            self.parsing = "array";
        }

        Ok(Node::Array(ArrayNode {
            element_type,
            elements,
            constant,
            span,
        }))
    }

    fn parse_addr(&mut self) -> Result<Node, ParseError> {
        self.parsing = "address";
        let span = self.token()?.span.clone();
        let name = self.next_identifier()?.contents;
        Ok(Node::Addr(AddrNode { name, span }))
    }

    fn parse_set(&mut self) -> Result<Node, ParseError> {
        self.parsing = "assignment";
        let span = self.token()?.span.clone();
        let name = self.next_identifier()?.contents;
        Ok(Node::Set(SetNode { name, span }))
    }

    fn parse_include(&mut self) -> Result<Node, ParseError> {
        self.parsing = "include";
        let span = self.token()?.span.clone();
        self.current += 1;
        let token = self.token()?;
        if token.kind != TokenKind::String {
            return Err(ParseError::new(
                format!("expected a path string after 'include', got {}", describe(token)),
                &token.span,
            ));
        }
        Ok(Node::Include(IncludeNode {
            path: token.contents.clone(),
            span,
        }))
    }

    fn parse_asm(&mut self) -> Result<Node, ParseError> {
        self.parsing = "asm";
        let span = self.token()?.span.clone();

        let mut code = String::new();
        loop {
            self.current += 1;
            let token = self.token()?;
            if token.kind == TokenKind::Identifier && token.contents == "end" {
                break;
            }
            if token.kind != TokenKind::String {
                return Err(ParseError::new(
                    format!("expected a string of assembly, got {}", describe(token)),
                    &token.span,
                ));
            }
            code.push_str(&token.contents);
            code.push('\n');
        }

        Ok(Node::Asm(AsmNode { code, span }))
    }

    fn parse_func_def(&mut self) -> Result<Node, ParseError> {
        self.parsing = "function definition";
        let start = self.token()?.clone();
        let inline = start.contents == "inline";

        let mut raw = false;
        let mut name_token = self.next_identifier()?;
        if name_token.contents == "raw" {
            if inline {
                return Err(ParseError::new(
                    "a function cannot be both inline and raw",
                    &name_token.span,
                ));
            }
            raw = true;
            name_token = self.next_identifier()?;
        }
        let name = name_token.contents;

        let mut params = Vec::new();
        loop {
            let type_token = self.next_identifier()?;
            if type_token.contents == "begin" {
                break;
            }
            let param_name = self.next_identifier()?;
            if param_name.contents == "begin" {
                return Err(ParseError::new(
                    format!("expected a parameter name after '{}'", type_token.contents),
                    &param_name.span,
                ));
            }
            params.push(Param {
                type_name: type_token.contents,
                name: param_name.contents,
            });
        }

        let mut body = Vec::new();
        loop {
            self.current += 1;
            let token = self.token()?;
            if token.kind == TokenKind::Identifier && token.contents == "end" {
                break;
            }
            let node = self.parse_statement()?;
            self.parsing = "function definition";
            if matches!(node, Node::FuncDef(_)) {
                return Err(ParseError::new(
                    "cannot define a function inside a function",
                    node.span(),
                ));
            }
            body.push(node);
        }

        Ok(Node::FuncDef(FuncDefNode {
            name,
            inline,
            raw,
            params,
            body,
            span: start.span,
        }))
    }

    fn parse_if(&mut self) -> Result<Node, ParseError> {
        self.parsing = "if";
        let span = self.token()?.span.clone();

        let mut clauses = Vec::new();
        let mut else_body = None;

        loop {
            let mut condition = Vec::new();
            loop {
                self.current += 1;
                let token = self.token()?;
                if token.kind == TokenKind::Identifier && token.contents == "then" {
                    break;
                }
                condition.push(self.parse_statement()?);
                self.parsing = "if";
            }

            let mut body = Vec::new();
            let terminator = loop {
                self.current += 1;
                let token = self.token()?;
                if token.kind == TokenKind::Identifier
                    && matches!(token.contents.as_str(), "elseif" | "else" | "end")
                {
                    break token.contents.clone();
                }
                body.push(self.parse_statement()?);
                self.parsing = "if";
            };
            clauses.push(IfClause { condition, body });

            match terminator.as_str() {
                "elseif" => continue,
                "else" => {
                    let mut body = Vec::new();
                    loop {
                        self.current += 1;
                        let token = self.token()?;
                        if token.kind == TokenKind::Identifier && token.contents == "end" {
                            break;
                        }
                        body.push(self.parse_statement()?);
                        self.parsing = "if";
                    }
                    else_body = Some(body);
                    break;
                }
                _ => break,
            }
        }

        Ok(Node::If(IfNode {
            clauses,
            else_body,
            span,
        }))
    }

    fn parse_while(&mut self) -> Result<Node, ParseError> {
        self.parsing = "while";
        let span = self.token()?.span.clone();

        let mut condition = Vec::new();
        loop {
            self.current += 1;
            let token = self.token()?;
            if token.kind == TokenKind::Identifier && token.contents == "do" {
                break;
            }
            condition.push(self.parse_statement()?);
            self.parsing = "while";
        }

        let mut body = Vec::new();
        loop {
            self.current += 1;
            let token = self.token()?;
            if token.kind == TokenKind::Identifier && token.contents == "end" {
                break;
            }
            body.push(self.parse_statement()?);
            self.parsing = "while";
        }

        Ok(Node::While(WhileNode {
            condition,
            body,
            span,
        }))
    }

    fn parse_let(&mut self) -> Result<Node, ParseError> {
        self.parsing = "let";
        let span = self.token()?.span.clone();

        let mut type_token = self.next_identifier()?;
        let mut array = false;
        let mut array_size = 0;
        if type_token.contents == "array" {
            array = true;
            let size = self.next_integer()?;
            if size.value < 0 {
                return Err(ParseError::new("array length cannot be negative", &size.span));
            }
            array_size = size.value as usize;
            type_token = self.next_identifier()?;
        }
        let name = self.next_identifier()?.contents;

        Ok(Node::Let(LetNode {
            type_name: type_token.contents,
            name,
            array,
            array_size,
            span,
        }))
    }

    fn parse_feature(&mut self, keyword: &Token) -> Result<Node, ParseError> {
        self.parsing = "feature directive";
        let span = keyword.span.clone();
        let feature = self.next_identifier()?.contents;
        let node = FeatureNode { feature, span };
        Ok(match keyword.contents.as_str() {
            "enable" => Node::Enable(node),
            "requires" => Node::Requires(node),
            _ => Node::Restrict(node),
        })
    }

    fn parse_version(&mut self) -> Result<Node, ParseError> {
        self.parsing = "version";
        let span = self.token()?.span.clone();

        let mut feature_token = self.next_identifier()?;
        let mut not = false;
        if feature_token.contents == "not" {
            not = true;
            feature_token = self.next_identifier()?;
        }

        let mut body = Vec::new();
        loop {
            self.current += 1;
            let token = self.token()?;
            if token.kind == TokenKind::Identifier && token.contents == "end" {
                break;
            }
            body.push(self.parse_statement()?);
            self.parsing = "version";
        }

        Ok(Node::Version(VersionNode {
            feature: feature_token.contents,
            not,
            body,
            span,
        }))
    }

    fn parse_struct(&mut self) -> Result<Node, ParseError> {
        self.parsing = "struct";
        let span = self.token()?.span.clone();
        let name = self.next_identifier()?.contents;

        let mut parent = None;
        if self.peek_is_identifier(":") {
            self.current += 1;
            parent = Some(self.next_identifier()?.contents);
        }

        let mut members = Vec::new();
        loop {
            let mut type_token = self.next_identifier()?;
            if type_token.contents == "end" {
                break;
            }
            let mut array = false;
            let mut array_size = 0;
            if type_token.contents == "array" {
                array = true;
                let size = self.next_integer()?;
                if size.value < 0 {
                    return Err(ParseError::new("array length cannot be negative", &size.span));
                }
                array_size = size.value as usize;
                type_token = self.next_identifier()?;
            }
            let member_name = self.next_identifier()?.contents;
            members.push(StructField {
                type_name: type_token.contents,
                name: member_name,
                array,
                array_size,
            });
        }

        Ok(Node::Struct(StructNode {
            name,
            parent,
            members,
            span,
        }))
    }

    fn parse_const(&mut self) -> Result<Node, ParseError> {
        self.parsing = "const";
        let span = self.token()?.span.clone();
        let name = self.next_identifier()?.contents;
        let value = self.next_integer()?.value;
        Ok(Node::Const(ConstNode { name, value, span }))
    }

    fn parse_enum(&mut self) -> Result<Node, ParseError> {
        self.parsing = "enum";
        let span = self.token()?.span.clone();
        let name = self.next_identifier()?.contents;

        let mut base_type = String::from("cell");
        if self.peek_is_identifier(":") {
            self.current += 1;
            base_type = self.next_identifier()?.contents;
        }

        let mut members: Vec<EnumMember> = Vec::new();
        loop {
            let member_token = self.next_identifier()?;
            if member_token.contents == "end" {
                break;
            }
            let value = if self.peek_is_identifier("=") {
                self.current += 1;
                self.next_integer()?.value
            } else {
                members.last().map(|m| m.value + 1).unwrap_or(0)
            };
            members.push(EnumMember {
                name: member_token.contents,
                value,
            });
        }

        Ok(Node::Enum(EnumNode {
            name,
            base_type,
            members,
            span,
        }))
    }

    fn parse_union(&mut self) -> Result<Node, ParseError> {
        self.parsing = "union";
        let span = self.token()?.span.clone();
        let name = self.next_identifier()?.contents;

        let mut members = Vec::new();
        loop {
            let member = self.next_identifier()?;
            if member.contents == "end" {
                break;
            }
            members.push(member.contents);
        }

        Ok(Node::Union(UnionNode {
            name,
            members,
            span,
        }))
    }

    fn parse_alias(&mut self) -> Result<Node, ParseError> {
        self.parsing = "alias";
        let span = self.token()?.span.clone();

        let mut to = self.next_identifier()?;
        let mut overwrite = false;
        if to.contents == "overwrite" {
            overwrite = true;
            to = self.next_identifier()?;
        }
        let from = self.next_identifier()?.contents;

        Ok(Node::Alias(AliasNode {
            to: to.contents,
            from,
            overwrite,
            span,
        }))
    }

    fn parse_extern(&mut self) -> Result<Node, ParseError> {
        self.parsing = "extern";
        let span = self.token()?.span.clone();
        let first = self.next_identifier()?;

        match first.contents.as_str() {
            "raw" => {
                let name = self.next_identifier()?.contents;
                Ok(Node::Extern(ExternNode {
                    name,
                    kind: ExternKind::Raw,
                    ret_type: None,
                    param_types: Vec::new(),
                    span,
                }))
            }
            "C" => {
                let ret_type = self.next_identifier()?.contents;
                let name = self.next_identifier()?.contents;
                let mut param_types = Vec::new();
                loop {
                    let param = self.next_identifier()?;
                    if param.contents == "end" {
                        break;
                    }
                    param_types.push(param.contents);
                }
                Ok(Node::Extern(ExternNode {
                    name,
                    kind: ExternKind::C,
                    ret_type: Some(ret_type),
                    param_types,
                    span,
                }))
            }
            _ => Ok(Node::Extern(ExternNode {
                name: first.contents,
                kind: ExternKind::Native,
                ret_type: None,
                param_types: Vec::new(),
                span,
            })),
        }
    }

    fn parse_implement(&mut self) -> Result<Node, ParseError> {
        self.parsing = "implement";
        let span = self.token()?.span.clone();
        let struct_name = self.next_identifier()?.contents;

        let method_token = self.next_identifier()?;
        let method = match method_token.contents.as_str() {
            "init" => ImplementMethod::Init,
            "deinit" => ImplementMethod::Deinit,
            other => {
                return Err(ParseError::new(
                    format!("unknown method '{other}', expected 'init' or 'deinit'"),
                    &method_token.span,
                ))
            }
        };

        let mut body = Vec::new();
        loop {
            self.current += 1;
            let token = self.token()?;
            if token.kind == TokenKind::Identifier && token.contents == "end" {
                break;
            }
            let node = self.parse_statement()?;
            self.parsing = "implement";
            if matches!(node, Node::FuncDef(_)) {
                return Err(ParseError::new(
                    "cannot define a function inside an implement block",
                    node.span(),
                ));
            }
            body.push(node);
        }

        Ok(Node::Implement(ImplementNode {
            struct_name,
            method,
            body,
            span,
        }))
    }
}

/// Human-friendly token description for diagnostics.
fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Integer => format!("integer '{}'", token.contents),
        TokenKind::Identifier => format!("'{}'", token.contents),
        TokenKind::String => "a string".to_string(),
        TokenKind::LSquare => "'['".to_string(),
        TokenKind::RSquare => "']'".to_string(),
        TokenKind::Ampersand => "'&'".to_string(),
    }
}

/// Convert a validated integer lexeme to its value. Returns `None` when the
/// value does not fit in an `i64`.
fn integer_value(text: &str) -> Option<i64> {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let (digits, radix) = if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        (hex, 16)
    } else if let Some(bin) = unsigned
        .strip_prefix("0b")
        .or_else(|| unsigned.strip_prefix("0B"))
    {
        (bin, 2)
    } else {
        (unsigned, 10)
    };

    let digits: String = digits.chars().filter(|&c| c != '_').collect();
    let value = i64::from_str_radix(&digits, radix).ok()?;
    if negative {
        value.checked_neg()
    } else {
        Some(value)
    }
}
