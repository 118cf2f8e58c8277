use expect_test::expect;

use super::*;
use crate::lexer::lex;

fn parse_source(source: &str) -> Result<Vec<Node>, ParseError> {
    let tokens = lex(source, "test.cal").unwrap();
    parse(tokens)
}

fn parse_one(source: &str) -> Node {
    let mut nodes = parse_source(source).unwrap();
    assert_eq!(nodes.len(), 1, "expected a single statement from {source:?}");
    nodes.remove(0)
}

/// Canonical printing survives a parse round trip.
fn round_trip(source: &str) {
    let printed = parse_one(source).to_string();
    let reparsed = parse_one(&printed).to_string();
    assert_eq!(printed, reparsed);
}

#[test]
fn parse_words_and_integers() {
    let nodes = parse_source("drop 42 -17 0x1f").unwrap();
    assert_eq!(nodes.len(), 4);
    assert!(matches!(&nodes[0], Node::Word(w) if w.name == "drop"));
    assert!(matches!(&nodes[1], Node::Integer(n) if n.value == 42));
    assert!(matches!(&nodes[2], Node::Integer(n) if n.value == -17));
    assert!(matches!(&nodes[3], Node::Integer(n) if n.value == 31));
}

#[test]
fn parse_string_literals() {
    let node = parse_one(r#""hello""#);
    assert!(matches!(&node, Node::String(s) if s.value == "hello" && !s.constant));

    let node = parse_one(r#"c"hello""#);
    assert!(matches!(&node, Node::String(s) if s.constant));
}

#[test]
fn parse_rejects_unknown_string_attribute() {
    let err = parse_source(r#"w"hello""#).unwrap_err();
    expect![[r#"invalid string attribute 'w'"#]].assert_eq(&err.message);
}

#[test]
fn parse_func_def() {
    let node = parse_one("func add u16 a u16 b begin a b end");
    let Node::FuncDef(func) = &node else {
        panic!("expected a function definition");
    };
    assert_eq!(func.name, "add");
    assert!(!func.inline);
    assert!(!func.raw);
    assert_eq!(func.params.len(), 2);
    assert_eq!(func.params[0].type_name, "u16");
    assert_eq!(func.params[0].name, "a");
    assert_eq!(func.body.len(), 2);
    expect![[r#"func add u16 a u16 b begin a b end"#]].assert_eq(&node.to_string());
}

#[test]
fn parse_inline_and_raw_functions() {
    let node = parse_one("inline two begin 1 2 end");
    assert!(matches!(&node, Node::FuncDef(f) if f.inline && !f.raw));

    let node = parse_one("func raw boot begin end");
    assert!(matches!(&node, Node::FuncDef(f) if f.raw && !f.inline));
}

#[test]
fn parse_rejects_inline_raw() {
    let err = parse_source("inline raw f begin end").unwrap_err();
    expect![[r#"a function cannot be both inline and raw"#]].assert_eq(&err.message);
}

#[test]
fn parse_rejects_nested_func_def() {
    let err = parse_source("func f begin func g begin end end").unwrap_err();
    expect![[r#"cannot define a function inside a function"#]].assert_eq(&err.message);

    let err = parse_source("implement Point init func g begin end end end").unwrap_err();
    expect![[r#"cannot define a function inside an implement block"#]].assert_eq(&err.message);
}

#[test]
fn parse_if_single_clause() {
    let node = parse_one("if 1 then 2 end");
    let Node::If(node) = &node else {
        panic!("expected an if");
    };
    assert_eq!(node.clauses.len(), 1);
    assert_eq!(node.clauses[0].condition.len(), 1);
    assert_eq!(node.clauses[0].body.len(), 1);
    assert!(node.else_body.is_none());
}

#[test]
fn parse_if_elseif_else() {
    let node = parse_one("if 1 then 2 elseif 3 then 4 else 5 end");
    let Node::If(if_node) = &node else {
        panic!("expected an if");
    };
    assert_eq!(if_node.clauses.len(), 2);
    assert!(if_node.else_body.is_some());
    expect![[r#"if 1 then 2 elseif 3 then 4 else 5 end"#]].assert_eq(&node.to_string());
}

#[test]
fn parse_empty_if_body() {
    let node = parse_one("if 1 then end");
    let Node::If(if_node) = &node else {
        panic!("expected an if");
    };
    assert_eq!(if_node.clauses[0].body.len(), 0);
}

#[test]
fn parse_nested_if() {
    let node = parse_one("if 1 then if 2 then 3 end else 4 end");
    let Node::If(outer) = &node else {
        panic!("expected an if");
    };
    assert_eq!(outer.clauses.len(), 1);
    assert!(matches!(&outer.clauses[0].body[0], Node::If(_)));
    assert!(outer.else_body.is_some());
}

#[test]
fn parse_while() {
    let node = parse_one("while x 10 lt do x inc end");
    let Node::While(node) = &node else {
        panic!("expected a while");
    };
    assert_eq!(node.condition.len(), 3);
    assert_eq!(node.body.len(), 2);
}

#[test]
fn parse_empty_while_body() {
    let node = parse_one("while 1 do end");
    assert!(matches!(&node, Node::While(w) if w.body.is_empty()));
}

#[test]
fn parse_let() {
    let node = parse_one("let u16 x");
    assert!(matches!(&node, Node::Let(l) if l.type_name == "u16" && l.name == "x" && !l.array));

    let node = parse_one("let array 4 u16 xs");
    let Node::Let(let_node) = &node else {
        panic!("expected a let");
    };
    assert!(let_node.array);
    assert_eq!(let_node.array_size, 4);
    assert_eq!(let_node.type_name, "u16");
    assert_eq!(let_node.name, "xs");
}

#[test]
fn parse_rejects_negative_array_length() {
    let err = parse_source("let array -1 u16 xs").unwrap_err();
    expect![[r#"array length cannot be negative"#]].assert_eq(&err.message);
}

#[test]
fn parse_array_literal() {
    let node = parse_one("[u8 1 2 3]");
    let Node::Array(array) = &node else {
        panic!("expected an array");
    };
    assert_eq!(array.element_type, "u8");
    assert_eq!(array.elements.len(), 3);
    assert!(!array.constant);

    let node = parse_one("[c u16 10 20]");
    assert!(matches!(&node, Node::Array(a) if a.constant && a.element_type == "u16"));
}

#[test]
fn parse_struct() {
    let node = parse_one("struct Point u16 x u16 y end");
    let Node::Struct(node) = &node else {
        panic!("expected a struct");
    };
    assert_eq!(node.name, "Point");
    assert!(node.parent.is_none());
    assert_eq!(node.members.len(), 2);
}

#[test]
fn parse_struct_with_parent_and_array_member() {
    let node = parse_one("struct Entity : Point array 8 u8 tag end");
    let Node::Struct(node) = &node else {
        panic!("expected a struct");
    };
    assert_eq!(node.parent.as_deref(), Some("Point"));
    assert!(node.members[0].array);
    assert_eq!(node.members[0].array_size, 8);
}

#[test]
fn parse_enum_implicit_values() {
    let node = parse_one("enum Color : u8 Red Green = 5 Blue end");
    let Node::Enum(node) = &node else {
        panic!("expected an enum");
    };
    assert_eq!(node.base_type, "u8");
    let values: Vec<(String, i64)> = node
        .members
        .iter()
        .map(|m| (m.name.clone(), m.value))
        .collect();
    assert_eq!(
        values,
        vec![
            ("Red".to_string(), 0),
            ("Green".to_string(), 5),
            ("Blue".to_string(), 6),
        ]
    );
}

#[test]
fn parse_enum_defaults_to_cell_base() {
    let node = parse_one("enum State Idle Running end");
    assert!(matches!(&node, Node::Enum(e) if e.base_type == "cell"));
}

#[test]
fn parse_const() {
    let node = parse_one("const N 42");
    assert!(matches!(&node, Node::Const(c) if c.name == "N" && c.value == 42));
}

#[test]
fn parse_union() {
    let node = parse_one("union Value u8 u16 end");
    assert!(matches!(&node, Node::Union(u) if u.members == vec!["u8", "u16"]));
}

#[test]
fn parse_alias() {
    let node = parse_one("alias MyInt u16");
    assert!(matches!(&node, Node::Alias(a) if a.to == "MyInt" && a.from == "u16" && !a.overwrite));

    let node = parse_one("alias overwrite MyInt u8");
    assert!(matches!(&node, Node::Alias(a) if a.overwrite));
}

#[test]
fn parse_extern_variants() {
    let node = parse_one("extern draw");
    assert!(matches!(&node, Node::Extern(e) if e.kind == ExternKind::Native));

    let node = parse_one("extern raw emit");
    assert!(matches!(&node, Node::Extern(e) if e.kind == ExternKind::Raw && e.name == "emit"));

    let node = parse_one("extern C cell write u16 u16 end");
    let Node::Extern(node) = &node else {
        panic!("expected an extern");
    };
    assert_eq!(node.kind, ExternKind::C);
    assert_eq!(node.ret_type.as_deref(), Some("cell"));
    assert_eq!(node.name, "write");
    assert_eq!(node.param_types, vec!["u16", "u16"]);
}

#[test]
fn parse_implement() {
    let node = parse_one("implement Point init 0 end");
    let Node::Implement(node) = &node else {
        panic!("expected an implement block");
    };
    assert_eq!(node.struct_name, "Point");
    assert_eq!(node.method, ImplementMethod::Init);
    assert_eq!(node.body.len(), 1);

    let err = parse_source("implement Point destroy end").unwrap_err();
    expect![[r#"unknown method 'destroy', expected 'init' or 'deinit'"#]].assert_eq(&err.message);
}

#[test]
fn parse_addr_and_set() {
    let node = parse_one("&foo");
    assert!(matches!(&node, Node::Addr(a) if a.name == "foo"));

    let node = parse_one("-> x");
    assert!(matches!(&node, Node::Set(s) if s.name == "x"));
}

#[test]
fn parse_include() {
    let node = parse_one(r#"include "std/io.cal""#);
    assert!(matches!(&node, Node::Include(i) if i.path == "std/io.cal"));
}

#[test]
fn parse_asm() {
    let node = parse_one(r#"asm "LIT 68" "LIT 18 DEO" end"#);
    let Node::Asm(node) = &node else {
        panic!("expected an asm block");
    };
    assert_eq!(node.code, "LIT 68\nLIT 18 DEO\n");

    let err = parse_source("asm 5 end").unwrap_err();
    expect![[r#"expected a string of assembly, got integer '5'"#]].assert_eq(&err.message);
}

#[test]
fn parse_version_and_feature_directives() {
    let node = parse_one("version not IO 1 2 end");
    let Node::Version(node) = &node else {
        panic!("expected a version block");
    };
    assert!(node.not);
    assert_eq!(node.feature, "IO");
    assert_eq!(node.body.len(), 2);

    assert!(matches!(parse_one("enable Heap"), Node::Enable(f) if f.feature == "Heap"));
    assert!(matches!(parse_one("requires IO"), Node::Requires(f) if f.feature == "IO"));
    assert!(matches!(parse_one("restrict 64Bit"), Node::Restrict(f) if f.feature == "64Bit"));
}

#[test]
fn parse_unexpected_token() {
    let err = parse_source("]").unwrap_err();
    expect![[r#"unexpected ']'"#]].assert_eq(&err.message);
}

#[test]
fn eof_reports_the_innermost_production() {
    let err = parse_source("func f begin 1").unwrap_err();
    expect![[r#"unexpected EOF while parsing function definition"#]].assert_eq(&err.message);

    let err = parse_source("func f begin if 1").unwrap_err();
    expect![[r#"unexpected EOF while parsing if"#]].assert_eq(&err.message);

    let err = parse_source("while 1 do").unwrap_err();
    expect![[r#"unexpected EOF while parsing while"#]].assert_eq(&err.message);

    let err = parse_source("[u8 1 2").unwrap_err();
    expect![[r#"unexpected EOF while parsing array"#]].assert_eq(&err.message);
}

#[test]
fn display_round_trips() {
    round_trip("func add u16 a u16 b begin a b end");
    round_trip("inline two begin 1 2 end");
    round_trip("if 1 then 2 elseif 3 then 4 else 5 end");
    round_trip("while x do x dec end");
    round_trip("struct Point u16 x u16 y end");
    round_trip("struct Entity : Point array 8 u8 tag end");
    round_trip("enum Color : u8 Red Green = 5 Blue end");
    round_trip("let array 4 u16 xs");
    round_trip("[c u8 1 2 3]");
    round_trip(r#"c"hi\n""#);
    round_trip("union Value u8 u16 end");
    round_trip("alias overwrite MyInt u16");
    round_trip("extern C cell write u16 u16 end");
    round_trip("implement Point init 0 end");
    round_trip("version not IO 1 2 end");
    round_trip(r#"asm "LIT 68" "LIT 18 DEO" end"#);
    round_trip(r#"include "std/io.cal""#);
    round_trip("-> x");
    round_trip("&foo");
    round_trip("const N 42");
}

#[test]
fn spans_point_at_the_statement_keyword() {
    let node = parse_one("  let u16 x");
    let span = node.span();
    assert_eq!(span.line, 1);
    assert_eq!(span.column, 3);
    assert_eq!(&*span.file, "test.cal");
}
