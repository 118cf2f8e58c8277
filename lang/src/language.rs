//! Language-wide policy: names the compiler reserves and the standard
//! feature tags a backend may declare.

/// Words that may not be used as function or variable names. The control
/// verbs resolve to dedicated lowering operations; the rest are statement
/// keywords the parser claims.
pub const RESERVED_WORDS: &[&str] = &[
    "func", "inline", "raw", "begin", "end", "include", "asm", "if", "then", "elseif", "else",
    "while", "do", "let", "array", "enable", "requires", "struct", "version", "not", "const",
    "enum", "restrict", "union", "alias", "overwrite", "extern", "C", "implement", "->", "return",
    "break", "continue", "call",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

/// Feature tags with a fixed meaning across targets, consulted by `version`,
/// `enable`, `requires` and `restrict` blocks. Backends may declare further
/// target-specific tags.
pub const STANDARD_FEATURES: &[&str] = &[
    "IO",
    "Exit",
    "Args",
    "Time",
    "Heap",
    "File",
    "16Bit",
    "32Bit",
    "64Bit",
    "BigEndian",
    "LittleEndian",
    "UXN",
];

pub fn is_standard_feature(name: &str) -> bool {
    STANDARD_FEATURES.contains(&name)
}
