//! Callisto compiler driver.
//!
//! Usage:
//!   callisto-cli program.cal                 Compile to program.rom via uxnasm
//!   callisto-cli program.cal -o out.rom      Choose the output path
//!   callisto-cli -S program.cal              Stop after writing the assembly
//!   callisto-cli -k program.cal              Keep the intermediate assembly
//!
//! The driver owns everything the compiler library deliberately does not:
//! file I/O, include resolution, backend selection, diagnostic rendering and
//! running the backend's final commands (assembler, cleanup).

mod output;

use clap::Parser;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use lang::codegen::uxn::UxnBackend;
use lang::codegen::{Backend, Compiler};
use lang::error::CallistoError;
use lang::lexer::lex;
use lang::parser::ast::Node;
use lang::parser::parse;

use output::{report, OutputFormat};

/// Callisto compiler
#[derive(Parser, Debug)]
#[command(name = "callisto")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The source file to compile
    input: PathBuf,

    /// Output path (defaults to the input with the backend's extension)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Code-generation backend
    #[arg(short = 'b', long = "backend", default_value = "uxn")]
    backend: String,

    /// Keep the intermediate assembly file
    #[arg(short = 'k', long = "keep-asm")]
    keep_asm: bool,

    /// Stop after writing the assembly file
    #[arg(short = 'S', long = "no-assemble")]
    no_assemble: bool,

    /// Backend-specific option, may be repeated
    #[arg(long = "opt", value_name = "NAME")]
    opts: Vec<String>,

    /// Diagnostic output format
    #[arg(long = "format", value_enum, default_value = "text")]
    format: OutputFormat,
}

/// Source text of every loaded file, for quoting in diagnostics.
type SourceMap = HashMap<String, String>;

enum DriverError {
    Io(PathBuf, std::io::Error),
    Compile(CallistoError),
}

fn main() -> ExitCode {
    let args = Args::parse();

    let backend: Box<dyn Backend> = match args.backend.as_str() {
        "uxn" => Box::new(UxnBackend::new()),
        other => {
            eprintln!("error: unknown backend '{other}'");
            return ExitCode::from(1);
        }
    };

    let mut compiler = Compiler::new(backend);
    for opt in &args.opts {
        if !compiler.handle_option(opt) {
            eprintln!("error: unknown option '{opt}' for backend '{}'", args.backend);
            return ExitCode::from(1);
        }
    }

    let mut sources = SourceMap::new();
    let nodes = match load_program(&args.input, &mut sources) {
        Ok(nodes) => nodes,
        Err(DriverError::Io(path, err)) => {
            eprintln!("error: cannot read {}: {err}", path.display());
            return ExitCode::from(1);
        }
        Err(DriverError::Compile(err)) => {
            report(&err, &sources, args.format);
            return ExitCode::from(2);
        }
    };

    let asm = match compiler.compile(nodes) {
        Ok(asm) => asm,
        Err(err) => {
            report(&CallistoError::from(err), &sources, args.format);
            return ExitCode::from(2);
        }
    };

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("rom"));
    let asm_path = output_path.with_extension("tal");

    let header = compiler.default_header();
    if let Err(err) = std::fs::write(&asm_path, format!("{header}{asm}")) {
        eprintln!("error: cannot write {}: {err}", asm_path.display());
        return ExitCode::from(1);
    }

    if args.no_assemble {
        println!("Wrote {}", asm_path.display());
        return ExitCode::SUCCESS;
    }

    for command in compiler.final_commands(&asm_path, &output_path) {
        if command.cleanup && args.keep_asm {
            continue;
        }
        match Command::new(&command.program).args(&command.args).status() {
            Ok(status) if status.success() => {}
            Ok(status) => {
                eprintln!("error: {} exited with {status}", command.program);
                return ExitCode::from(3);
            }
            Err(err) => {
                eprintln!("error: failed to run {}: {err}", command.program);
                return ExitCode::from(3);
            }
        }
    }

    println!("Compiled to: {}", output_path.display());
    ExitCode::SUCCESS
}

/// Load, lex and parse the entry file and splice in every include.
fn load_program(path: &Path, sources: &mut SourceMap) -> Result<Vec<Node>, DriverError> {
    let mut included = HashSet::new();
    load_file(path, sources, &mut included)
}

fn load_file(
    path: &Path,
    sources: &mut SourceMap,
    included: &mut HashSet<PathBuf>,
) -> Result<Vec<Node>, DriverError> {
    // A file contributes its definitions once, however often it is included.
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !included.insert(canonical) {
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(path)
        .map_err(|err| DriverError::Io(path.to_path_buf(), err))?;
    let name = path.display().to_string();
    sources.insert(name.clone(), text.clone());

    let tokens = lex(&text, &name).map_err(|err| DriverError::Compile(err.into()))?;
    let nodes = parse(tokens).map_err(|err| DriverError::Compile(err.into()))?;

    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    resolve_includes(nodes, &base, sources, included)
}

/// Replace every top-level `include` with the parsed roots of its target,
/// resolved relative to the including file.
fn resolve_includes(
    nodes: Vec<Node>,
    base: &Path,
    sources: &mut SourceMap,
    included: &mut HashSet<PathBuf>,
) -> Result<Vec<Node>, DriverError> {
    let mut resolved = Vec::new();
    for node in nodes {
        if let Node::Include(include) = node {
            let target = base.join(&include.path);
            resolved.extend(load_file(&target, sources, included)?);
        } else {
            resolved.push(node);
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_args_defaults() {
        let args = Args::try_parse_from(["callisto", "prog.cal"]).unwrap();
        assert_eq!(args.input, PathBuf::from("prog.cal"));
        assert_eq!(args.backend, "uxn");
        assert!(!args.keep_asm);
        assert!(!args.no_assemble);
        assert!(args.output.is_none());
        assert!(args.opts.is_empty());
        assert_eq!(args.format, OutputFormat::Text);
    }

    #[test]
    fn parse_args_output_and_backend() {
        let args =
            Args::try_parse_from(["callisto", "-o", "out.rom", "-b", "uxn", "prog.cal"]).unwrap();
        assert_eq!(args.output, Some(PathBuf::from("out.rom")));
        assert_eq!(args.backend, "uxn");
    }

    #[test]
    fn parse_args_flags() {
        let args = Args::try_parse_from(["callisto", "-S", "-k", "prog.cal"]).unwrap();
        assert!(args.no_assemble);
        assert!(args.keep_asm);
    }

    #[test]
    fn parse_args_repeated_opts() {
        let args =
            Args::try_parse_from(["callisto", "--opt", "a", "--opt", "b", "prog.cal"]).unwrap();
        assert_eq!(args.opts, vec!["a", "b"]);
    }

    #[test]
    fn parse_args_json_format() {
        let args = Args::try_parse_from(["callisto", "--format", "json", "prog.cal"]).unwrap();
        assert_eq!(args.format, OutputFormat::Json);
    }
}
