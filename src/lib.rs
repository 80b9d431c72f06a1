//! Crux Compiler (cruxc).
//!
//! Compiles Crux source text into _x86-64_ assembly (AT&T syntax, System-V
//! AMD64 ABI). The pipeline runs leaves-first:
//! - `lexer` tokenizes the source bytes.
//! - `parser` builds an untyped parse tree from the token stream.
//! - `sema` folds the parse tree into an AST with resolved symbols.
//! - `type_check` attaches a type to every expression node.
//! - `irgen` lowers the typed AST into a per-function control-flow graph.
//! - `codegen` linearises each graph into textual assembly.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod compiler;
pub mod error;

pub use error::{Diagnostic, Position};

/// Runs the front end (lex, parse, AST build, type check) over `src`,
/// returning every diagnostic collected. An empty vector means the program is
/// well-typed and ready for lowering.
///
/// # Errors
///
/// Returns an error if the source fails to tokenize or parse.
pub fn check(src: &[u8]) -> compiler::Result<Vec<Diagnostic>> {
    let tokens = compiler::lexer::Lexer::new(src).lex()?;
    let program = compiler::parser::parse_program(tokens)?;

    let (ast, symbols, mut diagnostics) = compiler::sema::build_ast(&program);
    let (_, type_errors) = compiler::type_check::check(&ast, &symbols);
    diagnostics.extend(type_errors);

    Ok(diagnostics)
}

/// Compiles `src` into _x86-64_ assembly, returning the assembly text.
///
/// # Errors
///
/// Returns an error if the source fails to tokenize or parse, or if any
/// diagnostic was collected (the error message contains every diagnostic,
/// one per line).
pub fn generate_assembly(src: &[u8]) -> compiler::Result<String> {
    let tokens = compiler::lexer::Lexer::new(src).lex()?;
    let program = compiler::parser::parse_program(tokens)?;

    let (ast, symbols, mut diagnostics) = compiler::sema::build_ast(&program);
    let (_, type_errors) = compiler::type_check::check(&ast, &symbols);
    diagnostics.extend(type_errors);

    if !diagnostics.is_empty() {
        let report: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
        return Err(report.join("\n"));
    }

    let ir = compiler::irgen::lower(&ast, &symbols);

    let mut asm = Vec::new();
    compiler::codegen::generate(&ir, &symbols, &mut asm)
        .map_err(|err| format!("failed to emit assembly: {err}"))?;

    String::from_utf8(asm).map_err(|err| format!("emitted assembly is not UTF-8: {err}"))
}
