//! Compiler driver that orchestrates the multi-stage process of compiling a
//! Crux source file into assembly code.

use std::fs;
use std::io;
use std::path::Path;

use crate::compiler::{codegen, irgen, lexer, parser, sema, type_check, Result};
use crate::fmt_err;

/// Name of the output assembly file, written into the current directory.
pub const OUTPUT_FILE: &str = "a.s";

/// Information about the current program context.
#[derive(Debug)]
pub struct Context<'a> {
    /// Name of the program (for error reporting).
    pub program: &'a str,
    /// Path of the input Crux file.
    pub in_path: &'a Path,
}

/// Executes the compilation pipeline for processing a Crux source file.
///
/// With a `stage`, prints that stage's artifact to stdout and stops;
/// otherwise full compilation writes [`OUTPUT_FILE`]. The output file is
/// only created once code generation starts, so no partial artifact is left
/// behind on error.
///
/// # Errors
///
/// Returns an error if the input file cannot be read, if it fails to
/// tokenize or parse, or if any diagnostic was collected (the error message
/// carries every diagnostic, one per line).
pub fn run_compiler(ctx: &Context<'_>, stage: Option<&str>) -> Result<()> {
    let src = fs::read(ctx.in_path).map_err(|err| {
        fmt_err!(
            ctx.program,
            "failed to read input file '{}': {err}",
            ctx.in_path.display()
        )
    })?;

    let tokens = lexer::Lexer::new(&src)
        .lex()
        .map_err(|err| fmt_err!(ctx.program, "{}: {err}", ctx.in_path.display()))?;

    if stage == Some("lex") {
        for token in &tokens {
            println!("{token:?}");
        }
        return Ok(());
    }

    let tree = parser::parse_program(tokens)
        .map_err(|err| fmt_err!(ctx.program, "{}: {err}", ctx.in_path.display()))?;

    if stage == Some("parse") {
        println!("{tree:#?}");
        return Ok(());
    }

    let (ast, symbols, mut diagnostics) = sema::build_ast(&tree);

    if stage == Some("ast") {
        println!("{ast:#?}");
        return Ok(());
    }

    let (_, type_errors) = type_check::check(&ast, &symbols);
    diagnostics.extend(type_errors);

    // Any collected diagnostic aborts the pipeline before IR lowering; the
    // later passes assume a well-typed program.
    if !diagnostics.is_empty() {
        let report: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
        return Err(report.join("\n"));
    }

    let ir = irgen::lower(&ast, &symbols);

    if stage == Some("ir") {
        print!("{}", ir.display(&symbols));
        return Ok(());
    }

    if stage == Some("asm") {
        return codegen::generate(&ir, &symbols, io::stdout().lock())
            .map_err(|err| fmt_err!(ctx.program, "failed to emit assembly: {err}"));
    }

    let out = fs::File::create(OUTPUT_FILE).map_err(|err| {
        fmt_err!(
            ctx.program,
            "failed to create output file '{OUTPUT_FILE}': {err}"
        )
    })?;

    codegen::generate(&ir, &symbols, out)
        .map_err(|err| fmt_err!(ctx.program, "failed to emit assembly: {err}"))
}
