//! Binary entry point of the Crux compiler.

use std::path::Path;
use std::process;

use clap::{Arg, Command};

use cruxc::compiler::driver::{self, Context};

fn main() {
    let matches = Command::new("cruxc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Compiler for the Crux programming language")
        .arg_required_else_help(true)
        .arg(
            Arg::new("input")
                .help("Input Crux source file")
                .value_name("file")
                .required(true),
        )
        .arg(
            Arg::new("stage")
                .short('s')
                .long("stage")
                .value_name("stage")
                .value_parser(["lex", "parse", "ast", "ir", "asm"])
                .help("Stop after the specified compilation phase and print its artifact"),
        )
        .get_matches();

    let input = matches
        .get_one::<String>("input")
        .expect("input file is required");
    let stage = matches.get_one::<String>("stage").map(String::as_str);

    let ctx = Context {
        program: "cruxc",
        in_path: Path::new(input),
    };

    if let Err(err) = driver::run_compiler(&ctx, stage) {
        eprintln!("{err}");
        process::exit(1);
    }
}
