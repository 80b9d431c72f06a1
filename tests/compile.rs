//! End-to-end pipeline tests: drive the public API over complete Crux
//! programs and check the collected diagnostics or the emitted assembly.

use cruxc::{check, generate_assembly, Diagnostic};

fn assemble(src: &[u8]) -> String {
    generate_assembly(src).expect("program should compile")
}

#[test]
fn compile_arithmetic_program() {
    let asm = assemble(b"func void main() { printInt(1 + 2 * 3); }");

    assert!(asm.contains("\t.globl main"));
    assert!(asm.contains("main:"));
    assert!(asm.contains("\timulq"));
    assert!(asm.contains("\taddq"));
    assert!(asm.contains("\tcall printInt"));
    // The built-ins stay unresolved externals; nothing defines them here.
    assert!(!asm.contains("printInt:"));
}

#[test]
fn compile_global_variable_program() {
    let asm = assemble(b"int g; func void main() { g = 41; g = g + 1; printInt(g); }");

    assert!(asm.contains("\t.comm g, 8, 8"));
    assert!(asm.contains("\tmovq g@GOTPCREL(%rip), %r11"));
    assert!(asm.contains("\tmovq $41, "));
}

#[test]
fn compile_array_loop_program() {
    let asm = assemble(
        b"int a[5];
          func void main() {
            int i;
            for (i = 0; i < 5; i = i + 1;) a[i] = i * i;
            printInt(a[3]);
          }",
    );

    assert!(asm.contains("\t.comm a, 40, 8"));
    assert!(asm.contains("\timulq $8, %r10"));
    // The loop produces a conditional branch and a back-edge jump.
    assert!(asm.contains("\tje .L"));
    assert!(asm.contains("\tjmp .L"));
}

#[test]
fn compile_recursive_function_program() {
    let asm = assemble(
        b"func int f(int x) {
            if x == 0 { return 1; } else { return x * f(x - 1); }
          }
          func void main() { printInt(f(5)); }",
    );

    assert!(asm.contains("\t.globl f"));
    assert!(asm.contains("\tcall f"));
    // The parameter arrives in %rdi and is spilled into the frame.
    assert!(asm.contains("\tmovq %rdi, -8(%rbp)"));
}

#[test]
fn compile_short_circuit_still_requires_resolution() {
    // Even though `crash` would never run, the reference must resolve;
    // no assembly is produced.
    let src = b"func void main() { bool t; t = true || crash(); }";

    let diagnostics = check(src).expect("program should lex and parse");
    assert!(diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::ResolveSymbol { name, .. } if name == "crash"
    )));

    let err = generate_assembly(src).expect_err("ill-formed program should not compile");
    assert!(err.contains("ResolveSymbolError(line: 1)[Could not find crash.]"));
}

#[test]
fn compile_invalid_main_reports_three_errors() {
    let diagnostics =
        check(b"func int main(int x) { return; }").expect("program should lex and parse");

    let messages: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
    assert_eq!(
        messages,
        vec![
            "TypeError(line: 1)[Main function must have type void]",
            "TypeError(line: 1)[Main function cannot have arguments]",
            "TypeError(line: 1)[Return expression type does not match function return type]",
        ]
    );
}

#[test]
fn compile_collects_errors_across_declarations() {
    let diagnostics = check(
        b"int g;
          int g;
          func void main() {
            h = 1;
            break;
          }",
    )
    .expect("program should lex and parse");

    assert_eq!(diagnostics.len(), 3);
    assert!(matches!(&diagnostics[0], Diagnostic::Declaration { name, .. } if name == "g"));
    assert!(matches!(&diagnostics[1], Diagnostic::ResolveSymbol { name, .. } if name == "h"));
    assert!(matches!(&diagnostics[2], Diagnostic::Type { msg, .. } if msg == "Invalid use of break"));
}

#[test]
fn compile_well_typed_program_has_no_diagnostics() {
    let diagnostics = check(
        b"bool flag;
          func bool toggle() { flag = !flag; return flag; }
          func void main() {
            flag = false;
            printBool(toggle() && toggle());
            println();
          }",
    )
    .expect("program should lex and parse");

    assert!(diagnostics.is_empty(), "unexpected: {diagnostics:?}");
}

#[test]
fn compile_every_function_body_ends_in_ret() {
    let asm = assemble(
        b"func int f() { return 1; }
          func int g() { return 2; }
          func void main() { printInt(f() + g()); }",
    );

    // Three functions, each with at least one epilogue.
    let rets = asm.matches("\tleave\n\tret").count();
    assert!(rets >= 3, "expected one epilogue per function:\n{asm}");
}

#[test]
fn compile_seven_argument_call_keeps_alignment() {
    let asm = assemble(
        b"func int sum(int a, int b, int c, int d, int e, int f, int g) {
            return a + b + c + d + e + f + g;
          }
          func void main() { printInt(sum(1, 2, 3, 4, 5, 6, 7)); }",
    );

    // One stack argument plus padding: 16 bytes pushed and popped.
    assert!(asm.contains("\tpushq $0"));
    assert!(asm.contains("\taddq $16, %rsp"));
    // The seventh parameter is read from above the caller's frame.
    assert!(asm.contains("\tmovq 16(%rbp), %r10"));
}

#[test]
fn compile_rejects_syntax_error() {
    let err = generate_assembly(b"func void main() { x = ; }")
        .expect_err("missing expression should fail");
    assert!(err.contains("expected expression"));
}

#[test]
fn compile_rejects_lexical_error() {
    let err = generate_assembly(b"func void main() { x = 1 $ 2; }")
        .expect_err("invalid character should fail");
    assert!(err.contains("invalid character"));
}
