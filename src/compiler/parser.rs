//! Syntax Analysis
//!
//! Compiler pass that parses a stream of tokens into an untyped parse tree.

pub mod syntax;

use std::iter::Peekable;

use crate::compiler::Result;
use crate::compiler::lexer::{Keyword, OperatorKind, Token, TokenKind};
use crate::error::Position;
use syntax::{
    Assign, ArrayDecl, Call, Decl, Designator, Expr, For, FuncDefn, If, Param, Program, Stmt,
    VarDecl,
};

/// Parses a parse tree from the provided token sequence.
///
/// # Errors
///
/// Returns an error on the first token that violates the grammar.
pub fn parse_program(tokens: Vec<Token>) -> Result<Program> {
    let mut iter = tokens.into_iter().peekable();

    let mut decls = vec![];

    while iter.peek().is_some() {
        decls.push(parse_decl(&mut iter)?);
    }

    Ok(Program { decls })
}

/// Parses a top-level declaration from the provided token iterator.
fn parse_decl<I: Iterator<Item = Token>>(iter: &mut Peekable<I>) -> Result<Decl> {
    if let Some(token) = iter.peek() {
        if token.kind == TokenKind::Keyword(Keyword::Func) {
            return Ok(Decl::Func(parse_func_defn(iter)?));
        }
    }

    // `varDecl` and `arrayDecl` both begin `type Ident`; the token after the
    // name disambiguates.
    let (ty, pos) = parse_ident(iter)?;
    let (name, _) = parse_ident(iter)?;

    match iter.peek().map(|t| &t.kind) {
        Some(TokenKind::BracketOpen) => {
            let _ = iter.next();

            let extent = match iter.next() {
                Some(Token {
                    kind: TokenKind::Integer(value),
                    ..
                }) => value,
                Some(token) => {
                    return Err(err_at(
                        token.pos,
                        format!("expected array extent, found {}", token.kind),
                    ));
                }
                None => return Err(err_eof("array extent")),
            };

            expect_token(iter, TokenKind::BracketClose)?;
            expect_token(iter, TokenKind::Semicolon)?;

            Ok(Decl::Array(ArrayDecl {
                ty,
                name,
                extent,
                pos,
            }))
        }
        _ => {
            expect_token(iter, TokenKind::Semicolon)?;
            Ok(Decl::Var(VarDecl { ty, name, pos }))
        }
    }
}

/// Parses a function definition from the provided token iterator.
fn parse_func_defn<I: Iterator<Item = Token>>(iter: &mut Peekable<I>) -> Result<FuncDefn> {
    let func = expect_token(iter, TokenKind::Keyword(Keyword::Func))?;

    let (ret_ty, _) = parse_ident(iter)?;
    let (name, _) = parse_ident(iter)?;

    expect_token(iter, TokenKind::ParenOpen)?;

    let mut params = vec![];

    if !peek_is(iter, &TokenKind::ParenClose) {
        loop {
            let (ty, pos) = parse_ident(iter)?;
            let (name, _) = parse_ident(iter)?;
            params.push(Param { ty, name, pos });

            if !peek_is(iter, &TokenKind::Comma) {
                break;
            }
            let _ = iter.next();
        }
    }

    expect_token(iter, TokenKind::ParenClose)?;

    let body = parse_stmt_block(iter)?;

    Ok(FuncDefn {
        ret_ty,
        name,
        params,
        body,
        pos: func.pos,
    })
}

/// Parses a statement block from the provided token iterator.
///
/// A block is either braced (`'{' stmt* '}'`) or, permissively, a single
/// statement folded into a one-element block.
fn parse_stmt_block<I: Iterator<Item = Token>>(iter: &mut Peekable<I>) -> Result<Vec<Stmt>> {
    if !peek_is(iter, &TokenKind::BraceOpen) {
        return Ok(vec![parse_stmt(iter)?]);
    }

    let _ = iter.next();

    let mut stmts = vec![];

    while let Some(token) = iter.peek() {
        if token.kind == TokenKind::BraceClose {
            break;
        }

        stmts.push(parse_stmt(iter)?);
    }

    expect_token(iter, TokenKind::BraceClose)?;

    Ok(stmts)
}

/// Parses a statement from the provided token iterator.
fn parse_stmt<I: Iterator<Item = Token>>(iter: &mut Peekable<I>) -> Result<Stmt> {
    let Some(token) = iter.peek() else {
        return Err(err_eof("statement"));
    };

    match token.kind {
        TokenKind::Keyword(Keyword::If) => {
            // Consume the "if" token.
            let pos = iter.next().expect("peeked token should be present").pos;

            let cond = parse_expr0(iter)?;
            let then_block = parse_stmt_block(iter)?;

            let mut else_block = None;

            if peek_is(iter, &TokenKind::Keyword(Keyword::Else)) {
                let _ = iter.next();
                else_block = Some(parse_stmt_block(iter)?);
            }

            Ok(Stmt::If(If {
                cond,
                then_block,
                else_block,
                pos,
            }))
        }
        TokenKind::Keyword(Keyword::For) => {
            // Consume the "for" token.
            let pos = iter.next().expect("peeked token should be present").pos;

            expect_token(iter, TokenKind::ParenOpen)?;

            let init = parse_assign(iter)?;
            expect_token(iter, TokenKind::Semicolon)?;

            let cond = parse_expr0(iter)?;
            expect_token(iter, TokenKind::Semicolon)?;

            let incr = parse_assign(iter)?;

            // A trailing semicolon after the increment is tolerated.
            if peek_is(iter, &TokenKind::Semicolon) {
                let _ = iter.next();
            }

            expect_token(iter, TokenKind::ParenClose)?;

            let body = parse_stmt_block(iter)?;

            Ok(Stmt::For(For {
                init,
                cond,
                incr,
                body,
                pos,
            }))
        }
        TokenKind::Keyword(Keyword::Break) => {
            // Consume the "break" token.
            let pos = iter.next().expect("peeked token should be present").pos;
            expect_token(iter, TokenKind::Semicolon)?;

            Ok(Stmt::Break(pos))
        }
        TokenKind::Keyword(Keyword::Return) => {
            // Consume the "return" token.
            let pos = iter.next().expect("peeked token should be present").pos;

            // A bare `return;` parses here and is rejected by the type
            // checker, never the parser.
            let mut value = None;
            if !peek_is(iter, &TokenKind::Semicolon) {
                value = Some(parse_expr0(iter)?);
            }

            expect_token(iter, TokenKind::Semicolon)?;

            Ok(Stmt::Return { value, pos })
        }
        TokenKind::Ident(_) => {
            let (name, pos) = parse_ident(iter)?;

            match iter.peek().map(|t| &t.kind) {
                // `type Ident ';'`
                Some(TokenKind::Ident(_)) => {
                    let (var_name, _) = parse_ident(iter)?;
                    expect_token(iter, TokenKind::Semicolon)?;

                    Ok(Stmt::VarDecl(VarDecl {
                        ty: name,
                        name: var_name,
                        pos,
                    }))
                }
                // `Ident '(' exprList ')' ';'`
                Some(TokenKind::ParenOpen) => {
                    let call = parse_call_rest(iter, name, pos)?;
                    expect_token(iter, TokenKind::Semicolon)?;

                    Ok(Stmt::Call(call))
                }
                // `designator '=' expr0 ';'`
                _ => {
                    let target = parse_designator_rest(iter, name, pos)?;

                    expect_token(iter, TokenKind::Operator(OperatorKind::Assign))?;
                    let value = parse_expr0(iter)?;
                    expect_token(iter, TokenKind::Semicolon)?;

                    Ok(Stmt::Assign(Assign { target, value, pos }))
                }
            }
        }
        _ => Err(err_at(
            token.pos,
            format!("expected statement, found {}", token.kind),
        )),
    }
}

/// Parses an assignment without its terminating semicolon from the provided
/// token iterator.
fn parse_assign<I: Iterator<Item = Token>>(iter: &mut Peekable<I>) -> Result<Assign> {
    let (name, pos) = parse_ident(iter)?;
    let target = parse_designator_rest(iter, name, pos)?;

    expect_token(iter, TokenKind::Operator(OperatorKind::Assign))?;
    let value = parse_expr0(iter)?;

    Ok(Assign { target, value, pos })
}

/// Parses the optional index of a designator whose name has already been
/// consumed.
fn parse_designator_rest<I: Iterator<Item = Token>>(
    iter: &mut Peekable<I>,
    name: String,
    pos: Position,
) -> Result<Designator> {
    let mut index = None;

    if peek_is(iter, &TokenKind::BracketOpen) {
        let _ = iter.next();
        index = Some(Box::new(parse_expr0(iter)?));
        expect_token(iter, TokenKind::BracketClose)?;
    }

    Ok(Designator { name, index, pos })
}

/// Parses the argument list of a call whose callee has already been consumed.
fn parse_call_rest<I: Iterator<Item = Token>>(
    iter: &mut Peekable<I>,
    callee: String,
    pos: Position,
) -> Result<Call> {
    expect_token(iter, TokenKind::ParenOpen)?;

    let mut args = vec![];

    if !peek_is(iter, &TokenKind::ParenClose) {
        loop {
            args.push(parse_expr0(iter)?);

            if !peek_is(iter, &TokenKind::Comma) {
                break;
            }
            let _ = iter.next();
        }
    }

    expect_token(iter, TokenKind::ParenClose)?;

    Ok(Call { callee, args, pos })
}

/// Parses an `expr0`: a comparison chain of at most one comparison
/// (`op0` is non-associative).
fn parse_expr0<I: Iterator<Item = Token>>(iter: &mut Peekable<I>) -> Result<Expr> {
    let lhs = parse_expr1(iter)?;

    let op = match iter.peek().map(|t| &t.kind) {
        Some(TokenKind::Operator(op)) if is_op0(*op) => *op,
        _ => return Ok(lhs),
    };

    let pos = iter.next().expect("peeked token should be present").pos;
    let rhs = parse_expr1(iter)?;

    Ok(Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        pos,
    })
}

/// Parses an `expr1`: left-associative `+`, `-`, and `||`.
fn parse_expr1<I: Iterator<Item = Token>>(iter: &mut Peekable<I>) -> Result<Expr> {
    let mut expr = parse_expr2(iter)?;

    loop {
        let op = match iter.peek().map(|t| &t.kind) {
            Some(TokenKind::Operator(op)) if is_op1(*op) => *op,
            _ => return Ok(expr),
        };

        let pos = iter.next().expect("peeked token should be present").pos;
        let rhs = parse_expr2(iter)?;

        expr = Expr::Binary {
            op,
            lhs: Box::new(expr),
            rhs: Box::new(rhs),
            pos,
        };
    }
}

/// Parses an `expr2`: left-associative `*`, `/`, and `&&`.
fn parse_expr2<I: Iterator<Item = Token>>(iter: &mut Peekable<I>) -> Result<Expr> {
    let mut expr = parse_expr3(iter)?;

    loop {
        let op = match iter.peek().map(|t| &t.kind) {
            Some(TokenKind::Operator(op)) if is_op2(*op) => *op,
            _ => return Ok(expr),
        };

        let pos = iter.next().expect("peeked token should be present").pos;
        let rhs = parse_expr3(iter)?;

        expr = Expr::Binary {
            op,
            lhs: Box::new(expr),
            rhs: Box::new(rhs),
            pos,
        };
    }
}

/// Parses an `expr3`: logical negation, parenthesized expression, designator,
/// call, or literal.
fn parse_expr3<I: Iterator<Item = Token>>(iter: &mut Peekable<I>) -> Result<Expr> {
    let Some(token) = iter.peek() else {
        return Err(err_eof("expression"));
    };

    match &token.kind {
        TokenKind::Operator(OperatorKind::LogNot) => {
            // Consume the "!" token.
            let pos = iter.next().expect("peeked token should be present").pos;
            let operand = parse_expr3(iter)?;

            Ok(Expr::Unary {
                op: OperatorKind::LogNot,
                operand: Box::new(operand),
                pos,
            })
        }
        TokenKind::ParenOpen => {
            let _ = iter.next();
            let expr = parse_expr0(iter)?;
            expect_token(iter, TokenKind::ParenClose)?;

            Ok(expr)
        }
        TokenKind::Integer(_) => {
            let token = iter.next().expect("peeked token should be present");
            let TokenKind::Integer(value) = token.kind else {
                unreachable!("peeked token should be an integer");
            };

            Ok(Expr::Integer {
                value,
                pos: token.pos,
            })
        }
        TokenKind::Keyword(Keyword::True) => {
            let pos = iter.next().expect("peeked token should be present").pos;
            Ok(Expr::Bool { value: true, pos })
        }
        TokenKind::Keyword(Keyword::False) => {
            let pos = iter.next().expect("peeked token should be present").pos;
            Ok(Expr::Bool { value: false, pos })
        }
        TokenKind::Ident(_) => {
            let (name, pos) = parse_ident(iter)?;

            // An identifier followed by `(` is a call, otherwise a designator.
            if peek_is(iter, &TokenKind::ParenOpen) {
                Ok(Expr::Call(parse_call_rest(iter, name, pos)?))
            } else {
                Ok(Expr::Designator(parse_designator_rest(iter, name, pos)?))
            }
        }
        kind => Err(err_at(
            token.pos,
            format!("expected expression, found {kind}"),
        )),
    }
}

/// Parses an identifier from the provided token iterator, returning its
/// spelling and position.
fn parse_ident<I: Iterator<Item = Token>>(iter: &mut Peekable<I>) -> Result<(String, Position)> {
    match iter.next() {
        Some(Token {
            kind: TokenKind::Ident(ident),
            pos,
        }) => Ok((ident, pos)),
        Some(token) => Err(err_at(
            token.pos,
            format!("expected identifier, found {}", token.kind),
        )),
        None => Err(err_eof("identifier")),
    }
}

/// Consumes the next token, which must match `expected`.
fn expect_token<I: Iterator<Item = Token>>(
    iter: &mut Peekable<I>,
    expected: TokenKind,
) -> Result<Token> {
    match iter.next() {
        Some(token) if token.kind == expected => Ok(token),
        Some(token) => Err(err_at(
            token.pos,
            format!("expected {expected}, found {}", token.kind),
        )),
        None => Err(err_eof(&format!("{expected}"))),
    }
}

#[inline]
fn peek_is<I: Iterator<Item = Token>>(iter: &mut Peekable<I>, kind: &TokenKind) -> bool {
    iter.peek().is_some_and(|t| t.kind == *kind)
}

fn is_op0(op: OperatorKind) -> bool {
    matches!(
        op,
        OperatorKind::GreaterEqual
            | OperatorKind::LessEqual
            | OperatorKind::NotEqual
            | OperatorKind::Equal
            | OperatorKind::Greater
            | OperatorKind::Less
    )
}

fn is_op1(op: OperatorKind) -> bool {
    matches!(
        op,
        OperatorKind::Add | OperatorKind::Sub | OperatorKind::LogOr
    )
}

fn is_op2(op: OperatorKind) -> bool {
    matches!(
        op,
        OperatorKind::Mul | OperatorKind::Div | OperatorKind::LogAnd
    )
}

fn err_at(pos: Position, msg: String) -> String {
    format!("line {}: {msg}", pos.line)
}

fn err_eof(expected: &str) -> String {
    format!("expected {expected} at end of input")
}
