// Property tests over the compiler pipeline
//
// Programs are generated from the grammar with bound variables tracked, so
// every reference resolves and the invariants below have to hold for any
// draw: pretty-printing round-trips through the tokenizer, resolution
// leaves no symbolic reference behind, and every hop count agrees with an
// independent forward replay of the scopes.

use lolc::core::{Ast, Source, Token, TokenKind};
use lolc::rpn::{Ins, Rpn};
use lolc::{compiler, parser, resolve, rpn, tokenizer};
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;

#[derive(Clone, Debug)]
struct Program(String);

const NAMES: [&str; 3] = ["a", "b", "c"];

fn leaf(g: &mut Gen, scope: &[String]) -> String {
    match *g.choose(&[0, 1, 2]).unwrap() {
        0 if !scope.is_empty() => {
            g.choose(scope).unwrap().clone()
        }
        1 => String::from(*g.choose(&["\"lit\"", "\"\"", "\"two words\""]).unwrap()),
        _ => format!("{}", i64::from(i8::arbitrary(g))),
    }
}

fn expr(g: &mut Gen, scope: &mut Vec<String>, depth: u32) -> String {
    if depth == 0 {
        return leaf(g, scope);
    }
    match *g.choose(&[0, 1, 2, 3, 4]).unwrap() {
        0 => leaf(g, scope),
        1 => {
            let op = g.choose(&["+", "-", "=", "<", "or", "and"]).unwrap();
            format!(
                "({} {} {})",
                op,
                expr(g, scope, depth - 1),
                expr(g, scope, depth - 1)
            )
        }
        2 => format!(
            "(if {} {} {})",
            expr(g, scope, depth - 1),
            expr(g, scope, depth - 1),
            expr(g, scope, depth - 1)
        ),
        3 => {
            let name = g.choose(&NAMES).unwrap().to_string();
            let value = expr(g, scope, depth - 1);
            scope.push(name.clone());
            let body = expr(g, scope, depth - 1);
            scope.pop();
            format!("(let ({} {}) {})", name, value, body)
        }
        _ => {
            let name = g.choose(&NAMES).unwrap().to_string();
            let arg = expr(g, scope, depth - 1);
            scope.push(name.clone());
            let body = expr(g, scope, depth - 1);
            scope.pop();
            format!("((lambda ({}) {}) {})", name, body, arg)
        }
    }
}

impl Arbitrary for Program {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut scope = vec![String::from("x")];
        let body = expr(g, &mut scope, 3);
        Program(format!("(lambda (x) {})", body))
    }
}

fn pipeline(program: &str) -> (Source, Rpn) {
    let source = Source::new(program);
    let tokens = tokenizer::tokenize(&source).expect("tokenize failed");
    let mut ast = Ast::default();
    let root = parser::parse(&tokens, &mut ast).expect("parse failed");
    let mut out = rpn::lower(&source, &ast, root).expect("lowering failed");
    resolve::resolve(&source, &mut out);
    (source, out)
}

// kind plus lexeme, which is what must survive a pretty-print round trip
fn lexemes(source: &Source, tokens: &[Token]) -> Vec<(TokenKind, String)> {
    tokens
        .iter()
        .map(|t| {
            let text = match t.kind {
                TokenKind::Symbol => source.symbol_at(t.index).to_string(),
                TokenKind::Str => source.string_at(t.index).to_string(),
                _ => String::new(),
            };
            (t.kind, text)
        })
        .collect()
}

#[quickcheck]
fn tokenizing_is_deterministic(text: String) -> bool {
    let source = Source::new(text);
    let a = tokenizer::tokenize(&source);
    let b = tokenizer::tokenize(&source);
    format!("{:?}", a) == format!("{:?}", b)
}

#[quickcheck]
fn pretty_print_round_trips(program: Program) -> bool {
    let source = Source::new(program.0);
    let tokens = tokenizer::tokenize(&source).unwrap();
    let mut ast = Ast::default();
    let root = parser::parse(&tokens, &mut ast).unwrap();

    let printed = ast.pretty(&source, root);
    let reprinted = Source::new(printed);
    let retokens = tokenizer::tokenize(&reprinted).unwrap();

    lexemes(&source, &tokens) == lexemes(&reprinted, &retokens)
}

#[quickcheck]
fn resolution_leaves_no_symbolic_locals(program: Program) -> bool {
    let (source, out) = pipeline(&program.0);
    out.ins.iter().all(|ins| match ins {
        Ins::Get { name } | Ins::Set { name } => {
            compiler::builtin(source.symbol_at(*name)).is_some()
        }
        Ins::GetCaptured { .. } | Ins::SetCaptured { .. } => false,
        _ => true,
    })
}

// Replay the scopes forward, pushing names where the resolved program
// binds, and check every hop count lands on the right name. The resolver
// itself scans backward, so this is an independent derivation.
#[quickcheck]
fn hops_agree_with_a_forward_replay(program: Program) -> bool {
    let source = Source::new(program.0.clone());
    let tokens = tokenizer::tokenize(&source).unwrap();
    let mut ast = Ast::default();
    let root = parser::parse(&tokens, &mut ast).unwrap();
    let named = rpn::lower(&source, &ast, root).unwrap();
    let mut resolved = rpn::lower(&source, &ast, root).unwrap();
    resolve::resolve(&source, &mut resolved);

    let mut locals: Vec<String> = Vec::new();
    let mut captured: Vec<String> = Vec::new();
    let mut checkpoints: Vec<(usize, usize)> = Vec::new();

    for (i, ins) in resolved.ins.iter().enumerate() {
        let was = named.ins[i];
        match *ins {
            Ins::ScopeBegin { .. } => checkpoints.push((locals.len(), captured.len())),
            Ins::ScopeEnd { .. } => {
                let (l, c) = checkpoints.pop().expect("unbalanced scopes");
                locals.truncate(l);
                captured.truncate(c);
            }
            Ins::Bind { name } => locals.push(source.symbol_at(name).to_string()),
            Ins::BindCaptured { name } => captured.push(source.symbol_at(name).to_string()),
            Ins::GetByHops { hops } | Ins::SetByHops { hops } => {
                let name = match was {
                    Ins::Get { name } | Ins::Set { name } => source.symbol_at(name),
                    _ => return false,
                };
                let at = locals.len().checked_sub(1 + hops as usize);
                if at.map(|at| locals[at].as_str()) != Some(name) {
                    return false;
                }
            }
            Ins::GetCapturedByHops { hops } | Ins::SetCapturedByHops { hops } => {
                let name = match was {
                    Ins::Get { name } | Ins::Set { name } => source.symbol_at(name),
                    _ => return false,
                };
                let at = captured.len().checked_sub(1 + hops as usize);
                if at.map(|at| captured[at].as_str()) != Some(name) {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

#[quickcheck]
fn scopes_nest_properly_with_matching_ids(program: Program) -> bool {
    let (_, out) = pipeline(&program.0);

    let mut open: Vec<u32> = Vec::new();
    for (i, ins) in out.ins.iter().enumerate() {
        match *ins {
            Ins::ScopeBegin { id } => {
                // the id is the instruction's own index
                if id as usize != i {
                    return false;
                }
                open.push(id);
            }
            Ins::ScopeEnd { id } => {
                if open.pop() != Some(id) {
                    return false;
                }
            }
            _ => {}
        }
    }
    open.is_empty()
}

#[quickcheck]
fn condition_targets_chain_start_to_else_to_end(program: Program) -> bool {
    let (_, out) = pipeline(&program.0);

    out.ins.iter().all(|ins| match *ins {
        Ins::ConditionStart { target } => {
            match out.ins.get(target as usize) {
                Some(Ins::ConditionElse { target: end }) => {
                    matches!(out.ins.get(*end as usize), Some(Ins::ConditionEnd))
                }
                _ => false,
            }
        }
        _ => true,
    })
}

#[quickcheck]
fn generated_c_is_brace_balanced(program: Program) -> bool {
    let (source, out) = pipeline(&program.0);
    let unit = compiler::program(&source, &out).expect("codegen failed");

    let open = unit.matches('{').count();
    let close = unit.matches('}').count();
    open == close
}
