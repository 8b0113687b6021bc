//! Resolution passes over the RPN
//!
//! Lowering leaves every variable reference symbolic. Three passes decide
//! which bindings live on the heap closure chain and which stay in the bind
//! array, then two more replace names with hop counts against those two
//! structures. After [`resolve`] no `Bind` is ambiguous and no `Get`/`Set`
//! carries a name unless it refers to a built-in, which the code generator
//! handles by descriptor lookup.
//!
//! Every pass is a backward scan from the reference toward the start of the
//! list. The depth counter drops on `ScopeBegin` and rises on `ScopeEnd`,
//! so instructions at positive depth sit in scopes that closed before the
//! reference and are skipped. A binding is visible iff it is at non-positive
//! depth, and the first visible match wins, which makes shadowing come out
//! right for free.

use crate::core::Source;
use crate::rpn::{Ins, Rpn};

fn same(source: &Source, a: u32, b: u32) -> bool {
    source.symbol_at(a) == source.symbol_at(b)
}

/// Promote every binding that is referenced from inside a nested lambda.
///
/// Walking backward from a reference, crossing a `LambdaContextLoad` at
/// non-positive depth means leaving the lambda the reference lives in. A
/// visible `Bind` found beyond that point is used across a function
/// boundary and has to move to the closure chain.
pub fn promote_captured_binds(source: &Source, rpn: &mut Rpn) {
    for i in 0..rpn.ins.len() {
        let name = match rpn.ins[i] {
            Ins::Get { name } | Ins::Set { name } => name,
            _ => continue,
        };
        let mut depth = 0i32;
        let mut lambda_passed = false;
        for j in (0..i).rev() {
            match rpn.ins[j] {
                Ins::ScopeBegin { .. } => depth -= 1,
                Ins::ScopeEnd { .. } => depth += 1,
                Ins::LambdaContextLoad if depth <= 0 => lambda_passed = true,
                Ins::Bind { name: bound } if depth <= 0 && same(source, bound, name) => {
                    if depth < 0 && lambda_passed {
                        rpn.ins[j] = Ins::BindCaptured { name: bound };
                    }
                    break;
                }
                Ins::BindCaptured { name: bound }
                    if depth <= 0 && same(source, bound, name) =>
                {
                    break;
                }
                _ => {}
            }
        }
    }
}

/// Rewrite loads of captured bindings to `GetCaptured`.
pub fn reclassify_gets(source: &Source, rpn: &mut Rpn) {
    for i in 0..rpn.ins.len() {
        let name = match rpn.ins[i] {
            Ins::Get { name } => name,
            _ => continue,
        };
        let mut depth = 0i32;
        for j in (0..i).rev() {
            match rpn.ins[j] {
                Ins::ScopeBegin { .. } => depth -= 1,
                Ins::ScopeEnd { .. } => depth += 1,
                Ins::Bind { name: bound } if depth <= 0 && same(source, bound, name) => break,
                Ins::BindCaptured { name: bound }
                    if depth <= 0 && same(source, bound, name) =>
                {
                    rpn.ins[i] = Ins::GetCaptured { name };
                    break;
                }
                _ => {}
            }
        }
        // No visible binding at all: the name stays a plain Get and the
        // code generator decides whether it is a built-in.
    }
}

/// Rewrite stores of captured bindings to `SetCaptured`.
pub fn reclassify_sets(source: &Source, rpn: &mut Rpn) {
    for i in 0..rpn.ins.len() {
        let name = match rpn.ins[i] {
            Ins::Set { name } => name,
            _ => continue,
        };
        let mut depth = 0i32;
        for j in (0..i).rev() {
            match rpn.ins[j] {
                Ins::ScopeBegin { .. } => depth -= 1,
                Ins::ScopeEnd { .. } => depth += 1,
                Ins::Bind { name: bound } if depth <= 0 && same(source, bound, name) => break,
                Ins::BindCaptured { name: bound }
                    if depth <= 0 && same(source, bound, name) =>
                {
                    rpn.ins[i] = Ins::SetCaptured { name };
                    break;
                }
                _ => {}
            }
        }
    }
}

/// Replace local references with offsets into the bind array.
///
/// The hop count is the number of other visible `Bind`s between the
/// reference and its binding; the runtime reads `binds[binds_index - hops]`.
pub fn local_refs_to_hops(source: &Source, rpn: &mut Rpn) {
    for i in 0..rpn.ins.len() {
        let (name, is_set) = match rpn.ins[i] {
            Ins::Get { name } => (name, false),
            Ins::Set { name } => (name, true),
            _ => continue,
        };
        let mut depth = 0i32;
        let mut hops = 0u32;
        for j in (0..i).rev() {
            match rpn.ins[j] {
                Ins::ScopeBegin { .. } => depth -= 1,
                Ins::ScopeEnd { .. } => depth += 1,
                Ins::Bind { name: bound } if depth <= 0 => {
                    if same(source, bound, name) {
                        rpn.ins[i] = if is_set {
                            Ins::SetByHops { hops }
                        } else {
                            Ins::GetByHops { hops }
                        };
                        break;
                    }
                    hops += 1;
                }
                _ => {}
            }
        }
    }
}

/// Replace captured references with link counts along the closure chain.
pub fn captured_refs_to_hops(source: &Source, rpn: &mut Rpn) {
    for i in 0..rpn.ins.len() {
        let (name, is_set) = match rpn.ins[i] {
            Ins::GetCaptured { name } => (name, false),
            Ins::SetCaptured { name } => (name, true),
            _ => continue,
        };
        let mut depth = 0i32;
        let mut hops = 0u32;
        for j in (0..i).rev() {
            match rpn.ins[j] {
                Ins::ScopeBegin { .. } => depth -= 1,
                Ins::ScopeEnd { .. } => depth += 1,
                Ins::BindCaptured { name: bound } if depth <= 0 => {
                    if same(source, bound, name) {
                        rpn.ins[i] = if is_set {
                            Ins::SetCapturedByHops { hops }
                        } else {
                            Ins::GetCapturedByHops { hops }
                        };
                        break;
                    }
                    hops += 1;
                }
                _ => {}
            }
        }
    }
}

/// Run every pass, in order.
pub fn resolve(source: &Source, rpn: &mut Rpn) {
    promote_captured_binds(source, rpn);
    reclassify_gets(source, rpn);
    reclassify_sets(source, rpn);
    local_refs_to_hops(source, rpn);
    captured_refs_to_hops(source, rpn);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpn::{lower1, Ins::*};
    use pretty_assertions::assert_eq;

    fn resolved(program: &str) -> (Source, Rpn) {
        let (source, mut rpn) = lower1(program);
        resolve(&source, &mut rpn);
        (source, rpn)
    }

    #[test]
    fn locals_stay_in_the_bind_array() {
        let (_, rpn) = resolved("(lambda (x) x)");
        assert_eq!(rpn.ins[3], Bind { name: 9 });
        assert_eq!(rpn.ins[4], GetByHops { hops: 0 });
    }

    #[test]
    fn sibling_bindings_count_as_hops() {
        let (_, rpn) = resolved("(let (a 1 b 2) (+ a b))");
        // gets lowered left-to-right: a then b
        let hops: Vec<u32> = rpn
            .ins
            .iter()
            .filter_map(|ins| match ins {
                GetByHops { hops } => Some(*hops),
                _ => None,
            })
            .collect();
        assert_eq!(hops, vec![1, 0]);
    }

    #[test]
    fn shadowing_picks_the_innermost_binding() {
        let (_, rpn) = resolved("(let (x 1 x 2) x)");
        let stores: Vec<&Ins> =
            rpn.ins.iter().filter(|i| matches!(i, SetByHops { .. })).collect();
        assert_eq!(stores, vec![&SetByHops { hops: 0 }, &SetByHops { hops: 0 }]);
        assert!(rpn.ins.contains(&GetByHops { hops: 0 }));
    }

    #[test]
    fn closed_scopes_are_skipped() {
        // the trailing x must not count the y bound in the closed then-branch
        let (_, rpn) = resolved("(let (x 1) (if x (let (y 2) y) x))");
        let hops: Vec<u32> = rpn
            .ins
            .iter()
            .filter_map(|ins| match ins {
                GetByHops { hops } => Some(*hops),
                _ => None,
            })
            .collect();
        assert_eq!(hops, vec![0, 0, 0]);
    }

    #[test]
    fn capture_across_a_lambda() {
        let (_, rpn) = resolved("(lambda (x) ((lambda (y) (+ x y)) 332))");

        // bind x is promoted to the closure chain
        assert!(matches!(rpn.ins[3], BindCaptured { .. }));
        // inner x goes through the chain, inner y stays local
        assert_eq!(rpn.ins[9], GetCapturedByHops { hops: 0 });
        assert_eq!(rpn.ins[10], GetByHops { hops: 0 });
        // the built-in keeps its name
        assert!(matches!(rpn.ins[11], Get { .. }));
    }

    #[test]
    fn same_lambda_references_stay_local() {
        // no function boundary between bind and use, no promotion
        let (_, rpn) = resolved("(let (x 1) (let (y x) y))");
        assert!(!rpn.ins.iter().any(|i| matches!(i, BindCaptured { .. })));
        assert!(rpn.ins.contains(&GetByHops { hops: 1 }));
    }

    #[test]
    fn chain_hops_count_captured_bindings_only() {
        let (_, rpn) = resolved("(lambda (x) (lambda (y) (lambda (z) (+ x y))))");

        let captured: Vec<u32> = rpn
            .ins
            .iter()
            .filter_map(|ins| match ins {
                GetCapturedByHops { hops } => Some(*hops),
                _ => None,
            })
            .collect();
        // x is one link further up than y; the local z does not count
        assert_eq!(captured, vec![1, 0]);
    }

    #[test]
    fn recursive_let_binding_goes_through_the_chain() {
        let (_, rpn) = resolved("(let (f (lambda (n) (f n))) (f 1))");

        assert!(rpn.ins.iter().any(|i| matches!(i, BindCaptured { .. })));
        assert!(rpn.ins.contains(&SetCapturedByHops { hops: 0 }));
        // both the recursive call and the body load f from the chain
        let loads =
            rpn.ins.iter().filter(|i| matches!(i, GetCapturedByHops { hops: 0 })).count();
        assert_eq!(loads, 2);
    }

    #[test]
    fn builtins_keep_their_names() {
        let (source, rpn) = resolved("(lambda (x) (+ x 1))");
        let names: Vec<&str> = rpn
            .ins
            .iter()
            .filter_map(|ins| match ins {
                Get { name } => Some(source.symbol_at(*name)),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["+"]);
    }

    #[test]
    fn no_symbolic_locals_survive() {
        let programs = [
            "(lambda (x) x)",
            "(lambda (x) (+ x 1))",
            "(lambda (x) ((lambda (a b) (+ a b)) x 1))",
            "(lambda (x) ((lambda (y) (+ x y)) 332))",
            "(let (x 1) (if x (let (y x) y) x))",
        ];
        for program in &programs {
            let (source, rpn) = resolved(program);
            for ins in &rpn.ins {
                match ins {
                    Get { name } | Set { name } => {
                        assert!(
                            crate::compiler::builtin(source.symbol_at(*name)).is_some(),
                            "unresolved name in {}",
                            program
                        );
                    }
                    GetCaptured { .. } | SetCaptured { .. } => {
                        panic!("captured reference left without hops in {}", program)
                    }
                    _ => {}
                }
            }
        }
    }
}
