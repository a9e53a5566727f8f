use evmsym::cfg::Cfg;
use evmsym::disasm::Parser;
use evmsym::explorer::Explorer;
use evmsym::solver::SmtSolver;
use evmsym::state::PathState;
use evmsym::term::{BinOp, Term};
use evmsym::value::Value;

#[test]
fn test_linear_arithmetic() {
    // PUSH 3; PUSH 4; ADD: one terminal path with 7 on top.
    let (_, paths, _) = explore(
        "...
0 PUSH1 0x03
2 PUSH1 0x04
4 ADD
5 STOP
",
    );
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].stack.peek(0), Some(&Value::concrete(7)));
    assert_eq!(paths[0].visited, vec![0]);
}

#[test]
fn test_concrete_branch_taken() {
    // The flag is a concrete 1, so only the jump side is feasible.
    let (cfg, paths, _) = explore(
        "...
0 PUSH1 0x01
2 PUSH1 0x06
4 JUMPI
5 STOP
6 JUMPDEST
7 PUSH1 0x2a
9 STOP
",
    );
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].visited, vec![0, 6]);
    assert_eq!(paths[0].stack.peek(0), Some(&Value::concrete(0x2a)));
    // The dynamic edge was discovered during exploration.
    assert!(cfg.edges[&0].contains(&6));
}

#[test]
fn test_concrete_branch_not_taken() {
    // The flag is a concrete 0: the jump target is never entered.
    let (cfg, paths, _) = explore(
        "...
0 PUSH1 0x00
2 PUSH1 0x06
4 JUMPI
5 STOP
6 JUMPDEST
7 PUSH1 0x2a
9 STOP
",
    );
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].visited, vec![0, 5]);
    assert!(paths[0].stack.is_empty());
    // The edge still exists; only its exploration was pruned.
    assert!(cfg.edges[&0].contains(&6));
}

#[test]
fn test_symbolic_branch_forks() {
    // A symbolic flag forks the exploration into two terminal paths.
    let (_, paths, _) = explore(
        "...
0 PUSH1 0x00
2 CALLDATALOAD
3 ISZERO
4 PUSH1 0x0a
6 JUMPI
7 PUSH1 0x01
9 STOP
10 JUMPDEST
11 PUSH1 0x02
13 STOP
",
    );
    assert_eq!(paths.len(), 2);
    // Jump side first (x = 0), then the fall-through (x != 0).
    assert_eq!(paths[0].visited, vec![0, 10]);
    assert_eq!(paths[0].stack.peek(0), Some(&Value::concrete(2)));
    assert_eq!(paths[1].visited, vec![0, 7]);
    assert_eq!(paths[1].stack.peek(0), Some(&Value::concrete(1)));
    // Each side carries the input variable minted before the fork,
    // and the forks never aliased each other's state.
    assert_eq!(paths[0].variables.len(), 1);
    assert_eq!(paths[0].variables, paths[1].variables);
    assert_ne!(paths[0].stack, paths[1].stack);
}

#[test]
fn test_symbolic_divisor() {
    // 5 % x with a symbolic divisor stays symbolic on an
    // unconstrained path.
    let program = "...
0 PUSH1 0x00
2 CALLDATALOAD
3 PUSH1 0x05
5 MOD
6 STOP
";
    let (_, paths, _) = explore(program);
    assert_eq!(paths.len(), 1);
    assert!(matches!(paths[0].stack.peek(0), Some(Value::Symbolic(_))));
    // Under the extra assumption x = 0 the divisor is provably zero
    // and the modulus short-circuits...
    let x = Term::var("Id_0_0");
    let (_, paths, _) =
        explore_assuming(program, Term::binary(BinOp::Eq, x.clone(), Term::int(0)));
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].stack.peek(0), Some(&Value::concrete(0)));
    // ...whereas x = 7 keeps it symbolic.
    let (_, paths, _) =
        explore_assuming(program, Term::binary(BinOp::Eq, x, Term::int(7)));
    assert!(matches!(paths[0].stack.peek(0), Some(Value::Symbolic(_))));
}

#[test]
fn test_memory_havoc() {
    // The store at a symbolic address wipes the concrete entry, so the
    // final load mints a fresh variable rather than returning 1.  The
    // CALLDATALOAD result is pushed last so that the second MSTORE
    // pops it as the store *address*.
    let (_, paths, _) = explore(
        "...
0 PUSH1 0x01
2 PUSH1 0x10
4 MSTORE
5 PUSH1 0x02
7 PUSH1 0x00
9 CALLDATALOAD
10 MSTORE
11 PUSH1 0x10
13 MLOAD
14 STOP
",
    );
    assert_eq!(paths.len(), 1);
    let fresh = match paths[0].stack.peek(0) {
        Some(Value::Symbolic(Term::Var(name))) => {
            assert!(name.starts_with("mem_16_"));
            name.clone()
        }
        other => panic!("expected a fresh symbolic variable, got {other:?}"),
    };
    // The havoc really happened: the concrete entry written by the
    // first store is gone, replaced by the variable the load minted.
    assert_eq!(
        paths[0].memory.get(&Value::concrete(16)),
        Some(&Value::symbolic(Term::var(&fresh)))
    );
}

#[test]
fn test_contradictory_branch_prunes() {
    // x < x is unsatisfiable, so only the fall-through survives.
    let (_, paths, _) = explore(
        "...
0 PUSH1 0x00
2 CALLDATALOAD
3 DUP1
4 LT
5 PUSH1 0x09
7 JUMPI
8 STOP
9 JUMPDEST
10 STOP
",
    );
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].visited, vec![0, 8]);
}

#[test]
fn test_both_sides_unsat_prunes_entirely() {
    // With an inconsistent ambient context neither side is feasible.
    let (_, paths, _) = explore_assuming(
        "...
0 PUSH1 0x00
2 CALLDATALOAD
3 ISZERO
4 PUSH1 0x08
6 JUMPI
7 STOP
8 JUMPDEST
9 STOP
",
        Term::False,
    );
    assert!(paths.is_empty());
}

#[test]
fn test_unresolved_jump_abandons_branch() {
    // A jump whose target never concretises is abandoned with a
    // warning rather than killing the run.
    let (cfg, paths, unresolved) = explore(
        "...
0 PUSH1 0x00
2 CALLDATALOAD
3 JUMP
4 STOP
",
    );
    assert!(paths.is_empty());
    assert_eq!(unresolved, 1);
    assert_eq!(cfg.get(0).unwrap().jump_target(), Some(-1));
}

#[test]
fn test_visit_limit_bounds_cycles() {
    // An unconditional self-loop would recurse forever; the visit
    // bound prunes it.
    let disasm = Parser::new(
        "...
0 JUMPDEST
1 PUSH1 0x00
3 JUMP
",
    )
    .parse()
    .unwrap();
    let mut cfg = Cfg::from_disassembly(&disasm);
    cfg.add_falls_to();
    let z3 = z3::Context::new(&z3::Config::new());
    let mut solver = SmtSolver::new(&z3);
    let mut explorer = Explorer::new(&mut cfg, &mut solver).with_limit(Some(8));
    explorer.explore().unwrap();
    assert!(explorer.closed_paths().is_empty());
    assert_eq!(solver.depth(), 0);
}

#[test]
fn test_jump_through_dynamic_target() {
    // An unconditional jump whose target resolves concretely is
    // followed, and the discovered edge lands in the graph.
    let (cfg, paths, _) = explore(
        "...
0 PUSH1 0x04
2 JUMP
3 STOP
4 JUMPDEST
5 PUSH1 0x07
7 STOP
",
    );
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].visited, vec![0, 4]);
    assert_eq!(paths[0].stack.peek(0), Some(&Value::concrete(7)));
    assert_eq!(cfg.get(0).unwrap().jump_target(), Some(4));
    assert!(cfg.edges[&0].contains(&4));
}

// ===================================================================
// Helpers
// ===================================================================

fn explore(input: &str) -> (Cfg, Vec<PathState>, u32) {
    explore_with(input, None)
}

fn explore_assuming(input: &str, assumption: Term) -> (Cfg, Vec<PathState>, u32) {
    explore_with(input, Some(assumption))
}

fn explore_with(input: &str, assumption: Option<Term>) -> (Cfg, Vec<PathState>, u32) {
    let disasm = Parser::new(input).parse().unwrap();
    let mut cfg = Cfg::from_disassembly(&disasm);
    cfg.add_falls_to();
    let z3 = z3::Context::new(&z3::Config::new());
    let mut solver = SmtSolver::new(&z3);
    if let Some(assumption) = &assumption {
        solver.assert_term(assumption);
    }
    let mut explorer = Explorer::new(&mut cfg, &mut solver).with_limit(Some(64));
    explorer.explore().unwrap();
    let paths = explorer.closed_paths().to_vec();
    let unresolved = explorer.unresolved_jumps();
    // The assertion stack always unwinds to where it started.
    assert_eq!(solver.depth(), 0);
    (cfg, paths, unresolved)
}
