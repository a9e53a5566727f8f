// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use std::ops::{Deref, DerefMut};

use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;
use z3::ast::{Ast, Bool, Int};
use z3::{Context, FuncDecl, SatResult, Solver, Sort};

use crate::term::{BinOp, Term, Sort as TermSort};

// ============================================================================
// Check Result
// ============================================================================

/// Outcome of a satisfiability check.  `Unknown` is reported as-is;
/// callers wanting conservative exploration treat it like `Sat`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CheckResult {
    Sat,
    Unknown,
    Unsat,
}

// ============================================================================
// Solver
// ============================================================================

/// A thin facade around the SMT solver, offering exactly the four
/// operations the engine needs: `push`, `pop`, `assert_term` and
/// `check`.  Terms are lowered to the integer sort here; the bitwise
/// operations and exponentiation become applications of the
/// uninterpreted functions `not/1`, `and/2`, `or/2`, `xor/2`, `pow/2`.
pub struct SmtSolver<'ctx> {
    ctx: &'ctx Context,
    solver: Solver<'ctx>,
    depth: usize,
    fn_not: FuncDecl<'ctx>,
    fn_and: FuncDecl<'ctx>,
    fn_or: FuncDecl<'ctx>,
    fn_xor: FuncDecl<'ctx>,
    fn_pow: FuncDecl<'ctx>,
}

impl<'ctx> SmtSolver<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        let int = Sort::int(ctx);
        let unary = [&int];
        let binary = [&int, &int];
        Self {
            ctx,
            solver: Solver::new(ctx),
            depth: 0,
            fn_not: FuncDecl::new(ctx, "not", &unary, &int),
            fn_and: FuncDecl::new(ctx, "and", &binary, &int),
            fn_or: FuncDecl::new(ctx, "or", &binary, &int),
            fn_xor: FuncDecl::new(ctx, "xor", &binary, &int),
            fn_pow: FuncDecl::new(ctx, "pow", &binary, &int),
        }
    }

    /// Open a new assertion frame.
    pub fn push(&mut self) {
        self.solver.push();
        self.depth += 1;
    }

    /// Discard the most recent assertion frame.
    pub fn pop(&mut self) {
        assert!(self.depth > 0);
        self.solver.pop(1);
        self.depth -= 1;
    }

    /// Current depth of the assertion stack.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Assert a term, coerced to the boolean sort.
    pub fn assert_term(&mut self, term: &Term) {
        let formula = self.lower_bool(term);
        self.solver.assert(&formula);
    }

    /// Check satisfiability of the current assertion stack.
    pub fn check(&mut self) -> CheckResult {
        match self.solver.check() {
            SatResult::Sat => CheckResult::Sat,
            SatResult::Unknown => CheckResult::Unknown,
            SatResult::Unsat => CheckResult::Unsat,
        }
    }

    /// Open a scoped assertion frame which pops itself again when
    /// dropped, however the scope is left.
    pub fn scope(&mut self) -> Frame<'_, 'ctx> {
        self.push();
        Frame { solver: self }
    }

    // ================================================================
    // Lowering
    // ================================================================

    /// Lower a term into an integer-sorted Z3 expression.  A
    /// boolean-sorted term appearing in an integer position becomes
    /// `ite(b, 1, 0)`.
    fn lower_int(&self, term: &Term) -> Int<'ctx> {
        match term {
            Term::Const(n) => self.int_const(n),
            Term::Var(name) => Int::new_const(self.ctx, name.as_str()),
            Term::Binary(op, lhs, rhs) if op.sort() == TermSort::Int => {
                let l = self.lower_int(lhs);
                let r = self.lower_int(rhs);
                match op {
                    BinOp::Add => &l + &r,
                    BinOp::Sub => &l - &r,
                    BinOp::Mul => &l * &r,
                    BinOp::Div => l.div(&r),
                    BinOp::Mod => l.rem(&r),
                    BinOp::Pow => self.apply(&self.fn_pow, &[&l, &r]),
                    BinOp::And => self.apply(&self.fn_and, &[&l, &r]),
                    BinOp::Or => self.apply(&self.fn_or, &[&l, &r]),
                    BinOp::Xor => self.apply(&self.fn_xor, &[&l, &r]),
                    _ => unreachable!(),
                }
            }
            Term::BitNot(t) => {
                let x = self.lower_int(t);
                self.apply(&self.fn_not, &[&x])
            }
            _ => {
                let b = self.lower_bool(term);
                b.ite(&Int::from_i64(self.ctx, 1), &Int::from_i64(self.ctx, 0))
            }
        }
    }

    /// Lower a term into a boolean-sorted Z3 expression.  An
    /// integer-sorted term appearing in a boolean position becomes
    /// `t ≠ 0`.
    fn lower_bool(&self, term: &Term) -> Bool<'ctx> {
        match term {
            Term::True => Bool::from_bool(self.ctx, true),
            Term::False => Bool::from_bool(self.ctx, false),
            Term::Not(t) => self.lower_bool(t).not(),
            Term::Binary(BinOp::Eq, lhs, rhs) => {
                if lhs.sort() == TermSort::Bool && rhs.sort() == TermSort::Bool {
                    self.lower_bool(lhs)._eq(&self.lower_bool(rhs))
                } else {
                    self.lower_int(lhs)._eq(&self.lower_int(rhs))
                }
            }
            Term::Binary(BinOp::Lt, lhs, rhs) => self.lower_int(lhs).lt(&self.lower_int(rhs)),
            Term::Binary(BinOp::Gt, lhs, rhs) => self.lower_int(lhs).gt(&self.lower_int(rhs)),
            _ => {
                let x = self.lower_int(term);
                x._eq(&Int::from_i64(self.ctx, 0)).not()
            }
        }
    }

    fn apply(&self, f: &FuncDecl<'ctx>, args: &[&Int<'ctx>]) -> Int<'ctx> {
        let dyn_args: Vec<&dyn Ast<'ctx>> = args.iter().map(|a| *a as &dyn Ast<'ctx>).collect();
        f.apply(&dyn_args).as_int().unwrap()
    }

    /// Build an integer constant.  Values beyond the machine range are
    /// assembled from 32-bit limbs so that arbitrarily wide `PUSH32`
    /// immediates survive the trip.
    fn int_const(&self, n: &BigInt) -> Int<'ctx> {
        if let Some(v) = n.to_i64() {
            return Int::from_i64(self.ctx, v);
        }
        let (sign, digits) = n.to_u32_digits();
        let radix = Int::from_u64(self.ctx, 1 << 32);
        let mut acc = Int::from_u64(self.ctx, 0);
        for digit in digits.iter().rev() {
            acc = &(&acc * &radix) + &Int::from_u64(self.ctx, *digit as u64);
        }
        if sign == Sign::Minus {
            acc = acc.unary_minus();
        }
        acc
    }
}

// ============================================================================
// Scoped Frame
// ============================================================================

/// An assertion frame tied to a lexical scope.  The frame is pushed on
/// construction and popped on drop, so a branch's assumptions are
/// released on every exit path, early returns included.
pub struct Frame<'a, 'ctx> {
    solver: &'a mut SmtSolver<'ctx>,
}

impl<'a, 'ctx> Deref for Frame<'a, 'ctx> {
    type Target = SmtSolver<'ctx>;

    fn deref(&self) -> &Self::Target {
        self.solver
    }
}

impl<'a, 'ctx> DerefMut for Frame<'a, 'ctx> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.solver
    }
}

impl<'a, 'ctx> Drop for Frame<'a, 'ctx> {
    fn drop(&mut self) {
        self.solver.pop();
    }
}

// ============================================================================
// Tests
// ============================================================================
