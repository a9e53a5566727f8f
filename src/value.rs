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
use std::fmt;

use num_bigint::BigInt;
use num_traits::{One, Pow, Signed, ToPrimitive, Zero};

use crate::solver::{CheckResult, SmtSolver};
use crate::term::{BinOp, Sort, Term};

// ============================================================================
// Value
// ============================================================================

/// A machine word during interpretation: either an integer known
/// outright, or an opaque symbolic term.  Operators fold eagerly when
/// every operand is concrete and lift to terms otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Concrete(BigInt),
    Symbolic(Term),
}

impl Value {
    pub fn concrete<T: Into<BigInt>>(value: T) -> Self {
        Value::Concrete(value.into())
    }

    pub fn symbolic(term: Term) -> Self {
        Value::Symbolic(term)
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Value::Concrete(_))
    }

    pub fn into_term(self) -> Term {
        match self {
            Value::Concrete(n) => Term::Const(n),
            Value::Symbolic(t) => t,
        }
    }

    fn truth(flag: bool) -> Value {
        if flag {
            Value::Concrete(BigInt::one())
        } else {
            Value::Concrete(BigInt::zero())
        }
    }

    // ================================================================
    // Arithmetic
    // ================================================================

    pub fn add(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Concrete(a), Value::Concrete(b)) => Value::Concrete(a + b),
            (a, b) => lift(BinOp::Add, a, b),
        }
    }

    pub fn sub(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Concrete(a), Value::Concrete(b)) => Value::Concrete(a - b),
            (a, b) => lift(BinOp::Sub, a, b),
        }
    }

    pub fn mul(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Concrete(a), Value::Concrete(b)) => Value::Concrete(a * b),
            (a, b) => lift(BinOp::Mul, a, b),
        }
    }

    pub fn div(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Concrete(a), Value::Concrete(b)) => {
                if b.is_zero() {
                    Value::Concrete(BigInt::zero())
                } else {
                    Value::Concrete(a / b)
                }
            }
            (a, b) => lift(BinOp::Div, a, b),
        }
    }

    /// Exponentiation folds only when both operands are known and the
    /// exponent is a small non-negative integer; every other shape
    /// becomes an application of the uninterpreted `pow/2`.
    pub fn exp(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Concrete(base), Value::Concrete(exponent)) => {
                if exponent.is_negative() {
                    Value::Concrete(BigInt::zero())
                } else if let Some(e) = exponent.to_u32() {
                    Value::Concrete(base.pow(e))
                } else {
                    lift(BinOp::Pow, Value::Concrete(base), Value::Concrete(exponent))
                }
            }
            (a, b) => lift(BinOp::Pow, a, b),
        }
    }

    /// The shared modulus path behind `MOD`, `SMOD`, `ADDMOD` and
    /// `MULMOD` (the signed variant deliberately reuses the unsigned
    /// semantics).  A concrete zero divisor short-circuits to zero; a
    /// symbolic divisor is checked against the current path condition,
    /// and when `divisor ≠ 0` is unsatisfiable the result is zero.
    pub fn modulo(self, divisor: Value, solver: &mut SmtSolver) -> Value {
        match divisor {
            Value::Concrete(b) => {
                if b.is_zero() {
                    Value::Concrete(BigInt::zero())
                } else {
                    match self {
                        Value::Concrete(a) => Value::Concrete(a % b),
                        a => lift(BinOp::Mod, a, Value::Concrete(b)),
                    }
                }
            }
            Value::Symbolic(d) => {
                let nonzero =
                    Term::binary(BinOp::Eq, d.clone(), Term::int(0)).negate();
                let mut frame = solver.scope();
                frame.assert_term(&nonzero);
                if frame.check() == CheckResult::Unsat {
                    // The path condition forces the divisor to zero.
                    Value::Concrete(BigInt::zero())
                } else {
                    lift(BinOp::Mod, self, Value::Symbolic(d))
                }
            }
        }
    }

    // ================================================================
    // Comparisons
    // ================================================================

    pub fn lt(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Concrete(a), Value::Concrete(b)) => Value::truth(a < b),
            (a, b) => lift(BinOp::Lt, a, b),
        }
    }

    pub fn gt(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Concrete(a), Value::Concrete(b)) => Value::truth(a > b),
            (a, b) => lift(BinOp::Gt, a, b),
        }
    }

    pub fn eq_value(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Concrete(a), Value::Concrete(b)) => Value::truth(a == b),
            (a, b) => lift(BinOp::Eq, a, b),
        }
    }

    pub fn iszero(self) -> Value {
        match self {
            Value::Concrete(a) => Value::truth(a.is_zero()),
            Value::Symbolic(t) => {
                // Comparing a boolean-sorted term against zero would
                // be ill-sorted; negate it instead.
                if t.sort() == Sort::Bool {
                    Value::Symbolic(t.negate())
                } else {
                    Value::Symbolic(Term::binary(BinOp::Eq, t, Term::int(0)))
                }
            }
        }
    }

    // ================================================================
    // Bitwise
    // ================================================================

    pub fn bitand(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Concrete(a), Value::Concrete(b)) => Value::Concrete(a & b),
            (a, b) => lift(BinOp::And, a, b),
        }
    }

    pub fn bitor(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Concrete(a), Value::Concrete(b)) => Value::Concrete(a | b),
            (a, b) => lift(BinOp::Or, a, b),
        }
    }

    pub fn bitxor(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Concrete(a), Value::Concrete(b)) => Value::Concrete(a ^ b),
            (a, b) => lift(BinOp::Xor, a, b),
        }
    }

    /// Bitwise complement, which under the integer sort is the two's
    /// complement flip `-1 - x`.
    pub fn bitnot(self) -> Value {
        match self {
            Value::Concrete(a) => Value::Concrete(BigInt::from(-1) - a),
            Value::Symbolic(t) => Value::Symbolic(Term::BitNot(Box::new(t))),
        }
    }
}

fn lift(op: BinOp, lhs: Value, rhs: Value) -> Value {
    Value::Symbolic(Term::binary(op, lhs.into_term(), rhs.into_term()))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Concrete(n) => write!(f, "{n}"),
            Value::Symbolic(t) => write!(f, "{t}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
