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
use num_traits::{Pow, Signed, ToPrimitive, Zero};

// ============================================================================
// Terms
// ============================================================================

/// A symbolic expression over the SMT integer sort.  Free variables
/// are minted by the name generator; bitwise operations and
/// exponentiation appear as applications of uninterpreted functions so
/// that the solver never pays bit-vector theory cost.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    // Values
    Const(BigInt),
    Var(String),
    // Expressions
    Binary(BinOp, Box<Term>, Box<Term>),
    /// Application of the uninterpreted `not/1` function.
    BitNot(Box<Term>),
    // Predicates
    True,
    False,
    /// Boolean negation.
    Not(Box<Term>),
}

// ============================================================================
// Binary Operators
// ============================================================================

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Uninterpreted `pow/2`.
    Pow,
    // Comparators
    Eq,
    Lt,
    Gt,
    // Uninterpreted bitwise functions `and/2`, `or/2`, `xor/2`.
    And,
    Or,
    Xor,
}

/// The sort of a term.  Comparators and boolean connectives produce
/// boolean-sorted terms; everything else lives in the integer sort.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sort {
    Bool,
    Int,
}

impl BinOp {
    pub fn sort(&self) -> Sort {
        match self {
            BinOp::Eq | BinOp::Lt | BinOp::Gt => Sort::Bool,
            _ => Sort::Int,
        }
    }

    /// Fold an application onto two known integers, where defined.
    /// Division and modulus by zero, and the uninterpreted bitwise
    /// functions, are left symbolic.
    fn fold(&self, lhs: &BigInt, rhs: &BigInt) -> Option<Term> {
        let b = |flag: bool| Some(if flag { Term::True } else { Term::False });
        match self {
            BinOp::Add => Some(Term::Const(lhs + rhs)),
            BinOp::Sub => Some(Term::Const(lhs - rhs)),
            BinOp::Mul => Some(Term::Const(lhs * rhs)),
            BinOp::Div if !rhs.is_zero() => Some(Term::Const(lhs / rhs)),
            BinOp::Mod if !rhs.is_zero() => Some(Term::Const(lhs % rhs)),
            BinOp::Pow if !rhs.is_negative() => rhs.to_u32().map(|e| Term::Const(lhs.pow(e))),
            BinOp::Eq => b(lhs == rhs),
            BinOp::Lt => b(lhs < rhs),
            BinOp::Gt => b(lhs > rhs),
            _ => None,
        }
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Term {
    pub fn int<T: Into<BigInt>>(value: T) -> Self {
        Term::Const(value.into())
    }

    pub fn var(name: &str) -> Self {
        Term::Var(name.to_string())
    }

    pub fn binary(op: BinOp, lhs: Term, rhs: Term) -> Self {
        Term::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn negate(self) -> Self {
        Term::Not(Box::new(self))
    }

    /// The sort this term inhabits.
    pub fn sort(&self) -> Sort {
        match self {
            Term::True | Term::False | Term::Not(_) => Sort::Bool,
            Term::Binary(op, _, _) => op.sort(),
            _ => Sort::Int,
        }
    }

    /// Constant folding.  Anything involving a free variable or an
    /// uninterpreted function is left untouched.
    pub fn simplify(&self) -> Term {
        match self {
            Term::Not(t) => match t.simplify() {
                Term::True => Term::False,
                Term::False => Term::True,
                Term::Not(inner) => *inner,
                t => t.negate(),
            },
            Term::Binary(op, lhs, rhs) => {
                let lhs = lhs.simplify();
                let rhs = rhs.simplify();
                if let (Term::Const(a), Term::Const(b)) = (&lhs, &rhs) {
                    if let Some(folded) = op.fold(a, b) {
                        return folded;
                    }
                }
                Term::binary(*op, lhs, rhs)
            }
            _ => self.clone(),
        }
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "pow",
            BinOp::Eq => "==",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Term::Const(n) => write!(f, "{n}"),
            Term::Var(name) => write!(f, "{name}"),
            Term::Binary(op @ (BinOp::Pow | BinOp::And | BinOp::Or | BinOp::Xor), l, r) => {
                write!(f, "{op}({l}, {r})")
            }
            Term::Binary(op, l, r) => write!(f, "({l} {op} {r})"),
            Term::BitNot(t) => write!(f, "not({t})"),
            Term::True => write!(f, "true"),
            Term::False => write!(f, "false"),
            Term::Not(t) => write!(f, "!{t}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_01() {
        let t = Term::binary(BinOp::Add, Term::int(3), Term::int(4));
        assert_eq!(t.simplify(), Term::int(7));
    }

    #[test]
    fn test_02() {
        let t = Term::binary(BinOp::Eq, Term::int(1), Term::int(1));
        assert_eq!(t.simplify(), Term::True);
        assert_eq!(t.simplify().sort(), Sort::Bool);
    }

    #[test]
    fn test_03() {
        // Division by zero is left symbolic.
        let t = Term::binary(BinOp::Div, Term::int(1), Term::int(0));
        assert_eq!(t.simplify(), t);
    }

    #[test]
    fn test_04() {
        let t = Term::binary(BinOp::Lt, Term::var("x"), Term::int(4)).negate().negate();
        assert_eq!(t.simplify(), Term::binary(BinOp::Lt, Term::var("x"), Term::int(4)));
    }

    #[test]
    fn test_05() {
        // Uninterpreted applications never fold.
        let t = Term::binary(BinOp::And, Term::int(3), Term::int(5));
        assert_eq!(t.simplify(), t);
        assert_eq!(t.sort(), Sort::Int);
    }

    #[test]
    fn test_06() {
        let t = Term::binary(BinOp::Eq, Term::var("x"), Term::int(0));
        assert_eq!(format!("{t}"), "(x == 0)");
        assert_eq!(format!("{}", t.negate()), "!(x == 0)");
    }

    #[test]
    fn test_07() {
        let t = Term::binary(BinOp::Pow, Term::int(2), Term::int(10));
        assert_eq!(t.simplify(), Term::int(1024));
    }
}
