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

use log::debug;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::cfg::{Cfg, UNKNOWN_TARGET};
use crate::disasm::Addr;
use crate::solver::SmtSolver;
use crate::state::{PathState, Stack};
use crate::term::{Sort, Term};
use crate::value::Value;
use crate::vargen::Generator;

// ============================================================================
// Error
// ============================================================================

/// Represents the set of fatal errors that can arise when interpreting
/// an instruction.  Each one aborts the whole run.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecError {
    /// An operator found fewer operands than it needs.
    StackUnderflow(String),
    /// An opcode whose semantics are deliberately absent.
    NotImplemented(String),
    /// A mnemonic the interpreter does not recognise.
    UnknownOpcode(String),
    /// A push immediate which did not parse as hexadecimal.
    InvalidImmediate(String),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecError::StackUnderflow(op) => write!(f, "stack underflow in {op}"),
            ExecError::NotImplemented(op) => write!(f, "{op} is not handled"),
            ExecError::UnknownOpcode(op) => write!(f, "unknown instruction {op}"),
            ExecError::InvalidImmediate(op) => write!(f, "invalid push immediate in '{op}'"),
        }
    }
}

impl std::error::Error for ExecError {}

// ============================================================================
// Transfer Function
// ============================================================================

/// Execute a single instruction of the block at `block` against the
/// given path state.  The analysis collaborator sees the opcode and
/// the pre-state first; jump instructions additionally write their
/// resolved target (and a discovered edge) back into the graph.
pub fn execute(
    cfg: &mut Cfg,
    block: Addr,
    instr: &str,
    state: &mut PathState,
    gen: &mut Generator,
    solver: &mut SmtSolver,
) -> Result<(), ExecError> {
    let parts: Vec<&str> = instr.split_whitespace().collect();
    let opcode = parts.first().copied().unwrap_or("");
    {
        let PathState { analysis, stack, memory, .. } = state;
        analysis.update(opcode, stack, memory);
    }
    debug!("executing: {instr}");
    //
    match opcode {
        // ===========================================================
        // 0s: Stop and Arithmetic Operations
        // ===========================================================
        "STOP" => {}
        "ADD" => execute_binary(&mut state.stack, opcode, Value::add)?,
        "MUL" => execute_binary(&mut state.stack, opcode, Value::mul)?,
        "SUB" => execute_binary(&mut state.stack, opcode, Value::sub)?,
        "DIV" => execute_binary(&mut state.stack, opcode, Value::div)?,
        "MOD" | "SMOD" => {
            let first = pop(&mut state.stack, opcode)?;
            let second = pop(&mut state.stack, opcode)?;
            state.stack.push(first.modulo(second, solver));
        }
        "ADDMOD" => {
            let first = pop(&mut state.stack, opcode)?;
            let second = pop(&mut state.stack, opcode)?;
            let third = pop(&mut state.stack, opcode)?;
            state.stack.push(first.add(second).modulo(third, solver));
        }
        "MULMOD" => {
            let first = pop(&mut state.stack, opcode)?;
            let second = pop(&mut state.stack, opcode)?;
            let third = pop(&mut state.stack, opcode)?;
            state.stack.push(first.mul(second).modulo(third, solver));
        }
        "EXP" => execute_binary(&mut state.stack, opcode, Value::exp)?,
        "SIGNEXTEND" => {
            return Err(ExecError::NotImplemented(opcode.to_string()));
        }
        // ===========================================================
        // 10s: Comparison and Bitwise Logic Operations
        // ===========================================================
        "LT" | "SLT" => execute_binary(&mut state.stack, opcode, Value::lt)?,
        "GT" | "SGT" => execute_binary(&mut state.stack, opcode, Value::gt)?,
        "EQ" => execute_binary(&mut state.stack, opcode, Value::eq_value)?,
        "ISZERO" => execute_unary(&mut state.stack, opcode, Value::iszero)?,
        "AND" => execute_binary(&mut state.stack, opcode, Value::bitand)?,
        "OR" => execute_binary(&mut state.stack, opcode, Value::bitor)?,
        "XOR" => execute_binary(&mut state.stack, opcode, Value::bitxor)?,
        "NOT" => execute_unary(&mut state.stack, opcode, Value::bitnot)?,
        "BYTE" => {
            return Err(ExecError::NotImplemented(opcode.to_string()));
        }
        // ===========================================================
        // 20s: SHA3
        // ===========================================================
        "SHA3" => {
            return Err(ExecError::NotImplemented(opcode.to_string()));
        }
        // ===========================================================
        // 30s: Environment Information
        // ===========================================================
        "CALLDATALOAD" => {
            let position = pop(&mut state.stack, opcode)?;
            let name = gen.gen_data_var(&position);
            state.variables.push(name.clone());
            state.stack.push(Value::symbolic(Term::var(&name)));
        }
        "CALLDATASIZE" => {
            let name = gen.gen_data_size();
            state.variables.push(name.clone());
            state.stack.push(Value::symbolic(Term::var(&name)));
        }
        // ===========================================================
        // 50s: Stack, Memory and Flow Operations
        // ===========================================================
        "POP" => {
            pop(&mut state.stack, opcode)?;
        }
        "MLOAD" => {
            let address = pop(&mut state.stack, opcode)?;
            let known = if address.is_concrete() {
                state.memory.get(&address).cloned()
            } else {
                None
            };
            match known {
                Some(value) => state.stack.push(value),
                None => {
                    let name = gen.gen_mem_var(&address);
                    state.variables.push(name.clone());
                    let fresh = Value::symbolic(Term::var(&name));
                    state.stack.push(fresh.clone());
                    state.memory.put(address, fresh);
                }
            }
        }
        "MSTORE" => {
            let address = pop(&mut state.stack, opcode)?;
            let value = pop(&mut state.stack, opcode)?;
            if address.is_concrete() {
                state.memory.put(address, value);
            } else {
                // No way to reason about aliasing under a symbolic
                // address.
                state.memory.havoc();
            }
        }
        "JUMP" => {
            let target = pop(&mut state.stack, opcode)?;
            let resolved = resolve(&target);
            if let Some(vertex) = cfg.get_mut(block) {
                vertex.set_jump_target(resolved);
            }
            cfg.add_edge(block, resolved);
        }
        "JUMPI" => {
            let target = pop(&mut state.stack, opcode)?;
            let flag = pop(&mut state.stack, opcode)?;
            let resolved = resolve(&target);
            let branch = branch_expression(flag);
            if let Some(vertex) = cfg.get_mut(block) {
                vertex.set_jump_target(resolved);
                vertex.set_branch_expression(branch);
            }
            cfg.add_edge(block, resolved);
        }
        "JUMPDEST" => {}
        // ===========================================================
        // 60s & 70s: Push Operations
        // ===========================================================
        _ if opcode.starts_with("PUSH") => {
            let immediate = parts
                .get(1)
                .and_then(|text| parse_hex(text))
                .ok_or_else(|| ExecError::InvalidImmediate(instr.to_string()))?;
            state.stack.push(Value::Concrete(immediate));
        }
        // ===========================================================
        // 80s: Duplication Operations
        // ===========================================================
        _ if opcode.starts_with("DUP") => {
            let position = operand_index(opcode, "DUP")?;
            let duplicate = state
                .stack
                .peek(position - 1)
                .cloned()
                .ok_or_else(|| ExecError::StackUnderflow(opcode.to_string()))?;
            state.stack.push(duplicate);
        }
        // ===========================================================
        // 90s: Exchange Operations
        // ===========================================================
        _ if opcode.starts_with("SWAP") => {
            let position = operand_index(opcode, "SWAP")?;
            if !state.stack.swap(position) {
                return Err(ExecError::StackUnderflow(opcode.to_string()));
            }
        }
        // ===========================================================
        // f0s: System Operations
        // ===========================================================
        "RETURN" => {
            // The return payload is not modelled.
            pop(&mut state.stack, opcode)?;
            pop(&mut state.stack, opcode)?;
        }
        "SUICIDE" => {}
        _ => {
            return Err(ExecError::UnknownOpcode(opcode.to_string()));
        }
    }
    debug!("block {block}: stack {} memory {}", state.stack, state.memory);
    Ok(())
}

// ===================================================================
// Helpers
// ===================================================================

fn pop(stack: &mut Stack, opcode: &str) -> Result<Value, ExecError> {
    stack.pop().ok_or_else(|| ExecError::StackUnderflow(opcode.to_string()))
}

fn execute_unary<F>(stack: &mut Stack, opcode: &str, op: F) -> Result<(), ExecError>
where
    F: FnOnce(Value) -> Value,
{
    let first = pop(stack, opcode)?;
    stack.push(op(first));
    Ok(())
}

fn execute_binary<F>(stack: &mut Stack, opcode: &str, op: F) -> Result<(), ExecError>
where
    F: FnOnce(Value, Value) -> Value,
{
    let first = pop(stack, opcode)?;
    let second = pop(stack, opcode)?;
    stack.push(op(first, second));
    Ok(())
}

/// Concretise a jump target where possible; anything else becomes the
/// sentinel that makes the explorer abandon the branch.
fn resolve(target: &Value) -> Addr {
    match target {
        Value::Concrete(n) => n.to_i64().unwrap_or(UNKNOWN_TARGET),
        Value::Symbolic(_) => UNKNOWN_TARGET,
    }
}

/// The predicate a `JUMPI` leaves on its block: a literal for concrete
/// flags, the flag itself when it is already a predicate, and
/// `¬(flag = 0)` for a symbolic word.
fn branch_expression(flag: Value) -> Term {
    match flag {
        Value::Concrete(n) => {
            if n.is_zero() {
                Term::False
            } else {
                Term::True
            }
        }
        Value::Symbolic(t) => {
            if t.sort() == Sort::Bool {
                t
            } else {
                Term::binary(crate::term::BinOp::Eq, t, Term::int(0)).negate()
            }
        }
    }
}

/// Parse the numeric suffix of a `DUP`/`SWAP` mnemonic.
fn operand_index(opcode: &str, prefix: &str) -> Result<usize, ExecError> {
    match opcode[prefix.len()..].parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ExecError::UnknownOpcode(opcode.to_string())),
    }
}

fn parse_hex(text: &str) -> Option<BigInt> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    BigInt::parse_bytes(digits.as_bytes(), 16)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::BlockKind;
    use z3::{Config, Context};

    #[test]
    fn test_01() {
        // PUSH a; PUSH b; ADD leaves a + b.
        let (mut cfg, ctx) = harness();
        let mut solver = SmtSolver::new(&ctx);
        let mut gen = Generator::new();
        let mut state = PathState::new();
        run(&mut cfg, &["PUSH1 0x03", "PUSH1 0x04", "ADD"], &mut state, &mut gen, &mut solver);
        assert_eq!(state.stack.peek(0), Some(&Value::concrete(7)));
    }

    #[test]
    fn test_02() {
        // PUSH a; PUSH b; MOD yields a mod b for b != 0; operand order
        // puts the later push on top.
        let (mut cfg, ctx) = harness();
        let mut solver = SmtSolver::new(&ctx);
        let mut gen = Generator::new();
        let mut state = PathState::new();
        run(&mut cfg, &["PUSH1 0x05", "PUSH1 0x07", "MOD"], &mut state, &mut gen, &mut solver);
        assert_eq!(state.stack.peek(0), Some(&Value::concrete(2)));
    }

    #[test]
    fn test_03() {
        // ISZERO on concretes.
        let (mut cfg, ctx) = harness();
        let mut solver = SmtSolver::new(&ctx);
        let mut gen = Generator::new();
        let mut state = PathState::new();
        run(&mut cfg, &["PUSH1 0x00", "ISZERO"], &mut state, &mut gen, &mut solver);
        assert_eq!(state.stack.peek(0), Some(&Value::concrete(1)));
        run(&mut cfg, &["PUSH1 0x02", "ISZERO"], &mut state, &mut gen, &mut solver);
        assert_eq!(state.stack.peek(0), Some(&Value::concrete(0)));
    }

    #[test]
    fn test_04() {
        // DUP1 duplicates the top.
        let (mut cfg, ctx) = harness();
        let mut solver = SmtSolver::new(&ctx);
        let mut gen = Generator::new();
        let mut state = PathState::new();
        run(&mut cfg, &["PUSH1 0x2a", "DUP1"], &mut state, &mut gen, &mut solver);
        assert_eq!(state.stack.len(), 2);
        assert_eq!(state.stack.peek(0), Some(&Value::concrete(42)));
        assert_eq!(state.stack.peek(1), Some(&Value::concrete(42)));
    }

    #[test]
    fn test_05() {
        // SWAP1 exchanges the top two.
        let (mut cfg, ctx) = harness();
        let mut solver = SmtSolver::new(&ctx);
        let mut gen = Generator::new();
        let mut state = PathState::new();
        run(&mut cfg, &["PUSH1 0x01", "PUSH1 0x02", "SWAP1"], &mut state, &mut gen, &mut solver);
        assert_eq!(state.stack.peek(0), Some(&Value::concrete(1)));
        assert_eq!(state.stack.peek(1), Some(&Value::concrete(2)));
    }

    #[test]
    fn test_06() {
        // Concrete store then load round-trips through memory.
        let (mut cfg, ctx) = harness();
        let mut solver = SmtSolver::new(&ctx);
        let mut gen = Generator::new();
        let mut state = PathState::new();
        run(
            &mut cfg,
            &["PUSH1 0x01", "PUSH1 0x10", "MSTORE", "PUSH1 0x10", "MLOAD"],
            &mut state,
            &mut gen,
            &mut solver,
        );
        assert_eq!(state.stack.peek(0), Some(&Value::concrete(1)));
    }

    #[test]
    fn test_07() {
        // A store whose popped address is symbolic havocs memory, so
        // the reload returns a fresh symbolic variable rather than the
        // previously stored 1.  MSTORE pops the address first, so the
        // symbolic term has to sit on top of the stack.
        let (mut cfg, ctx) = harness();
        let mut solver = SmtSolver::new(&ctx);
        let mut gen = Generator::new();
        let mut state = PathState::new();
        run(
            &mut cfg,
            &[
                "PUSH1 0x01",
                "PUSH1 0x10",
                "MSTORE",
                "PUSH1 0x02",
                "PUSH1 0x00",
                "CALLDATALOAD",
                "MSTORE",
                "PUSH1 0x10",
                "MLOAD",
            ],
            &mut state,
            &mut gen,
            &mut solver,
        );
        match state.stack.peek(0) {
            Some(Value::Symbolic(Term::Var(name))) => assert!(name.starts_with("mem_16_")),
            other => panic!("expected fresh symbolic, got {other:?}"),
        }
    }

    #[test]
    fn test_08() {
        // CALLDATALOAD mints a fresh input variable and records it.
        let (mut cfg, ctx) = harness();
        let mut solver = SmtSolver::new(&ctx);
        let mut gen = Generator::new();
        let mut state = PathState::new();
        run(&mut cfg, &["PUSH1 0x00", "CALLDATALOAD"], &mut state, &mut gen, &mut solver);
        assert_eq!(state.variables.len(), 1);
        assert!(matches!(state.stack.peek(0), Some(Value::Symbolic(Term::Var(_)))));
    }

    #[test]
    fn test_09() {
        // JUMP resolves its target onto the block and the edge set.
        let (mut cfg, ctx) = harness();
        let mut solver = SmtSolver::new(&ctx);
        let mut gen = Generator::new();
        let mut state = PathState::new();
        run(&mut cfg, &["PUSH1 0x08", "JUMP"], &mut state, &mut gen, &mut solver);
        assert_eq!(cfg.get(0).unwrap().jump_target(), Some(8));
        assert!(cfg.edges[&0].contains(&8));
    }

    #[test]
    fn test_10() {
        // A symbolic JUMP target resolves to the sentinel.
        let (mut cfg, ctx) = harness();
        let mut solver = SmtSolver::new(&ctx);
        let mut gen = Generator::new();
        let mut state = PathState::new();
        run(&mut cfg, &["PUSH1 0x00", "CALLDATALOAD", "JUMP"], &mut state, &mut gen, &mut solver);
        assert_eq!(cfg.get(0).unwrap().jump_target(), Some(UNKNOWN_TARGET));
    }

    #[test]
    fn test_11() {
        // Unknown and unimplemented opcodes are fatal.
        let (mut cfg, ctx) = harness();
        let mut solver = SmtSolver::new(&ctx);
        let mut gen = Generator::new();
        let mut state = PathState::new();
        let r = execute(&mut cfg, 0, "BOGUS", &mut state, &mut gen, &mut solver);
        assert_eq!(r, Err(ExecError::UnknownOpcode("BOGUS".to_string())));
        let r = execute(&mut cfg, 0, "SHA3", &mut state, &mut gen, &mut solver);
        assert_eq!(r, Err(ExecError::NotImplemented("SHA3".to_string())));
    }

    #[test]
    fn test_12() {
        // Underflow is fatal.
        let (mut cfg, ctx) = harness();
        let mut solver = SmtSolver::new(&ctx);
        let mut gen = Generator::new();
        let mut state = PathState::new();
        let r = execute(&mut cfg, 0, "ADD", &mut state, &mut gen, &mut solver);
        assert_eq!(r, Err(ExecError::StackUnderflow("ADD".to_string())));
        let r = execute(&mut cfg, 0, "MLOAD", &mut state, &mut gen, &mut solver);
        assert_eq!(r, Err(ExecError::StackUnderflow("MLOAD".to_string())));
    }

    fn harness() -> (Cfg, Context) {
        let mut cfg = Cfg::default();
        cfg.vertices.insert(0, crate::cfg::BasicBlock::new(0, 0, BlockKind::Terminal));
        cfg.edges.insert(0, Vec::new());
        (cfg, Context::new(&Config::new()))
    }

    fn run(
        cfg: &mut Cfg,
        instrs: &[&str],
        state: &mut PathState,
        gen: &mut Generator,
        solver: &mut SmtSolver,
    ) {
        for instr in instrs {
            execute(cfg, 0, instr, state, gen, solver).unwrap();
        }
    }
}
