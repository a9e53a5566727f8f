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
use log::{info, warn};

use crate::cfg::{BlockKind, Cfg, UNKNOWN_TARGET};
use crate::disasm::Addr;
use crate::semantics::{execute, ExecError};
use crate::solver::{CheckResult, SmtSolver};
use crate::state::PathState;
use crate::vargen::Generator;

// ============================================================================
// Explorer
// ============================================================================

/// Depth-first exploration of every feasible path through the graph.
/// Execution forks at conditional jumps, resolving dynamic jump
/// targets (and hence discovering edges) on the fly; the solver's
/// assertion stack mirrors the recursion, so entering a branch and
/// assuming its predicate are always paired.
pub struct Explorer<'a, 'ctx> {
    cfg: &'a mut Cfg,
    solver: &'a mut SmtSolver<'ctx>,
    run: Run,
}

/// Mutable bookkeeping threaded through the recursion.
struct Run {
    gen: Generator,
    closed: Vec<PathState>,
    unresolved_jumps: u32,
    limit: Option<usize>,
}

impl<'a, 'ctx> Explorer<'a, 'ctx> {
    pub fn new(cfg: &'a mut Cfg, solver: &'a mut SmtSolver<'ctx>) -> Self {
        Self {
            cfg,
            solver,
            run: Run {
                gen: Generator::new(),
                closed: Vec::new(),
                unresolved_jumps: 0,
                limit: None,
            },
        }
    }

    /// Bound the number of blocks visited along any one path.  With no
    /// bound, termination relies on the solver eventually refuting one
    /// side of every loop's exit condition.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.run.limit = limit;
        self
    }

    /// Explore every feasible path from the entry block.
    pub fn explore(&mut self) -> Result<(), ExecError> {
        exec_block(self.cfg, self.solver, &mut self.run, 0, PathState::new())
    }

    /// The terminal states of every path closed so far, in the order
    /// the paths terminated.
    pub fn closed_paths(&self) -> &[PathState] {
        &self.run.closed
    }

    /// Number of branches abandoned because a jump target never
    /// resolved to a known block.
    pub fn unresolved_jumps(&self) -> u32 {
        self.run.unresolved_jumps
    }
}

// ============================================================================
// Recursion
// ============================================================================

/// Symbolically execute the block at `start` against `state`, then
/// recurse into its successors.  Every fork hands each side a deep
/// clone of the state, inside a scoped solver frame carrying that
/// side's branch predicate.
fn exec_block(
    cfg: &mut Cfg,
    solver: &mut SmtSolver,
    run: &mut Run,
    start: Addr,
    mut state: PathState,
) -> Result<(), ExecError> {
    if start < 0 || !cfg.vertices.contains_key(&start) {
        warn!("unknown jump address {start}, terminating this path");
        run.unresolved_jumps += 1;
        return Ok(());
    }
    if let Some(limit) = run.limit {
        if state.visited.len() >= limit {
            warn!("visit limit {limit} reached at block {start}, pruning this path");
            return Ok(());
        }
    }
    let instructions = cfg.vertices[&start].instructions().to_vec();
    for instr in &instructions {
        execute(cfg, start, instr, &mut state, &mut run.gen, solver)?;
    }
    state.visited.push(start);
    //
    let block = &cfg.vertices[&start];
    let kind = block.kind();
    let jump_target = block.jump_target().unwrap_or(UNKNOWN_TARGET);
    let falls_to = block.falls_to().unwrap_or(UNKNOWN_TARGET);
    let branch = block.branch_expression().cloned();
    //
    match kind {
        BlockKind::Terminal => {
            info!("terminating a path, visited {:?}", state.visited);
            state.analysis.display();
            run.closed.push(state);
            Ok(())
        }
        BlockKind::Unconditional => exec_block(cfg, solver, run, jump_target, state.clone()),
        BlockKind::FallsTo => exec_block(cfg, solver, run, falls_to, state.clone()),
        BlockKind::Conditional => {
            let Some(expression) = branch else {
                // A conditional block always ends in a JUMPI, which
                // wrote the predicate before we got here.
                unreachable!("conditional block {start} has no branch expression");
            };
            let expression = expression.simplify();
            info!("branch expression: {expression}");
            {
                let mut frame = solver.scope();
                frame.assert_term(&expression);
                if frame.check() == CheckResult::Unsat {
                    info!("infeasible path detected");
                } else {
                    exec_block(cfg, &mut frame, run, jump_target, state.clone())?;
                }
            }
            let negated = expression.negate().simplify();
            info!("branch expression: {negated}");
            {
                let mut frame = solver.scope();
                frame.assert_term(&negated);
                if frame.check() == CheckResult::Unsat {
                    info!("infeasible path detected");
                } else {
                    exec_block(cfg, &mut frame, run, falls_to, state.clone())?;
                }
            }
            Ok(())
        }
    }
}
