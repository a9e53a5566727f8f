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

/// The analysis side-channel which aggregates per-instruction facts
/// along each path and reports them when a path terminates.
pub mod analysis;
/// Basic blocks and the control-flow graph.  Blocks are keyed by their
/// entry address; edges grow during exploration as dynamic jump
/// targets resolve.
pub mod cfg;
/// Functionality for turning a textual disassembly into tokens and
/// then into address-indexed block tables.
pub mod disasm;
/// The depth-first path explorer, which forks execution at conditional
/// jumps and prunes infeasible branches through the solver.
pub mod explorer;
/// The per-instruction transfer function over the mixed
/// concrete/symbolic state.
pub mod semantics;
/// A thin facade around the SMT solver offering push, pop, assert and
/// check, plus the lowering from terms to solver expressions.
pub mod solver;
/// Abstractions of execution state: operand stack, scratch memory and
/// the per-path bundle forked at every branch.
pub mod state;
/// The symbolic term language.
pub mod term;
/// The mixed concrete/symbolic value domain.
pub mod value;
/// Fresh-name generation for symbolic variables.
pub mod vargen;
