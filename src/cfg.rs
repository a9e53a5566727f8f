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
use std::collections::BTreeMap;
use std::fmt;

use crate::disasm::{Addr, Disassembly};
use crate::term::Term;

/// Sentinel recorded when a jump's destination could not be
/// concretised.  Exploration abandons any branch entering it.
pub const UNKNOWN_TARGET: Addr = -1;

// ============================================================================
// Block Kind
// ============================================================================

/// Classification of a block's terminator: no successor at all, an
/// unconditional or conditional jump, or an implicit fall-through into
/// the next block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Conditional,
    FallsTo,
    Terminal,
    Unconditional,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BlockKind::Conditional => "conditional",
            BlockKind::FallsTo => "falls_to",
            BlockKind::Terminal => "terminal",
            BlockKind::Unconditional => "unconditional",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Basic Block
// ============================================================================

/// A maximal straight-line instruction sequence with a single entry
/// (its first instruction) and a single exit (its last).  Blocks are
/// identified by their starting address; inter-block references are
/// always addresses, never pointers, since the graph may be cyclic.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    /// Address of the first instruction of this block.
    pub start: Addr,
    /// Address of the last instruction of this block (inclusive).
    pub end: Addr,
    /// The instructions covered, in address order.
    instructions: Vec<String>,
    kind: BlockKind,
    /// Target written by a `JUMP`/`JUMPI` when it resolves at
    /// interpret time.  Negative when the target remained symbolic.
    jump_target: Option<Addr>,
    /// Address of the next block in ascending order, for blocks which
    /// can fall through.
    falls_to: Option<Addr>,
    /// Predicate written by a `JUMPI`.
    branch_expression: Option<Term>,
}

impl BasicBlock {
    pub fn new(start: Addr, end: Addr, kind: BlockKind) -> Self {
        Self {
            start,
            end,
            instructions: Vec::new(),
            kind,
            jump_target: None,
            falls_to: None,
            branch_expression: None,
        }
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn instructions(&self) -> &[String] {
        &self.instructions
    }

    pub fn add_instruction(&mut self, instruction: String) {
        self.instructions.push(instruction);
    }

    pub fn jump_target(&self) -> Option<Addr> {
        self.jump_target
    }

    pub fn set_jump_target(&mut self, target: Addr) {
        self.jump_target = Some(target);
    }

    pub fn falls_to(&self) -> Option<Addr> {
        self.falls_to
    }

    pub fn set_falls_to(&mut self, target: Addr) {
        self.falls_to = Some(target);
    }

    pub fn branch_expression(&self) -> Option<&Term> {
        self.branch_expression.as_ref()
    }

    pub fn set_branch_expression(&mut self, expression: Term) {
        self.branch_expression = Some(expression);
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "block {}..{} ({})", self.start, self.end, self.kind)?;
        for insn in &self.instructions {
            writeln!(f, "  {insn}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Control-Flow Graph
// ============================================================================

/// The control-flow graph: blocks keyed by entry address, plus the
/// successor lists.  Static fall-through edges are seeded by
/// `add_falls_to`; jump edges are discovered during exploration and
/// appended via `add_edge`.
#[derive(Clone, Debug, Default)]
pub struct Cfg {
    pub vertices: BTreeMap<Addr, BasicBlock>,
    pub edges: BTreeMap<Addr, Vec<Addr>>,
}

impl Cfg {
    /// Materialise basic blocks from the partitioner's tables.  Each
    /// block covers the instructions in `[start, end]`.
    pub fn from_disassembly(disasm: &Disassembly) -> Self {
        let mut cfg = Cfg::default();
        for (&start, &end) in &disasm.block_ends {
            let kind = disasm.jump_kinds[&start];
            let mut block = BasicBlock::new(start, end, kind);
            for (_, insn) in disasm.instructions.range(start..=end) {
                block.add_instruction(insn.clone());
            }
            cfg.vertices.insert(start, block);
            cfg.edges.insert(start, Vec::new());
        }
        cfg
    }

    /// Seed the static fall-through edges: every block which neither
    /// terminates nor jumps unconditionally is wired to the next block
    /// in ascending address order.
    pub fn add_falls_to(&mut self) {
        let keys: Vec<Addr> = self.vertices.keys().copied().collect();
        for pair in keys.windows(2) {
            let (key, target) = (pair[0], pair[1]);
            let kind = self.vertices[&key].kind();
            if kind != BlockKind::Terminal && kind != BlockKind::Unconditional {
                self.add_edge(key, target);
                if let Some(block) = self.vertices.get_mut(&key) {
                    block.set_falls_to(target);
                }
            }
        }
    }

    /// Append an edge, keeping each successor list duplicate-free.
    pub fn add_edge(&mut self, from: Addr, to: Addr) {
        let successors = self.edges.entry(from).or_default();
        if !successors.contains(&to) {
            successors.push(to);
        }
    }

    pub fn get(&self, address: Addr) -> Option<&BasicBlock> {
        self.vertices.get(&address)
    }

    pub fn get_mut(&mut self, address: Addr) -> Option<&mut BasicBlock> {
        self.vertices.get_mut(&address)
    }
}

// ============================================================================
// Tests
// ============================================================================
