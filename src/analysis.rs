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

use log::info;

use crate::state::{Memory, Stack};

/// Per-path facts aggregated alongside interpretation.  The engine
/// itself never inspects this; it hands the bag the opcode and the
/// pre-state before each transfer, and displays it when a path closes.
#[derive(Clone, Debug, Default)]
pub struct Analysis {
    /// Total number of instructions executed on this path.
    executed: u64,
    /// Execution count per opcode.
    opcodes: BTreeMap<String, u64>,
    /// Deepest stack observed.
    peak_stack: usize,
    /// Number of instructions executed while memory held entries.
    memory_live: u64,
}

impl Analysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one instruction about to execute against its pre-state.
    pub fn update(&mut self, opcode: &str, stack: &Stack, memory: &Memory) {
        self.executed += 1;
        *self.opcodes.entry(opcode.to_string()).or_insert(0) += 1;
        self.peak_stack = self.peak_stack.max(stack.len());
        if !memory.is_empty() {
            self.memory_live += 1;
        }
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Report the accumulated facts for a closed path.
    pub fn display(&self) {
        info!("instructions executed: {}", self.executed);
        info!("peak stack depth: {}", self.peak_stack);
        info!("instructions with live memory: {}", self.memory_live);
        for (opcode, count) in &self.opcodes {
            info!("  {opcode}: {count}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Memory, Stack};
    use crate::value::Value;

    #[test]
    fn test_01() {
        let mut analysis = Analysis::new();
        let mut stack = Stack::new();
        let memory = Memory::new();
        stack.push(Value::concrete(1));
        analysis.update("PUSH1", &stack, &memory);
        analysis.update("POP", &stack, &memory);
        assert_eq!(analysis.executed(), 2);
        assert_eq!(analysis.peak_stack, 1);
        assert_eq!(analysis.opcodes["PUSH1"], 1);
    }
}
