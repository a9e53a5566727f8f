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
use crate::value::Value;

/// Mints names for symbolic variables.  Every call returns a globally
/// fresh name; calldata and memory variables carry a tag recording
/// where they came from.
#[derive(Debug, Default)]
pub struct Generator {
    counter: usize,
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh input variable for the calldata word at `position`.
    pub fn gen_data_var(&mut self, position: &Value) -> String {
        format!("Id_{}_{}", tag(position), self.next())
    }

    /// A fresh variable for the overall calldata size.
    pub fn gen_data_size(&mut self) -> String {
        format!("Id_size_{}", self.next())
    }

    /// A fresh variable for the memory word at `address`.
    pub fn gen_mem_var(&mut self, address: &Value) -> String {
        format!("mem_{}_{}", tag(address), self.next())
    }

    fn next(&mut self) -> usize {
        let n = self.counter;
        self.counter += 1;
        n
    }
}

fn tag(value: &Value) -> String {
    match value {
        Value::Concrete(n) => n.to_string(),
        Value::Symbolic(_) => "sym".to_string(),
    }
}
