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

use log::debug;

use super::lexer::{Lexer, Span, Token};
use crate::cfg::BlockKind;

/// A bytecode offset.  Signed so that an unresolved jump target can be
/// carried as a negative sentinel during exploration.
pub type Addr = i64;

// =========================================================================
// Error
// =========================================================================

/// Identifies possible errors stemming from the partitioner.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseError {
    /// An instruction address which did not parse as a decimal number,
    /// along with its character offset in the input.
    InvalidAddress(usize),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::InvalidAddress(offset) => {
                write!(f, "invalid instruction address at offset {offset}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

// =========================================================================
// Disassembly
// =========================================================================

/// The address-indexed tables produced by partitioning a disassembly
/// listing into basic blocks.  Blocks are keyed by their entry address.
#[derive(Clone, Debug, Default)]
pub struct Disassembly {
    /// Every instruction, keyed by its address.  The stored text is the
    /// mnemonic followed by any operands.
    pub instructions: BTreeMap<Addr, String>,
    /// The address of the last instruction of each block.
    pub block_ends: BTreeMap<Addr, Addr>,
    /// The jump kind of each block.
    pub jump_kinds: BTreeMap<Addr, BlockKind>,
}

// =========================================================================
// Parser
// =========================================================================

/// Partitions a disassembly listing into basic blocks using a single
/// left-to-right scan.  Only the boundary mnemonics matter: `JUMPDEST`
/// opens a block, whilst `JUMP`, `JUMPI`, `STOP`, `RETURN` and
/// `SUICIDE` close one.
pub struct Parser {
    lexer: Lexer,
    /// Address of the instruction currently being scanned.
    address: Addr,
    /// Address of the previous instruction.
    last_address: Addr,
    /// Entry address of the block currently being scanned.
    block: Addr,
    /// Accumulated text of the current line.
    line: String,
    /// Set when the next number token is an instruction address.
    new_line: bool,
    /// Set when the next instruction address opens a new block.
    new_block: bool,
    tables: Disassembly,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Self {
            lexer: Lexer::new(input),
            address: 0,
            last_address: 0,
            block: 0,
            line: String::new(),
            new_line: true,
            new_block: false,
            tables: Disassembly::default(),
        }
    }

    /// Run the scan to completion, producing the block tables.
    pub fn parse(mut self) -> Result<Disassembly, ParseError> {
        // The first line of the listing is a free-form header.
        self.skip_header();
        //
        loop {
            let span = self.lexer.next();
            match span.kind {
                Token::EOF => {
                    break;
                }
                Token::Number if self.new_line => {
                    self.scan_address(span)?;
                }
                Token::NewLine => {
                    self.end_line();
                }
                Token::Name => {
                    let text = self.lexer.get(span);
                    self.scan_mnemonic(&text);
                }
                Token::Number => {
                    // An operand, e.g. of a DUP or SWAP.
                    self.append(&self.lexer.get(span));
                }
                Token::Colon | Token::Equals | Token::RightAngle | Token::Other => {
                    // Decorative punctuation emitted by the
                    // disassembler (e.g. the `=>` marker).
                }
                Token::Gap => unreachable!(),
            }
        }
        self.finish();
        //
        Ok(self.tables)
    }

    /// Discard tokens up to (and including) the first newline.
    fn skip_header(&mut self) {
        loop {
            match self.lexer.next().kind {
                Token::NewLine | Token::EOF => {
                    return;
                }
                _ => {}
            }
        }
    }

    /// Record the address beginning a new instruction row.
    fn scan_address(&mut self, span: Span) -> Result<(), ParseError> {
        let text = self.lexer.get(span);
        self.last_address = self.address;
        self.address = match text.parse::<Addr>() {
            Ok(n) => n,
            Err(_) => {
                return Err(ParseError::InvalidAddress(span.start));
            }
        };
        self.new_line = false;
        if self.new_block {
            self.block = self.address;
            self.new_block = false;
        }
        Ok(())
    }

    /// Store the accumulated line content against the current address.
    fn end_line(&mut self) {
        self.new_line = true;
        if !self.line.is_empty() {
            debug!("{}: {}", self.address, self.line.trim_end());
            let line = std::mem::take(&mut self.line);
            self.tables.instructions.insert(self.address, line.trim_end().to_string());
        }
    }

    /// Dispatch on a mnemonic, updating the block tables for the
    /// boundary instructions.
    fn scan_mnemonic(&mut self, text: &str) {
        match text {
            "JUMPDEST" => {
                // Close the previous block, unless this instruction
                // itself opened the current one.
                if self.block != self.address {
                    self.tables.block_ends.insert(self.block, self.last_address);
                }
                self.block = self.address;
                self.new_block = false;
            }
            "STOP" | "RETURN" | "SUICIDE" => {
                self.tables.jump_kinds.insert(self.block, BlockKind::Terminal);
                self.tables.block_ends.insert(self.block, self.address);
            }
            "JUMP" => {
                self.tables.jump_kinds.insert(self.block, BlockKind::Unconditional);
                self.tables.block_ends.insert(self.block, self.address);
                self.new_block = true;
            }
            "JUMPI" => {
                self.tables.jump_kinds.insert(self.block, BlockKind::Conditional);
                self.tables.block_ends.insert(self.block, self.address);
                self.new_block = true;
            }
            _ => {}
        }
        self.new_line = false;
        self.append(text);
        if text.starts_with("PUSH") {
            self.scan_push_operand();
        }
    }

    /// Consume the remainder of a `PUSH` row, concatenating every token
    /// which parses as a hexadecimal integer into a single immediate.
    fn scan_push_operand(&mut self) {
        let mut immediate = String::new();
        loop {
            let span = self.lexer.next();
            match span.kind {
                Token::NewLine | Token::EOF => {
                    if !immediate.is_empty() {
                        self.line.push_str("0x");
                        self.line.push_str(&immediate);
                        self.line.push(' ');
                    }
                    self.end_line();
                    return;
                }
                _ => {
                    let text = self.lexer.get(span);
                    let digits = text.strip_prefix("0x").unwrap_or(&text);
                    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()) {
                        immediate.push_str(digits);
                    }
                }
            }
        }
    }

    /// Append a token to the accumulated line content.
    fn append(&mut self, text: &str) {
        self.line.push_str(text);
        self.line.push(' ');
    }

    /// Apply the post-scan fixups: close the trailing block, type it,
    /// and default every untyped block to a fall-through.
    fn finish(&mut self) {
        // Flush a final row lacking its newline.
        self.end_line();
        //
        if !self.tables.block_ends.contains_key(&self.block) {
            debug!("closing trailing block {} at {}", self.block, self.address);
            self.tables.block_ends.insert(self.block, self.address);
        }
        if !self.tables.jump_kinds.contains_key(&self.block) {
            self.tables.jump_kinds.insert(self.block, BlockKind::Terminal);
        }
        let untyped: Vec<Addr> = self
            .tables
            .block_ends
            .keys()
            .filter(|k| !self.tables.jump_kinds.contains_key(k))
            .copied()
            .collect();
        for key in untyped {
            self.tables.jump_kinds.insert(key, BlockKind::FallsTo);
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
