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
use std::collections::HashMap;
use std::fmt;

use super::instruction::Instruction;

/// How far the location counter advances per emitted instruction.
/// The simulator decodes fixed-width slots (the architectural maximum
/// of 15 bytes, rounded up), which keeps label arithmetic in code
/// sections meaningful without a binary encoder.
pub const INSN_WIDTH: u64 = 16;

// ===================================================================
// Data image
// ===================================================================

/// The emitted data bytes, indexed by absolute address.  Writes may
/// land anywhere (the location counter is freely reassignable); any
/// gap this leaves behind reads back as zeroes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataImage {
    bytes: Vec<u8>,
}

impl DataImage {
    /// Write a run of bytes starting at the given address, growing
    /// the image as required.
    pub fn write(&mut self, address: u64, bytes: &[u8]) {
        let start = address as usize;
        let end = start + bytes.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(bytes);
    }

    /// Read a single byte; addresses beyond the last write are zero.
    pub fn get(&self, address: u64) -> u8 {
        self.bytes.get(address as usize).copied().unwrap_or(0)
    }

    /// One past the highest address written so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

// ===================================================================
// Driver key
// ===================================================================

/// What a `.driver`/`.handler` block is keyed by: either a literal
/// interrupt number, or a label to be bound later by the simulator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DriverKey {
    Vector(i64),
    Name(String),
}

impl fmt::Display for DriverKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DriverKey::Vector(n) => write!(f, "{n}"),
            DriverKey::Name(s) => write!(f, "{s}"),
        }
    }
}

// ===================================================================
// Program
// ===================================================================

/// The in-memory result of assembling one source text: an ordered
/// instruction stream, a data image and a symbol table, plus the
/// interrupt service routines from any driver blocks.  A program is
/// created empty by the parser, mutated by every directive and
/// instruction, and handed back by move when the parse completes,
/// whether or not errors accumulated along the way.
#[derive(Debug, Default)]
pub struct Program {
    /// The address at which the next emitted byte or instruction
    /// lands; readable in expressions as `.`.
    location_counter: u64,
    /// Labels and `.equ`-style symbols.  Resolution is eager, so an
    /// entry only exists once its definition has been parsed.
    labels: HashMap<String, u64>,
    /// The instruction stream of the `.text` sections.
    code: Vec<Instruction>,
    /// The emitted data bytes.
    data: DataImage,
    /// Interrupt service routines, each ending with its `iret`.
    drivers: HashMap<DriverKey, Vec<Instruction>>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location_counter(&self) -> u64 {
        self.location_counter
    }

    pub fn set_location_counter(&mut self, value: u64) {
        self.location_counter = value;
    }

    /// Move the location counter forward by a number of bytes.
    pub fn advance(&mut self, bytes: u64) {
        self.location_counter = self.location_counter.wrapping_add(bytes);
    }

    // ----------------------------------------------------------------
    // Symbols
    // ----------------------------------------------------------------

    /// Record a label at the current location counter.  Returns false
    /// when the label already exists (a label may not be declared
    /// twice, unlike a `.equ` symbol).
    pub fn define_label(&mut self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        if self.labels.contains_key(&name) {
            return false;
        }
        self.labels.insert(name, self.location_counter);
        true
    }

    /// Bind a symbol to a value, overwriting any previous binding.
    pub fn define_symbol(&mut self, name: &str, value: u64) {
        self.labels.insert(name.to_ascii_lowercase(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<u64> {
        self.labels.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn symbols(&self) -> &HashMap<String, u64> {
        &self.labels
    }

    // ----------------------------------------------------------------
    // Code
    // ----------------------------------------------------------------

    /// Append an instruction to the code stream, advancing the
    /// location counter by one instruction slot.
    pub fn emit(&mut self, insn: Instruction) {
        self.code.push(insn);
        self.advance(INSN_WIDTH);
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    // ----------------------------------------------------------------
    // Data
    // ----------------------------------------------------------------

    /// Emit raw bytes into the data image at the location counter.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.write(self.location_counter, bytes);
        self.advance(bytes.len() as u64);
    }

    /// Emit a little-endian scalar of the given width in bytes.
    pub fn write_scalar(&mut self, value: i64, width: u8) {
        let width = width.clamp(1, 8) as usize;
        let bytes = value.to_le_bytes();
        self.write_bytes(&bytes[..width]);
    }

    pub fn data(&self) -> &DataImage {
        &self.data
    }

    // ----------------------------------------------------------------
    // Drivers
    // ----------------------------------------------------------------

    /// Install an interrupt service routine.  A later block for the
    /// same key replaces the earlier one.
    pub fn install_driver(&mut self, key: DriverKey, body: Vec<Instruction>) {
        self.drivers.insert(key, body);
    }

    pub fn drivers(&self) -> &HashMap<DriverKey, Vec<Instruction>> {
        &self.drivers
    }
}

// ======================================================
// Tests
// ======================================================
