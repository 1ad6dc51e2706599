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

use crate::amd64;

// ===================================================================
// Register
// ===================================================================

/// A register operand: an index into the architectural register file
/// together with the access width in bits (8, 16, 32 or 64).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterOperand {
    pub id: u8,
    pub size: u8,
}

impl RegisterOperand {
    pub fn new(id: u8, size: u8) -> Self {
        Self { id, size }
    }

    /// The access width in bytes.
    pub fn bytes(&self) -> u8 {
        self.size / 8
    }
}

impl fmt::Display for RegisterOperand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "%{}", amd64::register_name(self.id, self.size))
    }
}

// ===================================================================
// Memory
// ===================================================================

/// A memory operand in `disp(base, index, scale)` form, where any of
/// the parts may be absent (though never all of them at once; the
/// grammar refuses an empty addressing form).  The operand width is
/// carried over from the instruction suffix, never inferred.  When a
/// scale is present the index is too, and base and index always agree
/// in width; both hold by construction in the parser.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryOperand {
    pub base: Option<RegisterOperand>,
    pub index: Option<RegisterOperand>,
    pub scale: Option<u8>,
    pub displacement: Option<i32>,
    /// Operand width in bytes.
    pub operand_size: Option<u8>,
}

impl fmt::Display for MemoryOperand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(d) = self.displacement {
            write!(f, "{d}")?;
        }
        if let Some(base) = self.base {
            write!(f, "({base}")?;
            if let Some(index) = self.index {
                write!(f, ", {index}")?;
            }
            if let Some(scale) = self.scale {
                write!(f, ", {scale}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

// ===================================================================
// Operand
// ===================================================================

/// Any operand: a 64-bit immediate, a register, or a memory
/// reference.  The format sub-parsers hand back narrowed types where
/// the grammar demands one (FormatG yields a [`RegisterOperand`],
/// FormatM a [`MemoryOperand`]); this is the common denominator the
/// instruction records store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Immediate(i64),
    Register(RegisterOperand),
    Memory(MemoryOperand),
}

impl Operand {
    /// The width of this operand in bytes, where it pins one down.
    /// Immediates are width-less, and a memory operand only carries
    /// the width its instruction suffix gave it.
    pub fn size_bytes(&self) -> Option<u8> {
        match self {
            Operand::Immediate(_) => None,
            Operand::Register(r) => Some(r.bytes()),
            Operand::Memory(m) => m.operand_size,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Immediate(v) => write!(f, "${v}"),
            Operand::Register(r) => write!(f, "{r}"),
            Operand::Memory(m) => write!(f, "{m}"),
        }
    }
}
