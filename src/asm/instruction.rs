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

use super::lexer::suffix_size;
use super::operand::{MemoryOperand, Operand, RegisterOperand};

// ===================================================================
// Instruction
// ===================================================================

/// Every supported mnemonic maps onto one of eight structural
/// classes, which is all a downstream encoder or simulator needs to
/// pattern-match on.  The mnemonic is stored with its width suffix
/// stripped (`movq` becomes `mov`); widths live in the operands, or
/// in `size` for the few forms with no operand to pin one down.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Class 0: software interrupts and processor stops (`int n`,
    /// `hlt`, `nop`).  The vector is -1 when there is none.
    Interrupt { mnemonic: String, vector: i64 },
    /// Class 1: data movement (`mov`, `push`/`pop`, `movs`/`movz`,
    /// `lea`, the string moves and flag pushes).  Either operand may
    /// be absent; `size` carries the suffix width (in bytes) only
    /// when no operand does.
    DataMovement {
        mnemonic: String,
        src: Option<Operand>,
        dst: Option<Operand>,
        size: Option<u8>,
    },
    /// Class 2: binary arithmetic and logic (`add`, `sub`, `adc`,
    /// `sbb`, `cmp`, `test`, `and`, `or`, `xor`) plus the unary
    /// `neg`/`not`, which leave `src` empty.
    Arithmetic { mnemonic: String, src: Option<Operand>, dst: Operand },
    /// Class 3: shifts.  The count is absent when implicit.
    Shift { mnemonic: String, count: Option<i32>, dst: RegisterOperand },
    /// Class 4: flag manipulation (the `cl*`/`st*` family).
    Flag { mnemonic: String },
    /// Class 5: unconditional control transfer (`jmp`, `call`, `ret`,
    /// and the `iret` closing a driver block).  `ret`/`iret` carry no
    /// target.
    ControlTransfer { mnemonic: String, target: Option<Operand> },
    /// Class 6: conditional jumps.  The target is always a memory
    /// reference.
    ConditionalJump { mnemonic: String, target: MemoryOperand },
    /// Class 7: port I/O, with the transfer width in bytes.
    PortIo { mnemonic: String, size: u8 },
}

impl Instruction {
    /// The structural class this instruction belongs to.
    pub fn class(&self) -> u8 {
        match self {
            Instruction::Interrupt { .. } => 0,
            Instruction::DataMovement { .. } => 1,
            Instruction::Arithmetic { .. } => 2,
            Instruction::Shift { .. } => 3,
            Instruction::Flag { .. } => 4,
            Instruction::ControlTransfer { .. } => 5,
            Instruction::ConditionalJump { .. } => 6,
            Instruction::PortIo { .. } => 7,
        }
    }

    /// The mnemonic, suffix stripped.
    pub fn mnemonic(&self) -> &str {
        match self {
            Instruction::Interrupt { mnemonic, .. }
            | Instruction::DataMovement { mnemonic, .. }
            | Instruction::Arithmetic { mnemonic, .. }
            | Instruction::Shift { mnemonic, .. }
            | Instruction::Flag { mnemonic }
            | Instruction::ControlTransfer { mnemonic, .. }
            | Instruction::ConditionalJump { mnemonic, .. }
            | Instruction::PortIo { mnemonic, .. } => mnemonic,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Interrupt { mnemonic, vector } => {
                if *vector >= 0 {
                    write!(f, "{mnemonic} {vector}")
                } else {
                    write!(f, "{mnemonic}")
                }
            }
            Instruction::DataMovement { mnemonic, src, dst, size } => {
                write!(f, "{mnemonic}")?;
                if let Some(c) = size.and_then(suffix_char) {
                    write!(f, "{c}")?;
                }
                match (src, dst) {
                    (Some(s), Some(d)) => write!(f, " {s}, {d}"),
                    (Some(s), None) => write!(f, " {s}"),
                    (None, Some(d)) => write!(f, " {d}"),
                    (None, None) => Ok(()),
                }
            }
            Instruction::Arithmetic { mnemonic, src, dst } => match src {
                Some(s) => write!(f, "{mnemonic} {s}, {dst}"),
                None => write!(f, "{mnemonic} {dst}"),
            },
            Instruction::Shift { mnemonic, count, dst } => match count {
                Some(c) => write!(f, "{mnemonic} ${c}, {dst}"),
                None => write!(f, "{mnemonic} {dst}"),
            },
            Instruction::Flag { mnemonic } => write!(f, "{mnemonic}"),
            Instruction::ControlTransfer { mnemonic, target } => match target {
                Some(t) => write!(f, "{mnemonic} {t}"),
                None => write!(f, "{mnemonic}"),
            },
            Instruction::ConditionalJump { mnemonic, target } => {
                write!(f, "{mnemonic} {target}")
            }
            Instruction::PortIo { mnemonic, size } => {
                write!(f, "{mnemonic}")?;
                if let Some(c) = suffix_char(*size) {
                    write!(f, "{c}")?;
                }
                Ok(())
            }
        }
    }
}

/// The suffix character denoting a width in bytes.
fn suffix_char(bytes: u8) -> Option<char> {
    match bytes {
        1 => Some('b'),
        2 => Some('w'),
        4 => Some('l'),
        8 => Some('q'),
        _ => None,
    }
}

// ===================================================================
// Suffix stripping
// ===================================================================

/// Split a lexed mnemonic into its base and the width (in bytes) of
/// its optional single-character suffix.  The lexer only classifies
/// well-formed members of a family, so a lexeme which is not a bare
/// base must end in a valid suffix character.
pub(crate) fn split_mnemonic<'a>(lexeme: &'a str, bases: &[&str]) -> (&'a str, Option<u8>) {
    if bases.contains(&lexeme) || lexeme.len() < 2 {
        return (lexeme, None);
    }
    let (stem, last) = lexeme.split_at(lexeme.len() - 1);
    match last.chars().next().and_then(suffix_size) {
        Some(n) if bases.contains(&stem) => (stem, Some(n)),
        _ => (lexeme, None),
    }
}

/// Split a `movs`/`movz` extension into its base, the source and
/// destination widths in bytes, and the raw source suffix character.
pub(crate) fn split_extension(lexeme: &str) -> (&str, u8, u8, char) {
    let (stem, pair) = lexeme.split_at(lexeme.len() - 2);
    let mut cs = pair.chars();
    let first = cs.next().unwrap_or('b');
    let second = cs.next().unwrap_or('q');
    (
        stem,
        suffix_size(first).unwrap_or(1),
        suffix_size(second).unwrap_or(8),
        first,
    )
}

// ======================================================
// Tests
// ======================================================
