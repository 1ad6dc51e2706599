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

//! The assembler core.  This turns a single source text written in an
//! AT&T-flavoured 64-bit dialect into an in-memory [`Program`]: an
//! ordered stream of instructions, a data image and a symbol table,
//! suitable for a downstream simulator.  Assembly is a single forward
//! pass; labels are resolved eagerly, so a memory reference to a
//! label must come after its definition.

use std::fmt;

use log::debug;

/// Expression evaluation.
pub mod expr;
/// Instruction model and mnemonic families.
pub mod instruction;
/// Tokens and the scanner rule table.
pub mod lexer;
/// Operand model.
pub mod operand;
/// The grammar-directed parser.
pub mod parser;
/// The program being constructed.
pub mod program;

pub use instruction::Instruction;
pub use operand::{MemoryOperand, Operand, RegisterOperand};
pub use parser::Parser;
pub use program::{DataImage, DriverKey, Program, INSN_WIDTH};

// ===================================================================
// Parse Error
// ===================================================================

/// Identifies the different kinds of diagnostic which can arise when
/// assembling a source text.
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorCode {
    /// A character the lexer could not assign to any token class was
    /// reached by the parser.
    UnexpectedCharacter(char),
    /// A well-formed token showed up where the grammar does not allow
    /// it.
    UnexpectedToken(String),
    /// A specific token was required by the grammar but something
    /// else was found.
    ExpectedToken(&'static str),
    /// The source ended before the grammar was complete (e.g. a
    /// missing `.end`).
    UnexpectedEof,
    /// An operand's width disagrees with the instruction suffix.
    SuffixMismatch,
    /// An operand's width disagrees with an extension suffix pair.
    OperandSizeMismatch,
    /// A `movs`/`movz` suffix pair which does not actually widen,
    /// carrying the source and destination widths in bytes.
    ExtensionOrder(u8, u8),
    /// A `movs`/`movz` suffix pair whose source width is not one of
    /// b/w/l.
    ExtensionPrefix,
    /// The fixed-register pattern of `in`/`out` was violated.
    WrongOperands(String),
    /// An `ins`/`outs` mnemonic with a missing or quad suffix.
    WrongIoSuffix(String),
    /// A direct memory reference names a label that has not been
    /// defined yet.
    UndefinedLabel,
    /// An expression names a symbol that has not been defined yet.
    UndefinedSymbol(String),
    /// A label was declared twice.
    DuplicateLabel(String),
    /// Float literals are lexed but not supported.
    Flonum,
    /// Division by zero inside a constant expression.
    DivisionByZero,
    /// An integer literal which could not be converted.
    InvalidNumber(String),
    /// Base and index registers of a memory operand differ in width.
    AddressingSizeMismatch,
    /// A driver block reached the end of its section without `iret`.
    UnterminatedDriver,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorCode::UnexpectedCharacter(c) => {
                write!(f, "Unexpected character '{c}'")
            }
            ErrorCode::UnexpectedToken(s) => write!(f, "Unexpected '{s}'"),
            ErrorCode::ExpectedToken(s) => write!(f, "Expected {s}"),
            ErrorCode::UnexpectedEof => write!(f, "Unexpected end of file"),
            ErrorCode::SuffixMismatch => {
                write!(f, "Operand size and instruction suffix mismatch.")
            }
            ErrorCode::OperandSizeMismatch => write!(f, "Operand size mismatch."),
            ErrorCode::ExtensionOrder(src, dst) => {
                write!(f, "Wrong suffices for extension: cannot extend from {src} to {dst}")
            }
            ErrorCode::ExtensionPrefix => {
                write!(f, "Zero/Sign extension with wrong source prefix type")
            }
            ErrorCode::WrongOperands(m) => {
                write!(f, "Wrong operands for instruction {m}.")
            }
            ErrorCode::WrongIoSuffix(m) => {
                write!(f, "Wrong size suffix for instruction {m}")
            }
            ErrorCode::UndefinedLabel => {
                write!(f, "Trying to address a label which has not been defined")
            }
            ErrorCode::UndefinedSymbol(s) => write!(f, "Undefined symbol '{s}'"),
            ErrorCode::DuplicateLabel(s) => {
                write!(f, "Label '{s}' has already been defined")
            }
            ErrorCode::Flonum => write!(f, "FLONUMS are still not supported"),
            ErrorCode::DivisionByZero => write!(f, "Division by zero"),
            ErrorCode::InvalidNumber(s) => write!(f, "Invalid integer literal '{s}'"),
            ErrorCode::AddressingSizeMismatch => {
                write!(f, "Base and index registers must have the same size")
            }
            ErrorCode::UnterminatedDriver => {
                write!(f, "Driver block not terminated by iret")
            }
        }
    }
}

/// A diagnostic produced whilst assembling, carrying a human-readable
/// message along with the (one-based) source position it arose at.
/// Any number of these can accumulate during a single parse; the
/// (partial) program is still handed back so that downstream tooling
/// can render what was understood.
#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    pub code: ErrorCode,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(code: ErrorCode, line: usize, column: usize) -> Self {
        Self { code, line, column }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.code)
    }
}

impl std::error::Error for ParseError {}

// ===================================================================
// Entry point
// ===================================================================

/// Assemble a source text into a program.  This never fails outright:
/// whatever could be understood ends up in the program, and every
/// statement that could not be is reported in the error list.
pub fn assemble(input: &str) -> (Program, Vec<ParseError>) {
    let (program, errors) = Parser::new(input).parse();
    //
    debug!(
        "assembled {} instructions, {} labels, {} data bytes, {} drivers ({} errors)",
        program.code().len(),
        program.symbols().len(),
        program.data().len(),
        program.drivers().len(),
        errors.len()
    );
    //
    (program, errors)
}
