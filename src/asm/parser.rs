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
use crate::amd64;
use crate::lex::Span;

use super::expr::{self, integer_value, EvalContext};
use super::instruction::{split_extension, split_mnemonic, Instruction};
use super::lexer::{
    Lexer, Token, INSN_0_BASES, INSN_0_WQ_BASES, INSN_1_E_BASES, INSN_B_E_BASES,
    INSN_IO_S_BASES, INSN_JC_BASES, INSN_SHIFT_BASES,
};
use super::operand::{MemoryOperand, Operand, RegisterOperand};
use super::program::{DriverKey, Program, INSN_WIDTH};
use super::{ErrorCode, ParseError};

// ===================================================================
// Parser
// ===================================================================

/// The grammar-directed parser.  It pulls tokens from the lexer on
/// demand, writes everything it understands into the program, and
/// never backtracks beyond one token of lookahead (two for the
/// displacement of a memory operand).  Any error inside a statement
/// is caught at the statement boundary; the cursor then skips to the
/// next statement terminator and parsing resumes, so one bad line
/// never takes the rest of the program with it.
pub struct Parser {
    lexer: Lexer,
    program: Program,
    errors: Vec<ParseError>,
}

impl Parser {
    /// Construct a parser over a given source text.
    pub fn new(input: &str) -> Self {
        Self { lexer: Lexer::new(input), program: Program::new(), errors: Vec::new() }
    }

    /// Run the parse to completion.  The program holds whatever was
    /// understood, alongside every diagnostic raised on the way.
    pub fn parse(mut self) -> (Program, Vec<ParseError>) {
        loop {
            let lookahead = self.lexer.peek();
            match lookahead.kind {
                Token::Newline => {
                    self.lexer.next();
                }
                Token::LocationCounter | Token::Org => {
                    let r = self.parse_location_counter();
                    if let Err(e) = r {
                        self.recover(e);
                    }
                }
                Token::Data | Token::Bss => self.parse_data_section(),
                Token::Text => self.parse_code_section(),
                Token::Driver | Token::Handler => self.parse_driver_block(),
                Token::End => {
                    self.lexer.next();
                    self.parse_epilogue();
                    break;
                }
                Token::EOF => {
                    let e = self.lexer.error_at(lookahead, ErrorCode::UnexpectedEof);
                    self.errors.push(e);
                    break;
                }
                _ => {
                    let e = self.unexpected(lookahead);
                    self.recover(e);
                }
            }
        }
        (self.program, self.errors)
    }

    // ----------------------------------------------------------------
    // Error recovery
    // ----------------------------------------------------------------

    /// Record a diagnostic and resynchronise at the next statement:
    /// the cursor advances until a statement terminator (or the end
    /// of the input) has been consumed.
    fn recover(&mut self, error: ParseError) {
        self.errors.push(error);
        loop {
            let t = self.lexer.next();
            match t.kind {
                Token::Newline | Token::EOF => return,
                _ => {}
            }
        }
    }

    /// Build the diagnostic for a token the grammar has no use for at
    /// the current position.
    fn unexpected(&self, span: Span<Token>) -> ParseError {
        let lexeme = self.lexer.get_str(span);
        let code = match span.kind {
            Token::Error => {
                ErrorCode::UnexpectedCharacter(lexeme.chars().next().unwrap_or('?'))
            }
            Token::EOF => ErrorCode::UnexpectedEof,
            _ => ErrorCode::UnexpectedToken(lexeme),
        };
        self.lexer.error_at(span, code)
    }

    /// A statement only ends at a terminator (or the end of input);
    /// trailing junk on the line is an error.
    fn end_of_statement(&mut self) -> Result<(), ParseError> {
        let lookahead = self.lexer.peek();
        match lookahead.kind {
            Token::Newline | Token::EOF => Ok(()),
            _ => Err(self.unexpected(lookahead)),
        }
    }

    /// Evaluate an expression against the current program state.
    fn expression(&mut self) -> Result<i64, ParseError> {
        let ctx = EvalContext::of(&self.program);
        expr::expression(&mut self.lexer, &ctx)
    }

    // ----------------------------------------------------------------
    // Location counter
    // ----------------------------------------------------------------

    /// `. = expr`, `.org expr` or `.org expr, expr` (the second
    /// expression is the historical fill value, which is discarded).
    fn parse_location_counter(&mut self) -> Result<(), ParseError> {
        let t = self.lexer.next();
        let value = match t.kind {
            Token::LocationCounter => {
                self.lexer.snap(Token::Equals, "'='")?;
                self.expression()?
            }
            _ => {
                let value = self.expression()?;
                if self.lexer.peek().kind == Token::Comma {
                    self.lexer.next();
                    let _ = self.expression()?;
                }
                value
            }
        };
        self.program.set_location_counter(value as u64);
        self.end_of_statement()
    }

    // ----------------------------------------------------------------
    // Data sections
    // ----------------------------------------------------------------

    fn parse_data_section(&mut self) {
        self.lexer.next(); // .data or .bss
        let r = self.end_of_statement();
        if let Err(e) = r {
            self.recover(e);
        }
        loop {
            let lookahead = self.lexer.peek();
            let r = match lookahead.kind {
                Token::Newline => {
                    self.lexer.next();
                    Ok(())
                }
                Token::LocationCounter | Token::Org => self.parse_location_counter(),
                Token::Equ => self.parse_equ(),
                Token::Identifier => self.parse_assignment(),
                Token::Label => {
                    self.lexer.next();
                    self.define_label_from(lookahead);
                    Ok(())
                }
                Token::Byte => self.parse_data_values(1),
                Token::Word => self.parse_data_values(2),
                Token::Long => self.parse_data_values(4),
                Token::Quad => self.parse_data_values(8),
                Token::Ascii => self.parse_ascii(),
                Token::Fill => self.parse_fill(),
                Token::Comm => self.parse_comm(),
                Token::Data
                | Token::Bss
                | Token::Text
                | Token::Driver
                | Token::Handler
                | Token::End
                | Token::EOF => return,
                _ => Err(self.unexpected(lookahead)),
            };
            if let Err(e) = r {
                self.recover(e);
            }
        }
    }

    /// Record a label declaration at the current location counter.
    fn define_label_from(&mut self, span: Span<Token>) {
        let text = self.lexer.get_str(span);
        let name = text.trim_end_matches(':').to_ascii_lowercase();
        if !self.program.define_label(&name) {
            let e = self.lexer.error_at(span, ErrorCode::DuplicateLabel(name));
            self.errors.push(e);
        }
    }

    /// `.byte`/`.word`/`.long`/`.quad expr {, expr}`: emit each value
    /// at the element width, little endian.
    fn parse_data_values(&mut self, width: u8) -> Result<(), ParseError> {
        self.lexer.next();
        loop {
            let value = self.expression()?;
            self.program.write_scalar(value, width);
            if self.lexer.peek().kind == Token::Comma {
                self.lexer.next();
            } else {
                break;
            }
        }
        self.end_of_statement()
    }

    /// `.ascii STRING`: the decoded bytes, with no implicit
    /// terminator.
    fn parse_ascii(&mut self) -> Result<(), ParseError> {
        self.lexer.next();
        let s = self.lexer.snap(Token::StringLiteral, "a string literal")?;
        let bytes = decode_string(&self.lexer.get_str(s));
        self.program.write_bytes(&bytes);
        self.end_of_statement()
    }

    /// `.fill repeat [, size [, value]]`, with the usual defaults of
    /// size 1 and value 0.
    fn parse_fill(&mut self) -> Result<(), ParseError> {
        self.lexer.next();
        let repeat = self.expression()?;
        let mut size: i64 = 1;
        let mut value: i64 = 0;
        if self.lexer.peek().kind == Token::Comma {
            self.lexer.next();
            size = self.expression()?;
            if self.lexer.peek().kind == Token::Comma {
                self.lexer.next();
                value = self.expression()?;
            }
        }
        let size = size.clamp(1, 8) as u8;
        for _ in 0..repeat.max(0) {
            self.program.write_scalar(value, size);
        }
        self.end_of_statement()
    }

    /// `.comm NAME, size`: a labelled, zero-initialised block.
    fn parse_comm(&mut self) -> Result<(), ParseError> {
        self.lexer.next();
        let name_span = self.lexer.snap(Token::Identifier, "a symbol name")?;
        self.lexer.snap(Token::Comma, "','")?;
        let size = self.expression()?;
        let name = self.lexer.get_str(name_span).to_ascii_lowercase();
        if !self.program.define_label(&name) {
            return Err(self.lexer.error_at(name_span, ErrorCode::DuplicateLabel(name)));
        }
        self.program.write_bytes(&vec![0u8; size.max(0) as usize]);
        self.end_of_statement()
    }

    /// `.equ NAME, expr`.
    fn parse_equ(&mut self) -> Result<(), ParseError> {
        self.lexer.next();
        let name_span = self.lexer.snap(Token::Identifier, "a symbol name")?;
        self.lexer.snap(Token::Comma, "','")?;
        let value = self.expression()?;
        let name = self.lexer.get_str(name_span);
        self.program.define_symbol(&name, value as u64);
        self.end_of_statement()
    }

    /// `NAME = expr`.
    fn parse_assignment(&mut self) -> Result<(), ParseError> {
        let name_span = self.lexer.next();
        self.lexer.snap(Token::Equals, "'='")?;
        let value = self.expression()?;
        let name = self.lexer.get_str(name_span);
        self.program.define_symbol(&name, value as u64);
        self.end_of_statement()
    }

    // ----------------------------------------------------------------
    // Code sections
    // ----------------------------------------------------------------

    fn parse_code_section(&mut self) {
        self.lexer.next(); // .text
        let r = self.end_of_statement();
        if let Err(e) = r {
            self.recover(e);
        }
        loop {
            let lookahead = self.lexer.peek();
            match lookahead.kind {
                Token::Newline => {
                    self.lexer.next();
                }
                Token::Label => {
                    self.lexer.next();
                    self.define_label_from(lookahead);
                }
                Token::LocationCounter | Token::Org => {
                    let r = self.parse_location_counter();
                    if let Err(e) = r {
                        self.recover(e);
                    }
                }
                Token::Data
                | Token::Bss
                | Token::Text
                | Token::Driver
                | Token::Handler
                | Token::End
                | Token::EOF => return,
                k if is_instruction(k) => match self.parse_instruction() {
                    Ok(insn) => {
                        self.program.emit(insn);
                        let r = self.end_of_statement();
                        if let Err(e) = r {
                            self.recover(e);
                        }
                    }
                    Err(e) => self.recover(e),
                },
                _ => {
                    let e = self.unexpected(lookahead);
                    self.recover(e);
                }
            }
        }
    }

    // ----------------------------------------------------------------
    // Driver blocks
    // ----------------------------------------------------------------

    /// `.driver`/`.handler (INTEGER | NAME)` followed by statements up
    /// to the closing `iret`.  The body lands in the driver map, not
    /// in the code stream.
    fn parse_driver_block(&mut self) {
        self.lexer.next(); // .driver or .handler
        let key = match self.parse_driver_key() {
            Ok(key) => key,
            Err(e) => {
                self.recover(e);
                return;
            }
        };
        let r = self.end_of_statement();
        if let Err(e) = r {
            self.recover(e);
        }
        let mut body = Vec::new();
        loop {
            let lookahead = self.lexer.peek();
            match lookahead.kind {
                Token::Newline => {
                    self.lexer.next();
                }
                Token::Label => {
                    self.lexer.next();
                    self.define_label_from(lookahead);
                }
                Token::LocationCounter | Token::Org => {
                    let r = self.parse_location_counter();
                    if let Err(e) = r {
                        self.recover(e);
                    }
                }
                Token::Iret => {
                    self.lexer.next();
                    body.push(Instruction::ControlTransfer {
                        mnemonic: "iret".to_string(),
                        target: None,
                    });
                    self.program.advance(INSN_WIDTH);
                    let r = self.end_of_statement();
                    if let Err(e) = r {
                        self.recover(e);
                    }
                    self.program.install_driver(key, body);
                    return;
                }
                Token::Data
                | Token::Bss
                | Token::Text
                | Token::Driver
                | Token::Handler
                | Token::End
                | Token::EOF => {
                    let e = self.lexer.error_at(lookahead, ErrorCode::UnterminatedDriver);
                    self.errors.push(e);
                    return;
                }
                k if is_instruction(k) => match self.parse_instruction() {
                    Ok(insn) => {
                        body.push(insn);
                        self.program.advance(INSN_WIDTH);
                        let r = self.end_of_statement();
                        if let Err(e) = r {
                            self.recover(e);
                        }
                    }
                    Err(e) => self.recover(e),
                },
                _ => {
                    let e = self.unexpected(lookahead);
                    self.recover(e);
                }
            }
        }
    }

    fn parse_driver_key(&mut self) -> Result<DriverKey, ParseError> {
        let lookahead = self.lexer.peek();
        match lookahead.kind {
            Token::Integer => {
                self.lexer.next();
                let v = integer_value(&self.lexer.get_str(lookahead))
                    .map_err(|c| self.lexer.error_at(lookahead, c))?;
                Ok(DriverKey::Vector(v))
            }
            Token::Identifier => {
                self.lexer.next();
                Ok(DriverKey::Name(self.lexer.get_str(lookahead).to_ascii_lowercase()))
            }
            _ => Err(self.unexpected(lookahead)),
        }
    }

    /// Trailing newlines after `.end`; anything else is junk.
    fn parse_epilogue(&mut self) {
        loop {
            let lookahead = self.lexer.peek();
            match lookahead.kind {
                Token::Newline => {
                    self.lexer.next();
                }
                Token::EOF => return,
                _ => {
                    let e = self.unexpected(lookahead);
                    self.errors.push(e);
                    return;
                }
            }
        }
    }

    // ----------------------------------------------------------------
    // Instruction classification
    // ----------------------------------------------------------------

    /// Parse one instruction: determine the size suffix, parse the
    /// operands according to the mnemonic family's format, validate
    /// operand widths against the suffix, and build the record of the
    /// appropriate class.
    fn parse_instruction(&mut self) -> Result<Instruction, ParseError> {
        let span = self.lexer.next();
        let lexeme = self.lexer.get_str(span).to_ascii_lowercase();
        match span.kind {
            Token::Insn0 => {
                let (base, suffix) = split_mnemonic(&lexeme, INSN_0_BASES);
                Ok(Instruction::DataMovement {
                    mnemonic: base.to_string(),
                    src: None,
                    dst: None,
                    size: suffix,
                })
            }
            Token::Insn0Wq => {
                let (base, suffix) = split_mnemonic(&lexeme, INSN_0_WQ_BASES);
                Ok(Instruction::DataMovement {
                    mnemonic: base.to_string(),
                    src: None,
                    dst: None,
                    size: suffix,
                })
            }
            Token::Insn0NoSuff => match lexeme.as_str() {
                "ret" => {
                    Ok(Instruction::ControlTransfer { mnemonic: lexeme.clone(), target: None })
                }
                "hlt" | "nop" => {
                    Ok(Instruction::Interrupt { mnemonic: lexeme.clone(), vector: -1 })
                }
                _ => Ok(Instruction::Flag { mnemonic: lexeme.clone() }),
            },
            Token::Insn1S => {
                let t = self.lexer.snap(Token::Integer, "an interrupt number")?;
                let vector = integer_value(&self.lexer.get_str(t))
                    .map_err(|c| self.lexer.error_at(t, c))?;
                Ok(Instruction::Interrupt { mnemonic: lexeme, vector })
            }
            Token::Insn1E => {
                let (base, suffix) = split_mnemonic(&lexeme, INSN_1_E_BASES);
                let base = base.to_string();
                let op = self.format_e(suffix)?;
                self.check_size(&op, suffix, span)?;
                if base == "push" {
                    Ok(Instruction::DataMovement {
                        mnemonic: base,
                        src: Some(op),
                        dst: None,
                        size: None,
                    })
                } else if base == "pop" {
                    Ok(Instruction::DataMovement {
                        mnemonic: base,
                        src: None,
                        dst: Some(op),
                        size: None,
                    })
                } else {
                    Ok(Instruction::Arithmetic { mnemonic: base, src: None, dst: op })
                }
            }
            Token::InsnShift => {
                let (base, suffix) = split_mnemonic(&lexeme, INSN_SHIFT_BASES);
                let base = base.to_string();
                let count = if self.lexer.peek().kind == Token::Dollar {
                    let k = self.format_k()?;
                    self.lexer.snap(Token::Comma, "','")?;
                    Some(k)
                } else {
                    None
                };
                let dst = self.register()?;
                if let Some(s) = suffix {
                    if dst.bytes() != s {
                        return Err(self.lexer.error_at(span, ErrorCode::SuffixMismatch));
                    }
                }
                Ok(Instruction::Shift { mnemonic: base, count, dst })
            }
            Token::Insn1M => {
                let target = self.format_m(None)?;
                Ok(Instruction::ConditionalJump { mnemonic: lexeme, target })
            }
            Token::InsnJc => {
                let (base, suffix) = split_mnemonic(&lexeme, INSN_JC_BASES);
                let base = base.to_string();
                if self.lexer.peek().kind == Token::Star {
                    // Indirect through a register.
                    self.lexer.next();
                    let g = self.register()?;
                    if let Some(s) = suffix {
                        if g.bytes() != s {
                            return Err(self.lexer.error_at(span, ErrorCode::SuffixMismatch));
                        }
                    }
                    Ok(Instruction::ControlTransfer {
                        mnemonic: base,
                        target: Some(Operand::Register(g)),
                    })
                } else {
                    let m = self.format_m(suffix)?;
                    Ok(Instruction::ControlTransfer {
                        mnemonic: base,
                        target: Some(Operand::Memory(m)),
                    })
                }
            }
            Token::InsnBE => {
                let (base, suffix) = split_mnemonic(&lexeme, INSN_B_E_BASES);
                let base = base.to_string();
                let src = self.format_b(suffix)?;
                self.lexer.snap(Token::Comma, "','")?;
                let dst = self.format_e(suffix)?;
                self.check_size(&src, suffix, span)?;
                self.check_size(&dst, suffix, span)?;
                if base == "mov" {
                    // The suffix is only worth keeping when neither
                    // operand pins the width down.
                    let size = if src.size_bytes().is_none() && dst.size_bytes().is_none() {
                        suffix
                    } else {
                        None
                    };
                    Ok(Instruction::DataMovement { mnemonic: base, src: Some(src), dst: Some(dst), size })
                } else {
                    Ok(Instruction::Arithmetic { mnemonic: base, src: Some(src), dst })
                }
            }
            Token::InsnExt => {
                let (stem, src_size, dst_size, first) = split_extension(&lexeme);
                let stem = stem.to_string();
                let src = self.format_e(Some(src_size))?;
                self.lexer.snap(Token::Comma, "','")?;
                let dst = self.register()?;
                if src_size >= dst_size {
                    return Err(
                        self.lexer.error_at(span, ErrorCode::ExtensionOrder(src_size, dst_size))
                    );
                }
                if !matches!(first, 'b' | 'w' | 'l') {
                    return Err(self.lexer.error_at(span, ErrorCode::ExtensionPrefix));
                }
                if let Some(b) = src.size_bytes() {
                    if b != src_size {
                        return Err(self.lexer.error_at(span, ErrorCode::OperandSizeMismatch));
                    }
                }
                if dst.bytes() != dst_size {
                    return Err(self.lexer.error_at(span, ErrorCode::OperandSizeMismatch));
                }
                Ok(Instruction::DataMovement {
                    mnemonic: stem,
                    src: Some(src),
                    dst: Some(Operand::Register(dst)),
                    size: None,
                })
            }
            Token::InsnLea => {
                let (base, suffix) = split_mnemonic(&lexeme, &["lea"]);
                let base = base.to_string();
                let src = self.format_e(suffix)?;
                self.lexer.snap(Token::Comma, "','")?;
                let dst = self.format_e(suffix)?;
                self.check_size(&src, suffix, span)?;
                self.check_size(&dst, suffix, span)?;
                Ok(Instruction::DataMovement {
                    mnemonic: base,
                    src: Some(src),
                    dst: Some(dst),
                    size: None,
                })
            }
            Token::InsnIn => {
                let (base, suffix) = split_mnemonic(&lexeme, &["in"]);
                let base = base.to_string();
                let port = self.register()?;
                self.lexer.snap(Token::Comma, "','")?;
                let acc = self.register()?;
                if port.size != 16 || port.id != amd64::RDX || acc.id != amd64::RAX {
                    return Err(self.lexer.error_at(span, ErrorCode::WrongOperands(base)));
                }
                if let Some(s) = suffix {
                    if acc.bytes() != s {
                        return Err(self.lexer.error_at(span, ErrorCode::SuffixMismatch));
                    }
                }
                Ok(Instruction::PortIo { mnemonic: base, size: suffix.unwrap_or(acc.bytes()) })
            }
            Token::InsnOut => {
                let (base, suffix) = split_mnemonic(&lexeme, &["out"]);
                let base = base.to_string();
                let acc = self.register()?;
                self.lexer.snap(Token::Comma, "','")?;
                let port = self.register()?;
                if port.size != 16 || port.id != amd64::RDX || acc.id != amd64::RAX {
                    return Err(self.lexer.error_at(span, ErrorCode::WrongOperands(base)));
                }
                if let Some(s) = suffix {
                    if acc.bytes() != s {
                        return Err(self.lexer.error_at(span, ErrorCode::SuffixMismatch));
                    }
                }
                Ok(Instruction::PortIo { mnemonic: base, size: suffix.unwrap_or(acc.bytes()) })
            }
            Token::InsnIoS => {
                let (base, suffix) = split_mnemonic(&lexeme, INSN_IO_S_BASES);
                match suffix {
                    Some(8) | None => {
                        Err(self.lexer.error_at(span, ErrorCode::WrongIoSuffix(lexeme.clone())))
                    }
                    Some(s) => Ok(Instruction::PortIo { mnemonic: base.to_string(), size: s }),
                }
            }
            _ => Err(self.unexpected(span)),
        }
    }

    /// Report when an operand of known width disagrees with the
    /// instruction suffix.
    fn check_size(
        &self,
        op: &Operand,
        suffix: Option<u8>,
        at: Span<Token>,
    ) -> Result<(), ParseError> {
        if let (Some(s), Some(b)) = (suffix, op.size_bytes()) {
            if s != b {
                return Err(self.lexer.error_at(at, ErrorCode::SuffixMismatch));
            }
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // Operand format sub-parsers
    // ----------------------------------------------------------------

    /// A single register of any family.
    fn register(&mut self) -> Result<RegisterOperand, ParseError> {
        let lookahead = self.lexer.peek();
        let bits = match lookahead.kind {
            Token::Reg8 => 8,
            Token::Reg16 => 16,
            Token::Reg32 => 32,
            Token::Reg64 => 64,
            _ => {
                return Err(self.lexer.error_at(lookahead, ErrorCode::ExpectedToken("a register")))
            }
        };
        self.lexer.next();
        let name = self.lexer.get_str(lookahead);
        match amd64::register_id(&name[1..], bits) {
            Some(id) => Ok(RegisterOperand::new(id, bits)),
            None => Err(self.lexer.error_at(lookahead, ErrorCode::UnexpectedToken(name))),
        }
    }

    /// FormatE: register or memory.
    fn format_e(&mut self, size: Option<u8>) -> Result<Operand, ParseError> {
        if is_register(self.lexer.peek().kind) {
            Ok(Operand::Register(self.register()?))
        } else {
            Ok(Operand::Memory(self.addressing(size)?))
        }
    }

    /// FormatM: a label (resolved immediately, so it must already be
    /// defined) or a memory addressing form.
    fn format_m(&mut self, size: Option<u8>) -> Result<MemoryOperand, ParseError> {
        let lookahead = self.lexer.peek();
        if lookahead.kind == Token::Identifier && self.lexer.peek2().kind != Token::LeftBrace {
            self.lexer.next();
            let name = self.lexer.get_str(lookahead).to_ascii_lowercase();
            match self.program.lookup(&name) {
                Some(address) => Ok(MemoryOperand {
                    displacement: Some(address as i32),
                    operand_size: size,
                    ..Default::default()
                }),
                None => Err(self.lexer.error_at(lookahead, ErrorCode::UndefinedLabel)),
            }
        } else {
            self.addressing(size)
        }
    }

    /// FormatB: immediate, register or memory.
    fn format_b(&mut self, size: Option<u8>) -> Result<Operand, ParseError> {
        let lookahead = self.lexer.peek();
        match lookahead.kind {
            Token::Dollar => {
                self.lexer.next();
                Ok(Operand::Immediate(self.expression()?))
            }
            k if is_register(k) => Ok(Operand::Register(self.register()?)),
            _ => Ok(Operand::Memory(self.format_m(size)?)),
        }
    }

    /// FormatK: an immediate shift count, narrowed to 32 bits.
    fn format_k(&mut self) -> Result<i32, ParseError> {
        self.lexer.snap(Token::Dollar, "'$'")?;
        Ok(self.expression()? as i32)
    }

    /// The memory addressing form `[disp] [(base [, index, scale])]`.
    /// At least one of the two parts must be present.  The operand
    /// width is the caller's (i.e. the suffix), never inferred.
    fn addressing(&mut self, size: Option<u8>) -> Result<MemoryOperand, ParseError> {
        let lookahead = self.lexer.peek();
        let mut displacement = None;
        // A '(' opening a register block is not the start of a
        // parenthesised displacement expression; one extra token of
        // lookahead tells the two apart.
        let block_next =
            lookahead.kind == Token::LeftBrace && is_register(self.lexer.peek2().kind);
        if !block_next {
            match lookahead.kind {
                Token::Integer
                | Token::Flonum
                | Token::Minus
                | Token::LocationCounter
                | Token::Identifier
                | Token::LeftBrace => {
                    displacement = Some(self.expression()? as i32);
                }
                _ => return Err(self.unexpected(lookahead)),
            }
        }
        let mut base = None;
        let mut index = None;
        let mut scale = None;
        if self.lexer.peek().kind == Token::LeftBrace {
            self.lexer.next();
            let b = self.register()?;
            if self.lexer.peek().kind == Token::Comma {
                self.lexer.next();
                let i = self.register()?;
                self.lexer.snap(Token::Comma, "','")?;
                let s = self.lexer.snap(Token::Integer, "a scale factor")?;
                let v = integer_value(&self.lexer.get_str(s))
                    .map_err(|c| self.lexer.error_at(s, c))?;
                if b.size != i.size {
                    return Err(self.lexer.error_at(lookahead, ErrorCode::AddressingSizeMismatch));
                }
                index = Some(i);
                scale = Some(v as u8);
            }
            self.lexer.snap(Token::RightBrace, "')'")?;
            base = Some(b);
        }
        Ok(MemoryOperand { base, index, scale, displacement, operand_size: size })
    }
}

// ===================================================================
// Helpers
// ===================================================================

/// Token kinds which begin an instruction inside a code section or
/// driver body.  `iret` is not one of them: it is only meaningful as
/// the epilogue of a driver block.
fn is_instruction(kind: Token) -> bool {
    matches!(
        kind,
        Token::Insn0
            | Token::Insn0Wq
            | Token::Insn0NoSuff
            | Token::Insn1S
            | Token::Insn1E
            | Token::InsnLea
            | Token::InsnShift
            | Token::Insn1M
            | Token::InsnJc
            | Token::InsnBE
            | Token::InsnExt
            | Token::InsnIn
            | Token::InsnOut
            | Token::InsnIoS
    )
}

fn is_register(kind: Token) -> bool {
    matches!(kind, Token::Reg8 | Token::Reg16 | Token::Reg32 | Token::Reg64)
}

/// Decode the body of a STRING_LITERAL lexeme (quotes included) into
/// bytes: the standard backslash escapes, 1-3 digit octal escapes,
/// and backslash-newline line continuations.
fn decode_string(lexeme: &str) -> Vec<u8> {
    let inner: Vec<char> = lexeme[1..lexeme.len() - 1].chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < inner.len() {
        let c = inner[i];
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            i += 1;
            continue;
        }
        i += 1;
        match inner.get(i) {
            None => {
                out.push(b'\\');
            }
            Some('n') => {
                out.push(b'\n');
                i += 1;
            }
            Some('t') => {
                out.push(b'\t');
                i += 1;
            }
            Some('b') => {
                out.push(0x08);
                i += 1;
            }
            Some('r') => {
                out.push(b'\r');
                i += 1;
            }
            Some('f') => {
                out.push(0x0c);
                i += 1;
            }
            Some('\\') => {
                out.push(b'\\');
                i += 1;
            }
            Some('\'') => {
                out.push(b'\'');
                i += 1;
            }
            Some('"') => {
                out.push(b'"');
                i += 1;
            }
            Some('\n') => {
                // Line continuation: both characters vanish.
                i += 1;
            }
            Some(d) if d.is_digit(8) => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 3 {
                    match inner.get(i).and_then(|c| c.to_digit(8)) {
                        Some(v) => {
                            value = value * 8 + v;
                            i += 1;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                out.push(value as u8);
            }
            Some(other) => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                i += 1;
            }
        }
    }
    out
}
