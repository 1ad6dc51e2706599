use x64asm::asm::{
    assemble, ErrorCode, Instruction, MemoryOperand, Operand, ParseError, RegisterOperand,
};

// ============================================================================
// Helpers
// ============================================================================

/// Assemble a single code statement and hand back the one instruction
/// it produced.
fn one(line: &str) -> Instruction {
    let source = format!(".text\n{line}\n.end\n");
    let (program, errors) = assemble(&source);
    assert!(errors.is_empty(), "unexpected errors for {line:?}: {errors:?}");
    assert_eq!(program.code().len(), 1, "expected one instruction for {line:?}");
    program.code()[0].clone()
}

/// Assemble a single bad code statement and hand back its
/// diagnostics.
fn errs(line: &str) -> Vec<ParseError> {
    let source = format!(".text\n{line}\n.end\n");
    let (program, errors) = assemble(&source);
    assert!(program.code().is_empty(), "unexpected code for {line:?}");
    assert!(!errors.is_empty(), "expected errors for {line:?}");
    errors
}

fn reg(id: u8, size: u8) -> Operand {
    Operand::Register(RegisterOperand::new(id, size))
}

// ============================================================================
// Class 1: data movement
// ============================================================================

#[test]
pub fn test_mov_immediate_to_register() {
    assert_eq!(
        one("movq $5, %rax"),
        Instruction::DataMovement {
            mnemonic: "mov".to_string(),
            src: Some(Operand::Immediate(5)),
            dst: Some(reg(0, 64)),
            size: None,
        }
    );
}

#[test]
pub fn test_mov_memory_forms() {
    assert_eq!(
        one("movq 8(%rbp), %rax"),
        Instruction::DataMovement {
            mnemonic: "mov".to_string(),
            src: Some(Operand::Memory(MemoryOperand {
                base: Some(RegisterOperand::new(5, 64)),
                displacement: Some(8),
                operand_size: Some(8),
                ..Default::default()
            })),
            dst: Some(reg(0, 64)),
            size: None,
        }
    );
    // Scaled index.
    assert_eq!(
        one("movl (%rax, %rbx, 4), %ecx"),
        Instruction::DataMovement {
            mnemonic: "mov".to_string(),
            src: Some(Operand::Memory(MemoryOperand {
                base: Some(RegisterOperand::new(0, 64)),
                index: Some(RegisterOperand::new(3, 64)),
                scale: Some(4),
                operand_size: Some(4),
                ..Default::default()
            })),
            dst: Some(reg(1, 32)),
            size: None,
        }
    );
    // Bare displacement, no register block.
    assert_eq!(
        one("movq 0x20, %rax"),
        Instruction::DataMovement {
            mnemonic: "mov".to_string(),
            src: Some(Operand::Memory(MemoryOperand {
                displacement: Some(0x20),
                operand_size: Some(8),
                ..Default::default()
            })),
            dst: Some(reg(0, 64)),
            size: None,
        }
    );
    // Negative displacement.
    assert_eq!(
        one("movw -2(%rsp), %ax"),
        Instruction::DataMovement {
            mnemonic: "mov".to_string(),
            src: Some(Operand::Memory(MemoryOperand {
                base: Some(RegisterOperand::new(4, 64)),
                displacement: Some(-2),
                operand_size: Some(2),
                ..Default::default()
            })),
            dst: Some(reg(0, 16)),
            size: None,
        }
    );
}

#[test]
pub fn test_push_and_pop() {
    assert_eq!(
        one("pushq %rbx"),
        Instruction::DataMovement {
            mnemonic: "push".to_string(),
            src: Some(reg(3, 64)),
            dst: None,
            size: None,
        }
    );
    assert_eq!(
        one("popw %ax"),
        Instruction::DataMovement {
            mnemonic: "pop".to_string(),
            src: None,
            dst: Some(reg(0, 16)),
            size: None,
        }
    );
}

#[test]
pub fn test_string_moves_carry_their_suffix() {
    assert_eq!(
        one("movsq"),
        Instruction::DataMovement {
            mnemonic: "movs".to_string(),
            src: None,
            dst: None,
            size: Some(8),
        }
    );
    assert_eq!(
        one("stosb"),
        Instruction::DataMovement {
            mnemonic: "stos".to_string(),
            src: None,
            dst: None,
            size: Some(1),
        }
    );
    assert_eq!(
        one("pushfq"),
        Instruction::DataMovement {
            mnemonic: "pushf".to_string(),
            src: None,
            dst: None,
            size: Some(8),
        }
    );
}

#[test]
pub fn test_lea() {
    let insn = one("leaq 16(%rbp), %rdi");
    assert_eq!(insn.class(), 1);
    assert_eq!(
        insn,
        Instruction::DataMovement {
            mnemonic: "lea".to_string(),
            src: Some(Operand::Memory(MemoryOperand {
                base: Some(RegisterOperand::new(5, 64)),
                displacement: Some(16),
                operand_size: Some(8),
                ..Default::default()
            })),
            dst: Some(reg(7, 64)),
            size: None,
        }
    );
}

// ============================================================================
// Widening moves
// ============================================================================

#[test]
pub fn test_zero_extension() {
    assert_eq!(
        one("movzbq %al, %rax"),
        Instruction::DataMovement {
            mnemonic: "movz".to_string(),
            src: Some(reg(0, 8)),
            dst: Some(reg(0, 64)),
            size: None,
        }
    );
}

#[test]
pub fn test_sign_extension() {
    assert_eq!(
        one("movswl %cx, %edx"),
        Instruction::DataMovement {
            mnemonic: "movs".to_string(),
            src: Some(reg(1, 16)),
            dst: Some(reg(2, 32)),
            size: None,
        }
    );
}

#[test]
pub fn test_extension_must_widen() {
    let errors = errs("movzqb %rax, %al");
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].code.to_string(),
        "Wrong suffices for extension: cannot extend from 8 to 1"
    );
}

#[test]
pub fn test_extension_operands_must_match_the_pair() {
    let errors = errs("movzbq %ax, %rax");
    assert_eq!(errors[0].code, ErrorCode::OperandSizeMismatch);
    assert_eq!(errors[0].code.to_string(), "Operand size mismatch.");
    let errors = errs("movsbl %al, %rax");
    assert_eq!(errors[0].code, ErrorCode::OperandSizeMismatch);
}

// ============================================================================
// Class 2: arithmetic and logic
// ============================================================================

#[test]
pub fn test_binary_arithmetic() {
    assert_eq!(
        one("addq %rax, %rbx"),
        Instruction::Arithmetic {
            mnemonic: "add".to_string(),
            src: Some(reg(0, 64)),
            dst: reg(3, 64),
        }
    );
    assert_eq!(
        one("cmpl $100, %esi"),
        Instruction::Arithmetic {
            mnemonic: "cmp".to_string(),
            src: Some(Operand::Immediate(100)),
            dst: reg(6, 32),
        }
    );
    assert_eq!(one("testb $1, %al").class(), 2);
    assert_eq!(one("xorq %rax, %rax").class(), 2);
    assert_eq!(one("sbbw %ax, %cx").class(), 2);
}

#[test]
pub fn test_unary_arithmetic() {
    assert_eq!(
        one("negl %eax"),
        Instruction::Arithmetic { mnemonic: "neg".to_string(), src: None, dst: reg(0, 32) }
    );
    assert_eq!(
        one("notq %r10"),
        Instruction::Arithmetic { mnemonic: "not".to_string(), src: None, dst: reg(10, 64) }
    );
}

// ============================================================================
// Class 3: shifts
// ============================================================================

#[test]
pub fn test_shift_with_count() {
    assert_eq!(
        one("shlq $3, %rax"),
        Instruction::Shift {
            mnemonic: "shl".to_string(),
            count: Some(3),
            dst: RegisterOperand::new(0, 64),
        }
    );
}

#[test]
pub fn test_shift_with_implicit_count() {
    assert_eq!(
        one("sarb %cl"),
        Instruction::Shift {
            mnemonic: "sar".to_string(),
            count: None,
            dst: RegisterOperand::new(1, 8),
        }
    );
}

// ============================================================================
// Class 0 and 4: interrupts, stops, flags
// ============================================================================

#[test]
pub fn test_software_interrupt() {
    assert_eq!(
        one("int 3"),
        Instruction::Interrupt { mnemonic: "int".to_string(), vector: 3 }
    );
    assert_eq!(
        one("int 0x21"),
        Instruction::Interrupt { mnemonic: "int".to_string(), vector: 0x21 }
    );
}

#[test]
pub fn test_stops_have_no_vector() {
    assert_eq!(
        one("hlt"),
        Instruction::Interrupt { mnemonic: "hlt".to_string(), vector: -1 }
    );
    assert_eq!(
        one("nop"),
        Instruction::Interrupt { mnemonic: "nop".to_string(), vector: -1 }
    );
}

#[test]
pub fn test_flag_manipulation() {
    for m in ["clc", "cld", "cli", "stc", "std", "sti"] {
        let insn = one(m);
        assert_eq!(insn, Instruction::Flag { mnemonic: m.to_string() });
        assert_eq!(insn.class(), 4);
    }
}

// ============================================================================
// Class 5 and 6: control transfer
// ============================================================================

#[test]
pub fn test_ret() {
    assert_eq!(
        one("ret"),
        Instruction::ControlTransfer { mnemonic: "ret".to_string(), target: None }
    );
}

#[test]
pub fn test_indirect_jump() {
    assert_eq!(
        one("jmp *%rax"),
        Instruction::ControlTransfer {
            mnemonic: "jmp".to_string(),
            target: Some(reg(0, 64)),
        }
    );
    // The suffix still has to agree with the register.
    let errors = errs("jmpq *%eax");
    assert_eq!(errors[0].code, ErrorCode::SuffixMismatch);
}

#[test]
pub fn test_conditional_jump_takes_a_memory_target() {
    let insn = one("jne 0x40");
    assert_eq!(
        insn,
        Instruction::ConditionalJump {
            mnemonic: "jne".to_string(),
            target: MemoryOperand { displacement: Some(0x40), ..Default::default() },
        }
    );
    assert_eq!(insn.class(), 6);
}

// ============================================================================
// Class 7: port I/O
// ============================================================================

#[test]
pub fn test_port_input() {
    assert_eq!(
        one("inb %dx, %al"),
        Instruction::PortIo { mnemonic: "in".to_string(), size: 1 }
    );
    // Without a suffix the accumulator decides.
    assert_eq!(
        one("in %dx, %rax"),
        Instruction::PortIo { mnemonic: "in".to_string(), size: 8 }
    );
}

#[test]
pub fn test_port_output() {
    assert_eq!(
        one("outl %eax, %dx"),
        Instruction::PortIo { mnemonic: "out".to_string(), size: 4 }
    );
}

#[test]
pub fn test_port_io_fixed_registers() {
    let errors = errs("inb %ax, %al");
    assert_eq!(errors[0].code.to_string(), "Wrong operands for instruction in.");
    let errors = errs("outb %al, %cx");
    assert_eq!(errors[0].code.to_string(), "Wrong operands for instruction out.");
    let errors = errs("inb %dx, %bl");
    assert_eq!(errors[0].code, ErrorCode::WrongOperands("in".to_string()));
}

#[test]
pub fn test_string_port_io() {
    assert_eq!(
        one("insb"),
        Instruction::PortIo { mnemonic: "ins".to_string(), size: 1 }
    );
    assert_eq!(
        one("outsw"),
        Instruction::PortIo { mnemonic: "outs".to_string(), size: 2 }
    );
}

#[test]
pub fn test_string_port_io_rejects_missing_or_quad_suffix() {
    let errors = errs("ins");
    assert_eq!(errors[0].code.to_string(), "Wrong size suffix for instruction ins");
    let errors = errs("outsq");
    assert_eq!(errors[0].code.to_string(), "Wrong size suffix for instruction outsq");
}

// ============================================================================
// Suffix validation
// ============================================================================

#[test]
pub fn test_suffix_mismatch_is_reported() {
    let errors = errs("movb $5, %rax");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::SuffixMismatch);
    assert_eq!(
        errors[0].code.to_string(),
        "Operand size and instruction suffix mismatch."
    );
    // Across operand positions and families.
    assert_eq!(errs("addl %rax, %rbx")[0].code, ErrorCode::SuffixMismatch);
    assert_eq!(errs("pushq %eax")[0].code, ErrorCode::SuffixMismatch);
    assert_eq!(errs("shlw $1, %eax")[0].code, ErrorCode::SuffixMismatch);
    assert_eq!(errs("leal 4(%rax), %rbx")[0].code, ErrorCode::SuffixMismatch);
    assert_eq!(errs("inw %dx, %al")[0].code, ErrorCode::SuffixMismatch);
}

#[test]
pub fn test_unsuffixed_forms_take_the_register_width() {
    assert_eq!(one("mov $1, %rbx").class(), 1);
    assert_eq!(one("add %ecx, %edx").class(), 2);
    assert_eq!(one("push %rbp").class(), 1);
}

// ============================================================================
// Statement boundaries
// ============================================================================

#[test]
pub fn test_iret_is_only_a_driver_epilogue() {
    let errors = errs("iret");
    assert!(matches!(errors[0].code, ErrorCode::UnexpectedToken(_)));
}

#[test]
pub fn test_trailing_junk_is_rejected() {
    // The first instruction still lands; the junk after it is one
    // diagnostic.
    let (program, errors) = assemble(".text\nnop nop\n.end\n");
    assert_eq!(program.code().len(), 1);
    assert_eq!(errors.len(), 1);
}
