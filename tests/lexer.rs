use x64asm::amd64;
use x64asm::asm::lexer::{tokenize, Token};

// ============================================================================
// Totality
// ============================================================================

/// A cross-section of inputs, well-formed and otherwise.  Every one
/// of them must lex to completion with no character dropped.
static CORPUS: &[&str] = &[
    "",
    " ",
    "\t\t",
    "\n",
    ";;\r\n",
    ".text\nmovq $5, %rax\n.end\n",
    ".data\nfoo: .quad 0x10\n.end",
    "# only a comment",
    "/* block\ncomment */ .text",
    "movzbq %al, %rax",
    "jmp *%rax",
    "@#$!~`",
    "\"unterminated",
    "\"str\\\"ing\"",
    "label-with-dashes: .byte 1",
    "0x 0b 0e 0e1.2e3",
    "é ünïcode",
    "%raxx %r8d %notareg",
    ". = . + 8 * (2 - 1)",
    ".driver 3\niret",
];

#[test]
pub fn test_lexer_totality() {
    for input in CORPUS {
        let tokens = tokenize(input);
        let mut offset = 0;
        for t in &tokens {
            assert_eq!(t.start(), offset, "gap in token stream of {input:?}");
            assert!(t.kind == Token::EOF || t.len() > 0, "empty token in {input:?}");
            offset = t.end();
        }
        assert_eq!(offset, input.chars().count(), "uncovered tail in {input:?}");
        assert_eq!(tokens.last().map(|t| t.kind), Some(Token::EOF));
    }
}

// ============================================================================
// Token priority
// ============================================================================

/// One representative spelling per mnemonic family, with and without
/// suffixes.
static MNEMONICS: &[(&str, Token)] = &[
    ("movs", Token::Insn0),
    ("movsq", Token::Insn0),
    ("stosb", Token::Insn0),
    ("lodsw", Token::Insn0),
    ("pushf", Token::Insn0Wq),
    ("pushfq", Token::Insn0Wq),
    ("popfw", Token::Insn0Wq),
    ("ret", Token::Insn0NoSuff),
    ("hlt", Token::Insn0NoSuff),
    ("nop", Token::Insn0NoSuff),
    ("clc", Token::Insn0NoSuff),
    ("sti", Token::Insn0NoSuff),
    ("int", Token::Insn1S),
    ("push", Token::Insn1E),
    ("pushq", Token::Insn1E),
    ("popl", Token::Insn1E),
    ("negb", Token::Insn1E),
    ("notw", Token::Insn1E),
    ("lea", Token::InsnLea),
    ("leaq", Token::InsnLea),
    ("shl", Token::InsnShift),
    ("shlq", Token::InsnShift),
    ("sarb", Token::InsnShift),
    ("jz", Token::Insn1M),
    ("jne", Token::Insn1M),
    ("jge", Token::Insn1M),
    ("jmp", Token::InsnJc),
    ("jmpq", Token::InsnJc),
    ("call", Token::InsnJc),
    ("mov", Token::InsnBE),
    ("movq", Token::InsnBE),
    ("addl", Token::InsnBE),
    ("testb", Token::InsnBE),
    ("xorw", Token::InsnBE),
    ("movzbq", Token::InsnExt),
    ("movslq", Token::InsnExt),
    ("movswl", Token::InsnExt),
    ("in", Token::InsnIn),
    ("inb", Token::InsnIn),
    ("out", Token::InsnOut),
    ("outl", Token::InsnOut),
    ("ins", Token::InsnIoS),
    ("insb", Token::InsnIoS),
    ("outsw", Token::InsnIoS),
    ("iret", Token::Iret),
];

fn first_kind(input: &str) -> Token {
    tokenize(input)[0].kind
}

#[test]
pub fn test_mnemonic_families() {
    for (m, kind) in MNEMONICS {
        assert_eq!(first_kind(m), *kind, "for mnemonic {m}");
        // Anything longer is a plain name again.
        let extended = format!("{m}zz");
        assert_eq!(first_kind(&extended), Token::Identifier, "for {extended}");
        // ...unless it grows a colon, which makes it a label.
        let label = format!("{m}:");
        assert_eq!(first_kind(&label), Token::Label, "for {label}");
    }
}

#[test]
pub fn test_registers_never_lex_as_names() {
    let families = [
        (&amd64::BYTE, Token::Reg8),
        (&amd64::WORD, Token::Reg16),
        (&amd64::DWORD, Token::Reg32),
        (&amd64::QWORD, Token::Reg64),
    ];
    for (names, kind) in families {
        for name in names {
            let input = format!("%{name}");
            let tokens = tokenize(&input);
            assert_eq!(tokens[0].kind, kind, "for register {input}");
            assert_eq!(tokens[0].len(), input.chars().count());
        }
    }
}

#[test]
pub fn test_directive_priority() {
    assert_eq!(first_kind(".org"), Token::Org);
    assert_eq!(first_kind(".data"), Token::Data);
    assert_eq!(first_kind(".text"), Token::Text);
    assert_eq!(first_kind(".bss"), Token::Bss);
    assert_eq!(first_kind(".end"), Token::End);
    assert_eq!(first_kind(".equ"), Token::Equ);
    assert_eq!(first_kind(".byte"), Token::Byte);
    assert_eq!(first_kind(".word"), Token::Word);
    assert_eq!(first_kind(".long"), Token::Long);
    assert_eq!(first_kind(".quad"), Token::Quad);
    assert_eq!(first_kind(".ascii"), Token::Ascii);
    assert_eq!(first_kind(".fill"), Token::Fill);
    assert_eq!(first_kind(".comm"), Token::Comm);
    assert_eq!(first_kind(".driver"), Token::Driver);
    assert_eq!(first_kind(".handler"), Token::Handler);
    // The lone dot is its own token, and longer names win over both.
    assert_eq!(first_kind("."), Token::LocationCounter);
    assert_eq!(first_kind(".ends"), Token::Identifier);
}

// ============================================================================
// Case insensitivity
// ============================================================================

#[test]
pub fn test_case_insensitivity() {
    let pairs = [
        ("MOVQ", "movq"),
        ("MovZbQ", "movzbq"),
        ("%RAX", "%rax"),
        ("%R8D", "%r8d"),
        (".DATA", ".data"),
        (".DrIvEr", ".driver"),
        ("IRET", "iret"),
        ("0X1F", "0x1f"),
    ];
    for (upper, lower) in pairs {
        let a: Vec<Token> = tokenize(upper).iter().map(|t| t.kind).collect();
        let b: Vec<Token> = tokenize(lower).iter().map(|t| t.kind).collect();
        assert_eq!(a, b, "case variants of {lower} disagree");
    }
}

// ============================================================================
// Hidden and error tokens
// ============================================================================

#[test]
pub fn test_hidden_tokens_survive() {
    let kinds: Vec<Token> = tokenize("nop # trailing\n").iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            Token::Insn0NoSuff,
            Token::Whitespace,
            Token::Comment,
            Token::Newline,
            Token::EOF
        ]
    );
}

#[test]
pub fn test_error_tokens_are_never_dropped() {
    let tokens = tokenize("a @ b");
    let kinds: Vec<Token> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            Token::Identifier,
            Token::Whitespace,
            Token::Error,
            Token::Whitespace,
            Token::Identifier,
            Token::EOF
        ]
    );
}

#[test]
pub fn test_statement_separators_collapse() {
    let kinds: Vec<Token> = tokenize("nop;\r\n;nop").iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![Token::Insn0NoSuff, Token::Newline, Token::Insn0NoSuff, Token::EOF]
    );
}
