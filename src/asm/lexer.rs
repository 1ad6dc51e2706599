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
use crate::lex;
use crate::lex::{Scanner, Span, TableTokenizer};

use super::{ErrorCode, ParseError};

// =================================================================
// Token
// =================================================================

/// The closed set of token kinds.  The lexeme itself is recovered
/// from the span, hence kinds carry no payload.  `Whitespace` and
/// `Comment` are _hidden_ tokens: they are emitted by the tokenizer
/// (a highlighter wants them) but skipped by the parser's cursor.
/// `Error` covers exactly one character and is matched only when
/// nothing else applies, which makes the lexer total.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    // Hidden
    Whitespace,
    Comment,
    /// One or more of `\n`, `\r` or `;`.
    Newline,
    // Directives
    Org,
    Data,
    Text,
    Bss,
    End,
    Equ,
    Byte,
    Word,
    Long,
    Quad,
    Ascii,
    Fill,
    Comm,
    Driver,
    Handler,
    /// A lone `.`, reading the current location counter.
    LocationCounter,
    // Literals
    Integer,
    Flonum,
    StringLiteral,
    // Punctuation
    Dollar,
    Equals,
    Plus,
    Minus,
    Star,
    Slash,
    LeftBrace,
    RightBrace,
    Comma,
    // Register families
    Reg8,
    Reg16,
    Reg32,
    Reg64,
    // Instruction mnemonic families
    Insn0,
    Insn0Wq,
    Insn0NoSuff,
    Insn1S,
    Insn1E,
    InsnLea,
    InsnShift,
    Insn1M,
    InsnJc,
    InsnBE,
    InsnExt,
    InsnIn,
    InsnOut,
    InsnIoS,
    Iret,
    // Identifiers
    /// A label declaration, i.e. a name immediately followed by `:`
    /// (the colon is part of the lexeme).
    Label,
    Identifier,
    // Everything else
    Error,
    EOF,
}

// ======================================================
// Mnemonic families
// ======================================================

/// String moves and friends: no operands, optional width suffix.
pub(crate) const INSN_0_BASES: &[&str] = &["movs", "stos", "lods"];

/// Flag pushes: no operands, w/l/q suffix only.
pub(crate) const INSN_0_WQ_BASES: &[&str] = &["pushf", "popf"];

/// No operands, no suffix.
pub(crate) const INSN_0_NOSUFF_BASES: &[&str] =
    &["ret", "hlt", "nop", "clc", "cld", "cli", "stc", "std", "sti"];

/// One register-or-memory operand.
pub(crate) const INSN_1_E_BASES: &[&str] = &["push", "pop", "neg", "not"];

/// Shifts: optional immediate count plus a register.
pub(crate) const INSN_SHIFT_BASES: &[&str] = &["sal", "sar", "shl", "shr"];

/// Conditional jumps: one memory target, no suffix.
pub(crate) const INSN_1_M_BASES: &[&str] = &[
    "jc", "jnc", "jz", "jnz", "js", "jns", "jo", "jno", "jp", "jnp",
    "je", "jne", "ja", "jae", "jb", "jbe", "jg", "jge", "jl", "jle",
];

/// Unconditional transfers: `*reg` or a memory target.
pub(crate) const INSN_JC_BASES: &[&str] = &["jmp", "call"];

/// Two operands, immediate-or-register-or-memory into
/// register-or-memory.
pub(crate) const INSN_B_E_BASES: &[&str] =
    &["mov", "add", "sub", "adc", "sbb", "cmp", "test", "and", "or", "xor"];

/// Widening moves, suffixed by a (source, destination) pair.
pub(crate) const INSN_EXT_BASES: &[&str] = &["movs", "movz"];

/// String port transfers.
pub(crate) const INSN_IO_S_BASES: &[&str] = &["ins", "outs"];

/// The width (in bytes) encoded by a mnemonic suffix character.
pub(crate) fn suffix_size(c: char) -> Option<u8> {
    match c {
        'b' => Some(1),
        'w' => Some(2),
        'l' => Some(4),
        'q' => Some(8),
        _ => None,
    }
}

/// Classify a lower-case alphabetic word as an instruction mnemonic,
/// if it is one.  The word is the _longest_ alphabetic run at the
/// scan position, so a mnemonic only matches when the whole word is
/// one (otherwise the identifier rule outbids it on length anyway).
fn classify_mnemonic(word: &str) -> Option<Token> {
    // Fixed spellings first.
    match word {
        "iret" => return Some(Token::Iret),
        "int" => return Some(Token::Insn1S),
        "in" => return Some(Token::InsnIn),
        "out" => return Some(Token::InsnOut),
        "lea" => return Some(Token::InsnLea),
        _ => {}
    }
    if INSN_0_NOSUFF_BASES.contains(&word) {
        return Some(Token::Insn0NoSuff);
    }
    if INSN_1_M_BASES.contains(&word) {
        return Some(Token::Insn1M);
    }
    // A movs/movz extension carries a two-character suffix pair.
    if word.len() > 2 {
        let (stem, pair) = word.split_at(word.len() - 2);
        let mut cs = pair.chars();
        let src = cs.next().and_then(suffix_size);
        let dst = cs.next().and_then(suffix_size);
        if INSN_EXT_BASES.contains(&stem) && src.is_some() && dst.is_some() {
            return Some(Token::InsnExt);
        }
    }
    // A single width suffix on any family that takes one.
    if word.len() > 1 {
        let (stem, last) = word.split_at(word.len() - 1);
        if let Some(c) = last.chars().next() {
            if suffix_size(c).is_some() {
                if INSN_0_BASES.contains(&stem) {
                    return Some(Token::Insn0);
                }
                if INSN_0_WQ_BASES.contains(&stem) && c != 'b' {
                    return Some(Token::Insn0Wq);
                }
                if INSN_1_E_BASES.contains(&stem) {
                    return Some(Token::Insn1E);
                }
                if INSN_SHIFT_BASES.contains(&stem) {
                    return Some(Token::InsnShift);
                }
                if INSN_JC_BASES.contains(&stem) {
                    return Some(Token::InsnJc);
                }
                if INSN_B_E_BASES.contains(&stem) {
                    return Some(Token::InsnBE);
                }
                if INSN_IO_S_BASES.contains(&stem) {
                    return Some(Token::InsnIoS);
                }
                match stem {
                    "lea" => return Some(Token::InsnLea),
                    "in" => return Some(Token::InsnIn),
                    "out" => return Some(Token::InsnOut),
                    _ => {}
                }
            }
        }
    }
    // Bare bases of the suffix-bearing families.
    if INSN_0_BASES.contains(&word) {
        Some(Token::Insn0)
    } else if INSN_0_WQ_BASES.contains(&word) {
        Some(Token::Insn0Wq)
    } else if INSN_1_E_BASES.contains(&word) {
        Some(Token::Insn1E)
    } else if INSN_SHIFT_BASES.contains(&word) {
        Some(Token::InsnShift)
    } else if INSN_JC_BASES.contains(&word) {
        Some(Token::InsnJc)
    } else if INSN_B_E_BASES.contains(&word) {
        Some(Token::InsnBE)
    } else if INSN_IO_S_BASES.contains(&word) {
        Some(Token::InsnIoS)
    } else {
        None
    }
}

// ======================================================
// Rules
// ======================================================

/// Handy type alias for the result type used for all of the lexical
/// rules.
type ScanResult = Result<Span<Token>, ()>;

/// Every directive keyword, including its leading dot.  The lone dot
/// is a separate rule, so it never shadows these (the longest match
/// wins).
const DIRECTIVES: &[(&str, Token)] = &[
    (".org", Token::Org),
    (".data", Token::Data),
    (".text", Token::Text),
    (".bss", Token::Bss),
    (".end", Token::End),
    (".equ", Token::Equ),
    (".byte", Token::Byte),
    (".word", Token::Word),
    (".long", Token::Long),
    (".quad", Token::Quad),
    (".ascii", Token::Ascii),
    (".fill", Token::Fill),
    (".comm", Token::Comm),
    (".driver", Token::Driver),
    (".handler", Token::Handler),
];

/// First character of a label name.  A dash is deliberately excluded
/// here (though permitted afterwards), otherwise `-8` would lex as a
/// name rather than a negative displacement.
fn is_name_start(c: char) -> bool {
    c == '.' || c == '_' || c.is_ascii_alphanumeric()
}

fn is_name_char(c: char) -> bool {
    c == '-' || is_name_start(c)
}

/// Check whether the input starts with a given (lower-case, ASCII)
/// keyword, ignoring case.
fn starts_with_keyword(input: &[char], keyword: &str) -> bool {
    keyword.len() <= input.len()
        && keyword.chars().zip(input.iter()).all(|(k, c)| k == c.to_ascii_lowercase())
}

/// Helper which scans a run of items matching a given predicate.  If
/// no characters match, then it fails.
fn scan_whilst<P>(input: &[char], t: Token, pred: P) -> ScanResult
where
    P: Fn(char) -> bool,
{
    let mut i = 0;
    // Continue whilst predicate matches
    while i < input.len() && pred(input[i]) {
        i += 1;
    }
    // Check what happened
    if i == 0 {
        Err(())
    } else {
        Ok(Span::new(t, 0..i))
    }
}

fn scan_whitespace(input: &[char]) -> ScanResult {
    scan_whilst(input, Token::Whitespace, |c| c == ' ' || c == '\t' || c == '\x0c')
}

fn scan_comment(input: &[char]) -> ScanResult {
    if input.first() == Some(&'#') {
        // Line comment, up to (but not including) the newline.
        let mut i = 1;
        while i < input.len() && input[i] != '\n' {
            i += 1;
        }
        Ok(Span::new(Token::Comment, 0..i))
    } else if input.starts_with(&['/', '*']) {
        // Block comment, no nesting.  An unterminated one swallows
        // the rest of the input.
        let mut i = 2;
        while i < input.len() {
            if input[i - 1] == '*' && input[i] == '/' && i > 2 {
                return Ok(Span::new(Token::Comment, 0..i + 1));
            }
            i += 1;
        }
        Ok(Span::new(Token::Comment, 0..input.len()))
    } else {
        Err(())
    }
}

/// A statement terminator: any run of newlines, carriage returns and
/// semicolons collapses into a single token.
fn scan_newline(input: &[char]) -> ScanResult {
    scan_whilst(input, Token::Newline, |c| c == '\n' || c == '\r' || c == ';')
}

fn scan_directive(input: &[char]) -> ScanResult {
    let mut best: Option<(usize, Token)> = None;
    for (kw, t) in DIRECTIVES {
        if starts_with_keyword(input, kw) {
            match best {
                Some((n, _)) if kw.len() <= n => {}
                _ => {
                    best = Some((kw.len(), *t));
                }
            }
        }
    }
    match best {
        Some((n, t)) => Ok(Span::new(t, 0..n)),
        None => Err(()),
    }
}

fn scan_location_counter(input: &[char]) -> ScanResult {
    if input.first() == Some(&'.') {
        Ok(Span::new(Token::LocationCounter, 0..1))
    } else {
        Err(())
    }
}

/// Scan a numeric literal: decimal, `0x` hex, `0b` binary, or the
/// `0e` float form (which is lexed here but rejected on evaluation).
fn scan_integer(input: &[char]) -> ScanResult {
    if input.is_empty() || !input[0].is_ascii_digit() {
        return Err(());
    }
    if input[0] == '0' && input.len() > 1 {
        match input[1].to_ascii_lowercase() {
            'x' => {
                let r = scan_whilst(&input[2..], Token::Integer, |c| c.is_ascii_hexdigit());
                if let Ok(span) = r {
                    return Ok(Span::new(Token::Integer, 0..span.len() + 2));
                }
            }
            'b' => {
                let r = scan_whilst(&input[2..], Token::Integer, |c| c == '0' || c == '1');
                if let Ok(span) = r {
                    return Ok(Span::new(Token::Integer, 0..span.len() + 2));
                }
            }
            'e' => {
                if let Some(n) = scan_flonum_tail(&input[2..]) {
                    return Ok(Span::new(Token::Flonum, 0..n + 2));
                }
            }
            _ => {}
        }
    }
    // Plain decimal run.
    scan_whilst(input, Token::Integer, |c| c.is_ascii_digit())
}

/// The part of a FLONUM after the `0e` prefix:
/// `[+-]? digits [. digits]? (e [+-]? digits)?`.
fn scan_flonum_tail(input: &[char]) -> Option<usize> {
    let mut i = 0;
    if matches!(input.first(), Some('+') | Some('-')) {
        i += 1;
    }
    let mantissa = i;
    while i < input.len() && input[i].is_ascii_digit() {
        i += 1;
    }
    if i == mantissa {
        return None;
    }
    if input.get(i) == Some(&'.') {
        let mut j = i + 1;
        while j < input.len() && input[j].is_ascii_digit() {
            j += 1;
        }
        if j > i + 1 {
            i = j;
        }
    }
    if matches!(input.get(i).map(|c| c.to_ascii_lowercase()), Some('e')) {
        let mut j = i + 1;
        if matches!(input.get(j), Some('+') | Some('-')) {
            j += 1;
        }
        let exponent = j;
        while j < input.len() && input[j].is_ascii_digit() {
            j += 1;
        }
        if j > exponent {
            i = j;
        }
    }
    Some(i)
}

fn scan_punctuation(input: &[char]) -> ScanResult {
    let t = match input.first() {
        Some('$') => Token::Dollar,
        Some('=') => Token::Equals,
        Some('+') => Token::Plus,
        Some('-') => Token::Minus,
        Some('*') => Token::Star,
        Some('/') => Token::Slash,
        Some('(') => Token::LeftBrace,
        Some(')') => Token::RightBrace,
        Some(',') => Token::Comma,
        _ => return Err(()),
    };
    Ok(Span::new(t, 0..1))
}

/// Scan a `%`-prefixed register name.  The longest name of any family
/// wins, so `%r8d` is a 32-bit register rather than `%r8` followed by
/// junk.
fn scan_register(input: &[char]) -> ScanResult {
    if input.first() != Some(&'%') {
        return Err(());
    }
    let families: [(&[&str; 16], Token); 4] = [
        (&amd64::BYTE, Token::Reg8),
        (&amd64::WORD, Token::Reg16),
        (&amd64::DWORD, Token::Reg32),
        (&amd64::QWORD, Token::Reg64),
    ];
    let mut best: Option<(usize, Token)> = None;
    for (names, t) in families {
        for name in names {
            if starts_with_keyword(&input[1..], name) {
                match best {
                    Some((n, _)) if name.len() <= n => {}
                    _ => {
                        best = Some((name.len(), t));
                    }
                }
            }
        }
    }
    match best {
        Some((n, t)) => Ok(Span::new(t, 0..n + 1)),
        None => Err(()),
    }
}

fn scan_mnemonic(input: &[char]) -> ScanResult {
    let n = input.iter().take_while(|c| c.is_ascii_alphabetic()).count();
    if n == 0 {
        return Err(());
    }
    let word: String = input[..n].iter().map(|c| c.to_ascii_lowercase()).collect();
    match classify_mnemonic(&word) {
        Some(t) => Ok(Span::new(t, 0..n)),
        None => Err(()),
    }
}

/// A label declaration: a name immediately followed by a colon.  The
/// colon is included in the lexeme, which is also what lets a label
/// outbid a mnemonic of the same spelling on length.
fn scan_label(input: &[char]) -> ScanResult {
    let span = scan_name(input)?;
    if input.get(span.len()) == Some(&':') {
        Ok(Span::new(Token::Label, 0..span.len() + 1))
    } else {
        Err(())
    }
}

fn scan_identifier(input: &[char]) -> ScanResult {
    scan_name(input)
}

fn scan_name(input: &[char]) -> ScanResult {
    if input.is_empty() || !is_name_start(input[0]) {
        return Err(());
    }
    scan_whilst(input, Token::Identifier, is_name_char)
}

/// A double-quoted string literal.  Escapes are passed through here
/// (decoding happens when `.ascii` consumes the token); a raw newline
/// or end-of-input before the closing quote fails the rule, leaving
/// the quote to surface as an error token.
fn scan_string(input: &[char]) -> ScanResult {
    if input.first() != Some(&'"') {
        return Err(());
    }
    let mut i = 1;
    while i < input.len() {
        match input[i] {
            '"' => return Ok(Span::new(Token::StringLiteral, 0..i + 1)),
            '\\' => {
                // Skip whatever follows, including a line
                // continuation.
                i += 2;
            }
            '\n' => return Err(()),
            _ => i += 1,
        }
    }
    Err(())
}

/// If there is nothing left to scan, then we've reached the
/// End-Of-File.
fn scan_eof(input: &[char]) -> ScanResult {
    if input.is_empty() {
        Ok(Span::new(Token::EOF, 0..0))
    } else {
        Err(())
    }
}

/// The set of rules used for lexing, in declaration-priority order.
static RULES: &[Scanner<char, Token>] = &[
    scan_whitespace,
    scan_comment,
    scan_newline,
    scan_directive,
    scan_location_counter,
    scan_integer,
    scan_punctuation,
    scan_register,
    scan_mnemonic,
    scan_label,
    scan_identifier,
    scan_string,
    scan_eof,
];

fn tokenizer() -> TableTokenizer<char, Token> {
    TableTokenizer::new(RULES.to_vec(), Token::Error)
}

// ======================================================
// Lexer
// ======================================================

/// The token cursor shared by all of the grammar productions.  It
/// skips hidden tokens, supports the one-token (and, for addressing,
/// two-token) lookahead the grammar needs, and maps spans back onto
/// one-based line/column positions for diagnostics.
pub struct Lexer {
    inner: lex::Lexer<TableTokenizer<char, Token>>,
    /// Offsets (in chars) at which each source line starts.
    line_starts: Vec<usize>,
}

impl Lexer {
    /// Construct a lexer over a given source text.
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let mut line_starts = vec![0];
        for (i, c) in chars.iter().enumerate() {
            if *c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { inner: lex::Lexer::new(chars, tokenizer()), line_starts }
    }

    /// Skip over hidden tokens starting at a given offset.
    fn skip_hidden(&self, mut offset: usize) -> usize {
        loop {
            let span = self.inner.scan_from(offset);
            match span.kind {
                Token::Whitespace | Token::Comment => offset = span.end(),
                _ => return offset,
            }
        }
    }

    /// Peek at the next visible token.
    pub fn peek(&self) -> Span<Token> {
        self.inner.scan_from(self.skip_hidden(self.inner.offset()))
    }

    /// Peek at the visible token after the next one.  This is the
    /// lookahead that tells a bare displacement apart from one
    /// followed by a parenthesised register block.
    pub fn peek2(&self) -> Span<Token> {
        let first = self.peek();
        self.inner.scan_from(self.skip_hidden(first.end()))
    }

    /// Consume and return the next visible token.
    pub fn next(&mut self) -> Span<Token> {
        let span = self.peek();
        self.inner.set_offset(span.end());
        span
    }

    /// Match a token of the given kind, or fail with a diagnostic
    /// describing what was required.
    pub fn snap(&mut self, kind: Token, what: &'static str) -> Result<Span<Token>, ParseError> {
        let lookahead = self.peek();
        if lookahead.kind == kind {
            Ok(self.next())
        } else {
            Err(self.error_at(lookahead, ErrorCode::ExpectedToken(what)))
        }
    }

    /// Get the lexeme covered by a given span.
    pub fn get_str(&self, span: Span<Token>) -> String {
        self.inner.get(span).iter().collect()
    }

    /// Map a span onto its one-based (line, column) position.
    pub fn position(&self, span: Span<Token>) -> (usize, usize) {
        let line = self.line_starts.partition_point(|s| *s <= span.start());
        let column = span.start() - self.line_starts[line - 1] + 1;
        (line, column)
    }

    /// Construct a diagnostic anchored at a given span.
    pub fn error_at(&self, span: Span<Token>, code: ErrorCode) -> ParseError {
        let (line, column) = self.position(span);
        ParseError::new(code, line, column)
    }
}

/// Produce the full token stream for a source text, hidden and error
/// tokens included, terminated by the EOF token.  This is the surface
/// a syntax highlighter works from.
pub fn tokenize(input: &str) -> Vec<Span<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut lexer = lex::Lexer::new(chars, tokenizer());
    let mut tokens = Vec::new();
    loop {
        let span = lexer.next();
        let done = span.kind == Token::EOF;
        tokens.push(span);
        if done {
            return tokens;
        }
    }
}

// ======================================================
// Tests
// ======================================================
