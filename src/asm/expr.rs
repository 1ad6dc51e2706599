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

//! A recursive-descent calculator over integer literals, the location
//! counter and symbol references.  Expressions evaluate eagerly to a
//! 64-bit signed integer with two's-complement (wrapping) arithmetic:
//!
//! ```text
//! Expression = Term { ('+'|'-') Term }
//! Term       = Primary { ('*'|'/') Primary }
//! Primary    = INTEGER | '.' | NAME | '(' Expression ')' | '-' Primary
//! ```

use std::collections::HashMap;

use super::lexer::{Lexer, Token};
use super::program::Program;
use super::{ErrorCode, ParseError};

// ===================================================================
// Evaluation context
// ===================================================================

/// What an expression can see of the program being built: the current
/// location counter (readable as `.`) and the symbols defined so far.
/// Symbols resolve to plain integers here, never to references into
/// the table.
pub struct EvalContext<'a> {
    pub location_counter: u64,
    pub symbols: &'a HashMap<String, u64>,
}

impl<'a> EvalContext<'a> {
    pub fn of(program: &'a Program) -> Self {
        Self { location_counter: program.location_counter(), symbols: program.symbols() }
    }
}

// ===================================================================
// Evaluator
// ===================================================================

/// Parse and evaluate an expression at the current cursor position.
pub fn expression(lexer: &mut Lexer, ctx: &EvalContext) -> Result<i64, ParseError> {
    let mut value = term(lexer, ctx)?;
    loop {
        match lexer.peek().kind {
            Token::Plus => {
                lexer.next();
                value = value.wrapping_add(term(lexer, ctx)?);
            }
            Token::Minus => {
                lexer.next();
                value = value.wrapping_sub(term(lexer, ctx)?);
            }
            _ => return Ok(value),
        }
    }
}

fn term(lexer: &mut Lexer, ctx: &EvalContext) -> Result<i64, ParseError> {
    let mut value = primary(lexer, ctx)?;
    loop {
        match lexer.peek().kind {
            Token::Star => {
                lexer.next();
                value = value.wrapping_mul(primary(lexer, ctx)?);
            }
            Token::Slash => {
                let op = lexer.next();
                let rhs = primary(lexer, ctx)?;
                if rhs == 0 {
                    return Err(lexer.error_at(op, ErrorCode::DivisionByZero));
                }
                value = value.wrapping_div(rhs);
            }
            _ => return Ok(value),
        }
    }
}

fn primary(lexer: &mut Lexer, ctx: &EvalContext) -> Result<i64, ParseError> {
    let lookahead = lexer.peek();
    match lookahead.kind {
        Token::Integer => {
            lexer.next();
            integer_value(&lexer.get_str(lookahead))
                .map_err(|code| lexer.error_at(lookahead, code))
        }
        Token::Flonum => {
            lexer.next();
            Err(lexer.error_at(lookahead, ErrorCode::Flonum))
        }
        Token::LocationCounter => {
            lexer.next();
            Ok(ctx.location_counter as i64)
        }
        Token::Identifier => {
            lexer.next();
            let name = lexer.get_str(lookahead).to_ascii_lowercase();
            match ctx.symbols.get(&name) {
                Some(v) => Ok(*v as i64),
                None => Err(lexer.error_at(lookahead, ErrorCode::UndefinedSymbol(name))),
            }
        }
        Token::LeftBrace => {
            lexer.next();
            let value = expression(lexer, ctx)?;
            lexer.snap(Token::RightBrace, "')'")?;
            Ok(value)
        }
        Token::Minus => {
            lexer.next();
            Ok(primary(lexer, ctx)?.wrapping_neg())
        }
        _ => {
            let lexeme = lexer.get_str(lookahead);
            Err(lexer.error_at(lookahead, ErrorCode::UnexpectedToken(lexeme)))
        }
    }
}

/// Convert an INTEGER lexeme to its value.  Hex and binary literals
/// cover the full unsigned 64-bit range and wrap into the signed
/// domain.
pub fn integer_value(lexeme: &str) -> Result<i64, ErrorCode> {
    let lower = lexeme.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u64::from_str_radix(bin, 2)
    } else {
        lower.parse::<u64>()
    };
    match parsed {
        Ok(v) => Ok(v as i64),
        Err(_) => Err(ErrorCode::InvalidNumber(lexeme.to_string())),
    }
}

// ======================================================
// Tests
// ======================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(input: &str) -> Result<i64, ParseError> {
        let symbols = HashMap::new();
        let ctx = EvalContext { location_counter: 0x100, symbols: &symbols };
        expression(&mut Lexer::new(input), &ctx)
    }

    #[test]
    fn literal_bases() {
        assert_eq!(eval("42").unwrap(), 42);
        assert_eq!(eval("0x2a").unwrap(), 42);
        assert_eq!(eval("0b101010").unwrap(), 42);
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("2 + 3 * 4").unwrap(), 14);
        assert_eq!(eval("10 - 4 - 3").unwrap(), 3);
        assert_eq!(eval("20 / 3 / 2").unwrap(), 3);
        assert_eq!(eval("(2 + 3) * 4").unwrap(), 20);
    }

    #[test]
    fn unary_minus() {
        assert_eq!(eval("-5").unwrap(), -5);
        assert_eq!(eval("--5").unwrap(), 5);
        assert_eq!(eval("2 * -3").unwrap(), -6);
    }

    #[test]
    fn wrapping_arithmetic() {
        assert_eq!(eval("0x7fffffffffffffff + 1").unwrap(), i64::MIN);
        assert_eq!(eval("0xffffffffffffffff").unwrap(), -1);
    }

    #[test]
    fn location_counter_reads_through_context() {
        assert_eq!(eval(". + 8").unwrap(), 0x108);
    }

    #[test]
    fn division_by_zero_is_reported() {
        let e = eval("1 / 0").unwrap_err();
        assert_eq!(e.code, ErrorCode::DivisionByZero);
    }

    #[test]
    fn flonums_are_rejected() {
        let e = eval("0e12").unwrap_err();
        assert_eq!(e.code.to_string(), "FLONUMS are still not supported");
    }

    #[test]
    fn symbols_resolve() {
        let mut symbols = HashMap::new();
        symbols.insert("base".to_string(), 0x40u64);
        let ctx = EvalContext { location_counter: 0, symbols: &symbols };
        let v = expression(&mut Lexer::new("BASE + 2"), &ctx).unwrap();
        assert_eq!(v, 0x42);
        let e = expression(&mut Lexer::new("missing"), &ctx).unwrap_err();
        assert!(matches!(e.code, ErrorCode::UndefinedSymbol(_)));
    }
}
