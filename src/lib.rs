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

//! The front-end of a teaching x86-64 assembler.  It ingests a single
//! source text written in an AT&T-flavoured 64-bit dialect and
//! produces an in-memory program (instructions, data image, symbol
//! table and interrupt drivers) for a downstream simulator, together
//! with whatever diagnostics arose on the way.

/// The architectural register file, i.e. the fixed name-to-id mapping
/// for the four register size families.
pub mod amd64;
/// The assembler core: lexer, expression evaluator, operand and
/// instruction models, parser and program.
pub mod asm;
/// Generic machinery for splitting an underlying sequence of items
/// into tokens.
pub mod lex;
