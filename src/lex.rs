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
use std::ops::Range;

// =================================================================
// Region
// =================================================================

/// Basically the same as `std::ops::Range`, but implements `Copy`.
/// Note, like `Range`, this is _half open_.  That means `start`
/// identifies the first index in the region, whilst `end` is one past
/// the last index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub start: usize,
    pub end: usize,
}

impl Region {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Determine the number of items this region covers.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn shift(&mut self, delta: usize) {
        self.start += delta;
        self.end += delta;
    }
}

/// Simple mechanism for constructing a `Region` from a `Range`.
impl From<Range<usize>> for Region {
    fn from(r: Range<usize>) -> Region {
        Region { start: r.start, end: r.end }
    }
}

impl From<Region> for Range<usize> {
    fn from(r: Region) -> Range<usize> {
        r.start..r.end
    }
}

// =================================================================
// Span
// =================================================================

/// A token of a given kind covering a (half open) region of the
/// underlying sequence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Span<T>
where
    T: Clone + Copy + PartialEq,
{
    /// Type of the token
    pub kind: T,
    /// Identifies the (half open) region in the sequence.
    pub region: Region,
}

impl<T> Span<T>
where
    T: Clone + Copy + PartialEq,
{
    pub fn new(kind: T, range: Range<usize>) -> Self {
        Self { kind, region: Region::from(range) }
    }

    /// Get first index of this token.
    pub fn start(&self) -> usize {
        self.region.start
    }

    /// Get end of this token (that is one past its last character).
    pub fn end(&self) -> usize {
        self.region.end
    }

    /// Get the length (in items) of this token.
    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Extract the underlying region covered by this span as a
    /// `Range`.  This is really just for convenience.
    pub fn range(&self) -> Range<usize> {
        self.start()..self.end()
    }

    /// Shift the span to a different position in the underlying
    /// sequence.  The position is taken as a delta from the current
    /// position (e.g. `delta==1` means we shift one up the sequence).
    pub fn shift(&mut self, delta: usize) {
        self.region.shift(delta);
    }
}

// =================================================================
// Tokenizer
// =================================================================

/// Provides a generic description of something which splits items in
/// the input sequence up into tokens.
pub trait Tokenizer {
    /// Identifies items in the underlying sequence being tokenized.
    type Item;
    /// Identifies the token type produced by this tokenizer.
    type Token: Clone + Copy + PartialEq;
    /// Responsible for producing a token from a given position in the
    /// input.
    fn scan(&self, input: &[Self::Item]) -> Span<Self::Token>;
}

// =================================================================
// Table Tokenizer
// =================================================================

/// Defines a very simple concept of a scanner which requires no
/// state.  Tokenizers can be built out of scanners, for example.
pub type Scanner<S, T> = fn(&[S]) -> Result<Span<T>, ()>;

/// A tokenizer constructed from one or more scanners.  All scanners
/// are tried at the current position and the _longest_ match wins,
/// with ties resolved by order of appearance in the table.  When no
/// scanner matches a non-empty input, a single-item token of the
/// designated error kind is produced.  Hence, a table tokenizer is
/// total: every item of the input ends up covered by some token.
pub struct TableTokenizer<S, T>
where
    T: Copy + Clone + PartialEq,
{
    /// The table of scanners to use for scanning.
    table: Vec<Scanner<S, T>>,
    /// Token kind produced when nothing in the table matches.
    error: T,
}

impl<S, T> TableTokenizer<S, T>
where
    T: Copy + Clone + PartialEq,
{
    /// Construct a new tokenizer from a given table.
    pub fn new(table: Vec<Scanner<S, T>>, error: T) -> Self {
        Self { table, error }
    }
}

impl<S, T> Tokenizer for TableTokenizer<S, T>
where
    T: Copy + Clone + PartialEq,
{
    type Item = S;
    type Token = T;

    fn scan(&self, input: &[Self::Item]) -> Span<Self::Token> {
        let mut best: Option<Span<T>> = None;
        //
        for s in &self.table {
            if let Ok(span) = s(input) {
                // Strictly longer matches win, hence ties keep the
                // earliest rule in the table.
                match best {
                    Some(b) if span.len() <= b.len() => {}
                    _ => {
                        best = Some(span);
                    }
                }
            }
        }
        //
        match best {
            Some(span) => span,
            None if input.is_empty() => Span::new(self.error, 0..0),
            None => Span::new(self.error, 0..1),
        }
    }
}

// =================================================================
// Lexer
// =================================================================

/// Provides machinery for splitting up an _underlying sequence_ of
/// items into a sequence of tokens, where each token can correspond
/// to one or more items in the underlying sequence.
pub struct Lexer<T: Tokenizer> {
    /// Underlying sequence being tokenised
    input: Vec<T::Item>,
    /// Current position in the item sequence
    offset: usize,
    /// Responsible for dividing items into tokens
    tokenizer: T,
}

impl<T: Tokenizer> Lexer<T> {
    /// Construct a new lexer for a given item sequence.
    pub fn new(input: Vec<T::Item>, tokenizer: T) -> Self {
        Self { input, offset: 0, tokenizer }
    }

    /// Get the slice which corresponds to a given span from the
    /// underlying sequence.
    pub fn get(&self, span: Span<T::Token>) -> &[T::Item] {
        &self.input[span.range()]
    }

    /// Current position of the token cursor.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Reposition the token cursor.
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Scan the token starting at an arbitrary position, without
    /// moving the cursor.  This is what supports multi-token
    /// lookahead.
    pub fn scan_from(&self, start: usize) -> Span<T::Token> {
        // Scan token at the given position
        let mut span = self.tokenizer.scan(&self.input[start..]);
        // Shift to correct position
        span.shift(start);
        // Done
        span
    }

    /// Peek at the next token in the sequence.
    pub fn peek(&self) -> Span<T::Token> {
        self.scan_from(self.offset)
    }

    /// Get the next token in the sequence, moving the cursor past it.
    pub fn next(&mut self) -> Span<T::Token> {
        let t = self.scan_from(self.offset);
        self.offset = t.end();
        t
    }
}
