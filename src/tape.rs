//! Tapes with absolute, signed head coordinates.
//!
//! A tape stores the written region as a vector of cells plus the absolute position of the
//! first cell. Everything outside that region reads as the blank symbol. Writing or moving a
//! head outside the region grows it with blanks, so positions never shift when the tape
//! extends to the left.

use crate::types::Symbol;
use serde::{Deserialize, Serialize};

/// A single, unbounded tape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tape {
    cells: Vec<Symbol>,
    origin: isize,
    blank: Symbol,
}

impl Tape {
    /// Creates a tape whose first input symbol sits at position 0.
    pub fn new(input: Vec<Symbol>, blank: impl Into<Symbol>) -> Self {
        Self {
            cells: input,
            origin: 0,
            blank: blank.into(),
        }
    }

    /// An empty tape.
    pub fn blank(blank: impl Into<Symbol>) -> Self {
        Self::new(Vec::new(), blank)
    }

    /// Returns the symbol at `position`, or the blank symbol if it was never written.
    pub fn read(&self, position: isize) -> &str {
        self.index(position)
            .and_then(|i| self.cells.get(i))
            .map_or(self.blank.as_str(), String::as_str)
    }

    /// Writes `symbol` at `position`, growing the tape as needed.
    pub fn write(&mut self, position: isize, symbol: &str) {
        self.ensure(position);
        if let Some(i) = self.index(position) {
            if let Some(cell) = self.cells.get_mut(i) {
                *cell = symbol.to_string();
            }
        }
    }

    /// Grows the tape with blanks until `position` lies inside the written region.
    pub fn ensure(&mut self, position: isize) {
        if self.cells.is_empty() {
            self.origin = position;
            self.cells.push(self.blank.clone());
            return;
        }

        if position < self.origin {
            let missing = (self.origin - position) as usize;
            self.cells
                .splice(0..0, std::iter::repeat(self.blank.clone()).take(missing));
            self.origin = position;
        }

        let end = self.origin + self.cells.len() as isize;
        if position >= end {
            let missing = (position - end + 1) as usize;
            self.cells
                .extend(std::iter::repeat(self.blank.clone()).take(missing));
        }
    }

    /// The blank symbol of this tape.
    pub fn blank_symbol(&self) -> &str {
        &self.blank
    }

    /// The written cells, including any blanks inside or at the edges of the region.
    pub fn cells(&self) -> &[Symbol] {
        &self.cells
    }

    /// The absolute position of the first written cell.
    pub fn origin(&self) -> isize {
        self.origin
    }

    /// The tape content with leading and trailing blanks removed, symbols concatenated.
    pub fn contents(&self) -> String {
        self.trimmed().1.concat()
    }

    /// The non-blank region as `(absolute start, cells)`.
    ///
    /// Two tapes with the same trimmed region hold the same content regardless of how far
    /// each one was grown with blanks.
    pub fn trimmed(&self) -> (isize, &[Symbol]) {
        let start = self.cells.iter().position(|c| *c != self.blank);
        match start {
            None => (0, &[]),
            Some(start) => {
                let end = self
                    .cells
                    .iter()
                    .rposition(|c| *c != self.blank)
                    .map_or(start, |e| e + 1);
                (self.origin + start as isize, &self.cells[start..end])
            }
        }
    }

    fn index(&self, position: isize) -> Option<usize> {
        let offset = position - self.origin;
        if offset < 0 {
            None
        } else {
            Some(offset as usize)
        }
    }
}

/// The head of one tape in a multi-tape machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TapeHead {
    pub tape_id: usize,
    pub position: isize,
}

impl TapeHead {
    pub fn new(tape_id: usize, position: isize) -> Self {
        Self { tape_id, position }
    }
}

/// Splits an input string into one symbol per character.
pub fn tokenize(input: &str) -> Vec<Symbol> {
    input.chars().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tape(input: &str) -> Tape {
        Tape::new(tokenize(input), "B")
    }

    #[test]
    fn test_read_outside_region_is_blank() {
        let tape = tape("ab");

        assert_eq!(tape.read(0), "a");
        assert_eq!(tape.read(1), "b");
        assert_eq!(tape.read(2), "B");
        assert_eq!(tape.read(-1), "B");
    }

    #[test]
    fn test_extend_left_keeps_absolute_positions() {
        let mut tape = tape("ab");
        tape.write(-2, "x");

        assert_eq!(tape.origin(), -2);
        assert_eq!(tape.cells(), &["x", "B", "a", "b"]);
        assert_eq!(tape.read(0), "a");
        assert_eq!(tape.read(-2), "x");
    }

    #[test]
    fn test_extend_right_with_blanks() {
        let mut tape = tape("a");
        tape.ensure(3);

        assert_eq!(tape.cells().len(), 4);
        assert_eq!(tape.contents(), "a");
    }

    #[test]
    fn test_empty_tape_grows_from_first_write() {
        let mut tape = Tape::blank("B");
        tape.write(5, "1");

        assert_eq!(tape.origin(), 5);
        assert_eq!(tape.read(5), "1");
        assert_eq!(tape.contents(), "1");
    }

    #[test]
    fn test_trimmed_ignores_padding() {
        let mut padded = tape("10");
        padded.ensure(-3);
        padded.ensure(6);

        assert_eq!(padded.trimmed(), tape("10").trimmed());
        assert_eq!(Tape::blank("B").trimmed(), (0, &[][..]));
    }

    #[test]
    fn test_contents_keeps_inner_blanks() {
        let mut tape = tape("1");
        tape.write(2, "1");

        assert_eq!(tape.contents(), "1B1");
    }
}
