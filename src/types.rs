//! This module defines the core data structures and types shared by every machine variant,
//! including transitions, directions, execution limits, and the crate-wide error type.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::validation::Violation;
use crate::Rule;

/// A tape symbol. Symbols are strings so combined track symbols fit the same type.
pub type Symbol = String;
/// An opaque state identifier.
pub type State = String;

/// The blank symbol used when a machine file does not declare one.
pub const DEFAULT_BLANK_SYMBOL: &str = "_";
/// A special symbol used in machine files to stand for the declared blank symbol.
pub const INPUT_BLANK_SYMBOL: &str = "_";
/// The maximum allowed size for a machine file in bytes.
pub const MAX_PROGRAM_SIZE: usize = 65536; // 64KB
/// The default maximum number of steps to execute before giving up.
pub const MAX_EXECUTION_STEPS: usize = 10000;
/// The default maximum number of branches a non-deterministic search explores.
pub const MAX_BRANCHES: usize = 1000;
/// The default maximum depth for computation-tree analysis.
pub const MAX_TREE_DEPTH: usize = 100;

/// Represents the possible directions a Turing Machine head can move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Move the head one position to the left.
    Left,
    /// Move the head one position to the right.
    Right,
    /// Keep the head in the same position.
    Stay,
}

impl Direction {
    /// The signed head displacement for this direction.
    pub fn offset(self) -> isize {
        match self {
            Direction::Left => -1,
            Direction::Right => 1,
            Direction::Stay => 0,
        }
    }

    /// Applies this direction to a head position.
    pub fn apply(self, position: isize) -> isize {
        position + self.offset()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Direction::Left => 'L',
            Direction::Right => 'R',
            Direction::Stay => 'S',
        };
        write!(f, "{c}")
    }
}

/// A single-tape transition rule: `(state, read) -> (next_state, write, direction)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    /// The state this rule applies in.
    pub state: State,
    /// The symbol under the head.
    pub read: Symbol,
    /// The state the machine moves to.
    pub next_state: State,
    /// The symbol written before moving.
    pub write: Symbol,
    /// Where the head moves after writing.
    pub direction: Direction,
}

impl Transition {
    pub fn new(
        state: impl Into<State>,
        read: impl Into<Symbol>,
        next_state: impl Into<State>,
        write: impl Into<Symbol>,
        direction: Direction,
    ) -> Self {
        Self {
            state: state.into(),
            read: read.into(),
            next_state: next_state.into(),
            write: write.into(),
            direction,
        }
    }

    /// The `(state, symbol)` key this rule is looked up by.
    pub fn key(&self) -> (&str, &str) {
        (&self.state, &self.read)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) -> ({}, {}, {})",
            self.state, self.read, self.next_state, self.write, self.direction
        )
    }
}

/// A non-deterministic transition, one of possibly several choices for a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTransition {
    pub state: State,
    pub read: Symbol,
    pub next_state: State,
    pub write: Symbol,
    pub direction: Direction,
    /// Relative weight of this choice. Must be strictly positive.
    pub weight: f64,
}

impl WeightedTransition {
    pub fn new(
        state: impl Into<State>,
        read: impl Into<Symbol>,
        next_state: impl Into<State>,
        write: impl Into<Symbol>,
        direction: Direction,
        weight: f64,
    ) -> Self {
        Self {
            state: state.into(),
            read: read.into(),
            next_state: next_state.into(),
            write: write.into(),
            direction,
            weight,
        }
    }
}

impl fmt::Display for WeightedTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) -> ({}, {}, {}) @ {}",
            self.state, self.read, self.next_state, self.write, self.direction, self.weight
        )
    }
}

/// A multi-tape transition rule keyed by one symbol per tape.
///
/// `read`, `write` and `directions` must each have exactly one entry per tape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MultiTapeTransition {
    pub state: State,
    /// A vector of symbols to be read from each tape.
    pub read: Vec<Symbol>,
    pub next_state: State,
    /// A vector of symbols to be written to each tape.
    pub write: Vec<Symbol>,
    /// A vector of directions for each tape's head to move after the transition.
    pub directions: Vec<Direction>,
}

impl MultiTapeTransition {
    pub fn new<R, W>(
        state: impl Into<State>,
        read: R,
        next_state: impl Into<State>,
        write: W,
        directions: Vec<Direction>,
    ) -> Self
    where
        R: IntoIterator,
        R::Item: Into<Symbol>,
        W: IntoIterator,
        W::Item: Into<Symbol>,
    {
        Self {
            state: state.into(),
            read: read.into_iter().map(Into::into).collect(),
            next_state: next_state.into(),
            write: write.into_iter().map(Into::into).collect(),
            directions,
        }
    }
}

impl fmt::Display for MultiTapeTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let directions = self
            .directions
            .iter()
            .map(Direction::to_string)
            .collect::<Vec<_>>();
        write!(
            f,
            "({}, [{}]) -> ({}, [{}], [{}])",
            self.state,
            self.read.join(", "),
            self.next_state,
            self.write.join(", "),
            directions.join(", ")
        )
    }
}

/// Termination controls for a simulation. Hitting any of them is a normal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum number of transitions applied along one path.
    pub max_steps: usize,
    /// Maximum number of branches a non-deterministic search pops from its queue.
    pub max_branches: usize,
    /// Maximum depth of computation-tree analysis.
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: MAX_EXECUTION_STEPS,
            max_branches: MAX_BRANCHES,
            max_depth: MAX_TREE_DEPTH,
        }
    }
}

/// Represents the errors that can occur while building or running a machine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MachineError {
    /// Construction-time structural violations.
    #[error("Invalid machine configuration: {}", list(.0))]
    InvalidConfiguration(Vec<Violation>),
    /// A deterministic machine has ambiguous or missing transitions.
    #[error("Determinism violation: {}", list(.0))]
    DeterminismViolation(Vec<Violation>),
    /// A non-deterministic transition references unknown items or has a bad weight.
    #[error("Non-determinism inconsistency: {}", list(.0))]
    NonDeterminismInconsistency(Vec<Violation>),
    /// Tuple-length mismatch or a symbol outside its tape's alphabet.
    #[error("Multi-tape consistency error: {}", list(.0))]
    MultiTapeConsistency(Vec<Violation>),
    /// Any failure during an otherwise valid run, with the originating cause attached.
    #[error("Simulation error: {message}")]
    Simulation {
        message: String,
        #[source]
        source: Option<Box<MachineError>>,
    },
    /// Multi-tape heads could not be realigned.
    #[error("Head synchronization error: {0}")]
    Synchronization(String),
    /// A multi-tape machine could not be reduced to a single tape.
    #[error("Single-tape conversion error: {0}")]
    Conversion(String),
    /// An optimizer pass produced an unusable machine.
    #[error("Optimization error: {0}")]
    Optimization(String),
    /// The input handed to a simulation is malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Indicates an error during the parsing of a machine file.
    #[error("Program parsing error: {0}")]
    ParseError(#[from] Box<pest::error::Error<Rule>>),
    /// Indicates an error related to file system operations.
    #[error("File error: {0}")]
    FileError(String),
    /// A serialized machine record could not be read or written.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MachineError {
    /// Wraps `self` as a `Simulation` error unless it already is one.
    pub(crate) fn at_boundary(self, context: &str) -> Self {
        match self {
            MachineError::Simulation { .. } => self,
            cause => MachineError::Simulation {
                message: format!("{context}: {cause}"),
                source: Some(Box::new(cause)),
            },
        }
    }

    /// The violations carried by a validation error, empty for every other kind.
    pub fn violations(&self) -> &[Violation] {
        match self {
            MachineError::InvalidConfiguration(v)
            | MachineError::DeterminismViolation(v)
            | MachineError::NonDeterminismInconsistency(v)
            | MachineError::MultiTapeConsistency(v) => v,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for MachineError {
    fn from(error: serde_json::Error) -> Self {
        MachineError::Serialization(error.to_string())
    }
}

fn list(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
