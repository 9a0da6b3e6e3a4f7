//! This crate provides the core logic for a Turing machine execution engine.
//! It includes single-tape, deterministic, non-deterministic and multi-tape machines,
//! computation-tree analysis, the multi-tape to single-tape reduction, a serialized
//! machine record, a text format parser and a catalog of predefined machines.

pub mod configuration;
pub mod definition;
pub mod deterministic;
pub mod encoder;
pub mod kind;
pub mod loader;
pub mod machine;
pub mod multitape;
pub mod nondeterministic;
pub mod parser;
pub mod programs;
pub mod record;
pub mod tape;
pub mod tree;
pub mod types;
pub mod validation;

/// Re-exports the `Rule` enum from the parser module, used by the `pest` grammar.
pub use crate::parser::Rule;
/// Re-exports the snapshot and result types of a run.
pub use configuration::{Configuration, ConfigurationKey, Execution, ExplorationSummary};
/// Re-exports the shared machine record and its contract.
pub use definition::{Definition, Machine};
/// Re-exports the `DeterministicTuringMachine` struct from the deterministic module.
pub use deterministic::DeterministicTuringMachine;
/// Re-exports the track encoding functions from the encoder module.
pub use encoder::{choose_separator, decode_track, encode_track};
/// Re-exports the `MachineKind` dispatch enum from the kind module.
pub use kind::MachineKind;
/// Re-exports the `ProgramLoader` struct from the loader module.
pub use loader::ProgramLoader;
/// Re-exports the `TuringMachine` struct from the machine module.
pub use machine::TuringMachine;
/// Re-exports the `MultiTapeTuringMachine` struct from the multitape module.
pub use multitape::MultiTapeTuringMachine;
/// Re-exports the `NonDeterministicTuringMachine` struct from the nondeterministic module.
pub use nondeterministic::NonDeterministicTuringMachine;
/// Re-exports the `parse` function from the parser module.
pub use parser::parse;
/// Re-exports `ProgramInfo`, `ProgramManager`, and `PROGRAMS` from the programs module.
pub use programs::{ProgramInfo, ProgramManager, PROGRAMS};
/// Re-exports the serialized `MachineRecord` from the record module.
pub use record::MachineRecord;
/// Re-exports `Tape` and `TapeHead` from the tape module.
pub use tape::{Tape, TapeHead};
/// Re-exports the computation-tree analysis results from the tree module.
pub use tree::{TreeAnalysis, TreeOutcome};
/// Re-exports the machine vocabulary and limits from the types module.
pub use types::{
    Direction, Limits, MachineError, MultiTapeTransition, State, Symbol, Transition,
    WeightedTransition, MAX_PROGRAM_SIZE,
};
/// Re-exports the `Violation` enum from the validation module.
pub use validation::Violation;
