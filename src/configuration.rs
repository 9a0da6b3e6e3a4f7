//! Immutable snapshots of a running machine and the records a simulation returns.

use crate::definition::Definition;
use crate::tape::{Tape, TapeHead};
use crate::types::{State, Symbol};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One step of a simulation.
///
/// Configurations are created by the simulate loops and appended to a trace; nothing mutates
/// them afterwards. Single-tape machines use one tape and one head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    state: State,
    tapes: Vec<Tape>,
    heads: Vec<isize>,
    step_count: usize,
    is_accepting: bool,
    is_rejecting: bool,
    weight: f64,
    branch_id: Option<String>,
}

/// The identity of a configuration for cycle suppression: state, tape contents, heads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigurationKey {
    state: State,
    tapes: Vec<(isize, Vec<Symbol>)>,
    heads: Vec<isize>,
}

impl Configuration {
    /// Captures the machine at `step_count`, flagging halting states from `definition`.
    pub(crate) fn capture(
        definition: &Definition,
        state: State,
        tapes: Vec<Tape>,
        heads: Vec<isize>,
        step_count: usize,
    ) -> Self {
        Self {
            is_accepting: definition.is_accepting(&state),
            is_rejecting: definition.is_rejecting(&state),
            state,
            tapes,
            heads,
            step_count,
            weight: 1.0,
            branch_id: None,
        }
    }

    /// Tags a configuration with its branch in a non-deterministic search.
    pub(crate) fn on_branch(mut self, weight: f64, branch_id: String) -> Self {
        self.weight = weight;
        self.branch_id = Some(branch_id);
        self
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn tapes(&self) -> &[Tape] {
        &self.tapes
    }

    pub fn heads(&self) -> &[isize] {
        &self.heads
    }

    /// The first tape. Every configuration holds at least one.
    pub fn tape(&self) -> &Tape {
        &self.tapes[0]
    }

    /// The head of the first tape.
    pub fn head(&self) -> isize {
        self.heads[0]
    }

    /// Heads as `TapeHead` values, one per tape.
    pub fn tape_heads(&self) -> Vec<TapeHead> {
        self.heads
            .iter()
            .enumerate()
            .map(|(tape_id, &position)| TapeHead::new(tape_id, position))
            .collect()
    }

    /// The symbols currently under each head.
    pub fn symbols(&self) -> Vec<&str> {
        self.tapes
            .iter()
            .zip(&self.heads)
            .map(|(tape, &head)| tape.read(head))
            .collect()
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn is_accepting(&self) -> bool {
        self.is_accepting
    }

    pub fn is_rejecting(&self) -> bool {
        self.is_rejecting
    }

    pub fn is_halting(&self) -> bool {
        self.is_accepting || self.is_rejecting
    }

    /// Product of the weights of the transitions leading here. `1.0` outside a search.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn branch_id(&self) -> Option<&str> {
        self.branch_id.as_deref()
    }

    pub fn key(&self) -> ConfigurationKey {
        ConfigurationKey {
            state: self.state.clone(),
            tapes: self
                .tapes
                .iter()
                .map(|tape| {
                    let (start, cells) = tape.trimmed();
                    (start, cells.to_vec())
                })
                .collect(),
            heads: self.heads.clone(),
        }
    }
}

/// What a simulate call returns: the decision and the trace that led to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub accepted: bool,
    pub trace: Vec<Configuration>,
    /// Present for non-deterministic searches only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ExplorationSummary>,
}

impl Execution {
    pub(crate) fn new(accepted: bool, trace: Vec<Configuration>) -> Self {
        Self {
            accepted,
            trace,
            summary: None,
        }
    }

    pub fn final_configuration(&self) -> Option<&Configuration> {
        self.trace.last()
    }

    /// Steps taken by the last recorded configuration.
    pub fn step_count(&self) -> usize {
        self.final_configuration()
            .map_or(0, Configuration::step_count)
    }
}

/// Statistics of a bounded non-deterministic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationSummary {
    pub branches_explored: usize,
    pub accepting_branches: usize,
    pub elapsed: Duration,
    pub branch_limit_reached: bool,
    pub first_accepting_branch: Option<String>,
    /// Root-to-leaf configurations of the first accepting branch, empty if none accepted.
    pub accepting_path: Vec<Configuration>,
}
