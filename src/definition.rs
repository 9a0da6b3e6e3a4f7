//! The machine-shaped record every variant embeds, and the `Machine` contract
//! external callers consume.

use crate::types::{State, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// States, alphabets and halting sets of a machine.
///
/// Built once, validated by the owning machine's constructor, and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    states: BTreeSet<State>,
    alphabet: BTreeSet<Symbol>,
    tape_alphabet: BTreeSet<Symbol>,
    initial_state: State,
    accept_states: BTreeSet<State>,
    reject_states: BTreeSet<State>,
}

impl Definition {
    /// Starts a definition from its state set and initial state.
    pub fn new<I>(states: I, initial_state: impl Into<State>) -> Self
    where
        I: IntoIterator,
        I::Item: Into<State>,
    {
        Self {
            states: collect(states),
            initial_state: initial_state.into(),
            ..Self::default()
        }
    }

    pub fn with_alphabet<I>(mut self, alphabet: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Symbol>,
    {
        self.alphabet = collect(alphabet);
        self
    }

    pub fn with_tape_alphabet<I>(mut self, tape_alphabet: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Symbol>,
    {
        self.tape_alphabet = collect(tape_alphabet);
        self
    }

    pub fn with_accept_states<I>(mut self, states: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<State>,
    {
        self.accept_states = collect(states);
        self
    }

    pub fn with_reject_states<I>(mut self, states: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<State>,
    {
        self.reject_states = collect(states);
        self
    }

    pub fn states(&self) -> &BTreeSet<State> {
        &self.states
    }

    pub fn alphabet(&self) -> &BTreeSet<Symbol> {
        &self.alphabet
    }

    pub fn tape_alphabet(&self) -> &BTreeSet<Symbol> {
        &self.tape_alphabet
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    pub fn accept_states(&self) -> &BTreeSet<State> {
        &self.accept_states
    }

    pub fn reject_states(&self) -> &BTreeSet<State> {
        &self.reject_states
    }

    pub fn is_accepting(&self, state: &str) -> bool {
        self.accept_states.contains(state)
    }

    pub fn is_rejecting(&self, state: &str) -> bool {
        self.reject_states.contains(state)
    }

    /// A state is halting iff it accepts or rejects.
    pub fn is_halting(&self, state: &str) -> bool {
        self.is_accepting(state) || self.is_rejecting(state)
    }
}

fn collect<I>(items: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// The contract every machine variant exposes to generic callers.
pub trait Machine {
    /// The embedded states/alphabets record.
    fn definition(&self) -> &Definition;

    fn states(&self) -> &BTreeSet<State> {
        self.definition().states()
    }

    fn alphabet(&self) -> &BTreeSet<Symbol> {
        self.definition().alphabet()
    }

    fn tape_alphabet(&self) -> &BTreeSet<Symbol> {
        self.definition().tape_alphabet()
    }

    fn initial_state(&self) -> &str {
        self.definition().initial_state()
    }

    fn accept_states(&self) -> &BTreeSet<State> {
        self.definition().accept_states()
    }

    fn reject_states(&self) -> &BTreeSet<State> {
        self.definition().reject_states()
    }
}
