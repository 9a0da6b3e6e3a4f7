//! Construction-time checks shared by every machine variant.
//!
//! Each check inspects one rule and reports a `Violation` carrying every offending item, so a
//! constructor can hand the caller the complete list instead of stopping at the first problem.

use crate::definition::Definition;
use crate::types::State;
use std::collections::{BTreeSet, HashMap, VecDeque};
use thiserror::Error;

/// A single structural problem found while validating a machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("the state set is empty")]
    EmptyStates,
    #[error("the input alphabet is empty")]
    EmptyAlphabet,
    #[error("the tape alphabet is empty")]
    EmptyTapeAlphabet,
    /// The blank symbol is not part of the tape alphabet.
    #[error("blank symbol '{0}' is not in the tape alphabet")]
    MissingBlank(String),
    /// Input symbols missing from the tape alphabet.
    #[error("input symbols not in the tape alphabet: {0:?}")]
    AlphabetNotInTapeAlphabet(Vec<String>),
    #[error("initial state '{0}' is not a known state")]
    InvalidInitialState(String),
    /// Accept or reject states that are not in the state set.
    #[error("halting states not in the state set: {0:?}")]
    UnknownHaltingStates(Vec<String>),
    /// States that both accept and reject.
    #[error("states both accept and reject: {0:?}")]
    OverlappingHaltingStates(Vec<String>),
    #[error("no accept or reject state is defined")]
    NoHaltingStates,
    /// Transitions reference states outside the state set.
    #[error("transitions reference unknown states: {0:?}")]
    UnknownStates(Vec<String>),
    /// Transitions reference symbols outside the tape alphabet.
    #[error("transitions reference unknown symbols: {0:?}")]
    UnknownSymbols(Vec<String>),
    /// More than one transition for a `(state, symbol)` key.
    #[error("duplicate transitions for: {0:?}")]
    DuplicateTransitions(Vec<String>),
    /// Non-halting `(state, symbol)` pairs without a transition.
    #[error("missing transitions for: {0:?}")]
    MissingTransitions(Vec<String>),
    /// Weights that are zero, negative or not finite.
    #[error("non-positive transition weights: {0:?}")]
    NonPositiveWeights(Vec<String>),
    /// Transition tuples whose length differs from the tape count.
    #[error("tuple length does not match tape count: {0:?}")]
    TupleLength(Vec<String>),
    /// Symbols that are not in the alphabet of the tape they address.
    #[error("symbols outside their tape alphabet: {0:?}")]
    SymbolOutsideTape(Vec<String>),
    #[error("tape count must be at least 1")]
    NoTapes,
}

/// The states and symbols one transition refers to.
pub(crate) struct RuleRef<'a> {
    pub state: &'a str,
    pub next_state: &'a str,
    pub symbols: Vec<&'a str>,
}

/// Checks the structure of a definition: non-empty sets, subset and membership rules, and the
/// presence of at least one halting state. `blanks` must all be tape symbols.
pub(crate) fn check_definition(definition: &Definition, blanks: &[&str]) -> Vec<Violation> {
    let mut violations: Vec<Violation> = [
        check_states,
        check_alphabet,
        check_tape_alphabet,
        check_alphabet_subset,
        check_initial_state,
        check_halting_subset,
        check_halting_disjoint,
        check_has_halting,
    ]
    .iter()
    .filter_map(|check| check(definition).err())
    .collect();

    violations.extend(
        blanks
            .iter()
            .filter(|blank| !definition.tape_alphabet().contains(**blank))
            .map(|blank| Violation::MissingBlank(blank.to_string())),
    );

    violations
}

/// Checks that every transition only names known states and tape symbols.
pub(crate) fn check_references<'a>(
    definition: &Definition,
    rules: impl IntoIterator<Item = RuleRef<'a>>,
) -> Vec<Violation> {
    let mut unknown_states = BTreeSet::new();
    let mut unknown_symbols = BTreeSet::new();

    for rule in rules {
        for state in [rule.state, rule.next_state] {
            if !definition.states().contains(state) {
                unknown_states.insert(state.to_string());
            }
        }
        for symbol in rule.symbols {
            if !definition.tape_alphabet().contains(symbol) {
                unknown_symbols.insert(symbol.to_string());
            }
        }
    }

    let mut violations = Vec::new();
    if !unknown_states.is_empty() {
        violations.push(Violation::UnknownStates(unknown_states.into_iter().collect()));
    }
    if !unknown_symbols.is_empty() {
        violations.push(Violation::UnknownSymbols(unknown_symbols.into_iter().collect()));
    }
    violations
}

/// Returns the states that cannot be reached from the initial state along `edges`.
pub fn unreachable_states<'a>(
    definition: &Definition,
    edges: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Vec<State> {
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in edges {
        graph.entry(from).or_default().push(to);
    }

    let mut reachable = BTreeSet::new();
    let mut queue = VecDeque::from([definition.initial_state()]);
    while let Some(state) = queue.pop_front() {
        if !reachable.insert(state) {
            continue;
        }
        if let Some(targets) = graph.get(state) {
            queue.extend(targets.iter().copied());
        }
    }

    definition
        .states()
        .iter()
        .filter(|state| !reachable.contains(state.as_str()))
        .cloned()
        .collect()
}

fn check_states(definition: &Definition) -> Result<(), Violation> {
    if definition.states().is_empty() {
        return Err(Violation::EmptyStates);
    }
    Ok(())
}

fn check_alphabet(definition: &Definition) -> Result<(), Violation> {
    if definition.alphabet().is_empty() {
        return Err(Violation::EmptyAlphabet);
    }
    Ok(())
}

fn check_tape_alphabet(definition: &Definition) -> Result<(), Violation> {
    if definition.tape_alphabet().is_empty() {
        return Err(Violation::EmptyTapeAlphabet);
    }
    Ok(())
}

fn check_alphabet_subset(definition: &Definition) -> Result<(), Violation> {
    let outside: Vec<String> = definition
        .alphabet()
        .difference(definition.tape_alphabet())
        .cloned()
        .collect();

    if !outside.is_empty() {
        return Err(Violation::AlphabetNotInTapeAlphabet(outside));
    }
    Ok(())
}

fn check_initial_state(definition: &Definition) -> Result<(), Violation> {
    if !definition.states().contains(definition.initial_state()) {
        return Err(Violation::InvalidInitialState(
            definition.initial_state().to_string(),
        ));
    }
    Ok(())
}

fn check_halting_subset(definition: &Definition) -> Result<(), Violation> {
    let unknown: BTreeSet<String> = definition
        .accept_states()
        .iter()
        .chain(definition.reject_states())
        .filter(|state| !definition.states().contains(*state))
        .cloned()
        .collect();

    if !unknown.is_empty() {
        return Err(Violation::UnknownHaltingStates(unknown.into_iter().collect()));
    }
    Ok(())
}

fn check_halting_disjoint(definition: &Definition) -> Result<(), Violation> {
    let overlap: Vec<String> = definition
        .accept_states()
        .intersection(definition.reject_states())
        .cloned()
        .collect();

    if !overlap.is_empty() {
        return Err(Violation::OverlappingHaltingStates(overlap));
    }
    Ok(())
}

fn check_has_halting(definition: &Definition) -> Result<(), Violation> {
    if definition.accept_states().is_empty() && definition.reject_states().is_empty() {
        return Err(Violation::NoHaltingStates);
    }
    Ok(())
}
