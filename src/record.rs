//! The serialized form of every machine variant.
//!
//! Records are plain data: they are what JSON files and the text parser produce, and they only
//! become machines after passing through a constructor.

use crate::definition::{Definition, Machine};
use crate::deterministic::DeterministicTuringMachine;
use crate::machine::TuringMachine;
use crate::multitape::MultiTapeTuringMachine;
use crate::nondeterministic::NonDeterministicTuringMachine;
use crate::types::{
    Direction, MachineError, MultiTapeTransition, State, Symbol, Transition, WeightedTransition,
    DEFAULT_BLANK_SYMBOL,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A machine of any variant, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MachineRecord {
    #[serde(rename = "TM")]
    Single(SingleTapeRecord),
    #[serde(rename = "DTM")]
    Deterministic(SingleTapeRecord),
    #[serde(rename = "NTM")]
    NonDeterministic(NonDeterministicRecord),
    #[serde(rename = "MultiTapeTM")]
    MultiTape(MultiTapeRecord),
}

/// Transitions keyed by `"state,symbol"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleTapeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub states: BTreeSet<State>,
    pub alphabet: BTreeSet<Symbol>,
    pub tape_alphabet: BTreeSet<Symbol>,
    pub transitions: BTreeMap<String, (State, Symbol, Direction)>,
    pub initial_state: State,
    #[serde(default)]
    pub accept_states: BTreeSet<State>,
    #[serde(default)]
    pub reject_states: BTreeSet<State>,
    #[serde(default = "default_blank")]
    pub blank_symbol: Symbol,
}

/// Transitions keyed by `"state,symbol"`, each with a list of weighted choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonDeterministicRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub states: BTreeSet<State>,
    pub alphabet: BTreeSet<Symbol>,
    pub tape_alphabet: BTreeSet<Symbol>,
    pub transitions: BTreeMap<String, Vec<(State, Symbol, Direction, f64)>>,
    pub initial_state: State,
    #[serde(default)]
    pub accept_states: BTreeSet<State>,
    #[serde(default)]
    pub reject_states: BTreeSet<State>,
    #[serde(default = "default_blank")]
    pub blank_symbol: Symbol,
}

/// Transitions keyed by `"state,s1,...,sk"`.
///
/// `tape_alphabet` is informational; the machine derives it from `tape_alphabets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTapeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub states: BTreeSet<State>,
    pub alphabet: BTreeSet<Symbol>,
    #[serde(default)]
    pub tape_alphabet: BTreeSet<Symbol>,
    pub tape_alphabets: Vec<BTreeSet<Symbol>>,
    pub transitions: BTreeMap<String, (State, Vec<Symbol>, Vec<Direction>)>,
    pub initial_state: State,
    #[serde(default)]
    pub accept_states: BTreeSet<State>,
    #[serde(default)]
    pub reject_states: BTreeSet<State>,
    pub blank_symbols: Vec<Symbol>,
}

fn default_blank() -> Symbol {
    DEFAULT_BLANK_SYMBOL.to_string()
}

impl MachineRecord {
    /// Parses a record from JSON.
    pub fn from_json(json: &str) -> Result<Self, MachineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the record as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, MachineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            MachineRecord::Single(r) | MachineRecord::Deterministic(r) => r.name.as_deref(),
            MachineRecord::NonDeterministic(r) => r.name.as_deref(),
            MachineRecord::MultiTape(r) => r.name.as_deref(),
        }
    }

    /// Returns the record with its name replaced.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = Some(name.into());
        match &mut self {
            MachineRecord::Single(r) | MachineRecord::Deterministic(r) => r.name = name,
            MachineRecord::NonDeterministic(r) => r.name = name,
            MachineRecord::MultiTape(r) => r.name = name,
        }
        self
    }

    /// The value of the `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            MachineRecord::Single(_) => "TM",
            MachineRecord::Deterministic(_) => "DTM",
            MachineRecord::NonDeterministic(_) => "NTM",
            MachineRecord::MultiTape(_) => "MultiTapeTM",
        }
    }

    pub fn initial_state(&self) -> &str {
        match self {
            MachineRecord::Single(r) | MachineRecord::Deterministic(r) => &r.initial_state,
            MachineRecord::NonDeterministic(r) => &r.initial_state,
            MachineRecord::MultiTape(r) => &r.initial_state,
        }
    }

    pub fn states(&self) -> &BTreeSet<State> {
        match self {
            MachineRecord::Single(r) | MachineRecord::Deterministic(r) => &r.states,
            MachineRecord::NonDeterministic(r) => &r.states,
            MachineRecord::MultiTape(r) => &r.states,
        }
    }

    /// Number of transitions, counting every non-deterministic choice.
    pub fn transition_count(&self) -> usize {
        match self {
            MachineRecord::Single(r) | MachineRecord::Deterministic(r) => r.transitions.len(),
            MachineRecord::NonDeterministic(r) => r.transitions.values().map(Vec::len).sum(),
            MachineRecord::MultiTape(r) => r.transitions.len(),
        }
    }

    pub fn tape_count(&self) -> usize {
        match self {
            MachineRecord::MultiTape(r) => r.tape_alphabets.len(),
            _ => 1,
        }
    }
}

impl SingleTapeRecord {
    pub(crate) fn definition(&self) -> Definition {
        definition(
            &self.states,
            &self.initial_state,
            &self.alphabet,
            &self.tape_alphabet,
            &self.accept_states,
            &self.reject_states,
        )
    }

    pub(crate) fn transitions(&self) -> Result<Vec<Transition>, MachineError> {
        self.transitions
            .iter()
            .map(|(key, (next_state, write, direction))| {
                let (state, read) = split_key(key)?;
                Ok(Transition::new(state, read, next_state.clone(), write.clone(), *direction))
            })
            .collect()
    }

    pub(crate) fn build(&self) -> Result<TuringMachine, MachineError> {
        TuringMachine::new(self.definition(), self.blank_symbol.clone(), self.transitions()?)
    }
}

impl NonDeterministicRecord {
    pub(crate) fn build(&self) -> Result<NonDeterministicTuringMachine, MachineError> {
        let mut transitions = Vec::new();
        for (key, choices) in &self.transitions {
            let (state, read) = split_key(key)?;
            transitions.extend(choices.iter().map(|(next_state, write, direction, weight)| {
                WeightedTransition::new(
                    state,
                    read,
                    next_state.clone(),
                    write.clone(),
                    *direction,
                    *weight,
                )
            }));
        }

        let definition = definition(
            &self.states,
            &self.initial_state,
            &self.alphabet,
            &self.tape_alphabet,
            &self.accept_states,
            &self.reject_states,
        );
        NonDeterministicTuringMachine::new(definition, self.blank_symbol.clone(), transitions)
    }
}

impl MultiTapeRecord {
    pub(crate) fn build(&self) -> Result<MultiTapeTuringMachine, MachineError> {
        let transitions = self
            .transitions
            .iter()
            .map(|(key, (next_state, write, directions))| {
                let mut parts = key.split(',');
                let state = parts
                    .next()
                    .filter(|state| !state.is_empty())
                    .ok_or_else(|| malformed_key(key))?;
                Ok(MultiTapeTransition::new(
                    state,
                    parts,
                    next_state.clone(),
                    write.iter().cloned(),
                    directions.clone(),
                ))
            })
            .collect::<Result<Vec<_>, MachineError>>()?;

        let definition = definition(
            &self.states,
            &self.initial_state,
            &self.alphabet,
            &self.tape_alphabet,
            &self.accept_states,
            &self.reject_states,
        );
        MultiTapeTuringMachine::new(
            definition,
            self.tape_alphabets.clone(),
            self.blank_symbols.clone(),
            transitions,
        )
    }
}

impl TuringMachine {
    /// Builds a core machine from a `TM` or `DTM` record.
    ///
    /// # Errors
    ///
    /// * `MachineError::Serialization` for records of another variant.
    /// * Any construction error of the core machine.
    pub fn from_record(record: &MachineRecord) -> Result<Self, MachineError> {
        match record {
            MachineRecord::Single(r) | MachineRecord::Deterministic(r) => r.build(),
            other => Err(MachineError::Serialization(format!(
                "expected a single-tape record, got {}",
                other.type_name()
            ))),
        }
    }

    /// The serialized form of this machine.
    ///
    /// Keys are unique in the serialized form; when several transitions share a key, the one
    /// [`step`](Self::step) would pick is kept.
    pub fn to_record(&self) -> MachineRecord {
        MachineRecord::Single(single_tape_record(self))
    }
}

impl DeterministicTuringMachine {
    pub fn to_record(&self) -> MachineRecord {
        MachineRecord::Deterministic(single_tape_record(self.machine()))
    }
}

impl NonDeterministicTuringMachine {
    pub fn to_record(&self) -> MachineRecord {
        let mut transitions: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for t in self.transitions() {
            transitions
                .entry(format!("{},{}", t.state, t.read))
                .or_default()
                .push((t.next_state.clone(), t.write.clone(), t.direction, t.weight));
        }

        MachineRecord::NonDeterministic(NonDeterministicRecord {
            name: None,
            states: self.states().clone(),
            alphabet: self.alphabet().clone(),
            tape_alphabet: self.tape_alphabet().clone(),
            transitions,
            initial_state: self.initial_state().to_string(),
            accept_states: self.accept_states().clone(),
            reject_states: self.reject_states().clone(),
            blank_symbol: self.blank().to_string(),
        })
    }
}

impl MultiTapeTuringMachine {
    pub fn to_record(&self) -> MachineRecord {
        let transitions = self
            .transitions()
            .iter()
            .map(|t| {
                (
                    format!("{},{}", t.state, t.read.join(",")),
                    (t.next_state.clone(), t.write.clone(), t.directions.clone()),
                )
            })
            .collect();

        MachineRecord::MultiTape(MultiTapeRecord {
            name: None,
            states: self.states().clone(),
            alphabet: self.alphabet().clone(),
            tape_alphabet: self.tape_alphabet().clone(),
            tape_alphabets: self.tape_alphabets().to_vec(),
            transitions,
            initial_state: self.initial_state().to_string(),
            accept_states: self.accept_states().clone(),
            reject_states: self.reject_states().clone(),
            blank_symbols: self.blank_symbols().to_vec(),
        })
    }
}

fn single_tape_record(machine: &TuringMachine) -> SingleTapeRecord {
    let mut transitions = BTreeMap::new();
    for t in machine.transitions() {
        transitions
            .entry(format!("{},{}", t.state, t.read))
            .or_insert_with(|| (t.next_state.clone(), t.write.clone(), t.direction));
    }

    SingleTapeRecord {
        name: None,
        states: machine.states().clone(),
        alphabet: machine.alphabet().clone(),
        tape_alphabet: machine.tape_alphabet().clone(),
        transitions,
        initial_state: machine.initial_state().to_string(),
        accept_states: machine.accept_states().clone(),
        reject_states: machine.reject_states().clone(),
        blank_symbol: machine.blank().to_string(),
    }
}

fn definition(
    states: &BTreeSet<State>,
    initial_state: &str,
    alphabet: &BTreeSet<Symbol>,
    tape_alphabet: &BTreeSet<Symbol>,
    accept_states: &BTreeSet<State>,
    reject_states: &BTreeSet<State>,
) -> Definition {
    Definition::new(states.iter().cloned(), initial_state)
        .with_alphabet(alphabet.iter().cloned())
        .with_tape_alphabet(tape_alphabet.iter().cloned())
        .with_accept_states(accept_states.iter().cloned())
        .with_reject_states(reject_states.iter().cloned())
}

/// Splits a `"state,symbol"` key on its first comma.
fn split_key(key: &str) -> Result<(&str, &str), MachineError> {
    key.split_once(',')
        .filter(|(state, symbol)| !state.is_empty() && !symbol.is_empty())
        .ok_or_else(|| malformed_key(key))
}

fn malformed_key(key: &str) -> MachineError {
    MachineError::Serialization(format!("malformed transition key '{key}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Violation;

    const UNARY_SUCCESSOR: &str = r#"{
        "type": "DTM",
        "name": "Unary successor",
        "states": ["q0", "qa"],
        "alphabet": ["1"],
        "tape_alphabet": ["1", "B"],
        "transitions": { "q0,1": ["qa", "1", "right"] },
        "initial_state": "q0",
        "accept_states": ["qa"],
        "reject_states": [],
        "blank_symbol": "B"
    }"#;

    #[test]
    fn test_parse_deterministic_record() {
        let record = MachineRecord::from_json(UNARY_SUCCESSOR).unwrap();

        assert_eq!(record.type_name(), "DTM");
        assert_eq!(record.name(), Some("Unary successor"));
        assert_eq!(record.transition_count(), 1);

        let MachineRecord::Deterministic(single) = &record else {
            panic!("expected a DTM record, got {record:?}");
        };
        let transitions = single.transitions().unwrap();
        assert_eq!(
            transitions,
            vec![Transition::new("q0", "1", "qa", "1", Direction::Right)]
        );
    }

    #[test]
    fn test_core_machine_from_record() {
        let record = MachineRecord::from_json(UNARY_SUCCESSOR).unwrap();
        let machine = TuringMachine::from_record(&record).unwrap();

        assert_eq!(machine.blank(), "B");
        assert!(machine.simulate("1", 10).unwrap().accepted);
        assert_eq!(machine.to_record().type_name(), "TM");

        let ntm = MachineRecord::from_json(
            r#"{
                "type": "NTM",
                "states": ["q0"],
                "alphabet": ["a"],
                "tape_alphabet": ["a", "_"],
                "transitions": {},
                "initial_state": "q0",
                "accept_states": ["q0"]
            }"#,
        )
        .unwrap();
        assert!(matches!(
            TuringMachine::from_record(&ntm),
            Err(MachineError::Serialization(_))
        ));
    }

    #[test]
    fn test_default_blank_and_halting_sets() {
        let json = r#"{
            "type": "TM",
            "states": ["q0"],
            "alphabet": ["a"],
            "tape_alphabet": ["a", "_"],
            "transitions": {},
            "initial_state": "q0"
        }"#;

        let MachineRecord::Single(record) = MachineRecord::from_json(json).unwrap() else {
            panic!("expected a TM record");
        };
        assert_eq!(record.blank_symbol, "_");
        assert!(record.accept_states.is_empty());

        let error = record.build().unwrap_err();
        assert_eq!(error.violations(), &[Violation::NoHaltingStates]);
    }

    #[test]
    fn test_bad_direction_and_unknown_type() {
        let bad_direction = UNARY_SUCCESSOR.replace("\"right\"", "\"up\"");
        let unknown_type = UNARY_SUCCESSOR.replace("\"DTM\"", "\"PDA\"");

        for json in [bad_direction, unknown_type] {
            let error = MachineRecord::from_json(&json).unwrap_err();
            assert!(matches!(error, MachineError::Serialization(_)));
        }
    }

    #[test]
    fn test_malformed_key() {
        let json = UNARY_SUCCESSOR.replace("\"q0,1\"", "\"q0\"");
        let MachineRecord::Deterministic(record) = MachineRecord::from_json(&json).unwrap() else {
            panic!("expected a DTM record");
        };

        assert_eq!(
            record.transitions().unwrap_err(),
            MachineError::Serialization("malformed transition key 'q0'".into())
        );
    }

    #[test]
    fn test_nondeterministic_record_keeps_choice_order() {
        let json = r#"{
            "type": "NTM",
            "states": ["q0", "qa"],
            "alphabet": ["a"],
            "tape_alphabet": ["a", "_"],
            "transitions": {
                "q0,a": [["q0", "a", "right", 0.25], ["qa", "a", "stay", 0.75]]
            },
            "initial_state": "q0",
            "accept_states": ["qa"]
        }"#;

        let record = MachineRecord::from_json(json).unwrap();
        assert_eq!(record.transition_count(), 2);

        let MachineRecord::NonDeterministic(ntm) = &record else {
            panic!("expected an NTM record");
        };
        let machine = ntm.build().unwrap();
        let choices = machine.get_all_transitions("q0", "a");
        assert_eq!(choices[0].next_state, "q0");
        assert_eq!(choices[1].weight, 0.75);

        assert_eq!(machine.to_record(), record);
    }

    #[test]
    fn test_multi_tape_record() {
        let json = r#"{
            "type": "MultiTapeTM",
            "name": "copy",
            "states": ["q0", "qa"],
            "alphabet": ["0", "1"],
            "tape_alphabets": [["0", "1", "_"], ["0", "1", "_"]],
            "transitions": {
                "q0,0,_": ["q0", ["0", "0"], ["right", "right"]],
                "q0,1,_": ["q0", ["1", "1"], ["right", "right"]],
                "q0,_,_": ["qa", ["_", "_"], ["stay", "stay"]]
            },
            "initial_state": "q0",
            "accept_states": ["qa"],
            "blank_symbols": ["_", "_"]
        }"#;

        let record = MachineRecord::from_json(json).unwrap();
        assert_eq!(record.tape_count(), 2);

        let MachineRecord::MultiTape(multi) = &record else {
            panic!("expected a multi-tape record");
        };
        let machine = multi.build().unwrap();
        let execution = machine.simulate_multi_tape(&["10", ""], 50).unwrap();
        assert!(execution.accepted);

        let written = machine.to_record();
        let MachineRecord::MultiTape(written) = written else {
            panic!("expected a multi-tape record");
        };
        assert_eq!(written.tape_alphabet.len(), 3);
        assert_eq!(written.transitions, multi.transitions);
    }

    #[test]
    fn test_multi_tape_key_arity_is_a_consistency_error() {
        let json = r#"{
            "type": "MultiTapeTM",
            "states": ["q0", "qa"],
            "alphabet": ["1"],
            "tape_alphabets": [["1", "_"], ["1", "_"]],
            "transitions": { "q0,1": ["qa", ["1", "1"], ["right", "right"]] },
            "initial_state": "q0",
            "accept_states": ["qa"],
            "blank_symbols": ["_", "_"]
        }"#;

        let MachineRecord::MultiTape(record) = MachineRecord::from_json(json).unwrap() else {
            panic!("expected a multi-tape record");
        };
        assert!(matches!(
            record.build(),
            Err(MachineError::MultiTapeConsistency(_))
        ));
    }

    #[test]
    fn test_duplicate_keys_keep_first_match() {
        let definition = Definition::new(["q0", "qa", "qr"], "q0")
            .with_alphabet(["a"])
            .with_tape_alphabet(["a", "B"])
            .with_accept_states(["qa"])
            .with_reject_states(["qr"]);
        let machine = TuringMachine::new(
            definition,
            "B",
            vec![
                Transition::new("q0", "a", "qa", "a", Direction::Right),
                Transition::new("q0", "a", "qr", "a", Direction::Right),
            ],
        )
        .unwrap();

        let json = machine.to_record().with_name("ambiguous").to_json().unwrap();
        assert!(json.contains("\"type\": \"TM\""));
        assert!(json.contains("\"name\": \"ambiguous\""));

        let MachineRecord::Single(record) = MachineRecord::from_json(&json).unwrap() else {
            panic!("expected a TM record");
        };
        assert_eq!(record.transitions["q0,a"].0, "qa");
    }
}
