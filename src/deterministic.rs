//! The deterministic Turing Machine: a core machine with at most one transition per
//! `(state, symbol)` key and an index built once at construction.

use crate::configuration::Execution;
use crate::definition::{Definition, Machine};
use crate::machine::{check_input, run_single_tape, TuringMachine};
use crate::tape::tokenize;
use crate::types::{MachineError, State, Symbol, Transition};
use crate::validation::Violation;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// A deterministic single-tape machine.
///
/// Every applied transition bumps a use counter. The counters are atomic, so a machine can be
/// shared between threads and simulated concurrently; they only feed
/// [`optimize_transitions`](Self::optimize_transitions).
#[derive(Debug)]
pub struct DeterministicTuringMachine {
    machine: TuringMachine,
    index: HashMap<State, HashMap<Symbol, usize>>,
    usage: Vec<AtomicUsize>,
    total: bool,
}

impl DeterministicTuringMachine {
    /// Wraps a validated core machine, rejecting duplicate keys.
    ///
    /// # Errors
    ///
    /// * `MachineError::DeterminismViolation` listing every ambiguous key.
    pub fn new(machine: TuringMachine) -> Result<Self, MachineError> {
        Self::build(machine, false)
    }

    /// Like [`new`](Self::new), additionally requiring every non-halting state to handle every
    /// tape symbol.
    pub fn new_total(machine: TuringMachine) -> Result<Self, MachineError> {
        Self::build(machine, true)
    }

    /// Validates the parts as a core machine first, then as a deterministic one.
    pub fn from_parts(
        definition: Definition,
        blank: impl Into<Symbol>,
        transitions: Vec<Transition>,
    ) -> Result<Self, MachineError> {
        Self::new(TuringMachine::new(definition, blank, transitions)?)
    }

    fn build(machine: TuringMachine, total: bool) -> Result<Self, MachineError> {
        let violations = check_determinism(&machine, total);
        if !violations.is_empty() {
            return Err(MachineError::DeterminismViolation(violations));
        }

        let mut index: HashMap<State, HashMap<Symbol, usize>> = HashMap::new();
        for (i, transition) in machine.transitions.iter().enumerate() {
            index
                .entry(transition.state.clone())
                .or_default()
                .insert(transition.read.clone(), i);
        }
        let usage = machine.transitions.iter().map(|_| AtomicUsize::new(0)).collect();

        Ok(Self {
            machine,
            index,
            usage,
            total,
        })
    }

    /// Looks up the transition for `(state, symbol)` in the index.
    pub fn step(&self, state: &str, symbol: &str) -> Option<&Transition> {
        self.position(state, symbol)
            .map(|i| &self.machine.transitions[i])
    }

    fn position(&self, state: &str, symbol: &str) -> Option<usize> {
        self.index.get(state)?.get(symbol).copied()
    }

    /// Runs the machine on `input` using the transition index.
    ///
    /// # Errors
    ///
    /// * `MachineError::Simulation` if the input contains symbols outside the alphabet.
    pub fn simulate_deterministic(
        &self,
        input: &str,
        max_steps: usize,
    ) -> Result<Execution, MachineError> {
        self.simulate_symbols(tokenize(input), max_steps)
    }

    pub fn simulate_symbols(
        &self,
        input: Vec<Symbol>,
        max_steps: usize,
    ) -> Result<Execution, MachineError> {
        let definition = &self.machine.definition;
        check_input(definition, &input).map_err(|e| e.at_boundary("simulate_deterministic"))?;

        Ok(run_single_tape(
            definition,
            &self.machine.blank,
            input,
            max_steps,
            |state, symbol| {
                let i = self.position(state, symbol)?;
                self.usage[i].fetch_add(1, Ordering::Relaxed);
                Some(&self.machine.transitions[i])
            },
        ))
    }

    /// How often each transition has been applied so far, in table order.
    pub fn transition_usage(&self) -> Vec<(&Transition, usize)> {
        self.machine
            .transitions
            .iter()
            .zip(&self.usage)
            .map(|(t, count)| (t, count.load(Ordering::Relaxed)))
            .collect()
    }

    /// Returns a new machine whose transition table is ordered by descending observed use.
    ///
    /// Ties keep their current relative order. The new machine starts with fresh counters and
    /// decides every input exactly as `self` does.
    pub fn optimize_transitions(&self) -> Result<Self, MachineError> {
        let mut ranked: Vec<(Transition, usize)> = self
            .transition_usage()
            .into_iter()
            .map(|(t, count)| (t.clone(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        debug!(
            transitions = ranked.len(),
            hottest = ranked.first().map_or(0, |(_, count)| *count),
            "reordering transitions by use"
        );

        let transitions = ranked.into_iter().map(|(t, _)| t).collect();
        TuringMachine::new(
            self.machine.definition.clone(),
            self.machine.blank.clone(),
            transitions,
        )
        .and_then(|machine| Self::build(machine, self.total))
        .map_err(|e| MachineError::Optimization(e.to_string()))
    }

    /// The wrapped core machine.
    pub fn machine(&self) -> &TuringMachine {
        &self.machine
    }

    pub fn blank(&self) -> &str {
        &self.machine.blank
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.machine.transitions
    }

    /// Whether construction required a transition for every non-halting state and symbol.
    pub fn is_total(&self) -> bool {
        self.total
    }
}

impl Clone for DeterministicTuringMachine {
    fn clone(&self) -> Self {
        Self {
            machine: self.machine.clone(),
            index: self.index.clone(),
            usage: self
                .usage
                .iter()
                .map(|count| AtomicUsize::new(count.load(Ordering::Relaxed)))
                .collect(),
            total: self.total,
        }
    }
}

impl Machine for DeterministicTuringMachine {
    fn definition(&self) -> &Definition {
        &self.machine.definition
    }
}

/// Reports duplicate keys and, when `total` is set, missing `(state, symbol)` pairs.
fn check_determinism(machine: &TuringMachine, total: bool) -> Vec<Violation> {
    let mut counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for transition in &machine.transitions {
        *counts.entry(transition.key()).or_default() += 1;
    }

    let mut violations = Vec::new();

    let duplicates: Vec<String> = counts
        .iter()
        .filter(|(_, &count)| count > 1)
        .map(|((state, symbol), count)| format!("({state}, {symbol}) x{count}"))
        .collect();
    if !duplicates.is_empty() {
        violations.push(Violation::DuplicateTransitions(duplicates));
    }

    if total {
        let definition = &machine.definition;
        let keys = &counts;
        let missing: Vec<String> = definition
            .states()
            .iter()
            .filter(|state| !definition.is_halting(state))
            .flat_map(|state| {
                definition
                    .tape_alphabet()
                    .iter()
                    .filter(move |symbol| !keys.contains_key(&(state.as_str(), symbol.as_str())))
                    .map(move |symbol| format!("({state}, {symbol})"))
            })
            .collect();
        if !missing.is_empty() {
            violations.push(Violation::MissingTransitions(missing));
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use proptest::prelude::*;

    fn parity_definition() -> Definition {
        Definition::new(["even", "odd", "qa", "qr"], "even")
            .with_alphabet(["a", "b"])
            .with_tape_alphabet(["a", "b", "B"])
            .with_accept_states(["qa"])
            .with_reject_states(["qr"])
    }

    /// Accepts inputs with an even number of `a`s.
    fn even_a() -> DeterministicTuringMachine {
        let transitions = vec![
            Transition::new("even", "B", "qa", "B", Direction::Stay),
            Transition::new("odd", "B", "qr", "B", Direction::Stay),
            Transition::new("even", "a", "odd", "a", Direction::Right),
            Transition::new("odd", "a", "even", "a", Direction::Right),
            Transition::new("even", "b", "even", "b", Direction::Right),
            Transition::new("odd", "b", "odd", "b", Direction::Right),
        ];
        let machine = TuringMachine::new(parity_definition(), "B", transitions).unwrap();
        DeterministicTuringMachine::new_total(machine).unwrap()
    }

    #[test]
    fn test_unary_successor() {
        let definition = Definition::new(["q0", "qa"], "q0")
            .with_alphabet(["1"])
            .with_tape_alphabet(["1", "B"])
            .with_accept_states(["qa"]);
        let machine = DeterministicTuringMachine::from_parts(
            definition,
            "B",
            vec![Transition::new("q0", "1", "qa", "1", Direction::Right)],
        )
        .unwrap();

        let execution = machine.simulate_deterministic("1", 100).unwrap();

        assert!(execution.accepted);
        assert_eq!(execution.trace.len(), 2);
        assert!(execution.final_configuration().unwrap().is_accepting());
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let transitions = vec![
            Transition::new("even", "a", "odd", "a", Direction::Right),
            Transition::new("even", "a", "even", "a", Direction::Right),
            Transition::new("odd", "b", "odd", "b", Direction::Right),
            Transition::new("odd", "b", "qa", "b", Direction::Right),
        ];
        let machine = TuringMachine::new(parity_definition(), "B", transitions).unwrap();

        let error = DeterministicTuringMachine::new(machine).unwrap_err();

        assert!(matches!(error, MachineError::DeterminismViolation(_)));
        assert_eq!(
            error.violations(),
            &[Violation::DuplicateTransitions(vec![
                "(even, a) x2".into(),
                "(odd, b) x2".into(),
            ])]
        );
    }

    #[test]
    fn test_totality_reports_every_gap() {
        let transitions = vec![
            Transition::new("even", "a", "odd", "a", Direction::Right),
            Transition::new("odd", "a", "even", "a", Direction::Right),
        ];
        let machine = TuringMachine::new(parity_definition(), "B", transitions).unwrap();

        assert!(DeterministicTuringMachine::new(machine.clone()).is_ok());

        let error = DeterministicTuringMachine::new_total(machine).unwrap_err();
        assert_eq!(
            error.violations(),
            &[Violation::MissingTransitions(vec![
                "(even, B)".into(),
                "(even, b)".into(),
                "(odd, B)".into(),
                "(odd, b)".into(),
            ])]
        );
    }

    #[test]
    fn test_index_matches_linear_lookup() {
        let machine = even_a();

        for state in ["even", "odd", "qa"] {
            for symbol in ["a", "b", "B"] {
                assert_eq!(
                    machine.step(state, symbol),
                    machine.machine().step(state, symbol)
                );
            }
        }
    }

    #[test]
    fn test_usage_counts_and_reordering() {
        let machine = even_a();
        machine.simulate_deterministic("bbba", 100).unwrap();

        let usage: Vec<usize> = machine.transition_usage().iter().map(|(_, n)| *n).collect();
        assert_eq!(usage, vec![0, 1, 1, 0, 3, 0]);

        let optimized = machine.optimize_transitions().unwrap();
        let first = &optimized.transitions()[0];
        assert_eq!(first.key(), ("even", "b"));
        assert!(optimized.is_total());
        assert!(optimized.transition_usage().iter().all(|(_, n)| *n == 0));
    }

    #[test]
    fn test_clone_keeps_counters() {
        let machine = even_a();
        machine.simulate_deterministic("a", 10).unwrap();

        let copy = machine.clone();
        assert_eq!(copy.transition_usage(), machine.transition_usage());
    }

    proptest! {
        #[test]
        fn prop_optimized_machine_is_equivalent(
            warmup in prop::collection::vec("[ab]{0,8}", 0..6),
            inputs in prop::collection::vec("[ab]{0,12}", 1..10),
        ) {
            let machine = even_a();
            for input in &warmup {
                machine.simulate_deterministic(input, 100).unwrap();
            }
            let optimized = machine.optimize_transitions().unwrap();

            for input in &inputs {
                let before = machine.simulate_deterministic(input, 100).unwrap();
                let after = optimized.simulate_deterministic(input, 100).unwrap();
                prop_assert_eq!(before.accepted, after.accepted);
                prop_assert_eq!(before.step_count(), after.step_count());
                prop_assert_eq!(before.accepted, input.matches('a').count() % 2 == 0);
            }
        }
    }
}
