//! This module defines the core single-tape `TuringMachine` and the step loop every
//! single-tape variant reuses.

use crate::configuration::{Configuration, Execution};
use crate::definition::{Definition, Machine};
use crate::tape::{tokenize, Tape};
use crate::types::{MachineError, Symbol, Transition};
use crate::validation::{check_definition, check_references, unreachable_states, RuleRef, Violation};
use tracing::{debug, warn};

/// A single-tape Turing Machine with a plain list of transitions.
///
/// Lookups scan the list and take the first match, so the core machine tolerates duplicate
/// keys; the deterministic variant is the one that forbids them.
#[derive(Debug, Clone, PartialEq)]
pub struct TuringMachine {
    pub(crate) definition: Definition,
    pub(crate) blank: Symbol,
    pub(crate) transitions: Vec<Transition>,
}

impl TuringMachine {
    /// Creates a new machine and validates it.
    ///
    /// # Errors
    ///
    /// * `MachineError::InvalidConfiguration` listing every structural violation.
    pub fn new(
        definition: Definition,
        blank: impl Into<Symbol>,
        transitions: Vec<Transition>,
    ) -> Result<Self, MachineError> {
        let machine = Self {
            definition,
            blank: blank.into(),
            transitions,
        };

        let violations = machine.validate();
        if !violations.is_empty() {
            return Err(MachineError::InvalidConfiguration(violations));
        }

        machine.report_unreachable();
        Ok(machine)
    }

    /// Runs every structural check and returns all violations found.
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = check_definition(&self.definition, &[self.blank.as_str()]);
        violations.extend(check_references(
            &self.definition,
            self.transitions.iter().map(|t| RuleRef {
                state: &t.state,
                next_state: &t.next_state,
                symbols: vec![t.read.as_str(), t.write.as_str()],
            }),
        ));
        violations
    }

    /// Finds the first transition for `(state, symbol)`.
    pub fn step(&self, state: &str, symbol: &str) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| t.state == state && t.read == symbol)
    }

    /// Runs the machine on `input`, one symbol per character.
    ///
    /// Returns the acceptance decision and the trace, starting with the initial configuration.
    /// Running out of steps is a rejection, not an error.
    ///
    /// # Errors
    ///
    /// * `MachineError::Simulation` if the input contains symbols outside the alphabet.
    pub fn simulate(&self, input: &str, max_steps: usize) -> Result<Execution, MachineError> {
        self.simulate_symbols(tokenize(input), max_steps)
    }

    /// Like [`simulate`](Self::simulate), for input that is already split into symbols.
    pub fn simulate_symbols(
        &self,
        input: Vec<Symbol>,
        max_steps: usize,
    ) -> Result<Execution, MachineError> {
        check_input(&self.definition, &input).map_err(|e| e.at_boundary("simulate"))?;

        Ok(run_single_tape(
            &self.definition,
            &self.blank,
            input,
            max_steps,
            |state, symbol| self.step(state, symbol),
        ))
    }

    /// Returns the blank symbol used by this machine.
    pub fn blank(&self) -> &str {
        &self.blank
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    fn report_unreachable(&self) {
        let edges = self
            .transitions
            .iter()
            .map(|t| (t.state.as_str(), t.next_state.as_str()));
        let unreachable = unreachable_states(&self.definition, edges);
        if !unreachable.is_empty() {
            warn!(?unreachable, "states unreachable from the initial state");
        }
    }
}

impl Machine for TuringMachine {
    fn definition(&self) -> &Definition {
        &self.definition
    }
}

/// Rejects input symbols that are not in the alphabet.
pub(crate) fn check_input(definition: &Definition, input: &[Symbol]) -> Result<(), MachineError> {
    match input
        .iter()
        .enumerate()
        .find(|(_, symbol)| !definition.alphabet().contains(*symbol))
    {
        Some((position, symbol)) => Err(MachineError::InvalidInput(format!(
            "symbol '{symbol}' at position {position} is not in the input alphabet"
        ))),
        None => Ok(()),
    }
}

/// The single-tape step loop.
///
/// Starts at `(initial, input, head = 0, step = 0)` and applies the transition returned by
/// `lookup` until a halting state is reached, no transition exists, or `max_steps` steps have
/// been taken. Only reaching an accept state accepts.
pub(crate) fn run_single_tape<'m, F>(
    definition: &Definition,
    blank: &str,
    input: Vec<Symbol>,
    max_steps: usize,
    mut lookup: F,
) -> Execution
where
    F: FnMut(&str, &str) -> Option<&'m Transition>,
{
    let mut tape = Tape::new(input, blank);
    let mut head: isize = 0;
    let mut state = definition.initial_state().to_string();
    let mut trace = vec![Configuration::capture(
        definition,
        state.clone(),
        vec![tape.clone()],
        vec![head],
        0,
    )];

    debug!(initial = %state, max_steps, "starting single-tape run");

    if definition.is_halting(&state) {
        return finish(definition.is_accepting(&state), trace);
    }

    for step in 1..=max_steps {
        let Some(transition) = lookup(&state, tape.read(head)) else {
            tracing::trace!(state = %state, head, "no transition, rejecting");
            return finish(false, trace);
        };

        tape.write(head, &transition.write);
        head = transition.direction.apply(head);
        tape.ensure(head);
        state.clone_from(&transition.next_state);
        tracing::trace!(step, state = %state, head, "applied transition");

        let configuration =
            Configuration::capture(definition, state.clone(), vec![tape.clone()], vec![head], step);
        let (accepting, rejecting) = (configuration.is_accepting(), configuration.is_rejecting());
        trace.push(configuration);

        if accepting || rejecting {
            return finish(accepting, trace);
        }
    }

    debug!(max_steps, "step limit reached, rejecting");
    finish(false, trace)
}

fn finish(accepted: bool, trace: Vec<Configuration>) -> Execution {
    debug!(accepted, steps = trace.len() - 1, "run finished");
    Execution::new(accepted, trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use proptest::prelude::*;

    fn unary_successor() -> TuringMachine {
        let definition = Definition::new(["q0", "qa"], "q0")
            .with_alphabet(["1"])
            .with_tape_alphabet(["1", "B"])
            .with_accept_states(["qa"]);

        TuringMachine::new(
            definition,
            "B",
            vec![Transition::new("q0", "1", "qa", "1", Direction::Right)],
        )
        .unwrap()
    }

    fn self_loop() -> TuringMachine {
        let definition = Definition::new(["s", "qa"], "s")
            .with_alphabet(["a"])
            .with_tape_alphabet(["a", "B"])
            .with_accept_states(["qa"]);

        TuringMachine::new(
            definition,
            "B",
            vec![Transition::new("s", "a", "s", "a", Direction::Stay)],
        )
        .unwrap()
    }

    #[test]
    fn test_machine_creation() {
        let machine = unary_successor();

        assert_eq!(machine.initial_state(), "q0");
        assert_eq!(machine.blank(), "B");
        assert_eq!(machine.transitions().len(), 1);
        assert!(machine.validate().is_empty());
    }

    #[test]
    fn test_accepts_with_two_entry_trace() {
        let execution = unary_successor().simulate("1", 100).unwrap();

        assert!(execution.accepted);
        assert_eq!(execution.trace.len(), 2);

        let last = execution.final_configuration().unwrap();
        assert_eq!(last.state(), "qa");
        assert_eq!(last.head(), 1);
        assert_eq!(last.step_count(), 1);
        assert!(last.is_accepting());
    }

    #[test]
    fn test_missing_transition_rejects() {
        let execution = unary_successor().simulate("", 100).unwrap();

        assert!(!execution.accepted);
        assert_eq!(execution.trace.len(), 1);
        assert_eq!(execution.trace[0].tape().read(0), "B");
    }

    #[test]
    fn test_self_loop_terminates_at_step_limit() {
        let execution = self_loop().simulate("a", 25).unwrap();

        assert!(!execution.accepted);
        assert_eq!(execution.trace.len(), 26);
        assert_eq!(execution.step_count(), 25);
    }

    #[test]
    fn test_reject_state_stops_run() {
        let definition = Definition::new(["q0", "qa", "qr"], "q0")
            .with_alphabet(["a", "b"])
            .with_tape_alphabet(["a", "b", "B"])
            .with_accept_states(["qa"])
            .with_reject_states(["qr"]);
        let machine = TuringMachine::new(
            definition,
            "B",
            vec![
                Transition::new("q0", "a", "q0", "a", Direction::Right),
                Transition::new("q0", "b", "qr", "b", Direction::Stay),
                Transition::new("q0", "B", "qa", "B", Direction::Stay),
            ],
        )
        .unwrap();

        let rejected = machine.simulate("aab", 100).unwrap();
        assert!(!rejected.accepted);
        assert!(rejected.final_configuration().unwrap().is_rejecting());
        assert_eq!(rejected.step_count(), 3);

        assert!(machine.simulate("aaa", 100).unwrap().accepted);
    }

    #[test]
    fn test_halting_initial_state() {
        let definition = Definition::new(["qa"], "qa")
            .with_alphabet(["a"])
            .with_tape_alphabet(["a", "B"])
            .with_accept_states(["qa"]);
        let machine = TuringMachine::new(definition, "B", vec![]).unwrap();

        let execution = machine.simulate("a", 10).unwrap();
        assert!(execution.accepted);
        assert_eq!(execution.trace.len(), 1);
    }

    #[test]
    fn test_moving_left_extends_tape() {
        let definition = Definition::new(["q0", "q1", "qa"], "q0")
            .with_alphabet(["a"])
            .with_tape_alphabet(["a", "x", "B"])
            .with_accept_states(["qa"]);
        let machine = TuringMachine::new(
            definition,
            "B",
            vec![
                Transition::new("q0", "a", "q1", "a", Direction::Left),
                Transition::new("q1", "B", "qa", "x", Direction::Stay),
            ],
        )
        .unwrap();

        let execution = machine.simulate("a", 10).unwrap();
        let last = execution.final_configuration().unwrap();

        assert!(execution.accepted);
        assert_eq!(last.head(), -1);
        assert_eq!(last.tape().contents(), "xa");
    }

    #[test]
    fn test_first_matching_transition_wins() {
        let definition = Definition::new(["q0", "qa", "qr"], "q0")
            .with_alphabet(["a"])
            .with_tape_alphabet(["a", "B"])
            .with_accept_states(["qa"])
            .with_reject_states(["qr"]);
        let machine = TuringMachine::new(
            definition,
            "B",
            vec![
                Transition::new("q0", "a", "qa", "a", Direction::Stay),
                Transition::new("q0", "a", "qr", "a", Direction::Stay),
            ],
        )
        .unwrap();

        assert_eq!(machine.step("q0", "a").unwrap().next_state, "qa");
        assert!(machine.simulate("a", 10).unwrap().accepted);
    }

    #[test]
    fn test_invalid_configuration_lists_all_violations() {
        let definition = Definition::new(["q0"], "q0")
            .with_alphabet(["1"])
            .with_tape_alphabet(["1"]);
        let result = TuringMachine::new(
            definition,
            "B",
            vec![Transition::new("q0", "2", "q9", "1", Direction::Right)],
        );

        let error = result.unwrap_err();
        assert!(matches!(error, MachineError::InvalidConfiguration(_)));
        assert_eq!(
            error.violations(),
            &[
                Violation::NoHaltingStates,
                Violation::MissingBlank("B".into()),
                Violation::UnknownStates(vec!["q9".into()]),
                Violation::UnknownSymbols(vec!["2".into()]),
            ]
        );
    }

    #[test]
    fn test_input_outside_alphabet_is_simulation_error() {
        let error = unary_successor().simulate("12", 10).unwrap_err();

        match error {
            MachineError::Simulation { message, source } => {
                assert!(message.contains("'2'"));
                assert!(matches!(
                    source.as_deref(),
                    Some(MachineError::InvalidInput(_))
                ));
            }
            other => panic!("expected a simulation error, got {other:?}"),
        }
    }

    fn walker(directions: &[Direction]) -> TuringMachine {
        let states: Vec<String> = (0..=directions.len()).map(|i| format!("q{i}")).collect();
        let mut transitions = Vec::new();
        for (i, direction) in directions.iter().enumerate() {
            for symbol in ["a", "B"] {
                transitions.push(Transition::new(
                    states[i].clone(),
                    symbol,
                    states[i + 1].clone(),
                    symbol,
                    *direction,
                ));
            }
        }

        let definition = Definition::new(states.clone(), "q0")
            .with_alphabet(["a"])
            .with_tape_alphabet(["a", "B"])
            .with_accept_states([states[directions.len()].clone()]);
        TuringMachine::new(definition, "B", transitions).unwrap()
    }

    fn direction() -> impl Strategy<Value = Direction> {
        prop_oneof![
            Just(Direction::Left),
            Just(Direction::Right),
            Just(Direction::Stay)
        ]
    }

    proptest! {
        #[test]
        fn prop_head_moves_by_direction(
            directions in prop::collection::vec(direction(), 1..20),
            input in "a{0,6}",
        ) {
            let execution = walker(&directions).simulate(&input, 100).unwrap();

            prop_assert!(execution.accepted);
            prop_assert_eq!(execution.trace.len(), directions.len() + 1);
            for (pair, direction) in execution.trace.windows(2).zip(&directions) {
                prop_assert_eq!(pair[1].head(), direction.apply(pair[0].head()));
                prop_assert_eq!(pair[1].step_count(), pair[0].step_count() + 1);
            }
        }

        #[test]
        fn prop_self_loop_never_exceeds_bound(max_steps in 0usize..200) {
            let execution = self_loop().simulate("a", max_steps).unwrap();

            prop_assert!(!execution.accepted);
            prop_assert_eq!(execution.trace.len(), max_steps + 1);
        }
    }
}
