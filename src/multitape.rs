//! The multi-tape Turing Machine and its reduction to a single tape.
//!
//! Heads move independently within a step and are then synchronized: every head is moved back
//! to the smallest position among them, so after each step all heads share one position.
//!
//! [`convert_to_single_tape`](MultiTapeTuringMachine::convert_to_single_tape) moves the single
//! head with tape 1's direction. This is a known limitation: when the tapes of a transition move
//! in different directions the converted machine can diverge from the multi-tape run.

use crate::configuration::{Configuration, Execution};
use crate::definition::{Definition, Machine};
use crate::encoder::{choose_separator, encode_tapes, encode_track};
use crate::machine::{check_input, TuringMachine};
use crate::tape::{tokenize, Tape, TapeHead};
use crate::types::{MachineError, MultiTapeTransition, State, Symbol, Transition};
use crate::validation::{check_definition, check_references, RuleRef, Violation};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// A machine with `k` tapes, one alphabet and blank per tape, and transitions keyed by the
/// tuple of symbols under the heads.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiTapeTuringMachine {
    definition: Definition,
    tape_alphabets: Vec<BTreeSet<Symbol>>,
    blanks: Vec<Symbol>,
    transitions: Vec<MultiTapeTransition>,
    index: HashMap<State, HashMap<Vec<Symbol>, usize>>,
}

impl MultiTapeTuringMachine {
    /// Creates a new machine and validates it.
    ///
    /// The tape alphabet of `definition` is replaced by the union of `tape_alphabets`.
    ///
    /// # Errors
    ///
    /// * `MachineError::InvalidConfiguration` for structural problems, blanks outside their
    ///   tape's alphabet, or transitions naming unknown states.
    /// * `MachineError::MultiTapeConsistency` for tuples of the wrong length, symbols outside
    ///   the alphabet of the tape they address, and duplicate keys.
    pub fn new(
        definition: Definition,
        tape_alphabets: Vec<BTreeSet<Symbol>>,
        blanks: Vec<Symbol>,
        transitions: Vec<MultiTapeTransition>,
    ) -> Result<Self, MachineError> {
        let union: BTreeSet<Symbol> = tape_alphabets.iter().flatten().cloned().collect();
        let definition = definition.with_tape_alphabet(union);

        let mut violations = check_tapes(&tape_alphabets, &blanks);
        violations.extend(check_definition(&definition, &[]));
        violations.extend(check_references(
            &definition,
            transitions.iter().map(|t| RuleRef {
                state: &t.state,
                next_state: &t.next_state,
                symbols: Vec::new(),
            }),
        ));
        if !violations.is_empty() {
            return Err(MachineError::InvalidConfiguration(violations));
        }

        let violations = check_consistency(&tape_alphabets, &transitions);
        if !violations.is_empty() {
            return Err(MachineError::MultiTapeConsistency(violations));
        }

        let mut index: HashMap<State, HashMap<Vec<Symbol>, usize>> = HashMap::new();
        for (i, transition) in transitions.iter().enumerate() {
            index
                .entry(transition.state.clone())
                .or_default()
                .insert(transition.read.clone(), i);
        }

        Ok(Self {
            definition,
            tape_alphabets,
            blanks,
            transitions,
            index,
        })
    }

    pub fn tape_count(&self) -> usize {
        self.tape_alphabets.len()
    }

    pub fn tape_alphabets(&self) -> &[BTreeSet<Symbol>] {
        &self.tape_alphabets
    }

    pub fn blank_symbols(&self) -> &[Symbol] {
        &self.blanks
    }

    pub fn transitions(&self) -> &[MultiTapeTransition] {
        &self.transitions
    }

    /// The transition for `state` and the symbols under the heads, if any.
    pub fn step(&self, state: &str, symbols: &[Symbol]) -> Option<&MultiTapeTransition> {
        self.index
            .get(state)
            .and_then(|by_symbols| by_symbols.get(symbols))
            .and_then(|&i| self.transitions.get(i))
    }

    /// Reads the symbol under each head. Heads naming a missing tape are skipped.
    pub fn get_tape_symbols(tapes: &[Tape], heads: &[TapeHead]) -> Vec<Symbol> {
        heads
            .iter()
            .filter_map(|head| {
                tapes
                    .get(head.tape_id)
                    .map(|tape| tape.read(head.position).to_string())
            })
            .collect()
    }

    /// Moves every head to the smallest position among them.
    ///
    /// # Errors
    ///
    /// * `MachineError::Synchronization` if `heads` is empty.
    pub fn synchronize_heads(heads: &[TapeHead]) -> Result<Vec<TapeHead>, MachineError> {
        let minimum = heads
            .iter()
            .map(|head| head.position)
            .min()
            .ok_or_else(|| MachineError::Synchronization("no heads to synchronize".into()))?;

        Ok(heads
            .iter()
            .map(|head| TapeHead::new(head.tape_id, minimum))
            .collect())
    }

    /// Runs the machine with one input string per tape.
    ///
    /// The input of the first tape must use the input alphabet; every other tape may be
    /// pre-loaded with symbols of its own tape alphabet. Each step reads all tapes, writes all
    /// tapes, moves every head and then synchronizes them.
    ///
    /// # Errors
    ///
    /// * `MachineError::Simulation` if the number of inputs differs from the tape count or an
    ///   input holds a symbol its tape does not accept.
    pub fn simulate_multi_tape(
        &self,
        inputs: &[&str],
        max_steps: usize,
    ) -> Result<Execution, MachineError> {
        let inputs = self
            .tokenize_inputs(inputs)
            .map_err(|e| e.at_boundary("simulate_multi_tape"))?;
        self.run(inputs, max_steps)
            .map_err(|e| e.at_boundary("simulate_multi_tape"))
    }

    fn run(&self, inputs: Vec<Vec<Symbol>>, max_steps: usize) -> Result<Execution, MachineError> {
        let mut tapes: Vec<Tape> = inputs
            .into_iter()
            .zip(&self.blanks)
            .map(|(input, blank)| Tape::new(input, blank.clone()))
            .collect();
        let mut heads: Vec<TapeHead> = (0..self.tape_count()).map(|i| TapeHead::new(i, 0)).collect();
        let mut state = self.definition.initial_state().to_string();
        let mut trace = vec![self.capture(&state, &tapes, &heads, 0)];

        debug!(tapes = self.tape_count(), max_steps, "starting multi-tape run");

        if self.definition.is_halting(&state) {
            return Ok(Execution::new(self.definition.is_accepting(&state), trace));
        }

        for step in 1..=max_steps {
            let symbols = Self::get_tape_symbols(&tapes, &heads);
            let Some(transition) = self.step(&state, &symbols) else {
                tracing::trace!(state = %state, ?symbols, "no transition, rejecting");
                return Ok(Execution::new(false, trace));
            };

            let moved: Vec<TapeHead> = heads
                .iter()
                .zip(&transition.write)
                .zip(&transition.directions)
                .map(|((head, write), direction)| {
                    if let Some(tape) = tapes.get_mut(head.tape_id) {
                        tape.write(head.position, write);
                    }
                    TapeHead::new(head.tape_id, direction.apply(head.position))
                })
                .collect();

            heads = Self::synchronize_heads(&moved)?;
            for (tape, head) in tapes.iter_mut().zip(&heads) {
                tape.ensure(head.position);
            }
            state.clone_from(&transition.next_state);
            tracing::trace!(
                step,
                state = %state,
                head = heads.first().map_or(0, |h| h.position),
                "applied transition"
            );

            let configuration = self.capture(&state, &tapes, &heads, step);
            let (accepting, rejecting) = (configuration.is_accepting(), configuration.is_rejecting());
            trace.push(configuration);

            if accepting || rejecting {
                debug!(accepted = accepting, steps = step, "multi-tape run finished");
                return Ok(Execution::new(accepting, trace));
            }
        }

        debug!(max_steps, "step limit reached, rejecting");
        Ok(Execution::new(false, trace))
    }

    /// Reduces this machine to a single-tape core machine over combined track symbols.
    ///
    /// Every cell of the result holds the `k` symbols of one column joined with a separator that
    /// occurs in no tape alphabet. The head moves with tape 1's direction. Only machines whose
    /// transitions move all tapes the same way are reduced faithfully; when directions differ
    /// the converted machine may accept differently or take a different number of steps. The
    /// input alphabet is every combined symbol used by a transition plus each input symbol over
    /// blank tracks.
    ///
    /// # Errors
    ///
    /// * `MachineError::Conversion` if no separator is available or the result does not
    ///   validate.
    pub fn convert_to_single_tape(&self) -> Result<TuringMachine, MachineError> {
        let separator = choose_separator(&self.tape_alphabets)?;
        let blank = encode_track(&self.blanks, &separator);

        let transitions: Vec<Transition> = self
            .transitions
            .iter()
            .map(|t| {
                let direction = t.directions.first().copied().ok_or_else(|| {
                    MachineError::Conversion(format!("transition from '{}' has no directions", t.state))
                })?;
                Ok(Transition::new(
                    t.state.clone(),
                    encode_track(&t.read, &separator),
                    t.next_state.clone(),
                    encode_track(&t.write, &separator),
                    direction,
                ))
            })
            .collect::<Result<_, MachineError>>()?;

        let mut alphabet: BTreeSet<Symbol> = transitions
            .iter()
            .flat_map(|t| [t.read.clone(), t.write.clone()])
            .collect();
        alphabet.extend(self.definition.alphabet().iter().map(|symbol| {
            let mut column = self.blanks.clone();
            if let Some(first) = column.first_mut() {
                first.clone_from(symbol);
            }
            encode_track(&column, &separator)
        }));
        alphabet.remove(&blank);

        let mut tape_alphabet: BTreeSet<Symbol> = self.tape_alphabets.iter().flatten().cloned().collect();
        tape_alphabet.extend(alphabet.iter().cloned());
        tape_alphabet.insert(separator.clone());
        tape_alphabet.insert(blank.clone());

        let definition = Definition::new(self.definition.states().iter().cloned(), self.definition.initial_state())
            .with_alphabet(alphabet)
            .with_tape_alphabet(tape_alphabet)
            .with_accept_states(self.definition.accept_states().iter().cloned())
            .with_reject_states(self.definition.reject_states().iter().cloned());

        let machine = TuringMachine::new(definition, blank, transitions)
            .map_err(|e| MachineError::Conversion(e.to_string()))?;

        info!(
            tapes = self.tape_count(),
            %separator,
            transitions = machine.transitions().len(),
            "converted to single tape"
        );
        Ok(machine)
    }

    /// Builds the single-tape input matching [`convert_to_single_tape`](Self::convert_to_single_tape)
    /// for one input string per tape.
    ///
    /// # Errors
    ///
    /// * `MachineError::Simulation` for inputs [`simulate_multi_tape`](Self::simulate_multi_tape)
    ///   would reject.
    /// * `MachineError::Conversion` if no separator is available.
    pub fn encode_inputs(&self, inputs: &[&str]) -> Result<Vec<Symbol>, MachineError> {
        let inputs = self
            .tokenize_inputs(inputs)
            .map_err(|e| e.at_boundary("encode_inputs"))?;
        let separator = choose_separator(&self.tape_alphabets)?;

        Ok(encode_tapes(&inputs, &self.blanks, &separator))
    }

    /// Returns a new machine with its transitions in canonical `(state, symbols)` order.
    pub fn optimize_tape_access(&self) -> Result<Self, MachineError> {
        let mut transitions = self.transitions.clone();
        transitions.sort_by(|a, b| (&a.state, &a.read).cmp(&(&b.state, &b.read)));

        Self::new(
            self.definition.clone(),
            self.tape_alphabets.clone(),
            self.blanks.clone(),
            transitions,
        )
        .map_err(|e| MachineError::Optimization(e.to_string()))
    }

    fn tokenize_inputs(&self, inputs: &[&str]) -> Result<Vec<Vec<Symbol>>, MachineError> {
        if inputs.len() != self.tape_count() {
            return Err(MachineError::InvalidInput(format!(
                "expected {} inputs, one per tape, got {}",
                self.tape_count(),
                inputs.len()
            )));
        }

        let inputs: Vec<Vec<Symbol>> = inputs.iter().map(|input| tokenize(input)).collect();
        for (tape, (input, alphabet)) in inputs.iter().zip(&self.tape_alphabets).enumerate() {
            if tape == 0 {
                check_input(&self.definition, input)?;
            } else if let Some(symbol) = input.iter().find(|s| !alphabet.contains(*s)) {
                return Err(MachineError::InvalidInput(format!(
                    "symbol '{symbol}' is not in the alphabet of tape {}",
                    tape + 1
                )));
            }
        }
        Ok(inputs)
    }

    fn capture(&self, state: &str, tapes: &[Tape], heads: &[TapeHead], step: usize) -> Configuration {
        Configuration::capture(
            &self.definition,
            state.to_string(),
            tapes.to_vec(),
            heads.iter().map(|head| head.position).collect(),
            step,
        )
    }
}

impl Machine for MultiTapeTuringMachine {
    fn definition(&self) -> &Definition {
        &self.definition
    }
}

fn check_tapes(tape_alphabets: &[BTreeSet<Symbol>], blanks: &[Symbol]) -> Vec<Violation> {
    let mut violations = Vec::new();
    if tape_alphabets.is_empty() {
        violations.push(Violation::NoTapes);
    }
    if blanks.len() != tape_alphabets.len() {
        violations.push(Violation::TupleLength(vec![format!(
            "{} blank symbols for {} tapes",
            blanks.len(),
            tape_alphabets.len()
        )]));
    }
    violations.extend(
        blanks
            .iter()
            .zip(tape_alphabets)
            .filter(|(blank, alphabet)| !alphabet.contains(*blank))
            .map(|(blank, _)| Violation::MissingBlank(blank.clone())),
    );
    violations
}

fn check_consistency(
    tape_alphabets: &[BTreeSet<Symbol>],
    transitions: &[MultiTapeTransition],
) -> Vec<Violation> {
    let k = tape_alphabets.len();
    let mut wrong_length = Vec::new();
    let mut outside = BTreeSet::new();
    let mut seen = HashMap::new();

    for transition in transitions {
        if transition.read.len() != k
            || transition.write.len() != k
            || transition.directions.len() != k
        {
            wrong_length.push(transition.to_string());
            continue;
        }

        for (tape, alphabet) in tape_alphabets.iter().enumerate() {
            for symbol in [&transition.read[tape], &transition.write[tape]] {
                if !alphabet.contains(symbol) {
                    outside.insert(format!("'{symbol}' on tape {}", tape + 1));
                }
            }
        }

        *seen
            .entry(format!("({}, [{}])", transition.state, transition.read.join(", ")))
            .or_insert(0usize) += 1;
    }

    let mut duplicates: Vec<String> = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(key, count)| format!("{key} x{count}"))
        .collect();
    duplicates.sort();

    let mut violations = Vec::new();
    if !wrong_length.is_empty() {
        violations.push(Violation::TupleLength(wrong_length));
    }
    if !outside.is_empty() {
        violations.push(Violation::SymbolOutsideTape(outside.into_iter().collect()));
    }
    if !duplicates.is_empty() {
        violations.push(Violation::DuplicateTransitions(duplicates));
    }
    violations
}
