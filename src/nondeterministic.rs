//! The non-deterministic Turing Machine and its bounded breadth-first search over the
//! computation tree.

use crate::configuration::{Configuration, ConfigurationKey, Execution, ExplorationSummary};
use crate::definition::{Definition, Machine};
use crate::machine::check_input;
use crate::tape::{tokenize, Tape};
use crate::tree::TreeAnalysis;
use crate::types::{MachineError, State, Symbol, WeightedTransition};
use crate::validation::{check_definition, check_references, RuleRef, Violation};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;
use std::time::Instant;
use tracing::{debug, warn};

/// A single-tape machine whose transition relation maps a key to weighted choices.
#[derive(Debug)]
pub struct NonDeterministicTuringMachine {
    definition: Definition,
    blank: Symbol,
    transitions: Vec<WeightedTransition>,
    index: HashMap<State, HashMap<Symbol, Vec<WeightedTransition>>>,
    pub(crate) tree_cache: RwLock<HashMap<(String, usize), TreeAnalysis>>,
}

/// A configuration in the search arena together with the node it was expanded from.
struct Node {
    configuration: Configuration,
    parent: Option<usize>,
}

impl NonDeterministicTuringMachine {
    /// Creates a new machine and validates it.
    ///
    /// # Errors
    ///
    /// * `MachineError::InvalidConfiguration` for structural problems of the definition.
    /// * `MachineError::NonDeterminismInconsistency` for transitions naming unknown states or
    ///   symbols, or carrying a weight that is not strictly positive.
    pub fn new(
        definition: Definition,
        blank: impl Into<Symbol>,
        transitions: Vec<WeightedTransition>,
    ) -> Result<Self, MachineError> {
        let blank = blank.into();

        let violations = check_definition(&definition, &[blank.as_str()]);
        if !violations.is_empty() {
            return Err(MachineError::InvalidConfiguration(violations));
        }

        let violations = check_transitions(&definition, &transitions);
        if !violations.is_empty() {
            return Err(MachineError::NonDeterminismInconsistency(violations));
        }

        let mut index: HashMap<State, HashMap<Symbol, Vec<WeightedTransition>>> = HashMap::new();
        for transition in &transitions {
            index
                .entry(transition.state.clone())
                .or_default()
                .entry(transition.read.clone())
                .or_default()
                .push(transition.clone());
        }

        Ok(Self {
            definition,
            blank,
            transitions,
            index,
            tree_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Every choice for `(state, symbol)`, in declaration order. Empty if there is none.
    pub fn get_all_transitions(&self, state: &str, symbol: &str) -> &[WeightedTransition] {
        self.index
            .get(state)
            .and_then(|by_symbol| by_symbol.get(symbol))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Explores the computation tree breadth-first.
    ///
    /// Each configuration popped from the queue counts as one explored branch; exploration
    /// stops once `max_branches` have been explored. A configuration is only enqueued the first
    /// time its `(state, tape, head)` key is produced, even if a later path reaches it with a
    /// different weight. The input is accepted iff an explored branch reached an accept state.
    ///
    /// # Errors
    ///
    /// * `MachineError::Simulation` if the input contains symbols outside the alphabet.
    pub fn simulate_non_deterministic(
        &self,
        input: &str,
        max_steps: usize,
        max_branches: usize,
    ) -> Result<Execution, MachineError> {
        self.simulate_symbols(tokenize(input), max_steps, max_branches)
    }

    pub fn simulate_symbols(
        &self,
        input: Vec<Symbol>,
        max_steps: usize,
        max_branches: usize,
    ) -> Result<Execution, MachineError> {
        check_input(&self.definition, &input)
            .map_err(|e| e.at_boundary("simulate_non_deterministic"))?;
        Ok(self.explore(input, max_steps, max_branches))
    }

    fn explore(&self, input: Vec<Symbol>, max_steps: usize, max_branches: usize) -> Execution {
        let started = Instant::now();
        let root = self.root(input);

        let mut visited: HashSet<ConfigurationKey> = HashSet::from([root.key()]);
        let mut arena = vec![Node {
            configuration: root,
            parent: None,
        }];
        let mut queue = VecDeque::from([0]);
        let mut trace = Vec::new();
        let mut explored = 0;
        let mut accepting = 0;
        let mut first_accepting = None;
        let mut branch_limit_reached = false;

        debug!(max_steps, max_branches, "starting branch exploration");

        while let Some(id) = queue.pop_front() {
            if explored >= max_branches {
                branch_limit_reached = true;
                break;
            }
            explored += 1;

            let configuration = &arena[id].configuration;
            if configuration.is_halting() || configuration.step_count() >= max_steps {
                if configuration.is_accepting() {
                    accepting += 1;
                    first_accepting.get_or_insert(id);
                }
                trace.push(configuration.clone());
                continue;
            }

            let symbol = configuration.tape().read(configuration.head());
            let choices = self.get_all_transitions(configuration.state(), symbol);
            if choices.is_empty() {
                tracing::trace!(branch = ?configuration.branch_id(), "dead end");
                trace.push(configuration.clone());
                continue;
            }

            let successors: Vec<Configuration> = choices
                .iter()
                .enumerate()
                .map(|(i, transition)| self.successor(configuration, i, transition))
                .collect();

            for successor in successors {
                tracing::trace!(
                    step = successor.step_count(),
                    state = successor.state(),
                    head = successor.head(),
                    branch = ?successor.branch_id(),
                    "applied transition"
                );
                if visited.insert(successor.key()) {
                    arena.push(Node {
                        configuration: successor,
                        parent: Some(id),
                    });
                    queue.push_back(arena.len() - 1);
                }
            }
        }

        if branch_limit_reached {
            warn!(max_branches, pending = queue.len() + 1, "branch limit reached");
        }

        let accepting_path = first_accepting
            .map(|id| path_to(&arena, id))
            .unwrap_or_default();
        let summary = ExplorationSummary {
            branches_explored: explored,
            accepting_branches: accepting,
            elapsed: started.elapsed(),
            branch_limit_reached,
            first_accepting_branch: accepting_path
                .last()
                .and_then(|c| c.branch_id())
                .map(str::to_string),
            accepting_path,
        };

        debug!(
            accepted = accepting > 0,
            explored,
            accepting,
            configurations = arena.len(),
            "branch exploration finished"
        );

        Execution {
            accepted: accepting > 0,
            trace,
            summary: Some(summary),
        }
    }

    /// The root of every search: initial state, head 0, weight 1, branch `0`.
    pub(crate) fn root(&self, input: Vec<Symbol>) -> Configuration {
        Configuration::capture(
            &self.definition,
            self.definition.initial_state().to_string(),
            vec![Tape::new(input, self.blank.clone())],
            vec![0],
            0,
        )
        .on_branch(1.0, "0".to_string())
    }

    /// Applies the `index`-th choice to `parent`.
    ///
    /// Weights multiply along a path and are kept strictly positive even if the product
    /// underflows.
    pub(crate) fn successor(
        &self,
        parent: &Configuration,
        index: usize,
        transition: &WeightedTransition,
    ) -> Configuration {
        let mut tape = parent.tape().clone();
        let head = parent.head();
        tape.write(head, &transition.write);
        let head = transition.direction.apply(head);
        tape.ensure(head);

        let weight = (parent.weight() * transition.weight).max(f64::MIN_POSITIVE);
        let branch_id = format!("{}.{}", parent.branch_id().unwrap_or("0"), index);

        Configuration::capture(
            &self.definition,
            transition.next_state.clone(),
            vec![tape],
            vec![head],
            parent.step_count() + 1,
        )
        .on_branch(weight, branch_id)
    }

    /// Returns a new machine whose choices for every key are sorted by descending weight.
    ///
    /// The accept/reject decision is unchanged; heavier choices are explored first, which can
    /// change the first accepting branch found.
    pub fn optimize_parallel_computation(&self) -> Result<Self, MachineError> {
        let mut keys: Vec<(&str, &str)> = Vec::new();
        for transition in &self.transitions {
            let key = (transition.state.as_str(), transition.read.as_str());
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let transitions = keys
            .into_iter()
            .flat_map(|(state, symbol)| {
                let mut choices = self.get_all_transitions(state, symbol).to_vec();
                choices.sort_by(|a, b| b.weight.total_cmp(&a.weight));
                choices
            })
            .collect();

        Self::new(self.definition.clone(), self.blank.clone(), transitions)
            .map_err(|e| MachineError::Optimization(e.to_string()))
    }

    pub fn blank(&self) -> &str {
        &self.blank
    }

    pub fn transitions(&self) -> &[WeightedTransition] {
        &self.transitions
    }
}

impl Clone for NonDeterministicTuringMachine {
    fn clone(&self) -> Self {
        Self {
            definition: self.definition.clone(),
            blank: self.blank.clone(),
            transitions: self.transitions.clone(),
            index: self.index.clone(),
            tree_cache: RwLock::new(HashMap::new()),
        }
    }
}

impl Machine for NonDeterministicTuringMachine {
    fn definition(&self) -> &Definition {
        &self.definition
    }
}

fn check_transitions(definition: &Definition, transitions: &[WeightedTransition]) -> Vec<Violation> {
    let mut violations = check_references(
        definition,
        transitions.iter().map(|t| RuleRef {
            state: &t.state,
            next_state: &t.next_state,
            symbols: vec![t.read.as_str(), t.write.as_str()],
        }),
    );

    let bad_weights: Vec<String> = transitions
        .iter()
        .filter(|t| !(t.weight > 0.0 && t.weight.is_finite()))
        .map(WeightedTransition::to_string)
        .collect();
    if !bad_weights.is_empty() {
        violations.push(Violation::NonPositiveWeights(bad_weights));
    }

    violations
}

fn path_to(arena: &[Node], id: usize) -> Vec<Configuration> {
    let mut path = Vec::new();
    let mut current = Some(id);
    while let Some(id) = current {
        path.push(arena[id].configuration.clone());
        current = arena[id].parent;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use proptest::prelude::*;

    /// Guesses where a doubled letter starts.
    fn contains_double(weights: [f64; 2]) -> NonDeterministicTuringMachine {
        let definition = Definition::new(["q0", "sa", "sb", "acc"], "q0")
            .with_alphabet(["a", "b"])
            .with_tape_alphabet(["a", "b", "B"])
            .with_accept_states(["acc"]);
        let [stay, guess] = weights;

        NonDeterministicTuringMachine::new(
            definition,
            "B",
            vec![
                WeightedTransition::new("q0", "a", "q0", "a", Direction::Right, stay),
                WeightedTransition::new("q0", "a", "sa", "a", Direction::Right, guess),
                WeightedTransition::new("q0", "b", "q0", "b", Direction::Right, stay),
                WeightedTransition::new("q0", "b", "sb", "b", Direction::Right, guess),
                WeightedTransition::new("sa", "a", "acc", "a", Direction::Right, 1.0),
                WeightedTransition::new("sb", "b", "acc", "b", Direction::Right, 1.0),
            ],
        )
        .unwrap()
    }

    fn has_double(input: &str) -> bool {
        input.contains("aa") || input.contains("bb")
    }

    #[test]
    fn test_accepts_abba() {
        let machine = contains_double([0.5, 0.5]);
        let execution = machine.simulate_non_deterministic("abba", 50, 100).unwrap();
        let summary = execution.summary.unwrap();

        assert!(execution.accepted);
        assert_eq!(summary.accepting_branches, 1);
        assert!(!summary.branch_limit_reached);
        assert_eq!(summary.first_accepting_branch.as_deref(), Some("0.0.1.0"));
        assert_eq!(summary.accepting_path.len(), 4);
        assert_eq!(summary.accepting_path[0].branch_id(), Some("0"));
        assert!(summary.accepting_path[3].is_accepting());
    }

    #[test]
    fn test_rejects_without_double_letter() {
        let machine = contains_double([0.5, 0.5]);
        let execution = machine.simulate_non_deterministic("abab", 50, 100).unwrap();
        let summary = execution.summary.unwrap();

        assert!(!execution.accepted);
        assert_eq!(summary.accepting_branches, 0);
        assert!(summary.accepting_path.is_empty());
        assert!(!summary.branch_limit_reached);
        assert!(execution.trace.iter().all(|c| !c.is_accepting()));
    }

    #[test]
    fn test_step_limit_drops_branches() {
        let machine = contains_double([0.5, 0.5]);
        let execution = machine.simulate_non_deterministic("abba", 2, 100).unwrap();

        assert!(!execution.accepted);
        assert!(execution.trace.iter().all(|c| c.step_count() <= 2));
    }

    #[test]
    fn test_weights_multiply_along_paths() {
        let machine = contains_double([0.25, 0.5]);
        let execution = machine.simulate_non_deterministic("aab", 50, 100).unwrap();
        let path = execution.summary.unwrap().accepting_path;

        let weights: Vec<f64> = path.iter().map(Configuration::weight).collect();
        assert_eq!(weights, vec![1.0, 0.5, 0.5]);
        assert!(execution.trace.iter().all(|c| c.weight() > 0.0));
    }

    #[test]
    fn test_revisited_configurations_are_not_expanded() {
        let definition = Definition::new(["q0", "q1", "qa"], "q0")
            .with_alphabet(["a"])
            .with_tape_alphabet(["a", "B"])
            .with_accept_states(["qa"]);
        let machine = NonDeterministicTuringMachine::new(
            definition,
            "B",
            vec![
                WeightedTransition::new("q0", "a", "q0", "a", Direction::Stay, 1.0),
                WeightedTransition::new("q0", "a", "q1", "a", Direction::Stay, 1.0),
                WeightedTransition::new("q1", "a", "q0", "a", Direction::Stay, 1.0),
            ],
        )
        .unwrap();

        let execution = machine.simulate_non_deterministic("a", 1000, 1000).unwrap();
        let summary = execution.summary.unwrap();

        assert!(!execution.accepted);
        assert_eq!(summary.branches_explored, 2);
        assert!(!summary.branch_limit_reached);
    }

    #[test]
    fn test_branch_limit_is_not_an_error() {
        let definition = Definition::new(["q0", "q1", "qa"], "q0")
            .with_alphabet(["a"])
            .with_tape_alphabet(["a", "B"])
            .with_accept_states(["qa"]);
        let machine = NonDeterministicTuringMachine::new(
            definition,
            "B",
            vec![
                WeightedTransition::new("q0", "B", "q0", "B", Direction::Right, 1.0),
                WeightedTransition::new("q0", "B", "q1", "B", Direction::Right, 1.0),
                WeightedTransition::new("q1", "B", "q0", "B", Direction::Right, 1.0),
            ],
        )
        .unwrap();

        let execution = machine.simulate_non_deterministic("", 10_000, 10).unwrap();
        let summary = execution.summary.unwrap();

        assert!(!execution.accepted);
        assert_eq!(summary.branches_explored, 10);
        assert!(summary.branch_limit_reached);
    }

    #[test]
    fn test_get_all_transitions() {
        let machine = contains_double([0.5, 0.5]);

        assert_eq!(machine.get_all_transitions("q0", "a").len(), 2);
        assert_eq!(machine.get_all_transitions("sa", "a").len(), 1);
        assert!(machine.get_all_transitions("sa", "b").is_empty());
        assert!(machine.get_all_transitions("missing", "a").is_empty());
    }

    #[test]
    fn test_bad_weights_and_references() {
        let definition = Definition::new(["q0", "qa"], "q0")
            .with_alphabet(["a"])
            .with_tape_alphabet(["a", "B"])
            .with_accept_states(["qa"]);
        let error = NonDeterministicTuringMachine::new(
            definition,
            "B",
            vec![
                WeightedTransition::new("q0", "a", "qa", "a", Direction::Right, 0.0),
                WeightedTransition::new("q0", "a", "q7", "z", Direction::Right, -2.0),
                WeightedTransition::new("q0", "B", "qa", "B", Direction::Stay, f64::NAN),
            ],
        )
        .unwrap_err();

        assert!(matches!(error, MachineError::NonDeterminismInconsistency(_)));
        let violations = error.violations();
        assert_eq!(violations.len(), 3);
        assert_eq!(violations[0], Violation::UnknownStates(vec!["q7".into()]));
        assert_eq!(violations[1], Violation::UnknownSymbols(vec!["z".into()]));
        assert!(matches!(&violations[2], Violation::NonPositiveWeights(w) if w.len() == 3));
    }

    #[test]
    fn test_structural_problems_are_invalid_configuration() {
        let definition = Definition::new(["q0"], "q0")
            .with_alphabet(["a"])
            .with_tape_alphabet(["a", "B"]);
        let error = NonDeterministicTuringMachine::new(definition, "B", vec![]).unwrap_err();

        assert_eq!(
            error,
            MachineError::InvalidConfiguration(vec![Violation::NoHaltingStates])
        );
    }

    #[test]
    fn test_optimizer_sorts_choices_by_weight() {
        let machine = contains_double([0.2, 0.8]);
        let optimized = machine.optimize_parallel_computation().unwrap();

        let choices = optimized.get_all_transitions("q0", "b");
        assert_eq!(choices[0].next_state, "sb");
        assert_eq!(choices[1].next_state, "q0");
        assert_eq!(optimized.transitions().len(), machine.transitions().len());

        let before = machine.simulate_non_deterministic("abba", 50, 100).unwrap();
        let after = optimized.simulate_non_deterministic("abba", 50, 100).unwrap();
        assert!(before.accepted && after.accepted);
        assert_ne!(
            before.summary.unwrap().first_accepting_branch,
            after.summary.unwrap().first_accepting_branch
        );
    }

    proptest! {
        #[test]
        fn prop_optimizer_preserves_acceptance(
            stay in 0.01f64..1.0,
            guess in 0.01f64..1.0,
            inputs in prop::collection::vec("[ab]{0,10}", 1..8),
        ) {
            let machine = contains_double([stay, guess]);
            let optimized = machine.optimize_parallel_computation().unwrap();

            for input in &inputs {
                let before = machine.simulate_non_deterministic(input, 50, 1000).unwrap();
                let after = optimized.simulate_non_deterministic(input, 50, 1000).unwrap();
                prop_assert_eq!(before.accepted, after.accepted);
                prop_assert_eq!(before.accepted, has_double(input));
            }
        }

        #[test]
        fn prop_weight_is_product_of_choices(
            stay in 0.01f64..1.0,
            guess in 0.01f64..1.0,
            input in "[ab]{2,10}",
        ) {
            let machine = contains_double([stay, guess]);
            let execution = machine.simulate_non_deterministic(&input, 50, 1000).unwrap();
            let path = execution.summary.unwrap().accepting_path;

            for pair in path.windows(2) {
                let (parent, child) = (&pair[0], &pair[1]);
                let index: usize = child
                    .branch_id()
                    .and_then(|id| id.rsplit('.').next())
                    .and_then(|i| i.parse().ok())
                    .unwrap();
                let symbol = parent.tape().read(parent.head());
                let choice = &machine.get_all_transitions(parent.state(), symbol)[index];

                prop_assert_eq!(child.weight(), parent.weight() * choice.weight);
                prop_assert!(child.weight() > 0.0);
            }
        }
    }
}
