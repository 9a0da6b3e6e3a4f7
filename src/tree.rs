//! Offline analysis of a non-deterministic machine's computation tree.
//!
//! The tree is walked depth-first with an explicit stack. Configuration keys are interned into
//! an arena so "is this configuration already on the current path" is a vector lookup.

use crate::configuration::{Configuration, ConfigurationKey};
use crate::definition::Machine;
use crate::machine::check_input;
use crate::nondeterministic::NonDeterministicTuringMachine;
use crate::tape::tokenize;
use crate::types::MachineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::PoisonError;
use tracing::debug;

/// How a computation tree ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeOutcome {
    /// At least one leaf accepts.
    Accepting,
    /// No leaf accepts and every path ended within the depth bound.
    Rejecting,
    /// No leaf accepts and some path hit the depth bound or repeated a configuration.
    Infinite,
}

/// The result of [`NonDeterministicTuringMachine::analyze_computation_tree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeAnalysis {
    pub outcome: TreeOutcome,
    /// Configurations visited, including the root.
    pub nodes: usize,
    pub accepting_leaves: usize,
    /// Leaves in a reject state or without any transition.
    pub rejecting_leaves: usize,
    /// Paths cut off by the depth bound.
    pub depth_limited: usize,
    /// Paths that reached a configuration already on the same path.
    pub cycles: usize,
    pub deepest: usize,
}

enum Frame {
    Enter(Configuration),
    Exit(usize),
}

impl NonDeterministicTuringMachine {
    /// Classifies the computation tree on `input` explored up to `max_depth` steps.
    ///
    /// This is an analysis utility; acceptance is decided by
    /// [`simulate_non_deterministic`](Self::simulate_non_deterministic). Walking stops at the
    /// first accepting leaf. Results are cached per `(input, max_depth)`.
    ///
    /// # Errors
    ///
    /// * `MachineError::Simulation` if the input contains symbols outside the alphabet.
    pub fn analyze_computation_tree(
        &self,
        input: &str,
        max_depth: usize,
    ) -> Result<TreeAnalysis, MachineError> {
        let key = (input.to_string(), max_depth);
        let cached = self
            .tree_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(analysis) = cached {
            return Ok(analysis);
        }

        let symbols = tokenize(input);
        check_input(self.definition(), &symbols)
            .map_err(|e| e.at_boundary("analyze_computation_tree"))?;

        let analysis = self.walk(self.root(symbols), max_depth);
        self.tree_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, analysis.clone());

        Ok(analysis)
    }

    /// Number of cached tree analyses.
    pub fn cached_analyses(&self) -> usize {
        self.tree_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn walk(&self, root: Configuration, max_depth: usize) -> TreeAnalysis {
        let mut ids: HashMap<ConfigurationKey, usize> = HashMap::new();
        let mut on_path: Vec<bool> = Vec::new();
        let mut stack = vec![Frame::Enter(root)];
        let mut analysis = TreeAnalysis {
            outcome: TreeOutcome::Rejecting,
            nodes: 0,
            accepting_leaves: 0,
            rejecting_leaves: 0,
            depth_limited: 0,
            cycles: 0,
            deepest: 0,
        };

        while let Some(frame) = stack.pop() {
            let configuration = match frame {
                Frame::Exit(id) => {
                    on_path[id] = false;
                    continue;
                }
                Frame::Enter(configuration) => configuration,
            };

            analysis.nodes += 1;
            analysis.deepest = analysis.deepest.max(configuration.step_count());

            let next_id = ids.len();
            let id = *ids.entry(configuration.key()).or_insert(next_id);
            if id == on_path.len() {
                on_path.push(false);
            }

            if on_path[id] {
                analysis.cycles += 1;
                continue;
            }
            if configuration.is_accepting() {
                analysis.accepting_leaves += 1;
                break;
            }
            if configuration.is_rejecting() {
                analysis.rejecting_leaves += 1;
                continue;
            }
            if configuration.step_count() >= max_depth {
                analysis.depth_limited += 1;
                continue;
            }

            let symbol = configuration.tape().read(configuration.head());
            let choices = self.get_all_transitions(configuration.state(), symbol);
            if choices.is_empty() {
                analysis.rejecting_leaves += 1;
                continue;
            }

            on_path[id] = true;
            stack.push(Frame::Exit(id));
            for (i, transition) in choices.iter().enumerate().rev() {
                stack.push(Frame::Enter(self.successor(&configuration, i, transition)));
            }
        }

        analysis.outcome = if analysis.accepting_leaves > 0 {
            TreeOutcome::Accepting
        } else if analysis.depth_limited > 0 || analysis.cycles > 0 {
            TreeOutcome::Infinite
        } else {
            TreeOutcome::Rejecting
        };

        debug!(outcome = ?analysis.outcome, nodes = analysis.nodes, "computation tree analyzed");
        analysis
    }
}
