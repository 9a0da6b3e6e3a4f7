//! Tagged dispatch over the four machine variants.

use crate::configuration::Execution;
use crate::definition::Machine;
use crate::deterministic::DeterministicTuringMachine;
use crate::machine::TuringMachine;
use crate::multitape::MultiTapeTuringMachine;
use crate::nondeterministic::NonDeterministicTuringMachine;
use crate::record::MachineRecord;
use crate::types::{Limits, MachineError};
use tracing::info;

/// A machine of any variant.
#[derive(Debug, Clone)]
pub enum MachineKind {
    Single(TuringMachine),
    Deterministic(DeterministicTuringMachine),
    NonDeterministic(NonDeterministicTuringMachine),
    MultiTape(MultiTapeTuringMachine),
}

impl MachineKind {
    /// Builds and validates the machine a record describes.
    pub fn from_record(record: &MachineRecord) -> Result<Self, MachineError> {
        Ok(match record {
            MachineRecord::Single(r) => MachineKind::Single(r.build()?),
            MachineRecord::Deterministic(r) => {
                MachineKind::Deterministic(DeterministicTuringMachine::new(r.build()?)?)
            }
            MachineRecord::NonDeterministic(r) => MachineKind::NonDeterministic(r.build()?),
            MachineRecord::MultiTape(r) => MachineKind::MultiTape(r.build()?),
        })
    }

    pub fn to_record(&self) -> MachineRecord {
        match self {
            MachineKind::Single(m) => m.to_record(),
            MachineKind::Deterministic(m) => m.to_record(),
            MachineKind::NonDeterministic(m) => m.to_record(),
            MachineKind::MultiTape(m) => m.to_record(),
        }
    }

    /// Runs the machine with the simulate operation of its variant.
    ///
    /// Single-tape variants take exactly one input and multi-tape machines one per tape.
    /// `limits.max_branches` only applies to non-deterministic machines.
    ///
    /// # Errors
    ///
    /// * `MachineError::Simulation` for a wrong number of inputs or any error of the variant's
    ///   simulate operation.
    pub fn simulate(&self, inputs: &[&str], limits: &Limits) -> Result<Execution, MachineError> {
        let single = || match inputs {
            [input] => Ok(*input),
            _ => Err(MachineError::InvalidInput(format!(
                "expected exactly one input, got {}",
                inputs.len()
            ))
            .at_boundary("simulate")),
        };

        let execution = match self {
            MachineKind::Single(m) => m.simulate(single()?, limits.max_steps),
            MachineKind::Deterministic(m) => m.simulate_deterministic(single()?, limits.max_steps),
            MachineKind::NonDeterministic(m) => {
                m.simulate_non_deterministic(single()?, limits.max_steps, limits.max_branches)
            }
            MachineKind::MultiTape(m) => m.simulate_multi_tape(inputs, limits.max_steps),
        }?;

        info!(
            kind = self.type_name(),
            accepted = execution.accepted,
            steps = execution.step_count(),
            "simulation finished"
        );
        Ok(execution)
    }

    pub fn as_machine(&self) -> &dyn Machine {
        match self {
            MachineKind::Single(m) => m,
            MachineKind::Deterministic(m) => m,
            MachineKind::NonDeterministic(m) => m,
            MachineKind::MultiTape(m) => m,
        }
    }

    /// The serialized `type` tag of this variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            MachineKind::Single(_) => "TM",
            MachineKind::Deterministic(_) => "DTM",
            MachineKind::NonDeterministic(_) => "NTM",
            MachineKind::MultiTape(_) => "MultiTapeTM",
        }
    }

    pub fn tape_count(&self) -> usize {
        match self {
            MachineKind::MultiTape(m) => m.tape_count(),
            _ => 1,
        }
    }
}

impl From<TuringMachine> for MachineKind {
    fn from(machine: TuringMachine) -> Self {
        MachineKind::Single(machine)
    }
}

impl From<DeterministicTuringMachine> for MachineKind {
    fn from(machine: DeterministicTuringMachine) -> Self {
        MachineKind::Deterministic(machine)
    }
}

impl From<NonDeterministicTuringMachine> for MachineKind {
    fn from(machine: NonDeterministicTuringMachine) -> Self {
        MachineKind::NonDeterministic(machine)
    }
}

impl From<MultiTapeTuringMachine> for MachineKind {
    fn from(machine: MultiTapeTuringMachine) -> Self {
        MachineKind::MultiTape(machine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unary_successor() -> MachineRecord {
        MachineRecord::from_json(
            r#"{
                "type": "DTM",
                "states": ["q0", "qa"],
                "alphabet": ["1"],
                "tape_alphabet": ["1", "B"],
                "transitions": { "q0,1": ["qa", "1", "right"] },
                "initial_state": "q0",
                "accept_states": ["qa"],
                "blank_symbol": "B"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_dispatch_deterministic() {
        let machine = MachineKind::from_record(&unary_successor()).unwrap();

        assert_eq!(machine.type_name(), "DTM");
        assert_eq!(machine.as_machine().initial_state(), "q0");

        let execution = machine.simulate(&["1"], &Limits::default()).unwrap();
        assert!(execution.accepted);
        assert_eq!(execution.trace.len(), 2);
        assert!(execution.summary.is_none());
    }

    #[test]
    fn test_dispatch_nondeterministic_attaches_summary() {
        let record = MachineRecord::from_json(
            r#"{
                "type": "NTM",
                "states": ["q0", "qa"],
                "alphabet": ["a"],
                "tape_alphabet": ["a", "_"],
                "transitions": { "q0,a": [["q0", "a", "right", 1.0], ["qa", "a", "stay", 1.0]] },
                "initial_state": "q0",
                "accept_states": ["qa"]
            }"#,
        )
        .unwrap();
        let machine = MachineKind::from_record(&record).unwrap();

        let execution = machine.simulate(&["aa"], &Limits::default()).unwrap();
        let summary = execution.summary.unwrap();

        assert!(execution.accepted);
        assert_eq!(summary.first_accepting_branch.as_deref(), Some("0.1"));
        assert!(!summary.branch_limit_reached);
    }

    #[test]
    fn test_input_count_is_checked() {
        let machine = MachineKind::from_record(&unary_successor()).unwrap();

        for inputs in [&[][..], &["1", "1"][..]] {
            let error = machine.simulate(inputs, &Limits::default()).unwrap_err();
            assert!(matches!(error, MachineError::Simulation { .. }));
        }
    }

    #[test]
    fn test_record_round_trip_through_kind() {
        let record = unary_successor();
        let machine = MachineKind::from_record(&record).unwrap();

        assert_eq!(machine.to_record(), record);
        assert_eq!(machine.tape_count(), 1);
    }

    #[test]
    fn test_limits_are_forwarded() {
        let record = MachineRecord::from_json(
            r#"{
                "type": "TM",
                "states": ["s", "qa"],
                "alphabet": ["a"],
                "tape_alphabet": ["a", "_"],
                "transitions": { "s,a": ["s", "a", "stay"] },
                "initial_state": "s",
                "accept_states": ["qa"]
            }"#,
        )
        .unwrap();
        let machine = MachineKind::from_record(&record).unwrap();
        let limits = Limits {
            max_steps: 7,
            ..Limits::default()
        };

        let execution = machine.simulate(&["a"], &limits).unwrap();
        assert!(!execution.accepted);
        assert_eq!(execution.trace.len(), 8);
    }
}
