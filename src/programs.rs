use crate::kind::MachineKind;
use crate::record::MachineRecord;
use crate::types::MachineError;

use std::sync::RwLock;
use tracing::warn;

// Default embedded machines
const PROGRAM_TEXTS: [&str; 6] = [
    include_str!("../machines/unary-successor.tm"),
    include_str!("../machines/contains-aa-or-bb.tm"),
    include_str!("../machines/multi-tape-copy.tm"),
    include_str!("../machines/even-a.tm"),
    include_str!("../machines/binary-palindrome.tm"),
    include_str!("../machines/binary-increment.tm"),
];

lazy_static::lazy_static! {
    pub static ref PROGRAMS: RwLock<Vec<MachineRecord>> = RwLock::new(Vec::new());
}

pub struct ProgramManager;

impl ProgramManager {
    /// Parses the embedded machines into the catalog, replacing its contents.
    pub fn load() -> Result<(), MachineError> {
        let mut programs = Vec::new();

        for (index, program_text) in PROGRAM_TEXTS.iter().enumerate() {
            match crate::parser::parse(program_text) {
                Ok(record) => programs.push(record),
                Err(e) => warn!(index, error = %e, "failed to parse embedded machine"),
            }
        }

        let mut write_guard = PROGRAMS
            .write()
            .map_err(|_| MachineError::FileError("Failed to acquire write lock".to_string()))?;
        *write_guard = programs;

        Ok(())
    }

    /// Runs `f` over the catalog, loading it first if it is still empty.
    fn with_programs<T>(f: impl FnOnce(&[MachineRecord]) -> T) -> Result<T, MachineError> {
        let empty = PROGRAMS
            .read()
            .map(|programs| programs.is_empty())
            .unwrap_or(true);
        if empty {
            Self::load()?;
        }

        PROGRAMS
            .read()
            .map(|programs| f(&programs))
            .map_err(|_| MachineError::FileError("Failed to acquire read lock".to_string()))
    }

    /// Get the number of available machines
    pub fn get_program_count() -> usize {
        Self::with_programs(|programs| programs.len()).unwrap_or(0)
    }

    /// Get a machine record by its index
    pub fn get_program_by_index(index: usize) -> Result<MachineRecord, MachineError> {
        Self::with_programs(|programs| programs.get(index).cloned())?.ok_or_else(|| {
            MachineError::InvalidInput(format!("Program index {} out of range", index))
        })
    }

    /// Get a machine record by its name
    pub fn get_program_by_name(name: &str) -> Result<MachineRecord, MachineError> {
        Self::with_programs(|programs| {
            programs
                .iter()
                .find(|program| program.name() == Some(name))
                .cloned()
        })?
        .ok_or_else(|| MachineError::InvalidInput(format!("Program '{}' not found", name)))
    }

    /// Builds the machine of a catalog entry.
    pub fn get_machine_by_name(name: &str) -> Result<MachineKind, MachineError> {
        MachineKind::from_record(&Self::get_program_by_name(name)?)
    }

    /// List all machine names
    pub fn list_program_names() -> Vec<String> {
        Self::with_programs(|programs| {
            programs
                .iter()
                .filter_map(|program| program.name().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
    }

    /// Get information about a machine by its index
    pub fn get_program_info(index: usize) -> Result<ProgramInfo, MachineError> {
        let program = Self::get_program_by_index(index)?;

        Ok(ProgramInfo {
            index,
            name: program.name().unwrap_or_default().to_string(),
            kind: program.type_name(),
            initial_state: program.initial_state().to_string(),
            state_count: program.states().len(),
            transition_count: program.transition_count(),
            tape_count: program.tape_count(),
        })
    }

    /// Search for machines by name
    pub fn search_programs(query: &str) -> Vec<usize> {
        let query = query.to_lowercase();

        Self::with_programs(|programs| {
            programs
                .iter()
                .enumerate()
                .filter(|(_, program)| {
                    program
                        .name()
                        .is_some_and(|name| name.to_lowercase().contains(&query))
                })
                .map(|(index, _)| index)
                .collect()
        })
        .unwrap_or_default()
    }

    /// Get the original text of a machine by its index
    pub fn get_program_text_by_index(index: usize) -> Result<&'static str, MachineError> {
        PROGRAM_TEXTS.get(index).copied().ok_or_else(|| {
            MachineError::InvalidInput(format!("Program text index {} out of range", index))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInfo {
    pub index: usize,
    pub name: String,
    pub kind: &'static str,
    pub initial_state: String,
    pub state_count: usize,
    pub transition_count: usize,
    pub tape_count: usize,
}
