//! This module provides the `ProgramLoader` struct, responsible for loading machine
//! records from files, strings and directories.
//!
//! Two file formats are understood: the `.tm` text format read by [`crate::parser`] and the
//! serialized `.json` form read by [`MachineRecord::from_json`].

use crate::kind::MachineKind;
use crate::parser::parse;
use crate::record::MachineRecord;
use crate::types::{MachineError, MAX_PROGRAM_SIZE};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of the text format.
pub const TEXT_EXTENSION: &str = "tm";
/// Extension of the serialized format.
pub const JSON_EXTENSION: &str = "json";

/// `ProgramLoader` is a utility struct for loading machine records.
/// It provides methods to load records from individual files, from string content,
/// and to discover and load all machine files within a specified directory.
pub struct ProgramLoader;

impl ProgramLoader {
    /// Loads a single machine record from the specified file path.
    ///
    /// The format is chosen by extension; anything other than `.json` is read as text.
    ///
    /// # Arguments
    ///
    /// * `path` - A reference to the `Path` of the file to load.
    ///
    /// # Returns
    ///
    /// * `Ok(MachineRecord)` if the file is successfully read, parsed and validated.
    /// * `Err(MachineError::FileError)` if the file cannot be read or is too large.
    /// * Any parse, serialization or construction error of the content otherwise.
    pub fn load_program(path: &Path) -> Result<MachineRecord, MachineError> {
        let content = fs::read_to_string(path).map_err(|e| {
            MachineError::FileError(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), bytes = content.len(), "loading machine file");

        if is_json(path) {
            Self::load_json_from_string(&content)
        } else {
            Self::load_program_from_string(&content)
        }
    }

    /// Loads a single machine record from text-format content.
    ///
    /// This is useful for parsing machines that are not stored in files, e.g., from user input.
    ///
    /// # Arguments
    ///
    /// * `content` - A string slice containing the machine definition.
    ///
    /// # Returns
    ///
    /// * `Ok(MachineRecord)` if the content is successfully parsed.
    /// * `Err(MachineError::FileError)` if the content exceeds `MAX_PROGRAM_SIZE`.
    /// * `Err(MachineError::ParseError)` if the content is not a valid machine file.
    pub fn load_program_from_string(content: &str) -> Result<MachineRecord, MachineError> {
        check_size(content)?;
        parse(content)
    }

    /// Loads a single machine record from its serialized form and validates it.
    pub fn load_json_from_string(content: &str) -> Result<MachineRecord, MachineError> {
        check_size(content)?;
        let record = MachineRecord::from_json(content)?;
        MachineKind::from_record(&record)?;

        Ok(record)
    }

    /// Loads all machine files (`.tm` and `.json`) from a given directory.
    ///
    /// It iterates through the directory, attempts to load each machine file, and collects
    /// the results sorted by path. Directories and other files are skipped.
    ///
    /// # Arguments
    ///
    /// * `directory` - A reference to the `Path` of the directory to scan.
    ///
    /// # Returns
    ///
    /// * `Vec<Result<(PathBuf, MachineRecord), MachineError>>` - One element per machine file,
    ///   either its path and record or the error that prevented loading it.
    pub fn load_programs(
        directory: &Path,
    ) -> Vec<Result<(PathBuf, MachineRecord), MachineError>> {
        if !directory.exists() {
            return vec![Err(MachineError::FileError(format!(
                "Directory {} does not exist",
                directory.display()
            )))];
        }

        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) => {
                return vec![Err(MachineError::FileError(format!(
                    "Failed to read directory {}: {}",
                    directory.display(),
                    e
                )))]
            }
        };

        let mut paths = Vec::new();
        let mut results = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => paths.push(entry.path()),
                Err(e) => results.push(Err(MachineError::FileError(format!(
                    "Failed to read directory entry: {}",
                    e
                )))),
            }
        }
        paths.sort();

        results.extend(
            paths
                .into_iter()
                .filter(|path| path.is_file() && is_machine_file(path))
                .map(|path| match Self::load_program(&path) {
                    Ok(record) => Ok((path, record)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping machine file");
                        Err(MachineError::FileError(format!(
                            "Failed to load machine from {}: {}",
                            path.display(),
                            e
                        )))
                    }
                }),
        );

        results
    }
}

fn check_size(content: &str) -> Result<(), MachineError> {
    if content.len() > MAX_PROGRAM_SIZE {
        return Err(MachineError::FileError(format!(
            "Machine file is {} bytes, the limit is {}",
            content.len(),
            MAX_PROGRAM_SIZE
        )));
    }
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == JSON_EXTENSION)
}

fn is_machine_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == TEXT_EXTENSION || ext == JSON_EXTENSION)
}
