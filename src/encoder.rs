//! This module provides the track encoding that packs the cells of several tapes into one
//! combined symbol, used to reduce a multi-tape machine to a single tape.

use crate::types::{MachineError, Symbol};
use std::collections::BTreeSet;

/// Separators tried in order when combining track symbols.
pub const SEPARATOR_CANDIDATES: [&str; 8] = ["|", "#", ";", "/", "^", "~", "+", "%"];

/// Picks the first separator that does not occur in any symbol of any alphabet.
///
/// A candidate is rejected if it is a symbol or appears inside a multi-character symbol, so a
/// combined symbol always splits back into its tracks.
///
/// # Arguments
///
/// * `alphabets` - The per-tape alphabets.
///
/// # Returns
///
/// * `Result<Symbol, MachineError>` - The separator, or a `Conversion` error if every
///   candidate collides.
pub fn choose_separator(alphabets: &[BTreeSet<Symbol>]) -> Result<Symbol, MachineError> {
    SEPARATOR_CANDIDATES
        .iter()
        .find(|candidate| {
            alphabets
                .iter()
                .flatten()
                .all(|symbol| !symbol.contains(**candidate))
        })
        .map(|candidate| candidate.to_string())
        .ok_or_else(|| {
            MachineError::Conversion(format!(
                "every separator candidate {SEPARATOR_CANDIDATES:?} occurs in a tape alphabet"
            ))
        })
}

/// Joins one symbol per track into a combined symbol.
pub fn encode_track<S: AsRef<str>>(symbols: &[S], separator: &str) -> Symbol {
    symbols
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Splits a combined symbol back into its tracks.
pub fn decode_track(symbol: &str, separator: &str) -> Vec<Symbol> {
    symbol.split(separator).map(str::to_string).collect()
}

/// Combines several tapes cell by cell.
///
/// Shorter tapes are padded with their own blank so every cell carries one symbol per track.
/// All tapes empty yields an empty tape.
///
/// # Arguments
///
/// * `tapes` - The contents of each tape, starting at position 0.
/// * `blanks` - The blank of each tape.
/// * `separator` - The separator chosen by [`choose_separator`].
pub fn encode_tapes(tapes: &[Vec<Symbol>], blanks: &[Symbol], separator: &str) -> Vec<Symbol> {
    let length = tapes.iter().map(Vec::len).max().unwrap_or(0);

    (0..length)
        .map(|position| {
            let column: Vec<&str> = tapes
                .iter()
                .zip(blanks)
                .map(|(tape, blank)| tape.get(position).unwrap_or(blank).as_str())
                .collect();
            encode_track(&column, separator)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alphabet(symbols: &[&str]) -> BTreeSet<Symbol> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_choose_separator() {
        let separator = choose_separator(&[alphabet(&["0", "1", "_"]), alphabet(&["a"])]);
        assert_eq!(separator, Ok("|".to_string()));
    }

    #[test]
    fn test_choose_separator_skips_collisions() {
        let separator = choose_separator(&[alphabet(&["|", "a"]), alphabet(&["x#y"])]);
        assert_eq!(separator, Ok(";".to_string()));
    }

    #[test]
    fn test_choose_separator_exhausted() {
        let everything = alphabet(&SEPARATOR_CANDIDATES);
        let error = choose_separator(&[everything]).unwrap_err();

        assert!(matches!(error, MachineError::Conversion(_)));
    }

    #[test]
    fn test_encode_and_decode_track() {
        let combined = encode_track(&["1", "_", "ab"], "|");

        assert_eq!(combined, "1|_|ab");
        assert_eq!(decode_track(&combined, "|"), vec!["1", "_", "ab"]);
    }

    #[test]
    fn test_encode_tapes_pads_with_blanks() {
        let tapes = vec![
            vec!["1".to_string(), "0".to_string(), "1".to_string()],
            vec![],
        ];
        let blanks = vec!["_".to_string(), "B".to_string()];

        let encoded = encode_tapes(&tapes, &blanks, "|");

        assert_eq!(encoded, vec!["1|B", "0|B", "1|B"]);
        assert!(encode_tapes(&[vec![], vec![]], &blanks, "|").is_empty());
    }
}
