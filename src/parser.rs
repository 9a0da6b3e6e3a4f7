//! This module provides the parser for `.tm` machine files, utilizing the `pest` crate.
//! It turns the text format defined in `grammar.pest` into a `MachineRecord`.

use crate::{
    kind::MachineKind,
    record::{MachineRecord, MultiTapeRecord, NonDeterministicRecord, SingleTapeRecord},
    types::{Direction, MachineError, State, Symbol, DEFAULT_BLANK_SYMBOL, INPUT_BLANK_SYMBOL},
};
use pest::{
    error::{Error, ErrorVariant},
    iterators::{Pair, Pairs},
    Parser as PestParser, Span,
};
use pest_derive::Parser as PestParser;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Derives a `PestParser` for the machine grammar defined in `grammar.pest`.
#[derive(PestParser)]
#[grammar = "grammar.pest"]
pub struct MachineParser;

/// Parses the given input string into a `MachineRecord`.
///
/// This is the main entry point for reading machine files. The first rule block names the
/// initial state, states and alphabets not declared in the header are inferred from the rules,
/// and `_` in a rule stands for the blank of its tape. When `kind:` is omitted it is inferred:
/// tuple actions make a multi-tape machine, weights or repeated keys a non-deterministic one,
/// and anything else a deterministic one. The record is validated by building the machine
/// before it is returned.
///
/// # Arguments
///
/// * `input` - A string slice containing the machine definition.
///
/// # Returns
///
/// * `Ok(MachineRecord)` if the input is successfully parsed and validated.
/// * `Err(MachineError::ParseError)` if there are any syntax errors.
/// * Any construction error of the described machine otherwise.
pub fn parse(input: &str) -> Result<MachineRecord, MachineError> {
    let root = MachineParser::parse(Rule::program, input.trim())
        .map_err(Box::new)?
        .next()
        .ok_or_else(|| MachineError::InvalidInput("empty machine file".into()))?;

    let record = parse_program(root)?;

    MachineKind::from_record(&record)?;

    Ok(record)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Single,
    Deterministic,
    NonDeterministic,
    MultiTape,
}

/// Everything read from the file before the machine kind is settled.
struct Draft<'i> {
    name: Option<String>,
    blank: Option<Symbol>,
    blanks: Option<Vec<Symbol>>,
    alphabet: Option<BTreeSet<Symbol>>,
    accept: BTreeSet<State>,
    reject: BTreeSet<State>,
    blocks: Vec<Block<'i>>,
    rules_span: Span<'i>,
}

struct Block<'i> {
    state: State,
    actions: Vec<ParsedAction<'i>>,
}

/// A helper struct to temporarily hold one parsed action, single-tape actions as 1-tuples.
struct ParsedAction<'i> {
    read: Vec<Symbol>,
    write: Vec<Symbol>,
    directions: Vec<Direction>,
    next: State,
    weight: Option<f64>,
    tuple: bool,
    span: Span<'i>,
}

/// Parses the top-level structure of a machine file from a `Pair<Rule::program>`.
///
/// It collects the header sections and rule blocks, checks uniqueness of sections, and then
/// builds the record for the declared or inferred kind.
fn parse_program(pair: Pair<Rule>) -> Result<MachineRecord, MachineError> {
    let program_span = pair.as_span();
    let mut kind: Option<Kind> = None;
    let mut rules: Option<(Vec<Block>, Span)> = None;
    let mut draft_name = None;
    let mut blank = None;
    let mut blanks = None;
    let mut alphabet = None;
    let mut accept = BTreeSet::new();
    let mut reject = BTreeSet::new();
    let mut seen = HashSet::new();

    for p in pair.into_inner() {
        let span = p.as_span();
        let rule = p.as_rule();

        check_unique_rule(rule, span, &mut seen)?;

        match rule {
            Rule::name => draft_name = Some(first_inner(p)?.as_str().trim().to_string()),
            Rule::kind => kind = Some(parse_kind(first_inner(p)?)?),
            Rule::blank => {
                check_exclusive_rule(blanks.as_ref(), &["blank", "blanks"], span)?;
                blank = Some(parse_symbol(first_inner(p)?.as_str()));
            }
            Rule::blanks => {
                check_exclusive_rule(blank.as_ref(), &["blank", "blanks"], span)?;
                blanks = Some(parse_symbols(first_inner(p)?));
            }
            Rule::alphabet => alphabet = Some(parse_symbols(first_inner(p)?).into_iter().collect()),
            Rule::accept => accept = parse_states(first_inner(p)?),
            Rule::reject => reject = parse_states(first_inner(p)?),
            Rule::rules => rules = Some((parse_blocks(p)?, span)),
            _ => {} // Skip EOI
        }
    }

    let (blocks, rules_span) =
        rules.ok_or_else(|| parse_error("Missing 'rules' section", program_span))?;
    let draft = Draft {
        name: draft_name,
        blank,
        blanks,
        alphabet,
        accept,
        reject,
        blocks,
        rules_span,
    };
    let kind = kind.unwrap_or_else(|| infer_kind(&draft));

    match kind {
        Kind::Single => Ok(MachineRecord::Single(single_tape_record(&draft)?)),
        Kind::Deterministic => Ok(MachineRecord::Deterministic(single_tape_record(&draft)?)),
        Kind::NonDeterministic => Ok(MachineRecord::NonDeterministic(
            non_deterministic_record(&draft)?,
        )),
        Kind::MultiTape => Ok(MachineRecord::MultiTape(multi_tape_record(&draft)?)),
    }
}

/// Parses the `kind:` value.
fn parse_kind(pair: Pair<Rule>) -> Result<Kind, MachineError> {
    match pair.as_str() {
        "single" => Ok(Kind::Single),
        "deterministic" => Ok(Kind::Deterministic),
        "nondeterministic" => Ok(Kind::NonDeterministic),
        "multitape" => Ok(Kind::MultiTape),
        other => Err(parse_error(
            &format!("Unsupported kind: {other}"),
            pair.as_span(),
        )),
    }
}

fn infer_kind(draft: &Draft) -> Kind {
    let actions = || draft.blocks.iter().flat_map(|b| &b.actions);

    if draft.blanks.is_some() || actions().any(|a| a.tuple) {
        return Kind::MultiTape;
    }

    let mut keys = HashSet::new();
    let repeated = draft.blocks.iter().any(|block| {
        block
            .actions
            .iter()
            .any(|a| !keys.insert((block.state.as_str(), a.read.as_slice())))
    });
    if repeated || actions().any(|a| a.weight.is_some()) {
        Kind::NonDeterministic
    } else {
        Kind::Deterministic
    }
}

/// Parses the rule blocks from a `Pair<Rule::rules>`.
///
/// It also checks for duplicate blocks for the same state.
fn parse_blocks(pair: Pair<Rule>) -> Result<Vec<Block>, MachineError> {
    let mut blocks: Vec<Block> = Vec::new();

    for block_pair in pair.into_inner() {
        let span = block_pair.as_span();
        let mut pairs = block_pair.into_inner();
        let state = next_pair(&mut pairs, span)?.as_str().to_string();

        // Prevent duplicated transition rule
        if blocks.iter().any(|b| b.state == state) {
            return Err(parse_error(
                &format!("Duplicate transition rule: {state}"),
                span,
            ));
        }

        let actions = pairs
            .filter(|p| p.as_rule() == Rule::action)
            .map(parse_action)
            .collect::<Result<Vec<_>, _>>()?;

        blocks.push(Block { state, actions });
    }

    Ok(blocks)
}

/// Parses one action with its optional weight from a `Pair<Rule::action>`.
fn parse_action(pair: Pair<Rule>) -> Result<ParsedAction, MachineError> {
    let span = pair.as_span();
    let mut action = None;
    let mut weight = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::single_tape_action => action = Some(parse_single_tape_action(inner, span)?),
            Rule::multi_tape_action => action = Some(parse_multi_tape_action(inner, span)?),
            Rule::weight => weight = Some(parse_weight(first_inner(inner)?)?),
            _ => {}
        }
    }

    let mut action = action.ok_or_else(|| parse_error("Empty action", span))?;
    action.weight = weight;
    Ok(action)
}

/// Parses a single-tape action from a `Pair<Rule::single_tape_action>`.
///
/// The write symbol defaults to the read symbol if omitted.
fn parse_single_tape_action<'i>(
    pair: Pair<'i, Rule>,
    span: Span<'i>,
) -> Result<ParsedAction<'i>, MachineError> {
    let mut pairs = pair.into_inner();
    let read = parse_symbol(next_pair(&mut pairs, span)?.as_str());

    // If `write` is omitted, we'll make `write` equal to `read`
    let write = match pairs.peek().map(|p| p.as_rule()) {
        Some(Rule::direction) => read.clone(),
        _ => parse_symbol(next_pair(&mut pairs, span)?.as_str()),
    };

    let direction = parse_direction(next_pair(&mut pairs, span)?)?;
    let next = next_pair(&mut pairs, span)?.as_str().to_string();

    Ok(ParsedAction {
        read: vec![read],
        write: vec![write],
        directions: vec![direction],
        next,
        weight: None,
        tuple: false,
        span,
    })
}

/// Parses a multi-tape action from a `Pair<Rule::multi_tape_action>`.
///
/// It validates that the number of read symbols, write symbols, and directions are consistent.
fn parse_multi_tape_action<'i>(
    pair: Pair<'i, Rule>,
    span: Span<'i>,
) -> Result<ParsedAction<'i>, MachineError> {
    let mut pairs = pair.into_inner();

    let read = parse_symbols(next_pair(&mut pairs, span)?);
    let write = parse_symbols(next_pair(&mut pairs, span)?);
    let directions = parse_directions(next_pair(&mut pairs, span)?)?;
    let next = next_pair(&mut pairs, span)?.as_str().to_string();

    // Validate that all arrays have the same length
    if read.len() != write.len() || read.len() != directions.len() {
        return Err(parse_error(
            &format!(
                "Inconsistent multi-tape action: read={}, write={}, directions={}",
                read.len(),
                write.len(),
                directions.len()
            ),
            span,
        ));
    }

    Ok(ParsedAction {
        read,
        write,
        directions,
        next,
        weight: None,
        tuple: true,
        span,
    })
}

/// Builds a `TM` or `DTM` record. Keys must be unique.
fn single_tape_record(draft: &Draft) -> Result<SingleTapeRecord, MachineError> {
    let blank = draft.blank.clone().unwrap_or_else(|| DEFAULT_BLANK_SYMBOL.to_string());
    let mut symbols = BTreeSet::new();
    let mut transitions = BTreeMap::new();

    for (state, action) in actions(draft) {
        if action.weight.is_some() {
            return Err(parse_error(
                "Weights are only allowed in nondeterministic machines",
                action.span,
            ));
        }
        let (read, write, direction) = single(action, &blank)?;
        symbols.extend([read.clone(), write.clone()]);

        let key = format!("{state},{read}");
        if transitions.contains_key(&key) {
            return Err(parse_error(
                &format!("Duplicate transition for ({state}, {read})"),
                action.span,
            ));
        }
        transitions.insert(key, (action.next.clone(), write, direction));
    }

    let (alphabet, tape_alphabet) = alphabets(draft, symbols, &blank);
    Ok(SingleTapeRecord {
        name: draft.name.clone(),
        states: states(draft),
        alphabet,
        tape_alphabet,
        transitions,
        initial_state: initial_state(draft)?,
        accept_states: draft.accept.clone(),
        reject_states: draft.reject.clone(),
        blank_symbol: blank,
    })
}

/// Builds an `NTM` record. Actions without a weight weigh 1.
fn non_deterministic_record(draft: &Draft) -> Result<NonDeterministicRecord, MachineError> {
    let blank = draft.blank.clone().unwrap_or_else(|| DEFAULT_BLANK_SYMBOL.to_string());
    let mut symbols = BTreeSet::new();
    let mut transitions: BTreeMap<String, Vec<_>> = BTreeMap::new();

    for (state, action) in actions(draft) {
        let (read, write, direction) = single(action, &blank)?;
        symbols.extend([read.clone(), write.clone()]);

        transitions.entry(format!("{state},{read}")).or_default().push((
            action.next.clone(),
            write,
            direction,
            action.weight.unwrap_or(1.0),
        ));
    }

    let (alphabet, tape_alphabet) = alphabets(draft, symbols, &blank);
    Ok(NonDeterministicRecord {
        name: draft.name.clone(),
        states: states(draft),
        alphabet,
        tape_alphabet,
        transitions,
        initial_state: initial_state(draft)?,
        accept_states: draft.accept.clone(),
        reject_states: draft.reject.clone(),
        blank_symbol: blank,
    })
}

/// Builds a `MultiTapeTM` record.
///
/// The tape count comes from `blanks:` or else from the first tuple action; every action must
/// use that many tracks.
fn multi_tape_record(draft: &Draft) -> Result<MultiTapeRecord, MachineError> {
    let k = draft
        .blanks
        .as_ref()
        .map(Vec::len)
        .or_else(|| actions(draft).map(|(_, a)| a.read.len()).next())
        .ok_or_else(|| {
            parse_error(
                "Cannot infer the tape count: declare 'blanks' or add a rule",
                draft.rules_span,
            )
        })?;
    let blanks = draft.blanks.clone().unwrap_or_else(|| {
        vec![
            draft.blank.clone().unwrap_or_else(|| DEFAULT_BLANK_SYMBOL.to_string());
            k
        ]
    });

    let mut tape_alphabets = vec![BTreeSet::new(); k];
    let mut transitions = BTreeMap::new();

    for (state, action) in actions(draft) {
        if action.weight.is_some() {
            return Err(parse_error(
                "Weights are only allowed in nondeterministic machines",
                action.span,
            ));
        }
        if action.read.len() != k {
            return Err(parse_error(
                &format!("Expected {k} symbols per tuple, found {}", action.read.len()),
                action.span,
            ));
        }

        let read: Vec<Symbol> = action.read.iter().zip(&blanks).map(|(s, b)| resolve(s, b)).collect();
        let write: Vec<Symbol> = action.write.iter().zip(&blanks).map(|(s, b)| resolve(s, b)).collect();
        for ((alphabet, r), w) in tape_alphabets.iter_mut().zip(&read).zip(&write) {
            alphabet.extend([r.clone(), w.clone()]);
        }

        let key = format!("{state},{}", read.join(","));
        if transitions.contains_key(&key) {
            return Err(parse_error(
                &format!("Duplicate transition for ({state}, [{}])", read.join(", ")),
                action.span,
            ));
        }
        transitions.insert(key, (action.next.clone(), write, action.directions.clone()));
    }

    let alphabet = draft.alphabet.clone().unwrap_or_else(|| {
        tape_alphabets
            .first()
            .zip(blanks.first())
            .map(|(symbols, blank)| symbols.iter().filter(|s| *s != blank).cloned().collect())
            .unwrap_or_default()
    });
    if let Some(first) = tape_alphabets.first_mut() {
        first.extend(alphabet.iter().cloned());
    }
    for (symbols, blank) in tape_alphabets.iter_mut().zip(&blanks) {
        symbols.insert(blank.clone());
    }

    Ok(MultiTapeRecord {
        name: draft.name.clone(),
        states: states(draft),
        alphabet,
        tape_alphabet: tape_alphabets.iter().flatten().cloned().collect(),
        tape_alphabets,
        transitions,
        initial_state: initial_state(draft)?,
        accept_states: draft.accept.clone(),
        reject_states: draft.reject.clone(),
        blank_symbols: blanks,
    })
}

/// Every action with the state of its block, in file order.
fn actions<'d, 'i>(draft: &'d Draft<'i>) -> impl Iterator<Item = (&'d str, &'d ParsedAction<'i>)> {
    draft.blocks.iter().flat_map(|block| {
        block
            .actions
            .iter()
            .map(move |action| (block.state.as_str(), action))
    })
}

/// Unpacks a 1-tuple action, resolving `_` to `blank`.
fn single(action: &ParsedAction, blank: &str) -> Result<(Symbol, Symbol, Direction), MachineError> {
    match (&action.read[..], &action.write[..], &action.directions[..]) {
        ([read], [write], [direction]) => Ok((resolve(read, blank), resolve(write, blank), *direction)),
        _ => Err(parse_error(
            "Multi-tape action in a single-tape machine",
            action.span,
        )),
    }
}

/// Declared or inferred input alphabet, and the tape alphabet around it.
fn alphabets(
    draft: &Draft,
    symbols: BTreeSet<Symbol>,
    blank: &str,
) -> (BTreeSet<Symbol>, BTreeSet<Symbol>) {
    let alphabet: BTreeSet<Symbol> = draft
        .alphabet
        .clone()
        .unwrap_or_else(|| symbols.iter().filter(|s| *s != blank).cloned().collect());

    let mut tape_alphabet = symbols;
    tape_alphabet.extend(alphabet.iter().cloned());
    tape_alphabet.insert(blank.to_string());

    (alphabet, tape_alphabet)
}

/// Every state named by a block, an action or a halting list.
fn states(draft: &Draft) -> BTreeSet<State> {
    draft
        .blocks
        .iter()
        .map(|block| block.state.clone())
        .chain(actions(draft).map(|(_, action)| action.next.clone()))
        .chain(draft.accept.iter().cloned())
        .chain(draft.reject.iter().cloned())
        .collect()
}

/// The state of the first rule block.
fn initial_state(draft: &Draft) -> Result<State, MachineError> {
    draft
        .blocks
        .first()
        .map(|block| block.state.clone())
        .ok_or_else(|| parse_error("Missing initial state", draft.rules_span))
}

/// Replaces `INPUT_BLANK_SYMBOL` with the tape's blank.
fn resolve(symbol: &str, blank: &str) -> Symbol {
    if symbol == INPUT_BLANK_SYMBOL {
        blank.to_string()
    } else {
        symbol.to_string()
    }
}

/// Creates a `MachineError::ParseError` from a message and a `Span`.
fn parse_error(msg: &str, span: Span) -> MachineError {
    MachineError::ParseError(Box::new(Error::new_from_span(
        ErrorVariant::CustomError {
            message: msg.to_string(),
        },
        span,
    )))
}

/// Parses a list of symbols from a `Pair<Rule::symbol_list>`.
fn parse_symbols(pair: Pair<Rule>) -> Vec<Symbol> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::symbol)
        .map(|p| parse_symbol(p.as_str()))
        .collect()
}

/// Parses a list of states from a `Pair<Rule::state_list>`.
fn parse_states(pair: Pair<Rule>) -> BTreeSet<State> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::state)
        .map(|p| p.as_str().to_string())
        .collect()
}

/// Parses a list of directions from a `Pair<Rule::direction_list>`.
fn parse_directions(pair: Pair<Rule>) -> Result<Vec<Direction>, MachineError> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::direction)
        .map(parse_direction)
        .collect()
}

/// Parses a single direction from a `Pair<Rule::direction>`.
///
/// Supports '<' or 'L' for Left, '>' or 'R' for Right, and '-' or 'S' for Stay.
fn parse_direction(pair: Pair<Rule>) -> Result<Direction, MachineError> {
    let span = pair.as_span();
    match pair.as_str() {
        "<" | "L" => Ok(Direction::Left),
        ">" | "R" => Ok(Direction::Right),
        "-" | "S" => Ok(Direction::Stay),
        _ => Err(parse_error(
            &format!("Unsupported direction: {}", pair.as_str()),
            span,
        )),
    }
}

/// Parses a weight from a `Pair<Rule::number>`.
fn parse_weight(pair: Pair<Rule>) -> Result<f64, MachineError> {
    pair.as_str().parse::<f64>().map_err(|_| {
        parse_error(
            &format!("Invalid weight: {}", pair.as_str()),
            pair.as_span(),
        )
    })
}

/// Parses a symbol from a string, removing the quotes of a quoted symbol.
fn parse_symbol(input: &str) -> Symbol {
    input
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(input)
        .to_string()
}

/// The first inner pair of `pair`.
fn first_inner(pair: Pair<Rule>) -> Result<Pair<Rule>, MachineError> {
    let span = pair.as_span();
    pair.into_inner()
        .next()
        .ok_or_else(|| parse_error("Missing value", span))
}

/// The next pair of a rule whose shape the grammar guarantees.
fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, span: Span<'i>) -> Result<Pair<'i, Rule>, MachineError> {
    pairs
        .next()
        .ok_or_else(|| parse_error("Unexpected end of rule", span))
}

/// Checks if a given rule has already been declared, ensuring uniqueness for top-level sections.
fn check_unique_rule(rule: Rule, span: Span, seen: &mut HashSet<Rule>) -> Result<(), MachineError> {
    if !matches!(
        rule,
        Rule::name
            | Rule::kind
            | Rule::blank
            | Rule::blanks
            | Rule::alphabet
            | Rule::accept
            | Rule::reject
            | Rule::rules
    ) {
        return Ok(());
    };

    if !seen.insert(rule) {
        return Err(parse_error(
            &format!("Duplicate \"{rule:?}:\" declaration"),
            span,
        ));
    }

    Ok(())
}

/// Checks if an exclusive rule (e.g., `blank` vs. `blanks`) has been violated.
fn check_exclusive_rule<T>(value: Option<T>, names: &[&str], span: Span) -> Result<(), MachineError> {
    if value.is_some() {
        return Err(parse_error(
            &format!("Only one of {} is allowed", format_rules(names)),
            span,
        ));
    }

    Ok(())
}

/// Formats a list of rule names into a human-readable string for error messages.
fn format_rules(names: &[&str]) -> String {
    names
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(" or ")
}
