//! Condition string ↔ clause chain.
//!
//! The editor works with a flat chain of clauses:
//!
//! ```text
//! selection_a and selection_b or not_admin
//! └ NONE      └ AND            └ OR
//! ```
//!
//! [`decompose`] and [`compose`] convert between the string and the chain;
//! [`parse_clauses`] checks a string against the pest grammar in
//! `condition.pest`. The remaining functions keep a condition in step with
//! selections being renamed or deleted and with clauses being added.

use pest::Parser;
use pest::error::InputLocation;
use pest_derive::Parser;
use thiserror::Error;

use crate::model::{Clause, Operator};

// ---------------------------------------------------------------------------
// Pest parser (generated from condition.pest grammar)
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[grammar = "src/condition.pest"]
struct ConditionParser;

/// A condition string that does not follow `name (operator name)*`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unexpected {found} at column {column}")]
pub struct ConditionSyntaxError {
    /// 1-based column of the offending input.
    pub column: usize,
    /// What was found there, e.g. `'or'`, `extra space`, `end of condition`.
    pub found: String,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a condition strictly, returning its clause chain.
///
/// Unlike [`decompose`], this rejects anything outside the grammar:
/// dangling operators, doubled spaces, names that are not identifiers,
/// keywords used as names.
pub fn parse_clauses(input: &str) -> Result<Vec<Clause>, ConditionSyntaxError> {
    let pairs =
        ConditionParser::parse(Rule::condition, input).map_err(|e| syntax_error(input, &e))?;

    let mut clauses = Vec::new();
    let mut pending = Operator::None;

    // condition = { SOI ~ name ~ (sep ~ operator ~ sep ~ name)* ~ EOI }
    for pair in pairs.flatten() {
        match pair.as_rule() {
            Rule::and_op => pending = Operator::And,
            Rule::or_op => pending = Operator::Or,
            Rule::not_op => pending = Operator::Not,
            Rule::name => {
                clauses.push(Clause::new(pending, pair.as_str()));
                pending = Operator::None;
            }
            _ => {}
        }
    }

    Ok(clauses)
}

/// Split a condition string into clauses.
///
/// Tokens are separated by single spaces: token 0 is the first clause's
/// name, then operators and names alternate. An empty condition yields one
/// clause for the first available name (or an empty name if there is none),
/// so there is always something to edit.
///
/// This never fails. An unrecognised operator token reads as `and`, and a
/// trailing operator yields a clause with an empty name; [`parse_clauses`]
/// is what reports such strings as invalid.
pub fn decompose<S: AsRef<str>>(condition: &str, available: &[S]) -> Vec<Clause> {
    if condition.is_empty() {
        let first = available.first().map(|s| s.as_ref()).unwrap_or_default();
        return vec![Clause::first(first)];
    }

    let mut tokens = condition.split(' ');
    let mut clauses = vec![Clause::first(tokens.next().unwrap_or_default())];

    while let Some(op) = tokens.next() {
        let operator = Operator::from_keyword(op).unwrap_or_else(|| {
            log::debug!("unrecognised operator '{op}' in condition, reading it as 'and'");
            Operator::And
        });
        clauses.push(Clause::new(operator, tokens.next().unwrap_or_default()));
    }

    clauses
}

/// Join clauses back into a condition string.
///
/// The first clause contributes its name only; every later clause
/// contributes `<operator> <name>`. A later clause carrying
/// [`Operator::None`] is written with `and`.
pub fn compose(clauses: &[Clause]) -> String {
    let mut out = String::new();
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            out.push(' ');
            out.push_str(clause.operator.keyword().unwrap_or("and"));
            out.push(' ');
        }
        out.push_str(&clause.selection_name);
    }
    out
}

/// Selection names not yet referenced by any clause, in selection order.
pub fn available_names<S: AsRef<str>>(all: &[S], clauses: &[Clause]) -> Vec<String> {
    all.iter()
        .map(|s| s.as_ref())
        .filter(|name| !clauses.iter().any(|c| c.selection_name == *name))
        .map(str::to_string)
        .collect()
}

/// `true` when `name` can stand in a name position of a condition: an
/// identifier that is not an operator keyword.
pub fn is_selection_token(name: &str) -> bool {
    ConditionParser::parse(Rule::name, name)
        .ok()
        .and_then(|mut pairs| pairs.next())
        .is_some_and(|pair| pair.as_str().len() == name.len())
}

/// Rewrite every reference to `old` as `new`.
///
/// Only name positions are touched, so operators and any malformed parts of
/// the string are left exactly as they were.
pub fn rename_selection(condition: &str, old: &str, new: &str) -> String {
    if condition.is_empty() {
        return String::new();
    }
    condition
        .split(' ')
        .enumerate()
        .map(|(i, token)| if i % 2 == 0 && token == old { new } else { token })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop every clause referencing `name` and recompose.
///
/// When the first clause goes, the next one takes its place and loses its
/// operator, so the result never starts or ends with a dangling connective.
pub fn remove_selection(condition: &str, name: &str) -> String {
    if condition.is_empty() {
        return String::new();
    }
    let clauses = decompose::<&str>(condition, &[]);
    if !clauses.iter().any(|c| c.selection_name == name) {
        return condition.to_string();
    }
    let kept: Vec<Clause> = clauses
        .into_iter()
        .filter(|c| c.selection_name != name)
        .collect();
    compose(&normalize(kept))
}

/// Append a clause for the first selection name not already in use.
///
/// Returns `None` when every selection is already referenced.
pub fn append_clause<S: AsRef<str>>(
    clauses: &[Clause],
    all_names: &[S],
    operator: Operator,
) -> Option<Vec<Clause>> {
    let name = available_names(all_names, clauses).into_iter().next()?;
    let mut next = clauses.to_vec();
    let operator = if next.is_empty() {
        Operator::None
    } else {
        operator
    };
    next.push(Clause::new(operator, name));
    Some(normalize(next))
}

/// Remove the clause at `index`, promoting the next clause if it was first.
pub fn remove_clause(clauses: &[Clause], index: usize) -> Vec<Clause> {
    let mut next = clauses.to_vec();
    if index < next.len() {
        next.remove(index);
    }
    normalize(next)
}

/// Enforce the chain shape: the first clause carries `NONE`, later clauses
/// carry a real connective.
pub fn normalize(mut clauses: Vec<Clause>) -> Vec<Clause> {
    for (i, clause) in clauses.iter_mut().enumerate() {
        if i == 0 {
            clause.operator = Operator::None;
        } else if clause.operator == Operator::None {
            clause.operator = Operator::And;
        }
    }
    clauses
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn syntax_error(input: &str, e: &pest::error::Error<Rule>) -> ConditionSyntaxError {
    let position = match e.location {
        InputLocation::Pos(p) => p,
        InputLocation::Span((start, _)) => start,
    };
    let rest = input.get(position..).unwrap_or_default();

    let found = if rest.is_empty() {
        "end of condition".to_string()
    } else if rest.starts_with(' ') {
        "extra space".to_string()
    } else {
        format!("'{}'", rest.split(' ').next().unwrap_or(rest))
    };

    ConditionSyntaxError {
        column: input[..position.min(input.len())].chars().count() + 1,
        found,
    }
}

// =============================================================================
// Tests
// =============================================================================
