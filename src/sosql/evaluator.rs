//! Tristate predicate evaluation
//!
//! The same [`evaluate`] runs twice per port: once before any socket is
//! opened, where protocol columns are [`Tristate::Unknown`], and once inside
//! the scan job after the probe has filled them in.

use crate::environment::{ScanOutcome, ScanResults};
use crate::sosql::ast::{BetweenExpr, ComparisonExpr, Expression, Terminal};
use crate::sosql::tristate::Tristate;

/// Values terminals resolve against for one port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bindings {
    port: u16,
    results: Option<ScanResults>,
}

/// A resolved terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Port(u16),
    Outcome(ScanOutcome),
}

impl Bindings {
    /// Static knowledge only: the candidate port and literals
    pub fn pre_network(port: u16) -> Self {
        Self {
            port,
            results: None,
        }
    }

    /// Candidate port plus live probe results
    pub fn probed(port: u16, results: ScanResults) -> Self {
        Self {
            port,
            results: Some(results),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn results(&self) -> Option<&ScanResults> {
        self.results.as_ref()
    }

    fn resolve(&self, terminal: &Terminal) -> Option<Value> {
        match terminal {
            Terminal::NumericLiteral(n) => Some(Value::Port(*n)),
            Terminal::PortColumn => Some(Value::Port(self.port)),
            Terminal::QueryResultLiteral(outcome) => Some(Value::Outcome(*outcome)),
            Terminal::ProtocolColumn(protocol) => self
                .results
                .and_then(|results| results.get(*protocol))
                .map(Value::Outcome),
        }
    }
}

/// Evaluate an expression under Kleene logic
///
/// A definite False on the left of AND (True on the left of OR) skips the
/// right branch entirely.
pub fn evaluate(expression: &Expression, bindings: &Bindings) -> Tristate {
    match expression {
        Expression::Null => Tristate::True,
        Expression::Not(inner) => !evaluate(inner, bindings),
        Expression::And(left, right) => match evaluate(left, bindings) {
            Tristate::False => Tristate::False,
            lhs => lhs & evaluate(right, bindings),
        },
        Expression::Or(left, right) => match evaluate(left, bindings) {
            Tristate::True => Tristate::True,
            lhs => lhs | evaluate(right, bindings),
        },
        Expression::Comparison(comparison) => evaluate_comparison(comparison, bindings),
        Expression::Between(between) => evaluate_between(between, bindings),
    }
}

fn evaluate_comparison(comparison: &ComparisonExpr, bindings: &Bindings) -> Tristate {
    let (Some(lhs), Some(rhs)) = (
        bindings.resolve(comparison.lhs()),
        bindings.resolve(comparison.rhs()),
    ) else {
        return Tristate::Unknown;
    };

    let op = comparison.op();
    match (lhs, rhs) {
        (Value::Port(a), Value::Port(b)) => op.compare(a, b).into(),
        (Value::Outcome(a), Value::Outcome(b)) => op.compare(a, b).into(),
        // construction rules out mixed operands
        _ => Tristate::False,
    }
}

fn evaluate_between(between: &BetweenExpr, bindings: &Bindings) -> Tristate {
    match bindings.resolve(between.terminal()) {
        Some(Value::Port(v)) => (between.lower() <= v && v <= between.upper()).into(),
        Some(Value::Outcome(_)) => Tristate::False,
        None => Tristate::Unknown,
    }
}
