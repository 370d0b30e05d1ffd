//! Abstract Syntax Tree for SOSQL statements

use crate::environment::{Protocol, ScanOutcome};
use crate::error::{PortQueryError, Result};
use crate::sosql::token::{Column, ComparisonOp};
use smallvec::SmallVec;
use std::fmt;

// ============================================================================
// Terminals
// ============================================================================

/// Semantic type a terminal resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// A value in 0..=65535, compared numerically
    PortSpace,
    /// OPEN / CLOSED / REJECTED
    QueryResult,
}

/// Leaf operand of a comparison or BETWEEN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    NumericLiteral(u16),
    /// The port under evaluation
    PortColumn,
    /// A live probe result, never known before the network is touched
    ProtocolColumn(Protocol),
    QueryResultLiteral(ScanOutcome),
}

/// Terminal kinds, the axes of the comparison compatibility table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    NumericLiteral,
    PortColumn,
    ProtocolColumn,
    QueryResultLiteral,
}

impl TerminalKind {
    pub fn name(self) -> &'static str {
        match self {
            TerminalKind::NumericLiteral => "numeric literal",
            TerminalKind::PortColumn => "PORT column",
            TerminalKind::ProtocolColumn => "protocol column",
            TerminalKind::QueryResultLiteral => "query result literal",
        }
    }
}

impl Terminal {
    /// Terminal for a column reference
    pub fn from_column(column: Column) -> Self {
        match column.protocol() {
            Some(protocol) => Terminal::ProtocolColumn(protocol),
            None => Terminal::PortColumn,
        }
    }

    pub fn kind(&self) -> TerminalKind {
        match self {
            Terminal::NumericLiteral(_) => TerminalKind::NumericLiteral,
            Terminal::PortColumn => TerminalKind::PortColumn,
            Terminal::ProtocolColumn(_) => TerminalKind::ProtocolColumn,
            Terminal::QueryResultLiteral(_) => TerminalKind::QueryResultLiteral,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Terminal::NumericLiteral(_) | Terminal::PortColumn => ValueType::PortSpace,
            Terminal::ProtocolColumn(_) | Terminal::QueryResultLiteral(_) => ValueType::QueryResult,
        }
    }

    /// Whether the value is known without probing the network
    #[inline]
    pub fn available_pre_network(&self) -> bool {
        !matches!(self, Terminal::ProtocolColumn(_))
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::NumericLiteral(n) => write!(f, "{}", n),
            Terminal::PortColumn => f.write_str("PORT"),
            Terminal::ProtocolColumn(p) => write!(f, "{}", p),
            Terminal::QueryResultLiteral(r) => write!(f, "{}", r),
        }
    }
}

const PORT_SPACE_OPERATORS: &[ComparisonOp] = &ComparisonOp::ALL;
const EQUALITY_OPERATORS: &[ComparisonOp] = &[ComparisonOp::Eq, ComparisonOp::Ne];

/// Operators allowed between two terminal kinds
///
/// An empty slice means the kinds can never be compared.
pub fn allowed_operators(lhs: TerminalKind, rhs: TerminalKind) -> &'static [ComparisonOp] {
    use TerminalKind::*;
    match (lhs, rhs) {
        (NumericLiteral | PortColumn, NumericLiteral | PortColumn) => PORT_SPACE_OPERATORS,
        (ProtocolColumn, QueryResultLiteral)
        | (QueryResultLiteral, ProtocolColumn)
        | (QueryResultLiteral, QueryResultLiteral) => EQUALITY_OPERATORS,
        _ => &[],
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// Binary predicate over two terminals, validated at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonExpr {
    op: ComparisonOp,
    lhs: Terminal,
    rhs: Terminal,
}

impl ComparisonExpr {
    pub fn new(op: ComparisonOp, lhs: Terminal, rhs: Terminal) -> Result<Self> {
        if !allowed_operators(lhs.kind(), rhs.kind()).contains(&op) {
            return Err(PortQueryError::parse(format!(
                "Type mismatch: cannot compare {} '{}' with {} '{}' using '{}'",
                lhs.kind().name(),
                lhs,
                rhs.kind().name(),
                rhs,
                op.symbol()
            )));
        }
        Ok(Self { op, lhs, rhs })
    }

    pub fn op(&self) -> ComparisonOp {
        self.op
    }

    pub fn lhs(&self) -> &Terminal {
        &self.lhs
    }

    pub fn rhs(&self) -> &Terminal {
        &self.rhs
    }
}

/// Inclusive range predicate `terminal BETWEEN lower AND upper`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetweenExpr {
    terminal: Terminal,
    lower: u16,
    upper: u16,
}

impl BetweenExpr {
    pub fn new(terminal: Terminal, lower: u16, upper: u16) -> Result<Self> {
        if terminal.value_type() != ValueType::PortSpace {
            return Err(PortQueryError::parse(format!(
                "Type mismatch: BETWEEN needs a PORT column or numeric literal, found {} '{}'",
                terminal.kind().name(),
                terminal
            )));
        }
        Ok(Self {
            terminal,
            lower,
            upper,
        })
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub fn lower(&self) -> u16 {
        self.lower
    }

    pub fn upper(&self) -> u16 {
        self.upper
    }
}

/// Boolean expression tree; each node owns its children
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Or(Box<Expression>, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    Comparison(ComparisonExpr),
    Between(BetweenExpr),
    /// No WHERE clause
    Null,
}

impl Expression {
    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Or(Box::new(left), Box::new(right))
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::And(Box::new(left), Box::new(right))
    }

    pub fn negate(inner: Expression) -> Self {
        Expression::Not(Box::new(inner))
    }
}

// ============================================================================
// Statements
// ============================================================================

/// Ordered, duplicate-free list of output columns
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectSet {
    columns: SmallVec<[Column; 3]>,
}

impl SelectSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `*`: every column in table order
    pub fn all() -> Self {
        Self {
            columns: SmallVec::from_slice(&Column::ALL),
        }
    }

    /// Append a column, rejecting duplicates
    pub fn insert(&mut self, column: Column) -> Result<()> {
        if self.contains(column) {
            return Err(PortQueryError::parse(format!(
                "Duplicate column '{}' in select list",
                column.name()
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    #[inline]
    pub fn contains(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A parsed `SELECT ... FROM ... [WHERE ...]` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStatement {
    select_set: SelectSet,
    table_reference: String,
    host: String,
    expression: Expression,
}

impl SelectStatement {
    pub fn new(
        select_set: SelectSet,
        table_reference: String,
        host: String,
        expression: Expression,
    ) -> Self {
        Self {
            select_set,
            table_reference,
            host,
            expression,
        }
    }

    pub fn select_set(&self) -> &SelectSet {
        &self.select_set
    }

    /// The FROM clause as written
    pub fn table_reference(&self) -> &str {
        &self.table_reference
    }

    /// Host extracted from the table reference
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}
