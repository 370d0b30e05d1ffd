//! Protocol requirement collection

use crate::environment::{Protocol, Protocols};
use crate::sosql::ast::{Expression, SelectSet, SelectStatement, Terminal};

fn terminal_protocols(terminal: &Terminal) -> Protocols {
    match terminal {
        Terminal::ProtocolColumn(protocol) => Protocols::from(*protocol),
        _ => Protocols::NONE,
    }
}

/// Protocols an expression needs probed to reach a definite verdict
pub fn expression_protocols(expression: &Expression) -> Protocols {
    match expression {
        Expression::Or(left, right) | Expression::And(left, right) => {
            expression_protocols(left) | expression_protocols(right)
        }
        Expression::Not(inner) => expression_protocols(inner),
        Expression::Comparison(comparison) => {
            terminal_protocols(comparison.lhs()) | terminal_protocols(comparison.rhs())
        }
        Expression::Between(between) => terminal_protocols(between.terminal()),
        Expression::Null => Protocols::NONE,
    }
}

/// Protocols the selected columns report
pub fn select_protocols(select_set: &SelectSet) -> Protocols {
    select_set
        .columns()
        .iter()
        .filter_map(|column| column.protocol())
        .fold(Protocols::NONE, |acc, protocol: Protocol| acc | protocol.into())
}

/// Every protocol a statement has to probe
pub fn required_protocols(statement: &SelectStatement) -> Protocols {
    select_protocols(statement.select_set()) | expression_protocols(statement.expression())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sosql::parser::parse;

    fn required(query: &str) -> Protocols {
        required_protocols(&parse(query).unwrap())
    }

    #[test]
    fn test_port_only_needs_nothing() {
        assert_eq!(required("SELECT PORT FROM localhost"), Protocols::NONE);
        assert_eq!(
            required("SELECT PORT FROM localhost WHERE PORT BETWEEN 1 AND 9"),
            Protocols::NONE
        );
    }

    #[test]
    fn test_select_list_contributes() {
        assert_eq!(required("SELECT * FROM localhost"), Protocols::ALL);
        assert_eq!(required("SELECT PORT, UDP FROM localhost"), Protocols::UDP);
    }

    #[test]
    fn test_where_clause_contributes() {
        assert_eq!(
            required("SELECT PORT FROM localhost WHERE NOT (PORT < 5 OR TCP = OPEN)"),
            Protocols::TCP
        );
        assert_eq!(
            required("SELECT TCP FROM localhost WHERE CLOSED <> UDP"),
            Protocols::ALL
        );
    }
}
