//! Recursive descent parser for SOSQL
//!
//! ```text
//! statement   := SELECT [ALL] select_list FROM host [WHERE expr] [';'] EOF
//! select_list := '*' | column (',' column)*
//! expr        := and_expr (OR and_expr)*
//! and_expr    := factor (AND factor)*
//! factor      := NOT factor | '(' expr ')' | bool_expr
//! bool_expr   := terminal ( comparison terminal
//!                         | IS [NOT] terminal
//!                         | BETWEEN numeric AND numeric )
//! ```

use crate::environment::extract_host;
use crate::error::{PortQueryError, Result};
use crate::sosql::ast::{
    BetweenExpr, ComparisonExpr, Expression, SelectSet, SelectStatement, Terminal,
};
use crate::sosql::lexer::Lexer;
use crate::sosql::token::{ComparisonOp, Keyword, Punctuation, Token};

/// Parser over a single query
pub struct Parser {
    lexer: Lexer,
}

impl Parser {
    pub fn new(query: &str) -> Self {
        Self {
            lexer: Lexer::new(query),
        }
    }

    /// Parse one complete statement, consuming the input up to end of input
    pub fn parse_select_statement(&mut self) -> Result<SelectStatement> {
        self.expect_keyword(Keyword::Select)?;
        if self.lexer.peek().is_keyword(Keyword::All) {
            self.advance()?;
        }

        let select_set = self.parse_select_list()?;
        self.expect_keyword(Keyword::From)?;
        let (table_reference, host) = self.parse_table_reference()?;

        let expression = if self.lexer.peek().is_keyword(Keyword::Where) {
            self.advance()?;
            self.parse_expression()?
        } else {
            Expression::Null
        };

        if self.lexer.peek().is_punctuation(Punctuation::Semicolon) {
            self.advance()?;
        }
        match self.advance()? {
            Token::EndOfInput => {}
            token => {
                return Err(PortQueryError::parse(format!(
                    "Unexpected '{}' after end of statement",
                    token
                )))
            }
        }

        Ok(SelectStatement::new(
            select_set,
            table_reference,
            host,
            expression,
        ))
    }

    // ------------------------------------------------------------------------
    // Clauses
    // ------------------------------------------------------------------------

    fn parse_select_list(&mut self) -> Result<SelectSet> {
        if self.lexer.peek().is_punctuation(Punctuation::Asterisk) {
            self.advance()?;
            return Ok(SelectSet::all());
        }

        let mut set = SelectSet::new();
        loop {
            match self.advance()? {
                Token::Column(column) => set.insert(column)?,
                token => {
                    return Err(PortQueryError::parse(format!(
                        "Expected '*' or a column name in select list, found '{}'",
                        token
                    )))
                }
            }
            if !self.lexer.peek().is_punctuation(Punctuation::Comma) {
                return Ok(set);
            }
            self.advance()?;
        }
    }

    fn parse_table_reference(&mut self) -> Result<(String, String)> {
        match self.advance()? {
            Token::User(reference) => match extract_host(&reference) {
                Some(host) => {
                    let host = host.to_string();
                    Ok((reference, host))
                }
                None => Err(PortQueryError::parse(format!(
                    "'{}' is not a valid host or address",
                    reference
                ))),
            },
            token => Err(PortQueryError::parse(format!(
                "Expected a host after FROM, found '{}'",
                token
            ))),
        }
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn parse_expression(&mut self) -> Result<Expression> {
        let mut left = self.parse_and_expression()?;
        while self.lexer.peek().is_keyword(Keyword::Or) {
            self.advance()?;
            let right = self.parse_and_expression()?;
            left = Expression::or(left, right);
        }
        Ok(left)
    }

    fn parse_and_expression(&mut self) -> Result<Expression> {
        let mut left = self.parse_factor()?;
        while self.lexer.peek().is_keyword(Keyword::And) {
            self.advance()?;
            let right = self.parse_factor()?;
            left = Expression::and(left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expression> {
        if self.lexer.peek().is_keyword(Keyword::Not) {
            self.advance()?;
            return Ok(Expression::negate(self.parse_factor()?));
        }
        if self.lexer.peek().is_punctuation(Punctuation::LeftParen) {
            self.advance()?;
            let inner = self.parse_expression()?;
            return match self.advance()? {
                Token::Punctuation(Punctuation::RightParen) => Ok(inner),
                token => Err(PortQueryError::parse(format!(
                    "Expected ')' to close group, found '{}'",
                    token
                ))),
            };
        }
        self.parse_bool_expression()
    }

    fn parse_bool_expression(&mut self) -> Result<Expression> {
        let lhs = self.parse_terminal()?;
        match self.advance()? {
            Token::Comparison(op) => {
                let rhs = self.parse_terminal()?;
                Ok(Expression::Comparison(ComparisonExpr::new(op, lhs, rhs)?))
            }
            Token::Keyword(Keyword::Is) => {
                let op = if self.lexer.peek().is_keyword(Keyword::Not) {
                    self.advance()?;
                    ComparisonOp::Ne
                } else {
                    ComparisonOp::Eq
                };
                let rhs = self.parse_terminal()?;
                Ok(Expression::Comparison(ComparisonExpr::new(op, lhs, rhs)?))
            }
            Token::Keyword(Keyword::Between) => {
                let lower = self.parse_between_bound()?;
                match self.advance()? {
                    Token::Keyword(Keyword::And) => {}
                    token => {
                        return Err(PortQueryError::parse(format!(
                            "Unterminated BETWEEN: expected AND, found '{}'",
                            token
                        )))
                    }
                }
                let upper = self.parse_between_bound()?;
                Ok(Expression::Between(BetweenExpr::new(lhs, lower, upper)?))
            }
            token => Err(PortQueryError::parse(format!(
                "Expected a comparison, IS or BETWEEN after '{}', found '{}'",
                lhs, token
            ))),
        }
    }

    fn parse_between_bound(&mut self) -> Result<u16> {
        match self.advance()? {
            Token::Numeric(value) => Ok(value),
            token => Err(PortQueryError::parse(format!(
                "BETWEEN bounds must be numeric literals, found '{}'",
                token
            ))),
        }
    }

    fn parse_terminal(&mut self) -> Result<Terminal> {
        match self.advance()? {
            Token::Numeric(value) => Ok(Terminal::NumericLiteral(value)),
            Token::Column(column) => Ok(Terminal::from_column(column)),
            Token::QueryResult(outcome) => Ok(Terminal::QueryResultLiteral(outcome)),
            token => Err(PortQueryError::parse(format!(
                "Expected a column or literal, found '{}'",
                token
            ))),
        }
    }

    // ------------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------------

    /// Consume the next token, surfacing lexer errors
    fn advance(&mut self) -> Result<Token> {
        match self.lexer.next_token() {
            Token::Error(lexeme) => Err(PortQueryError::Lex(lexeme)),
            token => Ok(token),
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        match self.advance()? {
            Token::Keyword(k) if k == keyword => Ok(()),
            token => Err(PortQueryError::parse(format!(
                "Expected {}, found '{}'",
                keyword.name(),
                token
            ))),
        }
    }
}

/// Parse a query string into a statement
pub fn parse(query: &str) -> Result<SelectStatement> {
    let statement = Parser::new(query).parse_select_statement()?;
    log::debug!(
        "parsed query against {}: columns {:?}, expression {:?}",
        statement.host(),
        statement.select_set().columns(),
        statement.expression()
    );
    Ok(statement)
}
