//! Token model for the SOSQL lexer

use crate::environment::{Protocol, ScanOutcome};
use ahash::AHashMap;
use once_cell::sync::Lazy;
use std::fmt;

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Gte,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Lte,
}

impl ComparisonOp {
    pub const ALL: [ComparisonOp; 6] = [
        ComparisonOp::Eq,
        ComparisonOp::Ne,
        ComparisonOp::Gt,
        ComparisonOp::Gte,
        ComparisonOp::Lt,
        ComparisonOp::Lte,
    ];

    /// Look up an operator by its exact lexeme
    pub fn from_lexeme(lexeme: &str) -> Option<Self> {
        match lexeme {
            "=" => Some(ComparisonOp::Eq),
            "<>" => Some(ComparisonOp::Ne),
            ">" => Some(ComparisonOp::Gt),
            ">=" => Some(ComparisonOp::Gte),
            "<" => Some(ComparisonOp::Lt),
            "<=" => Some(ComparisonOp::Lte),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "<>",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
        }
    }

    /// Apply the operator to two ordered values
    #[inline]
    pub fn compare<T: Ord>(self, lhs: T, rhs: T) -> bool {
        match self {
            ComparisonOp::Eq => lhs == rhs,
            ComparisonOp::Ne => lhs != rhs,
            ComparisonOp::Gt => lhs > rhs,
            ComparisonOp::Gte => lhs >= rhs,
            ComparisonOp::Lt => lhs < rhs,
            ComparisonOp::Lte => lhs <= rhs,
        }
    }
}

/// SOSQL keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    All,
    And,
    Between,
    From,
    Is,
    Not,
    Or,
    Select,
    Where,
}

impl Keyword {
    pub const ALL: [Keyword; 9] = [
        Keyword::All,
        Keyword::And,
        Keyword::Between,
        Keyword::From,
        Keyword::Is,
        Keyword::Not,
        Keyword::Or,
        Keyword::Select,
        Keyword::Where,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Keyword::All => "ALL",
            Keyword::And => "AND",
            Keyword::Between => "BETWEEN",
            Keyword::From => "FROM",
            Keyword::Is => "IS",
            Keyword::Not => "NOT",
            Keyword::Or => "OR",
            Keyword::Select => "SELECT",
            Keyword::Where => "WHERE",
        }
    }
}

/// Selectable columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Column {
    Port,
    Tcp,
    Udp,
}

impl Column {
    pub const ALL: [Column; 3] = [Column::Port, Column::Tcp, Column::Udp];

    pub fn name(self) -> &'static str {
        match self {
            Column::Port => "PORT",
            Column::Tcp => "TCP",
            Column::Udp => "UDP",
        }
    }

    /// The protocol a column is resolved by, `None` for PORT
    pub fn protocol(self) -> Option<Protocol> {
        match self {
            Column::Port => None,
            Column::Tcp => Some(Protocol::Tcp),
            Column::Udp => Some(Protocol::Udp),
        }
    }
}

/// Single character punctuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punctuation {
    Asterisk,
    LeftParen,
    RightParen,
    Comma,
    Semicolon,
}

impl Punctuation {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '*' => Some(Punctuation::Asterisk),
            '(' => Some(Punctuation::LeftParen),
            ')' => Some(Punctuation::RightParen),
            ',' => Some(Punctuation::Comma),
            ';' => Some(Punctuation::Semicolon),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Punctuation::Asterisk => '*',
            Punctuation::LeftParen => '(',
            Punctuation::RightParen => ')',
            Punctuation::Comma => ',',
            Punctuation::Semicolon => ';',
        }
    }
}

/// A lexed SOSQL token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Numeric(u16),
    Comparison(ComparisonOp),
    /// Identifier or hostname fragment, spelled as the user wrote it
    User(String),
    Keyword(Keyword),
    Column(Column),
    QueryResult(ScanOutcome),
    Punctuation(Punctuation),
    EndOfInput,
    /// A lexeme the lexer could not resolve
    Error(String),
}

impl Token {
    #[inline]
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(self, Token::Keyword(k) if *k == keyword)
    }

    #[inline]
    pub fn is_punctuation(&self, punctuation: Punctuation) -> bool {
        matches!(self, Token::Punctuation(p) if *p == punctuation)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Numeric(n) => write!(f, "{}", n),
            Token::Comparison(op) => f.write_str(op.symbol()),
            Token::User(text) => f.write_str(text),
            Token::Keyword(k) => f.write_str(k.name()),
            Token::Column(c) => f.write_str(c.name()),
            Token::QueryResult(r) => f.write_str(r.name()),
            Token::Punctuation(p) => write!(f, "{}", p.as_char()),
            Token::EndOfInput => f.write_str("end of input"),
            Token::Error(lexeme) => f.write_str(lexeme),
        }
    }
}

/// Reserved words: keywords, columns and query results, keyed by upper-case spelling
static RESERVED_WORDS: Lazy<AHashMap<&'static str, Token>> = Lazy::new(|| {
    let mut map = AHashMap::with_capacity(16);
    for keyword in Keyword::ALL {
        map.insert(keyword.name(), Token::Keyword(keyword));
    }
    for column in Column::ALL {
        map.insert(column.name(), Token::Column(column));
    }
    for result in [ScanOutcome::Open, ScanOutcome::Closed, ScanOutcome::Rejected] {
        map.insert(result.name(), Token::QueryResult(result));
    }
    map
});

/// Resolve an upper-case word against the reserved word table
#[inline]
pub fn lookup_reserved(word: &str) -> Option<Token> {
    RESERVED_WORDS.get(word).cloned()
}

/// Every reserved word with the token it lexes to
pub fn reserved_words() -> impl Iterator<Item = (&'static str, Token)> {
    RESERVED_WORDS.iter().map(|(word, token)| (*word, token.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_lookup() {
        assert_eq!(lookup_reserved("SELECT"), Some(Token::Keyword(Keyword::Select)));
        assert_eq!(lookup_reserved("UDP"), Some(Token::Column(Column::Udp)));
        assert_eq!(
            lookup_reserved("REJECTED"),
            Some(Token::QueryResult(ScanOutcome::Rejected))
        );
        assert_eq!(lookup_reserved("select"), None);
        assert_eq!(lookup_reserved("HOST"), None);
        assert_eq!(reserved_words().count(), 15);
    }

    #[test]
    fn test_operator_lexemes() {
        for op in ComparisonOp::ALL {
            assert_eq!(ComparisonOp::from_lexeme(op.symbol()), Some(op));
        }
        assert_eq!(ComparisonOp::from_lexeme("=="), None);
        assert_eq!(ComparisonOp::from_lexeme("!="), None);
    }

    #[test]
    fn test_compare() {
        assert!(ComparisonOp::Lt.compare(1u16, 2));
        assert!(ComparisonOp::Gte.compare(2u16, 2));
        assert!(!ComparisonOp::Ne.compare(ScanOutcome::Open, ScanOutcome::Open));
    }

    #[test]
    fn test_token_rendering() {
        assert_eq!(Token::Comparison(ComparisonOp::Ne).to_string(), "<>");
        assert_eq!(Token::Punctuation(Punctuation::Semicolon).to_string(), ";");
        assert_eq!(Token::User("www.Example.com".into()).to_string(), "www.Example.com");
        assert_eq!(Token::EndOfInput.to_string(), "end of input");
    }
}
