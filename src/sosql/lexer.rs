//! SOSQL lexer
//!
//! Single pass scanner with one token of lookahead. Reserved words are matched
//! against an upper-cased copy of the query; user lexemes (hostnames, error
//! runs) keep the spelling the caller used.

use crate::sosql::token::{lookup_reserved, ComparisonOp, Punctuation, Token};

/// Characters that may continue an identifier besides letters and digits
const IDENTIFIER_SYMBOLS: &[char] = &['$', '-', '_', '.', '+', '!', '\'', '/', '?', ':', '@', '=', '&'];

#[inline]
fn is_comparison_start(c: char) -> bool {
    matches!(c, '=' | '<' | '>')
}

#[inline]
fn is_operator_char(c: char) -> bool {
    matches!(c, '=' | '<' | '>' | '!')
}

#[inline]
fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || IDENTIFIER_SYMBOLS.contains(&c)
}

/// Lexer over a single query string
#[derive(Debug, Clone)]
pub struct Lexer {
    source: Vec<char>,
    upper: Vec<char>,
    pos: usize,
    peeked: Option<Token>,
    finished: bool,
}

impl Lexer {
    pub fn new(query: &str) -> Self {
        let source: Vec<char> = query.chars().collect();
        let upper = source.iter().map(|c| c.to_ascii_uppercase()).collect();
        Self {
            source,
            upper,
            pos: 0,
            peeked: None,
            finished: false,
        }
    }

    /// Consume and return the next token
    ///
    /// # Panics
    /// Panics if called again after [`Token::EndOfInput`] has been returned.
    pub fn next_token(&mut self) -> Token {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.scan_token(),
        };
        if token == Token::EndOfInput {
            self.finished = true;
        }
        token
    }

    /// Return the token [`Lexer::next_token`] would return, without consuming it
    ///
    /// # Panics
    /// Panics if the lexer already returned [`Token::EndOfInput`].
    pub fn peek(&mut self) -> &Token {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.scan_token(),
        };
        self.peeked.insert(token)
    }

    /// Character offset of the scan cursor
    pub fn offset(&self) -> usize {
        self.pos
    }

    // ------------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------------

    fn scan_token(&mut self) -> Token {
        if self.finished {
            panic!("lexer scanned past end of input");
        }

        while self.pos < self.upper.len() && self.upper[self.pos].is_whitespace() {
            self.pos += 1;
        }

        let Some(&c) = self.upper.get(self.pos) else {
            return Token::EndOfInput;
        };
        let start = self.pos;

        if let Some(punctuation) = Punctuation::from_char(c) {
            self.pos += 1;
            return Token::Punctuation(punctuation);
        }
        if is_comparison_start(c) {
            return self.scan_comparison(start);
        }
        if c.is_ascii_digit() {
            return self.scan_numeric(start);
        }
        if c.is_ascii_alphabetic() {
            return self.scan_alpha(start);
        }
        self.scan_error(start)
    }

    fn scan_comparison(&mut self, start: usize) -> Token {
        self.advance_while(is_operator_char);
        let lexeme: String = self.upper[start..self.pos].iter().collect();
        match ComparisonOp::from_lexeme(&lexeme) {
            Some(op) => Token::Comparison(op),
            None => self.scan_error(start),
        }
    }

    fn scan_numeric(&mut self, start: usize) -> Token {
        self.advance_while(|c| c.is_ascii_digit());
        if !self.at_operand_end() {
            return self.scan_identifier(start);
        }

        let digits = self.lexeme(start);
        match digits.parse::<u16>() {
            Ok(value) => Token::Numeric(value),
            Err(_) => Token::Error(digits),
        }
    }

    fn scan_alpha(&mut self, start: usize) -> Token {
        self.advance_while(|c| c.is_ascii_alphabetic());
        let word: String = self.upper[start..self.pos].iter().collect();

        if let Some(token) = lookup_reserved(&word) {
            if self.at_operand_end() {
                return token;
            }
        }
        if self.at_terminator() {
            return Token::User(self.lexeme(start));
        }
        self.scan_identifier(start)
    }

    /// Hostnames and URLs; a run of letters and digits alone is not accepted
    fn scan_identifier(&mut self, start: usize) -> Token {
        self.advance_while(is_identifier_char);
        if !self.at_terminator() {
            return self.scan_error(start);
        }

        let lexeme = self.lexeme(start);
        if lexeme.chars().any(|c| IDENTIFIER_SYMBOLS.contains(&c)) {
            Token::User(lexeme)
        } else {
            Token::Error(lexeme)
        }
    }

    fn scan_error(&mut self, start: usize) -> Token {
        while !self.at_terminator() {
            self.pos += 1;
        }
        Token::Error(self.lexeme(start))
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    #[inline]
    fn advance_while(&mut self, predicate: impl Fn(char) -> bool) {
        while self.pos < self.upper.len() && predicate(self.upper[self.pos]) {
            self.pos += 1;
        }
    }

    /// Whitespace, end of input and punctuation end every token
    #[inline]
    fn at_terminator(&self) -> bool {
        match self.upper.get(self.pos) {
            None => true,
            Some(&c) => c.is_whitespace() || Punctuation::from_char(c).is_some(),
        }
    }

    /// Numerals and reserved words may also run straight into an operator
    #[inline]
    fn at_operand_end(&self) -> bool {
        self.at_terminator() || self.upper.get(self.pos).copied().is_some_and(is_comparison_start)
    }

    fn lexeme(&self, start: usize) -> String {
        self.source[start..self.pos].iter().collect()
    }
}

/// Lex a whole query, including the trailing [`Token::EndOfInput`]
pub fn tokenize(query: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(query);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token == Token::EndOfInput;
        tokens.push(token);
        if done {
            return tokens;
        }
    }
}
