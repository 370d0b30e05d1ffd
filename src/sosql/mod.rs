//! SOSQL front end and pre-network evaluation
//!
//! This module turns query strings like
//! `SELECT PORT, TCP FROM localhost WHERE PORT < 1024 AND TCP = OPEN`
//! into a typed statement, works out which protocols the statement needs
//! probed, and decides per port whether a probe is needed at all.

mod ast;
mod evaluator;
pub mod lexer;
pub mod parser;
mod protocols;
pub mod token;
mod tristate;


pub use ast::*;
pub use evaluator::*;
pub use lexer::*;
pub use parser::*;
pub use protocols::*;
pub use token::*;
pub use tristate::*;
