//! Query execution
//!
//! The driver that ties the SOSQL front end, the environment and the worker
//! pool together, plus the row type it reports and the Python session class.

mod row;
pub mod session;
mod statement;

pub use row::*;
pub use session::*;
pub use statement::*;
