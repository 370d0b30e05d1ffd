//! Scan job dispatch
//!
//! A fixed set of worker threads, each owning a mutex + condvar queue, with
//! work stealing between them. Jobs return their result through a
//! [`JobHandle`]; a panic fails only that handle.

mod queue;
mod thread_pool;

pub use queue::*;
pub use thread_pool::*;
