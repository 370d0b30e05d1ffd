//! Port Query - SOSQL port scanning engine
//!
//! This crate parses SOSQL statements such as
//! `SELECT PORT, TCP FROM localhost WHERE PORT < 1024 AND TCP = OPEN`,
//! rules out as many ports as possible before touching the network, and
//! probes the rest concurrently on a work-stealing thread pool. Python
//! bindings are provided via PyO3.

use pyo3::prelude::*;

pub mod config;
pub mod environment;
pub mod error;
pub mod pool;
pub mod query;
pub mod sosql;

use crate::config::{QueryConfig, DEFAULT_TIMEOUT_MS};
use crate::query::{collect_rows, PyPortQuery, QueryRow};

// ============================================================================
// Python Functions
// ============================================================================

/// Run a query and return every matching row, sorted by port
///
/// # Arguments
/// * `query` - SOSQL statement
/// * `timeout_ms` - Per-probe timeout in milliseconds (default: 2000)
/// * `threads` - Worker threads, 0 for one per CPU (default: 0)
///
/// # Raises
/// ValueError for malformed queries, RuntimeError if the scan cannot start
#[pyfunction]
#[pyo3(signature = (query, timeout_ms=DEFAULT_TIMEOUT_MS, threads=0))]
fn execute(py: Python<'_>, query: &str, timeout_ms: u64, threads: usize) -> PyResult<Vec<QueryRow>> {
    let config = QueryConfig::default()
        .with_threads(threads)
        .with_timeout_ms(timeout_ms);
    Ok(py.detach(|| collect_rows(query, config))?)
}

/// Run a query asynchronously
///
/// The scan runs on Tokio's blocking pool so the asyncio event loop stays
/// responsive.
///
/// # Example (Python)
/// ```python
/// rows = await execute_async("SELECT * FROM localhost WHERE PORT BETWEEN 20 AND 25")
/// for row in rows:
///     print(row.port, row.tcp, row.udp)
/// ```
#[pyfunction]
#[pyo3(signature = (query, timeout_ms=DEFAULT_TIMEOUT_MS, threads=0))]
fn execute_async<'py>(
    py: Python<'py>,
    query: String,
    timeout_ms: u64,
    threads: usize,
) -> PyResult<Bound<'py, PyAny>> {
    let config = QueryConfig::default()
        .with_threads(threads)
        .with_timeout_ms(timeout_ms);

    pyo3_async_runtimes::tokio::future_into_py(py, async move {
        let rows = tokio::task::spawn_blocking(move || collect_rows(&query, config))
            .await
            .map_err(|e| {
                PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!(
                    "Query task panicked: {}",
                    e
                ))
            })??;

        Ok(rows)
    })
}

// ============================================================================
// Python Module Definition
// ============================================================================

/// Python module definition
#[pymodule]
fn portquery(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(execute, m)?)?;
    m.add_function(wrap_pyfunction!(execute_async, m)?)?;
    m.add_class::<PyPortQuery>()?;
    m.add_class::<QueryRow>()?;
    Ok(())
}
