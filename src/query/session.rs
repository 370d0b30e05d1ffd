//! Python-facing query session
//!
//! Wraps a [`PortQuery`] over real sockets. The GIL is released for the whole
//! of a run; worker threads re-acquire it only to hand a row to the Python
//! callback.

use crate::config::{QueryConfig, DEFAULT_TIMEOUT_MS};
use crate::environment::NetworkEnvironmentFactory;
use crate::error::Result;
use crate::query::row::QueryRow;
use crate::query::statement::{PortQuery, QueryState};
use parking_lot::Mutex;
use pyo3::prelude::*;
use std::sync::Arc;

/// Build a socket-backed query for `config`
pub fn network_query(config: QueryConfig) -> PortQuery<NetworkEnvironmentFactory> {
    let factory = NetworkEnvironmentFactory::new(config.timeout());
    PortQuery::new(factory, config)
}

/// Run `query` against the network and collect the rows, sorted by port
pub fn collect_rows(query: &str, config: QueryConfig) -> Result<Vec<QueryRow>> {
    config.validate()?;
    let rows = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rows);

    let mut session = network_query(config).with_callback(move |row| sink.lock().push(row));
    session.execute(query)?;
    drop(session);

    let mut rows = std::mem::take(&mut *rows.lock());
    rows.sort_unstable_by_key(QueryRow::port);
    Ok(rows)
}

/// Rebuild `query`'s sockets with a new per-probe timeout
pub fn set_timeout(query: &mut PortQuery<NetworkEnvironmentFactory>, timeout_ms: u64) -> Result<()> {
    let config = query.config().clone().with_timeout_ms(timeout_ms);
    let factory = NetworkEnvironmentFactory::new(config.timeout());
    query.reconfigure(factory, config)
}

/// Adapt a Python callable into a row callback
fn python_callback(callback: Py<PyAny>) -> impl Fn(QueryRow) + Send + Sync + 'static {
    move |row: QueryRow| {
        Python::attach(|py| {
            if let Err(err) = callback.call1(py, (row,)) {
                log::warn!("row callback raised: {}", err);
            }
        })
    }
}

// ============================================================================
// PyClass
// ============================================================================

/// PortQuery - stateful SOSQL session against a live host
///
/// ```python
/// q = PortQuery(callback=print, timeout_ms=500)
/// q.prepare("SELECT PORT, TCP FROM localhost WHERE PORT < 1024 AND TCP = OPEN")
/// q.run()
/// q.finalize()
/// ```
#[pyclass(name = "PortQuery")]
pub struct PyPortQuery {
    inner: PortQuery<NetworkEnvironmentFactory>,
}

#[pymethods]
impl PyPortQuery {
    #[new]
    #[pyo3(signature = (callback=None, timeout_ms=DEFAULT_TIMEOUT_MS, threads=0))]
    fn new(callback: Option<Py<PyAny>>, timeout_ms: u64, threads: usize) -> PyResult<Self> {
        let config = QueryConfig::default()
            .with_threads(threads)
            .with_timeout_ms(timeout_ms);
        config.validate()?;

        let mut inner = network_query(config);
        if let Some(callback) = callback {
            inner.set_callback(python_callback(callback));
        }
        Ok(Self { inner })
    }

    /// Replace the row callback; None stops delivery
    #[pyo3(signature = (callback=None))]
    fn set_callback(&mut self, callback: Option<Py<PyAny>>) {
        match callback {
            Some(callback) => self.inner.set_callback(python_callback(callback)),
            None => self.inner.clear_callback(),
        }
    }

    /// Parse a query; raises if one is already prepared
    fn prepare(&mut self, query: &str) -> PyResult<()> {
        Ok(self.inner.prepare(query)?)
    }

    /// Scan the prepared query, returning the number of rows reported
    fn run(&mut self, py: Python<'_>) -> PyResult<usize> {
        let summary = py.detach(|| self.inner.run())?;
        Ok(summary.reported)
    }

    /// Release the prepared query
    fn finalize(&mut self) -> PyResult<()> {
        Ok(self.inner.finalize()?)
    }

    /// Prepare, run and finalize
    fn execute(&mut self, py: Python<'_>, query: &str) -> PyResult<usize> {
        let summary = py.detach(|| self.inner.execute(query))?;
        Ok(summary.reported)
    }

    /// Per-probe timeout in milliseconds
    #[getter]
    fn timeout_ms(&self) -> u64 {
        self.inner.config().timeout_ms
    }

    #[setter]
    fn set_timeout_ms(&mut self, timeout_ms: u64) -> PyResult<()> {
        Ok(set_timeout(&mut self.inner, timeout_ms)?)
    }

    /// Message of the most recent failure, if any
    #[getter]
    fn last_error(&self) -> Option<String> {
        self.inner.last_error().map(str::to_string)
    }

    /// Whether a query is waiting to be run or finalized
    #[getter]
    fn prepared(&self) -> bool {
        self.inner.state() == QueryState::Prepared
    }

    /// Host of the prepared query
    #[getter]
    fn host(&self) -> Option<String> {
        self.inner.statement().map(|s| s.host().to_string())
    }
}
