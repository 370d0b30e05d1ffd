//! Query driver: prepare, run, finalize
//!
//! A [`PortQuery`] holds at most one prepared statement. Running it walks the
//! whole port space once on the calling thread with the pre-network
//! evaluator, then fans the surviving ports out to the pool. Each job builds
//! its own environment, probes, settles any unknown verdict and reports the
//! row.

use crate::config::QueryConfig;
use crate::environment::{Environment, EnvironmentFactory, Protocols, ScanResults};
use crate::error::{PortQueryError, Result, StateError};
use crate::pool::{JobHandle, ThreadPool};
use crate::query::row::QueryRow;
use crate::sosql::{
    evaluate, parse, required_protocols, select_protocols, Bindings, SelectStatement, Tristate,
};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::sync::Arc;

/// Receives every matching row, from whichever worker produced it
pub type RowCallback = Arc<dyn Fn(QueryRow) + Send + Sync>;

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    Prepared,
}

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Ports the pre-network pass did not rule out
    pub candidates: usize,
    /// Jobs handed to the pool
    pub submitted: usize,
    /// Rows delivered
    pub reported: usize,
    /// Jobs that errored or panicked
    pub failed: usize,
}

/// A port surviving the pre-network pass
#[derive(Debug, Clone, Copy)]
struct Candidate {
    port: u16,
    verdict: Tristate,
}

/// Query session over environments built by `F`
pub struct PortQuery<F: EnvironmentFactory> {
    factory: Arc<F>,
    config: QueryConfig,
    callback: Option<RowCallback>,
    statement: Option<Arc<SelectStatement>>,
    pool: Option<ThreadPool>,
    last_error: Option<String>,
}

impl<F: EnvironmentFactory> PortQuery<F> {
    pub fn new(factory: F, config: QueryConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            config,
            callback: None,
            statement: None,
            pool: None,
            last_error: None,
        }
    }

    /// Builder-style [`PortQuery::set_callback`]
    pub fn with_callback(mut self, callback: impl Fn(QueryRow) + Send + Sync + 'static) -> Self {
        self.set_callback(callback);
        self
    }

    pub fn set_callback(&mut self, callback: impl Fn(QueryRow) + Send + Sync + 'static) {
        self.callback = Some(Arc::new(callback));
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Swap in a new factory and settings for later runs
    ///
    /// The worker pool is respawned on the next run if its shape changed.
    pub fn reconfigure(&mut self, factory: F, config: QueryConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            return Err(self.record(e));
        }
        if config.threads != self.config.threads || config.push_rounds != self.config.push_rounds {
            self.pool = None;
        }
        self.factory = Arc::new(factory);
        self.config = config;
        Ok(())
    }

    pub fn state(&self) -> QueryState {
        if self.statement.is_some() {
            QueryState::Prepared
        } else {
            QueryState::Idle
        }
    }

    /// The prepared statement, if any
    pub fn statement(&self) -> Option<&SelectStatement> {
        self.statement.as_deref()
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Lex and parse `query`, moving to the prepared state on success
    pub fn prepare(&mut self, query: &str) -> Result<()> {
        if self.statement.is_some() {
            return Err(self.record(StateError::AlreadyPrepared.into()));
        }
        match parse(query) {
            Ok(statement) => {
                self.statement = Some(Arc::new(statement));
                self.last_error = None;
                Ok(())
            }
            Err(e) => Err(self.record(e)),
        }
    }

    /// Scan the prepared statement's host and report matching rows
    ///
    /// Per-port failures are counted in the summary rather than aborting the
    /// run; the latest one is kept in [`PortQuery::last_error`].
    pub fn run(&mut self) -> Result<RunSummary> {
        let statement = match &self.statement {
            Some(statement) => Arc::clone(statement),
            None => return Err(self.record(StateError::NotPrepared.into())),
        };
        if let Err(e) = self.config.validate() {
            return Err(self.record(e));
        }

        let mut candidates = pre_network_pass(&statement);
        if self.config.randomize_order {
            candidates.shuffle(&mut rand::thread_rng());
        }

        let protocols = required_protocols(&statement);
        log::info!(
            "scanning {}: {} candidate ports, probing {}",
            statement.host(),
            candidates.len(),
            protocols
        );

        let factory = Arc::clone(&self.factory);
        let callback = self.callback.clone();
        let handles = {
            let pool = match self.pool() {
                Ok(pool) => pool,
                Err(e) => return Err(self.record(e)),
            };
            candidates
                .iter()
                .map(|candidate| {
                    let job = ScanJob {
                        factory: Arc::clone(&factory),
                        statement: Arc::clone(&statement),
                        callback: callback.clone(),
                        protocols,
                        candidate: *candidate,
                    };
                    (candidate.port, pool.submit(move || job.run()))
                })
                .collect::<Vec<(u16, JobHandle<Result<bool>>)>>()
        };

        let mut summary = RunSummary {
            candidates: candidates.len(),
            submitted: handles.len(),
            ..RunSummary::default()
        };
        for (port, handle) in handles {
            match handle.wait().and_then(|outcome| outcome) {
                Ok(true) => summary.reported += 1,
                Ok(false) => {}
                Err(e) => {
                    log::warn!("port {} failed: {}", port, e);
                    summary.failed += 1;
                    self.last_error = Some(e.to_string());
                }
            }
        }

        log::info!(
            "scan of {} finished: {} reported, {} failed",
            statement.host(),
            summary.reported,
            summary.failed
        );
        Ok(summary)
    }

    /// Release the prepared statement
    pub fn finalize(&mut self) -> Result<()> {
        match self.statement.take() {
            Some(_) => Ok(()),
            None => Err(self.record(StateError::NotPrepared.into())),
        }
    }

    /// Prepare, run and finalize in one call
    ///
    /// The statement is finalized even when the run fails.
    pub fn execute(&mut self, query: &str) -> Result<RunSummary> {
        self.prepare(query)?;
        let outcome = self.run();
        let finalized = self.finalize();
        let summary = outcome?;
        finalized?;
        Ok(summary)
    }

    /// The worker pool, spawned on first use
    fn pool(&mut self) -> Result<&ThreadPool> {
        let pool = match self.pool.take() {
            Some(pool) => pool,
            None => ThreadPool::new(self.config.threads)?.with_push_rounds(self.config.push_rounds),
        };
        let pool: &ThreadPool = self.pool.insert(pool);
        Ok(pool)
    }

    fn record(&mut self, err: PortQueryError) -> PortQueryError {
        self.last_error = Some(err.to_string());
        err
    }
}

/// Evaluate every port without touching the network, keeping those not ruled out
fn pre_network_pass(statement: &SelectStatement) -> Vec<Candidate> {
    (0..=u16::MAX)
        .filter_map(|port| {
            let verdict = evaluate(statement.expression(), &Bindings::pre_network(port));
            (!verdict.is_false()).then_some(Candidate { port, verdict })
        })
        .collect()
}

/// Work for one candidate port, run on a pool worker
struct ScanJob<F: EnvironmentFactory> {
    factory: Arc<F>,
    statement: Arc<SelectStatement>,
    callback: Option<RowCallback>,
    protocols: Protocols,
    candidate: Candidate,
}

impl<F: EnvironmentFactory> ScanJob<F> {
    /// Returns whether a row was reported
    fn run(self) -> Result<bool> {
        let Candidate { port, verdict } = self.candidate;
        let mut env = self.factory.create(self.statement.host());
        env.set_port(port);

        // a settled verdict only needs the selected columns
        let needed = if verdict.is_definite() {
            select_protocols(self.statement.select_set())
        } else {
            self.protocols
        };
        let results = if needed.is_empty() {
            ScanResults::new()
        } else {
            env.probe(needed)?
        };

        let verdict = if verdict.is_definite() {
            verdict
        } else {
            evaluate(
                self.statement.expression(),
                &Bindings::probed(env.current_port(), results),
            )
        };
        log::debug!("port {} -> {}", port, verdict);

        if !verdict.is_definite() {
            let message = match needed.iter().find(|p| results.get(*p).is_none()) {
                Some(protocol) => format!("probe returned no outcome for {}", protocol),
                None => format!("verdict still unknown after probing {}", needed),
            };
            return Err(PortQueryError::Scan { port, message });
        }

        if !verdict.is_true() {
            return Ok(false);
        }
        if let Some(callback) = &self.callback {
            callback(QueryRow::build(port, self.statement.select_set(), &results));
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Protocol, ScanOutcome};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports every port in `open` as OPEN, everything else CLOSED
    struct MockEnvironment {
        port: u16,
        open: Arc<HashSet<u16>>,
        probes: Arc<AtomicUsize>,
        fail_port: Option<u16>,
    }

    impl Environment for MockEnvironment {
        fn current_port(&self) -> u16 {
            self.port
        }

        fn set_port(&mut self, port: u16) {
            self.port = port;
        }

        fn probe(&mut self, protocols: Protocols) -> Result<ScanResults> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.fail_port == Some(self.port) {
                return Err(PortQueryError::Scan {
                    port: self.port,
                    message: "mock failure".to_string(),
                });
            }
            let outcome = if self.open.contains(&self.port) {
                ScanOutcome::Open
            } else {
                ScanOutcome::Closed
            };
            let mut results = ScanResults::new();
            for protocol in protocols.iter() {
                results.set(protocol, outcome);
            }
            Ok(results)
        }
    }

    struct MockFactory {
        open: Arc<HashSet<u16>>,
        probes: Arc<AtomicUsize>,
        created: Arc<AtomicUsize>,
        fail_port: Option<u16>,
    }

    impl MockFactory {
        fn new(open: &[u16]) -> Self {
            Self {
                open: Arc::new(open.iter().copied().collect()),
                probes: Arc::new(AtomicUsize::new(0)),
                created: Arc::new(AtomicUsize::new(0)),
                fail_port: None,
            }
        }
    }

    impl EnvironmentFactory for MockFactory {
        type Env = MockEnvironment;

        fn create(&self, target: &str) -> MockEnvironment {
            assert_eq!(target, "localhost");
            self.created.fetch_add(1, Ordering::SeqCst);
            MockEnvironment {
                port: 0,
                open: Arc::clone(&self.open),
                probes: Arc::clone(&self.probes),
                fail_port: self.fail_port,
            }
        }
    }

    /// Answers UDP only, whatever was asked for
    struct UdpOnlyEnvironment {
        port: u16,
    }

    impl Environment for UdpOnlyEnvironment {
        fn current_port(&self) -> u16 {
            self.port
        }

        fn set_port(&mut self, port: u16) {
            self.port = port;
        }

        fn probe(&mut self, _protocols: Protocols) -> Result<ScanResults> {
            Ok(ScanResults::new().with(Protocol::Udp, ScanOutcome::Closed))
        }
    }

    fn config() -> QueryConfig {
        QueryConfig::default().with_threads(4)
    }

    fn collecting_query(factory: MockFactory) -> (PortQuery<MockFactory>, Arc<Mutex<Vec<QueryRow>>>) {
        let rows = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rows);
        let query = PortQuery::new(factory, config()).with_callback(move |row| sink.lock().push(row));
        (query, rows)
    }

    #[test]
    fn test_state_machine() {
        let mut query = PortQuery::new(MockFactory::new(&[]), config());
        assert_eq!(query.state(), QueryState::Idle);

        let err = query.run().unwrap_err();
        assert!(matches!(err, PortQueryError::State(StateError::NotPrepared)));
        assert!(query.finalize().is_err());
        assert_eq!(query.last_error(), Some("No query prepared"));

        query.prepare("SELECT PORT FROM localhost WHERE PORT = 1").unwrap();
        assert_eq!(query.state(), QueryState::Prepared);
        assert_eq!(query.last_error(), None);

        let err = query.prepare("SELECT PORT FROM localhost").unwrap_err();
        assert!(matches!(err, PortQueryError::State(StateError::AlreadyPrepared)));
        assert_eq!(query.last_error(), Some("Previous query has not been finalized"));

        query.finalize().unwrap();
        assert_eq!(query.state(), QueryState::Idle);
    }

    #[test]
    fn test_parse_error_stays_idle() {
        let mut query = PortQuery::new(MockFactory::new(&[]), config());
        assert!(query.prepare("SELECT * FROM").is_err());
        assert_eq!(query.state(), QueryState::Idle);
        assert!(query.last_error().unwrap().contains("end of input"));
    }

    #[test]
    fn test_static_predicate_submits_only_matches() {
        let factory = MockFactory::new(&[]);
        let probes = Arc::clone(&factory.probes);
        let created = Arc::clone(&factory.created);
        let (mut query, rows) = collecting_query(factory);

        let summary = query
            .execute("SELECT PORT FROM localhost WHERE PORT = 1000 OR PORT = 5000")
            .unwrap();
        assert_eq!(
            summary,
            RunSummary {
                candidates: 2,
                submitted: 2,
                reported: 2,
                failed: 0
            }
        );
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(probes.load(Ordering::SeqCst), 0);

        let mut ports: Vec<u16> = rows.lock().iter().map(QueryRow::port).collect();
        ports.sort_unstable();
        assert_eq!(ports, vec![1000, 5000]);
        assert_eq!(query.state(), QueryState::Idle);
    }

    #[test]
    fn test_unknown_verdict_settled_by_probe() {
        let factory = MockFactory::new(&[22, 80]);
        let probes = Arc::clone(&factory.probes);
        let (mut query, rows) = collecting_query(factory);

        let summary = query
            .execute("SELECT PORT, TCP FROM localhost WHERE PORT < 100 AND TCP = OPEN")
            .unwrap();
        assert_eq!(summary.candidates, 100);
        assert_eq!(summary.reported, 2);
        assert_eq!(probes.load(Ordering::SeqCst), 100);

        let rows = rows.lock();
        assert!(rows
            .iter()
            .all(|row| row.outcome(Protocol::Tcp) == Some(ScanOutcome::Open)));
    }

    #[test]
    fn test_randomized_order_reports_same_rows() {
        let factory = MockFactory::new(&[7]);
        let rows = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rows);
        let settings = QueryConfig {
            randomize_order: true,
            push_rounds: 3,
            ..config()
        };
        let mut query = PortQuery::new(factory, settings).with_callback(move |row| sink.lock().push(row));

        let summary = query
            .execute("SELECT UDP FROM localhost WHERE PORT BETWEEN 1 AND 50 AND UDP IS OPEN")
            .unwrap();
        assert_eq!(summary.reported, 1);
        assert_eq!(rows.lock()[0].port(), 7);
    }

    #[test]
    fn test_probe_failure_is_counted() {
        let mut factory = MockFactory::new(&[]);
        factory.fail_port = Some(3);
        let mut query = PortQuery::new(factory, config());

        let summary = query
            .execute("SELECT TCP FROM localhost WHERE PORT BETWEEN 1 AND 5")
            .unwrap();
        assert_eq!(summary.submitted, 5);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.reported, 4);
        assert!(query.last_error().unwrap().contains("mock failure"));
    }

    #[test]
    fn test_inverted_between_has_no_candidates() {
        let factory = MockFactory::new(&[]);
        let created = Arc::clone(&factory.created);
        let mut query = PortQuery::new(factory, config());

        let summary = query
            .execute("SELECT * FROM localhost WHERE PORT BETWEEN 500 AND 100")
            .unwrap();
        assert_eq!(summary, RunSummary::default());
        assert_eq!(created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_between_decided_without_probing() {
        let factory = MockFactory::new(&[]);
        let probes = Arc::clone(&factory.probes);
        let mut query = PortQuery::new(factory, config());

        let summary = query
            .execute("SELECT PORT FROM localhost WHERE PORT BETWEEN 100 AND 500")
            .unwrap();
        assert_eq!(summary.candidates, 401);
        assert_eq!(summary.reported, 401);
        assert_eq!(probes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_protocol_predicate_probes_every_port() {
        let factory = MockFactory::new(&[]);
        let probes = Arc::clone(&factory.probes);
        let mut query = PortQuery::new(factory, config());

        let summary = query
            .execute("SELECT PORT FROM localhost WHERE UDP = CLOSED")
            .unwrap();
        assert_eq!(summary.candidates, 65536);
        assert_eq!(summary.submitted, 65536);
        assert_eq!(summary.reported, 65536);
        assert_eq!(probes.load(Ordering::SeqCst), 65536);
    }

    #[test]
    fn test_missing_outcome_counts_as_failure() {
        let factory = |_target: &str| UdpOnlyEnvironment { port: 0 };
        let mut query = PortQuery::new(factory, config());

        let summary = query
            .execute("SELECT PORT FROM localhost WHERE PORT < 3 AND TCP = OPEN")
            .unwrap();
        assert_eq!(
            summary,
            RunSummary {
                candidates: 3,
                submitted: 3,
                reported: 0,
                failed: 3
            }
        );
        assert!(query
            .last_error()
            .unwrap()
            .contains("probe returned no outcome for TCP"));
    }

    #[test]
    fn test_pool_spawn_failure_is_recorded() {
        let settings = QueryConfig {
            threads: crate::pool::MAX_THREADS + 1,
            ..config()
        };
        let mut query = PortQuery::new(MockFactory::new(&[]), settings);
        query.prepare("SELECT PORT FROM localhost WHERE PORT = 1").unwrap();

        let err = query.run().unwrap_err();
        assert!(matches!(err, PortQueryError::Config(_)));
        assert!(query.last_error().unwrap().contains("threads"));
        assert_eq!(query.state(), QueryState::Prepared);
    }

    #[test]
    fn test_reconfigure_applies_to_next_run() {
        let mut query = PortQuery::new(MockFactory::new(&[]), config());
        assert!(query
            .reconfigure(MockFactory::new(&[]), config().with_timeout_ms(0))
            .is_err());
        assert!(query.last_error().unwrap().contains("timeout_ms"));
        assert_eq!(query.config().timeout_ms, config().timeout_ms);

        let factory = MockFactory::new(&[9]);
        let probes = Arc::clone(&factory.probes);
        query
            .reconfigure(factory, config().with_threads(2).with_timeout_ms(50))
            .unwrap();
        assert_eq!(query.config().timeout_ms, 50);

        let summary = query
            .execute("SELECT TCP FROM localhost WHERE PORT < 10 AND TCP IS OPEN")
            .unwrap();
        assert_eq!(summary.reported, 1);
        assert_eq!(probes.load(Ordering::SeqCst), 10);
    }
}
