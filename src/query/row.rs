//! Result rows reported for matching ports

use crate::environment::{Protocol, ScanOutcome, ScanResults};
use crate::sosql::{Column, SelectSet};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde::Serialize;
use smallvec::SmallVec;

/// One selected value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RowValue {
    Port(u16),
    Tcp(ScanOutcome),
    Udp(ScanOutcome),
}

impl RowValue {
    pub fn column(&self) -> Column {
        match self {
            RowValue::Port(_) => Column::Port,
            RowValue::Tcp(_) => Column::Tcp,
            RowValue::Udp(_) => Column::Udp,
        }
    }
}

/// A matching port with its values in select-list order
#[pyclass(frozen)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRow {
    port: u16,
    values: SmallVec<[RowValue; 3]>,
}

impl QueryRow {
    /// Build a row from the select list and whatever the probe returned
    ///
    /// A selected protocol without a recorded outcome is left out.
    pub fn build(port: u16, select_set: &SelectSet, results: &ScanResults) -> Self {
        let values = select_set
            .columns()
            .iter()
            .filter_map(|column| match column {
                Column::Port => Some(RowValue::Port(port)),
                Column::Tcp => results.get(Protocol::Tcp).map(RowValue::Tcp),
                Column::Udp => results.get(Protocol::Udp).map(RowValue::Udp),
            })
            .collect();
        Self { port, values }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn values(&self) -> &[RowValue] {
        &self.values
    }

    pub fn get(&self, column: Column) -> Option<RowValue> {
        self.values.iter().copied().find(|value| value.column() == column)
    }

    /// Outcome for a protocol, if that column was selected
    pub fn outcome(&self, protocol: Protocol) -> Option<ScanOutcome> {
        self.values.iter().find_map(|value| match (value, protocol) {
            (RowValue::Tcp(outcome), Protocol::Tcp) | (RowValue::Udp(outcome), Protocol::Udp) => {
                Some(*outcome)
            }
            _ => None,
        })
    }
}

#[pymethods]
impl QueryRow {
    /// Port number
    #[getter(port)]
    fn py_port(&self) -> u16 {
        self.port
    }

    /// TCP outcome name, None if TCP was not selected
    #[getter]
    fn tcp(&self) -> Option<&'static str> {
        self.outcome(Protocol::Tcp).map(ScanOutcome::name)
    }

    /// UDP outcome name, None if UDP was not selected
    #[getter]
    fn udp(&self) -> Option<&'static str> {
        self.outcome(Protocol::Udp).map(ScanOutcome::name)
    }

    /// Selected columns as an insertion-ordered dict
    fn to_dict(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        let dict = PyDict::new(py);
        for value in &self.values {
            let key = value.column().name();
            match value {
                RowValue::Port(port) => dict.set_item(key, port)?,
                RowValue::Tcp(outcome) | RowValue::Udp(outcome) => {
                    dict.set_item(key, outcome.name())?
                }
            }
        }
        Ok(dict.into())
    }

    fn __repr__(&self) -> String {
        let fields: Vec<String> = self
            .values
            .iter()
            .map(|value| match value {
                RowValue::Port(port) => format!("PORT={}", port),
                RowValue::Tcp(outcome) => format!("TCP={}", outcome),
                RowValue::Udp(outcome) => format!("UDP={}", outcome),
            })
            .collect();
        format!("QueryRow({})", fields.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sosql::parse;

    #[test]
    fn test_row_follows_select_order() {
        let statement = parse("SELECT UDP, PORT, TCP FROM localhost").unwrap();
        let results = ScanResults::new()
            .with(Protocol::Tcp, ScanOutcome::Open)
            .with(Protocol::Udp, ScanOutcome::Closed);

        let row = QueryRow::build(53, statement.select_set(), &results);
        assert_eq!(
            row.values(),
            &[
                RowValue::Udp(ScanOutcome::Closed),
                RowValue::Port(53),
                RowValue::Tcp(ScanOutcome::Open)
            ]
        );
        assert_eq!(row.outcome(Protocol::Tcp), Some(ScanOutcome::Open));
        assert_eq!(row.get(Column::Port), Some(RowValue::Port(53)));
    }

    #[test]
    fn test_unselected_protocol_absent() {
        let statement = parse("SELECT PORT FROM localhost").unwrap();
        let results = ScanResults::new().with(Protocol::Tcp, ScanOutcome::Open);
        let row = QueryRow::build(80, statement.select_set(), &results);
        assert_eq!(row.values(), &[RowValue::Port(80)]);
        assert_eq!(row.outcome(Protocol::Tcp), None);
    }

    #[test]
    fn test_row_serializes() {
        let statement = parse("SELECT PORT, TCP FROM localhost").unwrap();
        let results = ScanResults::new().with(Protocol::Tcp, ScanOutcome::Rejected);
        let row = QueryRow::build(22, statement.select_set(), &results);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"port":22,"values":[{"PORT":22},{"TCP":"REJECTED"}]}"#);
        assert_eq!(row.__repr__(), "QueryRow(PORT=22, TCP=REJECTED)");
    }
}
