//! Fitted feature schema and column reconciliation.
//!
//! The schema is the ordered list of encoded column names frozen when the
//! feature builder is fitted. Every matrix handed to the ensemble must
//! conform to it exactly: the classifiers underneath accept any matrix of
//! the right width, so a silently misaligned column produces wrong scores
//! rather than a crash. Reconciliation is therefore a named, independently
//! testable step, not inline glue.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ordered list of encoded column names expected by the fitted pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Column-oriented working frame: encoded columns by name, missing cells as
/// `None` so they flow through imputation.
#[derive(Debug, Clone)]
pub struct ColumnFrame {
    names: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
    rows: usize,
}

impl ColumnFrame {
    pub fn new(rows: usize) -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
            rows,
        }
    }

    /// Append a named column. The column length must equal the frame's row
    /// count.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        assert_eq!(values.len(), self.rows, "column length must match row count");
        self.names.push(name.into());
        self.columns.push(values);
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn columns(&self) -> &[Vec<Option<f64>>] {
        &self.columns
    }

    /// Densify into row-major order. Call only after reconciliation and
    /// imputation have removed every `None`.
    pub fn to_rows(&self, fill: impl Fn(usize, Option<f64>) -> f64) -> Vec<Vec<f64>> {
        (0..self.rows)
            .map(|r| {
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(c, col)| fill(c, col[r]))
                    .collect()
            })
            .collect()
    }
}

/// Rebuild `frame` to match `schema` exactly: columns the schema expects but
/// the frame lacks are synthesized as all-missing (they propagate through
/// imputation downstream), columns the schema does not know are dropped, and
/// the survivors are reordered to the schema's column order.
pub fn reconcile(frame: &ColumnFrame, schema: &FeatureSchema) -> ColumnFrame {
    let missing: Vec<&String> = schema
        .columns()
        .iter()
        .filter(|c| frame.column(c).is_none())
        .collect();
    let extra: Vec<&String> = frame
        .names()
        .iter()
        .filter(|n| !schema.columns().contains(*n))
        .collect();

    if !missing.is_empty() {
        debug!(?missing, "synthesizing expected columns absent from input");
    }
    if !extra.is_empty() {
        debug!(?extra, "dropping columns the fitted schema does not expect");
    }

    let mut out = ColumnFrame::new(frame.rows());
    for name in schema.columns() {
        let values = match frame.column(name) {
            Some(col) => col.to_vec(),
            None => vec![None; frame.rows()],
        };
        out.push_column(name.clone(), values);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec!["a".into(), "b".into(), "c".into()])
    }

    #[test]
    fn test_reconcile_inserts_missing_and_drops_extra() {
        let mut frame = ColumnFrame::new(2);
        frame.push_column("c", vec![Some(1.0), Some(2.0)]);
        frame.push_column("unexpected", vec![Some(9.0), Some(9.0)]);
        frame.push_column("a", vec![Some(3.0), None]);

        let out = reconcile(&frame, &schema());

        assert_eq!(out.names(), ["a", "b", "c"]);
        assert_eq!(out.column("a").unwrap(), &[Some(3.0), None]);
        assert_eq!(out.column("b").unwrap(), &[None, None]);
        assert_eq!(out.column("c").unwrap(), &[Some(1.0), Some(2.0)]);
        assert!(out.column("unexpected").is_none());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut frame = ColumnFrame::new(1);
        frame.push_column("b", vec![Some(0.5)]);

        let once = reconcile(&frame, &schema());
        let twice = reconcile(&once, &schema());

        assert_eq!(once.names(), twice.names());
        for name in schema().columns() {
            assert_eq!(once.column(name), twice.column(name));
        }
    }

    #[test]
    fn test_reconcile_preserves_schema_order() {
        let mut frame = ColumnFrame::new(1);
        frame.push_column("c", vec![Some(1.0)]);
        frame.push_column("b", vec![Some(2.0)]);
        frame.push_column("a", vec![Some(3.0)]);

        let out = reconcile(&frame, &schema());
        assert_eq!(out.names(), ["a", "b", "c"]);
    }
}
