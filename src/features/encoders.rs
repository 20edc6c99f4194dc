//! Fitted encoders and numeric preprocessing.
//!
//! Everything here is fitted once on training data and frozen: the fitted
//! state serializes into the artifact bundle and is reused unchanged at
//! inference time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::features::schema::ColumnFrame;

/// Historical fraud-rate lookup for a categorical key, with a global
/// fallback rate for keys never seen in training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTable {
    rates: BTreeMap<String, f64>,
    global_rate: f64,
}

impl RateTable {
    /// Compute per-key fraud incidence and the corpus-wide global rate.
    pub fn fit<'a, I>(values: I, labels: &[u8]) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut counts: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        let mut total = 0u64;
        let mut positive = 0u64;

        for (value, &label) in values.into_iter().zip(labels) {
            total += 1;
            positive += u64::from(label);
            if let Some(key) = value {
                let entry = counts.entry(key.to_string()).or_insert((0, 0));
                entry.0 += 1;
                entry.1 += u64::from(label);
            }
        }

        let global_rate = if total > 0 {
            positive as f64 / total as f64
        } else {
            0.0
        };
        let rates = counts
            .into_iter()
            .map(|(key, (n, pos))| (key, pos as f64 / n as f64))
            .collect();

        Self { rates, global_rate }
    }

    /// Look up a key's rate; unseen keys fall back to the global rate, an
    /// absent value stays missing.
    pub fn encode(&self, value: Option<&str>) -> Option<f64> {
        value.map(|v| self.rates.get(v).copied().unwrap_or(self.global_rate))
    }

    pub fn global_rate(&self) -> f64 {
        self.global_rate
    }

    pub fn rates(&self) -> &BTreeMap<String, f64> {
        &self.rates
    }
}

/// Smoothed target encoding for high-cardinality categoricals (merchant).
///
/// Encodes each key as `(pos + k·prior) / (n + k)` where `prior` is the
/// global fraud rate and `k` the smoothing strength, so rarely seen
/// merchants shrink toward the prior instead of memorizing their handful of
/// labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEncoder {
    encodings: BTreeMap<String, f64>,
    prior: f64,
}

impl TargetEncoder {
    pub fn fit<'a, I>(values: I, labels: &[u8], smoothing: f64) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut counts: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        let mut total = 0u64;
        let mut positive = 0u64;

        for (value, &label) in values.into_iter().zip(labels) {
            total += 1;
            positive += u64::from(label);
            if let Some(key) = value {
                let entry = counts.entry(key.to_string()).or_insert((0, 0));
                entry.0 += 1;
                entry.1 += u64::from(label);
            }
        }

        let prior = if total > 0 {
            positive as f64 / total as f64
        } else {
            0.0
        };
        let encodings = counts
            .into_iter()
            .map(|(key, (n, pos))| {
                let smoothed = (pos as f64 + smoothing * prior) / (n as f64 + smoothing);
                (key, smoothed)
            })
            .collect();

        Self { encodings, prior }
    }

    /// Unseen keys encode to the prior; an absent value stays missing.
    pub fn encode(&self, value: Option<&str>) -> Option<f64> {
        value.map(|v| self.encodings.get(v).copied().unwrap_or(self.prior))
    }

    pub fn prior(&self) -> f64 {
        self.prior
    }
}

/// One-hot encoding with unknown-category tolerance: a value outside the
/// fitted vocabulary maps to an all-zero indicator row, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    field: String,
    vocabulary: Vec<String>,
}

impl OneHotEncoder {
    pub fn fit<'a, I>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut vocabulary: Vec<String> = values
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();
        vocabulary.sort();
        vocabulary.dedup();

        Self {
            field: field.into(),
            vocabulary,
        }
    }

    /// Encoded column names, one per vocabulary entry.
    pub fn column_names(&self) -> Vec<String> {
        self.vocabulary
            .iter()
            .map(|v| format!("{}_{}", self.field, v))
            .collect()
    }

    /// Indicator columns for a batch of values. An absent value yields
    /// missing cells (imputed downstream); an unseen value yields zeros.
    pub fn encode(&self, values: &[Option<&str>]) -> Vec<Vec<Option<f64>>> {
        self.vocabulary
            .iter()
            .map(|entry| {
                values
                    .iter()
                    .map(|v| v.map(|s| if s == entry { 1.0 } else { 0.0 }))
                    .collect()
            })
            .collect()
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }
}

/// Per-column median imputation, fitted on training data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: Vec<f64>,
}

impl MedianImputer {
    /// Fit one median per column, in column order. A column with no present
    /// values imputes to 0.
    pub fn fit(columns: &[Vec<Option<f64>>]) -> Self {
        let medians = columns.iter().map(|col| median(col)).collect();
        Self { medians }
    }

    /// Densify a frame, replacing missing cells with the fitted medians.
    /// The frame must already conform to the fitted column order.
    pub fn fill(&self, frame: &ColumnFrame) -> Vec<Vec<f64>> {
        frame.to_rows(|c, v| v.unwrap_or(self.medians[c]))
    }

    pub fn medians(&self) -> &[f64] {
        &self.medians
    }
}

fn median(column: &[Option<f64>]) -> f64 {
    let mut present: Vec<f64> = column.iter().flatten().copied().collect();
    if present.is_empty() {
        return 0.0;
    }
    present.sort_by(|a, b| a.partial_cmp(b).expect("non-finite value in numeric column"));
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        (present[mid - 1] + present[mid]) / 2.0
    } else {
        present[mid]
    }
}

/// Per-column standardization ((x − mean) / std), fitted on imputed
/// training data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>], width: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; width];
        for row in rows {
            for (c, v) in row.iter().enumerate() {
                means[c] += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut stds = vec![0.0; width];
        for row in rows {
            for (c, v) in row.iter().enumerate() {
                stds[c] += (v - means[c]).powi(2);
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt();
            // constant column: leave values centered, not divided away
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        Self { means, stds }
    }

    pub fn apply(&self, rows: &mut [Vec<f64>]) {
        for row in rows {
            for (c, v) in row.iter_mut().enumerate() {
                *v = (*v - self.means[c]) / self.stds[c];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_table_fallback() {
        let values = [Some("NY"), Some("NY"), Some("CA"), Some("CA")];
        let labels = [1, 1, 0, 1];
        let table = RateTable::fit(values, &labels);

        assert_eq!(table.encode(Some("NY")), Some(1.0));
        assert_eq!(table.encode(Some("CA")), Some(0.5));
        // unseen key falls back to the global rate
        assert_eq!(table.encode(Some("TX")), Some(0.75));
        assert_eq!(table.encode(None), None);
    }

    #[test]
    fn test_target_encoder_shrinks_toward_prior() {
        let values = [Some("a"), Some("a"), Some("b"), Some("b")];
        let labels = [1, 1, 0, 0];
        let enc = TargetEncoder::fit(values, &labels, 2.0);

        // prior is 0.5; "a" has raw rate 1.0 but shrinks to (2 + 1)/(2 + 2)
        assert!((enc.encode(Some("a")).unwrap() - 0.75).abs() < 1e-12);
        assert!((enc.encode(Some("b")).unwrap() - 0.25).abs() < 1e-12);
        assert_eq!(enc.encode(Some("zzz")), Some(0.5));
    }

    #[test]
    fn test_one_hot_unseen_maps_to_zeros() {
        let enc = OneHotEncoder::fit("category", [Some("food"), Some("travel"), Some("food")]);
        assert_eq!(enc.column_names(), ["category_food", "category_travel"]);

        let cols = enc.encode(&[Some("food"), Some("gambling"), None]);
        assert_eq!(cols[0], vec![Some(1.0), Some(0.0), None]);
        assert_eq!(cols[1], vec![Some(0.0), Some(0.0), None]);
    }

    #[test]
    fn test_median_imputer() {
        let columns = vec![vec![Some(1.0), Some(3.0), None], vec![None, None, None]];
        let imputer = MedianImputer::fit(&columns);
        assert_eq!(imputer.medians(), &[2.0, 0.0]);

        let mut frame = ColumnFrame::new(1);
        frame.push_column("a", vec![None]);
        frame.push_column("b", vec![None]);
        assert_eq!(imputer.fill(&frame), vec![vec![2.0, 0.0]]);
    }

    #[test]
    fn test_scaler_constant_column() {
        let rows = vec![vec![5.0, 1.0], vec![5.0, 3.0]];
        let scaler = StandardScaler::fit(&rows, 2);

        let mut out = rows.clone();
        scaler.apply(&mut out);
        // constant column centers to zero without dividing by zero
        assert_eq!(out[0][0], 0.0);
        assert_eq!(out[1][0], 0.0);
        assert!(out[0][1] < 0.0 && out[1][1] > 0.0);
    }
}
