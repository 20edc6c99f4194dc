//! Feature building: raw transaction records → fixed-width numeric matrix.
//!
//! The builder is fitted once, centrally, on labeled training data. The
//! fitted state (encoders, imputation medians, scaling statistics, and the
//! ordered column schema) is frozen and reused unchanged by every downstream
//! consumer. Per-partition training and request-time inference both go
//! through [`FeatureBuilder::transform`], which reconciles whatever columns
//! the input can produce against the fitted schema before the numeric
//! pipeline runs.

pub mod encoders;
pub mod schema;

pub use encoders::{MedianImputer, OneHotEncoder, RateTable, StandardScaler, TargetEncoder};
pub use schema::{reconcile, ColumnFrame, FeatureSchema};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::types::RawTransaction;

/// Prioritized timestamp formats, most common first. Matches the raw corpus.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%m/%d/%y %H:%M",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

/// Best-effort fallbacks tried after the prioritized list.
const TIMESTAMP_FALLBACK_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Birth-date formats, most common first.
const DATE_FORMATS: &[&str] = &["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d"];

fn normalize_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let cleaned = normalize_whitespace(raw);
    for fmt in TIMESTAMP_FORMATS.iter().chain(TIMESTAMP_FALLBACK_FORMATS) {
        if let Ok(ts) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Some(ts);
        }
    }
    DateTime::parse_from_rfc3339(&cleaned)
        .ok()
        .map(|dt| dt.naive_utc())
}

fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = normalize_whitespace(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
}

/// A record that survived date parsing.
struct ParsedRow<'a> {
    index: usize,
    txn: &'a RawTransaction,
    ts: NaiveDateTime,
    dob: NaiveDate,
}

fn parse_rows<'a>(
    records: &'a [RawTransaction],
    require_label: bool,
) -> PipelineResult<Vec<ParsedRow<'a>>> {
    let mut parsed = Vec::with_capacity(records.len());
    for (index, txn) in records.iter().enumerate() {
        if require_label && txn.is_fraud.is_none() {
            continue;
        }
        let (Some(ts), Some(dob)) = (
            parse_timestamp(&txn.trans_date_trans_time),
            parse_birth_date(&txn.dob),
        ) else {
            continue;
        };
        parsed.push(ParsedRow {
            index,
            txn,
            ts,
            dob,
        });
    }

    let dropped = records.len() - parsed.len();
    if dropped > 0 {
        warn!(dropped, kept = parsed.len(), "rows dropped during date parsing");
    }
    if parsed.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    Ok(parsed)
}

/// Feature builder with all fitted state frozen at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureBuilder {
    target_encoder: TargetEncoder,
    state_rate: RateTable,
    category_encoder: OneHotEncoder,
    gender_encoder: OneHotEncoder,
    imputer: MedianImputer,
    scaler: StandardScaler,
    schema: FeatureSchema,
}

/// Output of fitting the builder on labeled training data.
#[derive(Debug)]
pub struct FitResult {
    pub builder: FeatureBuilder,
    pub matrix: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
    /// Indices into the input slice for the rows that survived parsing, in
    /// matrix row order.
    pub kept_rows: Vec<usize>,
}

/// Output of transforming records with a fitted builder.
pub struct TransformOutput {
    pub matrix: Vec<Vec<f64>>,
    /// Indices into the input slice for the rows that survived parsing.
    pub kept_rows: Vec<usize>,
}

impl FeatureBuilder {
    /// Fit encoders, imputation, scaling, and the column schema on labeled
    /// training records, returning the fitted builder along with the
    /// training matrix and labels.
    ///
    /// Rows whose timestamp or birth date fail every candidate format, or
    /// that carry no label, are dropped; an entirely dropped input is
    /// [`PipelineError::EmptyInput`].
    pub fn fit(records: &[RawTransaction], smoothing: f64) -> PipelineResult<FitResult> {
        let parsed = parse_rows(records, true)?;
        let labels: Vec<u8> = parsed
            .iter()
            .map(|p| p.txn.is_fraud.unwrap_or(0))
            .collect();

        let merchants = parsed.iter().map(|p| p.txn.merchant.as_deref());
        let target_encoder = TargetEncoder::fit(merchants, &labels, smoothing);

        let states = parsed.iter().map(|p| p.txn.state.as_deref());
        let state_rate = RateTable::fit(states, &labels);

        let category_encoder =
            OneHotEncoder::fit("category", parsed.iter().map(|p| p.txn.category.as_deref()));
        let gender_encoder =
            OneHotEncoder::fit("gender", parsed.iter().map(|p| p.txn.gender.as_deref()));

        let frame = encode_frame(
            &parsed,
            &target_encoder,
            &state_rate,
            &category_encoder,
            &gender_encoder,
            true,
        );
        let schema = FeatureSchema::new(frame.names().to_vec());

        let imputer = MedianImputer::fit(frame.columns());
        let mut matrix = imputer.fill(&frame);
        let scaler = StandardScaler::fit(&matrix, schema.len());
        scaler.apply(&mut matrix);

        debug!(
            columns = schema.len(),
            rows = matrix.len(),
            "feature builder fitted"
        );

        let kept_rows = parsed.iter().map(|p| p.index).collect();
        Ok(FitResult {
            builder: FeatureBuilder {
                target_encoder,
                state_rate,
                category_encoder,
                gender_encoder,
                imputer,
                scaler,
                schema,
            },
            matrix,
            labels,
            kept_rows,
        })
    }

    /// Transform records with the frozen fitted state.
    ///
    /// The encoded columns are reconciled against the fitted schema (see
    /// [`schema::reconcile`]) before imputation and scaling, so a record
    /// missing a field the schema expects gets that column imputed, and any
    /// field the schema does not know is discarded.
    pub fn transform(&self, records: &[RawTransaction]) -> PipelineResult<TransformOutput> {
        let parsed = parse_rows(records, false)?;

        let frame = encode_frame(
            &parsed,
            &self.target_encoder,
            &self.state_rate,
            &self.category_encoder,
            &self.gender_encoder,
            false,
        );
        let reconciled = reconcile(&frame, &self.schema);
        if reconciled.names() != self.schema.columns() {
            return Err(PipelineError::SchemaMismatch {
                expected: self.schema.len(),
                found: reconciled.names().len(),
            });
        }

        let mut matrix = self.imputer.fill(&reconciled);
        self.scaler.apply(&mut matrix);
        for row in &matrix {
            if row.len() != self.schema.len() {
                return Err(PipelineError::SchemaMismatch {
                    expected: self.schema.len(),
                    found: row.len(),
                });
            }
        }

        let kept_rows = parsed.iter().map(|p| p.index).collect();
        Ok(TransformOutput { matrix, kept_rows })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn state_rate(&self) -> &RateTable {
        &self.state_rate
    }

    pub fn target_encoder(&self) -> &TargetEncoder {
        &self.target_encoder
    }

    pub fn global_rate(&self) -> f64 {
        self.state_rate.global_rate()
    }
}

/// Build the encoded column frame for a batch of parsed rows.
///
/// With `emit_all` (fit time) every column group is generated so the schema
/// covers the full feature set. Without it (transform time) a column group
/// whose source field is absent from every row is left out entirely and
/// surfaces downstream as a reconciliation miss, matching how pre-aggregated
/// training input and raw serving input can disagree.
fn encode_frame(
    parsed: &[ParsedRow<'_>],
    target_encoder: &TargetEncoder,
    state_rate: &RateTable,
    category_encoder: &OneHotEncoder,
    gender_encoder: &OneHotEncoder,
    emit_all: bool,
) -> ColumnFrame {
    let mut frame = ColumnFrame::new(parsed.len());

    let amt_log: Vec<Option<f64>> = parsed
        .iter()
        .map(|p| p.txn.amt.map(f64::ln_1p))
        .collect();
    if emit_all || amt_log.iter().any(Option::is_some) {
        frame.push_column("amt_log", amt_log);
    }

    let distance: Vec<Option<f64>> = parsed
        .iter()
        .map(|p| match (p.txn.lat, p.txn.long, p.txn.merch_lat, p.txn.merch_long) {
            (Some(lat), Some(long), Some(mlat), Some(mlong)) => {
                Some(((mlat - lat).powi(2) + (mlong - long).powi(2)).sqrt())
            }
            _ => None,
        })
        .collect();
    if emit_all || distance.iter().any(Option::is_some) {
        frame.push_column("distance", distance);
    }

    frame.push_column(
        "age",
        parsed
            .iter()
            .map(|p| Some((p.ts.date() - p.dob).num_days().div_euclid(365) as f64))
            .collect(),
    );
    frame.push_column(
        "txn_hour",
        parsed
            .iter()
            .map(|p| Some(chrono::Timelike::hour(&p.ts) as f64))
            .collect(),
    );
    frame.push_column(
        "txn_dow",
        parsed
            .iter()
            .map(|p| Some(chrono::Datelike::weekday(&p.ts).num_days_from_monday() as f64))
            .collect(),
    );
    frame.push_column(
        "txn_month",
        parsed
            .iter()
            .map(|p| Some(chrono::Datelike::month(&p.ts) as f64))
            .collect(),
    );

    let city_pop: Vec<Option<f64>> = parsed.iter().map(|p| p.txn.city_pop).collect();
    if emit_all || city_pop.iter().any(Option::is_some) {
        frame.push_column("city_pop", city_pop);
    }

    let merchant_te: Vec<Option<f64>> = parsed
        .iter()
        .map(|p| target_encoder.encode(p.txn.merchant.as_deref()))
        .collect();
    if emit_all || merchant_te.iter().any(Option::is_some) {
        frame.push_column("merchant_te", merchant_te);
    }

    let state_risk: Vec<Option<f64>> = parsed
        .iter()
        .map(|p| state_rate.encode(p.txn.state.as_deref()))
        .collect();
    if emit_all || state_risk.iter().any(Option::is_some) {
        frame.push_column("state_risk", state_risk);
    }

    let categories: Vec<Option<&str>> = parsed.iter().map(|p| p.txn.category.as_deref()).collect();
    if emit_all || categories.iter().any(Option::is_some) {
        for (name, column) in category_encoder
            .column_names()
            .into_iter()
            .zip(category_encoder.encode(&categories))
        {
            frame.push_column(name, column);
        }
    }

    let genders: Vec<Option<&str>> = parsed.iter().map(|p| p.txn.gender.as_deref()).collect();
    if emit_all || genders.iter().any(Option::is_some) {
        for (name, column) in gender_encoder
            .column_names()
            .into_iter()
            .zip(gender_encoder.encode(&genders))
        {
            frame.push_column(name, column);
        }
    }

    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(
        ts: &str,
        dob: &str,
        state: &str,
        merchant: &str,
        category: &str,
        amt: f64,
        fraud: u8,
    ) -> RawTransaction {
        let mut t = RawTransaction::new(ts, dob);
        t.state = Some(state.to_string());
        t.merchant = Some(merchant.to_string());
        t.category = Some(category.to_string());
        t.gender = Some("F".to_string());
        t.amt = Some(amt);
        t.lat = Some(40.0);
        t.long = Some(-74.0);
        t.merch_lat = Some(40.5);
        t.merch_long = Some(-74.5);
        t.city_pop = Some(10_000.0);
        t.is_fraud = Some(fraud);
        t
    }

    fn training_set() -> Vec<RawTransaction> {
        vec![
            txn("01/02/20 13:45", "1/5/80", "NY", "m_a", "food", 25.0, 0),
            txn("01/03/20 02:10", "3/15/92", "NY", "m_b", "travel", 900.0, 1),
            txn("01/04/20 19:30", "7/1/75", "CA", "m_a", "food", 12.5, 0),
            txn("01/05/20 23:59", "12/25/88", "CA", "m_c", "misc", 480.0, 1),
        ]
    }

    #[test]
    fn test_fit_produces_fixed_schema() {
        let fit = FeatureBuilder::fit(&training_set(), 20.0).unwrap();

        let expected = [
            "amt_log",
            "distance",
            "age",
            "txn_hour",
            "txn_dow",
            "txn_month",
            "city_pop",
            "merchant_te",
            "state_risk",
            "category_food",
            "category_misc",
            "category_travel",
            "gender_F",
        ];
        assert_eq!(fit.builder.schema().columns(), expected);
        assert_eq!(fit.matrix.len(), 4);
        assert_eq!(fit.labels, vec![0, 1, 0, 1]);
        assert!(fit.matrix.iter().all(|row| row.len() == expected.len()));
    }

    #[test]
    fn test_unparseable_rows_are_dropped() {
        let mut records = training_set();
        records[1].trans_date_trans_time = "not a date".to_string();

        let fit = FeatureBuilder::fit(&records, 20.0).unwrap();
        assert_eq!(fit.matrix.len(), 3);
        assert_eq!(fit.kept_rows, vec![0, 2, 3]);
    }

    #[test]
    fn test_all_rows_dropped_is_empty_input() {
        let records = vec![RawTransaction::new("garbage", "also garbage")];
        match FeatureBuilder::fit(&records, 20.0) {
            Err(PipelineError::EmptyInput) => {}
            other => panic!("expected EmptyInput, got {other:?}"),
        }
    }

    #[test]
    fn test_transform_is_deterministic() {
        let fit = FeatureBuilder::fit(&training_set(), 20.0).unwrap();
        let probe = vec![txn("02/01/20 08:00", "6/6/90", "NY", "m_a", "food", 55.0, 0)];

        let a = fit.builder.transform(&probe).unwrap();
        let b = fit.builder.transform(&probe).unwrap();

        assert_eq!(a.matrix.len(), 1);
        for (x, y) in a.matrix[0].iter().zip(&b.matrix[0]) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_unseen_categories_do_not_fail() {
        let fit = FeatureBuilder::fit(&training_set(), 20.0).unwrap();
        let probe = vec![txn(
            "02/01/20 08:00",
            "6/6/90",
            "ZZ",
            "never_seen_merchant",
            "gambling",
            55.0,
            0,
        )];

        let out = fit.builder.transform(&probe).unwrap();
        assert_eq!(out.matrix[0].len(), fit.builder.schema().len());
    }

    #[test]
    fn test_missing_category_field_is_imputed_not_an_error() {
        let fit = FeatureBuilder::fit(&training_set(), 20.0).unwrap();
        let mut probe = txn("02/01/20 08:00", "6/6/90", "NY", "m_a", "food", 55.0, 0);
        probe.category = None;

        let out = fit.builder.transform(&[probe]).unwrap();
        // width still matches the fitted schema; the category indicators were
        // synthesized by reconciliation and filled by the imputer
        assert_eq!(out.matrix[0].len(), fit.builder.schema().len());
    }

    #[test]
    fn test_birth_date_formats() {
        let expected = NaiveDate::from_ymd_opt(1980, 1, 5).unwrap();
        assert_eq!(parse_birth_date("1/5/80"), Some(expected));
        assert_eq!(parse_birth_date("1/5/1980"), Some(expected));
        assert_eq!(parse_birth_date("1980-01-05"), Some(expected));
        assert_eq!(parse_birth_date("05.01.1980"), None);
    }

    #[test]
    fn test_timestamp_fallback_formats() {
        assert!(parse_timestamp("01/02/20 13:45").is_some());
        assert!(parse_timestamp("2020-01-02 13:45:00").is_some());
        assert!(parse_timestamp("2020-01-02T13:45:00+00:00").is_some());
        assert!(parse_timestamp("nonsense").is_none());
    }
}
