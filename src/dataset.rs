//! Raw data ingestion, class rebalancing, and the per-state partition split.

use std::collections::BTreeMap;
use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use tracing::{info, warn};

use crate::error::PipelineResult;
use crate::types::RawTransaction;

/// Read raw transaction records from a headered CSV file. Columns the
/// record type does not know are ignored.
pub fn read_transactions(path: impl AsRef<Path>) -> PipelineResult<Vec<RawTransaction>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        let txn: RawTransaction = row?;
        records.push(txn);
    }
    info!(path = %path.display(), rows = records.len(), "raw CSV loaded");
    Ok(records)
}

/// A featurized training set with its partition keys, row-aligned.
#[derive(Debug, Clone)]
pub struct LabeledSet {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<u8>,
    /// Partition key per row; rows without a state code carry "UNK".
    pub states: Vec<String>,
}

/// One state's slice of the training set.
#[derive(Debug, Clone)]
pub struct Partition {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<u8>,
}

/// Random over-sampling of the minority class to parity, followed by random
/// under-sampling of the majority class down to the minority count. Both
/// stages draw from one seeded stream.
pub fn rebalance(set: &LabeledSet, seed: u64) -> LabeledSet {
    let minority_label = match minority(&set.y) {
        Some(label) => label,
        None => {
            warn!("single-class training set, rebalancing skipped");
            return set.clone();
        }
    };

    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let minority_idx: Vec<usize> = indices_of(&set.y, minority_label);
    let majority_idx: Vec<usize> = indices_of(&set.y, 1 - minority_label);

    // over-sample the minority with replacement up to the majority count
    let mut keep: Vec<usize> = (0..set.y.len()).collect();
    for _ in minority_idx.len()..majority_idx.len() {
        keep.push(minority_idx[rng.gen_range(0..minority_idx.len())]);
    }

    // under-sample the majority down to the (now grown) minority count
    let minority_total = keep.iter().filter(|&&i| set.y[i] == minority_label).count();
    let mut majority_keep: Vec<usize> = keep
        .iter()
        .copied()
        .filter(|&i| set.y[i] != minority_label)
        .collect();
    for i in (1..majority_keep.len()).rev() {
        let j = rng.gen_range(0..=i);
        majority_keep.swap(i, j);
    }
    majority_keep.truncate(minority_total);

    let mut selected: Vec<usize> = keep
        .iter()
        .copied()
        .filter(|&i| set.y[i] == minority_label)
        .collect();
    selected.extend(majority_keep);
    selected.sort_unstable();

    let balanced = LabeledSet {
        x: selected.iter().map(|&i| set.x[i].clone()).collect(),
        y: selected.iter().map(|&i| set.y[i]).collect(),
        states: selected.iter().map(|&i| set.states[i].clone()).collect(),
    };
    info!(
        before = set.y.len(),
        after = balanced.y.len(),
        "training set rebalanced"
    );
    balanced
}

fn minority(y: &[u8]) -> Option<u8> {
    let pos = y.iter().filter(|&&l| l == 1).count();
    let neg = y.len() - pos;
    if pos == 0 || neg == 0 {
        return None;
    }
    Some(if pos <= neg { 1 } else { 0 })
}

fn indices_of(y: &[u8], label: u8) -> Vec<usize> {
    y.iter()
        .enumerate()
        .filter_map(|(i, &l)| (l == label).then_some(i))
        .collect()
}

/// Group a featurized set by state code, one partition per state.
pub fn split_by_state(set: &LabeledSet) -> BTreeMap<String, Partition> {
    let mut partitions: BTreeMap<String, Partition> = BTreeMap::new();
    for (i, state) in set.states.iter().enumerate() {
        let partition = partitions.entry(state.clone()).or_insert_with(|| Partition {
            x: Vec::new(),
            y: Vec::new(),
        });
        partition.x.push(set.x[i].clone());
        partition.y.push(set.y[i]);
    }
    info!(partitions = partitions.len(), "split by state");
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn skewed_set() -> LabeledSet {
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut states = Vec::new();
        for i in 0..90 {
            x.push(vec![i as f64]);
            y.push(0);
            states.push(if i % 2 == 0 { "NY" } else { "CA" }.to_string());
        }
        for i in 0..10 {
            x.push(vec![1000.0 + i as f64]);
            y.push(1);
            states.push("NY".to_string());
        }
        LabeledSet { x, y, states }
    }

    #[test]
    fn test_rebalance_reaches_parity() {
        let balanced = rebalance(&skewed_set(), 42);
        let pos = balanced.y.iter().filter(|&&l| l == 1).count();
        let neg = balanced.y.len() - pos;
        assert_eq!(pos, neg);
    }

    #[test]
    fn test_rebalance_is_deterministic() {
        let a = rebalance(&skewed_set(), 42);
        let b = rebalance(&skewed_set(), 42);
        assert_eq!(a.y, b.y);
        assert_eq!(a.states, b.states);
    }

    #[test]
    fn test_split_by_state_groups_rows() {
        let set = skewed_set();
        let partitions = split_by_state(&set);

        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions["CA"].y.len(), 45);
        assert_eq!(partitions["NY"].y.len(), 55);
    }

    #[test]
    fn test_read_transactions_ignores_unknown_columns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "id,trans_date_trans_time,dob,merchant,category,amt,state,is_fraud"
        )
        .unwrap();
        writeln!(
            file,
            "7,01/02/20 13:45,1/5/80,m_a,food,25.0,NY,0"
        )
        .unwrap();
        writeln!(file, "8,01/03/20 02:10,3/15/92,m_b,,,CA,1").unwrap();
        file.flush().unwrap();

        let records = read_transactions(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amt, Some(25.0));
        assert!(records[1].category.is_none());
        assert!(records[1].amt.is_none());
        assert_eq!(records[1].is_fraud, Some(1));
    }
}
