//! Append-only injection history.
//!
//! Records are addressed by index and never mutated or removed. A user's
//! settlement pointer is an index into this log, so lazy settlement can walk
//! exactly the injections the user has not yet folded in.

use serde::{Deserialize, Serialize};

use crate::types::InjectionRecord;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct InjectionLog {
    records: Vec<InjectionRecord>,
}

impl InjectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from persisted records.
    pub fn from_records(records: Vec<InjectionRecord>) -> Self {
        Self { records }
    }

    /// Append a record and return its index.
    pub fn push(&mut self, record: InjectionRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&InjectionRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The most recent injection, if any.
    pub fn latest(&self) -> Option<&InjectionRecord> {
        self.records.last()
    }

    /// Records from `start` to the end, paired with their indices.
    /// Empty if `start >= len()`.
    pub fn iter_from(&self, start: usize) -> impl Iterator<Item = (usize, &InjectionRecord)> {
        self.records.iter().enumerate().skip(start)
    }

    pub fn records(&self) -> &[InjectionRecord] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(t: u64) -> InjectionRecord {
        InjectionRecord { coefficient: u128::from(t), amount: 1, timestamp: t }
    }

    #[test]
    fn push_returns_sequential_indices() {
        let mut log = InjectionLog::new();
        assert!(log.is_empty());
        assert_eq!(log.push(rec(10)), 0);
        assert_eq!(log.push(rec(20)), 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.latest().map(|r| r.timestamp), Some(20));
        assert_eq!(log.get(0).map(|r| r.timestamp), Some(10));
        assert!(log.get(2).is_none());
    }

    #[test]
    fn iter_from_skips_settled_prefix() {
        let mut log = InjectionLog::new();
        for t in [1, 2, 3, 4] {
            log.push(rec(t));
        }
        let idx: Vec<usize> = log.iter_from(2).map(|(i, _)| i).collect();
        assert_eq!(idx, vec![2, 3]);
        assert_eq!(log.iter_from(4).count(), 0);
        assert_eq!(log.iter_from(99).count(), 0);
    }

    #[test]
    fn from_records_preserves_order() {
        let log = InjectionLog::from_records(vec![rec(5), rec(6)]);
        assert_eq!(log.records()[1].timestamp, 6);
        assert_eq!(log.latest(), Some(&rec(6)));
    }
}
