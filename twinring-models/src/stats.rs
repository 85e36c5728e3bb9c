// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Network-wide error and latency records.
//!
//! Receivers are given a [StatsSink] when they are created and only ever
//! append to it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

use crate::types::NodeId;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ErrorRecord {
    pub source_id: NodeId,
    pub destination_id: NodeId,
    pub timestamp: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatencyRecord {
    pub source_id: NodeId,
    pub destination_id: NodeId,
    pub latency: f64,
}

/// Append-only destination for the records of all receivers.
pub trait StatsSink {
    fn record_error(&self, record: ErrorRecord);
    fn record_latency(&self, record: LatencyRecord);
}

/// Keeps all records in memory.
#[derive(Default)]
pub struct StatsCollector {
    errors: RefCell<Vec<ErrorRecord>>,
    latencies: RefCell<Vec<LatencyRecord>>,
}

impl StatsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.errors.borrow().clone()
    }

    #[must_use]
    pub fn latencies(&self) -> Vec<LatencyRecord> {
        self.latencies.borrow().clone()
    }

    #[must_use]
    pub fn num_errors(&self) -> usize {
        self.errors.borrow().len()
    }

    #[must_use]
    pub fn num_latencies(&self) -> usize {
        self.latencies.borrow().len()
    }

    #[must_use]
    pub fn mean_latency(&self) -> Option<f64> {
        let latencies = self.latencies.borrow();
        if latencies.is_empty() {
            return None;
        }
        let total: f64 = latencies.iter().map(|r| r.latency).sum();
        Some(total / latencies.len() as f64)
    }

    #[must_use]
    pub fn max_latency(&self) -> Option<f64> {
        self.latencies
            .borrow()
            .iter()
            .map(|r| r.latency)
            .max_by(f64::total_cmp)
    }

    #[must_use]
    pub fn errors_per_destination(&self) -> BTreeMap<NodeId, usize> {
        let mut counts = BTreeMap::new();
        for record in self.errors.borrow().iter() {
            *counts.entry(record.destination_id).or_insert(0) += 1;
        }
        counts
    }

    #[must_use]
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            num_received: self.num_latencies(),
            mean_latency: self.mean_latency(),
            max_latency: self.max_latency(),
            num_errors: self.num_errors(),
        }
    }
}

impl StatsSink for StatsCollector {
    fn record_error(&self, record: ErrorRecord) {
        self.errors.borrow_mut().push(record);
    }

    fn record_latency(&self, record: LatencyRecord) {
        self.latencies.borrow_mut().push(record);
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatsSummary {
    pub num_received: usize,
    pub mean_latency: Option<f64>,
    pub max_latency: Option<f64>,
    pub num_errors: usize,
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} data packets received", self.num_received)?;
        if let (Some(mean), Some(max)) = (self.mean_latency, self.max_latency) {
            write!(f, ", latency mean {mean:.1}ns max {max:.1}ns")?;
        }
        write!(f, ", {} errors", self.num_errors)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn empty() {
        let stats = StatsCollector::new();
        assert!(stats.mean_latency().is_none());
        assert!(stats.max_latency().is_none());
        assert_eq!(
            format!("{}", stats.summary()),
            "0 data packets received, 0 errors"
        );
    }

    #[test]
    fn summaries() {
        let stats = StatsCollector::new();
        for (source_id, latency) in [(0, 10.0), (1, 30.0), (2, 20.0)] {
            stats.record_latency(LatencyRecord {
                source_id,
                destination_id: 3,
                latency,
            });
        }
        for destination_id in [3, 3, 1] {
            stats.record_error(ErrorRecord {
                source_id: 0,
                destination_id,
                timestamp: 5.0,
            });
        }

        assert_relative_eq!(stats.mean_latency().unwrap(), 20.0);
        assert_relative_eq!(stats.max_latency().unwrap(), 30.0);
        assert_eq!(
            stats.errors_per_destination(),
            BTreeMap::from([(1, 1), (3, 2)])
        );
        assert_eq!(
            format!("{}", stats.summary()),
            "3 data packets received, latency mean 20.0ns max 30.0ns, 3 errors"
        );
    }
}
