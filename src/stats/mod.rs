//! # Per-job statistics aggregation.
//!
//! Each external runner owns one [`Statsd`] keyed by its command id. The
//! meter feeds gauges into it every sampling tick; [`Statsd::flush`] drains
//! the buckets into a [`Stats`] snapshot, which the manager forwards to the
//! stats fan-out. The manager never aggregates across jobs; downstream
//! sinks (a stats buffer posting to controllers, for instance) do that.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A flushed, aggregated snapshot for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    /// Source key, `cmd.<id>` for job meters.
    pub key: String,
    /// Flush moment, seconds since the epoch.
    pub timestamp: i64,
    /// Aggregated values: mean for gauges, sum for counters.
    pub series: BTreeMap<String, f64>,
}

enum Bucket {
    Gauge(Vec<f64>),
    Counter(f64),
}

/// Statsd-like accumulator for one source.
pub struct Statsd {
    key: String,
    buckets: Mutex<BTreeMap<String, Bucket>>,
}

impl Statsd {
    /// Creates an accumulator for the given source key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            buckets: Mutex::new(BTreeMap::new()),
        }
    }

    /// Records a gauge sample; samples are averaged per flush window.
    pub fn gauge(&self, name: &str, value: f64) {
        let mut buckets = self.buckets.lock().expect("stats buckets poisoned");
        match buckets.get_mut(name) {
            Some(Bucket::Gauge(samples)) => samples.push(value),
            _ => {
                buckets.insert(name.to_string(), Bucket::Gauge(vec![value]));
            }
        }
    }

    /// Adds to a counter; counters are summed per flush window.
    pub fn incr(&self, name: &str, value: f64) {
        let mut buckets = self.buckets.lock().expect("stats buckets poisoned");
        match buckets.get_mut(name) {
            Some(Bucket::Counter(total)) => *total += value,
            _ => {
                buckets.insert(name.to_string(), Bucket::Counter(value));
            }
        }
    }

    /// Drains the current window into a snapshot; `None` when nothing was fed.
    pub fn flush(&self) -> Option<Stats> {
        let mut buckets = self.buckets.lock().expect("stats buckets poisoned");
        if buckets.is_empty() {
            return None;
        }

        let series = std::mem::take(&mut *buckets)
            .into_iter()
            .map(|(name, bucket)| {
                let value = match bucket {
                    Bucket::Gauge(samples) => {
                        samples.iter().sum::<f64>() / samples.len() as f64
                    }
                    Bucket::Counter(total) => total,
                };
                (name, value)
            })
            .collect();

        Some(Stats {
            key: self.key.clone(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            series,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauges_average_within_a_window() {
        let statsd = Statsd::new("cmd.j");
        statsd.gauge("cpu", 10.0);
        statsd.gauge("cpu", 30.0);

        let stats = statsd.flush().unwrap();
        assert_eq!(stats.key, "cmd.j");
        assert_eq!(stats.series["cpu"], 20.0);
    }

    #[test]
    fn counters_sum_within_a_window() {
        let statsd = Statsd::new("cmd.j");
        statsd.incr("lines", 3.0);
        statsd.incr("lines", 2.0);

        let stats = statsd.flush().unwrap();
        assert_eq!(stats.series["lines"], 5.0);
    }

    #[test]
    fn flush_drains_the_window() {
        let statsd = Statsd::new("cmd.j");
        statsd.gauge("rss", 1.0);
        assert!(statsd.flush().is_some());
        assert!(statsd.flush().is_none());
    }
}
