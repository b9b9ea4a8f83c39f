//! Committed-transition log.
//!
//! Every committed transition is recorded in order, stamped with a UTC
//! timestamp, before its enter handler runs, so transitions triggered from
//! inside handlers appear in causal order. The log is an observability aid:
//! the protocol never reads it back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of a single committed transition.
///
/// `from`/`to` are `None` for the unset assignment (before first entry /
/// after an exit without re-entry). `source` names the region that
/// requested the change; `depth` is the nesting depth of the owning
/// context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub region: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub source: String,
    pub depth: usize,
    pub timestamp: DateTime<Utc>,
}

/// Ordered history of committed transitions across a machine.
///
/// # Example
///
/// ```rust
/// use strata::tree::leaf;
/// use strata::{Followup, Machine};
///
/// let light = leaf("LIGHT", ["red", "green"]).unwrap();
/// let mut machine = Machine::create([light]).unwrap();
/// machine.tell("LIGHT", "red", None).unwrap();
/// machine.tell("LIGHT", "green", None).unwrap();
///
/// let path = machine.trace().path_of("LIGHT");
/// assert_eq!(path, [None, Some("red"), Some("green")]);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransitionLog {
    records: Vec<TransitionRecord>,
}

impl TransitionLog {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, record: TransitionRecord) {
        self.records.push(record);
    }

    /// All recorded transitions, in commit order.
    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// The state sequence a named region traversed: the `from` of its first
    /// recorded transition, then the `to` of each. Empty when the region
    /// never transitioned.
    pub fn path_of(&self, region: &str) -> Vec<Option<&str>> {
        let mut path = Vec::new();
        for record in self.records.iter().filter(|r| r.region == region) {
            if path.is_empty() {
                path.push(record.from.as_deref());
            }
            path.push(record.to.as_deref());
        }
        path
    }

    /// Span between the first and last recorded commit. `None` when the log
    /// is empty.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.records.first()?, self.records.last()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(region: &str, from: Option<&str>, to: Option<&str>) -> TransitionRecord {
        TransitionRecord {
            region: region.into(),
            from: from.map(Into::into),
            to: to.map(Into::into),
            source: "<root>".into(),
            depth: 0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn new_log_is_empty() {
        let log = TransitionLog::new();
        assert!(log.is_empty());
        assert!(log.path_of("X").is_empty());
        assert!(log.duration().is_none());
    }

    #[test]
    fn path_of_follows_one_region() {
        let mut log = TransitionLog::new();
        log.record(record("LIGHT", None, Some("red")));
        log.record(record("CAR", None, Some("forward")));
        log.record(record("LIGHT", Some("red"), Some("green")));
        log.record(record("LIGHT", Some("green"), None));

        assert_eq!(
            log.path_of("LIGHT"),
            [None, Some("red"), Some("green"), None]
        );
        assert_eq!(log.path_of("CAR"), [None, Some("forward")]);
    }

    #[test]
    fn clear_drops_all_records() {
        let mut log = TransitionLog::new();
        log.record(record("LIGHT", None, Some("red")));
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn duration_spans_first_to_last_commit() {
        let mut log = TransitionLog::new();
        let start = Utc::now();
        let mut first = record("LIGHT", None, Some("red"));
        first.timestamp = start;
        let mut second = record("LIGHT", Some("red"), Some("green"));
        second.timestamp = start + chrono::Duration::milliseconds(25);
        log.record(first);
        log.record(second);

        assert_eq!(log.duration(), Some(Duration::from_millis(25)));
    }

    #[test]
    fn log_roundtrips_through_json() {
        let mut log = TransitionLog::new();
        log.record(record("LIGHT", None, Some("red")));
        let json = serde_json::to_string(&log).unwrap();
        let back: TransitionLog = serde_json::from_str(&json).unwrap();
        assert_eq!(log.records(), back.records());
    }
}
