//! Store configuration read from the environment.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Page size used when a query does not name one.
pub const DEFAULT_PAGE_LIMIT: usize = 30;

/// Snapshot interval used when nothing is configured.
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// A configuration value that could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The variable is set but unusable.
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        /// Environment variable name.
        var: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// When a rehydration persists its result as the new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    /// Persist once at least this many events were folded in one pass.
    EveryEvents(usize),
    /// Persist when events were folded and this much time passed since the
    /// stored snapshot was taken.
    Interval(Duration),
    /// Never persist; every read replays from the beginning.
    Never,
}

impl SnapshotPolicy {
    /// Decides whether a pass that folded `folded` events should persist.
    /// `previous` is when the snapshot it started from was taken, if any.
    #[must_use]
    pub fn should_persist(
        &self,
        folded: usize,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if folded == 0 {
            return false;
        }
        match self {
            Self::EveryEvents(threshold) => folded >= *threshold,
            Self::Interval(interval) => previous.is_none_or(|taken_at| {
                (now - taken_at)
                    .to_std()
                    .is_ok_and(|elapsed| elapsed >= *interval)
            }),
            Self::Never => false,
        }
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self::Interval(DEFAULT_SNAPSHOT_INTERVAL)
    }
}

/// Tunables of the aggregate store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// When rehydrations persist snapshots.
    pub snapshot_policy: SnapshotPolicy,
    /// Default page size for `find`.
    pub page_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_policy: SnapshotPolicy::default(),
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl StoreConfig {
    /// Reads `SNAPSHOT_TRIGGER`, `SNAPSHOT_INTERVAL_MS` and `PAGE_LIMIT`
    /// from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`StoreConfig::from_env`] over an arbitrary lookup.
    /// `SNAPSHOT_INTERVAL_MS` wins when both snapshot variables are set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("SNAPSHOT_TRIGGER") {
            let threshold = parse_positive("SNAPSHOT_TRIGGER", &value)?;
            config.snapshot_policy = SnapshotPolicy::EveryEvents(threshold);
        }
        if let Some(value) = lookup("SNAPSHOT_INTERVAL_MS") {
            let millis = parse_positive("SNAPSHOT_INTERVAL_MS", &value)?;
            config.snapshot_policy =
                SnapshotPolicy::Interval(Duration::from_millis(millis as u64));
        }
        if let Some(value) = lookup("PAGE_LIMIT") {
            config.page_limit = parse_positive("PAGE_LIMIT", &value)?;
        }

        Ok(config)
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            value: value.to_owned(),
            reason: "must be at least 1".into(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::Invalid {
            var,
            value: value.to_owned(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration as ChronoDuration, TimeZone};

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.page_limit, 30);
        assert_eq!(
            config.snapshot_policy,
            SnapshotPolicy::Interval(Duration::from_secs(600))
        );
    }

    #[test]
    fn test_trigger_and_interval_parse() {
        let by_count = StoreConfig::from_lookup(lookup(&[("SNAPSHOT_TRIGGER", "5")])).unwrap();
        assert_eq!(by_count.snapshot_policy, SnapshotPolicy::EveryEvents(5));

        let both = StoreConfig::from_lookup(lookup(&[
            ("SNAPSHOT_TRIGGER", "5"),
            ("SNAPSHOT_INTERVAL_MS", "1500"),
            ("PAGE_LIMIT", "10"),
        ]))
        .unwrap();
        assert_eq!(
            both.snapshot_policy,
            SnapshotPolicy::Interval(Duration::from_millis(1500))
        );
        assert_eq!(both.page_limit, 10);
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        for (var, value) in [("SNAPSHOT_TRIGGER", "0"), ("PAGE_LIMIT", "lots")] {
            match StoreConfig::from_lookup(lookup(&[(var, value)])) {
                Err(ConfigError::Invalid { var: got, .. }) => assert_eq!(got, var),
                other => panic!("expected Invalid, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_count_policy_needs_threshold_events() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let policy = SnapshotPolicy::EveryEvents(3);

        assert!(!policy.should_persist(0, None, now));
        assert!(!policy.should_persist(2, None, now));
        assert!(policy.should_persist(3, Some(now), now));
    }

    #[test]
    fn test_interval_policy_needs_elapsed_time_and_events() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let policy = SnapshotPolicy::Interval(Duration::from_secs(60));

        assert!(policy.should_persist(1, None, now));
        assert!(!policy.should_persist(0, None, now));
        assert!(!policy.should_persist(1, Some(now - ChronoDuration::seconds(59)), now));
        assert!(policy.should_persist(1, Some(now - ChronoDuration::seconds(60)), now));
        assert!(!SnapshotPolicy::Never.should_persist(100, None, now));
    }
}
