//! Per-principal behavioral baselines built from historical invocation activity.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use sark_core::{PrincipalId, SensitivityLevel};

/// Minimum share of events (as a fraction, e.g. `0.1` for 10%) an hour or
/// weekday must account for to be considered "typical".
const TYPICAL_SHARE_THRESHOLD: f64 = 0.10;

/// Number of top capabilities kept as `common_capabilities`.
const COMMON_CAPABILITY_TOP_N: usize = 10;

/// A single historical invocation, reduced to the fields the baseline and
/// detector need.
#[derive(Clone, Debug)]
pub struct BehavioralEvent {
    /// Principal that performed the invocation.
    pub principal_id: PrincipalId,
    /// Capability action name (e.g. `"read_file"`).
    pub action: String,
    /// Sensitivity of the invoked capability.
    pub sensitivity_level: SensitivityLevel,
    /// Size of the result payload (record count, byte count, or similar unit);
    /// `0` means "not applicable" and is excluded from the records-per-query average.
    pub result_size: u64,
    /// Geographic or network location label (e.g. a country code or office name).
    pub location: Option<String>,
    /// When the invocation occurred.
    pub timestamp: DateTime<Utc>,
}

impl BehavioralEvent {
    fn hour(&self) -> u32 {
        self.timestamp.hour()
    }

    fn weekday(&self) -> u32 {
        self.timestamp.weekday().num_days_from_monday()
    }
}

/// A learned behavioral baseline for one principal over a lookback window.
///
/// A principal with no history yields a minimal, zeroed baseline: every
/// "typical"/"common" set is empty and `detect` will never fire (the caller
/// should treat an all-empty baseline as "insufficient history").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BehavioralBaseline {
    principal_id: PrincipalId,
    lookback_days: u32,
    common_capabilities: Vec<String>,
    avg_calls_per_day: f64,
    max_calls_per_day: u64,
    typical_hours: HashSet<u32>,
    typical_days: HashSet<u32>,
    avg_records_per_query: f64,
    max_records_per_query: u64,
    max_sensitivity_level: SensitivityLevel,
    typical_sensitivity: SensitivityLevel,
    typical_locations: HashSet<String>,
    sample_count: usize,
}

impl BehavioralBaseline {
    /// Builds a baseline from historical events for a single principal.
    ///
    /// `typical_sensitivity` is the statistical mode of observed sensitivity
    /// levels; ties are broken by first-encountered-with-highest-count,
    /// matching the behavior of Python's `Counter.most_common(1)` fallback.
    #[must_use]
    pub fn from_events(principal_id: PrincipalId, events: &[BehavioralEvent], lookback_days: u32) -> Self {
        let own: Vec<&BehavioralEvent> = events.iter().filter(|e| e.principal_id == principal_id).collect();

        if own.is_empty() {
            return Self {
                principal_id,
                lookback_days,
                common_capabilities: Vec::new(),
                avg_calls_per_day: 0.0,
                max_calls_per_day: 0,
                typical_hours: HashSet::new(),
                typical_days: HashSet::new(),
                avg_records_per_query: 0.0,
                max_records_per_query: 0,
                max_sensitivity_level: SensitivityLevel::Low,
                typical_sensitivity: SensitivityLevel::Low,
                typical_locations: HashSet::new(),
                sample_count: 0,
            };
        }

        let total = own.len() as f64;

        let mut capability_counts: HashMap<&str, usize> = HashMap::new();
        let mut sensitivity_counts: Vec<(SensitivityLevel, usize)> = Vec::new();
        let mut hour_counts: HashMap<u32, usize> = HashMap::new();
        let mut day_counts: HashMap<u32, usize> = HashMap::new();
        let mut calls_per_calendar_day: HashMap<chrono::NaiveDate, u64> = HashMap::new();
        let mut locations: HashSet<String> = HashSet::new();
        let mut max_sensitivity = SensitivityLevel::Low;
        let mut record_sizes: Vec<u64> = Vec::new();

        for event in &own {
            *capability_counts.entry(event.action.as_str()).or_insert(0) += 1;

            match sensitivity_counts.iter_mut().find(|(level, _)| *level == event.sensitivity_level) {
                Some((_, count)) => *count += 1,
                None => sensitivity_counts.push((event.sensitivity_level, 1)),
            }
            if event.sensitivity_level > max_sensitivity {
                max_sensitivity = event.sensitivity_level;
            }

            *hour_counts.entry(event.hour()).or_insert(0) += 1;
            *day_counts.entry(event.weekday()).or_insert(0) += 1;
            *calls_per_calendar_day.entry(event.timestamp.date_naive()).or_insert(0) += 1;

            if event.result_size > 0 {
                record_sizes.push(event.result_size);
            }
            if let Some(location) = &event.location {
                locations.insert(location.clone());
            }
        }

        let mut ranked: Vec<(&str, usize)> = capability_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let common_capabilities = ranked
            .into_iter()
            .take(COMMON_CAPABILITY_TOP_N)
            .map(|(name, _)| name.to_owned())
            .collect();

        let typical_sensitivity = sensitivity_counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map_or(SensitivityLevel::Low, |(level, _)| level);

        let typical_hours = hour_counts
            .into_iter()
            .filter(|(_, count)| *count as f64 / total >= TYPICAL_SHARE_THRESHOLD)
            .map(|(hour, _)| hour)
            .collect();
        let typical_days = day_counts
            .into_iter()
            .filter(|(_, count)| *count as f64 / total >= TYPICAL_SHARE_THRESHOLD)
            .map(|(day, _)| day)
            .collect();

        let max_calls_per_day = calls_per_calendar_day.values().copied().max().unwrap_or(0);

        let avg_records_per_query = if record_sizes.is_empty() {
            0.0
        } else {
            record_sizes.iter().sum::<u64>() as f64 / record_sizes.len() as f64
        };
        let max_records_per_query = record_sizes.into_iter().max().unwrap_or(0);

        Self {
            principal_id,
            lookback_days,
            common_capabilities,
            avg_calls_per_day: total / f64::from(lookback_days.max(1)),
            max_calls_per_day,
            typical_hours,
            typical_days,
            avg_records_per_query,
            max_records_per_query,
            max_sensitivity_level: max_sensitivity,
            typical_sensitivity,
            typical_locations: locations,
            sample_count: own.len(),
        }
    }

    /// Principal this baseline describes.
    #[must_use]
    pub const fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    /// Lookback window this baseline covers, in days.
    #[must_use]
    pub const fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    /// Top capabilities by invocation count, most frequent first.
    #[must_use]
    pub fn common_capabilities(&self) -> &[String] {
        &self.common_capabilities
    }

    /// Average invocations per day over the lookback window.
    #[must_use]
    pub const fn avg_calls_per_day(&self) -> f64 {
        self.avg_calls_per_day
    }

    /// Highest number of invocations seen on any single calendar day.
    #[must_use]
    pub const fn max_calls_per_day(&self) -> u64 {
        self.max_calls_per_day
    }

    /// Hours of day (0-23) whose share of events meets the typical threshold.
    #[must_use]
    pub fn typical_hours(&self) -> &HashSet<u32> {
        &self.typical_hours
    }

    /// Weekdays (0=Monday..6=Sunday) whose share of events meets the typical threshold.
    #[must_use]
    pub fn typical_days(&self) -> &HashSet<u32> {
        &self.typical_days
    }

    /// Mean result size over events with a non-zero result size.
    #[must_use]
    pub const fn avg_records_per_query(&self) -> f64 {
        self.avg_records_per_query
    }

    /// Largest result size observed.
    #[must_use]
    pub const fn max_records_per_query(&self) -> u64 {
        self.max_records_per_query
    }

    /// Highest sensitivity level ever observed.
    #[must_use]
    pub const fn max_sensitivity_level(&self) -> SensitivityLevel {
        self.max_sensitivity_level
    }

    /// Most common sensitivity level observed (statistical mode).
    #[must_use]
    pub const fn typical_sensitivity(&self) -> SensitivityLevel {
        self.typical_sensitivity
    }

    /// Locations observed for this principal (no frequency threshold).
    #[must_use]
    pub fn typical_locations(&self) -> &HashSet<String> {
        &self.typical_locations
    }

    /// Number of historical events the baseline was built from.
    #[must_use]
    pub const fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Whether `action` is among the principal's common capabilities.
    #[must_use]
    pub fn is_common_capability(&self, action: &str) -> bool {
        self.common_capabilities.iter().any(|a| a == action)
    }

    /// Whether this baseline was built from zero history.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(principal: PrincipalId, action: &str, level: SensitivityLevel, when: DateTime<Utc>) -> BehavioralEvent {
        BehavioralEvent {
            principal_id: principal,
            action: action.to_owned(),
            sensitivity_level: level,
            result_size: 0,
            location: None,
            timestamp: when,
        }
    }

    #[test]
    fn baseline_picks_most_common_sensitivity_and_capability() {
        let principal = PrincipalId::random();
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        let events = vec![
            event(principal, "read", SensitivityLevel::Low, now),
            event(principal, "read", SensitivityLevel::Low, now),
            event(principal, "write", SensitivityLevel::Medium, now),
        ];

        let baseline = BehavioralBaseline::from_events(principal, &events, 30);
        assert_eq!(baseline.typical_sensitivity(), SensitivityLevel::Low);
        assert_eq!(baseline.max_sensitivity_level(), SensitivityLevel::Medium);
        assert_eq!(baseline.sample_count(), 3);
        assert!(baseline.is_common_capability("read"));
    }

    #[test]
    fn baseline_ignores_other_principals() {
        let principal = PrincipalId::random();
        let stranger = PrincipalId::random();
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        let events = vec![event(stranger, "delete", SensitivityLevel::Critical, now)];

        let baseline = BehavioralBaseline::from_events(principal, &events, 30);
        assert!(baseline.is_empty());
        assert_eq!(baseline.max_sensitivity_level(), SensitivityLevel::Low);
    }

    #[test]
    fn typical_hours_requires_ten_percent_share() {
        let principal = PrincipalId::random();
        let base = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let mut events = Vec::new();
        for day in 0..9u32 {
            events.push(event(
                principal,
                "analytics_query",
                SensitivityLevel::Low,
                base + chrono::Duration::days(i64::from(day)),
            ));
        }
        // A single event at hour 3 among 10 total is below the 10% threshold only
        // if it's strictly less than 1 in 10; with 9 events at hour 9 and 1 at hour 3,
        // hour 3's share is 1/10 = 10%, which meets the threshold (>=).
        events.push(event(
            principal,
            "analytics_query",
            SensitivityLevel::Low,
            base.with_hour(3).unwrap(),
        ));

        let baseline = BehavioralBaseline::from_events(principal, &events, 30);
        assert!(baseline.typical_hours().contains(&9));
    }

    #[test]
    fn avg_and_max_records_per_query_ignore_zero_sized_events() {
        let principal = PrincipalId::random();
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        let mut a = event(principal, "query", SensitivityLevel::Low, now);
        a.result_size = 100;
        let mut b = event(principal, "query", SensitivityLevel::Low, now);
        b.result_size = 0;
        let mut c = event(principal, "query", SensitivityLevel::Low, now);
        c.result_size = 300;

        let baseline = BehavioralBaseline::from_events(principal, &[a, b, c], 30);
        assert_eq!(baseline.max_records_per_query(), 300);
        assert_eq!(baseline.avg_records_per_query(), 200.0);
    }
}
