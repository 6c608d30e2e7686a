//! Best-effort confirmation that an ambiguous upload actually landed, by
//! scanning the sink's recent activity list around the source's reported
//! start time.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use tracing::{info, warn};

use crate::domains::transfer::clients::{Activity, SinkClient};

#[derive(Debug, Clone, Copy)]
pub struct DuplicateProbeConfig {
    pub window_seconds: i64,
    pub search_days: i64,
}

impl Default for DuplicateProbeConfig {
    fn default() -> Self {
        Self {
            window_seconds: 900,
            search_days: 1,
        }
    }
}

pub struct DuplicateProbe {
    config: DuplicateProbeConfig,
}

impl DuplicateProbe {
    pub fn new(config: DuplicateProbeConfig) -> Self {
        Self { config }
    }

    /// Parses a source-provided start time: epoch seconds, epoch
    /// milliseconds (disambiguated by magnitude > 10^10), or one of the two
    /// canonical string forms (`"%Y-%m-%d %H:%M:%S"`, RFC 3339).
    pub fn parse_start_time(raw: &str) -> Option<DateTime<Utc>> {
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<f64>() {
            let seconds = if n.abs() > 10_000_000_000.0 { n / 1000.0 } else { n };
            return Utc.timestamp_opt(seconds as i64, 0).single();
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
            return Some(Utc.from_utc_datetime(&naive));
        }
        DateTime::parse_from_rfc3339(trimmed)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Search the sink's activity list and return the id of the activity
    /// whose start time is within the configured window of `target`,
    /// breaking ties by smallest `|delta|` (ties broken by order of
    /// appearance in the returned list).
    pub async fn confirm(
        &self,
        sink: &dyn SinkClient,
        target: DateTime<Utc>,
    ) -> Option<String> {
        let start_date = (target - Duration::days(self.config.search_days)).date_naive();
        let end_date = (target + Duration::days(self.config.search_days)).date_naive();

        let candidates = match sink.list_activities(start_date, end_date).await {
            Ok(activities) => activities,
            Err(e) => {
                warn!(error = %e, "duplicate probe: failed to list sink activities");
                return None;
            }
        };

        let best = Self::closest_within_window(&candidates, target, self.config.window_seconds);
        if let Some(id) = &best {
            info!(sink_id = %id, "duplicate probe confirmed upload");
        }
        best
    }

    fn closest_within_window(
        candidates: &[Activity],
        target: DateTime<Utc>,
        window_seconds: i64,
    ) -> Option<String> {
        let mut best: Option<(i64, &Activity)> = None;
        for candidate in candidates {
            let Some(raw) = &candidate.start_time else {
                continue;
            };
            let Some(when) = Self::parse_start_time(raw) else {
                continue;
            };
            let delta = (when - target).num_seconds().abs();
            if delta > window_seconds {
                continue;
            }
            match best {
                Some((best_delta, _)) if delta >= best_delta => {}
                _ => best = Some((delta, candidate)),
            }
        }
        best.map(|(_, activity)| activity.source_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(id: &str, start: &str) -> Activity {
        Activity {
            source_id: id.to_string(),
            sport_code: 100,
            name: None,
            start_time: Some(start.to_string()),
        }
    }

    #[test]
    fn parses_canonical_string_form() {
        let parsed = DuplicateProbe::parse_start_time("2024-01-15 08:30:00").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-15 08:30:00");
    }

    #[test]
    fn parses_epoch_seconds_vs_millis_by_magnitude() {
        let secs = DuplicateProbe::parse_start_time("1705307400").unwrap();
        let millis = DuplicateProbe::parse_start_time("1705307400000").unwrap();
        assert_eq!(secs, millis);
    }

    #[test]
    fn picks_closest_candidate_within_window() {
        let target = DuplicateProbe::parse_start_time("2024-01-15 08:30:30").unwrap();
        let candidates = vec![
            activity("999", "2024-01-15 08:30:00"),
            activity("1000", "2024-01-15 09:00:00"),
        ];
        let result = DuplicateProbe::closest_within_window(&candidates, target, 900);
        assert_eq!(result, Some("999".to_string()));
    }

    #[test]
    fn returns_none_when_nothing_is_within_window() {
        let target = DuplicateProbe::parse_start_time("2024-01-15 08:30:30").unwrap();
        let candidates = vec![activity("1000", "2024-01-15 09:00:00")];
        let result = DuplicateProbe::closest_within_window(&candidates, target, 900);
        assert_eq!(result, None);
    }

    #[test]
    fn breaks_ties_by_order_of_appearance() {
        let target = DuplicateProbe::parse_start_time("2024-01-15 08:30:00").unwrap();
        let candidates = vec![
            activity("first", "2024-01-15 08:35:00"),
            activity("second", "2024-01-15 08:25:00"),
        ];
        let result = DuplicateProbe::closest_within_window(&candidates, target, 900);
        assert_eq!(result, Some("first".to_string()));
    }
}
