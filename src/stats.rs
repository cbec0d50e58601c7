use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::{PunctualityStatus, Thresholds, classify};
use crate::models::DelayRecord;
use crate::store::StoreState;

/// Count of delay records per punctuality status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    pub early: usize,
    pub on_time: usize,
    pub late: usize,
    pub very_late: usize,
    /// Records without an arrival delay.
    pub unknown: usize,
}

impl StatusBreakdown {
    pub fn from_delays(delays: &[DelayRecord], thresholds: &Thresholds) -> Self {
        let mut b = StatusBreakdown::default();

        for record in delays {
            let Some(delay) = record.arrival_delay else {
                b.unknown += 1;
                continue;
            };

            match classify(delay, thresholds).status {
                PunctualityStatus::Early => b.early += 1,
                PunctualityStatus::OnTime => b.on_time += 1,
                PunctualityStatus::Late => b.late += 1,
                PunctualityStatus::VeryLate => b.very_late += 1,
            }
        }

        b
    }

    pub fn classified(&self) -> usize {
        self.early + self.on_time + self.late + self.very_late
    }

    pub fn count(&self, status: PunctualityStatus) -> usize {
        match status {
            PunctualityStatus::Early => self.early,
            PunctualityStatus::OnTime => self.on_time,
            PunctualityStatus::Late => self.late,
            PunctualityStatus::VeryLate => self.very_late,
        }
    }

    /// Share of classified records that were on time, in percent.
    pub fn on_time_pct(&self) -> f64 {
        pct(self.on_time, self.classified())
    }
}

pub fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

/// One realtime sample, flattened for CSV output.
#[derive(Debug, Default, Serialize)]
pub struct RealtimeSample {
    pub timestamp: DateTime<Utc>,
    pub vehicles: usize,
    pub delay_records: usize,

    // server summary
    pub active_vehicles: Option<f64>,
    pub recent_delays: Option<f64>,
    pub routes_with_delays: Option<f64>,
    pub avg_delay_minutes: Option<f64>,

    // client-side classification of the delay records
    pub early: usize,
    pub on_time: usize,
    pub late: usize,
    pub very_late: usize,
    pub unknown: usize,
    pub on_time_pct: f64,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl RealtimeSample {
    pub fn from_state(state: &StoreState) -> Self {
        let breakdown = StatusBreakdown::from_delays(&state.realtime_delays, &state.thresholds());
        let summary = &state.realtime_summary;

        RealtimeSample {
            timestamp: Utc::now(),
            vehicles: state.realtime_vehicles.len(),
            delay_records: state.realtime_delays.len(),
            active_vehicles: summary.active_vehicles,
            recent_delays: summary.recent_delays,
            routes_with_delays: summary.routes_with_delays,
            avg_delay_minutes: summary.avg_delay_minutes,
            early: breakdown.early,
            on_time: breakdown.on_time,
            late: breakdown.late,
            very_late: breakdown.very_late,
            unknown: breakdown.unknown,
            on_time_pct: breakdown.on_time_pct(),
            error_type: None,
            error_message: None,
        }
    }

    /// Create an error record with timestamp and error information
    pub fn from_error(error_type: &str, error_message: &str) -> Self {
        RealtimeSample {
            timestamp: Utc::now(),
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delay(seconds: Option<f64>) -> DelayRecord {
        DelayRecord {
            arrival_delay: seconds,
            ..Default::default()
        }
    }

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(pct(10, 0), 0.0);
    }

    #[test]
    fn test_pct_normal_values() {
        assert_eq!(pct(50, 100), 50.0);
        assert_eq!(pct(1, 4), 25.0);
    }

    #[test]
    fn test_breakdown_counts() {
        let delays = vec![
            delay(Some(-90.0)),
            delay(Some(0.0)),
            delay(Some(120.0)),
            delay(Some(200.0)),
            delay(Some(900.0)),
            delay(None),
        ];
        let b = StatusBreakdown::from_delays(&delays, &Thresholds::DEFAULT);

        assert_eq!(b.early, 1);
        assert_eq!(b.on_time, 2);
        assert_eq!(b.late, 1);
        assert_eq!(b.very_late, 1);
        assert_eq!(b.unknown, 1);
        assert_eq!(b.classified(), 5);
        assert_eq!(b.on_time_pct(), 40.0);
        assert_eq!(b.count(PunctualityStatus::VeryLate), 1);
    }

    #[test]
    fn test_sample_from_state() {
        let mut state = StoreState::default();
        state.realtime_delays = vec![delay(Some(30.0)), delay(Some(400.0))];
        state.realtime_summary.active_vehicles = Some(12.0);

        let sample = RealtimeSample::from_state(&state);
        assert_eq!(sample.delay_records, 2);
        assert_eq!(sample.on_time, 1);
        assert_eq!(sample.very_late, 1);
        assert_eq!(sample.on_time_pct, 50.0);
        assert_eq!(sample.active_vehicles, Some(12.0));
        assert!(sample.error_type.is_none());
    }

    #[test]
    fn test_sample_from_error() {
        let sample = RealtimeSample::from_error("fetch_error", "network error: timed out");
        assert_eq!(sample.error_type.as_deref(), Some("fetch_error"));
        assert_eq!(sample.vehicles, 0);
    }
}
