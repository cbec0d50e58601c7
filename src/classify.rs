//! Delay classification against configurable thresholds.

use serde::Serialize;

use crate::models::PunctualityConfig;

/// Punctuality category of a single delay measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PunctualityStatus {
    Early,
    OnTime,
    Late,
    VeryLate,
}

impl PunctualityStatus {
    pub const ALL: [PunctualityStatus; 4] = [
        PunctualityStatus::Early,
        PunctualityStatus::OnTime,
        PunctualityStatus::Late,
        PunctualityStatus::VeryLate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PunctualityStatus::Early => "Early",
            PunctualityStatus::OnTime => "On time",
            PunctualityStatus::Late => "Late",
            PunctualityStatus::VeryLate => "Very late",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            PunctualityStatus::Early | PunctualityStatus::OnTime => Severity::Success,
            PunctualityStatus::Late => Severity::Warning,
            PunctualityStatus::VeryLate => Severity::Danger,
        }
    }
}

/// Display severity attached to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub status: PunctualityStatus,
    pub label: &'static str,
    pub severity: Severity,
}

impl From<PunctualityStatus> for Classification {
    fn from(status: PunctualityStatus) -> Self {
        Self {
            status,
            label: status.label(),
            severity: status.severity(),
        }
    }
}

/// Fully resolved classification boundaries, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub on_time_seconds: f64,
    pub early_seconds: f64,
    pub very_late_seconds: f64,
}

impl Thresholds {
    /// Boundaries used for any key the server has not supplied.
    pub const DEFAULT: Thresholds = Thresholds {
        on_time_seconds: 120.0,
        early_seconds: 60.0,
        very_late_seconds: 300.0,
    };

    /// Resolves a (possibly partial) cached configuration key by key.
    pub fn from_config(config: &PunctualityConfig) -> Self {
        Self {
            on_time_seconds: config
                .on_time_threshold_seconds
                .unwrap_or(Self::DEFAULT.on_time_seconds),
            early_seconds: config
                .early_threshold_seconds
                .unwrap_or(Self::DEFAULT.early_seconds),
            very_late_seconds: config
                .very_late_threshold_seconds
                .unwrap_or(Self::DEFAULT.very_late_seconds),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Classifies a signed delay (negative = ahead of schedule).
///
/// Checks run in order and the first match wins, so a delay sitting exactly
/// on a boundary lands in the lower-severity category:
///
/// | Condition                     | Status   |
/// |-------------------------------|----------|
/// | `delay < -early`              | Early    |
/// | `abs(delay) <= on_time`       | OnTime   |
/// | `delay <= very_late`          | Late     |
/// | otherwise                     | VeryLate |
pub fn classify(delay_seconds: f64, thresholds: &Thresholds) -> Classification {
    let status = match delay_seconds {
        d if d < -thresholds.early_seconds => PunctualityStatus::Early,
        d if d.abs() <= thresholds.on_time_seconds => PunctualityStatus::OnTime,
        d if d <= thresholds.very_late_seconds => PunctualityStatus::Late,
        _ => PunctualityStatus::VeryLate,
    };
    status.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(delay: f64) -> PunctualityStatus {
        classify(delay, &Thresholds::DEFAULT).status
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(status(-61.0), PunctualityStatus::Early);
        assert_eq!(status(-60.0), PunctualityStatus::OnTime);
        assert_eq!(status(0.0), PunctualityStatus::OnTime);
        assert_eq!(status(120.0), PunctualityStatus::OnTime);
        assert_eq!(status(121.0), PunctualityStatus::Late);
        assert_eq!(status(300.0), PunctualityStatus::Late);
        assert_eq!(status(301.0), PunctualityStatus::VeryLate);
    }

    #[test]
    fn test_classify_fractional_boundaries() {
        assert_eq!(status(-60.5), PunctualityStatus::Early);
        assert_eq!(status(120.001), PunctualityStatus::Late);
        assert_eq!(status(300.5), PunctualityStatus::VeryLate);
    }

    #[test]
    fn test_classify_is_total() {
        for delay in [f64::NEG_INFINITY, f64::INFINITY, f64::NAN, -1e12, 1e12] {
            let c = classify(delay, &Thresholds::DEFAULT);
            assert!(PunctualityStatus::ALL.contains(&c.status));
        }
        assert_eq!(status(f64::NEG_INFINITY), PunctualityStatus::Early);
        assert_eq!(status(f64::INFINITY), PunctualityStatus::VeryLate);
    }

    #[test]
    fn test_early_window_wider_than_on_time() {
        // Early threshold larger than on-time: the gap between them is Late.
        let t = Thresholds {
            on_time_seconds: 30.0,
            early_seconds: 90.0,
            very_late_seconds: 300.0,
        };
        assert_eq!(classify(-60.0, &t).status, PunctualityStatus::Late);
        assert_eq!(classify(-91.0, &t).status, PunctualityStatus::Early);
    }

    #[test]
    fn test_severity_and_label() {
        let c = classify(500.0, &Thresholds::DEFAULT);
        assert_eq!(c.severity, Severity::Danger);
        assert_eq!(c.label, "Very late");
        assert_eq!(classify(-100.0, &Thresholds::DEFAULT).severity, Severity::Success);
        assert_eq!(classify(200.0, &Thresholds::DEFAULT).severity, Severity::Warning);
    }

    #[test]
    fn test_from_config_falls_back_per_key() {
        let config = PunctualityConfig {
            on_time_threshold_seconds: Some(90.0),
            ..Default::default()
        };
        let t = Thresholds::from_config(&config);
        assert_eq!(t.on_time_seconds, 90.0);
        assert_eq!(t.early_seconds, 60.0);
        assert_eq!(t.very_late_seconds, 300.0);
    }
}
