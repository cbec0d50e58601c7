//! Records exchanged with the punctuality service.
//!
//! The server owns these shapes. Only the fields the client reads or prints
//! are typed; everything else is kept in `extra` so nothing is lost when a
//! record is re-serialized.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::classify::Thresholds;
use crate::error::ConfigError;

/// Aggregates computed by the database arrive either as JSON numbers or as
/// decimal strings, depending on the column type.
mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<NumberOrString>::deserialize(deserializer)? {
            Some(NumberOrString::Number(n)) => Some(n),
            Some(NumberOrString::Text(s)) => s.trim().parse().ok(),
            None => None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub vehicle_id: Option<String>,
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub stop_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub bearing: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub speed: Option<f64>,
    pub position_timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One observed arrival/departure against its scheduled time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayRecord {
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub stop_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub scheduled_time: Option<String>,
    pub actual_time: Option<String>,
    /// Seconds; negative means the vehicle arrived early.
    #[serde(default, deserialize_with = "lenient::number")]
    pub arrival_delay: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub departure_delay: Option<f64>,
    pub record_timestamp: Option<String>,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub stop_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSummary {
    #[serde(default, deserialize_with = "lenient::number")]
    pub active_vehicles: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub recent_delays: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub routes_with_delays: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub avg_delay_minutes: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// System-wide punctuality over the analysis window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PunctualityOverview {
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_routes: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_trips: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub system_punctuality_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub system_avg_delay_minutes: Option<f64>,
    pub latest_data_date: Option<String>,
    pub analysis_period: Option<String>,
    #[serde(default)]
    pub best_routes: Vec<RoutePunctuality>,
    #[serde(default)]
    pub worst_routes: Vec<RoutePunctuality>,
    pub data_available: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-route statistics, either one day of one route or a multi-day rollup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutePunctuality {
    pub route_id: Option<String>,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub stat_date: Option<String>,
    pub last_stat_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub punctuality_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub avg_punctuality_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_trips: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub avg_delay_minutes: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub max_delay_minutes: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub on_time_trips: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub early_trips: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub late_trips: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub very_late_trips: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RoutePunctuality {
    /// Rate from a rollup row, or from a single-day row.
    pub fn rate(&self) -> Option<f64> {
        self.avg_punctuality_rate.or(self.punctuality_rate)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopPunctuality {
    pub stop_id: Option<String>,
    pub stop_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub stop_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub stop_lon: Option<f64>,
    pub stat_date: Option<String>,
    pub last_stat_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub punctuality_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub avg_punctuality_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_visits: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub avg_delay_minutes: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub max_delay_minutes: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StopPunctuality {
    pub fn rate(&self) -> Option<f64> {
        self.avg_punctuality_rate.or(self.punctuality_rate)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlyPunctuality {
    pub hour: Option<u32>,
    pub hour_label: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub punctuality_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub total_trips: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub avg_delay_minutes: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Classification thresholds as stored by the server.
///
/// Every key is optional: an empty value means the configuration has not
/// been fetched yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PunctualityConfig {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::number"
    )]
    pub on_time_threshold_seconds: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::number"
    )]
    pub early_threshold_seconds: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::number"
    )]
    pub very_late_threshold_seconds: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PunctualityConfig {
    /// Shallow merge: keys present in `update` overwrite, all others stay.
    pub fn merge(&mut self, update: &ConfigUpdate) {
        if let Some(v) = update.on_time_threshold_seconds {
            self.on_time_threshold_seconds = Some(v);
        }
        if let Some(v) = update.early_threshold_seconds {
            self.early_threshold_seconds = Some(v);
        }
        if let Some(v) = update.very_late_threshold_seconds {
            self.very_late_threshold_seconds = Some(v);
        }
    }

    /// Checks `early <= on_time <= very_late` over the resolved thresholds,
    /// so a missing key is compared at its default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Thresholds {
            on_time_seconds: on_time,
            early_seconds: early,
            very_late_seconds: very_late,
        } = Thresholds::from_config(self);

        if early > on_time || on_time > very_late {
            return Err(ConfigError::InvalidThresholds {
                early,
                on_time,
                very_late,
            });
        }
        Ok(())
    }
}

/// Partial threshold update; absent keys are neither sent nor changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_time_threshold_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_threshold_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub very_late_threshold_seconds: Option<f64>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.on_time_threshold_seconds.is_none()
            && self.early_threshold_seconds.is_none()
            && self.very_late_threshold_seconds.is_none()
    }

    /// Rejects negative or non-finite durations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("on_time_threshold_seconds", self.on_time_threshold_seconds),
            ("early_threshold_seconds", self.early_threshold_seconds),
            ("very_late_threshold_seconds", self.very_late_threshold_seconds),
        ];
        for (field, value) in fields {
            match value {
                Some(value) if !value.is_finite() => {
                    return Err(ConfigError::NotFinite { field });
                }
                Some(value) if value < 0.0 => {
                    return Err(ConfigError::Negative { field, value });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Headline counters projected from the cached overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SystemStats {
    pub total_routes: f64,
    pub total_trips: f64,
    pub system_punctuality_rate: f64,
    pub system_avg_delay_minutes: f64,
    pub data_available: bool,
}

impl SystemStats {
    pub fn from_overview(overview: &PunctualityOverview) -> Self {
        Self {
            total_routes: overview.total_routes.unwrap_or(0.0),
            total_trips: overview.total_trips.unwrap_or(0.0),
            system_punctuality_rate: overview.system_punctuality_rate.unwrap_or(0.0),
            system_avg_delay_minutes: overview.system_avg_delay_minutes.unwrap_or(0.0),
            data_available: overview.data_available.unwrap_or(false),
        }
    }
}
