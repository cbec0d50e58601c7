//! Typed access to the punctuality service, one operation per resource.
//!
//! [`PunctualityGateway`] is the seam the store talks to. [`HttpGateway`]
//! is the production implementation; tests substitute an in-memory one.

mod filter;
mod http;

pub use filter::{Filter, FilterValue};
pub use http::HttpGateway;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::RequestError;
use crate::models::{
    ConfigUpdate, DelayRecord, HourlyPunctuality, PunctualityConfig, PunctualityOverview,
    RealtimeSummary, RoutePunctuality, StopPunctuality, VehiclePosition,
};

/// Successful response with the transport status already stripped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            data: Some(data),
            message: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            data: None,
            message: None,
        }
    }
}

impl<T: Default> Envelope<T> {
    /// The payload, or the empty value of its type when the server sent none.
    pub fn into_data(self) -> T {
        self.data.unwrap_or_default()
    }
}

/// Server resources, with their paths relative to the API base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    RealtimeVehicles,
    RealtimeDelays,
    RealtimeSummary,
    PunctualityOverview,
    RoutePunctuality,
    StopPunctuality,
    HourlyPunctuality,
    PunctualityConfig,
}

impl Resource {
    pub fn path(self) -> &'static str {
        match self {
            Resource::RealtimeVehicles => "realtime/vehicles",
            Resource::RealtimeDelays => "realtime/delays",
            Resource::RealtimeSummary => "realtime/summary",
            Resource::PunctualityOverview => "punctuality/overview",
            Resource::RoutePunctuality => "punctuality/routes",
            Resource::StopPunctuality => "punctuality/stops",
            Resource::HourlyPunctuality => "punctuality/hourly",
            Resource::PunctualityConfig => "punctuality/config",
        }
    }

    /// Human-readable name used in logs and aggregated error messages.
    pub fn name(self) -> &'static str {
        match self {
            Resource::RealtimeVehicles => "realtime vehicles",
            Resource::RealtimeDelays => "realtime delays",
            Resource::RealtimeSummary => "realtime summary",
            Resource::PunctualityOverview => "overview",
            Resource::RoutePunctuality => "route punctuality",
            Resource::StopPunctuality => "stop punctuality",
            Resource::HourlyPunctuality => "hourly punctuality",
            Resource::PunctualityConfig => "punctuality config",
        }
    }
}

/// One request per server resource. Implementations hold no state.
#[async_trait]
pub trait PunctualityGateway: Send + Sync {
    async fn realtime_vehicles(
        &self,
        filter: &Filter,
    ) -> Result<Envelope<Vec<VehiclePosition>>, RequestError>;

    async fn realtime_delays(
        &self,
        filter: &Filter,
    ) -> Result<Envelope<Vec<DelayRecord>>, RequestError>;

    async fn realtime_summary(&self) -> Result<Envelope<RealtimeSummary>, RequestError>;

    async fn punctuality_overview(
        &self,
        filter: &Filter,
    ) -> Result<Envelope<PunctualityOverview>, RequestError>;

    async fn route_punctuality(
        &self,
        filter: &Filter,
    ) -> Result<Envelope<Vec<RoutePunctuality>>, RequestError>;

    async fn stop_punctuality(
        &self,
        filter: &Filter,
    ) -> Result<Envelope<Vec<StopPunctuality>>, RequestError>;

    async fn hourly_punctuality(
        &self,
        filter: &Filter,
    ) -> Result<Envelope<Vec<HourlyPunctuality>>, RequestError>;

    async fn punctuality_config(&self) -> Result<Envelope<PunctualityConfig>, RequestError>;

    async fn update_punctuality_config(
        &self,
        update: &ConfigUpdate,
    ) -> Result<Envelope<serde_json::Value>, RequestError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_data_defaults_when_absent() {
        let env: Envelope<Vec<DelayRecord>> = Envelope::empty();
        assert!(env.into_data().is_empty());

        let env = Envelope::new(vec![DelayRecord::default()]);
        assert_eq!(env.into_data().len(), 1);
    }

    #[test]
    fn test_resource_paths_are_relative() {
        assert_eq!(Resource::RoutePunctuality.path(), "punctuality/routes");
        assert!(!Resource::RealtimeVehicles.path().starts_with('/'));
    }
}
