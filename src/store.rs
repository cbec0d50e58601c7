//! The punctuality state store: the single owner of cached punctuality data
//! and the single entry point for refreshing it.
//!
//! State lives in a [`tokio::sync::watch`] channel. Readers take snapshots or
//! subscribe to change notifications; only store operations write. Derived
//! values ([`StoreState::system_stats`] and friends) are computed from the
//! current state on every read.
//!
//! Each fetch commits its result in one mutation after the response has been
//! decoded, so a failed fetch leaves the previously cached value in place.

use std::fmt::Display;
use std::future::Future;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::classify::{Classification, Thresholds, classify};
use crate::error::{AggregateError, RequestError, UpdateError};
use crate::gateway::{Envelope, Filter, PunctualityGateway, Resource};
use crate::models::{
    ConfigUpdate, DelayRecord, HourlyPunctuality, PunctualityConfig, PunctualityOverview,
    RealtimeSummary, RoutePunctuality, StopPunctuality, SystemStats, VehiclePosition,
};
use crate::orchestrate::Orchestration;

/// Page size used for route punctuality by [`PunctualityStore::fetch_all_punctuality_data`].
pub const OVERVIEW_ROUTE_LIMIT: u32 = 20;
/// Vehicle page size used by [`PunctualityStore::refresh_realtime_data`].
pub const REALTIME_VEHICLE_LIMIT: u32 = 100;
/// Delay page size used by [`PunctualityStore::refresh_realtime_data`].
pub const REALTIME_DELAY_LIMIT: u32 = 50;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub realtime_vehicles: Vec<VehiclePosition>,
    pub realtime_delays: Vec<DelayRecord>,
    pub realtime_summary: RealtimeSummary,
    pub punctuality_overview: PunctualityOverview,
    pub route_punctuality: Vec<RoutePunctuality>,
    pub stop_punctuality: Vec<StopPunctuality>,
    pub hourly_punctuality: Vec<HourlyPunctuality>,
    pub punctuality_config: PunctualityConfig,
    /// Message of the most recent failure, until cleared.
    pub error: Option<String>,
    in_flight: usize,
}

impl StoreState {
    /// True while at least one store operation is running.
    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn has_realtime_data(&self) -> bool {
        !self.realtime_vehicles.is_empty() || !self.realtime_delays.is_empty()
    }

    pub fn has_punctuality_data(&self) -> bool {
        self.punctuality_overview.data_available == Some(true)
    }

    pub fn system_stats(&self) -> SystemStats {
        SystemStats::from_overview(&self.punctuality_overview)
    }

    /// Thresholds from the cached configuration, with defaults for any key
    /// not fetched yet.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from_config(&self.punctuality_config)
    }

    pub fn punctuality_status(&self, delay_seconds: f64) -> Classification {
        classify(delay_seconds, &self.thresholds())
    }

    fn clear_cached(&mut self) {
        let in_flight = self.in_flight;
        *self = StoreState {
            in_flight,
            ..StoreState::default()
        };
    }
}

/// Result of [`PunctualityStore::fetch_all_punctuality_data`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PunctualityData {
    pub overview: PunctualityOverview,
    pub routes: Vec<RoutePunctuality>,
    pub summary: RealtimeSummary,
}

/// Result of [`PunctualityStore::refresh_realtime_data`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeData {
    pub vehicles: Vec<VehiclePosition>,
    pub delays: Vec<DelayRecord>,
    pub summary: RealtimeSummary,
}

/// Marks one operation as in flight for as long as it is alive, so the
/// counter is released on every exit path, including cancellation.
struct InFlight<'a> {
    state: &'a watch::Sender<StoreState>,
}

impl<'a> InFlight<'a> {
    fn begin(state: &'a watch::Sender<StoreState>) -> Self {
        state.send_modify(|s| s.in_flight += 1);
        Self { state }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state
            .send_modify(|s| s.in_flight = s.in_flight.saturating_sub(1));
    }
}

pub struct PunctualityStore<G> {
    gateway: G,
    state: watch::Sender<StoreState>,
}

impl<G: PunctualityGateway> PunctualityStore<G> {
    pub fn new(gateway: G) -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self { gateway, state }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Receives a notification after every state change.
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> StoreState {
        self.state.borrow().clone()
    }

    /// Reads the current state without cloning it.
    pub fn with_state<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn loading(&self) -> bool {
        self.with_state(StoreState::loading)
    }

    pub fn error(&self) -> Option<String> {
        self.with_state(|s| s.error.clone())
    }

    pub fn punctuality_config(&self) -> PunctualityConfig {
        self.with_state(|s| s.punctuality_config.clone())
    }

    pub fn has_realtime_data(&self) -> bool {
        self.with_state(StoreState::has_realtime_data)
    }

    pub fn has_punctuality_data(&self) -> bool {
        self.with_state(StoreState::has_punctuality_data)
    }

    pub fn system_stats(&self) -> SystemStats {
        self.with_state(StoreState::system_stats)
    }

    pub fn punctuality_status(&self, delay_seconds: f64) -> Classification {
        self.with_state(|s| s.punctuality_status(delay_seconds))
    }

    pub async fn fetch_realtime_vehicles(
        &self,
        filter: &Filter,
    ) -> Result<Vec<VehiclePosition>, RequestError> {
        self.fetch_into(
            Resource::RealtimeVehicles,
            self.gateway.realtime_vehicles(filter),
            |s, v| s.realtime_vehicles = v,
        )
        .await
    }

    pub async fn fetch_realtime_delays(
        &self,
        filter: &Filter,
    ) -> Result<Vec<DelayRecord>, RequestError> {
        self.fetch_into(
            Resource::RealtimeDelays,
            self.gateway.realtime_delays(filter),
            |s, v| s.realtime_delays = v,
        )
        .await
    }

    pub async fn fetch_realtime_summary(&self) -> Result<RealtimeSummary, RequestError> {
        self.fetch_into(
            Resource::RealtimeSummary,
            self.gateway.realtime_summary(),
            |s, v| s.realtime_summary = v,
        )
        .await
    }

    pub async fn fetch_punctuality_overview(
        &self,
        filter: &Filter,
    ) -> Result<PunctualityOverview, RequestError> {
        self.fetch_into(
            Resource::PunctualityOverview,
            self.gateway.punctuality_overview(filter),
            |s, v| s.punctuality_overview = v,
        )
        .await
    }

    pub async fn fetch_route_punctuality(
        &self,
        filter: &Filter,
    ) -> Result<Vec<RoutePunctuality>, RequestError> {
        self.fetch_into(
            Resource::RoutePunctuality,
            self.gateway.route_punctuality(filter),
            |s, v| s.route_punctuality = v,
        )
        .await
    }

    pub async fn fetch_stop_punctuality(
        &self,
        filter: &Filter,
    ) -> Result<Vec<StopPunctuality>, RequestError> {
        self.fetch_into(
            Resource::StopPunctuality,
            self.gateway.stop_punctuality(filter),
            |s, v| s.stop_punctuality = v,
        )
        .await
    }

    pub async fn fetch_hourly_punctuality(
        &self,
        filter: &Filter,
    ) -> Result<Vec<HourlyPunctuality>, RequestError> {
        self.fetch_into(
            Resource::HourlyPunctuality,
            self.gateway.hourly_punctuality(filter),
            |s, v| s.hourly_punctuality = v,
        )
        .await
    }

    /// Replaces the cached threshold configuration wholesale.
    pub async fn fetch_punctuality_config(&self) -> Result<PunctualityConfig, RequestError> {
        self.fetch_into(
            Resource::PunctualityConfig,
            self.gateway.punctuality_config(),
            |s, v| s.punctuality_config = v,
        )
        .await
    }

    /// Sends a partial threshold update and, once the server accepts it,
    /// merges the given keys into the cached configuration.
    ///
    /// The update is checked first: merged into the cached configuration and
    /// resolved with defaults for missing keys, the thresholds must stay in
    /// order. Otherwise it is rejected without contacting the server.
    #[tracing::instrument(skip(self))]
    pub async fn update_punctuality_config(
        &self,
        update: ConfigUpdate,
    ) -> Result<Value, UpdateError> {
        let _in_flight = InFlight::begin(&self.state);

        let checked = update.validate().and_then(|()| {
            let mut merged = self.punctuality_config();
            merged.merge(&update);
            merged.validate()
        });
        if let Err(e) = checked {
            self.record_failure(Resource::PunctualityConfig.name(), &e);
            return Err(e.into());
        }

        match self.gateway.update_punctuality_config(&update).await {
            Ok(envelope) => {
                self.state
                    .send_modify(|s| s.punctuality_config.merge(&update));
                info!("punctuality config updated");
                Ok(envelope.data.unwrap_or(Value::Null))
            }
            Err(e) => {
                self.record_failure(Resource::PunctualityConfig.name(), &e);
                Err(e.into())
            }
        }
    }

    /// Fetches the overview, the top routes and the realtime summary
    /// concurrently. Every fetch runs to completion; if any failed, the
    /// error names all of them.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_all_punctuality_data(&self) -> Result<PunctualityData, AggregateError> {
        let _in_flight = InFlight::begin(&self.state);
        self.state.send_modify(|s| s.error = None);

        let all = Filter::default();
        let top_routes = Filter::limit(OVERVIEW_ROUTE_LIMIT);

        let result = Orchestration::AllSettled
            .run(
                (
                    Resource::PunctualityOverview.name(),
                    self.fetch_punctuality_overview(&all),
                ),
                (
                    Resource::RoutePunctuality.name(),
                    self.fetch_route_punctuality(&top_routes),
                ),
                (
                    Resource::RealtimeSummary.name(),
                    self.fetch_realtime_summary(),
                ),
            )
            .await;

        match result {
            Ok((overview, routes, summary)) => Ok(PunctualityData {
                overview,
                routes,
                summary,
            }),
            Err(e) => {
                self.record_failure("punctuality data", &e);
                Err(e)
            }
        }
    }

    /// Refreshes vehicles, delays and the realtime summary concurrently.
    /// The first failure aborts the whole refresh; fetches still in flight
    /// are dropped and leave their cached values untouched.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_realtime_data(&self) -> Result<RealtimeData, AggregateError> {
        let _in_flight = InFlight::begin(&self.state);

        let vehicles = Filter::limit(REALTIME_VEHICLE_LIMIT);
        let delays = Filter::limit(REALTIME_DELAY_LIMIT);

        let result = Orchestration::FailFast
            .run(
                (
                    Resource::RealtimeVehicles.name(),
                    self.fetch_realtime_vehicles(&vehicles),
                ),
                (
                    Resource::RealtimeDelays.name(),
                    self.fetch_realtime_delays(&delays),
                ),
                (
                    Resource::RealtimeSummary.name(),
                    self.fetch_realtime_summary(),
                ),
            )
            .await;

        match result {
            Ok((vehicles, delays, summary)) => Ok(RealtimeData {
                vehicles,
                delays,
                summary,
            }),
            Err(e) => {
                self.record_failure("realtime data", &e);
                Err(e)
            }
        }
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| s.error = None);
    }

    /// Empties every cached collection and the error. Operations in flight
    /// keep `loading` set.
    pub fn reset_store(&self) {
        self.state.send_modify(StoreState::clear_cached);
        debug!("store reset");
    }

    async fn fetch_into<T: Default + Clone>(
        &self,
        resource: Resource,
        request: impl Future<Output = Result<Envelope<T>, RequestError>>,
        commit: impl FnOnce(&mut StoreState, T),
    ) -> Result<T, RequestError> {
        let _in_flight = InFlight::begin(&self.state);

        match request.await {
            Ok(envelope) => {
                let data = envelope.into_data();
                let cached = data.clone();
                self.state.send_modify(|s| commit(s, cached));
                debug!(resource = resource.name(), "cache updated");
                Ok(data)
            }
            Err(e) => {
                self.record_failure(resource.name(), &e);
                Err(e)
            }
        }
    }

    fn record_failure(&self, operation: &str, err: &impl Display) {
        let message = err.to_string();
        error!(operation, error = %message, "punctuality request failed");
        self.state.send_modify(|s| s.error = Some(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::PunctualityStatus;

    #[test]
    fn test_derived_values_on_empty_state() {
        let state = StoreState::default();
        assert!(!state.loading());
        assert!(!state.has_realtime_data());
        assert!(!state.has_punctuality_data());
        assert_eq!(state.system_stats(), SystemStats::default());
        assert_eq!(state.thresholds(), Thresholds::DEFAULT);
    }

    #[test]
    fn test_has_realtime_data_with_delays_only() {
        let state = StoreState {
            realtime_delays: vec![DelayRecord::default()],
            ..Default::default()
        };
        assert!(state.has_realtime_data());
    }

    #[test]
    fn test_has_punctuality_data_requires_explicit_true() {
        let mut state = StoreState::default();
        state.punctuality_overview.total_routes = Some(12.0);
        assert!(!state.has_punctuality_data());
        state.punctuality_overview.data_available = Some(true);
        assert!(state.has_punctuality_data());
        assert_eq!(state.system_stats().total_routes, 12.0);
    }

    #[test]
    fn test_status_uses_cached_thresholds() {
        let mut state = StoreState::default();
        assert_eq!(state.punctuality_status(100.0).status, PunctualityStatus::OnTime);
        state.punctuality_config.on_time_threshold_seconds = Some(90.0);
        assert_eq!(state.punctuality_status(100.0).status, PunctualityStatus::Late);
    }

    #[test]
    fn test_clear_cached_keeps_in_flight() {
        let mut state = StoreState {
            error: Some("boom".into()),
            realtime_delays: vec![DelayRecord::default()],
            in_flight: 2,
            ..Default::default()
        };
        state.clear_cached();
        assert!(state.loading());
        assert!(state.error.is_none());
        assert!(state.realtime_delays.is_empty());
    }
}
