use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Envelope, Filter, PunctualityGateway, Resource};
use crate::error::RequestError;
use crate::fetch::{BasicClient, HttpClient, fetch_bytes};
use crate::models::{
    ConfigUpdate, DelayRecord, HourlyPunctuality, PunctualityConfig, PunctualityOverview,
    RealtimeSummary, RoutePunctuality, StopPunctuality, VehiclePosition,
};

/// Status code the service puts in the body of every successful response.
const SUCCESS_CODE: i64 = 200;

/// Body shape shared by every endpoint: `{"code", "message", "data"}`.
#[derive(Deserialize)]
struct StatusEnvelope {
    code: Option<i64>,
    message: Option<String>,
    data: Option<Value>,
}

/// [`PunctualityGateway`] over HTTP/JSON.
pub struct HttpGateway<C = BasicClient> {
    client: C,
    base_url: Url,
}

impl<C: HttpClient> HttpGateway<C> {
    pub fn new(client: C, base_url: &str) -> Result<Self, RequestError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| RequestError::InvalidUrl(format!("{base_url}: {e}")))?;
        // Url::join drops the last segment unless the path ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[tracing::instrument(skip(self, resource, filter), fields(resource = resource.name()))]
    async fn get<T: DeserializeOwned>(
        &self,
        resource: Resource,
        filter: &Filter,
    ) -> Result<Envelope<T>, RequestError> {
        let url = build_url(&self.base_url, resource, filter)?;
        debug!(%url, "GET");
        let req = reqwest::Request::new(Method::GET, url);
        let (status, body) = fetch_bytes(&self.client, req).await?;
        decode_envelope(status, &body)
    }

    #[tracing::instrument(skip(self, resource, body), fields(resource = resource.name()))]
    async fn put<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        resource: Resource,
        body: &B,
    ) -> Result<Envelope<T>, RequestError> {
        let url = build_url(&self.base_url, resource, &Filter::default())?;
        debug!(%url, "PUT");
        let mut req = reqwest::Request::new(Method::PUT, url);
        req.headers_mut().insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        *req.body_mut() = Some(serde_json::to_vec(body)?.into());
        let (status, body) = fetch_bytes(&self.client, req).await?;
        decode_envelope(status, &body)
    }
}

/// Resolves `resource` against the base URL and appends the filter as query
/// parameters.
pub(crate) fn build_url(
    base_url: &Url,
    resource: Resource,
    filter: &Filter,
) -> Result<Url, RequestError> {
    let mut url = base_url
        .join(resource.path())
        .map_err(|e| RequestError::InvalidUrl(e.to_string()))?;
    if !filter.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in filter.iter() {
            pairs.append_pair(key, &value.to_string());
        }
    }
    Ok(url)
}

/// Strips the status envelope, turning a non-success HTTP status or body
/// code into [`RequestError::Status`].
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<Envelope<T>, RequestError> {
    let envelope: StatusEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(RequestError::status(
                status.as_u16().into(),
                format!("request failed with status {status}"),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let code = envelope.code.unwrap_or_else(|| status.as_u16().into());
    if !status.is_success() || code != SUCCESS_CODE {
        let message = envelope
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("request failed with status {status}"));
        return Err(RequestError::status(code, message));
    }

    let data = match envelope.data {
        None | Some(Value::Null) => None,
        Some(value) => Some(serde_json::from_value(value)?),
    };
    Ok(Envelope {
        data,
        message: envelope.message,
    })
}

#[async_trait]
impl<C: HttpClient> PunctualityGateway for HttpGateway<C> {
    async fn realtime_vehicles(
        &self,
        filter: &Filter,
    ) -> Result<Envelope<Vec<VehiclePosition>>, RequestError> {
        self.get(Resource::RealtimeVehicles, filter).await
    }

    async fn realtime_delays(
        &self,
        filter: &Filter,
    ) -> Result<Envelope<Vec<DelayRecord>>, RequestError> {
        self.get(Resource::RealtimeDelays, filter).await
    }

    async fn realtime_summary(&self) -> Result<Envelope<RealtimeSummary>, RequestError> {
        self.get(Resource::RealtimeSummary, &Filter::default()).await
    }

    async fn punctuality_overview(
        &self,
        filter: &Filter,
    ) -> Result<Envelope<PunctualityOverview>, RequestError> {
        self.get(Resource::PunctualityOverview, filter).await
    }

    async fn route_punctuality(
        &self,
        filter: &Filter,
    ) -> Result<Envelope<Vec<RoutePunctuality>>, RequestError> {
        self.get(Resource::RoutePunctuality, filter).await
    }

    async fn stop_punctuality(
        &self,
        filter: &Filter,
    ) -> Result<Envelope<Vec<StopPunctuality>>, RequestError> {
        self.get(Resource::StopPunctuality, filter).await
    }

    async fn hourly_punctuality(
        &self,
        filter: &Filter,
    ) -> Result<Envelope<Vec<HourlyPunctuality>>, RequestError> {
        self.get(Resource::HourlyPunctuality, filter).await
    }

    async fn punctuality_config(&self) -> Result<Envelope<PunctualityConfig>, RequestError> {
        self.get(Resource::PunctualityConfig, &Filter::default()).await
    }

    async fn update_punctuality_config(
        &self,
        update: &ConfigUpdate,
    ) -> Result<Envelope<Value>, RequestError> {
        self.put(Resource::PunctualityConfig, update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let gw = HttpGateway::new(BasicClient::new(), "http://localhost:5000/api").unwrap();
        assert_eq!(gw.base_url().as_str(), "http://localhost:5000/api/");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = HttpGateway::new(BasicClient::new(), "not a url");
        assert!(matches!(result, Err(RequestError::InvalidUrl(_))));
    }

    #[test]
    fn test_build_url_with_filter() {
        let base = Url::parse("http://localhost:5000/api/").unwrap();
        let filter = Filter::limit(20).with("route_id", "R 1");
        let url = build_url(&base, Resource::RoutePunctuality, &filter).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/punctuality/routes?limit=20&route_id=R+1"
        );
    }

    #[test]
    fn test_build_url_without_filter_has_no_query() {
        let base = Url::parse("http://localhost:5000/api/").unwrap();
        let url = build_url(&base, Resource::RealtimeSummary, &Filter::default()).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/realtime/summary");
    }

    #[test]
    fn test_decode_success() {
        let raw = body(json!({
            "code": 200,
            "message": "success",
            "data": [{ "route_id": "R1", "avg_punctuality_rate": 91.5 }]
        }));
        let env: Envelope<Vec<RoutePunctuality>> = decode_envelope(StatusCode::OK, &raw).unwrap();
        let routes = env.into_data();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].rate(), Some(91.5));
    }

    #[test]
    fn test_decode_null_data() {
        let raw = body(json!({ "code": 200, "message": "success", "data": null }));
        let env: Envelope<RealtimeSummary> = decode_envelope(StatusCode::OK, &raw).unwrap();
        assert!(env.data.is_none());
    }

    #[test]
    fn test_decode_server_error_uses_message() {
        let raw = body(json!({ "code": 500, "message": "query failed: timeout", "data": null }));
        let err = decode_envelope::<Value>(StatusCode::INTERNAL_SERVER_ERROR, &raw).unwrap_err();
        match err {
            RequestError::Status { code, message } => {
                assert_eq!(code, 500);
                assert_eq!(message, "query failed: timeout");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_error_code_with_http_ok() {
        let raw = body(json!({ "code": 400, "message": "empty config", "data": null }));
        let err = decode_envelope::<Value>(StatusCode::OK, &raw).unwrap_err();
        assert_eq!(err.to_string(), "empty config");
    }

    #[test]
    fn test_decode_non_json_error_body() {
        let err = decode_envelope::<Value>(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>")
            .unwrap_err();
        assert_eq!(err.to_string(), "request failed with status 502 Bad Gateway");
    }

    #[test]
    fn test_decode_wrong_payload_shape() {
        let raw = body(json!({ "code": 200, "data": { "not": "a list" } }));
        let err = decode_envelope::<Vec<DelayRecord>>(StatusCode::OK, &raw).unwrap_err();
        assert!(matches!(err, RequestError::Decode(_)));
    }
}
