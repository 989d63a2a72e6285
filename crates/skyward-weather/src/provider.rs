//! Forecast retrieval from the OpenWeather One Call API.

use crate::types::{Coordinate, FetchError, UnitSystem, WeatherSnapshot};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/3.0/onecall";
/// Blocks the forecast model does not carry
const EXCLUDED_BLOCKS: &str = "minutely,alerts";

/// Anything that can turn a coordinate and unit system into a forecast.
#[async_trait]
pub trait WeatherFetcher: Send + Sync + 'static {
    async fn fetch(
        &self,
        coordinate: Coordinate,
        unit: UnitSystem,
    ) -> Result<WeatherSnapshot, FetchError>;
}

#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Arc<Client>,
    endpoint: String,
    api_key: String,
}

impl OpenWeatherClient {
    /// Client against a custom endpoint (self-hosted proxy or test server)
    pub fn with_endpoint(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    /// Build the request URL for a coordinate and unit system
    pub fn request_url(&self, coordinate: Coordinate, unit: UnitSystem) -> Result<Url, FetchError> {
        if !coordinate.is_valid() {
            return Err(FetchError::InvalidRequest(format!(
                "coordinate out of range: {coordinate}"
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(FetchError::InvalidRequest("no API key configured".into()));
        }

        let lat = coordinate.latitude.to_string();
        let lon = coordinate.longitude.to_string();
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("exclude", EXCLUDED_BLOCKS),
                ("units", unit.query_token()),
                ("appid", self.api_key.as_str()),
            ],
        )
        .map_err(|e| FetchError::InvalidRequest(format!("invalid endpoint {}: {e}", self.endpoint)))
    }
}

/// Decode a One Call response body
pub fn decode_snapshot(body: &str) -> Result<WeatherSnapshot, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))
}

#[async_trait]
impl WeatherFetcher for OpenWeatherClient {
    #[tracing::instrument(skip(self))]
    async fn fetch(
        &self,
        coordinate: Coordinate,
        unit: UnitSystem,
    ) -> Result<WeatherSnapshot, FetchError> {
        let url = self.request_url(coordinate, unit)?;
        tracing::debug!(endpoint = %self.endpoint, "Requesting forecast");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Forecast request failed with status {}", status);
            return Err(FetchError::UnexpectedResponse {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let snapshot = decode_snapshot(&body)?;
        tracing::debug!(
            hourly = snapshot.hourly.len(),
            daily = snapshot.daily.len(),
            "Forecast decoded"
        );
        Ok(snapshot)
    }
}
