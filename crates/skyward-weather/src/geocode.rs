//! Forward and reverse geocoding.
//! Uses Nominatim (OpenStreetMap) - free, no API key required.

use crate::types::{Coordinate, GeocodeError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// Place-name lookups in both directions.
#[async_trait]
pub trait Geocoder: Send + Sync + 'static {
    /// Resolve free text to a coordinate. First match wins.
    async fn forward(&self, query: &str) -> Result<Coordinate, GeocodeError>;

    /// Resolve a coordinate to a locality name.
    ///
    /// `Ok(None)` means the provider knows no locality for the point.
    async fn reverse(&self, coordinate: Coordinate) -> Result<Option<String>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
}

impl NominatimAddress {
    /// Prefer city > town > village > municipality
    fn locality(self) -> Option<String> {
        self.city
            .or(self.town)
            .or(self.village)
            .or(self.municipality)
            .filter(|name| !name.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Arc<Client>,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn with_base_url(
        base_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| GeocodeError::Provider(format!("Failed to create geocoding client: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, GeocodeError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| GeocodeError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeocodeError::Provider(format!(
                "{} returned status {}",
                endpoint,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GeocodeError::Provider(format!("{endpoint} parse error: {e}")))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[tracing::instrument(skip(self))]
    async fn forward(&self, query: &str) -> Result<Coordinate, GeocodeError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(GeocodeError::NotFound(String::new()));
        }

        let places: Vec<NominatimPlace> = self
            .get(
                "search",
                &[
                    ("q", query.to_string()),
                    ("format", "json".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        let place = places
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::NotFound(query.to_string()))?;

        let latitude: f64 = place
            .lat
            .parse()
            .map_err(|_| GeocodeError::Provider(format!("bad latitude '{}'", place.lat)))?;
        let longitude: f64 = place
            .lon
            .parse()
            .map_err(|_| GeocodeError::Provider(format!("bad longitude '{}'", place.lon)))?;

        let coordinate = Coordinate::new(latitude, longitude);
        tracing::info!(
            "Geocoded '{}' to {} ({})",
            query,
            coordinate,
            place.display_name.as_deref().unwrap_or("unnamed")
        );
        Ok(coordinate)
    }

    #[tracing::instrument(skip(self))]
    async fn reverse(&self, coordinate: Coordinate) -> Result<Option<String>, GeocodeError> {
        let body: NominatimReverse = self
            .get(
                "reverse",
                &[
                    ("lat", coordinate.latitude.to_string()),
                    ("lon", coordinate.longitude.to_string()),
                    ("format", "json".to_string()),
                    ("addressdetails", "1".to_string()),
                    ("zoom", "10".to_string()),
                ],
            )
            .await?;

        let name = body.address.and_then(NominatimAddress::locality);
        match &name {
            Some(n) => tracing::info!("Reverse geocoded to: {}", n),
            None => tracing::debug!("No locality for {}", coordinate),
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_locality_preference() {
        let address = NominatimAddress {
            city: None,
            town: Some("Keswick".into()),
            village: Some("Portinscale".into()),
            municipality: None,
        };
        assert_eq!(address.locality().as_deref(), Some("Keswick"));
    }

    #[test]
    fn test_blank_locality_is_none() {
        let address = NominatimAddress {
            city: Some("  ".into()),
            town: None,
            village: None,
            municipality: None,
        };
        assert_eq!(address.locality(), None);
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let geocoder = NominatimGeocoder::with_base_url(
            "http://localhost:9/",
            "skyward-test",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(geocoder.base_url, "http://localhost:9");
    }

    #[tokio::test]
    async fn test_empty_query_is_not_found() {
        let geocoder =
            NominatimGeocoder::with_base_url(NOMINATIM_URL, "skyward-test", Duration::from_secs(1))
                .unwrap();
        let err = geocoder.forward("   ").await.unwrap_err();
        assert!(matches!(err, GeocodeError::NotFound(_)));
    }
}
