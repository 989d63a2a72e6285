use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A point on Earth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and inside the lat/lon ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Unit system requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    /// Value of the `units` query parameter
    pub fn query_token(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }

    pub fn temperature_suffix(&self) -> &'static str {
        match self {
            Self::Metric => "°C",
            Self::Imperial => "°F",
        }
    }

    pub fn speed_suffix(&self) -> &'static str {
        match self {
            Self::Metric => "m/s",
            Self::Imperial => "mph",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown unit system '{0}' (expected metric or imperial)")]
pub struct ParseUnitError(pub String);

impl FromStr for UnitSystem {
    type Err = ParseUnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metric" => Ok(Self::Metric),
            "imperial" => Ok(Self::Imperial),
            other => Err(ParseUnitError(other.to_string())),
        }
    }
}

/// Device location permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    #[default]
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedAlways,
    AuthorizedWhenInUse,
    Unknown,
}

impl AuthorizationState {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::AuthorizedAlways | Self::AuthorizedWhenInUse)
    }

    /// No location updates will be attempted in this state
    pub fn is_unusable(&self) -> bool {
        matches!(self, Self::Restricted | Self::Denied | Self::Unknown)
    }
}

/// Which input currently decides the active coordinate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LocationSource {
    #[default]
    CurrentDevice,
    SelectedFavorite(String),
    SearchedPlace(String),
}

impl LocationSource {
    pub fn is_current_device(&self) -> bool {
        matches!(self, Self::CurrentDevice)
    }
}

/// Weather condition categories mapped from OpenWeather condition ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
}

impl WeatherCondition {
    /// See: https://openweathermap.org/weather-conditions
    pub fn from_condition_id(id: u16) -> Self {
        match id {
            200..=232 => Self::Thunderstorm,
            300..=321 => Self::Drizzle,
            502..=504 | 522 => Self::HeavyRain,
            511 => Self::Sleet, // Freezing rain
            500..=531 => Self::Rain,
            611..=616 => Self::Sleet,
            600..=622 => Self::Snow,
            701..=781 => Self::Fog,
            800 => Self::Clear,
            801 | 802 => Self::PartlyCloudy,
            803 | 804 => Self::Cloudy,
            _ => Self::Clear, // Unknown ids default to clear
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
        }
    }
}

/// 8-point compass direction for a wind bearing in degrees
pub fn compass_point(degrees: f64) -> &'static str {
    const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let index = (degrees.rem_euclid(360.0) / 45.0).round() as usize % 8;
    POINTS[index]
}

/// UV exposure band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UvCategory {
    Low,
    Moderate,
    High,
    VeryHigh,
    Extreme,
}

impl UvCategory {
    pub fn from_index(uvi: f64) -> Self {
        if uvi < 3.0 {
            Self::Low
        } else if uvi < 6.0 {
            Self::Moderate
        } else if uvi < 8.0 {
            Self::High
        } else if uvi < 11.0 {
            Self::VeryHigh
        } else {
            Self::Extreme
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
            Self::VeryHigh => "Very High",
            Self::Extreme => "Extreme",
        }
    }
}

/// Provider condition entry (`weather[]` in the payload)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: u16,
    pub main: String,
    pub description: String,
    pub icon: String,
}

impl Condition {
    pub fn category(&self) -> WeatherCondition {
        WeatherCondition::from_condition_id(self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    #[serde(rename = "wind_speed")]
    pub speed: f64,
    #[serde(rename = "wind_deg")]
    pub degree: f64,
    #[serde(rename = "wind_gust", default, skip_serializing_if = "Option::is_none")]
    pub gust: Option<f64>,
}

impl Wind {
    pub fn compass_point(&self) -> &'static str {
        compass_point(self.degree)
    }
}

/// Conditions at one instant (the `current` block)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantConditions {
    #[serde(rename = "dt", with = "chrono::serde::ts_seconds")]
    pub observed_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub sunrise: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub sunset: Option<DateTime<Utc>>,
    #[serde(rename = "temp")]
    pub temperature: f64,
    pub feels_like: f64,
    pub pressure: f64,
    pub humidity: u8,
    #[serde(default)]
    pub dew_point: Option<f64>,
    #[serde(rename = "uvi")]
    pub uv_index: f64,
    pub clouds: u8,
    pub visibility: u32,
    #[serde(flatten)]
    pub wind: Wind,
    #[serde(rename = "weather")]
    pub conditions: Vec<Condition>,
}

impl InstantConditions {
    pub fn primary_condition(&self) -> Option<&Condition> {
        self.conditions.first()
    }

    pub fn uv_category(&self) -> UvCategory {
        UvCategory::from_index(self.uv_index)
    }
}

/// Precipitation volume over the last hour (mm)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyVolume {
    #[serde(rename = "1h")]
    pub last_hour: f64,
}

/// One entry of the 48-hour forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPoint {
    #[serde(rename = "dt", with = "chrono::serde::ts_seconds")]
    pub time: DateTime<Utc>,
    #[serde(rename = "temp")]
    pub temperature: f64,
    pub feels_like: f64,
    pub pressure: f64,
    pub humidity: u8,
    #[serde(default)]
    pub dew_point: Option<f64>,
    #[serde(rename = "uvi")]
    pub uv_index: f64,
    pub clouds: u8,
    #[serde(default)]
    pub visibility: Option<u32>,
    #[serde(flatten)]
    pub wind: Wind,
    #[serde(rename = "weather")]
    pub conditions: Vec<Condition>,
    /// Probability of precipitation, 0..=1
    pub pop: f64,
    #[serde(default)]
    pub rain: Option<HourlyVolume>,
    #[serde(default)]
    pub snow: Option<HourlyVolume>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub day: f64,
    pub min: f64,
    pub max: f64,
    pub night: f64,
    pub eve: f64,
    pub morn: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeelsLike {
    pub day: f64,
    pub night: f64,
    pub eve: f64,
    pub morn: f64,
}

/// One entry of the daily forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    #[serde(rename = "dt", with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub sunrise: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub sunset: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(rename = "temp")]
    pub temperature: TemperatureRange,
    pub feels_like: FeelsLike,
    pub pressure: f64,
    pub humidity: u8,
    #[serde(default)]
    pub dew_point: Option<f64>,
    #[serde(flatten)]
    pub wind: Wind,
    #[serde(rename = "weather")]
    pub conditions: Vec<Condition>,
    pub clouds: u8,
    pub pop: f64,
    /// Rain volume (mm)
    #[serde(default)]
    pub rain: Option<f64>,
    /// Snow volume (mm)
    #[serde(default)]
    pub snow: Option<f64>,
    #[serde(rename = "uvi")]
    pub uv_index: f64,
}

impl DailyPoint {
    pub fn primary_condition(&self) -> Option<&Condition> {
        self.conditions.first()
    }
}

/// Complete result of one forecast fetch. Replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub timezone: String,
    pub timezone_offset: i32,
    pub current: InstantConditions,
    #[serde(default)]
    pub hourly: Vec<HourlyPoint>,
    #[serde(default)]
    pub daily: Vec<DailyPoint>,
}

/// Forecast fetch errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Unexpected response: {status} - {body}")]
    UnexpectedResponse { status: u16, body: String },
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Geocoding errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum GeocodeError {
    #[error("No place matches '{0}'")]
    NotFound(String),
    #[error("Geocoding provider error: {0}")]
    Provider(String),
}

/// Location service errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission unavailable")]
    PermissionUnavailable,
    #[error("No location fix available")]
    NoFix,
    #[error("Location request timed out")]
    Timeout,
}

/// Favorites persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
