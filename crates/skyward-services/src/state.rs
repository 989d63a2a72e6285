//! Observable application state.

use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use skyward_weather::{
    AuthorizationState, Coordinate, FavoriteSet, LocationSource, UnitSystem, WeatherSnapshot,
};
use std::sync::Arc;

/// A forecast together with the request that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveForecast {
    pub coordinate: Coordinate,
    pub unit: UnitSystem,
    pub snapshot: WeatherSnapshot,
    pub fetched_at: DateTime<Utc>,
}

impl ActiveForecast {
    pub fn matches(&self, coordinate: Coordinate, unit: UnitSystem) -> bool {
        self.coordinate == coordinate && self.unit == unit
    }
}

/// Everything a front end renders. Published whole after each change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub source: LocationSource,
    pub coordinate: Option<Coordinate>,
    pub location_name: Option<String>,
    pub unit: UnitSystem,
    pub forecast: Option<Arc<ActiveForecast>>,
    pub favorites: FavoriteSet,
    pub authorization: AuthorizationState,
    /// Source is the device and permission allows it
    pub using_current_location: bool,
    pub error: Option<ControllerError>,
    /// A forecast request is outstanding
    pub fetching: bool,
}

impl AppState {
    /// Recompute derived fields
    pub(crate) fn refresh_derived(&mut self) {
        self.using_current_location =
            self.source.is_current_device() && self.authorization.is_authorized();
    }
}
