//! Static table of selectable cities.

use crate::types::Coordinate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub coordinate: Coordinate,
}

impl City {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            coordinate: Coordinate::new(latitude, longitude),
        }
    }
}

/// Read-only name to coordinate lookup
#[derive(Debug, Clone, PartialEq)]
pub struct CityCatalog {
    cities: Vec<City>,
}

impl CityCatalog {
    pub fn new(cities: Vec<City>) -> Self {
        Self { cities }
    }

    /// The cities offered out of the box
    pub fn builtin() -> Self {
        Self::new(vec![
            City::new("New York", 40.7128, -74.0060),
            City::new("London", 51.5074, -0.1278),
            City::new("Tokyo", 35.6895, 139.6917),
            City::new("Paris", 48.8566, 2.3522),
            City::new("Sydney", -33.8688, 151.2093),
            City::new("Dubai", 25.276987, 55.296249),
            City::new("Singapore", 1.3521, 103.8198),
            City::new("Rome", 41.9028, 12.4964),
            City::new("Colombo", 6.9271, 79.8612),
            City::new("Delhi", 28.6139, 77.2090),
        ])
    }

    /// Exact, case-sensitive name match
    pub fn lookup(&self, name: &str) -> Option<&City> {
        self.cities.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }
}

impl Default for CityCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_builtin_has_ten_cities() {
        let catalog = CityCatalog::builtin();
        assert_eq!(catalog.cities().len(), 10);
        assert!(catalog.cities().iter().all(|c| c.coordinate.is_valid()));
    }

    #[test]
    fn test_lookup() {
        let catalog = CityCatalog::builtin();
        let london = catalog.lookup("London").unwrap();
        assert_eq!(london.coordinate, Coordinate::new(51.5074, -0.1278));
        assert!(catalog.lookup("london").is_none());
        assert!(!catalog.contains("Atlantis"));
    }
}
