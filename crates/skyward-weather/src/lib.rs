//! Weather collaborators for Skyward
//!
//! Forecasts come from the OpenWeather One Call API, place names from
//! Nominatim, and device position from a [`LocationPlatform`]. Favorite
//! cities persist through a [`SlotStorage`].

pub mod catalog;
pub mod favorites;
pub mod geocode;
pub mod location;
pub mod provider;
pub mod types;

pub use catalog::{City, CityCatalog};
pub use favorites::{FavoriteSet, FavoritesStore, JsonFileSlots, MemorySlots, SlotStorage};
pub use geocode::{Geocoder, NominatimGeocoder};
pub use location::{ConfiguredLocation, LocationEvent, LocationPlatform, LocationResolver};
pub use provider::{OpenWeatherClient, WeatherFetcher};
pub use types::*;
