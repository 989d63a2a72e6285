//! Orchestration for Skyward
//!
//! Ties the location resolver, geocoder, forecast fetcher and favorites store
//! together behind a single controller with observable state.

pub mod controller;
pub mod error;
mod error_mapping;
pub mod requests;
pub mod state;

pub use controller::{Collaborators, Controller, ControllerHandle, ControllerOptions};
pub use error::{ControllerError, ErrorKind, HandleError};
pub use requests::{LatestOnly, Ticket};
pub use state::{ActiveForecast, AppState};
