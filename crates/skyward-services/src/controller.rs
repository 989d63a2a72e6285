//! Orchestration controller.
//!
//! One owner task holds [`AppState`] and applies every change: user commands
//! from [`ControllerHandle`], location events from the resolver, and results
//! from forecast and geocoding requests that run on their own tasks. After
//! each applied message the whole state is published on a watch channel.

use crate::error::HandleError;
use crate::requests::{LatestOnly, Ticket};
use crate::state::{ActiveForecast, AppState};
use anyhow::Context;
use skyward_core::{Config, UnitPreference};
use skyward_weather::{
    CityCatalog, ConfiguredLocation, Coordinate, FetchError, FavoritesStore, GeocodeError,
    Geocoder, JsonFileSlots, LocationEvent, LocationResolver, LocationSource, NominatimGeocoder,
    OpenWeatherClient, UnitSystem, WeatherFetcher, WeatherSnapshot,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// The collaborators the controller drives
pub struct Collaborators {
    pub resolver: LocationResolver,
    pub geocoder: Arc<dyn Geocoder>,
    pub fetcher: Arc<dyn WeatherFetcher>,
    pub favorites: FavoritesStore,
    pub catalog: Arc<CityCatalog>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerOptions {
    /// Unit system for the first fetch
    pub unit: UnitSystem,
}

#[derive(Debug)]
enum Command {
    UseCurrentLocation,
    SelectFavorite(String),
    SearchPlace(String),
    ToggleFavorite(String),
    SetUnit(UnitSystem),
    AcknowledgeError,
}

type ForecastKey = (Coordinate, UnitSystem);

#[derive(Debug)]
enum Message {
    Command(Command),
    WeatherFetched {
        ticket: Ticket<ForecastKey>,
        result: Result<WeatherSnapshot, FetchError>,
    },
    PlaceResolved {
        ticket: Ticket<String>,
        result: Result<Coordinate, GeocodeError>,
    },
    LocalityResolved {
        ticket: Ticket<Coordinate>,
        result: Result<Option<String>, GeocodeError>,
    },
}

/// Front-end handle. Cheap to clone; every clone talks to the same controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Message>,
    state: watch::Receiver<Arc<AppState>>,
    cancel: CancellationToken,
}

impl ControllerHandle {
    pub fn use_current_location(&self) -> Result<(), HandleError> {
        self.send(Command::UseCurrentLocation)
    }

    pub fn select_favorite(&self, name: impl Into<String>) -> Result<(), HandleError> {
        self.send(Command::SelectFavorite(name.into()))
    }

    pub fn search_place(&self, text: impl Into<String>) -> Result<(), HandleError> {
        self.send(Command::SearchPlace(text.into()))
    }

    pub fn toggle_favorite(&self, name: impl Into<String>) -> Result<(), HandleError> {
        self.send(Command::ToggleFavorite(name.into()))
    }

    pub fn set_unit(&self, unit: UnitSystem) -> Result<(), HandleError> {
        self.send(Command::SetUnit(unit))
    }

    pub fn acknowledge_error(&self) -> Result<(), HandleError> {
        self.send(Command::AcknowledgeError)
    }

    /// Latest published state
    pub fn state(&self) -> Arc<AppState> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.state.clone()
    }

    /// Stop the controller and wait for its task to exit
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tx.closed().await;
    }

    fn send(&self, command: Command) -> Result<(), HandleError> {
        if self.cancel.is_cancelled() {
            return Err(HandleError::Closed);
        }
        self.tx
            .send(Message::Command(command))
            .map_err(|_| HandleError::Closed)
    }
}

pub struct Controller {
    resolver: LocationResolver,
    geocoder: Arc<dyn Geocoder>,
    fetcher: Arc<dyn WeatherFetcher>,
    favorites: FavoritesStore,
    catalog: Arc<CityCatalog>,
    state: AppState,
    publisher: watch::Sender<Arc<AppState>>,
    // Weak so the loop ends once every handle is gone
    results: mpsc::WeakUnboundedSender<Message>,
    weather: LatestOnly<ForecastKey>,
    search: LatestOnly<String>,
    locality: LatestOnly<Coordinate>,
}

impl Controller {
    /// Spawn the owner task on the current tokio runtime
    pub fn start(collaborators: Collaborators, options: ControllerOptions) -> ControllerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = collaborators.resolver.subscribe();

        let mut initial = AppState {
            unit: options.unit,
            authorization: collaborators.resolver.authorization(),
            ..AppState::default()
        };
        initial.refresh_derived();
        let (publisher, state_rx) = watch::channel(Arc::new(initial.clone()));

        let controller = Controller {
            resolver: collaborators.resolver,
            geocoder: collaborators.geocoder,
            fetcher: collaborators.fetcher,
            favorites: collaborators.favorites,
            catalog: collaborators.catalog,
            state: initial,
            publisher,
            results: tx.downgrade(),
            weather: LatestOnly::new(),
            search: LatestOnly::new(),
            locality: LatestOnly::new(),
        };

        let cancel = CancellationToken::new();
        tokio::spawn(controller.run(rx, events, cancel.clone()));

        ControllerHandle {
            tx,
            state: state_rx,
            cancel,
        }
    }

    /// Wire the real collaborators from configuration. Must run inside a tokio runtime.
    pub fn from_config(config: &Config) -> anyhow::Result<ControllerHandle> {
        let runtime =
            tokio::runtime::Handle::try_current().context("Controller needs a tokio runtime")?;

        let fetcher = OpenWeatherClient::with_endpoint(
            config.weather.effective_api_key().unwrap_or_default(),
            config.weather.endpoint.clone(),
            Duration::from_secs(config.weather.timeout_secs),
        )?;
        let geocoder = NominatimGeocoder::with_base_url(
            config.geocoding.base_url.clone(),
            &config.geocoding.user_agent,
            Duration::from_secs(config.geocoding.timeout_secs),
        )?;

        let position = config
            .location
            .position()
            .map(|(latitude, longitude)| Coordinate::new(latitude, longitude));
        let resolver = LocationResolver::new(Arc::new(ConfiguredLocation::new(position)), runtime);

        let catalog = Arc::new(CityCatalog::builtin());
        let favorites = FavoritesStore::new(
            Arc::new(JsonFileSlots::new(config.favorites_path())),
            catalog.clone(),
            config.favorites.slot.clone(),
        );

        let unit = match config.weather.unit {
            UnitPreference::Metric => UnitSystem::Metric,
            UnitPreference::Imperial => UnitSystem::Imperial,
        };

        Ok(Self::start(
            Collaborators {
                resolver,
                geocoder: Arc::new(geocoder),
                fetcher: Arc::new(fetcher),
                favorites,
                catalog,
            },
            ControllerOptions { unit },
        ))
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Message>,
        mut events: mpsc::UnboundedReceiver<LocationEvent>,
        cancel: CancellationToken,
    ) {
        self.startup();
        self.publish();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(event) = events.recv() => self.on_location_event(event),
                message = rx.recv() => match message {
                    Some(message) => self.handle(message),
                    None => break,
                },
            }
            self.publish();
        }

        tracing::info!("Controller stopped");
    }

    fn startup(&mut self) {
        self.state.favorites = self.favorites.load();
        self.resolver.check_access();
        self.state.authorization = self.resolver.authorization();

        if let Some(coordinate) = self.resolver.current_coordinate() {
            self.set_coordinate(coordinate);
        }
        tracing::info!(
            "Controller started ({:?}, {} favorite(s))",
            self.state.authorization,
            self.state.favorites.len()
        );
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Command(command) => self.on_command(command),
            Message::WeatherFetched { ticket, result } => self.on_weather_fetched(ticket, result),
            Message::PlaceResolved { ticket, result } => self.on_place_resolved(ticket, result),
            Message::LocalityResolved { ticket, result } => {
                self.on_locality_resolved(ticket, result)
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        tracing::debug!("Command: {:?}", command);
        match command {
            Command::UseCurrentLocation => self.use_current_location(),
            Command::SelectFavorite(name) => self.select_favorite(&name),
            Command::SearchPlace(text) => self.search_place(text),
            Command::ToggleFavorite(name) => self.toggle_favorite(&name),
            Command::SetUnit(unit) => self.set_unit(unit),
            Command::AcknowledgeError => self.state.error = None,
        }
    }

    fn on_location_event(&mut self, event: LocationEvent) {
        match event {
            LocationEvent::AuthorizationChanged(status) => {
                self.state.authorization = status;
                if status.is_authorized() && self.state.source.is_current_device() {
                    self.resolver.request_fix();
                } else if status.is_unusable() {
                    // Not an error: the current-location option just goes away
                    tracing::info!("Current location unavailable ({:?})", status);
                    if self.state.source.is_current_device() {
                        self.clear_device_coordinate();
                    }
                }
            }
            LocationEvent::CoordinateArrived(coordinate) => {
                if self.state.source.is_current_device() {
                    self.set_coordinate(coordinate);
                } else {
                    tracing::debug!("Ignoring device fix while {:?} is active", self.state.source);
                }
            }
        }
    }

    fn use_current_location(&mut self) {
        self.search.invalidate();
        self.state.source = LocationSource::CurrentDevice;
        self.state.location_name = None;

        self.resolver.check_access();
        self.state.authorization = self.resolver.authorization();

        let fix = self
            .resolver
            .current_coordinate()
            .filter(|_| self.state.authorization.is_authorized());
        match fix {
            Some(coordinate) => self.set_coordinate(coordinate),
            None => {
                tracing::info!(
                    "No usable device fix ({:?}); waiting for one",
                    self.state.authorization
                );
                self.clear_device_coordinate();
            }
        }
    }

    /// Forget the device position without touching the displayed forecast
    fn clear_device_coordinate(&mut self) {
        self.state.coordinate = None;
        self.state.location_name = None;
        self.weather.invalidate();
        self.locality.invalidate();
        self.state.fetching = false;
    }

    fn select_favorite(&mut self, name: &str) {
        let Some(city) = self.catalog.lookup(name).cloned() else {
            tracing::warn!("Ignoring unknown city '{}'", name);
            return;
        };

        tracing::info!("Selected {}", city.name);
        self.search.invalidate();
        self.locality.invalidate();
        self.state.source = LocationSource::SelectedFavorite(city.name.clone());
        self.state.location_name = Some(city.name);
        self.set_coordinate(city.coordinate);
    }

    fn search_place(&mut self, text: String) {
        let text = text.trim().to_string();
        let ticket = self.search.begin(text.clone());
        let Some(tx) = self.results.upgrade() else {
            return;
        };

        tracing::info!("Searching for '{}'", text);
        let geocoder = self.geocoder.clone();
        tokio::spawn(async move {
            let result = geocoder.forward(&text).await;
            let _ = tx.send(Message::PlaceResolved { ticket, result });
        });
    }

    fn toggle_favorite(&mut self, name: &str) {
        if !self.catalog.contains(name) {
            tracing::warn!("Ignoring favorite toggle for unknown city '{}'", name);
            return;
        }

        if self.state.favorites.toggle(name) {
            tracing::info!("Added '{}' to favorites", name);
        } else {
            tracing::info!("Removed '{}' from favorites", name);
        }

        // Blocking write on the owner task: the set is durable before the
        // mutation is published. The file is a few hundred bytes.
        if let Err(e) = self.favorites.save(&self.state.favorites) {
            tracing::error!("Failed to save favorites: {}", e);
            self.state.error = Some(e.into());
        }
    }

    fn set_unit(&mut self, unit: UnitSystem) {
        if unit == self.state.unit {
            return;
        }
        tracing::info!("Unit system changed to {:?}", unit);
        self.state.unit = unit;
        self.request_forecast();
    }

    /// The active coordinate changed: fetch for it, and name it when it is the device's.
    fn set_coordinate(&mut self, coordinate: Coordinate) {
        self.state.coordinate = Some(coordinate);
        self.request_forecast();
        if self.state.source.is_current_device() {
            self.request_locality(coordinate);
        }
    }

    fn request_forecast(&mut self) {
        let Some(coordinate) = self.state.coordinate else {
            return;
        };
        let key = (coordinate, self.state.unit);

        if self.weather.in_flight() == Some(&key) {
            tracing::debug!("Forecast for {} already in flight", coordinate);
            return;
        }
        let displayed = self
            .state
            .forecast
            .as_ref()
            .is_some_and(|f| f.matches(coordinate, self.state.unit));
        if displayed && self.state.error.is_none() {
            tracing::debug!("Forecast for {} already displayed", coordinate);
            self.weather.invalidate();
            self.state.fetching = false;
            return;
        }

        let ticket = self.weather.begin(key);
        let Some(tx) = self.results.upgrade() else {
            return;
        };
        self.state.fetching = true;

        let fetcher = self.fetcher.clone();
        let unit = self.state.unit;
        tokio::spawn(async move {
            let result = fetcher.fetch(coordinate, unit).await;
            let _ = tx.send(Message::WeatherFetched { ticket, result });
        });
    }

    fn request_locality(&mut self, coordinate: Coordinate) {
        if self.locality.in_flight() == Some(&coordinate) {
            return;
        }
        let ticket = self.locality.begin(coordinate);
        let Some(tx) = self.results.upgrade() else {
            return;
        };

        let geocoder = self.geocoder.clone();
        tokio::spawn(async move {
            let result = geocoder.reverse(coordinate).await;
            let _ = tx.send(Message::LocalityResolved { ticket, result });
        });
    }

    fn on_weather_fetched(
        &mut self,
        ticket: Ticket<ForecastKey>,
        result: Result<WeatherSnapshot, FetchError>,
    ) {
        let current = self.state.coordinate.map(|c| (c, self.state.unit));
        if !self.weather.complete(&ticket) || current.as_ref() != Some(&ticket.key) {
            tracing::debug!("Discarding superseded forecast for {}", ticket.key.0);
            return;
        }
        self.state.fetching = false;

        let (coordinate, unit) = ticket.key;
        match result {
            Ok(snapshot) => {
                tracing::info!("Forecast updated for {}", coordinate);
                self.state.forecast = Some(Arc::new(ActiveForecast {
                    coordinate,
                    unit,
                    snapshot,
                    fetched_at: chrono::Utc::now(),
                }));
                self.state.error = None;
            }
            Err(e) => {
                tracing::warn!("Forecast fetch failed for {}: {}", coordinate, e);
                self.state.error = Some(e.into());
            }
        }
    }

    fn on_place_resolved(
        &mut self,
        ticket: Ticket<String>,
        result: Result<Coordinate, GeocodeError>,
    ) {
        if !self.search.complete(&ticket) {
            tracing::debug!("Discarding superseded search for '{}'", ticket.key);
            return;
        }

        match result {
            Ok(coordinate) => {
                tracing::info!("Found '{}' at {}", ticket.key, coordinate);
                self.locality.invalidate();
                self.state.source = LocationSource::SearchedPlace(ticket.key.clone());
                self.state.location_name = Some(ticket.key);
                self.set_coordinate(coordinate);
            }
            Err(e) => {
                tracing::warn!("Search for '{}' failed: {}", ticket.key, e);
                self.state.error = Some(e.into());
            }
        }
    }

    fn on_locality_resolved(
        &mut self,
        ticket: Ticket<Coordinate>,
        result: Result<Option<String>, GeocodeError>,
    ) {
        if !self.locality.complete(&ticket)
            || !self.state.source.is_current_device()
            || self.state.coordinate != Some(ticket.key)
        {
            tracing::debug!("Discarding superseded locality for {}", ticket.key);
            return;
        }

        match result {
            Ok(Some(name)) => self.state.location_name = Some(name),
            Ok(None) => tracing::debug!("No locality for {}", ticket.key),
            Err(e) => tracing::debug!("Reverse geocode failed for {}: {}", ticket.key, e),
        }
    }

    /// Publish the state if anything changed
    fn publish(&mut self) {
        self.state.refresh_derived();
        let next = &self.state;
        self.publisher.send_if_modified(|current| {
            if **current == *next {
                false
            } else {
                *current = Arc::new(next.clone());
                true
            }
        });
    }
}
