//! `skyward`: look up the weather for your location, a favorite city, or a
//! searched place from the command line.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use skyward_core::Config;
use skyward_services::{AppState, Controller, ControllerError, ErrorKind};
use skyward_weather::{CityCatalog, LocationSource, UnitSystem};

/// Location-aware weather client.
#[derive(Parser, Debug)]
#[command(name = "skyward", version, about)]
struct Cli {
    /// Show the weather for a built-in city (see --list-cities)
    #[arg(long, conflicts_with_all = ["search", "current"])]
    city: Option<String>,

    /// Search for a place by name
    #[arg(long, conflicts_with = "current")]
    search: Option<String>,

    /// Use the device location (the default when nothing else is given)
    #[arg(long)]
    current: bool,

    /// Unit system: metric or imperial (defaults to the configured one)
    #[arg(long)]
    unit: Option<UnitSystem>,

    /// Add or remove a favorite city; may be repeated
    #[arg(long = "toggle-favorite", value_name = "NAME")]
    toggle_favorite: Vec<String>,

    /// Print the built-in cities and exit
    #[arg(long)]
    list_cities: bool,

    /// How long to wait for a forecast
    #[arg(long, default_value_t = 15)]
    wait_secs: u64,

    /// Config file (defaults to <config dir>/skyward/config.toml)
    #[arg(long, env = "SKYWARD_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Nothing more will happen without another command
fn settled(state: &AppState) -> bool {
    if state.fetching {
        return false;
    }
    if state.error.is_some() {
        return true;
    }
    if state.source.is_current_device() && state.authorization.is_unusable() {
        return true;
    }
    match (state.coordinate, &state.forecast) {
        (Some(coordinate), Some(forecast)) => forecast.matches(coordinate, state.unit),
        _ => false,
    }
}

fn print_summary(state: &AppState) {
    let name = state.location_name.as_deref().unwrap_or("Unknown location");
    match state.coordinate {
        Some(coordinate) => println!("{name} ({coordinate})"),
        None => println!("{name}"),
    }

    if let Some(forecast) = &state.forecast {
        let unit = forecast.unit;
        let current = &forecast.snapshot.current;
        let condition = current
            .primary_condition()
            .map(|c| c.description.clone())
            .unwrap_or_default();

        println!(
            "  Now:      {:.0}{} (feels like {:.0}{}) {}",
            current.temperature,
            unit.temperature_suffix(),
            current.feels_like,
            unit.temperature_suffix(),
            condition
        );

        let gust = current
            .wind
            .gust
            .map(|g| format!(", gusts {:.1}", g))
            .unwrap_or_default();
        println!(
            "  Wind:     {:.1} {} {}{}",
            current.wind.speed,
            unit.speed_suffix(),
            current.wind.compass_point(),
            gust
        );
        println!(
            "  UV index: {:.1} ({})",
            current.uv_index,
            current.uv_category().label()
        );
        println!("  Humidity: {}%", current.humidity);

        let offset = chrono::Duration::seconds(i64::from(forecast.snapshot.timezone_offset));
        for day in forecast.snapshot.daily.iter().take(7) {
            let label = (day.date + offset).format("%a %d %b");
            let condition = day
                .primary_condition()
                .map(|c| c.main.as_str())
                .unwrap_or("");
            println!(
                "  {label}  {:>4.0}{} / {:>4.0}{}  {:>3.0}%  {}",
                day.temperature.min,
                unit.temperature_suffix(),
                day.temperature.max,
                unit.temperature_suffix(),
                day.pop * 100.0,
                condition
            );
        }
    } else if state.source.is_current_device() && state.authorization.is_unusable() {
        // Not an error flag; shown only as a hint
        let hint = ControllerError::new(
            ErrorKind::PermissionUnavailable,
            format!("{:?}", state.authorization),
        );
        println!("  {} (see --city or --search)", hint.user_message());
    } else {
        println!("  No forecast yet.");
    }

    if !state.favorites.is_empty() {
        println!(
            "  Favorites: {}",
            state.favorites.iter().collect::<Vec<_>>().join(", ")
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_cities {
        for city in CityCatalog::builtin().cities() {
            println!("{:<10} {}", city.name, city.coordinate);
        }
        return Ok(());
    }

    let (config, validation) = Config::load_validated(cli.config.as_deref())?;
    let level = match cli.verbose {
        0 => config.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    skyward_core::init(level)?;
    // Logged again now that a subscriber is installed
    for warning in &validation.warnings {
        tracing::warn!("Config warning: {}", warning);
    }

    let handle = Controller::from_config(&config)?;

    if let Some(unit) = cli.unit {
        handle.set_unit(unit)?;
    }
    for name in &cli.toggle_favorite {
        handle.toggle_favorite(name.as_str())?;
    }
    if let Some(city) = &cli.city {
        handle.select_favorite(city.as_str())?;
    } else if let Some(text) = &cli.search {
        handle.search_place(text.as_str())?;
    } else if cli.current {
        handle.use_current_location()?;
    }

    let mut rx = handle.subscribe();
    let waited = tokio::time::timeout(
        Duration::from_secs(cli.wait_secs),
        rx.wait_for(|state| settled(state)),
    )
    .await;
    if waited.is_err() {
        tracing::warn!("Timed out after {}s waiting for a forecast", cli.wait_secs);
    }

    let state = handle.state();
    if let Some(city) = &cli.city {
        if state.source != LocationSource::SelectedFavorite(city.clone()) {
            println!("'{city}' is not a built-in city (see --list-cities)");
        }
    }
    print_summary(&state);
    handle.shutdown().await;

    if let Some(error) = &state.error {
        tracing::debug!("Last error: {}", error);
        anyhow::bail!("{}", error.user_message());
    }
    Ok(())
}
