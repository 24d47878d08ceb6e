use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use frostline_core::{AppError, Config, ConfigError, LookupError};
use frostline_services::error_mapping::{cache_error, into_app_result, validation_error, weather_error};
use frostline_services::{get_or_init_runtime, sort_by_distance, GeocodeService, Resolution, StationService};
use frostline_weather::{
    DistanceUnit, FrostDateGrid, FrostKind, GeoNamesClient, NcdcClient, PostalCode, ZipCache, ZipCacheEntry,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Look up frost-date normals for the climate stations around a US ZIP code
#[derive(Debug, Parser)]
#[command(name = "frostline", version)]
struct Cli {
    /// Five-digit US postal code
    postal_code: String,

    /// Search radius around the postal code (defaults to the configured radius)
    #[arg(long)]
    radius: Option<f64>,

    /// Distance unit: miles or km
    #[arg(long)]
    unit: Option<DistanceUnit>,

    /// Which frost dates to show: first (fall) or last (spring)
    #[arg(long, default_value_t = FrostKind::First)]
    kind: FrostKind,

    /// Station id to query instead of the nearest one
    #[arg(long)]
    station: Option<String>,

    /// Number of nearby stations to list
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = frostline_core::init() {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", e.user_message());
            eprintln!("  ({})", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let (config, _) = Config::load_validated().map_err(|e| ConfigError::Invalid(e.to_string()))?;

    let unit = cli.unit.unwrap_or(config.search.unit);
    let radius = cli.radius.unwrap_or(config.search.radius);
    if !radius.is_finite() || radius <= 0.0 {
        return Err(AppError::InvalidInput(format!("radius must be positive, got {}", radius)));
    }
    let timeout = config.requests.timeout();

    let runtime = get_or_init_runtime()?;
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling request");
                interrupted.store(true, Ordering::SeqCst);
            }
        });
    }
    let should_cancel = || interrupted.load(Ordering::SeqCst);

    let mut cache = ZipCache::new(config.cache_path());
    cache.load().map_err(cache_error)?;

    let postal_code = PostalCode::parse(&cli.postal_code).map_err(validation_error)?;
    let entry = match cache.get(&postal_code) {
        Some(entry) => entry.clone(),
        None => {
            // Only a cache miss needs GeoNames credentials
            let username = config.require_geonames_username()?;
            let geocoder = GeocodeService::new(
                runtime.clone(),
                GeoNamesClient::with_base_url(&username, &config.geonames.base_url).map_err(weather_error)?,
            )
            .with_timeout(timeout);

            match geocoder.resolve(&cache, postal_code.as_str()).map_err(validation_error)? {
                Resolution::Cached(entry) => entry,
                Resolution::Pending(handle) => {
                    let entry =
                        into_app_result(geocoder.controller().wait(handle, POLL_INTERVAL, should_cancel))?;
                    remember(&mut cache, entry.clone());
                    entry
                }
            }
        }
    };
    println!("{} {}: {}", entry.postal_code, entry.city_label, entry.location);

    let token = config.require_ncdc_token()?;
    let stations = StationService::new(
        runtime,
        NcdcClient::with_base_url(&token, &config.ncdc.base_url).map_err(weather_error)?,
    )
    .with_timeout(timeout);

    let station_id = match cli.station {
        Some(id) => id,
        None => {
            let handle = stations.find_nearby(entry.location, radius, unit);
            let mut found = into_app_result(stations.stations().wait(handle, POLL_INTERVAL, should_cancel))?;
            sort_by_distance(&mut found, &entry.location, unit);

            println!();
            println!("Stations within {} {}:", radius, unit.as_str());
            for station in found.iter().take(cli.limit) {
                println!(
                    "  {:<20} {:>7.1} {}  {}",
                    station.station_id,
                    entry.location.distance_from(&station.location, unit),
                    unit.as_str(),
                    station.name
                );
            }

            found
                .into_iter()
                .next()
                .map(|s| s.station_id)
                .ok_or(AppError::Lookup(LookupError::NoResults))?
        }
    };

    let handle = stations.fetch_frost_dates(&station_id, cli.kind);
    let report = into_app_result(stations.frost_dates().wait(handle, POLL_INTERVAL, should_cancel))?;

    println!();
    if report.dates.is_empty() {
        println!("{} reports no {} frost dates", report.station_id, report.kind);
    } else {
        println!("{} frost dates for {}:", capitalize(&report.kind.to_string()), report.station_id);
        print!("{}", FrostDateGrid::from_dates(&report.dates));
    }

    Ok(())
}

/// Add a freshly resolved entry to the cache and persist it.
fn remember(cache: &mut ZipCache, entry: ZipCacheEntry) {
    cache.insert(entry);
    if let Err(e) = cache.save() {
        tracing::warn!("Failed to save ZIP cache to {}: {}", cache.path().display(), e);
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
