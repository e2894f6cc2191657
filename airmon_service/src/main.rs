//! # airmon
//!
//! Command-line front end for the facility air-quality forecaster.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use airmon_service::alert::thresholds::check_current_levels;
use airmon_service::config::ServiceConfig;
use airmon_service::dev_mode::{self, DATABASE_URL_ENV, DevMode};
use airmon_service::facilities::{
    FACILITY_REGISTRY, Facility, POLLUTANTS, all_facility_names, find_facility, is_known_pollutant,
    pollutant_display_name,
};
use airmon_service::ingest::HistoryProvider;
use airmon_service::ingest::cache::CachedHistory;
use airmon_service::ingest::openweather::OpenWeatherClient;
use airmon_service::logging::{self, DataSource, LogLevel};
use airmon_service::pipeline::{format_forecast_table, format_hazard_message, run_forecast};

type CliResult<T> = std::result::Result<T, String>;

#[derive(Parser)]
#[command(name = "airmon")]
#[command(about = "Pollutant forecasts and hazard checks for monitored facilities", long_about = None)]
struct Cli {
    /// Configuration file (defaults are used when it does not exist)
    #[arg(short, long, default_value = "airmon.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List monitored facilities
    Facilities,

    /// Forecast one pollutant and check it against its hazard threshold
    Forecast {
        /// Facility name, e.g. "Refinery A"
        #[arg(short, long)]
        facility: String,

        /// Pollutant code (co, no, no2, o3, so2, pm2_5, pm10)
        #[arg(short, long)]
        pollutant: String,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        /// Replay stored observations from this many days ago instead of the live API
        #[arg(long)]
        dev_mode_days: Option<i64>,
    },

    /// Show current weather and pollutant levels, checked against hazard thresholds
    Current {
        /// Facility name (all facilities when omitted)
        #[arg(short, long)]
        facility: Option<String>,
    },

    /// Fetch history and store it for dev-mode replay
    Backfill {
        /// Facility name (all facilities when omitted)
        #[arg(short, long)]
        facility: Option<String>,

        /// Hours of history to fetch (defaults to forecast.model_history_hours)
        #[arg(long)]
        hours: Option<u32>,
    },
}

fn resolve_facility(name: &str) -> CliResult<&'static Facility> {
    find_facility(name).ok_or_else(|| {
        format!(
            "Unknown facility '{}'. Known: {}",
            name,
            all_facility_names().join(", ")
        )
    })
}

fn resolve_facilities(name: Option<&str>) -> CliResult<Vec<&'static Facility>> {
    match name {
        Some(name) => Ok(vec![resolve_facility(name)?]),
        None => Ok(FACILITY_REGISTRY.iter().collect()),
    }
}

fn cmd_facilities() -> CliResult<()> {
    println!("{:<22} {:>10} {:>10}", "Facility", "Latitude", "Longitude");
    for facility in FACILITY_REGISTRY {
        println!(
            "{:<22} {:>10.4} {:>10.4}",
            facility.name, facility.latitude, facility.longitude
        );
    }
    Ok(())
}

fn cmd_forecast(
    config: &ServiceConfig,
    facility: &str,
    pollutant: &str,
    json: bool,
    dev_mode_days: Option<i64>,
) -> CliResult<()> {
    let facility = resolve_facility(facility)?;
    let pollutant = pollutant.trim().to_lowercase();
    if !is_known_pollutant(&pollutant) {
        return Err(format!(
            "Unknown pollutant '{}'. Known: {}",
            pollutant,
            POLLUTANTS.join(", ")
        ));
    }

    let provider: Box<dyn HistoryProvider> = match dev_mode_days {
        Some(days) => {
            let url = std::env::var(DATABASE_URL_ENV)
                .map_err(|_| format!("{} must be set for dev mode", DATABASE_URL_ENV))?;
            logging::info(
                DataSource::Database,
                Some(facility.name),
                &format!("dev mode: replaying data from {} days ago", days),
            );
            Box::new(DevMode::connect(&url, days).map_err(|e| e.to_string())?)
        }
        None => Box::new(OpenWeatherClient::from_env().map_err(|e| e.to_string())?),
    };
    let provider = CachedHistory::new(provider, config.cache.ttl_secs);

    let report = run_forecast(
        &provider,
        &config.forecast,
        &config.hazard_thresholds,
        facility,
        &pollutant,
    )
    .map_err(|e| e.to_string())?;

    if json {
        let body = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{}", body);
    } else {
        print!("{}", format_forecast_table(&report));
        println!();
        println!("{}", format_hazard_message(&report.hazard));
    }
    Ok(())
}

fn cmd_current(config: &ServiceConfig, facility: Option<&str>) -> CliResult<()> {
    let facilities = resolve_facilities(facility)?;
    let client = OpenWeatherClient::from_env().map_err(|e| e.to_string())?;

    let mut successful = 0;
    for facility in &facilities {
        let levels = match client.fetch_current(facility) {
            Ok(levels) => levels,
            Err(e) => {
                logging::log_history_failure(DataSource::OpenWeather, facility.name, "current levels", &e);
                continue;
            }
        };
        successful += 1;

        let hits = check_current_levels(&levels.components, &config.hazard_thresholds);
        println!(
            "{} ({} UTC, {})",
            facility.name,
            levels.timestamp.format("%Y-%m-%d %H:%M"),
            levels.aqi_label()
        );
        match client.fetch_weather(facility) {
            Ok(weather) => println!("   {}", weather.summary()),
            Err(e) => logging::log_history_failure(DataSource::OpenWeather, facility.name, "weather", &e),
        }
        if hits.is_empty() {
            println!("   All pollutants within thresholds.");
        }
        for hit in hits {
            println!(
                "   {} at {:.2} µg/m³ exceeds {} µg/m³",
                pollutant_display_name(&hit.pollutant),
                hit.value,
                hit.threshold
            );
        }
    }

    logging::log_batch_summary(DataSource::OpenWeather, "Current check", facilities.len(), successful);
    if successful == 0 {
        return Err("No current levels could be fetched".to_string());
    }
    Ok(())
}

fn cmd_backfill(config: &ServiceConfig, facility: Option<&str>, hours: Option<u32>) -> CliResult<()> {
    let facilities = resolve_facilities(facility)?;
    let hours = hours.unwrap_or(config.forecast.model_history_hours);
    let api = OpenWeatherClient::from_env().map_err(|e| e.to_string())?;
    let url = std::env::var(DATABASE_URL_ENV)
        .map_err(|_| format!("{} must be set to backfill", DATABASE_URL_ENV))?;
    let mut db = postgres::Client::connect(&url, postgres::NoTls)
        .map_err(|e| format!("Database connection failed: {}", e))?;

    let mut successful = 0;
    for facility in &facilities {
        let stored = api
            .get_history(facility, &[], hours)
            .and_then(|obs| dev_mode::store_observations(&mut db, facility, &obs));
        match stored {
            Ok(_) => successful += 1,
            Err(e) => logging::log_history_failure(DataSource::Database, facility.name, "backfill", &e),
        }
    }

    logging::log_batch_summary(DataSource::Database, "Backfill", facilities.len(), successful);
    if successful < facilities.len() {
        return Err(format!(
            "Backfill failed for {} of {} facilities",
            facilities.len() - successful,
            facilities.len()
        ));
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match ServiceConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Keep stdout clean for JSON consumers.
    let json_output = matches!(cli.command, Commands::Forecast { json: true, .. });
    let level = if json_output {
        config.logging.level.max(LogLevel::Warning)
    } else {
        config.logging.level
    };
    logging::init_logger(level, config.logging.file.as_deref(), config.logging.timestamps);

    let result = match &cli.command {
        Commands::Facilities => cmd_facilities(),
        Commands::Forecast {
            facility,
            pollutant,
            json,
            dev_mode_days,
        } => cmd_forecast(&config, facility, pollutant, *json, *dev_mode_days),
        Commands::Current { facility } => cmd_current(&config, facility.as_deref()),
        Commands::Backfill { facility, hours } => {
            cmd_backfill(&config, facility.as_deref(), *hours)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            ExitCode::FAILURE
        }
    }
}
