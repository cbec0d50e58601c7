//! CLI entry point for the transit punctuality client.
//!
//! Provides subcommands for the system overview, realtime delays, per-route,
//! per-stop and hourly statistics, threshold configuration, and a sampling
//! loop that logs realtime punctuality to CSV.

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use transit_punctuality::{
    classify::PunctualityStatus,
    config::ClientConfig,
    fetch::BasicClient,
    gateway::{Filter, HttpGateway},
    models::ConfigUpdate,
    output::{append_record, format_delay, format_rate, print_json, print_pretty},
    stats::{RealtimeSample, StatusBreakdown},
    store::PunctualityStore,
};

type Store = PunctualityStore<HttpGateway<BasicClient>>;

#[derive(Parser)]
#[command(name = "punctuality")]
#[command(about = "Query transit punctuality and realtime delay data", long_about = None)]
struct Cli {
    /// Base URL of the punctuality API (overrides PUNCTUALITY_API_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the system overview, top routes and realtime summary
    Overview,
    /// Refresh realtime vehicles and delays and classify each delay
    Realtime,
    /// Route punctuality statistics
    Routes {
        /// Maximum number of routes
        #[arg(short, long, default_value_t = 20)]
        limit: u32,

        /// Only this route, one row per day
        #[arg(long)]
        route_id: Option<String>,

        /// Analysis window in days
        #[arg(long)]
        days: Option<u32>,
    },
    /// Stop punctuality statistics
    Stops {
        /// Maximum number of stops
        #[arg(short, long, default_value_t = 20)]
        limit: u32,

        /// Only this stop, one row per day
        #[arg(long)]
        stop_id: Option<String>,

        /// Analysis window in days
        #[arg(long)]
        days: Option<u32>,
    },
    /// Punctuality per hour of day
    Hourly {
        #[arg(long)]
        route_id: Option<String>,

        /// Day to report (YYYY-MM-DD), defaults to today on the server
        #[arg(long)]
        date: Option<String>,
    },
    /// Show or change the classification thresholds
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Classify a delay in seconds (negative = early)
    Classify {
        #[arg(value_name = "DELAY_SECONDS", allow_negative_numbers = true)]
        delay_seconds: f64,

        /// Use the built-in thresholds instead of fetching them
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
    /// Periodically refresh realtime data and append a CSV row per sample
    Watch {
        /// Seconds between samples
        #[arg(short, long, default_value_t = 60)]
        interval: u64,

        /// Number of samples to collect (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 1)]
        samples: usize,

        /// CSV file to append results to
        #[arg(short, long, default_value = "realtime.csv")]
        output: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the thresholds stored on the server
    Show,
    /// Update one or more thresholds (seconds)
    Set {
        #[arg(long)]
        on_time: Option<f64>,

        #[arg(long)]
        early: Option<f64>,

        #[arg(long)]
        very_late: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/punctuality.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("punctuality.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = ClientConfig::from_env().with_base_url(cli.base_url);
    info!(base_url = %config.base_url, timeout_secs = config.timeout.as_secs(), "Using punctuality API");
    let gateway = HttpGateway::new(BasicClient::with_config(&config)?, &config.base_url)?;
    let store = PunctualityStore::new(gateway);

    match cli.command {
        Commands::Overview => overview(&store).await?,
        Commands::Realtime => realtime(&store).await?,
        Commands::Routes {
            limit,
            route_id,
            days,
        } => {
            let filter = Filter::limit(limit)
                .with_opt("route_id", route_id)
                .with_opt("days", days);
            let routes = store.fetch_route_punctuality(&filter).await?;
            for route in &routes {
                info!(
                    route_id = route.route_id.as_deref().unwrap_or("-"),
                    name = route.route_short_name.as_deref().unwrap_or(""),
                    date = route.stat_date.as_deref().or(route.last_stat_date.as_deref()),
                    rate = %format_rate(route.rate()),
                    avg_delay = %format_delay(route.avg_delay_minutes.unwrap_or(0.0) * 60.0),
                    "Route"
                );
            }
            info!(count = routes.len(), "Route punctuality fetched");
        }
        Commands::Stops {
            limit,
            stop_id,
            days,
        } => {
            let filter = Filter::limit(limit)
                .with_opt("stop_id", stop_id)
                .with_opt("days", days);
            let stops = store.fetch_stop_punctuality(&filter).await?;
            for stop in &stops {
                info!(
                    stop_id = stop.stop_id.as_deref().unwrap_or("-"),
                    name = stop.stop_name.as_deref().unwrap_or(""),
                    rate = %format_rate(stop.rate()),
                    avg_delay = %format_delay(stop.avg_delay_minutes.unwrap_or(0.0) * 60.0),
                    "Stop"
                );
            }
            info!(count = stops.len(), "Stop punctuality fetched");
        }
        Commands::Hourly { route_id, date } => {
            let filter = Filter::new()
                .with_opt("route_id", route_id)
                .with_opt("date", date);
            let hours = store.fetch_hourly_punctuality(&filter).await?;
            for hour in &hours {
                info!(
                    hour = hour.hour_label.as_deref().unwrap_or("-"),
                    rate = %format_rate(hour.punctuality_rate),
                    trips = hour.total_trips.unwrap_or(0.0),
                    "Hour"
                );
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = store.fetch_punctuality_config().await?;
                print_json(&config)?;
            }
            ConfigAction::Set {
                on_time,
                early,
                very_late,
            } => {
                let update = ConfigUpdate {
                    on_time_threshold_seconds: on_time,
                    early_threshold_seconds: early,
                    very_late_threshold_seconds: very_late,
                };
                if update.is_empty() {
                    bail!("nothing to update: pass --on-time, --early or --very-late");
                }
                // Validate against what the server currently holds.
                store.fetch_punctuality_config().await?;
                let response = store.update_punctuality_config(update).await?;
                print_pretty(&response);
                print_json(&store.punctuality_config())?;
            }
        },
        Commands::Classify {
            delay_seconds,
            offline,
        } => {
            if !offline {
                if let Err(e) = store.fetch_punctuality_config().await {
                    warn!(error = %e, "Could not fetch thresholds, using defaults");
                }
            }
            let thresholds = store.with_state(|s| s.thresholds());
            let classification = store.punctuality_status(delay_seconds);
            info!(
                delay = %format_delay(delay_seconds),
                status = ?classification.status,
                label = classification.label,
                severity = ?classification.severity,
                on_time_s = thresholds.on_time_seconds,
                early_s = thresholds.early_seconds,
                very_late_s = thresholds.very_late_seconds,
                "Classification"
            );
        }
        Commands::Watch {
            interval,
            samples,
            output,
        } => watch(&store, interval, samples, &output).await?,
    }

    Ok(())
}

async fn overview(store: &Store) -> Result<()> {
    let data = store.fetch_all_punctuality_data().await?;
    let stats = store.system_stats();

    if !store.has_punctuality_data() {
        warn!(
            period = data.overview.analysis_period.as_deref().unwrap_or(""),
            "No punctuality statistics available for the analysis period"
        );
    }

    info!(
        total_routes = stats.total_routes,
        total_trips = stats.total_trips,
        rate = %format_rate(Some(stats.system_punctuality_rate)),
        avg_delay = %format_delay(stats.system_avg_delay_minutes * 60.0),
        latest = data.overview.latest_data_date.as_deref(),
        "System punctuality"
    );

    for route in &data.routes {
        info!(
            route_id = route.route_id.as_deref().unwrap_or("-"),
            name = route.route_short_name.as_deref().unwrap_or(""),
            rate = %format_rate(route.rate()),
            "Route"
        );
    }

    print_json(&data.summary)?;
    Ok(())
}

async fn realtime(store: &Store) -> Result<()> {
    if let Err(e) = store.fetch_punctuality_config().await {
        warn!(error = %e, "Could not fetch thresholds, using defaults");
    }

    let data = store.refresh_realtime_data().await?;
    let thresholds = store.with_state(|s| s.thresholds());

    for record in &data.delays {
        let Some(delay) = record.arrival_delay else {
            continue;
        };
        let c = store.punctuality_status(delay);
        info!(
            trip_id = record.trip_id.as_deref().unwrap_or("-"),
            route = record.route_short_name.as_deref().unwrap_or(""),
            stop = record.stop_name.as_deref().unwrap_or(""),
            delay = %format_delay(delay),
            status = c.label,
            "Delay"
        );
    }

    let breakdown = StatusBreakdown::from_delays(&data.delays, &thresholds);
    for status in PunctualityStatus::ALL {
        info!(status = status.label(), count = breakdown.count(status), "Status count");
    }
    info!(
        vehicles = data.vehicles.len(),
        delays = data.delays.len(),
        on_time_pct = %format_rate(Some(breakdown.on_time_pct())),
        "Realtime summary"
    );
    Ok(())
}

/// Refreshes realtime data every `interval` seconds and appends one CSV row
/// per sample; failed refreshes are recorded as error rows.
#[tracing::instrument(skip(store))]
async fn watch(store: &Store, interval: u64, samples: usize, output: &str) -> Result<()> {
    if let Err(e) = store.fetch_punctuality_config().await {
        warn!(error = %e, "Could not fetch thresholds, using defaults");
    }

    if samples == 0 {
        info!(interval, "Sampling infinitely. Press Ctrl+C to stop.");
    } else {
        info!(samples, interval, "Starting sample collection");
    }

    let mut sample_count = 0;

    loop {
        // Check if we've reached the sample limit (0 = infinite)
        if samples > 0 && sample_count >= samples {
            break;
        }

        sample_count += 1;

        let sample = match store.refresh_realtime_data().await {
            Ok(_) => {
                store.clear_error();
                store.with_state(RealtimeSample::from_state)
            }
            Err(e) => {
                warn!(error = %e, "Realtime refresh failed");
                RealtimeSample::from_error("fetch_error", &e.to_string())
            }
        };

        append_record(output, &sample)?;
        info!(
            sample = sample_count,
            on_time_pct = sample.on_time_pct,
            failed = sample.error_type.is_some(),
            "Sample recorded"
        );

        if samples == 0 || sample_count < samples {
            tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
        }
    }

    info!(output, "Finished sampling");
    Ok(())
}
