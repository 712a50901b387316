use std::{path::{Path, PathBuf}, sync::Arc};

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use mileage_tracker_core::{
    advisory::take_battery_notice,
    config::{project_root, TrackerConfig},
    geocoding::{DisabledGeocoder, Geocoder, GoogleGeocoder},
    location::SimulatedProvider,
    storage::{FileStore, KeyValueStore, SessionStore},
    TripSession, CONFIG_PATH,
};
use mileage_tracker_lib::trip_record::{TripRecord, TripType};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod gpx_util;

const DEFAULT_ACCURACY_METERS: f64 = 10.;

#[derive(Parser)]
#[command(name = "MileageCLI")]
#[command(about = "Record, resume and inspect mileage trips", long_about = None)]
struct Cli {
    /// Config file, relative to the project root
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a trip from the track points of a gpx file
    Replay {
        gpx_file: PathBuf,
        #[arg(long, default_value_t = TripType::Work)]
        trip_type: TripType,
        /// Accuracy in meters for points without hdop
        #[arg(long, default_value_t = DEFAULT_ACCURACY_METERS)]
        accuracy: f64,
        /// Leave the trip running, as if the app was killed
        #[arg(long)]
        keep_open: bool,
        /// Write the recorded path to this gpx file
        #[arg(long)]
        export: Option<PathBuf>,
        /// Replace a trip left open by an earlier run
        #[arg(long)]
        force: bool,
    },
    /// Show the trip left in the store, if any
    Status,
    /// Resume the stored trip, optionally feed more points, and finish it
    Resume {
        gpx_file: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_ACCURACY_METERS)]
        accuracy: f64,
    },
    /// Throw away the stored trip
    Discard,
    /// List learned places
    Places,
    /// Learn a named place
    Learn {
        name: String,
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },
    /// Reverse geocode a coordinate
    Lookup {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },
    /// Show the background location notice if it has not been shown yet
    Notice,
}

struct Tracker {
    store: Arc<FileStore>,
    provider: Arc<SimulatedProvider>,
    session: TripSession,
}

impl Tracker {
    async fn open(config_path: &Path) -> anyhow::Result<Self> {
        let config_path = project_root().join(config_path);
        let config = TrackerConfig::load(&config_path).await?.with_env();

        let store = Arc::new(FileStore::open(&config.store_dir).await?);
        let geocoder: Arc<dyn Geocoder> = match GoogleGeocoder::from_config(&config)? {
            Some(geocoder) => Arc::new(geocoder),
            None => {
                tracing::warn!("No geocoding key configured, addresses will be left empty");
                Arc::new(DisabledGeocoder)
            }
        };
        let provider = Arc::new(SimulatedProvider::granted());
        let session = TripSession::open(&config, provider.clone(), store.clone(), geocoder).await;

        Ok(Self { store, provider, session })
    }

    /// Pushes every fix through the live subscription and waits until the
    /// session has processed them.
    async fn feed(&self, gpx_file: &Path, accuracy: f64) -> anyhow::Result<()> {
        let fixes = gpx_util::read_fixes(gpx_file, accuracy)?;
        let mut progress = self.session.subscribe_progress();
        let already = progress.borrow().events_received;

        for fix in &fixes {
            self.provider.push_fix(*fix).await;
        }

        let expected = already + fixes.len() as u64;
        progress
            .wait_for(|p| p.events_received >= expected)
            .await
            .context("Session closed while replaying")?;

        self.session.settle().await;
        tracing::info!("Fed {} fixes from {:?}", fixes.len(), gpx_file);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("{}=info,mileage_tracker_core=info", env!("CARGO_CRATE_NAME")).into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let tracker = Tracker::open(&cli.config).await?;

    match cli.command {
        Commands::Replay { gpx_file, trip_type, accuracy, keep_open, export, force } => {
            if let Some(pending) = tracker.session.pending_trip().await {
                if !force {
                    bail!(
                        "A {} trip of {:.3} mi is still open, run `resume` or `discard` first, or pass --force",
                        pending.trip_type,
                        pending.distance_miles
                    );
                }
                tracing::warn!("Replacing open trip at {:.3} mi", pending.distance_miles);
            }
            tracker.session.change_type(trip_type).await;
            tracker.session.start().await?;
            tracker.feed(&gpx_file, accuracy).await?;

            if keep_open {
                let progress = tracker.session.progress();
                println!("Trip left open at {:.3} mi, {} points", progress.distance_miles, progress.path.len());
                if let Some(export) = export {
                    gpx_util::write_path(&export, "Open trip", &progress.path)?;
                }
                return Ok(());
            }

            let record = tracker.session.stop().await;
            print_record(&record);
            if let Some(export) = export {
                gpx_util::write_path(&export, &format!("{} trip", record.trip_type), &record.path)?;
                println!("Path written to {:?}", export);
            }
        }
        Commands::Status => {
            match SessionStore::start(tracker.store.clone()).load().await {
                Some(snapshot) => {
                    println!("Trip type: {}", snapshot.trip_type);
                    println!("Distance:  {:.3} mi", snapshot.distance_miles);
                    println!("Points:    {}", snapshot.path.len());
                    println!("Saved at:  {}", snapshot.saved_at.with_timezone(&Local).format("%d/%m/%Y %H:%M:%S"));
                }
                None => println!("No trip in progress"),
            }
        }
        Commands::Resume { gpx_file, accuracy } => {
            if !tracker.session.recover().await? {
                println!("No trip to resume");
                return Ok(());
            }
            if let Some(gpx_file) = gpx_file {
                tracker.feed(&gpx_file, accuracy).await?;
            }
            print_record(&tracker.session.stop().await);
        }
        Commands::Discard => {
            tracker.session.reset().await;
            println!("Trip discarded");
        }
        Commands::Places => {
            for place in tracker.session.places().await {
                println!("{:.6}\t{:.6}\t{}", place.latitude, place.longitude, place.name);
            }
        }
        Commands::Learn { name, latitude, longitude } => {
            if tracker.session.learn_place(latitude, longitude, &name).await? {
                println!("Learned {name}");
            } else {
                println!("{name} is already known here");
            }
        }
        Commands::Lookup { latitude, longitude } => {
            match tracker.session.resolve(latitude, longitude).await {
                Ok(address) => println!("{}", address.formatted),
                Err(err) => println!("No address: {err}"),
            }
        }
        Commands::Notice => {
            let store: &dyn KeyValueStore = tracker.store.as_ref();
            if take_battery_notice(store).await? {
                println!("Trips are recorded in the background. Keep the app running and exempt it from battery optimization.");
            }
        }
    }

    Ok(())
}

fn print_record(record: &TripRecord) {
    println!("Distance:  {:.3} mi", record.distance_miles);
    println!("Points:    {}", record.path.len());
    println!("Trip type: {}", record.trip_type);
    println!("From:      {}", record.start_text().unwrap_or("-"));
    println!("To:        {}", record.end_text().unwrap_or("-"));
    println!("Source:    {}", if record.gps_used { "GPS" } else { "manual" });
}
