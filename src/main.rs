//! facelog CLI
//!
//! Track activity-cube rotations into a SQLite timeline.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use facelog::{
    catalog::import_seeds,
    config::Config,
    device::{FaceId, Transport},
    quit::{install_quit_listeners, TerminalWriter},
    report::{self, ReportFormat},
    DeviceSelector, EffectiveActivitySet, IntervalLedger, LedgerEffect, Session, Store,
    SystemClock, VERSION,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facelog")]
#[command(version = VERSION)]
#[command(about = "Time tracking with a rotating activity cube", long_about = None)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the cube and record activity changes (q to quit)
    Track,

    /// Manage face labels
    Activity {
        #[command(subcommand)]
        command: ActivityCommand,
    },

    /// Show the currently open activity, if any
    Status,

    /// Print or write a report of recorded intervals
    Report {
        /// Report format (csv or json)
        #[arg(long, default_value = "csv")]
        format: String,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Only include intervals starting at or after this RFC 3339 time
        #[arg(long)]
        since: Option<String>,

        /// IANA timezone for timestamps
        #[arg(long, default_value = "UTC")]
        timezone: String,
    },

    /// Close intervals left open by an interrupted session
    CloseOpen,

    /// Show configuration
    Config {
        /// Write the current settings to the config file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum ActivityCommand {
    /// Assign a label to a face
    Set {
        /// Face number (0-7 on the standard cube)
        #[arg(long)]
        face: i8,

        /// Activity label
        #[arg(long)]
        label: String,
    },

    /// List the labels in effect
    List {
        /// Include superseded definitions
        #[arg(long)]
        all: bool,
    },

    /// Import the labels listed in the config file
    Sync,
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let config_file = config_path(&cli);

    let result = load_config(&cli).and_then(|config| match cli.command {
        Commands::Track => cmd_track(&config),
        Commands::Activity { command } => cmd_activity(&config, command),
        Commands::Status => cmd_status(&config),
        Commands::Report {
            format,
            output,
            since,
            timezone,
        } => cmd_report(&config, &format, output, since.as_deref(), &timezone),
        Commands::CloseOpen => cmd_close_open(&config),
        Commands::Config { init } => cmd_config(cli.config.as_deref(), &config_file, &config, init),
    });

    if let Err(e) = result {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("facelog=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(TerminalWriter::stderr)
        .init();
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(Config::config_path)
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = config_path(cli);
    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let mut config =
        loaded.with_context(|| format!("Failed to load config from {}", path.display()))?;
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    Ok(config)
}

fn open_store(config: &Config) -> Result<Store> {
    config
        .ensure_directories()
        .context("Could not create data directory")?;
    Store::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))
}

fn cmd_track(config: &Config) -> Result<()> {
    println!("facelog v{VERSION}");
    println!();

    let store = open_store(config)?;
    let activities = EffectiveActivitySet::load(&store)?;
    if activities.is_empty() {
        tracing::warn!("No activities defined; run `facelog activity set` to label faces");
    }
    let ledger = IntervalLedger::new(store, SystemClock).with_policy(config.ledger_policy());

    println!("Starting, q to quit");
    println!("  Device: {}", config.device_filter());
    println!("  Scan timeout: {}s", config.scan_timeout.as_secs());
    println!("  Activities: {}", activities.len());
    println!();

    let mut transport = Transport::new().context("Failed to initialise device transport")?;
    let selector = DeviceSelector::new(config.device_filter(), config.scan_timeout);

    let mut quit = install_quit_listeners().context("Failed to install quit handlers")?;
    let connected =
        Session::connect_until(&mut transport, &selector, quit.receiver(), ledger, activities);
    let mut session = match connected {
        Ok(session) => session,
        Err(e) if !e.is_fatal() => {
            quit.release_terminal();
            println!("{e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let run_result = session.run(quit.receiver());
    quit.release_terminal();

    println!("Finishing current task...");
    let shutdown_result = session.shutdown();
    if let Ok(report) = &shutdown_result {
        if let Some(LedgerEffect::Applied(applied)) = &report.final_effect {
            println!("{}", applied.describe());
        }
    }

    println!("Processed {} readings", session.readings());

    run_result?;
    shutdown_result?;
    println!("Exiting...");
    Ok(())
}

fn cmd_activity(config: &Config, command: ActivityCommand) -> Result<()> {
    let store = open_store(config)?;

    match command {
        ActivityCommand::Set { face, label } => {
            let face = FaceId(face);
            if face.is_sentinel() {
                bail!("Face must be a non-negative number");
            }
            let label = label.trim();
            if label.is_empty() {
                bail!("Label must not be empty");
            }
            let definition = store.insert_activity(face, label, Utc::now().timestamp())?;
            println!("Face {} is now '{}'", definition.face, definition.label);
        }
        ActivityCommand::List { all } => {
            let definitions = if all {
                store.activities()?
            } else {
                EffectiveActivitySet::load(&store)?.iter().cloned().collect()
            };

            if definitions.is_empty() {
                println!("No activities defined.");
                println!("Run 'facelog activity set --face N --label NAME' to add one.");
                return Ok(());
            }

            println!("{:<6} {:<6} {:<20} Label", "Id", "Face", "Added");
            for definition in definitions {
                println!(
                    "{:<6} {:<6} {:<20} {}",
                    definition.id,
                    definition.face.to_string(),
                    definition.date_added.format("%Y-%m-%d %H:%M:%S").to_string(),
                    definition.label
                );
            }
        }
        ActivityCommand::Sync => {
            let added = import_seeds(&store, &config.activities, Utc::now().timestamp())?;
            if added.is_empty() {
                println!("Activities already up to date.");
            }
            for definition in added {
                println!("Face {} is now '{}'", definition.face, definition.label);
            }
        }
    }

    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let labels: HashMap<i64, String> = store
        .activities()?
        .into_iter()
        .map(|a| (a.id, a.label))
        .collect();

    let open = store.open_intervals()?;
    match open.as_slice() {
        [] => println!("No current activity."),
        intervals => {
            for interval in intervals {
                let label = labels
                    .get(&interval.activity_id)
                    .map(String::as_str)
                    .unwrap_or("unknown activity");
                let minutes = (Utc::now() - interval.start).num_minutes();
                println!(
                    "Current activity: {label} (since {}, {minutes} min)",
                    interval.start.format("%Y-%m-%d %H:%M:%S")
                );
            }
            if intervals.len() > 1 {
                println!();
                println!("Several intervals are open. Run 'facelog close-open' to close them.");
            }
        }
    }

    Ok(())
}

fn cmd_report(
    config: &Config,
    format: &str,
    output: Option<PathBuf>,
    since: Option<&str>,
    timezone: &str,
) -> Result<()> {
    let format: ReportFormat = format.parse().map_err(|e: String| anyhow!(e))?;
    let tz: Tz = timezone
        .parse()
        .map_err(|e| anyhow!("Invalid timezone '{timezone}': {e}"))?;
    let since = since
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp())
                .with_context(|| format!("Invalid --since time '{s}'"))
        })
        .transpose()?;

    let store = open_store(config)?;
    let rows = report::build_rows(&store.interval_records(since)?, tz);
    let rendered = report::render(&rows, format)?;

    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported {} intervals to {:?}", rows.len(), path);
        }
        None => print!("{rendered}"),
    }

    Ok(())
}

fn cmd_close_open(config: &Config) -> Result<()> {
    let mut store = open_store(config)?;
    let closed = store.close_open_intervals(Utc::now().timestamp())?;
    println!("Closed {closed} open interval(s).");
    Ok(())
}

fn cmd_config(
    custom_path: Option<&Path>,
    config_file: &Path,
    config: &Config,
    init: bool,
) -> Result<()> {
    if init {
        match custom_path {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        println!("Wrote {config_file:?}");
        return Ok(());
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {config_file:?}");
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
