//! StandRig runner
//!
//! Command-line entry point for PSU bring-up tests.
//!
//! `standrig run` executes one phased test against the supplies described by
//! an environment file, under the conditions of a settings file. `standrig
//! probe` only connects to every supply and reports its identity.
//!
//! Station configuration is resolved as defaults → station file →
//! environment variables → CLI flags.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use standrig::config::{load_environment, load_settings, StationBuilder};
use standrig::orchestrator::abort_reason;
use standrig::report::{format_report, OutputFormat};
use standrig::{
    run_test, ConsoleOperator, HardwareConnector, PsuConnector, SignalKind, SignalLatch,
    SignalRouter,
};
use standrig_core::default_station_config_path;
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};
use tracing::{error, info, warn};

/// StandRig PSU test runner
#[derive(Parser, Debug)]
#[command(name = "standrig")]
#[command(version, about = "Phased PSU bring-up test runner", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Station config file (default: ~/.config/standrig/station.toml)
    #[arg(long, global = true)]
    station: Option<PathBuf>,

    /// Log every instrument command and response
    #[arg(long, global = true)]
    trace_wire: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a test: Init, Configure, Enable, Evaluate, Disable
    Run {
        /// Environment file describing the PSUs of the stand (JSON)
        #[arg(short, long)]
        environment: PathBuf,

        /// Settings file with setpoints and criteria (JSON)
        #[arg(short, long)]
        settings: PathBuf,

        /// Do not wait for confirmation between phases
        #[arg(short = 'y', long)]
        yes: bool,

        /// Read back every setpoint after writing it
        #[arg(long)]
        verify_setpoints: bool,

        /// Pause after every instrument write, in milliseconds
        #[arg(long)]
        settle_delay_ms: Option<u64>,

        /// Summary format
        #[arg(short, long, value_enum, default_value = "table")]
        format: FormatArg,
    },

    /// Connect to every configured PSU and print its identity
    Probe {
        /// Environment file describing the PSUs of the stand (JSON)
        #[arg(short, long)]
        environment: PathBuf,
    },
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum FormatArg {
    /// Pretty table output
    Table,
    /// JSON output
    Json,
}

impl From<&FormatArg> for OutputFormat {
    fn from(format: &FormatArg) -> Self {
        match format {
            FormatArg::Table => OutputFormat::Table,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Determine station config path: CLI flag > env var > default
    let station_path = cli.station.clone().unwrap_or_else(|| {
        std::env::var("STANDRIG_STATION_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_station_config_path())
    });
    info!("Station configuration: {}", station_path.display());

    let code = match cli.command {
        Commands::Run {
            environment,
            settings,
            yes,
            verify_setpoints,
            settle_delay_ms,
            format,
        } => {
            let station = StationBuilder::new()
                .with_settle_delay_ms(settle_delay_ms)
                .with_auto_confirm(yes)
                .with_verify_setpoints(verify_setpoints)
                .with_trace_wire(cli.trace_wire)
                .with_env_overrides()
                .build(&station_path)
                .await
                .context("Failed to load station configuration")?;

            let environment = load_environment(&environment)
                .await
                .context("Failed to load environment")?;
            let settings = load_settings(&settings)
                .await
                .context("Failed to load test settings")?;

            let router = SignalRouter::new();
            let latch = SignalLatch::new();
            router.set_handler(SignalKind::Interrupt, latch.handler());
            router.set_handler(SignalKind::Terminate, latch.handler());
            let _listener = router
                .listen()
                .context("Failed to install signal handlers")?;

            let connector =
                HardwareConnector::new(station.transport.clone(), station.verification.clone());
            let mut operator = ConsoleOperator::new(station.operator.auto_confirm)
                .with_interrupts(latch.clone());

            let outcome = run_test(&environment, &settings, &connector, &mut operator, &router).await;

            // Everything is off; further signals end the process at once
            router.set_handler(SignalKind::Interrupt, exit_on_signal);
            router.set_handler(SignalKind::Terminate, exit_on_signal);

            let code = match outcome {
                Ok(report) => {
                    println!("{}", format_report(&report, (&format).into())?);
                    if report.passed() {
                        0
                    } else {
                        1
                    }
                }
                Err(e) => {
                    error!("Test aborted ({}): {}", abort_reason(&e), e);
                    eprintln!("{} {}", "Test aborted:".red().bold(), e);
                    1
                }
            };

            match latch.received() {
                Some(kind) => {
                    warn!("Exiting on {} received during the run", kind);
                    kind.exit_code()
                }
                None => code,
            }
        }
        Commands::Probe { environment } => {
            let station = StationBuilder::new()
                .with_trace_wire(cli.trace_wire)
                .with_env_overrides()
                .build(&station_path)
                .await
                .context("Failed to load station configuration")?;
            let environment = load_environment(&environment)
                .await
                .context("Failed to load environment")?;

            probe(&environment.psus, &station.transport).await
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Base reaction to a termination signal outside a test run
fn exit_on_signal(kind: SignalKind) {
    warn!("Received {}, exiting", kind);
    std::process::exit(kind.exit_code());
}

/// Connect to each PSU, print its identity and disconnect
async fn probe(
    psus: &[standrig_core::PsuConfig],
    transport: &standrig_core::TransportSettings,
) -> i32 {
    #[derive(Tabled)]
    struct ProbeRow {
        #[tabled(rename = "PSU")]
        index: usize,
        #[tabled(rename = "Transport")]
        transport: String,
        #[tabled(rename = "Endpoint")]
        endpoint: String,
        #[tabled(rename = "Channel")]
        channel: u32,
        #[tabled(rename = "Identity")]
        identity: String,
    }

    let connector = HardwareConnector::new(transport.clone(), Default::default());
    let mut rows = Vec::with_capacity(psus.len());
    let mut failures = 0;

    for (index, config) in psus.iter().enumerate() {
        let identity = match connector.connect(index, config).await {
            Ok(mut controller) => {
                let identity = format!("{} (version {})", controller.idn(), controller.version());
                controller.close();
                identity.green().to_string()
            }
            Err(e) => {
                failures += 1;
                warn!("PSU {} did not answer: {}", index, e);
                e.to_string().red().to_string()
            }
        };

        rows.push(ProbeRow {
            index,
            transport: config.transport.to_string(),
            endpoint: config.endpoint(),
            channel: config.channel,
            identity,
        });
    }

    if rows.is_empty() {
        println!("{}", "No PSUs configured".dimmed());
    } else {
        println!("{}", Table::new(rows).with(Style::rounded()));
    }

    if failures == 0 {
        0
    } else {
        1
    }
}

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
