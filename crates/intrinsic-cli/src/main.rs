mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use intrinsic_core::config::EngineConfig;

use commands::blend::BlendArgs;
use commands::dcf::{DcfArgs, ScenarioArgs, SensitivityArgs};
use commands::monte_carlo::SimulateArgs;
use commands::peers::{PeersArgs, RelativeArgs};
use commands::valuation::{InputsArgs, ValueArgs};

/// Intrinsic equity valuation from noisy financial data
#[derive(Parser)]
#[command(
    name = "intrinsic",
    version,
    about = "Intrinsic equity valuation from noisy financial data",
    long_about = "Estimates the intrinsic value of a listed company: BULL/BASE/BEAR DCF, \
                  peer-multiple relative value and a Monte Carlo distribution, blended \
                  into one value with a confidence score and a full audit trail."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Engine configuration file (JSON or YAML); built-in defaults otherwise
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log fallbacks and cache activity to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full valuation pipeline for one company
    Value(ValueArgs),
    /// Resolve provenance-tagged DCF inputs from raw financials
    Inputs(InputsArgs),
    /// Run a single FCFF DCF
    Dcf(DcfArgs),
    /// Value BULL, BASE and BEAR scenarios
    Scenarios(ScenarioArgs),
    /// WACC x terminal growth sensitivity grid
    Sensitivity(SensitivityArgs),
    /// Monte Carlo distribution of DCF values
    Simulate(SimulateArgs),
    /// Build the two-tier peer group for a company
    Peers(PeersArgs),
    /// Peer-multiple relative valuation
    Relative(RelativeArgs),
    /// Blend per-method values and score confidence
    Blend(BlendArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn load_config(path: Option<&str>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => input::file::read_typed::<EngineConfig>(p)?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run(command: Commands, config: EngineConfig) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    match command {
        Commands::Value(args) => commands::valuation::run_value(args, config),
        Commands::Inputs(args) => commands::valuation::run_inputs(args, config),
        Commands::Dcf(args) => commands::dcf::run_dcf(args, config),
        Commands::Scenarios(args) => commands::dcf::run_scenarios(args, config),
        Commands::Sensitivity(args) => commands::dcf::run_sensitivity(args, config),
        Commands::Simulate(args) => commands::monte_carlo::run_simulate(args, config),
        Commands::Peers(args) => commands::peers::run_peers(args, config),
        Commands::Relative(args) => commands::peers::run_relative(args, config),
        Commands::Blend(args) => commands::blend::run_blend(args, config),
        Commands::Version => Ok(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") })),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Version = cli.command {
        println!("intrinsic {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = load_config(cli.config.as_deref()).and_then(|config| run(cli.command, config));

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
