use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use xasset::core::log::init_logging;
use xasset::core::range::RangePreset;
use xasset::engine::normalize::NormalizationMode;
use xasset::{AppCommand, ViewOptions};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Series selection and display flags shared by the analysis commands.
#[derive(Args, Debug, Clone)]
struct ViewArgs {
    /// Series to include, by catalog name or symbol (repeatable)
    #[arg(short, long = "series")]
    series: Vec<String>,

    /// Start from a named story preset
    #[arg(long)]
    story: Option<String>,

    /// 1Y, 5Y, 10Y, 20Y, MAX or YYYY-MM-DD..YYYY-MM-DD
    #[arg(short, long)]
    range: Option<RangePreset>,

    /// raw, index100, percent_change or log
    #[arg(short, long)]
    mode: Option<NormalizationMode>,

    /// Rolling window in grid periods
    #[arg(short, long)]
    window: Option<usize>,

    /// Shift every series after the first by this many grid periods
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    shift: i64,

    /// Price everything in this series instead of dollars
    #[arg(short, long)]
    denominator: Option<String>,

    /// Print machine-readable JSON instead of tables
    #[arg(long)]
    json: bool,
}

impl From<ViewArgs> for ViewOptions {
    fn from(args: ViewArgs) -> Self {
        ViewOptions {
            series: args.series,
            story: args.story,
            range: args.range,
            mode: args.mode,
            window: args.window,
            shift: args.shift,
            denominator: args.denominator,
            json: args.json,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct PairArgs {
    /// The two series to analyze; defaults to the first two selected
    #[arg(long, num_args = 2, value_names = ["A", "B"])]
    pair: Option<Vec<String>>,
}

impl PairArgs {
    fn into_pair(self) -> Option<(String, String)> {
        let mut names = self.pair?.into_iter();
        Some((names.next()?, names.next()?))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Compare series side by side in one normalization mode
    Compare(ViewArgs),
    /// Correlation matrix, driver sensitivity and regressions
    Correlate(ViewArgs),
    /// Rolling correlation of a pair
    Rolling {
        #[command(flatten)]
        view: ViewArgs,
        #[command(flatten)]
        pair: PairArgs,
    },
    /// Lead/lag scan of a pair over monthly returns
    Lag {
        #[command(flatten)]
        view: ViewArgs,
        #[command(flatten)]
        pair: PairArgs,
        /// Smallest offset, in months
        #[arg(long, allow_negative_numbers = true)]
        min: Option<i64>,
        /// Largest offset, in months
        #[arg(long, allow_negative_numbers = true)]
        max: Option<i64>,
    },
    /// Moving average and Bollinger bands
    Overlay {
        #[command(flatten)]
        view: ViewArgs,
        /// Band width in standard deviations
        #[arg(long)]
        multiplier: Option<f64>,
    },
    /// Simulate a weighted basket
    Portfolio {
        #[command(flatten)]
        view: ViewArgs,
        /// Basket name from the configuration
        #[arg(short, long)]
        basket: Option<String>,
        /// Ad-hoc weight as NAME=WEIGHT (repeatable)
        #[arg(long = "weight")]
        weights: Vec<String>,
    },
    /// Real-return leaderboard, purchasing power and liquidity regimes
    Leaderboard {
        #[command(flatten)]
        view: ViewArgs,
        /// Series to measure real returns against
        #[arg(long)]
        reference: Option<String>,
        /// Amount for the purchasing-power calculator
        #[arg(long, default_value_t = 10_000.0)]
        amount: f64,
        /// Base date for the purchasing-power calculator (YYYY-MM-DD)
        #[arg(long)]
        base_date: Option<NaiveDate>,
    },
    /// Export the aligned, normalized dataset as CSV
    Export {
        #[command(flatten)]
        view: ViewArgs,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl From<Commands> for AppCommand {
    fn from(cmd: Commands) -> AppCommand {
        match cmd {
            Commands::Compare(view) => AppCommand::Compare(view.into()),
            Commands::Correlate(view) => AppCommand::Correlate(view.into()),
            Commands::Rolling { view, pair } => AppCommand::Rolling {
                view: view.into(),
                pair: pair.into_pair(),
            },
            Commands::Lag {
                view,
                pair,
                min,
                max,
            } => AppCommand::Lag {
                view: view.into(),
                pair: pair.into_pair(),
                min,
                max,
            },
            Commands::Overlay { view, multiplier } => AppCommand::Overlay {
                view: view.into(),
                multiplier,
            },
            Commands::Portfolio {
                view,
                basket,
                weights,
            } => AppCommand::Portfolio {
                view: view.into(),
                basket,
                weights,
            },
            Commands::Leaderboard {
                view,
                reference,
                amount,
                base_date,
            } => AppCommand::Leaderboard {
                view: view.into(),
                reference,
                amount,
                base_date,
            },
            Commands::Export { view, output } => AppCommand::Export {
                view: view.into(),
                output,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => xasset::cli::setup::setup_at_path(path),
            None => xasset::cli::setup::setup(),
        },
        Some(cmd) => xasset::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
