pub mod cli;
pub mod core;
pub mod engine;
pub mod export;
pub mod present;
pub mod providers;
pub mod session;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::range::RangePreset;
use crate::engine::normalize::NormalizationMode;
use anyhow::Result;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{debug, info};

/// Selection and display controls shared by every analysis command.
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    /// Catalog names or provider symbols.
    pub series: Vec<String>,
    pub story: Option<String>,
    pub range: Option<RangePreset>,
    pub mode: Option<NormalizationMode>,
    pub window: Option<usize>,
    pub shift: i64,
    pub denominator: Option<String>,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub enum AppCommand {
    Compare(ViewOptions),
    Correlate(ViewOptions),
    Rolling {
        view: ViewOptions,
        pair: Option<(String, String)>,
    },
    Lag {
        view: ViewOptions,
        pair: Option<(String, String)>,
        min: Option<i64>,
        max: Option<i64>,
    },
    Overlay {
        view: ViewOptions,
        multiplier: Option<f64>,
    },
    Portfolio {
        view: ViewOptions,
        basket: Option<String>,
        weights: Vec<String>,
    },
    Leaderboard {
        view: ViewOptions,
        reference: Option<String>,
        amount: f64,
        base_date: Option<NaiveDate>,
    },
    Export {
        view: ViewOptions,
        output: Option<PathBuf>,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("xasset starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let session = session::Session::from_config(&config);

    match command {
        AppCommand::Compare(view) => cli::compare::run(&config, &session, &view).await,
        AppCommand::Correlate(view) => cli::correlation::run_matrix(&config, &session, &view).await,
        AppCommand::Rolling { view, pair } => {
            cli::correlation::run_rolling(&config, &session, &view, pair).await
        }
        AppCommand::Lag {
            view,
            pair,
            min,
            max,
        } => cli::correlation::run_lag(&config, &session, &view, pair, min, max).await,
        AppCommand::Overlay { view, multiplier } => {
            cli::compare::run_overlay(&config, &session, &view, multiplier).await
        }
        AppCommand::Portfolio {
            view,
            basket,
            weights,
        } => cli::portfolio::run(&config, &session, &view, basket.as_deref(), &weights).await,
        AppCommand::Leaderboard {
            view,
            reference,
            amount,
            base_date,
        } => {
            cli::insights::run(&config, &session, &view, reference.as_deref(), amount, base_date)
                .await
        }
        AppCommand::Export { view, output } => {
            cli::export::run(&config, &session, &view, output.as_deref()).await
        }
    }
}
