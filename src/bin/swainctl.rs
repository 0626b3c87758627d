//! swainctl: maintenance runs for the SwainOS backend.
//!
//! Every command loads `--env-file` (values already in the environment win),
//! wires the same services as the server and prints its result as JSON.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use common::Settings;
use swainos::ai_insights::repository::AI_OUTPUT_TABLES;
use swainos::fx::types::{IntelligenceRunType, RunType};
use swainos::{telemetry, AppState};

#[derive(Parser)]
#[command(name = "swainctl", about = "SwainOS maintenance commands")]
struct Cli {
    /// Environment file loaded before reading settings.
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull latest FX rates from the configured provider and refresh exposure.
    PullFxRates {
        #[arg(long, value_enum, default_value_t = RunTypeArg::Scheduled)]
        run_type: RunTypeArg,
    },
    /// Backfill historical FX rates for every target pair.
    BackfillFxRates {
        /// Points to request per pair (max 5000).
        #[arg(long, default_value_t = 120)]
        days: u32,
        #[arg(long, value_enum, default_value_t = IntervalArg::Day)]
        interval: IntervalArg,
    },
    /// Generate FX buy/wait signals.
    RunFxSignals {
        #[arg(long, value_enum, default_value_t = RunTypeArg::Scheduled)]
        run_type: RunTypeArg,
    },
    /// Collect macro and news intelligence for the target currencies.
    RunFxIntelligence {
        #[arg(long, value_enum, default_value_t = IntelligenceRunTypeArg::Daily)]
        run_type: IntelligenceRunTypeArg,
    },
    /// Generate AI briefings, coaching insights and recommendations.
    GenerateInsights {
        #[arg(long, default_value = "manual_cli")]
        trigger: String,
        /// Refresh consultant and AI context views first.
        #[arg(long)]
        refresh_rollups: bool,
    },
    /// Refresh itinerary, consultant and AI context materialized views.
    RefreshRollups,
    /// Report AI output table counts; delete them with --apply.
    PurgeAiInsights {
        #[arg(long)]
        apply: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RunTypeArg {
    Scheduled,
    Manual,
    #[value(name = "on_demand")]
    OnDemand,
}

impl From<RunTypeArg> for RunType {
    fn from(arg: RunTypeArg) -> Self {
        match arg {
            RunTypeArg::Scheduled => RunType::Scheduled,
            RunTypeArg::Manual => RunType::Manual,
            RunTypeArg::OnDemand => RunType::OnDemand,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IntelligenceRunTypeArg {
    Daily,
    #[value(name = "on_demand")]
    OnDemand,
}

impl From<IntelligenceRunTypeArg> for IntelligenceRunType {
    fn from(arg: IntelligenceRunTypeArg) -> Self {
        match arg {
            IntelligenceRunTypeArg::Daily => IntelligenceRunType::Daily,
            IntelligenceRunTypeArg::OnDemand => IntelligenceRunType::OnDemand,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IntervalArg {
    #[value(name = "1day")]
    Day,
    #[value(name = "1week")]
    Week,
    #[value(name = "1month")]
    Month,
}

impl IntervalArg {
    fn as_str(self) -> &'static str {
        match self {
            IntervalArg::Day => "1day",
            IntervalArg::Week => "1week",
            IntervalArg::Month => "1month",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PurgeReport {
    applied: bool,
    counts: Map<String, Value>,
    deleted: Map<String, Value>,
}

fn load_env_file(path: &Path) {
    match dotenvy::from_path(path) {
        Ok(()) => debug!(path = %path.display(), "loaded env file"),
        Err(e) => debug!(path = %path.display(), "no env file loaded: {}", e),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    load_env_file(&cli.env_file);
    telemetry::init_tracing();

    let settings = Settings::from_env().context("loading settings")?;
    let state = AppState::from_settings(settings).context("building services")?;

    match cli.command {
        Command::PullFxRates { run_type } => {
            let result = state.fx.pull_rates(run_type.into()).await?;
            print_json(&result)
        }
        Command::BackfillFxRates { days, interval } => {
            let result = state.fx.backfill_rates(days, interval.as_str()).await?;
            print_json(&result)
        }
        Command::RunFxSignals { run_type } => {
            let result = state.fx.run_signals(run_type.into()).await?;
            print_json(&result)
        }
        Command::RunFxIntelligence { run_type } => {
            let result = state
                .fx_intelligence
                .run_intelligence(run_type.into())
                .await?;
            print_json(&result)
        }
        Command::GenerateInsights {
            trigger,
            refresh_rollups,
        } => {
            if refresh_rollups {
                let refresh = state
                    .ai_orchestration
                    .repository()
                    .refresh_rollups()
                    .await
                    .context("refreshing rollups before generation")?;
                let result = Value::Object(refresh);
                info!(%result, "rollups refreshed");
            }
            let result = state.ai_orchestration.generate_insights(&trigger).await?;
            print_json(&result)
        }
        Command::RefreshRollups => {
            let result = state.ai_orchestration.repository().refresh_rollups().await?;
            print_json(&result)
        }
        Command::PurgeAiInsights { apply } => {
            let repository = state.ai_orchestration.repository();
            let mut report = PurgeReport {
                applied: apply,
                counts: Map::new(),
                deleted: Map::new(),
            };
            for table in AI_OUTPUT_TABLES {
                let count = repository.count_rows(table).await?;
                report.counts.insert(table.to_string(), json!(count));
            }
            if apply {
                for table in AI_OUTPUT_TABLES {
                    let removed = repository.purge_table(table).await?;
                    info!(table, removed, "purged AI table");
                    report.deleted.insert(table.to_string(), json!(removed));
                }
            }
            print_json(&report)
        }
    }
}
