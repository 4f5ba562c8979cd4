use clap::Parser;
use pairlab::cointegration::CointegrationReport;
use pairlab::config::PipelineConfig;
use pairlab::data;
use pairlab::pipeline::{run_pipeline, PipelineReport};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Pairs-trading stat-arb research pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set the verbosity level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    verbose: String,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the full pipeline over a pair CSV and write results.json
    Run {
        /// Pair data CSV with columns: timestamp,price_a,price_b
        #[arg(long)]
        data: PathBuf,
        /// Pipeline configuration JSON
        #[arg(long)]
        config: PathBuf,
        /// Output directory for results.json
        #[arg(long, default_value = "results")]
        output: PathBuf,
        /// Cointegration test statistic from the external test
        #[arg(long, requires = "p_value", conflicts_with = "assume_cointegrated")]
        adf_stat: Option<f64>,
        /// P-value from the external test; verdict passes when below 0.05
        #[arg(long, requires = "adf_stat")]
        p_value: Option<f64>,
        /// Skip the external verdict and treat the pair as cointegrated
        #[arg(long, default_value_t = false)]
        assume_cointegrated: bool,
    },
    /// Write a starter configuration file
    InitConfig {
        /// Where to write the config JSON
        #[arg(long, default_value = "pairlab.json")]
        output: PathBuf,
    },
}

/// Results file written next to the run, in string form so money survives
/// JSON round-trips unmangled.
#[derive(Debug, Serialize)]
struct ResultsOutput {
    points: usize,
    total_trades: u32,
    degenerate_steps: usize,
    initial_capital: String,
    final_capital: String,
    net_profit: String,
    total_return_pct: f64,
    sharpe_ratio: f64,
    sortino_ratio: f64,
    max_drawdown_pct: f64,
    final_hedge_ratio: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.verbose).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match cli.command {
        Commands::Run {
            data,
            config,
            output,
            adf_stat,
            p_value,
            assume_cointegrated,
        } => {
            let report = verdict(adf_stat, p_value, assume_cointegrated)?;
            run(&data, &config, &output, report)
        }
        Commands::InitConfig { output } => init_config(&output),
    }
}

fn verdict(
    adf_stat: Option<f64>,
    p_value: Option<f64>,
    assume_cointegrated: bool,
) -> Result<CointegrationReport, Box<dyn std::error::Error>> {
    if assume_cointegrated {
        return Ok(CointegrationReport {
            test_statistic: 0.0,
            p_value: 0.0,
            is_cointegrated: true,
        });
    }
    match (adf_stat, p_value) {
        (Some(statistic), Some(p)) => Ok(CointegrationReport {
            test_statistic: statistic,
            p_value: p,
            is_cointegrated: p < 0.05,
        }),
        _ => Err("provide --adf-stat and --p-value from an external cointegration test, \
                  or pass --assume-cointegrated"
            .into()),
    }
}

fn run(
    data_path: &Path,
    config_path: &Path,
    output_dir: &Path,
    report: CointegrationReport,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::load(config_path)?;
    let pair = data::load_pair_csv(data_path)?;

    let result = run_pipeline(&pair, &report, &config)?;
    print_summary(&result);

    let initial = config.backtest.initial_capital;
    let final_capital = result
        .run
        .equity
        .last()
        .map(|point| point.portfolio_value)
        .unwrap_or(initial);

    let output = ResultsOutput {
        points: pair.len(),
        total_trades: result.run.trades,
        degenerate_steps: result.degenerate_steps,
        initial_capital: initial.to_string(),
        final_capital: final_capital.to_string(),
        net_profit: (final_capital - initial).to_string(),
        total_return_pct: result.summary.total_return * 100.0,
        sharpe_ratio: result.summary.sharpe_ratio,
        sortino_ratio: result.summary.sortino_ratio,
        max_drawdown_pct: result.summary.max_drawdown * 100.0,
        final_hedge_ratio: result.final_hedge_ratio,
    };

    fs::create_dir_all(output_dir)?;
    let output_path = output_dir.join("results.json");
    let mut file = fs::File::create(&output_path)?;
    let json = serde_json::to_string_pretty(&output)?;
    file.write_all(json.as_bytes())?;
    info!(path = %output_path.display(), "Results written");

    Ok(())
}

fn print_summary(result: &PipelineReport) {
    info!("--- Backtest Results ---");
    if let (Some(first), Some(last)) = (result.run.equity.first(), result.run.equity.last()) {
        info!(
            "Initial Capital: ${}",
            first.portfolio_value.to_f64().unwrap_or(0.0)
        );
        info!(
            "Final Capital:   ${}",
            last.portfolio_value.to_f64().unwrap_or(0.0)
        );
    }
    info!("Total Trades:    {}", result.run.trades);
    info!("Total Return:    {:.2}%", result.summary.total_return * 100.0);
    info!("Sharpe Ratio:    {:.2}", result.summary.sharpe_ratio);
    info!("Sortino Ratio:   {:.2}", result.summary.sortino_ratio);
    info!("Max Drawdown:    {:.2}%", result.summary.max_drawdown * 100.0);
    info!("Hedge Ratio:     {:.4}", result.final_hedge_ratio);
    info!("------------------------");
}

fn init_config(output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    // Starter values for the tunables that have no universal defaults;
    // calibrate process/observation noise and sizing to the pair under study.
    let template = serde_json::json!({
        "kalman": {
            "process_noise": 1e-5,
            "observation_noise": 1e-3,
            "initial_hedge_ratio": 1.0,
            "initial_intercept": 0.0,
            "initial_covariance": [[1.0, 0.0], [0.0, 1.0]],
            "degeneracy_policy": "floor_epsilon",
            "variance_epsilon": 1e-12
        },
        "signals": {
            "entry_threshold": 2.0,
            "exit_threshold": 0.5
        },
        "backtest": {
            "initial_capital": "1000000",
            "transaction_cost_bps": "12.5",
            "borrow_rate_annual": "0.0025",
            "sizing": { "rule": "fixed_notional", "notional_per_leg": "10000" }
        },
        "gate_policy": "strict"
    });

    fs::write(output, serde_json::to_string_pretty(&template)?)?;
    info!(path = %output.display(), "Starter config written");
    Ok(())
}
