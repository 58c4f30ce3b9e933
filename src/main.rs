//! Stock Price Prediction Dashboard
//!
//! Command-line entry point: inspect symbols, run the pipeline once, or
//! serve the dashboard API.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stock_predictor::{
    config::Config,
    dashboard::{start_dashboard, DashboardState},
    data::DataStore,
    ml::ModelParams,
    pipeline::{Pipeline, PipelineRequest, Preprocessing},
    report,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stock-predictor")]
#[command(about = "Train and evaluate stock price regression models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List available symbols
    Symbols,
    /// Show the first rows of a symbol
    Preview {
        symbol: String,
        /// Number of rows to show
        #[arg(short, long)]
        rows: Option<usize>,
    },
    /// Train and evaluate a model on one symbol
    Run(RunArgs),
    /// Serve the dashboard API
    Serve {
        /// Port override
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    symbol: String,

    /// Feature columns, comma separated
    #[arg(long, value_delimiter = ',')]
    features: Vec<String>,

    /// Target column
    #[arg(long)]
    target: Option<String>,

    /// Share of rows held out for testing
    #[arg(long)]
    test_fraction: Option<f64>,

    /// None, MinMaxScaler or StandardScaler
    #[arg(long, default_value = "None")]
    preprocessing: Preprocessing,

    /// Model name, e.g. "Linear Regression" or "Random Forest"
    #[arg(long, default_value = "Linear Regression")]
    model: String,

    /// Fit linear regression through the origin
    #[arg(long)]
    no_intercept: bool,

    #[arg(long)]
    n_estimators: Option<usize>,

    #[arg(long)]
    max_depth: Option<usize>,

    #[arg(long)]
    min_samples_split: Option<usize>,

    #[arg(long)]
    min_samples_leaf: Option<usize>,

    /// Random forest seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write the chart series as JSON
    #[arg(long)]
    chart_out: Option<PathBuf>,
}

impl RunArgs {
    fn into_request(self) -> (PipelineRequest, Option<PathBuf>) {
        let request = PipelineRequest {
            symbol: self.symbol,
            features: self.features,
            target: self.target,
            test_fraction: self.test_fraction,
            preprocessing: self.preprocessing,
            model: self.model,
            params: ModelParams {
                fit_intercept: self.no_intercept.then_some(false),
                n_estimators: self.n_estimators,
                max_depth: self.max_depth,
                min_samples_split: self.min_samples_split,
                min_samples_leaf: self.min_samples_leaf,
                seed: self.seed,
            },
        };
        (request, self.chart_out)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;
    let data_dir = config.data.resolved_dir();
    let store = DataStore::open(&data_dir)
        .with_context(|| format!("failed to load stock data from {}", data_dir.display()))?;

    match cli.command {
        Commands::Symbols => show_symbols(&store),
        Commands::Preview { symbol, rows } => show_preview(&store, &config, &symbol, rows),
        Commands::Run(args) => run_once(&store, &config, args),
        Commands::Serve { port } => serve(store, config, port).await,
    }
}

fn show_symbols(store: &DataStore) -> anyhow::Result<()> {
    let symbols = store.symbols();
    if symbols.is_empty() {
        println!("No symbols found in {}", store.dir().display());
        return Ok(());
    }
    for symbol in symbols {
        println!("{}", symbol);
    }
    Ok(())
}

fn show_preview(store: &DataStore, config: &Config, symbol: &str, rows: Option<usize>) -> anyhow::Result<()> {
    let table = store.load(symbol)?;
    let preview = table.head(rows.unwrap_or(config.pipeline.preview_rows));

    println!("{} ({} rows)", table.symbol(), table.n_rows());
    print!("{}", report::preview_table(&preview));
    println!();
    println!(
        "Feature candidates: {}",
        table.feature_candidates(&config.data.target).join(", ")
    );
    Ok(())
}

fn run_once(store: &DataStore, config: &Config, args: RunArgs) -> anyhow::Result<()> {
    let (request, chart_out) = args.into_request();
    let resolved = request.resolve(config)?;
    let result = Pipeline::new(store).run(&resolved)?;

    print!("{}", report::render(&result));

    if let Some(path) = chart_out {
        let json = serde_json::to_string_pretty(&result.chart)?;
        std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!("Chart series written to {}", path.display());
    }
    Ok(())
}

async fn serve(store: DataStore, config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let host = config.dashboard.host.clone();
    let port = port.unwrap_or(config.dashboard.port);

    tracing::info!("Serving {} symbols", store.len());
    let state = Arc::new(DashboardState::new(store, config));
    start_dashboard(state, &host, port).await?;
    Ok(())
}
