use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use stepflow::pipeline::PipelineConfig;
use stepflow::process::SystemLauncher;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stepflow")]
#[command(about = "Run a sequential build/test/deploy pipeline against a project", long_about = None)]
#[command(version)]
struct Cli {
    /// Project directory the steps run in
    #[arg(short, long)]
    project: PathBuf,

    /// JSON pipeline configuration (defaults to the Go pipeline)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overall deadline in seconds, overriding the configuration
    #[arg(short, long)]
    timeout: Option<f64>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("STEPFLOW_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            PipelineConfig::from_json(&json)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(timeout) = cli.timeout {
        config = config.with_timeout(timeout);
    }
    Ok(config)
}

async fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let mut out = io::stdout().lock();
    stepflow::run_with_config(&config, &cli.project, Arc::new(SystemLauncher), &mut out).await?;
    out.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Pipeline failed");
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
