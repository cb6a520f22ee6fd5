//! MelodyMaster - Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use melodymaster::config::{
    DEFAULT_DEPLOY_CONFIG, DEFAULT_TEST_CONFIG, DEFAULT_VALIDATION_CONFIG, DeployConfig,
    TestConfig, ValidationConfig,
};
use melodymaster::audio::read_wav;
use melodymaster::{ModelDeployer, ModelTester, ModelValidator, metrics};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "melodymaster")]
#[command(about = "Deploy, test and validate MelodyMaster models", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty", global = true)]
    log_format: String,

    /// Write a Prometheus metrics snapshot here on exit
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a local checkpoint and push it to the hub
    Deploy {
        #[arg(short, long, default_value = DEFAULT_DEPLOY_CONFIG)]
        config: PathBuf,
    },

    /// Run the generation test suite
    Test {
        #[arg(short, long, default_value = DEFAULT_TEST_CONFIG)]
        config: PathBuf,

        /// Override `model_path` from the config
        #[arg(long)]
        model: Option<String>,
    },

    /// Run one validation pass over a generated WAV file
    Validate {
        #[arg(short, long, default_value = DEFAULT_VALIDATION_CONFIG)]
        config: PathBuf,

        #[arg(long)]
        audio: PathBuf,

        #[arg(long, default_value = "")]
        prompt: String,

        #[arg(long, default_value_t = 0)]
        step: u64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .init();
        }
    }

    let prometheus_handle = match &cli.metrics_out {
        Some(_) => Some(metrics::setup_metrics()?),
        None => None,
    };

    let code = run(cli.command).await?;

    if let (Some(handle), Some(path)) = (&prometheus_handle, &cli.metrics_out) {
        metrics::write_snapshot(handle, path)?;
    }

    Ok(code)
}

async fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::Deploy { config } => {
            let config = DeployConfig::load(&config)?;
            config.validate()?;

            tracing::info!(
                local_path = %config.local_path.display(),
                repo_id = %config.repo_id,
                create_release = config.create_release,
                "Configuration loaded"
            );

            let deployer = ModelDeployer::from_config(config)?;
            let report = deployer.run().await.context("Deployment failed")?;

            tracing::info!(
                repo_id = %report.repo_id,
                commit = ?report.card_commit.oid,
                release = ?report.release,
                "Deployment complete"
            );
            Ok(ExitCode::SUCCESS)
        }

        Command::Test { config, model } => {
            let mut config = TestConfig::load(&config)?;
            if let Some(model) = model {
                config.model_path = model;
            }
            config.validate()?;

            let model_path = config.model_path.clone();
            let mut tester = ModelTester::from_config(config)?;
            let report = tester
                .run_test_suite(&model_path)
                .await
                .context("Test suite failed to run")?;

            println!("{}", serde_json::to_string_pretty(&report)?);

            if report.passed {
                Ok(ExitCode::SUCCESS)
            } else {
                tracing::warn!(
                    success_rate = report.quality.success_rate,
                    "Success rate below minimum"
                );
                Ok(ExitCode::FAILURE)
            }
        }

        Command::Validate {
            config,
            audio,
            prompt,
            step,
        } => {
            let config = ValidationConfig::load(&config)?;
            let generated = read_wav(&audio)
                .with_context(|| format!("Failed to read {}", audio.display()))?;

            let mut validator = ModelValidator::new(config);
            let scores = validator.validate_batch(&generated, &prompt, step);
            let stop = validator.check_early_stopping(&scores, step);

            println!("{}", serde_json::to_string_pretty(&scores)?);
            tracing::info!(step, early_stop = stop, "Validation complete");
            Ok(ExitCode::SUCCESS)
        }
    }
}
