/// ycloud-ops - Yandex Cloud long-running operation tool
///
/// Inspect, wait for and cancel operations returned by Yandex Cloud API calls.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ycloud_ops::cloud::{Operation, OperationClient};
use ycloud_ops::config::{ClientConfig, TOKEN_ENV_VAR};
use ycloud_ops::operation::{OperationWaiter, WaitOptions};

#[derive(Parser)]
#[command(name = "ycloud-ops")]
#[command(about = "Inspect and wait for Yandex Cloud long-running operations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "ycloud.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current state of an operation
    Get {
        /// Operation ID
        operation_id: String,
    },

    /// Wait until an operation is done
    Wait {
        /// Operation ID
        operation_id: String,

        /// Give up after this many seconds (0 waits forever)
        #[arg(long)]
        timeout: Option<u64>,

        /// Do not print progress dots
        #[arg(short, long)]
        quiet: bool,
    },

    /// Cancel an operation
    Cancel {
        /// Operation ID
        operation_id: String,

        /// Wait for the operation to settle after cancelling
        #[arg(long)]
        wait: bool,

        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Generate example configuration file
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ycloud_ops={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Get { ref operation_id } => get_operation(&cli, operation_id).await,
        Commands::Wait {
            ref operation_id,
            timeout,
            quiet,
        } => wait_operation(&cli, operation_id, timeout, quiet).await,
        Commands::Cancel {
            ref operation_id,
            wait,
            timeout,
        } => cancel_operation(&cli, operation_id, wait, timeout).await,
        Commands::Init => init_config(&cli).await,
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load the config file, falling back to defaults when it does not exist
fn load_config(cli: &Cli) -> Result<ClientConfig> {
    if cli.config.exists() {
        ClientConfig::from_file(&cli.config).context("Failed to load configuration")
    } else {
        debug!(
            "No configuration at {}, using defaults",
            cli.config.display()
        );
        Ok(ClientConfig::default())
    }
}

/// Show the current state of an operation
async fn get_operation(cli: &Cli, operation_id: &str) -> Result<()> {
    let config = load_config(cli)?;
    let client = OperationClient::from_config(&config)?;

    let operation = client.get_operation(operation_id).await?;
    println!("{}", serde_json::to_string_pretty(&operation)?);

    Ok(())
}

/// Wait until an operation is done and report how it ended
async fn wait_operation(
    cli: &Cli,
    operation_id: &str,
    timeout: Option<u64>,
    quiet: bool,
) -> Result<()> {
    let config = load_config(cli)?;
    let client = OperationClient::from_config(&config)?;
    let timeout = timeout.map(Duration::from_secs).or(config.timeout());

    info!("Waiting for operation {}...", operation_id);
    let operation = wait_until_finished(&client, operation_id, timeout, &config, quiet).await?;

    report_operation(operation)
}

/// Cancel an operation, optionally waiting for it to settle
async fn cancel_operation(
    cli: &Cli,
    operation_id: &str,
    wait: bool,
    timeout: Option<u64>,
) -> Result<()> {
    let config = load_config(cli)?;
    let client = OperationClient::from_config(&config)?;

    let operation = client
        .cancel_operation(operation_id)
        .await
        .with_context(|| format!("Failed to cancel operation {}", operation_id))?;
    info!("Cancellation requested for operation {}", operation.id);

    if !wait || operation.done {
        println!("{}", serde_json::to_string_pretty(&operation)?);
        return Ok(());
    }

    let timeout = timeout.map(Duration::from_secs).or(config.timeout());
    let operation = wait_until_finished(&client, operation_id, timeout, &config, false).await?;
    println!("{}", serde_json::to_string_pretty(&operation)?);

    Ok(())
}

/// Drive a waiter with progress dots on stderr; Ctrl-C stops waiting
async fn wait_until_finished(
    client: &OperationClient,
    operation_id: &str,
    timeout: Option<Duration>,
    config: &ClientConfig,
    quiet: bool,
) -> Result<Operation> {
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let options = WaitOptions::new(config.poll_interval()).with_cancellation(cancel);
    let mut waiter = OperationWaiter::new(client, operation_id, timeout);

    let mut stderr = std::io::stderr();
    let progress: Option<&mut (dyn Write + Send)> = if quiet { None } else { Some(&mut stderr) };

    let result = waiter.wait(&options, progress).await;
    ctrl_c.abort();

    if !quiet {
        eprintln!();
    }

    result
}

/// Turn the final snapshot into a success message or an error
fn report_operation(operation: Operation) -> Result<()> {
    if !operation.done {
        anyhow::bail!("Timed out waiting for operation {}", operation.id);
    }

    let operation_id = operation.id.clone();
    let description = operation.description.clone();
    let response = operation.into_result()?;

    info!("✓ Operation {} completed: {}", operation_id, description);
    if let Some(response) = response {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(())
}

/// Initialize example configuration file
async fn init_config(cli: &Cli) -> Result<()> {
    if cli.config.exists() {
        anyhow::bail!(
            "Configuration file already exists: {}",
            cli.config.display()
        );
    }

    let example_config = ClientConfig::example();
    let yaml = serde_yaml::to_string(&example_config)?;

    tokio::fs::write(&cli.config, yaml)
        .await
        .context("Failed to write configuration file")?;

    info!("Example configuration created: {}", cli.config.display());
    info!("");
    info!("Next steps:");
    info!("  1. Set your IAM token:");
    info!("     export {}=$(yc iam create-token)", TOKEN_ENV_VAR);
    info!("  2. Wait for an operation:");
    info!("     ycloud-ops wait <operation-id>");

    Ok(())
}
