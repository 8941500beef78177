//! Home Connect CLI binary.
//!
//! Talks to an appliance on the local network.
//!
//! # Commands
//!
//! - `run` - Complete the handshake, print inbound packets and send requests
//!   typed on stdin (`GET /ro/allMandatoryValues/v1`)
//! - `send` - Send one request and print the appliance's response

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use homeconnect::{connect, Config, Request, VERSION};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "homeconnect")]
#[command(version = VERSION)]
#[command(about = "Home Connect - local appliance protocol client", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/homeconnect/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Appliance host, overrides the config file
    #[arg(long, global = true)]
    host: Option<String>,

    /// Appliance port, overrides the config file
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Base64 pre-shared key, overrides the config file
    #[arg(short = 'k', long, global = true)]
    key: Option<String>,

    /// Append TLS secrets to this file
    #[arg(long, global = true)]
    key_log: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep a session open, printing packets and sending requests from stdin
    Run,

    /// Send a single request and wait for the response
    Send {
        /// Request text, e.g. "GET /ci/registeredDevices/v1"
        request: String,

        /// JSON payload: an array of data elements or a single element
        #[arg(short, long)]
        data: Option<String>,

        /// Seconds to wait for the response
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Run => runtime.block_on(cmd_run(config)),
        Commands::Send {
            request,
            data,
            timeout,
        } => runtime.block_on(cmd_send(
            config,
            &request,
            data.as_deref(),
            Duration::from_secs(timeout),
        )),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Config::from_file(path)?
            },
            None => Config::default(),
        },
    }
    .with_env();

    if let Some(host) = &cli.host {
        config.device.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.device.port = port;
    }
    if let Some(key) = &cli.key {
        config.device.key = key.clone();
    }
    if let Some(path) = &cli.key_log {
        config.client.key_log_file = Some(path.clone());
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn cmd_run(config: Config) -> anyhow::Result<()> {
    let connection = connect(&config).await?;
    // Subscribe before ready so the handshake replies are printed too
    let mut inbound = connection.subscribe();
    let dispatcher = connection.ready(config.client.ready_timeout()).await?;

    println!(
        "Session {} ready, {} services",
        dispatcher.session_id(),
        dispatcher.catalog().len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            packet = inbound.recv() => match packet {
                Ok(packet) => println!("{packet}"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Output fell behind, {} packets skipped", skipped);
                },
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {},
                Some(line) => match Request::from_str(&line) {
                    Ok(request) => {
                        let message_id = dispatcher.submit_request(request).await?;
                        tracing::debug!("Sent as message {}", message_id);
                    },
                    Err(e) => eprintln!("{e}"),
                },
                None => {
                    connection.shutdown().await?;
                    return Ok(());
                },
            },
        }
    }

    connection.join().await?;
    Ok(())
}

async fn cmd_send(
    config: Config,
    text: &str,
    data: Option<&str>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let mut request = Request::from_str(text)?;
    if let Some(data) = data {
        request = request.with_data(parse_data(data)?);
    }
    let resource = request.resource.clone();

    let connection = connect(&config).await?;
    let dispatcher = connection.ready(config.client.ready_timeout()).await?;
    let mut inbound = connection.subscribe();

    let message_id = dispatcher.submit_request(request).await?;
    tracing::info!("Sent {} as message {}", resource, message_id);

    let response = tokio::time::timeout(timeout, async {
        loop {
            match inbound.recv().await {
                Ok(packet) if packet.resource == resource => return Ok(packet),
                Ok(_) | Err(RecvError::Lagged(_)) => {},
                Err(RecvError::Closed) => {
                    anyhow::bail!("Connection closed before a response arrived")
                },
            }
        }
    })
    .await
    .with_context(|| format!("No response for {resource} within {timeout:?}"))??;

    println!("{}", serde_json::to_string_pretty(&response)?);
    connection.shutdown().await?;
    Ok(())
}

fn parse_data(data: &str) -> anyhow::Result<Vec<Value>> {
    let value: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
    Ok(match value {
        Value::Array(elements) => elements,
        element => vec![element],
    })
}
