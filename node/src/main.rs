// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Hypha Node
//!
//! Entry point for the `hypha-node` binary. Parses CLI arguments,
//! initializes logging, runs a mesh coordinator over a simulated peer set
//! and serves the HTTP/WS inspection API.
//!
//! - `run`          start the node
//! - `check-config` validate a configuration file and print it
//! - `version`      print build version information

mod api;
mod cli;
mod logging;
mod settings;
mod simulation;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;

use hypha_protocol::coordinator::MeshCoordinator;

use cli::{Commands, HyphaNodeCli};
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = HyphaNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::CheckConfig(args) => check_config(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the coordinator, the simulated traffic and the API server, and
/// runs until Ctrl+C or SIGTERM.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_DIRECTIVES, args.log_format);

    let config = settings::load(args.config.as_deref())?;
    tracing::info!(
        node_id = %args.node_id,
        api_port = args.api_port,
        simulated_peers = args.simulated_peers,
        "starting hypha-node"
    );

    // --- Mesh ---
    let transport = simulation::transport(args.simulated_peers);
    let coordinator = Arc::new(
        MeshCoordinator::new(args.node_id.clone(), config, transport)
            .context("failed to build mesh coordinator")?,
    );
    coordinator.start();
    simulation::bootstrap(&coordinator, args.simulated_peers).await?;

    let (traffic_stop, traffic_rx) = watch::channel(false);
    let traffic = tokio::spawn(simulation::run_traffic(Arc::clone(&coordinator), traffic_rx));

    // --- API server ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        coordinator: Arc::clone(&coordinator),
    };
    let router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {api_addr}"))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(listener, router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "API server error");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    traffic_stop.send_replace(true);
    if let Err(e) = traffic.await {
        tracing::warn!(error = %e, "traffic task ended abnormally");
    }
    coordinator.stop().await;
    tracing::info!("hypha-node stopped");
    Ok(())
}

/// Loads and validates a configuration, then prints it as TOML.
fn check_config(args: cli::CheckConfigArgs) -> Result<()> {
    logging::init_logging("hypha_node=warn", LogFormat::Pretty);

    let config = settings::load(args.config.as_deref())?;
    print!("{}", settings::render(&config)?);
    Ok(())
}

fn print_version() {
    println!("hypha-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc      {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
