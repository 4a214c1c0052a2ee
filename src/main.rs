// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::stream;
use kube::Client;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stratum::config::{parse_parallelism, Config, StateBackend};
use stratum::executor::{watch_interrupts, Executor};
use stratum::graph::DependencyGraph;
use stratum::kubernetes::create_client;
use stratum::provision::{ClusterProvisioner, HelmProvisioner, KubeProvisioner};
use stratum::reconcile::preview;
use stratum::resource::ResourceId;
use stratum::scheduler;
use stratum::stack;
use stratum::state::{ConfigMapStateStore, FileStateStore, MemoryStateStore, StateStore};

#[derive(Parser)]
#[command(
    name = "stratum",
    about = "Converge a Kubernetes cluster to its declared stack",
    version
)]
struct Cli {
    /// Maximum number of resources applied at the same time
    #[arg(long, global = true, value_parser = parse_parallelism)]
    parallelism: Option<usize>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, Default)]
enum Command {
    /// Apply the stack and record the result (default)
    #[default]
    Up,
    /// Show the change planned for every resource without applying anything
    Preview,
    /// Print the schedule as waves of independent resources
    Order,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(parallelism) = cli.parallelism {
        config.parallelism = parallelism;
    }
    info!(
        "Configuration loaded: environment={}, parallelism={}",
        config.environment, config.parallelism
    );

    // Graph errors abort before anything touches the cluster
    let descriptors = stack::declare(&config).context("Failed to declare the stack")?;
    let graph = DependencyGraph::build(descriptors)?;
    let order = scheduler::order(&graph)?;

    match cli.command.unwrap_or_default() {
        Command::Order => {
            for (i, wave) in scheduler::waves(&graph)?.iter().enumerate() {
                let ids: Vec<&str> = wave.iter().map(|id| id.as_str()).collect();
                println!("Wave {}: {}", i + 1, ids.join(", "));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Preview => {
            let client = match config.state {
                StateBackend::ConfigMap => Some(create_client(&config).await?),
                _ => None,
            };
            let state = state_store(&config, client)?.load().await?;
            println!("{}", preview(&graph, &order, &state));
            Ok(ExitCode::SUCCESS)
        }
        Command::Up => up(&config, &graph, &order).await,
    }
}

async fn up(
    config: &Config,
    graph: &DependencyGraph,
    order: &[ResourceId],
) -> Result<ExitCode> {
    let client = create_client(config).await?;
    info!("Connected to Kubernetes cluster");

    let store = state_store(config, Some(client.clone()))?;
    let mut state = store.load().await.context("Failed to load state")?;

    let provisioner = ClusterProvisioner::new(
        KubeProvisioner::new(client, config.crd_wait),
        HelmProvisioner::new(config.helm_bin.clone()).with_kube_context(config.kube_context.clone()),
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupts = stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|_| ((), ()))
    });
    tokio::spawn(async move {
        if watch_interrupts(Box::pin(interrupts), cancel_tx).await {
            error!("Interrupted again, exiting without saving state");
            std::process::exit(130);
        }
    });

    let report = Executor::new(&provisioner)
        .with_parallelism(config.parallelism)
        .with_cancellation(cancel_rx)
        .apply(graph, order, &state)
        .await;
    println!("{}", report);

    state.record(&report);
    store.save(&state).await.context("Failed to save state")?;

    if report.has_failures() {
        error!("{} resources failed", report.failed());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn state_store(config: &Config, client: Option<Client>) -> Result<Box<dyn StateStore>> {
    let store: Box<dyn StateStore> = match &config.state {
        StateBackend::ConfigMap => {
            let client = client.context("ConfigMap state needs a cluster connection")?;
            Box::new(ConfigMapStateStore::new(client, config.state_namespace.clone()))
        }
        StateBackend::File(path) => Box::new(FileStateStore::new(path.clone())),
        StateBackend::Memory => Box::new(MemoryStateStore::new()),
    };
    Ok(store)
}
