use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kubequest::cli::{
    format_concepts, format_nodes, format_pods, format_recoveries, format_scenario_step,
    format_snapshot, format_stats, run_scenario, AddResource, AskArgs, Cli, Commands,
    DeleteResource, GetResource, ServeArgs, SimulatorClient,
};
use kubequest::cluster::{create_router, spawn_clock_driver, ApiState, ClusterHandle, DriverConfig};
use kubequest::concepts;
use kubequest::config::{load_config, load_config_from, SimulatorConfig};
use kubequest::tutor::Tutor;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("Failed to load config")?;

    let client = SimulatorClient::new(&cli.server);

    match cli.command {
        Commands::Serve(args) => serve(args, config).await,
        Commands::Simulate(args) => {
            for (i, step) in run_scenario(args.scenario, config.cluster).iter().enumerate() {
                println!("{}", format_scenario_step(i, step));
            }
            Ok(())
        }
        Commands::Status => {
            let snapshot = client.snapshot().await?;
            print!("{}", format_stats(&snapshot.stats));
            Ok(())
        }
        Commands::Get(args) => {
            let snapshot = client.snapshot().await?;
            match args.resource {
                GetResource::Nodes => print!("{}", format_nodes(&snapshot)),
                GetResource::Pods => print!("{}", format_pods(&snapshot)),
            }
            Ok(())
        }
        Commands::Add(args) => {
            let snapshot = match args.resource {
                AddResource::Node { name } => client.add_node(name).await?,
                AddResource::Pod { name } => client.add_pod(name).await?,
            };
            print!("{}", format_snapshot(&snapshot));
            Ok(())
        }
        Commands::Crash { node } => {
            let snapshot = client.crash_node(&node).await?;
            print!("{}", format_snapshot(&snapshot));
            Ok(())
        }
        Commands::Delete(args) => {
            let DeleteResource::Node { node } = args.resource;
            let snapshot = client.delete_node(&node).await?;
            print!("{}", format_snapshot(&snapshot));
            Ok(())
        }
        Commands::Recoveries => {
            print!("{}", format_recoveries(&client.recoveries().await?));
            Ok(())
        }
        Commands::Watch => {
            client
                .watch(|snapshot| println!("{}", format_snapshot(&snapshot)))
                .await?;
            Ok(())
        }
        Commands::Concepts => {
            print!("{}", format_concepts(concepts::catalog()));
            Ok(())
        }
        Commands::Ask(args) => ask(args, config).await,
    }
}

fn load_env_file(path: &Path) -> Result<()> {
    dotenvy::from_path(path)
        .with_context(|| format!("Failed to load env file {}", path.display()))?;
    Ok(())
}

async fn serve(args: ServeArgs, mut config: SimulatorConfig) -> Result<()> {
    if let Some(ref env_file) = args.env_file {
        load_env_file(env_file)?;
    }
    if let Some(bind_addr) = args.bind_addr {
        config.server.bind_addr = bind_addr;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let tutor = Tutor::from_config(&config.tutor).context("Failed to set up tutor")?;
    let cluster = ClusterHandle::new(config.cluster.clone());
    let shutdown = spawn_clock_driver(
        cluster.clone(),
        DriverConfig {
            tick_ms: config.cluster.tick_ms,
        },
    );

    let app = create_router(ApiState::new(cluster, tutor));
    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Simulator listening on {}", addr);
    info!(
        "Cluster: {} ship(s), {} slot(s) each, recovery after {}ms",
        config.cluster.initial_nodes, config.cluster.pod_capacity, config.cluster.recovery_delay_ms
    );

    let result = axum::serve(listener, app).await;
    let _ = shutdown.send(());
    result.context("Server error")
}

async fn ask(args: AskArgs, config: SimulatorConfig) -> Result<()> {
    if let Some(ref env_file) = args.env_file {
        load_env_file(env_file)?;
    }

    let context = match args.concept.as_deref() {
        Some(id) => match concepts::find(id) {
            Some(concept) => Some(concept.tutor_context()),
            None => bail!("Unknown concept '{}' (see `kubequest concepts`)", id),
        },
        None => None,
    };

    let tutor = Tutor::from_config(&config.tutor).context("Failed to set up tutor")?;
    match tutor.ask(&args.question, context.as_deref()).await {
        Ok(answer) => println!("{}", answer),
        Err(e) => {
            error!("Tutor error: {}", e);
            println!("{}", e.user_message());
        }
    }
    Ok(())
}
