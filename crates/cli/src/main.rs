use crate::{
    commands::{Commands, CursorCommand},
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use connectors::{builtin::http_transport, sql::postgres::destination::PostgresDestination};
use engine_config::{env::EnvContext, settings::Settings};
use engine_core::{
    destination::{Destination, memory::MemoryDestination},
    error::ConfigError,
    progress::ProgressService,
    state::{CursorStore, sled_store::SledCursorStore},
};
use engine_runtime::{
    options::RunOptions, orchestrator::Orchestrator, registry::SourceRegistry, runner::PipelineRunner,
};
use model::cursor::key::CursorKey;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(name = "marketsync", version, about = "Incremental marketing data loader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, default_value = ".env", help = "Env file read before the process environment")]
    env_file: String,

    #[arg(long, global = true, help = "Print results and logs as JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let shutdown = ShutdownCoordinator::new(tokio_util::sync::CancellationToken::new());
    shutdown.register_handlers();

    match execute(cli, &shutdown).await {
        Ok(()) => ExitCode::Success.into(),
        Err(err) => {
            let code = if shutdown.is_shutdown_requested() {
                ExitCode::Interrupted
            } else {
                err.exit_code()
            };
            error!(error = %err, exit_code = code.as_i32(), "marketsync failed");
            code.into()
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn execute(cli: Cli, shutdown: &ShutdownCoordinator) -> Result<(), CliError> {
    let env = EnvContext::from_process_and_file(&cli.env_file)?;
    let settings = Settings::from_env(&env)?;
    let registry = Arc::new(SourceRegistry::builtin(&settings, http_transport()?)?);

    match cli.command {
        Commands::Run {
            source,
            resources,
            partition,
            start,
            end,
            dry_run,
            max_batches,
        } => {
            registry.get(&source)?;
            let options = RunOptions::new(&settings.client_id)
                .resources(&resources)
                .partition(partition.as_deref().unwrap_or(&settings.client_id))
                .window(start, end)
                .dry_run(dry_run)
                .max_batches(max_batches);
            let orchestrator = orchestrator(&settings, registry, dry_run, shutdown).await?;

            match orchestrator.run(&source, &options).await {
                Ok(summary) => output::print_summary(&summary, cli.json)?,
                Err(err) => {
                    if let Some(summary) = err.summary() {
                        output::print_summary(summary, cli.json)?;
                    }
                    return Err(err.into());
                }
            }
        }
        Commands::Sync { sources, dry_run } => {
            let sources = if sources.is_empty() {
                registry.names().into_iter().map(str::to_string).collect()
            } else {
                sources
            };
            let options = RunOptions::new(&settings.client_id).dry_run(dry_run);
            let orchestrator = orchestrator(&settings, registry, dry_run, shutdown).await?;

            let results = orchestrator.sync(&sources, &options).await;
            let mut failed = 0;
            let mut fatal = false;
            let mut cancelled = shutdown.is_shutdown_requested();
            for (source, result) in &results {
                match result {
                    Ok(summary) => output::print_summary(summary, cli.json)?,
                    Err(err) => {
                        failed += 1;
                        fatal |= err.is_fatal() && !err.is_cancelled();
                        cancelled |= err.is_cancelled();
                        error!(source = %source, fatal = err.is_fatal(), error = %err, "Source failed");
                        if let Some(summary) = err.summary() {
                            output::print_summary(summary, cli.json)?;
                        }
                    }
                }
            }
            if failed > 0 || results.len() < sources.len() {
                return Err(CliError::Sync {
                    failed,
                    total: sources.len(),
                    fatal,
                    cancelled,
                });
            }
        }
        Commands::Sources => output::print_sources(&registry, cli.json)?,
        Commands::Cursor { command } => {
            let service = ProgressService::new(open_store(&settings)?);
            match command {
                CursorCommand::Show { source } => {
                    registry.get(&source)?;
                    let statuses = service.source_status(&source).await?;
                    output::print_cursors(&source, &statuses, cli.json)?;
                }
                CursorCommand::Reset {
                    source,
                    resource,
                    partition,
                } => {
                    let descriptor = registry.get(&source)?;
                    if descriptor.descriptor().resource(&resource).is_none() {
                        return Err(ConfigError::UnknownResource {
                            source_name: source,
                            resource,
                        }
                        .into());
                    }
                    let partition = partition.unwrap_or_else(|| settings.client_id.clone());
                    let key = CursorKey::new(&source, &resource, &partition);
                    if service.reset(&key).await? {
                        info!(cursor = %key, "Cursor reset");
                    } else {
                        info!(cursor = %key, "No cursor stored, nothing to reset");
                    }
                }
            }
        }
    }

    Ok(())
}

fn open_store(settings: &Settings) -> Result<Arc<dyn CursorStore>, CliError> {
    let store = SledCursorStore::open(&settings.state_dir)?;
    Ok(Arc::new(store))
}

/// Dry runs never write, so they do not need a database.
async fn destination(settings: &Settings, dry_run: bool) -> Result<Arc<dyn Destination>, CliError> {
    if dry_run {
        return Ok(Arc::new(MemoryDestination::new()));
    }
    let url = settings
        .database_url
        .as_deref()
        .ok_or_else(|| ConfigError::MissingCredential {
            source_name: "destination".to_string(),
            field: "DATABASE_URL".to_string(),
        })?;
    Ok(Arc::new(PostgresDestination::connect(url).await?))
}

async fn orchestrator(
    settings: &Settings,
    registry: Arc<SourceRegistry>,
    dry_run: bool,
    shutdown: &ShutdownCoordinator,
) -> Result<Orchestrator, CliError> {
    let runner = PipelineRunner::new(registry, open_store(settings)?, destination(settings, dry_run).await?);
    Ok(Orchestrator::new(
        Arc::new(runner),
        settings.run_timeout,
        shutdown.cancel_token(),
    ))
}
