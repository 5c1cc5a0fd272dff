//! Main binary for the tokenbench benchmark engine

use bench_backend::Orchestrator;
use bench_core::{Repository, RunConfig};
use bench_runner::{
    BenchService, ExportFormat, RunCoordinator, RunProgress, RunProgressFn, StartRunParams,
    StatusRegistry, SuiteLibrary,
};
use bench_store::JsonStore;
use bench_sysmon::ResourceMonitor;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tokenbench")]
#[command(about = "Benchmark locally hosted LLM inference endpoints")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Data directory holding the store and suite files
    #[arg(long, value_name = "DIR", default_value = "./tokenbench-data")]
    data_dir: PathBuf,

    /// Base URL of the inference backend
    #[arg(long, value_name = "URL", default_value = "http://localhost:8000")]
    backend_url: String,

    /// Log level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage registered models
    Models {
        #[command(subcommand)]
        command: ModelCommands,
    },
    /// List the backend's model catalog
    Catalog,
    /// List scenario suites
    Suites,
    /// Execute a benchmark run
    Run {
        /// Suite name
        #[arg(long)]
        suite: String,
        /// Registered model ids, comma separated, in execution order
        #[arg(long, value_delimiter = ',', required = true)]
        models: Vec<String>,
        /// Restrict to these scenarios (default: whole suite)
        #[arg(long, value_delimiter = ',')]
        scenarios: Vec<String>,
        #[arg(long, default_value_t = 5)]
        iterations: u32,
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,
        /// Stream tokens and measure TTFT/TPOT
        #[arg(long)]
        streaming: bool,
        /// Pause between iterations in milliseconds
        #[arg(long, default_value_t = 100)]
        pause_ms: u64,
    },
    /// List past runs
    Runs,
    /// Show the status of a run
    Status { run_id: Uuid },
    /// Export a run as JSON or CSV
    Export {
        run_id: Uuid,
        #[arg(long, default_value = "json")]
        format: String,
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ModelCommands {
    /// List registered models
    List,
    /// Register a model
    Register {
        #[arg(long)]
        alias: String,
        #[arg(long)]
        model_id: String,
    },
    /// Delete a registered model
    Delete { id: String },
    /// Load a model on the backend
    Load { id: String },
    /// Unload a model from the backend
    Unload { id: String },
    /// Probe a model's health
    Health { id: String },
}

struct App {
    service: BenchService,
    orchestrator: Arc<Orchestrator>,
}

impl App {
    async fn build(cli: &Cli) -> anyhow::Result<Self> {
        let suites_dir = cli.data_dir.join("suites");
        std::fs::create_dir_all(&suites_dir)?;

        let repo: Arc<dyn Repository> =
            Arc::new(JsonStore::open(cli.data_dir.join("store.json")).await?);
        let orchestrator = Arc::new(Orchestrator::new(&cli.backend_url, repo.clone())?);
        let registry = Arc::new(StatusRegistry::new());
        let monitor = Arc::new(ResourceMonitor::new());
        let coordinator = Arc::new(RunCoordinator::new(
            repo.clone(),
            orchestrator.clone(),
            registry.clone(),
            monitor,
        ));
        let service = BenchService::new(
            repo,
            orchestrator.clone(),
            coordinator,
            registry,
            SuiteLibrary::new(&suites_dir),
        );

        // Repair runs orphaned by a previous process
        let swept = service.sweep_stale_runs().await?;
        if swept > 0 {
            warn!("marked {} orphaned running run(s) as failed", swept);
        }

        Ok(Self {
            service,
            orchestrator,
        })
    }

    /// Connect to the backend for commands that need it
    async fn connect(&self) -> anyhow::Result<()> {
        let endpoint = self.orchestrator.initialize().await?;
        info!("using inference backend at {}", endpoint);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let app = App::build(&cli).await?;

    match cli.command {
        Commands::Models { command } => run_model_command(&app, command).await,
        Commands::Catalog => {
            app.connect().await?;
            let catalog = app.service.list_available().await?;
            if catalog.is_empty() {
                println!("No models in the backend catalog");
            }
            for entry in catalog {
                println!("{}", entry.id);
            }
            Ok(())
        }
        Commands::Suites => {
            for suite in app.service.list_suites().await? {
                println!(
                    "{:<20} {:>3} scenarios  {}",
                    suite.name,
                    suite.scenarios.len(),
                    suite.description
                );
            }
            Ok(())
        }
        Commands::Run {
            suite,
            models,
            scenarios,
            iterations,
            timeout_ms,
            temperature,
            streaming,
            pause_ms,
        } => {
            app.connect().await?;
            let config = RunConfig {
                iterations,
                timeout_ms,
                temperature,
                streaming,
                pause_ms,
            };
            let progress: RunProgressFn = Arc::new(|p: RunProgress| {
                println!(
                    "[{:>3}%] {}/{} tasks  model={} scenario={}",
                    p.progress, p.completed_tasks, p.total_tasks, p.descriptor_id, p.scenario
                );
            });

            let run_id = app
                .service
                .start_run(
                    StartRunParams {
                        model_ids: models,
                        suite_name: suite,
                        selected_scenarios: scenarios,
                        config,
                        detach: false,
                    },
                    Some(progress),
                )
                .await?;

            let details = app.service.get_run(run_id).await?;
            println!("\nRun {} {}", run_id, details.run.status);
            for result in &details.results {
                println!(
                    "  {:<30} {:<20} tps={:<8.2} p50={:<8.1}ms p95={:<8.1}ms err={:.0}% timeout={:.0}%",
                    result.model_id,
                    result.scenario,
                    result.tps,
                    result.latency_p50,
                    result.latency_p95,
                    result.error_rate,
                    result.timeout_rate,
                );
                if let (Some(ttft), Some(tpot)) = (result.ttft, result.tpot) {
                    println!(
                        "  {:<51} ttft={:<7.1}ms tpot={:<6.1}ms gen_tps={:.2}",
                        "",
                        ttft,
                        tpot,
                        result.gen_tps.unwrap_or(0.0)
                    );
                }
            }
            Ok(())
        }
        Commands::Runs => {
            for summary in app.service.list_runs().await? {
                println!(
                    "{}  {:<9} {:<20} [{}]  {}",
                    summary.run.id,
                    summary.run.status.to_string(),
                    summary.run.suite_name,
                    summary.model_names.join(", "),
                    summary.run.started_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
            Ok(())
        }
        Commands::Status { run_id } => {
            match app.service.get_run_status(run_id).await? {
                Some(report) => {
                    print!("{}", report.status);
                    if let Some(progress) = report.progress {
                        print!(" ({}%)", progress);
                    }
                    if let Some(error) = report.error {
                        print!("  error: {}", error);
                    }
                    println!();
                }
                None => println!("unknown run {}", run_id),
            }
            Ok(())
        }
        Commands::Export {
            run_id,
            format,
            output,
        } => {
            let format: ExportFormat = format.parse()?;
            let bytes = app.service.export_run(run_id, format).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, bytes)?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{}", String::from_utf8_lossy(&bytes)),
            }
            Ok(())
        }
    }
}

async fn run_model_command(app: &App, command: ModelCommands) -> anyhow::Result<()> {
    match command {
        ModelCommands::List => {
            for model in app.service.list_models().await? {
                println!(
                    "{}  {:<20} {:<30} {}",
                    model.id, model.alias, model.model_id, model.status
                );
            }
            Ok(())
        }
        ModelCommands::Register { alias, model_id } => {
            let model = app.service.register_model(&alias, &model_id).await?;
            println!("Registered {} as '{}'", model.id, model.alias);
            Ok(())
        }
        ModelCommands::Delete { id } => {
            app.service.delete_model(&id).await?;
            println!("Deleted {}", id);
            Ok(())
        }
        ModelCommands::Load { id } => {
            app.connect().await?;
            let loaded = app.service.load_model(&id).await?;
            println!("Loaded {} as {}", id, loaded.id);
            Ok(())
        }
        ModelCommands::Unload { id } => {
            app.connect().await?;
            app.service.unload_model(&id).await?;
            println!("Unloaded {}", id);
            Ok(())
        }
        ModelCommands::Health { id } => {
            app.connect().await?;
            let health = app.service.model_health(&id).await?;
            if health.healthy {
                println!("healthy ({})", health.status);
            } else {
                println!(
                    "unhealthy: {}",
                    health.error.as_deref().unwrap_or("unknown cause")
                );
            }
            Ok(())
        }
    }
}

fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
