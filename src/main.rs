use anyhow::{Context, Result, bail};
use clap::Parser;
use salessim::client::CompletionPermits;
use salessim::config::RunConfig;
use salessim::error::SimulationError;
use salessim::output::{self, CONFIG_FILE, RESULTS_FILE};
use salessim::persona::PersonaCatalog;
use salessim::scenario::ScenarioFile;
use salessim::scheduler::{BatchScheduler, ModelRunFactory};
use salessim::logging;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "salessim")]
#[command(about = "Run simulated shopper/salesperson conversations", long_about = None)]
struct Cli {
    /// Path to the YAML run configuration
    #[arg(long)]
    config: PathBuf,

    /// Directory the results, saved configuration and error log are written to
    #[arg(long)]
    save: PathBuf,

    /// Also write JSON logs into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Seed for emotion sampling
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(cli.log_dir.as_deref())?;

    let config = RunConfig::from_yaml_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let scenarios_path = config
        .scenarios_path
        .clone()
        .context("scenarios_path is not set")?;
    let runs = ScenarioFile::load(&scenarios_path)?.expand()?;
    let catalog = PersonaCatalog::load(&config.personas_path)?;
    info!(runs = runs.len(), personas = catalog.len(), "scenarios loaded");

    let permits = CompletionPermits::new(config.max_concurrent_completions);
    let mut factory = ModelRunFactory::from_config(&config, catalog, permits)?;
    if let Some(seed) = cli.seed {
        factory = factory.with_seed(seed);
    }

    factory
        .lookup()
        .health()
        .await
        .with_context(|| format!("lookup service at {} is not ready", factory.lookup().base_url()))?;

    let scheduler = BatchScheduler::from_config(&config);
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let report = match scheduler.run_until(&runs, &factory, interrupt).await {
        Ok(report) => report,
        Err(e @ SimulationError::Interrupted { .. }) => {
            warn!("in-flight simulations cancelled and resources released");
            bail!(e);
        }
        Err(e) => return Err(e.into()),
    };

    let mut records = report.records;
    if let Some(path) = &config.ideal_recommendations_path {
        let ideal = output::load_ideal_recommendations(path)?;
        let enriched = output::attach_ideal_recommendations(&mut records, &ideal);
        info!(enriched, "attached ideal recommendations");
    }

    output::save_results(cli.save.join(RESULTS_FILE), &records)?;
    output::save_config(cli.save.join(CONFIG_FILE), &config)?;
    if let Some(path) = output::write_error_log(&cli.save, &records)? {
        warn!(path = %path.display(), "some simulations ended in errors");
    }

    println!("{}", serde_json::to_string_pretty(&report.summary)?);
    Ok(())
}
