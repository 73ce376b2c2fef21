use std::fs;
use std::process;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kvstore_benchmark::analysis::{self, UslReport};
use kvstore_benchmark::cmd::{CleanArgs, Cli, Command, RunArgs, UslArgs};
use kvstore_benchmark::consts::{DETECT_BASE_PORT, DETECT_PORT_COUNT};
use kvstore_benchmark::report;
use kvstore_benchmark::store::{self, ZkConnector};
use kvstore_benchmark::{BenchError, FitOptions, Orchestrator, ResultDocument, Result};

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let outcome = match cli.command {
        Command::Run(args) => run(args),
        Command::Usl(args) => usl(args),
        Command::Clean(args) => clean(args),
    };
    if let Err(e) = outcome {
        error!(error = %e, "benchmark failed");
        process::exit(1);
    }
}

fn run(args: RunArgs) -> Result<()> {
    println!("benchmark parameters: {}", serde_json::to_string(&args)?);

    let mut config = args.to_config();
    if config.endpoints.is_empty() && args.auto_detect {
        info!("no endpoint given, probing local ports");
        config.endpoints = store::detect_endpoints(
            &ZkConnector::with_retries(1),
            "127.0.0.1",
            DETECT_BASE_PORT,
            DETECT_PORT_COUNT,
        );
        if config.endpoints.is_empty() {
            return Err(BenchError::Setup(
                "auto-detection found no cluster member".to_string(),
            ));
        }
        info!(endpoints = ?config.endpoints, "endpoints detected");
    }

    let orchestrator = Orchestrator::new(config, ZkConnector::default())?;
    let results = orchestrator.run()?;
    report::print_results(&results);

    if let Some(path) = &args.output {
        let document = ResultDocument::new(results, orchestrator.config().clone());
        report::save_document(path, &document)?;
    }
    Ok(())
}

fn usl(args: UslArgs) -> Result<()> {
    let documents = analysis::load_documents(&args.files);
    if documents.is_empty() {
        return Err(BenchError::Setup(
            "no usable result file, expected names like results-3nodes.json".to_string(),
        ));
    }

    let options = FitOptions {
        horizon: args.horizon,
        ..FitOptions::default()
    };
    let analyses = analysis::analyze(&documents, &options);
    if analyses.is_empty() {
        warn!("no workload category could be fitted");
        return Ok(());
    }

    let text = UslReport::new(&analyses).to_string();
    print!("{}", text);
    report::print_usl_summary(&analyses);

    fs::write(&args.report, &text)?;
    info!(path = %args.report.display(), "report saved");

    if let Some(path) = &args.series {
        fs::write(path, serde_json::to_string_pretty(&analysis::series(&analyses))?)?;
        info!(path = %path.display(), "series saved");
    }
    Ok(())
}

fn clean(args: CleanArgs) -> Result<()> {
    store::clean(&args.endpoint)?;
    Ok(())
}
