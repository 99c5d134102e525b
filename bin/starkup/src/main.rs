//! starkup deploys the Azimuth contract suite to a development chain in one shot.

mod cli;

use anyhow::Result;
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::Cli;
use starkup_deploy::{
    DeployConfig, DeploymentPlan, ExportSink, InMemoryLedger, Orchestrator, ResourceFactory,
    RunReport, SeedScript, standard_plan, standard_seed_script,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = cli.load_config()?;

    // Saved before any dry-run redirect, see `Cli::export_sink`.
    if cli.save_config {
        config.save_to_file(&config.default_save_path())?;
    }

    let plan = standard_plan()?;
    let seed = standard_seed_script();
    let sink = cli.export_sink(&config);

    let report = if cli.dry_run {
        tracing::info!("Dry run: deploying against an in-memory ledger");
        execute(InMemoryLedger::new(), &config, &plan, &seed, &sink).await?
    } else {
        tracing::info!(
            rpc_url = %config.rpc_url,
            artifacts = %config.artifacts_dir.display(),
            "Deploying contracts..."
        );
        execute(config.rpc_factory()?, &config, &plan, &seed, &sink).await?
    };

    println!("{}", summary(&report, &sink));

    tracing::info!(
        artifact = %report.artifact.display(),
        seeded = report.seeded,
        "Deployment complete"
    );

    Ok(())
}

async fn execute<F: ResourceFactory>(
    factory: F,
    config: &DeployConfig,
    plan: &DeploymentPlan,
    seed: &SeedScript,
    sink: &ExportSink,
) -> Result<RunReport> {
    let mut orchestrator = Orchestrator::from_environment(factory, &config.actors).await?;

    orchestrator.run(plan, seed, sink).await.map_err(|err| {
        let stage = err.stage();
        anyhow::Error::new(err).context(format!("Deployment failed during stage `{stage}`"))
    })
}

fn summary(report: &RunReport, sink: &ExportSink) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Resource", "Kind", "Address", "Export key"]);

    for handle in report.result.handles().iter() {
        table.add_row(vec![
            handle.name.clone(),
            handle.kind.to_string(),
            handle.address.to_checksum(None),
            sink.export_key(&handle.name),
        ]);
    }

    table
}
