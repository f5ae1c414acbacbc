use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use curator::config::{Cli, Config};
use curator::mcp_client::WorkerClient;
use curator::report::render_text;
use curator::research::pipeline::run_pipeline;
use curator::research::scorer::{OllamaOracle, RelevanceScorer};
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    curator_telemetry::init();
    let cli = Cli::parse();
    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "curation failed");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let (cfg, cfg_path) = Config::load(cli.config.as_deref())?;
    match &cfg_path {
        Some(p) => info!(path = %p.display(), "config loaded"),
        None => info!("no config file; using defaults"),
    }
    let params = cfg.pipeline_params(cli);
    let scorer = RelevanceScorer::new(OllamaOracle::new(&cfg.scorer.base_url, &cfg.scorer.model)?, cfg.scorer.profile());

    let bin = cfg.worker_bin();
    let mut worker = WorkerClient::spawn(&bin, &cfg.worker_env(), cfg.channel_options()).context("starting worker")?;
    if let Err(e) = worker.initialize().await {
        worker.shutdown().await;
        return Err(e.context("worker handshake failed"));
    }
    info!(model = %cfg.scorer.model, days = params.days_back, candidates = params.max_candidates, "curation started");

    let outcome = tokio::select! {
        report = run_pipeline(&worker, &scorer, &params, Utc::now()) => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };
    worker.shutdown().await;

    let Some(report) = outcome else {
        warn!("interrupted");
        return Ok(ExitCode::from(130));
    };
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(&report));
    }
    if cli.metrics {
        eprintln!("{}", curator_telemetry::gather_prometheus());
    }
    Ok(ExitCode::SUCCESS)
}
