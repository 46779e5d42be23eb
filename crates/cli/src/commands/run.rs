//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::SessionBlueprint;
use std::time::Duration;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        session = %blueprint.session.name,
        chunk_duration_s = blueprint.session.chunk_duration_s,
        streams = blueprint.streams.len(),
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint)?;
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        max_chunks: (args.max_chunks > 0).then_some(args.max_chunks),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size,
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    info!("Starting pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        chunks = stats.chunks_emitted,
        samples = stats.samples_received,
        dropped = stats.samples_dropped,
        duration_secs = stats.duration.as_secs_f64(),
        reason = ?stats.stop_reason,
        "Pipeline completed"
    );
    stats.print_summary();

    info!("Stream Syncer finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A handler that fails to install never resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &SessionBlueprint) -> Result<()> {
    println!("\n=== Configuration Summary ===\n");
    println!("Session:");
    println!("  Name: {}", blueprint.session.name);
    println!("  Chunk duration: {}s", blueprint.session.chunk_duration_s);
    match blueprint.session_begin_epoch()? {
        Some(begin) => println!("  Session begin: {begin}"),
        None => println!("  Session begin: first sample of each stream"),
    }
    println!(
        "  Ingestion: capacity {}, {:?}",
        blueprint.ingestion.channel_capacity, blueprint.ingestion.drop_policy
    );

    println!("\nStreams ({}):", blueprint.streams.len());
    for stream in &blueprint.streams {
        println!(
            "  - {} ({}, {} Hz)",
            stream.id, stream.device_model, stream.sample_rate_hz
        );
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
    Ok(())
}
