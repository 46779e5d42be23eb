//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::{SessionBlueprint, SourceConfig, StreamConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    session: SessionInfo,
    streams: Vec<StreamInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct SessionInfo {
    name: String,
    chunk_duration_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_begin_epoch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_begin_utc: Option<String>,
    channel_capacity: usize,
    drop_policy: String,
}

#[derive(Serialize)]
struct StreamInfo {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    device_model: String,
    sample_rate_hz: f64,
    grange_g: u8,
    source: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    source_params: HashMap<String, String>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&blueprint, args)?;
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &SessionBlueprint, args: &InfoArgs) -> Result<ConfigInfo> {
    let begin = blueprint.session_begin_epoch()?;

    let streams = blueprint
        .streams
        .iter()
        .map(|s| StreamInfo {
            id: s.id.to_string(),
            address: s.address.clone(),
            device_model: s.device_model.clone(),
            sample_rate_hz: s.sample_rate_hz,
            grange_g: s.grange_g,
            source: source_kind(s).to_string(),
            source_params: if args.streams {
                source_params(s)
            } else {
                HashMap::new()
            },
        })
        .collect();

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                params: s.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(ConfigInfo {
        version: format!("{:?}", blueprint.version),
        session: SessionInfo {
            name: blueprint.session.name.clone(),
            chunk_duration_s: blueprint.session.chunk_duration_s,
            session_begin_epoch: begin,
            session_begin_utc: begin.and_then(format_utc),
            channel_capacity: blueprint.ingestion.channel_capacity,
            drop_policy: format!("{:?}", blueprint.ingestion.drop_policy),
        },
        streams,
        sinks,
    })
}

fn source_kind(stream: &StreamConfig) -> &'static str {
    match stream.source {
        SourceConfig::Mock(_) => "mock",
        SourceConfig::Replay(_) => "replay",
    }
}

fn source_params(stream: &StreamConfig) -> HashMap<String, String> {
    let mut params = HashMap::new();
    match &stream.source {
        SourceConfig::Mock(p) => {
            params.insert("jitter_ms".into(), p.jitter_ms.to_string());
            params.insert("drift_ppm".into(), p.drift_ppm.to_string());
            if let Some(every) = p.dropout_every {
                params.insert("dropout".into(), format!("{} every {}", p.dropout_len, every));
            }
            if let Some(limit) = p.sample_limit {
                params.insert("sample_limit".into(), limit.to_string());
            }
            params.insert("realtime".into(), p.realtime.to_string());
        }
        SourceConfig::Replay(p) => {
            params.insert("path".into(), p.path.display().to_string());
            params.insert("speed".into(), p.speed.to_string());
        }
    }
    params
}

fn format_utc(epoch: f64) -> Option<String> {
    chrono::DateTime::from_timestamp(epoch.floor() as i64, 0).map(|dt| dt.to_rfc3339())
}

fn print_config_info(info: &ConfigInfo, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Stream Syncer Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let session = &info.session;
    println!("🕒 Session");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Name: {}", session.name);
    println!("   ├─ Chunk duration: {}s", session.chunk_duration_s);
    match (&session.session_begin_utc, session.session_begin_epoch) {
        (Some(utc), Some(epoch)) => println!("   ├─ Session begin: {} ({})", utc, epoch),
        _ => println!("   ├─ Session begin: first sample of each stream"),
    }
    println!(
        "   └─ Ingestion: capacity {}, {}",
        session.channel_capacity, session.drop_policy
    );

    println!("\n⌚ Streams ({})", info.streams.len());
    for (i, stream) in info.streams.iter().enumerate() {
        let is_last = i == info.streams.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!(
            "   {} {} ({}, {} Hz, ±{}g, {})",
            prefix, stream.id, stream.device_model, stream.sample_rate_hz, stream.grange_g, stream.source
        );
        if let Some(ref address) = stream.address {
            println!("   {}  address: {}", child_prefix, address);
        }
        if args.streams {
            let mut params: Vec<_> = stream.source_params.iter().collect();
            params.sort();
            for (key, value) in params {
                println!("   {}  {}: {}", child_prefix, key, value);
            }
        }
    }

    if !info.sinks.is_empty() {
        println!("\n📤 Sinks ({})", info.sinks.len());
        for (i, sink) in info.sinks.iter().enumerate() {
            let is_last = i == info.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            println!(
                "   {} {} ({}, queue {})",
                prefix, sink.name, sink.sink_type, sink.queue_capacity
            );
        }
    }

    println!();
}
