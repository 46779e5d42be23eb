//! 配置校验模块
//!
//! 校验规则：
//! - stream id 唯一且非空
//! - sample_rate_hz > 0, chunk_duration_s > 0
//! - session_begin 可解析
//! - mock / replay 数据源参数合法
//! - sink 必填字段齐全

use std::collections::HashSet;

use contracts::{ContractError, SessionBlueprint, SourceConfig, StreamConfig};

/// 校验 SessionBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    validate_session(blueprint)?;
    validate_ingestion(blueprint)?;
    validate_stream_ids(blueprint)?;
    for stream in &blueprint.streams {
        validate_stream(stream)?;
    }
    validate_sinks(blueprint)?;
    Ok(())
}

fn validate_session(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    let duration = blueprint.session.chunk_duration_s;
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ContractError::config_validation(
            "session.chunk_duration_s",
            format!("chunk_duration_s must be > 0, got {duration}"),
        ));
    }
    blueprint.session_begin_epoch()?;
    Ok(())
}

fn validate_ingestion(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    if blueprint.ingestion.channel_capacity == 0 {
        return Err(ContractError::config_validation(
            "ingestion.channel_capacity",
            "channel_capacity must be > 0",
        ));
    }
    Ok(())
}

/// 校验 stream id 唯一性
fn validate_stream_ids(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    if blueprint.streams.is_empty() {
        return Err(ContractError::config_validation(
            "streams",
            "at least one stream is required",
        ));
    }

    let mut seen = HashSet::new();
    for stream in &blueprint.streams {
        if stream.id.is_empty() {
            return Err(ContractError::config_validation(
                "streams[].id",
                "stream id cannot be empty",
            ));
        }
        if !seen.insert(&stream.id) {
            return Err(ContractError::config_validation(
                format!("streams[id={}]", stream.id),
                "duplicate stream id",
            ));
        }
    }
    Ok(())
}

fn validate_stream(stream: &StreamConfig) -> Result<(), ContractError> {
    if !stream.sample_rate_hz.is_finite() || stream.sample_rate_hz <= 0.0 {
        return Err(ContractError::config_validation(
            format!("streams[{}].sample_rate_hz", stream.id),
            format!("sample_rate_hz must be > 0, got {}", stream.sample_rate_hz),
        ));
    }

    match &stream.source {
        SourceConfig::Mock(params) => {
            if !params.jitter_ms.is_finite() || params.jitter_ms < 0.0 {
                return Err(ContractError::config_validation(
                    format!("streams[{}].source.jitter_ms", stream.id),
                    format!("jitter_ms must be >= 0, got {}", params.jitter_ms),
                ));
            }
            if !params.drift_ppm.is_finite() {
                return Err(ContractError::config_validation(
                    format!("streams[{}].source.drift_ppm", stream.id),
                    "drift_ppm must be finite",
                ));
            }
            if let Some(every) = params.dropout_every {
                if every == 0 || params.dropout_len >= every {
                    return Err(ContractError::config_validation(
                        format!("streams[{}].source.dropout_every", stream.id),
                        format!(
                            "dropout_len ({}) must be < dropout_every ({every}) and dropout_every > 0",
                            params.dropout_len
                        ),
                    ));
                }
            }
        }
        SourceConfig::Replay(params) => {
            if params.path.as_os_str().is_empty() {
                return Err(ContractError::config_validation(
                    format!("streams[{}].source.path", stream.id),
                    "replay path cannot be empty",
                ));
            }
            if !params.speed.is_finite() || params.speed < 0.0 {
                return Err(ContractError::config_validation(
                    format!("streams[{}].source.speed", stream.id),
                    format!("speed must be >= 0, got {}", params.speed),
                ));
            }
        }
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
    }
    Ok(())
}
