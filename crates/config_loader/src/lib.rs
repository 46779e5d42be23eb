//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Resolve replay recordings relative to the config file
//! - Generate `SessionBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("session.toml")).unwrap();
//! println!("Session: {}", blueprint.session.name);
//! ```

mod parser;
mod validator;

pub use contracts::SessionBlueprint;
pub use parser::ConfigFormat;

use contracts::{ContractError, SourceConfig};
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    /// Relative replay paths are resolved against the config file's
    /// directory and must exist.
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    /// - Missing replay recording
    pub fn load_from_path(path: &Path) -> Result<SessionBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        let mut blueprint = Self::load_from_str(&content, format)?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::resolve_replay_paths(&mut blueprint, base_dir)?;
        Ok(blueprint)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SessionBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Serialize SessionBlueprint to TOML string
    pub fn to_toml(blueprint: &SessionBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize SessionBlueprint to JSON string
    pub fn to_json(blueprint: &SessionBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SessionBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    fn resolve_replay_paths(
        blueprint: &mut SessionBlueprint,
        base_dir: &Path,
    ) -> Result<(), ContractError> {
        for stream in &mut blueprint.streams {
            let SourceConfig::Replay(params) = &mut stream.source else {
                continue;
            };
            if params.path.is_relative() {
                params.path = base_dir.join(&params.path);
            }
            if !params.path.is_file() {
                return Err(ContractError::SourceUnavailable {
                    stream_id: stream.id.to_string(),
                    message: format!("replay file not found: {}", params.path.display()),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
[session]
name = "wrist-study"
chunk_duration_s = 10.0
session_begin = "2024-05-01T12:00:00Z"

[[streams]]
id = "left_wrist"
device_model = "METAMOTION_R"
sample_rate_hz = 50.0
[streams.source]
kind = "mock"
jitter_ms = 2.0
sample_limit = 100

[[streams]]
id = "right_wrist"
sample_rate_hz = 25.0
[streams.source]
kind = "mock"

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.session.name, "wrist-study");
        assert_eq!(bp.streams.len(), 2);

        let configs = bp.chunker_configs().unwrap();
        assert_eq!(configs[0].session_begin, Some(1714564800.0));
        assert_eq!(configs[1].session_begin, configs[0].session_begin);
        assert_eq!(configs[1].device_model, "NA");
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.session.name, bp2.session.name);
        assert_eq!(bp.streams.len(), bp2.streams.len());
        assert_eq!(bp.streams[0].id, bp2.streams[0].id);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.session.session_begin, bp2.session.session_begin);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[session]
[[streams]]
id = "acc"
source = { kind = "mock" }
[[streams]]
id = "acc"
sample_rate_hz = 100.0
source = { kind = "mock" }
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_load_from_path_resolves_replay() {
        let dir = tempfile::tempdir().unwrap();
        let mut recording = std::fs::File::create(dir.path().join("rec.jsonl")).unwrap();
        writeln!(
            recording,
            r#"{{"device_epoch_ms": 0.0, "x": 0.0, "y": 0.0, "z": 1.0, "wallclock": 1000.0}}"#
        )
        .unwrap();

        let config_path = dir.path().join("session.toml");
        std::fs::write(
            &config_path,
            r#"
[session]
[[streams]]
id = "acc"
source = { kind = "replay", path = "rec.jsonl" }
"#,
        )
        .unwrap();

        let bp = ConfigLoader::load_from_path(&config_path).unwrap();
        match &bp.streams[0].source {
            SourceConfig::Replay(params) => {
                assert_eq!(params.path, dir.path().join("rec.jsonl"))
            }
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[test]
    fn test_missing_replay_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("session.toml");
        std::fs::write(
            &config_path,
            r#"
[session]
[[streams]]
id = "acc"
source = { kind = "replay", path = "missing.jsonl" }
"#,
        )
        .unwrap();

        let result = ConfigLoader::load_from_path(&config_path);
        assert!(matches!(
            result,
            Err(ContractError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let result = ConfigLoader::load_from_path(Path::new("session.yaml"));
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }
}
