//! FileSink - appends chunk samples to one file per stream

use chrono::{DateTime, SecondsFormat};
use contracts::{Chunk, ContractError, CorrectedSample, DataSink, StreamId};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument};

const CSV_HEADER: &str =
    "ts_loss_aware,x,y,z,index,stream_id,device_model,ts_wallclock,ts_raw,ts_drift_free,chunk_begin";

/// Output encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Jsonl,
}

impl FileFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "jsonl" | "json" => Some(Self::Jsonl),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
        }
    }
}

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
    pub format: FileFormat,
    /// Prepended to every file name, e.g. the session name
    pub file_prefix: Option<String>,
}

impl FileSinkConfig {
    /// Create config from params map
    ///
    /// Recognized keys: `base_path` (default `./output`), `format`
    /// (`csv` | `jsonl`, default `csv`), `file_prefix`.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ContractError> {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        let format = match params.get("format") {
            Some(value) => FileFormat::parse(value).ok_or_else(|| {
                ContractError::config_validation(
                    "sinks[].params.format",
                    format!("unsupported file format '{value}', expected csv or jsonl"),
                )
            })?,
            None => FileFormat::Csv,
        };

        Ok(Self {
            base_path,
            format,
            file_prefix: params.get("file_prefix").cloned(),
        })
    }
}

/// One output row
#[derive(Serialize)]
struct SampleRecord<'a> {
    ts_loss_aware: f64,
    x: f64,
    y: f64,
    z: f64,
    index: u64,
    stream_id: &'a str,
    device_model: &'a str,
    ts_wallclock: f64,
    ts_raw: f64,
    ts_drift_free: f64,
    chunk_id: u64,
    chunk_begin: &'a str,
}

impl<'a> SampleRecord<'a> {
    fn new(chunk: &'a Chunk, sample: &CorrectedSample, chunk_begin: &'a str) -> Self {
        Self {
            ts_loss_aware: sample.ts_loss_aware,
            x: sample.x,
            y: sample.y,
            z: sample.z,
            index: sample.index,
            stream_id: chunk.stream_id.as_str(),
            device_model: &chunk.device_model,
            ts_wallclock: sample.ts_wallclock,
            ts_raw: sample.ts_raw,
            ts_drift_free: sample.ts_drift_free,
            chunk_id: chunk.chunk_id,
            chunk_begin,
        }
    }

    fn write_csv(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{}",
            self.ts_loss_aware,
            self.x,
            self.y,
            self.z,
            self.index,
            csv_field(self.stream_id),
            csv_field(self.device_model),
            self.ts_wallclock,
            self.ts_raw,
            self.ts_drift_free,
            self.chunk_begin
        )
    }
}

/// Quote a text field when it holds a separator, quote or line break.
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Render a boundary (seconds since epoch) as RFC 3339 UTC
pub(crate) fn format_boundary(boundary: f64) -> String {
    DateTime::from_timestamp_millis((boundary * 1000.0).round() as i64)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .unwrap_or_else(|| boundary.to_string())
}

/// Sink that appends samples to `<base_path>/<prefix><stream_id>.<ext>`
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writers: HashMap<StreamId, BufWriter<File>>,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            writers: HashMap::new(),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let config = FileSinkConfig::from_params(params)?;
        Ok(Self::new(name, config)?)
    }

    /// Path of the file a stream is written to
    pub fn stream_path(&self, stream_id: &str) -> PathBuf {
        let file_name = format!(
            "{}{}.{}",
            self.config.file_prefix.as_deref().unwrap_or(""),
            sanitize(stream_id),
            self.config.format.extension()
        );
        self.config.base_path.join(file_name)
    }

    fn writer_for(&mut self, stream_id: &StreamId) -> std::io::Result<&mut BufWriter<File>> {
        if !self.writers.contains_key(stream_id) {
            let path = self.stream_path(stream_id);
            let writer = open_stream_file(&path, self.config.format)?;
            debug!(sink = %self.name, path = %path.display(), "opened stream file");
            self.writers.insert(stream_id.clone(), writer);
        }
        self.writers
            .get_mut(stream_id)
            .ok_or_else(|| std::io::Error::other("stream writer missing"))
    }

    fn write_chunk_to_disk(&mut self, chunk: &Chunk) -> std::io::Result<()> {
        let format = self.config.format;
        let chunk_begin = format_boundary(chunk.boundary);
        let writer = self.writer_for(&chunk.stream_id)?;

        for sample in &chunk.samples {
            let record = SampleRecord::new(chunk, sample, &chunk_begin);
            match format {
                FileFormat::Csv => record.write_csv(writer)?,
                FileFormat::Jsonl => {
                    serde_json::to_writer(&mut *writer, &record)
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                    writer.write_all(b"\n")?;
                }
            }
        }
        Ok(())
    }

    fn persist_chunk(&mut self, chunk: &Chunk) -> Result<(), ContractError> {
        self.write_chunk_to_disk(chunk).map_err(|e| {
            error!(
                sink = %self.name,
                stream_id = %chunk.stream_id,
                chunk_id = chunk.chunk_id,
                error = %e,
                "Write failed"
            );
            ContractError::sink_write(&self.name, e.to_string())
        })
    }

    fn flush_all(&mut self) -> Result<(), ContractError> {
        for writer in self.writers.values_mut() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }
}

/// Open for append; the CSV header is written only to a fresh file
fn open_stream_file(path: &Path, format: FileFormat) -> std::io::Result<BufWriter<File>> {
    let fresh = !path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    if fresh && format == FileFormat::Csv {
        writeln!(writer, "{CSV_HEADER}")?;
    }
    Ok(writer)
}

fn sanitize(stream_id: &str) -> String {
    stream_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, chunk),
        fields(sink = %self.name, stream_id = %chunk.stream_id, chunk_id = chunk.chunk_id)
    )]
    async fn write(&mut self, chunk: &Chunk) -> Result<(), ContractError> {
        self.persist_chunk(chunk)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.flush_all()
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush_all()?;
        let files = self.writers.len();
        self.writers.clear();
        info!(sink = %self.name, files, "FileSink closed");
        Ok(())
    }
}
