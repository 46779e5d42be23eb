//! Replay 采样源
//!
//! 从 JSON Lines 录制文件回放，每行一个样本：
//!
//! ```text
//! {"device_epoch_ms": 0.0, "x": 0.0, "y": 0.0, "z": 1.0, "wallclock": 1714564800.0}
//! ```
//!
//! 带 `stream_id` 字段的行只回放给同名 stream。

use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{ContractError, RawSample, SampleCallback, SampleEvent, SampleSource, StreamId};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Longest single sleep while pacing, so `stop` is seen promptly
const PACE_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    device_epoch_ms: f64,
    x: f64,
    y: f64,
    z: f64,
    wallclock: f64,
    #[serde(default)]
    stream_id: Option<StreamId>,
}

/// Replay 采样源
pub struct ReplaySampleSource {
    stream_id: StreamId,
    events: Arc<Vec<SampleEvent>>,
    /// Playback speed multiplier; 0 replays as fast as possible
    speed: f64,
    running: Arc<AtomicBool>,
}

impl ReplaySampleSource {
    /// Load a recording from disk.
    ///
    /// # Errors
    /// `SourceUnavailable` if the file cannot be opened, `PayloadParse` on
    /// the first malformed line.
    pub fn from_path(
        stream_id: impl Into<StreamId>,
        path: &Path,
        speed: f64,
    ) -> Result<Self, ContractError> {
        let stream_id = stream_id.into();
        let file = std::fs::File::open(path).map_err(|e| ContractError::SourceUnavailable {
            stream_id: stream_id.to_string(),
            message: format!("cannot open {}: {e}", path.display()),
        })?;
        let source = Self::from_reader(stream_id, std::io::BufReader::new(file), speed)?;
        info!(
            stream_id = %source.stream_id,
            path = %path.display(),
            samples = source.len(),
            "replay recording loaded"
        );
        Ok(source)
    }

    /// # Errors
    /// `PayloadParse` on the first malformed line, `Io` on read failure.
    pub fn from_reader(
        stream_id: impl Into<StreamId>,
        reader: impl BufRead,
        speed: f64,
    ) -> Result<Self, ContractError> {
        let stream_id = stream_id.into();
        let mut events = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record: ReplayRecord = serde_json::from_str(trimmed).map_err(|e| {
                ContractError::payload_parse(stream_id.as_str(), format!("line {}: {e}", line_no + 1))
            })?;
            if record.stream_id.as_ref().is_some_and(|id| *id != stream_id) {
                continue;
            }
            events.push(SampleEvent::new(
                stream_id.clone(),
                RawSample::new(record.device_epoch_ms, record.x, record.y, record.z),
                record.wallclock,
            ));
        }

        Ok(Self {
            stream_id,
            events: Arc::new(events),
            speed: speed.max(0.0),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl SampleSource for ReplaySampleSource {
    fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    fn listen(&self, callback: SampleCallback) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let events = self.events.clone();
        let speed = self.speed;
        let running = self.running.clone();
        let stream_id = self.stream_id.clone();

        std::thread::spawn(move || {
            let _guard = ListeningGuard(running.clone());
            debug!(stream_id = %stream_id, samples = events.len(), speed, "replay started");
            let started = Instant::now();
            let first_wallclock = events.first().map(|e| e.wallclock).unwrap_or(0.0);

            let mut sent = 0usize;
            for event in events.iter() {
                if speed > 0.0 {
                    let offset = ((event.wallclock - first_wallclock) / speed).max(0.0);
                    pace_until(offset, started, &running);
                }
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                callback(event.clone());
                sent += 1;
            }

            debug!(stream_id = %stream_id, sent, "replay finished");
        });
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_listening(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Clears the listening flag when the replay thread exits, including by panic
struct ListeningGuard(Arc<AtomicBool>);

impl Drop for ListeningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sleep until `offset_s` seconds after `started`, waking early on stop.
///
/// Offsets that do not fit a `Duration` are not paced.
fn pace_until(offset_s: f64, started: Instant, running: &AtomicBool) {
    let Ok(target) = Duration::try_from_secs_f64(offset_s) else {
        warn!(offset_s, "replay offset out of range, not pacing");
        return;
    };
    while running.load(Ordering::Relaxed) {
        match target.checked_sub(started.elapsed()) {
            Some(wait) if !wait.is_zero() => std::thread::sleep(wait.min(PACE_SLICE)),
            _ => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::sync::Mutex;

    const RECORDING: &str = r#"
{"device_epoch_ms": 0.0, "x": 1.0, "y": 2.0, "z": 3.0, "wallclock": 1000.0}
{"device_epoch_ms": 20.0, "x": 1.0, "y": 2.0, "z": 3.0, "wallclock": 1000.02, "stream_id": "left"}
{"device_epoch_ms": 20.0, "x": 9.0, "y": 9.0, "z": 9.0, "wallclock": 1000.02, "stream_id": "right"}

{"device_epoch_ms": 40.0, "x": 1.0, "y": 2.0, "z": 3.0, "wallclock": 1000.04}
"#;

    #[test]
    fn test_parse_filters_by_stream() {
        let source = ReplaySampleSource::from_reader("left", Cursor::new(RECORDING), 0.0).unwrap();
        assert_eq!(source.len(), 3);
        assert!(source.events.iter().all(|e| e.sample.x == 1.0));
        assert!(source.events.iter().all(|e| e.stream_id.as_str() == "left"));
        assert_eq!(source.events[2].wallclock, 1000.04);
    }

    #[test]
    fn test_malformed_line_is_payload_error() {
        let content = "{\"device_epoch_ms\": 0.0, \"x\": 1.0}\n";
        let result = ReplaySampleSource::from_reader("acc", Cursor::new(content), 0.0);
        match result {
            Err(ContractError::PayloadParse { stream_id, message }) => {
                assert_eq!(stream_id, "acc");
                assert!(message.starts_with("line 1"), "got: {message}");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("malformed line accepted"),
        }
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let result = ReplaySampleSource::from_path("acc", Path::new("/nonexistent/rec.jsonl"), 0.0);
        assert!(matches!(result, Err(ContractError::SourceUnavailable { .. })));
    }

    #[test]
    fn test_replay_from_file_unpaced() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RECORDING.as_bytes()).unwrap();

        let source = ReplaySampleSource::from_path("right", file.path(), 0.0).unwrap();
        assert_eq!(source.len(), 3);

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        source.listen(Arc::new(move |event| sink.lock().unwrap().push(event)));

        for _ in 0..200 {
            if !source.is_listening() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 3);
        assert_eq!(received[1].sample.x, 9.0);
    }

    fn wait_idle(source: &ReplaySampleSource) {
        for _ in 0..200 {
            if !source.is_listening() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_unrepresentable_offset_delivers_without_pacing() {
        let content = r#"
{"device_epoch_ms": 0.0, "x": 0.0, "y": 0.0, "z": 1.0, "wallclock": 0.0}
{"device_epoch_ms": 20.0, "x": 0.0, "y": 0.0, "z": 1.0, "wallclock": 1e20}
"#;
        let source = ReplaySampleSource::from_reader("acc", Cursor::new(content), 1.0).unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        source.listen(Arc::new(move |event| sink.lock().unwrap().push(event)));

        wait_idle(&source);
        assert!(!source.is_listening());
        assert_eq!(received.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_stop_interrupts_long_wait() {
        let content = r#"
{"device_epoch_ms": 0.0, "x": 0.0, "y": 0.0, "z": 1.0, "wallclock": 0.0}
{"device_epoch_ms": 20.0, "x": 0.0, "y": 0.0, "z": 1.0, "wallclock": 3600.0}
"#;
        let source = ReplaySampleSource::from_reader("acc", Cursor::new(content), 1.0).unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        source.listen(Arc::new(move |event| sink.lock().unwrap().push(event)));

        std::thread::sleep(Duration::from_millis(50));
        source.stop();
        std::thread::sleep(PACE_SLICE * 3);
        assert!(!source.is_listening());
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_panicking_callback_clears_listening() {
        let source = ReplaySampleSource::from_reader("left", Cursor::new(RECORDING), 0.0).unwrap();
        source.listen(Arc::new(|_: SampleEvent| panic!("consumer failed")));

        wait_idle(&source);
        assert!(!source.is_listening());
    }
}
