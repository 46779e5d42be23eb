//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置到分块引擎的契约测试
//! - 模拟 e2e 测试（mock / replay 数据源，无需真实设备）
//! - 背压策略的端到端行为

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};

    const SESSION: &str = r#"
[session]
name = "wrist-study"
chunk_duration_s = 10.0
session_begin = "2024-05-01T12:00:00.750Z"

[[streams]]
id = "left_wrist"
device_model = "METAMOTION_R"
sample_rate_hz = 50.0
[streams.source]
kind = "mock"
sample_limit = 10

[[streams]]
id = "right_wrist"
sample_rate_hz = 100.0
[streams.source]
kind = "mock"
sample_limit = 10

[[sinks]]
name = "log"
sink_type = "log"
"#;

    #[test]
    fn test_blueprint_feeds_chunker() {
        let blueprint = ConfigLoader::load_from_str(SESSION, ConfigFormat::Toml).unwrap();
        let configs = blueprint.chunker_configs().unwrap();

        assert_eq!(configs.len(), 2);
        // Session begin is floored to whole seconds and shared
        for config in &configs {
            assert_eq!(config.session_begin, Some(1_714_564_800.0));
            assert_eq!(config.chunk_duration_s, 10.0);
        }
        assert_eq!(configs[1].device_model, "NA");

        let chunker = chunk_engine::SessionChunker::new(configs).unwrap();
        assert_eq!(chunker.stream_count(), 2);
        assert_eq!(
            chunker.assembler("left_wrist").unwrap().boundary().start(),
            Some(1_714_564_800.0)
        );
    }

    #[test]
    fn test_blueprint_json_toml_equivalent() {
        let blueprint = ConfigLoader::load_from_str(SESSION, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&blueprint).unwrap();
        let reparsed = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();

        assert_eq!(
            reparsed.chunker_configs().unwrap(),
            blueprint.chunker_configs().unwrap()
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;

    use async_channel::Receiver;
    use chunk_engine::{LossDecision, SessionChunker, METAMOTION_R};
    use contracts::{
        Chunk, ChunkerConfig, DropPolicy, MockSourceParams, SampleEvent, SinkConfig, SinkType,
    };
    use dispatcher::Dispatcher;
    use ingestion::{
        source_from_config, BackpressureConfig, IngestionPipeline, MockSampleConfig,
        MockSampleGenerator, MockSampleSource,
    };
    use observability::ChunkMetricsAggregator;
    use tokio::sync::mpsc;

    const SESSION_BEGIN: f64 = 1_714_564_800.0;

    fn file_sink(name: &str, dir: &Path, format: &str) -> SinkConfig {
        SinkConfig {
            name: name.to_string(),
            sink_type: SinkType::File,
            queue_capacity: 64,
            params: HashMap::from([
                ("base_path".to_string(), dir.display().to_string()),
                ("format".to_string(), format.to_string()),
            ]),
        }
    }

    fn log_sink(name: &str) -> SinkConfig {
        SinkConfig {
            name: name.to_string(),
            sink_type: SinkType::Log,
            queue_capacity: 64,
            params: HashMap::new(),
        }
    }

    fn mock_source(id: &str, rate: f64, params: MockSourceParams, start: f64) -> MockSampleSource {
        MockSampleSource::new(
            MockSampleConfig::new(id, rate)
                .with_params(params)
                .with_start_wallclock(start),
        )
    }

    /// Pull exactly `expected` events off the ingestion channel
    async fn collect_events(rx: &Receiver<SampleEvent>, expected: usize) -> Vec<SampleEvent> {
        let mut events = Vec::with_capacity(expected);
        while events.len() < expected {
            match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
                Ok(Ok(event)) => events.push(event),
                _ => break,
            }
        }
        events
    }

    /// End-to-end: two mock devices -> IngestionPipeline -> SessionChunker -> FileSink
    ///
    /// 验证：
    /// 1. 共享 session begin 时两路流的分块边界一致
    /// 2. 每个样本恰好写入一次
    /// 3. METAMOTION_R 轴向校准写到了输出文件里
    #[tokio::test]
    async fn test_e2e_mock_pipeline_to_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let limit = 1000u64;
        let params = MockSourceParams {
            sample_limit: Some(limit),
            ..Default::default()
        };
        let start = SESSION_BEGIN + 0.25;

        let mut pipeline =
            IngestionPipeline::with_config(BackpressureConfig::new(128, DropPolicy::Block));
        pipeline
            .register_source(
                "left_wrist".into(),
                Box::new(mock_source("left_wrist", 50.0, params.clone(), start)),
                None,
            )
            .unwrap();
        pipeline
            .register_source(
                "right_wrist".into(),
                Box::new(mock_source("right_wrist", 50.0, params, start)),
                None,
            )
            .unwrap();

        let mut chunker = SessionChunker::new(vec![
            ChunkerConfig::new("left_wrist", METAMOTION_R, 50.0, 10.0)
                .with_session_begin(SESSION_BEGIN),
            ChunkerConfig::new("right_wrist", "NA", 50.0, 10.0).with_session_begin(SESSION_BEGIN),
        ])
        .unwrap();

        let (chunk_tx, chunk_rx) = mpsc::channel::<Chunk>(16);
        let dispatcher =
            Dispatcher::from_configs(&[file_sink("jsonl", dir.path(), "jsonl")], chunk_rx).unwrap();
        let dispatcher_handle = dispatcher.spawn();

        pipeline.start_all();
        let rx = pipeline.take_receiver().unwrap();
        let events = collect_events(&rx, 2 * limit as usize).await;
        assert_eq!(events.len(), 2 * limit as usize);

        let mut chunks = Vec::new();
        for event in events {
            if let Some(chunk) = chunker.push(event) {
                chunks.push(chunk);
            }
        }
        chunks.extend(chunker.drain_all());

        let mut aggregator = ChunkMetricsAggregator::new();
        for chunk in &chunks {
            aggregator.update(chunk);
            chunk_tx.send(chunk.clone()).await.unwrap();
        }
        drop(chunk_tx);
        let sink_metrics = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
            .await
            .unwrap()
            .unwrap();

        // 20 s of data starting 0.25 s into the session
        let boundaries = |stream: &str| -> Vec<f64> {
            chunks
                .iter()
                .filter(|c| c.stream_id.as_str() == stream)
                .map(|c| c.boundary)
                .collect()
        };
        let expected = vec![SESSION_BEGIN, SESSION_BEGIN + 10.0, SESSION_BEGIN + 20.0];
        assert_eq!(boundaries("left_wrist"), expected);
        assert_eq!(boundaries("right_wrist"), expected);

        assert_eq!(aggregator.total_samples(), 2 * limit);
        assert_eq!(aggregator.stream("left_wrist").unwrap().chunks, 3);
        assert_eq!(sink_metrics[0].1.samples_written, 2 * limit);

        // File output: one line per sample, calibrated axes
        let left = std::fs::read_to_string(dir.path().join("left_wrist.jsonl")).unwrap();
        let right = std::fs::read_to_string(dir.path().join("right_wrist.jsonl")).unwrap();
        assert_eq!(left.lines().count(), limit as usize);
        assert_eq!(right.lines().count(), limit as usize);

        let first_left: serde_json::Value =
            serde_json::from_str(left.lines().next().unwrap()).unwrap();
        let first_right: serde_json::Value =
            serde_json::from_str(right.lines().next().unwrap()).unwrap();
        // Raw first sample is (0.0, 0.1, z); METAMOTION_R maps (x, y) -> (y, -x)
        assert!((first_left["x"].as_f64().unwrap() - 0.1).abs() < 1e-12);
        assert!(first_left["y"].as_f64().unwrap().abs() < 1e-12);
        assert!(first_right["x"].as_f64().unwrap().abs() < 1e-12);
        assert!((first_right["y"].as_f64().unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(first_left["index"], 0);
        assert_eq!(first_left["device_model"], METAMOTION_R);
        assert!((first_left["ts_loss_aware"].as_f64().unwrap() - start).abs() < 1e-6);
    }

    /// Periodic radio dropouts: every gap re-anchors the loss-aware track
    #[test]
    fn test_dropouts_reanchor_loss_aware_track() {
        let config = MockSampleConfig::new("acc", 50.0).with_params(MockSourceParams {
            dropout_every: Some(100),
            dropout_len: 10,
            sample_limit: Some(300),
            ..Default::default()
        });
        let mut chunker =
            SessionChunker::new(vec![ChunkerConfig::new("acc", "NA", 50.0, 5.0)]).unwrap();

        let mut chunks = Vec::new();
        for (_, event) in MockSampleGenerator::new(config, SESSION_BEGIN) {
            chunks.extend(chunker.push(event));
        }
        chunks.extend(chunker.drain_all());

        let stats = chunker.stats("acc").unwrap();
        assert_eq!(stats.samples_ingested, 300);
        assert_eq!(stats.reanchors, 3);
        assert_eq!(stats.late_dropped, 0);

        let samples: Vec<_> = chunks.iter().flat_map(|c| c.samples.iter()).collect();
        assert_eq!(samples.len(), 300);

        // Sample 90 is the first after the gap at positions 90..100
        let after_gap = samples[90];
        assert!((after_gap.ts_loss_aware - after_gap.ts_raw).abs() < 1e-6);
        // The drift-free grid does not know about the gap
        assert!((after_gap.ts_raw - after_gap.ts_drift_free - 10.0 * 0.02).abs() < 1e-6);
        // Before the gap the timelines agree
        assert!((samples[89].ts_loss_aware - samples[89].ts_drift_free).abs() < 1e-6);
    }

    /// Corrector decisions over one mock dropout, seen through the engine
    #[test]
    fn test_corrector_decisions_over_dropout() {
        let config = MockSampleConfig::new("acc", 50.0).with_params(MockSourceParams {
            dropout_every: Some(20),
            dropout_len: 5,
            sample_limit: Some(16),
            ..Default::default()
        });
        let mut corrector = chunk_engine::TimestampCorrector::new(50.0).unwrap();

        let decisions: Vec<_> = MockSampleGenerator::new(config, SESSION_BEGIN)
            .map(|(_, e)| corrector.correct(&e.sample, e.wallclock).decision)
            .collect();

        assert_eq!(decisions[0], LossDecision::Seeded);
        assert!(decisions[1..15]
            .iter()
            .all(|d| *d == LossDecision::Cadence));
        assert_eq!(decisions[15], LossDecision::Reanchored);
    }

    /// Replay from a recording referenced by a config file
    #[tokio::test]
    async fn test_e2e_replay_from_config() {
        let dir = tempfile::tempdir().unwrap();

        // 30 s at 20 Hz with host jitter of up to 7 ms
        let recording = dir.path().join("left.jsonl");
        let mut file = std::fs::File::create(&recording).unwrap();
        for i in 0..600u64 {
            let jitter = (i % 8) as f64 * 0.001;
            writeln!(
                file,
                r#"{{"device_epoch_ms": {}, "x": 0.0, "y": 0.0, "z": 1.0, "wallclock": {}}}"#,
                5_000.0 + i as f64 * 50.0,
                SESSION_BEGIN + 1.0 + i as f64 * 0.05 + jitter
            )
            .unwrap();
        }
        drop(file);

        let config_path = dir.path().join("session.toml");
        std::fs::write(
            &config_path,
            r#"
[session]
chunk_duration_s = 10.0
session_begin = 1714564800.0

[ingestion]
channel_capacity = 64
drop_policy = "block"

[[streams]]
id = "left_wrist"
sample_rate_hz = 20.0
[streams.source]
kind = "replay"
path = "left.jsonl"

[[sinks]]
name = "log"
sink_type = "log"
"#,
        )
        .unwrap();

        let blueprint = config_loader::ConfigLoader::load_from_path(&config_path).unwrap();
        let mut pipeline =
            IngestionPipeline::with_config(BackpressureConfig::from(&blueprint.ingestion));
        for stream in &blueprint.streams {
            let source = source_from_config(stream, None).unwrap();
            pipeline.register_source(stream.id.clone(), source, None).unwrap();
        }
        let mut chunker = SessionChunker::new(blueprint.chunker_configs().unwrap()).unwrap();

        let (chunk_tx, chunk_rx) = mpsc::channel::<Chunk>(16);
        let dispatcher =
            Dispatcher::from_configs(&[log_sink("log"), file_sink("csv", dir.path(), "csv")], chunk_rx)
                .unwrap();
        let dispatcher_handle = dispatcher.spawn();

        pipeline.start_all();
        let rx = pipeline.take_receiver().unwrap();
        let events = collect_events(&rx, 600).await;
        assert_eq!(events.len(), 600);

        let mut chunks = Vec::new();
        for event in events {
            chunks.extend(chunker.push(event));
        }
        chunks.extend(chunker.drain_all());

        for chunk in &chunks {
            chunk_tx.send(chunk.clone()).await.unwrap();
        }
        drop(chunk_tx);
        let sink_metrics = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
            .await
            .unwrap()
            .unwrap();

        // Jitter stays under two intervals: no re-anchoring, perfect cadence
        let stats = chunker.stats("left_wrist").unwrap();
        assert_eq!(stats.reanchors, 0);
        assert_eq!(stats.late_dropped, 0);

        let ids: Vec<u64> = chunks.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, (1..=chunks.len() as u64).collect::<Vec<_>>());
        assert_eq!(chunks[0].boundary, SESSION_BEGIN);
        assert_eq!(chunks.iter().map(Chunk::len).sum::<usize>(), 600);

        for (name, metrics) in &sink_metrics {
            assert_eq!(metrics.write_count, chunks.len() as u64, "sink {name}");
            assert_eq!(metrics.failure_count, 0, "sink {name}");
        }

        let csv = std::fs::read_to_string(dir.path().join("left_wrist.csv")).unwrap();
        // Header plus one row per sample
        assert_eq!(csv.lines().count(), 601);
        assert!(csv.lines().nth(1).unwrap().ends_with("2024-05-01T12:00:00Z"));
    }

    /// DropOldest keeps the newest samples when nobody is consuming
    #[tokio::test]
    async fn test_backpressure_drop_oldest_keeps_tail() {
        let mut pipeline =
            IngestionPipeline::with_config(BackpressureConfig::new(8, DropPolicy::DropOldest));
        let params = MockSourceParams {
            sample_limit: Some(100),
            ..Default::default()
        };
        pipeline
            .register_source(
                "acc".into(),
                Box::new(mock_source("acc", 50.0, params, SESSION_BEGIN)),
                None,
            )
            .unwrap();
        let rx = pipeline.take_receiver().unwrap();
        pipeline.start_all();

        for _ in 0..400 {
            if pipeline.active_sources() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(pipeline.active_sources(), 0);

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.samples_received, 100);
        assert_eq!(snapshot.samples_dropped, 92);

        let events = collect_events(&rx, 8).await;
        let first = events.first().unwrap().sample.device_epoch_ms;
        let last = events.last().unwrap().sample.device_epoch_ms;
        assert!((first - 92.0 * 20.0).abs() < 1e-9);
        assert!((last - 99.0 * 20.0).abs() < 1e-9);
    }
}
