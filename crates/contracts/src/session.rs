//! SessionBlueprint - Config Loader 输出
//!
//! 描述完整的采集会话：分块策略、设备流、数据源、输出路由。

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::{ChunkerConfig, ContractError, StreamId};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的会话配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 会话设置
    pub session: SessionConfig,

    /// 采集通道设置
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// 设备流列表
    pub streams: Vec<StreamConfig>,

    /// 输出路由配置
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// 会话设置：分块时长与共享起点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 会话名称
    #[serde(default = "default_session_name")]
    pub name: String,

    /// 分块时长 (秒)，必须 > 0
    #[serde(default = "default_chunk_duration")]
    pub chunk_duration_s: f64,

    /// 多设备共享的会话起点 (可选)
    #[serde(default)]
    pub session_begin: Option<SessionBegin>,
}

fn default_session_name() -> String {
    "session".to_string()
}

fn default_chunk_duration() -> f64 {
    10.0
}

/// 会话起点：Unix 秒，或时间字符串
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionBegin {
    /// 秒 (Unix epoch)
    Epoch(f64),
    /// RFC 3339 或 "YYYY-MM-DD HH:MM:SS" (UTC)
    Timestamp(String),
}

impl SessionBegin {
    /// 转换为整秒 Unix 时间 (向下取整)
    pub fn epoch_seconds(&self) -> Result<f64, ContractError> {
        let seconds = match self {
            Self::Epoch(value) => *value,
            Self::Timestamp(text) => parse_timestamp(text)?,
        };
        if !seconds.is_finite() {
            return Err(ContractError::config_validation(
                "session.session_begin",
                format!("session begin must be finite, got {seconds}"),
            ));
        }
        Ok(seconds.floor())
    }
}

fn parse_timestamp(text: &str) -> Result<f64, ContractError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.timestamp_millis() as f64 / 1000.0);
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc().timestamp_millis() as f64 / 1000.0)
        .map_err(|e| ContractError::ConfigParse {
            message: format!("invalid session_begin '{text}'"),
            source: Some(Box::new(e)),
        })
}

/// 采集通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// 通道容量
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// 丢包策略
    #[serde(default)]
    pub drop_policy: DropPolicy,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            drop_policy: DropPolicy::default(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1024
}

/// 丢包策略 (背压满时)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// 丢弃最旧的包
    DropOldest,
    /// 丢弃最新的包
    #[default]
    DropNewest,
    /// 阻塞数据源线程直到有空位 (回放/离线场景，不丢包)
    Block,
}

/// 设备流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// 唯一标识符
    pub id: StreamId,

    /// 设备地址 (MAC)，仅用于展示
    #[serde(default)]
    pub address: Option<String>,

    /// 设备型号 (轴向校准查表键)
    #[serde(default = "default_device_model")]
    pub device_model: String,

    /// 采样率 (Hz)，必须 > 0
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: f64,

    /// 加速度量程 (g)
    #[serde(default = "default_grange")]
    pub grange_g: u8,

    /// 数据源
    pub source: SourceConfig,
}

fn default_device_model() -> String {
    "NA".to_string()
}

fn default_sample_rate() -> f64 {
    50.0
}

fn default_grange() -> u8 {
    8
}

/// 数据源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// 合成数据
    Mock(MockSourceParams),
    /// 录制回放
    Replay(ReplaySourceParams),
}

/// 合成数据源参数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockSourceParams {
    /// 主机接收时间抖动 (毫秒, 均匀分布 ±)
    #[serde(default)]
    pub jitter_ms: f64,

    /// 设备时钟漂移 (ppm)
    #[serde(default)]
    pub drift_ppm: f64,

    /// 每隔多少个样本发生一次丢包
    #[serde(default)]
    pub dropout_every: Option<u64>,

    /// 每次丢包的样本数
    #[serde(default)]
    pub dropout_len: u64,

    /// 样本总数上限
    #[serde(default)]
    pub sample_limit: Option<u64>,

    /// 随机种子
    #[serde(default)]
    pub seed: u64,

    /// true = 按采样率实时发送；false = 虚拟时钟，尽快发送
    #[serde(default)]
    pub realtime: bool,
}

/// 回放数据源参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySourceParams {
    /// JSON Lines 录制文件
    pub path: PathBuf,

    /// 回放速度倍率 (0 = 不限速)
    #[serde(default)]
    pub speed: f64,
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 文件输出
    File,
}

impl SessionBlueprint {
    /// 解析共享会话起点
    pub fn session_begin_epoch(&self) -> Result<Option<f64>, ContractError> {
        self.session
            .session_begin
            .as_ref()
            .map(SessionBegin::epoch_seconds)
            .transpose()
    }

    /// 为单个设备流构建 ChunkerConfig
    pub fn chunker_config(&self, stream: &StreamConfig) -> Result<ChunkerConfig, ContractError> {
        let mut config = ChunkerConfig::new(
            stream.id.clone(),
            stream.device_model.clone(),
            stream.sample_rate_hz,
            self.session.chunk_duration_s,
        );
        config.session_begin = self.session_begin_epoch()?;
        Ok(config)
    }

    /// 所有设备流的 ChunkerConfig
    pub fn chunker_configs(&self) -> Result<Vec<ChunkerConfig>, ContractError> {
        self.streams
            .iter()
            .map(|stream| self.chunker_config(stream))
            .collect()
    }

    /// 按 ID 查找设备流
    pub fn find_stream(&self, stream_id: &str) -> Option<&StreamConfig> {
        self.streams.iter().find(|s| s.id.as_str() == stream_id)
    }
}
