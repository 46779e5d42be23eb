//! Ingestion 错误类型

use contracts::ContractError;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 同一 stream 重复注册数据源
    #[error("stream {stream_id} already has a registered source")]
    DuplicateSource { stream_id: String },

    /// 通道已关闭
    #[error("channel closed for stream {stream_id}")]
    ChannelClosed { stream_id: String },

    /// 数据源构建失败 (回放文件缺失或损坏等)
    #[error(transparent)]
    Source(#[from] ContractError),
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
