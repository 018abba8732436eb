/// 管线驱动 (Pipeline Driver)
///
/// 同一套 检测→标注 核心, 两种调度模型:
/// - 拉模式 (driver): 本进程控制的单线程阻塞循环, 取帧→检测→标注→发布
/// - 推模式 (push):   外部传输层逐帧回调, 标注帧作为返回值交还
pub mod driver;
pub mod push;

pub use driver::{PipelineDriver, PipelineReport};
pub use push::{PushSession, RtcBootstrap, DEFAULT_STUN_SERVER, PUBLIC_STUN_SERVERS};

use thiserror::Error;

use crate::input::SourceError;

/// 管线状态机: Idle → Running → (Draining | Failed) → Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// 未启动
    Idle,
    /// 逐帧处理中
    Running,
    /// 流结束, 释放资源中
    Draining,
    /// 不可恢复错误, 释放资源中
    Failed,
    /// 终态, 不再处理任何帧
    Stopped,
}

/// 管线致命错误
///
/// 单帧/单检测的失败不在此列, 那些原地恢复 (记录后继续)
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("视频源不可用: {0}")]
    SourceUnavailable(String),
    #[error("不支持的平台: {0}")]
    UnsupportedPlatform(String),
    #[error("视频源断开: {0}")]
    SourceDisconnected(String),
}

/// 打开阶段的源错误 → 管线错误
pub(crate) fn open_error(e: SourceError) -> PipelineError {
    match e {
        SourceError::UnsupportedPlatform(msg) => PipelineError::UnsupportedPlatform(msg),
        SourceError::Unavailable(msg)
        | SourceError::ReadFailure(msg)
        | SourceError::Disconnected(msg) => PipelineError::SourceUnavailable(msg),
    }
}

/// 运行阶段的不可恢复源错误 → 管线错误
/// (`ReadFailure`不会走到这里, 它按流结束处理)
pub(crate) fn stream_error(e: SourceError) -> PipelineError {
    match e {
        SourceError::UnsupportedPlatform(msg) => PipelineError::UnsupportedPlatform(msg),
        SourceError::Unavailable(msg)
        | SourceError::ReadFailure(msg)
        | SourceError::Disconnected(msg) => PipelineError::SourceDisconnected(msg),
    }
}
