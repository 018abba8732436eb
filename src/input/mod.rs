/// 视频输入系统 (Video Input System)
///
/// - FrameSource:  拉模式帧源抽象 (打开/取帧/释放)
/// - CameraSource: 本地摄像头 (DirectShow/AVFoundation/V4L2)
pub mod camera;

pub use camera::{get_camera_devices, CameraSource};

use thiserror::Error;

use crate::detection::Frame;

/// 帧源错误
#[derive(Debug, Error)]
pub enum SourceError {
    /// 设备无法打开 (被占用/不存在)
    #[error("视频源不可用: {0}")]
    Unavailable(String),
    /// 平台/摄像头索引无法解析为采集地址
    #[error("不支持的平台: {0}")]
    UnsupportedPlatform(String),
    /// 单帧读取失败 (管线按流结束处理, 不无限重试)
    #[error("帧读取失败: {0}")]
    ReadFailure(String),
    /// 设备中途断开 (不可恢复)
    #[error("视频源断开: {0}")]
    Disconnected(String),
}

/// 拉模式帧源
///
/// `next_frame` 阻塞到有帧可用, `Ok(None)` 表示流结束;
/// `release` 由管线在任意退出路径上恰好调用一次
pub trait FrameSource {
    fn open(&mut self) -> Result<(), SourceError>;
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
    fn release(&mut self);
}
