//! 推模式会话 (Push-mode Session)
//!
//! 帧由外部传输层(WebRTC等)驱动到达, 每帧一次回调; 控制反转:
//! 标注后的帧是回调的**返回值**, 不是副作用。会话/ICE协商本身
//! 属于外部协作方, 这里只提供引导配置数据

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::annotate::Annotator;
use crate::detection::{Detector, Frame};

/// 公共STUN服务器列表 (连接协商引导, 对检测管线无语义)
pub const PUBLIC_STUN_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
    "stun:stun3.l.google.com:19302",
    "stun:stun4.l.google.com:19302",
    "stun:stun.ekiga.net",
    "stun:stun.ideasip.com",
    "stun:stun.rixtelecom.se",
    "stun:stun.schlund.de",
    "stun:stun.stunprotocol.org:3478",
    "stun:stun.voiparound.com",
    "stun:stun.voipbuster.com",
    "stun:stun.voipstunt.com",
    "stun:stun.voxgratia.org",
];

/// 单服务器变体
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// 交给外部传输层的ICE引导配置 (可序列化后注入信令/前端)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtcBootstrap {
    pub ice_servers: Vec<String>,
}

impl RtcBootstrap {
    /// 完整公共STUN列表
    pub fn full() -> Self {
        Self {
            ice_servers: PUBLIC_STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// 单STUN服务器
    pub fn minimal() -> Self {
        Self {
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }
}

/// 推模式会话
///
/// 每个传输连接一个会话; 检测器是进程级读多写少的共享资源,
/// 多个会话可在各自宿主线程上并发复用同一个已加载模型
pub struct PushSession {
    detector: Arc<Detector>,
    annotator: Arc<Annotator>,
    frames: u64,
}

impl PushSession {
    pub fn new(detector: Arc<Detector>, annotator: Arc<Annotator>) -> Self {
        Self {
            detector,
            annotator,
            frames: 0,
        }
    }

    /// 每帧回调: 检测 → 标注, 返回标注后的帧
    ///
    /// 检测失败时记录并原样返回该帧, 会话不中断
    pub fn on_frame(&mut self, mut frame: Frame) -> Frame {
        self.frames += 1;
        let detections = match self.detector.detect(&frame) {
            Ok(d) => d,
            Err(e) => {
                eprintln!("⚠️ 检测失败 (帧#{}): {}", frame.frame_id, e);
                Vec::new()
            }
        };
        self.annotator
            .annotate(&mut frame, &detections, self.detector.class_names());
        frame
    }

    /// 本会话已处理的帧数
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_variants() {
        let full = RtcBootstrap::full();
        let minimal = RtcBootstrap::minimal();
        assert!(full.ice_servers.len() > 10);
        assert!(full.ice_servers.contains(&DEFAULT_STUN_SERVER.to_string()));
        assert_eq!(minimal.ice_servers, vec![DEFAULT_STUN_SERVER.to_string()]);
    }

    #[test]
    fn test_bootstrap_serializes() {
        let json = serde_json::to_string(&RtcBootstrap::minimal()).unwrap();
        assert!(json.contains("stun:stun.l.google.com:19302"));
        let back: RtcBootstrap = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ice_servers.len(), 1);
    }
}
