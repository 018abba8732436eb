//! 拉模式驱动 (Pull-mode Driver)
//!
//! 单线程阻塞循环: 取帧 → 检测 → 标注 → 发布
//! 唯一的挂起点在阻塞取帧; 取消是协作式的, 每圈循环检查停止标志

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{open_error, stream_error, PipelineError, PipelineState};
use crate::annotate::Annotator;
use crate::detection::{Detector, Frame};
use crate::input::{FrameSource, SourceError};
use crate::output::DisplaySink;

/// 一次拉模式运行的统计
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub frames_processed: u64,
    pub detections_total: u64,
}

/// 拉模式管线驱动
///
/// 一次性对象: `run` 阻塞到流结束/出错/被停止,
/// 返回时源已释放, 状态为 `Stopped`
pub struct PipelineDriver {
    detector: Arc<Detector>,
    annotator: Arc<Annotator>,
    state: PipelineState,
    stop: Arc<AtomicBool>,
}

impl PipelineDriver {
    pub fn new(detector: Arc<Detector>, annotator: Arc<Annotator>) -> Self {
        Self {
            detector,
            annotator,
            state: PipelineState::Idle,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 外部停止句柄: 置true后循环在下一个检查点退出
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// 阻塞运行管线
    ///
    /// 打开失败: `Idle → Failed → Stopped`, 从未进入 `Running`,
    /// 不发布任何帧; 流结束/显示端关闭/停止信号:
    /// `Running → Draining → Stopped`; 不可恢复源错误:
    /// `Running → Failed → Stopped`, 错误作为返回值上报宿主
    pub fn run<S, K>(
        &mut self,
        source: &mut S,
        sink: &mut K,
    ) -> Result<PipelineReport, PipelineError>
    where
        S: FrameSource,
        K: DisplaySink,
    {
        debug_assert_eq!(self.state, PipelineState::Idle);
        let mut report = PipelineReport::default();

        if let Err(e) = source.open() {
            eprintln!("❌ 帧源打开失败: {}", e);
            self.state = PipelineState::Failed;
            // 打开失败没有占用设备句柄, 无需释放
            self.state = PipelineState::Stopped;
            return Err(open_error(e));
        }

        self.state = PipelineState::Running;
        println!("🚀 管线启动 (拉模式)");

        let fatal: Option<PipelineError> = loop {
            // 协作式取消: 这里是除取帧外唯一的检查点
            if self.stop.load(Ordering::Relaxed) {
                println!("🛑 收到停止信号");
                break None;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    println!("📹 视频流结束");
                    break None;
                }
                Err(SourceError::ReadFailure(e)) => {
                    // 单帧读取失败按流结束处理, 不无限重试
                    eprintln!("⚠️ 帧读取失败, 按流结束处理: {}", e);
                    break None;
                }
                Err(e) => {
                    eprintln!("❌ 帧源错误: {}", e);
                    break Some(stream_error(e));
                }
            };

            let annotated = self.process_frame(frame, &mut report);
            if sink.publish(annotated).is_err() {
                println!("🖥️ 显示端已关闭, 管线退出");
                break None;
            }
            report.frames_processed += 1;
        };

        // 收尾: 释放源(恰好一次), 缓冲随源一起丢弃
        self.state = if fatal.is_some() {
            PipelineState::Failed
        } else {
            PipelineState::Draining
        };
        source.release();
        self.state = PipelineState::Stopped;
        println!("✅ 管线已停止 (共处理{}帧)", report.frames_processed);

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// 单帧处理: 检测失败记录后按零检测继续, 不终止管线
    fn process_frame(&self, mut frame: Frame, report: &mut PipelineReport) -> Frame {
        let detections = match self.detector.detect(&frame) {
            Ok(d) => d,
            Err(e) => {
                eprintln!("⚠️ 检测失败 (帧#{}): {}", frame.frame_id, e);
                Vec::new()
            }
        };
        report.detections_total += detections.len() as u64;
        self.annotator
            .annotate(&mut frame, &detections, self.detector.class_names());
        frame
    }
}
