//! 管线端到端测试
//!
//! 用桩模型/合成帧源驱动完整状态机, 不依赖真实摄像头与ONNX模型

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use image::{DynamicImage, RgbImage};
use ndarray::{Array, IxDyn};

use yolo_live_rs::annotate::Annotator;
use yolo_live_rs::detection::{coco_class_names, Detector, Frame};
use yolo_live_rs::input::{FrameSource, SourceError};
use yolo_live_rs::models::Model;
use yolo_live_rs::output::{DisplaySink, SinkClosed};
use yolo_live_rs::pipeline::{PipelineDriver, PipelineError, PipelineState, PushSession};
use yolo_live_rs::{Bbox, DetectionResult};

// ========== 桩模型 ==========

/// 按调用序返回预设检测的桩模型
struct ScriptModel {
    script: Vec<Vec<Bbox>>,
    call: usize,
    names: Vec<String>,
}

impl ScriptModel {
    fn new(script: Vec<Vec<Bbox>>) -> Self {
        Self {
            script,
            call: 0,
            names: coco_class_names(),
        }
    }
}

impl Model for ScriptModel {
    fn preprocess(&mut self, _images: &[DynamicImage]) -> Result<Array<f32, IxDyn>> {
        Ok(Array::zeros(IxDyn(&[0])))
    }

    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>> {
        Ok(xs)
    }

    fn postprocess(
        &self,
        _ys: Array<f32, IxDyn>,
        _images: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>> {
        Ok(vec![])
    }

    fn forward(&mut self, _images: &[DynamicImage]) -> Result<Vec<DetectionResult>> {
        let boxes = self.script.get(self.call).cloned().unwrap_or_default();
        self.call += 1;
        Ok(vec![DetectionResult::new(if boxes.is_empty() {
            None
        } else {
            Some(boxes)
        })])
    }

    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn summary(&self) {}
}

/// 检测结果由帧内容决定的桩模型 (验证确定性)
struct ContentModel {
    names: Vec<String>,
}

impl Model for ContentModel {
    fn preprocess(&mut self, _images: &[DynamicImage]) -> Result<Array<f32, IxDyn>> {
        Ok(Array::zeros(IxDyn(&[0])))
    }

    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>> {
        Ok(xs)
    }

    fn postprocess(
        &self,
        _ys: Array<f32, IxDyn>,
        _images: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>> {
        Ok(vec![])
    }

    fn forward(&mut self, images: &[DynamicImage]) -> Result<Vec<DetectionResult>> {
        // 置信度取自左上角像素红通道, 位级相同的帧必然得到相同结果
        let conf = images[0].to_rgb8().get_pixel(0, 0).0[0] as f32 / 255.0;
        let boxes = vec![Bbox::new(10.0, 10.0, 40.0, 70.0, 0, conf)];
        Ok(vec![DetectionResult::new(Some(boxes))])
    }

    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn summary(&self) {}
}

// ========== 合成帧源 / 计数输出 ==========

enum FakeStep {
    Frame(Frame),
    ReadFailure,
    Disconnected,
}

struct FakeSource {
    steps: VecDeque<FakeStep>,
    fail_open: bool,
    release_count: Arc<AtomicUsize>,
}

impl FakeSource {
    fn with_frames(n: usize) -> Self {
        let steps = (0..n)
            .map(|i| FakeStep::Frame(black_frame(i as u64)))
            .collect();
        Self {
            steps,
            fail_open: false,
            release_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing_open() -> Self {
        Self {
            steps: VecDeque::new(),
            fail_open: true,
            release_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FrameSource for FakeSource {
    fn open(&mut self) -> Result<(), SourceError> {
        if self.fail_open {
            return Err(SourceError::Unavailable("device busy".to_string()));
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        match self.steps.pop_front() {
            Some(FakeStep::Frame(frame)) => Ok(Some(frame)),
            Some(FakeStep::ReadFailure) => {
                Err(SourceError::ReadFailure("mid-stream read".to_string()))
            }
            Some(FakeStep::Disconnected) => {
                Err(SourceError::Disconnected("device unplugged".to_string()))
            }
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        self.release_count.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CountingSink {
    frames: Vec<Frame>,
}

impl DisplaySink for CountingSink {
    fn publish(&mut self, frame: Frame) -> Result<(), SinkClosed> {
        self.frames.push(frame);
        Ok(())
    }
}

fn black_frame(id: u64) -> Frame {
    Frame::new(RgbImage::new(160, 120), id)
}

fn driver_with(script: Vec<Vec<Bbox>>) -> PipelineDriver {
    let detector = Arc::new(Detector::from_model(Box::new(ScriptModel::new(script))));
    PipelineDriver::new(detector, Arc::new(Annotator::new()))
}

// ========== 场景测试 ==========

#[test]
fn scenario_a_one_detection_then_none() {
    // 帧1: 一个person检测; 帧2: 无检测 → 原样发布
    let script = vec![vec![Bbox::new(10.0, 10.0, 40.0, 70.0, 0, 0.91)], vec![]];
    let mut driver = driver_with(script);
    let mut source = FakeSource::with_frames(2);
    let mut sink = CountingSink::default();

    let report = driver.run(&mut source, &mut sink).unwrap();
    assert_eq!(report.frames_processed, 2);
    assert_eq!(report.detections_total, 1);
    assert_eq!(sink.frames.len(), 2);

    // 帧1画了框
    assert_ne!(sink.frames[0].image.get_pixel(10, 10).0, [0, 0, 0]);
    // 帧2逐字节未被修改
    assert!(sink.frames[1].image.as_raw().iter().all(|&b| b == 0));
}

#[test]
fn scenario_b_open_failure_never_runs() {
    let mut driver = driver_with(vec![]);
    let mut source = FakeSource::failing_open();
    let releases = Arc::clone(&source.release_count);
    let mut sink = CountingSink::default();

    let err = driver.run(&mut source, &mut sink).unwrap_err();
    assert!(matches!(err, PipelineError::SourceUnavailable(_)));
    assert_eq!(driver.state(), PipelineState::Stopped);
    // 从未发布任何帧, 也没有可释放的句柄
    assert!(sink.frames.is_empty());
    assert_eq!(releases.load(Ordering::SeqCst), 0);
}

#[test]
fn scenario_c_three_frames_then_end_of_stream() {
    let mut driver = driver_with(vec![]);
    let mut source = FakeSource::with_frames(3);
    let releases = Arc::clone(&source.release_count);
    let mut sink = CountingSink::default();

    let report = driver.run(&mut source, &mut sink).unwrap();
    assert_eq!(report.frames_processed, 3);
    assert_eq!(sink.frames.len(), 3);
    assert_eq!(driver.state(), PipelineState::Stopped);
    // 设备释放恰好一次
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn read_failure_is_treated_as_stream_end() {
    let mut driver = driver_with(vec![]);
    let mut source = FakeSource::with_frames(1);
    source.steps.push_back(FakeStep::ReadFailure);
    let releases = Arc::clone(&source.release_count);
    let mut sink = CountingSink::default();

    // 读失败不算致命, 已处理的帧保留
    let report = driver.run(&mut source, &mut sink).unwrap();
    assert_eq!(report.frames_processed, 1);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn disconnect_fails_pipeline_but_releases_device() {
    let mut driver = driver_with(vec![]);
    let mut source = FakeSource::with_frames(1);
    source.steps.push_back(FakeStep::Disconnected);
    let releases = Arc::clone(&source.release_count);
    let mut sink = CountingSink::default();

    let err = driver.run(&mut source, &mut sink).unwrap_err();
    assert!(matches!(err, PipelineError::SourceDisconnected(_)));
    assert_eq!(driver.state(), PipelineState::Stopped);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn malformed_detection_is_skipped_not_fatal() {
    // 宽度为负 → x2<x1, 在检测器边界被拒; 同帧其余检测照常绘制
    let script = vec![vec![
        Bbox::new(50.0, 10.0, -40.0, 70.0, 0, 0.9),
        Bbox::new(100.0, 40.0, 40.0, 60.0, 1, 0.7),
    ]];
    let mut driver = driver_with(script);
    let mut source = FakeSource::with_frames(1);
    let mut sink = CountingSink::default();

    let report = driver.run(&mut source, &mut sink).unwrap();
    assert_eq!(report.frames_processed, 1);
    assert_eq!(report.detections_total, 1);
    assert_ne!(sink.frames[0].image.get_pixel(100, 40).0, [0, 0, 0]);
}

// ========== 检测器边界 ==========

#[test]
fn detect_is_idempotent_on_identical_frames() {
    let detector = Detector::from_model(Box::new(ContentModel {
        names: coco_class_names(),
    }));

    let mut image = RgbImage::new(64, 64);
    image.get_pixel_mut(0, 0).0 = [200, 0, 0];
    let frame = Frame::new(image, 7);

    let first = detector.detect(&frame).unwrap();
    let second = detector.detect(&frame).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
}

#[test]
fn detect_quantizes_confidence_up() {
    let script = vec![vec![Bbox::new(10.0, 10.0, 40.0, 70.0, 0, 0.8734)]];
    let detector = Detector::from_model(Box::new(ScriptModel::new(script)));

    let detections = detector.detect(&black_frame(0)).unwrap();
    assert_eq!(detections.len(), 1);
    assert!((detections[0].confidence - 0.88).abs() < 1e-6);
}

// ========== 推模式 ==========

#[test]
fn push_session_returns_annotated_frame() {
    let script = vec![vec![Bbox::new(10.0, 10.0, 40.0, 70.0, 0, 0.91)], vec![]];
    let detector = Arc::new(Detector::from_model(Box::new(ScriptModel::new(script))));
    let annotator = Arc::new(Annotator::new());
    let mut session = PushSession::new(Arc::clone(&detector), Arc::clone(&annotator));

    // 标注帧是回调返回值 (控制反转), 不是副作用
    let out = session.on_frame(black_frame(0));
    assert_ne!(out.image.get_pixel(10, 10).0, [0, 0, 0]);

    // 无检测的帧原样返回
    let out = session.on_frame(black_frame(1));
    assert!(out.image.as_raw().iter().all(|&b| b == 0));
    assert_eq!(session.frames(), 2);
}

#[test]
fn push_sessions_share_one_detector() {
    // 两个会话共享同一个进程级检测器实例
    let script = vec![vec![], vec![]];
    let detector = Arc::new(Detector::from_model(Box::new(ScriptModel::new(script))));
    let annotator = Arc::new(Annotator::new());

    let mut a = PushSession::new(Arc::clone(&detector), Arc::clone(&annotator));
    let mut b = PushSession::new(Arc::clone(&detector), annotator);
    a.on_frame(black_frame(0));
    b.on_frame(black_frame(1));
    assert_eq!(a.frames(), 1);
    assert_eq!(b.frames(), 1);
}
