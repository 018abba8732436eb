/// 模型统一接口与实现
///
/// ## Model Trait
/// 统一的模型接口，定义标准流程: preprocess → run → postprocess
///
/// 检测器([`crate::detection::Detector`])只依赖这个trait, 推理引擎
/// 对管线而言是黑盒; 生产实现为 `YOLOv8` (ONNX Runtime),
/// 测试可用桩实现替换
use anyhow::Result;
use image::DynamicImage;
use ndarray::{Array, IxDyn};

use crate::DetectionResult;

/// 统一的检测模型接口
///
/// ## 核心流程
/// ```text
/// 原始图片 → preprocess → ndarray张量
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → 检测结果
/// ```
pub trait Model: Send {
    /// 预处理: 图片 → NCHW f32张量
    fn preprocess(&mut self, images: &[DynamicImage]) -> Result<Array<f32, IxDyn>>;

    /// 推理: 执行模型前向传播
    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>>;

    /// 后处理: 原始输出 → 检测结果 (坐标已还原到原图尺度)
    fn postprocess(
        &self,
        ys: Array<f32, IxDyn>,
        images: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>>;

    /// 完整的推理流程: preprocess → run → postprocess
    ///
    /// 默认实现调用上面三个方法, 实现者可重写以优化性能
    fn forward(&mut self, images: &[DynamicImage]) -> Result<Vec<DetectionResult>> {
        let xs = self.preprocess(images)?;
        let ys = self.run(xs)?;
        self.postprocess(ys, images)
    }

    /// 类别名称表 (类别ID → 可读标签)
    fn class_names(&self) -> &[String];

    /// 打印模型信息
    fn summary(&self);
}

pub mod yolov8;

pub use yolov8::YOLOv8;
