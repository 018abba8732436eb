//! 实时检测显示管线 (Live Detection Pipeline)
//!
//! 摄像头/推流回调 → YOLO检测 → 叠加标注 → 显示输出

pub mod annotate; // 检测框与标签叠加
pub mod config; // 运行参数
pub mod detection; // 检测系统 (帧/检测结果/检测器)
pub mod input; // 视频输入系统
pub mod models; // 模型接口与具体实现
pub mod ort_backend; // ONNX Runtime推理引擎
pub mod output; // 显示输出
pub mod pipeline; // 管线驱动 (拉模式/推模式)

pub use crate::annotate::Annotator;
pub use crate::config::Args;
pub use crate::detection::{ClassNameTable, Detection, Detector, Frame};
pub use crate::models::{Model, YOLOv8};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::pipeline::{PipelineDriver, PipelineState, PushSession};

/// 非极大值抑制: 按置信度降序, 去除重叠框
pub fn non_max_suppression(xs: &mut Vec<Bbox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence().partial_cmp(&b1.confidence()).unwrap());

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// 生成时间字符串 (用于快照文件名)
pub fn gen_time_string(delimiter: &str) -> String {
    let offset = chrono::FixedOffset::east_opt(8 * 60 * 60).unwrap(); // Beijing
    let t_now = chrono::Utc::now().with_timezone(&offset);
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

/// 模型层检测框 (xmin/ymin/width/height)
///
/// 推理后处理产生的原始框, 经 `Detector` 边界校验后转换为
/// 管线层的 [`Detection`](crate::detection::Detection) (x1y1x2y2)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bbox {
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    id: usize,
    confidence: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32, id: usize, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            id,
            confidence,
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = (self.xmin + self.width).min(another.xmin + another.width);
        let t = self.ymin.max(another.ymin);
        let b = (self.ymin + self.height).min(another.ymin + another.height);
        (r - l + 1.).max(0.) * (b - t + 1.).max(0.)
    }

    pub fn union(&self, another: &Bbox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        self.intersection_area(another) / self.union(another)
    }
}

/// 单张图片的检测结果 (模型层)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionResult {
    bboxes: Option<Vec<Bbox>>,
}

impl DetectionResult {
    pub fn new(bboxes: Option<Vec<Bbox>>) -> Self {
        Self { bboxes }
    }

    pub fn bboxes(&self) -> Option<&Vec<Bbox>> {
        self.bboxes.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nms_keeps_highest_confidence() {
        let mut boxes = vec![
            Bbox::new(10.0, 10.0, 100.0, 100.0, 0, 0.6),
            Bbox::new(12.0, 12.0, 100.0, 100.0, 0, 0.9), // 与上框高度重叠
            Bbox::new(300.0, 300.0, 50.0, 50.0, 1, 0.5),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].confidence(), 0.9);
        assert_eq!(boxes[1].id(), 1);
    }

    #[test]
    fn test_bbox_iou_identical() {
        let a = Bbox::new(0.0, 0.0, 10.0, 10.0, 0, 1.0);
        let b = a.clone();
        assert!((a.iou(&b) - 1.0).abs() < 1e-6);
    }
}
