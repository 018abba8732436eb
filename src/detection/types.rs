/// 检测系统数据结构定义
/// Data structures for the detection pipeline
use image::RgbImage;
use thiserror::Error;

use crate::Bbox;

// ========== 公共常量 ==========

/// 默认请求采集分辨率
pub const CAPTURE_WIDTH: u32 = 1280;
pub const CAPTURE_HEIGHT: u32 = 720;

// ========== 数据结构 ==========

/// 管线中流动的一帧图像
///
/// 所有权沿管线逐级转移, 同一时刻只有一个阶段持有并可变访问
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RgbImage,
    /// 帧序号
    pub frame_id: u64,
}

impl Frame {
    pub fn new(image: RgbImage, frame_id: u64) -> Self {
        Self { image, frame_id }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// 检测框 (管线层)
///
/// 经过检测器边界校验: x1<x2, y1<y2, class_id在类别表内,
/// 置信度已按0.01粒度向上取整
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: u32,
    pub confidence: f32,
}

/// 模型输出在边界校验时的拒绝原因
#[derive(Debug, Error)]
pub enum MalformedDetection {
    #[error("坐标含非有限值")]
    NonFinite,
    #[error("退化框: ({x1},{y1})-({x2},{y2})")]
    DegenerateBox { x1: f32, y1: f32, x2: f32, y2: f32 },
    #[error("置信度越界: {0}")]
    ConfidenceOutOfRange(f32),
    #[error("类别索引越界: {0} (nc={1})")]
    ClassOutOfRange(usize, usize),
}

impl Detection {
    /// 模型层 [`Bbox`] → 管线层 [`Detection`]
    ///
    /// 在检测器边界完成几何/类别/置信度校验与置信度量化,
    /// 不合法的结果在这里拒绝, 不会流入标注阶段
    pub fn from_bbox(bbox: &Bbox, nc: usize) -> Result<Self, MalformedDetection> {
        let (x1, y1) = (bbox.xmin(), bbox.ymin());
        let (x2, y2) = (bbox.xmax(), bbox.ymax());

        if !(x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite()) {
            return Err(MalformedDetection::NonFinite);
        }
        if x2 <= x1 || y2 <= y1 {
            return Err(MalformedDetection::DegenerateBox { x1, y1, x2, y2 });
        }
        let raw_conf = bbox.confidence();
        if !(0.0..=1.0).contains(&raw_conf) {
            return Err(MalformedDetection::ConfidenceOutOfRange(raw_conf));
        }
        if bbox.id() >= nc {
            return Err(MalformedDetection::ClassOutOfRange(bbox.id(), nc));
        }

        Ok(Self {
            x1,
            y1,
            x2,
            y2,
            class_id: bbox.id() as u32,
            confidence: quantize_confidence(raw_conf),
        })
    }

    /// 几何是否可绘制 (标注阶段对手工构造的检测再查一次)
    pub fn has_valid_geometry(&self) -> bool {
        self.x1.is_finite()
            && self.y1.is_finite()
            && self.x2.is_finite()
            && self.y2.is_finite()
            && self.x2 > self.x1
            && self.y2 > self.y1
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// 置信度按0.01粒度向上取整 (ceil), 用于展示
///
/// 在f64域计算并先减去一个远小于格距的余量, 否则f32噪声会把
/// 恰好落在格点上的值(如0.80)顶进下一格
pub fn quantize_confidence(conf: f32) -> f32 {
    (((conf as f64) * 100.0 - 1e-4).ceil() / 100.0) as f32
}

// ========== 类别名称表 ==========

/// 类别名称表: 类别ID → 可读标签
///
/// 检测器初始化时加载一次, 进程生命周期内只读
#[derive(Clone, Debug)]
pub struct ClassNameTable {
    names: Vec<String>,
}

impl ClassNameTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// 内置COCO-80类别表 (模型元数据缺失时的回退)
    pub fn coco() -> Self {
        Self::new(coco_class_names())
    }

    pub fn get(&self, class_id: u32) -> &str {
        self.names
            .get(class_id as usize)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// COCO-80类别名称
pub fn coco_class_names() -> Vec<String> {
    COCO_NAMES.iter().map(|s| s.to_string()).collect()
}

const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_rounds_up() {
        assert!((quantize_confidence(0.8734) - 0.88).abs() < 1e-6);
        assert!((quantize_confidence(0.001) - 0.01).abs() < 1e-6);
        assert!((quantize_confidence(0.9999) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_quantize_exact_values_stay() {
        // 恰好落在格点上的值不被f32噪声顶进下一格
        assert!((quantize_confidence(0.80) - 0.80).abs() < 1e-6);
        assert!((quantize_confidence(0.25) - 0.25).abs() < 1e-6);
        assert!((quantize_confidence(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_bbox_valid() {
        let bbox = Bbox::new(10.0, 10.0, 40.0, 70.0, 0, 0.91);
        let det = Detection::from_bbox(&bbox, 80).unwrap();
        assert_eq!(det.class_id, 0);
        assert_eq!(det.x2, 50.0);
        assert_eq!(det.y2, 80.0);
        assert!((det.confidence - 0.91).abs() < 1e-6);
    }

    #[test]
    fn test_from_bbox_rejects_degenerate() {
        let bbox = Bbox::new(10.0, 10.0, -5.0, 70.0, 0, 0.9);
        assert!(matches!(
            Detection::from_bbox(&bbox, 80),
            Err(MalformedDetection::DegenerateBox { .. })
        ));
    }

    #[test]
    fn test_from_bbox_rejects_bad_class() {
        let bbox = Bbox::new(10.0, 10.0, 40.0, 70.0, 99, 0.9);
        assert!(matches!(
            Detection::from_bbox(&bbox, 80),
            Err(MalformedDetection::ClassOutOfRange(99, 80))
        ));
    }

    #[test]
    fn test_class_table_lookup() {
        let table = ClassNameTable::coco();
        assert_eq!(table.len(), 80);
        assert_eq!(table.get(0), "person");
        assert_eq!(table.get(39), "bottle");
        assert_eq!(table.get(200), "unknown");
    }
}
