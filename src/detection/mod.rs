/// 检测系统 (Detection System)
///
/// - Types:    帧/检测框/类别名称表
/// - Detector: 进程级缓存的检测器 (模型黑盒的强类型边界)
pub mod detector;
pub mod types;

pub use detector::Detector;
pub use types::{
    coco_class_names, quantize_confidence, ClassNameTable, Detection, Frame, MalformedDetection,
    CAPTURE_HEIGHT, CAPTURE_WIDTH,
};
