//! 运行参数 (Runtime Arguments)

use clap::Parser;

/// 实时检测管线参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "实时目标检测显示管线", long_about = None)]
pub struct Args {
    /// ONNX检测模型路径
    #[arg(long, default_value = "models/yolov8n.onnx")]
    pub model: String,

    /// 摄像头设备索引
    #[arg(long, default_value_t = 0)]
    pub camera_index: usize,

    /// 请求采集宽度 (设备可能不遵守)
    #[arg(long, default_value_t = crate::detection::CAPTURE_WIDTH)]
    pub width: u32,

    /// 请求采集高度 (设备可能不遵守)
    #[arg(long, default_value_t = crate::detection::CAPTURE_HEIGHT)]
    pub height: u32,

    /// 推理输入尺寸 (正方形)
    #[arg(long, default_value_t = 640)]
    pub inf_size: u32,

    /// 置信度阈值
    #[arg(long, default_value_t = 0.25)]
    pub conf: f32,

    /// NMS IoU阈值
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// 使用CUDA推理
    #[arg(long)]
    pub cuda: bool,

    /// 使用TensorRT推理
    #[arg(long)]
    pub trt: bool,

    /// GPU设备ID
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// 标签字体名称 (不存在时自动下载)
    #[arg(long, default_value = "Arial.ttf")]
    pub font: String,

    /// 打印各阶段耗时
    #[arg(long)]
    pub profile: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self::parse_from(["yolo-live"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::default();
        assert_eq!(args.width, 1280);
        assert_eq!(args.height, 720);
        assert_eq!(args.inf_size, 640);
        assert!(!args.cuda);
    }
}
