//! 检测器 (Detector)
//! 职责: 持有已加载模型, 逐帧推理并在边界上校验/量化模型输出

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use image::DynamicImage;
use once_cell::sync::OnceCell;

use super::types::{ClassNameTable, Detection, Frame};
use crate::config::Args;
use crate::models::{Model, YOLOv8};

/// 进程级检测器缓存: 模型加载昂贵, 只加载一次, 所有会话共享
static GLOBAL_DETECTOR: OnceCell<Arc<Detector>> = OnceCell::new();

/// 检测器: 模型黑盒外面的强类型边界
///
/// 内部用互斥锁串行化对模型的访问, `Arc<Detector>` 可在多个
/// 推模式会话间共享 (模型状态是进程级读多写少资源)
pub struct Detector {
    model: Mutex<Box<dyn Model>>,
    names: ClassNameTable,
    load_ms: f64,
}

impl Detector {
    /// 加载生产模型 (构建成本高, 耗时被测量并打印)
    pub fn load(args: &Args) -> Result<Self> {
        println!("🔍 加载检测模型: {}", args.model);
        let t_load = Instant::now();
        let model = YOLOv8::new(args)?;
        let load_ms = t_load.elapsed().as_secs_f64() * 1000.0;
        println!("✅ 模型加载完成 ({:.0}ms)", load_ms);
        model.summary();
        Ok(Self::with_load_ms(Box::new(model), load_ms))
    }

    /// 用任意模型实现构造 (测试注入桩模型)
    pub fn from_model(model: Box<dyn Model>) -> Self {
        Self::with_load_ms(model, 0.0)
    }

    fn with_load_ms(model: Box<dyn Model>, load_ms: f64) -> Self {
        let names = ClassNameTable::new(model.class_names().to_vec());
        Self {
            model: Mutex::new(model),
            names,
            load_ms,
        }
    }

    /// 进程级共享实例
    ///
    /// 首次调用触发加载; 并发的首次调用由OnceCell串行化,
    /// 不会重复初始化
    pub fn global(args: &Args) -> Result<Arc<Detector>> {
        GLOBAL_DETECTOR
            .get_or_try_init(|| Self::load(args).map(Arc::new))
            .cloned()
    }

    /// 单帧检测
    ///
    /// 同一帧重复调用结果一致 (确定性推理后端前提下);
    /// 不合法的模型输出在这里丢弃并记录, 不会中断整帧处理
    pub fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let images = vec![DynamicImage::ImageRgb8(frame.image.clone())];
        let results = {
            let mut model = self.model.lock().unwrap();
            model.forward(&images)?
        };

        let nc = self.names.len();
        let mut detections = Vec::new();
        for result in &results {
            if let Some(boxes) = result.bboxes() {
                for bbox in boxes {
                    match Detection::from_bbox(bbox, nc) {
                        Ok(det) => detections.push(det),
                        Err(e) => {
                            eprintln!("⚠️ 丢弃不合法检测 (帧#{}): {}", frame.frame_id, e)
                        }
                    }
                }
            }
        }
        Ok(detections)
    }

    pub fn class_names(&self) -> &ClassNameTable {
        &self.names
    }

    /// 模型加载耗时 (毫秒)
    pub fn load_ms(&self) -> f64 {
        self.load_ms
    }
}
