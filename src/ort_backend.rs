//! ONNX Runtime推理引擎封装
//!
//! 会话构建(CPU/CUDA/TensorRT) + 输入形状探测 + 模型元数据读取

use anyhow::{anyhow, Result};
use ndarray::{Array, IxDyn};
use ort::{
    CUDAExecutionProvider, ExecutionProvider, GraphOptimizationLevel, Session,
    TensorRTExecutionProvider, ValueType,
};
use regex::Regex;

/// 推理执行后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

/// 引擎构建配置
#[derive(Debug, Clone)]
pub struct OrtConfig {
    /// ONNX模型文件路径
    pub model_file: String,
    pub ep: OrtEP,
    /// 输入为动态形状时的回退尺寸 (height, width)
    pub image_size: (u32, u32),
}

/// ONNX Runtime会话封装
pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    height: u32,
    width: u32,
    input_name: String,
    output_name: String,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        ort::init().commit()?;

        let builder =
            Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

        // 按配置注册执行后端, 不可用时回退CPU
        let mut ep = config.ep;
        let builder = match config.ep {
            OrtEP::CUDA(device_id) => {
                let cuda = CUDAExecutionProvider::default().with_device_id(device_id);
                if cuda.is_available()? {
                    builder.with_execution_providers([cuda.build()])?
                } else {
                    eprintln!("⚠️ CUDA不可用, 回退CPU推理");
                    ep = OrtEP::CPU;
                    builder
                }
            }
            OrtEP::Trt(device_id) => {
                let trt = TensorRTExecutionProvider::default().with_device_id(device_id);
                if trt.is_available()? {
                    builder.with_execution_providers([trt.build()])?
                } else {
                    eprintln!("⚠️ TensorRT不可用, 回退CPU推理");
                    ep = OrtEP::CPU;
                    builder
                }
            }
            OrtEP::CPU => builder,
        };

        let session = builder.commit_from_file(&config.model_file)?;

        // 输入输出名称
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| anyhow!("模型没有输入节点"))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| anyhow!("模型没有输出节点"))?;

        // 输入形状 NCHW, 动态维度(-1)回退到配置尺寸
        let (mut height, mut width) = config.image_size;
        if let ValueType::Tensor { dimensions, .. } = &session.inputs[0].input_type {
            if dimensions.len() == 4 {
                if dimensions[2] > 0 {
                    height = dimensions[2] as u32;
                }
                if dimensions[3] > 0 {
                    width = dimensions[3] as u32;
                }
            }
        }

        Ok(Self {
            session,
            ep,
            height,
            width,
            input_name,
            output_name,
        })
    }

    /// 前向推理: NCHW f32张量 → 原始输出张量
    pub fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>> {
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => xs.view()]?)?;
        let ys = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()?
            .view()
            .to_owned();
        Ok(ys.into_dyn())
    }

    fn fetch_from_metadata(&self, key: &str) -> Option<String> {
        let metadata = self.session.metadata().ok()?;
        metadata.custom(key).ok()?
    }

    /// 从模型元数据解析类别名称表
    ///
    /// ultralytics导出的ONNX在`names`键里存了python字典字符串,
    /// 形如 `{0: 'person', 1: 'bicycle', ...}`
    pub fn names(&self) -> Option<Vec<String>> {
        let raw = self.fetch_from_metadata("names")?;
        let re = Regex::new(r#"(['"])([-()\w '"]+)(['"])"#).ok()?;
        let names: Vec<String> = re
            .captures_iter(&raw)
            .map(|caps| caps[2].to_string())
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names)
        }
    }

    pub fn ep(&self) -> OrtEP {
        self.ep
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }
}
