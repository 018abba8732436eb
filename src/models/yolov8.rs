// YOLOv8 检测模型实现
// 包含: 模型加载、letterbox预处理、推理、cxcywh解码 + NMS后处理

use anyhow::Result;
use fast_image_resize as fr;
use image::{DynamicImage, GenericImageView};
use ndarray::{s, Array, Axis, IxDyn};

use crate::config::Args;
use crate::detection::coco_class_names;
use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
use crate::{non_max_suppression, Bbox, DetectionResult};

/// YOLOv8 检测模型
pub struct YOLOv8 {
    engine: OrtBackend,
    height: u32,
    width: u32,
    nc: usize,
    conf: f32,
    iou: f32,
    names: Vec<String>,
    profile: bool,
}

impl YOLOv8 {
    /// 从配置创建模型
    pub fn new(config: &Args) -> Result<Self> {
        // execution provider
        let ep = if config.trt {
            OrtEP::Trt(config.device_id)
        } else if config.cuda {
            OrtEP::CUDA(config.device_id)
        } else {
            OrtEP::CPU
        };

        // build ort engine
        let engine = OrtBackend::build(OrtConfig {
            model_file: config.model.clone(),
            ep,
            image_size: (config.inf_size, config.inf_size),
        })?;
        let (height, width) = (engine.height(), engine.width());

        // 类别名称表: 优先模型元数据, 缺失时回退内置COCO-80
        let names = match engine.names() {
            Some(names) => names,
            None => {
                println!("⚠️ 模型元数据缺少类别表, 使用内置COCO-80");
                coco_class_names()
            }
        };
        let nc = names.len();

        Ok(Self {
            engine,
            height,
            width,
            nc,
            conf: config.conf,
            iou: config.iou,
            names,
            profile: config.profile,
        })
    }

    /// letterbox缩放比例: 保持宽高比, 不放大裁剪
    fn scale_ratio(&self, w0: f32, h0: f32) -> f32 {
        (self.width as f32 / w0).min(self.height as f32 / h0)
    }
}

impl crate::models::Model for YOLOv8 {
    fn preprocess(&mut self, images: &[DynamicImage]) -> Result<Array<f32, IxDyn>> {
        let t_pre = std::time::Instant::now();

        // letterbox: 背景填充灰值144
        let mut ys = Array::ones((
            images.len(),
            3,
            self.height as usize,
            self.width as usize,
        ))
        .into_dyn();
        ys.fill(144.0 / 255.0);

        for (idx, x) in images.iter().enumerate() {
            let rgb = x.to_rgb8();
            let (w0, h0) = rgb.dimensions();
            let r = self.scale_ratio(w0 as f32, h0 as f32);
            let w_new = ((w0 as f32 * r).round() as u32).max(1);
            let h_new = ((h0 as f32 * r).round() as u32).max(1);

            // fast_image_resize 双线性缩放
            let src = fr::images::Image::from_vec_u8(w0, h0, rgb.into_raw(), fr::PixelType::U8x3)?;
            let mut dst = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);
            let mut resizer = fr::Resizer::new();
            resizer.resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )?;

            // RGB → 归一化NCHW
            for (i, px) in dst.buffer().chunks_exact(3).enumerate() {
                let y = i / w_new as usize;
                let x_ = i % w_new as usize;
                ys[[idx, 0, y, x_]] = (px[0] as f32) / 255.0;
                ys[[idx, 1, y, x_]] = (px[1] as f32) / 255.0;
                ys[[idx, 2, y, x_]] = (px[2] as f32) / 255.0;
            }
        }

        if self.profile {
            println!("[Model Preprocess]: {:?}", t_pre.elapsed());
        }
        Ok(ys)
    }

    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>> {
        let t_run = std::time::Instant::now();
        let ys = self.engine.run(xs)?;
        if self.profile {
            println!("[Model Inference]: {:?}", t_run.elapsed());
        }
        Ok(ys)
    }

    fn postprocess(
        &self,
        ys: Array<f32, IxDyn>,
        images: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>> {
        const CXYWH_OFFSET: usize = 4;

        let mut results = Vec::new();
        for (idx, anchor) in ys.axis_iter(Axis(0)).enumerate() {
            let (w0, h0) = images[idx].dimensions();
            let width_original = w0 as f32;
            let height_original = h0 as f32;
            let ratio = self.scale_ratio(width_original, height_original);

            // 输出布局 [4+nc, anchors]: cx cy w h + 各类别分数
            let mut data: Vec<Bbox> = Vec::new();
            for pred in anchor.axis_iter(Axis(1)) {
                let bbox = pred.slice(s![0..CXYWH_OFFSET]);
                let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + self.nc]);

                let (id, &confidence) = clss
                    .into_iter()
                    .enumerate()
                    .reduce(|max, x| if x.1 > max.1 { x } else { max })
                    .unwrap();

                if confidence < self.conf {
                    continue;
                }

                // cxcywh → xywh, 还原到原图尺度并钳制到图内
                let cx = bbox[0] / ratio;
                let cy = bbox[1] / ratio;
                let w = bbox[2] / ratio;
                let h = bbox[3] / ratio;
                let x = cx - w / 2.;
                let y = cy - h / 2.;
                data.push(Bbox::new(
                    x.max(0.0f32).min(width_original),
                    y.max(0.0f32).min(height_original),
                    w,
                    h,
                    id,
                    confidence,
                ));
            }

            non_max_suppression(&mut data, self.iou);

            results.push(DetectionResult::new(if data.is_empty() {
                None
            } else {
                Some(data)
            }));
        }

        Ok(results)
    }

    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn summary(&self) {
        println!(
            "\nSummary:\n\
            > EP: {:?} {}\n\
            > Height: {}, Width: {}\n\
            > nc: {}, conf: {}, iou: {}\n\
            ",
            self.engine.ep(),
            if let OrtEP::CPU = self.engine.ep() {
                ""
            } else {
                "(May still fall back to CPU)"
            },
            self.height,
            self.width,
            self.nc,
            self.conf,
            self.iou,
        );
    }
}
