//! 标注叠加模块 (Annotation Overlay)
//!
//! 在帧上就地绘制检测框与 `"<类别> <置信度>"` 标签;
//! 标签锚点(左下)钳制到 (max(0,x1), max(35,y1)), 贴边框的标签不会画出画面

use std::io::Read;
use std::path::PathBuf;

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Result};
use image::Rgb;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detection::{ClassNameTable, Detection, Frame};

/// 标签锚点钳制: 左下角锚点, 不允许越过左/上边缘
pub fn label_anchor(x1: f32, y1: f32) -> (i32, i32) {
    (x1.max(0.0) as i32, y1.max(35.0) as i32)
}

/// 标签文本: `"<类别> <置信度>"`, 置信度为量化后的值按十进制原样输出
pub fn format_label(class_name: &str, confidence: f32) -> String {
    format!("{} {}", class_name, confidence)
}

/// 标签字体: 本地缓存目录查找, 不存在时下载一次
pub fn check_font(name: &str) -> Result<Vec<u8>> {
    let font_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("yolo-live-rs")
        .join("fonts");
    let path = font_dir.join(name);

    if !path.exists() {
        std::fs::create_dir_all(&font_dir)?;
        let url = format!("https://ultralytics.com/assets/{}", name);
        println!("⏬ 字体不存在, 正在下载: {}", url);
        let resp = ureq::get(&url).call()?;
        let mut buf = Vec::new();
        resp.into_reader().read_to_end(&mut buf)?;
        std::fs::write(&path, &buf)?;
        println!("✅ 字体已缓存: {}", path.display());
    }

    Ok(std::fs::read(&path)?)
}

/// 标注器: 框 + 标签, 就地修改帧
pub struct Annotator {
    font: Option<FontVec>,
    font_scale: f32,
    palette: Vec<(u8, u8, u8)>,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator {
    /// 无字体标注器: 只画框不画标签文字
    pub fn new() -> Self {
        Self {
            font: None,
            font_scale: 22.0,
            palette: bright_palette(),
        }
    }

    /// 带标签字体的标注器 (字体按需下载并缓存)
    pub fn with_font(font_name: &str) -> Result<Self> {
        let bytes = check_font(font_name)?;
        let font = FontVec::try_from_vec(bytes).map_err(|e| anyhow!("字体解析失败: {e}"))?;
        Ok(Self {
            font: Some(font),
            font_scale: 22.0,
            palette: bright_palette(),
        })
    }

    fn color_for(&self, class_id: u32) -> Rgb<u8> {
        let (r, g, b) = self.palette[class_id as usize % self.palette.len()];
        Rgb([r, g, b])
    }

    /// 就地叠加全部检测结果
    ///
    /// 几何不合法的检测跳过并记录, 同帧其余检测照常绘制
    pub fn annotate(&self, frame: &mut Frame, detections: &[Detection], names: &ClassNameTable) {
        for det in detections {
            if !det.has_valid_geometry() {
                eprintln!(
                    "⚠️ 跳过不可绘制检测 (帧#{}): ({},{})-({},{})",
                    frame.frame_id, det.x1, det.y1, det.x2, det.y2
                );
                continue;
            }
            self.draw_box(frame, det);
            self.draw_label(frame, det, names.get(det.class_id));
        }
    }

    /// 两圈空心矩形, 2px可见边框
    fn draw_box(&self, frame: &mut Frame, det: &Detection) {
        let color = self.color_for(det.class_id);
        let (x, y) = (det.x1 as i32, det.y1 as i32);
        let (w, h) = (det.width() as u32, det.height() as u32);

        for t in 0..2u32 {
            if w <= 2 * t || h <= 2 * t {
                break;
            }
            let rect = Rect::at(x + t as i32, y + t as i32).of_size(w - 2 * t, h - 2 * t);
            draw_hollow_rect_mut(&mut frame.image, rect, color);
        }
    }

    /// 标签: 类别色底 + 白字, 锚点为文本左下角
    fn draw_label(&self, frame: &mut Frame, det: &Detection, class_name: &str) {
        let font = match &self.font {
            Some(f) => f,
            None => return, // 无字体只画框
        };

        let label = format_label(class_name, det.confidence);
        let (ax, ay) = label_anchor(det.x1, det.y1);
        let scale = PxScale::from(self.font_scale);
        let (tw, th) = text_size(scale, font, &label);
        let (tw, th) = (tw as i32, th as i32);
        let pad = 3i32;

        let bg = Rect::at(ax, ay - th - 2 * pad).of_size((tw + 2 * pad) as u32, (th + 2 * pad) as u32);
        draw_filled_rect_mut(&mut frame.image, bg, self.color_for(det.class_id));
        draw_text_mut(
            &mut frame.image,
            Rgb([255, 255, 255]),
            ax + pad,
            ay - th - pad,
            scale,
            font,
            &label,
        );
    }
}

/// 高对比色盘 (按类别ID取模)
fn bright_palette() -> Vec<(u8, u8, u8)> {
    vec![
        (255, 0, 0),     // 红色
        (0, 255, 0),     // 绿色
        (0, 0, 255),     // 蓝色
        (255, 255, 0),   // 黄色
        (255, 0, 255),   // 品红
        (0, 255, 255),   // 青色
        (255, 128, 0),   // 橙色
        (255, 0, 128),   // 粉红
        (128, 255, 0),   // 黄绿
        (0, 128, 255),   // 天蓝
        (255, 255, 255), // 白色
        (128, 0, 255),   // 紫色
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_label_anchor_clamp() {
        // 越过左/上边缘的框, 锚点被钳回画面内
        assert_eq!(label_anchor(-5.0, 2.0), (0, 35));
        assert_eq!(label_anchor(100.0, 10.0), (100, 35));
        assert_eq!(label_anchor(100.0, 200.0), (100, 200));
    }

    #[test]
    fn test_format_label_plain_decimal() {
        assert_eq!(format_label("person", 0.88), "person 0.88");
        assert_eq!(format_label("person", 0.8), "person 0.8");
    }

    #[test]
    fn test_annotate_draws_box_without_font() {
        let mut frame = Frame::new(RgbImage::new(160, 120), 0);
        let det = Detection {
            x1: 10.0,
            y1: 10.0,
            x2: 50.0,
            y2: 80.0,
            class_id: 0,
            confidence: 0.91,
        };
        let annotator = Annotator::new();
        annotator.annotate(&mut frame, &[det], &ClassNameTable::coco());

        // 框边上有非黑像素, 框内部未被填充
        assert_ne!(frame.image.get_pixel(10, 10).0, [0, 0, 0]);
        assert_ne!(frame.image.get_pixel(49, 79).0, [0, 0, 0]);
        assert_eq!(frame.image.get_pixel(30, 45).0, [0, 0, 0]);
    }

    #[test]
    fn test_annotate_skips_invalid_geometry() {
        let mut frame = Frame::new(RgbImage::new(160, 120), 0);
        let bad = Detection {
            x1: 50.0,
            y1: 10.0,
            x2: 10.0, // x2 < x1
            y2: 80.0,
            class_id: 0,
            confidence: 0.9,
        };
        let good = Detection {
            x1: 100.0,
            y1: 40.0,
            x2: 140.0,
            y2: 100.0,
            class_id: 1,
            confidence: 0.7,
        };
        let annotator = Annotator::new();
        annotator.annotate(&mut frame, &[bad, good], &ClassNameTable::coco());

        // 合法检测仍被绘制
        assert_ne!(frame.image.get_pixel(100, 40).0, [0, 0, 0]);
    }
}
