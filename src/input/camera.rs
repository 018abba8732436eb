//! 摄像头输入模块
//!
//! 本地摄像头采集, 支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)
//! 解码帧经FrameFilter转RGB后送入有界通道, `next_frame`阻塞取帧

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame as AvFrame, Input};
use image::RgbImage;

use super::{FrameSource, SourceError};
use crate::detection::Frame;

/// 摄像头帧源
///
/// 打开时按平台拼接采集地址并请求 width×height 分辨率;
/// 设备可能不遵守请求值, 实际分辨率以到达的帧为准
pub struct CameraSource {
    device_index: usize,
    request_size: (u32, u32),
    rx: Option<Receiver<Frame>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    released: bool,
}

impl CameraSource {
    pub fn new(device_index: usize, width: u32, height: u32) -> Self {
        Self {
            device_index,
            request_size: (width, height),
            rx: None,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            released: false,
        }
    }
}

/// 按平台解析采集格式与地址
///
/// Windows的dshow需要设备名称, 其余平台用索引;
/// 无法识别的平台直接报错, 不做静默回退
fn camera_target(index: usize, name: Option<&str>) -> Result<(String, String), SourceError> {
    #[cfg(target_os = "windows")]
    {
        let name = name.ok_or_else(|| {
            SourceError::Unavailable(format!("摄像头索引{}没有对应设备", index))
        })?;
        Ok(("dshow".to_string(), format!("video={}", name)))
    }
    #[cfg(target_os = "macos")]
    {
        let _ = name;
        Ok(("avfoundation".to_string(), format!("{}", index)))
    }
    #[cfg(target_os = "linux")]
    {
        let _ = name;
        Ok(("v4l2".to_string(), format!("/dev/video{}", index)))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        let _ = name;
        Err(SourceError::UnsupportedPlatform(format!(
            "当前平台无法解析摄像头索引{}",
            index
        )))
    }
}

impl FrameSource for CameraSource {
    fn open(&mut self) -> Result<(), SourceError> {
        let devices = get_camera_devices();
        let device_name = devices
            .iter()
            .find(|(i, _)| *i == self.device_index)
            .map(|(_, n)| n.as_str());
        let (format, target) = camera_target(self.device_index, device_name)?;

        println!("📷 设备索引: {}", self.device_index);
        println!("🔗 采集地址: {} ({})", target, format);

        let (tx, rx) = crossbeam_channel::bounded(4);
        let filter = CameraFilter::new(tx, Arc::clone(&self.stop));

        // 帧处理管线: 解码帧 → RGB → 通道
        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("capture", Box::new(filter));
        let out = create_null_output().add_frame_pipeline(pipe);

        let size = format!("{}x{}", self.request_size.0, self.request_size.1);
        let input = Input::new(target)
            .set_format(format.as_str())
            .set_input_opts([("framerate", "30"), ("video_size", size.as_str())].into());

        let ctx = FfmpegContext::builder()
            .input(input)
            .output(out)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("摄像头构建失败: {}", e)))?;
        let scheduler = ctx
            .start()
            .map_err(|e| SourceError::Unavailable(format!("摄像头启动失败: {}", e)))?;

        // 后台线程等待解码循环结束 (发送端随之关闭)
        self.worker = Some(std::thread::spawn(move || {
            let _ = scheduler.wait();
            println!("📹 摄像头解码循环结束");
        }));
        self.rx = Some(rx);
        println!("✅ 摄像头连接成功, 开始采集!");
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let rx = self
            .rx
            .as_ref()
            .ok_or_else(|| SourceError::ReadFailure("帧源未打开".to_string()))?;
        match rx.recv() {
            Ok(frame) => Ok(Some(frame)),
            // 发送端关闭 = 解码循环退出 = 流结束
            Err(_) => Ok(None),
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.stop.store(true, Ordering::Relaxed);
        self.rx = None; // 丢弃缓冲中的帧
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        println!("📹 摄像头已释放");
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// 获取可用的摄像头设备列表
pub fn get_camera_devices() -> Vec<(usize, String)> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().enumerate().collect(),
        Err(e) => {
            eprintln!("⚠️ 获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}

/// 采集过滤器: YUV420P解码帧 → RGB帧 → 有界通道
///
/// 通道满时丢弃当前帧 (显示端只关心最新画面)
struct CameraFilter {
    tx: Sender<Frame>,
    stop: Arc<AtomicBool>,
    frame_id: u64,
    count: usize,
    last: Instant,
    dropped: usize,
    total: usize,
}

impl CameraFilter {
    fn new(tx: Sender<Frame>, stop: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            stop,
            frame_id: 0,
            count: 0,
            last: Instant::now(),
            dropped: 0,
            total: 0,
        }
    }
}

impl FrameFilter for CameraFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        println!("✅ 采集线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: AvFrame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<AvFrame>, String> {
        // 源已释放, 主动停掉解码循环
        if self.stop.load(Ordering::Relaxed) {
            return Err("source released".to_string());
        }

        unsafe {
            self.total += 1;

            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.dropped += 1;
                if self.total <= 10 {
                    println!("⚠️ 丢弃帧 #{}: 空帧/损坏帧", self.total);
                }
                return Ok(None);
            }

            let w = (*frame.as_ptr()).width as u32;
            let h = (*frame.as_ptr()).height as u32;
            if w == 0 || h == 0 || w > 4096 || h > 4096 {
                self.dropped += 1;
                if self.total <= 10 {
                    println!("⚠️ 丢弃帧 #{}: 非法分辨率 {}x{}", self.total, w, h);
                }
                return Ok(None);
            }

            // YUV420P平面
            let y_plane = (*frame.as_ptr()).data[0];
            let u_plane = (*frame.as_ptr()).data[1];
            let v_plane = (*frame.as_ptr()).data[2];
            let y_stride = (*frame.as_ptr()).linesize[0] as usize;
            let uv_stride = (*frame.as_ptr()).linesize[1] as usize;

            if y_plane.is_null() || u_plane.is_null() || v_plane.is_null() {
                self.dropped += 1;
                if self.total <= 10 {
                    println!("⚠️ 丢弃帧 #{}: YUV指针为空", self.total);
                }
                return Ok(None);
            }
            if y_stride < w as usize || uv_stride < (w as usize / 2) {
                self.dropped += 1;
                if self.total <= 10 {
                    println!(
                        "⚠️ 丢弃帧 #{}: 步长异常 y_stride={} uv_stride={}",
                        self.total, y_stride, uv_stride
                    );
                }
                return Ok(None);
            }

            let rgb = yuv420p_to_rgb(
                y_plane,
                u_plane,
                v_plane,
                y_stride,
                uv_stride,
                w as usize,
                h as usize,
            );
            let image = match RgbImage::from_raw(w, h, rgb) {
                Some(img) => img,
                None => {
                    self.dropped += 1;
                    return Ok(None);
                }
            };

            self.count += 1;
            let out = Frame::new(image, self.frame_id);
            self.frame_id += 1;

            // 通道满则丢弃, 不阻塞解码线程
            if self.tx.try_send(out).is_err() {
                self.dropped += 1;
            }

            // 每秒打印一次采集统计
            if self.last.elapsed().as_secs_f64() >= 1.0 {
                let fps = self.count as f64 / self.last.elapsed().as_secs_f64();
                println!(
                    "📺 采集统计: {:.1}fps | 总帧{} | 丢弃{}",
                    fps, self.total, self.dropped
                );
                self.last = Instant::now();
                self.count = 0;
            }

            Ok(Some(frame))
        }
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        println!("✅ 采集线程退出");
    }
}

/// YUV420P → RGB (BT.601整数近似)
unsafe fn yuv420p_to_rgb(
    y_plane: *const u8,
    u_plane: *const u8,
    v_plane: *const u8,
    y_stride: usize,
    uv_stride: usize,
    width: usize,
    height: usize,
) -> Vec<u8> {
    let mut out = vec![0u8; width * height * 3];
    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * y_stride;
        let uv_row = (y >> 1) * uv_stride;

        for x in 0..width {
            let y_val = *y_plane.add(y_row + x) as i32;
            let u_val = *u_plane.add(uv_row + (x >> 1)) as i32 - 128;
            let v_val = *v_plane.add(uv_row + (x >> 1)) as i32 - 128;

            out[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
            out[out_idx + 1] =
                (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
            out[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            out_idx += 3;
        }
    }
    out
}
