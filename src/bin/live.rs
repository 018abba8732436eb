//! 实时检测显示程序 (Live Detection Viewer)
//!
//! 线程结构:
//! - 管线线程: 摄像头采集 → 检测 → 标注 → 通道
//! - 主线程:   macroquad渲染循环 (扮演显示协作方)

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use macroquad::prelude::*;
use mimalloc::MiMalloc;

use yolo_live_rs::annotate::Annotator;
use yolo_live_rs::detection::{Detector, Frame};
use yolo_live_rs::gen_time_string;
use yolo_live_rs::input::CameraSource;
use yolo_live_rs::output::ChannelSink;
use yolo_live_rs::pipeline::PipelineDriver;
use yolo_live_rs::Args;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn window_conf() -> Conf {
    Conf {
        window_title: "实时目标检测 (Live Detection)".to_owned(),
        window_width: 1280,
        window_height: 720,
        window_resizable: true,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    let args = Args::parse();

    println!("🚀 实时检测管线启动");
    println!("📦 检测模型: {}", args.model);
    println!(
        "📷 摄像头索引: {} (请求 {}x{})",
        args.camera_index, args.width, args.height
    );
    println!();

    // 进程级检测器: 首次调用加载并缓存
    let detector = match Detector::global(&args) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("❌ 检测器初始化失败: {}", e);
            return;
        }
    };

    // 标签字体按需下载; 拿不到字体时降级为只画框
    let annotator = match Annotator::with_font(&args.font) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            eprintln!("⚠️ 字体加载失败, 标签降级为只画框: {}", e);
            Arc::new(Annotator::new())
        }
    };

    let (mut sink, rx) = ChannelSink::new(4);
    let mut driver = PipelineDriver::new(detector, annotator);
    let stop = driver.stop_handle();

    // ========== 管线线程 ==========
    let camera_args = args.clone();
    let pipeline = std::thread::spawn(move || {
        let mut source = CameraSource::new(
            camera_args.camera_index,
            camera_args.width,
            camera_args.height,
        );
        match driver.run(&mut source, &mut sink) {
            Ok(report) => println!(
                "📊 运行统计: {}帧 / {}个检测",
                report.frames_processed, report.detections_total
            ),
            Err(e) => eprintln!("❌ 管线失败: {}", e),
        }
    });

    // ========== 主线程: 渲染循环 ==========
    let mut texture: Option<Texture2D> = None;
    let mut last_frame: Option<Frame> = None;
    let mut render_count = 0u64;
    let mut render_last = Instant::now();
    let mut render_fps = 0.0f64;

    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }

        // 只保留最新一帧, 丢弃积压
        if let Some(frame) = rx.try_iter().last() {
            let (w, h) = (frame.width(), frame.height());
            let rgba = rgb_to_rgba(&frame.image);

            // 只在分辨率变化时重建纹理, 否则原地更新像素
            let needs_rebuild = texture
                .as_ref()
                .map_or(true, |t| t.width() != w as f32 || t.height() != h as f32);
            if needs_rebuild {
                let t = Texture2D::from_rgba8(w as u16, h as u16, &rgba);
                t.set_filter(FilterMode::Linear);
                texture = Some(t);
            } else if let Some(t) = &texture {
                t.update(&Image {
                    bytes: rgba,
                    width: w as u16,
                    height: h as u16,
                });
            }
            last_frame = Some(frame);
        }

        clear_background(BLACK);
        if let Some(t) = &texture {
            // 等比缩放居中
            let scale = (screen_width() / t.width()).min(screen_height() / t.height());
            let (dw, dh) = (t.width() * scale, t.height() * scale);
            draw_texture_ex(
                t,
                (screen_width() - dw) / 2.0,
                (screen_height() - dh) / 2.0,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(dw, dh)),
                    ..Default::default()
                },
            );
        } else {
            draw_text("等待摄像头画面...", 20.0, 40.0, 30.0, WHITE);
        }

        // S键保存当前标注帧快照
        if is_key_pressed(KeyCode::S) {
            if let Some(frame) = &last_frame {
                let _ = std::fs::create_dir_all("runs");
                let path = format!("runs/{}.png", gen_time_string("-"));
                match frame.image.save(&path) {
                    Ok(_) => println!("📸 快照已保存: {}", path),
                    Err(e) => eprintln!("⚠️ 快照保存失败: {}", e),
                }
            }
        }

        // 渲染FPS统计
        render_count += 1;
        if render_last.elapsed().as_secs() >= 1 {
            render_fps = render_count as f64 / render_last.elapsed().as_secs_f64();
            render_count = 0;
            render_last = Instant::now();
        }
        draw_text(
            &format!("render: {:.1}fps", render_fps),
            10.0,
            screen_height() - 10.0,
            20.0,
            GREEN,
        );

        next_frame().await;
    }

    // 协作式停止: 置标志 + 关闭显示端, 等管线收尾
    println!("🛑 窗口关闭, 停止管线...");
    stop.store(true, Ordering::Relaxed);
    drop(rx);
    let _ = pipeline.join();
}

/// RGB帧 → RGBA纹理数据
fn rgb_to_rgba(img: &image::RgbImage) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(img.as_raw().len() / 3 * 4);
    for px in img.as_raw().chunks_exact(3) {
        rgba.push(px[0]);
        rgba.push(px[1]);
        rgba.push(px[2]);
        rgba.push(255);
    }
    rgba
}
