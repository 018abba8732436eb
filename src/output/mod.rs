/// 显示输出 (Display Output)
///
/// 显示面(窗口/浏览器画布)是外部协作方, 这里只抽象"发布一帧":
/// - ChannelSink: 经有界通道送往渲染线程 (拉模式默认输出)
/// - 推模式不经过sink, 标注帧直接作为回调返回值交还传输层
use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;

use crate::detection::Frame;

/// 显示端的颜色通道顺序标志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// 下游显示端已关闭
#[derive(Debug, Error)]
#[error("显示端已关闭")]
pub struct SinkClosed;

/// 显示输出抽象
///
/// `publish` 把完成的帧交给显示方, 可能阻塞也可能异步, 由宿主决定;
/// 显示节奏完全由发布速度驱动, 这里不做独立限帧
pub trait DisplaySink {
    fn publish(&mut self, frame: Frame) -> Result<(), SinkClosed>;

    /// 发布帧的颜色通道顺序
    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }
}

/// 通道输出: 帧 → 有界通道 → 渲染线程
///
/// 通道满说明显示端落后, 丢弃当前帧不阻塞管线
/// (渲染端本来只取最新一帧); 接收端关闭视为显示端关闭
pub struct ChannelSink {
    tx: Sender<Frame>,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, Receiver<Frame>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx, dropped: 0 }, rx)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl DisplaySink for ChannelSink {
    fn publish(&mut self, frame: Frame) -> Result<(), SinkClosed> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(SinkClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frame(id: u64) -> Frame {
        Frame::new(RgbImage::new(4, 4), id)
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (mut sink, rx) = ChannelSink::new(1);
        sink.publish(frame(0)).unwrap();
        sink.publish(frame(1)).unwrap(); // 满, 丢弃
        assert_eq!(sink.dropped(), 1);
        assert_eq!(rx.recv().unwrap().frame_id, 0);
    }

    #[test]
    fn test_channel_sink_closed() {
        let (mut sink, rx) = ChannelSink::new(1);
        drop(rx);
        assert!(sink.publish(frame(0)).is_err());
    }

    #[test]
    fn test_default_channel_order_is_rgb() {
        let (sink, _rx) = ChannelSink::new(1);
        assert_eq!(sink.channel_order(), ChannelOrder::Rgb);
    }
}
