use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// 有理数时间基（与 FFmpeg 的 AVRational 对应）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 转换为浮点（分母为 0 时返回 0）
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// 取倒数（帧率 → 帧间隔）
    pub fn invert(self) -> Self {
        Self::new(self.den, self.num)
    }

    pub fn is_valid(self) -> bool {
        self.num != 0 && self.den != 0
    }

    /// 把 `value` 从时间基 `from` 换算到 `to`，四舍五入到最近整数
    pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
        let b = from.num as i128 * to.den as i128;
        let c = from.den as i128 * to.num as i128;
        if c == 0 {
            return 0;
        }
        let prod = value as i128 * b;
        let half = c.abs() / 2;
        let rounded = if (prod >= 0) == (c > 0) {
            (prod.abs() + half) / c.abs()
        } else {
            -((prod.abs() + half) / c.abs())
        };
        rounded as i64
    }
}

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Video,
    Audio,
    Subtitle,
    Data,
}

/// 流信息（由 Demuxer 探测得到）
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub index: usize,
    pub media_type: MediaType,
    pub time_base: Rational,
    pub frame_rate: Option<Rational>,
    pub width: u32,
    pub height: u32,
    pub sample_aspect_ratio: Rational,
    pub sample_rate: u32,
    pub channels: u16,
    pub codec_name: String,
}

impl StreamInfo {
    pub fn video(index: usize, time_base: Rational, width: u32, height: u32) -> Self {
        Self {
            index,
            media_type: MediaType::Video,
            time_base,
            frame_rate: None,
            width,
            height,
            sample_aspect_ratio: Rational::new(1, 1),
            sample_rate: 0,
            channels: 0,
            codec_name: String::new(),
        }
    }

    pub fn audio(index: usize, time_base: Rational, sample_rate: u32, channels: u16) -> Self {
        Self {
            index,
            media_type: MediaType::Audio,
            time_base,
            frame_rate: None,
            width: 0,
            height: 0,
            sample_aspect_ratio: Rational::new(0, 1),
            sample_rate,
            channels,
            codec_name: String::new(),
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: Rational) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }
}

/// 压缩数据包（可跨线程移动，不会被复制）
#[derive(Debug)]
pub struct MediaPacket {
    pub data: Vec<u8>,
    pub stream_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub pos: Option<i64>, // 在源文件中的字节偏移
}

impl MediaPacket {
    pub fn new(stream_index: usize, data: Vec<u8>) -> Self {
        Self {
            data,
            stream_index,
            pts: None,
            dts: None,
            duration: 0,
            pos: None,
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self.dts = Some(pts);
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    /// 文件结束标记：空负载的包，解码器收到后进入 drain 模式
    pub fn end_marker(stream_index: usize) -> Self {
        Self::new(stream_index, Vec::new())
    }

    pub fn is_end_marker(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
    YUV420P,
}

/// 音频采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::F32 => 4,
        }
    }
}

/// 解码后的图像
#[derive(Debug, Clone)]
pub struct VideoPicture {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub sample_aspect_ratio: Rational,
    pub data: Vec<u8>,
}

/// 解码后的音频块（交错排列的原始采样字节）
#[derive(Debug, Clone)]
pub struct AudioSamples {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub nb_samples: usize, // 每声道采样数
    pub data: Vec<u8>,
}

impl AudioSamples {
    /// 由交错的 f32 采样构造
    pub fn from_f32(sample_rate: u32, channels: u16, samples: &[f32]) -> Self {
        let nb_samples = if channels == 0 {
            0
        } else {
            samples.len() / channels as usize
        };
        Self {
            sample_rate,
            channels,
            format: SampleFormat::F32,
            nb_samples,
            data: bytemuck::cast_slice(samples).to_vec(),
        }
    }
}

/// 帧负载
#[derive(Debug, Clone)]
pub enum FramePayload {
    Video(VideoPicture),
    Audio(AudioSamples),
}

/// 解码引擎直接产出的帧（时间戳仍处于引擎时间基）
#[derive(Debug)]
pub struct RawFrame {
    pub pts: Option<i64>,
    pub best_effort_pts: Option<i64>,
    pub pos: Option<i64>,
    pub payload: FramePayload,
}

impl RawFrame {
    pub fn new(pts: Option<i64>, payload: FramePayload) -> Self {
        Self {
            pts,
            best_effort_pts: pts,
            pos: None,
            payload,
        }
    }

    /// 音频帧的每声道采样数，视频帧为 0
    pub fn nb_samples(&self) -> usize {
        match &self.payload {
            FramePayload::Audio(a) => a.nb_samples,
            FramePayload::Video(_) => 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match &self.payload {
            FramePayload::Audio(a) => a.sample_rate,
            FramePayload::Video(_) => 0,
        }
    }
}

/// 帧队列中的一帧
#[derive(Debug)]
pub struct Frame {
    pub payload: FramePayload,
    pub pts: f64,      // 显示时间戳（秒）
    pub duration: f64, // 估计的持续时间（秒）
    pub pos: Option<i64>,
    shown: AtomicBool,
}

impl Frame {
    pub fn new(payload: FramePayload, duration: f64, pts: f64, pos: Option<i64>) -> Self {
        Self {
            payload,
            pts,
            duration,
            pos,
            shown: AtomicBool::new(false),
        }
    }

    pub fn video(&self) -> Option<&VideoPicture> {
        match &self.payload {
            FramePayload::Video(v) => Some(v),
            FramePayload::Audio(_) => None,
        }
    }

    pub fn audio(&self) -> Option<&AudioSamples> {
        match &self.payload {
            FramePayload::Audio(a) => Some(a),
            FramePayload::Video(_) => None,
        }
    }

    /// 宽高（音频帧返回 (0, 0)）
    pub fn dimensions(&self) -> (u32, u32) {
        self.video().map(|v| (v.width, v.height)).unwrap_or((0, 0))
    }

    pub fn is_shown(&self) -> bool {
        self.shown.load(Ordering::Acquire)
    }

    pub(crate) fn mark_shown(&self) {
        self.shown.store(true, Ordering::Release);
    }
}

/// 发给渲染/事件线程的顶层事件
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// 用户或上层请求退出
    Quit,
    /// 读取线程遇到不可恢复的错误
    ReadFailed(String),
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Stopped,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_rounds_to_nearest() {
        // 90kHz → 1/48000
        assert_eq!(Rational::rescale(90_000, Rational::new(1, 90_000), Rational::new(1, 48_000)), 48_000);
        assert_eq!(Rational::rescale(3, Rational::new(1, 2), Rational::new(1, 1)), 2);
        assert_eq!(Rational::rescale(-3, Rational::new(1, 2), Rational::new(1, 1)), -2);
        assert_eq!(Rational::rescale(5, Rational::new(1, 0), Rational::new(0, 1)), 0);
    }

    #[test]
    fn end_marker_has_empty_payload() {
        let p = MediaPacket::end_marker(3);
        assert!(p.is_end_marker());
        assert_eq!(p.stream_index, 3);
        assert!(!MediaPacket::new(0, vec![1]).is_end_marker());
    }

    #[test]
    fn audio_samples_from_f32_counts_per_channel() {
        let a = AudioSamples::from_f32(48_000, 2, &[0.0, 0.5, 1.0, -1.0]);
        assert_eq!(a.nb_samples, 2);
        assert_eq!(a.data.len(), 16);
    }
}
