use crate::core::Frame;
use crate::player::frame_queue::FrameQueue;
use log::warn;
use parking_lot::Mutex;
use std::sync::Arc;

#[cfg(feature = "audio")]
pub use self::device::AudioOutput;

/// `AudioCallbackContext::fill` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    /// 缓冲区全部填入了解码数据
    Filled,
    /// 帧队列已空，剩余部分填充静音
    Exhausted,
}

struct CallbackState {
    current: Option<Arc<Frame>>,
    index: usize, // 当前帧中已经输出的字节数
}

/// 音频回调上下文
///
/// 由播放管理器创建，通过 `Arc` 交给音频设备回调，回调线程只通过它读取
/// 音频帧队列（不使用全局变量）
pub struct AudioCallbackContext {
    frameq: Arc<FrameQueue>,
    state: Mutex<CallbackState>,
}

impl AudioCallbackContext {
    pub fn new(frameq: Arc<FrameQueue>) -> Self {
        Self {
            frameq,
            state: Mutex::new(CallbackState { current: None, index: 0 }),
        }
    }

    pub fn frame_queue(&self) -> &Arc<FrameQueue> {
        &self.frameq
    }

    /// 用交错的原始采样字节填满 `out`
    ///
    /// 当前帧用完后非阻塞地从帧队列取下一帧；队列为空时剩余部分写 0
    pub fn fill(&self, out: &mut [u8]) -> FillStatus {
        let mut state = self.state.lock();
        let CallbackState { current, index } = &mut *state;
        let mut written = 0;

        while written < out.len() {
            let pending = current
                .as_ref()
                .and_then(|f| f.audio())
                .map_or(0, |a| a.data.len().saturating_sub(*index));

            if pending == 0 {
                match self.frameq.try_get() {
                    Some(frame) if frame.audio().is_some() => {
                        *current = Some(frame);
                        *index = 0;
                    }
                    Some(frame) => {
                        warn!("音频队列中出现非音频帧（pts={:.3}），已跳过", frame.pts);
                    }
                    None => {
                        out[written..].fill(0);
                        return FillStatus::Exhausted;
                    }
                }
                continue;
            }

            let n = pending.min(out.len() - written);
            if let Some(audio) = current.as_ref().and_then(|f| f.audio()) {
                out[written..written + n].copy_from_slice(&audio.data[*index..*index + n]);
            }
            *index += n;
            written += n;
        }

        FillStatus::Filled
    }

    /// 当前输出位置对应的音频时间（秒）；还没有输出过任何帧时为 `None`
    pub fn audio_clock(&self) -> Option<f64> {
        let state = self.state.lock();
        let frame = state.current.as_ref()?;
        let audio = frame.audio()?;
        let bytes_per_sec =
            audio.sample_rate as f64 * audio.channels as f64 * audio.format.bytes_per_sample() as f64;
        if bytes_per_sec <= 0.0 {
            return Some(frame.pts);
        }
        Some(frame.pts + state.index as f64 / bytes_per_sec)
    }
}

#[cfg(feature = "audio")]
mod device {
    use super::{AudioCallbackContext, FillStatus};
    use crate::core::{PlayerError, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
    use log::{debug, error, info, warn};
    use std::sync::Arc;

    /// 音频输出 - 使用 cpal 播放音频
    ///
    /// 设备回调以 f32 交错采样拉取数据，解码端需要输出同样的格式和参数
    pub struct AudioOutput {
        device: Device,
        config: StreamConfig,
        stream: Option<Stream>,
    }

    impl AudioOutput {
        /// 创建音频输出（支持非标准配置自动回退）
        pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
            info!("初始化音频输出: {} Hz, {} 声道", sample_rate, channels);

            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

            debug!("使用音频设备: {}", device.name().unwrap_or_default());

            let requested = Self::stream_config(sample_rate, channels);
            let config = if Self::is_supported(&device, &requested)? {
                requested
            } else {
                warn!("⚠️  音频设备不支持 {} Hz, {} 声道配置，回退到标准配置", sample_rate, channels);
                let fallback = [(48000, 2), (44100, 2), (48000, 1), (44100, 1)];
                let mut chosen = None;
                for (fb_rate, fb_channels) in fallback {
                    let candidate = Self::stream_config(fb_rate, fb_channels);
                    if Self::is_supported(&device, &candidate)? {
                        info!("✅ 使用回退配置: {} Hz, {} 声道", fb_rate, fb_channels);
                        chosen = Some(candidate);
                        break;
                    }
                }
                chosen.ok_or_else(|| {
                    PlayerError::AudioError(format!(
                        "音频设备不支持任何标准配置 (原请求: {} Hz, {} 声道)",
                        sample_rate, channels
                    ))
                })?
            };

            Ok(Self {
                device,
                config,
                stream: None,
            })
        }

        fn stream_config(sample_rate: u32, channels: u16) -> StreamConfig {
            StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            }
        }

        fn is_supported(device: &Device, config: &StreamConfig) -> Result<bool> {
            let supported = device
                .supported_output_configs()
                .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;
            Ok(supported.into_iter().any(|range| Self::is_config_compatible(config, &range)))
        }

        /// 检查配置是否兼容
        fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
            let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
                && config.sample_rate.0 <= supported.max_sample_rate().0;
            rate_in_range && config.channels == supported.channels()
        }

        /// 开始播放，设备回调从 `ctx` 拉取数据
        pub fn start(&mut self, ctx: Arc<AudioCallbackContext>) -> Result<()> {
            if self.stream.is_some() {
                return Ok(());
            }

            let stream = self
                .device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if ctx.fill(bytemuck::cast_slice_mut(data)) == FillStatus::Exhausted {
                            debug!("音频欠载，输出静音");
                        }
                    },
                    move |err| {
                        error!("音频流错误: {}", err);
                    },
                    None,
                )
                .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

            stream
                .play()
                .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

            self.stream = Some(stream);
            info!("音频输出已启动");
            Ok(())
        }

        /// 停止播放
        pub fn stop(&mut self) {
            if self.stream.take().is_some() {
                info!("音频输出已停止");
            }
        }

        /// 获取实际使用的音频配置
        pub fn get_config(&self) -> (u32, u16) {
            (self.config.sample_rate.0, self.config.channels)
        }
    }

    impl Drop for AudioOutput {
        fn drop(&mut self) {
            self.stop();
        }
    }
}
