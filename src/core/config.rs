use crate::core::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 重采样输出支持的声道数（单声道、立体声、5.1）
pub const SUPPORTED_AUDIO_CHANNELS: [u16; 3] = [1, 2, 6];

/// 播放器配置（JSON 文件，缺省字段使用默认值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 视频帧队列容量
    pub video_frame_queue_size: usize,
    /// 音频帧队列容量
    pub audio_frame_queue_size: usize,
    /// 打开后第一次刷新的延迟（毫秒）
    pub initial_refresh_ms: u64,
    /// 没有视频流时的刷新间隔（毫秒）
    pub idle_refresh_ms: u64,
    /// 两次刷新之间的最小等待（毫秒），避免空转
    pub min_refresh_delay_ms: u64,
    /// 相邻帧 pts 差超过该值（秒）视为异常，沿用上一次的延迟
    pub max_frame_delay_secs: f64,
    /// 首帧前假定的帧间隔（秒）
    pub initial_frame_delay_secs: f64,
    /// 音频输出参数
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    /// 视频帧队列保留最后显示的一帧
    pub keep_last_video_frame: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_frame_queue_size: 3,
            audio_frame_queue_size: 9,
            initial_refresh_ms: 40,
            idle_refresh_ms: 100,
            min_refresh_delay_ms: 10,
            max_frame_delay_secs: 1.0,
            initial_frame_delay_secs: 0.040,
            audio_sample_rate: 48_000,
            audio_channels: 2,
            keep_last_video_frame: false,
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.video_frame_queue_size == 0 || self.audio_frame_queue_size == 0 {
            return Err(PlayerError::InvalidConfig("帧队列容量必须大于 0".to_string()));
        }
        if self.min_refresh_delay_ms == 0 || self.idle_refresh_ms == 0 {
            return Err(PlayerError::InvalidConfig("刷新间隔必须大于 0".to_string()));
        }
        if !(self.max_frame_delay_secs > 0.0) || !(self.initial_frame_delay_secs > 0.0) {
            return Err(PlayerError::InvalidConfig("帧延迟必须为正数".to_string()));
        }
        if self.audio_sample_rate == 0 || !SUPPORTED_AUDIO_CHANNELS.contains(&self.audio_channels) {
            return Err(PlayerError::InvalidConfig(format!(
                "音频参数无效: {} Hz, {} 声道",
                self.audio_sample_rate, self.audio_channels
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = PlayerConfig::from_json(r#"{ "video_frame_queue_size": 5 }"#).unwrap();
        assert_eq!(config.video_frame_queue_size, 5);
        assert_eq!(config.audio_frame_queue_size, 9);
        assert_eq!(config.min_refresh_delay_ms, 10);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = PlayerConfig::from_json(r#"{ "audio_frame_queue_size": 0 }"#).unwrap_err();
        assert!(matches!(err, PlayerError::InvalidConfig(_)));
    }

    #[test]
    fn only_known_channel_layouts_are_accepted() {
        for channels in [1, 2, 6] {
            let config = PlayerConfig {
                audio_channels: channels,
                ..PlayerConfig::default()
            };
            assert!(config.validate().is_ok(), "{} 声道应当可用", channels);
        }
        for channels in [0, 3, 4, 5, 7, 8] {
            let err = PlayerConfig::from_json(&format!(r#"{{ "audio_channels": {} }}"#, channels)).unwrap_err();
            assert!(matches!(err, PlayerError::InvalidConfig(_)), "{} 声道应被拒绝", channels);
        }
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = PlayerConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, PlayerError::ConfigError(_)));
    }
}
