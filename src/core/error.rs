use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("无法打开文件: {0}")]
    OpenError(String),

    #[error("找不到视频流和音频流")]
    NoStreams,

    #[error("读取失败: {0}")]
    ReadError(String),

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    /// 队列已被中止（用户/系统主动取消，不属于真正的错误）
    #[error("队列已中止")]
    Aborted,

    #[error("配置无效: {0}")]
    InvalidConfig(String),

    #[error("配置解析失败: {0}")]
    ConfigError(#[from] serde_json::Error),

    #[error("其他错误: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
