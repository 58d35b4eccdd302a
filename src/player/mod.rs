// 播放器核心模块

pub mod audio_output;
pub mod decoder;
pub mod demuxer_source; // Demuxer 抽象接口
pub mod demuxer_thread; // Demuxer 线程管理
pub mod frame_queue;
pub mod manager;
pub mod packet_queue;

#[cfg(feature = "ffmpeg")]
pub mod demuxer; // FFmpeg 后端：容器解析 + 解码引擎

pub use audio_output::{AudioCallbackContext, FillStatus};
#[cfg(feature = "audio")]
pub use audio_output::AudioOutput;
pub use decoder::{
    audio_loop, video_loop, DecodeEngine, DecodeOutcome, Decoder, DecoderStatus, DecoderThread, DrainStatus,
    FeedStatus,
};
#[cfg(feature = "ffmpeg")]
pub use demuxer::{FfmpegDemuxer, FfmpegEngineFactory};
pub use demuxer_source::{DemuxerSource, EngineFactory, ReadOutcome, SelectedStreams};
pub use demuxer_thread::DemuxerThread;
pub use frame_queue::FrameQueue;
pub use manager::PlaybackManager;
pub use packet_queue::{PacketGet, PacketQueue};

/// 日志上下文：进程号 + 线程号
pub(crate) fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", std::process::id(), std::thread::current().id())
}
