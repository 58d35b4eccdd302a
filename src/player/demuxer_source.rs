use crate::core::{MediaPacket, MediaType, Result, StreamInfo};

/// `DemuxerSource::read_packet` 的结果
#[derive(Debug)]
pub enum ReadOutcome {
    Packet(MediaPacket),
    /// 到达文件末尾（之后仍可继续尝试读取）
    Eof,
}

/// Demuxer 数据源抽象接口
///
/// 容器格式的解析不在本 crate 范围内，读取线程只依赖这个 trait
pub trait DemuxerSource: Send {
    /// 探测到的所有流（按流索引排列）
    fn streams(&self) -> &[StreamInfo];

    /// 读取下一个媒体包
    ///
    /// 返回：
    /// - Ok(Packet): 成功读取一个包
    /// - Ok(Eof): 到达文件末尾
    /// - Err(e): 不可恢复的读取错误
    fn read_packet(&mut self) -> Result<ReadOutcome>;

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}

/// 为流创建解码引擎
pub trait EngineFactory {
    fn create_engine(&self, stream: &StreamInfo) -> Result<Box<dyn crate::player::DecodeEngine>>;
}

/// 选中的视频流和音频流
#[derive(Debug, Clone, Default)]
pub struct SelectedStreams {
    pub video: Option<StreamInfo>,
    pub audio: Option<StreamInfo>,
}

impl SelectedStreams {
    /// 按流索引顺序各取第一个视频流和音频流
    pub fn first_of_each(streams: &[StreamInfo]) -> Self {
        let mut sorted: Vec<&StreamInfo> = streams.iter().collect();
        sorted.sort_by_key(|s| s.index);
        let pick = |kind: MediaType| sorted.iter().find(|s| s.media_type == kind).map(|s| (*s).clone());
        Self {
            video: pick(MediaType::Video),
            audio: pick(MediaType::Audio),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Rational;

    #[test]
    fn picks_first_stream_of_each_kind_by_index() {
        let tb = Rational::new(1, 1000);
        let streams = vec![
            StreamInfo::audio(3, tb, 44_100, 2),
            StreamInfo::video(2, tb, 640, 480),
            StreamInfo::audio(1, tb, 48_000, 2),
            StreamInfo::video(4, tb, 1280, 720),
        ];
        let selected = SelectedStreams::first_of_each(&streams);
        assert_eq!(selected.video.map(|s| s.index), Some(2));
        assert_eq!(selected.audio.map(|s| s.index), Some(1));
    }

    #[test]
    fn no_audio_or_video_is_empty() {
        let mut subtitle = StreamInfo::video(0, Rational::new(1, 1000), 0, 0);
        subtitle.media_type = MediaType::Subtitle;
        assert!(SelectedStreams::first_of_each(&[subtitle]).is_empty());
    }
}
