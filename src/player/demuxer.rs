use crate::core::{
    AudioSamples, FramePayload, MediaPacket, MediaType, PixelFormat, PlayerError, Rational, RawFrame, Result,
    SampleFormat, StreamInfo, VideoPicture, SUPPORTED_AUDIO_CHANNELS,
};
use crate::player::decoder::{DecodeEngine, DrainStatus, FeedStatus};
use crate::player::demuxer_source::{DemuxerSource, EngineFactory, ReadOutcome};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, media, software, util};
use log::{debug, info, warn};
use std::collections::HashMap;

fn to_rational(r: ffmpeg::Rational) -> Rational {
    Rational::new(r.numerator(), r.denominator())
}

/// 重采样目标声道布局；只接受 `SUPPORTED_AUDIO_CHANNELS` 中的声道数
fn target_layout(channels: u16) -> Result<util::channel_layout::ChannelLayout> {
    match channels {
        1 => Ok(util::channel_layout::ChannelLayout::MONO),
        2 => Ok(util::channel_layout::ChannelLayout::STEREO),
        6 => Ok(util::channel_layout::ChannelLayout::_5POINT1),
        n => Err(PlayerError::InvalidConfig(format!(
            "不支持输出 {} 声道（可选: {:?}）",
            n, SUPPORTED_AUDIO_CHANNELS
        ))),
    }
}

fn to_media_type(medium: media::Type) -> MediaType {
    match medium {
        media::Type::Video => MediaType::Video,
        media::Type::Audio => MediaType::Audio,
        media::Type::Subtitle => MediaType::Subtitle,
        _ => MediaType::Data,
    }
}

/// 解封装器 - 基于 FFmpeg 读取媒体文件
pub struct FfmpegDemuxer {
    input_ctx: format::context::Input,
    streams: Vec<StreamInfo>,
    source_path: String,
}

impl FfmpegDemuxer {
    /// 打开媒体文件并探测全部流
    pub fn open(path: &str) -> Result<Self> {
        info!("正在打开文件: {}", path);

        let input_ctx =
            format::input(&path).map_err(|e| PlayerError::OpenError(format!("无法打开文件 {}: {}", path, e)))?;

        let mut streams = Vec::new();
        for stream in input_ctx.streams() {
            let params = stream.parameters();
            let media_type = to_media_type(params.medium());
            let codec_name = params.id().name().to_string();
            let time_base = to_rational(stream.time_base());

            let mut info = match media_type {
                MediaType::Video => {
                    let decoder = codec::context::Context::from_parameters(params)?.decoder().video()?;
                    let mut info = StreamInfo::video(stream.index(), time_base, decoder.width(), decoder.height());
                    info.sample_aspect_ratio = to_rational(decoder.aspect_ratio());
                    let fps = stream.avg_frame_rate();
                    if fps.numerator() > 0 && fps.denominator() > 0 {
                        info = info.with_frame_rate(to_rational(fps));
                    }
                    info
                }
                MediaType::Audio => {
                    let decoder = codec::context::Context::from_parameters(params)?.decoder().audio()?;
                    StreamInfo::audio(stream.index(), time_base, decoder.rate(), decoder.channels())
                }
                _ => {
                    let mut info = StreamInfo::video(stream.index(), time_base, 0, 0);
                    info.media_type = media_type;
                    info
                }
            };
            info.codec_name = codec_name;
            debug!("流 #{}: {:?} {}", info.index, info.media_type, info.codec_name);
            streams.push(info);
        }

        Ok(Self {
            input_ctx,
            streams,
            source_path: path.to_string(),
        })
    }

    /// 为本文件的流创建解码引擎工厂
    ///
    /// 音频统一重采样为 `sample_rate` / `channels` 的交错 f32
    pub fn engine_factory(&self, sample_rate: u32, channels: u16) -> FfmpegEngineFactory {
        let parameters = self
            .input_ctx
            .streams()
            .map(|s| (s.index(), s.parameters().clone()))
            .collect();
        FfmpegEngineFactory {
            parameters,
            sample_rate,
            channels,
        }
    }
}

impl DemuxerSource for FfmpegDemuxer {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<ReadOutcome> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input_ctx) {
                Ok(()) => {
                    // 空包会被当作结束标记，直接跳过
                    let Some(data) = packet.data().filter(|d| !d.is_empty()) else {
                        continue;
                    };
                    let mut media_packet = MediaPacket::new(packet.stream(), data.to_vec());
                    media_packet.pts = packet.pts();
                    media_packet.dts = packet.dts();
                    media_packet.duration = packet.duration();
                    media_packet.pos = Some(packet.position() as i64).filter(|p| *p >= 0);
                    return Ok(ReadOutcome::Packet(media_packet));
                }
                Err(ffmpeg::Error::Eof) => return Ok(ReadOutcome::Eof),
                Err(ffmpeg::Error::Other { errno: 11 }) => continue, // EAGAIN
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}

/// 按流索引保存编解码参数，打开时再创建解码器
pub struct FfmpegEngineFactory {
    parameters: HashMap<usize, codec::Parameters>,
    sample_rate: u32,
    channels: u16,
}

impl EngineFactory for FfmpegEngineFactory {
    fn create_engine(&self, stream: &StreamInfo) -> Result<Box<dyn DecodeEngine>> {
        let params = self
            .parameters
            .get(&stream.index)
            .cloned()
            .ok_or_else(|| PlayerError::DecodeError(format!("流 #{} 没有编解码参数", stream.index)))?;
        let decoder = codec::context::Context::from_parameters(params)?.decoder();

        let kind = match stream.media_type {
            MediaType::Video => EngineKind::Video {
                decoder: decoder.video()?,
                scaler: None,
            },
            MediaType::Audio => EngineKind::Audio {
                decoder: decoder.audio()?,
                resampler: None,
                target_sample_rate: self.sample_rate,
                target_channels: self.channels,
                target_layout: target_layout(self.channels)?,
            },
            other => {
                return Err(PlayerError::DecodeError(format!("不支持解码 {:?} 流", other)));
            }
        };

        Ok(Box::new(FfmpegEngine {
            kind,
            media_type: stream.media_type,
            time_base: stream.time_base,
            codec_name: stream.codec_name.clone(),
        }))
    }
}

enum EngineKind {
    Video {
        decoder: codec::decoder::Video,
        scaler: Option<software::scaling::Context>,
    },
    Audio {
        decoder: codec::decoder::Audio,
        resampler: Option<software::resampling::Context>,
        target_sample_rate: u32,
        target_channels: u16,
        target_layout: util::channel_layout::ChannelLayout,
    },
}

/// FFmpeg 解码引擎：send_packet / receive_frame 映射到 `DecodeEngine`
///
/// 视频输出 RGBA，音频输出交错 f32
pub struct FfmpegEngine {
    kind: EngineKind,
    media_type: MediaType,
    time_base: Rational,
    codec_name: String,
}

// SwsContext / SwrContext 本身不是 Send，但每个引擎实例只会在自己的解码线程中使用
unsafe impl Send for FfmpegEngine {}

impl FfmpegEngine {
    fn opened(&mut self) -> &mut codec::decoder::Opened {
        match &mut self.kind {
            EngineKind::Video { decoder, .. } => &mut **decoder,
            EngineKind::Audio { decoder, .. } => &mut **decoder,
        }
    }

    fn receive_video(
        decoder: &mut codec::decoder::Video,
        slot: &mut Option<software::scaling::Context>,
    ) -> Result<DrainStatus> {
        let mut decoded = util::frame::Video::empty();
        match decoder.receive_frame(&mut decoded) {
            Ok(()) => {}
            Err(ffmpeg::Error::Other { errno: 11 }) => return Ok(DrainStatus::NeedsInput), // EAGAIN
            Err(ffmpeg::Error::Eof) => return Ok(DrainStatus::EndOfStream),
            Err(e) => return Err(e.into()),
        }

        let picture = Self::convert_video(&decoded, slot)?;
        let mut frame = RawFrame::new(decoded.pts(), FramePayload::Video(picture));
        frame.best_effort_pts = decoded.timestamp();
        Ok(DrainStatus::Frame(frame))
    }

    /// 转换为连续存放的 RGBA；输入尺寸或像素格式变化时重建 scaler
    fn convert_video(
        decoded: &util::frame::Video,
        slot: &mut Option<software::scaling::Context>,
    ) -> Result<VideoPicture> {
        let width = decoded.width();
        let height = decoded.height();

        let reusable = slot.take().filter(|scaler| {
            let input = scaler.input();
            input.format == decoded.format() && input.width == width && input.height == height
        });
        let mut scaler = match reusable {
            Some(scaler) => scaler,
            None => {
                debug!("🔧 初始化视频缩放器: {:?} {}x{} → RGBA", decoded.format(), width, height);
                software::scaling::Context::get(
                    decoded.format(),
                    width,
                    height,
                    util::format::Pixel::RGBA,
                    width,
                    height,
                    software::scaling::Flags::BILINEAR,
                )?
            }
        };
        let mut rgba_frame = util::frame::Video::empty();
        let result = scaler.run(decoded, &mut rgba_frame);
        *slot = Some(scaler);
        result?;

        // 复制数据到连续内存
        let row_size = width as usize * 4;
        let stride = rgba_frame.stride(0);
        let frame_data = rgba_frame.data(0);
        let mut data = vec![0u8; row_size * height as usize];
        for (y, row) in data.chunks_exact_mut(row_size).enumerate() {
            let src_offset = y * stride;
            row.copy_from_slice(&frame_data[src_offset..src_offset + row_size]);
        }

        Ok(VideoPicture {
            width,
            height,
            format: PixelFormat::RGBA,
            sample_aspect_ratio: to_rational(decoded.aspect_ratio()),
            data,
        })
    }

    fn receive_audio(
        decoder: &mut codec::decoder::Audio,
        slot: &mut Option<software::resampling::Context>,
        target_sample_rate: u32,
        target_channels: u16,
        target_layout: util::channel_layout::ChannelLayout,
    ) -> Result<DrainStatus> {
        let mut decoded = util::frame::Audio::empty();
        match decoder.receive_frame(&mut decoded) {
            Ok(()) => {}
            Err(ffmpeg::Error::Other { errno: 11 }) => return Ok(DrainStatus::NeedsInput), // EAGAIN
            Err(ffmpeg::Error::Eof) => return Ok(DrainStatus::EndOfStream),
            Err(e) => return Err(e.into()),
        }

        // 初始化 resampler（支持声道转换和重采样），输入参数变化时重建
        let reusable = slot.take().filter(|resampler| {
            let input = resampler.input();
            input.format == decoded.format()
                && input.channel_layout == decoded.channel_layout()
                && input.rate == decoded.rate()
        });
        let mut resampler = match reusable {
            Some(resampler) => resampler,
            None => {
                debug!(
                    "🔧 初始化音频重采样器: {}Hz/{}ch → {}Hz/{}ch",
                    decoded.rate(),
                    decoded.channels(),
                    target_sample_rate,
                    target_channels
                );
                software::resampling::Context::get(
                    decoded.format(),
                    decoded.channel_layout(),
                    decoded.rate(),
                    util::format::Sample::F32(util::format::sample::Type::Packed),
                    target_layout,
                    target_sample_rate,
                )?
            }
        };
        let mut resampled = util::frame::Audio::empty();
        let result = resampler.run(&decoded, &mut resampled);
        *slot = Some(resampler);
        result?;

        let nb_samples = resampled.samples();
        let byte_len = nb_samples * target_channels as usize * SampleFormat::F32.bytes_per_sample();
        let plane = resampled.data(0);
        let data = plane[..byte_len.min(plane.len())].to_vec();

        let samples = AudioSamples {
            sample_rate: target_sample_rate,
            channels: target_channels,
            format: SampleFormat::F32,
            nb_samples,
            data,
        };
        Ok(DrainStatus::Frame(RawFrame::new(decoded.pts(), FramePayload::Audio(samples))))
    }
}

impl DecodeEngine for FfmpegEngine {
    fn media_type(&self) -> MediaType {
        self.media_type
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn feed(&mut self, packet: &MediaPacket) -> Result<FeedStatus> {
        let result = if packet.is_end_marker() {
            self.opened().send_eof()
        } else {
            let mut av_packet = ffmpeg::Packet::copy(&packet.data);
            av_packet.set_pts(packet.pts);
            av_packet.set_dts(packet.dts);
            av_packet.set_duration(packet.duration);
            av_packet.set_position(packet.pos.unwrap_or(-1) as isize);
            self.opened().send_packet(&av_packet)
        };

        match result {
            Ok(()) => Ok(FeedStatus::Accepted),
            Err(ffmpeg::Error::Other { errno: 11 }) => Ok(FeedStatus::NeedsDrain), // EAGAIN
            Err(ffmpeg::Error::Eof) => {
                warn!("{} 已处于 drain 模式，忽略本次包", self.codec_name);
                Ok(FeedStatus::Accepted)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn drain(&mut self) -> Result<DrainStatus> {
        match &mut self.kind {
            EngineKind::Video { decoder, scaler } => Self::receive_video(decoder, scaler),
            EngineKind::Audio {
                decoder,
                resampler,
                target_sample_rate,
                target_channels,
                target_layout,
            } => Self::receive_audio(
                decoder,
                resampler,
                *target_sample_rate,
                *target_channels,
                *target_layout,
            ),
        }
    }

    fn reset(&mut self) {
        self.opened().flush();
    }

    fn description(&self) -> String {
        format!("FFmpeg {:?} decoder ({})", self.media_type, self.codec_name)
    }
}
