use crate::core::{Frame, MediaType, PlaybackState, PlayerConfig, PlayerError, PlayerEvent, Result, StreamInfo};
use crate::player::audio_output::AudioCallbackContext;
use crate::player::decoder::{audio_loop, video_loop, Decoder, DecoderThread};
use crate::player::demuxer_source::{DemuxerSource, EngineFactory, SelectedStreams};
use crate::player::demuxer_thread::DemuxerThread;
use crate::player::frame_queue::FrameQueue;
use crate::player::log_ctx;
use crate::player::packet_queue::PacketQueue;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 单个流的处理管线：包队列 → 解码线程 → 帧队列
pub struct StreamPipeline {
    stream: StreamInfo,
    packet_queue: Arc<PacketQueue>,
    frame_queue: Arc<FrameQueue>,
    decoder_thread: Option<DecoderThread>,
}

impl StreamPipeline {
    fn open(stream: StreamInfo, factory: &dyn EngineFactory, config: &PlayerConfig) -> Result<Self> {
        let engine = factory.create_engine(&stream)?;
        info!(
            "{} 打开流 #{}（{:?}）: {}",
            log_ctx(),
            stream.index,
            stream.media_type,
            engine.description()
        );

        let packet_queue = Arc::new(PacketQueue::new());
        let frame_queue = match stream.media_type {
            MediaType::Video => Arc::new(FrameQueue::new(
                config.video_frame_queue_size,
                packet_queue.clone(),
                config.keep_last_video_frame,
            )?),
            _ => Arc::new(FrameQueue::new(config.audio_frame_queue_size, packet_queue.clone(), false)?),
        };

        let decoder = Decoder::new(engine, packet_queue.clone(), frame_queue.clone());
        let decoder_thread = match stream.media_type {
            MediaType::Video => {
                let frame_rate = stream.frame_rate;
                decoder.start("video_decoder", move |d| video_loop(d, frame_rate))?
            }
            _ => decoder.start("audio_decoder", audio_loop)?,
        };

        Ok(Self {
            stream,
            packet_queue,
            frame_queue,
            decoder_thread: Some(decoder_thread),
        })
    }

    pub fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    pub fn packet_queue(&self) -> &Arc<PacketQueue> {
        &self.packet_queue
    }

    pub fn frame_queue(&self) -> &Arc<FrameQueue> {
        &self.frame_queue
    }

    /// 解码线程已退出且没有未显示的帧
    pub fn is_drained(&self) -> bool {
        let decoding = self.decoder_thread.as_ref().map_or(false, |t| t.is_running());
        !decoding && self.frame_queue.remaining() == 0
    }

    fn close(&mut self) {
        if let Some(mut thread) = self.decoder_thread.take() {
            thread.abort();
            info!("{} ✅ 解码线程 {} 已结束", log_ctx(), thread.name());
        }
    }
}

/// 播放管理器 - 整体控制播放流程
///
/// 负责挑选流、创建各流的队列和解码线程、启动读取线程，并在关闭时按顺序拆除
pub struct PlaybackManager {
    config: PlayerConfig,
    description: String,
    streams: Vec<StreamInfo>,
    state: PlaybackState,
    video: Option<StreamPipeline>,
    audio: Option<StreamPipeline>,
    audio_callback: Option<Arc<AudioCallbackContext>>,
    audio_attached: AtomicBool, // 音频回调已交给设备，音频帧队列有人消费
    demuxer_thread: Option<DemuxerThread>,
    event_tx: Sender<PlayerEvent>,
    event_rx: Receiver<PlayerEvent>,
}

impl PlaybackManager {
    /// 打开媒体源并启动全部线程
    ///
    /// 分别取第一个视频流和第一个音频流；两者都没有时返回 `NoStreams`。
    /// 某个流的解码引擎创建失败时跳过该流，全部失败则返回最后一个错误
    pub fn open(source: Box<dyn DemuxerSource>, factory: &dyn EngineFactory, config: PlayerConfig) -> Result<Self> {
        config.validate()?;
        let description = source.description();
        info!("{} 🎮 打开媒体源: {}", log_ctx(), description);

        let streams = source.streams().to_vec();
        let selected = SelectedStreams::first_of_each(&streams);
        if selected.is_empty() {
            error!("{} ❌ {} 中没有视频流或音频流", log_ctx(), description);
            return Err(PlayerError::NoStreams);
        }

        let mut last_error = None;
        let mut open_pipeline = |stream: Option<StreamInfo>| {
            let stream = stream?;
            match StreamPipeline::open(stream, factory, &config) {
                Ok(pipeline) => Some(pipeline),
                Err(e) => {
                    warn!("{} ⚠ 打开流失败，跳过: {}", log_ctx(), e);
                    last_error = Some(e);
                    None
                }
            }
        };
        let video = open_pipeline(selected.video);
        let audio = open_pipeline(selected.audio);

        if video.is_none() && audio.is_none() {
            return Err(last_error.unwrap_or(PlayerError::NoStreams));
        }

        let routes: HashMap<usize, Arc<PacketQueue>> = video
            .iter()
            .chain(audio.iter())
            .map(|p| (p.stream.index, p.packet_queue.clone()))
            .collect();

        let audio_callback = audio
            .as_ref()
            .map(|p| Arc::new(AudioCallbackContext::new(p.frame_queue.clone())));

        // 解码线程已经打开了包队列，此时才能开始读包
        let (event_tx, event_rx) = unbounded();
        let demuxer_thread = DemuxerThread::start(source, routes, event_tx.clone())?;

        info!(
            "{} ✅ 播放管线已启动（视频: {}, 音频: {}）",
            log_ctx(),
            video.is_some(),
            audio.is_some()
        );

        Ok(Self {
            config,
            description,
            streams,
            state: PlaybackState::Playing,
            video,
            audio,
            audio_callback,
            audio_attached: AtomicBool::new(false),
            demuxer_thread: Some(demuxer_thread),
            event_tx,
            event_rx,
        })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// 源中探测到的全部流
    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn video_pipeline(&self) -> Option<&StreamPipeline> {
        self.video.as_ref()
    }

    pub fn audio_pipeline(&self) -> Option<&StreamPipeline> {
        self.audio.as_ref()
    }

    pub fn video_frame_queue(&self) -> Option<&Arc<FrameQueue>> {
        self.video.as_ref().map(|p| &p.frame_queue)
    }

    /// 取下一个待显示的视频帧（非阻塞）
    pub fn get_next_video_frame(&self) -> Option<Arc<Frame>> {
        self.video.as_ref()?.frame_queue.try_get()
    }

    /// 交给音频设备的回调上下文（没有音频流时为 `None`）
    ///
    /// 取出后音频流才计入 `playback_finished`；设备启动失败时应调用 `detach_audio_callback`
    pub fn audio_callback(&self) -> Option<Arc<AudioCallbackContext>> {
        let ctx = self.audio_callback.clone()?;
        self.audio_attached.store(true, Ordering::SeqCst);
        Some(ctx)
    }

    /// 声明音频帧队列不再有人消费
    pub fn detach_audio_callback(&self) {
        if self.audio_attached.swap(false, Ordering::SeqCst) {
            info!("{} 🔇 音频回调已解除，播放结束不再等待音频流", log_ctx());
        }
    }

    pub fn is_audio_attached(&self) -> bool {
        self.audio_attached.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &Receiver<PlayerEvent> {
        &self.event_rx
    }

    /// 事件发送端，上层用它投递 `Quit`
    pub fn event_sender(&self) -> Sender<PlayerEvent> {
        self.event_tx.clone()
    }

    /// 所有解码线程都已退出且帧队列已读空
    ///
    /// 没有音频消费者时只看视频流，否则音频帧队列永远不会被读空
    pub fn playback_finished(&self) -> bool {
        let video_done = self.video.as_ref().map_or(true, |p| p.is_drained());
        let audio_done = !self.is_audio_attached() || self.audio.as_ref().map_or(true, |p| p.is_drained());
        video_done && audio_done
    }

    /// 标记为出错状态（读取线程报告不可恢复的错误后由上层调用）
    pub fn mark_error(&mut self) {
        self.state = PlaybackState::Error;
    }

    /// 停止播放：先停读取线程，再逐个终止解码线程
    pub fn close(&mut self) {
        if self.demuxer_thread.is_none() && self.video.is_none() && self.audio.is_none() {
            return;
        }
        info!("{} ⏹️  停止播放: {}", log_ctx(), self.description);

        if let Some(mut demuxer_thread) = self.demuxer_thread.take() {
            demuxer_thread.stop();
            info!("{} ✅ DemuxerThread 已停止", log_ctx());
        }

        for mut pipeline in self.video.take().into_iter().chain(self.audio.take()) {
            pipeline.close();
        }
        self.audio_callback = None;

        if self.state != PlaybackState::Error {
            self.state = PlaybackState::Stopped;
        }
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        self.close();
    }
}
