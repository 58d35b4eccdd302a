use crate::core::{MediaPacket, MediaType, Rational, RawFrame, Result};
use crate::player::frame_queue::FrameQueue;
use crate::player::log_ctx;
use crate::player::packet_queue::{PacketGet, PacketQueue};
use log::{debug, error, info, warn};
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// `DecodeEngine::feed` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// 引擎接收了这个包
    Accepted,
    /// 引擎内部还有没取走的帧，必须先 drain 再重新送入同一个包
    NeedsDrain,
}

/// `DecodeEngine::drain` 的结果
#[derive(Debug)]
pub enum DrainStatus {
    Frame(RawFrame),
    NeedsInput,
    EndOfStream,
}

/// 外部解码引擎（编解码器内部实现不在本 crate 范围内）
///
/// 约定与 FFmpeg 的 send_packet / receive_frame 一致：
/// - 空负载的包（`MediaPacket::is_end_marker`）让引擎进入 drain 模式
/// - drain 模式下取完所有帧后 `drain()` 返回 `EndOfStream`
/// - `Err` 表示本次调用失败，调用方记录日志并丢弃该包
pub trait DecodeEngine: Send {
    fn media_type(&self) -> MediaType;

    /// 输入包的时间基
    fn time_base(&self) -> Rational;

    fn feed(&mut self, packet: &MediaPacket) -> Result<FeedStatus>;

    fn drain(&mut self) -> Result<DrainStatus>;

    /// 清空引擎内部缓冲（EOF 之后调用）
    fn reset(&mut self);

    fn description(&self) -> String {
        format!("{:?} decoder", self.media_type())
    }
}

/// 解码器状态
///
/// 待重送的包只存在于 `PendingInput` 中，`Finished` 时不可能还挂着一个包
#[derive(Debug)]
enum DecoderState {
    Running,
    PendingInput(MediaPacket),
    Finished,
    Aborted,
}

/// 对外可见的状态（不携带包）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderStatus {
    Running,
    PendingInput,
    Finished,
    Aborted,
}

/// `Decoder::decode_frame` 的结果
#[derive(Debug)]
pub enum DecodeOutcome {
    Frame(RawFrame),
    /// 引擎已输出全部帧并被重置
    Finished,
    /// 包队列被中止
    Aborted,
}

/// 解码器：从 `PacketQueue` 取包，驱动解码引擎，产出帧
pub struct Decoder {
    engine: Box<dyn DecodeEngine>,
    pktq: Arc<PacketQueue>,
    frameq: Arc<FrameQueue>,
    state: DecoderState,
    next_pts: Option<i64>,
    next_pts_tb: Rational,
}

impl Decoder {
    pub fn new(engine: Box<dyn DecodeEngine>, pktq: Arc<PacketQueue>, frameq: Arc<FrameQueue>) -> Self {
        Self {
            engine,
            pktq,
            frameq,
            state: DecoderState::Running,
            next_pts: None,
            next_pts_tb: Rational::new(0, 1),
        }
    }

    pub fn status(&self) -> DecoderStatus {
        match self.state {
            DecoderState::Running => DecoderStatus::Running,
            DecoderState::PendingInput(_) => DecoderStatus::PendingInput,
            DecoderState::Finished => DecoderStatus::Finished,
            DecoderState::Aborted => DecoderStatus::Aborted,
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.engine.media_type()
    }

    pub fn time_base(&self) -> Rational {
        self.engine.time_base()
    }

    pub fn frame_queue(&self) -> &Arc<FrameQueue> {
        &self.frameq
    }

    /// 解码出下一帧
    ///
    /// 先尽量从引擎取帧；引擎需要输入时，优先重送挂起的包，否则阻塞地从队列取新包
    pub fn decode_frame(&mut self) -> DecodeOutcome {
        if matches!(self.state, DecoderState::Finished | DecoderState::Aborted) {
            self.state = DecoderState::Running;
        }

        loop {
            // 从引擎中读取可用的帧
            loop {
                if self.pktq.is_aborted() {
                    self.state = DecoderState::Aborted;
                    return DecodeOutcome::Aborted;
                }
                match self.engine.drain() {
                    Ok(DrainStatus::Frame(mut frame)) => {
                        if self.engine.media_type() == MediaType::Audio {
                            self.normalize_audio_pts(&mut frame);
                        }
                        return DecodeOutcome::Frame(frame);
                    }
                    Ok(DrainStatus::EndOfStream) => {
                        self.engine.reset();
                        self.state = DecoderState::Finished;
                        return DecodeOutcome::Finished;
                    }
                    Ok(DrainStatus::NeedsInput) => break,
                    Err(e) => {
                        warn!("{} 取帧失败（已跳过）: {}", self.engine.description(), e);
                        break;
                    }
                }
            }

            let packet = match mem::replace(&mut self.state, DecoderState::Running) {
                DecoderState::PendingInput(packet) => packet,
                _ => match self.pktq.get(true) {
                    PacketGet::Packet(packet) => packet,
                    PacketGet::Aborted | PacketGet::WouldBlock => {
                        self.state = DecoderState::Aborted;
                        return DecodeOutcome::Aborted;
                    }
                },
            };

            match self.engine.feed(&packet) {
                Ok(FeedStatus::Accepted) => {}
                Ok(FeedStatus::NeedsDrain) => {
                    error!(
                        "{} receive 与 send 同时要求对方先执行，违反解码 API 约定，挂起当前包",
                        self.engine.description()
                    );
                    self.state = DecoderState::PendingInput(packet);
                }
                Err(e) => {
                    warn!(
                        "{} 送包失败（丢弃 {} 字节, pts={:?}）: {}",
                        self.engine.description(),
                        packet.size(),
                        packet.pts,
                        e
                    );
                }
            }
        }
    }

    /// 音频时间戳统一到 1/sample_rate 时间基；缺失时由上一帧推算
    fn normalize_audio_pts(&mut self, frame: &mut RawFrame) {
        let sample_rate = frame.sample_rate();
        if sample_rate == 0 {
            return;
        }
        let tb = Rational::new(1, sample_rate as i32);
        frame.pts = match (frame.pts, self.next_pts) {
            (Some(pts), _) => Some(Rational::rescale(pts, self.engine.time_base(), tb)),
            (None, Some(next)) => Some(Rational::rescale(next, self.next_pts_tb, tb)),
            (None, None) => None,
        };
        if let Some(pts) = frame.pts {
            self.next_pts = Some(pts + frame.nb_samples() as i64);
            self.next_pts_tb = tb;
        }
        frame.best_effort_pts = frame.pts;
    }

    /// 开启解码线程：打开包队列并在新线程中运行 `body`
    pub fn start<F>(self, thread_name: &str, body: F) -> Result<DecoderThread>
    where
        F: FnOnce(Decoder) + Send + 'static,
    {
        let pktq = self.pktq.clone();
        let frameq = self.frameq.clone();
        pktq.start();

        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || body(self));

        match handle {
            Ok(handle) => Ok(DecoderThread {
                name: thread_name.to_string(),
                pktq,
                frameq,
                handle: Some(handle),
            }),
            Err(e) => {
                pktq.abort();
                error!("{} ❌ 创建解码线程 {} 失败: {}", log_ctx(), thread_name, e);
                Err(e.into())
            }
        }
    }
}

/// 运行中的解码线程
///
/// 终止顺序固定：中止包队列 → 唤醒帧队列 → 等待线程结束 → 清空包队列。
/// 顺序颠倒可能让线程永远阻塞在没人再唤醒的条件变量上
pub struct DecoderThread {
    name: String,
    pktq: Arc<PacketQueue>,
    frameq: Arc<FrameQueue>,
    handle: Option<JoinHandle<()>>,
}

impl DecoderThread {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// 终止解码线程
    pub fn abort(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        info!("{} 🛑 终止解码线程 {}", log_ctx(), self.name);
        self.pktq.abort();
        self.frameq.signal();
        if handle.join().is_err() {
            error!("{} ❌ 解码线程 {} panic", log_ctx(), self.name);
        }
        self.pktq.flush();
    }
}

impl Drop for DecoderThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!("{} ⚠ DecoderThread {} 被 drop，但未调用 abort()，正在尝试优雅停止", log_ctx(), self.name);
            self.abort();
        }
    }
}

/// 视频解码线程主体
///
/// pts 取 best-effort 时间戳乘以流时间基（秒），时长由帧率估算
pub fn video_loop(mut decoder: Decoder, frame_rate: Option<Rational>) {
    info!("{} 🎬 视频解码线程启动: {}", log_ctx(), decoder.engine.description());
    let time_base = decoder.time_base().to_f64();
    let duration = frame_rate
        .filter(|r| r.is_valid())
        .map(|r| r.invert().to_f64())
        .unwrap_or(0.0);

    run_loop(&mut decoder, |frame| {
        let pts = frame.best_effort_pts.or(frame.pts).unwrap_or(0) as f64 * time_base;
        (pts, duration)
    });
}

/// 音频解码线程主体
///
/// pts 已被统一到 1/sample_rate 时间基，时长为采样数 / 采样率
pub fn audio_loop(mut decoder: Decoder) {
    info!("{} 🔊 音频解码线程启动: {}", log_ctx(), decoder.engine.description());
    run_loop(&mut decoder, |frame| {
        let rate = frame.sample_rate() as f64;
        if rate <= 0.0 {
            return (0.0, 0.0);
        }
        let pts = frame.pts.map(|p| p as f64 / rate).unwrap_or(0.0);
        (pts, frame.nb_samples() as f64 / rate)
    });
}

fn run_loop<F>(decoder: &mut Decoder, timing: F)
where
    F: Fn(&RawFrame) -> (f64, f64),
{
    let mut frame_count: usize = 0;
    loop {
        match decoder.decode_frame() {
            DecodeOutcome::Frame(frame) => {
                let (pts, duration) = timing(&frame);
                if decoder.frameq.put(frame.payload, duration, pts, frame.pos).is_none() {
                    debug!("{} 帧队列已中止，停止写入", log_ctx());
                    break;
                }
                frame_count += 1;
                debug!("{} 解码帧 #{}: pts={:.3}s", log_ctx(), frame_count, pts);
            }
            DecodeOutcome::Finished => {
                info!("{} 📄 解码器已输出全部帧", log_ctx());
                break;
            }
            DecodeOutcome::Aborted => break,
        }
    }
    info!("{} 🛑 解码线程退出（共 {} 帧）", log_ctx(), frame_count);
}
