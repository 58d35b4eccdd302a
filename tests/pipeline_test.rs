use lite_player::core::{
    AudioSamples, Frame, FramePayload, MediaPacket, MediaType, PixelFormat, PlaybackState, PlayerConfig, PlayerError,
    PlayerEvent, Rational, RawFrame, Result, StreamInfo, SystemClock, VideoPicture,
};
use lite_player::player::{
    DecodeEngine, DemuxerSource, DrainStatus, EngineFactory, FeedStatus, FillStatus, PlaybackManager, ReadOutcome,
};
use lite_player::renderer::{run_event_loop, PresentationSurface};
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

const MS: Rational = Rational::new(1, 1000);

/// 按脚本吐包的数据源，脚本耗尽后一直返回 EOF
struct ScriptedSource {
    streams: Vec<StreamInfo>,
    script: VecDeque<Result<ReadOutcome>>,
}

impl DemuxerSource for ScriptedSource {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<ReadOutcome> {
        self.script.pop_front().unwrap_or(Ok(ReadOutcome::Eof))
    }

    fn description(&self) -> String {
        "scripted source".to_string()
    }
}

/// 每个包原样解出一帧，pts 不变
struct EchoEngine {
    media_type: MediaType,
    pending: VecDeque<Option<i64>>,
    draining: bool,
}

impl DecodeEngine for EchoEngine {
    fn media_type(&self) -> MediaType {
        self.media_type
    }

    fn time_base(&self) -> Rational {
        MS
    }

    fn feed(&mut self, packet: &MediaPacket) -> Result<FeedStatus> {
        if packet.is_end_marker() {
            self.draining = true;
        } else {
            self.pending.push_back(packet.pts);
        }
        Ok(FeedStatus::Accepted)
    }

    fn drain(&mut self) -> Result<DrainStatus> {
        let Some(pts) = self.pending.pop_front() else {
            return Ok(if self.draining {
                DrainStatus::EndOfStream
            } else {
                DrainStatus::NeedsInput
            });
        };
        let payload = match self.media_type {
            MediaType::Audio => {
                let value = pts.unwrap_or(0) as f32;
                FramePayload::Audio(AudioSamples::from_f32(1000, 1, &[value; 4]))
            }
            _ => FramePayload::Video(VideoPicture {
                width: 4,
                height: 2,
                format: PixelFormat::RGBA,
                sample_aspect_ratio: Rational::new(1, 1),
                data: vec![0; 32],
            }),
        };
        Ok(DrainStatus::Frame(RawFrame::new(pts, payload)))
    }

    fn reset(&mut self) {
        self.draining = false;
    }
}

struct EchoFactory;

impl EngineFactory for EchoFactory {
    fn create_engine(&self, stream: &StreamInfo) -> Result<Box<dyn DecodeEngine>> {
        Ok(Box::new(EchoEngine {
            media_type: stream.media_type,
            pending: VecDeque::new(),
            draining: false,
        }))
    }
}

#[derive(Default)]
struct RecordingSurface {
    pts: Vec<f64>,
}

impl PresentationSurface for RecordingSurface {
    fn display(&mut self, frame: &Frame) {
        self.pts.push(frame.pts);
    }
}

fn packet(stream_index: usize, pts: i64) -> Result<ReadOutcome> {
    Ok(ReadOutcome::Packet(MediaPacket::new(stream_index, vec![0xAB; 16]).with_pts(pts)))
}

fn video_source(pts: &[i64]) -> ScriptedSource {
    ScriptedSource {
        streams: vec![StreamInfo::video(0, MS, 4, 2).with_frame_rate(Rational::new(25, 1))],
        script: pts.iter().map(|&p| packet(0, p)).collect(),
    }
}

fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", actual, expected);
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "{:?} vs {:?}", actual, expected);
    }
}

#[test]
fn five_video_frames_arrive_in_order_then_queue_drains() {
    let source = video_source(&[0, 40, 80, 120, 160]);
    let mut manager = PlaybackManager::open(Box::new(source), &EchoFactory, PlayerConfig::default()).unwrap();
    assert_eq!(manager.state(), PlaybackState::Playing);

    let frameq = manager.video_frame_queue().unwrap().clone();
    // 解码线程先把容量为 3 的帧队列写满
    wait_until("frame queue to fill", || frameq.len() == 3);

    let mut pts = Vec::new();
    while pts.len() < 5 {
        assert!(!frameq.is_empty() || !manager.playback_finished());
        match manager.get_next_video_frame() {
            Some(frame) => {
                assert!(frame.is_shown());
                assert!((frame.duration - 0.04).abs() < 1e-9);
                pts.push(frame.pts);
            }
            None => thread::sleep(Duration::from_millis(2)),
        }
    }
    assert_close(&pts, &[0.0, 0.04, 0.08, 0.12, 0.16]);

    wait_until("decoder to finish", || manager.playback_finished());
    assert!(frameq.is_empty());
    assert!(manager.get_next_video_frame().is_none());

    manager.close();
    assert_eq!(manager.state(), PlaybackState::Stopped);
}

#[test]
fn event_loop_presents_every_frame_and_stops_at_end() {
    let source = video_source(&[0, 40, 80, 120, 160]);
    let manager = PlaybackManager::open(Box::new(source), &EchoFactory, PlayerConfig::default()).unwrap();

    let mut surface = RecordingSurface::default();
    let displayed = run_event_loop(&manager, &mut surface, &SystemClock::new()).unwrap();

    assert_eq!(displayed, 5);
    assert_close(&surface.pts, &[0.0, 0.04, 0.08, 0.12, 0.16]);
}

#[test]
fn quit_event_ends_event_loop() {
    let source = video_source(&[0, 40]);
    let manager = PlaybackManager::open(Box::new(source), &EchoFactory, PlayerConfig::default()).unwrap();
    manager.event_sender().send(PlayerEvent::Quit).unwrap();

    let mut surface = RecordingSurface::default();
    assert_eq!(run_event_loop(&manager, &mut surface, &SystemClock::new()).unwrap(), 0);
}

#[test]
fn read_failure_is_reported_by_event_loop() {
    let mut source = video_source(&[0, 40]);
    source.script.push_back(Err(PlayerError::Other("bad sector".into())));
    let mut manager = PlaybackManager::open(Box::new(source), &EchoFactory, PlayerConfig::default()).unwrap();

    let mut surface = RecordingSurface::default();
    match run_event_loop(&manager, &mut surface, &SystemClock::new()) {
        Err(PlayerError::ReadError(msg)) => assert!(msg.contains("bad sector")),
        other => panic!("unexpected result: {:?}", other),
    }
    manager.mark_error();
    manager.close();
    assert_eq!(manager.state(), PlaybackState::Error);
}

#[test]
fn close_releases_decoder_blocked_on_full_queue() {
    let pts: Vec<i64> = (0..20).map(|i| i * 40).collect();
    let mut manager =
        PlaybackManager::open(Box::new(video_source(&pts)), &EchoFactory, PlayerConfig::default()).unwrap();
    let frameq = manager.video_frame_queue().unwrap().clone();
    let pktq = manager.video_pipeline().unwrap().packet_queue().clone();
    wait_until("frame queue to fill", || frameq.len() == 3);

    let started = Instant::now();
    manager.close();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(pktq.is_aborted());
    assert!(pktq.is_empty());
    assert_eq!(pktq.byte_size(), 0);
}

#[test]
fn audio_only_source_feeds_the_callback_context() {
    let source = ScriptedSource {
        streams: vec![StreamInfo::audio(1, MS, 1000, 1)],
        script: vec![packet(1, 0), packet(1, 4)].into(),
    };
    let manager = PlaybackManager::open(Box::new(source), &EchoFactory, PlayerConfig::default()).unwrap();
    assert!(manager.video_frame_queue().is_none());
    assert!(manager.get_next_video_frame().is_none());

    let ctx = manager.audio_callback().unwrap();
    wait_until("audio frames", || ctx.frame_queue().len() == 2);

    let mut out = [0f32; 8];
    assert_eq!(ctx.fill(bytemuck::cast_slice_mut(&mut out)), FillStatus::Filled);
    assert_eq!(out, [0.0, 0.0, 0.0, 0.0, 4.0, 4.0, 4.0, 4.0]);
    let clock = ctx.audio_clock().unwrap();
    assert!((clock - 0.008).abs() < 1e-9);

    wait_until("audio decoder to finish", || manager.playback_finished());
}

#[test]
fn source_without_audio_or_video_is_rejected() {
    let mut subtitle = StreamInfo::video(0, MS, 0, 0);
    subtitle.media_type = MediaType::Subtitle;
    let source = ScriptedSource {
        streams: vec![subtitle],
        script: VecDeque::new(),
    };
    let result = PlaybackManager::open(Box::new(source), &EchoFactory, PlayerConfig::default());
    assert!(matches!(result, Err(PlayerError::NoStreams)));
}

#[test]
fn invalid_config_is_rejected_before_threads_start() {
    let config = PlayerConfig {
        video_frame_queue_size: 0,
        ..PlayerConfig::default()
    };
    let result = PlaybackManager::open(Box::new(video_source(&[0])), &EchoFactory, config);
    assert!(matches!(result, Err(PlayerError::InvalidConfig(_))));
}

fn video_and_audio_source() -> ScriptedSource {
    ScriptedSource {
        streams: vec![
            StreamInfo::video(0, MS, 4, 2).with_frame_rate(Rational::new(25, 1)),
            StreamInfo::audio(1, MS, 1000, 1),
        ],
        script: vec![packet(0, 0), packet(1, 0), packet(0, 40), packet(1, 4)].into(),
    }
}

#[test]
fn headless_playback_ends_without_audio_consumer() {
    let manager =
        PlaybackManager::open(Box::new(video_and_audio_source()), &EchoFactory, PlayerConfig::default()).unwrap();
    assert!(manager.audio_pipeline().is_some());
    assert!(!manager.is_audio_attached());

    let (tx, rx) = std::sync::mpsc::channel();
    let quit = manager.event_sender();
    let handle = thread::spawn(move || {
        let mut surface = RecordingSurface::default();
        let result = run_event_loop(&manager, &mut surface, &SystemClock::new());
        tx.send((result.map_err(|e| e.to_string()), surface.pts.len())).unwrap();
    });

    let outcome = rx.recv_timeout(Duration::from_secs(3));
    if outcome.is_err() {
        quit.send(PlayerEvent::Quit).unwrap();
    }
    handle.join().unwrap();
    let (result, shown) = outcome.expect("event loop did not stop after the last video frame");
    assert_eq!(result, Ok(2));
    assert_eq!(shown, 2);
}

#[test]
fn attached_audio_keeps_playback_open_until_drained() {
    let manager =
        PlaybackManager::open(Box::new(video_and_audio_source()), &EchoFactory, PlayerConfig::default()).unwrap();
    let ctx = manager.audio_callback().unwrap();
    assert!(manager.is_audio_attached());

    while manager.get_next_video_frame().is_some() || !manager.video_pipeline().unwrap().is_drained() {
        thread::sleep(Duration::from_millis(2));
    }
    wait_until("audio frames", || ctx.frame_queue().len() == 2);
    assert!(!manager.playback_finished());

    // 设备启动失败后不再等待音频
    manager.detach_audio_callback();
    assert!(manager.playback_finished());
}
