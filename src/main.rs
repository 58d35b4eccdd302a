use anyhow::{Context, Result};
use lite_player::core::{Frame, PlayerConfig};
use lite_player::renderer::PresentationSurface;
use log::info;

/// 无窗口的显示目标：只记录显示过的帧
#[derive(Default)]
#[cfg_attr(not(feature = "ffmpeg"), allow(dead_code))]
struct LoggingSurface {
    frames: usize,
}

impl PresentationSurface for LoggingSurface {
    fn display(&mut self, frame: &Frame) {
        self.frames += 1;
        let (width, height) = frame.dimensions();
        info!("🖼 显示第 {} 帧: pts={:.3}s, {}x{}", self.frames, frame.pts, width, height);
    }
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("🎬 lite_player 启动");

    let mut args = std::env::args().skip(1);
    let path = args.next().context("用法: lite_player <媒体文件> [配置文件.json]")?;
    let config = match args.next() {
        Some(config_path) => {
            PlayerConfig::load(&config_path).with_context(|| format!("加载配置文件 {} 失败", config_path))?
        }
        None => PlayerConfig::default(),
    };

    play(&path, config)
}

#[cfg(feature = "ffmpeg")]
fn play(path: &str, config: PlayerConfig) -> Result<()> {
    use lite_player::core::SystemClock;
    use lite_player::player::{FfmpegDemuxer, PlaybackManager};
    use lite_player::renderer::run_event_loop;

    // 初始化 FFmpeg
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
    info!("✅ FFmpeg 初始化成功");

    let demuxer = FfmpegDemuxer::open(path)?;
    let factory = demuxer.engine_factory(config.audio_sample_rate, config.audio_channels);
    let mut manager = PlaybackManager::open(Box::new(demuxer), &factory, config)?;

    #[cfg(feature = "audio")]
    let _audio_output = start_audio(&manager);

    let mut surface = LoggingSurface::default();
    let result = run_event_loop(&manager, &mut surface, &SystemClock::new());
    if result.is_err() {
        manager.mark_error();
    }
    manager.close();

    let displayed = result?;
    info!("✅ 播放结束，共显示 {} 帧", displayed);
    Ok(())
}

#[cfg(all(feature = "ffmpeg", feature = "audio"))]
fn start_audio(manager: &lite_player::player::PlaybackManager) -> Option<lite_player::player::AudioOutput> {
    use lite_player::player::AudioOutput;
    use log::{error, warn};

    let config = manager.config();
    let mut output = match AudioOutput::new(config.audio_sample_rate, config.audio_channels) {
        Ok(output) => output,
        Err(e) => {
            error!("创建音频输出失败: {}", e);
            return None;
        }
    };
    let ctx = manager.audio_callback()?;
    let (rate, channels) = output.get_config();
    if (rate, channels) != (config.audio_sample_rate, config.audio_channels) {
        warn!(
            "⚠️  音频设备使用 {} Hz / {} 声道，与解码输出 {} Hz / {} 声道不一致",
            rate, channels, config.audio_sample_rate, config.audio_channels
        );
    }
    if let Err(e) = output.start(ctx) {
        error!("启动音频输出失败: {}", e);
        manager.detach_audio_callback();
        return None;
    }
    Some(output)
}

#[cfg(not(feature = "ffmpeg"))]
fn play(path: &str, _config: PlayerConfig) -> Result<()> {
    anyhow::bail!("{} 无法播放：未启用 ffmpeg 特性，请使用 `--features ffmpeg` 重新编译", path)
}
