use crate::core::{Clock, PlayerError, PlayerEvent, Result};
use crate::player::{log_ctx, PlaybackManager};
use crate::renderer::video_refresh::{RefreshAction, VideoRefresh};
use crate::renderer::PresentationSurface;
use crossbeam_channel::RecvTimeoutError;
use log::{debug, info, warn};
use std::time::Duration;

/// 渲染/事件循环（单线程，在调用者线程中运行）
///
/// 在两次刷新之间阻塞等待事件；超时即执行一次刷新。
/// 收到 `Quit` 或所有流播放完毕时返回显示过的帧数，读取线程报错时返回 `ReadError`
pub fn run_event_loop(
    manager: &PlaybackManager,
    surface: &mut dyn PresentationSurface,
    clock: &dyn Clock,
) -> Result<usize> {
    let config = manager.config();
    let mut refresh = VideoRefresh::new(config, clock.now());
    let mut delay = Duration::from_millis(config.initial_refresh_ms);
    let mut displayed: usize = 0;

    info!("{} 🎞 事件循环启动: {}", log_ctx(), manager.description());

    loop {
        match manager.events().recv_timeout(delay) {
            Ok(PlayerEvent::Quit) => {
                info!("{} ⏹ 收到退出事件", log_ctx());
                break;
            }
            Ok(PlayerEvent::ReadFailed(msg)) => {
                warn!("{} ❌ 读取线程失败，结束播放: {}", log_ctx(), msg);
                return Err(PlayerError::ReadError(msg));
            }
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let frameq = manager.video_frame_queue().map(|q| q.as_ref());
                match refresh.on_refresh(frameq, clock.now()) {
                    RefreshAction::Display { frame, delay: next } => {
                        surface.display(&frame);
                        displayed += 1;
                        delay = next;
                    }
                    RefreshAction::Reschedule(next) => delay = next,
                }

                if manager.playback_finished() {
                    info!("{} 📄 所有流播放完毕", log_ctx());
                    break;
                }
            }
        }
    }

    debug!("{} 事件循环退出，共显示 {} 帧", log_ctx(), displayed);
    Ok(displayed)
}
