use crate::core::{Frame, PlayerConfig};
use crate::player::FrameQueue;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// 一次刷新之后要做的事
#[derive(Debug)]
pub enum RefreshAction {
    /// 本次没有帧可显示，等待 `delay` 后再刷新
    Reschedule(Duration),
    /// 显示 `frame`，并在 `delay` 后进行下一次刷新
    Display { frame: Arc<Frame>, delay: Duration },
}

impl RefreshAction {
    pub fn delay(&self) -> Duration {
        match self {
            RefreshAction::Reschedule(delay) | RefreshAction::Display { delay, .. } => *delay,
        }
    }
}

/// 视频刷新定时器
///
/// frame_timer 累加每帧的名义间隔，实际等待 = frame_timer - 当前时间，
/// 这样单次调度的误差不会逐帧累积
#[derive(Debug, Clone)]
pub struct VideoRefresh {
    frame_timer: f64,      // 下一帧应当显示的墙钟时间（秒）
    frame_last_pts: f64,
    frame_last_delay: f64,
    video_current_pts: Option<f64>,
    max_frame_delay: f64,
    min_delay: Duration,
    idle_delay: Duration,
}

impl VideoRefresh {
    pub fn new(config: &PlayerConfig, now: f64) -> Self {
        Self {
            frame_timer: now,
            frame_last_pts: 0.0,
            frame_last_delay: config.initial_frame_delay_secs,
            video_current_pts: None,
            max_frame_delay: config.max_frame_delay_secs,
            min_delay: Duration::from_millis(config.min_refresh_delay_ms),
            idle_delay: Duration::from_millis(config.idle_refresh_ms),
        }
    }

    /// 最近一次显示的帧的 pts（秒）
    pub fn current_pts(&self) -> Option<f64> {
        self.video_current_pts
    }

    /// 刷新一次
    ///
    /// - 没有视频流：按空闲间隔重新调度
    /// - 帧队列为空：按最小间隔重新调度，等待解码线程
    /// - 否则取出下一帧，根据 pts 差值推进 frame_timer 并计算下一次刷新的等待
    pub fn on_refresh(&mut self, frameq: Option<&FrameQueue>, now: f64) -> RefreshAction {
        let Some(frameq) = frameq else {
            return RefreshAction::Reschedule(self.idle_delay);
        };
        let Some(frame) = frameq.try_get() else {
            debug!("视频帧队列为空，{:?} 后重试", self.min_delay);
            return RefreshAction::Reschedule(self.min_delay);
        };

        let mut delay = frame.pts - self.frame_last_pts;
        if delay <= 0.0 || delay >= self.max_frame_delay {
            // pts 不连续，沿用上一次的间隔
            delay = self.frame_last_delay;
        }
        self.frame_last_delay = delay;
        self.frame_last_pts = frame.pts;
        self.video_current_pts = Some(frame.pts);

        self.frame_timer += delay;
        let actual_delay = (self.frame_timer - now).max(self.min_delay.as_secs_f64());
        let delay = Duration::from_millis((actual_delay * 1000.0 + 0.5) as u64);
        debug!("显示帧 pts={:.3}, delay={:.3}, actual_delay={:?}", frame.pts, self.frame_last_delay, delay);

        RefreshAction::Display { frame, delay }
    }
}
