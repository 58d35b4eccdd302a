use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// 墙钟 - 刷新定时器用它计算实际等待时间（单位：秒）
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// 基于 `Instant` 的单调时钟
#[derive(Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// 手动推进的时钟，测试和离线渲染时使用
#[derive(Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, secs: f64) {
        *self.inner.lock() = secs;
    }

    pub fn advance(&self, secs: f64) {
        *self.inner.lock() += secs;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.inner.lock()
    }
}
