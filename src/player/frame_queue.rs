use crate::core::{Frame, FramePayload, PlayerError, Result};
use crate::player::packet_queue::PacketQueue;
use log::debug;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;

struct FrameQueueInner {
    slots: Vec<Option<Arc<Frame>>>,
    rindex: usize,       // 正在读取的位置
    windex: usize,       // 正在写入的位置
    size: usize,         // 可读取的帧数
    rindex_shown: usize, // rindex 指向的帧是否已经显示过，0 or 1
}

impl FrameQueueInner {
    fn remaining(&self) -> usize {
        self.size.saturating_sub(self.rindex_shown)
    }
}

/// 解码帧环形缓冲区
///
/// 固定容量，读写游标分离。槽位中保存 `Arc<Frame>`：消费者拿到的句柄在槽位
/// 被复用后依然有效，槽位本身只会在被读走之后才会被重新写入。
///
/// 阻塞等待都和关联的 `PacketQueue` 的中止标志挂钩：上游中止后调用 `signal()`，
/// 所有阻塞在本队列上的线程都会醒来并返回 `None`。
pub struct FrameQueue {
    inner: Mutex<FrameQueueInner>,
    cond: Condvar,
    max_size: usize,
    keep_last: bool,
    pktq: Arc<PacketQueue>,
}

impl FrameQueue {
    /// 分配 `max_size` 个槽位
    ///
    /// `keep_last` 为 true 时，`get()` 取走的帧会继续留在 rindex 上，
    /// 直到下一次 `get()`，这样 `peek_last()` 始终返回当前正在显示的帧
    pub fn new(max_size: usize, pktq: Arc<PacketQueue>, keep_last: bool) -> Result<Self> {
        if max_size == 0 {
            return Err(PlayerError::InvalidConfig("帧队列容量必须大于 0".to_string()));
        }
        debug!("FrameQueue::new: max_size={}, keep_last={}", max_size, keep_last);
        Ok(Self {
            inner: Mutex::new(FrameQueueInner {
                slots: vec![None; max_size],
                rindex: 0,
                windex: 0,
                size: 0,
                rindex_shown: 0,
            }),
            cond: Condvar::new(),
            max_size,
            keep_last,
            pktq,
        })
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().size == 0
    }

    pub fn len(&self) -> usize {
        self.inner.lock().size
    }

    /// 还没有显示过的帧数
    pub fn remaining(&self) -> usize {
        self.inner.lock().remaining()
    }

    /// 返回下一个没有显示过的帧，不改变游标
    pub fn peek(&self) -> Option<Arc<Frame>> {
        let inner = self.inner.lock();
        self.peek_locked(&inner)
    }

    /// 返回 rindex 上的帧（当前显示中或下一个要读取的），不改变游标
    pub fn peek_last(&self) -> Option<Arc<Frame>> {
        let inner = self.inner.lock();
        inner.slots[inner.rindex].clone()
    }

    /// 等待可写入的槽位，返回其下标；上游中止时返回 `None`
    pub fn peek_writable(&self) -> Option<usize> {
        let mut inner = self.inner.lock();
        if self.wait_writable(&mut inner) {
            Some(inner.windex)
        } else {
            None
        }
    }

    /// 等待可读取的帧，不改变游标；上游中止时返回 `None`
    pub fn peek_readable(&self) -> Option<Arc<Frame>> {
        let mut inner = self.inner.lock();
        if self.wait_readable(&mut inner) {
            self.peek_locked(&inner)
        } else {
            None
        }
    }

    /// 读取一个没有显示过的帧并推进 rindex，队列为空则等待
    pub fn get(&self) -> Option<Arc<Frame>> {
        let mut inner = self.inner.lock();
        if !self.wait_readable(&mut inner) {
            return None;
        }
        self.take_locked(&mut inner)
    }

    /// 非阻塞版本的 `get()`：没有可读帧时立即返回 `None`
    pub fn try_get(&self) -> Option<Arc<Frame>> {
        let mut inner = self.inner.lock();
        if inner.remaining() == 0 || self.pktq.is_aborted() {
            return None;
        }
        self.take_locked(&mut inner)
    }

    /// 把解码得到的负载写入可写槽位，已写满则等待
    ///
    /// 返回写入后的帧句柄；上游中止时返回 `None`，负载被丢弃
    pub fn put(
        &self,
        payload: FramePayload,
        duration: f64,
        pts: f64,
        pos: Option<i64>,
    ) -> Option<Arc<Frame>> {
        self.put_frame(Frame::new(payload, duration, pts, pos))
    }

    /// 写入一个已构造好的帧
    pub fn put_frame(&self, frame: Frame) -> Option<Arc<Frame>> {
        let mut inner = self.inner.lock();
        if !self.wait_writable(&mut inner) {
            return None;
        }
        let frame = Arc::new(frame);
        let windex = inner.windex;
        inner.slots[windex] = Some(frame.clone());
        inner.windex = (windex + 1) % self.max_size;
        inner.size += 1;
        self.cond.notify_all();
        Some(frame)
    }

    /// 唤醒所有等待者，不改变状态
    pub fn signal(&self) {
        let _inner = self.inner.lock();
        self.cond.notify_all();
    }

    fn peek_locked(&self, inner: &FrameQueueInner) -> Option<Arc<Frame>> {
        inner.slots[(inner.rindex + inner.rindex_shown) % self.max_size].clone()
    }

    fn take_locked(&self, inner: &mut MutexGuard<'_, FrameQueueInner>) -> Option<Arc<Frame>> {
        // 调用前已确认 remaining() > 0，该槽位一定被写入过
        let frame = self.peek_locked(inner)?;
        frame.mark_shown();

        if self.keep_last && inner.rindex_shown == 0 {
            inner.rindex_shown = 1;
        } else {
            inner.rindex = (inner.rindex + 1) % self.max_size;
            inner.size -= 1;
        }
        self.cond.notify_all();
        Some(frame)
    }

    fn wait_writable(&self, inner: &mut MutexGuard<'_, FrameQueueInner>) -> bool {
        while inner.size >= self.max_size && !self.pktq.is_aborted() {
            self.cond.wait(inner);
        }
        !self.pktq.is_aborted()
    }

    fn wait_readable(&self, inner: &mut MutexGuard<'_, FrameQueueInner>) -> bool {
        while inner.remaining() == 0 && !self.pktq.is_aborted() {
            self.cond.wait(inner);
        }
        !self.pktq.is_aborted()
    }
}
