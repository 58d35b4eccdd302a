use crate::core::{MediaPacket, PlayerError, Result};
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::mem;

/// `PacketQueue::get` 的结果
#[derive(Debug)]
pub enum PacketGet {
    Packet(MediaPacket),
    /// 非阻塞读取时队列为空
    WouldBlock,
    /// 队列已中止
    Aborted,
}

impl PacketGet {
    pub fn into_packet(self) -> Option<MediaPacket> {
        match self {
            PacketGet::Packet(p) => Some(p),
            _ => None,
        }
    }
}

struct PacketQueueInner {
    packets: VecDeque<MediaPacket>,
    byte_size: usize,
    duration: i64,
    abort_request: bool,
}

/// 压缩包队列（线程安全 FIFO）
///
/// - 所有状态（包、计数、中止标志）由同一把锁保护
/// - 每次成功 put 和每次 abort 都会唤醒条件变量
/// - 新建的队列处于中止状态，需要先 `start()`
pub struct PacketQueue {
    inner: Mutex<PacketQueueInner>,
    cond: Condvar,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PacketQueueInner {
                packets: VecDeque::new(),
                byte_size: 0,
                duration: 0,
                abort_request: true,
            }),
            cond: Condvar::new(),
        }
    }

    /// 清除中止标志，允许读写
    pub fn start(&self) {
        self.inner.lock().abort_request = false;
    }

    /// 设置中止标志并唤醒所有等待者（可重复调用）
    pub fn abort(&self) {
        let mut inner = self.inner.lock();
        inner.abort_request = true;
        self.cond.notify_all();
    }

    /// 入队；队列已中止时失败，包被丢弃
    pub fn put(&self, packet: MediaPacket) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.abort_request {
            return Err(PlayerError::Aborted);
        }
        inner.byte_size += packet.size() + mem::size_of::<MediaPacket>();
        inner.duration += packet.duration;
        inner.packets.push_back(packet);
        self.cond.notify_one();
        Ok(())
    }

    /// 出队
    ///
    /// `block` 为 true 时在条件变量上等待，直到有包可读或队列被中止；
    /// 每次被唤醒后重新检查条件（防止虚假唤醒和并发中止）
    pub fn get(&self, block: bool) -> PacketGet {
        let mut inner = self.inner.lock();
        loop {
            if inner.abort_request {
                return PacketGet::Aborted;
            }
            if let Some(packet) = inner.packets.pop_front() {
                inner.byte_size -= packet.size() + mem::size_of::<MediaPacket>();
                inner.duration -= packet.duration;
                return PacketGet::Packet(packet);
            }
            if !block {
                return PacketGet::WouldBlock;
            }
            self.cond.wait(&mut inner);
        }
    }

    /// 丢弃所有排队的包并清零计数，不改变中止标志
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.packets.len();
        inner.packets.clear();
        inner.byte_size = 0;
        inner.duration = 0;
        if dropped > 0 {
            debug!("PacketQueue::flush: 丢弃 {} 个包", dropped);
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.lock().abort_request
    }

    pub fn len(&self) -> usize {
        self.inner.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 队列占用的字节数（负载 + 每个包的固定开销）
    pub fn byte_size(&self) -> usize {
        self.inner.lock().byte_size
    }

    /// 队列中所有包的时长之和（流时间基）
    pub fn duration(&self) -> i64 {
        self.inner.lock().duration
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn packet(pts: i64) -> MediaPacket {
        MediaPacket::new(0, vec![pts as u8; 4]).with_pts(pts).with_duration(40)
    }

    fn started() -> PacketQueue {
        let q = PacketQueue::new();
        q.start();
        q
    }

    #[test]
    fn new_queue_starts_aborted() {
        let q = PacketQueue::new();
        assert!(q.is_aborted());
        assert!(matches!(q.put(packet(0)), Err(PlayerError::Aborted)));
        assert!(matches!(q.get(true), PacketGet::Aborted));
    }

    #[test]
    fn get_returns_packets_in_put_order() {
        let q = started();
        for pts in 0..10 {
            q.put(packet(pts)).unwrap();
        }
        assert_eq!(q.len(), 10);
        for pts in 0..10 {
            let p = q.get(false).into_packet().unwrap();
            assert_eq!(p.pts, Some(pts));
        }
        assert!(matches!(q.get(false), PacketGet::WouldBlock));
    }

    #[test]
    fn tallies_track_puts_and_gets() {
        let q = started();
        q.put(packet(0)).unwrap();
        q.put(packet(1)).unwrap();
        assert_eq!(q.duration(), 80);
        assert_eq!(q.byte_size(), 2 * (4 + mem::size_of::<MediaPacket>()));
        q.get(false);
        assert_eq!(q.duration(), 40);
        assert_eq!(q.byte_size(), 4 + mem::size_of::<MediaPacket>());
    }

    #[test]
    fn flush_resets_counters_but_keeps_gate_open() {
        let q = started();
        for pts in 0..5 {
            q.put(packet(pts)).unwrap();
        }
        q.flush();
        assert_eq!(q.len(), 0);
        assert_eq!(q.byte_size(), 0);
        assert_eq!(q.duration(), 0);
        assert!(!q.is_aborted());
        assert!(matches!(q.get(false), PacketGet::WouldBlock));
    }

    #[test]
    fn flush_keeps_abort_gate_set() {
        let q = started();
        q.put(packet(0)).unwrap();
        q.abort();
        q.flush();
        assert!(q.is_aborted());
    }

    #[test]
    fn abort_wakes_blocked_consumer() {
        let q = Arc::new(started());
        let (tx, rx) = mpsc::channel();
        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let result = q.get(true);
                tx.send(matches!(result, PacketGet::Aborted)).unwrap();
            })
        };

        // 消费者应一直阻塞
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        q.abort();
        let aborted = rx.recv_timeout(Duration::from_secs(2)).expect("consumer still blocked");
        assert!(aborted);
        consumer.join().unwrap();
    }

    #[test]
    fn blocked_consumer_receives_later_put() {
        let q = Arc::new(started());
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.get(true).into_packet().map(|p| p.pts))
        };
        thread::sleep(Duration::from_millis(50));
        q.put(packet(7)).unwrap();
        assert_eq!(consumer.join().unwrap(), Some(Some(7)));
    }

    #[test]
    fn abort_is_idempotent_and_start_reopens() {
        let q = started();
        q.abort();
        q.abort();
        assert!(q.is_aborted());
        q.start();
        q.put(packet(1)).unwrap();
        assert_eq!(q.get(false).into_packet().and_then(|p| p.pts), Some(1));
    }
}
