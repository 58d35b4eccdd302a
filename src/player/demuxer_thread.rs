use crate::core::{MediaPacket, PlayerEvent, Result};
use crate::player::demuxer_source::{DemuxerSource, ReadOutcome};
use crate::player::log_ctx;
use crate::player::packet_queue::PacketQueue;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 到达 EOF 后两次重试读取之间的等待
const EOF_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// 仅用于日志：前 N 个包逐个打印
const LOG_FIRST_N: usize = 5;

/// Demuxer 线程命令
pub enum DemuxerCommand {
    Stop,
}

/// Demuxer 线程管理器
///
/// 读取线程按流索引把包分发到对应的 `PacketQueue`，没有对应队列的包直接丢弃
pub struct DemuxerThread {
    thread_handle: Option<JoinHandle<()>>,
    command_tx: Sender<DemuxerCommand>,
}

impl DemuxerThread {
    /// 启动 Demuxer 线程
    ///
    /// `routes`：流索引 → 该流的包队列
    /// `event_tx`：不可恢复的读取错误通过它通知上层
    pub fn start(
        mut demuxer_source: Box<dyn DemuxerSource>,
        routes: HashMap<usize, Arc<PacketQueue>>,
        event_tx: Sender<PlayerEvent>,
    ) -> Result<Self> {
        let (command_tx, command_rx) = unbounded::<DemuxerCommand>();

        let thread_handle = thread::Builder::new()
            .name("read_thread".to_string())
            .spawn(move || {
                Self::demux_loop(&mut *demuxer_source, &routes, command_rx, event_tx);
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            command_tx,
        })
    }

    /// Demuxer 循环（在独立线程中运行）
    ///
    /// - 每轮开始先非阻塞地检查命令，收到 Stop 立即退出
    /// - EOF 时给每个打开的队列各写入一个结束标记（每次 EOF 只写一次），
    ///   然后在命令通道上短暂等待后重试读取
    /// - 读取出错时发送 `PlayerEvent::ReadFailed` 并退出
    fn demux_loop(
        demuxer: &mut dyn DemuxerSource,
        routes: &HashMap<usize, Arc<PacketQueue>>,
        command_rx: Receiver<DemuxerCommand>,
        event_tx: Sender<PlayerEvent>,
    ) {
        info!("{} 🎬 Demuxer 线程启动: {}", log_ctx(), demuxer.description());

        let mut packet_count: usize = 0;
        let mut dropped_count: usize = 0;
        let mut eof = false;

        loop {
            if let Ok(DemuxerCommand::Stop) = command_rx.try_recv() {
                info!("{} ⏹ Demuxer 线程收到停止命令", log_ctx());
                break;
            }

            match demuxer.read_packet() {
                Ok(ReadOutcome::Packet(packet)) => {
                    eof = false;
                    packet_count += 1;
                    if packet_count <= LOG_FIRST_N || packet_count % 100 == 0 {
                        info!(
                            "{} 📦 Demuxer 读取包 #{}（流 {}, {} 字节）",
                            log_ctx(),
                            packet_count,
                            packet.stream_index,
                            packet.size()
                        );
                    }

                    match routes.get(&packet.stream_index) {
                        Some(queue) => {
                            if queue.put(packet).is_err() {
                                debug!("{} 队列已中止，丢弃包", log_ctx());
                            }
                        }
                        None => dropped_count += 1,
                    }
                }
                Ok(ReadOutcome::Eof) => {
                    if !eof {
                        info!("{} 📄 Demuxer 到达文件末尾，写入结束标记", log_ctx());
                        for (&stream_index, queue) in routes {
                            if queue.put(MediaPacket::end_marker(stream_index)).is_err() {
                                debug!("{} 流 {} 队列已中止，跳过结束标记", log_ctx(), stream_index);
                            }
                        }
                        eof = true;
                    }
                    // 不忙等：在命令通道上等待，Stop 能立即生效
                    match command_rx.recv_timeout(EOF_RETRY_INTERVAL) {
                        Ok(DemuxerCommand::Stop) | Err(RecvTimeoutError::Disconnected) => {
                            info!("{} ⏹ Demuxer 线程在 EOF 等待中停止", log_ctx());
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                }
                Err(e) => {
                    error!("{} ❌ 读取包失败: {}", log_ctx(), e);
                    if event_tx.send(PlayerEvent::ReadFailed(e.to_string())).is_err() {
                        warn!("{} ⚠ 事件接收端已关闭", log_ctx());
                    }
                    break;
                }
            }
        }

        info!(
            "{} 🛑 Demuxer 线程退出（共读取 {} 个包，丢弃 {} 个无主包）",
            log_ctx(),
            packet_count,
            dropped_count
        );
    }

    /// 停止线程
    /// - 发送 Stop 命令
    /// - join 线程
    pub fn stop(&mut self) {
        info!("{} 🛑 DemuxerThread::stop() called", log_ctx());
        let _ = self.command_tx.send(DemuxerCommand::Stop);

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("{} ❌ Demuxer 线程 panic", log_ctx());
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.as_ref().map_or(false, |h| !h.is_finished())
    }
}

impl Drop for DemuxerThread {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            warn!("{} ⚠ DemuxerThread 被 drop，但可能未调用 stop()，正在尝试优雅停止", log_ctx());
            self.stop();
        }
    }
}
