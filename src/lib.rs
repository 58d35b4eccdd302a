//! lite_player：多线程媒体播放流水线
//!
//! 读取线程 → 包队列 → 解码线程 → 帧队列 → 渲染 / 音频回调

pub mod core;
pub mod player;
pub mod renderer;
