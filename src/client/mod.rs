// src/client/mod.rs

//! WebSocket 客户端模块。
//!
//! 本模块及其子模块共同构成了本 crate 的核心——对一条逻辑连接的
//! 完整生命周期管理。
//!
//! 子模块分工：
//! - `manager`: 连接状态机与事件循环，对外的 `WsClientService` 即在此定义。
//!   它独占持有传输句柄，驱动其余组件，并通过回调向应用层通知状态与数据。
//! - `transport`: 对底层 `tokio-tungstenite` 连接建立过程的最小封装。
//! - `heartbeat`: 心跳计时器对（探测间隔 + 回复超时），仅在连接阶段存活。
//! - `reconnect`: 重连尝试计数、延迟决策与放弃判定。

pub mod manager; // 连接状态机与事件循环
pub mod transport; // 客户端传输层封装

pub(crate) mod heartbeat; // 心跳排程（内部组件）
pub(crate) mod reconnect; // 重连控制（内部组件）
