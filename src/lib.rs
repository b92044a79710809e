// src/lib.rs

//! `resilient_ws_client` 是一个面向服务端推送日志/事件流的 WebSocket 客户端库。
//!
//! 它的职责是在网络抖动、服务端重启或代理空闲超时等故障面前，维持一条
//! 逻辑上持续可用的连接：不丢失在途的待发消息，应用层只会观察到
//! "已连接"或"尚未连接"两种情况（以及重连次数耗尽后的终止状态）。
//!
//! 主要模块包括：
//! - `client`: 连接生命周期管理（状态机、心跳、重连、传输层封装）。
//! - `config`: 连接描述符 `ClientConfig`。
//! - `message`: 线协议帧结构与入站帧分类。
//! - `queue`: 连接不可用期间的发送队列。
//! - `backoff`: 重连延迟的纯函数计算。
//! - `events`: 应用层回调与操作结果类型。
//! - `error`: 统一错误类型 `WsError`。
//! - `state`: 连接状态枚举 `ConnectionState`。
//!
//! # 使用示例
//!
//! ```no_run
//! use resilient_ws_client::{ClientCallbacks, ClientConfig, WsClientService};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), resilient_ws_client::WsError> {
//! let config = ClientConfig::new("ws://127.0.0.1:8088/stream");
//! let callbacks = ClientCallbacks {
//!     on_message: Some(Arc::new(|frame| {
//!         println!("收到应用数据: {}", frame);
//!     })),
//!     ..Default::default()
//! };
//! let service = WsClientService::new(config, callbacks);
//! service.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod queue;
pub mod state;

// 常用类型在 crate 根部再导出，方便调用方引用
pub use client::manager::{HEARTBEAT_TIMEOUT_CLOSE_CODE, WsClientService};
pub use config::ClientConfig;
pub use error::WsError;
pub use events::{ClientCallbacks, SendOutcome};
pub use state::ConnectionState;
