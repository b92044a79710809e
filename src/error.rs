// src/error.rs

//! 定义本 crate 的统一错误类型。
//!
//! 错误按三类处理（与连接管理器的恢复策略对应）：
//! 1. 瞬时传输错误（网络断开、心跳超时）——由重连机制在本地恢复，从不作为致命错误上报；
//! 2. 终止性错误（重连次数耗尽、连接地址格式非法）——通过 `on_error` 回调上报一次，
//!    并伴随 `Failed` 状态，不再自动重试；
//! 3. 服务端协议层错误（显式的 error 帧）——通过 `on_error` 上报，但不影响连接状态。

use thiserror::Error; // 引入 thiserror 来简化错误类型的定义

/// 本 crate 的统一错误类型。
#[derive(Error, Debug)]
pub enum WsError {
    /// 当 serde 序列化失败时返回。
    /// 包含具体的序列化错误信息。
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 当 serde 反序列化失败时返回。
    /// 包含具体的反序列化错误信息。
    #[error("反序列化错误: {0}")]
    DeserializationError(String),

    /// WebSocket 协议相关的错误。
    /// 例如握手失败、底层连接异常等。
    #[error("WebSocket协议错误: {0}")]
    WebSocketProtocolError(#[from] tokio_tungstenite::tungstenite::Error),

    /// 底层 I/O 错误。
    #[error("I/O错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 无效的连接地址格式。
    /// 属于终止性错误：在 `connect()` 同步校验阶段被发现，状态机直接进入 `Failed`。
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    /// 心跳探测在超时时间内未收到回复。
    /// 属于瞬时错误：连接管理器会以特定关闭码强制断开并触发重连策略。
    #[error("心跳超时: 超过 {0:?} 未收到 pong 回复")]
    HeartbeatTimeout(std::time::Duration),

    /// 重连尝试次数已达配置上限。
    /// 属于终止性错误：状态机进入 `Failed`，不再安排新的重连计时器。
    #[error("重连失败: 已连续尝试 {attempts} 次，达到配置上限")]
    ReconnectAttemptsExhausted {
        /// 已经消耗的重连尝试次数。
        attempts: u32,
    },

    /// 服务端通过 error 帧显式上报的业务错误。
    /// 仅转发给应用层的错误回调，不视为传输故障。
    #[error("服务端上报错误: {0}")]
    ServerReported(String),

    /// 未连接错误，当尝试在未建立连接时进行操作。
    #[error("未连接")]
    NotConnected,

    /// 通用消息错误，用于其他未明确分类的错误。
    #[error("消息错误: {0}")]
    Message(String),
}
