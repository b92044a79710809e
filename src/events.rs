// src/events.rs

//! 面向调用方的回调与操作结果类型。
//!
//! 连接管理器通过三个回调向应用层通知运行情况：
//! - `on_state_change`: 每次连接状态迁移时调用（迁移到相同状态是空操作，不会触发）；
//! - `on_message`: 每收到一帧应用数据时调用，按线上的接收顺序；
//! - `on_error`: 终止性错误与服务端上报的业务错误经此通知。
//!
//! 所有回调调用都做了崩溃隔离：回调内部 panic 只会被记录日志并吞掉，
//! 不会破坏状态机的内部不变量。

use log::error;
use serde_json::Value;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::error::WsError;
use crate::state::ConnectionState;

/// 状态迁移回调类型。
pub type StateChangeCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;
/// 应用数据回调类型。
pub type MessageCallback = Arc<dyn Fn(Value) + Send + Sync>;
/// 错误回调类型。
pub type ErrorCallback = Arc<dyn Fn(WsError) + Send + Sync>;

/// `send` 系列操作的结果。该操作从不报错、从不阻塞，结果只有三种：
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// 连接可用，消息已立即发出。
    Sent,
    /// 连接暂不可用，消息已排入发送队列，待连接恢复后按序发送。
    Queued,
    /// 发送队列已满，消息被丢弃（保护已排队的消息）。
    Dropped,
}

/// 调用方在构造连接管理器时提供的回调集合。
///
/// 每个回调都是可选的：未提供的回调对应的通知被静默忽略。
#[derive(Clone, Default)]
pub struct ClientCallbacks {
    /// 连接状态迁移通知。
    pub on_state_change: Option<StateChangeCallback>,
    /// 应用数据帧通知。
    pub on_message: Option<MessageCallback>,
    /// 终止性错误与服务端业务错误通知。
    pub on_error: Option<ErrorCallback>,
}

impl ClientCallbacks {
    /// 通知状态迁移。回调 panic 被隔离并记录日志。
    pub(crate) fn emit_state_change(&self, state: ConnectionState) {
        if let Some(callback) = &self.on_state_change {
            if catch_unwind(AssertUnwindSafe(|| callback(state))).is_err() {
                error!("[事件通知] on_state_change 回调在处理状态 {} 时发生 panic，已隔离。", state);
            }
        }
    }

    /// 转发一帧应用数据。回调 panic 被隔离并记录日志。
    pub(crate) fn emit_message(&self, message: Value) {
        if let Some(callback) = &self.on_message {
            if catch_unwind(AssertUnwindSafe(|| callback(message))).is_err() {
                error!("[事件通知] on_message 回调处理应用数据帧时发生 panic，已隔离。");
            }
        }
    }

    /// 上报一个错误。回调 panic 被隔离并记录日志。
    pub(crate) fn emit_error(&self, err: WsError) {
        if let Some(callback) = &self.on_error {
            let description = err.to_string(); // 先取出描述，回调获得所有权后仍可用于日志
            if catch_unwind(AssertUnwindSafe(|| callback(err))).is_err() {
                error!("[事件通知] on_error 回调在处理错误 '{}' 时发生 panic，已隔离。", description);
            }
        }
    }
}

// 回调字段是闭包，无法派生 Debug，手动实现并仅标注各回调是否已设置
impl fmt::Debug for ClientCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCallbacks")
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
