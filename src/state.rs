// src/state.rs

//! 连接状态枚举模块。
//!
//! 本模块定义了连接生命周期的唯一权威状态表示 `ConnectionState`。
//! 原则上，状态只能由连接管理器内部的生命周期任务修改；状态迁移是唯一合法的
//! 修改路径，每次迁移都会通过 `on_state_change` 回调对外可见。
//! 把分散的布尔量（"是否已连接"、"是否正在重连"等）收敛为一个带标签的枚举，
//! 可以让诸如"心跳在 `Disconnected` 状态下仍然活跃"之类的非法组合在类型上不可表示。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 表示一条逻辑连接当前所处的生命周期阶段。
///
/// 状态机的合法迁移见 `client::manager` 模块文档；`Disconnected` 是唯一由
/// 调用方发起的终态，`Failed` 是唯一由系统发起的终态（仅在重连次数耗尽或
/// 连接地址非法时进入）。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// 正在建立传输层连接（初次连接或重连计时器到期后的再次尝试）。
    Connecting,
    /// 传输层连接已建立，心跳监控运行中，发送队列已冲刷。
    Connected,
    /// 连接意外断开，重连计时器已排定，等待下一次 `Connecting`。
    Reconnecting,
    /// 未连接。初始状态，同时也是调用方主动 `disconnect()` 之后的终态。
    Disconnected,
    /// 终止状态：重连次数耗尽或连接地址非法。不再安排任何计时器。
    Failed,
}

// 为 ConnectionState 实现 Display trait
impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 使用 Debug 格式化，它已经为我们生成了枚举成员的名称字符串
        write!(f, "{:?}", self)
    }
}

impl ConnectionState {
    /// 判断当前状态是否为终态（`Disconnected` 或 `Failed`）。
    /// 处于终态时，生命周期任务已经退出，不存在任何活动的计时器。
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }
}
