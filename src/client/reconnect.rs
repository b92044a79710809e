// src/client/reconnect.rs

//! 重连控制模块。
//!
//! `ReconnectController` 负责重连的尝试计数、延迟决策与放弃判定；
//! 具体的延迟数值由 `backoff::BackoffPolicy` 纯函数给出。
//! 判定顺序与状态机约定一致：进入 `Reconnecting` 时先检查次数是否已达上限
//! （达到则放弃，直接进入 `Failed`），否则用**当前**计数计算延迟、
//! 排定一次性计时器，随后把计数加一。每次成功进入 `Connected` 时计数归零。

use log::{debug, info};
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::config::ClientConfig;

/// 进入 `Reconnecting` 状态时的决策结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReconnectDecision {
    /// 等待给定延迟后安排下一次连接尝试。
    RetryAfter(Duration),
    /// 尝试次数已达上限，放弃重连（状态机进入 `Failed`）。
    GiveUp {
        /// 已经消耗的尝试次数。
        attempts: u32,
    },
}

/// 重连尝试的计数与决策器。
#[derive(Debug)]
pub(crate) struct ReconnectController {
    /// 延迟计算策略（纯函数）。
    policy: BackoffPolicy,
    /// 允许的最大连续尝试次数。
    max_attempts: u32,
    /// 当前的连续尝试计数。在 `Reconnecting` 期间单调递增，连接成功时归零。
    attempts: u32,
}

impl ReconnectController {
    /// 以给定策略与次数上限创建控制器。
    pub(crate) fn new(policy: BackoffPolicy, max_attempts: u32) -> Self {
        Self {
            policy,
            max_attempts,
            attempts: 0,
        }
    }

    /// 从客户端配置构造控制器。
    pub(crate) fn from_config(config: &ClientConfig) -> Self {
        Self::new(BackoffPolicy::from_config(config), config.max_reconnect_attempts)
    }

    /// 进入 `Reconnecting` 状态时做一次决策。
    ///
    /// 先检查计数是否已达上限；未达上限时以当前计数计算延迟并把计数加一。
    pub(crate) fn next_decision(&mut self) -> ReconnectDecision {
        if self.attempts >= self.max_attempts {
            info!(
                "[重连控制] 连续尝试已达上限 ({} 次)，放弃重连。",
                self.attempts
            );
            return ReconnectDecision::GiveUp { attempts: self.attempts };
        }
        let delay = self.policy.delay_for(self.attempts);
        self.attempts += 1;
        debug!(
            "[重连控制] 第 {} 次重连将在 {:?} 后尝试 (上限 {} 次)。",
            self.attempts, delay, self.max_attempts
        );
        ReconnectDecision::RetryAfter(delay)
    }

    /// 连接成功建立后调用：把尝试计数归零。
    pub(crate) fn reset(&mut self) {
        if self.attempts != 0 {
            debug!("[重连控制] 连接已恢复，尝试计数由 {} 归零。", self.attempts);
            self.attempts = 0;
        }
    }

    /// 当前的连续尝试计数。
    #[cfg(test)]
    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }
}
