// src/client/heartbeat.rs

//! 心跳监控模块。
//!
//! 连接处于 `Connected` 状态期间，`HeartbeatSchedule` 维护两个相互独立的计时器：
//! 1. 探测间隔计时器——每隔 `period` 到期一次，提示连接管理器发送一帧 `ping`；
//! 2. 回复超时计时器——发出探测后武装，收到 `pong` 前若先到期，
//!    连接管理器将以特定关闭码强制断开传输（触发重连策略）。
//!
//! 两个计时器都是本结构体的私有成员，而本结构体只在连接阶段的局部作用域中存活，
//! 因此"心跳在断开状态下仍然活跃"或"跨重连残留多个心跳计时器"在结构上不可能出现。
//! 对服务端发来的探测的应答不经过本模块——应答即发，与我方的探测排程完全无关。

use log::{debug, info};
use std::time::Duration;
use tokio::time::{Instant, Interval, interval_at, sleep_until};

/// 心跳排程产生的事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatEvent {
    /// 探测间隔到期，应当发送一帧 `ping`。
    ProbeDue,
    /// 等待 `pong` 回复超时，应当强制断开传输。
    ReplyTimedOut,
}

/// 心跳计时器对：探测间隔 + 回复超时倒计时。
pub(crate) struct HeartbeatSchedule {
    /// 探测间隔计时器。
    interval: Interval,
    /// 当前生效的探测间隔（用于日志与重建计时器）。
    period: Duration,
    /// 发出探测后等待回复的时限。
    reply_timeout: Duration,
    /// 回复超时的截止时刻；`None` 表示当前没有未答复的探测。
    reply_deadline: Option<Instant>,
}

impl HeartbeatSchedule {
    /// 创建一个新的心跳排程。
    ///
    /// 第一次探测发生在 `period` 之后（而不是立即），与既有实现保持一致：
    /// 连接刚建立时传输必然是活的，无需立刻探测。
    pub(crate) fn new(period: Duration, reply_timeout: Duration) -> Self {
        info!("[心跳] 心跳排程已创建。探测间隔 {:?}，回复超时 {:?}。", period, reply_timeout);
        Self {
            interval: interval_at(Instant::now() + period, period),
            period,
            reply_timeout,
            reply_deadline: None,
        }
    }

    /// 等待下一个心跳事件：探测到期或回复超时，先到者胜。
    ///
    /// 本方法是取消安全的：被 `select!` 的其他分支抢先时，探测间隔的进度不会丢失。
    pub(crate) async fn next_event(&mut self) -> HeartbeatEvent {
        match self.reply_deadline {
            Some(deadline) => tokio::select! {
                _ = self.interval.tick() => HeartbeatEvent::ProbeDue,
                _ = sleep_until(deadline) => HeartbeatEvent::ReplyTimedOut,
            },
            None => {
                self.interval.tick().await;
                HeartbeatEvent::ProbeDue
            }
        }
    }

    /// 记录"已发出一帧探测"。
    ///
    /// 若当前没有未答复的探测，则武装回复超时倒计时；
    /// 已有未答复探测时保持原倒计时不变（不因后续探测顺延截止时刻）。
    pub(crate) fn note_probe_sent(&mut self) {
        if self.reply_deadline.is_none() {
            self.reply_deadline = Some(Instant::now() + self.reply_timeout);
            debug!("[心跳] 探测已发出，回复超时倒计时 ({:?}) 开始。", self.reply_timeout);
        }
    }

    /// 记录"收到一帧回复"，解除回复超时倒计时。
    /// 没有未答复的探测时是空操作（迟到的回复不产生任何影响）。
    pub(crate) fn note_reply(&mut self) {
        if self.reply_deadline.take().is_some() {
            debug!("[心跳] 已收到 pong 回复，超时倒计时解除。");
        }
    }

    /// 采用服务端在握手确认中建议的探测间隔，对后续周期生效。
    ///
    /// 重建间隔计时器（下一次探测在新间隔之后发生）；未答复探测的
    /// 超时倒计时不受影响——探测与回复是两条独立的时间线。
    pub(crate) fn adopt_interval(&mut self, period: Duration) {
        if period == self.period {
            return; // 建议值与当前值相同，无需重建计时器
        }
        info!("[心跳] 采用服务端建议的探测间隔: {:?} (原 {:?})。", period, self.period);
        self.interval = interval_at(Instant::now() + period, period);
        self.period = period;
    }

    /// 当前生效的探测间隔。
    #[cfg(test)]
    pub(crate) fn period(&self) -> Duration {
        self.period
    }

    /// 当前是否存在未答复的探测。
    #[cfg(test)]
    pub(crate) fn awaiting_reply(&self) -> bool {
        self.reply_deadline.is_some()
    }
}
