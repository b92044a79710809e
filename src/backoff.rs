// src/backoff.rs

//! 重连退避计算模块。
//!
//! 本模块提供 `BackoffPolicy`——把重连尝试次数映射为等待延迟的纯函数：
//! `delay(attempt) = min(max_delay, base_delay * multiplier^attempt)`，
//! 其中 `attempt` 从 0 开始计数（首次重试使用 `attempt = 0`）。
//! 计算过程确定、无副作用，可独立进行单元测试；默认不加抖动，
//! 但提供可选的抖动钩子，挂载后调用方式保持不变。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;

/// 抖动钩子类型：接收按公式计算并封顶后的延迟，返回实际使用的延迟。
pub type JitterFn = Arc<dyn Fn(Duration) -> Duration + Send + Sync>;

/// 指数退避策略。
///
/// 持有基础延迟、延迟上限与倍率三个参数；`delay_for` 对任意尝试次数
/// 给出确定的延迟值。策略本身不记录任何尝试状态——尝试计数由
/// `client::reconnect::ReconnectController` 负责。
#[derive(Clone)]
pub struct BackoffPolicy {
    /// 首次重试（attempt = 0）的基础延迟。
    base_delay: Duration,
    /// 延迟上限，任何尝试次数下计算结果都不会超过该值。
    max_delay: Duration,
    /// 每次尝试的延迟倍率。
    multiplier: f64,
    /// 可选的抖动钩子。为 `None` 时计算结果完全确定。
    jitter: Option<JitterFn>,
}

impl BackoffPolicy {
    /// 创建一个不带抖动的退避策略。
    ///
    /// # 参数
    /// * `base_delay` - 首次重试的基础延迟。
    /// * `max_delay` - 延迟上限。
    /// * `multiplier` - 指数退避倍率（应不小于 1.0，否则延迟会随尝试次数递减）。
    pub fn new(base_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            max_delay,
            multiplier,
            jitter: None,
        }
    }

    /// 从客户端配置中提取退避参数。
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.reconnect_base_delay(),
            config.reconnect_max_delay(),
            config.reconnect_multiplier,
        )
    }

    /// 挂载抖动钩子。钩子接收封顶后的延迟并返回实际使用的延迟；
    /// 挂载与否不改变 `delay_for` 的调用方式。
    pub fn with_jitter(mut self, jitter: JitterFn) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// 计算第 `attempt` 次重试（从 0 开始）应等待的延迟。
    ///
    /// 以毫秒为精度按 `base * multiplier^attempt` 计算并以 `max_delay` 封顶。
    /// 中间量使用 f64，即使尝试次数很大也不会溢出——乘方结果超出范围时
    /// 直接落在上限值上。
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let raw_ms = base_ms * self.multiplier.powi(attempt as i32);
        // powi 溢出会得到 inf，min 之后仍然是上限值；NaN 理论上不会出现（base/倍率均为有限值）
        let capped_ms = raw_ms.min(max_ms);
        let delay = Duration::from_millis(capped_ms as u64);
        match &self.jitter {
            Some(jitter) => jitter(delay),
            None => delay,
        }
    }
}

// jitter 字段是闭包，无法派生 Debug，手动实现并仅标注钩子是否存在
impl fmt::Debug for BackoffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffPolicy")
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter.is_some())
            .finish()
    }
}
